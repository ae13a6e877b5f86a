//! Primality, NTT-friendly prime search and the recommended coefficient
//! moduli per security level.

use std::collections::BTreeMap;

use crate::native::{NativeError, NativeResult, SecurityLevel};

/// Largest bit size accepted for a single coefficient or plaintext prime.
pub const MAX_MODULUS_BITS: u32 = 60;
/// Smallest bit size accepted for a single coefficient prime.
pub const MIN_MODULUS_BITS: u32 = 2;

pub const MIN_POLY_DEGREE: usize = 16;
pub const MAX_POLY_DEGREE: usize = 32768;

const WITNESSES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

pub fn bit_count(value: u64) -> u32 {
    64 - value.leading_zeros()
}

fn mul_mod(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}

fn pow_mod(mut base: u64, mut exp: u64, m: u64) -> u64 {
    let mut result = 1 % m;
    base %= m;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mul_mod(result, base, m);
        }
        base = mul_mod(base, base, m);
        exp >>= 1;
    }
    result
}

/// Deterministic Miller-Rabin; the witness set is exact for all u64.
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    for &p in &WITNESSES {
        if n % p == 0 {
            return n == p;
        }
    }
    let s = (n - 1).trailing_zeros();
    let d = (n - 1) >> s;
    'witness: for &a in &WITNESSES {
        let mut x = pow_mod(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..s {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Maximum total coefficient-modulus bits for `degree` at `level`, following
/// the HomomorphicEncryption.org tables. `None` means no bound applies.
pub fn max_coeff_bits(degree: usize, level: SecurityLevel) -> NativeResult<Option<u32>> {
    let row: [u32; 6] = match level {
        SecurityLevel::None => return Ok(None),
        SecurityLevel::Tc128 => [27, 54, 109, 218, 438, 881],
        SecurityLevel::Tc192 => [19, 37, 75, 152, 305, 611],
        SecurityLevel::Tc256 => [14, 29, 58, 118, 237, 476],
    };
    degree_index(degree)
        .map(|i| Some(row[i]))
        .ok_or_else(|| NativeError::new(format!("no security bound for poly_modulus_degree {degree}")))
}

fn degree_index(degree: usize) -> Option<usize> {
    match degree {
        1024 => Some(0),
        2048 => Some(1),
        4096 => Some(2),
        8192 => Some(3),
        16384 => Some(4),
        32768 => Some(5),
        _ => None,
    }
}

/// Prime bit sizes of the recommended chain for `degree` at `level`.
pub fn default_bit_sizes(degree: usize, level: SecurityLevel) -> NativeResult<Vec<u32>> {
    let index = degree_index(degree).ok_or_else(|| {
        NativeError::new(format!("no default coeff_modulus for poly_modulus_degree {degree}"))
    })?;
    let sizes: Vec<u32> = match index {
        0 => vec![27],
        1 => vec![54],
        2 => vec![36, 36, 37],
        3 => vec![43, 43, 44, 44, 44],
        4 => vec![48, 48, 48, 49, 49, 49, 49, 49, 49],
        _ => vec![55; 16],
    };
    let level = match level {
        SecurityLevel::None => SecurityLevel::Tc128,
        other => other,
    };
    let budget = max_coeff_bits(degree, level)?.unwrap_or(u32::MAX);
    if level == SecurityLevel::Tc128 {
        return Ok(sizes);
    }
    // Tighter levels keep the prime count and split the smaller budget.
    let count = sizes.len() as u32;
    let base = budget / count;
    let extra = budget % count;
    Ok((0..count).map(|i| if i >= count - extra { base + 1 } else { base }).collect())
}

/// Up to `count` distinct primes of exactly `bits` bits with p ≡ 1 (mod 2·degree),
/// largest first.
pub fn ntt_primes(degree: usize, bits: u32, count: usize) -> NativeResult<Vec<u64>> {
    if !(MIN_MODULUS_BITS..=MAX_MODULUS_BITS).contains(&bits) {
        return Err(NativeError::new(format!(
            "prime bit size {bits} is not bounded by {MIN_MODULUS_BITS} and {MAX_MODULUS_BITS}"
        )));
    }
    let step = 2 * degree as u64;
    let upper = 1u64 << bits;
    let lower = 1u64 << (bits - 1);
    let mut primes = Vec::with_capacity(count);
    if upper <= step {
        return Err(NativeError::new(format!(
            "no {bits}-bit prime is congruent to 1 modulo {step}"
        )));
    }
    let mut candidate = ((upper - 1) / step) * step + 1;
    if candidate >= upper {
        candidate -= step;
    }
    while primes.len() < count && candidate >= lower && candidate > step {
        if is_prime(candidate) {
            primes.push(candidate);
        }
        candidate -= step;
    }
    if primes.len() < count {
        return Err(NativeError::new(format!(
            "failed to find {count} {bits}-bit primes congruent to 1 modulo {step}"
        )));
    }
    Ok(primes)
}

/// Distinct NTT-friendly primes matching `bit_sizes` position by position.
pub fn create_coeff_modulus(degree: usize, bit_sizes: &[u32]) -> NativeResult<Vec<u64>> {
    if !degree.is_power_of_two() || !(MIN_POLY_DEGREE..=MAX_POLY_DEGREE).contains(&degree) {
        return Err(NativeError::new(format!("poly_modulus_degree {degree} is not supported")));
    }
    if bit_sizes.is_empty() {
        return Err(NativeError::new("bit_sizes is empty"));
    }
    let mut wanted: BTreeMap<u32, usize> = BTreeMap::new();
    for &bits in bit_sizes {
        *wanted.entry(bits).or_default() += 1;
    }
    let mut pools = BTreeMap::new();
    for (&bits, &count) in &wanted {
        pools.insert(bits, ntt_primes(degree, bits, count)?.into_iter());
    }
    bit_sizes
        .iter()
        .map(|bits| {
            pools
                .get_mut(bits)
                .and_then(Iterator::next)
                .ok_or_else(|| NativeError::new("prime pool exhausted"))
        })
        .collect()
}

/// A single batching-friendly plaintext prime of `bits` bits.
pub fn batching_prime(degree: usize, bits: u32) -> NativeResult<u64> {
    ntt_primes(degree, bits, 1).map(|primes| primes[0])
}

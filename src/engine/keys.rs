use std::sync::Arc;

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroize;

use crate::engine::modulus::bit_count;
use crate::engine::params::{ContextData, ParmsId};
use crate::engine::ring::modular::{mod_add, mod_mul, mod_pow, mod_sub};
use crate::engine::ring::rns::{RnsBasis, RnsPoly};
use crate::engine::sampling::{sample_ternary, GaussianSampler};
use crate::native::{NativeError, NativeResult};

/// Largest accepted decomposition bit count.
pub const MAX_DECOMPOSITION_BIT_COUNT: u32 = 60;

/// Secret key s, ternary, stored in NTT form. Zeroed on drop.
#[derive(Serialize, Deserialize)]
pub struct SecretKey {
    pub parms_id: ParmsId,
    pub poly: RnsPoly,
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.poly.zeroize();
    }
}

/// Public key (c0, c1) = (-(a·s + e), a).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublicKey {
    pub parms_id: ParmsId,
    pub c0: RnsPoly,
    pub c1: RnsPoly,
}

/// Key-switching key towards one target polynomial.
///
/// Component (i, j) encrypts 2^{dbc·j}·target in limb i under s:
/// b = -(a·s + e) + g_{i,j}·target.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KSwitchKey {
    /// Galois element for rotation keys, power of s for relinearization keys.
    pub index: u64,
    pub components: Vec<(RnsPoly, RnsPoly)>,
}

/// A set of key-switching keys: relinearization keys or Galois keys.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KSwitchKeys {
    pub parms_id: ParmsId,
    pub decomposition_bit_count: u32,
    pub keys: Vec<KSwitchKey>,
}

impl KSwitchKeys {
    pub fn accepts(&self, basis: &RnsBasis) -> bool {
        (1..=MAX_DECOMPOSITION_BIT_COUNT).contains(&self.decomposition_bit_count)
            && self.keys.iter().all(|key| {
                key.components.len() == digit_count(basis, self.decomposition_bit_count)
                    && key.components.iter().all(|(b, a)| basis.accepts(b) && basis.accepts(a))
            })
    }
}

fn digit_count(basis: &RnsBasis, dbc: u32) -> usize {
    basis.moduli().iter().map(|&q| bit_count(q).div_ceil(dbc) as usize).sum()
}

/// Galois elements for rotations by ±2^k within a row, plus the column swap.
pub fn galois_elements(degree: usize) -> Vec<u64> {
    let m = 2 * degree as u64;
    let row_size = degree as u64 / 2;
    let mut elements: Vec<u64> = Vec::new();
    let mut step = 1u64;
    while step < row_size {
        for exponent in [step, row_size - step] {
            let element = mod_pow(3, exponent, m);
            if !elements.contains(&element) {
                elements.push(element);
            }
        }
        step <<= 1;
    }
    elements.push(m - 1);
    elements
}

/// X^i → X^{i·k} over Z_q[X]/(X^n + 1), a signed permutation of coefficients.
pub fn apply_automorphism(coeffs: &[u64], k: u64, q: u64) -> Vec<u64> {
    let n = coeffs.len();
    let mut result = vec![0u64; n];
    for (i, &c) in coeffs.iter().enumerate() {
        if c == 0 {
            continue;
        }
        let new_exp = ((i as u64 * k) % (2 * n as u64)) as usize;
        if new_exp < n {
            result[new_exp] = mod_add(result[new_exp], c, q);
        } else {
            // X^{n+j} = -X^j
            let j = new_exp - n;
            result[j] = mod_sub(result[j], c, q);
        }
    }
    result
}

/// Holds the secret and public key of one context and derives
/// key-switching keys from them.
pub struct KeyGenerator {
    ctx: Arc<ContextData>,
    secret: Arc<SecretKey>,
    public: Arc<PublicKey>,
}

impl KeyGenerator {
    pub fn new<R: Rng>(ctx: Arc<ContextData>, rng: &mut R) -> NativeResult<Self> {
        let basis = &ctx.tables()?.basis;
        let s = sample_ternary(basis.ring_degree(), rng);
        let secret = Arc::new(SecretKey { parms_id: ctx.parms_id().clone(), poly: basis.from_signed(&s) });
        Self::from_secret(ctx, secret, rng)
    }

    pub fn from_secret<R: Rng>(ctx: Arc<ContextData>, secret: Arc<SecretKey>, rng: &mut R) -> NativeResult<Self> {
        if secret.parms_id != *ctx.parms_id() {
            return Err(NativeError::new("secret key is not valid for encryption parameters"));
        }
        let basis = &ctx.tables()?.basis;
        let sampler = GaussianSampler::default();
        let a = basis.sample_uniform(rng);
        let e = basis.from_signed(&sampler.sample_poly(basis.ring_degree(), rng));
        let c0 = a.mul(&secret.poly, basis).add(&e, basis).neg(basis);
        let public = Arc::new(PublicKey { parms_id: ctx.parms_id().clone(), c0, c1: a });
        Ok(Self { ctx, secret, public })
    }

    pub fn secret_key(&self) -> Arc<SecretKey> {
        self.secret.clone()
    }

    pub fn public_key(&self) -> Arc<PublicKey> {
        self.public.clone()
    }

    /// Relinearization keys for s^2 .. s^{count+1}.
    pub fn relin_keys<R: Rng>(&self, dbc: u32, count: usize, rng: &mut R) -> NativeResult<KSwitchKeys> {
        check_dbc(dbc)?;
        if count == 0 {
            return Err(NativeError::new("count must be positive"));
        }
        let basis = &self.ctx.tables()?.basis;
        let s = &self.secret.poly;
        let mut power = s.mul(s, basis);
        let mut keys = Vec::with_capacity(count);
        for exponent in 2..count as u64 + 2 {
            keys.push(KSwitchKey { index: exponent, components: self.kswitch(&power, dbc, basis, rng) });
            power = power.mul(s, basis);
        }
        debug!(count, dbc, "generated relinearization keys");
        Ok(KSwitchKeys { parms_id: self.ctx.parms_id().clone(), decomposition_bit_count: dbc, keys })
    }

    /// Galois keys for every element of [`galois_elements`]. Elements are
    /// generated in parallel, each from its own seed drawn from `rng`.
    pub fn galois_keys<R: Rng>(&self, dbc: u32, rng: &mut R) -> NativeResult<KSwitchKeys> {
        check_dbc(dbc)?;
        let basis = &self.ctx.tables()?.basis;
        let elements = galois_elements(basis.ring_degree());
        let seeds: Vec<[u8; 32]> = elements
            .iter()
            .map(|_| {
                let mut seed = [0u8; 32];
                rng.fill_bytes(&mut seed);
                seed
            })
            .collect();

        let keys = elements
            .par_iter()
            .zip(seeds)
            .map(|(&element, seed)| {
                let mut rng = ChaCha20Rng::from_seed(seed);
                let target = self.rotated_secret(element, basis);
                KSwitchKey { index: element, components: self.kswitch(&target, dbc, basis, &mut rng) }
            })
            .collect::<Vec<_>>();
        debug!(count = keys.len(), dbc, "generated galois keys");
        Ok(KSwitchKeys { parms_id: self.ctx.parms_id().clone(), decomposition_bit_count: dbc, keys })
    }

    fn rotated_secret(&self, element: u64, basis: &RnsBasis) -> RnsPoly {
        let mut limbs = basis.to_coeff_limbs(&self.secret.poly);
        for (limb, &q) in limbs.iter_mut().zip(basis.moduli()) {
            let mut rotated = apply_automorphism(limb, element, q);
            std::mem::swap(limb, &mut rotated);
            rotated.zeroize();
        }
        basis.from_coeff_limbs(limbs)
    }

    fn kswitch<R: Rng>(&self, target: &RnsPoly, dbc: u32, basis: &RnsBasis, rng: &mut R) -> Vec<(RnsPoly, RnsPoly)> {
        let sampler = GaussianSampler::default();
        let mut components = Vec::with_capacity(digit_count(basis, dbc));
        for (i, &q) in basis.moduli().iter().enumerate() {
            let bk = basis.barrett_k(i);
            let mut shift = 0u32;
            while shift < bit_count(q) {
                let factor = (1u64 << shift) % q;
                let a = basis.sample_uniform(rng);
                let e = basis.from_signed(&sampler.sample_poly(basis.ring_degree(), rng));
                let mut b = a.mul(&self.secret.poly, basis).add(&e, basis).neg(basis);
                for (x, &t) in b.limbs[i].iter_mut().zip(&target.limbs[i]) {
                    *x = mod_add(*x, mod_mul(factor, t, q, bk), q);
                }
                components.push((b, a));
                shift += dbc;
            }
        }
        components
    }
}

fn check_dbc(dbc: u32) -> NativeResult<()> {
    if (1..=MAX_DECOMPOSITION_BIT_COUNT).contains(&dbc) {
        Ok(())
    } else {
        Err(NativeError::new(format!(
            "decomposition_bit_count must lie between 1 and {MAX_DECOMPOSITION_BIT_COUNT}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::modulus::create_coeff_modulus;
    use crate::engine::params::EncryptionParameters;
    use crate::native::{SchemeType, SecurityLevel};
    use num_bigint::BigUint;

    fn context() -> Arc<ContextData> {
        let params = EncryptionParameters {
            scheme: SchemeType::Bfv,
            poly_degree: 1024,
            coeff_modulus: create_coeff_modulus(1024, &[27]).unwrap(),
            plain_modulus: Some(12289),
        };
        Arc::new(ContextData::new(params, true, SecurityLevel::Tc128))
    }

    fn centered(x: &BigUint, basis: &RnsBasis) -> i128 {
        use num_traits::ToPrimitive;
        if x > basis.half_product() {
            -((basis.product() - x).to_i128().unwrap())
        } else {
            x.to_i128().unwrap()
        }
    }

    #[test]
    fn test_public_key_is_small_under_secret() {
        let ctx = context();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let keygen = KeyGenerator::new(ctx.clone(), &mut rng).unwrap();
        let basis = &ctx.tables().unwrap().basis;
        let pk = keygen.public_key();

        // c0 + c1·s = -e
        let phase = pk.c0.add(&pk.c1.mul(&keygen.secret_key().poly, basis), basis);
        for x in basis.reconstruct(&phase) {
            assert!(centered(&x, basis).abs() <= 20);
        }
    }

    #[test]
    fn test_relin_key_shape() {
        let ctx = context();
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let keygen = KeyGenerator::new(ctx.clone(), &mut rng).unwrap();
        let basis = &ctx.tables().unwrap().basis;

        let keys = keygen.relin_keys(10, 2, &mut rng).unwrap();
        assert_eq!(keys.keys.len(), 2);
        assert_eq!(keys.keys[0].index, 2);
        // a 27-bit prime split into 10-bit digits
        assert_eq!(keys.keys[0].components.len(), 3);
        assert!(keys.accepts(basis));

        assert!(keygen.relin_keys(0, 1, &mut rng).is_err());
        assert!(keygen.relin_keys(61, 1, &mut rng).is_err());
    }

    #[test]
    fn test_galois_keys_are_seed_deterministic() {
        let ctx = context();
        let keygen = KeyGenerator::new(ctx.clone(), &mut ChaCha20Rng::seed_from_u64(3)).unwrap();
        let first = keygen.galois_keys(60, &mut ChaCha20Rng::seed_from_u64(9)).unwrap();
        let second = keygen.galois_keys(60, &mut ChaCha20Rng::seed_from_u64(9)).unwrap();
        assert_eq!(first.keys.len(), galois_elements(1024).len());
        for (a, b) in first.keys.iter().zip(&second.keys) {
            assert_eq!(a.index, b.index);
            assert_eq!(a.components, b.components);
        }
    }

    #[test]
    fn test_galois_elements() {
        let elements = galois_elements(4096);
        assert!(elements.iter().all(|&g| g % 2 == 1 && g < 8192));
        assert_eq!(*elements.last().unwrap(), 8191);
        assert_eq!(elements[0], 3);
        let mut unique = elements.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), elements.len());
    }

    #[test]
    fn test_automorphism() {
        // 1 + X + X^2 + X^3 under X → X^3 in Z_17[X]/(X^4 + 1)
        let r = apply_automorphism(&[1, 1, 1, 1], 3, 17);
        assert_eq!(r, vec![1, 1, 16, 1]);
    }

    #[test]
    fn test_foreign_secret_rejected() {
        let ctx = context();
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let keygen = KeyGenerator::new(ctx.clone(), &mut rng).unwrap();

        let other = Arc::new(ContextData::new(
            EncryptionParameters {
                scheme: SchemeType::Bfv,
                poly_degree: 1024,
                coeff_modulus: create_coeff_modulus(1024, &[27]).unwrap(),
                plain_modulus: Some(40961),
            },
            true,
            SecurityLevel::Tc128,
        ));
        assert!(KeyGenerator::from_secret(other, keygen.secret_key(), &mut rng).is_err());
    }
}

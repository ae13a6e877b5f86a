use std::fmt;
use std::sync::Arc;

use concrete_ntt::prime64::Plan;
use num_bigint::BigUint;
use num_traits::Zero;
use rand::Rng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::engine::ring::modular::{barrett_constant, mod_add, mod_inv, mod_mul, mod_neg, mod_sub, reduce_signed};
use crate::native::{NativeError, NativeResult};

/// Precomputed data for an RNS basis Q = ∏ q_i over Z_Q[X]/(X^n + 1).
#[derive(Clone)]
pub struct RnsBasis {
    moduli: Vec<u64>,
    plans: Vec<Arc<Plan>>,
    barrett_ks: Vec<u64>,
    ring_degree: usize,
    product: BigUint,
    half_product: BigUint,
    /// (Q / q_i) · ((Q / q_i)^{-1} mod q_i), the CRT lifting terms.
    crt_terms: Vec<BigUint>,
}

/// Polynomial in RNS form, one NTT-domain limb per prime of the basis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RnsPoly {
    pub limbs: Vec<Vec<u64>>,
}

pub fn make_plan(n: usize, modulus: u64) -> NativeResult<Arc<Plan>> {
    Plan::try_new(n, modulus).map(Arc::new).ok_or_else(|| {
        NativeError::new(format!(
            "cannot build an NTT for degree {n} over {modulus} (need a prime ≡ 1 mod {})",
            2 * n
        ))
    })
}

impl RnsBasis {
    pub fn new(moduli: Vec<u64>, ring_degree: usize) -> NativeResult<Self> {
        if moduli.is_empty() {
            return Err(NativeError::new("RNS basis needs at least one modulus"));
        }
        let plans = moduli
            .iter()
            .map(|&q| make_plan(ring_degree, q))
            .collect::<NativeResult<Vec<_>>>()?;
        let barrett_ks = moduli.iter().map(|&q| barrett_constant(q)).collect();

        let product = moduli.iter().fold(BigUint::from(1u64), |acc, &q| acc * q);
        let half_product = &product >> 1;
        let crt_terms = moduli
            .iter()
            .map(|&q| {
                let q_star = &product / q;
                let residue = (&q_star % q).iter_u64_digits().next().unwrap_or(0);
                let inv = mod_inv(residue, q)
                    .ok_or_else(|| NativeError::new("RNS moduli must be pairwise coprime"))?;
                Ok(q_star * inv)
            })
            .collect::<NativeResult<Vec<_>>>()?;

        Ok(Self { moduli, plans, barrett_ks, ring_degree, product, half_product, crt_terms })
    }

    pub fn moduli(&self) -> &[u64] {
        &self.moduli
    }

    pub fn len(&self) -> usize {
        self.moduli.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moduli.is_empty()
    }

    pub fn ring_degree(&self) -> usize {
        self.ring_degree
    }

    pub fn product(&self) -> &BigUint {
        &self.product
    }

    pub fn half_product(&self) -> &BigUint {
        &self.half_product
    }

    pub fn product_bits(&self) -> u64 {
        self.product.bits()
    }

    pub fn barrett_k(&self, limb: usize) -> u64 {
        self.barrett_ks[limb]
    }

    /// Coefficient domain to NTT domain, in place.
    pub fn forward(&self, limb: usize, values: &mut [u64]) {
        self.plans[limb].fwd(values);
    }

    /// NTT domain to coefficient domain, in place.
    pub fn inverse(&self, limb: usize, values: &mut [u64]) {
        self.plans[limb].inv(values);
        self.plans[limb].normalize(values);
    }

    pub fn zero(&self) -> RnsPoly {
        RnsPoly { limbs: vec![vec![0u64; self.ring_degree]; self.len()] }
    }

    /// Build a polynomial from coefficient-domain residues, one row per prime.
    pub fn from_coeff_limbs(&self, mut limbs: Vec<Vec<u64>>) -> RnsPoly {
        for (i, limb) in limbs.iter_mut().enumerate() {
            self.forward(i, limb);
        }
        RnsPoly { limbs }
    }

    /// Build a polynomial from small signed coefficients.
    pub fn from_signed(&self, coeffs: &[i64]) -> RnsPoly {
        let limbs = self
            .moduli
            .iter()
            .map(|&q| coeffs.iter().map(|&c| reduce_signed(c, q)).collect())
            .collect();
        self.from_coeff_limbs(limbs)
    }

    /// Coefficient-domain residues of `poly`, one row per prime.
    pub fn to_coeff_limbs(&self, poly: &RnsPoly) -> Vec<Vec<u64>> {
        let mut limbs = poly.limbs.clone();
        for (i, limb) in limbs.iter_mut().enumerate() {
            self.inverse(i, limb);
        }
        limbs
    }

    /// CRT reconstruction of every coefficient into [0, Q).
    pub fn reconstruct(&self, poly: &RnsPoly) -> Vec<BigUint> {
        let limbs = self.to_coeff_limbs(poly);
        (0..self.ring_degree)
            .map(|j| {
                let mut acc = BigUint::zero();
                for (limb, term) in limbs.iter().zip(&self.crt_terms) {
                    if limb[j] != 0 {
                        acc += term * limb[j];
                    }
                }
                acc % &self.product
            })
            .collect()
    }

    /// Uniformly random polynomial. Uniform residues are uniform in either
    /// domain, so the limbs are sampled directly in NTT form.
    pub fn sample_uniform<R: Rng>(&self, rng: &mut R) -> RnsPoly {
        let limbs = self
            .moduli
            .iter()
            .map(|&q| crate::engine::sampling::sample_uniform_residues(self.ring_degree, q, rng))
            .collect();
        RnsPoly { limbs }
    }

    /// Whether `poly` has the right shape and fully reduced residues.
    pub fn accepts(&self, poly: &RnsPoly) -> bool {
        poly.limbs.len() == self.len()
            && poly.limbs.iter().zip(&self.moduli).all(|(limb, &q)| {
                limb.len() == self.ring_degree && limb.iter().all(|&c| c < q)
            })
    }
}

impl fmt::Debug for RnsBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RnsBasis")
            .field("moduli", &self.moduli)
            .field("ring_degree", &self.ring_degree)
            .finish()
    }
}

impl RnsPoly {
    pub fn add(&self, other: &Self, basis: &RnsBasis) -> Self {
        let mut out = self.clone();
        out.add_assign(other, basis);
        out
    }

    pub fn add_assign(&mut self, other: &Self, basis: &RnsBasis) {
        for ((a, b), &q) in self.limbs.iter_mut().zip(&other.limbs).zip(basis.moduli()) {
            for (x, &y) in a.iter_mut().zip(b) {
                *x = mod_add(*x, y, q);
            }
        }
    }

    pub fn sub(&self, other: &Self, basis: &RnsBasis) -> Self {
        let limbs = self
            .limbs
            .iter()
            .zip(&other.limbs)
            .zip(basis.moduli())
            .map(|((a, b), &q)| a.iter().zip(b).map(|(&x, &y)| mod_sub(x, y, q)).collect())
            .collect();
        Self { limbs }
    }

    pub fn neg(&self, basis: &RnsBasis) -> Self {
        let limbs = self
            .limbs
            .iter()
            .zip(basis.moduli())
            .map(|(a, &q)| a.iter().map(|&x| mod_neg(x, q)).collect())
            .collect();
        Self { limbs }
    }

    /// Pointwise product in NTT domain (= negacyclic polynomial product).
    pub fn mul(&self, other: &Self, basis: &RnsBasis) -> Self {
        let limbs = self
            .limbs
            .iter()
            .zip(&other.limbs)
            .enumerate()
            .map(|(i, (a, b))| {
                let q = basis.moduli()[i];
                let bk = basis.barrett_k(i);
                a.iter().zip(b).map(|(&x, &y)| mod_mul(x, y, q, bk)).collect()
            })
            .collect();
        Self { limbs }
    }

    /// Multiply limb i by `scalars[i]`.
    pub fn mul_scalars(&self, scalars: &[u64], basis: &RnsBasis) -> Self {
        let limbs = self
            .limbs
            .iter()
            .zip(scalars)
            .enumerate()
            .map(|(i, (a, &s))| {
                let q = basis.moduli()[i];
                let bk = basis.barrett_k(i);
                a.iter().map(|&x| mod_mul(x, s % q, q, bk)).collect()
            })
            .collect();
        Self { limbs }
    }
}

impl Zeroize for RnsPoly {
    fn zeroize(&mut self) {
        for limb in &mut self.limbs {
            limb.zeroize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::ToPrimitive;

    const TEST_N: usize = 16;
    // Both prime and ≡ 1 (mod 32).
    const Q0: u64 = 65537;
    const Q1: u64 = 97;

    fn make_vec(v: &[i64]) -> Vec<i64> {
        let mut r = vec![0i64; TEST_N];
        r[..v.len()].copy_from_slice(v);
        r
    }

    #[test]
    fn test_signed_roundtrip_through_crt() {
        let basis = RnsBasis::new(vec![Q0, Q1], TEST_N).unwrap();
        let coeffs = make_vec(&[1, -2, 3, 4, -5, 6, 7, 8]);
        let poly = basis.from_signed(&coeffs);
        let lifted = basis.reconstruct(&poly);

        let q = Q0 as i128 * Q1 as i128;
        for (big, &c) in lifted.iter().zip(&coeffs) {
            assert_eq!(big.to_i128().unwrap(), (c as i128).rem_euclid(q));
        }
    }

    #[test]
    fn test_mul_is_negacyclic() {
        let basis = RnsBasis::new(vec![Q0], TEST_N).unwrap();
        // X^15 · X = X^16 = -1
        let mut x15 = vec![0i64; TEST_N];
        x15[15] = 1;
        let x = make_vec(&[0, 1]);
        let product = basis.from_signed(&x15).mul(&basis.from_signed(&x), &basis);
        let coeffs = basis.to_coeff_limbs(&product);
        assert_eq!(coeffs[0][0], Q0 - 1);
        assert!(coeffs[0][1..].iter().all(|&c| c == 0));
    }

    #[test]
    fn test_add_sub_neg() {
        let basis = RnsBasis::new(vec![Q0, Q1], TEST_N).unwrap();
        let a = basis.from_signed(&make_vec(&[5, 6, 7]));
        let b = basis.from_signed(&make_vec(&[1, 2, 3]));
        let diff = a.sub(&b, &basis);
        assert_eq!(diff.add(&b, &basis), a);
        assert_eq!(a.add(&a.neg(&basis), &basis), basis.zero());
    }

    #[test]
    fn test_mul_scalars() {
        let basis = RnsBasis::new(vec![Q0, Q1], TEST_N).unwrap();
        let a = basis.from_signed(&make_vec(&[1, 2]));
        let scaled = a.mul_scalars(&[3, 3], &basis);
        assert_eq!(scaled, basis.from_signed(&make_vec(&[3, 6])));
    }

    #[test]
    fn test_accepts_checks_shape_and_range() {
        let basis = RnsBasis::new(vec![Q0, Q1], TEST_N).unwrap();
        let mut poly = basis.zero();
        assert!(basis.accepts(&poly));
        poly.limbs[1][0] = Q1;
        assert!(!basis.accepts(&poly));
        poly.limbs.pop();
        assert!(!basis.accepts(&poly));
    }

    #[test]
    fn test_rejects_non_ntt_prime() {
        assert!(RnsBasis::new(vec![65539], TEST_N).is_err());
        assert!(RnsBasis::new(vec![], TEST_N).is_err());
    }
}

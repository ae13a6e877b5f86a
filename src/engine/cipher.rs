use std::sync::Arc;

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::engine::keys::{PublicKey, SecretKey};
use crate::engine::params::{ContextData, ParmsId};
use crate::engine::ring::modular::{mod_add, mod_mul};
use crate::engine::ring::rns::RnsPoly;
use crate::engine::sampling::{sample_ternary, GaussianSampler};
use crate::native::{NativeError, NativeResult, SchemeType};

/// Encoded message.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub enum Plaintext {
    /// Freshly created, holds nothing yet.
    #[default]
    Empty,
    /// BFV: coefficients modulo the plaintext modulus.
    Integer { parms_id: ParmsId, coeffs: Vec<u64> },
    /// CKKS: scaled coefficients over the full coefficient modulus, NTT form.
    Real { parms_id: ParmsId, poly: RnsPoly, scale: f64 },
}

impl Plaintext {
    pub fn integer_coeffs(&self, parms_id: &ParmsId) -> NativeResult<&[u64]> {
        match self {
            Plaintext::Integer { parms_id: own, coeffs } if own == parms_id => Ok(coeffs),
            Plaintext::Integer { .. } => Err(mismatch("plaintext")),
            Plaintext::Real { .. } => Err(NativeError::new("plaintext holds real-number data")),
            Plaintext::Empty => Err(NativeError::new("plaintext is empty")),
        }
    }

    pub fn real_poly(&self, parms_id: &ParmsId) -> NativeResult<(&RnsPoly, f64)> {
        match self {
            Plaintext::Real { parms_id: own, poly, scale } if own == parms_id => Ok((poly, *scale)),
            Plaintext::Real { .. } => Err(mismatch("plaintext")),
            Plaintext::Integer { .. } => Err(NativeError::new("plaintext holds integer data")),
            Plaintext::Empty => Err(NativeError::new("plaintext is empty")),
        }
    }

    pub fn parms_id(&self) -> Option<&ParmsId> {
        match self {
            Plaintext::Empty => None,
            Plaintext::Integer { parms_id, .. } | Plaintext::Real { parms_id, .. } => Some(parms_id),
        }
    }

    /// Shape check used when a plaintext is loaded against `ctx`.
    pub fn accepts(&self, ctx: &ContextData) -> bool {
        let Ok(tables) = ctx.tables() else { return false };
        match self {
            Plaintext::Empty => true,
            Plaintext::Integer { parms_id, coeffs } => {
                parms_id == ctx.parms_id()
                    && coeffs.len() == ctx.poly_degree()
                    && coeffs.iter().all(|&c| c < tables.plain_modulus)
            }
            Plaintext::Real { parms_id, poly, scale } => {
                parms_id == ctx.parms_id() && tables.basis.accepts(poly) && scale.is_finite() && *scale > 0.0
            }
        }
    }
}

/// Ciphertext polynomials (c0, c1, ...) with the scale of the encoded message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CiphertextData {
    pub parms_id: ParmsId,
    pub polys: Vec<RnsPoly>,
    pub scale: f64,
}

impl CiphertextData {
    pub fn accepts(&self, ctx: &ContextData) -> bool {
        let Ok(tables) = ctx.tables() else { return false };
        self.parms_id == *ctx.parms_id()
            && self.polys.len() >= 2
            && self.polys.iter().all(|p| tables.basis.accepts(p))
            && self.scale.is_finite()
            && self.scale > 0.0
    }
}

fn mismatch(what: &str) -> NativeError {
    NativeError::new(format!("{what} is not valid for encryption parameters"))
}

/// Public-key encryptor bound to one context.
pub struct Encryptor {
    ctx: Arc<ContextData>,
    public_key: Arc<PublicKey>,
}

impl Encryptor {
    pub fn new(ctx: Arc<ContextData>, public_key: Arc<PublicKey>) -> NativeResult<Self> {
        ctx.tables()?;
        if public_key.parms_id != *ctx.parms_id() {
            return Err(mismatch("public key"));
        }
        Ok(Self { ctx, public_key })
    }

    /// ct = (pk0·u + e1 + m̂, pk1·u + e2) where m̂ is Δ·m for BFV and the
    /// scaled message itself for CKKS.
    pub fn encrypt<R: Rng>(&self, plaintext: &Plaintext, rng: &mut R) -> NativeResult<CiphertextData> {
        let tables = self.ctx.tables()?;
        let basis = &tables.basis;
        let parms_id = self.ctx.parms_id();
        let (message, scale) = match self.ctx.scheme() {
            SchemeType::Bfv => {
                let coeffs = plaintext.integer_coeffs(parms_id)?;
                // round(Q·m / t) = ⌊Q/t⌋·m + round((Q mod t)·m / t)
                let (t, r) = (tables.plain_modulus as u128, tables.q_mod_t as u128);
                let carries: Vec<u64> = coeffs.iter().map(|&m| ((r * m as u128 + t / 2) / t) as u64).collect();
                let limbs = basis
                    .moduli()
                    .iter()
                    .enumerate()
                    .map(|(i, &q)| {
                        let (delta, bk) = (tables.delta[i], basis.barrett_k(i));
                        coeffs
                            .iter()
                            .zip(&carries)
                            .map(|(&m, &carry)| mod_add(mod_mul(m % q, delta, q, bk), carry % q, q))
                            .collect()
                    })
                    .collect();
                (basis.from_coeff_limbs(limbs), 1.0)
            }
            SchemeType::Ckks => {
                let (poly, scale) = plaintext.real_poly(parms_id)?;
                (poly.clone(), scale)
            }
        };

        let n = basis.ring_degree();
        let sampler = GaussianSampler::default();
        let u = basis.from_signed(&sample_ternary(n, rng));
        let e1 = basis.from_signed(&sampler.sample_poly(n, rng));
        let e2 = basis.from_signed(&sampler.sample_poly(n, rng));

        let mut c0 = self.public_key.c0.mul(&u, basis);
        c0.add_assign(&e1, basis);
        c0.add_assign(&message, basis);
        let mut c1 = self.public_key.c1.mul(&u, basis);
        c1.add_assign(&e2, basis);

        Ok(CiphertextData { parms_id: parms_id.clone(), polys: vec![c0, c1], scale })
    }
}

/// Secret-key decryptor bound to one context.
pub struct Decryptor {
    ctx: Arc<ContextData>,
    secret_key: Arc<SecretKey>,
}

impl Decryptor {
    pub fn new(ctx: Arc<ContextData>, secret_key: Arc<SecretKey>) -> NativeResult<Self> {
        ctx.tables()?;
        if secret_key.parms_id != *ctx.parms_id() {
            return Err(mismatch("secret key"));
        }
        Ok(Self { ctx, secret_key })
    }

    /// Phase c0 + c1·s + c2·s² + ..., then BFV scales down by t/Q.
    pub fn decrypt(&self, ciphertext: &CiphertextData) -> NativeResult<Plaintext> {
        if ciphertext.parms_id != *self.ctx.parms_id() {
            return Err(mismatch("ciphertext"));
        }
        let tables = self.ctx.tables()?;
        let basis = &tables.basis;
        let s = &self.secret_key.poly;

        let (first, rest) = ciphertext
            .polys
            .split_first()
            .ok_or_else(|| NativeError::new("ciphertext is empty"))?;
        let mut phase = first.clone();
        let mut s_power = s.clone();
        for (i, c) in rest.iter().enumerate() {
            if i > 0 {
                s_power = s_power.mul(s, basis);
            }
            phase.add_assign(&c.mul(&s_power, basis), basis);
        }

        let parms_id = self.ctx.parms_id().clone();
        match self.ctx.scheme() {
            SchemeType::Bfv => {
                // m = ⌊t·x / Q⌉ mod t
                let t = tables.plain_modulus;
                let q = basis.product();
                let half_q = basis.half_product();
                let coeffs = basis
                    .reconstruct(&phase)
                    .into_iter()
                    .map(|x| {
                        let rounded: BigUint = (x * t + half_q) / q;
                        (rounded % t).to_u64().unwrap_or(0)
                    })
                    .collect();
                Ok(Plaintext::Integer { parms_id, coeffs })
            }
            SchemeType::Ckks => Ok(Plaintext::Real { parms_id, poly: phase, scale: ciphertext.scale }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::encoder::{BatchEncoder, RealEncoder};
    use crate::engine::keys::KeyGenerator;
    use crate::engine::modulus::create_coeff_modulus;
    use crate::engine::params::EncryptionParameters;
    use crate::native::SecurityLevel;
    use crate::vector::{ElementType, HostArray};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn context(scheme: SchemeType) -> Arc<ContextData> {
        let plain_modulus = match scheme {
            SchemeType::Bfv => Some(786433),
            SchemeType::Ckks => None,
        };
        let params = EncryptionParameters {
            scheme,
            poly_degree: 4096,
            coeff_modulus: create_coeff_modulus(4096, &[36, 36, 37]).unwrap(),
            plain_modulus,
        };
        Arc::new(ContextData::new(params, true, SecurityLevel::Tc128))
    }

    #[test]
    fn test_bfv_encrypt_decrypt() {
        let ctx = context(SchemeType::Bfv);
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let keygen = KeyGenerator::new(ctx.clone(), &mut rng).unwrap();
        let encryptor = Encryptor::new(ctx.clone(), keygen.public_key()).unwrap();
        let decryptor = Decryptor::new(ctx.clone(), keygen.secret_key()).unwrap();
        let encoder = BatchEncoder::new(ctx).unwrap();

        let values = HostArray::UInt64((0..4096).collect());
        let pt = encoder.encode(&values).unwrap();
        let ct = encryptor.encrypt(&pt, &mut rng).unwrap();
        let decrypted = decryptor.decrypt(&ct).unwrap();
        assert_eq!(encoder.decode(&decrypted, ElementType::UInt64).unwrap(), values);
    }

    #[test]
    fn test_ckks_encrypt_decrypt() {
        let ctx = context(SchemeType::Ckks);
        let mut rng = ChaCha20Rng::seed_from_u64(12);
        let keygen = KeyGenerator::new(ctx.clone(), &mut rng).unwrap();
        let encryptor = Encryptor::new(ctx.clone(), keygen.public_key()).unwrap();
        let decryptor = Decryptor::new(ctx.clone(), keygen.secret_key()).unwrap();
        let encoder = RealEncoder::new(ctx).unwrap();

        let values: Vec<f64> = (0..100).map(|i| (i as f64).sqrt()).collect();
        let pt = encoder.encode(&HostArray::Float64(values.clone()), 2f64.powi(40)).unwrap();
        let ct = encryptor.encrypt(&pt, &mut rng).unwrap();
        let decrypted = decryptor.decrypt(&ct).unwrap();
        let decoded = encoder.decode(&decrypted, ElementType::Float64).unwrap().into_vec::<f64>().unwrap();
        for (a, b) in values.iter().zip(&decoded) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }

    #[test]
    fn test_wrong_plaintext_kind_rejected() {
        let ctx = context(SchemeType::Ckks);
        let mut rng = ChaCha20Rng::seed_from_u64(13);
        let keygen = KeyGenerator::new(ctx.clone(), &mut rng).unwrap();
        let encryptor = Encryptor::new(ctx, keygen.public_key()).unwrap();
        assert!(encryptor.encrypt(&Plaintext::Empty, &mut rng).is_err());
    }

    #[test]
    fn test_keys_bound_to_their_context() {
        let bfv = context(SchemeType::Bfv);
        let ckks = context(SchemeType::Ckks);
        let mut rng = ChaCha20Rng::seed_from_u64(14);
        let keygen = KeyGenerator::new(bfv, &mut rng).unwrap();
        assert!(Encryptor::new(ckks.clone(), keygen.public_key()).is_err());
        assert!(Decryptor::new(ckks, keygen.secret_key()).is_err());
    }
}

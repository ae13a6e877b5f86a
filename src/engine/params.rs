use std::sync::Arc;

use concrete_ntt::prime64::Plan;
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::modulus::{self, MAX_MODULUS_BITS, MAX_POLY_DEGREE, MIN_MODULUS_BITS, MIN_POLY_DEGREE};
use crate::engine::ring::rns::{make_plan, RnsBasis};
use crate::native::{NativeError, NativeResult, SchemeType, SecurityLevel};

/// Encryption parameters as assembled through the engine interface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptionParameters {
    pub scheme: SchemeType,
    pub poly_degree: usize,
    pub coeff_modulus: Vec<u64>,
    pub plain_modulus: Option<u64>,
}

impl EncryptionParameters {
    pub fn new(scheme: SchemeType) -> Self {
        Self { scheme, poly_degree: 0, coeff_modulus: Vec::new(), plain_modulus: None }
    }

    pub fn parms_id(&self) -> ParmsId {
        ParmsId {
            scheme: self.scheme,
            poly_degree: self.poly_degree as u64,
            coeff_modulus: self.coeff_modulus.clone(),
            plain_modulus: self.plain_modulus.unwrap_or(0),
        }
    }
}

/// Fingerprint of a parameter set. Persisted keys and ciphertexts carry it
/// and are only accepted by a context with the same fingerprint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParmsId {
    pub scheme: SchemeType,
    pub poly_degree: u64,
    pub coeff_modulus: Vec<u64>,
    pub plain_modulus: u64,
}

/// Precomputation available once a parameter set validates.
#[derive(Debug)]
pub struct CryptoTables {
    pub basis: RnsBasis,
    /// ⌊Q / t⌋ mod q_i, BFV only.
    pub delta: Vec<u64>,
    /// Q mod t, BFV only.
    pub q_mod_t: u64,
    pub plain_modulus: u64,
    /// Negacyclic NTT over the plaintext modulus, present when batching works.
    pub plain_plan: Option<Arc<Plan>>,
}

/// A context: parameters plus the outcome of validating them.
#[derive(Debug)]
pub struct ContextData {
    params: EncryptionParameters,
    parms_id: ParmsId,
    expand_mod_chain: bool,
    security_level: SecurityLevel,
    tables: Result<CryptoTables, String>,
}

impl ContextData {
    pub fn new(params: EncryptionParameters, expand_mod_chain: bool, security_level: SecurityLevel) -> Self {
        let tables = validate(&params, security_level);
        let parms_id = params.parms_id();
        match &tables {
            Ok(_) => debug!(
                scheme = %params.scheme,
                degree = params.poly_degree,
                primes = params.coeff_modulus.len(),
                expand_mod_chain,
                "context parameters validated"
            ),
            Err(reason) => debug!(scheme = %params.scheme, %reason, "context parameters rejected"),
        }
        Self { params, parms_id, expand_mod_chain, security_level, tables }
    }

    pub fn params(&self) -> &EncryptionParameters {
        &self.params
    }

    pub fn parms_id(&self) -> &ParmsId {
        &self.parms_id
    }

    pub fn scheme(&self) -> SchemeType {
        self.params.scheme
    }

    pub fn poly_degree(&self) -> usize {
        self.params.poly_degree
    }

    pub fn security_level(&self) -> SecurityLevel {
        self.security_level
    }

    /// Number of levels in the modulus switching chain: one per prime when
    /// the chain is expanded, otherwise only the top level.
    pub fn chain_length(&self) -> usize {
        match (&self.tables, self.expand_mod_chain) {
            (Ok(tables), true) => tables.basis.len(),
            (Ok(_), false) => 1,
            (Err(_), _) => 0,
        }
    }

    pub fn parameters_set(&self) -> bool {
        self.tables.is_ok()
    }

    pub fn diagnostic(&self) -> String {
        match &self.tables {
            Ok(_) => "valid".to_string(),
            Err(reason) => reason.clone(),
        }
    }

    pub fn tables(&self) -> NativeResult<&CryptoTables> {
        self.tables
            .as_ref()
            .map_err(|reason| NativeError::new(format!("encryption parameters are not set correctly: {reason}")))
    }
}

fn validate(params: &EncryptionParameters, level: SecurityLevel) -> Result<CryptoTables, String> {
    let n = params.poly_degree;
    if !n.is_power_of_two() {
        return Err("poly_modulus_degree is not a power of two".into());
    }
    if !(MIN_POLY_DEGREE..=MAX_POLY_DEGREE).contains(&n) {
        return Err(format!(
            "poly_modulus_degree is not bounded by {MIN_POLY_DEGREE} and {MAX_POLY_DEGREE}"
        ));
    }
    let moduli = &params.coeff_modulus;
    if moduli.is_empty() {
        return Err("coeff_modulus is not set".into());
    }
    if moduli
        .iter()
        .any(|&q| !(MIN_MODULUS_BITS..=MAX_MODULUS_BITS).contains(&modulus::bit_count(q)))
    {
        return Err(format!(
            "coeff_modulus's primes' bit counts are not bounded by {MIN_MODULUS_BITS} and {MAX_MODULUS_BITS}"
        ));
    }
    if moduli.iter().any(|&q| !modulus::is_prime(q)) {
        return Err("coeff_modulus's values are not all prime".into());
    }
    let mut sorted = moduli.clone();
    sorted.sort_unstable();
    sorted.dedup();
    if sorted.len() != moduli.len() {
        return Err("coeff_modulus's primes are not coprime".into());
    }
    let two_n = 2 * n as u64;
    if moduli.iter().any(|&q| q % two_n != 1) {
        return Err("coeff_modulus's primes are not congruent to 1 modulo 2 * poly_modulus_degree".into());
    }
    let total_bits: u32 = moduli.iter().map(|&q| modulus::bit_count(q)).sum();
    match modulus::max_coeff_bits(n, level) {
        Ok(Some(max)) if total_bits > max => {
            return Err("parameters are not compliant with HomomorphicEncryption.org security standard".into())
        }
        Err(_) => {
            return Err("parameters are not compliant with HomomorphicEncryption.org security standard".into())
        }
        _ => {}
    }

    let basis = RnsBasis::new(moduli.clone(), n).map_err(|err| err.message)?;

    match (params.scheme, params.plain_modulus) {
        (SchemeType::Ckks, Some(_)) => Err("plain_modulus is not supported for this scheme".into()),
        (SchemeType::Ckks, None) => {
            Ok(CryptoTables { basis, delta: Vec::new(), q_mod_t: 0, plain_modulus: 0, plain_plan: None })
        }
        (SchemeType::Bfv, None) => Err("plain_modulus is not set".into()),
        (SchemeType::Bfv, Some(t)) => {
            if !(MIN_MODULUS_BITS..=MAX_MODULUS_BITS).contains(&modulus::bit_count(t)) {
                return Err(format!(
                    "plain_modulus's bit count is not bounded by {MIN_MODULUS_BITS} and {MAX_MODULUS_BITS}"
                ));
            }
            if moduli.iter().any(|&q| gcd(q, t) != 1) {
                return Err("plain_modulus is not coprime to coeff_modulus".into());
            }
            if BigUint::from(t) >= *basis.product() {
                return Err("plain_modulus is not smaller than coeff_modulus".into());
            }
            let delta_big = basis.product() / t;
            let delta = moduli
                .iter()
                .map(|&q| (&delta_big % q).to_u64().unwrap_or(0))
                .collect();
            let q_mod_t = (basis.product() % t).to_u64().unwrap_or(0);
            let plain_plan = if modulus::is_prime(t) && t % two_n == 1 { make_plan(n, t).ok() } else { None };
            Ok(CryptoTables { basis, delta, q_mod_t, plain_modulus: t, plain_plan })
        }
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bfv(degree: usize, moduli: Vec<u64>, plain: u64) -> EncryptionParameters {
        EncryptionParameters {
            scheme: SchemeType::Bfv,
            poly_degree: degree,
            coeff_modulus: moduli,
            plain_modulus: Some(plain),
        }
    }

    #[test]
    fn test_valid_bfv_context_supports_batching() {
        let moduli = modulus::create_coeff_modulus(4096, &[36, 36, 37]).unwrap();
        let ctx = ContextData::new(bfv(4096, moduli, 786433), true, SecurityLevel::Tc128);
        assert!(ctx.parameters_set(), "{}", ctx.diagnostic());
        assert_eq!(ctx.diagnostic(), "valid");
        assert_eq!(ctx.chain_length(), 3);
        let tables = ctx.tables().unwrap();
        assert!(tables.plain_plan.is_some());
        assert_eq!(tables.delta.len(), 3);
    }

    #[test]
    fn test_non_batching_plain_modulus_is_still_valid() {
        let moduli = modulus::create_coeff_modulus(1024, &[27]).unwrap();
        let ctx = ContextData::new(bfv(1024, moduli, 256), false, SecurityLevel::Tc128);
        assert!(ctx.parameters_set());
        assert_eq!(ctx.chain_length(), 1);
        assert!(ctx.tables().unwrap().plain_plan.is_none());
    }

    #[test]
    fn test_insecure_parameters_rejected() {
        let moduli = modulus::create_coeff_modulus(1024, &[30]).unwrap();
        let ctx = ContextData::new(bfv(1024, moduli.clone(), 12289), true, SecurityLevel::Tc128);
        assert!(!ctx.parameters_set());
        assert!(ctx.diagnostic().contains("security standard"));

        let relaxed = ContextData::new(bfv(1024, moduli, 12289), true, SecurityLevel::None);
        assert!(relaxed.parameters_set());
    }

    #[test]
    fn test_diagnostics() {
        let cases = [
            (bfv(1000, vec![12289], 17), "power of two"),
            (bfv(1024, vec![], 17), "not set"),
            (bfv(1024, vec![12289, 12289], 17), "coprime"),
            (bfv(1024, vec![65539], 17), "congruent to 1"),
            (bfv(1024, vec![12289], 12289), "coprime to coeff_modulus"),
        ];
        for (params, needle) in cases {
            let ctx = ContextData::new(params, true, SecurityLevel::None);
            assert!(ctx.diagnostic().contains(needle), "{} lacks {needle}", ctx.diagnostic());
            assert!(ctx.tables().is_err());
        }

        let ckks = EncryptionParameters {
            scheme: SchemeType::Ckks,
            poly_degree: 1024,
            coeff_modulus: vec![12289],
            plain_modulus: Some(17),
        };
        let ctx = ContextData::new(ckks, true, SecurityLevel::None);
        assert_eq!(ctx.diagnostic(), "plain_modulus is not supported for this scheme");
    }
}

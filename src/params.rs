//! Parameter bundles and the recommended presets per security tier.

use crate::error::{HelmError, Result};
use crate::native::SecurityLevel;

/// Named parameter tier. Higher tiers use larger rings and moduli.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SecurityTier {
    #[default]
    Low,
    Medium,
    High,
}

impl SecurityTier {
    /// Case-insensitive lookup. Unknown names fall back to [`SecurityTier::Low`].
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "medium" => SecurityTier::Medium,
            "high" => SecurityTier::High,
            _ => SecurityTier::Low,
        }
    }
}

/// How the coefficient modulus is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoeffModulus {
    /// The engine's recommended chain for the given ring degree.
    Default(usize),
    /// Distinct NTT-friendly primes with these bit sizes.
    BitSizes(Vec<u32>),
}

/// Cryptographic configuration for one scheme context.
///
/// `plain_modulus` is only read by the integer scheme and `scale` only by the
/// real-number scheme; each is ignored, not cleared, by the other.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub poly_degree: usize,
    pub coeff_modulus: CoeffModulus,
    pub plain_modulus: u64,
    pub scale: f64,
    pub security_level: SecurityLevel,
}

impl Parameters {
    pub fn builder() -> ParametersBuilder {
        ParametersBuilder::new()
    }
}

impl Default for Parameters {
    fn default() -> Self {
        preset_for(SecurityTier::Low)
    }
}

/// Builder for [`Parameters`]. Starts from the low-tier preset.
#[derive(Debug, Clone)]
pub struct ParametersBuilder {
    poly_degree: usize,
    coeff_modulus: Option<CoeffModulus>,
    plain_modulus: u64,
    scale: f64,
    security_level: SecurityLevel,
}

impl ParametersBuilder {
    pub fn new() -> Self {
        Self::from_tier(SecurityTier::Low)
    }

    pub fn from_tier(tier: SecurityTier) -> Self {
        let preset = preset_for(tier);
        Self {
            poly_degree: preset.poly_degree,
            coeff_modulus: None,
            plain_modulus: preset.plain_modulus,
            scale: preset.scale,
            security_level: preset.security_level,
        }
    }

    pub fn poly_degree(mut self, degree: usize) -> Self {
        self.poly_degree = degree;
        self
    }

    pub fn coeff_modulus(mut self, coeff_modulus: CoeffModulus) -> Self {
        self.coeff_modulus = Some(coeff_modulus);
        self
    }

    pub fn coeff_bit_sizes(self, bit_sizes: impl Into<Vec<u32>>) -> Self {
        self.coeff_modulus(CoeffModulus::BitSizes(bit_sizes.into()))
    }

    pub fn plain_modulus(mut self, modulus: u64) -> Self {
        self.plain_modulus = modulus;
        self
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn security_level(mut self, level: SecurityLevel) -> Self {
        self.security_level = level;
        self
    }

    /// Checks what can be checked without an engine. Ring and modulus
    /// validity is decided by the engine when the context is built.
    pub fn build(self) -> Result<Parameters> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(HelmError::InvalidParameters(format!("scale must be positive, got {}", self.scale)));
        }
        if let Some(CoeffModulus::BitSizes(sizes)) = &self.coeff_modulus {
            if sizes.is_empty() {
                return Err(HelmError::InvalidParameters("coeff_modulus bit sizes are empty".into()));
            }
        }
        Ok(Parameters {
            poly_degree: self.poly_degree,
            // Without an explicit choice the chain follows the ring degree.
            coeff_modulus: self.coeff_modulus.unwrap_or(CoeffModulus::Default(self.poly_degree)),
            plain_modulus: self.plain_modulus,
            scale: self.scale,
            security_level: self.security_level,
        })
    }
}

impl Default for ParametersBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Plaintext modulus shared by every tier: a prime with 786433 ≡ 1 (mod 2·16384),
/// so batching works up to the high-tier ring.
pub const PRESET_PLAIN_MODULUS: u64 = 786433;

/// Recommended parameters for `tier`.
pub fn preset_for(tier: SecurityTier) -> Parameters {
    let (degree, scale_bits) = match tier {
        SecurityTier::Low => (4096, 54),
        SecurityTier::Medium => (8192, 163),
        SecurityTier::High => (16384, 383),
    };
    Parameters {
        poly_degree: degree,
        coeff_modulus: CoeffModulus::Default(degree),
        plain_modulus: PRESET_PLAIN_MODULUS,
        scale: 2f64.powi(scale_bits),
        security_level: SecurityLevel::Tc128,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_names_are_case_insensitive() {
        assert_eq!(SecurityTier::from_name("HIGH"), SecurityTier::High);
        assert_eq!(SecurityTier::from_name("Medium"), SecurityTier::Medium);
        assert_eq!(SecurityTier::from_name("low"), SecurityTier::Low);
        assert_eq!(SecurityTier::from_name("paranoid"), SecurityTier::Low);
        assert_eq!(SecurityTier::from_name(""), SecurityTier::Low);
    }

    #[test]
    fn preset_table() {
        let low = preset_for(SecurityTier::Low);
        assert_eq!(low.poly_degree, 4096);
        assert_eq!(low.coeff_modulus, CoeffModulus::Default(4096));
        assert_eq!(low.plain_modulus, 786433);
        assert_eq!(low.scale, 2f64.powi(54));

        let medium = preset_for(SecurityTier::Medium);
        assert_eq!(medium.poly_degree, 8192);
        assert_eq!(medium.scale, 2f64.powi(163));

        let high = preset_for(SecurityTier::High);
        assert_eq!(high.poly_degree, 16384);
        assert_eq!(high.coeff_modulus, CoeffModulus::Default(16384));
        assert_eq!(high.scale, 2f64.powi(383));
        assert_eq!(PRESET_PLAIN_MODULUS % (2 * 16384), 1);
    }

    #[test]
    fn builder_defaults_follow_degree() {
        let params = Parameters::builder().poly_degree(2048).build().unwrap();
        assert_eq!(params.coeff_modulus, CoeffModulus::Default(2048));
        assert_eq!(params.plain_modulus, PRESET_PLAIN_MODULUS);

        let params = Parameters::builder()
            .poly_degree(1024)
            .coeff_bit_sizes([27])
            .plain_modulus(12289)
            .security_level(SecurityLevel::None)
            .build()
            .unwrap();
        assert_eq!(params.coeff_modulus, CoeffModulus::BitSizes(vec![27]));
        assert_eq!(params.security_level, SecurityLevel::None);
    }

    #[test]
    fn builder_rejects_bad_scale() {
        assert!(matches!(
            Parameters::builder().scale(0.0).build(),
            Err(HelmError::InvalidParameters(_))
        ));
        assert!(Parameters::builder().scale(f64::NAN).build().is_err());
        assert!(Parameters::builder().coeff_bit_sizes(Vec::new()).build().is_err());
    }
}

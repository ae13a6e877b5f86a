//! Scheme context construction.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{HelmError, Result};
use crate::handle::{
    BatchEncoderKind, CoeffModulusKind, ContextKind, IntegerEncoderKind, NativeHandle, ParametersKind,
    RealEncoderKind, SmallModulus,
};
use crate::native::{NativeEngine, NativeError, SchemeType};
use crate::params::{CoeffModulus, Parameters};

/// Algorithmic family of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Exact modular integers (BFV).
    Integer,
    /// Approximate real numbers (CKKS).
    ApproxReal,
}

impl From<Scheme> for SchemeType {
    fn from(scheme: Scheme) -> Self {
        match scheme {
            Scheme::Integer => SchemeType::Bfv,
            Scheme::ApproxReal => SchemeType::Ckks,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&SchemeType::from(*self), f)
    }
}

#[derive(Debug)]
enum Encoders {
    Integer {
        batch: NativeHandle<BatchEncoderKind>,
        integer: NativeHandle<IntegerEncoderKind>,
    },
    ApproxReal {
        real: NativeHandle<RealEncoderKind>,
    },
}

/// A validated engine context plus the encoders bound to it.
#[derive(Debug)]
pub struct SchemeContext {
    scheme: Scheme,
    params: Parameters,
    context: NativeHandle<ContextKind>,
    encoders: Encoders,
    slot_count: usize,
}

fn invalid(err: NativeError) -> HelmError {
    HelmError::InvalidParameters(err.message)
}

impl SchemeContext {
    /// Build the engine context for `scheme` and its encoders.
    ///
    /// Fails with [`HelmError::InvalidParameters`] carrying the engine's own
    /// diagnostic when the parameters are rejected.
    pub fn initialize(engine: Arc<dyn NativeEngine>, scheme: Scheme, params: &Parameters) -> Result<Self> {
        let mut parameters = NativeHandle::<ParametersKind>::acquire(
            engine.clone(),
            engine.parameters_create(scheme.into())?,
        )?;
        engine
            .parameters_set_poly_degree(parameters.raw()?, params.poly_degree)
            .map_err(invalid)?;

        let raw_coeff = match &params.coeff_modulus {
            CoeffModulus::Default(hint) => engine.coeff_modulus_default(*hint, params.security_level),
            CoeffModulus::BitSizes(sizes) => engine.coeff_modulus_create(params.poly_degree, sizes),
        }
        .map_err(invalid)?;
        let mut coeff = NativeHandle::<CoeffModulusKind>::acquire(engine.clone(), raw_coeff)?;
        engine
            .parameters_set_coeff_modulus(parameters.raw()?, coeff.raw()?)
            .map_err(invalid)?;

        if scheme == Scheme::Integer {
            let mut plain = SmallModulus::new(engine.clone(), params.plain_modulus)?;
            engine
                .parameters_set_plain_modulus(parameters.raw()?, plain.handle().raw()?)
                .map_err(invalid)?;
            plain.release();
        }

        let context = NativeHandle::<ContextKind>::acquire(
            engine.clone(),
            engine.context_create(parameters.raw()?, true, params.security_level)?,
        )?;
        coeff.release();
        parameters.release();

        if !engine.context_parameters_set(context.raw()?)? {
            let diagnostic = engine.context_diagnostic(context.raw()?)?;
            debug!(%scheme, %diagnostic, "engine rejected parameters");
            return Err(HelmError::InvalidParameters(diagnostic));
        }

        let encoders = match scheme {
            Scheme::Integer => Encoders::Integer {
                integer: NativeHandle::acquire(engine.clone(), engine.integer_encoder_create(context.raw()?)?)?,
                batch: NativeHandle::acquire(engine.clone(), engine.batch_encoder_create(context.raw()?)?)?,
            },
            Scheme::ApproxReal => Encoders::ApproxReal {
                real: NativeHandle::acquire(engine.clone(), engine.real_encoder_create(context.raw()?)?)?,
            },
        };
        let slot_count = match &encoders {
            Encoders::Integer { batch, .. } => engine.encoder_slot_count(batch.raw()?)?,
            Encoders::ApproxReal { real } => engine.encoder_slot_count(real.raw()?)?,
        };

        info!(%scheme, poly_degree = params.poly_degree, slot_count, "scheme context ready");
        Ok(Self { scheme, params: params.clone(), context, encoders, slot_count })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn engine(&self) -> &Arc<dyn NativeEngine> {
        self.context.engine()
    }

    pub fn context(&self) -> &NativeHandle<ContextKind> {
        &self.context
    }

    /// Largest input accepted by one ciphertext: the polynomial degree.
    pub fn capacity(&self) -> usize {
        self.params.poly_degree
    }

    /// Slots of the active encoder. Complex slots for the real-number scheme.
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Plaintext modulus, only meaningful for the integer scheme.
    pub fn plain_modulus(&self) -> Option<u64> {
        match self.scheme {
            Scheme::Integer => Some(self.params.plain_modulus),
            Scheme::ApproxReal => None,
        }
    }

    pub fn scale(&self) -> f64 {
        self.params.scale
    }

    pub fn batch_encoder(&self) -> Result<&NativeHandle<BatchEncoderKind>> {
        match &self.encoders {
            Encoders::Integer { batch, .. } => Ok(batch),
            Encoders::ApproxReal { .. } => Err(HelmError::SchemeMismatch {
                expected: Scheme::Integer,
                found: self.scheme,
            }),
        }
    }

    pub fn integer_encoder(&self) -> Result<&NativeHandle<IntegerEncoderKind>> {
        match &self.encoders {
            Encoders::Integer { integer, .. } => Ok(integer),
            Encoders::ApproxReal { .. } => Err(HelmError::SchemeMismatch {
                expected: Scheme::Integer,
                found: self.scheme,
            }),
        }
    }

    pub fn real_encoder(&self) -> Result<&NativeHandle<RealEncoderKind>> {
        match &self.encoders {
            Encoders::ApproxReal { real } => Ok(real),
            Encoders::Integer { .. } => Err(HelmError::SchemeMismatch {
                expected: Scheme::ApproxReal,
                found: self.scheme,
            }),
        }
    }

    /// Release the encoders and the context.
    pub fn release(&mut self) {
        match &mut self.encoders {
            Encoders::Integer { batch, integer } => {
                batch.release();
                integer.release();
            }
            Encoders::ApproxReal { real } => real.release(),
        }
        self.context.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SoftEngine;
    use crate::native::SecurityLevel;
    use crate::params::{preset_for, SecurityTier};

    fn engine() -> Arc<dyn NativeEngine> {
        Arc::new(SoftEngine::with_seed(21))
    }

    fn toy_params() -> Parameters {
        Parameters::builder()
            .poly_degree(1024)
            .coeff_bit_sizes([27])
            .plain_modulus(12289)
            .build()
            .unwrap()
    }

    #[test]
    fn integer_context_owns_two_encoders() {
        let engine = engine();
        let ctx = SchemeContext::initialize(engine.clone(), Scheme::Integer, &toy_params()).unwrap();
        assert_eq!(ctx.scheme(), Scheme::Integer);
        assert_eq!(ctx.slot_count(), 1024);
        assert_eq!(ctx.capacity(), 1024);
        assert_eq!(ctx.plain_modulus(), Some(12289));
        assert!(ctx.real_encoder().is_err());
        // context + batch encoder + integer encoder
        assert_eq!(engine.live_objects(), 3);
        drop(ctx);
        assert_eq!(engine.live_objects(), 0);
    }

    #[test]
    fn real_context_uses_complex_slots() {
        let engine = engine();
        let params = Parameters::builder()
            .poly_degree(2048)
            .coeff_bit_sizes([30, 24])
            .scale(2f64.powi(24))
            .build()
            .unwrap();
        let mut ctx = SchemeContext::initialize(engine.clone(), Scheme::ApproxReal, &params).unwrap();
        assert_eq!(ctx.slot_count(), 1024);
        assert_eq!(ctx.capacity(), 2048);
        assert_eq!(ctx.plain_modulus(), None);
        assert!(ctx.batch_encoder().is_err());
        assert_eq!(engine.live_objects(), 2);
        ctx.release();
        ctx.release();
        assert_eq!(engine.live_objects(), 0);
    }

    #[test]
    fn rejection_carries_engine_diagnostic() {
        let engine = engine();
        let params = Parameters::builder()
            .poly_degree(1024)
            .coeff_bit_sizes([27])
            .plain_modulus(1 << 40)
            .build()
            .unwrap();
        let err = SchemeContext::initialize(engine.clone(), Scheme::Integer, &params).unwrap_err();
        match err {
            HelmError::InvalidParameters(message) => assert_eq!(message, "plain_modulus is not smaller than coeff_modulus"),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(engine.live_objects(), 0);
    }

    #[test]
    fn oversized_modulus_fails_security_check() {
        let engine = engine();
        let params = Parameters::builder()
            .poly_degree(1024)
            .coeff_bit_sizes([40])
            .security_level(SecurityLevel::Tc128)
            .build()
            .unwrap();
        assert!(matches!(
            SchemeContext::initialize(engine, Scheme::ApproxReal, &params),
            Err(HelmError::InvalidParameters(_))
        ));
    }

    #[test]
    fn low_tier_preset_initializes_both_schemes() {
        let engine = engine();
        let params = preset_for(SecurityTier::Low);
        let integer = SchemeContext::initialize(engine.clone(), Scheme::Integer, &params).unwrap();
        assert_eq!(integer.slot_count(), 4096);
        let real = SchemeContext::initialize(engine, Scheme::ApproxReal, &params).unwrap();
        assert_eq!(real.slot_count(), 2048);
    }
}

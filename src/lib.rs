//! # Helm: Homomorphic Encryption Lifecycle Manager
//!
//! An orchestration layer over a homomorphic-encryption engine. Helm picks
//! parameters, owns every native object through a handle that is released
//! exactly once, generates and persists key material, and routes values
//! through one of two pipelines:
//!
//! - [`Scheme::Integer`] (BFV): exact arithmetic on integers modulo a
//!   plaintext modulus, batch-encoded one value per slot.
//! - [`Scheme::ApproxReal`] (CKKS): approximate arithmetic on reals encoded
//!   at a scale.
//!
//! The cryptography lives behind the [`native::NativeEngine`] trait. The crate
//! ships [`engine::SoftEngine`], a pure-Rust RLWE engine over `concrete-ntt`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use helm::prelude::*;
//!
//! let mut helm = Orchestrator::new();
//! helm.initialize(Scheme::Integer, &preset_for(SecurityTier::Low))?;
//! helm.generate_keys()?;
//!
//! let values: Vec<i64> = (0..4096).collect();
//! let cipher_text = helm.encrypt(values.clone())?;
//! assert_eq!(helm.decrypt_as::<i64>(&cipher_text)?, values);
//!
//! // Keys survive a trip through their text form.
//! let secret = helm.save_secret_key()?;
//! helm.load_secret_key(&secret)?;
//! # Ok::<(), helm::HelmError>(())
//! ```

pub mod ciphertext;
pub mod context;
pub mod engine;
pub mod error;
pub mod handle;
pub mod keys;
pub mod native;
pub mod orchestrator;
pub mod params;
pub mod pipeline;
pub mod vector;

pub use error::{HelmError, Result};

/// Convenient re-exports for common types and functions.
pub mod prelude {
    pub use crate::ciphertext::{CipherText, CipherTextMeta, PlainText};
    pub use crate::context::{Scheme, SchemeContext};
    pub use crate::engine::SoftEngine;
    pub use crate::error::{HelmError, Result};
    pub use crate::handle::{NativeHandle, SmallModulus};
    pub use crate::keys::{DecompositionBitCount, KeyKind, RelinKeyOptions, RotationKeyOptions};
    pub use crate::native::{ComprMode, NativeEngine, SecurityLevel};
    pub use crate::orchestrator::{Orchestrator, OrchestratorConfig};
    pub use crate::params::{preset_for, CoeffModulus, Parameters, SecurityTier};
    pub use crate::pipeline::EncryptOptions;
    pub use crate::vector::{render_matrix, render_vector, Element, ElementType, HostArray};
}

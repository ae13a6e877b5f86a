use thiserror::Error;

use crate::context::Scheme;
use crate::native::{NativeError, ObjectKind};
use crate::vector::ElementType;

#[derive(Debug, Error)]
pub enum HelmError {
    #[error("invalid encryption parameters: {0}")]
    InvalidParameters(String),

    #[error("no {kind} generated or loaded")]
    UninitializedKey { kind: crate::keys::KeyKind },

    #[error("{kind} handle used after release")]
    UseAfterRelease { kind: ObjectKind },

    #[error("input of length {len} exceeds the polynomial degree {capacity}")]
    OversizedInput { len: usize, capacity: usize },

    #[error("ciphertext was produced by the {found} scheme, active scheme is {expected}")]
    SchemeMismatch { expected: Scheme, found: Scheme },

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("native operation failed: {0}")]
    NativeOperation(String),

    #[error("no scheme context; call initialize first")]
    NotInitialized,

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("the {scheme} scheme cannot encrypt {element_type} elements")]
    UnsupportedElementType { scheme: Scheme, element_type: ElementType },

    #[error("element type mismatch: expected {expected}, found {found}")]
    ElementTypeMismatch { expected: ElementType, found: ElementType },
}

impl From<NativeError> for HelmError {
    fn from(err: NativeError) -> Self {
        HelmError::NativeOperation(err.message)
    }
}

pub type Result<T> = std::result::Result<T, HelmError>;

//! The boundary between the orchestrator and a homomorphic-encryption engine.
//!
//! An engine owns every cryptographic object (moduli, contexts, keys,
//! plaintexts, ciphertexts) and hands out opaque [`ObjectId`]s. The
//! orchestrator never looks inside an object; it only routes ids between
//! engine calls and owns them through [`crate::handle::NativeHandle`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vector::{ElementType, HostArray};

/// Failure reported by an engine. The message is passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct NativeError {
    pub message: String,
}

impl NativeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// Opaque identifier of one object living inside an engine.
///
/// Deliberately neither `Clone` nor `Copy`: whoever holds the id owns the
/// object, and handing it to [`NativeEngine::destroy`] consumes it.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Mint an id. Only engines should call this, once per created object.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of an engine object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Modulus,
    CoeffModulus,
    Parameters,
    Context,
    BatchEncoder,
    IntegerEncoder,
    RealEncoder,
    KeyGenerator,
    PublicKey,
    SecretKey,
    RelinKeys,
    GaloisKeys,
    Encryptor,
    Decryptor,
    Plaintext,
    Ciphertext,
}

impl ObjectKind {
    const ALL: [ObjectKind; 16] = [
        ObjectKind::Modulus,
        ObjectKind::CoeffModulus,
        ObjectKind::Parameters,
        ObjectKind::Context,
        ObjectKind::BatchEncoder,
        ObjectKind::IntegerEncoder,
        ObjectKind::RealEncoder,
        ObjectKind::KeyGenerator,
        ObjectKind::PublicKey,
        ObjectKind::SecretKey,
        ObjectKind::RelinKeys,
        ObjectKind::GaloisKeys,
        ObjectKind::Encryptor,
        ObjectKind::Decryptor,
        ObjectKind::Plaintext,
        ObjectKind::Ciphertext,
    ];

    /// Stable one-byte code used by persisted blobs.
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            ObjectKind::Modulus => "modulus",
            ObjectKind::CoeffModulus => "coefficient modulus",
            ObjectKind::Parameters => "encryption parameters",
            ObjectKind::Context => "context",
            ObjectKind::BatchEncoder => "batch encoder",
            ObjectKind::IntegerEncoder => "integer encoder",
            ObjectKind::RealEncoder => "real-number encoder",
            ObjectKind::KeyGenerator => "key generator",
            ObjectKind::PublicKey => "public key",
            ObjectKind::SecretKey => "secret key",
            ObjectKind::RelinKeys => "relinearization keys",
            ObjectKind::GaloisKeys => "galois keys",
            ObjectKind::Encryptor => "encryptor",
            ObjectKind::Decryptor => "decryptor",
            ObjectKind::Plaintext => "plaintext",
            ObjectKind::Ciphertext => "ciphertext",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Engine-level scheme selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemeType {
    Bfv,
    Ckks,
}

impl fmt::Display for SchemeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemeType::Bfv => f.write_str("BFV"),
            SchemeType::Ckks => f.write_str("CKKS"),
        }
    }
}

/// Compression applied to persisted objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComprMode {
    None,
    #[default]
    Deflate,
}

impl ComprMode {
    pub fn code(self) -> u8 {
        match self {
            ComprMode::None => 0,
            ComprMode::Deflate => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ComprMode::None),
            1 => Some(ComprMode::Deflate),
            _ => None,
        }
    }
}

/// Bound on the total coefficient-modulus size enforced by a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SecurityLevel {
    /// No bound. Useful for toy parameters in tests.
    None,
    #[default]
    Tc128,
    Tc192,
    Tc256,
}

/// Contract every homomorphic-encryption engine provides.
///
/// Calls are synchronous. Ids passed by reference are borrowed; ids returned
/// are owned by the caller and must eventually reach [`NativeEngine::destroy`].
/// Operations that fill an existing container (`batch_encode`, `encrypt`,
/// `decrypt`, ...) write into the object named by their last id.
pub trait NativeEngine: Send + Sync {
    fn destroy(&self, id: ObjectId) -> NativeResult<()>;
    fn kind_of(&self, id: &ObjectId) -> NativeResult<ObjectKind>;
    /// Number of objects currently alive in the engine.
    fn live_objects(&self) -> usize;

    fn modulus_create(&self, value: u64) -> NativeResult<ObjectId>;
    fn modulus_set_value(&self, modulus: &ObjectId, value: u64) -> NativeResult<()>;
    fn modulus_value(&self, modulus: &ObjectId) -> NativeResult<u64>;
    fn modulus_bit_count(&self, modulus: &ObjectId) -> NativeResult<u32>;
    fn modulus_is_zero(&self, modulus: &ObjectId) -> NativeResult<bool>;
    fn modulus_is_prime(&self, modulus: &ObjectId) -> NativeResult<bool>;
    /// Recommended coefficient-modulus chain for `poly_degree` at `level`.
    fn coeff_modulus_default(
        &self,
        poly_degree: usize,
        level: SecurityLevel,
    ) -> NativeResult<ObjectId>;
    /// Distinct NTT-friendly primes with the requested bit sizes.
    fn coeff_modulus_create(&self, poly_degree: usize, bit_sizes: &[u32])
        -> NativeResult<ObjectId>;

    fn parameters_create(&self, scheme: SchemeType) -> NativeResult<ObjectId>;
    fn parameters_set_poly_degree(&self, parameters: &ObjectId, degree: usize)
        -> NativeResult<()>;
    fn parameters_set_coeff_modulus(
        &self,
        parameters: &ObjectId,
        coeff_modulus: &ObjectId,
    ) -> NativeResult<()>;
    fn parameters_set_plain_modulus(&self, parameters: &ObjectId, modulus: &ObjectId)
        -> NativeResult<()>;

    /// Build a context. Invalid parameters still yield a context; query
    /// [`NativeEngine::context_parameters_set`] to find out.
    fn context_create(
        &self,
        parameters: &ObjectId,
        expand_mod_chain: bool,
        level: SecurityLevel,
    ) -> NativeResult<ObjectId>;
    fn context_parameters_set(&self, context: &ObjectId) -> NativeResult<bool>;
    /// Human-readable validation outcome of the context.
    fn context_diagnostic(&self, context: &ObjectId) -> NativeResult<String>;

    fn batch_encoder_create(&self, context: &ObjectId) -> NativeResult<ObjectId>;
    fn integer_encoder_create(&self, context: &ObjectId) -> NativeResult<ObjectId>;
    fn real_encoder_create(&self, context: &ObjectId) -> NativeResult<ObjectId>;
    fn encoder_slot_count(&self, encoder: &ObjectId) -> NativeResult<usize>;
    fn batch_encode(
        &self,
        encoder: &ObjectId,
        values: &HostArray,
        plaintext: &ObjectId,
    ) -> NativeResult<()>;
    fn batch_decode(
        &self,
        encoder: &ObjectId,
        plaintext: &ObjectId,
        element_type: ElementType,
    ) -> NativeResult<HostArray>;
    fn real_encode(
        &self,
        encoder: &ObjectId,
        values: &HostArray,
        scale: f64,
        plaintext: &ObjectId,
    ) -> NativeResult<()>;
    fn real_decode(
        &self,
        encoder: &ObjectId,
        plaintext: &ObjectId,
        element_type: ElementType,
    ) -> NativeResult<HostArray>;
    fn integer_encode(&self, encoder: &ObjectId, value: i64, plaintext: &ObjectId)
        -> NativeResult<()>;
    fn integer_decode(&self, encoder: &ObjectId, plaintext: &ObjectId) -> NativeResult<i64>;

    fn key_generator_create(&self, context: &ObjectId) -> NativeResult<ObjectId>;
    fn key_generator_from_secret(&self, context: &ObjectId, secret_key: &ObjectId)
        -> NativeResult<ObjectId>;
    fn key_generator_public_key(&self, generator: &ObjectId) -> NativeResult<ObjectId>;
    fn key_generator_secret_key(&self, generator: &ObjectId) -> NativeResult<ObjectId>;
    fn key_generator_relin_keys(
        &self,
        generator: &ObjectId,
        decomposition_bit_count: u32,
        count: usize,
    ) -> NativeResult<ObjectId>;
    fn key_generator_galois_keys(
        &self,
        generator: &ObjectId,
        decomposition_bit_count: u32,
    ) -> NativeResult<ObjectId>;

    fn encryptor_create(&self, context: &ObjectId, public_key: &ObjectId)
        -> NativeResult<ObjectId>;
    fn encrypt(&self, encryptor: &ObjectId, plaintext: &ObjectId, ciphertext: &ObjectId)
        -> NativeResult<()>;
    fn decryptor_create(&self, context: &ObjectId, secret_key: &ObjectId)
        -> NativeResult<ObjectId>;
    fn decrypt(&self, decryptor: &ObjectId, ciphertext: &ObjectId, plaintext: &ObjectId)
        -> NativeResult<()>;
    fn plaintext_create(&self) -> NativeResult<ObjectId>;
    fn ciphertext_create(&self) -> NativeResult<ObjectId>;

    /// Persist an object as a portable text blob.
    fn save(&self, id: &ObjectId, mode: ComprMode) -> NativeResult<String>;
    /// Rebuild an object of `kind` from a blob into a fresh object.
    /// Context-bound kinds are validated against `context`.
    fn load(
        &self,
        context: Option<&ObjectId>,
        kind: ObjectKind,
        encoded: &str,
    ) -> NativeResult<ObjectId>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_kind_codes_are_stable() {
        for kind in ObjectKind::ALL {
            assert_eq!(ObjectKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(ObjectKind::from_code(16), None);
        assert_eq!(ObjectKind::PublicKey.code(), 8);
    }

    #[test]
    fn compression_codes() {
        assert_eq!(ComprMode::default(), ComprMode::Deflate);
        assert_eq!(ComprMode::from_code(ComprMode::None.code()), Some(ComprMode::None));
        assert_eq!(ComprMode::from_code(7), None);
    }

    #[test]
    fn native_error_displays_message_verbatim() {
        let err = NativeError::new("plain_modulus is not prime");
        assert_eq!(err.to_string(), "plain_modulus is not prime");
    }
}

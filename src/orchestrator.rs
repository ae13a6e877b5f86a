//! The public entry point: one scheme context, its keys, and the pipelines.

use std::sync::Arc;

use tracing::{debug, info};

use crate::ciphertext::{CipherText, CipherTextMeta, PlainText};
use crate::context::{Scheme, SchemeContext};
use crate::engine::SoftEngine;
use crate::error::{HelmError, Result};
use crate::handle::{CiphertextKind, NativeHandle, PlaintextKind};
use crate::keys::{KeyKind, RelinKeyOptions, RotationKeyOptions};
use crate::native::{ComprMode, NativeEngine, ObjectKind};
use crate::params::Parameters;
use crate::pipeline::{self, EncryptOptions, SessionState};
use crate::vector::{Element, ElementType, HostArray};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrchestratorConfig {
    /// Compression used by every `save_*` call.
    pub compression: ComprMode,
}

/// Owns one scheme context and the key material bound to it.
///
/// ```no_run
/// use helm::prelude::*;
///
/// let mut helm = Orchestrator::new();
/// helm.initialize(Scheme::Integer, &preset_for(SecurityTier::Low))?;
/// helm.generate_keys()?;
///
/// let cipher_text = helm.encrypt(vec![1i64, 2, 3])?;
/// assert_eq!(helm.decrypt_as::<i64>(&cipher_text)?, vec![1, 2, 3]);
/// # Ok::<(), helm::HelmError>(())
/// ```
pub struct Orchestrator {
    engine: Arc<dyn NativeEngine>,
    config: OrchestratorConfig,
    session: Option<SessionState>,
}

impl Orchestrator {
    /// Orchestrator over a fresh [`SoftEngine`].
    pub fn new() -> Self {
        Self::with_engine(Arc::new(SoftEngine::new()))
    }

    pub fn with_engine(engine: Arc<dyn NativeEngine>) -> Self {
        Self { engine, config: OrchestratorConfig::default(), session: None }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn engine(&self) -> &Arc<dyn NativeEngine> {
        &self.engine
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    fn session(&self) -> Result<&SessionState> {
        self.session.as_ref().ok_or(HelmError::NotInitialized)
    }

    fn session_mut(&mut self) -> Result<&mut SessionState> {
        self.session.as_mut().ok_or(HelmError::NotInitialized)
    }

    /// Build a context for `scheme`. Any previous context and the keys bound
    /// to it are released first, even if the new parameters are rejected.
    pub fn initialize(&mut self, scheme: Scheme, params: &Parameters) -> Result<()> {
        if let Some(mut previous) = self.session.take() {
            debug!(scheme = %previous.context.scheme(), "discarding previous context");
            previous.release();
        }
        let context = SchemeContext::initialize(self.engine.clone(), scheme, params)?;
        self.session = Some(SessionState::new(context));
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    pub fn scheme(&self) -> Option<Scheme> {
        self.session.as_ref().map(|session| session.context.scheme())
    }

    pub fn parameters(&self) -> Result<&Parameters> {
        Ok(self.session()?.context.parameters())
    }

    /// Maximum number of values per ciphertext.
    pub fn capacity(&self) -> Result<usize> {
        Ok(self.session()?.context.capacity())
    }

    pub fn slot_count(&self) -> Result<usize> {
        Ok(self.session()?.context.slot_count())
    }

    /// Plaintext modulus of the integer scheme, `None` for the real-number scheme.
    pub fn plain_modulus(&self) -> Result<Option<u64>> {
        Ok(self.session()?.context.plain_modulus())
    }

    pub fn has_key(&self, kind: KeyKind) -> bool {
        self.session.as_ref().is_some_and(|session| session.keys.has(kind))
    }

    pub fn generate_keys(&mut self) -> Result<()> {
        let session = self.session_mut()?;
        session.keys.generate(&session.context)
    }

    pub fn generate_relin_keys(&mut self, options: RelinKeyOptions) -> Result<()> {
        let session = self.session_mut()?;
        session.keys.generate_relin(&session.context, options)
    }

    pub fn generate_rotation_keys(&mut self, options: RotationKeyOptions) -> Result<()> {
        let session = self.session_mut()?;
        session.keys.generate_rotation(&session.context, options)
    }

    fn load_key(&mut self, kind: KeyKind, encoded: &str) -> Result<()> {
        let session = self.session_mut()?;
        session.keys.load(&session.context, kind, encoded)
    }

    pub fn load_public_key(&mut self, encoded: &str) -> Result<()> {
        self.load_key(KeyKind::Public, encoded)
    }

    pub fn load_secret_key(&mut self, encoded: &str) -> Result<()> {
        self.load_key(KeyKind::Secret, encoded)
    }

    pub fn load_relin_keys(&mut self, encoded: &str) -> Result<()> {
        self.load_key(KeyKind::Relinearization, encoded)
    }

    pub fn load_rotation_keys(&mut self, encoded: &str) -> Result<()> {
        self.load_key(KeyKind::Rotation, encoded)
    }

    /// Serialize the key of `kind` with an explicit compression mode.
    pub fn save_key_with(&self, kind: KeyKind, mode: ComprMode) -> Result<String> {
        let session = self.session()?;
        session.keys.save(&session.context, kind, mode)
    }

    pub fn save_public_key(&self) -> Result<String> {
        self.save_key_with(KeyKind::Public, self.config.compression)
    }

    pub fn save_secret_key(&self) -> Result<String> {
        self.save_key_with(KeyKind::Secret, self.config.compression)
    }

    pub fn save_relin_keys(&self) -> Result<String> {
        self.save_key_with(KeyKind::Relinearization, self.config.compression)
    }

    pub fn save_rotation_keys(&self) -> Result<String> {
        self.save_key_with(KeyKind::Rotation, self.config.compression)
    }

    /// Encode and encrypt a scalar or an array. Scalars become one-element arrays.
    pub fn encrypt(&self, value: impl Into<HostArray>) -> Result<CipherText> {
        self.encrypt_with(value, EncryptOptions::default())
    }

    pub fn encrypt_with(&self, value: impl Into<HostArray>, options: EncryptOptions) -> Result<CipherText> {
        pipeline::encrypt(self.session()?, &value.into(), &options)
    }

    /// Decrypt and decode, returning exactly as many values as were encrypted.
    pub fn decrypt(&self, cipher_text: &CipherText) -> Result<HostArray> {
        pipeline::decrypt(self.session()?, cipher_text)
    }

    /// [`Orchestrator::decrypt`] into a `Vec<T>`. `T` must be the element
    /// type the ciphertext was encrypted from.
    pub fn decrypt_as<T: Element>(&self, cipher_text: &CipherText) -> Result<Vec<T>> {
        if cipher_text.element_type() != T::TYPE {
            return Err(HelmError::ElementTypeMismatch { expected: T::TYPE, found: cipher_text.element_type() });
        }
        self.decrypt(cipher_text)?.into_vec()
    }

    /// Encode one integer as a polynomial with the integer encoder.
    pub fn encode_integer(&self, value: i64) -> Result<PlainText> {
        let ctx = &self.session()?.context;
        let encoder = ctx.integer_encoder().map_err(|_| HelmError::UnsupportedElementType {
            scheme: ctx.scheme(),
            element_type: ElementType::Int64,
        })?;
        let engine = ctx.engine();
        let plaintext = NativeHandle::<PlaintextKind>::acquire(engine.clone(), engine.plaintext_create()?)?;
        engine.integer_encode(encoder.raw()?, value, plaintext.raw()?)?;
        Ok(PlainText::new(plaintext))
    }

    pub fn decode_integer(&self, plain_text: &PlainText) -> Result<i64> {
        let ctx = &self.session()?.context;
        let encoder = ctx.integer_encoder().map_err(|_| HelmError::UnsupportedElementType {
            scheme: ctx.scheme(),
            element_type: ElementType::Int64,
        })?;
        Ok(ctx.engine().integer_decode(encoder.raw()?, plain_text.handle().raw()?)?)
    }

    /// Serialize a ciphertext. Its metadata is not part of the blob; keep
    /// [`CipherText::meta`] alongside it.
    pub fn save_ciphertext(&self, cipher_text: &CipherText) -> Result<String> {
        let session = self.session()?;
        session
            .context
            .engine()
            .save(cipher_text.raw()?, self.config.compression)
            .map_err(|err| HelmError::Serialization(err.message))
    }

    /// Rebuild a ciphertext saved by [`Orchestrator::save_ciphertext`].
    pub fn load_ciphertext(&self, encoded: &str, meta: CipherTextMeta) -> Result<CipherText> {
        let ctx = &self.session()?.context;
        if meta.scheme != ctx.scheme() {
            return Err(HelmError::SchemeMismatch { expected: ctx.scheme(), found: meta.scheme });
        }
        if meta.len > ctx.capacity() {
            return Err(HelmError::OversizedInput { len: meta.len, capacity: ctx.capacity() });
        }
        let engine = ctx.engine();
        let raw = engine
            .load(Some(ctx.context().raw()?), ObjectKind::Ciphertext, encoded)
            .map_err(|err| HelmError::Serialization(err.message))?;
        let handle = NativeHandle::<CiphertextKind>::acquire(engine.clone(), raw)?;
        Ok(CipherText::new(handle, meta))
    }

    /// Release the context and every key. The orchestrator must be
    /// initialized again before further use.
    pub fn release(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.release();
            info!("released orchestrator session");
        }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

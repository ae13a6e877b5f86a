//! Scheme-dispatched encode → encrypt and decrypt → decode pipelines.
//!
//! The integer scheme goes through the batch encoder and is exact. The
//! real-number scheme goes through the real encoder at a scale and is
//! approximate. Both are driven by [`encrypt`] and [`decrypt`], which own the
//! checks common to every scheme and the temporary engine objects.

use tracing::{debug, trace};

use crate::ciphertext::{CipherText, CipherTextMeta};
use crate::context::{Scheme, SchemeContext};
use crate::error::{HelmError, Result};
use crate::handle::{CiphertextKind, NativeHandle, PlaintextKind};
use crate::keys::KeyStore;
use crate::native::ObjectId;
use crate::vector::{render_matrix, render_vector, ElementType, HostArray, DEFAULT_PRECISION, DEFAULT_PRINT_SIZE};

/// Per-call overrides for [`encrypt`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EncryptOptions {
    /// Encoding scale for the real-number scheme. Defaults to the context scale.
    pub scale: Option<f64>,
}

impl EncryptOptions {
    fn resolve_scale(&self, ctx: &SchemeContext) -> Result<f64> {
        match self.scale {
            None => Ok(ctx.scale()),
            Some(scale) if scale.is_finite() && scale > 0.0 => Ok(scale),
            Some(scale) => Err(HelmError::InvalidOption(format!("scale must be positive, got {scale}"))),
        }
    }
}

/// Everything one orchestrator session owns: the context and the keys bound to it.
#[derive(Debug)]
pub struct SessionState {
    pub context: SchemeContext,
    pub keys: KeyStore,
}

impl SessionState {
    pub fn new(context: SchemeContext) -> Self {
        Self { context, keys: KeyStore::new() }
    }

    /// Release keys first, then the context they belong to.
    pub fn release(&mut self) {
        self.keys.release();
        self.context.release();
    }
}

/// One scheme's encoding stage.
pub trait SchemePipeline: Sync {
    fn scheme(&self) -> Scheme;

    fn supports(&self, element_type: ElementType) -> bool;

    /// Encode `values` into the existing plaintext object `plaintext`.
    fn encode(
        &self,
        session: &SessionState,
        values: &HostArray,
        options: &EncryptOptions,
        plaintext: &ObjectId,
    ) -> Result<()>;

    /// Decode `plaintext` into a full-capacity array of `element_type`.
    fn decode(&self, session: &SessionState, plaintext: &ObjectId, element_type: ElementType) -> Result<HostArray>;
}

/// Exact integer pipeline over the batch encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchPipeline;

impl SchemePipeline for BatchPipeline {
    fn scheme(&self) -> Scheme {
        Scheme::Integer
    }

    fn supports(&self, element_type: ElementType) -> bool {
        element_type.is_integer()
    }

    fn encode(&self, session: &SessionState, values: &HostArray, _: &EncryptOptions, plaintext: &ObjectId) -> Result<()> {
        let ctx = &session.context;
        let encoder = ctx.batch_encoder()?.raw()?;
        Ok(ctx.engine().batch_encode(encoder, values, plaintext)?)
    }

    fn decode(&self, session: &SessionState, plaintext: &ObjectId, element_type: ElementType) -> Result<HostArray> {
        let ctx = &session.context;
        let encoder = ctx.batch_encoder()?.raw()?;
        let values = ctx.engine().batch_decode(encoder, plaintext, element_type)?;
        // Batched slots form a 2 x (N/2) matrix.
        trace!(slots = %render_matrix(&values, ctx.slot_count() / 2, DEFAULT_PRINT_SIZE), "decoded batch");
        Ok(values)
    }
}

/// Approximate pipeline over the real-number encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealPipeline;

impl SchemePipeline for RealPipeline {
    fn scheme(&self) -> Scheme {
        Scheme::ApproxReal
    }

    fn supports(&self, _: ElementType) -> bool {
        true
    }

    fn encode(
        &self,
        session: &SessionState,
        values: &HostArray,
        options: &EncryptOptions,
        plaintext: &ObjectId,
    ) -> Result<()> {
        let ctx = &session.context;
        let scale = options.resolve_scale(ctx)?;
        let encoder = ctx.real_encoder()?.raw()?;
        Ok(ctx.engine().real_encode(encoder, values, scale, plaintext)?)
    }

    fn decode(&self, session: &SessionState, plaintext: &ObjectId, element_type: ElementType) -> Result<HostArray> {
        let ctx = &session.context;
        let encoder = ctx.real_encoder()?.raw()?;
        Ok(ctx.engine().real_decode(encoder, plaintext, element_type)?)
    }
}

pub fn pipeline_for(scheme: Scheme) -> &'static dyn SchemePipeline {
    match scheme {
        Scheme::Integer => &BatchPipeline,
        Scheme::ApproxReal => &RealPipeline,
    }
}

/// Encode and encrypt `values` under the session's public key.
///
/// Length and element type are checked before the engine is touched. The
/// intermediate plaintext is always released; on failure so is the ciphertext.
pub fn encrypt(session: &SessionState, values: &HostArray, options: &EncryptOptions) -> Result<CipherText> {
    let ctx = &session.context;
    let capacity = ctx.capacity();
    if values.len() > capacity {
        return Err(HelmError::OversizedInput { len: values.len(), capacity });
    }
    let pipeline = pipeline_for(ctx.scheme());
    let element_type = values.element_type();
    if !pipeline.supports(element_type) {
        return Err(HelmError::UnsupportedElementType { scheme: pipeline.scheme(), element_type });
    }
    let encryptor = session.keys.encryptor()?.raw()?;
    trace!(
        values = %render_vector(values, DEFAULT_PRINT_SIZE, DEFAULT_PRECISION),
        "encrypting"
    );

    let engine = ctx.engine();
    let mut plaintext = NativeHandle::<PlaintextKind>::acquire(engine.clone(), engine.plaintext_create()?)?;
    pipeline.encode(session, values, options, plaintext.raw()?)?;
    let ciphertext = NativeHandle::<CiphertextKind>::acquire(engine.clone(), engine.ciphertext_create()?)?;
    engine.encrypt(encryptor, plaintext.raw()?, ciphertext.raw()?)?;
    plaintext.release();

    let meta = CipherTextMeta { len: values.len(), element_type, scheme: pipeline.scheme() };
    debug!(scheme = %meta.scheme, len = meta.len, %element_type, "encrypted");
    Ok(CipherText::new(ciphertext, meta))
}

/// Decrypt and decode `cipher_text`, truncated to its recorded length.
pub fn decrypt(session: &SessionState, cipher_text: &CipherText) -> Result<HostArray> {
    let ctx = &session.context;
    if cipher_text.scheme() != ctx.scheme() {
        return Err(HelmError::SchemeMismatch { expected: ctx.scheme(), found: cipher_text.scheme() });
    }
    let ciphertext = cipher_text.raw()?;
    let decryptor = session.keys.decryptor()?.raw()?;

    let engine = ctx.engine();
    let mut plaintext = NativeHandle::<PlaintextKind>::acquire(engine.clone(), engine.plaintext_create()?)?;
    engine.decrypt(decryptor, ciphertext, plaintext.raw()?)?;
    let mut values = pipeline_for(ctx.scheme()).decode(session, plaintext.raw()?, cipher_text.element_type())?;
    plaintext.release();

    values.truncate(cipher_text.len());
    trace!(
        values = %render_vector(&values, DEFAULT_PRINT_SIZE, DEFAULT_PRECISION),
        "decrypted"
    );
    Ok(values)
}

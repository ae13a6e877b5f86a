//! Key material lifecycle: generation, replacement, persistence.

use std::fmt;

use tracing::{debug, info};

use crate::context::SchemeContext;
use crate::engine::keys::MAX_DECOMPOSITION_BIT_COUNT;
use crate::error::{HelmError, Result};
use crate::handle::{
    DecryptorKind, EncryptorKind, GaloisKeysKind, HandleKind, KeyGeneratorKind, NativeHandle, PublicKeyKind,
    RelinKeysKind, SecretKeyKind,
};
use crate::native::{ComprMode, ObjectId, ObjectKind};

/// The four kinds of key material a session holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Public,
    Secret,
    Relinearization,
    Rotation,
}

impl KeyKind {
    pub fn object_kind(self) -> ObjectKind {
        match self {
            KeyKind::Public => ObjectKind::PublicKey,
            KeyKind::Secret => ObjectKind::SecretKey,
            KeyKind::Relinearization => ObjectKind::RelinKeys,
            KeyKind::Rotation => ObjectKind::GaloisKeys,
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyKind::Public => "public key",
            KeyKind::Secret => "secret key",
            KeyKind::Relinearization => "relinearization keys",
            KeyKind::Rotation => "rotation keys",
        };
        f.write_str(name)
    }
}

/// Bits per digit of the key-switching decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecompositionBitCount {
    /// The largest supported digit, 60 bits.
    #[default]
    Max,
    Bits(u32),
}

impl DecompositionBitCount {
    pub fn resolve(self) -> Result<u32> {
        match self {
            DecompositionBitCount::Max => Ok(MAX_DECOMPOSITION_BIT_COUNT),
            DecompositionBitCount::Bits(bits) if (1..=MAX_DECOMPOSITION_BIT_COUNT).contains(&bits) => Ok(bits),
            DecompositionBitCount::Bits(bits) => Err(HelmError::InvalidOption(format!(
                "decomposition bit count {bits} is outside 1..={MAX_DECOMPOSITION_BIT_COUNT}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelinKeyOptions {
    pub decomposition_bit_count: DecompositionBitCount,
    /// Number of relinearization keys, one per supported ciphertext size above two.
    pub size: usize,
}

impl Default for RelinKeyOptions {
    fn default() -> Self {
        Self { decomposition_bit_count: DecompositionBitCount::Max, size: 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RotationKeyOptions {
    pub decomposition_bit_count: DecompositionBitCount,
}

/// Key slots of one session, plus the key generator, encryptor and decryptor
/// derived from them.
#[derive(Debug, Default)]
pub struct KeyStore {
    generator: Option<NativeHandle<KeyGeneratorKind>>,
    public: Option<NativeHandle<PublicKeyKind>>,
    secret: Option<NativeHandle<SecretKeyKind>>,
    relin: Option<NativeHandle<RelinKeysKind>>,
    rotation: Option<NativeHandle<GaloisKeysKind>>,
    encryptor: Option<NativeHandle<EncryptorKind>>,
    decryptor: Option<NativeHandle<DecryptorKind>>,
}

/// Release whatever `slot` holds, then store `fresh`.
fn replace<K: HandleKind>(slot: &mut Option<NativeHandle<K>>, fresh: NativeHandle<K>) {
    if let Some(mut old) = slot.take() {
        old.release();
    }
    *slot = Some(fresh);
}

fn acquire<K: HandleKind>(ctx: &SchemeContext, raw: ObjectId) -> Result<NativeHandle<K>> {
    NativeHandle::acquire(ctx.engine().clone(), raw)
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, kind: KeyKind) -> bool {
        match kind {
            KeyKind::Public => self.public.is_some(),
            KeyKind::Secret => self.secret.is_some(),
            KeyKind::Relinearization => self.relin.is_some(),
            KeyKind::Rotation => self.rotation.is_some(),
        }
    }

    pub fn encryptor(&self) -> Result<&NativeHandle<EncryptorKind>> {
        self.encryptor.as_ref().ok_or(HelmError::UninitializedKey { kind: KeyKind::Public })
    }

    pub fn decryptor(&self) -> Result<&NativeHandle<DecryptorKind>> {
        self.decryptor.as_ref().ok_or(HelmError::UninitializedKey { kind: KeyKind::Secret })
    }

    fn generator(&self) -> Result<&NativeHandle<KeyGeneratorKind>> {
        self.generator.as_ref().ok_or(HelmError::UninitializedKey { kind: KeyKind::Secret })
    }

    /// Fresh public and secret keys, with an encryptor and decryptor bound to them.
    pub fn generate(&mut self, ctx: &SchemeContext) -> Result<()> {
        let engine = ctx.engine();
        let context = ctx.context().raw()?;
        let generator: NativeHandle<KeyGeneratorKind> = acquire(ctx, engine.key_generator_create(context)?)?;
        let public: NativeHandle<PublicKeyKind> = acquire(ctx, engine.key_generator_public_key(generator.raw()?)?)?;
        let secret: NativeHandle<SecretKeyKind> = acquire(ctx, engine.key_generator_secret_key(generator.raw()?)?)?;
        let encryptor = acquire(ctx, engine.encryptor_create(context, public.raw()?)?)?;
        let decryptor = acquire(ctx, engine.decryptor_create(context, secret.raw()?)?)?;

        replace(&mut self.encryptor, encryptor);
        replace(&mut self.decryptor, decryptor);
        replace(&mut self.public, public);
        replace(&mut self.secret, secret);
        replace(&mut self.generator, generator);
        info!(scheme = %ctx.scheme(), "generated public and secret keys");
        Ok(())
    }

    pub fn generate_relin(&mut self, ctx: &SchemeContext, options: RelinKeyOptions) -> Result<()> {
        let bits = options.decomposition_bit_count.resolve()?;
        if options.size == 0 {
            return Err(HelmError::InvalidOption("relinearization key size must be at least 1".into()));
        }
        let generator = self.generator()?.raw()?;
        let raw = ctx.engine().key_generator_relin_keys(generator, bits, options.size)?;
        replace(&mut self.relin, acquire(ctx, raw)?);
        info!(decomposition_bit_count = bits, size = options.size, "generated relinearization keys");
        Ok(())
    }

    pub fn generate_rotation(&mut self, ctx: &SchemeContext, options: RotationKeyOptions) -> Result<()> {
        let bits = options.decomposition_bit_count.resolve()?;
        let generator = self.generator()?.raw()?;
        let raw = ctx.engine().key_generator_galois_keys(generator, bits)?;
        replace(&mut self.rotation, acquire(ctx, raw)?);
        info!(decomposition_bit_count = bits, "generated rotation keys");
        Ok(())
    }

    /// Deserialize `encoded` against `ctx` and, only if that succeeds,
    /// replace the key of `kind`.
    pub fn load(&mut self, ctx: &SchemeContext, kind: KeyKind, encoded: &str) -> Result<()> {
        let engine = ctx.engine();
        let context = ctx.context().raw()?;
        let raw = engine
            .load(Some(context), kind.object_kind(), encoded)
            .map_err(|err| HelmError::Serialization(err.message))?;

        match kind {
            KeyKind::Public => {
                let public: NativeHandle<PublicKeyKind> = acquire(ctx, raw)?;
                let encryptor = acquire(ctx, engine.encryptor_create(context, public.raw()?)?)?;
                replace(&mut self.encryptor, encryptor);
                replace(&mut self.public, public);
            }
            KeyKind::Secret => {
                let secret: NativeHandle<SecretKeyKind> = acquire(ctx, raw)?;
                let generator = acquire(ctx, engine.key_generator_from_secret(context, secret.raw()?)?)?;
                let decryptor = acquire(ctx, engine.decryptor_create(context, secret.raw()?)?)?;
                replace(&mut self.decryptor, decryptor);
                replace(&mut self.generator, generator);
                replace(&mut self.secret, secret);
            }
            KeyKind::Relinearization => replace(&mut self.relin, acquire(ctx, raw)?),
            KeyKind::Rotation => replace(&mut self.rotation, acquire(ctx, raw)?),
        }
        debug!(%kind, "loaded key material");
        Ok(())
    }

    pub fn save(&self, ctx: &SchemeContext, kind: KeyKind, mode: ComprMode) -> Result<String> {
        let missing = || HelmError::UninitializedKey { kind };
        let raw = match kind {
            KeyKind::Public => self.public.as_ref().ok_or_else(missing)?.raw()?,
            KeyKind::Secret => self.secret.as_ref().ok_or_else(missing)?.raw()?,
            KeyKind::Relinearization => self.relin.as_ref().ok_or_else(missing)?.raw()?,
            KeyKind::Rotation => self.rotation.as_ref().ok_or_else(missing)?.raw()?,
        };
        ctx.engine()
            .save(raw, mode)
            .map_err(|err| HelmError::Serialization(err.message))
    }

    /// Release every key and the objects derived from them.
    pub fn release(&mut self) {
        fn drop_slot<K: HandleKind>(slot: &mut Option<NativeHandle<K>>) {
            if let Some(mut handle) = slot.take() {
                handle.release();
            }
        }
        drop_slot(&mut self.encryptor);
        drop_slot(&mut self.decryptor);
        drop_slot(&mut self.relin);
        drop_slot(&mut self.rotation);
        drop_slot(&mut self.public);
        drop_slot(&mut self.secret);
        drop_slot(&mut self.generator);
    }
}

//! Ownership of engine objects.
//!
//! Every native-backed value in the crate is a [`NativeHandle`]. A handle
//! owns exactly one engine object and destroys it exactly once, either on an
//! explicit [`NativeHandle::release`] or when dropped.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::error::{HelmError, Result};
use crate::native::{ComprMode, NativeEngine, ObjectId, ObjectKind};

/// Type-level tag naming the engine object kind a handle owns.
pub trait HandleKind: 'static {
    const KIND: ObjectKind;
}

macro_rules! handle_kinds {
    ($($marker:ident => $kind:ident),* $(,)?) => {
        $(
            #[derive(Debug)]
            pub enum $marker {}

            impl HandleKind for $marker {
                const KIND: ObjectKind = ObjectKind::$kind;
            }
        )*
    };
}

handle_kinds! {
    ModulusKind => Modulus,
    CoeffModulusKind => CoeffModulus,
    ParametersKind => Parameters,
    ContextKind => Context,
    BatchEncoderKind => BatchEncoder,
    IntegerEncoderKind => IntegerEncoder,
    RealEncoderKind => RealEncoder,
    KeyGeneratorKind => KeyGenerator,
    PublicKeyKind => PublicKey,
    SecretKeyKind => SecretKey,
    RelinKeysKind => RelinKeys,
    GaloisKeysKind => GaloisKeys,
    EncryptorKind => Encryptor,
    DecryptorKind => Decryptor,
    PlaintextKind => Plaintext,
    CiphertextKind => Ciphertext,
}

/// Owner of one engine object of kind `K`.
pub struct NativeHandle<K: HandleKind> {
    engine: Arc<dyn NativeEngine>,
    raw: Option<ObjectId>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: HandleKind> NativeHandle<K> {
    /// Take ownership of `raw`. An object whose kind is not `K` is destroyed
    /// and rejected.
    pub fn acquire(engine: Arc<dyn NativeEngine>, raw: ObjectId) -> Result<Self> {
        check_kind::<K>(engine.as_ref(), raw)
            .map(|raw| Self { engine, raw: Some(raw), _kind: PhantomData })
    }

    /// Borrow the raw id. Fails once the handle has been released.
    pub fn raw(&self) -> Result<&ObjectId> {
        self.raw.as_ref().ok_or(HelmError::UseAfterRelease { kind: K::KIND })
    }

    pub fn is_live(&self) -> bool {
        self.raw.is_some()
    }

    pub fn kind(&self) -> ObjectKind {
        K::KIND
    }

    pub fn engine(&self) -> &Arc<dyn NativeEngine> {
        &self.engine
    }

    /// Replace the owned object with `raw`, releasing the current one first.
    /// A wrong-kind `raw` is destroyed and the current object is kept.
    pub fn inject(&mut self, raw: ObjectId) -> Result<()> {
        let raw = check_kind::<K>(self.engine.as_ref(), raw)?;
        self.release();
        self.raw = Some(raw);
        Ok(())
    }

    /// Destroy the owned object. Releasing twice is a no-op.
    pub fn release(&mut self) {
        if let Some(raw) = self.raw.take() {
            trace!(kind = %K::KIND, id = %raw, "releasing native object");
            if let Err(err) = self.engine.destroy(raw) {
                warn!(kind = %K::KIND, error = %err, "engine failed to destroy object");
            }
        }
    }
}

fn check_kind<K: HandleKind>(engine: &dyn NativeEngine, raw: ObjectId) -> Result<ObjectId> {
    match engine.kind_of(&raw) {
        Ok(kind) if kind == K::KIND => Ok(raw),
        Ok(kind) => {
            let _ = engine.destroy(raw);
            Err(HelmError::NativeOperation(format!(
                "expected a {} object, engine returned a {kind}",
                K::KIND
            )))
        }
        Err(err) => Err(err.into()),
    }
}

impl<K: HandleKind> Drop for NativeHandle<K> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<K: HandleKind> fmt::Debug for NativeHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHandle")
            .field("kind", &K::KIND)
            .field("raw", &self.raw)
            .finish()
    }
}

/// A single modulus value held by the engine, such as a plaintext modulus.
#[derive(Debug)]
pub struct SmallModulus {
    handle: NativeHandle<ModulusKind>,
}

impl SmallModulus {
    pub fn new(engine: Arc<dyn NativeEngine>, value: u64) -> Result<Self> {
        let raw = engine.modulus_create(value)?;
        Ok(Self { handle: NativeHandle::acquire(engine, raw)? })
    }

    /// Rebuild a modulus from a blob produced by [`SmallModulus::save`].
    pub fn from_encoded(engine: Arc<dyn NativeEngine>, encoded: &str) -> Result<Self> {
        let raw = engine
            .load(None, ObjectKind::Modulus, encoded)
            .map_err(|err| HelmError::Serialization(err.message))?;
        Ok(Self { handle: NativeHandle::acquire(engine, raw)? })
    }

    pub fn handle(&self) -> &NativeHandle<ModulusKind> {
        &self.handle
    }

    pub fn value(&self) -> Result<u64> {
        Ok(self.handle.engine().modulus_value(self.handle.raw()?)?)
    }

    pub fn set_value(&mut self, value: u64) -> Result<()> {
        Ok(self.handle.engine().modulus_set_value(self.handle.raw()?, value)?)
    }

    pub fn bit_count(&self) -> Result<u32> {
        Ok(self.handle.engine().modulus_bit_count(self.handle.raw()?)?)
    }

    pub fn is_zero(&self) -> Result<bool> {
        Ok(self.handle.engine().modulus_is_zero(self.handle.raw()?)?)
    }

    pub fn is_prime(&self) -> Result<bool> {
        Ok(self.handle.engine().modulus_is_prime(self.handle.raw()?)?)
    }

    pub fn save(&self, mode: ComprMode) -> Result<String> {
        self.handle
            .engine()
            .save(self.handle.raw()?, mode)
            .map_err(|err| HelmError::Serialization(err.message))
    }

    /// Replace the value with the one stored in `encoded`. On failure the
    /// current value is kept.
    pub fn load(&mut self, encoded: &str) -> Result<()> {
        let raw = self
            .handle
            .engine()
            .load(None, ObjectKind::Modulus, encoded)
            .map_err(|err| HelmError::Serialization(err.message))?;
        self.handle.inject(raw)
    }

    pub fn release(&mut self) {
        self.handle.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SoftEngine;

    fn engine() -> Arc<dyn NativeEngine> {
        Arc::new(SoftEngine::with_seed(7))
    }

    #[test]
    fn release_is_idempotent() {
        let engine = engine();
        let raw = engine.plaintext_create().unwrap();
        let mut handle = NativeHandle::<PlaintextKind>::acquire(engine.clone(), raw).unwrap();
        assert_eq!(engine.live_objects(), 1);

        handle.release();
        assert!(!handle.is_live());
        assert_eq!(engine.live_objects(), 0);

        handle.release();
        assert_eq!(engine.live_objects(), 0);
        assert!(matches!(
            handle.raw(),
            Err(HelmError::UseAfterRelease { kind: ObjectKind::Plaintext })
        ));
    }

    #[test]
    fn drop_releases() {
        let engine = engine();
        {
            let raw = engine.ciphertext_create().unwrap();
            let _handle = NativeHandle::<CiphertextKind>::acquire(engine.clone(), raw).unwrap();
            assert_eq!(engine.live_objects(), 1);
        }
        assert_eq!(engine.live_objects(), 0);
    }

    #[test]
    fn acquire_rejects_wrong_kind_without_leaking() {
        let engine = engine();
        let raw = engine.plaintext_create().unwrap();
        let err = NativeHandle::<CiphertextKind>::acquire(engine.clone(), raw).unwrap_err();
        assert!(matches!(err, HelmError::NativeOperation(_)));
        assert_eq!(engine.live_objects(), 0);
    }

    #[test]
    fn inject_releases_previous_object() {
        let engine = engine();
        let first = engine.plaintext_create().unwrap();
        let mut handle = NativeHandle::<PlaintextKind>::acquire(engine.clone(), first).unwrap();
        let second = engine.plaintext_create().unwrap();
        let second_raw = second.as_raw();
        assert_eq!(engine.live_objects(), 2);

        handle.inject(second).unwrap();
        assert_eq!(engine.live_objects(), 1);
        assert_eq!(handle.raw().unwrap().as_raw(), second_raw);
    }

    #[test]
    fn inject_wrong_kind_keeps_current_object() {
        let engine = engine();
        let raw = engine.plaintext_create().unwrap();
        let mut handle = NativeHandle::<PlaintextKind>::acquire(engine.clone(), raw).unwrap();
        let wrong = engine.ciphertext_create().unwrap();

        assert!(handle.inject(wrong).is_err());
        assert!(handle.is_live());
        assert_eq!(engine.live_objects(), 1);
    }

    #[test]
    fn small_modulus_queries() {
        let engine = engine();
        let mut modulus = SmallModulus::new(engine.clone(), 786433).unwrap();
        assert_eq!(modulus.value().unwrap(), 786433);
        assert_eq!(modulus.bit_count().unwrap(), 20);
        assert!(modulus.is_prime().unwrap());
        assert!(!modulus.is_zero().unwrap());

        modulus.set_value(0).unwrap();
        assert!(modulus.is_zero().unwrap());
        assert!(!modulus.is_prime().unwrap());
    }

    #[test]
    fn small_modulus_save_load() {
        let engine = engine();
        let source = SmallModulus::new(engine.clone(), 65537).unwrap();
        let blob = source.save(ComprMode::Deflate).unwrap();

        let mut target = SmallModulus::new(engine.clone(), 3).unwrap();
        target.load(&blob).unwrap();
        assert_eq!(target.value().unwrap(), 65537);
        assert_eq!(engine.live_objects(), 2);

        assert!(matches!(target.load("not a blob"), Err(HelmError::Serialization(_))));
        assert_eq!(target.value().unwrap(), 65537);

        let copy = SmallModulus::from_encoded(engine.clone(), &blob).unwrap();
        assert_eq!(copy.value().unwrap(), 65537);
    }

    #[test]
    fn released_modulus_reports_use_after_release() {
        let engine = engine();
        let mut modulus = SmallModulus::new(engine, 17).unwrap();
        modulus.release();
        assert!(matches!(
            modulus.value(),
            Err(HelmError::UseAfterRelease { kind: ObjectKind::Modulus })
        ));
    }
}

//! Pure-Rust reference engine.
//!
//! `SoftEngine` keeps every object in a registry keyed by id and implements
//! RLWE-based BFV and CKKS on top of `concrete-ntt` negacyclic NTTs over an
//! RNS coefficient modulus.

pub mod cipher;
pub mod encoder;
pub mod keys;
pub mod modulus;
pub mod params;
pub mod ring;
pub mod sampling;
pub mod serial;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::{debug, trace};

use crate::native::{
    ComprMode, NativeEngine, NativeError, NativeResult, ObjectId, ObjectKind, SchemeType, SecurityLevel,
};
use crate::vector::{ElementType, HostArray};

use cipher::{CiphertextData, Decryptor, Encryptor, Plaintext};
use encoder::{BatchEncoder, IntegerEncoder, RealEncoder};
use keys::{KSwitchKeys, KeyGenerator, PublicKey, SecretKey};
use params::{ContextData, EncryptionParameters};

enum Object {
    Modulus(u64),
    CoeffModulus(Vec<u64>),
    Parameters(EncryptionParameters),
    Context(Arc<ContextData>),
    BatchEncoder(Arc<BatchEncoder>),
    IntegerEncoder(Arc<IntegerEncoder>),
    RealEncoder(Arc<RealEncoder>),
    KeyGenerator(Arc<KeyGenerator>),
    PublicKey(Arc<PublicKey>),
    SecretKey(Arc<SecretKey>),
    RelinKeys(Arc<KSwitchKeys>),
    GaloisKeys(Arc<KSwitchKeys>),
    Encryptor(Arc<Encryptor>),
    Decryptor(Arc<Decryptor>),
    Plaintext(Plaintext),
    Ciphertext(Option<CiphertextData>),
}

impl Object {
    fn kind(&self) -> ObjectKind {
        match self {
            Object::Modulus(_) => ObjectKind::Modulus,
            Object::CoeffModulus(_) => ObjectKind::CoeffModulus,
            Object::Parameters(_) => ObjectKind::Parameters,
            Object::Context(_) => ObjectKind::Context,
            Object::BatchEncoder(_) => ObjectKind::BatchEncoder,
            Object::IntegerEncoder(_) => ObjectKind::IntegerEncoder,
            Object::RealEncoder(_) => ObjectKind::RealEncoder,
            Object::KeyGenerator(_) => ObjectKind::KeyGenerator,
            Object::PublicKey(_) => ObjectKind::PublicKey,
            Object::SecretKey(_) => ObjectKind::SecretKey,
            Object::RelinKeys(_) => ObjectKind::RelinKeys,
            Object::GaloisKeys(_) => ObjectKind::GaloisKeys,
            Object::Encryptor(_) => ObjectKind::Encryptor,
            Object::Decryptor(_) => ObjectKind::Decryptor,
            Object::Plaintext(_) => ObjectKind::Plaintext,
            Object::Ciphertext(_) => ObjectKind::Ciphertext,
        }
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    objects: HashMap<u64, Object>,
}

/// Reference [`NativeEngine`].
///
/// Long-running work (key generation, encryption) runs outside the registry
/// lock; objects are shared into it through `Arc`s.
pub struct SoftEngine {
    registry: Mutex<Registry>,
    rng: Mutex<ChaCha20Rng>,
    calls: AtomicU64,
}

/// Pulls one variant out of the registry, cloning it.
macro_rules! fetch {
    ($engine:expr, $id:expr, $variant:ident) => {
        $engine.with_object($id, |object| match object {
            Object::$variant(inner) => Ok(inner.clone()),
            other => Err(wrong_kind(ObjectKind::$variant, other.kind())),
        })
    };
}

fn wrong_kind(expected: ObjectKind, found: ObjectKind) -> NativeError {
    NativeError::new(format!("expected a {expected}, found a {found}"))
}

impl SoftEngine {
    /// Engine seeded from the operating system.
    pub fn new() -> Self {
        Self::from_rng(ChaCha20Rng::from_os_rng())
    }

    /// Deterministic engine for reproducible runs and tests.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(ChaCha20Rng::seed_from_u64(seed))
    }

    fn from_rng(rng: ChaCha20Rng) -> Self {
        Self { registry: Mutex::new(Registry::default()), rng: Mutex::new(rng), calls: AtomicU64::new(0) }
    }

    /// Number of engine calls served so far.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    fn registry(&self) -> NativeResult<MutexGuard<'_, Registry>> {
        self.registry.lock().map_err(|_| NativeError::new("engine registry is poisoned"))
    }

    fn rng(&self) -> NativeResult<MutexGuard<'_, ChaCha20Rng>> {
        self.rng.lock().map_err(|_| NativeError::new("engine rng is poisoned"))
    }

    fn insert(&self, object: Object) -> NativeResult<ObjectId> {
        let mut registry = self.registry()?;
        registry.next_id += 1;
        let id = registry.next_id;
        trace!(id, kind = %object.kind(), "created object");
        registry.objects.insert(id, object);
        Ok(ObjectId::from_raw(id))
    }

    fn with_object<T>(&self, id: &ObjectId, f: impl FnOnce(&Object) -> NativeResult<T>) -> NativeResult<T> {
        let registry = self.registry()?;
        let object = registry
            .objects
            .get(&id.as_raw())
            .ok_or_else(|| NativeError::new(format!("object {id} does not exist")))?;
        f(object)
    }

    fn with_object_mut<T>(&self, id: &ObjectId, f: impl FnOnce(&mut Object) -> NativeResult<T>) -> NativeResult<T> {
        let mut registry = self.registry()?;
        let object = registry
            .objects
            .get_mut(&id.as_raw())
            .ok_or_else(|| NativeError::new(format!("object {id} does not exist")))?;
        f(object)
    }

    fn store_plaintext(&self, id: &ObjectId, plaintext: Plaintext) -> NativeResult<()> {
        self.with_object_mut(id, |object| match object {
            Object::Plaintext(slot) => {
                *slot = plaintext;
                Ok(())
            }
            other => Err(wrong_kind(ObjectKind::Plaintext, other.kind())),
        })
    }

    fn store_ciphertext(&self, id: &ObjectId, ciphertext: CiphertextData) -> NativeResult<()> {
        self.with_object_mut(id, |object| match object {
            Object::Ciphertext(slot) => {
                *slot = Some(ciphertext);
                Ok(())
            }
            other => Err(wrong_kind(ObjectKind::Ciphertext, other.kind())),
        })
    }

    fn update_parameters(
        &self,
        id: &ObjectId,
        f: impl FnOnce(&mut EncryptionParameters) -> NativeResult<()>,
    ) -> NativeResult<()> {
        self.with_object_mut(id, |object| match object {
            Object::Parameters(params) => f(params),
            other => Err(wrong_kind(ObjectKind::Parameters, other.kind())),
        })
    }

    fn ready_context(&self, id: &ObjectId) -> NativeResult<Arc<ContextData>> {
        let ctx = fetch!(self, id, Context)?;
        ctx.tables()?;
        Ok(ctx)
    }

    fn load_object(&self, context: Option<&ObjectId>, kind: ObjectKind, encoded: &str) -> NativeResult<Object> {
        if kind == ObjectKind::Modulus {
            return serial::decode::<u64>(kind, encoded).map(Object::Modulus);
        }
        let ctx_id = context.ok_or_else(|| NativeError::new(format!("loading a {kind} requires a context")))?;
        let ctx = self.ready_context(ctx_id)?;
        let basis = &ctx.tables()?.basis;
        let invalid = || NativeError::new(format!("loaded {kind} is not valid for encryption parameters"));

        let object = match kind {
            ObjectKind::PublicKey => {
                let key: PublicKey = serial::decode(kind, encoded)?;
                if key.parms_id != *ctx.parms_id() || !basis.accepts(&key.c0) || !basis.accepts(&key.c1) {
                    return Err(invalid());
                }
                Object::PublicKey(Arc::new(key))
            }
            ObjectKind::SecretKey => {
                let key: SecretKey = serial::decode(kind, encoded)?;
                if key.parms_id != *ctx.parms_id() || !basis.accepts(&key.poly) {
                    return Err(invalid());
                }
                Object::SecretKey(Arc::new(key))
            }
            ObjectKind::RelinKeys | ObjectKind::GaloisKeys => {
                let keys: KSwitchKeys = serial::decode(kind, encoded)?;
                if keys.parms_id != *ctx.parms_id() || !keys.accepts(basis) {
                    return Err(invalid());
                }
                if kind == ObjectKind::RelinKeys {
                    Object::RelinKeys(Arc::new(keys))
                } else {
                    Object::GaloisKeys(Arc::new(keys))
                }
            }
            ObjectKind::Plaintext => {
                let plaintext: Plaintext = serial::decode(kind, encoded)?;
                if !plaintext.accepts(&ctx) {
                    return Err(invalid());
                }
                Object::Plaintext(plaintext)
            }
            ObjectKind::Ciphertext => {
                let ciphertext: CiphertextData = serial::decode(kind, encoded)?;
                if !ciphertext.accepts(&ctx) {
                    return Err(invalid());
                }
                Object::Ciphertext(Some(ciphertext))
            }
            other => return Err(NativeError::new(format!("objects of kind {other} cannot be loaded"))),
        };
        Ok(object)
    }
}

impl Default for SoftEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeEngine for SoftEngine {
    fn destroy(&self, id: ObjectId) -> NativeResult<()> {
        self.tick();
        let mut registry = self.registry()?;
        match registry.objects.remove(&id.as_raw()) {
            Some(object) => {
                trace!(id = id.as_raw(), kind = %object.kind(), "destroyed object");
                Ok(())
            }
            None => Err(NativeError::new(format!("object {id} does not exist"))),
        }
    }

    fn kind_of(&self, id: &ObjectId) -> NativeResult<ObjectKind> {
        self.tick();
        self.with_object(id, |object| Ok(object.kind()))
    }

    fn live_objects(&self) -> usize {
        self.registry().map(|registry| registry.objects.len()).unwrap_or(0)
    }

    fn modulus_create(&self, value: u64) -> NativeResult<ObjectId> {
        self.tick();
        self.insert(Object::Modulus(value))
    }

    fn modulus_set_value(&self, modulus: &ObjectId, value: u64) -> NativeResult<()> {
        self.tick();
        self.with_object_mut(modulus, |object| match object {
            Object::Modulus(slot) => {
                *slot = value;
                Ok(())
            }
            other => Err(wrong_kind(ObjectKind::Modulus, other.kind())),
        })
    }

    fn modulus_value(&self, modulus: &ObjectId) -> NativeResult<u64> {
        self.tick();
        fetch!(self, modulus, Modulus)
    }

    fn modulus_bit_count(&self, modulus: &ObjectId) -> NativeResult<u32> {
        self.tick();
        fetch!(self, modulus, Modulus).map(modulus::bit_count)
    }

    fn modulus_is_zero(&self, modulus: &ObjectId) -> NativeResult<bool> {
        self.tick();
        fetch!(self, modulus, Modulus).map(|value| value == 0)
    }

    fn modulus_is_prime(&self, modulus: &ObjectId) -> NativeResult<bool> {
        self.tick();
        fetch!(self, modulus, Modulus).map(modulus::is_prime)
    }

    fn coeff_modulus_default(&self, poly_degree: usize, level: SecurityLevel) -> NativeResult<ObjectId> {
        self.tick();
        let sizes = modulus::default_bit_sizes(poly_degree, level)?;
        let primes = modulus::create_coeff_modulus(poly_degree, &sizes)?;
        self.insert(Object::CoeffModulus(primes))
    }

    fn coeff_modulus_create(&self, poly_degree: usize, bit_sizes: &[u32]) -> NativeResult<ObjectId> {
        self.tick();
        let primes = modulus::create_coeff_modulus(poly_degree, bit_sizes)?;
        self.insert(Object::CoeffModulus(primes))
    }

    fn parameters_create(&self, scheme: SchemeType) -> NativeResult<ObjectId> {
        self.tick();
        self.insert(Object::Parameters(EncryptionParameters::new(scheme)))
    }

    fn parameters_set_poly_degree(&self, parameters: &ObjectId, degree: usize) -> NativeResult<()> {
        self.tick();
        self.update_parameters(parameters, |params| {
            params.poly_degree = degree;
            Ok(())
        })
    }

    fn parameters_set_coeff_modulus(&self, parameters: &ObjectId, coeff_modulus: &ObjectId) -> NativeResult<()> {
        self.tick();
        let primes = fetch!(self, coeff_modulus, CoeffModulus)?;
        self.update_parameters(parameters, |params| {
            params.coeff_modulus = primes;
            Ok(())
        })
    }

    fn parameters_set_plain_modulus(&self, parameters: &ObjectId, modulus: &ObjectId) -> NativeResult<()> {
        self.tick();
        let value = fetch!(self, modulus, Modulus)?;
        self.update_parameters(parameters, |params| {
            if params.scheme == SchemeType::Ckks {
                return Err(NativeError::new("unsupported scheme"));
            }
            params.plain_modulus = Some(value);
            Ok(())
        })
    }

    fn context_create(&self, parameters: &ObjectId, expand_mod_chain: bool, level: SecurityLevel) -> NativeResult<ObjectId> {
        self.tick();
        let params = fetch!(self, parameters, Parameters)?;
        let ctx = ContextData::new(params, expand_mod_chain, level);
        debug!(
            parameters_set = ctx.parameters_set(),
            chain_length = ctx.chain_length(),
            "created context"
        );
        self.insert(Object::Context(Arc::new(ctx)))
    }

    fn context_parameters_set(&self, context: &ObjectId) -> NativeResult<bool> {
        self.tick();
        fetch!(self, context, Context).map(|ctx| ctx.parameters_set())
    }

    fn context_diagnostic(&self, context: &ObjectId) -> NativeResult<String> {
        self.tick();
        fetch!(self, context, Context).map(|ctx| ctx.diagnostic())
    }

    fn batch_encoder_create(&self, context: &ObjectId) -> NativeResult<ObjectId> {
        self.tick();
        let encoder = BatchEncoder::new(fetch!(self, context, Context)?)?;
        self.insert(Object::BatchEncoder(Arc::new(encoder)))
    }

    fn integer_encoder_create(&self, context: &ObjectId) -> NativeResult<ObjectId> {
        self.tick();
        let encoder = IntegerEncoder::new(fetch!(self, context, Context)?)?;
        self.insert(Object::IntegerEncoder(Arc::new(encoder)))
    }

    fn real_encoder_create(&self, context: &ObjectId) -> NativeResult<ObjectId> {
        self.tick();
        let encoder = RealEncoder::new(fetch!(self, context, Context)?)?;
        self.insert(Object::RealEncoder(Arc::new(encoder)))
    }

    fn encoder_slot_count(&self, encoder: &ObjectId) -> NativeResult<usize> {
        self.tick();
        self.with_object(encoder, |object| match object {
            Object::BatchEncoder(encoder) => Ok(encoder.slot_count()),
            Object::RealEncoder(encoder) => Ok(encoder.slot_count()),
            other => Err(NativeError::new(format!("a {} has no slots", other.kind()))),
        })
    }

    fn batch_encode(&self, encoder: &ObjectId, values: &HostArray, plaintext: &ObjectId) -> NativeResult<()> {
        self.tick();
        let encoded = fetch!(self, encoder, BatchEncoder)?.encode(values)?;
        self.store_plaintext(plaintext, encoded)
    }

    fn batch_decode(&self, encoder: &ObjectId, plaintext: &ObjectId, element_type: ElementType) -> NativeResult<HostArray> {
        self.tick();
        let encoder = fetch!(self, encoder, BatchEncoder)?;
        encoder.decode(&fetch!(self, plaintext, Plaintext)?, element_type)
    }

    fn real_encode(&self, encoder: &ObjectId, values: &HostArray, scale: f64, plaintext: &ObjectId) -> NativeResult<()> {
        self.tick();
        let encoded = fetch!(self, encoder, RealEncoder)?.encode(values, scale)?;
        self.store_plaintext(plaintext, encoded)
    }

    fn real_decode(&self, encoder: &ObjectId, plaintext: &ObjectId, element_type: ElementType) -> NativeResult<HostArray> {
        self.tick();
        let encoder = fetch!(self, encoder, RealEncoder)?;
        encoder.decode(&fetch!(self, plaintext, Plaintext)?, element_type)
    }

    fn integer_encode(&self, encoder: &ObjectId, value: i64, plaintext: &ObjectId) -> NativeResult<()> {
        self.tick();
        let encoded = fetch!(self, encoder, IntegerEncoder)?.encode(value)?;
        self.store_plaintext(plaintext, encoded)
    }

    fn integer_decode(&self, encoder: &ObjectId, plaintext: &ObjectId) -> NativeResult<i64> {
        self.tick();
        let encoder = fetch!(self, encoder, IntegerEncoder)?;
        encoder.decode(&fetch!(self, plaintext, Plaintext)?)
    }

    fn key_generator_create(&self, context: &ObjectId) -> NativeResult<ObjectId> {
        self.tick();
        let ctx = self.ready_context(context)?;
        let generator = KeyGenerator::new(ctx, &mut *self.rng()?)?;
        self.insert(Object::KeyGenerator(Arc::new(generator)))
    }

    fn key_generator_from_secret(&self, context: &ObjectId, secret_key: &ObjectId) -> NativeResult<ObjectId> {
        self.tick();
        let ctx = self.ready_context(context)?;
        let secret = fetch!(self, secret_key, SecretKey)?;
        let generator = KeyGenerator::from_secret(ctx, secret, &mut *self.rng()?)?;
        self.insert(Object::KeyGenerator(Arc::new(generator)))
    }

    fn key_generator_public_key(&self, generator: &ObjectId) -> NativeResult<ObjectId> {
        self.tick();
        let key = fetch!(self, generator, KeyGenerator)?.public_key();
        self.insert(Object::PublicKey(key))
    }

    fn key_generator_secret_key(&self, generator: &ObjectId) -> NativeResult<ObjectId> {
        self.tick();
        let key = fetch!(self, generator, KeyGenerator)?.secret_key();
        self.insert(Object::SecretKey(key))
    }

    fn key_generator_relin_keys(&self, generator: &ObjectId, decomposition_bit_count: u32, count: usize) -> NativeResult<ObjectId> {
        self.tick();
        let generator = fetch!(self, generator, KeyGenerator)?;
        let keys = generator.relin_keys(decomposition_bit_count, count, &mut *self.rng()?)?;
        self.insert(Object::RelinKeys(Arc::new(keys)))
    }

    fn key_generator_galois_keys(&self, generator: &ObjectId, decomposition_bit_count: u32) -> NativeResult<ObjectId> {
        self.tick();
        let generator = fetch!(self, generator, KeyGenerator)?;
        let keys = generator.galois_keys(decomposition_bit_count, &mut *self.rng()?)?;
        self.insert(Object::GaloisKeys(Arc::new(keys)))
    }

    fn encryptor_create(&self, context: &ObjectId, public_key: &ObjectId) -> NativeResult<ObjectId> {
        self.tick();
        let encryptor = Encryptor::new(self.ready_context(context)?, fetch!(self, public_key, PublicKey)?)?;
        self.insert(Object::Encryptor(Arc::new(encryptor)))
    }

    fn encrypt(&self, encryptor: &ObjectId, plaintext: &ObjectId, ciphertext: &ObjectId) -> NativeResult<()> {
        self.tick();
        let encryptor = fetch!(self, encryptor, Encryptor)?;
        let plaintext = fetch!(self, plaintext, Plaintext)?;
        let encrypted = encryptor.encrypt(&plaintext, &mut *self.rng()?)?;
        self.store_ciphertext(ciphertext, encrypted)
    }

    fn decryptor_create(&self, context: &ObjectId, secret_key: &ObjectId) -> NativeResult<ObjectId> {
        self.tick();
        let decryptor = Decryptor::new(self.ready_context(context)?, fetch!(self, secret_key, SecretKey)?)?;
        self.insert(Object::Decryptor(Arc::new(decryptor)))
    }

    fn decrypt(&self, decryptor: &ObjectId, ciphertext: &ObjectId, plaintext: &ObjectId) -> NativeResult<()> {
        self.tick();
        let decryptor = fetch!(self, decryptor, Decryptor)?;
        let ciphertext = fetch!(self, ciphertext, Ciphertext)?
            .ok_or_else(|| NativeError::new("ciphertext is empty"))?;
        let decrypted = decryptor.decrypt(&ciphertext)?;
        self.store_plaintext(plaintext, decrypted)
    }

    fn plaintext_create(&self) -> NativeResult<ObjectId> {
        self.tick();
        self.insert(Object::Plaintext(Plaintext::Empty))
    }

    fn ciphertext_create(&self) -> NativeResult<ObjectId> {
        self.tick();
        self.insert(Object::Ciphertext(None))
    }

    fn save(&self, id: &ObjectId, mode: ComprMode) -> NativeResult<String> {
        self.tick();
        // Payloads are cloned out so serialization runs without the lock.
        enum Payload {
            Modulus(u64),
            PublicKey(Arc<PublicKey>),
            SecretKey(Arc<SecretKey>),
            KSwitch(ObjectKind, Arc<KSwitchKeys>),
            Plaintext(Plaintext),
            Ciphertext(CiphertextData),
        }
        let payload = self.with_object(id, |object| match object {
            Object::Modulus(value) => Ok(Payload::Modulus(*value)),
            Object::PublicKey(key) => Ok(Payload::PublicKey(key.clone())),
            Object::SecretKey(key) => Ok(Payload::SecretKey(key.clone())),
            Object::RelinKeys(keys) => Ok(Payload::KSwitch(ObjectKind::RelinKeys, keys.clone())),
            Object::GaloisKeys(keys) => Ok(Payload::KSwitch(ObjectKind::GaloisKeys, keys.clone())),
            Object::Plaintext(plaintext) => Ok(Payload::Plaintext(plaintext.clone())),
            Object::Ciphertext(Some(ciphertext)) => Ok(Payload::Ciphertext(ciphertext.clone())),
            Object::Ciphertext(None) => Err(NativeError::new("ciphertext is empty")),
            other => Err(NativeError::new(format!("objects of kind {} cannot be saved", other.kind()))),
        })?;
        match payload {
            Payload::Modulus(value) => serial::encode(ObjectKind::Modulus, mode, &value),
            Payload::PublicKey(key) => serial::encode(ObjectKind::PublicKey, mode, key.as_ref()),
            Payload::SecretKey(key) => serial::encode(ObjectKind::SecretKey, mode, key.as_ref()),
            Payload::KSwitch(kind, keys) => serial::encode(kind, mode, keys.as_ref()),
            Payload::Plaintext(plaintext) => serial::encode(ObjectKind::Plaintext, mode, &plaintext),
            Payload::Ciphertext(ciphertext) => serial::encode(ObjectKind::Ciphertext, mode, &ciphertext),
        }
    }

    fn load(&self, context: Option<&ObjectId>, kind: ObjectKind, encoded: &str) -> NativeResult<ObjectId> {
        self.tick();
        let object = self.load_object(context, kind, encoded)?;
        self.insert(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bfv_context(engine: &SoftEngine) -> ObjectId {
        let params = engine.parameters_create(SchemeType::Bfv).unwrap();
        engine.parameters_set_poly_degree(&params, 1024).unwrap();
        let coeff = engine.coeff_modulus_default(1024, SecurityLevel::Tc128).unwrap();
        engine.parameters_set_coeff_modulus(&params, &coeff).unwrap();
        let plain = engine.modulus_create(12289).unwrap();
        engine.parameters_set_plain_modulus(&params, &plain).unwrap();
        let ctx = engine.context_create(&params, true, SecurityLevel::Tc128).unwrap();
        for id in [params, coeff, plain] {
            engine.destroy(id).unwrap();
        }
        ctx
    }

    #[test]
    fn test_registry_counts_and_destroy() {
        let engine = SoftEngine::with_seed(1);
        let a = engine.plaintext_create().unwrap();
        let b = engine.ciphertext_create().unwrap();
        assert_eq!(engine.live_objects(), 2);
        assert_eq!(engine.kind_of(&b).unwrap(), ObjectKind::Ciphertext);

        let stale = ObjectId::from_raw(a.as_raw());
        engine.destroy(a).unwrap();
        assert!(engine.destroy(stale).is_err());
        engine.destroy(b).unwrap();
        assert_eq!(engine.live_objects(), 0);
        assert!(engine.call_count() >= 5);
    }

    #[test]
    fn test_context_and_batch_pipeline() {
        let engine = SoftEngine::with_seed(2);
        let ctx = bfv_context(&engine);
        assert!(engine.context_parameters_set(&ctx).unwrap());
        assert_eq!(engine.context_diagnostic(&ctx).unwrap(), "valid");

        let encoder = engine.batch_encoder_create(&ctx).unwrap();
        assert_eq!(engine.encoder_slot_count(&encoder).unwrap(), 1024);
        let keygen = engine.key_generator_create(&ctx).unwrap();
        let pk = engine.key_generator_public_key(&keygen).unwrap();
        let sk = engine.key_generator_secret_key(&keygen).unwrap();
        let encryptor = engine.encryptor_create(&ctx, &pk).unwrap();
        let decryptor = engine.decryptor_create(&ctx, &sk).unwrap();

        let pt = engine.plaintext_create().unwrap();
        let ct = engine.ciphertext_create().unwrap();
        engine.batch_encode(&encoder, &HostArray::Int32(vec![-3, 2, 1]), &pt).unwrap();
        engine.encrypt(&encryptor, &pt, &ct).unwrap();

        let out = engine.plaintext_create().unwrap();
        engine.decrypt(&decryptor, &ct, &out).unwrap();
        let mut decoded = engine.batch_decode(&encoder, &out, ElementType::Int32).unwrap();
        decoded.truncate(3);
        assert_eq!(decoded, HostArray::Int32(vec![-3, 2, 1]));
    }

    #[test]
    fn test_wrong_kind_arguments_rejected() {
        let engine = SoftEngine::with_seed(3);
        let pt = engine.plaintext_create().unwrap();
        let err = engine.batch_encoder_create(&pt).unwrap_err();
        assert_eq!(err.message, "expected a context, found a plaintext");
    }

    #[test]
    fn test_ckks_rejects_plain_modulus() {
        let engine = SoftEngine::with_seed(4);
        let params = engine.parameters_create(SchemeType::Ckks).unwrap();
        let plain = engine.modulus_create(17).unwrap();
        assert!(engine.parameters_set_plain_modulus(&params, &plain).is_err());
    }

    #[test]
    fn test_keys_need_valid_context() {
        let engine = SoftEngine::with_seed(5);
        let params = engine.parameters_create(SchemeType::Bfv).unwrap();
        engine.parameters_set_poly_degree(&params, 1000).unwrap();
        let ctx = engine.context_create(&params, true, SecurityLevel::Tc128).unwrap();
        assert!(!engine.context_parameters_set(&ctx).unwrap());
        assert!(engine.key_generator_create(&ctx).is_err());
    }

    #[test]
    fn test_save_load_public_key_checks_context() {
        let engine = SoftEngine::with_seed(6);
        let ctx = bfv_context(&engine);
        let keygen = engine.key_generator_create(&ctx).unwrap();
        let pk = engine.key_generator_public_key(&keygen).unwrap();
        let blob = engine.save(&pk, ComprMode::Deflate).unwrap();

        let loaded = engine.load(Some(&ctx), ObjectKind::PublicKey, &blob).unwrap();
        assert_eq!(engine.kind_of(&loaded).unwrap(), ObjectKind::PublicKey);
        assert!(engine.load(None, ObjectKind::PublicKey, &blob).is_err());
        assert!(engine.load(Some(&ctx), ObjectKind::SecretKey, &blob).is_err());

        let empty = engine.ciphertext_create().unwrap();
        assert!(engine.save(&empty, ComprMode::None).is_err());
        assert!(engine.save(&ctx, ComprMode::None).is_err());
    }
}

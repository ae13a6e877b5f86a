//! Caller-owned plaintext and ciphertext containers.

use crate::context::Scheme;
use crate::error::Result;
use crate::handle::{CiphertextKind, NativeHandle, PlaintextKind};
use crate::native::ObjectId;
use crate::vector::ElementType;

/// What a ciphertext needs to be decoded again: the input length, its
/// element type, and the scheme that encrypted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherTextMeta {
    pub len: usize,
    pub element_type: ElementType,
    pub scheme: Scheme,
}

/// An encrypted array.
#[derive(Debug)]
pub struct CipherText {
    handle: NativeHandle<CiphertextKind>,
    meta: CipherTextMeta,
}

impl CipherText {
    pub(crate) fn new(handle: NativeHandle<CiphertextKind>, meta: CipherTextMeta) -> Self {
        Self { handle, meta }
    }

    pub fn meta(&self) -> CipherTextMeta {
        self.meta
    }

    /// Number of values that were encrypted.
    pub fn len(&self) -> usize {
        self.meta.len
    }

    pub fn is_empty(&self) -> bool {
        self.meta.len == 0
    }

    pub fn element_type(&self) -> ElementType {
        self.meta.element_type
    }

    pub fn scheme(&self) -> Scheme {
        self.meta.scheme
    }

    pub fn handle(&self) -> &NativeHandle<CiphertextKind> {
        &self.handle
    }

    pub(crate) fn raw(&self) -> Result<&ObjectId> {
        self.handle.raw()
    }

    pub fn is_live(&self) -> bool {
        self.handle.is_live()
    }

    pub fn release(&mut self) {
        self.handle.release();
    }
}

/// An encoded, unencrypted value.
#[derive(Debug)]
pub struct PlainText {
    handle: NativeHandle<PlaintextKind>,
}

impl PlainText {
    pub(crate) fn new(handle: NativeHandle<PlaintextKind>) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &NativeHandle<PlaintextKind> {
        &self.handle
    }

    pub fn is_live(&self) -> bool {
        self.handle.is_live()
    }

    pub fn release(&mut self) {
        self.handle.release();
    }
}

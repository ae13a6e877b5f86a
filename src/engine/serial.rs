//! Versioned text blobs for persisted engine objects.
//!
//! Layout before base64 (standard alphabet):
//!
//! | bytes | field |
//! |---|---|
//! | 4 | magic `HELM` |
//! | 1 | format version |
//! | 1 | compression mode |
//! | 1 | object kind |
//! | 8 | payload length before compression, little endian |
//! | .. | bincode payload, deflated when the mode asks for it |

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::native::{ComprMode, NativeError, NativeResult, ObjectKind};

pub const MAGIC: [u8; 4] = *b"HELM";
pub const VERSION: u8 = 1;
const HEADER_LEN: usize = 15;
/// Upper bound on an accepted payload, guards against decompression bombs.
pub const MAX_PAYLOAD_LEN: u64 = 1 << 31;

pub fn encode<T: Serialize>(kind: ObjectKind, mode: ComprMode, payload: &T) -> NativeResult<String> {
    let raw = bincode::serialize(payload).map_err(|err| NativeError::new(format!("failed to serialize {kind}: {err}")))?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + raw.len());
    bytes.extend_from_slice(&MAGIC);
    bytes.push(VERSION);
    bytes.push(mode.code());
    bytes.push(kind.code());
    bytes.extend_from_slice(&(raw.len() as u64).to_le_bytes());
    match mode {
        ComprMode::None => bytes.extend_from_slice(&raw),
        ComprMode::Deflate => {
            let mut encoder = DeflateEncoder::new(bytes, Compression::default());
            encoder
                .write_all(&raw)
                .map_err(|err| NativeError::new(format!("compression failed: {err}")))?;
            bytes = encoder
                .finish()
                .map_err(|err| NativeError::new(format!("compression failed: {err}")))?;
        }
    }
    Ok(STANDARD.encode(bytes))
}

/// Kind recorded in a blob's header.
pub fn peek_kind(encoded: &str) -> NativeResult<ObjectKind> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|err| NativeError::new(format!("invalid base64: {err}")))?;
    Ok(parse_header(&bytes)?.1)
}

fn parse_header(bytes: &[u8]) -> NativeResult<(ComprMode, ObjectKind, u64)> {
    if bytes.len() < HEADER_LEN || bytes[..4] != MAGIC {
        return Err(NativeError::new("input is not a serialized object"));
    }
    if bytes[4] != VERSION {
        return Err(NativeError::new(format!("unsupported format version {}", bytes[4])));
    }
    let mode = ComprMode::from_code(bytes[5])
        .ok_or_else(|| NativeError::new(format!("unsupported compression mode {}", bytes[5])))?;
    let kind = ObjectKind::from_code(bytes[6])
        .ok_or_else(|| NativeError::new(format!("unknown object kind {}", bytes[6])))?;
    let mut len = [0u8; 8];
    len.copy_from_slice(&bytes[7..HEADER_LEN]);
    let len = u64::from_le_bytes(len);
    if len > MAX_PAYLOAD_LEN {
        return Err(NativeError::new("payload size exceeds the allowed maximum"));
    }
    Ok((mode, kind, len))
}

pub fn decode<T: DeserializeOwned>(expected: ObjectKind, encoded: &str) -> NativeResult<T> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|err| NativeError::new(format!("invalid base64: {err}")))?;
    let (mode, kind, len) = parse_header(&bytes)?;
    if kind != expected {
        return Err(NativeError::new(format!("expected a serialized {expected}, found a {kind}")));
    }
    let body = &bytes[HEADER_LEN..];
    let raw = match mode {
        ComprMode::None => body.to_vec(),
        ComprMode::Deflate => {
            let mut raw = Vec::new();
            DeflateDecoder::new(body)
                .take(len)
                .read_to_end(&mut raw)
                .map_err(|err| NativeError::new(format!("decompression failed: {err}")))?;
            raw
        }
    };
    if raw.len() as u64 != len {
        return Err(NativeError::new("payload size does not match the header"));
    }
    bincode::deserialize(&raw).map_err(|err| NativeError::new(format!("failed to deserialize {kind}: {err}")))
}

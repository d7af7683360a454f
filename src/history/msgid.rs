//! Opaque message identifiers.
//!
//! An identifier is the tuple `(network id, target, backend-local position)`
//! encoded with bincode and wrapped in unpadded URL-safe base64. The payload
//! starts with a format version and the backend's tag, so an ID issued by one
//! backend is rejected by another.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const FORMAT_VERSION: u8 = 1;

/// Largest decoded payload accepted by [`parse`].
const MAX_PAYLOAD: u64 = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MsgIdError {
    #[error("malformed message ID: {0}")]
    Malformed(&'static str),
}

/// Backend-local position stored inside an identifier.
pub trait BackendMsgId: Serialize + DeserializeOwned {
    /// Distinct per backend.
    const KIND: u8;
}

/// Row id of the SQLite store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbMsgId(pub i64);

impl BackendMsgId for DbMsgId {
    const KIND: u8 = 1;
}

/// Per-target sequence number of the redb store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedbMsgId(pub u64);

impl BackendMsgId for RedbMsgId {
    const KIND: u8 = 2;
}

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_varint_encoding()
        .with_limit(MAX_PAYLOAD)
        .reject_trailing_bytes()
}

/// Encode an identifier.
pub fn format<T: BackendMsgId>(network: i64, target: &str, local: &T) -> Result<String, MsgIdError> {
    let bytes = options()
        .serialize(&(FORMAT_VERSION, T::KIND, network, target, local))
        .map_err(|_| MsgIdError::Malformed("identifier too large"))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Decode an identifier issued by [`format`] for the same backend type.
pub fn parse<T: BackendMsgId>(s: &str) -> Result<(i64, String, T), MsgIdError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(s)
        .map_err(|_| MsgIdError::Malformed("invalid base64"))?;

    let (version, kind, network, target, local): (u8, u8, i64, String, T) = options()
        .deserialize(&bytes)
        .map_err(|_| MsgIdError::Malformed("invalid payload"))?;

    if version != FORMAT_VERSION {
        return Err(MsgIdError::Malformed("unsupported version"));
    }
    if kind != T::KIND {
        return Err(MsgIdError::Malformed("wrong backend tag"));
    }
    Ok((network, target, local))
}

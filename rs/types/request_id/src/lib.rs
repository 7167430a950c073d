//! Representation-independent hashing of request content.
//!
//! Requests sent to the IC are identified by the hash of their content map.
//! The hash is *representation independent*: two structurally equal values
//! produce the same digest regardless of how a client happened to encode or
//! order them. This module defines the value universe the hash is computed
//! over and derives [`RequestId`]s from request content maps.

use sha2::{Digest as _, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// A value that can be hashed in a representation-independent way.
///
/// The universe is closed: whatever a request content map can contain is a
/// variant here. Types whose canonical hashable form differs from their
/// in-memory form implement [`Hashable`] and convert themselves into a
/// `Value` before hashing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    /// An opaque byte string, hashed as-is.
    Blob(Vec<u8>),
    /// Text, hashed as its UTF-8 encoding.
    String(String),
    /// A non-negative integer, hashed as its minimal unsigned LEB128
    /// encoding.
    Nat(u64),
    /// A heterogeneous sequence; the hashes of its members are
    /// concatenated and hashed again.
    Array(Vec<Value>),
    /// A map from text keys to values. Entries with an [`Value::Absent`]
    /// value are dropped before hashing.
    Map(BTreeMap<String, Value>),
    /// A principal, hashed as its canonical byte form.
    Principal(candid::Principal),
    /// An explicitly unset map entry. Only meaningful directly under a
    /// map; hashing it anywhere else is an error.
    Absent,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Nat(n)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Blob(bytes)
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Value::Blob(bytes.to_vec())
    }
}

impl From<candid::Principal> for Value {
    fn from(principal: candid::Principal) -> Self {
        Value::Principal(principal)
    }
}

impl From<RequestId> for Value {
    fn from(request_id: RequestId) -> Self {
        Value::Blob(request_id.as_bytes().to_vec())
    }
}

/// Types whose canonical hashable form differs from their in-memory form.
///
/// The single escape hatch out of the closed [`Value`] universe: a type
/// projects itself onto a `Value` and is hashed as that projection.
pub trait Hashable {
    fn hashable(&self) -> Value;
}

impl<T: Hashable> From<&T> for Value {
    fn from(value: &T) -> Self {
        value.hashable()
    }
}

/// An absolute ingress expiry, in nanoseconds since the UNIX epoch.
///
/// Carried by every request content map; hashed as the plain nanosecond
/// count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Expiry {
    timestamp_nanos: u64,
}

impl Expiry {
    pub fn from_nanos_since_unix_epoch(timestamp_nanos: u64) -> Self {
        Self { timestamp_nanos }
    }

    pub fn as_nanos_since_unix_epoch(&self) -> u64 {
        self.timestamp_nanos
    }
}

impl Hashable for Expiry {
    fn hashable(&self) -> Value {
        Value::Nat(self.timestamp_nanos)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RequestIdError {
    /// The offending value is carried for diagnostics.
    #[error("value cannot be hashed in this position: {0:?}")]
    UnsupportedValue(Value),
}

/// Computes the representation-independent hash of a single value.
pub fn hash_value(value: &Value) -> Result<[u8; 32], RequestIdError> {
    match value {
        Value::Blob(bytes) => Ok(sha256(bytes)),
        Value::String(s) => Ok(sha256(s.as_bytes())),
        Value::Nat(n) => {
            let mut encoded = Vec::with_capacity(10);
            leb128::write::unsigned(&mut encoded, *n)
                .expect("writing LEB128 to a Vec cannot fail");
            Ok(sha256(&encoded))
        }
        Value::Array(values) => {
            let mut hasher = Sha256::new();
            for member in values {
                hasher.update(hash_value(member)?);
            }
            Ok(hasher.finalize().into())
        }
        Value::Map(map) => hash_of_map(map),
        Value::Principal(principal) => Ok(sha256(principal.as_slice())),
        Value::Absent => Err(RequestIdError::UnsupportedValue(value.clone())),
    }
}

/// Computes the representation-independent hash of a content map.
///
/// Entries whose value is [`Value::Absent`] are dropped. The remaining
/// `(hash(key), hash(value))` pairs are sorted by key hash in unsigned
/// byte-lex order and the concatenation is hashed once more.
pub fn hash_of_map(map: &BTreeMap<String, Value>) -> Result<[u8; 32], RequestIdError> {
    let mut hashed_entries = Vec::with_capacity(map.len());
    for (key, value) in map {
        if *value == Value::Absent {
            continue;
        }
        hashed_entries.push((sha256(key.as_bytes()), hash_value(value)?));
    }
    hashed_entries.sort();

    let mut hasher = Sha256::new();
    for (key_hash, value_hash) in hashed_entries {
        hasher.update(key_hash);
        hasher.update(value_hash);
    }
    Ok(hasher.finalize().into())
}

/// Derives the request id of a request content map.
pub fn request_id_of(content: &BTreeMap<String, Value>) -> Result<RequestId, RequestIdError> {
    Ok(RequestId(hash_of_map(content)?))
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

/// The id of a request sent to the IC: the representation-independent hash
/// of its content map.
///
/// Structurally a 32-byte string, but branded so it cannot be confused
/// with arbitrary bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId([u8; Self::LEN]);

impl RequestId {
    pub const LEN: usize = 32;

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for RequestId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; RequestId::LEN]> for RequestId {
    fn from(bytes: [u8; RequestId::LEN]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for RequestId {
    type Error = InvalidRequestIdLength;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; Self::LEN] = bytes
            .try_into()
            .map_err(|_| InvalidRequestIdLength(bytes.len()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId(0x{})", hex::encode(self.0))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Returned when converting a byte slice that is not exactly 32 bytes long
/// into a [`RequestId`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("expected a request id of 32 bytes, got {0} bytes")]
pub struct InvalidRequestIdLength(pub usize);

//! Canonical encodings for ledger content.
//!
//! Ledger entry hashes are computed over RFC 8949 Core Deterministic CBOR:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! Payloads are carried as JSON text inside the CBOR map. [`canonical_json`]
//! produces the compact, key-sorted JSON form that the engine stores, so the
//! same logical payload always hashes the same way.

use ciborium::value::Value;
use serde_json::Value as Json;

use crate::error::{CoreError, Result};

/// Entry content field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub const EVENT_TYPE: u64 = 0;
    pub const ACTOR: u64 = 1;
    pub const PAYLOAD_JSON: u64 = 2;
    pub const TIMESTAMP: u64 = 3;
}

/// Encode the hashed content of a ledger entry to canonical CBOR bytes.
///
/// The map is `{0: event_type, 1: actor, 2: payload_json, 3: timestamp}`.
pub fn canonical_entry_bytes(
    event_type: &str,
    actor: &str,
    payload_json: &str,
    timestamp: i64,
) -> Result<Vec<u8>> {
    let value = Value::Map(vec![
        (Value::Integer(keys::EVENT_TYPE.into()), Value::Text(event_type.to_string())),
        (Value::Integer(keys::ACTOR.into()), Value::Text(actor.to_string())),
        (Value::Integer(keys::PAYLOAD_JSON.into()), Value::Text(payload_json.to_string())),
        (Value::Integer(keys::TIMESTAMP.into()), Value::Integer(timestamp.into())),
    ]);
    encode_canonical(&value)
}

/// Render a JSON value compactly with object keys sorted at every depth.
///
/// `serde_json` keeps objects in a `BTreeMap` unless its `preserve_order`
/// feature is on; this crate relies on it staying off.
pub fn canonical_json(value: &Json) -> Result<String> {
    serde_json::to_string(value).map_err(|e| CoreError::EncodingError(e.to_string()))
}

fn encode_canonical(value: &Value) -> Result<Vec<u8>> {
    let mut enc = Encoder::default();
    enc.value(value)?;
    Ok(enc.out)
}

/// Major types of the CBOR initial byte.
mod major {
    pub const UINT: u8 = 0;
    pub const NEGATIVE: u8 = 1;
    pub const BYTES: u8 = 2;
    pub const TEXT: u8 = 3;
    pub const ARRAY: u8 = 4;
    pub const MAP: u8 = 5;
}

const FALSE: u8 = 0xf4;
const TRUE: u8 = 0xf5;
const NULL: u8 = 0xf6;

#[derive(Default)]
struct Encoder {
    out: Vec<u8>,
}

impl Encoder {
    fn value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Integer(i) => {
                let n = i128::from(*i);
                if n < 0 {
                    self.head(major::NEGATIVE, (-1 - n) as u64);
                } else {
                    self.head(major::UINT, n as u64);
                }
            }
            Value::Bytes(b) => self.blob(major::BYTES, b),
            Value::Text(s) => self.blob(major::TEXT, s.as_bytes()),
            Value::Array(items) => {
                self.head(major::ARRAY, items.len() as u64);
                for item in items {
                    self.value(item)?;
                }
            }
            Value::Map(entries) => self.map(entries)?,
            Value::Bool(b) => self.out.push(if *b { TRUE } else { FALSE }),
            Value::Null => self.out.push(NULL),
            Value::Float(_) => {
                return Err(CoreError::EncodingError(
                    "floats have no canonical encoding here".into(),
                ))
            }
            other => {
                return Err(CoreError::EncodingError(format!(
                    "unsupported CBOR value: {:?}",
                    other
                )))
            }
        }
        Ok(())
    }

    /// Initial byte plus the shortest argument that holds `arg`.
    fn head(&mut self, major: u8, arg: u64) {
        let mt = major << 5;
        match arg {
            0..=23 => self.out.push(mt | arg as u8),
            24..=0xff => self.out.extend_from_slice(&[mt | 24, arg as u8]),
            0x100..=0xffff => {
                self.out.push(mt | 25);
                self.out.extend_from_slice(&(arg as u16).to_be_bytes());
            }
            0x1_0000..=0xffff_ffff => {
                self.out.push(mt | 26);
                self.out.extend_from_slice(&(arg as u32).to_be_bytes());
            }
            _ => {
                self.out.push(mt | 27);
                self.out.extend_from_slice(&arg.to_be_bytes());
            }
        }
    }

    fn blob(&mut self, major: u8, bytes: &[u8]) {
        self.head(major, bytes.len() as u64);
        self.out.extend_from_slice(bytes);
    }

    /// Entries are written in the byte order of their encoded keys.
    fn map(&mut self, entries: &[(Value, Value)]) -> Result<()> {
        let mut encoded = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let mut key_enc = Encoder::default();
            key_enc.value(key)?;
            encoded.push((key_enc.out, value));
        }
        encoded.sort_by(|a, b| a.0.cmp(&b.0));

        self.head(major::MAP, encoded.len() as u64);
        for (key, value) in encoded {
            self.out.extend_from_slice(&key);
            self.value(value)?;
        }
        Ok(())
    }
}

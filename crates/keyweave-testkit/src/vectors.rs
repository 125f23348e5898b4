//! Canonical-encoding vectors.
//!
//! Entry hashes are computed over these bytes, so every implementation that
//! reads the same ledger has to produce them exactly.

use keyweave_core::{canonical_entry_bytes, entry_hash, Blake3Hash};

/// One known encoding of entry content.
#[derive(Debug, Clone)]
pub struct CanonicalVector {
    pub name: &'static str,
    pub event_type: &'static str,
    pub actor: &'static str,
    pub payload_json: &'static str,
    pub timestamp: i64,
    /// Expected canonical bytes (hex).
    pub expected_hex: &'static str,
}

pub fn all_vectors() -> Vec<CanonicalVector> {
    vec![
        CanonicalVector {
            name: "minimal entry",
            event_type: "A",
            actor: "b",
            payload_json: "{}",
            timestamp: 0,
            expected_hex: "a400614101616202627b7d0300",
        },
        CanonicalVector {
            name: "role created at 2025-01-14T16:00:00Z",
            event_type: "RoleCreated",
            actor: "system",
            payload_json: r#"{"a":1}"#,
            timestamp: 1736870400000,
            expected_hex: concat!(
                "a4",
                "00",
                "6b526f6c6543726561746564",
                "01",
                "6673797374656d",
                "02",
                "677b2261223a317d",
                "03",
                "1b00000194658b1000"
            ),
        },
        CanonicalVector {
            name: "negative timestamp",
            event_type: "A",
            actor: "b",
            payload_json: "{}",
            timestamp: -1,
            expected_hex: "a400614101616202627b7d0320",
        },
    ]
}

/// Encode every vector and report `(name, matches, actual hex)`.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let actual = canonical_entry_bytes(v.event_type, v.actor, v.payload_json, v.timestamp)
                .map(hex::encode)
                .unwrap_or_else(|e| format!("error: {}", e));
            (v.name.to_string(), actual == v.expected_hex, actual)
        })
        .collect()
}

/// Hash of a vector as the first entry of a chain.
pub fn first_entry_hash(vector: &CanonicalVector) -> keyweave_core::Result<Blake3Hash> {
    entry_hash(
        &Blake3Hash::ZERO,
        vector.event_type,
        vector.actor,
        vector.payload_json,
        vector.timestamp,
    )
}

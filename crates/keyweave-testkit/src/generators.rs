//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{Map, Value};

use keyweave_core::{DataItemId, Keypair, RoleId, SymmetricKey};
use keyweave_graph::{Capability, Permission};

pub fn symmetric_key() -> impl Strategy<Value = SymmetricKey> {
    any::<[u8; 32]>().prop_map(|bytes| SymmetricKey::derive("keyweave testkit key", &bytes))
}

/// Generate a keypair from a random seed.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

pub fn role_id() -> impl Strategy<Value = RoleId> {
    any::<[u8; 16]>().prop_map(RoleId::from_bytes)
}

pub fn data_item_id() -> impl Strategy<Value = DataItemId> {
    any::<[u8; 16]>().prop_map(DataItemId::from_bytes)
}

/// Generate payload bytes of at most `max_len`.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a reasonable timestamp, negative values included.
pub fn timestamp() -> impl Strategy<Value = i64> {
    -1_000_000i64..=4_102_444_800_000i64
}

pub fn event_type() -> impl Strategy<Value = String> {
    "[A-Z][A-Za-z]{0,23}".prop_map(String::from)
}

pub fn capability() -> impl Strategy<Value = Capability> {
    prop_oneof![
        Just(Capability::Read),
        Just(Capability::Write),
        Just(Capability::Owner),
    ]
}

pub fn permission() -> impl Strategy<Value = Permission> {
    prop_oneof![Just(Permission::Read), Just(Permission::Write)]
}

/// A relationship label the default alias table resolves, in random case.
pub fn relation_label() -> impl Strategy<Value = String> {
    let labels = prop::sample::select(vec![
        "Owner", "Write", "Read", "AdminOf", "OwnerOf", "WriterOf", "EditorOf", "ReaderOf",
        "MemberOf",
    ]);
    (labels, any::<u64>()).prop_map(|(label, mask)| {
        label
            .chars()
            .enumerate()
            .map(|(i, c)| {
                if mask >> (i % 64) & 1 == 1 {
                    c.to_ascii_uppercase()
                } else {
                    c.to_ascii_lowercase()
                }
            })
            .collect()
    })
}

/// JSON without floats, nested up to three levels.
pub fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[ -~]{0,16}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..6)
                .prop_map(|map| Value::Object(map.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// A JSON object payload.
pub fn json_payload() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-z_]{1,12}", json_value(), 0..8)
        .prop_map(|map| Value::Object(map.into_iter().collect()))
}

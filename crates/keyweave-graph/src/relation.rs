//! Relationship labels and the capabilities they confer.
//!
//! Every edge label normalizes to one of three capabilities, ordered
//! `Read < Write < Owner`. Normalization is case-insensitive and folds
//! aliases through a configurable table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::role::KeyKind;

/// What an edge lets the parent recover of the child's keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    #[serde(alias = "read")]
    Read,
    #[serde(alias = "write")]
    Write,
    #[serde(alias = "owner")]
    Owner,
}

impl Capability {
    /// The canonical label, used as keyed-hash input.
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Read => "Read",
            Capability::Write => "Write",
            Capability::Owner => "Owner",
        }
    }

    /// Key kinds an edge with this capability carries copies of.
    pub fn key_kinds(self) -> &'static [KeyKind] {
        match self {
            Capability::Read => &[KeyKind::Read],
            Capability::Write => &[KeyKind::Read, KeyKind::Write],
            Capability::Owner => &[KeyKind::Read, KeyKind::Write, KeyKind::Owner],
        }
    }

    /// Whether this capability includes `other`.
    pub fn includes(self, other: Capability) -> bool {
        self >= other
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alias table mapping relationship labels to capabilities.
///
/// Lookups are case-insensitive. The canonical names `Read`, `Write` and
/// `Owner` always resolve, whatever the table holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationAliases {
    aliases: BTreeMap<String, Capability>,
}

impl Default for RelationAliases {
    fn default() -> Self {
        Self::from_pairs([
            ("AdminOf", Capability::Owner),
            ("OwnerOf", Capability::Owner),
            ("WriterOf", Capability::Write),
            ("EditorOf", Capability::Write),
            ("ReaderOf", Capability::Read),
            ("MemberOf", Capability::Read),
        ])
    }
}

impl RelationAliases {
    /// A table with no aliases; only canonical names resolve.
    pub fn empty() -> Self {
        Self {
            aliases: BTreeMap::new(),
        }
    }

    /// Build a table from `(label, capability)` pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, Capability)>) -> Self {
        let aliases = pairs
            .into_iter()
            .map(|(label, cap)| (fold(label), cap))
            .collect();
        Self { aliases }
    }

    /// Add or replace one alias.
    pub fn insert(&mut self, label: &str, capability: Capability) {
        self.aliases.insert(fold(label), capability);
    }

    /// Resolve a label to its capability.
    pub fn normalize(&self, label: &str) -> Option<Capability> {
        let folded = fold(label);
        match folded.as_str() {
            "read" => Some(Capability::Read),
            "write" => Some(Capability::Write),
            "owner" => Some(Capability::Owner),
            _ => self
                .aliases
                .iter()
                .find(|(alias, _)| fold(alias) == folded)
                .map(|(_, cap)| *cap),
        }
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

fn fold(label: &str) -> String {
    label.trim().to_lowercase()
}

//! Hash-chained, optionally signed ledger entries.
//!
//! ## Overview
//!
//! Each [`Chain`] is an independent append-only sequence. An entry's hash is
//!
//! ```text
//! hash = Blake3(previous_hash || canonical_entry_bytes(event_type, actor, payload_json, timestamp))
//! ```
//!
//! and the first entry of a chain links to [`Blake3Hash::ZERO`]. A signed
//! entry carries an Ed25519 signature over its 32 hash bytes, plus the signer
//! role and the algorithm tag.
//!
//! ## Verification
//!
//! [`verify_chain`] never mutates anything. It recomputes every hash, checks
//! every link against the previous entry's *stored* hash, checks signatures
//! against the signer's current public key, and returns a
//! [`VerificationSummary`] with one [`Finding`] per problem.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::canonical::canonical_entry_bytes;
use crate::crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair, SignatureAlgorithm};
use crate::error::{CoreError, Result};
use crate::types::RoleId;

/// An independent ledger chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// Logins, logouts, session lifecycle.
    Auth,
    /// Role, edge, key and grant lifecycle.
    Key,
    /// Application-level events.
    Business,
}

impl Chain {
    /// Every chain, in a stable order.
    pub const ALL: [Chain; 3] = [Chain::Auth, Chain::Key, Chain::Business];

    pub fn as_str(self) -> &'static str {
        match self {
            Chain::Auth => "auth",
            Chain::Key => "key",
            Chain::Business => "business",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auth" => Ok(Chain::Auth),
            "key" => Ok(Chain::Key),
            "business" => Ok(Chain::Business),
            other => Err(CoreError::DecodingError(format!("unknown chain: {}", other))),
        }
    }
}

/// One persisted ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub chain: Chain,
    /// 1-based position within the chain.
    pub seq: u64,
    /// Unix milliseconds, UTC.
    pub timestamp: i64,
    pub event_type: String,
    pub actor: String,
    pub payload_json: String,
    pub previous_hash: Blake3Hash,
    pub hash: Blake3Hash,
    pub signer_role_id: Option<RoleId>,
    pub signature: Option<Ed25519Signature>,
    pub signature_alg: Option<String>,
}

impl LedgerEntry {
    /// Recompute this entry's hash from its own fields.
    pub fn recompute_hash(&self) -> Result<Blake3Hash> {
        entry_hash(
            &self.previous_hash,
            &self.event_type,
            &self.actor,
            &self.payload_json,
            self.timestamp,
        )
    }

    /// Whether the entry carries a signature.
    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }
}

/// Compute an entry hash from its linked predecessor and content.
pub fn entry_hash(
    previous_hash: &Blake3Hash,
    event_type: &str,
    actor: &str,
    payload_json: &str,
    timestamp: i64,
) -> Result<Blake3Hash> {
    let content = canonical_entry_bytes(event_type, actor, payload_json, timestamp)?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(previous_hash.as_bytes());
    hasher.update(&content);
    Ok(Blake3Hash(*hasher.finalize().as_bytes()))
}

/// The role and private key an entry is signed with.
#[derive(Debug, Clone)]
pub struct SigningContext {
    pub role_id: RoleId,
    pub keypair: Keypair,
    pub algorithm: SignatureAlgorithm,
}

impl SigningContext {
    pub fn ed25519(role_id: RoleId, keypair: Keypair) -> Self {
        Self {
            role_id,
            keypair,
            algorithm: SignatureAlgorithm::Ed25519,
        }
    }
}

/// Builder for ledger entries.
#[derive(Debug, Clone)]
pub struct LedgerEntryBuilder {
    chain: Chain,
    seq: u64,
    previous_hash: Blake3Hash,
    timestamp: i64,
    event_type: String,
    actor: String,
    payload_json: String,
}

impl LedgerEntryBuilder {
    /// Start building the entry at `seq`, linked to `previous_hash`.
    pub fn new(chain: Chain, seq: u64, previous_hash: Blake3Hash) -> Self {
        Self {
            chain,
            seq,
            previous_hash,
            timestamp: 0,
            event_type: String::new(),
            actor: String::new(),
            payload_json: "{}".to_string(),
        }
    }

    /// Set the timestamp.
    pub fn timestamp(mut self, ts: i64) -> Self {
        self.timestamp = ts;
        self
    }

    /// Set the event type.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    /// Set the actor.
    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    /// Set the payload JSON text.
    pub fn payload_json(mut self, payload_json: impl Into<String>) -> Self {
        self.payload_json = payload_json.into();
        self
    }

    /// Hash the entry and, when a signing context is given, sign the hash.
    pub fn build(self, signing: Option<&SigningContext>) -> Result<LedgerEntry> {
        let hash = entry_hash(
            &self.previous_hash,
            &self.event_type,
            &self.actor,
            &self.payload_json,
            self.timestamp,
        )?;

        let (signer_role_id, signature, signature_alg) = match signing {
            Some(ctx) => (
                Some(ctx.role_id),
                Some(ctx.keypair.sign(hash.as_bytes())),
                Some(ctx.algorithm.as_str().to_string()),
            ),
            None => (None, None, None),
        };

        Ok(LedgerEntry {
            chain: self.chain,
            seq: self.seq,
            timestamp: self.timestamp,
            event_type: self.event_type,
            actor: self.actor,
            payload_json: self.payload_json,
            previous_hash: self.previous_hash,
            hash,
            signer_role_id,
            signature,
            signature_alg,
        })
    }
}

/// Which entries are expected to carry a signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignaturePolicy {
    /// Chains whose entries must be signed.
    pub required_chains: BTreeSet<Chain>,
    /// Event types that never need a signature, on any chain.
    pub exempt_event_types: BTreeSet<String>,
}

impl Default for SignaturePolicy {
    fn default() -> Self {
        Self {
            required_chains: [Chain::Key, Chain::Business].into_iter().collect(),
            exempt_event_types: BTreeSet::new(),
        }
    }
}

impl SignaturePolicy {
    /// A policy that never reports missing signatures.
    pub fn none() -> Self {
        Self {
            required_chains: BTreeSet::new(),
            exempt_event_types: BTreeSet::new(),
        }
    }

    pub fn requires_signature(&self, chain: Chain, event_type: &str) -> bool {
        self.required_chains.contains(&chain) && !self.exempt_event_types.contains(event_type)
    }
}

/// A signer's current public key and its algorithm tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerKey {
    pub public_key: Ed25519PublicKey,
    pub algorithm: String,
}

/// Lookup of signer public keys during verification.
pub trait SignerDirectory {
    fn signer_key(&self, role_id: &RoleId) -> Option<SignerKey>;
}

impl SignerDirectory for HashMap<RoleId, SignerKey> {
    fn signer_key(&self, role_id: &RoleId) -> Option<SignerKey> {
        self.get(role_id).cloned()
    }
}

/// What verification found wrong with one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FindingKind {
    /// Stored hash differs from the recomputed one.
    HashMismatch,
    /// Stored previous hash differs from the prior entry's stored hash.
    PreviousHashMismatch,
    /// Signature present but does not verify, or names no usable signer.
    SignatureInvalid,
    /// Policy requires a signature and none is present.
    SignatureMissing,
    /// The entry belongs to a different chain than the one verified.
    ChainMismatch,
}

/// A single verification finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub seq: u64,
    pub kind: FindingKind,
}

/// Per-chain verification result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub chain: Chain,
    pub total_entries: u64,
    pub hash_mismatches: u64,
    pub previous_hash_mismatches: u64,
    pub signatures_verified: u64,
    pub signatures_missing: u64,
    pub signatures_invalid: u64,
    pub chain_mismatches: u64,
    pub findings: Vec<Finding>,
}

impl VerificationSummary {
    fn new(chain: Chain) -> Self {
        Self {
            chain,
            total_entries: 0,
            hash_mismatches: 0,
            previous_hash_mismatches: 0,
            signatures_verified: 0,
            signatures_missing: 0,
            signatures_invalid: 0,
            chain_mismatches: 0,
            findings: Vec::new(),
        }
    }

    /// No findings of any kind.
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    fn record(&mut self, seq: u64, kind: FindingKind) {
        match kind {
            FindingKind::HashMismatch => self.hash_mismatches += 1,
            FindingKind::PreviousHashMismatch => self.previous_hash_mismatches += 1,
            FindingKind::SignatureInvalid => self.signatures_invalid += 1,
            FindingKind::SignatureMissing => self.signatures_missing += 1,
            FindingKind::ChainMismatch => self.chain_mismatches += 1,
        }
        self.findings.push(Finding { seq, kind });
    }
}

enum SignatureCheck {
    Verified,
    Invalid,
    Absent,
}

fn check_signature(entry: &LedgerEntry, signers: &dyn SignerDirectory) -> Result<SignatureCheck> {
    let Some(signature) = &entry.signature else {
        return Ok(SignatureCheck::Absent);
    };
    let (Some(alg), Some(signer)) = (&entry.signature_alg, &entry.signer_role_id) else {
        return Ok(SignatureCheck::Invalid);
    };

    let algorithm = SignatureAlgorithm::parse(alg)?;
    let Some(key) = signers.signer_key(signer) else {
        return Ok(SignatureCheck::Invalid);
    };
    if SignatureAlgorithm::parse(&key.algorithm)? != algorithm {
        return Ok(SignatureCheck::Invalid);
    }

    match algorithm {
        SignatureAlgorithm::Ed25519 => {
            if key.public_key.verify(entry.hash.as_bytes(), signature).is_ok() {
                Ok(SignatureCheck::Verified)
            } else {
                Ok(SignatureCheck::Invalid)
            }
        }
    }
}

/// Verify one chain's entries.
///
/// Entries are walked in `seq` order regardless of the order given. An entry
/// tagged with another chain is reported as [`FindingKind::ChainMismatch`] and
/// still checked. Returns an error only for an algorithm tag this build
/// cannot verify.
pub fn verify_chain(
    chain: Chain,
    entries: &[LedgerEntry],
    policy: &SignaturePolicy,
    signers: &dyn SignerDirectory,
) -> Result<VerificationSummary> {
    let mut ordered: Vec<&LedgerEntry> = entries.iter().collect();
    ordered.sort_by_key(|e| e.seq);

    let mut summary = VerificationSummary::new(chain);
    let mut expected_prev = Blake3Hash::ZERO;

    for entry in ordered {
        summary.total_entries += 1;

        if entry.chain != chain {
            summary.record(entry.seq, FindingKind::ChainMismatch);
        }

        if entry.recompute_hash()? != entry.hash {
            summary.record(entry.seq, FindingKind::HashMismatch);
        }

        if entry.previous_hash != expected_prev {
            summary.record(entry.seq, FindingKind::PreviousHashMismatch);
        }
        expected_prev = entry.hash;

        match check_signature(entry, signers)? {
            SignatureCheck::Verified => summary.signatures_verified += 1,
            SignatureCheck::Invalid => summary.record(entry.seq, FindingKind::SignatureInvalid),
            SignatureCheck::Absent => {
                if policy.requires_signature(chain, &entry.event_type) {
                    summary.record(entry.seq, FindingKind::SignatureMissing);
                }
            }
        }
    }

    tracing::debug!(
        chain = %chain,
        total = summary.total_entries,
        findings = summary.findings.len(),
        "verified ledger chain"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_chain(events: &[(&str, Option<&SigningContext>)]) -> Vec<LedgerEntry> {
        let mut prev = Blake3Hash::ZERO;
        let mut entries = Vec::new();
        for (i, (event_type, signing)) in events.iter().enumerate() {
            let entry = LedgerEntryBuilder::new(Chain::Key, i as u64 + 1, prev)
                .timestamp(1736870400000 + i as i64)
                .event_type(*event_type)
                .actor("system")
                .payload_json(format!(r#"{{"n":{}}}"#, i))
                .build(*signing)
                .unwrap();
            prev = entry.hash;
            entries.push(entry);
        }
        entries
    }

    fn directory(ctx: &SigningContext) -> HashMap<RoleId, SignerKey> {
        let mut dir = HashMap::new();
        dir.insert(
            ctx.role_id,
            SignerKey {
                public_key: ctx.keypair.public_key(),
                algorithm: "Ed25519".into(),
            },
        );
        dir
    }

    #[test]
    fn test_foreign_chain_entry_is_flagged() {
        let mut entries = build_chain(&[("A", None), ("B", None)]);
        entries[1].chain = Chain::Business;

        let summary =
            verify_chain(Chain::Key, &entries, &SignaturePolicy::none(), &HashMap::new()).unwrap();
        assert_eq!(summary.chain, Chain::Key);
        assert_eq!(summary.chain_mismatches, 1);
        assert_eq!(summary.hash_mismatches, 0);
        assert_eq!(summary.previous_hash_mismatches, 0);
        assert_eq!(
            summary.findings,
            vec![Finding {
                seq: 2,
                kind: FindingKind::ChainMismatch
            }]
        );
    }

    #[test]
    fn test_first_entry_links_to_zero() {
        let entries = build_chain(&[("A", None)]);
        assert_eq!(entries[0].previous_hash, Blake3Hash::ZERO);
        assert_eq!(entries[0].recompute_hash().unwrap(), entries[0].hash);
    }

    #[test]
    fn test_unmodified_chain_is_clean() {
        let entries = build_chain(&[("A", None), ("B", None), ("C", None)]);
        let summary =
            verify_chain(Chain::Key, &entries, &SignaturePolicy::none(), &HashMap::new()).unwrap();

        assert_eq!(summary.total_entries, 3);
        assert!(summary.is_clean());
    }

    #[test]
    fn test_empty_chain() {
        let summary =
            verify_chain(Chain::Auth, &[], &SignaturePolicy::default(), &HashMap::new()).unwrap();
        assert_eq!(summary.total_entries, 0);
        assert!(summary.is_clean());
    }

    #[test]
    fn test_payload_tamper_flags_only_that_entry() {
        let mut entries = build_chain(&[("A", None), ("B", None), ("C", None), ("D", None)]);
        entries[1].payload_json = r#"{"n":99}"#.into();

        let summary =
            verify_chain(Chain::Key, &entries, &SignaturePolicy::none(), &HashMap::new()).unwrap();

        assert_eq!(summary.hash_mismatches, 1);
        assert_eq!(summary.previous_hash_mismatches, 0);
        assert_eq!(summary.findings, vec![Finding { seq: 2, kind: FindingKind::HashMismatch }]);
    }

    #[test]
    fn test_replaced_hash_breaks_next_link() {
        let mut entries = build_chain(&[("A", None), ("B", None), ("C", None), ("D", None)]);
        entries[1].payload_json = r#"{"n":99}"#.into();
        entries[1].hash = entries[1].recompute_hash().unwrap();

        let summary =
            verify_chain(Chain::Key, &entries, &SignaturePolicy::none(), &HashMap::new()).unwrap();

        assert_eq!(summary.hash_mismatches, 0);
        assert_eq!(summary.previous_hash_mismatches, 1);
        assert_eq!(
            summary.findings,
            vec![Finding { seq: 3, kind: FindingKind::PreviousHashMismatch }]
        );
    }

    #[test]
    fn test_entries_walked_in_seq_order() {
        let mut entries = build_chain(&[("A", None), ("B", None), ("C", None)]);
        entries.reverse();
        let summary =
            verify_chain(Chain::Key, &entries, &SignaturePolicy::none(), &HashMap::new()).unwrap();
        assert!(summary.is_clean());
    }

    #[test]
    fn test_signed_and_missing_signatures() {
        let signer = SigningContext::ed25519(RoleId::generate(), Keypair::generate());
        let entries = build_chain(&[("RoleEdgeCreated", None), ("RoleFieldKeyCreated", Some(&signer))]);

        let summary = verify_chain(
            Chain::Key,
            &entries,
            &SignaturePolicy::default(),
            &directory(&signer),
        )
        .unwrap();

        assert_eq!(summary.signatures_verified, 1);
        assert_eq!(summary.signatures_missing, 1);
        assert_eq!(summary.hash_mismatches, 0);
        assert_eq!(
            summary.findings,
            vec![Finding { seq: 1, kind: FindingKind::SignatureMissing }]
        );
    }

    #[test]
    fn test_exempt_event_type_not_missing() {
        let mut policy = SignaturePolicy::default();
        policy.exempt_event_types.insert("RoleEdgeCreated".into());

        let entries = build_chain(&[("RoleEdgeCreated", None)]);
        let summary = verify_chain(Chain::Key, &entries, &policy, &HashMap::new()).unwrap();
        assert_eq!(summary.signatures_missing, 0);
    }

    #[test]
    fn test_forged_signature_is_invalid() {
        let claimed = SigningContext::ed25519(RoleId::generate(), Keypair::generate());
        let forger = SigningContext::ed25519(claimed.role_id, Keypair::generate());
        let entries = build_chain(&[("RoleFieldKeyCreated", Some(&forger))]);

        let summary =
            verify_chain(Chain::Key, &entries, &SignaturePolicy::default(), &directory(&claimed))
                .unwrap();

        assert_eq!(summary.signatures_verified, 0);
        assert_eq!(summary.signatures_invalid, 1);
    }

    #[test]
    fn test_unknown_signer_is_invalid() {
        let signer = SigningContext::ed25519(RoleId::generate(), Keypair::generate());
        let entries = build_chain(&[("RoleFieldKeyCreated", Some(&signer))]);

        let summary =
            verify_chain(Chain::Key, &entries, &SignaturePolicy::default(), &HashMap::new())
                .unwrap();
        assert_eq!(summary.signatures_invalid, 1);
    }

    #[test]
    fn test_missing_algorithm_tag_is_invalid() {
        let signer = SigningContext::ed25519(RoleId::generate(), Keypair::generate());
        let mut entries = build_chain(&[("RoleFieldKeyCreated", Some(&signer))]);
        entries[0].signature_alg = None;

        let summary =
            verify_chain(Chain::Key, &entries, &SignaturePolicy::default(), &directory(&signer))
                .unwrap();
        assert_eq!(summary.signatures_invalid, 1);
    }

    #[test]
    fn test_unsupported_algorithm_is_fatal() {
        let signer = SigningContext::ed25519(RoleId::generate(), Keypair::generate());
        let mut entries = build_chain(&[("RoleFieldKeyCreated", Some(&signer))]);
        entries[0].signature_alg = Some("RSA-PSS".into());

        let err =
            verify_chain(Chain::Key, &entries, &SignaturePolicy::default(), &directory(&signer))
                .unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn test_chain_names() {
        for chain in Chain::ALL {
            assert_eq!(chain.as_str().parse::<Chain>().unwrap(), chain);
        }
        assert!("audit".parse::<Chain>().is_err());
    }
}

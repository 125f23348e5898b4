//! Serialized appends to the ledger chains.
//!
//! Each chain has its own mutex held across read-tail, hash and write, so two
//! appends never compute the same position. The store still rejects a second
//! entry at a taken position, which covers writers outside this process.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use keyweave_core::{
    canonical_json, verify_chain, Blake3Hash, Chain, LedgerEntry, LedgerEntryBuilder,
    SignaturePolicy, SignerDirectory, SigningContext, VerificationSummary,
};
use keyweave_store::{InsertResult, Store};

use crate::error::{EngineError, Result};

/// Appends to and verifies the ledger chains of one store.
pub struct Ledger<S: Store> {
    store: Arc<S>,
    locks: HashMap<Chain, Mutex<()>>,
}

impl<S: Store> Ledger<S> {
    pub fn new(store: Arc<S>) -> Self {
        let locks = Chain::ALL.iter().map(|chain| (*chain, Mutex::new(()))).collect();
        Self { store, locks }
    }

    /// Append an entry at the tail of `chain`.
    pub async fn append(
        &self,
        chain: Chain,
        event_type: &str,
        actor: &str,
        payload: &Value,
        timestamp: i64,
        signing: Option<&SigningContext>,
    ) -> Result<LedgerEntry> {
        let payload_json = canonical_json(payload)?;

        let lock = self
            .locks
            .get(&chain)
            .ok_or_else(|| EngineError::InvalidOperation(format!("no lock for {} chain", chain)))?;
        let _guard = lock.lock().await;

        let (seq, previous_hash) = match self.store.ledger_tail(chain).await? {
            Some(tail) => (tail.seq + 1, tail.hash),
            None => (1, Blake3Hash::ZERO),
        };

        let entry = LedgerEntryBuilder::new(chain, seq, previous_hash)
            .timestamp(timestamp)
            .event_type(event_type)
            .actor(actor)
            .payload_json(payload_json)
            .build(signing)?;

        match self.store.append_ledger_entry(&entry).await? {
            InsertResult::Inserted | InsertResult::AlreadyExists => {
                tracing::debug!(
                    chain = %chain,
                    seq,
                    event_type,
                    signed = entry.is_signed(),
                    "appended ledger entry"
                );
                Ok(entry)
            }
            InsertResult::Conflict { existing } => Err(EngineError::LedgerConflict {
                chain,
                seq,
                existing,
            }),
        }
    }

    /// Verify the stored entries of `chain`.
    pub async fn verify(
        &self,
        chain: Chain,
        policy: &SignaturePolicy,
        signers: &dyn SignerDirectory,
    ) -> Result<VerificationSummary> {
        let entries = self.store.ledger_entries(chain).await?;
        Ok(verify_chain(chain, &entries, policy, signers)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyweave_core::{Keypair, RoleId, SignerKey};
    use keyweave_store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_entries_link_in_order() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Ledger::new(store.clone());

        let first = ledger
            .append(Chain::Auth, "SessionOpened", "system", &json!({"n": 1}), 10, None)
            .await
            .unwrap();
        let second = ledger
            .append(Chain::Auth, "SessionClosed", "system", &json!({"n": 2}), 20, None)
            .await
            .unwrap();

        assert_eq!(first.seq, 1);
        assert_eq!(first.previous_hash, Blake3Hash::ZERO);
        assert_eq!(second.seq, 2);
        assert_eq!(second.previous_hash, first.hash);

        let summary = ledger
            .verify(Chain::Auth, &SignaturePolicy::none(), &HashMap::<RoleId, SignerKey>::new())
            .await
            .unwrap();
        assert_eq!(summary.total_entries, 2);
        assert!(summary.is_clean());
    }

    #[tokio::test]
    async fn test_payload_is_canonicalized() {
        let ledger = Ledger::new(Arc::new(MemoryStore::new()));
        let entry = ledger
            .append(Chain::Business, "X", "system", &json!({"b": 1, "a": 2}), 1, None)
            .await
            .unwrap();
        assert_eq!(entry.payload_json, r#"{"a":2,"b":1}"#);
    }

    #[tokio::test]
    async fn test_concurrent_appends_serialize() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(Ledger::new(store.clone()));

        let mut handles = Vec::new();
        for i in 0..16 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .append(Chain::Key, "E", "system", &json!({ "i": i }), i, None)
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let entries = store.ledger_entries(Chain::Key).await.unwrap();
        assert_eq!(entries.len(), 16);
        assert!(entries.iter().enumerate().all(|(i, e)| e.seq == i as u64 + 1));
        let summary = verify_chain(
            Chain::Key,
            &entries,
            &SignaturePolicy::none(),
            &HashMap::<RoleId, SignerKey>::new(),
        )
        .unwrap();
        assert_eq!(summary.previous_hash_mismatches, 0);
    }

    #[tokio::test]
    async fn test_signed_append_verifies() {
        let ledger = Ledger::new(Arc::new(MemoryStore::new()));
        let ctx = SigningContext::ed25519(RoleId::generate(), Keypair::generate());

        ledger
            .append(Chain::Key, "RoleCreated", "system", &json!({}), 1, Some(&ctx))
            .await
            .unwrap();

        let mut signers = HashMap::new();
        signers.insert(
            ctx.role_id,
            SignerKey {
                public_key: ctx.keypair.public_key(),
                algorithm: "Ed25519".into(),
            },
        );
        let summary = ledger
            .verify(Chain::Key, &SignaturePolicy::default(), &signers)
            .await
            .unwrap();
        assert_eq!(summary.signatures_verified, 1);
        assert!(summary.is_clean());
    }
}

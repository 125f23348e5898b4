//! End-to-end scenarios through the engine.

use std::collections::HashMap;

use serde_json::json;

use keyweave::events;
use keyweave::{
    Engine, EngineConfig, EngineError, GrantOutcome, KeyKind, KeyRingCache, Permission, SessionId,
};
use keyweave_core::{Chain, Finding, FindingKind};
use keyweave_store::{MemoryStore, Store};
use keyweave_testkit::{init_test_tracing, EngineFixture, GraphFixture, SECRET};

#[tokio::test]
async fn owner_edge_with_signed_and_unsigned_entries() {
    init_test_tracing();

    let mut fx = GraphFixture::new();
    let p = fx.role("P").unwrap();
    let q = fx.role("Q").unwrap();
    fx.link(p, q, "Owner").unwrap();

    let ring = fx.ring_from(&[p]);
    assert!(ring.get(&p).unwrap().is_complete());
    assert!(ring.get(&q).unwrap().is_complete());

    let store = MemoryStore::new();
    for id in [p, q] {
        store.insert_role(fx.role_record(&id).unwrap()).await.unwrap();
    }
    for edge in fx.edges() {
        store.insert_edge(edge).await.unwrap();
    }
    let engine = Engine::with_memory_cache(store, EngineConfig::default()).unwrap();

    let roots = HashMap::from([(p, fx.keys(&p).clone())]);
    let built = engine.build_key_ring(roots).await.unwrap();
    assert!(built.get(&q).unwrap().is_complete());

    engine
        .append(
            Chain::Key,
            events::ROLE_EDGE_CREATED,
            "system",
            &json!({ "parent": p, "child": q }),
            None,
        )
        .await
        .unwrap();
    engine
        .append(
            Chain::Key,
            events::ROLE_FIELD_KEY_CREATED,
            &p.to_string(),
            &json!({ "role_id": p }),
            Some((&built, p)),
        )
        .await
        .unwrap();

    let summary = engine.verify(Chain::Key).await.unwrap();
    assert_eq!(summary.total_entries, 2);
    assert_eq!(summary.signatures_verified, 1);
    assert_eq!(summary.signatures_missing, 1);
    assert_eq!(summary.hash_mismatches, 0);
    assert_eq!(summary.previous_hash_mismatches, 0);
}

#[tokio::test]
async fn tampered_payload_flags_only_that_entry() {
    let fx = EngineFixture::memory().unwrap();
    let (p, ring) = fx.principal("p").await.unwrap();
    for n in 0..3 {
        fx.engine
            .record_business_event(&ring, p, "InvoiceIssued", json!({ "n": n }))
            .await
            .unwrap();
    }

    let mut entries = fx.engine.store().ledger_entries(Chain::Business).await.unwrap();
    entries[1].payload_json = r#"{"n":99}"#.to_string();

    let summary = fx.engine.verify_entries(Chain::Business, &entries).await.unwrap();
    assert_eq!(summary.hash_mismatches, 1);
    assert_eq!(summary.previous_hash_mismatches, 0);
    assert!(summary.findings.contains(&Finding {
        seq: 2,
        kind: FindingKind::HashMismatch
    }));

    let stored = fx.engine.verify(Chain::Business).await.unwrap();
    assert!(stored.is_clean());
}

#[test]
fn capabilities_do_not_compose_upwards() {
    let mut fx = GraphFixture::new();
    let a = fx.role("A").unwrap();
    let b = fx.role("B").unwrap();
    let c = fx.role("C").unwrap();
    fx.link(a, b, "Read").unwrap();
    fx.link(b, c, "Write").unwrap();

    let ring = fx.ring_from(&[a]);
    assert!(ring.has(&b, KeyKind::Read));
    assert!(!ring.has(&b, KeyKind::Write));
    assert!(!ring.has(&c, KeyKind::Write));

    let from_b = fx.ring_from(&[b]);
    assert!(from_b.has(&c, KeyKind::Write));
    assert!(!from_b.has(&c, KeyKind::Owner));
}

#[tokio::test]
async fn revocation_stops_later_resolution() {
    let fx = EngineFixture::memory().unwrap();
    let (owner, owner_ring) = fx.principal("owner").await.unwrap();
    let (reader, reader_ring) = fx.principal("reader").await.unwrap();

    let item = fx.engine.create_data_item(&owner_ring, owner).await.unwrap();
    let blob = fx.engine.seal_field(&owner_ring, item, b"secret note").await.unwrap();

    fx.engine
        .grant_data_key(&owner_ring, item, reader, Permission::Read)
        .await
        .unwrap();
    let grant = fx.engine.accept_shares(&reader_ring, reader).await.unwrap()[0];
    let held = fx.engine.resolve_data_key(item, &reader_ring).await.unwrap();

    assert!(fx.engine.revoke_grant(&owner_ring, item, grant).await.unwrap());
    assert!(matches!(
        fx.engine.open_field(&reader_ring, item, &blob).await,
        Err(EngineError::Forbidden)
    ));

    let opened = keyweave_graph::open_field(&held, item, &blob).unwrap();
    assert_eq!(opened, b"secret note");
}

#[tokio::test]
async fn grantee_may_revoke_its_own_grant() {
    let fx = EngineFixture::memory().unwrap();
    let (owner, owner_ring) = fx.principal("owner").await.unwrap();
    let (reader, reader_ring) = fx.principal("reader").await.unwrap();
    let (_, stranger_ring) = fx.principal("stranger").await.unwrap();

    let item = fx.engine.create_data_item(&owner_ring, owner).await.unwrap();
    fx.engine
        .grant_data_key(&owner_ring, item, reader, Permission::Read)
        .await
        .unwrap();
    let grant = fx.engine.accept_shares(&reader_ring, reader).await.unwrap()[0];

    assert!(matches!(
        fx.engine.revoke_grant(&stranger_ring, item, grant).await,
        Err(EngineError::Forbidden)
    ));
    assert!(fx.engine.revoke_grant(&reader_ring, item, grant).await.unwrap());
}

#[tokio::test]
async fn sealed_share_reaches_unrelated_principal() {
    let fx = EngineFixture::memory().unwrap();
    let (alice, alice_ring) = fx.principal("alice").await.unwrap();
    let (bob, bob_ring) = fx.principal("bob").await.unwrap();

    let item = fx.engine.create_data_item(&alice_ring, alice).await.unwrap();
    let blob = fx.engine.seal_field(&alice_ring, item, b"hello bob").await.unwrap();

    let outcome = fx
        .engine
        .grant_data_key(&alice_ring, item, bob, Permission::Write)
        .await
        .unwrap();
    let GrantOutcome::Sealed(share) = outcome else {
        panic!("expected a sealed share, got {:?}", outcome);
    };
    assert_eq!(fx.engine.store().pending_shares_for(&bob).await.unwrap()[0].id, share);

    assert_eq!(fx.engine.accept_shares(&bob_ring, bob).await.unwrap().len(), 1);
    assert_eq!(fx.engine.open_field(&bob_ring, item, &blob).await.unwrap(), b"hello bob");
    let reply = fx.engine.seal_field(&bob_ring, item, b"hi alice").await.unwrap();
    assert_eq!(fx.engine.open_field(&alice_ring, item, &reply).await.unwrap(), b"hi alice");

    let key_chain = fx.engine.verify(Chain::Key).await.unwrap();
    assert!(key_chain.is_clean(), "{:?}", key_chain.findings);
}

#[tokio::test]
async fn rotation_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keyweave.db");

    let (p, team, docs, item, blob) = {
        let fx = EngineFixture::sqlite(&path).unwrap();
        let (p, ring) = fx.principal("p").await.unwrap();
        let team = fx.engine.create_role(&ring, p, "team", "AdminOf").await.unwrap().id;
        let ring = fx.ring(p).await.unwrap();
        let docs = fx.engine.create_role(&ring, team, "docs", "ReaderOf").await.unwrap().id;
        let ring = fx.ring(p).await.unwrap();
        let item = fx.engine.create_data_item(&ring, team).await.unwrap();
        let blob = fx.engine.seal_field(&ring, item, b"roadmap").await.unwrap();

        fx.engine.rotate_role_keys(&ring, team).await.unwrap();
        (p, team, docs, item, blob)
    };

    let fx = EngineFixture::sqlite(&path).unwrap();
    let ring = fx.ring(p).await.unwrap();
    assert!(ring.get(&team).unwrap().is_complete());
    assert!(ring.has(&docs, KeyKind::Read));
    assert!(!ring.has(&docs, KeyKind::Write));
    assert_eq!(fx.engine.open_field(&ring, item, &blob).await.unwrap(), b"roadmap");

    let summary = fx.engine.verify(Chain::Key).await.unwrap();
    assert_eq!(summary.hash_mismatches, 0);
    assert_eq!(summary.previous_hash_mismatches, 0);
}

#[tokio::test]
async fn rotation_needs_every_parent() {
    let fx = EngineFixture::memory().unwrap();
    let (p, p_ring) = fx.principal("p").await.unwrap();
    let (q, q_ring) = fx.principal("q").await.unwrap();

    let shared = fx.engine.create_role(&p_ring, p, "shared", "AdminOf").await.unwrap().id;
    let p_ring = fx.ring(p).await.unwrap();

    let mut both = p_ring.clone();
    for kind in KeyKind::ALL {
        if let Some(key) = q_ring.key(&q, kind) {
            both.insert_if_absent(q, kind, key.clone());
        }
    }
    fx.engine.create_edge(&both, q, shared, "MemberOf").await.unwrap();

    assert!(matches!(
        fx.engine.rotate_role_keys(&p_ring, shared).await,
        Err(EngineError::Forbidden)
    ));
    fx.engine.rotate_role_keys(&both, shared).await.unwrap();

    let q_ring = fx.ring(q).await.unwrap();
    assert!(q_ring.has(&shared, KeyKind::Read));
    assert!(!q_ring.has(&shared, KeyKind::Write));
}

#[tokio::test]
async fn grants_invalidate_grantee_sessions() {
    let fx = EngineFixture::memory().unwrap();
    let (alice, _) = fx.principal("alice").await.unwrap();
    let (bob, _) = fx.principal("bob").await.unwrap();

    let alice_session = SessionId::new("alice");
    let bob_session = SessionId::new("bob");
    let alice_ring = fx.engine.open_session(alice_session, alice, SECRET).await.unwrap();
    fx.engine.open_session(bob_session.clone(), bob, SECRET).await.unwrap();

    let item = fx.engine.create_data_item(&alice_ring, alice).await.unwrap();
    fx.engine
        .grant_data_key(&alice_ring, item, bob, Permission::Read)
        .await
        .unwrap();
    assert!(fx.engine.cache().get(&bob_session).unwrap().ring.is_none());

    let bob_ring = fx.engine.session_ring(&bob_session).await.unwrap();
    assert!(fx.engine.cache().get(&bob_session).unwrap().ring.is_some());
    fx.engine.accept_shares(&bob_ring, bob).await.unwrap();
    assert!(fx.engine.resolve_data_key(item, &bob_ring).await.is_ok());
}

#[tokio::test]
async fn failed_login_is_recorded() {
    let fx = EngineFixture::memory().unwrap();
    let (alice, _) = fx.principal("alice").await.unwrap();

    let err = fx
        .engine
        .open_session(SessionId::new("s"), alice, b"not the secret")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "forbidden");

    let summaries = fx.engine.verify_all().await.unwrap();
    let auth = summaries.iter().find(|s| s.chain == Chain::Auth).unwrap();
    assert_eq!(auth.total_entries, 1);
    assert!(auth.is_clean());
}

//! Behaviour every [`Store`] implementation must share.
//!
//! Each backend's test module runs these against a fresh store.

use keyweave_core::{
    Blake3Hash, Chain, DataItemId, GrantId, LedgerEntry, LedgerEntryBuilder, RoleId, ShareId,
    SigningContext, SymmetricKey,
};
use keyweave_graph::{
    DataKeyGrant, KeyEntry, KeyKind, Permission, RelationAliases, Role, RoleEdge, RoleKeys,
    SealedShare,
};

use crate::error::StoreError;
use crate::traits::{InsertResult, RoleRotation, Store};

fn role(name: &str) -> (Role, RoleKeys) {
    let (role, material) = Role::create(name, 1_000).unwrap();
    (role, material.keys)
}

fn edge(parent: &(Role, RoleKeys), child: &(Role, RoleKeys), label: &str) -> RoleEdge {
    RoleEdge::mint(
        parent.0.id,
        &parent.1,
        child.0.id,
        &child.1,
        label,
        &RelationAliases::default(),
        2_000,
    )
    .unwrap()
}

fn entry(chain: Chain, seq: u64, prev: Blake3Hash, event: &str) -> LedgerEntry {
    LedgerEntryBuilder::new(chain, seq, prev)
        .timestamp(1_736_870_400_000 + seq as i64)
        .event_type(event)
        .actor("system")
        .payload_json(format!("{{\"seq\":{}}}", seq))
        .build(None)
        .unwrap()
}

pub async fn roles<S: Store>(store: &S) {
    let (mut alice, keys) = role("alice");
    alice.kdf_salt = Some(vec![7; 16]);
    let (bob, _) = role("bob");

    store.insert_role(&alice).await.unwrap();
    store.insert_role(&bob).await.unwrap();
    assert!(matches!(
        store.insert_role(&alice).await,
        Err(StoreError::Conflict(_))
    ));

    let loaded = store.get_role(&alice.id).await.unwrap().unwrap();
    assert_eq!(loaded, alice);
    assert!(loaded.open_secrets(&keys).is_ok());
    assert!(store.get_role(&RoleId::generate()).await.unwrap().is_none());

    let mut rotated = alice.clone();
    let material = rotated.rotate(5_000).unwrap();
    store.update_role(&rotated).await.unwrap();
    let loaded = store.get_role(&alice.id).await.unwrap().unwrap();
    assert_eq!(loaded.updated_at, 5_000);
    assert!(loaded.open_secrets(&material.keys).is_ok());

    let (ghost, _) = role("ghost");
    assert!(matches!(
        store.update_role(&ghost).await,
        Err(StoreError::NotFound(_))
    ));

    let listed = store.list_roles().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.windows(2).all(|w| w[0].id < w[1].id));
}

pub async fn edges<S: Store>(store: &S) {
    let p = role("parent");
    let c = role("child");
    let g = role("grandchild");

    let pc = edge(&p, &c, "AdminOf");
    let cg = edge(&c, &g, "MemberOf");
    store.insert_edge(&pc).await.unwrap();
    store.insert_edge(&cg).await.unwrap();

    assert!(matches!(
        store.insert_edge(&edge(&p, &c, "ReaderOf")).await,
        Err(StoreError::Conflict(_))
    ));

    let loaded = store.get_edge(&p.0.id, &c.0.id).await.unwrap().unwrap();
    assert_eq!(loaded, pc);
    assert!(loaded.owner_copy.is_some());

    let from_c = store.edges_from(&c.0.id).await.unwrap();
    assert_eq!(from_c, vec![cg.clone()]);
    assert!(from_c[0].write_copy.is_none());
    let to_c = store.edges_to(&c.0.id).await.unwrap();
    assert_eq!(to_c, vec![pc.clone()]);
    assert_eq!(store.list_edges().await.unwrap().len(), 2);

    assert!(store.remove_edge(&p.0.id, &c.0.id).await.unwrap());
    assert!(!store.remove_edge(&p.0.id, &c.0.id).await.unwrap());
    assert!(store.get_edge(&p.0.id, &c.0.id).await.unwrap().is_none());
    assert_eq!(store.list_edges().await.unwrap(), vec![cg]);
}

pub async fn key_entries<S: Store>(store: &S) {
    let (principal, keys) = role("principal");
    let (team, team_keys) = role("team");
    let root = SymmetricKey::generate();

    let own = KeyEntry::wrap_all(principal.id, principal.id, &keys, &root, Some(1), 1).unwrap();
    store.insert_key_entries(&own).await.unwrap();

    let mut batch = KeyEntry::wrap_all(principal.id, team.id, &team_keys, &root, Some(2), 2).unwrap();
    batch.push(own[0].clone());
    assert!(matches!(
        store.insert_key_entries(&batch).await,
        Err(StoreError::Conflict(_))
    ));
    // A failed batch writes nothing.
    assert_eq!(store.key_entries_for(&principal.id).await.unwrap().len(), 3);

    batch.pop();
    store.insert_key_entries(&batch).await.unwrap();

    let entries = store.key_entries_for(&principal.id).await.unwrap();
    assert_eq!(entries.len(), 6);
    let roots = keyweave_graph::unlock_root_keys(&entries, &root);
    assert!(roots[&team.id].is_complete());
    assert_eq!(
        roots[&team.id].get(KeyKind::Owner).unwrap().as_bytes(),
        team_keys.get(KeyKind::Owner).unwrap().as_bytes()
    );

    assert!(store.key_entries_for(&team.id).await.unwrap().is_empty());
}

pub async fn grants<S: Store>(store: &S) {
    let (team, keys) = role("team");
    let item = DataItemId::generate();
    let data_key = SymmetricKey::generate();
    let read = keys.get(KeyKind::Read).unwrap();

    let first = DataKeyGrant::wrap(item, team.id, read, Permission::Read, &data_key, None, 10).unwrap();
    let second =
        DataKeyGrant::wrap(item, team.id, read, Permission::Write, &data_key, Some(team.id), 20).unwrap();
    store.insert_grant(&first).await.unwrap();
    store.insert_grant(&second).await.unwrap();
    assert!(matches!(
        store.insert_grant(&first).await,
        Err(StoreError::Conflict(_))
    ));

    assert_eq!(store.get_grant(&first.id).await.unwrap().unwrap(), first);
    assert!(store.get_grant(&GrantId::generate()).await.unwrap().is_none());
    assert_eq!(
        store.grants_for_item(&item).await.unwrap(),
        vec![first.clone(), second.clone()]
    );
    assert_eq!(store.grants_for_grantee(&team.id).await.unwrap().len(), 2);
    assert!(store.grants_for_item(&DataItemId::generate()).await.unwrap().is_empty());

    assert!(store.revoke_grant(&first.id, 30).await.unwrap());
    assert!(!store.revoke_grant(&first.id, 40).await.unwrap());
    assert!(!store.revoke_grant(&GrantId::generate(), 40).await.unwrap());
    let revoked = store.get_grant(&first.id).await.unwrap().unwrap();
    assert_eq!(revoked.revoked_at, Some(30));
    // Revoked grants are kept.
    assert_eq!(store.grants_for_item(&item).await.unwrap().len(), 2);

    let fresh = RoleKeys::generate();
    let mut rewrapped = second.clone();
    rewrapped.wrapped_key = fresh
        .get(KeyKind::Read)
        .unwrap()
        .wrap_key(&data_key, team.id.as_bytes())
        .unwrap()
        .into();
    store.update_grant(&rewrapped).await.unwrap();
    let loaded = store.get_grant(&second.id).await.unwrap().unwrap();
    assert_eq!(
        loaded.unwrap(fresh.get(KeyKind::Read).unwrap()).unwrap().as_bytes(),
        data_key.as_bytes()
    );

    let orphan = DataKeyGrant::wrap(item, team.id, read, Permission::Read, &data_key, None, 50).unwrap();
    assert!(matches!(
        store.update_grant(&orphan).await,
        Err(StoreError::NotFound(_))
    ));
}

pub async fn batches<S: Store>(store: &S) {
    let (principal, keys) = role("principal");
    let root = SymmetricKey::generate();
    let mut entries =
        KeyEntry::wrap_all(principal.id, principal.id, &keys, &root, Some(1), 1).unwrap();
    entries.push(entries[0].clone());
    assert!(matches!(
        store.insert_principal(&principal, &entries).await,
        Err(StoreError::Conflict(_))
    ));
    assert!(store.get_role(&principal.id).await.unwrap().is_none());
    assert!(store.key_entries_for(&principal.id).await.unwrap().is_empty());

    entries.pop();
    store.insert_principal(&principal, &entries).await.unwrap();
    assert_eq!(store.key_entries_for(&principal.id).await.unwrap().len(), 3);

    let parent = (principal.clone(), keys.clone());
    let child = role("child");
    let link = edge(&parent, &child, "Owner");
    assert!(matches!(
        store.insert_role_with_edge(&principal, &link).await,
        Err(StoreError::Conflict(_))
    ));
    assert!(store.get_edge(&principal.id, &child.0.id).await.unwrap().is_none());
    store.insert_role_with_edge(&child.0, &link).await.unwrap();
    assert_eq!(store.edges_to(&child.0.id).await.unwrap(), vec![link.clone()]);

    let item = DataItemId::generate();
    let data_key = SymmetricKey::generate();
    let old_read = child.1.get(KeyKind::Read).unwrap();
    let grant =
        DataKeyGrant::wrap(item, child.0.id, old_read, Permission::Read, &data_key, None, 10).unwrap();
    store.insert_grant(&grant).await.unwrap();
    let share = SealedShare::create(
        item,
        child.0.id,
        &child.0.encryption_public,
        Permission::Write,
        &data_key,
        Some(principal.id),
        10,
    )
    .unwrap();
    store.insert_share(&share).await.unwrap();

    let old_secrets = child.0.open_secrets(&child.1).unwrap();
    let mut rotated = child.0.clone();
    let material = rotated.rotate(3_000).unwrap();
    let new_read = material.keys.get(KeyKind::Read).unwrap();
    let relinked = edge(&parent, &(rotated.clone(), material.keys.clone()), "Owner");
    let rewrapped = grant.rewrap(old_read, new_read).unwrap();
    let accepted = share.accept(&old_secrets.encryption, new_read, 3_000).unwrap();

    // The unknown grant fails after the role and edge were already written.
    let unknown =
        DataKeyGrant::wrap(item, child.0.id, new_read, Permission::Read, &data_key, None, 20).unwrap();
    let failing = RoleRotation {
        role: rotated.clone(),
        edges: vec![relinked.clone()],
        grants: vec![rewrapped.clone(), unknown],
        accepted: vec![(share.id, accepted.clone())],
        at: 3_000,
    };
    assert!(matches!(
        store.apply_rotation(&failing).await,
        Err(StoreError::NotFound(_))
    ));
    assert_eq!(store.get_role(&child.0.id).await.unwrap().unwrap(), child.0);
    assert_eq!(store.get_edge(&principal.id, &child.0.id).await.unwrap().unwrap(), link);
    assert_eq!(store.get_grant(&grant.id).await.unwrap().unwrap(), grant);
    assert_eq!(store.pending_shares_for(&child.0.id).await.unwrap().len(), 1);
    assert!(store.get_grant(&accepted.id).await.unwrap().is_none());

    let rotation = RoleRotation {
        grants: vec![rewrapped.clone()],
        ..failing
    };
    store.apply_rotation(&rotation).await.unwrap();
    assert_eq!(store.get_role(&child.0.id).await.unwrap().unwrap(), rotated);
    assert_eq!(store.list_edges().await.unwrap(), vec![relinked]);
    assert_eq!(store.get_grant(&grant.id).await.unwrap().unwrap(), rewrapped);
    assert!(store.pending_shares_for(&child.0.id).await.unwrap().is_empty());
    assert_eq!(store.get_grant(&accepted.id).await.unwrap().unwrap(), accepted);
}

pub async fn shares<S: Store>(store: &S) {
    let (team, keys) = role("team");
    let (other, _) = role("other");
    let data_key = SymmetricKey::generate();

    let share = SealedShare::create(
        DataItemId::generate(),
        team.id,
        &team.encryption_public,
        Permission::Write,
        &data_key,
        Some(other.id),
        10,
    )
    .unwrap();
    store.insert_share(&share).await.unwrap();
    assert!(matches!(
        store.insert_share(&share).await,
        Err(StoreError::Conflict(_))
    ));

    let pending = store.pending_shares_for(&team.id).await.unwrap();
    assert_eq!(pending, vec![share.clone()]);
    assert!(store.pending_shares_for(&other.id).await.unwrap().is_empty());

    let secrets = team.open_secrets(&keys).unwrap();
    assert_eq!(
        pending[0].open(&secrets.encryption).unwrap().as_bytes(),
        data_key.as_bytes()
    );

    assert!(store.mark_share_accepted(&share.id, 20).await.unwrap());
    assert!(!store.mark_share_accepted(&share.id, 30).await.unwrap());
    assert!(!store.mark_share_accepted(&ShareId::generate(), 30).await.unwrap());
    assert!(store.pending_shares_for(&team.id).await.unwrap().is_empty());
}

pub async fn ledger<S: Store>(store: &S) {
    assert!(store.ledger_tail(Chain::Key).await.unwrap().is_none());
    assert!(store.ledger_entries(Chain::Key).await.unwrap().is_empty());

    let e1 = entry(Chain::Key, 1, Blake3Hash::ZERO, "RoleCreated");
    let e2 = entry(Chain::Key, 2, e1.hash, "RoleEdgeCreated");
    assert_eq!(store.append_ledger_entry(&e1).await.unwrap(), InsertResult::Inserted);
    assert_eq!(store.append_ledger_entry(&e2).await.unwrap(), InsertResult::Inserted);
    assert_eq!(
        store.append_ledger_entry(&e2).await.unwrap(),
        InsertResult::AlreadyExists
    );

    let rival = entry(Chain::Key, 2, e1.hash, "GrantRevoked");
    assert_eq!(
        store.append_ledger_entry(&rival).await.unwrap(),
        InsertResult::Conflict { existing: e2.hash }
    );

    // Chains number independently.
    let auth = entry(Chain::Auth, 1, Blake3Hash::ZERO, "SessionOpened");
    assert_eq!(store.append_ledger_entry(&auth).await.unwrap(), InsertResult::Inserted);

    let (signer, keys) = role("signer");
    let ctx: SigningContext = signer.signing_context(&keys).unwrap();
    let e3 = LedgerEntryBuilder::new(Chain::Key, 3, e2.hash)
        .timestamp(1_736_870_400_003)
        .event_type("DataKeyGranted")
        .actor(signer.id.to_string())
        .payload_json("{}")
        .build(Some(&ctx))
        .unwrap();
    store.append_ledger_entry(&e3).await.unwrap();

    let tail = store.ledger_tail(Chain::Key).await.unwrap().unwrap();
    assert_eq!(tail, e3);
    assert!(tail.is_signed());

    let entries = store.ledger_entries(Chain::Key).await.unwrap();
    assert_eq!(entries, vec![e1, e2, e3]);
    assert_eq!(store.ledger_entries(Chain::Auth).await.unwrap(), vec![auth]);
    assert!(store.ledger_entries(Chain::Business).await.unwrap().is_empty());
}

//! # keyweave Core
//!
//! Pure primitives for keyweave: authenticated encryption, signatures, key
//! derivation, and hash-chained ledger entries.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`SymmetricKey`] - A 256-bit ChaCha20-Poly1305 key with AAD-bound blobs
//! - [`Keypair`] - Ed25519 signing key for roles
//! - [`KdfParams`] - Argon2id parameters for root key derivation
//! - [`LedgerEntry`] - One hash-chained, optionally signed ledger record
//! - [`VerificationSummary`] - Per-chain result of [`verify_chain`]
//!
//! ## Canonicalization
//!
//! Ledger content is hashed over deterministic CBOR. See [`canonical`] module.

pub mod canonical;
pub mod cipher;
pub mod crypto;
pub mod error;
pub mod kdf;
pub mod ledger;
pub mod types;

pub use canonical::{canonical_entry_bytes, canonical_json};
pub use cipher::{IntegrityError, SymmetricKey, KEY_LEN, NONCE_LEN, TAG_LEN};
pub use crypto::{
    Blake3Hash, Ed25519PublicKey, Ed25519Signature, EncryptionAlgorithm, EphemeralKeyPair,
    Keypair, SharedKey, SignatureAlgorithm, X25519PublicKey, X25519StaticSecret,
};
pub use error::{CoreError, Result};
pub use kdf::{derive_root_key, generate_salt, KdfParams};
pub use ledger::{
    entry_hash, verify_chain, Chain, Finding, FindingKind, LedgerEntry, LedgerEntryBuilder,
    SignaturePolicy, SignerDirectory, SignerKey, SigningContext, VerificationSummary,
};
pub use types::{DataItemId, GrantId, RoleId, SessionId, ShareId};

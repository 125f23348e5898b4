//! # keyweave Testkit
//!
//! Testing utilities for keyweave.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Canonical vectors**: known entry encodings every implementation must reproduce
//! - **Generators**: proptest strategies for keys, ids, labels and payloads
//! - **Fixtures**: in-memory role graphs and ready-made engines
//!
//! ## Canonical Vectors
//!
//! ```rust
//! use keyweave_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, hex) in verify_all_vectors() {
//!     assert!(matches, "{}: {}", name, hex);
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use keyweave_testkit::fixtures::GraphFixture;
//!
//! let mut fx = GraphFixture::new();
//! let p = fx.role("p").unwrap();
//! let q = fx.role("q").unwrap();
//! fx.link(p, q, "AdminOf").unwrap();
//! assert!(fx.ring_from(&[p]).contains_role(&q));
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{build_chain, EngineFixture, GraphFixture, SECRET};

/// Route `tracing` output to the test harness. Safe to call more than once.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();
}

//! # Gridcert Testkit
//!
//! Testing utilities for the gridcert engine.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Verification vectors**: Known chain-event sequences with expected
//!   verification outcomes
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: Helper structs for setting up engine test scenarios
//!
//! ## Verification Vectors
//!
//! Vectors pin the verifier's judgement on fixed event sequences:
//!
//! ```rust
//! use gridcert_core::verify_chain;
//! use gridcert_testkit::vectors::all_vectors;
//!
//! for vector in all_vectors() {
//!     let report = verify_chain(vector.certificate_id, &vector.events);
//!     assert_eq!(report.is_valid, vector.expected_valid, "{}", vector.name);
//! }
//! ```
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use gridcert_core::verify_chain;
//! use gridcert_testkit::generators::chain;
//!
//! proptest! {
//!     #[test]
//!     fn verification_is_pure((id, events) in chain(16)) {
//!         prop_assert_eq!(verify_chain(id, &events), verify_chain(id, &events));
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! Quickly set up an engine over a fresh in-memory store:
//!
//! ```rust,ignore
//! use gridcert::{Kwh, PowerType};
//! use gridcert_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new();
//! let source = fixture.onboard_source("sunfield", PowerType::Solar).await;
//! let cert = fixture.issue(&source, Kwh(50_000), TestFixture::ts(2024, 1, 31, 12)).await;
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::TestFixture;
pub use generators::{chain, chain_event, kwh, positive_kwh, power_type};
pub use vectors::{all_vectors, vectors_json, verify_all_vectors, ChainVector};

//! # Gridcert Store
//!
//! Storage abstraction for the gridcert engine. Provides trait-based
//! interfaces for the external collaborators (source registry,
//! certificate/consumption store, append-only chain log) with SQLite
//! and in-memory implementations.
//!
//! ## Key Types
//!
//! - [`SourceRegistry`], [`CertificateStore`], [`ChainLog`] - The async
//!   collaborator contracts
//! - [`Backend`] - Their supertrait; what the engine runs against
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`InsertOutcome`] - Result of inserting a certificate
//!
//! ## Design Notes
//!
//! - **Authoritative duplicate check**: the `(facility, period)` uniqueness
//!   rule is enforced by the store (and by a partial unique index in SQLite),
//!   never by an in-process cache, so it holds across process instances.
//! - **Idempotent chain appends**: the log is at-least-once; appends
//!   de-duplicate by content-derived event id.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{
    Backend, CertificateFilter, CertificateStore, ChainLog, InsertOutcome, SourceRegistry,
    TimeWindow,
};

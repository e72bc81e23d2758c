//! # Gridcert
//!
//! The green-power certification and consumption-tracing engine: raw
//! renewable-generation measurements become auditable certificates,
//! certificates are allocated against consumption on a
//! conservation-of-amount basis, and the resulting chain of custody is
//! verifiable end to end.
//!
//! ## Key Concepts
//!
//! - **Generation record**: Immutable measurement. Never edited.
//! - **Certificate**: A claim on generation with a bounded validity window
//!   and a mutable remaining balance. `used + remaining == amount` always.
//! - **Chain**: The ordered, append-only event log of one certificate,
//!   replayed by the verifier to audit conservation.
//! - **Allocation**: Greedy matching of demand against supply; shortfalls
//!   become grid draw, never errors.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use gridcert::{Engine, EngineConfig};
//! use gridcert::core::{GreenPowerSource, Kwh, PowerType};
//! use gridcert::store::SqliteStore;
//!
//! async fn example() {
//!     let store = SqliteStore::open("gridcert.db").unwrap();
//!     let engine = Engine::new(store, EngineConfig::default());
//!
//!     let source = GreenPowerSource::new(
//!         "Sunfield Park",
//!         PowerType::Solar,
//!         12_000,
//!         0.21,
//!         "grid-west-04",
//!         Utc::now(),
//!     );
//!     let source_id = engine.register_source(source).await.unwrap();
//!
//!     // Eligible measurements issue a certificate as a side effect.
//!     let outcome = engine
//!         .record_generation(&source_id, Kwh(50_000), Utc::now())
//!         .await
//!         .unwrap();
//!     assert!(outcome.certificate.is_some());
//! }
//! ```
//!
//! ## Concurrency
//!
//! Balance mutations are serialized per certificate id, never globally;
//! operations on different certificates run fully in parallel. Lock waits
//! are bounded and fail with a retryable error. Reports read snapshots
//! without locking.
//!
//! ## Re-exports
//!
//! - `gridcert::core` - Domain primitives (certificates, events, verifier)
//! - `gridcert::store` - Storage traits, SQLite and in-memory backends

pub mod allocation;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod locks;
pub mod report;

// Re-export component crates
pub use gridcert_core as core;
pub use gridcert_store as store;

// Re-export main types for convenience
pub use allocation::SplitOutcome;
pub use config::{AllocationPolicy, EngineConfig};
pub use engine::{BatchVerifyReport, Engine, IngestOutcome};
pub use error::{EngineError, Result};
pub use events::{EngineEvent, EventBus};
pub use report::{
    ConsumerBreakdown, ConsumptionReport, PowerTypeBreakdown, ProductionReport,
    RenewableRatioReport,
};

// Re-export commonly used core types
pub use gridcert_core::{
    Certificate, CertificateId, CertificateStatus, ChainEvent, ChainEventKind, ChainReport,
    ConsumptionRecord, EntityId, GenerationPeriod, GenerationRecord, GreenPowerSource, Kwh,
    PowerType, RecordId, SourceId, SplitPart, TransferRecord,
};
pub use gridcert_store::TimeWindow;

//! # Gridcert Core
//!
//! Pure domain primitives for the gridcert certification and
//! consumption-tracing engine: sources, generation records, certificates,
//! consumption records, chain events, and the traceability verifier.
//!
//! This crate contains no I/O, no storage, no async. It is pure computation
//! over strongly typed ledger data.
//!
//! ## Key Types
//!
//! - [`GreenPowerSource`] - A registered generation facility
//! - [`GenerationRecord`] - The raw, immutable measurement event
//! - [`Certificate`] - An auditable claim on a quantity of generation
//! - [`ChainEvent`] - One entry of a certificate's traceability chain
//!
//! ## Conservation
//!
//! Balances only move through checked `debit`/`credit` methods, which
//! preserve `used + remaining == amount` on records and certificates alike.
//! [`verify_chain`] replays a certificate's event log and flags violations.

pub mod certificate;
pub mod chain;
pub mod consumption;
pub mod error;
pub mod event;
pub mod record;
pub mod source;
pub mod transfer;
pub mod types;
pub mod units;
pub mod validation;

pub use certificate::{Certificate, CertificateStatus, ValidityReport};
pub use chain::{verify_chain, Anomaly, ChainIntegrity, ChainReport, ChainTotals};
pub use consumption::{AllocationEntry, ConsumptionRecord};
pub use error::{CoreError, ValidationError};
pub use event::{ChainEvent, ChainEventKind};
pub use record::{GenerationPeriod, GenerationRecord};
pub use source::{GreenPowerSource, PowerType, SourceStatus};
pub use transfer::{SplitPart, SplitRecord, TransferRecord};
pub use types::{random_salt, CertificateId, EntityId, EventId, RecordId, SourceId};
pub use units::{avoided_carbon_kg, grid_carbon_kg, Kwh};

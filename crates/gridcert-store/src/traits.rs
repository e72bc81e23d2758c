//! Store traits: the persistence boundary of the engine.
//!
//! Three narrow contracts mirror the external collaborators: the source
//! registry, the certificate/consumption store, and the append-only chain
//! log. The engine is storage-agnostic; implementations include SQLite
//! (primary) and in-memory (tests, read-through cache semantics).
//!
//! # Design Notes
//!
//! - **Authoritative duplicate check**: `insert_certificate` performs the
//!   `(facility, period)` uniqueness check against the store itself, never an
//!   in-process cache, so correctness holds across process instances.
//! - **Idempotent chain appends**: the log is at-least-once; `append`
//!   de-duplicates by content-derived event id, and the verifier tolerates
//!   whatever still slips through.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use gridcert_core::{
    Certificate, CertificateId, CertificateStatus, ChainEvent, ConsumptionRecord, EntityId,
    GenerationPeriod, GenerationRecord, GreenPowerSource, RecordId, SourceId, SplitRecord,
    TransferRecord,
};

use crate::error::Result;

/// Result of inserting a certificate.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// Certificate was inserted.
    Inserted,
    /// The exact same certificate already exists (idempotent, not an error).
    AlreadyExists,
    /// A non-cancelled certificate already covers this `(facility, period)`.
    DuplicatePeriod { existing: CertificateId },
}

/// Query filter for certificates. All fields conjunctive; `None` matches.
#[derive(Debug, Clone, Default)]
pub struct CertificateFilter {
    pub facility: Option<SourceId>,
    pub period: Option<GenerationPeriod>,
    pub status: Option<CertificateStatus>,
    pub holder: Option<EntityId>,
}

impl CertificateFilter {
    /// Whether a certificate matches this filter.
    pub fn matches(&self, certificate: &Certificate) -> bool {
        self.facility.map_or(true, |f| certificate.facility == f)
            && self.period.map_or(true, |p| certificate.period == p)
            && self.status.map_or(true, |s| certificate.status == s)
            && self.holder.map_or(true, |h| certificate.holder == h)
    }
}

/// A half-open query window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Whether `at` falls inside the window.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// Read/write contract of the source registry collaborator.
#[async_trait]
pub trait SourceRegistry: Send + Sync {
    /// Insert or replace a source registration.
    async fn put_source(&self, source: &GreenPowerSource) -> Result<()>;

    /// Fetch a source by id.
    async fn get_source(&self, id: &SourceId) -> Result<Option<GreenPowerSource>>;

    /// Apply a new measurement: append the record id and bump the
    /// monotonically increasing cumulative counter.
    async fn record_generation_increment(
        &self,
        id: &SourceId,
        record: &GenerationRecord,
    ) -> Result<()>;

    /// All registered sources.
    async fn list_sources(&self) -> Result<Vec<GreenPowerSource>>;
}

/// Contract of the certificate/consumption store collaborator.
#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Insert a certificate, running the authoritative duplicate-period
    /// check. Split derivatives (with a parent) are exempt from the check.
    async fn insert_certificate(&self, certificate: &Certificate) -> Result<InsertOutcome>;

    /// Fetch a certificate by id.
    async fn get_certificate(&self, id: &CertificateId) -> Result<Option<Certificate>>;

    /// Persist an updated certificate (balance or status change).
    async fn update_certificate(&self, certificate: &Certificate) -> Result<()>;

    /// Query certificates by filter.
    async fn query_certificates(&self, filter: &CertificateFilter) -> Result<Vec<Certificate>>;

    /// Insert a generation record.
    async fn insert_generation_record(&self, record: &GenerationRecord) -> Result<()>;

    /// Fetch a generation record by id.
    async fn get_generation_record(&self, id: &RecordId) -> Result<Option<GenerationRecord>>;

    /// Persist an updated generation record (used-amount change).
    async fn update_generation_record(&self, record: &GenerationRecord) -> Result<()>;

    /// Generation records whose timestamp falls in the window.
    async fn query_generation(&self, window: &TimeWindow) -> Result<Vec<GenerationRecord>>;

    /// Insert an immutable consumption record.
    async fn insert_consumption(&self, record: &ConsumptionRecord) -> Result<()>;

    /// Consumption records whose timestamp falls in the window.
    async fn query_consumption(&self, window: &TimeWindow) -> Result<Vec<ConsumptionRecord>>;

    /// Insert an immutable transfer record.
    async fn insert_transfer(&self, record: &TransferRecord) -> Result<()>;

    /// Insert an immutable split record.
    async fn insert_split(&self, record: &SplitRecord) -> Result<()>;
}

/// Contract of the append-only chain log collaborator.
#[async_trait]
pub trait ChainLog: Send + Sync {
    /// Append an event to its certificate's chain. At-least-once; appending
    /// the same event twice is a no-op.
    async fn append(&self, event: &ChainEvent) -> Result<()>;

    /// All events of a certificate's chain, in append order.
    async fn read_all(&self, certificate_id: &CertificateId) -> Result<Vec<ChainEvent>>;
}

/// The full persistence surface the engine runs against.
pub trait Backend: SourceRegistry + CertificateStore + ChainLog {}

impl<T: SourceRegistry + CertificateStore + ChainLog> Backend for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_time_window_half_open() {
        let window = TimeWindow::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        );
        assert!(window.contains(window.start));
        assert!(!window.contains(window.end));
    }
}

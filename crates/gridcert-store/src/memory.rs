//! In-memory implementation of the store traits.
//!
//! Primarily for tests and as the read-through cache layer. Semantics match
//! SQLite: the duplicate-period check and the chain-append deduplication are
//! both authoritative here, not cached.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use gridcert_core::{
    Certificate, CertificateId, CertificateStatus, ChainEvent, ConsumptionRecord, EventId,
    GenerationRecord, GreenPowerSource, RecordId, SourceId, SplitRecord, TransferRecord,
};

use crate::error::{Result, StoreError};
use crate::traits::{
    CertificateFilter, CertificateStore, ChainLog, InsertOutcome, SourceRegistry, TimeWindow,
};

/// In-memory store. All data is lost on drop. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    sources: HashMap<SourceId, GreenPowerSource>,
    records: HashMap<RecordId, GenerationRecord>,
    certificates: HashMap<CertificateId, Certificate>,

    /// `(facility, period start millis) -> certificate` over non-cancelled
    /// original (non-derivative) certificates.
    period_index: HashMap<(SourceId, i64), CertificateId>,

    consumption: Vec<ConsumptionRecord>,
    transfers: Vec<TransferRecord>,
    splits: Vec<SplitRecord>,

    chains: HashMap<CertificateId, Vec<ChainEvent>>,
    appended: HashSet<EventId>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryStoreInner> {
        self.inner.read().expect("store lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryStoreInner> {
        self.inner.write().expect("store lock poisoned")
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn period_key(certificate: &Certificate) -> (SourceId, i64) {
    (certificate.facility, certificate.period.start.timestamp_millis())
}

#[async_trait]
impl SourceRegistry for MemoryStore {
    async fn put_source(&self, source: &GreenPowerSource) -> Result<()> {
        self.write().sources.insert(source.id, source.clone());
        Ok(())
    }

    async fn get_source(&self, id: &SourceId) -> Result<Option<GreenPowerSource>> {
        Ok(self.read().sources.get(id).cloned())
    }

    async fn record_generation_increment(
        &self,
        id: &SourceId,
        record: &GenerationRecord,
    ) -> Result<()> {
        let mut inner = self.write();
        let source = inner
            .sources
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("source {id}")))?;
        source.cumulative_generation = source
            .cumulative_generation
            .checked_add(record.amount)
            .ok_or_else(|| StoreError::InvalidData("cumulative generation overflow".into()))?;
        source.record_ids.push(record.id);
        Ok(())
    }

    async fn list_sources(&self) -> Result<Vec<GreenPowerSource>> {
        Ok(self.read().sources.values().cloned().collect())
    }
}

#[async_trait]
impl CertificateStore for MemoryStore {
    async fn insert_certificate(&self, certificate: &Certificate) -> Result<InsertOutcome> {
        let mut inner = self.write();

        if inner.certificates.contains_key(&certificate.id) {
            return Ok(InsertOutcome::AlreadyExists);
        }

        // Originals are subject to the (facility, period) uniqueness rule;
        // split derivatives share their parent's period by construction.
        if certificate.parent.is_none() {
            if let Some(&existing) = inner.period_index.get(&period_key(certificate)) {
                let still_live = inner
                    .certificates
                    .get(&existing)
                    .map(|c| c.status != CertificateStatus::Cancelled)
                    .unwrap_or(false);
                if still_live {
                    return Ok(InsertOutcome::DuplicatePeriod { existing });
                }
            }
            inner.period_index.insert(period_key(certificate), certificate.id);
        }

        inner.certificates.insert(certificate.id, certificate.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn get_certificate(&self, id: &CertificateId) -> Result<Option<Certificate>> {
        Ok(self.read().certificates.get(id).cloned())
    }

    async fn update_certificate(&self, certificate: &Certificate) -> Result<()> {
        let mut inner = self.write();
        if !inner.certificates.contains_key(&certificate.id) {
            return Err(StoreError::NotFound(format!(
                "certificate {}",
                certificate.id
            )));
        }

        // A cancelled original frees its period for re-issuance.
        if certificate.parent.is_none() && certificate.status == CertificateStatus::Cancelled {
            let key = period_key(certificate);
            if inner.period_index.get(&key) == Some(&certificate.id) {
                inner.period_index.remove(&key);
            }
        }

        inner.certificates.insert(certificate.id, certificate.clone());
        Ok(())
    }

    async fn query_certificates(&self, filter: &CertificateFilter) -> Result<Vec<Certificate>> {
        let mut matched: Vec<Certificate> = self
            .read()
            .certificates
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        matched.sort_by_key(|c| (c.issued_at, c.id));
        Ok(matched)
    }

    async fn insert_generation_record(&self, record: &GenerationRecord) -> Result<()> {
        self.write().records.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_generation_record(&self, id: &RecordId) -> Result<Option<GenerationRecord>> {
        Ok(self.read().records.get(id).cloned())
    }

    async fn update_generation_record(&self, record: &GenerationRecord) -> Result<()> {
        let mut inner = self.write();
        if !inner.records.contains_key(&record.id) {
            return Err(StoreError::NotFound(format!("record {}", record.id)));
        }
        inner.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn query_generation(&self, window: &TimeWindow) -> Result<Vec<GenerationRecord>> {
        let mut matched: Vec<GenerationRecord> = self
            .read()
            .records
            .values()
            .filter(|r| window.contains(r.generated_at))
            .cloned()
            .collect();
        matched.sort_by_key(|r| (r.generated_at, r.id));
        Ok(matched)
    }

    async fn insert_consumption(&self, record: &ConsumptionRecord) -> Result<()> {
        self.write().consumption.push(record.clone());
        Ok(())
    }

    async fn query_consumption(&self, window: &TimeWindow) -> Result<Vec<ConsumptionRecord>> {
        Ok(self
            .read()
            .consumption
            .iter()
            .filter(|r| window.contains(r.consumed_at))
            .cloned()
            .collect())
    }

    async fn insert_transfer(&self, record: &TransferRecord) -> Result<()> {
        self.write().transfers.push(record.clone());
        Ok(())
    }

    async fn insert_split(&self, record: &SplitRecord) -> Result<()> {
        self.write().splits.push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl ChainLog for MemoryStore {
    async fn append(&self, event: &ChainEvent) -> Result<()> {
        let mut inner = self.write();
        if inner.appended.insert(event.event_id()) {
            inner
                .chains
                .entry(event.certificate_id)
                .or_default()
                .push(event.clone());
        }
        Ok(())
    }

    async fn read_all(&self, certificate_id: &CertificateId) -> Result<Vec<ChainEvent>> {
        Ok(self
            .read()
            .chains
            .get(certificate_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Months, TimeZone, Utc};
    use gridcert_core::{ChainEventKind, EntityId, Kwh, PowerType};

    fn make_source() -> GreenPowerSource {
        GreenPowerSource::new(
            "Sunfield Park",
            PowerType::Solar,
            12_000,
            0.21,
            "grid-west-04",
            Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap(),
        )
    }

    fn make_certificate(source: &GreenPowerSource, salt: u8) -> Certificate {
        let at = Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap();
        let record = GenerationRecord::new(source, Kwh(5_000), at, 0.475, Kwh(1_000), [salt; 16]);
        let mut cert = Certificate::issue(
            &record,
            EntityId::derive("holder"),
            at,
            at.checked_add_months(Months::new(12)).unwrap(),
            source.name.clone(),
            source.connection_point.clone(),
            "Green Registry AG",
            [salt; 16],
        );
        cert.transition(CertificateStatus::Active).unwrap();
        cert
    }

    #[tokio::test]
    async fn test_duplicate_period_rejected() {
        let store = MemoryStore::new();
        let source = make_source();

        let first = make_certificate(&source, 1);
        let second = make_certificate(&source, 2);

        assert_eq!(
            store.insert_certificate(&first).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            store.insert_certificate(&second).await.unwrap(),
            InsertOutcome::DuplicatePeriod { existing: first.id }
        );
    }

    #[tokio::test]
    async fn test_cancellation_frees_the_period() {
        let store = MemoryStore::new();
        let source = make_source();

        let mut first = make_certificate(&source, 1);
        store.insert_certificate(&first).await.unwrap();

        first.transition(CertificateStatus::Cancelled).unwrap();
        store.update_certificate(&first).await.unwrap();

        let second = make_certificate(&source, 2);
        assert_eq!(
            store.insert_certificate(&second).await.unwrap(),
            InsertOutcome::Inserted
        );
    }

    #[tokio::test]
    async fn test_split_derivative_bypasses_period_check() {
        let store = MemoryStore::new();
        let source = make_source();

        let parent = make_certificate(&source, 1);
        store.insert_certificate(&parent).await.unwrap();

        let derived = Certificate::derive_split(
            &parent,
            EntityId::derive("buyer"),
            Kwh(1_000),
            parent.issued_at,
            [9; 16],
        );
        assert_eq!(
            store.insert_certificate(&derived).await.unwrap(),
            InsertOutcome::Inserted
        );
    }

    #[tokio::test]
    async fn test_chain_append_is_idempotent() {
        let store = MemoryStore::new();
        let id = CertificateId::from_bytes([3; 32]);
        let event = ChainEvent::new(
            id,
            Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap(),
            ChainEventKind::Cancelled {
                reason: "test".into(),
            },
        );

        store.append(&event).await.unwrap();
        store.append(&event).await.unwrap();

        assert_eq!(store.read_all(&id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_increment_requires_known_source() {
        let store = MemoryStore::new();
        let source = make_source();
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();
        let record = GenerationRecord::new(&source, Kwh(100), at, 0.475, Kwh(1_000), [1; 16]);

        let err = store
            .record_generation_increment(&source.id, &record)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        store.put_source(&source).await.unwrap();
        store
            .record_generation_increment(&source.id, &record)
            .await
            .unwrap();
        let stored = store.get_source(&source.id).await.unwrap().unwrap();
        assert_eq!(stored.cumulative_generation, Kwh(100));
    }
}

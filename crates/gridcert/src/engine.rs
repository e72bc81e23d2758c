//! The Engine: unified API for the gridcert system.
//!
//! Brings together measurement ingest, the certificate registry, allocation,
//! transfer/split, chain verification, and reporting behind one interface.
//! The engine holds no clock: every operation takes its timestamp from the
//! caller, which keeps replay and testing deterministic.

use std::sync::Arc;

use chrono::{DateTime, Months, Utc};
use tokio::sync::broadcast;
use tracing::{info, warn};

use gridcert_core::{
    chain, random_salt, Certificate, CertificateId, CertificateStatus, ChainEvent, ChainEventKind,
    ChainReport, CoreError, EntityId, GenerationRecord, GreenPowerSource, Kwh, SourceId,
    ValidityReport,
};
use gridcert_core::validation::{validate_issuance, validate_measurement};
use gridcert_store::{Backend, CertificateFilter, InsertOutcome, TimeWindow};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EventBus};
use crate::locks::LockMap;
use crate::report::{
    consumption_report, production_report, renewable_ratio_report, ConsumptionReport,
    ProductionReport, RenewableRatioReport,
};

/// Result of ingesting a measurement.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// The persisted generation record.
    pub record: GenerationRecord,
    /// The certificate issued as a side effect, when the record was eligible
    /// and the period was not already covered.
    pub certificate: Option<Certificate>,
}

/// Aggregate result of verifying many chains.
#[derive(Debug, Clone)]
pub struct BatchVerifyReport {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub reports: Vec<ChainReport>,
    /// Chains whose log could not be read, with the error reason. A failed
    /// read does not abort the rest of the batch.
    pub failures: Vec<(CertificateId, String)>,
}

/// The main engine struct.
///
/// Generic over the persistence [`Backend`]; all invariant checks run
/// against the store, never an in-process cache.
pub struct Engine<B: Backend> {
    pub(crate) store: Arc<B>,
    pub(crate) config: EngineConfig,
    pub(crate) locks: LockMap,
    pub(crate) bus: EventBus,
}

impl<B: Backend> Engine<B> {
    /// Create a new engine instance.
    pub fn new(store: B, config: EngineConfig) -> Self {
        let locks = LockMap::new(config.lock_timeout);
        Self {
            store: Arc::new(store),
            config,
            locks,
            bus: EventBus::default(),
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &B {
        &self.store
    }

    /// Get the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The per-certificate lock map. Exposed so the service layer can wrap
    /// its own critical sections around a certificate.
    pub fn locks(&self) -> &LockMap {
        &self.locks
    }

    /// Subscribe to observability events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.bus.subscribe()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Source Onboarding
    // ─────────────────────────────────────────────────────────────────────

    /// Register a generation facility.
    pub async fn register_source(&self, source: GreenPowerSource) -> Result<SourceId> {
        let id = source.id;
        self.store.put_source(&source).await?;
        info!(source = %id, name = %source.name, power_type = source.power_type.as_str(),
              "source registered");
        Ok(id)
    }

    /// Deactivate a facility. Its records and certificates are retained.
    pub async fn deactivate_source(&self, id: &SourceId) -> Result<()> {
        let mut source = self
            .store
            .get_source(id)
            .await?
            .ok_or(EngineError::SourceNotFound(*id))?;
        source.deactivate();
        self.store.put_source(&source).await?;
        info!(source = %id, "source deactivated");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Measurement Ingest
    // ─────────────────────────────────────────────────────────────────────

    /// Record a generation measurement against an active source.
    ///
    /// Eligible measurements trigger certificate issuance as a side effect.
    /// A period already covered by a live certificate leaves the measurement
    /// recorded and the certificate slot untouched.
    pub async fn record_generation(
        &self,
        source_id: &SourceId,
        amount: Kwh,
        at: DateTime<Utc>,
    ) -> Result<IngestOutcome> {
        validate_measurement(amount)?;

        let source = self
            .store
            .get_source(source_id)
            .await?
            .ok_or(EngineError::SourceNotFound(*source_id))?;
        if !source.is_active() {
            return Err(EngineError::SourceInactive(*source_id));
        }

        let record = GenerationRecord::new(
            &source,
            amount,
            at,
            self.config.grid_emission_factor,
            self.config.min_certifiable,
            random_salt(),
        );

        self.store.insert_generation_record(&record).await?;
        self.store
            .record_generation_increment(source_id, &record)
            .await?;
        info!(source = %source_id, record = %record.id, %amount,
              eligible = record.certificate_eligible, "generation recorded");

        let certificate = if record.certificate_eligible {
            let holder = EntityId::derive(&source.name);
            match self.issue_certificate(&record, holder, at).await {
                Ok(certificate) => Some(certificate),
                Err(EngineError::DuplicatePeriod { existing }) => {
                    warn!(record = %record.id, existing = %existing,
                          "period already certified, measurement kept without certificate");
                    None
                }
                Err(err) => return Err(err),
            }
        } else {
            None
        };

        Ok(IngestOutcome {
            record,
            certificate,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Certificate Registry
    // ─────────────────────────────────────────────────────────────────────

    /// Issue a certificate against an eligible generation record.
    ///
    /// The certificate is created pending, validated for the required
    /// generation data before anything persists, then activated and stored.
    /// The duplicate-period check runs against the authoritative store.
    pub async fn issue_certificate(
        &self,
        record: &GenerationRecord,
        holder: EntityId,
        at: DateTime<Utc>,
    ) -> Result<Certificate> {
        if !record.certificate_eligible {
            return Err(EngineError::NotEligible(record.id));
        }

        let source = self
            .store
            .get_source(&record.source_id)
            .await?
            .ok_or(EngineError::SourceNotFound(record.source_id))?;

        let expires_at = at
            .checked_add_months(Months::new(self.config.validity_months))
            .ok_or(CoreError::AmountOverflow)?;

        let mut certificate = Certificate::issue(
            record,
            holder,
            at,
            expires_at,
            source.name.clone(),
            source.connection_point.clone(),
            self.config.certifying_body.clone(),
            random_salt(),
        );

        // Fails closed before any state is persisted.
        validate_issuance(&certificate)?;
        certificate.transition(CertificateStatus::Active)?;

        match self.store.insert_certificate(&certificate).await? {
            InsertOutcome::Inserted | InsertOutcome::AlreadyExists => {}
            InsertOutcome::DuplicatePeriod { existing } => {
                return Err(EngineError::DuplicatePeriod { existing });
            }
        }

        self.store
            .append(&ChainEvent::new(
                certificate.id,
                at,
                ChainEventKind::Issued {
                    amount: certificate.amount,
                    facility: certificate.facility,
                    period: certificate.period,
                },
            ))
            .await?;

        info!(certificate = %certificate.id, facility = %certificate.facility,
              amount = %certificate.amount, period = %certificate.period.label(),
              "certificate issued");
        self.bus.publish(EngineEvent::CertificateIssued {
            certificate: certificate.id,
            facility: certificate.facility,
            amount: certificate.amount,
        });

        Ok(certificate)
    }

    /// Pure validity check of a certificate against `now`.
    pub async fn check_validity(
        &self,
        id: &CertificateId,
        now: DateTime<Utc>,
    ) -> Result<ValidityReport> {
        let certificate = self
            .store
            .get_certificate(id)
            .await?
            .ok_or(EngineError::CertificateNotFound(*id))?;
        Ok(certificate.check_validity(now))
    }

    /// Administrative cancellation. Terminal; the certificate is retained
    /// for audit.
    pub async fn cancel_certificate(
        &self,
        id: &CertificateId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Certificate> {
        let _guard = self.locks.acquire(*id).await?;

        let mut certificate = self
            .store
            .get_certificate(id)
            .await?
            .ok_or(EngineError::CertificateNotFound(*id))?;
        certificate.transition(CertificateStatus::Cancelled)?;

        self.store
            .append(&ChainEvent::new(
                *id,
                at,
                ChainEventKind::Cancelled {
                    reason: reason.to_string(),
                },
            ))
            .await?;
        self.store.update_certificate(&certificate).await?;

        info!(certificate = %id, reason, "certificate cancelled");
        self.bus.publish(EngineEvent::CertificateCancelled {
            certificate: *id,
            reason: reason.to_string(),
        });

        Ok(certificate)
    }

    /// Sweep active certificates past expiry into the terminal `expired`
    /// state. Returns how many were expired.
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<usize> {
        let filter = CertificateFilter {
            status: Some(CertificateStatus::Active),
            ..Default::default()
        };
        let candidates = self.store.query_certificates(&filter).await?;

        let mut expired = 0usize;
        for candidate in candidates {
            if !candidate.is_expired(now) {
                continue;
            }
            let _guard = self.locks.acquire(candidate.id).await?;
            // Re-read under the lock; the state may have moved.
            let Some(mut certificate) = self.store.get_certificate(&candidate.id).await? else {
                continue;
            };
            if certificate.status != CertificateStatus::Active || !certificate.is_expired(now) {
                continue;
            }
            certificate.transition(CertificateStatus::Expired)?;
            self.store.update_certificate(&certificate).await?;
            info!(certificate = %certificate.id, "certificate expired");
            expired += 1;
        }
        Ok(expired)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Chain Verification
    // ─────────────────────────────────────────────────────────────────────

    /// Replay one certificate's chain and report anomalies.
    ///
    /// Read-only: a detector, not a corrector. Anomalies are surfaced on the
    /// event bus; remediation stays with the operator.
    pub async fn verify_chain(&self, id: &CertificateId) -> Result<ChainReport> {
        let events = self.store.read_all(id).await?;
        let report = chain::verify_chain(*id, &events);

        if !report.is_valid {
            let codes: Vec<&'static str> = report.anomalies.iter().map(|a| a.code()).collect();
            warn!(certificate = %id, ?codes, integrity = report.integrity.as_str(),
                  "chain verification found anomalies");
            self.bus.publish(EngineEvent::ChainAnomalies {
                certificate: *id,
                codes,
            });
        }

        Ok(report)
    }

    /// Verify many chains independently. One unreadable log is reported as a
    /// failure for that id; the rest of the batch still completes.
    pub async fn batch_verify(&self, ids: &[CertificateId]) -> BatchVerifyReport {
        let mut reports = Vec::with_capacity(ids.len());
        let mut failures = Vec::new();

        for id in ids {
            match self.verify_chain(id).await {
                Ok(report) => reports.push(report),
                Err(err) => failures.push((*id, err.to_string())),
            }
        }

        let valid = reports.iter().filter(|r| r.is_valid).count();
        BatchVerifyReport {
            total: ids.len(),
            valid,
            invalid: ids.len() - valid,
            reports,
            failures,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reporting
    // ─────────────────────────────────────────────────────────────────────

    /// Renewable-ratio rollup over a window, optionally scoped to one
    /// consumer. Reads a snapshot; runs concurrently with mutations.
    pub async fn renewable_ratio(
        &self,
        window: TimeWindow,
        scope: Option<EntityId>,
    ) -> Result<RenewableRatioReport> {
        let mut records = self.store.query_consumption(&window).await?;
        if let Some(consumer) = scope {
            records.retain(|r| r.consumer == consumer);
        }
        Ok(renewable_ratio_report(
            window,
            &records,
            self.config.grid_emission_factor,
            self.config.target_renewable_ratio,
            false,
        ))
    }

    /// Generation rollup over a window. A failed registry read degrades the
    /// report (partial flag) rather than aborting it.
    pub async fn production_report(&self, window: TimeWindow) -> Result<ProductionReport> {
        let records = self.store.query_generation(&window).await?;
        let active_sources = match self.store.list_sources().await {
            Ok(sources) => Some(sources.iter().filter(|s| s.is_active()).count()),
            Err(err) => {
                warn!(error = %err, "source registry unavailable, production report is partial");
                None
            }
        };
        Ok(production_report(window, &records, active_sources))
    }

    /// Consumption rollup over a window, broken down per consumer.
    pub async fn consumption_report(&self, window: TimeWindow) -> Result<ConsumptionReport> {
        let records = self.store.query_consumption(&window).await?;
        Ok(consumption_report(window, &records))
    }
}

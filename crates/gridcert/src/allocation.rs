//! Allocation, transfer, and split: every operation that moves balance.
//!
//! All three share the same critical-section discipline: acquire the
//! per-certificate lock, re-read the authoritative row, check, debit, append
//! the chain event, persist. A persistence failure after the debit triggers
//! the compensating credit before the error surfaces, so no certificate is
//! ever left decremented without its chain evidence. Orphaned chain events
//! from the at-least-once log are tolerated; the verifier exists to surface
//! them.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use gridcert_core::{
    random_salt, AllocationEntry, Certificate, CertificateId, CertificateStatus, ChainEvent,
    ChainEventKind, ConsumptionRecord, EntityId, Kwh, RecordId, SplitPart, SplitRecord,
    TransferRecord,
};
use gridcert_core::validation::{validate_measurement, validate_split_parts};
use gridcert_store::{Backend, CertificateFilter, InsertOutcome};

use crate::config::AllocationPolicy;
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::events::EngineEvent;

/// Result of a split: the audit record plus the derivative certificates.
#[derive(Debug, Clone)]
pub struct SplitOutcome {
    pub record: SplitRecord,
    pub certificates: Vec<Certificate>,
}

/// A debit that has been fully persisted, kept for compensation if a later
/// step of the same request fails.
struct AppliedDebit {
    certificate: CertificateId,
    amount: Kwh,
}

impl<B: Backend> Engine<B> {
    // ─────────────────────────────────────────────────────────────────────
    // Allocation
    // ─────────────────────────────────────────────────────────────────────

    /// Match consumption demand against available green supply.
    ///
    /// Greedy fill over allocatable certificates in policy order; any
    /// shortfall is recorded as grid supply, not an error. Candidates are
    /// debited one at a time under their own locks, so requests touching
    /// different certificates run fully in parallel.
    pub async fn allocate_consumption(
        &self,
        consumer: EntityId,
        requested: Kwh,
        at: DateTime<Utc>,
    ) -> Result<ConsumptionRecord> {
        validate_measurement(requested)?;

        let filter = CertificateFilter {
            status: Some(CertificateStatus::Active),
            ..Default::default()
        };
        let mut candidates = self.store.query_certificates(&filter).await?;
        candidates.retain(|c| c.is_allocatable(at));
        self.order_candidates(&mut candidates);

        let salt = random_salt();
        let consumption_id = RecordId::derive(consumer.as_bytes(), at, salt);

        let mut entries: Vec<AllocationEntry> = Vec::new();
        let mut applied: Vec<AppliedDebit> = Vec::new();
        let mut still_needed = requested;

        for candidate in candidates {
            if still_needed.is_zero() {
                break;
            }

            let guard = match self.locks.acquire(candidate.id).await {
                Ok(guard) => guard,
                Err(err) => {
                    self.compensate(&applied).await;
                    return Err(err);
                }
            };

            let outcome = async {
                // Re-read under the lock; the cached candidate may be stale.
                let Some(mut certificate) = self.store.get_certificate(&candidate.id).await?
                else {
                    return Ok(None);
                };
                if !certificate.is_allocatable(at) {
                    return Ok(None);
                }

                let draw = certificate.remaining.min(still_needed);
                let event = ChainEvent::new(
                    certificate.id,
                    at,
                    ChainEventKind::Allocated {
                        amount: draw,
                        consumer,
                        record_id: consumption_id,
                    },
                );
                self.debit_and_persist(&mut certificate, draw, event).await?;
                Ok(Some((certificate, draw)))
            }
            .await;
            drop(guard);

            match outcome {
                Ok(None) => continue,
                Ok(Some((certificate, draw))) => {
                    entries.push(AllocationEntry {
                        source_id: certificate.facility,
                        certificate_id: certificate.id,
                        power_type: certificate.power_type,
                        amount: draw,
                    });
                    applied.push(AppliedDebit {
                        certificate: certificate.id,
                        amount: draw,
                    });
                    still_needed = still_needed.saturating_sub(draw);
                }
                Err(err) => {
                    self.compensate(&applied).await;
                    return Err(err);
                }
            }
        }

        let record = ConsumptionRecord::new(
            consumer,
            requested,
            entries,
            at,
            self.config.grid_emission_factor,
            salt,
        );
        debug_assert_eq!(record.id, consumption_id);

        if let Err(err) = self.store.insert_consumption(&record).await {
            self.compensate(&applied).await;
            return Err(err.into());
        }

        if !record.fully_covered() {
            warn!(consumer = %consumer, requested = %requested, green = %record.green,
                  "supply shortfall, remainder drawn from grid");
            self.bus.publish(EngineEvent::SupplyShortfall {
                consumer,
                requested,
                green: record.green,
            });
        }
        info!(consumption = %record.id, consumer = %consumer,
              green = %record.green, grid = %record.grid, "consumption allocated");
        Ok(record)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Transfer
    // ─────────────────────────────────────────────────────────────────────

    /// Move balance on one certificate between entities.
    pub async fn transfer(
        &self,
        certificate_id: &CertificateId,
        from: EntityId,
        to: EntityId,
        amount: Kwh,
        memo: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<TransferRecord> {
        validate_measurement(amount)?;

        let _guard = self.locks.acquire(*certificate_id).await?;

        let mut certificate = self
            .store
            .get_certificate(certificate_id)
            .await?
            .ok_or(EngineError::CertificateNotFound(*certificate_id))?;
        if !certificate.is_allocatable(at) {
            return Err(EngineError::NotAllocatable {
                certificate: *certificate_id,
                status: certificate.status,
            });
        }
        if amount > certificate.remaining {
            return Err(EngineError::InsufficientBalance {
                certificate: *certificate_id,
                requested: amount,
                remaining: certificate.remaining,
            });
        }

        let record_id = RecordId::derive(certificate_id.as_bytes(), at, random_salt());
        let event = ChainEvent::new(
            *certificate_id,
            at,
            ChainEventKind::Transferred {
                amount,
                from,
                to,
                record_id,
            },
        );
        self.debit_and_persist(&mut certificate, amount, event).await?;

        let record = TransferRecord {
            id: record_id,
            certificate_id: *certificate_id,
            from,
            to,
            amount,
            transferred_at: at,
            memo,
        };
        if let Err(err) = self.store.insert_transfer(&record).await {
            // The debit is persisted but its evidence record failed; put the
            // balance back before reporting the failure.
            self.compensate_locked(certificate_id, amount).await;
            return Err(err.into());
        }

        info!(certificate = %certificate_id, %amount, from = %from, to = %to,
              "balance transferred");
        Ok(record)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Split
    // ─────────────────────────────────────────────────────────────────────

    /// Subdivide a certificate's balance into derivative certificates, one
    /// per part, each tagged with the original certificate id.
    pub async fn split(
        &self,
        certificate_id: &CertificateId,
        parts: &[SplitPart],
        at: DateTime<Utc>,
    ) -> Result<SplitOutcome> {
        validate_split_parts(parts)?;

        let _guard = self.locks.acquire(*certificate_id).await?;

        let mut parent = self
            .store
            .get_certificate(certificate_id)
            .await?
            .ok_or(EngineError::CertificateNotFound(*certificate_id))?;
        if !parent.is_allocatable(at) {
            return Err(EngineError::NotAllocatable {
                certificate: *certificate_id,
                status: parent.status,
            });
        }
        let total: Kwh = parts.iter().map(|p| p.amount).sum();
        if total > parent.remaining {
            return Err(EngineError::InsufficientBalance {
                certificate: *certificate_id,
                requested: total,
                remaining: parent.remaining,
            });
        }

        let record_id = RecordId::derive(certificate_id.as_bytes(), at, random_salt());
        let derived: Vec<Certificate> = parts
            .iter()
            .map(|part| Certificate::derive_split(&parent, part.entity, part.amount, at, random_salt()))
            .collect();

        // A split moves balance into derivatives; the underlying generation
        // record stays untouched until someone consumes from them.
        parent.debit(total)?;

        for (part, certificate) in parts.iter().zip(&derived) {
            self.store
                .append(&ChainEvent::new(
                    *certificate_id,
                    at,
                    ChainEventKind::Split {
                        amount: part.amount,
                        derived: certificate.id,
                        to: part.entity,
                        record_id,
                    },
                ))
                .await?;
        }
        self.store.update_certificate(&parent).await?;

        let mut inserted: Vec<Certificate> = Vec::new();
        for certificate in &derived {
            match self.insert_derived(certificate, at).await {
                Ok(()) => inserted.push(certificate.clone()),
                Err(err) => {
                    self.unwind_split(&mut parent, total, &mut inserted).await;
                    return Err(err);
                }
            }
        }

        let record = SplitRecord {
            id: record_id,
            certificate_id: *certificate_id,
            parts: parts.to_vec(),
            derived: derived.iter().map(|c| c.id).collect(),
            split_at: at,
        };
        if let Err(err) = self.store.insert_split(&record).await {
            self.unwind_split(&mut parent, total, &mut inserted).await;
            return Err(err.into());
        }

        info!(certificate = %certificate_id, %total, parts = parts.len(),
              "certificate split");
        Ok(SplitOutcome {
            record,
            certificates: derived,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn order_candidates(&self, candidates: &mut [Certificate]) {
        match self.config.allocation_policy {
            // Use-it-or-lose-it: certificates about to lapse go first.
            AllocationPolicy::SoonestExpiryFirst => candidates
                .sort_by(|a, b| (a.expires_at, a.issued_at, a.id).cmp(&(b.expires_at, b.issued_at, b.id))),
            AllocationPolicy::EarliestIssuedFirst => {
                candidates.sort_by(|a, b| (a.issued_at, a.id).cmp(&(b.issued_at, b.id)))
            }
        }
    }

    /// Debit a certificate and its generation record, append the chain
    /// event, and persist both. Caller must hold the certificate's lock.
    ///
    /// Failure order matters: the event is appended before the certificate
    /// write (an orphaned event is tolerated, an unevidenced debit is not),
    /// and a failed record write compensates the certificate write.
    async fn debit_and_persist(
        &self,
        certificate: &mut Certificate,
        amount: Kwh,
        event: ChainEvent,
    ) -> Result<()> {
        certificate.debit(amount)?;
        let mut record = self
            .store
            .get_generation_record(&certificate.record_id)
            .await?
            .ok_or(EngineError::RecordNotFound(certificate.record_id))?;
        record.debit(amount)?;

        self.store.append(&event).await?;
        self.store.update_certificate(certificate).await?;
        if let Err(err) = self.store.update_generation_record(&record).await {
            if let Err(core_err) = certificate.credit(amount) {
                warn!(certificate = %certificate.id, error = %core_err,
                      "compensating credit failed in memory");
            } else if let Err(store_err) = self.store.update_certificate(certificate).await {
                warn!(certificate = %certificate.id, error = %store_err,
                      "compensating certificate write failed, balances diverge until verified");
            }
            return Err(err.into());
        }
        Ok(())
    }

    /// Best-effort compensation of persisted debits after a later step of
    /// the same request failed. Acquires each certificate's lock.
    async fn compensate(&self, applied: &[AppliedDebit]) {
        for debit in applied {
            match self.locks.acquire(debit.certificate).await {
                Ok(_guard) => self.compensate_locked(&debit.certificate, debit.amount).await,
                Err(err) => {
                    warn!(certificate = %debit.certificate, error = %err,
                          "could not lock certificate for compensation");
                }
            }
        }
    }

    /// Credit a certificate and its generation record back. Caller must
    /// hold the certificate's lock. Failures are logged, not propagated:
    /// this already runs on an error path.
    async fn compensate_locked(&self, certificate_id: &CertificateId, amount: Kwh) {
        let certificate = match self.store.get_certificate(certificate_id).await {
            Ok(Some(certificate)) => certificate,
            Ok(None) => {
                warn!(certificate = %certificate_id, "certificate vanished during compensation");
                return;
            }
            Err(err) => {
                warn!(certificate = %certificate_id, error = %err, "compensation read failed");
                return;
            }
        };

        let mut certificate = certificate;
        if let Err(err) = certificate.credit(amount) {
            warn!(certificate = %certificate_id, error = %err, "compensating credit rejected");
            return;
        }
        if let Err(err) = self.store.update_certificate(&certificate).await {
            warn!(certificate = %certificate_id, error = %err, "compensating write failed");
            return;
        }

        match self.store.get_generation_record(&certificate.record_id).await {
            Ok(Some(mut record)) => {
                if record.credit(amount).is_ok() {
                    if let Err(err) = self.store.update_generation_record(&record).await {
                        warn!(record = %record.id, error = %err,
                              "compensating record write failed");
                    }
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(certificate = %certificate_id, error = %err,
                      "compensation record read failed");
            }
        }
    }

    async fn insert_derived(&self, certificate: &Certificate, at: DateTime<Utc>) -> Result<()> {
        match self.store.insert_certificate(certificate).await? {
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
        Ok(())
    }

    /// Undo a partially applied split: cancel the derivatives that made it
    /// in, then put the parent's balance back. Best effort on an error path.
    async fn unwind_split(
        &self,
        parent: &mut Certificate,
        total: Kwh,
        inserted: &mut Vec<Certificate>,
    ) {
        for certificate in inserted.iter_mut() {
            if certificate.transition(CertificateStatus::Cancelled).is_ok() {
                if let Err(err) = self.store.update_certificate(certificate).await {
                    warn!(certificate = %certificate.id, error = %err,
                          "could not cancel orphaned split derivative");
                }
            }
        }

        if let Err(err) = parent.credit(total) {
            warn!(certificate = %parent.id, error = %err, "split unwind credit rejected");
            return;
        }
        if let Err(err) = self.store.update_certificate(parent).await {
            warn!(certificate = %parent.id, error = %err, "split unwind write failed");
        }
    }
}

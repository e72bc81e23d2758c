//! Traceability chain verification.
//!
//! The verifier replays a certificate's event log and flags conservation
//! violations and ordering anomalies. It is a detector, not a corrector:
//! it never mutates balances, and calling it twice over the same log yields
//! identical results.
//!
//! The log is at-least-once and may deliver out of order, so replay first
//! drops duplicate deliveries by content-derived event id, then checks the
//! surviving sequence in log order.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::event::ChainEvent;
use crate::types::CertificateId;
use crate::units::Kwh;

/// A single detected anomaly. Several can co-occur on one chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Anomaly {
    /// Debits (transfers, splits, allocations) total more than the issuance.
    DebitExceedsGeneration { generated: Kwh, debited: Kwh },

    /// Event timestamps regress at this position of the deduplicated log.
    TimestampRegression { position: usize },

    /// No issuance event exists for the certificate.
    MissingIssuance,

    /// More than one distinct issuance event on the same chain.
    DuplicateIssuance { count: usize },
}

impl Anomaly {
    /// Stable machine-readable code for operators.
    pub fn code(&self) -> &'static str {
        match self {
            Anomaly::DebitExceedsGeneration { .. } => "transfer_amount_exceeds_generation",
            Anomaly::TimestampRegression { .. } => "timestamp_inconsistency",
            Anomaly::MissingIssuance => "certificate_not_found",
            Anomaly::DuplicateIssuance { .. } => "duplicate_issuance",
        }
    }

    /// Whether this anomaly means amounts no longer conserve.
    pub fn breaks_conservation(&self) -> bool {
        matches!(
            self,
            Anomaly::DebitExceedsGeneration { .. }
                | Anomaly::MissingIssuance
                | Anomaly::DuplicateIssuance { .. }
        )
    }
}

/// Overall integrity classification of a chain.
///
/// `Compromised` is reserved for conservation-breaking anomalies; a pure
/// timestamp regression fails validity but leaves the amounts intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainIntegrity {
    Intact,
    Compromised,
}

impl ChainIntegrity {
    pub fn as_str(self) -> &'static str {
        match self {
            ChainIntegrity::Intact => "intact",
            ChainIntegrity::Compromised => "compromised",
        }
    }
}

/// Replayed totals for one certificate chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainTotals {
    pub generated: Kwh,
    pub transferred: Kwh,
    pub split: Kwh,
    pub allocated: Kwh,
}

impl ChainTotals {
    /// Sum of all debits against the issuance.
    pub fn debited(&self) -> Kwh {
        self.transferred
            .saturating_add(self.split)
            .saturating_add(self.allocated)
    }
}

/// The result of replaying one certificate's chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainReport {
    pub certificate_id: CertificateId,
    pub is_valid: bool,
    pub anomalies: Vec<Anomaly>,
    pub integrity: ChainIntegrity,
    pub totals: ChainTotals,
    /// Events surviving deduplication.
    pub events_replayed: usize,
    /// Duplicate deliveries dropped before replay.
    pub duplicates_dropped: usize,
}

/// Replay a certificate's event log and detect anomalies.
///
/// Pure function of the input slice: no side effects, no clock access.
pub fn verify_chain(certificate_id: CertificateId, events: &[ChainEvent]) -> ChainReport {
    let mut seen = HashSet::new();
    let mut replayed: Vec<&ChainEvent> = Vec::with_capacity(events.len());
    for event in events {
        if seen.insert(event.event_id()) {
            replayed.push(event);
        }
    }
    let duplicates_dropped = events.len() - replayed.len();

    let mut anomalies = Vec::new();
    let mut totals = ChainTotals::default();
    let mut issuance_count = 0usize;

    for (position, event) in replayed.iter().enumerate() {
        if position > 0 && event.recorded_at < replayed[position - 1].recorded_at {
            anomalies.push(Anomaly::TimestampRegression { position });
        }

        match (event.issued_amount(), event.debit_amount()) {
            (Some(amount), _) => {
                issuance_count += 1;
                // First issuance wins; extras are flagged below.
                if issuance_count == 1 {
                    totals.generated = amount;
                }
            }
            (None, Some(amount)) => match &event.kind {
                crate::event::ChainEventKind::Transferred { .. } => {
                    totals.transferred = totals.transferred.saturating_add(amount);
                }
                crate::event::ChainEventKind::Split { .. } => {
                    totals.split = totals.split.saturating_add(amount);
                }
                crate::event::ChainEventKind::Allocated { .. } => {
                    totals.allocated = totals.allocated.saturating_add(amount);
                }
                _ => {}
            },
            (None, None) => {}
        }
    }

    if issuance_count == 0 {
        anomalies.push(Anomaly::MissingIssuance);
    } else if issuance_count > 1 {
        anomalies.push(Anomaly::DuplicateIssuance {
            count: issuance_count,
        });
    }

    if totals.debited() > totals.generated {
        anomalies.push(Anomaly::DebitExceedsGeneration {
            generated: totals.generated,
            debited: totals.debited(),
        });
    }

    let integrity = if anomalies.iter().any(Anomaly::breaks_conservation) {
        ChainIntegrity::Compromised
    } else {
        ChainIntegrity::Intact
    };

    ChainReport {
        certificate_id,
        is_valid: anomalies.is_empty(),
        anomalies,
        integrity,
        totals,
        events_replayed: replayed.len(),
        duplicates_dropped,
    }
}

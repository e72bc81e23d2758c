//! Chain events: the typed entries of a certificate's traceability chain.
//!
//! Every mutating operation appends one event per touched certificate to the
//! append-only log. Events are immutable; the log is at-least-once, so each
//! event carries a content-derived id the verifier uses to drop duplicate
//! deliveries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::GenerationPeriod;
use crate::types::{CertificateId, EntityId, EventId, RecordId, SourceId};
use crate::units::Kwh;

/// The payload of a chain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChainEventKind {
    /// Certificate issued against a generation record. The opening credit.
    Issued {
        amount: Kwh,
        facility: SourceId,
        period: GenerationPeriod,
    },

    /// Balance moved to another entity.
    Transferred {
        amount: Kwh,
        from: EntityId,
        to: EntityId,
        record_id: RecordId,
    },

    /// Balance carved into a derivative certificate.
    Split {
        amount: Kwh,
        derived: CertificateId,
        to: EntityId,
        record_id: RecordId,
    },

    /// Balance consumed against demand.
    Allocated {
        amount: Kwh,
        consumer: EntityId,
        record_id: RecordId,
    },

    /// Administrative cancellation.
    Cancelled { reason: String },
}

impl ChainEventKind {
    /// Lowercase label for logs and storage.
    pub fn label(&self) -> &'static str {
        match self {
            ChainEventKind::Issued { .. } => "issued",
            ChainEventKind::Transferred { .. } => "transferred",
            ChainEventKind::Split { .. } => "split",
            ChainEventKind::Allocated { .. } => "allocated",
            ChainEventKind::Cancelled { .. } => "cancelled",
        }
    }
}

/// One entry in a certificate's traceability chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEvent {
    pub certificate_id: CertificateId,
    pub recorded_at: DateTime<Utc>,
    pub kind: ChainEventKind,
}

impl ChainEvent {
    pub fn new(certificate_id: CertificateId, recorded_at: DateTime<Utc>, kind: ChainEventKind) -> Self {
        Self {
            certificate_id,
            recorded_at,
            kind,
        }
    }

    /// Content-derived identifier over the canonical CBOR encoding.
    ///
    /// Two deliveries of the same event digest identically, which is what
    /// lets the verifier treat the log as at-least-once.
    pub fn event_id(&self) -> EventId {
        EventId::digest_of(&self.canonical_bytes())
    }

    /// Deterministic CBOR encoding of the full event.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).expect("chain events always encode");
        buf
    }

    /// The amount this event debits from the certificate, if any.
    pub fn debit_amount(&self) -> Option<Kwh> {
        match &self.kind {
            ChainEventKind::Transferred { amount, .. }
            | ChainEventKind::Split { amount, .. }
            | ChainEventKind::Allocated { amount, .. } => Some(*amount),
            ChainEventKind::Issued { .. } | ChainEventKind::Cancelled { .. } => None,
        }
    }

    /// The opening credit, if this is the issuance event.
    pub fn issued_amount(&self) -> Option<Kwh> {
        match &self.kind {
            ChainEventKind::Issued { amount, .. } => Some(*amount),
            _ => None,
        }
    }
}

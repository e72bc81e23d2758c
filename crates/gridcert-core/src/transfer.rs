//! Transfer and split records: immutable evidence of balance movements
//! between entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CertificateId, EntityId, RecordId};
use crate::units::Kwh;

/// Movement of balance from one entity to another on a single certificate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: RecordId,
    pub certificate_id: CertificateId,
    pub from: EntityId,
    pub to: EntityId,
    pub amount: Kwh,
    pub transferred_at: DateTime<Utc>,
    pub memo: Option<String>,
}

/// One recipient share of a split request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitPart {
    pub entity: EntityId,
    pub amount: Kwh,
}

impl SplitPart {
    pub fn new(entity: EntityId, amount: Kwh) -> Self {
        Self { entity, amount }
    }
}

/// Subdivision of a certificate's balance into derivative certificates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitRecord {
    pub id: RecordId,
    pub certificate_id: CertificateId,
    pub parts: Vec<SplitPart>,
    /// Ids of the derivative certificates, parallel to `parts`.
    pub derived: Vec<CertificateId>,
    pub split_at: DateTime<Utc>,
}

impl SplitRecord {
    /// Total debited from the parent certificate.
    pub fn total(&self) -> Kwh {
        self.parts.iter().map(|p| p.amount).sum()
    }
}

//! Certificates: auditable claims on quantities of renewable generation.
//!
//! The registry exclusively owns status transitions and balance mutations;
//! allocation and transfer request them through it, never by writing
//! `remaining` directly. That keeps the conservation invariant enforceable
//! in one place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::record::{GenerationPeriod, GenerationRecord};
use crate::source::PowerType;
use crate::types::{CertificateId, EntityId, RecordId, SourceId};
use crate::units::Kwh;

/// Certificate lifecycle state.
///
/// `pending -> active -> {used, expired, cancelled}`. The three right-hand
/// states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CertificateStatus {
    Pending,
    Active,
    Used,
    Expired,
    Cancelled,
}

impl CertificateStatus {
    /// Whether no transitions leave this state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CertificateStatus::Used | CertificateStatus::Expired | CertificateStatus::Cancelled
        )
    }

    /// Whether the state machine permits `self -> to`.
    pub fn can_transition(self, to: CertificateStatus) -> bool {
        use CertificateStatus::*;
        matches!(
            (self, to),
            (Pending, Active) | (Active, Used) | (Active, Expired) | (Active, Cancelled)
        )
    }

    /// Lowercase label for display and storage.
    pub fn as_str(self) -> &'static str {
        match self {
            CertificateStatus::Pending => "pending",
            CertificateStatus::Active => "active",
            CertificateStatus::Used => "used",
            CertificateStatus::Expired => "expired",
            CertificateStatus::Cancelled => "cancelled",
        }
    }

    /// Convert to u8 for storage.
    pub fn to_u8(self) -> u8 {
        match self {
            CertificateStatus::Pending => 0,
            CertificateStatus::Active => 1,
            CertificateStatus::Used => 2,
            CertificateStatus::Expired => 3,
            CertificateStatus::Cancelled => 4,
        }
    }

    /// Try to parse from u8.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CertificateStatus::Pending),
            1 => Some(CertificateStatus::Active),
            2 => Some(CertificateStatus::Used),
            3 => Some(CertificateStatus::Expired),
            4 => Some(CertificateStatus::Cancelled),
            _ => None,
        }
    }
}

/// Result of a validity check against a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidityReport {
    pub is_valid: bool,
    pub status: CertificateStatus,
    /// Days past expiry; zero while the certificate is in validity.
    pub days_overdue: i64,
}

/// An auditable claim on a quantity of renewable generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: CertificateId,

    /// The 1:1 originating generation record.
    pub record_id: RecordId,

    /// The generating facility.
    pub facility: SourceId,

    pub power_type: PowerType,

    /// Original issued amount. Immutable.
    pub amount: Kwh,

    /// The accounting window of the underlying generation. `(facility,
    /// period)` must be unique among non-cancelled certificates.
    pub period: GenerationPeriod,

    pub issued_at: DateTime<Utc>,

    /// `issued_at` plus the configured validity period.
    pub expires_at: DateTime<Utc>,

    pub status: CertificateStatus,

    /// Undrawn balance. `used + remaining == amount` always.
    pub remaining: Kwh,

    /// Amount drawn by allocations, transfers, and splits.
    pub used: Kwh,

    /// Current holder of the balance.
    pub holder: EntityId,

    /// Set on derivatives created by a split.
    pub parent: Option<CertificateId>,

    // Verification fields required before activation.
    pub facility_name: String,
    pub location: String,
    pub certifying_body: String,
}

impl Certificate {
    /// Issue a certificate against an eligible generation record. Created
    /// `pending`; activation happens after the verification fields pass
    /// validation.
    #[allow(clippy::too_many_arguments)]
    pub fn issue(
        record: &GenerationRecord,
        holder: EntityId,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        facility_name: impl Into<String>,
        location: impl Into<String>,
        certifying_body: impl Into<String>,
        salt: [u8; 16],
    ) -> Self {
        Self {
            id: CertificateId::derive(&record.id, salt),
            record_id: record.id,
            facility: record.source_id,
            power_type: record.power_type,
            amount: record.amount,
            period: record.period,
            issued_at,
            expires_at,
            status: CertificateStatus::Pending,
            remaining: record.amount,
            used: Kwh::ZERO,
            holder,
            parent: None,
            facility_name: facility_name.into(),
            location: location.into(),
            certifying_body: certifying_body.into(),
        }
    }

    /// Build a derivative certificate for one part of a split.
    pub fn derive_split(
        parent: &Certificate,
        holder: EntityId,
        amount: Kwh,
        issued_at: DateTime<Utc>,
        salt: [u8; 16],
    ) -> Self {
        Self {
            id: CertificateId::derive(&parent.record_id, salt),
            record_id: parent.record_id,
            facility: parent.facility,
            power_type: parent.power_type,
            amount,
            period: parent.period,
            issued_at,
            // Derivatives inherit the parent's validity window.
            expires_at: parent.expires_at,
            status: CertificateStatus::Active,
            remaining: amount,
            used: Kwh::ZERO,
            holder,
            parent: Some(parent.id),
            facility_name: parent.facility_name.clone(),
            location: parent.location.clone(),
            certifying_body: parent.certifying_body.clone(),
        }
    }

    /// Apply a lifecycle transition, enforcing the state machine.
    pub fn transition(&mut self, to: CertificateStatus) -> Result<(), CoreError> {
        if !self.status.can_transition(to) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Whether the validity window has lapsed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whether this certificate can supply an allocation or transfer at
    /// `now`: active, in validity, with balance left.
    pub fn is_allocatable(&self, now: DateTime<Utc>) -> bool {
        self.status == CertificateStatus::Active && !self.is_expired(now) && !self.remaining.is_zero()
    }

    /// Pure validity check: compares `now` against the expiry window.
    pub fn check_validity(&self, now: DateTime<Utc>) -> ValidityReport {
        let days_overdue = if self.is_expired(now) {
            (now - self.expires_at).num_days().max(1)
        } else {
            0
        };
        ValidityReport {
            is_valid: self.status == CertificateStatus::Active && !self.is_expired(now),
            status: self.status,
            days_overdue,
        }
    }

    /// Draw down the balance. Fails without mutating on overdraw; flips the
    /// status to `used` when the balance reaches zero.
    pub fn debit(&mut self, amount: Kwh) -> Result<(), CoreError> {
        if amount > self.remaining {
            return Err(CoreError::Overdrawn {
                requested: amount,
                remaining: self.remaining,
            });
        }
        self.remaining = self
            .remaining
            .checked_sub(amount)
            .ok_or(CoreError::AmountOverflow)?;
        self.used = self.used.checked_add(amount).ok_or(CoreError::AmountOverflow)?;
        if self.remaining.is_zero() && self.status == CertificateStatus::Active {
            self.status = CertificateStatus::Used;
        }
        Ok(())
    }

    /// Compensating action: return a previously debited amount after a failed
    /// persistence write. Reopens a certificate the debit had marked `used`.
    pub fn credit(&mut self, amount: Kwh) -> Result<(), CoreError> {
        self.used = self
            .used
            .checked_sub(amount)
            .ok_or(CoreError::CreditExceedsUsed {
                requested: amount,
                used: self.used,
            })?;
        self.remaining = self
            .remaining
            .checked_add(amount)
            .ok_or(CoreError::AmountOverflow)?;
        if self.status == CertificateStatus::Used && !self.remaining.is_zero() {
            self.status = CertificateStatus::Active;
        }
        Ok(())
    }
}

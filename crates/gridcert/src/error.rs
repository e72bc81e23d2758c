//! The engine error taxonomy.
//!
//! Every variant maps to a stable machine-readable code; `is_retryable`
//! separates transient contention and collaborator failures (retry with
//! backoff) from errors the caller must re-decide.

use thiserror::Error;

use gridcert_core::{
    CertificateId, CertificateStatus, CoreError, Kwh, RecordId, SourceId, ValidationError,
};
use gridcert_store::StoreError;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or missing input. The caller's fault; never retried.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Referenced source absent.
    #[error("source not found: {0}")]
    SourceNotFound(SourceId),

    /// Source exists but no longer accepts measurements.
    #[error("source {0} is deactivated")]
    SourceInactive(SourceId),

    /// Referenced certificate absent.
    #[error("certificate not found: {0}")]
    CertificateNotFound(CertificateId),

    /// Referenced generation record absent.
    #[error("generation record not found: {0}")]
    RecordNotFound(RecordId),

    /// Record below the certification threshold.
    #[error("record {0} is below the certification threshold")]
    NotEligible(RecordId),

    /// A live certificate already covers this `(facility, period)`.
    #[error("certificate {existing} already covers this facility and period")]
    DuplicatePeriod { existing: CertificateId },

    /// Requested more than the certificate has left.
    #[error("insufficient balance on {certificate}: requested {requested}, remaining {remaining}")]
    InsufficientBalance {
        certificate: CertificateId,
        requested: Kwh,
        remaining: Kwh,
    },

    /// Certificate is not in a state that can supply balance.
    #[error("certificate {certificate} is {status:?}, not allocatable")]
    NotAllocatable {
        certificate: CertificateId,
        status: CertificateStatus,
    },

    /// Timed out waiting on a per-certificate lock. Transient; safe to
    /// retry with backoff.
    #[error("timed out waiting for lock on certificate {0}")]
    LockTimeout(CertificateId),

    /// A persistence collaborator failed. Any in-memory mutation has been
    /// compensated before this surfaces.
    #[error("persistence collaborator failed: {0}")]
    Store(#[from] StoreError),

    /// Internal accounting violation. Indicates a bug, not bad input.
    #[error("accounting error: {0}")]
    Accounting(#[from] CoreError),
}

impl EngineError {
    /// Stable machine-readable code for the service layer.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(inner) => inner.code(),
            EngineError::SourceNotFound(_)
            | EngineError::CertificateNotFound(_)
            | EngineError::RecordNotFound(_) => "not_found",
            EngineError::SourceInactive(_) => "source_inactive",
            EngineError::NotEligible(_) => "not_eligible",
            EngineError::DuplicatePeriod { .. } => "duplicate_period",
            EngineError::InsufficientBalance { .. } => "insufficient_balance",
            EngineError::NotAllocatable { .. } => "certificate_not_active",
            EngineError::LockTimeout(_) => "lock_timeout",
            EngineError::Store(_) => "store_unavailable",
            EngineError::Accounting(_) => "accounting_error",
        }
    }

    /// Whether the caller may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::LockTimeout(_) | EngineError::Store(_))
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

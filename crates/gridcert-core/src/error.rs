//! Error types for the core domain.

use thiserror::Error;

use crate::certificate::CertificateStatus;
use crate::types::{EntityId, SourceId};
use crate::units::Kwh;

/// Errors raised by balance mutations and lifecycle transitions.
#[derive(Debug, Error, PartialEq)]
pub enum CoreError {
    #[error("balance overdrawn: requested {requested}, remaining {remaining}")]
    Overdrawn { requested: Kwh, remaining: Kwh },

    #[error("credit exceeds used balance: {requested} > {used}")]
    CreditExceedsUsed { requested: Kwh, used: Kwh },

    #[error("amount arithmetic overflow")]
    AmountOverflow,

    #[error("invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: CertificateStatus,
        to: CertificateStatus,
    },

    #[error("source {0} is deactivated")]
    SourceDeactivated(SourceId),
}

/// Validation errors for caller-supplied input. Never retried automatically;
/// the input itself is at fault.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("amount must be positive")]
    NonPositiveAmount,

    #[error("missing required generation data: {field}")]
    MissingGenerationData { field: &'static str },

    #[error("split must name at least one recipient")]
    EmptySplit,

    #[error("split part for {entity} has zero amount")]
    ZeroSplitPart { entity: EntityId },

    #[error("generation period is empty")]
    EmptyPeriod,
}

impl ValidationError {
    /// Stable machine-readable code for the service layer.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::NonPositiveAmount => "non_positive_amount",
            ValidationError::MissingGenerationData { .. } => "missing_required_generation_data",
            ValidationError::EmptySplit | ValidationError::ZeroSplitPart { .. } => "invalid_split",
            ValidationError::EmptyPeriod => "empty_period",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_codes() {
        let err = ValidationError::MissingGenerationData { field: "location" };
        assert_eq!(err.code(), "missing_required_generation_data");
        assert_eq!(
            err.to_string(),
            "missing required generation data: location"
        );
    }
}

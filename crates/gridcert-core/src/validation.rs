//! Input validation for measurements, issuance, and splits.
//!
//! Validation failures are the caller's fault and are never retried; they
//! fail before any state is persisted.

use crate::certificate::Certificate;
use crate::error::ValidationError;
use crate::transfer::SplitPart;
use crate::units::Kwh;

/// Validate a raw measurement amount.
pub fn validate_measurement(amount: Kwh) -> Result<(), ValidationError> {
    if amount.is_zero() {
        return Err(ValidationError::NonPositiveAmount);
    }
    Ok(())
}

/// Validate that a certificate carries every field required for activation:
/// facility id and name, power type, amount, period, location, and the
/// certifying body.
pub fn validate_issuance(certificate: &Certificate) -> Result<(), ValidationError> {
    if certificate.facility_name.trim().is_empty() {
        return Err(ValidationError::MissingGenerationData {
            field: "facility_name",
        });
    }
    if certificate.location.trim().is_empty() {
        return Err(ValidationError::MissingGenerationData { field: "location" });
    }
    if certificate.certifying_body.trim().is_empty() {
        return Err(ValidationError::MissingGenerationData {
            field: "certifying_body",
        });
    }
    if certificate.amount.is_zero() {
        return Err(ValidationError::MissingGenerationData { field: "amount" });
    }
    if certificate.period.start >= certificate.period.end {
        return Err(ValidationError::EmptyPeriod);
    }
    Ok(())
}

/// Validate the recipient list of a split request. Balance sufficiency is
/// checked later, inside the per-certificate critical section.
pub fn validate_split_parts(parts: &[SplitPart]) -> Result<(), ValidationError> {
    if parts.is_empty() {
        return Err(ValidationError::EmptySplit);
    }
    for part in parts {
        if part.amount.is_zero() {
            return Err(ValidationError::ZeroSplitPart {
                entity: part.entity,
            });
        }
    }
    Ok(())
}

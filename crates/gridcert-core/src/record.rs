//! Generation records: the raw, immutable measurement events.
//!
//! A record's `amount` never changes after ingest. The only mutation is the
//! allocation/transfer path incrementing `used` through the checked methods,
//! which preserve `used + remaining == amount` at all times.

use chrono::{DateTime, Datelike, Months, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::source::{GreenPowerSource, PowerType};
use crate::types::{RecordId, SourceId};
use crate::units::{avoided_carbon_kg, Kwh};

/// A half-open generation accounting window `[start, end)`.
///
/// Measurement ingest assigns the UTC calendar month containing the
/// generation timestamp; the `(facility, period)` pair is the
/// duplicate-issuance key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenerationPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl GenerationPeriod {
    /// The calendar month (UTC) containing `at`.
    pub fn month_of(at: DateTime<Utc>) -> Self {
        let start = Utc
            .with_ymd_and_hms(at.year(), at.month(), 1, 0, 0, 0)
            .single()
            .expect("first of month is a valid UTC timestamp");
        let end = start
            .checked_add_months(Months::new(1))
            .expect("month arithmetic in range");
        Self { start, end }
    }

    /// Whether `at` falls inside the window.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    /// Short label for logs, e.g. `2024-01`.
    pub fn label(&self) -> String {
        self.start.format("%Y-%m").to_string()
    }
}

/// An immutable measurement of renewable generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    /// Content-derived: hash of source id, timestamp, and a random salt.
    pub id: RecordId,

    /// The facility that produced this measurement.
    pub source_id: SourceId,

    /// Copied from the source at ingest time.
    pub power_type: PowerType,

    /// The measured amount. Immutable after ingest.
    pub amount: Kwh,

    /// When the energy was generated.
    pub generated_at: DateTime<Utc>,

    /// The accounting window this measurement belongs to.
    pub period: GenerationPeriod,

    /// Carbon avoided versus grid supply, kg CO2e.
    pub avoided_carbon_kg: f64,

    /// Whether the amount clears the certification threshold.
    pub certificate_eligible: bool,

    /// Amount already drawn by allocations and transfers.
    pub used: Kwh,
}

impl GenerationRecord {
    /// Build a record from a validated measurement.
    pub fn new(
        source: &GreenPowerSource,
        amount: Kwh,
        generated_at: DateTime<Utc>,
        grid_emission_factor: f64,
        min_certifiable: Kwh,
        salt: [u8; 16],
    ) -> Self {
        Self {
            id: RecordId::derive(source.id.as_bytes(), generated_at, salt),
            source_id: source.id,
            power_type: source.power_type,
            amount,
            generated_at,
            period: GenerationPeriod::month_of(generated_at),
            avoided_carbon_kg: avoided_carbon_kg(amount, grid_emission_factor, source.carbon_factor),
            certificate_eligible: amount >= min_certifiable,
            used: Kwh::ZERO,
        }
    }

    /// The undrawn balance: `amount - used`.
    pub fn remaining(&self) -> Kwh {
        self.amount.saturating_sub(self.used)
    }

    /// Draw down the balance. Fails without mutating if the draw exceeds the
    /// remaining amount.
    pub fn debit(&mut self, amount: Kwh) -> Result<(), CoreError> {
        let remaining = self.remaining();
        if amount > remaining {
            return Err(CoreError::Overdrawn {
                requested: amount,
                remaining,
            });
        }
        self.used = self.used.checked_add(amount).ok_or(CoreError::AmountOverflow)?;
        Ok(())
    }

    /// Compensating action: return a previously debited amount.
    pub fn credit(&mut self, amount: Kwh) -> Result<(), CoreError> {
        self.used = self
            .used
            .checked_sub(amount)
            .ok_or(CoreError::CreditExceedsUsed {
                requested: amount,
                used: self.used,
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::PowerType;

    fn test_record(amount: Kwh) -> GenerationRecord {
        let source = GreenPowerSource::new(
            "Ridgeline Wind",
            PowerType::Wind,
            40_000,
            0.35,
            "grid-north-02",
            Utc.with_ymd_and_hms(2022, 3, 1, 0, 0, 0).unwrap(),
        );
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        GenerationRecord::new(&source, amount, at, 0.475, Kwh(1_000), [3; 16])
    }

    #[test]
    fn test_month_period_bounds() {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let period = GenerationPeriod::month_of(at);
        assert_eq!(period.start, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(period.end, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        assert!(period.contains(at));
        assert!(!period.contains(period.end));
        assert_eq!(period.label(), "2024-01");
    }

    #[test]
    fn test_december_rolls_into_next_year() {
        let at = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        let period = GenerationPeriod::month_of(at);
        assert_eq!(period.end, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_eligibility_threshold() {
        assert!(test_record(Kwh(1_000)).certificate_eligible);
        assert!(!test_record(Kwh(999)).certificate_eligible);
    }

    #[test]
    fn test_debit_preserves_conservation() {
        let mut record = test_record(Kwh(5_000));
        record.debit(Kwh(3_000)).unwrap();
        assert_eq!(record.used, Kwh(3_000));
        assert_eq!(record.remaining(), Kwh(2_000));
        assert_eq!(record.used.checked_add(record.remaining()), Some(record.amount));
    }

    #[test]
    fn test_overdraw_rejected_without_mutation() {
        let mut record = test_record(Kwh(5_000));
        record.debit(Kwh(4_000)).unwrap();
        let err = record.debit(Kwh(2_000)).unwrap_err();
        assert_eq!(
            err,
            CoreError::Overdrawn {
                requested: Kwh(2_000),
                remaining: Kwh(1_000),
            }
        );
        assert_eq!(record.used, Kwh(4_000));
    }

    #[test]
    fn test_credit_rolls_back_debit() {
        let mut record = test_record(Kwh(5_000));
        record.debit(Kwh(3_000)).unwrap();
        record.credit(Kwh(3_000)).unwrap();
        assert_eq!(record.used, Kwh::ZERO);

        let err = record.credit(Kwh(1)).unwrap_err();
        assert!(matches!(err, CoreError::CreditExceedsUsed { .. }));
    }
}

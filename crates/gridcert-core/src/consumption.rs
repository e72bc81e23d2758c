//! Consumption records: the allocation engine's immutable output.
//!
//! Corrections are new records, never in-place edits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::source::PowerType;
use crate::types::{CertificateId, EntityId, RecordId, SourceId};
use crate::units::{grid_carbon_kg, Kwh};

/// One draw from a certificate covering part of a consumption request.
///
/// The power type is denormalized from the certificate so reports can break
/// consumption down per power type without a store lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationEntry {
    pub source_id: SourceId,
    pub certificate_id: CertificateId,
    pub power_type: PowerType,
    pub amount: Kwh,
}

/// An immutable record of one consumption event and its green coverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionRecord {
    pub id: RecordId,

    pub consumer: EntityId,

    /// The demanded amount.
    pub requested: Kwh,

    /// Ordered draws against certificates. Entry amounts sum to `green`.
    pub entries: Vec<AllocationEntry>,

    /// Total covered by certificates. Never exceeds `requested`.
    pub green: Kwh,

    /// The shortfall supplied by the grid: `requested - green`.
    pub grid: Kwh,

    pub consumed_at: DateTime<Utc>,

    /// Carbon attributed to the grid portion, kg CO2e. The green portion
    /// carries zero.
    pub grid_carbon_kg: f64,
}

impl ConsumptionRecord {
    /// Assemble a record from the allocation engine's entry list.
    pub fn new(
        consumer: EntityId,
        requested: Kwh,
        entries: Vec<AllocationEntry>,
        consumed_at: DateTime<Utc>,
        grid_emission_factor: f64,
        salt: [u8; 16],
    ) -> Self {
        let green: Kwh = entries.iter().map(|e| e.amount).sum();
        debug_assert!(green <= requested, "allocation overfilled the request");
        let grid = requested.saturating_sub(green);
        Self {
            id: RecordId::derive(consumer.as_bytes(), consumed_at, salt),
            consumer,
            requested,
            entries,
            green,
            grid,
            consumed_at,
            grid_carbon_kg: grid_carbon_kg(grid, grid_emission_factor),
        }
    }

    /// Green coverage as a fraction of the request; zero for a zero request.
    pub fn green_ratio(&self) -> f64 {
        if self.requested.is_zero() {
            0.0
        } else {
            self.green.as_f64() / self.requested.as_f64()
        }
    }

    /// Whether green supply fully covered the request.
    pub fn fully_covered(&self) -> bool {
        self.grid.is_zero()
    }
}

//! Energy and carbon units.
//!
//! All internal accounting is in whole kilowatt-hours. Megawatt-hours are a
//! presentation conversion only and never appear in invariant checks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

/// An energy amount in whole kilowatt-hours.
///
/// Balance arithmetic goes through the checked methods; the conservation
/// invariant (`used + remaining == amount`) depends on debits never wrapping.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Kwh(pub u64);

impl Kwh {
    /// Zero kilowatt-hours.
    pub const ZERO: Self = Self(0);

    /// Create from a raw kWh count.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw kWh count.
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Whether this amount is zero.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Checked subtraction. `None` if `other > self`.
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Saturating addition (reporting totals only, never balances).
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction.
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Presentation-layer conversion to megawatt-hours.
    pub fn as_mwh(self) -> f64 {
        self.0 as f64 / 1000.0
    }

    /// The amount as a float, for ratio and carbon arithmetic.
    pub fn as_f64(self) -> f64 {
        self.0 as f64
    }
}

impl fmt::Debug for Kwh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kwh({})", self.0)
    }
}

impl fmt::Display for Kwh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} kWh", self.0)
    }
}

impl From<u64> for Kwh {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Sum for Kwh {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Self::saturating_add)
    }
}

/// Carbon avoided by generating `amount` from a source with the given
/// lifecycle factor instead of drawing it from the grid.
///
/// Factors are kilograms CO2e per kWh. A source dirtier than the grid avoids
/// nothing; the delta is clamped at zero.
pub fn avoided_carbon_kg(amount: Kwh, grid_factor: f64, source_factor: f64) -> f64 {
    let delta = (grid_factor - source_factor).max(0.0);
    amount.as_f64() * delta
}

/// Carbon attributed to the grid-supplied portion of a consumption.
pub fn grid_carbon_kg(amount: Kwh, grid_factor: f64) -> f64 {
    amount.as_f64() * grid_factor
}

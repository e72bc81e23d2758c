//! Generation sources: the registered facilities measurements come from.
//!
//! A source is created at onboarding and never deleted, only deactivated.
//! Measurement ingest is the only writer after onboarding: it appends record
//! ids and bumps the monotonically increasing cumulative generation counter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::record::GenerationRecord;
use crate::types::{RecordId, SourceId};
use crate::units::Kwh;

/// The kind of renewable generation a source produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerType {
    Solar,
    Wind,
    Hydro,
    Biomass,
    Geothermal,
}

impl PowerType {
    /// All known power types, for iteration in reports.
    pub const ALL: [PowerType; 5] = [
        PowerType::Solar,
        PowerType::Wind,
        PowerType::Hydro,
        PowerType::Biomass,
        PowerType::Geothermal,
    ];

    /// Default lifecycle carbon factor in kg CO2e per kWh.
    ///
    /// Median lifecycle values; onboarding may override per facility.
    pub fn default_carbon_factor(self) -> f64 {
        match self {
            PowerType::Solar => 0.041,
            PowerType::Wind => 0.011,
            PowerType::Hydro => 0.024,
            PowerType::Biomass => 0.230,
            PowerType::Geothermal => 0.038,
        }
    }

    /// Lowercase label for display and storage.
    pub fn as_str(self) -> &'static str {
        match self {
            PowerType::Solar => "solar",
            PowerType::Wind => "wind",
            PowerType::Hydro => "hydro",
            PowerType::Biomass => "biomass",
            PowerType::Geothermal => "geothermal",
        }
    }

    /// Convert to u8 for storage.
    pub fn to_u8(self) -> u8 {
        match self {
            PowerType::Solar => 0,
            PowerType::Wind => 1,
            PowerType::Hydro => 2,
            PowerType::Biomass => 3,
            PowerType::Geothermal => 4,
        }
    }

    /// Try to parse from u8.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PowerType::Solar),
            1 => Some(PowerType::Wind),
            2 => Some(PowerType::Hydro),
            3 => Some(PowerType::Biomass),
            4 => Some(PowerType::Geothermal),
            _ => None,
        }
    }
}

/// Lifecycle status of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceStatus {
    Active,
    Deactivated,
}

/// A registered green-power generation facility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreenPowerSource {
    /// Derived from connection point + name; stable across instances.
    pub id: SourceId,

    /// Display name of the facility.
    pub name: String,

    /// The kind of generation.
    pub power_type: PowerType,

    /// Nameplate capacity in kW.
    pub rated_capacity_kw: u64,

    /// Conversion efficiency factor in (0, 1].
    pub efficiency: f64,

    /// Grid connection point identifier.
    pub connection_point: String,

    /// Lifecycle carbon factor in kg CO2e per kWh.
    pub carbon_factor: f64,

    /// Active or deactivated. Deactivation is the only removal.
    pub status: SourceStatus,

    /// Total measured generation. Monotonically increasing.
    pub cumulative_generation: Kwh,

    /// Ids of the generation records this source owns.
    pub record_ids: Vec<RecordId>,

    /// When the facility was onboarded.
    pub commissioned_at: DateTime<Utc>,
}

impl GreenPowerSource {
    /// Register a new source. The carbon factor defaults per power type.
    pub fn new(
        name: impl Into<String>,
        power_type: PowerType,
        rated_capacity_kw: u64,
        efficiency: f64,
        connection_point: impl Into<String>,
        commissioned_at: DateTime<Utc>,
    ) -> Self {
        let name = name.into();
        let connection_point = connection_point.into();
        let id = SourceId::derive(&connection_point, &name);
        Self {
            id,
            name,
            power_type,
            rated_capacity_kw,
            efficiency,
            connection_point,
            carbon_factor: power_type.default_carbon_factor(),
            status: SourceStatus::Active,
            cumulative_generation: Kwh::ZERO,
            record_ids: Vec::new(),
            commissioned_at,
        }
    }

    /// Whether the source accepts new measurements.
    pub fn is_active(&self) -> bool {
        self.status == SourceStatus::Active
    }

    /// Deactivate the source. Existing records and certificates are kept.
    pub fn deactivate(&mut self) {
        self.status = SourceStatus::Deactivated;
    }

    /// Apply a new generation record: append its id and bump the cumulative
    /// counter. Rejects measurements against deactivated sources.
    pub fn apply_record(&mut self, record: &GenerationRecord) -> Result<(), CoreError> {
        if !self.is_active() {
            return Err(CoreError::SourceDeactivated(self.id));
        }
        let bumped = self
            .cumulative_generation
            .checked_add(record.amount)
            .ok_or(CoreError::AmountOverflow)?;
        self.cumulative_generation = bumped;
        self.record_ids.push(record.id);
        Ok(())
    }
}

//! Windowed rollups over consumption and generation records.
//!
//! Pure computation over snapshots: no locks, no invariant responsibility.
//! Reports fail open: a degraded secondary read sets the `partial` flag
//! instead of aborting the report.

use std::collections::BTreeMap;

use gridcert_core::{ConsumptionRecord, EntityId, GenerationRecord, Kwh, PowerType, SourceId};
use gridcert_store::TimeWindow;

/// Green consumption attributed to one power type.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerTypeBreakdown {
    pub power_type: PowerType,
    pub amount: Kwh,
}

/// Renewable-ratio rollup over a consumption window.
#[derive(Debug, Clone)]
pub struct RenewableRatioReport {
    pub window: TimeWindow,
    pub records: usize,
    pub total_consumption: Kwh,
    pub green_consumption: Kwh,
    pub grid_consumption: Kwh,
    /// `green / total`; zero for an empty window, not a division error.
    pub renewable_ratio: f64,
    pub by_power_type: Vec<PowerTypeBreakdown>,
    /// Carbon the green share avoided versus all-grid supply, kg CO2e.
    pub carbon_avoided_kg: f64,
    /// Carbon attributed to the grid share, kg CO2e.
    pub grid_carbon_kg: f64,
    /// `max(0, target - ratio)`.
    pub compliance_gap: f64,
    pub partial: bool,
}

pub(crate) fn renewable_ratio_report(
    window: TimeWindow,
    records: &[ConsumptionRecord],
    grid_emission_factor: f64,
    target_ratio: f64,
    partial: bool,
) -> RenewableRatioReport {
    let total: Kwh = records.iter().map(|r| r.requested).sum();
    let green: Kwh = records.iter().map(|r| r.green).sum();
    let grid: Kwh = records.iter().map(|r| r.grid).sum();

    let ratio = if total.is_zero() {
        0.0
    } else {
        green.as_f64() / total.as_f64()
    };

    let mut per_type: BTreeMap<u8, Kwh> = BTreeMap::new();
    for record in records {
        for entry in &record.entries {
            let slot = per_type.entry(entry.power_type.to_u8()).or_insert(Kwh::ZERO);
            *slot = slot.saturating_add(entry.amount);
        }
    }
    let by_power_type = per_type
        .into_iter()
        .filter_map(|(kind, amount)| {
            PowerType::from_u8(kind).map(|power_type| PowerTypeBreakdown { power_type, amount })
        })
        .collect();

    RenewableRatioReport {
        window,
        records: records.len(),
        total_consumption: total,
        green_consumption: green,
        grid_consumption: grid,
        renewable_ratio: ratio,
        by_power_type,
        carbon_avoided_kg: green.as_f64() * grid_emission_factor,
        grid_carbon_kg: records.iter().map(|r| r.grid_carbon_kg).sum(),
        compliance_gap: (target_ratio - ratio).max(0.0),
        partial,
    }
}

/// Generation rollup over a window.
#[derive(Debug, Clone)]
pub struct ProductionReport {
    pub window: TimeWindow,
    pub records: usize,
    pub total_generated: Kwh,
    pub certificate_eligible: Kwh,
    pub avoided_carbon_kg: f64,
    pub by_power_type: Vec<PowerTypeBreakdown>,
    /// Distinct facilities that reported in the window.
    pub sources_reporting: usize,
    /// Registered active sources, if the registry read succeeded.
    pub active_sources: Option<usize>,
    pub partial: bool,
}

pub(crate) fn production_report(
    window: TimeWindow,
    records: &[GenerationRecord],
    active_sources: Option<usize>,
) -> ProductionReport {
    let total: Kwh = records.iter().map(|r| r.amount).sum();
    let eligible: Kwh = records
        .iter()
        .filter(|r| r.certificate_eligible)
        .map(|r| r.amount)
        .sum();

    let mut per_type: BTreeMap<u8, Kwh> = BTreeMap::new();
    let mut facilities: Vec<SourceId> = Vec::new();
    for record in records {
        let slot = per_type.entry(record.power_type.to_u8()).or_insert(Kwh::ZERO);
        *slot = slot.saturating_add(record.amount);
        if !facilities.contains(&record.source_id) {
            facilities.push(record.source_id);
        }
    }
    let by_power_type = per_type
        .into_iter()
        .filter_map(|(kind, amount)| {
            PowerType::from_u8(kind).map(|power_type| PowerTypeBreakdown { power_type, amount })
        })
        .collect();

    ProductionReport {
        window,
        records: records.len(),
        total_generated: total,
        certificate_eligible: eligible,
        avoided_carbon_kg: records.iter().map(|r| r.avoided_carbon_kg).sum(),
        by_power_type,
        sources_reporting: facilities.len(),
        partial: active_sources.is_none(),
        active_sources,
    }
}

/// One consumer's share of a consumption window.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerBreakdown {
    pub consumer: EntityId,
    pub requested: Kwh,
    pub green: Kwh,
    pub grid: Kwh,
}

/// Consumption rollup over a window, broken down per consumer.
#[derive(Debug, Clone)]
pub struct ConsumptionReport {
    pub window: TimeWindow,
    pub records: usize,
    pub total_consumption: Kwh,
    pub green_consumption: Kwh,
    pub grid_consumption: Kwh,
    pub grid_carbon_kg: f64,
    pub by_consumer: Vec<ConsumerBreakdown>,
    pub partial: bool,
}

pub(crate) fn consumption_report(
    window: TimeWindow,
    records: &[ConsumptionRecord],
) -> ConsumptionReport {
    let mut by_consumer: Vec<ConsumerBreakdown> = Vec::new();
    for record in records {
        match by_consumer.iter_mut().find(|b| b.consumer == record.consumer) {
            Some(slot) => {
                slot.requested = slot.requested.saturating_add(record.requested);
                slot.green = slot.green.saturating_add(record.green);
                slot.grid = slot.grid.saturating_add(record.grid);
            }
            None => by_consumer.push(ConsumerBreakdown {
                consumer: record.consumer,
                requested: record.requested,
                green: record.green,
                grid: record.grid,
            }),
        }
    }

    ConsumptionReport {
        window,
        records: records.len(),
        total_consumption: records.iter().map(|r| r.requested).sum(),
        green_consumption: records.iter().map(|r| r.green).sum(),
        grid_consumption: records.iter().map(|r| r.grid).sum(),
        grid_carbon_kg: records.iter().map(|r| r.grid_carbon_kg).sum(),
        by_consumer,
        partial: false,
    }
}

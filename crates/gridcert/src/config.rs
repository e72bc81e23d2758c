//! Engine configuration.

use std::time::Duration;

use gridcert_core::Kwh;

/// Order in which allocatable certificates are consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationPolicy {
    /// Use-it-or-lose-it: drain certificates closest to expiry first, ties
    /// broken by earliest issuance.
    #[default]
    SoonestExpiryFirst,

    /// First-in-first-out by issuance timestamp.
    EarliestIssuedFirst,
}

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum measurement that earns a certificate. Whole-unit threshold,
    /// not a per-record cap.
    pub min_certifiable: Kwh,

    /// Certificate validity window in calendar months from issuance.
    pub validity_months: u32,

    /// Grid emission factor in kg CO2e per kWh.
    pub grid_emission_factor: f64,

    /// Compliance target for the renewable ratio, in [0, 1].
    pub target_renewable_ratio: f64,

    /// Certifying body stamped onto issued certificates. Must be non-empty
    /// or activation fails validation.
    pub certifying_body: String,

    /// How certificates are ordered during allocation.
    pub allocation_policy: AllocationPolicy,

    /// How long a request may wait on a per-certificate lock before failing
    /// with the retryable lock-timeout error.
    pub lock_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_certifiable: Kwh(1_000),
            validity_months: 12,
            grid_emission_factor: 0.475,
            target_renewable_ratio: 0.5,
            certifying_body: "Gridcert Registry".to_string(),
            allocation_policy: AllocationPolicy::default(),
            lock_timeout: Duration::from_secs(2),
        }
    }
}

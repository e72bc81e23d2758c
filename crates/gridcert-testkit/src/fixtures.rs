//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: an engine over an in-memory
//! store, plus shorthand for onboarding sources and issuing certificates.

use chrono::{DateTime, TimeZone, Utc};

use gridcert::{Certificate, Engine, EngineConfig, GreenPowerSource, Kwh, PowerType, SourceId};
use gridcert_store::MemoryStore;

/// A test fixture wrapping an engine over a fresh in-memory store.
pub struct TestFixture {
    pub engine: Engine<MemoryStore>,
}

impl TestFixture {
    /// Create a fixture with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create a fixture with a custom configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            engine: Engine::new(MemoryStore::new(), config),
        }
    }

    /// Deterministic UTC timestamp shorthand.
    pub fn ts(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
            .single()
            .expect("fixture timestamps are valid")
    }

    /// Onboard a source with plausible defaults.
    pub async fn onboard_source(&self, name: &str, power_type: PowerType) -> SourceId {
        let source = GreenPowerSource::new(
            name,
            power_type,
            25_000,
            0.3,
            format!("cp-{name}"),
            Self::ts(2023, 1, 1, 0),
        );
        self.engine
            .register_source(source)
            .await
            .expect("source registration succeeds on a fresh store")
    }

    /// Record an eligible measurement and return the issued certificate.
    pub async fn issue(
        &self,
        source_id: &SourceId,
        amount: Kwh,
        at: DateTime<Utc>,
    ) -> Certificate {
        self.engine
            .record_generation(source_id, amount, at)
            .await
            .expect("ingest succeeds")
            .certificate
            .expect("eligible measurement issues a certificate")
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcert::CertificateStatus;

    #[tokio::test]
    async fn test_fixture_issues_certificates() {
        let fixture = TestFixture::new();
        let source_id = fixture.onboard_source("sunfield", PowerType::Solar).await;

        let certificate = fixture
            .issue(&source_id, Kwh(5_000), TestFixture::ts(2024, 1, 15, 9))
            .await;

        assert_eq!(certificate.status, CertificateStatus::Active);
        assert_eq!(certificate.remaining, Kwh(5_000));
        assert_eq!(certificate.facility, source_id);
    }

    #[tokio::test]
    async fn test_distinct_sources_distinct_ids() {
        let fixture = TestFixture::new();
        let a = fixture.onboard_source("a", PowerType::Wind).await;
        let b = fixture.onboard_source("b", PowerType::Wind).await;
        assert_ne!(a, b);
    }
}

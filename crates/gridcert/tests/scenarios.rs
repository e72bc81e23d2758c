//! End-to-end scenarios: ingest through certification, allocation,
//! transfer, split, verification, and reporting against an in-memory store.

use chrono::{DateTime, TimeZone, Utc};

use gridcert::core::chain::ChainIntegrity;
use gridcert::store::{CertificateStore, ChainLog, MemoryStore, SourceRegistry};
use gridcert::{
    CertificateStatus, ChainEvent, ChainEventKind, Engine, EngineConfig, EngineError, EngineEvent,
    EntityId, GenerationPeriod, GreenPowerSource, Kwh, PowerType, SourceId, SplitPart, TimeWindow,
};

fn engine() -> Engine<MemoryStore> {
    Engine::new(MemoryStore::new(), EngineConfig::default())
}

fn ts(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .expect("test timestamps are valid")
}

async fn onboard(engine: &Engine<MemoryStore>, name: &str, power_type: PowerType) -> SourceId {
    let source = GreenPowerSource::new(
        name,
        power_type,
        25_000,
        0.3,
        format!("cp-{name}"),
        ts(2023, 1, 1, 0),
    );
    engine.register_source(source).await.unwrap()
}

// ─────────────────────────────────────────────────────────────────────────
// Measurement ingest
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ingest_rejects_zero_amount() {
    let engine = engine();
    let source = onboard(&engine, "sunfield", PowerType::Solar).await;

    let err = engine
        .record_generation(&source, Kwh::ZERO, ts(2024, 1, 15, 9))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn ingest_rejects_unknown_source() {
    let engine = engine();
    let unknown = SourceId::derive("nowhere", "ghost");

    let err = engine
        .record_generation(&unknown, Kwh(1_000), ts(2024, 1, 15, 9))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SourceNotFound(_)));
    assert_eq!(err.code(), "not_found");
}

#[tokio::test]
async fn ingest_rejects_deactivated_source() {
    let engine = engine();
    let source = onboard(&engine, "sunfield", PowerType::Solar).await;
    engine.deactivate_source(&source).await.unwrap();

    let err = engine
        .record_generation(&source, Kwh(1_000), ts(2024, 1, 15, 9))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SourceInactive(_)));
}

#[tokio::test]
async fn sub_threshold_measurement_is_recorded_without_certificate() {
    let engine = engine();
    let source = onboard(&engine, "sunfield", PowerType::Solar).await;

    let outcome = engine
        .record_generation(&source, Kwh(999), ts(2024, 1, 15, 9))
        .await
        .unwrap();
    assert!(!outcome.record.certificate_eligible);
    assert!(outcome.certificate.is_none());

    // The measurement still counts toward cumulative generation.
    let stored = engine.store().get_source(&source).await.unwrap().unwrap();
    assert_eq!(stored.cumulative_generation, Kwh(999));
}

// ─────────────────────────────────────────────────────────────────────────
// Spec scenarios
// ─────────────────────────────────────────────────────────────────────────

/// 50,000 kWh of January solar becomes an active certificate expiring
/// twelve months after issue.
#[tokio::test]
async fn issuing_january_generation_sets_twelve_month_expiry() {
    let engine = engine();
    let source = onboard(&engine, "sunfield", PowerType::Solar).await;

    let outcome = engine
        .record_generation(&source, Kwh(50_000), ts(2024, 1, 31, 12))
        .await
        .unwrap();
    let certificate = outcome.certificate.expect("50 MWh is eligible");

    assert_eq!(certificate.status, CertificateStatus::Active);
    assert_eq!(certificate.remaining, Kwh(50_000));
    assert_eq!(certificate.expires_at, ts(2025, 1, 31, 12));
    assert_eq!(
        certificate.period,
        GenerationPeriod::month_of(ts(2024, 1, 31, 12))
    );

    let validity = engine
        .check_validity(&certificate.id, ts(2024, 6, 1, 0))
        .await
        .unwrap();
    assert!(validity.is_valid);
    assert_eq!(validity.days_overdue, 0);
}

/// Allocating 8,000 kWh against 10,000 kWh of supply is fully green.
#[tokio::test]
async fn allocation_within_supply_is_fully_green() {
    let engine = engine();
    let source = onboard(&engine, "sunfield", PowerType::Solar).await;
    let certificate = engine
        .record_generation(&source, Kwh(10_000), ts(2024, 1, 31, 12))
        .await
        .unwrap()
        .certificate
        .unwrap();

    let record = engine
        .allocate_consumption(EntityId::derive("acme"), Kwh(8_000), ts(2024, 2, 10, 8))
        .await
        .unwrap();

    assert_eq!(record.green, Kwh(8_000));
    assert_eq!(record.grid, Kwh::ZERO);
    assert_eq!(record.green_ratio(), 1.0);
    assert_eq!(record.entries.len(), 1);
    assert_eq!(record.entries[0].certificate_id, certificate.id);

    let stored = engine
        .store()
        .get_certificate(&certificate.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.remaining, Kwh(2_000));
    assert_eq!(stored.used, Kwh(8_000));
}

/// Allocating 12,000 kWh against 10,000 kWh of supply draws the shortfall
/// from the grid and reports it on the event bus.
#[tokio::test]
async fn allocation_past_supply_records_grid_shortfall() {
    let engine = engine();
    let mut events = engine.subscribe();
    let source = onboard(&engine, "sunfield", PowerType::Solar).await;
    let certificate = engine
        .record_generation(&source, Kwh(10_000), ts(2024, 1, 31, 12))
        .await
        .unwrap()
        .certificate
        .unwrap();

    let record = engine
        .allocate_consumption(EntityId::derive("acme"), Kwh(12_000), ts(2024, 2, 10, 8))
        .await
        .unwrap();

    assert_eq!(record.green, Kwh(10_000));
    assert_eq!(record.grid, Kwh(2_000));
    assert!((record.green_ratio() - 0.8333).abs() < 1e-4);
    assert!((record.grid_carbon_kg - 2_000.0 * 0.475).abs() < 1e-9);

    // The drained certificate flips to used.
    let stored = engine
        .store()
        .get_certificate(&certificate.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, CertificateStatus::Used);
    assert_eq!(stored.remaining, Kwh::ZERO);

    // Skip the issuance notification, then expect the shortfall.
    loop {
        match events.try_recv().unwrap() {
            EngineEvent::SupplyShortfall {
                requested, green, ..
            } => {
                assert_eq!(requested, Kwh(12_000));
                assert_eq!(green, Kwh(10_000));
                break;
            }
            _ => continue,
        }
    }
}

/// Transferring more than the remaining balance fails without mutating it.
#[tokio::test]
async fn overdrawn_transfer_is_rejected_and_balance_unchanged() {
    let engine = engine();
    let source = onboard(&engine, "sunfield", PowerType::Solar).await;
    let certificate = engine
        .record_generation(&source, Kwh(30_000), ts(2024, 1, 31, 12))
        .await
        .unwrap()
        .certificate
        .unwrap();

    let err = engine
        .transfer(
            &certificate.id,
            certificate.holder,
            EntityId::derive("buyer"),
            Kwh(60_000),
            None,
            ts(2024, 2, 1, 0),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), "insufficient_balance");
    assert!(matches!(
        err,
        EngineError::InsufficientBalance {
            requested: Kwh(60_000),
            remaining: Kwh(30_000),
            ..
        }
    ));

    let stored = engine
        .store()
        .get_certificate(&certificate.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.remaining, Kwh(30_000));
    assert_eq!(stored.used, Kwh::ZERO);
}

/// A chain whose transfer exceeds its issuance fails verification.
#[tokio::test]
async fn verifier_flags_transfer_past_issuance() {
    let engine = engine();
    let id = gridcert::CertificateId::from_bytes([0x42; 32]);
    let period = GenerationPeriod::month_of(ts(2024, 1, 15, 0));

    engine
        .store()
        .append(&ChainEvent::new(
            id,
            ts(2024, 1, 31, 12),
            ChainEventKind::Issued {
                amount: Kwh(50_000),
                facility: SourceId::derive("cp", "src"),
                period,
            },
        ))
        .await
        .unwrap();
    engine
        .store()
        .append(&ChainEvent::new(
            id,
            ts(2024, 2, 1, 0),
            ChainEventKind::Transferred {
                amount: Kwh(60_000),
                from: EntityId::derive("a"),
                to: EntityId::derive("b"),
                record_id: gridcert::RecordId::from_bytes([1; 32]),
            },
        ))
        .await
        .unwrap();

    let report = engine.verify_chain(&id).await.unwrap();
    assert!(!report.is_valid);
    assert!(report
        .anomalies
        .iter()
        .any(|a| a.code() == "transfer_amount_exceeds_generation"));
    assert_eq!(report.integrity, ChainIntegrity::Compromised);
}

// ─────────────────────────────────────────────────────────────────────────
// Certificate registry
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn second_certificate_for_same_period_is_rejected() {
    let engine = engine();
    let source = onboard(&engine, "sunfield", PowerType::Solar).await;

    let first = engine
        .record_generation(&source, Kwh(20_000), ts(2024, 1, 10, 9))
        .await
        .unwrap();
    let existing = first.certificate.unwrap();

    // A second eligible measurement in the same month keeps its record but
    // cannot claim the certificate slot again.
    let second = engine
        .record_generation(&source, Kwh(30_000), ts(2024, 1, 20, 9))
        .await
        .unwrap();
    assert!(second.certificate.is_none());

    let err = engine
        .issue_certificate(&second.record, existing.holder, ts(2024, 1, 20, 9))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "duplicate_period");
    assert!(matches!(
        err,
        EngineError::DuplicatePeriod { existing: id } if id == existing.id
    ));

    // The next month is a fresh slot.
    let third = engine
        .record_generation(&source, Kwh(30_000), ts(2024, 2, 5, 9))
        .await
        .unwrap();
    assert!(third.certificate.is_some());
}

#[tokio::test]
async fn issuance_without_certifying_body_fails_closed() {
    let mut config = EngineConfig::default();
    config.certifying_body = String::new();
    let engine = Engine::new(MemoryStore::new(), config);
    let source = onboard(&engine, "sunfield", PowerType::Solar).await;

    let err = engine
        .record_generation(&source, Kwh(10_000), ts(2024, 1, 15, 9))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "missing_required_generation_data");

    // Nothing was persisted for the failed issuance.
    let certificates = engine
        .store()
        .query_certificates(&Default::default())
        .await
        .unwrap();
    assert!(certificates.is_empty());
}

#[tokio::test]
async fn cancelled_certificate_is_terminal() {
    let engine = engine();
    let source = onboard(&engine, "sunfield", PowerType::Solar).await;
    let certificate = engine
        .record_generation(&source, Kwh(10_000), ts(2024, 1, 31, 12))
        .await
        .unwrap()
        .certificate
        .unwrap();

    let cancelled = engine
        .cancel_certificate(&certificate.id, "registry audit", ts(2024, 2, 1, 0))
        .await
        .unwrap();
    assert_eq!(cancelled.status, CertificateStatus::Cancelled);

    // No balance can leave a cancelled certificate.
    let err = engine
        .transfer(
            &certificate.id,
            certificate.holder,
            EntityId::derive("buyer"),
            Kwh(1_000),
            None,
            ts(2024, 2, 2, 0),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotAllocatable { .. }));

    // And cancelling twice is an invalid transition.
    let err = engine
        .cancel_certificate(&certificate.id, "again", ts(2024, 2, 3, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Accounting(_)));

    // The cancellation left audit evidence on the chain.
    let report = engine.verify_chain(&certificate.id).await.unwrap();
    assert!(report.is_valid);
    assert_eq!(report.events_replayed, 2);
}

#[tokio::test]
async fn expiry_sweep_excludes_certificates_from_allocation() {
    let engine = engine();
    let source = onboard(&engine, "sunfield", PowerType::Solar).await;
    engine
        .record_generation(&source, Kwh(10_000), ts(2024, 1, 31, 12))
        .await
        .unwrap();

    let expired = engine.expire_overdue(ts(2025, 3, 1, 0)).await.unwrap();
    assert_eq!(expired, 1);
    // Sweeping again finds nothing.
    assert_eq!(engine.expire_overdue(ts(2025, 3, 1, 0)).await.unwrap(), 0);

    let record = engine
        .allocate_consumption(EntityId::derive("acme"), Kwh(5_000), ts(2025, 3, 2, 0))
        .await
        .unwrap();
    assert_eq!(record.green, Kwh::ZERO);
    assert_eq!(record.grid, Kwh(5_000));
}

#[tokio::test]
async fn overdue_validity_report_counts_days() {
    let engine = engine();
    let source = onboard(&engine, "sunfield", PowerType::Solar).await;
    let certificate = engine
        .record_generation(&source, Kwh(10_000), ts(2024, 1, 31, 12))
        .await
        .unwrap()
        .certificate
        .unwrap();

    let report = engine
        .check_validity(&certificate.id, ts(2025, 2, 10, 12))
        .await
        .unwrap();
    assert!(!report.is_valid);
    assert_eq!(report.days_overdue, 10);
}

// ─────────────────────────────────────────────────────────────────────────
// Allocation ordering
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn allocation_drains_soonest_expiry_first() {
    let engine = engine();
    let solar = onboard(&engine, "sunfield", PowerType::Solar).await;
    let wind = onboard(&engine, "ridgeline", PowerType::Wind).await;

    // The January certificate expires two months before the March one.
    let expiring = engine
        .record_generation(&solar, Kwh(10_000), ts(2024, 1, 31, 12))
        .await
        .unwrap()
        .certificate
        .unwrap();
    let fresh = engine
        .record_generation(&wind, Kwh(10_000), ts(2024, 3, 15, 12))
        .await
        .unwrap()
        .certificate
        .unwrap();

    let record = engine
        .allocate_consumption(EntityId::derive("acme"), Kwh(12_000), ts(2024, 4, 1, 0))
        .await
        .unwrap();

    assert_eq!(record.entries.len(), 2);
    assert_eq!(record.entries[0].certificate_id, expiring.id);
    assert_eq!(record.entries[0].amount, Kwh(10_000));
    assert_eq!(record.entries[1].certificate_id, fresh.id);
    assert_eq!(record.entries[1].amount, Kwh(2_000));
    assert_eq!(record.grid, Kwh::ZERO);
}

// ─────────────────────────────────────────────────────────────────────────
// Transfer and split
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn transfer_moves_balance_and_leaves_chain_evidence() {
    let engine = engine();
    let source = onboard(&engine, "sunfield", PowerType::Solar).await;
    let certificate = engine
        .record_generation(&source, Kwh(50_000), ts(2024, 1, 31, 12))
        .await
        .unwrap()
        .certificate
        .unwrap();

    let record = engine
        .transfer(
            &certificate.id,
            certificate.holder,
            EntityId::derive("buyer"),
            Kwh(10_000),
            Some("Q1 offtake".into()),
            ts(2024, 2, 1, 0),
        )
        .await
        .unwrap();
    assert_eq!(record.amount, Kwh(10_000));

    let stored = engine
        .store()
        .get_certificate(&certificate.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.remaining, Kwh(40_000));
    assert_eq!(stored.used, Kwh(10_000));

    let report = engine.verify_chain(&certificate.id).await.unwrap();
    assert!(report.is_valid);
    assert_eq!(report.totals.transferred, Kwh(10_000));
}

#[tokio::test]
async fn split_conserves_total_across_derivatives() {
    let engine = engine();
    let source = onboard(&engine, "sunfield", PowerType::Solar).await;
    let parent = engine
        .record_generation(&source, Kwh(30_000), ts(2024, 1, 31, 12))
        .await
        .unwrap()
        .certificate
        .unwrap();

    let outcome = engine
        .split(
            &parent.id,
            &[
                SplitPart::new(EntityId::derive("buyer-a"), Kwh(10_000)),
                SplitPart::new(EntityId::derive("buyer-b"), Kwh(5_000)),
            ],
            ts(2024, 2, 1, 0),
        )
        .await
        .unwrap();

    assert_eq!(outcome.certificates.len(), 2);
    let total: Kwh = outcome.certificates.iter().map(|c| c.amount).sum();
    assert_eq!(total, Kwh(15_000));
    for derived in &outcome.certificates {
        assert_eq!(derived.parent, Some(parent.id));
        assert_eq!(derived.status, CertificateStatus::Active);
        assert_eq!(derived.expires_at, parent.expires_at);
    }

    let stored_parent = engine
        .store()
        .get_certificate(&parent.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored_parent.remaining, Kwh(15_000));

    // Parent chain records the two split debits; each derivative chain opens
    // with its own issuance. All verify clean.
    let parent_report = engine.verify_chain(&parent.id).await.unwrap();
    assert!(parent_report.is_valid);
    assert_eq!(parent_report.totals.split, Kwh(15_000));
    for derived in &outcome.certificates {
        assert!(engine.verify_chain(&derived.id).await.unwrap().is_valid);
    }

    // A derivative can supply allocations like any other certificate.
    let record = engine
        .allocate_consumption(EntityId::derive("buyer-a"), Kwh(40_000), ts(2024, 2, 2, 0))
        .await
        .unwrap();
    assert_eq!(record.green, Kwh(30_000));
    assert_eq!(record.grid, Kwh(10_000));
}

#[tokio::test]
async fn oversized_split_is_rejected_whole() {
    let engine = engine();
    let source = onboard(&engine, "sunfield", PowerType::Solar).await;
    let parent = engine
        .record_generation(&source, Kwh(10_000), ts(2024, 1, 31, 12))
        .await
        .unwrap()
        .certificate
        .unwrap();

    let err = engine
        .split(
            &parent.id,
            &[
                SplitPart::new(EntityId::derive("a"), Kwh(8_000)),
                SplitPart::new(EntityId::derive("b"), Kwh(8_000)),
            ],
            ts(2024, 2, 1, 0),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "insufficient_balance");

    let stored = engine
        .store()
        .get_certificate(&parent.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.remaining, Kwh(10_000));
}

// ─────────────────────────────────────────────────────────────────────────
// Batch verification
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_verify_reports_each_chain_independently() {
    let engine = engine();
    let source = onboard(&engine, "sunfield", PowerType::Solar).await;
    let good = engine
        .record_generation(&source, Kwh(10_000), ts(2024, 1, 31, 12))
        .await
        .unwrap()
        .certificate
        .unwrap();
    // No chain was ever written for this id.
    let phantom = gridcert::CertificateId::from_bytes([0x99; 32]);

    let batch = engine.batch_verify(&[good.id, phantom]).await;
    assert_eq!(batch.total, 2);
    assert_eq!(batch.valid, 1);
    assert_eq!(batch.invalid, 1);
    assert!(batch.failures.is_empty());

    let phantom_report = batch
        .reports
        .iter()
        .find(|r| r.certificate_id == phantom)
        .unwrap();
    assert!(phantom_report
        .anomalies
        .iter()
        .any(|a| a.code() == "certificate_not_found"));
}

// ─────────────────────────────────────────────────────────────────────────
// Reporting
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn renewable_ratio_rolls_up_a_window() {
    let engine = engine();
    let solar = onboard(&engine, "sunfield", PowerType::Solar).await;
    let wind = onboard(&engine, "ridgeline", PowerType::Wind).await;
    engine
        .record_generation(&solar, Kwh(10_000), ts(2024, 1, 31, 12))
        .await
        .unwrap();
    engine
        .record_generation(&wind, Kwh(10_000), ts(2024, 2, 15, 12))
        .await
        .unwrap();

    engine
        .allocate_consumption(EntityId::derive("acme"), Kwh(15_000), ts(2024, 3, 10, 8))
        .await
        .unwrap();
    engine
        .allocate_consumption(EntityId::derive("umbrella"), Kwh(10_000), ts(2024, 3, 12, 8))
        .await
        .unwrap();

    let window = TimeWindow::new(ts(2024, 3, 1, 0), ts(2024, 4, 1, 0));
    let report = engine.renewable_ratio(window, None).await.unwrap();

    assert_eq!(report.records, 2);
    assert_eq!(report.total_consumption, Kwh(25_000));
    assert_eq!(report.green_consumption, Kwh(20_000));
    assert_eq!(report.grid_consumption, Kwh(5_000));
    assert!((report.renewable_ratio - 0.8).abs() < 1e-9);
    // 80% green against a 50% target leaves no compliance gap.
    assert_eq!(report.compliance_gap, 0.0);
    assert_eq!(report.by_power_type.len(), 2);
    assert!(!report.partial);

    // Scoped to one consumer, only their records count.
    let scoped = engine
        .renewable_ratio(window, Some(EntityId::derive("umbrella")))
        .await
        .unwrap();
    assert_eq!(scoped.records, 1);
    assert_eq!(scoped.total_consumption, Kwh(10_000));

    // An empty window reports zeros, not a division error.
    let empty = engine
        .renewable_ratio(TimeWindow::new(ts(2030, 1, 1, 0), ts(2030, 2, 1, 0)), None)
        .await
        .unwrap();
    assert_eq!(empty.renewable_ratio, 0.0);
    assert_eq!(empty.compliance_gap, 0.5);
}

#[tokio::test]
async fn production_report_covers_generation_window() {
    let engine = engine();
    let solar = onboard(&engine, "sunfield", PowerType::Solar).await;
    engine
        .record_generation(&solar, Kwh(50_000), ts(2024, 1, 10, 12))
        .await
        .unwrap();
    engine
        .record_generation(&solar, Kwh(500), ts(2024, 1, 20, 12))
        .await
        .unwrap();
    // Outside the window.
    engine
        .record_generation(&solar, Kwh(9_000), ts(2024, 5, 1, 12))
        .await
        .unwrap();

    let window = TimeWindow::new(ts(2024, 1, 1, 0), ts(2024, 2, 1, 0));
    let report = engine.production_report(window).await.unwrap();

    assert_eq!(report.records, 2);
    assert_eq!(report.total_generated, Kwh(50_500));
    assert_eq!(report.certificate_eligible, Kwh(50_000));
    assert_eq!(report.sources_reporting, 1);
    assert_eq!(report.active_sources, Some(1));
    assert!(!report.partial);
}

#[tokio::test]
async fn consumption_report_breaks_down_per_consumer() {
    let engine = engine();
    let solar = onboard(&engine, "sunfield", PowerType::Solar).await;
    engine
        .record_generation(&solar, Kwh(10_000), ts(2024, 1, 31, 12))
        .await
        .unwrap();

    engine
        .allocate_consumption(EntityId::derive("acme"), Kwh(4_000), ts(2024, 2, 10, 8))
        .await
        .unwrap();
    engine
        .allocate_consumption(EntityId::derive("acme"), Kwh(3_000), ts(2024, 2, 11, 8))
        .await
        .unwrap();
    engine
        .allocate_consumption(EntityId::derive("umbrella"), Kwh(5_000), ts(2024, 2, 12, 8))
        .await
        .unwrap();

    let window = TimeWindow::new(ts(2024, 2, 1, 0), ts(2024, 3, 1, 0));
    let report = engine.consumption_report(window).await.unwrap();

    assert_eq!(report.records, 3);
    assert_eq!(report.total_consumption, Kwh(12_000));
    assert_eq!(report.green_consumption, Kwh(10_000));
    assert_eq!(report.by_consumer.len(), 2);

    let acme = report
        .by_consumer
        .iter()
        .find(|b| b.consumer == EntityId::derive("acme"))
        .unwrap();
    assert_eq!(acme.requested, Kwh(7_000));
    assert_eq!(acme.green, Kwh(7_000));
}

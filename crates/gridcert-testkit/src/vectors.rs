//! Verification vectors: fixed chain-event sequences with their expected
//! verification outcome.
//!
//! The vectors pin the verifier's judgement so that refactors (and other
//! implementations replaying the same logs) cannot silently change what
//! counts as a conservation violation.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use gridcert_core::{
    verify_chain, CertificateId, ChainEvent, ChainEventKind, ChainIntegrity, EntityId,
    GenerationPeriod, Kwh, RecordId, SourceId,
};

/// A single verification vector.
#[derive(Debug, Clone)]
pub struct ChainVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// The certificate whose chain this is.
    pub certificate_id: CertificateId,
    /// The event sequence as delivered by the log.
    pub events: Vec<ChainEvent>,
    /// Whether the verifier must accept the chain.
    pub expected_valid: bool,
    /// Anomaly codes the verifier must report, in detection order.
    pub expected_codes: Vec<&'static str>,
    /// Expected integrity classification.
    pub expected_integrity: ChainIntegrity,
}

fn cert_id(byte: u8) -> CertificateId {
    CertificateId::from_bytes([byte; 32])
}

fn ts(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 31, 12, minute, 0)
        .single()
        .expect("vector timestamps are valid")
}

fn issued(id: CertificateId, amount: u64, minute: u32) -> ChainEvent {
    ChainEvent::new(
        id,
        ts(minute),
        ChainEventKind::Issued {
            amount: Kwh(amount),
            facility: SourceId::derive("grid-west-04", "Sunfield Park"),
            period: GenerationPeriod::month_of(ts(0)),
        },
    )
}

fn transferred(id: CertificateId, amount: u64, minute: u32) -> ChainEvent {
    ChainEvent::new(
        id,
        ts(minute),
        ChainEventKind::Transferred {
            amount: Kwh(amount),
            from: EntityId::derive("seller"),
            to: EntityId::derive("buyer"),
            record_id: RecordId::from_bytes([minute as u8; 32]),
        },
    )
}

fn allocated(id: CertificateId, amount: u64, minute: u32) -> ChainEvent {
    ChainEvent::new(
        id,
        ts(minute),
        ChainEventKind::Allocated {
            amount: Kwh(amount),
            consumer: EntityId::derive("consumer"),
            record_id: RecordId::from_bytes([minute as u8 + 100; 32]),
        },
    )
}

/// Get all verification vectors.
pub fn all_vectors() -> Vec<ChainVector> {
    vec![
        ChainVector {
            name: "clean issuance, transfer, allocation",
            certificate_id: cert_id(1),
            events: vec![
                issued(cert_id(1), 50_000, 0),
                transferred(cert_id(1), 10_000, 1),
                allocated(cert_id(1), 5_000, 2),
            ],
            expected_valid: true,
            expected_codes: vec![],
            expected_integrity: ChainIntegrity::Intact,
        },
        ChainVector {
            name: "transfer exceeds generation",
            certificate_id: cert_id(2),
            events: vec![issued(cert_id(2), 50_000, 0), transferred(cert_id(2), 60_000, 1)],
            expected_valid: false,
            expected_codes: vec!["transfer_amount_exceeds_generation"],
            expected_integrity: ChainIntegrity::Compromised,
        },
        ChainVector {
            name: "debits sum past generation only in combination",
            certificate_id: cert_id(3),
            events: vec![
                issued(cert_id(3), 50_000, 0),
                transferred(cert_id(3), 30_000, 1),
                allocated(cert_id(3), 30_000, 2),
            ],
            expected_valid: false,
            expected_codes: vec!["transfer_amount_exceeds_generation"],
            expected_integrity: ChainIntegrity::Compromised,
        },
        ChainVector {
            name: "no issuance event",
            certificate_id: cert_id(4),
            events: vec![transferred(cert_id(4), 1_000, 1)],
            expected_valid: false,
            expected_codes: vec![
                "certificate_not_found",
                "transfer_amount_exceeds_generation",
            ],
            expected_integrity: ChainIntegrity::Compromised,
        },
        ChainVector {
            name: "timestamp regression without conservation break",
            certificate_id: cert_id(5),
            events: vec![issued(cert_id(5), 50_000, 5), transferred(cert_id(5), 1_000, 2)],
            expected_valid: false,
            expected_codes: vec!["timestamp_inconsistency"],
            expected_integrity: ChainIntegrity::Intact,
        },
        ChainVector {
            name: "duplicate delivery is dropped, not double-counted",
            certificate_id: cert_id(6),
            events: vec![
                issued(cert_id(6), 50_000, 0),
                transferred(cert_id(6), 30_000, 1),
                transferred(cert_id(6), 30_000, 1),
            ],
            expected_valid: true,
            expected_codes: vec![],
            expected_integrity: ChainIntegrity::Intact,
        },
        ChainVector {
            name: "two distinct issuances on one chain",
            certificate_id: cert_id(7),
            events: vec![issued(cert_id(7), 50_000, 0), issued(cert_id(7), 40_000, 1)],
            expected_valid: false,
            expected_codes: vec!["duplicate_issuance"],
            expected_integrity: ChainIntegrity::Compromised,
        },
        ChainVector {
            name: "empty chain",
            certificate_id: cert_id(8),
            events: vec![],
            expected_valid: false,
            expected_codes: vec!["certificate_not_found"],
            expected_integrity: ChainIntegrity::Compromised,
        },
        ChainVector {
            name: "exact exhaustion is not a violation",
            certificate_id: cert_id(9),
            events: vec![
                issued(cert_id(9), 50_000, 0),
                allocated(cert_id(9), 20_000, 1),
                allocated(cert_id(9), 30_000, 2),
            ],
            expected_valid: true,
            expected_codes: vec![],
            expected_integrity: ChainIntegrity::Intact,
        },
    ]
}

/// Run the verifier over every vector; the first mismatch is an `Err`
/// naming the vector and what diverged.
pub fn verify_all_vectors() -> Result<(), String> {
    for vector in all_vectors() {
        let report = verify_chain(vector.certificate_id, &vector.events);

        if report.is_valid != vector.expected_valid {
            return Err(format!(
                "{}: expected valid={}, got {}",
                vector.name, vector.expected_valid, report.is_valid
            ));
        }
        let codes: Vec<&'static str> = report.anomalies.iter().map(|a| a.code()).collect();
        if codes != vector.expected_codes {
            return Err(format!(
                "{}: expected codes {:?}, got {:?}",
                vector.name, vector.expected_codes, codes
            ));
        }
        if report.integrity != vector.expected_integrity {
            return Err(format!(
                "{}: expected integrity {:?}, got {:?}",
                vector.name, vector.expected_integrity, report.integrity
            ));
        }
    }
    Ok(())
}

/// JSON description of every vector and its expected outcome, for sharing
/// with implementations in other languages.
pub fn vectors_json() -> String {
    #[derive(Serialize)]
    struct VectorOutcome {
        name: &'static str,
        certificate_id: String,
        events: Vec<ChainEvent>,
        expected_valid: bool,
        expected_codes: Vec<&'static str>,
        expected_integrity: &'static str,
    }

    let outcomes: Vec<VectorOutcome> = all_vectors()
        .into_iter()
        .map(|v| VectorOutcome {
            name: v.name,
            certificate_id: v.certificate_id.to_hex(),
            events: v.events,
            expected_valid: v.expected_valid,
            expected_codes: v.expected_codes,
            expected_integrity: v.expected_integrity.as_str(),
        })
        .collect();

    serde_json::to_string_pretty(&outcomes).expect("vectors always serialize")
}

//! Proptest generators for property-based testing.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use gridcert_core::{
    CertificateId, ChainEvent, ChainEventKind, EntityId, GenerationPeriod, Kwh, PowerType,
    RecordId, SourceId,
};

/// Generate an energy amount up to `max` kWh.
pub fn kwh(max: u64) -> impl Strategy<Value = Kwh> {
    (0..=max).prop_map(Kwh)
}

/// Generate a strictly positive energy amount up to `max` kWh.
pub fn positive_kwh(max: u64) -> impl Strategy<Value = Kwh> {
    (1..=max).prop_map(Kwh)
}

/// Generate a power type.
pub fn power_type() -> impl Strategy<Value = PowerType> {
    prop_oneof![
        Just(PowerType::Solar),
        Just(PowerType::Wind),
        Just(PowerType::Hydro),
        Just(PowerType::Biomass),
        Just(PowerType::Geothermal),
    ]
}

/// Generate a random entity id.
pub fn entity_id() -> impl Strategy<Value = EntityId> {
    any::<[u8; 32]>().prop_map(EntityId::from_bytes)
}

/// Generate a random certificate id.
pub fn certificate_id() -> impl Strategy<Value = CertificateId> {
    any::<[u8; 32]>().prop_map(CertificateId::from_bytes)
}

/// Generate a random record id.
pub fn record_id() -> impl Strategy<Value = RecordId> {
    any::<[u8; 32]>().prop_map(RecordId::from_bytes)
}

/// Generate an issuance salt.
pub fn salt() -> impl Strategy<Value = [u8; 16]> {
    any::<[u8; 16]>()
}

/// Generate a timestamp inside 2024, minute-aligned.
pub fn timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (0u32..525_600).prop_map(|minute| {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .expect("2024-01-01 is valid")
            + chrono::Duration::minutes(minute as i64)
    })
}

/// Generate a chain event for the given certificate.
pub fn chain_event(certificate: CertificateId) -> impl Strategy<Value = ChainEvent> {
    let kind = prop_oneof![
        (positive_kwh(100_000), any::<[u8; 32]>()).prop_map(|(amount, facility)| {
            ChainEventKind::Issued {
                amount,
                facility: SourceId::from_bytes(facility),
                period: GenerationPeriod::month_of(
                    Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap(),
                ),
            }
        }),
        (positive_kwh(100_000), entity_id(), entity_id(), record_id()).prop_map(
            |(amount, from, to, record_id)| ChainEventKind::Transferred {
                amount,
                from,
                to,
                record_id,
            }
        ),
        (positive_kwh(100_000), entity_id(), record_id()).prop_map(
            |(amount, consumer, record_id)| ChainEventKind::Allocated {
                amount,
                consumer,
                record_id,
            }
        ),
    ];
    (timestamp(), kind).prop_map(move |(recorded_at, kind)| {
        ChainEvent::new(certificate, recorded_at, kind)
    })
}

/// Generate a chain of up to `max_len` events for one certificate.
pub fn chain(max_len: usize) -> impl Strategy<Value = (CertificateId, Vec<ChainEvent>)> {
    certificate_id().prop_flat_map(move |id| {
        prop::collection::vec(chain_event(id), 0..=max_len).prop_map(move |events| (id, events))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcert_core::{verify_chain, ChainIntegrity};

    proptest! {
        #[test]
        fn test_verification_is_pure((id, events) in chain(12)) {
            let first = verify_chain(id, &events);
            let second = verify_chain(id, &events);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn test_duplicated_deliveries_change_nothing((id, events) in chain(8)) {
            let mut doubled = events.clone();
            doubled.extend(events.iter().cloned());

            let clean = verify_chain(id, &events);
            let noisy = verify_chain(id, &doubled);

            prop_assert_eq!(clean.totals, noisy.totals);
            prop_assert_eq!(clean.anomalies, noisy.anomalies);
            prop_assert_eq!(noisy.duplicates_dropped, events.len());
        }

        #[test]
        fn test_debits_over_issuance_always_compromise(
            issued in positive_kwh(10_000),
            excess in positive_kwh(10_000),
            consumer in entity_id(),
            record_id in record_id(),
        ) {
            let id = CertificateId::from_bytes([9; 32]);
            let at = Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap();
            let events = vec![
                ChainEvent::new(id, at, ChainEventKind::Issued {
                    amount: issued,
                    facility: SourceId::from_bytes([1; 32]),
                    period: GenerationPeriod::month_of(at),
                }),
                ChainEvent::new(id, at, ChainEventKind::Allocated {
                    amount: issued.saturating_add(excess),
                    consumer,
                    record_id,
                }),
            ];

            let report = verify_chain(id, &events);
            prop_assert!(!report.is_valid);
            prop_assert_eq!(report.integrity, ChainIntegrity::Compromised);
        }

        #[test]
        fn test_debit_credit_sequences_conserve(
            amounts in prop::collection::vec(1u64..=1_000, 1..32),
        ) {
            use gridcert_core::{Certificate, CertificateStatus, EntityId, GenerationRecord, GreenPowerSource};
            use chrono::Months;

            let source = GreenPowerSource::new(
                "prop", PowerType::Solar, 1_000, 0.2, "cp",
                Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            );
            let at = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
            let record = GenerationRecord::new(&source, Kwh(100_000), at, 0.475, Kwh(1_000), [1; 16]);
            let mut certificate = Certificate::issue(
                &record,
                EntityId::derive("holder"),
                at,
                at.checked_add_months(Months::new(12)).unwrap(),
                "prop", "cp", "registry", [2; 16],
            );
            certificate.transition(CertificateStatus::Active).unwrap();

            for &amount in &amounts {
                // Debits past the balance must be rejected without effect.
                let before = (certificate.used, certificate.remaining);
                if certificate.debit(Kwh(amount)).is_err() {
                    prop_assert_eq!((certificate.used, certificate.remaining), before);
                }
                prop_assert_eq!(
                    certificate.used.checked_add(certificate.remaining),
                    Some(certificate.amount)
                );
            }
        }
    }
}

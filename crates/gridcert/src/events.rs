//! Observability events.
//!
//! The engine publishes structured events on a broadcast bus owned by the
//! service layer; callers that want notifications subscribe through it.
//! There is no global emitter, and publishing never blocks an operation.

use tokio::sync::broadcast;

use gridcert_core::{CertificateId, EntityId, Kwh, SourceId};

/// Events the engine surfaces to operators.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Green supply only partially covered a consumption request.
    SupplyShortfall {
        consumer: EntityId,
        requested: Kwh,
        green: Kwh,
    },

    /// A certificate was issued and activated.
    CertificateIssued {
        certificate: CertificateId,
        facility: SourceId,
        amount: Kwh,
    },

    /// A certificate was administratively cancelled.
    CertificateCancelled {
        certificate: CertificateId,
        reason: String,
    },

    /// Chain verification surfaced anomalies. Remediation is the operator's
    /// decision; the engine never auto-corrects.
    ChainAnomalies {
        certificate: CertificateId,
        codes: Vec<&'static str>,
    },
}

/// Broadcast bus for engine events.
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a bus holding up to `capacity` undelivered events per
    /// subscriber. Slow subscribers lag; they never block the engine.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. A bus with no subscribers drops it silently.
    pub(crate) fn publish(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.publish(EngineEvent::CertificateCancelled {
            certificate: CertificateId::from_bytes([1; 32]),
            reason: "test".into(),
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(EngineEvent::SupplyShortfall {
            consumer: EntityId::derive("consumer"),
            requested: Kwh(100),
            green: Kwh(40),
        });

        match rx.recv().await.unwrap() {
            EngineEvent::SupplyShortfall { requested, green, .. } => {
                assert_eq!(requested, Kwh(100));
                assert_eq!(green, Kwh(40));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}

//! Event types for the Vigil event system
//!
//! Provides shared event definitions and the EventBus used by the detection
//! core to publish state changes, escalations and dispatch outcomes.

mod risk_types;

pub use risk_types::{CrisisState, RiskLevel};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Vigil event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
/// Utterance text is never carried on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VigilEvent {
    /// One utterance was assessed
    AssessmentCompleted {
        assessment_id: Uuid,
        user_id: String,
        session_id: String,
        sequence_no: u64,
        risk_level: RiskLevel,
        /// Fused score (0.0-1.0)
        score: f64,
        escalation_required: bool,
        timestamp: DateTime<Utc>,
    },

    /// A user's crisis session changed state
    ///
    /// Triggers:
    /// - SSE: operator dashboards
    /// - Audit: state history
    CrisisStateChanged {
        user_id: String,
        old_state: CrisisState,
        new_state: CrisisState,
        /// What caused the transition ("utterance", "acknowledge", "timeout")
        cause: String,
        timestamp: DateTime<Utc>,
    },

    /// An assessment required escalation and a crisis event was queued
    EscalationRaised {
        event_id: Uuid,
        assessment_id: Uuid,
        user_id: String,
        risk_level: RiskLevel,
        timestamp: DateTime<Utc>,
    },

    /// Crisis event delivered to the notification collaborator
    AlertDispatched {
        event_id: Uuid,
        user_id: String,
        sink: String,
        attempts: u32,
        /// Milliseconds from utterance ingestion to successful delivery
        latency_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Crisis event delivery attempt failed
    AlertDispatchFailed {
        event_id: Uuid,
        user_id: String,
        sink: String,
        attempt: u32,
        error: String,
        /// False once the retry budget is exhausted
        will_retry: bool,
        timestamp: DateTime<Utc>,
    },

    /// Upstream event rejected at the ingest boundary (duplicate, gap, malformed)
    EventRejected {
        user_id: String,
        session_id: String,
        sequence_no: u64,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A user's baseline was invalidated on request
    BaselineReset {
        user_id: String,
        generation: u64,
        timestamp: DateTime<Utc>,
    },

    /// New pattern taxonomy snapshot activated
    TaxonomyReloaded {
        version: String,
        entry_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Pattern taxonomy reload failed; previous snapshot remains active
    TaxonomyReloadFailed {
        active_version: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl VigilEvent {
    /// Event type name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            VigilEvent::AssessmentCompleted { .. } => "AssessmentCompleted",
            VigilEvent::CrisisStateChanged { .. } => "CrisisStateChanged",
            VigilEvent::EscalationRaised { .. } => "EscalationRaised",
            VigilEvent::AlertDispatched { .. } => "AlertDispatched",
            VigilEvent::AlertDispatchFailed { .. } => "AlertDispatchFailed",
            VigilEvent::EventRejected { .. } => "EventRejected",
            VigilEvent::BaselineReset { .. } => "BaselineReset",
            VigilEvent::TaxonomyReloaded { .. } => "TaxonomyReloaded",
            VigilEvent::TaxonomyReloadFailed { .. } => "TaxonomyReloadFailed",
        }
    }
}

/// Central event distribution bus
///
/// Thin wrapper over a tokio broadcast channel. Cloning the bus clones the
/// sender; all clones publish to the same subscribers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<VigilEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before slow subscribers lag
    ///
    /// # Examples
    ///
    /// ```
    /// use vigil_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(1000);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<VigilEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: VigilEvent,
    ) -> Result<usize, broadcast::error::SendError<VigilEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: VigilEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::None < RiskLevel::Low);
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn test_emit_without_subscribers_is_err() {
        let bus = EventBus::new(10);
        let result = bus.emit(VigilEvent::BaselineReset {
            user_id: "u1".to_string(),
            generation: 1,
            timestamp: Utc::now(),
        });
        assert!(result.is_err());
        // Lossy variant must not panic either
        bus.emit_lossy(VigilEvent::BaselineReset {
            user_id: "u1".to_string(),
            generation: 2,
            timestamp: Utc::now(),
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit_lossy(VigilEvent::CrisisStateChanged {
            user_id: "u1".to_string(),
            old_state: CrisisState::Normal,
            new_state: CrisisState::Escalated,
            cause: "utterance".to_string(),
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.expect("event should arrive");
        assert_eq!(event.event_type(), "CrisisStateChanged");
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = VigilEvent::TaxonomyReloaded {
            version: "2024.1".to_string(),
            entry_count: 12,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "TaxonomyReloaded");
        assert_eq!(json["entry_count"], 12);
    }

    #[test]
    fn test_crisis_state_serde_snake_case() {
        let json = serde_json::to_string(&CrisisState::Escalating).unwrap();
        assert_eq!(json, "\"escalating\"");
    }
}

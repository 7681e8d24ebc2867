//! Alert Dispatcher
//!
//! Hands crisis events to the notification collaborator without ever blocking
//! or failing the assessment path.
//!
//! # Architecture
//! - `dispatch()` enqueues onto a bounded channel (`try_send`)
//! - A worker task drains the channel and spawns one delivery task per event
//! - Each delivery retries with exponential backoff ([`retry`])
//! - Events that exhaust their retries land in a bounded dead-letter list,
//!   as do events the queue rejects and events still queued at shutdown
//!
//! Delivery outcomes never feed back into crisis state.

pub mod retry;
pub mod sink;

pub use retry::{deliver_with_retry, BackoffPolicy};
pub use sink::{LogAlertSink, WebhookAlertSink};

use crate::types::{CrisisProtocol, ReasonEntry, RiskAssessment};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vigil_common::{time, CrisisState, EventBus, RiskLevel, VigilEvent};

/// Alert errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AlertError {
    /// Every delivery attempt failed
    #[error("Escalation dispatch failure for event {event_id} after {attempts} attempts: {last_error}")]
    EscalationDispatchFailure {
        event_id: Uuid,
        attempts: u32,
        last_error: String,
    },

    /// One delivery attempt failed
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Alert queue full ({0} pending)")]
    QueueFull(usize),

    #[error("Alert dispatcher stopped")]
    Closed,
}

/// Structured crisis notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrisisEvent {
    pub event_id: Uuid,
    pub assessment_id: Uuid,
    pub user_id: String,
    pub session_id: String,
    pub sequence_no: u64,
    pub risk_level: RiskLevel,
    pub crisis_state: CrisisState,
    /// Matched pattern ids, highest severity first
    pub pattern_ids: Vec<String>,
    pub reason_trace: Vec<ReasonEntry>,
    /// Protocols attached to matched critical patterns
    pub crisis_protocols: Vec<CrisisProtocol>,
    /// When the producing utterance was accepted
    pub ingested_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

impl CrisisEvent {
    pub fn from_assessment(assessment: &RiskAssessment, ingested_at: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            assessment_id: assessment.assessment_id,
            user_id: assessment.user_id.clone(),
            session_id: assessment.session_id.clone(),
            sequence_no: assessment.sequence_no,
            risk_level: assessment.risk_level,
            crisis_state: assessment.crisis_state,
            pattern_ids: assessment
                .pattern_matches
                .iter()
                .map(|m| m.pattern_id.clone())
                .collect(),
            reason_trace: assessment.reason_trace.clone(),
            crisis_protocols: assessment
                .pattern_matches
                .iter()
                .filter_map(|m| m.crisis_protocol.clone())
                .collect(),
            ingested_at,
            timestamp: time::now(),
        }
    }
}

/// Notification collaborator
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Short name used in logs and events
    fn name(&self) -> &str;

    /// One delivery attempt
    async fn deliver(&self, event: &CrisisEvent) -> Result<(), AlertError>;
}

/// Crisis event that exhausted its retries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub event: CrisisEvent,
    pub attempts: u32,
    pub last_error: String,
    pub failed_at: DateTime<Utc>,
}

/// Bounded, most-recent-last dead-letter list
#[derive(Debug, Clone)]
struct DeadLetters {
    entries: Arc<Mutex<VecDeque<DeadLetter>>>,
    limit: usize,
}

impl DeadLetters {
    fn new(limit: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::new())),
            limit: limit.max(1),
        }
    }

    fn push(&self, letter: DeadLetter) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if entries.len() == self.limit {
            entries.pop_front();
        }
        entries.push_back(letter);
    }

    fn snapshot(&self) -> Vec<DeadLetter> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

/// Dispatcher settings
#[derive(Debug, Clone, Copy)]
pub struct DispatcherSettings {
    pub policy: BackoffPolicy,
    pub queue_capacity: usize,
    pub latency_budget_ms: u64,
    pub dead_letter_limit: usize,
}

impl DispatcherSettings {
    pub fn from_config(config: &crate::config::AlertConfig) -> Self {
        Self {
            policy: BackoffPolicy::from_config(config),
            queue_capacity: config.queue_capacity.max(1),
            latency_budget_ms: config.latency_budget_ms,
            dead_letter_limit: config.dead_letter_limit,
        }
    }
}

/// Non-blocking crisis event dispatcher
#[derive(Clone)]
pub struct AlertDispatcher {
    tx: mpsc::Sender<CrisisEvent>,
    dead_letters: DeadLetters,
    event_bus: EventBus,
    sink_name: String,
    queue_capacity: usize,
}

impl AlertDispatcher {
    /// Start the dispatch worker
    ///
    /// Once `cancel` fires the worker closes the queue and dead-letters every
    /// event still in it; deliveries already in flight run to completion or
    /// exhaustion.
    pub fn spawn(
        sink: Arc<dyn AlertSink>,
        settings: DispatcherSettings,
        event_bus: EventBus,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<CrisisEvent>(settings.queue_capacity);
        let dead_letters = DeadLetters::new(settings.dead_letter_limit);
        let sink_name = sink.name().to_string();

        let worker_dead_letters = dead_letters.clone();
        let worker_bus = event_bus.clone();
        let worker_sink_name = sink_name.clone();
        let handle = tokio::spawn(async move {
            let event_bus = worker_bus;
            info!(sink = sink.name(), "Alert dispatcher started");
            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        rx.close();
                        let mut undelivered = 0usize;
                        while let Ok(event) = rx.try_recv() {
                            record_undelivered(
                                &worker_dead_letters,
                                &event_bus,
                                &worker_sink_name,
                                event,
                                &AlertError::Closed,
                            );
                            undelivered += 1;
                        }
                        info!(undelivered, "Alert dispatcher stopping");
                        break;
                    }
                    next = rx.recv() => {
                        let Some(event) = next else { break };
                        debug!(event_id = %event.event_id, "Crisis event dequeued");

                        let sink = Arc::clone(&sink);
                        let event_bus = event_bus.clone();
                        let dead_letters = worker_dead_letters.clone();
                        tokio::spawn(async move {
                            let outcome = deliver_with_retry(
                                sink.as_ref(),
                                &event,
                                &settings.policy,
                                &event_bus,
                                settings.latency_budget_ms,
                            )
                            .await;

                            if let Err(AlertError::EscalationDispatchFailure { attempts, last_error, .. }) = outcome {
                                dead_letters.push(DeadLetter {
                                    event,
                                    attempts,
                                    last_error,
                                    failed_at: time::now(),
                                });
                            }
                        });
                    }
                }
            }
        });

        (
            Self {
                tx,
                dead_letters,
                event_bus,
                sink_name,
                queue_capacity: settings.queue_capacity,
            },
            handle,
        )
    }

    /// Enqueue a crisis event without waiting
    ///
    /// # Errors
    /// `QueueFull` or `Closed` when the event could not be queued; the event
    /// is then recorded as a dead letter with zero attempts.
    pub fn dispatch(&self, event: CrisisEvent) -> Result<(), AlertError> {
        let event_id = event.event_id;
        let (event, err) = match self.tx.try_send(event) {
            Ok(()) => {
                debug!(%event_id, "Crisis event queued");
                return Ok(());
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                error!(
                    event_id = %event.event_id,
                    user_id = %event.user_id,
                    capacity = self.queue_capacity,
                    "Alert queue full, crisis event dead-lettered"
                );
                (event, AlertError::QueueFull(self.queue_capacity))
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                error!(
                    event_id = %event.event_id,
                    user_id = %event.user_id,
                    "Alert dispatcher stopped, crisis event dead-lettered"
                );
                (event, AlertError::Closed)
            }
        };

        record_undelivered(&self.dead_letters, &self.event_bus, &self.sink_name, event, &err);
        Err(err)
    }

    /// Events that exhausted their retries, oldest first
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.snapshot()
    }

    pub fn sink_name(&self) -> &str {
        &self.sink_name
    }
}

/// Dead-letter an event that never reached a delivery attempt
fn record_undelivered(
    dead_letters: &DeadLetters,
    event_bus: &EventBus,
    sink_name: &str,
    event: CrisisEvent,
    err: &AlertError,
) {
    warn!(
        event_id = %event.event_id,
        user_id = %event.user_id,
        error = %err,
        "Crisis event recorded as dead letter without delivery"
    );
    event_bus.emit_lossy(VigilEvent::AlertDispatchFailed {
        event_id: event.event_id,
        user_id: event.user_id.clone(),
        sink: sink_name.to_string(),
        attempt: 0,
        error: err.to_string(),
        will_retry: false,
        timestamp: time::now(),
    });
    dead_letters.push(DeadLetter {
        event,
        attempts: 0,
        last_error: err.to_string(),
        failed_at: time::now(),
    });
}

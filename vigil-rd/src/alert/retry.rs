//! Delivery retry with exponential backoff
//!
//! **Backoff Strategy:**
//! - Initial delay: 500ms
//! - Max delay: 10000ms
//! - Multiplier: 2.0 (exponential)
//! - Max attempts: 8

use super::{AlertError, AlertSink, CrisisEvent};
use crate::config::AlertConfig;
use std::time::{Duration, Instant};
use vigil_common::{time, EventBus, VigilEvent};

/// Retry schedule for crisis event delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&AlertConfig::default())
    }
}

impl BackoffPolicy {
    pub fn from_config(config: &AlertConfig) -> Self {
        Self {
            initial: time::millis_to_duration(config.initial_backoff_ms),
            max: time::millis_to_duration(config.max_backoff_ms),
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Delay after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(31);
        self.initial
            .saturating_mul(1u32 << doublings)
            .min(self.max)
    }
}

/// Deliver `event` through `sink`, retrying with backoff
///
/// **Algorithm:**
/// 1. Attempt delivery
/// 2. If successful, emit `AlertDispatched` and return the attempt count
/// 3. On failure emit `AlertDispatchFailed`, then:
///    a. If attempts remain: log WARN, back off, retry
///    b. Otherwise: log ERROR, return `EscalationDispatchFailure`
///
/// # Arguments
/// * `sink` - Notification collaborator
/// * `event` - Crisis event to deliver
/// * `policy` - Backoff schedule
/// * `event_bus` - Receives per-attempt outcome events
/// * `latency_budget_ms` - Ingestion-to-delivery target; exceeding it is logged
pub async fn deliver_with_retry(
    sink: &dyn AlertSink,
    event: &CrisisEvent,
    policy: &BackoffPolicy,
    event_bus: &EventBus,
    latency_budget_ms: u64,
) -> Result<u32, AlertError> {
    let start_time = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(
                event_id = %event.event_id,
                sink = sink.name(),
                attempt,
                "Retrying crisis event delivery"
            );
        }

        match sink.deliver(event).await {
            Ok(()) => {
                let latency_ms = time::elapsed_ms(event.ingested_at, time::now());
                if latency_ms > latency_budget_ms {
                    tracing::warn!(
                        event_id = %event.event_id,
                        user_id = %event.user_id,
                        attempt,
                        latency_ms,
                        latency_budget_ms,
                        "Crisis event delivered outside latency budget"
                    );
                } else {
                    tracing::info!(
                        event_id = %event.event_id,
                        user_id = %event.user_id,
                        sink = sink.name(),
                        attempt,
                        latency_ms,
                        "Crisis event delivered"
                    );
                }

                event_bus.emit_lossy(VigilEvent::AlertDispatched {
                    event_id: event.event_id,
                    user_id: event.user_id.clone(),
                    sink: sink.name().to_string(),
                    attempts: attempt,
                    latency_ms,
                    timestamp: time::now(),
                });
                return Ok(attempt);
            }
            Err(err) => {
                let will_retry = attempt < policy.max_attempts;

                event_bus.emit_lossy(VigilEvent::AlertDispatchFailed {
                    event_id: event.event_id,
                    user_id: event.user_id.clone(),
                    sink: sink.name().to_string(),
                    attempt,
                    error: err.to_string(),
                    will_retry,
                    timestamp: time::now(),
                });

                if !will_retry {
                    tracing::error!(
                        event_id = %event.event_id,
                        user_id = %event.user_id,
                        sink = sink.name(),
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        error = %err,
                        "Crisis event delivery failed: retry budget exhausted"
                    );
                    return Err(AlertError::EscalationDispatchFailure {
                        event_id: event.event_id,
                        attempts: attempt,
                        last_error: err.to_string(),
                    });
                }

                let backoff = policy.delay_after(attempt);
                tracing::warn!(
                    event_id = %event.event_id,
                    sink = sink.name(),
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Crisis event delivery failed, retrying after backoff"
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u64> = (1..=8)
            .map(|a| policy.delay_after(a).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![500, 1000, 2000, 4000, 8000, 10000, 10000, 10000]);
    }

    #[test]
    fn test_backoff_does_not_overflow() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_after(u32::MAX), Duration::from_millis(10_000));
    }
}

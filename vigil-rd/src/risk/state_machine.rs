//! Per-user crisis state machine
//!
//! Normal → Elevated → Escalating → Escalated → Cooldown → Normal
//!
//! The transition function is total: every (state, input) pair has a defined
//! successor, and Escalated is only left by acknowledgement or the safety
//! timeout, never by a quiet utterance.
//!
//! | State \ class | quiet | elevated | high | critical |
//! |---|---|---|---|---|
//! | Normal | Normal | Elevated | Elevated | Escalated |
//! | Elevated | Normal | Escalating within window, else Elevated | Escalating | Escalated |
//! | Escalating | Elevated | Escalated | Escalated | Escalated |
//! | Escalated | Escalated | Escalated | Escalated | Escalated |
//! | Cooldown | Normal after quiet period, else Cooldown | Escalating | Escalating | Escalated |

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use vigil_common::time::secs_to_chrono;
use vigil_common::CrisisState;

use crate::config::RiskConfig;

/// Per-utterance risk class fed to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalClass {
    Quiet,
    Elevated,
    High,
    Critical,
}

/// State machine input
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CrisisInput {
    Utterance {
        class: SignalClass,
        at: DateTime<Utc>,
    },
    /// Operator acknowledged the escalation
    Acknowledge { at: DateTime<Utc> },
    /// Passage of time (before each utterance and from the sweeper)
    Tick { now: DateTime<Utc> },
}

/// Why a transition happened (or was evaluated)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCause {
    QuietSignal,
    ElevatedSignal,
    SustainedSignal,
    HighSignal,
    CriticalSignal,
    Acknowledged,
    SafetyTimeout,
    QuietPeriodElapsed,
    SustainedWindowExpired,
    Unchanged,
}

impl TransitionCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionCause::QuietSignal => "quiet_signal",
            TransitionCause::ElevatedSignal => "elevated_signal",
            TransitionCause::SustainedSignal => "sustained_signal",
            TransitionCause::HighSignal => "high_signal",
            TransitionCause::CriticalSignal => "critical_signal",
            TransitionCause::Acknowledged => "acknowledged",
            TransitionCause::SafetyTimeout => "safety_timeout",
            TransitionCause::QuietPeriodElapsed => "quiet_period_elapsed",
            TransitionCause::SustainedWindowExpired => "sustained_window_expired",
            TransitionCause::Unchanged => "unchanged",
        }
    }
}

/// Result of applying one input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateTransition {
    pub old_state: CrisisState,
    pub new_state: CrisisState,
    pub cause: TransitionCause,
    pub at: DateTime<Utc>,
}

impl StateTransition {
    pub fn changed(&self) -> bool {
        self.old_state != self.new_state
    }

    /// This transition entered Escalated from another state
    pub fn entered_escalated(&self) -> bool {
        self.changed() && self.new_state == CrisisState::Escalated
    }
}

/// Timing parameters of the machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrisisTiming {
    /// Two elevated signals within this window escalate
    pub sustained_window: Duration,
    /// Unacknowledged Escalated falls to Cooldown after this
    pub safety_timeout: Duration,
    /// Cooldown without elevated signals returns to Normal after this
    pub quiet_period: Duration,
}

impl CrisisTiming {
    pub fn from_config(config: &RiskConfig) -> Self {
        Self {
            sustained_window: secs_to_chrono(config.sustained_window_secs),
            safety_timeout: secs_to_chrono(config.safety_timeout_secs),
            quiet_period: secs_to_chrono(config.quiet_period_secs),
        }
    }
}

impl Default for CrisisTiming {
    fn default() -> Self {
        Self::from_config(&RiskConfig::default())
    }
}

/// One user's crisis state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrisisSession {
    pub state: CrisisState,
    /// When the current state was entered (None while never left Normal)
    pub entered_at: Option<DateTime<Utc>>,
    /// Most recent elevated-or-worse signal
    pub last_elevated_at: Option<DateTime<Utc>>,
    /// Most recent entry into Escalated
    pub escalated_at: Option<DateTime<Utc>>,
}

impl Default for CrisisSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CrisisSession {
    pub fn new() -> Self {
        Self {
            state: CrisisState::Normal,
            entered_at: None,
            last_elevated_at: None,
            escalated_at: None,
        }
    }

    /// Apply one input and return the transition taken
    pub fn apply(&mut self, input: CrisisInput, timing: &CrisisTiming) -> StateTransition {
        let (next, cause, at) = match input {
            CrisisInput::Utterance { class, at } => {
                let (next, cause) = self.on_utterance(class, at, timing);
                if class >= SignalClass::Elevated {
                    self.last_elevated_at = Some(at);
                }
                (next, cause, at)
            }
            CrisisInput::Acknowledge { at } => {
                let (next, cause) = match self.state {
                    CrisisState::Escalated => (CrisisState::Cooldown, TransitionCause::Acknowledged),
                    state => (state, TransitionCause::Unchanged),
                };
                (next, cause, at)
            }
            CrisisInput::Tick { now } => {
                let (next, cause) = self.on_tick(now, timing);
                (next, cause, now)
            }
        };

        self.transition_to(next, cause, at)
    }

    fn on_utterance(
        &self,
        class: SignalClass,
        at: DateTime<Utc>,
        timing: &CrisisTiming,
    ) -> (CrisisState, TransitionCause) {
        use CrisisState::*;
        use SignalClass as C;

        if class == C::Critical {
            return (Escalated, TransitionCause::CriticalSignal);
        }

        match (self.state, class) {
            (Escalated, _) => (Escalated, TransitionCause::Unchanged),

            (Normal, C::Quiet) => (Normal, TransitionCause::QuietSignal),
            (Normal, C::Elevated) => (Elevated, TransitionCause::ElevatedSignal),
            (Normal, C::High) => (Elevated, TransitionCause::HighSignal),

            (Elevated, C::Quiet) => (Normal, TransitionCause::QuietSignal),
            (Elevated, C::Elevated) => {
                if self.within(self.last_elevated_at, at, timing.sustained_window) {
                    (Escalating, TransitionCause::SustainedSignal)
                } else {
                    (Elevated, TransitionCause::ElevatedSignal)
                }
            }
            (Elevated, C::High) => (Escalating, TransitionCause::HighSignal),

            (Escalating, C::Quiet) => (Elevated, TransitionCause::QuietSignal),
            (Escalating, C::Elevated) => (Escalated, TransitionCause::SustainedSignal),
            (Escalating, C::High) => (Escalated, TransitionCause::HighSignal),

            (Cooldown, C::Quiet) => {
                if self.elapsed_at_least(self.entered_at, at, timing.quiet_period) {
                    (Normal, TransitionCause::QuietPeriodElapsed)
                } else {
                    (Cooldown, TransitionCause::QuietSignal)
                }
            }
            (Cooldown, C::Elevated) => (Escalating, TransitionCause::ElevatedSignal),
            (Cooldown, C::High) => (Escalating, TransitionCause::HighSignal),

            (_, C::Critical) => (Escalated, TransitionCause::CriticalSignal),
        }
    }

    fn on_tick(&self, now: DateTime<Utc>, timing: &CrisisTiming) -> (CrisisState, TransitionCause) {
        match self.state {
            CrisisState::Escalated
                if self.elapsed_at_least(self.entered_at, now, timing.safety_timeout) =>
            {
                (CrisisState::Cooldown, TransitionCause::SafetyTimeout)
            }
            CrisisState::Cooldown
                if self.elapsed_at_least(self.entered_at, now, timing.quiet_period) =>
            {
                (CrisisState::Normal, TransitionCause::QuietPeriodElapsed)
            }
            CrisisState::Elevated
                if !self.within(self.last_elevated_at, now, timing.sustained_window) =>
            {
                (CrisisState::Normal, TransitionCause::SustainedWindowExpired)
            }
            state => (state, TransitionCause::Unchanged),
        }
    }

    fn transition_to(
        &mut self,
        new_state: CrisisState,
        cause: TransitionCause,
        at: DateTime<Utc>,
    ) -> StateTransition {
        let transition = StateTransition {
            old_state: self.state,
            new_state,
            cause,
            at,
        };

        if transition.changed() {
            self.state = new_state;
            self.entered_at = Some(at);
            if new_state == CrisisState::Escalated {
                self.escalated_at = Some(at);
            }
        } else if new_state == CrisisState::Escalated && cause == TransitionCause::CriticalSignal {
            // A repeated critical disclosure restarts the safety timeout
            self.entered_at = Some(at);
            self.escalated_at = Some(at);
        }

        transition
    }

    /// `since` is set and `now - since <= window`
    fn within(&self, since: Option<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) -> bool {
        since.is_some_and(|since| now.signed_duration_since(since) <= window)
    }

    /// `since` is set and `now - since >= period`
    fn elapsed_at_least(
        &self,
        since: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        period: Duration,
    ) -> bool {
        since.is_some_and(|since| now.signed_duration_since(since) >= period)
    }
}

//! Risk Aggregator
//!
//! Fuses per-utterance evidence ([`scoring`]) and drives the per-user crisis
//! state machine ([`state_machine`]). The aggregator itself holds no per-user
//! state; callers pass the user's [`CrisisSession`] under the user's lock.

pub mod scoring;
pub mod state_machine;

pub use scoring::{RiskScorer, ScoreBreakdown};
pub use state_machine::{
    CrisisInput, CrisisSession, CrisisTiming, SignalClass, StateTransition, TransitionCause,
};

use crate::config::RiskConfig;
use crate::types::{BaselineDeviation, DissonanceScore, PatternMatch, ReasonEntry, ReasonKind};
use chrono::{DateTime, Utc};
use tracing::info;

/// Outcome of applying one utterance to a user's crisis session
#[derive(Debug, Clone)]
pub struct RiskDecision {
    pub breakdown: ScoreBreakdown,
    /// Timeout handling applied before the utterance
    pub tick: StateTransition,
    /// Transition caused by the utterance itself
    pub transition: StateTransition,
    /// A crisis event must be dispatched for this utterance
    pub escalation_required: bool,
}

/// Scoring plus state transitions
#[derive(Debug, Clone)]
pub struct RiskAggregator {
    scorer: RiskScorer,
    timing: CrisisTiming,
}

impl RiskAggregator {
    pub fn new(config: RiskConfig) -> Self {
        let timing = CrisisTiming::from_config(&config);
        Self {
            scorer: RiskScorer::new(config),
            timing,
        }
    }

    pub fn timing(&self) -> &CrisisTiming {
        &self.timing
    }

    pub fn scorer(&self) -> &RiskScorer {
        &self.scorer
    }

    /// Score an utterance and advance `session`
    ///
    /// `Tick(at)` is applied first so expired timeouts are honoured before the
    /// new signal. Escalation is required when the utterance enters Escalated
    /// or carries a critical pattern (even while already Escalated).
    pub fn assess(
        &self,
        session: &mut CrisisSession,
        matches: &[PatternMatch],
        dissonance: &DissonanceScore,
        deviation: &BaselineDeviation,
        at: DateTime<Utc>,
    ) -> RiskDecision {
        let tick = session.apply(CrisisInput::Tick { now: at }, &self.timing);

        let mut breakdown = self.scorer.score(matches, dissonance, deviation);
        let transition = session.apply(
            CrisisInput::Utterance {
                class: breakdown.class,
                at,
            },
            &self.timing,
        );

        for applied in [&tick, &transition] {
            if applied.changed() {
                breakdown.reasons.push(ReasonEntry::new(
                    ReasonKind::StateTransition,
                    format!(
                        "{} -> {} ({})",
                        applied.old_state,
                        applied.new_state,
                        applied.cause.as_str()
                    ),
                ));
            }
        }

        let escalation_required =
            transition.entered_escalated() || breakdown.class == SignalClass::Critical;

        if escalation_required {
            info!(
                old_state = %transition.old_state,
                new_state = %transition.new_state,
                risk_level = %breakdown.risk_level,
                score = breakdown.score,
                "Escalation required"
            );
        }

        RiskDecision {
            breakdown,
            tick,
            transition,
            escalation_required,
        }
    }

    /// Operator acknowledgement (Escalated → Cooldown, no-op elsewhere)
    pub fn acknowledge(&self, session: &mut CrisisSession, at: DateTime<Utc>) -> StateTransition {
        session.apply(CrisisInput::Acknowledge { at }, &self.timing)
    }

    /// Apply timeouts as of `now`
    pub fn tick(&self, session: &mut CrisisSession, now: DateTime<Utc>) -> StateTransition {
        session.apply(CrisisInput::Tick { now }, &self.timing)
    }
}

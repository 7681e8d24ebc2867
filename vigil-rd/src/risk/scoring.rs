//! Risk score fusion
//!
//! Combines pattern severity, dissonance and baseline deviation into one
//! score, a signal class for the state machine, a risk level, and the ordered
//! reason trace explaining both.
//!
//! **Default Weights:**
//! - Pattern severity: 50%
//! - Dissonance: 30%
//! - Baseline deviation: 20%
//!
//! **Default Thresholds:**
//! - Quiet: <0.35
//! - Elevated: 0.35-0.65
//! - High: ≥0.65
//! - Critical: any critical pattern, regardless of score

use crate::config::RiskConfig;
use crate::types::{
    BaselineDeviation, DissonanceDirection, DissonanceScore, PatternMatch, ReasonEntry, ReasonKind,
    Severity,
};
use vigil_common::RiskLevel;

use super::state_machine::SignalClass;

/// Fused score with its derived class, level and explanation
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    /// Fused score (0.0-1.0)
    pub score: f64,
    pub class: SignalClass,
    pub risk_level: RiskLevel,
    /// Any contributing signal was low-confidence
    pub low_confidence: bool,
    /// Ordered evidence, critical override first
    pub reasons: Vec<ReasonEntry>,
}

/// Weighted evidence fusion
#[derive(Debug, Clone)]
pub struct RiskScorer {
    config: RiskConfig,
}

impl Default for RiskScorer {
    fn default() -> Self {
        Self::new(RiskConfig::default())
    }
}

impl RiskScorer {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Score one utterance's evidence
    ///
    /// # Arguments
    /// * `matches` - Pattern matches, severity-descending
    /// * `dissonance` - Stated vs. vocal affect gap
    /// * `deviation` - Baseline deviation of the vocal vector
    ///
    /// # Returns
    /// Score, class and level. A critical pattern always yields
    /// `SignalClass::Critical` and `RiskLevel::Critical`.
    pub fn score(
        &self,
        matches: &[PatternMatch],
        dissonance: &DissonanceScore,
        deviation: &BaselineDeviation,
    ) -> ScoreBreakdown {
        let cfg = &self.config;
        let mut reasons = Vec::new();

        let top = matches.iter().max_by_key(|m| m.severity);
        let critical = top.filter(|m| m.severity == Severity::Critical);

        if let Some(m) = critical {
            reasons.push(ReasonEntry::new(
                ReasonKind::CriticalOverride,
                format!(
                    "critical pattern {} matched ({:?}); risk level forced to critical",
                    m.pattern_id, m.pattern_type
                ),
            ));
        }

        // Pattern severity
        let pattern_term = top.map(|m| m.severity.weight()).unwrap_or(0.0);
        let pattern_contribution = cfg.pattern_weight * pattern_term;
        for (index, m) in matches.iter().enumerate() {
            let detail = format!(
                "pattern {} ({:?}, {:?}) matched '{}' {} with confidence {:.2}",
                m.pattern_id,
                m.pattern_type,
                m.severity,
                m.phrase,
                if m.exact { "exactly" } else { "fuzzily" },
                m.confidence
            );
            // The highest-severity match carries the pattern contribution
            if index == 0 {
                reasons.push(ReasonEntry::scored(ReasonKind::PatternMatch, detail, pattern_contribution));
            } else {
                reasons.push(ReasonEntry::new(ReasonKind::PatternMatch, detail));
            }
        }

        // Dissonance
        let direction_factor = match dissonance.direction {
            DissonanceDirection::ClaimsPositiveSoundsDistressed => cfg.claims_positive_amplifier,
            DissonanceDirection::Aligned => 1.0,
            DissonanceDirection::ClaimsDistressedSoundsPositive => cfg.claims_distressed_factor,
        };
        let dissonance_term = dissonance.gap_magnitude
            * direction_factor
            * dissonance.confidence.max(cfg.uncertainty_weight);
        let dissonance_contribution = cfg.dissonance_weight * dissonance_term;
        reasons.push(ReasonEntry::scored(
            ReasonKind::Dissonance,
            format!(
                "dissonance gap {:.2} ({}) confidence {:.2}{}",
                dissonance.gap_magnitude,
                direction_label(dissonance.direction),
                dissonance.confidence,
                if dissonance.low_confidence { ", low confidence" } else { "" }
            ),
            dissonance_contribution,
        ));

        // Baseline deviation
        let baseline_factor = if deviation.low_confidence {
            cfg.cold_start_weight
        } else {
            1.0
        };
        let baseline_contribution = cfg.baseline_weight * deviation.normalized * baseline_factor;
        reasons.push(ReasonEntry::scored(
            ReasonKind::BaselineDeviation,
            format!(
                "baseline deviation z={:.2} normalized {:.2} after {} observations (generation {})",
                deviation.z_score, deviation.normalized, deviation.observations, deviation.generation
            ),
            baseline_contribution,
        ));
        if deviation.low_confidence {
            reasons.push(ReasonEntry::new(
                ReasonKind::InsufficientBaselineData,
                "personal baseline not established; deviation measured against population default",
            ));
        }

        let low_confidence = dissonance.low_confidence || deviation.low_confidence;
        let mut score = pattern_contribution + dissonance_contribution + baseline_contribution;

        if low_confidence && top.is_some_and(|m| m.severity >= Severity::High) {
            score += cfg.over_escalation_bias;
            reasons.push(ReasonEntry::scored(
                ReasonKind::SafetyBias,
                "high-severity pattern with low-confidence signals; biased toward escalation",
                cfg.over_escalation_bias,
            ));
        }

        let score = score.clamp(0.0, 1.0);

        let (class, risk_level) = if critical.is_some() {
            (SignalClass::Critical, RiskLevel::Critical)
        } else {
            (self.classify(score), self.level(score))
        };

        ScoreBreakdown {
            score,
            class,
            risk_level,
            low_confidence,
            reasons,
        }
    }

    /// Signal class of a non-critical score
    pub fn classify(&self, score: f64) -> SignalClass {
        if score >= self.config.high_threshold {
            SignalClass::High
        } else if score >= self.config.elevated_threshold {
            SignalClass::Elevated
        } else {
            SignalClass::Quiet
        }
    }

    /// Risk level of a non-critical score
    pub fn level(&self, score: f64) -> RiskLevel {
        if score >= self.config.high_threshold {
            RiskLevel::High
        } else if score >= self.config.elevated_threshold {
            RiskLevel::Medium
        } else if score >= self.config.low_threshold {
            RiskLevel::Low
        } else {
            RiskLevel::None
        }
    }
}

fn direction_label(direction: DissonanceDirection) -> &'static str {
    match direction {
        DissonanceDirection::Aligned => "aligned",
        DissonanceDirection::ClaimsPositiveSoundsDistressed => "claims positive, sounds distressed",
        DissonanceDirection::ClaimsDistressedSoundsPositive => "claims distressed, sounds positive",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PatternType;

    fn pattern(id: &str, severity: Severity) -> PatternMatch {
        PatternMatch {
            pattern_id: id.to_string(),
            pattern_type: PatternType::Minimization,
            severity,
            confidence: 1.0,
            phrase: "phrase".to_string(),
            exact: true,
            crisis_protocol: None,
        }
    }

    fn dissonance(gap: f64, direction: DissonanceDirection, low: bool) -> DissonanceScore {
        DissonanceScore {
            gap_magnitude: gap,
            direction,
            confidence: if low { 0.3 } else { 0.9 },
            low_confidence: low,
        }
    }

    fn deviation(normalized: f64, low: bool) -> BaselineDeviation {
        BaselineDeviation {
            z_score: normalized * 3.0,
            normalized,
            low_confidence: low,
            observations: 10,
            generation: 0,
        }
    }

    #[test]
    fn test_quiet_utterance() {
        let scorer = RiskScorer::default();
        let result = scorer.score(
            &[],
            &dissonance(0.1, DissonanceDirection::Aligned, false),
            &deviation(0.1, false),
        );
        // 0.3·0.1·0.9 + 0.2·0.1 = 0.047
        assert!((result.score - 0.047).abs() < 1e-9);
        assert_eq!(result.class, SignalClass::Quiet);
        assert_eq!(result.risk_level, RiskLevel::None);
    }

    #[test]
    fn test_critical_override_ignores_score() {
        let scorer = RiskScorer::default();
        let result = scorer.score(
            &[pattern("sw-si", Severity::Critical)],
            &dissonance(0.0, DissonanceDirection::Aligned, false),
            &deviation(0.0, false),
        );
        assert!(result.score < 0.65);
        assert_eq!(result.class, SignalClass::Critical);
        assert_eq!(result.risk_level, RiskLevel::Critical);
        assert_eq!(result.reasons[0].kind, ReasonKind::CriticalOverride);
        assert!(result.reasons[0].detail.contains("sw-si"));
    }

    #[test]
    fn test_minimization_with_distressed_voice_is_elevated() {
        let scorer = RiskScorer::default();
        let result = scorer.score(
            &[pattern("en-min-fine", Severity::Low)],
            &dissonance(0.8, DissonanceDirection::ClaimsPositiveSoundsDistressed, false),
            &deviation(0.2, false),
        );
        // 0.125 + 0.3·0.8·1.5·0.9 + 0.04 = 0.489
        assert!((result.score - 0.489).abs() < 1e-9);
        assert_eq!(result.class, SignalClass::Elevated);
        assert_eq!(result.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn test_claims_distressed_sounds_positive_not_amplified() {
        let scorer = RiskScorer::default();
        let result = scorer.score(
            &[],
            &dissonance(0.9, DissonanceDirection::ClaimsDistressedSoundsPositive, false),
            &deviation(0.0, false),
        );
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_safety_bias_on_high_severity_low_confidence() {
        let scorer = RiskScorer::default();
        let confident = scorer.score(
            &[pattern("en-hopeless", Severity::High)],
            &dissonance(0.5, DissonanceDirection::Aligned, false),
            &deviation(0.5, false),
        );
        let uncertain = scorer.score(
            &[pattern("en-hopeless", Severity::High)],
            &dissonance(0.5, DissonanceDirection::Aligned, true),
            &deviation(0.5, false),
        );
        assert!(uncertain.low_confidence);
        assert!(uncertain.reasons.iter().any(|r| r.kind == ReasonKind::SafetyBias));
        assert!(!confident.reasons.iter().any(|r| r.kind == ReasonKind::SafetyBias));
        // Lower dissonance confidence is more than offset by the bias
        assert!(uncertain.score > confident.score);
    }

    #[test]
    fn test_cold_start_discounts_baseline_and_is_traced() {
        let scorer = RiskScorer::default();
        let result = scorer.score(
            &[],
            &dissonance(0.0, DissonanceDirection::Aligned, false),
            &deviation(1.0, true),
        );
        assert!((result.score - 0.1).abs() < 1e-9);
        assert!(result
            .reasons
            .iter()
            .any(|r| r.kind == ReasonKind::InsufficientBaselineData));
    }

    #[test]
    fn test_levels_and_classes() {
        let scorer = RiskScorer::default();
        assert_eq!(scorer.level(0.1), RiskLevel::None);
        assert_eq!(scorer.level(0.2), RiskLevel::Low);
        assert_eq!(scorer.level(0.4), RiskLevel::Medium);
        assert_eq!(scorer.level(0.7), RiskLevel::High);
        assert_eq!(scorer.classify(0.34), SignalClass::Quiet);
        assert_eq!(scorer.classify(0.35), SignalClass::Elevated);
        assert_eq!(scorer.classify(0.65), SignalClass::High);
    }
}

//! Dissonance Scorer
//!
//! Measures the gap between what the user *says* (lexical sentiment) and how
//! they *sound* (vocal affect) by projecting both onto one valence-arousal
//! space.
//!
//! # Projection
//! - Stated sentiment: valence from the label, neutral arousal 0.5
//! - Vocal affect: fixed (valence, arousal) anchor of the emotion label
//!
//! # Gap
//! `sqrt(0.8·(|Δv|/2)² + 0.2·(2·|Δa|)²)`, clamped to [0, 1]. Valence dominates;
//! arousal only separates "calm" from "agitated" at similar valence.

use crate::types::{DissonanceDirection, DissonanceScore, StatedSentiment, VocalAffect};
use tracing::trace;

/// Arousal assumed for a lexical sentiment label
const STATED_AROUSAL: f64 = 0.5;

const VALENCE_WEIGHT: f64 = 0.8;
const AROUSAL_WEIGHT: f64 = 0.2;

/// Stateless per-utterance dissonance scorer
#[derive(Debug, Clone)]
pub struct DissonanceScorer {
    /// Inputs below this confidence cap the result confidence here
    confidence_floor: f64,
    /// Normalized valence delta counted as aligned
    direction_epsilon: f64,
}

impl Default for DissonanceScorer {
    fn default() -> Self {
        Self::new(0.4, 0.2)
    }
}

impl DissonanceScorer {
    pub fn new(confidence_floor: f64, direction_epsilon: f64) -> Self {
        Self {
            confidence_floor: confidence_floor.clamp(0.0, 1.0),
            direction_epsilon: direction_epsilon.clamp(0.0, 1.0),
        }
    }

    /// Score one utterance
    ///
    /// # Arguments
    /// * `stated` - Lexical sentiment from the transcript
    /// * `vocal` - Vocal-affect label and confidence
    ///
    /// # Returns
    /// Gap magnitude in [0, 1], its direction, and a confidence that is
    /// capped at the floor when either input is unreliable
    pub fn score(&self, stated: &StatedSentiment, vocal: &VocalAffect) -> DissonanceScore {
        let stated_valence = stated.label.valence();
        let (vocal_valence, vocal_arousal) = vocal.label.valence_arousal();

        let delta_valence = (stated_valence - vocal_valence) / 2.0;
        let delta_arousal = (STATED_AROUSAL - vocal_arousal).abs();

        let gap_magnitude = (VALENCE_WEIGHT * delta_valence.powi(2)
            + AROUSAL_WEIGHT * (2.0 * delta_arousal).powi(2))
        .sqrt()
        .clamp(0.0, 1.0);

        let direction = if delta_valence > self.direction_epsilon {
            DissonanceDirection::ClaimsPositiveSoundsDistressed
        } else if delta_valence < -self.direction_epsilon {
            DissonanceDirection::ClaimsDistressedSoundsPositive
        } else {
            DissonanceDirection::Aligned
        };

        let stated_conf = stated.confidence.clamp(0.0, 1.0);
        let vocal_conf = vocal.confidence.clamp(0.0, 1.0);
        let low_confidence = stated_conf < self.confidence_floor || vocal_conf < self.confidence_floor;

        let mut confidence = (stated_conf * vocal_conf).sqrt();
        if low_confidence {
            confidence = confidence.min(self.confidence_floor);
        }

        trace!(
            gap = gap_magnitude,
            ?direction,
            confidence,
            low_confidence,
            "Dissonance scored"
        );

        DissonanceScore {
            gap_magnitude,
            direction,
            confidence,
            low_confidence,
        }
    }
}

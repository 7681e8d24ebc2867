//! Baseline Tracker
//!
//! Rolling per-user vocal-affect baseline and deviation scoring.
//!
//! # Algorithm
//! Exponentially weighted mean/variance with smoothing factor
//! `α = 1 − 0.5^(1/half_life)`, so an observation's weight halves every
//! `half_life` observations. Each new vector is first scored against the
//! baseline as it stood *before* the vector, then folded in.
//!
//! # Cold start
//! Until `min_observations` vectors have been applied, deviation is computed
//! against the population default and flagged low-confidence.

use crate::config::BaselineConfig;
use crate::types::BaselineDeviation;
use thiserror::Error;
use tracing::debug;

/// Baseline update errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BaselineError {
    #[error("Vector dimension {actual} does not match baseline dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Empty feature vector")]
    EmptyVector,
}

/// One user's rolling baseline
///
/// Mutated only through [`BaselineTracker::observe`], under the owning
/// user's lock.
#[derive(Debug, Clone, PartialEq)]
pub struct UserBaseline {
    mean: Vec<f64>,
    variance: Vec<f64>,
    observations: u64,
    generation: u64,
}

impl UserBaseline {
    /// Fresh, cold baseline
    pub fn new(generation: u64) -> Self {
        Self {
            mean: Vec::new(),
            variance: Vec::new(),
            observations: 0,
            generation,
        }
    }

    /// Feature dimension, fixed by the first observation
    pub fn dimension(&self) -> Option<usize> {
        if self.observations == 0 {
            None
        } else {
            Some(self.mean.len())
        }
    }

    pub fn observations(&self) -> u64 {
        self.observations
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn variance(&self) -> &[f64] {
        &self.variance
    }
}

/// Deviation scoring and baseline updates
#[derive(Debug, Clone)]
pub struct BaselineTracker {
    config: BaselineConfig,
    alpha: f64,
}

impl BaselineTracker {
    pub fn new(config: BaselineConfig) -> Self {
        let half_life = if config.half_life > 0.0 {
            config.half_life
        } else {
            BaselineConfig::default().half_life
        };
        let alpha = 1.0 - 0.5_f64.powf(1.0 / half_life);
        Self { config, alpha }
    }

    /// Smoothing factor derived from the half-life
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Whether `baseline` still relies on the population default
    pub fn is_cold(&self, baseline: &UserBaseline) -> bool {
        baseline.observations < self.config.min_observations
    }

    /// Score `vector` against the baseline, then fold it in
    ///
    /// # Arguments
    /// * `baseline` - The user's baseline (updated in place on success)
    /// * `vector` - Vocal-affect feature vector
    ///
    /// # Returns
    /// Deviation relative to the pre-update baseline. On error the baseline
    /// is left untouched.
    pub fn observe(
        &self,
        baseline: &mut UserBaseline,
        vector: &[f64],
    ) -> Result<BaselineDeviation, BaselineError> {
        if vector.is_empty() {
            return Err(BaselineError::EmptyVector);
        }
        if let Some(expected) = baseline.dimension() {
            if expected != vector.len() {
                return Err(BaselineError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let cold = self.is_cold(baseline);
        let z_score = if cold {
            let (mean, variance) = self.population(vector.len());
            self.rms_z(vector, &mean, &variance)
        } else {
            self.rms_z(vector, &baseline.mean, &baseline.variance)
        };
        let normalized = (z_score / self.config.deviation_saturation).clamp(0.0, 1.0);

        self.update(baseline, vector);

        debug!(
            z_score,
            normalized,
            cold,
            observations = baseline.observations,
            generation = baseline.generation,
            "Baseline observed"
        );

        Ok(BaselineDeviation {
            z_score,
            normalized,
            low_confidence: cold,
            observations: baseline.observations,
            generation: baseline.generation,
        })
    }

    /// Fresh cold baseline of the next generation
    pub fn reset(&self, baseline: &UserBaseline) -> UserBaseline {
        UserBaseline::new(baseline.generation + 1)
    }

    fn update(&self, baseline: &mut UserBaseline, vector: &[f64]) {
        if baseline.observations == 0 {
            let (_, variance) = self.population(vector.len());
            baseline.mean = vector.to_vec();
            baseline.variance = variance;
        } else {
            let alpha = self.alpha;
            for ((mean, variance), &x) in baseline
                .mean
                .iter_mut()
                .zip(baseline.variance.iter_mut())
                .zip(vector)
            {
                let diff = x - *mean;
                let increment = alpha * diff;
                *mean += increment;
                *variance = (1.0 - alpha) * (*variance + diff * increment);
            }
        }
        baseline.observations += 1;
    }

    /// Root-mean-square per-feature z-score
    fn rms_z(&self, vector: &[f64], mean: &[f64], variance: &[f64]) -> f64 {
        let sum: f64 = vector
            .iter()
            .zip(mean)
            .zip(variance)
            .map(|((&x, &m), &v)| {
                let z = (x - m) / v.max(self.config.variance_floor).sqrt();
                z * z
            })
            .sum();
        (sum / vector.len() as f64).sqrt()
    }

    /// Population default for `dimension` features
    ///
    /// Configured values are used only when their dimension matches.
    fn population(&self, dimension: usize) -> (Vec<f64>, Vec<f64>) {
        let mean = self
            .config
            .population_mean
            .as_ref()
            .filter(|m| m.len() == dimension)
            .cloned()
            .unwrap_or_else(|| vec![0.0; dimension]);
        let variance = self
            .config
            .population_variance
            .as_ref()
            .filter(|v| v.len() == dimension)
            .cloned()
            .unwrap_or_else(|| vec![1.0; dimension]);
        (mean, variance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> BaselineTracker {
        BaselineTracker::new(BaselineConfig::default())
    }

    #[test]
    fn test_alpha_from_half_life() {
        let t = tracker();
        // Weight of an observation after 10 further updates is one half
        assert!(((1.0 - t.alpha()).powi(10) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_cold_start_flagged_until_min_observations() {
        let t = tracker();
        let mut baseline = UserBaseline::new(0);
        for i in 0..5u64 {
            let deviation = t.observe(&mut baseline, &[0.1, 0.2, 0.3]).unwrap();
            assert_eq!(deviation.observations, i + 1);
            assert_eq!(deviation.low_confidence, i < 3, "observation {}", i);
        }
    }

    #[test]
    fn test_cold_start_uses_population_default() {
        let t = tracker();
        let mut baseline = UserBaseline::new(0);
        // Against mean 0 / variance 1, a vector of 3.0s has z = 3 → saturated
        let deviation = t.observe(&mut baseline, &[3.0, 3.0]).unwrap();
        assert!((deviation.z_score - 3.0).abs() < 1e-9);
        assert_eq!(deviation.normalized, 1.0);
    }

    #[test]
    fn test_steady_signal_then_spike() {
        let t = tracker();
        let mut baseline = UserBaseline::new(0);
        let mut last = None;
        for i in 0..20 {
            let jitter = if i % 2 == 0 { 0.05 } else { -0.05 };
            last = Some(t.observe(&mut baseline, &[1.0 + jitter, 2.0 - jitter]).unwrap());
        }
        let steady = last.unwrap();
        assert!(!steady.low_confidence);
        assert!(steady.normalized < 0.5, "steady deviation {}", steady.normalized);

        let spike = t.observe(&mut baseline, &[4.0, -1.0]).unwrap();
        assert!(spike.normalized > 0.9, "spike deviation {}", spike.normalized);
    }

    #[test]
    fn test_dimension_mismatch_leaves_baseline_untouched() {
        let t = tracker();
        let mut baseline = UserBaseline::new(0);
        t.observe(&mut baseline, &[1.0, 2.0]).unwrap();
        let before = baseline.clone();

        let err = t.observe(&mut baseline, &[1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(err, BaselineError::DimensionMismatch { expected: 2, actual: 3 });
        assert_eq!(baseline, before);
    }

    #[test]
    fn test_reset_starts_next_generation() {
        let t = tracker();
        let mut baseline = UserBaseline::new(0);
        for _ in 0..4 {
            t.observe(&mut baseline, &[0.5]).unwrap();
        }
        let fresh = t.reset(&baseline);
        assert_eq!(fresh.generation(), 1);
        assert_eq!(fresh.observations(), 0);
        assert!(fresh.dimension().is_none());
        assert!(t.is_cold(&fresh));
    }

    #[test]
    fn test_configured_population_used_when_dimension_matches() {
        let config = BaselineConfig {
            population_mean: Some(vec![5.0, 5.0]),
            population_variance: Some(vec![1.0, 1.0]),
            ..Default::default()
        };
        let t = BaselineTracker::new(config);

        let mut baseline = UserBaseline::new(0);
        let deviation = t.observe(&mut baseline, &[5.0, 5.0]).unwrap();
        assert_eq!(deviation.z_score, 0.0);

        // Different dimension falls back to zeros / ones
        let mut other = UserBaseline::new(0);
        let deviation = t.observe(&mut other, &[1.0, 1.0, 1.0]).unwrap();
        assert!((deviation.z_score - 1.0).abs() < 1e-9);
    }
}

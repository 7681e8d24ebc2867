//! Configuration for vigil-rd
//!
//! Every threshold the detection core uses is a field here with a compiled
//! default, loaded from `vigil-rd.toml` (see `vigil_common::config` for path
//! resolution). Missing sections or fields keep their defaults.
//!
//! ```toml
//! [server]
//! port = 5810
//!
//! [patterns]
//! taxonomy_path = "/etc/vigil/taxonomy.toml"
//! fuzzy_threshold = 0.85
//!
//! [risk]
//! elevated_threshold = 0.35
//! high_threshold = 0.65
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vigil_common::config::{require_positive, require_unit_interval, LoggingConfig};
use vigil_common::{Error, Result};

/// Top-level vigil-rd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub ingest: IngestConfig,
    pub patterns: PatternConfig,
    pub context: ContextConfig,
    pub dissonance: DissonanceConfig,
    pub baseline: BaselineConfig,
    pub risk: RiskConfig,
    pub alert: AlertConfig,
}

impl EngineConfig {
    /// Load from a resolved path (or defaults when `None` / missing) and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: EngineConfig = vigil_common::config::load_toml_or_default(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject inconsistent or out-of-range tuning values
    pub fn validate(&self) -> Result<()> {
        if self.ingest.session_cursor_limit == 0 {
            return Err(Error::Config("ingest.session_cursor_limit must be >= 1".to_string()));
        }
        require_unit_interval("patterns.fuzzy_threshold", self.patterns.fuzzy_threshold)?;

        if self.context.top_k == 0 {
            return Err(Error::Config("context.top_k must be >= 1".to_string()));
        }
        require_unit_interval("context.relevance_floor", self.context.relevance_floor)?;

        require_unit_interval("dissonance.confidence_floor", self.dissonance.confidence_floor)?;
        require_unit_interval("dissonance.direction_epsilon", self.dissonance.direction_epsilon)?;

        require_positive("baseline.half_life", self.baseline.half_life)?;
        require_positive("baseline.variance_floor", self.baseline.variance_floor)?;
        require_positive("baseline.deviation_saturation", self.baseline.deviation_saturation)?;
        if let (Some(mean), Some(var)) = (
            &self.baseline.population_mean,
            &self.baseline.population_variance,
        ) {
            if mean.len() != var.len() {
                return Err(Error::Config(format!(
                    "baseline.population_mean has {} features but population_variance has {}",
                    mean.len(),
                    var.len()
                )));
            }
        }

        let risk = &self.risk;
        for (name, value) in [
            ("risk.pattern_weight", risk.pattern_weight),
            ("risk.dissonance_weight", risk.dissonance_weight),
            ("risk.baseline_weight", risk.baseline_weight),
            ("risk.low_threshold", risk.low_threshold),
            ("risk.elevated_threshold", risk.elevated_threshold),
            ("risk.high_threshold", risk.high_threshold),
            ("risk.cold_start_weight", risk.cold_start_weight),
            ("risk.uncertainty_weight", risk.uncertainty_weight),
            ("risk.over_escalation_bias", risk.over_escalation_bias),
        ] {
            require_unit_interval(name, value)?;
        }
        if !(risk.low_threshold < risk.elevated_threshold
            && risk.elevated_threshold < risk.high_threshold)
        {
            return Err(Error::Config(format!(
                "risk thresholds must satisfy low < elevated < high (got {} / {} / {})",
                risk.low_threshold, risk.elevated_threshold, risk.high_threshold
            )));
        }
        if risk.history_limit == 0 {
            return Err(Error::Config("risk.history_limit must be >= 1".to_string()));
        }

        if self.alert.max_attempts == 0 {
            return Err(Error::Config("alert.max_attempts must be >= 1".to_string()));
        }
        if self.alert.queue_capacity == 0 {
            return Err(Error::Config("alert.queue_capacity must be >= 1".to_string()));
        }
        if self.alert.initial_backoff_ms > self.alert.max_backoff_ms {
            return Err(Error::Config(
                "alert.initial_backoff_ms must not exceed alert.max_backoff_ms".to_string(),
            ));
        }

        Ok(())
    }
}

/// Fallback `EnvFilter` directives when `RUST_LOG` is unset
///
/// A bare level ("info", "debug") applies to the vigil crates only, with
/// `tower_http=info` added; a value that already holds directives is used
/// as written. The default level yields
/// `vigil_rd=info,vigil_common=info,tower_http=info`.
pub fn log_filter(logging: &LoggingConfig) -> String {
    let level = logging.level.trim();
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    let level = if level.is_empty() { "info" } else { level };
    format!("vigil_rd={level},vigil_common={level},tower_http=info")
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// EventBus buffer size
    pub event_capacity: usize,
    /// Interval of the background timeout sweeper (seconds)
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 5810,
            event_capacity: 1000,
            sweep_interval_secs: 30,
        }
    }
}

/// Ingest boundary validation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Reject vocal-affect vectors of any other dimension (unchecked when unset)
    pub expected_vector_dim: Option<usize>,
    /// Session cursors kept per user; the least recently active is evicted
    pub session_cursor_limit: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            expected_vector_dim: None,
            session_cursor_limit: 64,
        }
    }
}

/// Pattern taxonomy & matcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// TOML or JSON taxonomy snapshot; an empty taxonomy is used when unset
    pub taxonomy_path: Option<PathBuf>,
    /// Minimum similarity for fuzzy phrase matches
    pub fuzzy_threshold: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            taxonomy_path: None,
            fuzzy_threshold: 0.85,
        }
    }
}

/// Knowledge-base retrieval settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// JSON file with knowledge-base entries and embeddings; retrieval disabled when unset
    pub index_path: Option<PathBuf>,
    /// Embedding service endpoint; retrieval disabled when unset
    pub embedder_url: Option<String>,
    pub top_k: usize,
    pub relevance_floor: f64,
    /// Whole-retrieval timeout (milliseconds)
    pub timeout_ms: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            index_path: None,
            embedder_url: None,
            top_k: 3,
            relevance_floor: 0.3,
            timeout_ms: 200,
        }
    }
}

impl ContextConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DissonanceConfig {
    /// Inputs below this confidence cap the score confidence at this value
    pub confidence_floor: f64,
    /// Valence delta (normalized) below which stated and vocal affect count as aligned
    pub direction_epsilon: f64,
}

impl Default for DissonanceConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 0.4,
            direction_epsilon: 0.2,
        }
    }
}

/// Rolling per-user baseline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// Half-life of the exponential weighting, in observations
    pub half_life: f64,
    /// Observations required before the personal baseline is trusted
    pub min_observations: u64,
    /// Population default mean (zeros when unset or of a different dimension)
    pub population_mean: Option<Vec<f64>>,
    /// Population default variance (ones when unset or of a different dimension)
    pub population_variance: Option<Vec<f64>>,
    /// Lower bound on per-feature variance in the z-score
    pub variance_floor: f64,
    /// z-score mapped to a normalized deviation of 1.0
    pub deviation_saturation: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            half_life: 10.0,
            min_observations: 3,
            population_mean: None,
            population_variance: None,
            variance_floor: 1e-3,
            deviation_saturation: 3.0,
        }
    }
}

/// Risk fusion weights, thresholds and state machine timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub pattern_weight: f64,
    pub dissonance_weight: f64,
    pub baseline_weight: f64,
    /// Dissonance amplification for "claims positive, sounds distressed"
    pub claims_positive_amplifier: f64,
    /// Dissonance factor for "claims distressed, sounds positive"
    pub claims_distressed_factor: f64,
    /// Baseline weight multiplier while the baseline is cold
    pub cold_start_weight: f64,
    /// Minimum weight a low-confidence signal still contributes
    pub uncertainty_weight: f64,
    /// Added when severity is already high and any signal is low-confidence
    pub over_escalation_bias: f64,

    pub low_threshold: f64,
    pub elevated_threshold: f64,
    pub high_threshold: f64,

    /// Two elevated signals within this window escalate (seconds)
    pub sustained_window_secs: u64,
    /// Escalated falls to Cooldown after this long without acknowledgement (seconds)
    pub safety_timeout_secs: u64,
    /// Cooldown returns to Normal after this long without elevated signals (seconds)
    pub quiet_period_secs: u64,

    /// Assessments kept per user for audit queries
    pub history_limit: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            pattern_weight: 0.5,
            dissonance_weight: 0.3,
            baseline_weight: 0.2,
            claims_positive_amplifier: 1.5,
            claims_distressed_factor: 0.0,
            cold_start_weight: 0.5,
            uncertainty_weight: 0.5,
            over_escalation_bias: 0.1,
            low_threshold: 0.15,
            elevated_threshold: 0.35,
            high_threshold: 0.65,
            sustained_window_secs: 300,
            safety_timeout_secs: 1800,
            quiet_period_secs: 600,
            history_limit: 50,
        }
    }
}

/// Crisis event delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Notification collaborator endpoint; events are logged only when unset
    pub webhook_url: Option<String>,
    pub request_timeout_ms: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub max_attempts: u32,
    pub queue_capacity: usize,
    /// Ingestion-to-dispatch target; exceeding it is logged
    pub latency_budget_ms: u64,
    /// Given-up events retained for operational review
    pub dead_letter_limit: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            request_timeout_ms: 5_000,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
            max_attempts: 8,
            queue_capacity: 1024,
            latency_budget_ms: 30_000,
            dead_letter_limit: 256,
        }
    }
}

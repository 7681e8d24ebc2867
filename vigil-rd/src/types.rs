//! Core data model for the risk & dissonance detection core
//!
//! Everything an assessment consumes or produces:
//! - **Inputs:** `Utterance` with `StatedSentiment` and `VocalAffect`
//! - **Component outputs:** `PatternMatch`, `ScoredContext`, `DissonanceScore`, `BaselineDeviation`
//! - **Decision:** `RiskAssessment` with its ordered `ReasonEntry` trace
//!
//! All types are plain data; behaviour lives in the component modules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vigil_common::{CrisisState, RiskLevel};

// ============================================================================
// Utterance (ingest output)
// ============================================================================

/// Upstream lexical sentiment category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    /// Valence implied by the label (-1.0 negative, 0.0 neutral, +1.0 positive)
    pub fn valence(&self) -> f64 {
        match self {
            SentimentLabel::Positive => 1.0,
            SentimentLabel::Neutral => 0.0,
            SentimentLabel::Negative => -1.0,
        }
    }
}

/// Upstream categorical vocal emotion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Happy,
    Calm,
    Neutral,
    Sad,
    Anxious,
    Angry,
    Fearful,
    Distressed,
}

impl EmotionLabel {
    /// (valence, arousal) anchor of this emotion
    ///
    /// Valence in [-1, 1], arousal in [0, 1].
    pub fn valence_arousal(&self) -> (f64, f64) {
        match self {
            EmotionLabel::Happy => (0.8, 0.7),
            EmotionLabel::Calm => (0.5, 0.2),
            EmotionLabel::Neutral => (0.0, 0.4),
            EmotionLabel::Sad => (-0.7, 0.3),
            EmotionLabel::Anxious => (-0.6, 0.8),
            EmotionLabel::Angry => (-0.7, 0.9),
            EmotionLabel::Fearful => (-0.8, 0.85),
            EmotionLabel::Distressed => (-0.9, 0.8),
        }
    }
}

/// Lexical sentiment produced upstream from the transcript
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatedSentiment {
    pub label: SentimentLabel,
    /// Confidence score (0.0-1.0)
    pub confidence: f64,
}

/// Vocal-affect signal produced upstream from acoustic features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocalAffect {
    /// Numeric feature vector (pitch, jitter, energy, ...), fixed dimension per user
    pub vector: Vec<f64>,
    pub label: EmotionLabel,
    /// Confidence score (0.0-1.0)
    pub confidence: f64,
}

/// One validated turn of user speech
///
/// Immutable once created by the ingest adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub user_id: String,
    pub session_id: String,
    /// Strictly increasing within a session
    pub sequence_no: u64,
    /// When the user spoke (upstream clock)
    pub timestamp: DateTime<Utc>,
    /// Transcript text, possibly empty
    pub text: String,
    /// Optional language hint (e.g. "en", "sw")
    pub language: Option<String>,
    pub stated_sentiment: StatedSentiment,
    pub vocal_affect: VocalAffect,
    /// When this process accepted the payload (start of the latency budget,
    /// and the time the crisis state machine sees)
    pub received_at: DateTime<Utc>,
}

// ============================================================================
// Pattern taxonomy outputs
// ============================================================================

/// Ordered pattern severity: `Low < Medium < High < Critical`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Numeric scale used by the risk score
    pub fn weight(&self) -> f64 {
        match self {
            Severity::Low => 0.25,
            Severity::Medium => 0.5,
            Severity::High => 0.75,
            Severity::Critical => 1.0,
        }
    }
}

/// Deflection / crisis pattern category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Minimization,
    Deflection,
    Withdrawal,
    Somatization,
    Hopelessness,
    SuicidalIdeation,
    SelfHarm,
}

/// Structured crisis protocol attached to a taxonomy entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrisisProtocol {
    /// Recommended immediate action (e.g. "contact_on_call_counselor")
    pub action: String,
    /// Hotlines or referral resources
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub guidance: Option<String>,
}

/// One taxonomy pattern matched against an utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub pattern_id: String,
    pub pattern_type: PatternType,
    pub severity: Severity,
    /// 1.0 for exact phrase matches, fuzzy similarity otherwise
    pub confidence: f64,
    /// Phrase variant that produced the match
    pub phrase: String,
    /// True when matched on the exact stage
    pub exact: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crisis_protocol: Option<CrisisProtocol>,
}

// ============================================================================
// Context retrieval output
// ============================================================================

/// Knowledge-base entry returned by context retrieval, with its similarity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredContext {
    pub entry_id: String,
    pub category: String,
    pub cultural_significance: Option<String>,
    pub severity: Severity,
    pub guidance: String,
    /// Cosine similarity clamped to [0, 1]
    pub similarity: f64,
}

// ============================================================================
// Dissonance & baseline outputs
// ============================================================================

/// Which way stated and expressed affect diverge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DissonanceDirection {
    /// Stated and vocal valence agree within tolerance
    Aligned,
    /// Text more positive than voice ("I'm fine" said in distress)
    ClaimsPositiveSoundsDistressed,
    /// Text more negative than voice
    ClaimsDistressedSoundsPositive,
}

/// Per-utterance gap between lexical sentiment and vocal affect
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DissonanceScore {
    /// Normalized gap (0.0-1.0)
    pub gap_magnitude: f64,
    pub direction: DissonanceDirection,
    /// Confidence (0.0-1.0), capped at the floor when an input was unreliable
    pub confidence: f64,
    /// True when either input was below the confidence floor
    pub low_confidence: bool,
}

/// Deviation of one vocal-affect vector from the user's rolling baseline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineDeviation {
    /// RMS per-feature z-score
    pub z_score: f64,
    /// z-score mapped to (0.0-1.0)
    pub normalized: f64,
    /// Computed against the population default (cold start)
    pub low_confidence: bool,
    /// Observations applied, including this one
    pub observations: u64,
    /// Baseline generation (increments on reset)
    pub generation: u64,
}

// ============================================================================
// Risk assessment
// ============================================================================

/// Kind of evidence in a reason trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonKind {
    CriticalOverride,
    PatternMatch,
    Dissonance,
    BaselineDeviation,
    InsufficientBaselineData,
    SafetyBias,
    Context,
    ContextDegraded,
    StateTransition,
}

/// One ordered piece of contributing evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasonEntry {
    pub kind: ReasonKind,
    pub detail: String,
    /// Contribution to the fused score, when the evidence is scored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contribution: Option<f64>,
}

impl ReasonEntry {
    pub fn new(kind: ReasonKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            contribution: None,
        }
    }

    pub fn scored(kind: ReasonKind, detail: impl Into<String>, contribution: f64) -> Self {
        Self {
            kind,
            detail: detail.into(),
            contribution: Some(contribution),
        }
    }
}

/// Aggregate decision for one utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub assessment_id: Uuid,
    // Reference to the producing utterance
    pub user_id: String,
    pub session_id: String,
    pub sequence_no: u64,
    pub utterance_timestamp: DateTime<Utc>,
    /// Engine time the utterance was accepted
    pub received_at: DateTime<Utc>,

    pub risk_level: RiskLevel,
    /// Fused score (0.0-1.0) before the critical override
    pub score: f64,
    pub pattern_matches: Vec<PatternMatch>,
    pub dissonance: DissonanceScore,
    pub baseline_deviation: BaselineDeviation,
    pub context: Vec<ScoredContext>,
    /// Context retrieval timed out or failed; `context` is empty
    pub context_degraded: bool,
    /// Crisis state after applying this utterance
    pub crisis_state: CrisisState,
    pub escalation_required: bool,
    /// Any contributing signal was low-confidence
    pub low_confidence: bool,
    pub reason_trace: Vec<ReasonEntry>,
    /// Pattern taxonomy version pinned for this utterance
    pub taxonomy_version: String,
    pub assessed_at: DateTime<Utc>,
}

impl RiskAssessment {
    /// Highest matched pattern severity, if any
    pub fn max_severity(&self) -> Option<Severity> {
        self.pattern_matches.iter().map(|m| m.severity).max()
    }
}

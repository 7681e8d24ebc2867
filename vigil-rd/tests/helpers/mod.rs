//! Test Helper Utilities
//!
//! Shared fixtures for vigil-rd integration tests: a small bilingual
//! taxonomy, payload builders, recording/failing alert sinks and a slow
//! embedder for context timeouts.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vigil_common::EventBus;
use vigil_rd::alert::{AlertDispatcher, AlertError, AlertSink, CrisisEvent, DispatcherSettings};
use vigil_rd::config::EngineConfig;
use vigil_rd::context::{ContextError, ContextRetriever, Embedder, InMemoryVectorIndex};
use vigil_rd::ingest::{FeatureIngestAdapter, UpstreamPayload};
use vigil_rd::patterns::{PatternTaxonomyEntry, TaxonomySnapshot, TaxonomyStore};
use vigil_rd::types::{
    CrisisProtocol, EmotionLabel, PatternType, SentimentLabel, Severity, StatedSentiment,
    Utterance, VocalAffect,
};
use vigil_rd::RiskEngine;

pub const TAXONOMY_TOML: &str = r#"
version = "test-v1"

[[patterns]]
pattern_id = "en-min-fine"
phrases = ["I'm fine", "I am fine"]
language = "en"
type = "minimization"
severity = "low"

[[patterns]]
pattern_id = "en-hopeless"
phrases = ["no point anymore"]
language = "en"
type = "hopelessness"
severity = "high"

[[patterns]]
pattern_id = "sw-si"
phrases = ["nataka kufa"]
language = "sw"
type = "suicidal_ideation"
severity = "critical"
crisis_protocol = { action = "contact_on_call_counselor", resources = ["116"] }
"#;

fn entry(
    id: &str,
    phrases: &[&str],
    language: &str,
    pattern_type: PatternType,
    severity: Severity,
) -> PatternTaxonomyEntry {
    PatternTaxonomyEntry {
        pattern_id: id.to_string(),
        phrases: phrases.iter().map(|p| p.to_string()).collect(),
        language: language.to_string(),
        pattern_type,
        severity,
        crisis_protocol: None,
    }
}

/// Same content as [`TAXONOMY_TOML`]
pub fn test_snapshot() -> TaxonomySnapshot {
    let mut critical = entry(
        "sw-si",
        &["nataka kufa"],
        "sw",
        PatternType::SuicidalIdeation,
        Severity::Critical,
    );
    critical.crisis_protocol = Some(CrisisProtocol {
        action: "contact_on_call_counselor".to_string(),
        resources: vec!["116".to_string()],
        guidance: None,
    });

    TaxonomySnapshot::from_entries(
        "test-v1",
        vec![
            entry("en-min-fine", &["I'm fine", "I am fine"], "en", PatternType::Minimization, Severity::Low),
            entry("en-hopeless", &["no point anymore"], "en", PatternType::Hopelessness, Severity::High),
            critical,
        ],
    )
    .expect("valid test taxonomy")
}

/// Alert sink that records every delivered event
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<CrisisEvent>>,
}

impl RecordingSink {
    pub fn delivered(&self) -> Vec<CrisisEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, event: &CrisisEvent) -> Result<(), AlertError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Alert sink that always fails
pub struct FailingSink;

#[async_trait]
impl AlertSink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    async fn deliver(&self, _event: &CrisisEvent) -> Result<(), AlertError> {
        Err(AlertError::Delivery("notification service unavailable".to_string()))
    }
}

/// Embedder that never answers in time
pub struct SlowEmbedder;

#[async_trait]
impl Embedder for SlowEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ContextError> {
        tokio::time::sleep(StdDuration::from_secs(5)).await;
        Ok(vec![1.0, 0.0])
    }
}

/// Config with fast alert retries
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.alert.initial_backoff_ms = 1;
    config.alert.max_backoff_ms = 4;
    config.alert.max_attempts = 3;
    config
}

pub struct TestEngine {
    pub engine: Arc<RiskEngine>,
    pub event_bus: EventBus,
    pub cancel: CancellationToken,
    pub dispatcher_task: Option<JoinHandle<()>>,
}

impl TestEngine {
    /// Stop the alert dispatcher and wait for its worker to exit
    pub async fn stop_dispatcher(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.dispatcher_task.take() {
            task.await.expect("dispatcher worker panicked");
        }
    }
}

impl Drop for TestEngine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Engine with the test taxonomy, no context retrieval and `sink`
pub fn build_engine(config: EngineConfig, sink: Arc<dyn AlertSink>) -> TestEngine {
    let store = Arc::new(TaxonomyStore::new(test_snapshot(), None));
    build_engine_with(config, sink, store, None)
}

pub fn build_engine_with(
    config: EngineConfig,
    sink: Arc<dyn AlertSink>,
    taxonomy: Arc<TaxonomyStore>,
    context: Option<ContextRetriever>,
) -> TestEngine {
    let event_bus = EventBus::new(256);
    let cancel = CancellationToken::new();
    let (dispatcher, dispatcher_task) = AlertDispatcher::spawn(
        sink,
        DispatcherSettings::from_config(&config.alert),
        event_bus.clone(),
        cancel.clone(),
    );
    let engine = Arc::new(RiskEngine::new(config, taxonomy, context, dispatcher, event_bus.clone()));
    TestEngine {
        engine,
        event_bus,
        cancel,
        dispatcher_task: Some(dispatcher_task),
    }
}

/// Retriever whose embedder always exceeds a 50 ms timeout
pub fn timing_out_retriever() -> ContextRetriever {
    let index = InMemoryVectorIndex::new(vec![vigil_rd::context::ContextEntry {
        entry_id: "family-duty".to_string(),
        category: "family_pressure".to_string(),
        cultural_significance: None,
        severity: Severity::Medium,
        guidance: "Acknowledge obligations first".to_string(),
        embedding: vec![1.0, 0.0],
    }])
    .expect("valid index");
    ContextRetriever::new(
        Arc::new(SlowEmbedder),
        Arc::new(index),
        3,
        0.3,
        StdDuration::from_millis(50),
    )
}

/// Builder for upstream payloads
#[derive(Clone)]
pub struct PayloadBuilder {
    pub user_id: String,
    pub session_id: String,
    pub base: DateTime<Utc>,
}

impl PayloadBuilder {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            session_id: "session-1".to_string(),
            base: Utc::now(),
        }
    }

    /// Utterance `seq`, spoken `seq * 10` seconds after the base time
    pub fn utterance(
        &self,
        seq: u64,
        text: &str,
        stated: SentimentLabel,
        vocal: EmotionLabel,
    ) -> UpstreamPayload {
        self.utterance_at(seq, self.base + Duration::seconds(seq as i64 * 10), text, stated, vocal)
    }

    pub fn utterance_at(
        &self,
        seq: u64,
        timestamp: DateTime<Utc>,
        text: &str,
        stated: SentimentLabel,
        vocal: EmotionLabel,
    ) -> UpstreamPayload {
        UpstreamPayload {
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
            sequence_no: seq,
            timestamp,
            text: Some(text.to_string()),
            language: Some("en".to_string()),
            stated_sentiment: StatedSentiment {
                label: stated,
                confidence: 0.9,
            },
            vocal_affect: VocalAffect {
                vector: vec![0.2, 0.1, 0.3, 0.2],
                label: vocal,
                confidence: 0.85,
            },
        }
    }

    /// Normalize `payload` as if the engine accepted it at `received_at`
    pub fn received(&self, payload: UpstreamPayload, received_at: DateTime<Utc>) -> Utterance {
        FeatureIngestAdapter::default()
            .normalize(payload, received_at)
            .expect("valid test payload")
    }

    /// "I'm fine" said positively in a sad voice
    pub fn minimizing(&self, seq: u64) -> UpstreamPayload {
        self.utterance(seq, "I'm fine", SentimentLabel::Positive, EmotionLabel::Sad)
    }

    /// Neutral small talk in a neutral voice
    pub fn quiet(&self, seq: u64) -> UpstreamPayload {
        self.utterance(seq, "we went to the market today", SentimentLabel::Neutral, EmotionLabel::Neutral)
    }

    /// Swahili suicidal disclosure inside an English-tagged session
    pub fn critical(&self, seq: u64) -> UpstreamPayload {
        self.utterance(seq, "nataka kufa", SentimentLabel::Negative, EmotionLabel::Distressed)
    }
}

/// Poll `check` until it returns true or `timeout` elapses
pub async fn wait_until<F: Fn() -> bool>(timeout: StdDuration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    check()
}

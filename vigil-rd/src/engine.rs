//! Risk engine
//!
//! Orchestrates one assessment per utterance:
//!
//! 1. Validate the payload (ingest adapter)
//! 2. Pin the active taxonomy snapshot
//! 3. Pattern matching + dissonance in parallel with context retrieval
//! 4. Under the user's lock: re-check the sequence, update the baseline,
//!    advance the crisis state machine, commit the assessment
//! 5. Publish events and hand escalations to the alert dispatcher
//!
//! Only steps 4's state mutations are serialized per user; everything else
//! runs concurrently across users.
//!
//! Crisis timing (sustained window, safety timeout, quiet period) runs on the
//! engine clock: utterances enter the state machine at `received_at`, the
//! sweeper and acknowledgements use `time::now()`. The upstream timestamp is
//! recorded on the assessment but never drives a transition.

use crate::alert::{
    AlertDispatcher, AlertError, AlertSink, CrisisEvent, DeadLetter, DispatcherSettings,
    LogAlertSink, WebhookAlertSink,
};
use crate::baseline::BaselineTracker;
use crate::config::EngineConfig;
use crate::context::{ContextError, ContextOutcome, ContextRetriever, HttpEmbedder, InMemoryVectorIndex};
use crate::dissonance::DissonanceScorer;
use crate::ingest::{FeatureIngestAdapter, IngestError, UpstreamPayload};
use crate::patterns::{PatternMatcher, TaxonomyError, TaxonomySnapshot, TaxonomyStore};
use crate::registry::UserRegistry;
use crate::risk::{RiskAggregator, StateTransition};
use crate::types::{ReasonEntry, ReasonKind, RiskAssessment, Utterance};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vigil_common::{time, CrisisState, EventBus, VigilEvent};

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Taxonomy(#[from] TaxonomyError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Alert(#[from] AlertError),

    #[error("Unknown user: {0}")]
    UnknownUser(String),
}

/// Read-only view of one user's crisis session
#[derive(Debug, Clone, Serialize)]
pub struct CrisisSummary {
    pub user_id: String,
    pub state: CrisisState,
    pub entered_at: Option<DateTime<Utc>>,
    pub escalated_at: Option<DateTime<Utc>>,
    pub last_elevated_at: Option<DateTime<Utc>>,
    pub baseline_observations: u64,
    pub baseline_generation: u64,
    pub last_active: Option<DateTime<Utc>>,
}

/// Detection core
pub struct RiskEngine {
    config: EngineConfig,
    ingest: FeatureIngestAdapter,
    taxonomy: Arc<TaxonomyStore>,
    matcher: PatternMatcher,
    context: Option<ContextRetriever>,
    dissonance: DissonanceScorer,
    baseline: BaselineTracker,
    aggregator: RiskAggregator,
    registry: UserRegistry,
    dispatcher: AlertDispatcher,
    event_bus: EventBus,
}

impl RiskEngine {
    /// Assemble an engine from prepared collaborators
    pub fn new(
        config: EngineConfig,
        taxonomy: Arc<TaxonomyStore>,
        context: Option<ContextRetriever>,
        dispatcher: AlertDispatcher,
        event_bus: EventBus,
    ) -> Self {
        Self {
            ingest: FeatureIngestAdapter::new(config.ingest.expected_vector_dim),
            matcher: PatternMatcher::new(config.patterns.fuzzy_threshold),
            dissonance: DissonanceScorer::new(
                config.dissonance.confidence_floor,
                config.dissonance.direction_epsilon,
            ),
            baseline: BaselineTracker::new(config.baseline.clone()),
            aggregator: RiskAggregator::new(config.risk.clone()),
            registry: UserRegistry::new(),
            config,
            taxonomy,
            context,
            dispatcher,
            event_bus,
        }
    }

    /// Build every collaborator from configuration and start the dispatcher
    ///
    /// # Returns
    /// The engine and the dispatcher worker handle
    ///
    /// # Errors
    /// Initial taxonomy load failure, unreadable context index, or HTTP client
    /// construction failure
    pub fn from_config(
        config: EngineConfig,
        event_bus: EventBus,
        cancel: CancellationToken,
    ) -> Result<(Arc<Self>, JoinHandle<()>), EngineError> {
        let taxonomy = match &config.patterns.taxonomy_path {
            Some(path) => TaxonomyStore::open(path)?,
            None => {
                warn!("No pattern taxonomy configured; pattern matching disabled until reload");
                TaxonomyStore::new(TaxonomySnapshot::empty(), None)
            }
        };

        let context = match (&config.context.index_path, &config.context.embedder_url) {
            (Some(index_path), Some(url)) => {
                let index = InMemoryVectorIndex::load(index_path)?;
                info!(
                    entries = index.len(),
                    dimension = index.dimension(),
                    "Context index loaded from {}",
                    index_path.display()
                );
                let embedder = HttpEmbedder::new(url.clone(), config.context.timeout())?;
                Some(ContextRetriever::new(
                    Arc::new(embedder),
                    Arc::new(index),
                    config.context.top_k,
                    config.context.relevance_floor,
                    config.context.timeout(),
                ))
            }
            (None, None) => {
                info!("Context retrieval disabled");
                None
            }
            _ => {
                warn!("Context retrieval needs both context.index_path and context.embedder_url; disabled");
                None
            }
        };

        let sink: Arc<dyn AlertSink> = match &config.alert.webhook_url {
            Some(url) => Arc::new(WebhookAlertSink::new(
                url.clone(),
                time::millis_to_duration(config.alert.request_timeout_ms),
            )?),
            None => {
                warn!("No alert webhook configured; crisis events will be logged only");
                Arc::new(LogAlertSink)
            }
        };

        let (dispatcher, dispatcher_task) = AlertDispatcher::spawn(
            sink,
            DispatcherSettings::from_config(&config.alert),
            event_bus.clone(),
            cancel,
        );

        let engine = Arc::new(Self::new(
            config,
            Arc::new(taxonomy),
            context,
            dispatcher,
            event_bus,
        ));
        Ok((engine, dispatcher_task))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Assess one upstream payload
    ///
    /// # Errors
    /// `Ingest` for malformed, duplicate or out-of-order events; such events
    /// change no state.
    pub async fn assess(&self, payload: UpstreamPayload) -> Result<RiskAssessment, EngineError> {
        let received_at = time::now();
        let (user_id, session_id, sequence_no) = (
            payload.user_id.clone(),
            payload.session_id.clone(),
            payload.sequence_no,
        );

        let utterance = match self.ingest.normalize(payload, received_at) {
            Ok(utterance) => utterance,
            Err(e) => {
                self.reject(&user_id, &session_id, sequence_no, &e);
                return Err(e.into());
            }
        };

        self.assess_utterance(utterance).await
    }

    /// Assess an already-normalized utterance
    pub async fn assess_utterance(&self, utterance: Utterance) -> Result<RiskAssessment, EngineError> {
        // Cheap early rejection; authoritative check happens under the lock
        if let Some(handle) = self.registry.get(&utterance.user_id).await {
            if let Ok(state) = handle.try_lock() {
                if let Err(e) =
                    FeatureIngestAdapter::check_sequence(state.last_applied(&utterance.session_id), &utterance)
                {
                    drop(state);
                    return Err(self.reject_utterance(&utterance, e));
                }
            }
        }

        let snapshot = self.taxonomy.snapshot();

        let analysis = async {
            let matches = self.matcher.match_text(
                &snapshot,
                &utterance.text,
                utterance.language.as_deref(),
            );
            let dissonance = self
                .dissonance
                .score(&utterance.stated_sentiment, &utterance.vocal_affect);
            (matches, dissonance)
        };
        let context = async {
            match &self.context {
                Some(retriever) => retriever.retrieve(&utterance.text).await,
                None => ContextOutcome::default(),
            }
        };
        let ((matches, dissonance), context) = tokio::join!(analysis, context);

        let handle = self.registry.get_or_create(&utterance.user_id).await;
        let mut state = handle.lock().await;

        if let Err(e) =
            FeatureIngestAdapter::check_sequence(state.last_applied(&utterance.session_id), &utterance)
        {
            drop(state);
            return Err(self.reject_utterance(&utterance, e));
        }
        if let Some(expected) = state.baseline.dimension() {
            if expected != utterance.vocal_affect.vector.len() {
                drop(state);
                let e = IngestError::MalformedPayload(format!(
                    "vocal_affect.vector has {} features, baseline has {}",
                    utterance.vocal_affect.vector.len(),
                    expected
                ));
                return Err(self.reject_utterance(&utterance, e));
            }
        }

        let deviation = match self
            .baseline
            .observe(&mut state.baseline, &utterance.vocal_affect.vector)
        {
            Ok(deviation) => deviation,
            Err(e) => {
                drop(state);
                let e = IngestError::MalformedPayload(e.to_string());
                return Err(self.reject_utterance(&utterance, e));
            }
        };

        let decision = self.aggregator.assess(
            &mut state.crisis,
            &matches,
            &dissonance,
            &deviation,
            utterance.received_at,
        );

        let mut reason_trace = decision.breakdown.reasons;
        for entry in &context.entries {
            reason_trace.push(ReasonEntry::new(
                ReasonKind::Context,
                format!(
                    "context {} ({}, {:?}) similarity {:.2}: {}",
                    entry.entry_id, entry.category, entry.severity, entry.similarity, entry.guidance
                ),
            ));
        }
        if let Some(reason) = &context.degraded {
            reason_trace.push(ReasonEntry::new(
                ReasonKind::ContextDegraded,
                format!("context unavailable: {}", reason),
            ));
        }

        let assessment = RiskAssessment {
            assessment_id: Uuid::new_v4(),
            user_id: utterance.user_id.clone(),
            session_id: utterance.session_id.clone(),
            sequence_no: utterance.sequence_no,
            utterance_timestamp: utterance.timestamp,
            received_at: utterance.received_at,
            risk_level: decision.breakdown.risk_level,
            score: decision.breakdown.score,
            pattern_matches: matches,
            dissonance,
            baseline_deviation: deviation,
            context: context.entries,
            context_degraded: context.degraded.is_some(),
            crisis_state: state.crisis.state,
            escalation_required: decision.escalation_required,
            low_confidence: decision.breakdown.low_confidence,
            reason_trace,
            taxonomy_version: snapshot.version().to_string(),
            assessed_at: time::now(),
        };

        state.commit(
            assessment.clone(),
            self.config.risk.history_limit,
            self.config.ingest.session_cursor_limit,
        );
        drop(state);

        info!(
            user_id = %assessment.user_id,
            session_id = %assessment.session_id,
            sequence_no = assessment.sequence_no,
            risk_level = %assessment.risk_level,
            score = assessment.score,
            crisis_state = %assessment.crisis_state,
            escalation_required = assessment.escalation_required,
            patterns = assessment.pattern_matches.len(),
            elapsed_ms = time::elapsed_ms(utterance.received_at, time::now()),
            "Utterance assessed"
        );

        self.publish_transition(&assessment.user_id, &decision.tick);
        self.publish_transition(&assessment.user_id, &decision.transition);
        self.event_bus.emit_lossy(VigilEvent::AssessmentCompleted {
            assessment_id: assessment.assessment_id,
            user_id: assessment.user_id.clone(),
            session_id: assessment.session_id.clone(),
            sequence_no: assessment.sequence_no,
            risk_level: assessment.risk_level,
            score: assessment.score,
            escalation_required: assessment.escalation_required,
            timestamp: assessment.assessed_at,
        });

        if assessment.escalation_required {
            self.escalate(&assessment, utterance.received_at);
        }

        Ok(assessment)
    }

    /// Current crisis session of a known user
    pub async fn crisis_summary(&self, user_id: &str) -> Result<CrisisSummary, EngineError> {
        let handle = self
            .registry
            .get(user_id)
            .await
            .ok_or_else(|| EngineError::UnknownUser(user_id.to_string()))?;
        let state = handle.lock().await;
        Ok(CrisisSummary {
            user_id: state.user_id.clone(),
            state: state.crisis.state,
            entered_at: state.crisis.entered_at,
            escalated_at: state.crisis.escalated_at,
            last_elevated_at: state.crisis.last_elevated_at,
            baseline_observations: state.baseline.observations(),
            baseline_generation: state.baseline.generation(),
            last_active: state.last_active,
        })
    }

    /// Up to `limit` recent assessments, newest first
    pub async fn history(&self, user_id: &str, limit: usize) -> Result<Vec<RiskAssessment>, EngineError> {
        let handle = self
            .registry
            .get(user_id)
            .await
            .ok_or_else(|| EngineError::UnknownUser(user_id.to_string()))?;
        let state = handle.lock().await;
        Ok(state.recent(limit))
    }

    /// Operator acknowledgement of an escalation
    pub async fn acknowledge(&self, user_id: &str) -> Result<StateTransition, EngineError> {
        let handle = self
            .registry
            .get(user_id)
            .await
            .ok_or_else(|| EngineError::UnknownUser(user_id.to_string()))?;
        let transition = {
            let mut state = handle.lock().await;
            self.aggregator.acknowledge(&mut state.crisis, time::now())
        };

        if transition.changed() {
            info!(user_id, "Escalation acknowledged");
        } else {
            debug!(user_id, state = %transition.old_state, "Acknowledge ignored outside Escalated");
        }
        self.publish_transition(user_id, &transition);
        Ok(transition)
    }

    /// Discard a user's baseline; the next observations start a cold baseline
    ///
    /// # Returns
    /// The new baseline generation
    pub async fn reset_baseline(&self, user_id: &str) -> Result<u64, EngineError> {
        let handle = self
            .registry
            .get(user_id)
            .await
            .ok_or_else(|| EngineError::UnknownUser(user_id.to_string()))?;
        let generation = {
            let mut state = handle.lock().await;
            state.baseline = self.baseline.reset(&state.baseline);
            state.baseline.generation()
        };

        info!(user_id, generation, "Baseline reset");
        self.event_bus.emit_lossy(VigilEvent::BaselineReset {
            user_id: user_id.to_string(),
            generation,
            timestamp: time::now(),
        });
        Ok(generation)
    }

    /// Active taxonomy snapshot
    pub fn taxonomy(&self) -> Arc<TaxonomySnapshot> {
        self.taxonomy.snapshot()
    }

    /// Re-read the taxonomy source; the previous snapshot stays active on failure
    pub async fn reload_taxonomy(&self) -> Result<Arc<TaxonomySnapshot>, EngineError> {
        let store = Arc::clone(&self.taxonomy);
        let result = match tokio::task::spawn_blocking(move || store.reload()).await {
            Ok(result) => result,
            Err(join_err) => Err(TaxonomyError::Invalid(format!("reload task failed: {}", join_err))),
        };

        match result {
            Ok(snapshot) => {
                self.event_bus.emit_lossy(VigilEvent::TaxonomyReloaded {
                    version: snapshot.version().to_string(),
                    entry_count: snapshot.len(),
                    timestamp: time::now(),
                });
                Ok(snapshot)
            }
            Err(e) => {
                self.event_bus.emit_lossy(VigilEvent::TaxonomyReloadFailed {
                    active_version: self.taxonomy.snapshot().version().to_string(),
                    error: e.to_string(),
                    timestamp: time::now(),
                });
                Err(e.into())
            }
        }
    }

    /// Crisis events that exhausted their delivery retries
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dispatcher.dead_letters()
    }

    /// Name of the configured notification sink
    pub fn alert_sink(&self) -> &str {
        self.dispatcher.sink_name()
    }

    pub async fn user_count(&self) -> usize {
        self.registry.len().await
    }

    /// Apply timeouts to every user as of `now`
    ///
    /// # Returns
    /// Number of sessions that changed state
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut changed = 0;
        for handle in self.registry.handles().await {
            let (user_id, transition) = {
                let mut state = handle.lock().await;
                let transition = self.aggregator.tick(&mut state.crisis, now);
                (state.user_id.clone(), transition)
            };
            if transition.changed() {
                changed += 1;
                info!(
                    user_id = %user_id,
                    old_state = %transition.old_state,
                    new_state = %transition.new_state,
                    cause = transition.cause.as_str(),
                    "Crisis state timed out"
                );
                self.publish_transition(&user_id, &transition);
            }
        }
        changed
    }

    /// Run [`sweep`](Self::sweep) on an interval until `cancel` fires
    pub fn spawn_maintenance(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Crisis timeout sweeper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let changed = engine.sweep(time::now()).await;
                        if changed > 0 {
                            debug!(changed, "Crisis timeout sweep applied");
                        }
                    }
                }
            }
        })
    }

    fn escalate(&self, assessment: &RiskAssessment, ingested_at: DateTime<Utc>) {
        let event = CrisisEvent::from_assessment(assessment, ingested_at);
        let event_id = event.event_id;

        self.event_bus.emit_lossy(VigilEvent::EscalationRaised {
            event_id,
            assessment_id: assessment.assessment_id,
            user_id: assessment.user_id.clone(),
            risk_level: assessment.risk_level,
            timestamp: time::now(),
        });

        // Dispatch failures are logged by the dispatcher; the assessment stands
        if let Err(e) = self.dispatcher.dispatch(event) {
            error!(
                %event_id,
                user_id = %assessment.user_id,
                error = %e,
                "Crisis event could not be queued; kept as dead letter"
            );
        }
    }

    fn publish_transition(&self, user_id: &str, transition: &StateTransition) {
        if !transition.changed() {
            return;
        }
        self.event_bus.emit_lossy(VigilEvent::CrisisStateChanged {
            user_id: user_id.to_string(),
            old_state: transition.old_state,
            new_state: transition.new_state,
            cause: transition.cause.as_str().to_string(),
            timestamp: transition.at,
        });
    }

    fn reject_utterance(&self, utterance: &Utterance, error: IngestError) -> EngineError {
        self.reject(&utterance.user_id, &utterance.session_id, utterance.sequence_no, &error);
        error.into()
    }

    fn reject(&self, user_id: &str, session_id: &str, sequence_no: u64, error: &IngestError) {
        warn!(
            user_id,
            session_id,
            sequence_no,
            reason = error.reason(),
            error = %error,
            "Upstream event rejected"
        );
        self.event_bus.emit_lossy(VigilEvent::EventRejected {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            sequence_no,
            reason: error.reason().to_string(),
            timestamp: time::now(),
        });
    }
}

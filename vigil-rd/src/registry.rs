//! Per-user state registry
//!
//! Each user's mutable state (session cursors, baseline, crisis session and
//! recent assessments) sits behind its own async mutex, so utterances for one
//! user are applied serially while different users proceed in parallel.

use crate::baseline::UserBaseline;
use crate::risk::CrisisSession;
use crate::types::RiskAssessment;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Ordering cursor of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCursor {
    pub last_applied: u64,
    /// Engine time of the last applied utterance
    pub last_seen: DateTime<Utc>,
}

/// Everything the core remembers about one user
#[derive(Debug)]
pub struct UserState {
    pub user_id: String,
    /// Ordering cursor per session, bounded by the session cursor limit
    pub sessions: HashMap<String, SessionCursor>,
    pub baseline: UserBaseline,
    pub crisis: CrisisSession,
    /// Most recent assessments, oldest first
    pub history: VecDeque<RiskAssessment>,
    pub last_active: Option<DateTime<Utc>>,
}

impl UserState {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            sessions: HashMap::new(),
            baseline: UserBaseline::new(0),
            crisis: CrisisSession::new(),
            history: VecDeque::new(),
            last_active: None,
        }
    }

    pub fn last_applied(&self, session_id: &str) -> Option<u64> {
        self.sessions.get(session_id).map(|c| c.last_applied)
    }

    /// Advance the session cursor and record the assessment
    ///
    /// When more than `session_limit` cursors exist, the least recently seen
    /// session is forgotten; its next event starts a fresh cursor.
    pub fn commit(&mut self, assessment: RiskAssessment, history_limit: usize, session_limit: usize) {
        self.sessions.insert(
            assessment.session_id.clone(),
            SessionCursor {
                last_applied: assessment.sequence_no,
                last_seen: assessment.received_at,
            },
        );
        while self.sessions.len() > session_limit.max(1) {
            let oldest = self
                .sessions
                .iter()
                .filter(|(id, _)| **id != assessment.session_id)
                .min_by_key(|(_, cursor)| cursor.last_seen)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    debug!(user_id = %self.user_id, session_id = %id, "Idle session cursor evicted");
                    self.sessions.remove(&id);
                }
                None => break,
            }
        }
        self.last_active = Some(assessment.received_at);
        while self.history.len() >= history_limit.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(assessment);
    }

    /// Up to `limit` most recent assessments, newest first
    pub fn recent(&self, limit: usize) -> Vec<RiskAssessment> {
        self.history.iter().rev().take(limit).cloned().collect()
    }
}

/// Shared handle to one user's state
pub type UserHandle = Arc<Mutex<UserState>>;

/// Map of user id → state, created on first use
#[derive(Debug, Default)]
pub struct UserRegistry {
    users: RwLock<HashMap<String, UserHandle>>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing handle, if the user has been seen
    pub async fn get(&self, user_id: &str) -> Option<UserHandle> {
        self.users.read().await.get(user_id).cloned()
    }

    /// Handle for `user_id`, creating fresh state on first use
    pub async fn get_or_create(&self, user_id: &str) -> UserHandle {
        if let Some(handle) = self.get(user_id).await {
            return handle;
        }
        let mut users = self.users.write().await;
        users
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(UserState::new(user_id))))
            .clone()
    }

    /// All handles (for the timeout sweeper)
    pub async fn handles(&self) -> Vec<UserHandle> {
        self.users.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_returns_same_handle() {
        let registry = UserRegistry::new();
        assert!(registry.get("u1").await.is_none());

        let a = registry.get_or_create("u1").await;
        let b = registry.get_or_create("u1").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_creation_yields_one_entry() {
        let registry = Arc::new(UserRegistry::new());
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move { registry.get_or_create("shared").await }));
        }
        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }
        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(registry.len().await, 1);
    }

    #[test]
    fn test_new_user_state_is_cold_and_normal() {
        let state = UserState::new("u1");
        assert_eq!(state.baseline.observations(), 0);
        assert_eq!(state.crisis.state, vigil_common::CrisisState::Normal);
        assert!(state.last_applied("s1").is_none());
    }

    fn assessment(session_id: &str, sequence_no: u64, at_secs: i64) -> RiskAssessment {
        use crate::types::{BaselineDeviation, DissonanceDirection, DissonanceScore};
        use chrono::TimeZone;

        let at = Utc.timestamp_opt(1_700_000_000 + at_secs, 0).unwrap();
        RiskAssessment {
            assessment_id: uuid::Uuid::new_v4(),
            user_id: "u1".to_string(),
            session_id: session_id.to_string(),
            sequence_no,
            utterance_timestamp: at,
            received_at: at,
            risk_level: vigil_common::RiskLevel::Low,
            score: 0.1,
            pattern_matches: Vec::new(),
            dissonance: DissonanceScore {
                gap_magnitude: 0.0,
                direction: DissonanceDirection::Aligned,
                confidence: 1.0,
                low_confidence: false,
            },
            baseline_deviation: BaselineDeviation {
                z_score: 0.0,
                normalized: 0.0,
                low_confidence: false,
                observations: sequence_no,
                generation: 0,
            },
            context: Vec::new(),
            context_degraded: false,
            crisis_state: vigil_common::CrisisState::Normal,
            escalation_required: false,
            low_confidence: false,
            reason_trace: Vec::new(),
            taxonomy_version: "v1".to_string(),
            assessed_at: at,
        }
    }

    #[test]
    fn test_idle_session_cursors_are_evicted() {
        let mut state = UserState::new("u1");
        state.commit(assessment("morning", 4, 0), 10, 2);
        state.commit(assessment("noon", 1, 100), 10, 2);
        state.commit(assessment("morning", 5, 200), 10, 2);
        state.commit(assessment("evening", 1, 300), 10, 2);

        assert_eq!(state.sessions.len(), 2);
        assert!(state.last_applied("noon").is_none());
        assert_eq!(state.last_applied("morning"), Some(5));
        assert_eq!(state.last_applied("evening"), Some(1));
    }

    #[test]
    fn test_history_is_bounded_newest_first() {
        let mut state = UserState::new("u1");
        for seq in 1..=5 {
            state.commit(assessment("s1", seq, seq as i64), 3, 8);
        }
        let recent: Vec<u64> = state.recent(10).iter().map(|a| a.sequence_no).collect();
        assert_eq!(recent, vec![5, 4, 3]);
    }
}

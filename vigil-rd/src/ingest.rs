//! Feature Ingest Adapter
//!
//! Normalizes the upstream speech/emotion payload into an `Utterance` and
//! enforces per-session sequence ordering. This is the single enforcement
//! point for ordering: everything downstream assumes serial, in-order
//! application per user.
//!
//! The adapter itself is side-effect free. Session cursors live in the user
//! registry and only advance when an assessment is committed.

use crate::types::{StatedSentiment, Utterance, VocalAffect};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ingest errors
///
/// All three drop the event: no risk is computed and no state changes.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IngestError {
    /// Sequence gap: an earlier event has not been applied yet
    #[error("Out-of-order event for {user_id}/{session_id}: expected sequence {expected}, got {received}")]
    OutOfOrderEvent {
        user_id: String,
        session_id: String,
        expected: u64,
        received: u64,
    },

    /// Sequence number already applied (late or resubmitted)
    #[error("Duplicate event for {user_id}/{session_id}: sequence {received} already applied (last {last_applied})")]
    DuplicateEvent {
        user_id: String,
        session_id: String,
        last_applied: u64,
        received: u64,
    },

    /// Payload failed structural validation
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

impl IngestError {
    /// Short machine-readable reason
    pub fn reason(&self) -> &'static str {
        match self {
            IngestError::OutOfOrderEvent { .. } => "out_of_order",
            IngestError::DuplicateEvent { .. } => "duplicate",
            IngestError::MalformedPayload(_) => "malformed",
        }
    }
}

/// Per-utterance event as delivered by the speech/emotion collaborator
///
/// Label fields are closed enums, so unknown categories are rejected during
/// deserialization; numeric ranges are checked by [`FeatureIngestAdapter::normalize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamPayload {
    pub user_id: String,
    pub session_id: String,
    pub sequence_no: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    pub stated_sentiment: StatedSentiment,
    pub vocal_affect: VocalAffect,
}

/// Validates payloads and sequence numbers
#[derive(Debug, Clone, Default)]
pub struct FeatureIngestAdapter {
    expected_vector_dim: Option<usize>,
}

impl FeatureIngestAdapter {
    pub fn new(expected_vector_dim: Option<usize>) -> Self {
        Self {
            expected_vector_dim,
        }
    }

    /// Validate a payload and produce the normalized utterance
    ///
    /// # Errors
    /// `MalformedPayload` for blank identifiers, confidences outside [0, 1],
    /// empty or non-finite feature vectors, or an unexpected vector dimension.
    pub fn normalize(
        &self,
        payload: UpstreamPayload,
        received_at: DateTime<Utc>,
    ) -> Result<Utterance, IngestError> {
        let user_id = payload.user_id.trim().to_string();
        let session_id = payload.session_id.trim().to_string();
        if user_id.is_empty() {
            return Err(IngestError::MalformedPayload("user_id is empty".to_string()));
        }
        if session_id.is_empty() {
            return Err(IngestError::MalformedPayload("session_id is empty".to_string()));
        }

        check_confidence("stated_sentiment.confidence", payload.stated_sentiment.confidence)?;
        check_confidence("vocal_affect.confidence", payload.vocal_affect.confidence)?;

        let vector = &payload.vocal_affect.vector;
        if vector.is_empty() {
            return Err(IngestError::MalformedPayload(
                "vocal_affect.vector is empty".to_string(),
            ));
        }
        if let Some(index) = vector.iter().position(|v| !v.is_finite()) {
            return Err(IngestError::MalformedPayload(format!(
                "vocal_affect.vector[{}] is not finite",
                index
            )));
        }
        if let Some(expected) = self.expected_vector_dim {
            if vector.len() != expected {
                return Err(IngestError::MalformedPayload(format!(
                    "vocal_affect.vector has {} features, expected {}",
                    vector.len(),
                    expected
                )));
            }
        }

        let text = payload
            .text
            .map(|t| t.trim().to_string())
            .unwrap_or_default();
        let language = payload
            .language
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty());

        Ok(Utterance {
            user_id,
            session_id,
            sequence_no: payload.sequence_no,
            timestamp: payload.timestamp,
            text,
            language,
            stated_sentiment: payload.stated_sentiment,
            vocal_affect: VocalAffect {
                vector: payload.vocal_affect.vector,
                label: payload.vocal_affect.label,
                confidence: payload.vocal_affect.confidence,
            },
            received_at,
        })
    }

    /// Check an utterance against its session cursor (last applied sequence)
    ///
    /// The first event of an unknown session establishes the cursor.
    pub fn check_sequence(last_applied: Option<u64>, utterance: &Utterance) -> Result<(), IngestError> {
        let Some(last) = last_applied else {
            return Ok(());
        };

        let received = utterance.sequence_no;
        if received <= last {
            return Err(IngestError::DuplicateEvent {
                user_id: utterance.user_id.clone(),
                session_id: utterance.session_id.clone(),
                last_applied: last,
                received,
            });
        }

        let expected = last.saturating_add(1);
        if received > expected {
            return Err(IngestError::OutOfOrderEvent {
                user_id: utterance.user_id.clone(),
                session_id: utterance.session_id.clone(),
                expected,
                received,
            });
        }

        Ok(())
    }
}

fn check_confidence(field: &str, value: f64) -> Result<(), IngestError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(IngestError::MalformedPayload(format!(
            "{} must be within [0, 1], got {}",
            field, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EmotionLabel, SentimentLabel};

    fn payload(seq: u64) -> UpstreamPayload {
        UpstreamPayload {
            user_id: "user-1".to_string(),
            session_id: "session-a".to_string(),
            sequence_no: seq,
            timestamp: Utc::now(),
            text: Some("  I'm fine  ".to_string()),
            language: Some(" EN ".to_string()),
            stated_sentiment: StatedSentiment {
                label: SentimentLabel::Positive,
                confidence: 0.9,
            },
            vocal_affect: VocalAffect {
                vector: vec![0.1, -0.2, 0.3],
                label: EmotionLabel::Sad,
                confidence: 0.8,
            },
        }
    }

    #[test]
    fn test_normalize_trims_text_and_language() {
        let adapter = FeatureIngestAdapter::default();
        let utterance = adapter.normalize(payload(1), Utc::now()).unwrap();
        assert_eq!(utterance.text, "I'm fine");
        assert_eq!(utterance.language.as_deref(), Some("en"));
        assert_eq!(utterance.sequence_no, 1);
    }

    #[test]
    fn test_missing_text_becomes_empty() {
        let adapter = FeatureIngestAdapter::default();
        let mut p = payload(1);
        p.text = None;
        let utterance = adapter.normalize(p, Utc::now()).unwrap();
        assert!(utterance.text.is_empty());
    }

    #[test]
    fn test_malformed_payloads_rejected() {
        let adapter = FeatureIngestAdapter::new(Some(3));

        let mut blank_user = payload(1);
        blank_user.user_id = "   ".to_string();
        assert!(matches!(
            adapter.normalize(blank_user, Utc::now()),
            Err(IngestError::MalformedPayload(_))
        ));

        let mut bad_conf = payload(1);
        bad_conf.stated_sentiment.confidence = 1.5;
        assert!(matches!(
            adapter.normalize(bad_conf, Utc::now()),
            Err(IngestError::MalformedPayload(_))
        ));

        let mut nan_vector = payload(1);
        nan_vector.vocal_affect.vector = vec![0.0, f64::NAN, 0.0];
        assert!(matches!(
            adapter.normalize(nan_vector, Utc::now()),
            Err(IngestError::MalformedPayload(_))
        ));

        let mut wrong_dim = payload(1);
        wrong_dim.vocal_affect.vector = vec![0.0, 1.0];
        assert!(matches!(
            adapter.normalize(wrong_dim, Utc::now()),
            Err(IngestError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_unknown_label_rejected_by_serde() {
        let json = serde_json::json!({
            "user_id": "u",
            "session_id": "s",
            "sequence_no": 1,
            "timestamp": "2024-05-01T10:00:00Z",
            "stated_sentiment": { "label": "ecstatic", "confidence": 0.9 },
            "vocal_affect": { "vector": [0.1], "label": "sad", "confidence": 0.8 }
        });
        assert!(serde_json::from_value::<UpstreamPayload>(json).is_err());
    }

    #[test]
    fn test_sequence_checks() {
        let adapter = FeatureIngestAdapter::default();
        let first = adapter.normalize(payload(7), Utc::now()).unwrap();
        // First event of a session establishes the cursor
        assert!(FeatureIngestAdapter::check_sequence(None, &first).is_ok());

        let next = adapter.normalize(payload(8), Utc::now()).unwrap();
        assert!(FeatureIngestAdapter::check_sequence(Some(7), &next).is_ok());

        // Duplicate and late
        assert!(matches!(
            FeatureIngestAdapter::check_sequence(Some(8), &next),
            Err(IngestError::DuplicateEvent { last_applied: 8, received: 8, .. })
        ));
        assert!(matches!(
            FeatureIngestAdapter::check_sequence(Some(9), &next),
            Err(IngestError::DuplicateEvent { .. })
        ));

        // Gap
        let gap = adapter.normalize(payload(11), Utc::now()).unwrap();
        let err = FeatureIngestAdapter::check_sequence(Some(8), &gap).unwrap_err();
        assert_eq!(
            err,
            IngestError::OutOfOrderEvent {
                user_id: "user-1".to_string(),
                session_id: "session-a".to_string(),
                expected: 9,
                received: 11,
            }
        );
        assert_eq!(err.reason(), "out_of_order");
    }
}

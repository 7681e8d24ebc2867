//! Pattern taxonomy snapshots
//!
//! The taxonomy is read-mostly reference data versioned as a whole. A
//! snapshot is validated and compiled completely before it can be installed;
//! a load failure never leaves a partially loaded taxonomy active.
//!
//! # File format (TOML; JSON with the same shape is accepted for `.json`)
//! ```toml
//! version = "2024.06-sw-en"
//!
//! [[patterns]]
//! pattern_id = "sw-suicidal-01"
//! phrases = ["nataka kufa", "sitaki kuishi"]
//! language = "sw"
//! type = "suicidal_ideation"
//! severity = "critical"
//! crisis_protocol = { action = "contact_on_call_counselor", resources = ["116"] }
//! ```

use super::normalize::{normalize_text, stemmed_tokens};
use crate::types::{CrisisProtocol, PatternType, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{info, warn};

/// Language tag for entries that apply to every language
pub const ANY_LANGUAGE: &str = "*";

/// Pattern snapshot load failure
///
/// Fatal for the load attempt only: the previously installed snapshot stays active.
#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("Pattern snapshot load failure: cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Pattern snapshot load failure: parse error: {0}")]
    Parse(String),

    #[error("Pattern snapshot load failure: invalid snapshot: {0}")]
    Invalid(String),

    #[error("Pattern snapshot load failure: no taxonomy source configured")]
    NoSource,
}

fn any_language() -> String {
    ANY_LANGUAGE.to_string()
}

/// A named deflection/crisis pattern as authored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternTaxonomyEntry {
    pub pattern_id: String,
    /// Phrase variants (any language script; normalized on load)
    pub phrases: Vec<String>,
    /// ISO-ish language tag, or "*" for all languages
    #[serde(default = "any_language")]
    pub language: String,
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
    pub severity: Severity,
    #[serde(default)]
    pub crisis_protocol: Option<CrisisProtocol>,
}

#[derive(Debug, Deserialize)]
struct SnapshotFile {
    version: String,
    #[serde(default)]
    patterns: Vec<PatternTaxonomyEntry>,
}

/// Phrase variant with its precomputed normalized forms
#[derive(Debug, Clone)]
pub struct CompiledPhrase {
    pub original: String,
    pub normalized: String,
    pub stems: Vec<String>,
}

/// Taxonomy entry ready for matching
#[derive(Debug, Clone)]
pub struct CompiledEntry {
    pub entry: PatternTaxonomyEntry,
    pub phrases: Vec<CompiledPhrase>,
}

impl CompiledEntry {
    /// Whether this entry is considered for an utterance with `language` hint
    ///
    /// Critical entries apply regardless of language so that code-switched
    /// disclosures are never filtered out.
    pub fn applies_to(&self, language: Option<&str>) -> bool {
        match language {
            None => true,
            Some(lang) => {
                self.entry.severity == Severity::Critical
                    || self.entry.language == ANY_LANGUAGE
                    || self.entry.language.eq_ignore_ascii_case(lang)
            }
        }
    }
}

/// Immutable, versioned taxonomy
#[derive(Debug)]
pub struct TaxonomySnapshot {
    version: String,
    loaded_at: DateTime<Utc>,
    entries: Vec<CompiledEntry>,
}

impl TaxonomySnapshot {
    /// Snapshot with no patterns (used when no taxonomy is configured)
    pub fn empty() -> Self {
        Self {
            version: "empty".to_string(),
            loaded_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    /// Validate and compile a snapshot
    ///
    /// # Errors
    /// `TaxonomyError::Invalid` for a blank version, no entries, duplicate
    /// `pattern_id`s, or an entry without a usable phrase.
    pub fn from_entries(
        version: impl Into<String>,
        entries: Vec<PatternTaxonomyEntry>,
    ) -> Result<Self, TaxonomyError> {
        let version = version.into();
        if version.trim().is_empty() {
            return Err(TaxonomyError::Invalid("version is empty".to_string()));
        }
        if entries.is_empty() {
            return Err(TaxonomyError::Invalid(format!(
                "snapshot {} contains no patterns",
                version
            )));
        }

        let mut seen = HashSet::new();
        let mut compiled = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.pattern_id.trim().is_empty() {
                return Err(TaxonomyError::Invalid("pattern_id is empty".to_string()));
            }
            if !seen.insert(entry.pattern_id.clone()) {
                return Err(TaxonomyError::Invalid(format!(
                    "duplicate pattern_id {}",
                    entry.pattern_id
                )));
            }

            let phrases: Vec<CompiledPhrase> = entry
                .phrases
                .iter()
                .filter_map(|p| {
                    let normalized = normalize_text(p);
                    if normalized.is_empty() {
                        None
                    } else {
                        Some(CompiledPhrase {
                            original: p.clone(),
                            stems: stemmed_tokens(&normalized),
                            normalized,
                        })
                    }
                })
                .collect();
            if phrases.is_empty() {
                return Err(TaxonomyError::Invalid(format!(
                    "pattern {} has no usable phrase",
                    entry.pattern_id
                )));
            }

            compiled.push(CompiledEntry { entry, phrases });
        }

        Ok(Self {
            version,
            loaded_at: Utc::now(),
            entries: compiled,
        })
    }

    /// Load a snapshot file (JSON for `.json`, TOML otherwise)
    pub fn load(path: &Path) -> Result<Self, TaxonomyError> {
        let content = std::fs::read_to_string(path).map_err(|source| TaxonomyError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let file: SnapshotFile = if is_json {
            serde_json::from_str(&content).map_err(|e| TaxonomyError::Parse(e.to_string()))?
        } else {
            toml::from_str(&content).map_err(|e| TaxonomyError::Parse(e.to_string()))?
        };

        Self::from_entries(file.version, file.patterns)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn entries(&self) -> &[CompiledEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Hot-reloadable holder of the active snapshot
///
/// Readers take an `Arc` to the snapshot at the start of an assessment, so a
/// reload only affects utterances that start after it.
#[derive(Debug)]
pub struct TaxonomyStore {
    current: RwLock<Arc<TaxonomySnapshot>>,
    source_path: Option<PathBuf>,
}

impl TaxonomyStore {
    pub fn new(snapshot: TaxonomySnapshot, source_path: Option<PathBuf>) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            source_path,
        }
    }

    /// Load the initial snapshot from `path`; failure here is fatal to startup
    pub fn open(path: &Path) -> Result<Self, TaxonomyError> {
        let snapshot = TaxonomySnapshot::load(path)?;
        info!(
            version = %snapshot.version(),
            entries = snapshot.len(),
            "Pattern taxonomy loaded from {}",
            path.display()
        );
        Ok(Self::new(snapshot, Some(path.to_path_buf())))
    }

    /// Pin the active snapshot
    pub fn snapshot(&self) -> Arc<TaxonomySnapshot> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Atomically activate a fully validated snapshot, returning the previous one
    pub fn install(&self, snapshot: TaxonomySnapshot) -> Arc<TaxonomySnapshot> {
        let next = Arc::new(snapshot);
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *guard, next)
    }

    /// Re-read the configured source file and activate it
    ///
    /// On failure the previous snapshot remains active.
    pub fn reload(&self) -> Result<Arc<TaxonomySnapshot>, TaxonomyError> {
        let path = self.source_path.as_ref().ok_or(TaxonomyError::NoSource)?;
        match TaxonomySnapshot::load(path) {
            Ok(snapshot) => {
                let previous = self.install(snapshot);
                let active = self.snapshot();
                info!(
                    previous = %previous.version(),
                    version = %active.version(),
                    entries = active.len(),
                    "Pattern taxonomy reloaded"
                );
                Ok(active)
            }
            Err(e) => {
                warn!(
                    active = %self.snapshot().version(),
                    error = %e,
                    "Pattern taxonomy reload failed, keeping previous snapshot"
                );
                Err(e)
            }
        }
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }
}

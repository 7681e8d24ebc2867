//! Risk vocabulary shared between the detection core and its observers

use serde::{Deserialize, Serialize};

/// Aggregate risk level of one assessment
///
/// Ordered: `None < Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::None => "none",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-user escalation state
///
/// Normal → Elevated → Escalating → Escalated → Cooldown → Normal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrisisState {
    Normal,
    Elevated,
    Escalating,
    Escalated,
    Cooldown,
}

impl CrisisState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrisisState::Normal => "normal",
            CrisisState::Elevated => "elevated",
            CrisisState::Escalating => "escalating",
            CrisisState::Escalated => "escalated",
            CrisisState::Cooldown => "cooldown",
        }
    }
}

impl std::fmt::Display for CrisisState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

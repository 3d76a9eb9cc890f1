//! Permission layer: risk classification and user-gated tool execution.
//!
//! Two classifiers ([`CommandClassifier`], [`FileAccessClassifier`]) feed the
//! [`PermissionEngine`], which owns the YOLO bypass, the persistent per-tool
//! preference map, the prompt flow (through a [`DecisionHandler`]), duplicate
//! prompt suppression, and the audit log.

mod command;
mod engine;
mod paths;

pub use command::CommandClassifier;
pub use engine::{
    AuditEntry, DecisionHandler, PermissionEngine, PermissionRequest, PreferenceChoice,
    PromptDecision,
};
pub use paths::{FileAccessClassifier, FileOperation};

use serde::{Deserialize, Serialize};

/// Risk level of one operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

/// What the permission system does with an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionAction {
    Allow,
    Prompt,
    Block,
}

/// Result of risk assessment for one operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub action: PermissionAction,
    pub reasons: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

impl RiskAssessment {
    pub fn new(risk_level: RiskLevel, action: PermissionAction) -> Self {
        Self {
            risk_level,
            action,
            reasons: Vec::new(),
            warnings: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reasons.push(reason.into());
        self
    }

    pub fn warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

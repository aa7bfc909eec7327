use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::InstanceState;

/// Result of one rule over one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub ok: bool,
    /// Sorted names of the offending nodes.
    pub invalid: Vec<String>,
    pub message: String,
    /// Markdown description for the user.
    pub details: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ValidationOutcome {
    pub fn pass() -> Self {
        Self {
            ok: true,
            invalid: Vec::new(),
            message: String::new(),
            details: String::new(),
            warnings: Vec::new(),
        }
    }

    pub fn fail(message: String, invalid: Vec<String>, details: String) -> Self {
        Self {
            ok: false,
            invalid,
            message,
            details,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginStatus {
    Passed,
    Failed,
    Skipped,
    Errored,
}

impl PluginStatus {
    /// Failed checks and plugins that raised both block a publish.
    pub fn is_failure(&self) -> bool {
        matches!(self, PluginStatus::Failed | PluginStatus::Errored)
    }
}

/// One plugin execution, context-wide or for a single instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginResult {
    pub plugin: String,
    pub order: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    pub status: PluginStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ValidationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSummary {
    pub name: String,
    pub family: Option<String>,
    pub state: InstanceState,
}

/// Everything a publish run produced, in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishReport {
    pub project_name: String,
    pub started_at: DateTime<Utc>,
    pub results: Vec<PluginResult>,
    pub instances: Vec<InstanceSummary>,
    /// Set when a fatal error stopped the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl PublishReport {
    pub fn new(project_name: &str) -> Self {
        Self {
            project_name: project_name.to_string(),
            started_at: Utc::now(),
            results: Vec::new(),
            instances: Vec::new(),
            aborted: None,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &PluginResult> {
        self.results
            .iter()
            .filter(|r| r.status == PluginStatus::Failed)
    }

    pub fn success(&self) -> bool {
        self.aborted.is_none() && !self.results.iter().any(|r| r.status.is_failure())
    }

    /// Failing result of a given plugin for a given instance.
    pub fn failure_for(&self, plugin: &str, instance: &str) -> Option<&ValidationOutcome> {
        self.failures()
            .find(|r| r.plugin == plugin && r.instance.as_deref() == Some(instance))
            .and_then(|r| r.outcome.as_ref())
    }
}

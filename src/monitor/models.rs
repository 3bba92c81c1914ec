use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A monitored target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeOutcome {
    Success,
    Failure,
}

impl ProbeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeOutcome::Success => "success",
            ProbeOutcome::Failure => "failure",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(ProbeOutcome::Success),
            "failure" => Some(ProbeOutcome::Failure),
            _ => None,
        }
    }
}

/// Outcome of a single reachability check. Appended to history, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub project_id: String,
    pub timestamp: DateTime<Utc>,
    pub outcome: ProbeOutcome,
    pub status_code: Option<u16>,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn is_success(&self) -> bool {
        self.outcome == ProbeOutcome::Success
    }

    /// Status derived from this result. `Unknown` is never derived; it only
    /// describes a project that has not been checked yet.
    pub fn derived_status(&self) -> ProjectStatus {
        match self.outcome {
            ProbeOutcome::Success => ProjectStatus::Online,
            ProbeOutcome::Failure => ProjectStatus::Offline,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Online,
    Offline,
    Unknown,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Online => "online",
            ProjectStatus::Offline => "offline",
            ProjectStatus::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "online" => Some(ProjectStatus::Online),
            "offline" => Some(ProjectStatus::Offline),
            "unknown" => Some(ProjectStatus::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison baseline for a project. One live row per project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectState {
    pub project_id: String,
    pub last_status: ProjectStatus,
    pub last_checked: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl ProjectState {
    /// State for a project that has never been probed.
    pub fn initial(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            last_status: ProjectStatus::Unknown,
            last_checked: None,
            consecutive_failures: 0,
        }
    }

    /// Folds a fresh probe result into this state.
    pub fn advance(&self, result: &ProbeResult) -> Self {
        let consecutive_failures = if result.is_success() {
            0
        } else {
            self.consecutive_failures.saturating_add(1)
        };
        Self {
            project_id: self.project_id.clone(),
            last_status: result.derived_status(),
            last_checked: Some(result.timestamp),
            consecutive_failures,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionEvent {
    pub project_id: String,
    pub previous_status: ProjectStatus,
    pub new_status: ProjectStatus,
    pub timestamp: DateTime<Utc>,
    pub latency_ms: Option<u64>,
}

impl TransitionEvent {
    pub fn is_up(&self) -> bool {
        self.new_status == ProjectStatus::Online
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(outcome: ProbeOutcome) -> ProbeResult {
        ProbeResult {
            project_id: "p1".to_string(),
            timestamp: Utc::now(),
            outcome,
            status_code: None,
            latency_ms: None,
            error: None,
        }
    }

    #[test]
    fn failure_streak_grows_and_resets() {
        let state = ProjectState::initial("p1");
        let state = state.advance(&result(ProbeOutcome::Failure));
        let state = state.advance(&result(ProbeOutcome::Failure));
        assert_eq!(state.consecutive_failures, 2);
        assert_eq!(state.last_status, ProjectStatus::Offline);

        let state = state.advance(&result(ProbeOutcome::Success));
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.last_status, ProjectStatus::Online);
        assert!(state.last_checked.is_some());
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [ProjectStatus::Online, ProjectStatus::Offline, ProjectStatus::Unknown] {
            assert_eq!(ProjectStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ProjectStatus::parse("degraded"), None);
    }

    #[test]
    fn project_enabled_defaults_to_true() {
        let project: Project =
            serde_json::from_str(r#"{"id":"a","name":"A","url":"https://a.example"}"#).unwrap();
        assert!(project.enabled);
    }
}

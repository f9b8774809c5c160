use crate::utils::truncate_chars;
use chrono::{DateTime, Utc};
use std::fmt;

pub type NamespaceRef = String;
pub type PodRef = String;

/// Characters of log output kept for classification.
pub const CLASSIFY_BUDGET: usize = 400;
/// Characters shown for normal previews and error messages.
pub const DISPLAY_BUDGET: usize = 200;

/// Tagged result of fetching and triaging one unit (a pod, or a namespace listing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    IssueFound,
    Normal,
    Empty,
    Error,
    Timeout,
}

impl Outcome {
    pub fn is_failure(self) -> bool {
        matches!(self, Outcome::Error | Outcome::Timeout)
    }

    fn budget(self) -> usize {
        match self {
            Outcome::IssueFound | Outcome::Normal => CLASSIFY_BUDGET,
            Outcome::Empty | Outcome::Error | Outcome::Timeout => DISPLAY_BUDGET,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::IssueFound => write!(f, "ISSUES FOUND"),
            Outcome::Normal => write!(f, "Normal"),
            Outcome::Empty => write!(f, "Empty"),
            Outcome::Error => write!(f, "ERROR"),
            Outcome::Timeout => write!(f, "TIMEOUT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogSample {
    pub namespace: NamespaceRef,
    /// `None` when the sample describes the namespace's pod listing itself.
    pub pod: Option<PodRef>,
    pub outcome: Outcome,
    pub content: String,
    pub captured_at: DateTime<Utc>,
}

impl LogSample {
    /// Content is cut to the outcome's budget here, so no sample ever holds more.
    pub fn new(
        namespace: impl Into<NamespaceRef>,
        pod: Option<PodRef>,
        outcome: Outcome,
        content: &str,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            pod,
            outcome,
            content: truncate_chars(content, outcome.budget()).to_string(),
            captured_at: Utc::now(),
        }
    }

    pub fn subject(&self) -> String {
        match &self.pod {
            Some(pod) => format!("{}/{}", self.namespace, pod),
            None => self.namespace.clone(),
        }
    }
}

/// Parameters of one pod log request.
#[derive(Debug, Clone, PartialEq)]
pub struct LogWindow {
    pub since: Option<std::time::Duration>,
    pub tail_lines: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceInfo {
    pub name: NamespaceRef,
    pub phase: Option<String>,
    pub created: Option<DateTime<Utc>>,
}

impl NamespaceInfo {
    pub fn named(name: impl Into<NamespaceRef>) -> Self {
        Self {
            name: name.into(),
            phase: Some("Active".to_string()),
            created: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlPlaneInfo {
    pub endpoint: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub name: String,
    pub status: String,
    pub roles: String,
    pub created: Option<DateTime<Utc>>,
    pub version: String,
    pub internal_ip: String,
    pub os_image: String,
    pub kernel_version: String,
    pub container_runtime: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventInfo {
    pub namespace: String,
    pub last_seen: Option<DateTime<Utc>>,
    pub event_type: String,
    pub reason: String,
    pub object: String,
    pub message: String,
}

/// Scan lifecycle; only `Discovering` may move to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    Discovering,
    Prioritizing,
    Sampling,
    Aggregating,
    Complete,
    Failed,
}

impl ScanPhase {
    pub fn can_advance_to(self, next: ScanPhase) -> bool {
        use ScanPhase::*;
        matches!(
            (self, next),
            (Idle, Discovering)
                | (Discovering, Prioritizing)
                | (Discovering, Failed)
                | (Prioritizing, Sampling)
                | (Sampling, Aggregating)
                | (Aggregating, Complete)
        )
    }
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanPhase::Idle => "idle",
            ScanPhase::Discovering => "discovering",
            ScanPhase::Prioritizing => "prioritizing",
            ScanPhase::Sampling => "sampling",
            ScanPhase::Aggregating => "aggregating",
            ScanPhase::Complete => "complete",
            ScanPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_content_is_bounded_by_outcome() {
        let long = "x".repeat(1000);
        let issue = LogSample::new("ns", Some("p".into()), Outcome::IssueFound, &long);
        assert_eq!(issue.content.chars().count(), CLASSIFY_BUDGET);

        let error = LogSample::new("ns", Some("p".into()), Outcome::Error, &long);
        assert_eq!(error.content.chars().count(), DISPLAY_BUDGET);
    }

    #[test]
    fn test_phase_transitions() {
        assert!(ScanPhase::Idle.can_advance_to(ScanPhase::Discovering));
        assert!(ScanPhase::Discovering.can_advance_to(ScanPhase::Failed));
        assert!(!ScanPhase::Sampling.can_advance_to(ScanPhase::Failed));
        assert!(!ScanPhase::Idle.can_advance_to(ScanPhase::Complete));
    }

    #[test]
    fn test_subject() {
        let pod = LogSample::new("web", Some("api-0".into()), Outcome::Normal, "ok");
        let ns = LogSample::new("web", None, Outcome::Error, "forbidden");
        assert_eq!(pod.subject(), "web/api-0");
        assert_eq!(ns.subject(), "web");
    }
}

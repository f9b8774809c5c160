use crate::types::LogWindow;
use crate::utils::parse_duration;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scan: ScanConfig,
    pub notifier: NotifierConfig,
}

impl Config {
    /// Load from `path`, or return defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Scan exactly these namespaces instead of discovering and prioritizing.
    pub namespaces: Option<Vec<String>>,
    /// Only sample pods with this name.
    pub pod: Option<String>,
    /// Log window, e.g. `1h` or `30m`.
    pub since: String,
    pub tail_lines: i64,
    pub pods_per_namespace: usize,
    pub max_concurrency: usize,
    /// Absolute budget for the whole scan, e.g. `90s` or `500ms`.
    pub deadline: Option<String>,
    pub timeouts: TimeoutConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            namespaces: None,
            pod: None,
            since: "1h".to_string(),
            tail_lines: 20,
            pods_per_namespace: 3,
            max_concurrency: 4,
            deadline: None,
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl ScanConfig {
    /// Validate and convert into the runtime form.
    pub fn settings(&self) -> anyhow::Result<ScanSettings> {
        anyhow::ensure!(self.tail_lines > 0, "tail_lines must be positive");
        anyhow::ensure!(
            self.pods_per_namespace > 0,
            "pods_per_namespace must be positive"
        );
        anyhow::ensure!(self.max_concurrency > 0, "max_concurrency must be positive");
        let since = parse_duration(&self.since)
            .with_context(|| format!("Invalid time range '{}'", self.since))?;
        let deadline = match &self.deadline {
            Some(raw) => {
                let deadline =
                    parse_duration(raw).with_context(|| format!("Invalid deadline '{}'", raw))?;
                anyhow::ensure!(!deadline.is_zero(), "deadline must be positive");
                Some(deadline)
            }
            None => None,
        };
        self.timeouts.validate()?;

        Ok(ScanSettings {
            namespaces: self.namespaces.clone(),
            pod: self.pod.clone().filter(|p| !p.trim().is_empty()),
            time_range: self.since.clone(),
            window: LogWindow {
                since: Some(since),
                tail_lines: self.tail_lines,
            },
            pods_per_namespace: self.pods_per_namespace,
            max_concurrency: self.max_concurrency,
            deadline,
            timeouts: self.timeouts.to_timeouts(),
        })
    }
}

/// Per-call bounds in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub discovery_secs: u64,
    pub pod_list_secs: u64,
    pub log_fetch_secs: u64,
    pub snapshot_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            discovery_secs: 30,
            pod_list_secs: 20,
            log_fetch_secs: 10,
            snapshot_secs: 15,
        }
    }
}

impl TimeoutConfig {
    fn validate(&self) -> anyhow::Result<()> {
        for (name, secs) in [
            ("discovery_secs", self.discovery_secs),
            ("pod_list_secs", self.pod_list_secs),
            ("log_fetch_secs", self.log_fetch_secs),
            ("snapshot_secs", self.snapshot_secs),
        ] {
            anyhow::ensure!(secs > 0, "timeouts.{} must be positive", name);
        }
        Ok(())
    }

    fn to_timeouts(&self) -> Timeouts {
        Timeouts {
            discovery: Duration::from_secs(self.discovery_secs),
            pod_list: Duration::from_secs(self.pod_list_secs),
            log_fetch: Duration::from_secs(self.log_fetch_secs),
            snapshot: Duration::from_secs(self.snapshot_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timeouts {
    pub discovery: Duration,
    pub pod_list: Duration,
    pub log_fetch: Duration,
    pub snapshot: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        TimeoutConfig::default().to_timeouts()
    }
}

/// Validated scan parameters.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub namespaces: Option<Vec<String>>,
    pub pod: Option<String>,
    /// The operator's time range as written, for display.
    pub time_range: String,
    pub window: LogWindow,
    pub pods_per_namespace: usize,
    pub max_concurrency: usize,
    pub deadline: Option<Duration>,
    pub timeouts: Timeouts,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            namespaces: None,
            pod: None,
            time_range: "1h".to_string(),
            window: LogWindow {
                since: Some(Duration::from_secs(3600)),
                tail_lines: 20,
            },
            pods_per_namespace: 3,
            max_concurrency: 4,
            deadline: None,
            timeouts: Timeouts::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Delivery is disabled when unset.
    pub webhook_url: Option<String>,
    pub display_name: String,
    pub icon: String,
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            display_name: "K8s Log Analyzer".to_string(),
            icon: ":kubernetes:".to_string(),
            timeout_secs: 10,
        }
    }
}

impl NotifierConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.timeout_secs > 0, "notifier timeout_secs must be positive");
        Ok(())
    }
}

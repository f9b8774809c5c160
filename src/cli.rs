use crate::config::Config;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kubectl-triage")]
#[command(about = "Sample pod logs across a cluster, flag likely problems and raise an alert")]
pub struct Cli {
    /// Scan profile
    #[arg(value_enum, default_value_t = Profile::Run)]
    pub profile: Profile,

    /// Comma-separated namespaces to scan instead of discovering them
    #[arg(long, value_delimiter = ',')]
    pub namespaces: Vec<String>,

    /// Namespace to investigate
    #[arg(short = 'n', long)]
    pub namespace: Option<String>,

    /// Only sample this pod
    #[arg(short = 'p', long)]
    pub pod: Option<String>,

    /// Log time range (e.g. 30m, 1h, 24h)
    #[arg(short = 's', long)]
    pub since: Option<String>,

    /// Log lines fetched per pod
    #[arg(long)]
    pub tail: Option<i64>,

    /// Context
    #[arg(long)]
    pub context: Option<String>,

    /// YAML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Incoming webhook for alerts
    #[arg(long, env = "SLACK_WEBHOOK_URL", hide_env_values = true)]
    pub webhook_url: Option<String>,

    /// Alert severity (critical, high, medium, low, info); derived from findings when omitted
    #[arg(long)]
    pub severity: Option<String>,

    /// Alert title
    #[arg(long)]
    pub title: Option<String>,

    /// Print the digest without sending an alert
    #[arg(long)]
    pub no_alert: bool,

    /// Give up on unfinished work after this long (e.g. 90s, 2m)
    #[arg(long)]
    pub deadline: Option<String>,

    /// Maximum concurrent cluster calls
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Disable colored digest output
    #[arg(long)]
    pub no_color: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
    /// General scan of the priority namespaces
    Run,
    /// Focused look at one namespace, optionally one pod
    Incident,
    /// Wider health check
    Health,
    /// Day-long look for suspicious activity
    Security,
}

impl Profile {
    pub fn default_since(self) -> &'static str {
        match self {
            Profile::Run => "1h",
            Profile::Incident => "30m",
            Profile::Health => "6h",
            Profile::Security => "24h",
        }
    }

    pub fn default_title(self) -> &'static str {
        match self {
            Profile::Run => "Kubernetes Log Scan",
            Profile::Incident => "Incident Investigation",
            Profile::Health => "Cluster Health Check",
            Profile::Security => "Security Audit",
        }
    }
}

impl Cli {
    pub fn title(&self) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| self.profile.default_title().to_string())
    }

    /// Layer flags over file configuration.
    pub fn apply_to(&self, config: &mut Config) -> anyhow::Result<()> {
        let scan = &mut config.scan;

        let mut requested: Vec<String> = self.namespaces.clone();
        if let Some(ns) = &self.namespace {
            requested.push(ns.clone());
        }
        if !requested.is_empty() {
            scan.namespaces = Some(requested);
        }
        if self.profile == Profile::Incident
            && scan.namespaces.as_ref().is_none_or(|n| n.is_empty())
        {
            anyhow::bail!("The incident profile needs a namespace (--namespace)");
        }

        if let Some(since) = &self.since {
            scan.since = since.clone();
        } else if self.profile != Profile::Run {
            scan.since = self.profile.default_since().to_string();
        }

        if self.pod.is_some() {
            scan.pod = self.pod.clone();
        }
        if let Some(tail) = self.tail {
            scan.tail_lines = tail;
        }
        if let Some(concurrency) = self.concurrency {
            scan.max_concurrency = concurrency;
        }
        if self.deadline.is_some() {
            scan.deadline = self.deadline.clone();
        }

        if self.webhook_url.is_some() {
            config.notifier.webhook_url = self.webhook_url.clone();
        }
        Ok(())
    }
}

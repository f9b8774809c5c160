use crate::aggregator::ScanSummary;
use crate::config::NotifierConfig;
use crate::error::DispatchError;
use crate::utils::truncate_chars;
use chrono::{DateTime, Local};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

/// Flagged pods listed in an alert message before the rest are summarized.
const MAX_ALERT_ENTRIES: usize = 10;
const ENTRY_PREVIEW: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    #[default]
    Info,
}

impl Severity {
    /// Unrecognized names fall back to `Info`.
    pub fn parse_lenient(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            _ => Severity::Info,
        }
    }

    /// Attachment color as a hex string.
    pub fn color(self) -> &'static str {
        match self {
            Severity::Critical => "#FF0000",
            Severity::High => "#FF6600",
            Severity::Medium => "#FFCC00",
            Severity::Low => "#0066CC",
            Severity::Info => "#36a64f",
        }
    }

    pub fn glyph(self) -> &'static str {
        match self {
            Severity::Critical => "🚨",
            Severity::High => "⚠️",
            Severity::Medium => "🔶",
            Severity::Low => "🔵",
            Severity::Info => "ℹ️",
        }
    }

    pub fn label(self) -> String {
        self.to_string().to_uppercase()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub title: String,
    pub message: String,
    pub severity: Severity,
}

impl Alert {
    pub fn new(title: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
        }
    }

    /// Alert describing a finished scan: flagged pods first, then unreachable namespaces.
    pub fn for_summary(summary: &ScanSummary, title: &str, severity: Severity) -> Self {
        let mut lines = Vec::new();
        let verdict = if summary.flagged.is_empty() {
            "No issues flagged".to_string()
        } else {
            format!("{} pod(s) flagged", summary.flagged.len())
        };
        lines.push(format!(
            "{} across {} namespace(s); {} pods checked over the last {}.",
            verdict, summary.namespaces_attempted, summary.pods_checked, summary.time_range
        ));

        for sample in summary.flagged.iter().take(MAX_ALERT_ENTRIES) {
            let first_line = sample.content.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
            lines.push(format!(
                "• {}: {}",
                sample.subject(),
                truncate_chars(first_line.trim(), ENTRY_PREVIEW)
            ));
        }
        if summary.flagged.len() > MAX_ALERT_ENTRIES {
            lines.push(format!(
                "...and {} more",
                summary.flagged.len() - MAX_ALERT_ENTRIES
            ));
        }

        let failed = summary.failed_namespaces();
        if !failed.is_empty() {
            lines.push(format!("Unreachable namespaces: {}", failed.join(", ")));
        }
        if summary.deadline_expired {
            lines.push("Scan deadline reached: results are partial.".to_string());
        }

        Self::new(title, lines.join("\n"), severity)
    }

    /// Printed instead of posting when no webhook is configured.
    pub fn local_message(&self) -> String {
        format!(
            "ℹ️ Slack not configured. Alert: [{}] {} - {}",
            self.severity.label(),
            self.title,
            self.message
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(rename = "username")]
    pub display_name: String,
    #[serde(rename = "icon_emoji")]
    pub icon: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub color: String,
    pub title: String,
    pub text: String,
    pub fields: Vec<AttachmentField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentField {
    pub title: String,
    pub value: String,
    pub short: bool,
}

/// What happened to one alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Disabled { message: String },
    Sent,
    Failed { reason: String },
}

impl Delivery {
    pub fn describe(&self, alert: &Alert) -> String {
        match self {
            Delivery::Disabled { message } => message.clone(),
            Delivery::Sent => format!(
                "✅ Slack notification sent: [{}] {}",
                alert.severity.label(),
                alert.title
            ),
            Delivery::Failed { reason } => format!("⚠️ Slack notification failed: {}", reason),
        }
    }
}

pub struct AlertDispatcher {
    client: reqwest::Client,
    /// `Err` holds why a configured url was rejected.
    target: Option<Result<Url, String>>,
    display_name: String,
    icon: String,
    timeout: Duration,
}

impl AlertDispatcher {
    /// A malformed webhook url does not fail here. Each dispatch reports it as
    /// [`Delivery::Failed`] so the scan still runs and prints its digest.
    pub fn new(config: &NotifierConfig) -> Result<Self, DispatchError> {
        let target = config
            .webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(|u| {
                Url::parse(u).map_err(|source| {
                    let err = DispatchError::InvalidUrl {
                        url: u.to_string(),
                        source,
                    };
                    warn!("{}", err);
                    err.to_string()
                })
            });

        Ok(Self {
            client: reqwest::Client::builder().build()?,
            target,
            display_name: config.display_name.clone(),
            icon: config.icon.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    pub fn payload(&self, alert: &Alert, at: DateTime<Local>) -> WebhookPayload {
        WebhookPayload {
            display_name: self.display_name.clone(),
            icon: self.icon.clone(),
            attachments: vec![Attachment {
                color: alert.severity.color().to_string(),
                title: format!("{} {}", alert.severity.glyph(), alert.title),
                text: alert.message.clone(),
                fields: vec![
                    AttachmentField {
                        title: "Severity".to_string(),
                        value: alert.severity.label(),
                        short: true,
                    },
                    AttachmentField {
                        title: "Time".to_string(),
                        value: at.format("%H:%M:%S").to_string(),
                        short: true,
                    },
                ],
            }],
        }
    }

    /// Deliver `alert`. Never fails; the outcome is reported as a [`Delivery`].
    pub async fn dispatch(&self, alert: &Alert) -> Delivery {
        let url = match &self.target {
            None => {
                info!("No webhook configured, alert kept local");
                return Delivery::Disabled {
                    message: alert.local_message(),
                };
            }
            Some(Err(reason)) => {
                warn!("Alert not sent: {}", reason);
                return Delivery::Failed {
                    reason: reason.clone(),
                };
            }
            Some(Ok(url)) => url,
        };

        let payload = self.payload(alert, Local::now());
        let sent = self
            .client
            .post(url.clone())
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await;

        match sent {
            Ok(response) if response.status() == StatusCode::OK => {
                info!(severity = %alert.severity, "Alert delivered");
                Delivery::Sent
            }
            Ok(response) => {
                let status = response.status();
                warn!(%status, "Webhook rejected alert");
                Delivery::Failed {
                    reason: status.as_u16().to_string(),
                }
            }
            Err(e) if e.is_timeout() => {
                warn!("Webhook timed out after {}s", self.timeout.as_secs_f64());
                Delivery::Failed {
                    reason: format!("timed out after {}s", self.timeout.as_secs_f64()),
                }
            }
            Err(e) => {
                warn!("Webhook request failed: {}", e);
                Delivery::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

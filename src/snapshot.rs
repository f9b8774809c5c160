use crate::kubernetes::ClusterApi;
use crate::types::{ControlPlaneInfo, EventInfo, NamespaceInfo, NodeInfo};
use crate::utils::{format_age, render_table, truncate_chars};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Shown in place of the snapshot when no part of it could be gathered.
pub const SNAPSHOT_FALLBACK: &str = "Unable to gather cluster information";

pub const MAX_EVENTS: usize = 20;

const CONTROL_PLANE_BUDGET: usize = 300;

/// Each part is `None` when its call failed or timed out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterSnapshot {
    pub control_plane: Option<ControlPlaneInfo>,
    pub nodes: Option<Vec<NodeInfo>>,
    pub namespaces: Option<Vec<NamespaceInfo>>,
    pub events: Option<Vec<EventInfo>>,
    /// A part was still pending when the scan deadline passed.
    pub deadline_expired: bool,
}

/// Gather all parts concurrently. Each is bounded by `bound` and, when given,
/// by the absolute scan `deadline`.
pub async fn capture(
    api: &dyn ClusterApi,
    bound: Duration,
    deadline: Option<Instant>,
) -> ClusterSnapshot {
    let (control_plane, nodes, namespaces, events) = tokio::join!(
        bounded("cluster info", bound, deadline, api.cluster_info()),
        bounded("nodes", bound, deadline, api.list_nodes()),
        bounded("namespaces", bound, deadline, api.list_namespaces()),
        bounded("events", bound, deadline, api.list_events(MAX_EVENTS)),
    );

    ClusterSnapshot {
        deadline_expired: control_plane.1 || nodes.1 || namespaces.1 || events.1,
        control_plane: control_plane.0,
        nodes: nodes.0,
        namespaces: namespaces.0,
        events: events.0.map(recent_events),
    }
}

/// The call's value, and whether the scan deadline cut it off.
async fn bounded<T>(
    what: &str,
    bound: Duration,
    deadline: Option<Instant>,
    call: impl Future<Output = anyhow::Result<T>>,
) -> (Option<T>, bool) {
    let own_limit = Instant::now() + bound;
    let limit = deadline.map_or(own_limit, |d| d.min(own_limit));
    match tokio::time::timeout_at(limit, call).await {
        Ok(Ok(value)) => (Some(value), false),
        Ok(Err(e)) => {
            warn!("Leaving {} out of cluster snapshot: {:#}", what, e);
            (None, false)
        }
        Err(_) if limit < own_limit => {
            warn!("Leaving {} out of cluster snapshot: scan deadline reached", what);
            (None, true)
        }
        Err(_) => {
            warn!(
                "Leaving {} out of cluster snapshot: timed out after {}s",
                what,
                bound.as_secs_f64()
            );
            (None, false)
        }
    }
}

/// Oldest first, keeping only the newest [`MAX_EVENTS`].
pub fn recent_events(mut events: Vec<EventInfo>) -> Vec<EventInfo> {
    events.sort_by_key(|e| e.last_seen);
    let skip = events.len().saturating_sub(MAX_EVENTS);
    events.split_off(skip)
}

impl ClusterSnapshot {
    pub fn is_empty(&self) -> bool {
        self.control_plane.is_none()
            && self.nodes.is_none()
            && self.namespaces.is_none()
            && self.events.is_none()
    }

    pub fn render(&self, now: DateTime<Utc>) -> String {
        let mut sections = Vec::new();

        if let Some(cp) = &self.control_plane {
            let mut text = format!("Kubernetes control plane is running at {}", cp.endpoint);
            if let Some(version) = &cp.version {
                text.push_str(&format!("\nServer version: {}", version));
            }
            sections.push(format!(
                "=== CLUSTER INFO ===\n{}",
                truncate_chars(&text, CONTROL_PLANE_BUDGET)
            ));
        }

        if let Some(nodes) = &self.nodes {
            let rows: Vec<Vec<String>> = nodes
                .iter()
                .map(|n| {
                    vec![
                        n.name.clone(),
                        n.status.clone(),
                        n.roles.clone(),
                        format_age(n.created, now),
                        n.version.clone(),
                        n.internal_ip.clone(),
                        n.os_image.clone(),
                        n.kernel_version.clone(),
                        n.container_runtime.clone(),
                    ]
                })
                .collect();
            sections.push(format!(
                "=== NODE STATUS ===\n{}",
                render_table(
                    &[
                        "NAME",
                        "STATUS",
                        "ROLES",
                        "AGE",
                        "VERSION",
                        "INTERNAL-IP",
                        "OS-IMAGE",
                        "KERNEL-VERSION",
                        "CONTAINER-RUNTIME",
                    ],
                    &rows,
                )
            ));
        }

        if let Some(namespaces) = &self.namespaces {
            let rows: Vec<Vec<String>> = namespaces
                .iter()
                .map(|ns| {
                    vec![
                        ns.name.clone(),
                        ns.phase.clone().unwrap_or_else(|| "Unknown".to_string()),
                        format_age(ns.created, now),
                    ]
                })
                .collect();
            sections.push(format!(
                "=== NAMESPACES ===\n{}",
                render_table(&["NAME", "STATUS", "AGE"], &rows)
            ));
        }

        if let Some(events) = &self.events {
            let rows: Vec<Vec<String>> = events
                .iter()
                .map(|e| {
                    vec![
                        e.namespace.clone(),
                        format_age(e.last_seen, now),
                        e.event_type.clone(),
                        e.reason.clone(),
                        e.object.clone(),
                        e.message.clone(),
                    ]
                })
                .collect();
            sections.push(format!(
                "=== RECENT EVENTS ===\n{}",
                render_table(
                    &["NAMESPACE", "LAST SEEN", "TYPE", "REASON", "OBJECT", "MESSAGE"],
                    &rows,
                )
            ));
        }

        if sections.is_empty() {
            SNAPSHOT_FALLBACK.to_string()
        } else {
            sections.join("\n\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{FakeCluster, Reply};
    use chrono::TimeZone;

    fn event(reason: &str, minute: u32) -> EventInfo {
        EventInfo {
            namespace: "web".to_string(),
            last_seen: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap()),
            event_type: "Normal".to_string(),
            reason: reason.to_string(),
            object: "pod/api-0".to_string(),
            message: "msg".to_string(),
        }
    }

    #[test]
    fn test_recent_events_keeps_newest() {
        let events: Vec<EventInfo> = (0..30).rev().map(|m| event(&format!("r{}", m), m)).collect();
        let recent = recent_events(events);
        assert_eq!(recent.len(), MAX_EVENTS);
        assert_eq!(recent[0].reason, "r10");
        assert_eq!(recent[MAX_EVENTS - 1].reason, "r29");
    }

    #[test]
    fn test_empty_snapshot_falls_back() {
        let snapshot = ClusterSnapshot::default();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.render(Utc::now()), SNAPSHOT_FALLBACK);
    }

    #[test]
    fn test_control_plane_text_is_capped() {
        let snapshot = ClusterSnapshot {
            control_plane: Some(ControlPlaneInfo {
                endpoint: format!("https://{}", "a".repeat(400)),
                version: Some("v1.30.1".to_string()),
            }),
            ..Default::default()
        };
        let rendered = snapshot.render(Utc::now());
        let body = rendered.strip_prefix("=== CLUSTER INFO ===\n").unwrap();
        assert_eq!(body.chars().count(), 300);
        assert!(!rendered.contains("v1.30.1"));
    }

    #[test]
    fn test_render_sections() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap();
        let snapshot = ClusterSnapshot {
            namespaces: Some(vec![NamespaceInfo {
                name: "default".to_string(),
                phase: Some("Active".to_string()),
                created: Some(Utc.with_ymd_and_hms(2024, 4, 28, 13, 0, 0).unwrap()),
            }]),
            events: Some(vec![event("Pulled", 30)]),
            ..Default::default()
        };
        let rendered = snapshot.render(now);
        assert!(rendered.starts_with("=== NAMESPACES ===\nNAME"));
        assert!(rendered.contains("default   Active   3d"));
        assert!(rendered.contains("=== RECENT EVENTS ==="));
        assert!(rendered.contains("Pulled"));
        assert!(!rendered.contains("=== NODE STATUS ==="));
    }

    #[tokio::test]
    async fn test_capture_isolates_failing_parts() {
        let api = FakeCluster::new()
            .with_namespaces(&["default", "kube-system"])
            .with_node_reply(Reply::Fail("forbidden".into()))
            .with_event_reply(Reply::Hang);

        let snapshot = capture(&api, Duration::from_millis(50), None).await;
        assert_eq!(snapshot.namespaces.as_ref().map(Vec::len), Some(2));
        assert!(snapshot.nodes.is_none());
        assert!(snapshot.events.is_none());
        assert!(snapshot.control_plane.is_some());
        assert!(!snapshot.deadline_expired);
    }

    #[tokio::test]
    async fn test_capture_stops_at_deadline() {
        let api = FakeCluster::new()
            .with_namespaces(&["default"])
            .with_event_reply(Reply::Hang);

        let started = Instant::now();
        let deadline = started + Duration::from_millis(100);
        let snapshot = capture(&api, Duration::from_secs(5), Some(deadline)).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(snapshot.deadline_expired);
        assert!(snapshot.events.is_none());
        assert_eq!(snapshot.namespaces.as_ref().map(Vec::len), Some(1));
    }
}

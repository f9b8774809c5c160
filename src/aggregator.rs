use crate::classifier::matched_keywords;
use crate::dispatcher::Severity;
use crate::sampler::{PodListing, SampleSet};
use crate::snapshot::ClusterSnapshot;
use crate::types::{DISPLAY_BUDGET, LogSample, NamespaceRef, Outcome};
use crate::utils::truncate_chars;
use chrono::{DateTime, Local, Utc};
use std::fmt::Write;
use std::time::Duration;

/// Digest returned when the scan gathered nothing at all.
pub const NO_DATA_DIGEST: &str = "No logs collected from cluster";

/// Normal previews with this many visible characters or fewer are left out of the digest.
const MIN_NORMAL_PREVIEW: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub issues: usize,
    pub normal: usize,
    pub empty: usize,
    pub errors: usize,
    pub timeouts: usize,
}

impl OutcomeCounts {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::IssueFound => self.issues += 1,
            Outcome::Normal => self.normal += 1,
            Outcome::Empty => self.empty += 1,
            Outcome::Error => self.errors += 1,
            Outcome::Timeout => self.timeouts += 1,
        }
    }

    fn add(&mut self, other: &OutcomeCounts) {
        self.issues += other.issues;
        self.normal += other.normal;
        self.empty += other.empty;
        self.errors += other.errors;
        self.timeouts += other.timeouts;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceStatus {
    Listed { found: usize },
    Failed(Outcome),
    /// The deadline passed before the pod listing returned.
    Unfinished,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceReport {
    pub namespace: NamespaceRef,
    pub status: NamespaceStatus,
    pub pods_checked: usize,
    pub counts: OutcomeCounts,
    /// Namespace failure first, then pods in discovery order.
    pub samples: Vec<LogSample>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanSummary {
    /// `None` when namespaces were given explicitly instead of discovered.
    pub namespaces_discovered: Option<usize>,
    pub namespaces_attempted: usize,
    pub pods_checked: usize,
    pub namespaces: Vec<NamespaceReport>,
    pub flagged: Vec<LogSample>,
    pub elapsed: Duration,
    pub time_range: String,
    pub completed_at: DateTime<Local>,
    pub deadline_expired: bool,
}

/// Scan-level facts the samples themselves do not carry.
#[derive(Debug, Clone)]
pub struct ScanContext {
    pub namespaces_discovered: Option<usize>,
    pub time_range: String,
    pub elapsed: Duration,
    pub completed_at: DateTime<Local>,
}

pub fn aggregate(samples: &SampleSet, ctx: ScanContext) -> ScanSummary {
    let mut namespaces = Vec::with_capacity(samples.namespaces.len());
    let mut flagged = Vec::new();

    for ns in &samples.namespaces {
        let status = match &ns.listing {
            Some(PodListing::Listed { found, .. }) => NamespaceStatus::Listed { found: *found },
            Some(PodListing::Failed(sample)) => NamespaceStatus::Failed(sample.outcome),
            None => NamespaceStatus::Unfinished,
        };

        let mut counts = OutcomeCounts::default();
        let mut ordered = Vec::new();
        for sample in ns.ordered() {
            counts.record(sample.outcome);
            if sample.outcome == Outcome::IssueFound {
                flagged.push(sample.clone());
            }
            ordered.push(sample.clone());
        }

        namespaces.push(NamespaceReport {
            namespace: ns.namespace.clone(),
            status,
            pods_checked: ns.pods.len(),
            counts,
            samples: ordered,
        });
    }

    ScanSummary {
        namespaces_discovered: ctx.namespaces_discovered,
        namespaces_attempted: namespaces.len(),
        pods_checked: namespaces.iter().map(|n| n.pods_checked).sum(),
        namespaces,
        flagged,
        elapsed: ctx.elapsed,
        time_range: ctx.time_range,
        completed_at: ctx.completed_at,
        deadline_expired: samples.deadline_expired,
    }
}

impl ScanSummary {
    pub fn totals(&self) -> OutcomeCounts {
        let mut totals = OutcomeCounts::default();
        for ns in &self.namespaces {
            totals.add(&ns.counts);
        }
        totals
    }

    /// Error and Timeout samples, namespace- or pod-level, in digest order.
    pub fn failures(&self) -> impl Iterator<Item = &LogSample> {
        self.namespaces
            .iter()
            .flat_map(|ns| ns.samples.iter())
            .filter(|s| s.outcome.is_failure())
    }

    /// Namespaces whose pod listing failed.
    pub fn failed_namespaces(&self) -> Vec<&str> {
        self.namespaces
            .iter()
            .filter(|ns| matches!(ns.status, NamespaceStatus::Failed(_)))
            .map(|ns| ns.namespace.as_str())
            .collect()
    }

    /// Crash or restart is critical, other error keywords high, warnings
    /// medium, unreachable units or a cut-short scan low.
    pub fn suggested_severity(&self) -> Severity {
        let keywords: Vec<&str> = self
            .flagged
            .iter()
            .flat_map(|s| matched_keywords(&s.content))
            .collect();

        if keywords.iter().any(|k| matches!(*k, "crash" | "restart")) {
            Severity::Critical
        } else if keywords
            .iter()
            .any(|k| matches!(*k, "error" | "exception" | "fail"))
        {
            Severity::High
        } else if !keywords.is_empty() {
            Severity::Medium
        } else if self.failures().next().is_some() || self.deadline_expired {
            Severity::Low
        } else {
            Severity::Info
        }
    }
}

/// Render the digest in prioritized namespace order, pods in discovery order.
pub fn render_digest(summary: &ScanSummary, snapshot: Option<&ClusterSnapshot>) -> String {
    if summary.namespaces_attempted == 0 && snapshot.is_none_or(ClusterSnapshot::is_empty) {
        return NO_DATA_DIGEST.to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "=== CLUSTER SCAN SUMMARY ===");
    let _ = writeln!(out, "Namespaces scanned: {}", summary.namespaces_attempted);
    let _ = writeln!(out, "Total pods checked: {}", summary.pods_checked);
    let _ = writeln!(out, "Time range: {}", summary.time_range);
    let _ = writeln!(
        out,
        "Scan completed at: {}",
        summary.completed_at.format("%H:%M:%S")
    );
    if summary.deadline_expired {
        let _ = writeln!(out, "Scan deadline reached: results are partial");
    }
    out.push('\n');

    let names = summary
        .namespaces
        .iter()
        .map(|ns| ns.namespace.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    match summary.namespaces_discovered {
        Some(total) => {
            let _ = writeln!(out, "=== SCANNING {} NAMESPACES ===", total);
            let _ = writeln!(out, "=== PRIORITY NAMESPACES: {} ===", names);
        }
        None => {
            let _ = writeln!(out, "=== REQUESTED NAMESPACES: {} ===", names);
        }
    }

    for ns in &summary.namespaces {
        out.push('\n');
        render_namespace(&mut out, ns);
    }

    if let Some(snapshot) = snapshot {
        out.push('\n');
        out.push_str(&snapshot.render(summary.completed_at.with_timezone(&Utc)));
        out.push('\n');
    }

    out
}

fn render_namespace(out: &mut String, ns: &NamespaceReport) {
    match &ns.status {
        NamespaceStatus::Listed { found: 0 } => {
            let _ = writeln!(out, "=== NAMESPACE {}: No pods found ===", ns.namespace);
        }
        NamespaceStatus::Listed { found } => {
            let _ = writeln!(out, "=== NAMESPACE {}: Found {} pods ===", ns.namespace, found);
        }
        NamespaceStatus::Failed(Outcome::Timeout) => {
            let _ = writeln!(out, "=== NAMESPACE {}: Timeout ===", ns.namespace);
        }
        NamespaceStatus::Failed(_) => {
            let _ = writeln!(out, "=== NAMESPACE {}: Error getting pods ===", ns.namespace);
        }
        NamespaceStatus::Unfinished => {
            let _ = writeln!(
                out,
                "=== NAMESPACE {}: Not scanned before deadline ===",
                ns.namespace
            );
        }
    }

    for sample in &ns.samples {
        let Some(pod) = &sample.pod else {
            // namespace-level failure
            if !sample.content.is_empty() {
                let _ = writeln!(out, "{}", sample.content.trim_end());
            }
            continue;
        };

        match sample.outcome {
            Outcome::Normal => {
                if sample.content.trim().chars().count() <= MIN_NORMAL_PREVIEW {
                    continue;
                }
                let _ = writeln!(out, "--- {}/{} (Normal) ---", ns.namespace, pod);
                let _ = writeln!(out, "{}...", truncate_chars(&sample.content, DISPLAY_BUDGET));
            }
            Outcome::Empty => {
                let _ = writeln!(out, "--- {}/{} (Empty) ---", ns.namespace, pod);
            }
            outcome => {
                let _ = writeln!(out, "--- {}/{} ({}) ---", ns.namespace, pod, outcome);
                let _ = writeln!(out, "{}", sample.content.trim_end());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::UnitReport;
    use crate::snapshot::SNAPSHOT_FALLBACK;
    use chrono::TimeZone;

    fn context() -> ScanContext {
        ScanContext {
            namespaces_discovered: Some(5),
            time_range: "1h".to_string(),
            elapsed: Duration::from_millis(1500),
            completed_at: Local.with_ymd_and_hms(2024, 5, 1, 12, 30, 45).unwrap(),
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn reports() -> Vec<UnitReport> {
        vec![
            UnitReport::Listing {
                ns_index: 0,
                listing: PodListing::Listed {
                    found: 4,
                    selected: names(&["api-0", "api-1"]),
                },
            },
            UnitReport::Pod {
                ns_index: 0,
                pod_index: 0,
                sample: LogSample::new(
                    "web",
                    Some("api-0".into()),
                    Outcome::Normal,
                    "GET /healthz 200 in 3ms",
                ),
            },
            UnitReport::Pod {
                ns_index: 0,
                pod_index: 1,
                sample: LogSample::new(
                    "web",
                    Some("api-1".into()),
                    Outcome::IssueFound,
                    "ERROR disk full",
                ),
            },
            UnitReport::Listing {
                ns_index: 1,
                listing: PodListing::Failed(LogSample::new(
                    "batch",
                    None,
                    Outcome::Error,
                    "forbidden",
                )),
            },
            UnitReport::Listing {
                ns_index: 2,
                listing: PodListing::Listed {
                    found: 0,
                    selected: vec![],
                },
            },
        ]
    }

    fn sample_set(order: impl Iterator<Item = UnitReport>) -> SampleSet {
        let mut set = SampleSet::new(&names(&["web", "batch", "idle"]));
        for report in order {
            set.merge(report);
        }
        set
    }

    #[test]
    fn test_empty_scan_uses_fallback() {
        let summary = aggregate(&SampleSet::new(&[]), context());
        assert_eq!(render_digest(&summary, None), NO_DATA_DIGEST);
        assert_eq!(
            render_digest(&summary, Some(&ClusterSnapshot::default())),
            NO_DATA_DIGEST
        );
    }

    #[test]
    fn test_counts_and_flags() {
        let summary = aggregate(&sample_set(reports().into_iter()), context());
        assert_eq!(summary.namespaces_attempted, 3);
        assert_eq!(summary.pods_checked, 2);
        assert_eq!(
            summary.pods_checked,
            summary.namespaces.iter().map(|n| n.pods_checked).sum::<usize>()
        );
        assert_eq!(summary.flagged.len(), 1);
        assert_eq!(summary.flagged[0].subject(), "web/api-1");
        assert_eq!(summary.failed_namespaces(), vec!["batch"]);

        let totals = summary.totals();
        assert_eq!(totals.issues, 1);
        assert_eq!(totals.normal, 1);
        assert_eq!(totals.errors, 1);
    }

    #[test]
    fn test_digest_is_independent_of_completion_order() {
        let forward = aggregate(&sample_set(reports().into_iter()), context());
        let backward = aggregate(&sample_set(reports().into_iter().rev()), context());
        let a = render_digest(&forward, None);
        let b = render_digest(&backward, None);
        assert_eq!(a, b);
        assert_eq!(a, render_digest(&forward, None));
    }

    #[test]
    fn test_digest_layout() {
        let summary = aggregate(&sample_set(reports().into_iter()), context());
        let digest = render_digest(&summary, None);
        let expected = "\
=== CLUSTER SCAN SUMMARY ===
Namespaces scanned: 3
Total pods checked: 2
Time range: 1h
Scan completed at: 12:30:45

=== SCANNING 5 NAMESPACES ===
=== PRIORITY NAMESPACES: web, batch, idle ===

=== NAMESPACE web: Found 4 pods ===
--- web/api-0 (Normal) ---
GET /healthz 200 in 3ms...
--- web/api-1 (ISSUES FOUND) ---
ERROR disk full

=== NAMESPACE batch: Error getting pods ===
forbidden

=== NAMESPACE idle: No pods found ===
";
        assert_eq!(digest, expected);
    }

    #[test]
    fn test_unavailable_snapshot_still_reported() {
        let summary = aggregate(&sample_set(reports().into_iter()), context());
        let digest = render_digest(&summary, Some(&ClusterSnapshot::default()));
        assert!(digest.ends_with(&format!("\n{}\n", SNAPSHOT_FALLBACK)));
        assert!(digest.contains("=== NAMESPACE web: Found 4 pods ==="));
    }

    #[test]
    fn test_short_normal_preview_is_omitted() {
        let mut set = SampleSet::new(&names(&["ns"]));
        set.merge(UnitReport::Listing {
            ns_index: 0,
            listing: PodListing::Listed {
                found: 1,
                selected: names(&["p"]),
            },
        });
        set.merge(UnitReport::Pod {
            ns_index: 0,
            pod_index: 0,
            sample: LogSample::new("ns", Some("p".into()), Outcome::Normal, " ok \n"),
        });
        let digest = render_digest(&aggregate(&set, context()), None);
        assert!(!digest.contains("ns/p"));
        assert!(digest.contains("Total pods checked: 1"));
    }

    #[test]
    fn test_severity_suggestion() {
        let summary = aggregate(&sample_set(reports().into_iter()), context());
        assert_eq!(summary.suggested_severity(), Severity::High);

        let mut set = SampleSet::new(&names(&["ns"]));
        set.merge(UnitReport::Pod {
            ns_index: 0,
            pod_index: 0,
            sample: LogSample::new(
                "ns",
                Some("p".into()),
                Outcome::IssueFound,
                "Back-off restarting failed container",
            ),
        });
        assert_eq!(
            aggregate(&set, context()).suggested_severity(),
            Severity::Critical
        );

        let mut set = SampleSet::new(&names(&["ns"]));
        set.merge(UnitReport::Pod {
            ns_index: 0,
            pod_index: 0,
            sample: LogSample::new("ns", Some("p".into()), Outcome::Normal, "all quiet here"),
        });
        assert_eq!(aggregate(&set, context()).suggested_severity(), Severity::Info);

        set.deadline_expired = true;
        assert_eq!(aggregate(&set, context()).suggested_severity(), Severity::Low);
    }
}

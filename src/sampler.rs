use crate::classifier::classify;
use crate::config::ScanSettings;
use crate::error::ScanError;
use crate::fetcher;
use crate::kubernetes::ClusterApi;
use crate::types::{CLASSIFY_BUDGET, LogSample, NamespaceRef, Outcome, PodRef};
use crate::utils::truncate_chars;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Result of listing one namespace's pods.
#[derive(Debug, Clone, PartialEq)]
pub enum PodListing {
    Listed { found: usize, selected: Vec<PodRef> },
    /// Namespace-level Error or Timeout sample.
    Failed(LogSample),
}

/// One finished unit of work, tagged with its position in the scan.
#[derive(Debug, Clone)]
pub enum UnitReport {
    Listing {
        ns_index: usize,
        listing: PodListing,
    },
    Pod {
        ns_index: usize,
        pod_index: usize,
        sample: LogSample,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceSamples {
    pub namespace: NamespaceRef,
    /// `None` if the scan deadline passed before the listing finished.
    pub listing: Option<PodListing>,
    /// Keyed by the pod's position in the listing.
    pub pods: BTreeMap<usize, LogSample>,
}

impl NamespaceSamples {
    /// The namespace failure, if any, followed by pod samples in discovery order.
    pub fn ordered(&self) -> impl Iterator<Item = &LogSample> {
        let failure = match &self.listing {
            Some(PodListing::Failed(sample)) => Some(sample),
            _ => None,
        };
        failure.into_iter().chain(self.pods.values())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleSet {
    /// In prioritized namespace order.
    pub namespaces: Vec<NamespaceSamples>,
    pub deadline_expired: bool,
}

impl SampleSet {
    pub fn new(namespaces: &[NamespaceRef]) -> Self {
        Self {
            namespaces: namespaces
                .iter()
                .map(|ns| NamespaceSamples {
                    namespace: ns.clone(),
                    listing: None,
                    pods: BTreeMap::new(),
                })
                .collect(),
            deadline_expired: false,
        }
    }

    /// Record a report at its key. Reports for unknown positions are dropped.
    pub fn merge(&mut self, report: UnitReport) {
        match report {
            UnitReport::Listing { ns_index, listing } => {
                if let Some(ns) = self.namespaces.get_mut(ns_index) {
                    ns.listing = Some(listing);
                }
            }
            UnitReport::Pod {
                ns_index,
                pod_index,
                sample,
            } => {
                if let Some(ns) = self.namespaces.get_mut(ns_index) {
                    ns.pods.insert(pod_index, sample);
                }
            }
        }
    }

    /// Pods whose log fetch finished, whatever the outcome.
    pub fn pods_queried(&self) -> usize {
        self.namespaces.iter().map(|ns| ns.pods.len()).sum()
    }

    pub fn samples(&self) -> impl Iterator<Item = &LogSample> {
        self.namespaces.iter().flat_map(|ns| ns.ordered())
    }
}

/// First `limit` pods in discovery order, optionally restricted to one pod name.
pub fn select_pods(pods: &[PodRef], limit: usize, only: Option<&str>) -> Vec<PodRef> {
    pods.iter()
        .filter(|p| only.is_none_or(|name| p.as_str() == name))
        .take(limit)
        .cloned()
        .collect()
}

/// Turn one log fetch result into a sample.
pub fn assess_logs(namespace: &str, pod: &str, fetched: Result<String, ScanError>) -> LogSample {
    let pod = Some(pod.to_string());
    match fetched {
        Err(err) if err.is_timeout() => {
            LogSample::new(namespace, pod, Outcome::Timeout, &err.to_string())
        }
        Err(err) => LogSample::new(namespace, pod, Outcome::Error, &err.to_string()),
        Ok(text) if text.trim().is_empty() => LogSample::new(namespace, pod, Outcome::Empty, ""),
        Ok(text) => {
            let window = truncate_chars(&text, CLASSIFY_BUDGET);
            LogSample::new(namespace, pod, classify(window), window)
        }
    }
}

/// Samples pod logs across namespaces.
///
/// Every pod listing and log fetch runs concurrently behind one shared
/// semaphore and reports a [`UnitReport`] over a channel. Reports are folded
/// into a [`SampleSet`] keyed by position, so completion order never shows.
pub struct PodLogSampler {
    api: Arc<dyn ClusterApi>,
    settings: ScanSettings,
}

impl PodLogSampler {
    pub fn new(api: Arc<dyn ClusterApi>, settings: ScanSettings) -> Self {
        Self { api, settings }
    }

    /// Sample `namespaces`. Never fails; unfinished work at `deadline` is dropped.
    pub async fn sample(&self, namespaces: &[NamespaceRef], deadline: Option<Instant>) -> SampleSet {
        let permits = Semaphore::new(self.settings.max_concurrency.max(1));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let work = join_all(
            namespaces
                .iter()
                .enumerate()
                .map(|(ns_index, ns)| self.sample_namespace(ns_index, ns, &permits, tx.clone())),
        );
        let finished = match deadline {
            Some(at) => tokio::time::timeout_at(at, work).await.is_ok(),
            None => {
                work.await;
                true
            }
        };
        drop(tx);

        let mut set = SampleSet::new(namespaces);
        while let Some(report) = rx.recv().await {
            set.merge(report);
        }
        if !finished {
            warn!(
                "Scan deadline reached with {} pod samples collected; aggregating partial results",
                set.pods_queried()
            );
            set.deadline_expired = true;
        }
        set
    }

    async fn sample_namespace(
        &self,
        ns_index: usize,
        namespace: &str,
        permits: &Semaphore,
        tx: mpsc::UnboundedSender<UnitReport>,
    ) {
        let listed = {
            let _permit = permits.acquire().await.ok();
            fetcher::list_pods(self.api.as_ref(), namespace, self.settings.timeouts.pod_list).await
        };

        let pods = match listed {
            Ok(pods) => pods,
            Err(err) => {
                let outcome = if err.is_timeout() {
                    Outcome::Timeout
                } else {
                    Outcome::Error
                };
                let sample = LogSample::new(namespace, None, outcome, &err.to_string());
                let _ = tx.send(UnitReport::Listing {
                    ns_index,
                    listing: PodListing::Failed(sample),
                });
                return;
            }
        };

        let selected = select_pods(
            &pods,
            self.settings.pods_per_namespace,
            self.settings.pod.as_deref(),
        );
        debug!(
            namespace,
            found = pods.len(),
            selected = selected.len(),
            "Listed pods"
        );
        let _ = tx.send(UnitReport::Listing {
            ns_index,
            listing: PodListing::Listed {
                found: pods.len(),
                selected: selected.clone(),
            },
        });

        join_all(selected.iter().enumerate().map(|(pod_index, pod)| {
            let tx = tx.clone();
            async move {
                let sample = self.sample_pod(namespace, pod, permits).await;
                let _ = tx.send(UnitReport::Pod {
                    ns_index,
                    pod_index,
                    sample,
                });
            }
        }))
        .await;
    }

    async fn sample_pod(&self, namespace: &str, pod: &str, permits: &Semaphore) -> LogSample {
        let _permit = permits.acquire().await.ok();
        let bound = self.settings.timeouts.log_fetch;
        let fetched = match tokio::time::timeout(
            bound,
            self.api
                .fetch_pod_logs(namespace, pod, &self.settings.window),
        )
        .await
        {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(ScanError::PerCallError(format!("{:#}", e))),
            Err(_) => Err(ScanError::PerCallTimeout(bound)),
        };

        let sample = assess_logs(namespace, pod, fetched);
        debug!(namespace, pod, outcome = %sample.outcome, "Sampled pod logs");
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timeouts;
    use crate::tests::{FakeCluster, Reply};
    use std::time::Duration;

    fn settings() -> ScanSettings {
        ScanSettings {
            timeouts: Timeouts {
                discovery: Duration::from_millis(100),
                pod_list: Duration::from_millis(100),
                log_fetch: Duration::from_millis(100),
                snapshot: Duration::from_millis(100),
            },
            ..Default::default()
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_at_most_three_pods_per_namespace() {
        let pods: Vec<String> = (0..10).map(|i| format!("pod-{}", i)).collect();
        let pod_refs: Vec<&str> = pods.iter().map(String::as_str).collect();
        let api = Arc::new(FakeCluster::new().with_pods("busy", &pod_refs));
        let sampler = PodLogSampler::new(api.clone(), settings());

        let set = sampler.sample(&names(&["busy"]), None).await;

        assert_eq!(api.log_requests().len(), 3);
        assert_eq!(set.pods_queried(), 3);
        assert_eq!(
            set.namespaces[0].listing,
            Some(PodListing::Listed {
                found: 10,
                selected: names(&["pod-0", "pod-1", "pod-2"]),
            })
        );
    }

    #[tokio::test]
    async fn test_unreachable_namespace_is_isolated() {
        let api = Arc::new(
            FakeCluster::new()
                .with_pods("ok", &["web-1"])
                .with_logs("ok", "web-1", "serving requests")
                .with_pod_reply("down", Reply::Hang)
                .with_pods("also-ok", &["db-1"])
                .with_logs("also-ok", "db-1", "ready for connections"),
        );
        let sampler = PodLogSampler::new(api, settings());

        let set = sampler.sample(&names(&["ok", "down", "also-ok"]), None).await;

        let down: Vec<_> = set.namespaces[1].ordered().collect();
        assert_eq!(down.len(), 1);
        assert_eq!(down[0].outcome, Outcome::Timeout);
        assert!(down[0].pod.is_none());

        assert_eq!(set.namespaces[0].pods[&0].outcome, Outcome::Normal);
        assert_eq!(set.namespaces[2].pods[&0].outcome, Outcome::Normal);
        assert!(!set.deadline_expired);
    }

    #[tokio::test]
    async fn test_pod_outcomes() {
        let api = Arc::new(
            FakeCluster::new()
                .with_pods("ns", &["crashy", "quiet", "stuck", "gone", "fine"])
                .with_logs("ns", "crashy", "panic: CRASH imminent")
                .with_logs("ns", "quiet", "   \n")
                .with_log_reply("ns", "stuck", Reply::Hang)
                .with_log_reply("ns", "gone", Reply::Fail("pods \"gone\" not found".into()))
                .with_logs("ns", "fine", "listening on :8080"),
        );
        let sampler = PodLogSampler::new(
            api,
            ScanSettings {
                pods_per_namespace: 5,
                ..settings()
            },
        );

        let set = sampler.sample(&names(&["ns"]), None).await;
        let outcomes: Vec<Outcome> = set.samples().map(|s| s.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                Outcome::IssueFound,
                Outcome::Empty,
                Outcome::Timeout,
                Outcome::Error,
                Outcome::Normal
            ]
        );
        assert!(set.namespaces[0].pods[&3].content.contains("not found"));
    }

    #[tokio::test]
    async fn test_content_is_truncated_before_classification() {
        let noisy = format!("{}error at the very end", "a".repeat(450));
        let api = Arc::new(
            FakeCluster::new()
                .with_pods("ns", &["p"])
                .with_logs("ns", "p", &noisy),
        );
        let sampler = PodLogSampler::new(api, settings());

        let set = sampler.sample(&names(&["ns"]), None).await;
        let sample = &set.namespaces[0].pods[&0];
        assert_eq!(sample.outcome, Outcome::Normal);
        assert_eq!(sample.content.chars().count(), CLASSIFY_BUDGET);
    }

    #[tokio::test]
    async fn test_pod_focus() {
        let api = Arc::new(FakeCluster::new().with_pods("ns", &["a", "b", "c", "d"]));
        let sampler = PodLogSampler::new(
            api.clone(),
            ScanSettings {
                pod: Some("d".to_string()),
                ..settings()
            },
        );

        sampler.sample(&names(&["ns"]), None).await;
        assert_eq!(
            api.log_requests(),
            vec![("ns".to_string(), "d".to_string())]
        );
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let mut fake = FakeCluster::new();
        for ns in ["a", "b", "c", "d"] {
            fake = fake.with_pods(ns, &["p1", "p2", "p3"]);
            for pod in ["p1", "p2", "p3"] {
                fake = fake.with_log_reply(
                    ns,
                    pod,
                    Reply::Delay(Duration::from_millis(10), "ok".to_string()),
                );
            }
        }
        let api = Arc::new(fake);
        let sampler = PodLogSampler::new(
            api.clone(),
            ScanSettings {
                max_concurrency: 2,
                ..settings()
            },
        );

        let set = sampler.sample(&names(&["a", "b", "c", "d"]), None).await;
        assert_eq!(set.pods_queried(), 12);
        assert!(api.max_in_flight() <= 2, "saw {}", api.max_in_flight());
    }

    #[tokio::test]
    async fn test_deadline_keeps_completed_work() {
        let api = Arc::new(
            FakeCluster::new()
                .with_pods("fast", &["p"])
                .with_logs("fast", "p", "ok")
                .with_pods("slow", &["p"])
                .with_log_reply("slow", "p", Reply::Hang),
        );
        let sampler = PodLogSampler::new(
            api,
            ScanSettings {
                timeouts: Timeouts {
                    log_fetch: Duration::from_secs(30),
                    ..settings().timeouts
                },
                ..settings()
            },
        );

        let deadline = Instant::now() + Duration::from_millis(100);
        let set = sampler.sample(&names(&["fast", "slow"]), Some(deadline)).await;

        assert!(set.deadline_expired);
        assert_eq!(set.namespaces[0].pods.len(), 1);
        assert!(set.namespaces[1].pods.is_empty());
        assert!(matches!(
            set.namespaces[1].listing,
            Some(PodListing::Listed { found: 1, .. })
        ));
    }

    #[test]
    fn test_merge_is_order_independent() {
        let namespaces = names(&["a", "b"]);
        let reports = vec![
            UnitReport::Listing {
                ns_index: 0,
                listing: PodListing::Listed {
                    found: 2,
                    selected: names(&["a1", "a2"]),
                },
            },
            UnitReport::Pod {
                ns_index: 0,
                pod_index: 1,
                sample: LogSample::new("a", Some("a2".into()), Outcome::Normal, "two"),
            },
            UnitReport::Pod {
                ns_index: 0,
                pod_index: 0,
                sample: LogSample::new("a", Some("a1".into()), Outcome::IssueFound, "error"),
            },
            UnitReport::Listing {
                ns_index: 1,
                listing: PodListing::Failed(LogSample::new("b", None, Outcome::Error, "denied")),
            },
        ];

        let mut forward = SampleSet::new(&namespaces);
        for r in reports.iter().cloned() {
            forward.merge(r);
        }
        let mut backward = SampleSet::new(&namespaces);
        for r in reports.into_iter().rev() {
            backward.merge(r);
        }

        assert_eq!(forward, backward);
        let order: Vec<String> = forward.samples().map(|s| s.subject()).collect();
        assert_eq!(order, vec!["a/a1", "a/a2", "b"]);
    }

    #[test]
    fn test_select_pods() {
        let pods = names(&["a", "b", "c", "d"]);
        assert_eq!(select_pods(&pods, 3, None), names(&["a", "b", "c"]));
        assert_eq!(select_pods(&pods, 3, Some("c")), names(&["c"]));
        assert!(select_pods(&pods, 3, Some("zzz")).is_empty());
    }
}

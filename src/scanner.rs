use crate::aggregator::{ScanContext, ScanSummary, aggregate, render_digest};
use crate::config::ScanSettings;
use crate::error::ScanError;
use crate::fetcher;
use crate::kubernetes::ClusterApi;
use crate::prioritizer::{explicit_namespaces, prioritize_namespaces};
use crate::sampler::{PodLogSampler, SampleSet};
use crate::snapshot::{self, ClusterSnapshot};
use crate::types::ScanPhase;
use chrono::{DateTime, Local, Utc};
use std::fmt::Write;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info};

pub struct ScanReport {
    pub phase: ScanPhase,
    pub summary: ScanSummary,
    pub snapshot: ClusterSnapshot,
    pub digest: String,
}

/// Namespace discovery failed, so nothing was sampled.
#[derive(Debug, Error)]
#[error("scan failed: {error}")]
pub struct ScanFailure {
    #[source]
    pub error: ScanError,
    pub time_range: String,
    pub snapshot: ClusterSnapshot,
    pub completed_at: DateTime<Local>,
}

impl ScanFailure {
    pub fn digest(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== CLUSTER SCAN FAILED ===");
        let _ = writeln!(out, "Reason: {}", self.error);
        let _ = writeln!(out, "Time range: {}", self.time_range);
        let _ = writeln!(
            out,
            "Scan completed at: {}",
            self.completed_at.format("%H:%M:%S")
        );
        out.push('\n');
        out.push_str(&self.snapshot.render(self.completed_at.with_timezone(&Utc)));
        out.push('\n');
        out
    }
}

struct Lifecycle {
    phase: ScanPhase,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            phase: ScanPhase::Idle,
        }
    }

    fn advance(&mut self, next: ScanPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal scan transition {} -> {}",
            self.phase,
            next
        );
        debug!("Scan {} -> {}", self.phase, next);
        self.phase = next;
    }
}

struct Collected {
    lifecycle: Lifecycle,
    discovered: Option<usize>,
    samples: SampleSet,
}

pub struct Scanner {
    api: Arc<dyn ClusterApi>,
    settings: ScanSettings,
}

impl Scanner {
    pub fn new(api: Arc<dyn ClusterApi>, settings: ScanSettings) -> Self {
        Self { api, settings }
    }

    /// Run a scan. Only an unreachable cluster is an error; every per-pod and
    /// per-namespace problem ends up in the summary instead.
    pub async fn run(&self) -> Result<ScanReport, ScanFailure> {
        let started = Instant::now();
        let deadline = self.settings.deadline.map(|d| started + d);

        let (snapshot, collected) = tokio::join!(
            snapshot::capture(self.api.as_ref(), self.settings.timeouts.snapshot, deadline),
            self.collect(deadline),
        );
        let completed_at = Local::now();

        let Collected {
            mut lifecycle,
            discovered,
            mut samples,
        } = match collected {
            Ok(collected) => collected,
            Err(error) => {
                error!("Scan aborted: {}", error);
                return Err(ScanFailure {
                    error,
                    time_range: self.settings.time_range.clone(),
                    snapshot,
                    completed_at,
                });
            }
        };

        lifecycle.advance(ScanPhase::Aggregating);
        samples.deadline_expired |= snapshot.deadline_expired;
        let summary = aggregate(
            &samples,
            ScanContext {
                namespaces_discovered: discovered,
                time_range: self.settings.time_range.clone(),
                elapsed: started.elapsed(),
                completed_at,
            },
        );
        let digest = render_digest(&summary, Some(&snapshot));
        lifecycle.advance(ScanPhase::Complete);

        let totals = summary.totals();
        info!(
            namespaces = summary.namespaces_attempted,
            pods = summary.pods_checked,
            flagged = totals.issues,
            failed = totals.errors + totals.timeouts,
            "Scan complete in {:.1}s",
            summary.elapsed.as_secs_f64()
        );

        Ok(ScanReport {
            phase: lifecycle.phase,
            summary,
            snapshot,
            digest,
        })
    }

    async fn collect(&self, deadline: Option<Instant>) -> Result<Collected, ScanError> {
        let mut lifecycle = Lifecycle::new();
        lifecycle.advance(ScanPhase::Discovering);

        let (targets, discovered) = match &self.settings.namespaces {
            Some(requested) => {
                lifecycle.advance(ScanPhase::Prioritizing);
                (explicit_namespaces(requested), None)
            }
            None => {
                // discovery gets no more time than the scan has left
                let bound = deadline.map_or(self.settings.timeouts.discovery, |d| {
                    self.settings
                        .timeouts
                        .discovery
                        .min(d.saturating_duration_since(Instant::now()))
                });
                let all = match fetcher::discover_namespaces(self.api.as_ref(), bound).await
                {
                    Ok(all) => all,
                    Err(e) => {
                        lifecycle.advance(ScanPhase::Failed);
                        return Err(e);
                    }
                };
                lifecycle.advance(ScanPhase::Prioritizing);
                let selected = prioritize_namespaces(&all);
                info!(
                    "Scanning {} of {} namespaces: {}",
                    selected.len(),
                    all.len(),
                    selected.join(", ")
                );
                (selected, Some(all.len()))
            }
        };

        lifecycle.advance(ScanPhase::Sampling);
        let sampler = PodLogSampler::new(self.api.clone(), self.settings.clone());
        let samples = sampler.sample(&targets, deadline).await;

        Ok(Collected {
            lifecycle,
            discovered,
            samples,
        })
    }
}

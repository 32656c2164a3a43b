use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;

use crate::rewrite::RewriteErrorKind;
use crate::utils::now_epoch_ms;

const DEFAULT_WINDOW_SIZE: usize = 256;
const REWRITE_P95_TARGET_MS: u64 = 10_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencySummary {
    pub samples: usize,
    pub average_ms: u64,
    pub p95_ms: u64,
    pub max_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub generated_at_ms: u64,
    pub rewrite_latency: LatencySummary,
    pub detection_latency: LatencySummary,
    pub submissions: u64,
    pub rewrite_successes: u64,
    pub rewrite_failures: BTreeMap<&'static str, u64>,
    pub stale_results_discarded: u64,
    pub detection_fallbacks: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
struct LatencyWindow {
    values: VecDeque<u64>,
    capacity: usize,
}

impl LatencyWindow {
    fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn record(&mut self, value_ms: u64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value_ms);
    }

    fn summary(&self) -> LatencySummary {
        let samples = self.values.len();
        if samples == 0 {
            return LatencySummary::default();
        }

        let mut sorted: Vec<u64> = self.values.iter().copied().collect();
        sorted.sort_unstable();
        let p95_rank = (samples as f64 * 0.95).ceil() as usize;
        let p95_ms = sorted[p95_rank.saturating_sub(1).min(samples - 1)];

        LatencySummary {
            samples,
            average_ms: sorted.iter().sum::<u64>() / samples as u64,
            p95_ms,
            max_ms: sorted[samples - 1],
        }
    }
}

#[derive(Debug)]
pub struct RuntimeMetrics {
    rewrite_ms: LatencyWindow,
    detection_ms: LatencyWindow,
    submissions: u64,
    rewrite_successes: u64,
    rewrite_failures: BTreeMap<RewriteErrorKind, u64>,
    stale_results_discarded: u64,
    detection_fallbacks: u64,
}

impl RuntimeMetrics {
    pub fn new() -> Self {
        Self {
            rewrite_ms: LatencyWindow::new(DEFAULT_WINDOW_SIZE),
            detection_ms: LatencyWindow::new(DEFAULT_WINDOW_SIZE),
            submissions: 0,
            rewrite_successes: 0,
            rewrite_failures: BTreeMap::new(),
            stale_results_discarded: 0,
            detection_fallbacks: 0,
        }
    }

    pub fn record_submission(&mut self) {
        self.submissions += 1;
    }

    pub fn record_rewrite(&mut self, latency_ms: u64, failure: Option<RewriteErrorKind>) {
        self.rewrite_ms.record(latency_ms);
        match failure {
            None => self.rewrite_successes += 1,
            Some(kind) => *self.rewrite_failures.entry(kind).or_insert(0) += 1,
        }
    }

    pub fn record_detection(&mut self, latency_ms: u64, degraded: bool) {
        self.detection_ms.record(latency_ms);
        if degraded {
            self.detection_fallbacks += 1;
        }
    }

    pub fn record_stale_result(&mut self) {
        self.stale_results_discarded += 1;
    }

    pub fn report(&self) -> PerformanceReport {
        let rewrite_latency = self.rewrite_ms.summary();
        let detection_latency = self.detection_ms.summary();

        let mut warnings = Vec::new();
        if rewrite_latency.samples > 0 && rewrite_latency.p95_ms > REWRITE_P95_TARGET_MS {
            warnings.push(format!(
                "Rewrite P95 latency {}ms exceeded target {}ms.",
                rewrite_latency.p95_ms, REWRITE_P95_TARGET_MS
            ));
        }
        if self.detection_fallbacks > 0 {
            warnings.push(format!(
                "AI detection fell back to a placeholder result {} time(s).",
                self.detection_fallbacks
            ));
        }

        PerformanceReport {
            generated_at_ms: now_epoch_ms(),
            rewrite_latency,
            detection_latency,
            submissions: self.submissions,
            rewrite_successes: self.rewrite_successes,
            rewrite_failures: self
                .rewrite_failures
                .iter()
                .map(|(kind, count)| (kind.code(), *count))
                .collect(),
            stale_results_discarded: self.stale_results_discarded,
            detection_fallbacks: self.detection_fallbacks,
            warnings,
        }
    }
}

impl Default for RuntimeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

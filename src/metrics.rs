//! Decision counters and latency statistics for the risk engine.

use crate::models::combiner::ScoreCombiner;
use crate::types::decision::{Disposition, ModelScores};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

const MAX_SAMPLES: usize = 10_000;

/// Metrics collector shared by all workers
pub struct EngineMetrics {
    /// Transfers that reached a decision
    pub decisions: AtomicU64,
    pub approved: AtomicU64,
    pub stepped_up: AtomicU64,
    pub blocked: AtomicU64,
    /// Decisions made without models
    pub degraded: AtomicU64,
    /// Transfers refused because the sending account is on hold
    pub rejected: AtomicU64,
    /// Transfers whose scoring failed
    pub failures: AtomicU64,
    pub freezes_issued: AtomicU64,
    /// Explanations replaced by the generic reason
    pub explanation_fallbacks: AtomicU64,
    /// Payloads that could not be parsed
    pub malformed: AtomicU64,
    /// Decision latency (in microseconds)
    decision_times: RwLock<Vec<u64>>,
    /// Risk score distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    /// 1 - std dev of the three model scores
    model_agreements: RwLock<Vec<f64>>,
    start_time: Instant,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            decisions: AtomicU64::new(0),
            approved: AtomicU64::new(0),
            stepped_up: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            degraded: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            freezes_issued: AtomicU64::new(0),
            explanation_fallbacks: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            decision_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            model_agreements: RwLock::new(Vec::with_capacity(1000)),
            start_time: Instant::now(),
        }
    }

    pub fn record_decision(
        &self,
        disposition: Disposition,
        risk_score: f64,
        elapsed: Duration,
        degraded: bool,
    ) {
        self.decisions.fetch_add(1, Ordering::Relaxed);
        let counter = match disposition {
            Disposition::Approve => &self.approved,
            Disposition::StepUpVerification => &self.stepped_up,
            Disposition::Block => &self.blocked,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if degraded {
            self.degraded.fetch_add(1, Ordering::Relaxed);
        }

        {
            let mut times = self.decision_times.write();
            times.push(elapsed.as_micros() as u64);
            if times.len() > MAX_SAMPLES {
                times.drain(0..MAX_SAMPLES / 2);
            }
        }

        if !degraded {
            let bucket = (risk_score.clamp(0.0, 1.0) * 10.0).min(9.0) as usize;
            self.score_buckets.write()[bucket] += 1;
        }
    }

    pub fn record_model_agreement(&self, scores: &ModelScores) {
        let agreement = 1.0 - ScoreCombiner::spread(scores).min(1.0);

        let mut agreements = self.model_agreements.write();
        agreements.push(agreement);
        if agreements.len() > 1000 {
            agreements.drain(0..500);
        }
    }

    pub fn record_rejection(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_freeze(&self) {
        self.freezes_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_explanation_fallback(&self) {
        self.explanation_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_latency_stats(&self) -> LatencyStats {
        let mut sorted = self.decision_times.read().clone();
        if sorted.is_empty() {
            return LatencyStats::default();
        }
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: at(0.5),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    pub fn get_avg_agreement(&self) -> f64 {
        let agreements = self.model_agreements.read();
        if agreements.is_empty() {
            return 0.0;
        }
        agreements.iter().sum::<f64>() / agreements.len() as f64
    }

    /// Decisions per second since startup
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.decisions.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_score_distribution(&self) -> [u64; 10] {
        *self.score_buckets.read()
    }

    pub fn print_summary(&self) {
        let decisions = self.decisions.load(Ordering::Relaxed);
        let pct = |n: u64| {
            if decisions > 0 {
                (n as f64 / decisions as f64) * 100.0
            } else {
                0.0
            }
        };
        let approved = self.approved.load(Ordering::Relaxed);
        let stepped_up = self.stepped_up.load(Ordering::Relaxed);
        let blocked = self.blocked.load(Ordering::Relaxed);

        let latency = self.get_latency_stats();
        let score_dist = self.get_score_distribution();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║              TRANSFER RISK ENGINE - METRICS SUMMARY          ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Decisions: {:>8}  │  Throughput: {:>6.1} tx/s              ║",
            decisions,
            self.get_throughput()
        );
        info!("║   APPROVE:              {:>8} ({:>5.1}%)", approved, pct(approved));
        info!("║   STEP_UP_VERIFICATION: {:>8} ({:>5.1}%)", stepped_up, pct(stepped_up));
        info!("║   BLOCK:                {:>8} ({:>5.1}%)", blocked, pct(blocked));
        info!(
            "║ Degraded: {}  Rejected (hold): {}  Failed: {}  Malformed: {}",
            self.degraded.load(Ordering::Relaxed),
            self.rejected.load(Ordering::Relaxed),
            self.failures.load(Ordering::Relaxed),
            self.malformed.load(Ordering::Relaxed)
        );
        info!(
            "║ Freezes issued: {}  Explanation fallbacks: {}",
            self.freezes_issued.load(Ordering::Relaxed),
            self.explanation_fallbacks.load(Ordering::Relaxed)
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Decision Time (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5}",
            latency.mean_us, latency.p50_us, latency.p95_us, latency.p99_us
        );
        info!(
            "║ Model Agreement: {:>5.1}% (higher = models agree more)",
            self.get_avg_agreement() * 100.0
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Risk Score Distribution:                                     ║");
        let total: u64 = score_dist.iter().sum();
        for (i, &count) in score_dist.iter().enumerate() {
            let share = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar: String = "█".repeat(((share / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                share,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Prints a summary every `interval_secs`
pub struct MetricsReporter {
    metrics: Arc<EngineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<EngineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs: interval_secs.max(1),
        }
    }

    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

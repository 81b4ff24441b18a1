use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pipeline stage timed by the metrics collector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Decode,
    Detect,
    Recognize,
    Process,
    Translate,
    Compose,
    Encode,
}

impl Stage {
    const ALL: [Stage; 7] = [
        Stage::Decode,
        Stage::Detect,
        Stage::Recognize,
        Stage::Process,
        Stage::Translate,
        Stage::Compose,
        Stage::Encode,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn name(self) -> &'static str {
        match self {
            Stage::Decode => "decode",
            Stage::Detect => "detect",
            Stage::Recognize => "recognize",
            Stage::Process => "process",
            Stage::Translate => "translate",
            Stage::Compose => "compose",
            Stage::Encode => "encode",
        }
    }
}

/// Running total for one stage; constant size however many samples arrive
#[derive(Default)]
struct StageTotals {
    sum_ms: AtomicU64,
    count: AtomicU64,
}

impl StageTotals {
    fn record(&self, duration: Duration) {
        self.sum_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    fn avg_ms(&self) -> u64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return 0;
        }
        self.sum_ms.load(Ordering::Relaxed) / count
    }
}

/// Global metrics collector for the service.
///
/// Thread-safe and cheap to clone; every request handler shares one instance.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    requests_total: AtomicUsize,
    requests_success: AtomicUsize,
    requests_failed: AtomicUsize,
    requests_rejected: AtomicUsize,

    bubbles_processed: AtomicUsize,
    bubbles_skipped: AtomicUsize,

    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,

    stage_totals: [StageTotals; 7],
    translations_by_method: DashMap<String, AtomicUsize>,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                requests_total: AtomicUsize::new(0),
                requests_success: AtomicUsize::new(0),
                requests_failed: AtomicUsize::new(0),
                requests_rejected: AtomicUsize::new(0),
                bubbles_processed: AtomicUsize::new(0),
                bubbles_skipped: AtomicUsize::new(0),
                cache_hits: AtomicUsize::new(0),
                cache_misses: AtomicUsize::new(0),
                stage_totals: Default::default(),
                translations_by_method: DashMap::new(),
                start_time: Instant::now(),
            }),
        }
    }

    // Request outcomes
    pub fn record_request_success(&self) {
        self.inner.requests_total.fetch_add(1, Ordering::Relaxed);
        self.inner.requests_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_failure(&self) {
        self.inner.requests_total.fetch_add(1, Ordering::Relaxed);
        self.inner.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_rejected(&self) {
        self.inner.requests_total.fetch_add(1, Ordering::Relaxed);
        self.inner.requests_rejected.fetch_add(1, Ordering::Relaxed);
    }

    // Bubble counters
    pub fn record_bubble_processed(&self) {
        self.inner.bubbles_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bubble_skipped(&self) {
        self.inner.bubbles_skipped.fetch_add(1, Ordering::Relaxed);
    }

    // Translation cache
    pub fn record_cache_hit(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_translation(&self, method: &str) {
        self.inner
            .translations_by_method
            .entry(method.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stage(&self, stage: Stage, duration: Duration) {
        self.inner.stage_totals[stage.index()].record(duration);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let stage_avg_ms = Stage::ALL
            .iter()
            .map(|stage| {
                (
                    stage.name().to_string(),
                    self.inner.stage_totals[stage.index()].avg_ms(),
                )
            })
            .collect();

        let translations_by_method = self
            .inner
            .translations_by_method
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();

        let cache_hits = self.inner.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.inner.cache_misses.load(Ordering::Relaxed);
        let cache_total = cache_hits + cache_misses;
        let cache_hit_rate = if cache_total > 0 {
            cache_hits as f64 / cache_total as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            requests_total: self.inner.requests_total.load(Ordering::Relaxed),
            requests_success: self.inner.requests_success.load(Ordering::Relaxed),
            requests_failed: self.inner.requests_failed.load(Ordering::Relaxed),
            requests_rejected: self.inner.requests_rejected.load(Ordering::Relaxed),
            bubbles_processed: self.inner.bubbles_processed.load(Ordering::Relaxed),
            bubbles_skipped: self.inner.bubbles_skipped.load(Ordering::Relaxed),
            cache_hits,
            cache_misses,
            cache_hit_rate,
            stage_avg_ms,
            translations_by_method,
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = format!(
            r#"# HELP requests_total Total number of translate requests
# TYPE requests_total counter
requests_total {{}} {}

# HELP requests_success Translate requests that returned an image
# TYPE requests_success counter
requests_success {{}} {}

# HELP requests_failed Translate requests that failed during processing
# TYPE requests_failed counter
requests_failed {{}} {}

# HELP requests_rejected Translate requests rejected by validation
# TYPE requests_rejected counter
requests_rejected {{}} {}

# HELP bubbles_processed_total Bubbles rendered back into a page
# TYPE bubbles_processed_total counter
bubbles_processed_total {{}} {}

# HELP bubbles_skipped_total Detected regions with no area inside the page
# TYPE bubbles_skipped_total counter
bubbles_skipped_total {{}} {}

# HELP cache_hit_rate Translation cache hit rate (0.0 to 1.0)
# TYPE cache_hit_rate gauge
cache_hit_rate {{}} {}

# HELP stage_avg_duration_ms Average stage duration in milliseconds
# TYPE stage_avg_duration_ms gauge
"#,
            snapshot.requests_total,
            snapshot.requests_success,
            snapshot.requests_failed,
            snapshot.requests_rejected,
            snapshot.bubbles_processed,
            snapshot.bubbles_skipped,
            snapshot.cache_hit_rate,
        );

        for (stage, avg_ms) in &snapshot.stage_avg_ms {
            out.push_str(&format!(
                "stage_avg_duration_ms {{stage=\"{}\"}} {}\n",
                stage, avg_ms
            ));
        }

        out.push_str(
            "\n# HELP translations_total Translations performed per method\n# TYPE translations_total counter\n",
        );
        for (method, count) in &snapshot.translations_by_method {
            out.push_str(&format!(
                "translations_total {{method=\"{}\"}} {}\n",
                method, count
            ));
        }

        out.push_str(&format!(
            "\n# HELP uptime_seconds Application uptime in seconds\n# TYPE uptime_seconds counter\nuptime_seconds {{}} {}\n",
            snapshot.uptime_seconds
        ));
        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub requests_total: usize,
    pub requests_success: usize,
    pub requests_failed: usize,
    pub requests_rejected: usize,
    pub bubbles_processed: usize,
    pub bubbles_skipped: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub cache_hit_rate: f64,
    pub stage_avg_ms: BTreeMap<String, u64>,
    pub translations_by_method: BTreeMap<String, usize>,
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = Metrics::new();

        metrics.record_request_success();
        metrics.record_request_failure();
        metrics.record_request_rejected();
        metrics.record_bubble_processed();
        metrics.record_bubble_processed();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        metrics.record_translation("google");
        metrics.record_translation("google");
        metrics.record_stage(Stage::Detect, Duration::from_millis(40));
        metrics.record_stage(Stage::Detect, Duration::from_millis(60));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 3);
        assert_eq!(snapshot.requests_success, 1);
        assert_eq!(snapshot.requests_failed, 1);
        assert_eq!(snapshot.requests_rejected, 1);
        assert_eq!(snapshot.bubbles_processed, 2);
        assert_eq!(snapshot.cache_hit_rate, 0.5);
        assert_eq!(snapshot.stage_avg_ms["detect"], 50);
        assert_eq!(snapshot.stage_avg_ms["encode"], 0);
        assert_eq!(snapshot.translations_by_method["google"], 2);
    }

    #[test]
    fn test_stage_average_over_many_samples() {
        let metrics = Metrics::new();
        for i in 0..100_000u64 {
            // Alternating 10ms / 30ms samples average to 20ms
            let ms = if i % 2 == 0 { 10 } else { 30 };
            metrics.record_stage(Stage::Compose, Duration::from_millis(ms));
        }
        metrics.record_stage(Stage::Translate, Duration::from_millis(7));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.stage_avg_ms["compose"], 20);
        assert_eq!(snapshot.stage_avg_ms["translate"], 7);
        assert_eq!(snapshot.stage_avg_ms["recognize"], 0);
        assert_eq!(
            metrics.inner.stage_totals[Stage::Compose.index()]
                .count
                .load(Ordering::Relaxed),
            100_000
        );
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.record_request_success();
        metrics.record_translation("bing");

        let prometheus = metrics.to_prometheus();
        assert!(prometheus.contains("requests_total {} 1"));
        assert!(prometheus.contains("translations_total {method=\"bing\"} 1"));
        assert!(prometheus.contains("stage_avg_duration_ms {stage=\"compose\"} 0"));
    }
}

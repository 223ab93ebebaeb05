use ahash::AHashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

// ---------------------------------------------------------------------------
// Metric names
// ---------------------------------------------------------------------------

/// Ticks by outcome: `processed`, `idle` or `error`.
pub const TICKS_TOTAL: &str = "helpdesk_ticks_total";
/// Processed tickets by decision.
pub const DECISIONS_TOTAL: &str = "helpdesk_decisions_total";
pub const TICK_ERRORS_TOTAL: &str = "helpdesk_tick_errors_total";
pub const TICK_DURATION_SECONDS: &str = "helpdesk_tick_duration_seconds";
/// Stale `Processing` tickets moved back to `Queued`.
pub const REQUEUED_TOTAL: &str = "helpdesk_requeued_total";
/// Tickets per status at the last snapshot.
pub const QUEUE_TICKETS: &str = "helpdesk_queue_tickets";

// ---------------------------------------------------------------------------
// Histogram
// ---------------------------------------------------------------------------

/// Cumulative-bucket histogram with an atomically updated `f64` sum.
#[derive(Debug)]
pub struct Histogram {
    pub buckets: Vec<f64>,
    pub counts: Vec<AtomicU64>,
    pub sum: AtomicU64,
    pub count: AtomicU64,
}

impl Histogram {
    pub fn new(buckets: Vec<f64>) -> Self {
        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        // sum is stored as f64 bits
        let _ = self
            .sum
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some((f64::from_bits(current) + value).to_bits())
            });
        for (i, boundary) in self.buckets.iter().enumerate() {
            if value <= *boundary {
                self.counts[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn get_sum(&self) -> f64 {
        f64::from_bits(self.sum.load(Ordering::Relaxed))
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Tick durations range from sub-millisecond (empty queue) to seconds (slow disk).
fn tick_duration_buckets() -> Vec<f64> {
    vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
}

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// Sorted `key=value` pairs distinguishing series of one metric.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Labels(Vec<(String, String)>);

impl Labels {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        let mut v: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        v.sort_by(|a, b| a.0.cmp(&b.0));
        Self(v)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// `{key="value",key2="value2"}`, or nothing for an empty set.
    pub fn prometheus_str(&self) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        let inner: Vec<String> = self
            .0
            .iter()
            .map(|(k, v)| format!("{k}=\"{v}\""))
            .collect();
        format!("{{{}}}", inner.join(","))
    }
}

type SeriesKey = (String, Labels);

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn sorted_keys<V>(map: &AHashMap<SeriesKey, V>) -> Vec<&SeriesKey> {
    let mut keys: Vec<&SeriesKey> = map.keys().collect();
    keys.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1 .0.cmp(&b.1 .0)));
    keys
}

// ---------------------------------------------------------------------------
// MetricsCollector
// ---------------------------------------------------------------------------

/// Process-wide counters, gauges and histograms.
#[derive(Debug)]
pub struct MetricsCollector {
    counters: RwLock<AHashMap<SeriesKey, AtomicU64>>,
    gauges: RwLock<AHashMap<SeriesKey, AtomicI64>>,
    histograms: RwLock<AHashMap<String, Histogram>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(AHashMap::new()),
            gauges: RwLock::new(AHashMap::new()),
            histograms: RwLock::new(AHashMap::new()),
        }
    }

    /// A collector with the tick duration histogram registered.
    pub fn with_defaults() -> Self {
        let collector = Self::new();
        write(&collector.histograms).insert(
            TICK_DURATION_SECONDS.to_string(),
            Histogram::new(tick_duration_buckets()),
        );
        collector
    }

    // -- Counters -----------------------------------------------------------

    pub fn increment_counter(&self, name: &str, labels: &[(&str, &str)]) {
        self.increment_counter_by(name, labels, 1);
    }

    pub fn increment_counter_by(&self, name: &str, labels: &[(&str, &str)], amount: u64) {
        let key = (name.to_string(), Labels::new(labels));
        {
            let map = read(&self.counters);
            if let Some(c) = map.get(&key) {
                c.fetch_add(amount, Ordering::Relaxed);
                return;
            }
        }
        write(&self.counters)
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(amount, Ordering::Relaxed);
    }

    pub fn get_counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = (name.to_string(), Labels::new(labels));
        read(&self.counters)
            .get(&key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    // -- Gauges -------------------------------------------------------------

    pub fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: i64) {
        let key = (name.to_string(), Labels::new(labels));
        {
            let map = read(&self.gauges);
            if let Some(g) = map.get(&key) {
                g.store(value, Ordering::Relaxed);
                return;
            }
        }
        write(&self.gauges)
            .entry(key)
            .or_insert_with(|| AtomicI64::new(0))
            .store(value, Ordering::Relaxed);
    }

    pub fn get_gauge(&self, name: &str, labels: &[(&str, &str)]) -> i64 {
        let key = (name.to_string(), Labels::new(labels));
        read(&self.gauges)
            .get(&key)
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    // -- Histograms ---------------------------------------------------------

    /// Record into `name`, creating it with the tick duration buckets if needed.
    pub fn record_histogram(&self, name: &str, value: f64) {
        {
            let map = read(&self.histograms);
            if let Some(h) = map.get(name) {
                h.observe(value);
                return;
            }
        }
        write(&self.histograms)
            .entry(name.to_string())
            .or_insert_with(|| Histogram::new(tick_duration_buckets()))
            .observe(value);
    }

    pub fn histogram_count(&self, name: &str) -> u64 {
        read(&self.histograms)
            .get(name)
            .map(Histogram::get_count)
            .unwrap_or(0)
    }

    // -- Export --------------------------------------------------------------

    /// Prometheus text exposition format, series sorted by name then labels.
    pub fn export_prometheus(&self) -> String {
        let mut out = String::new();

        {
            let map = read(&self.counters);
            let mut last_name: Option<&str> = None;
            for key in sorted_keys(&map) {
                if last_name != Some(key.0.as_str()) {
                    out.push_str(&format!("# TYPE {} counter\n", key.0));
                    last_name = Some(key.0.as_str());
                }
                let value = map[key].load(Ordering::Relaxed);
                out.push_str(&format!("{}{} {}\n", key.0, key.1.prometheus_str(), value));
            }
        }

        {
            let map = read(&self.gauges);
            let mut last_name: Option<&str> = None;
            for key in sorted_keys(&map) {
                if last_name != Some(key.0.as_str()) {
                    out.push_str(&format!("# TYPE {} gauge\n", key.0));
                    last_name = Some(key.0.as_str());
                }
                let value = map[key].load(Ordering::Relaxed);
                out.push_str(&format!("{}{} {}\n", key.0, key.1.prometheus_str(), value));
            }
        }

        {
            let map = read(&self.histograms);
            let mut names: Vec<&String> = map.keys().collect();
            names.sort();
            for name in names {
                let h = &map[name];
                out.push_str(&format!("# TYPE {name} histogram\n"));
                for (i, boundary) in h.buckets.iter().enumerate() {
                    // counts are already cumulative: observe() bumps every bucket >= value
                    let count = h.counts[i].load(Ordering::Relaxed);
                    out.push_str(&format!("{name}_bucket{{le=\"{boundary}\"}} {count}\n"));
                }
                out.push_str(&format!("{name}_bucket{{le=\"+Inf\"}} {}\n", h.get_count()));
                out.push_str(&format!("{name}_sum {}\n", h.get_sum()));
                out.push_str(&format!("{name}_count {}\n", h.get_count()));
            }
        }

        out
    }

    /// All series as JSON, for `status`-style dumps.
    pub fn export_json(&self) -> serde_json::Value {
        let series_key = |(name, labels): &SeriesKey| format!("{name}{}", labels.prometheus_str());

        let counters: serde_json::Map<String, serde_json::Value> = read(&self.counters)
            .iter()
            .map(|(k, v)| (series_key(k), serde_json::json!(v.load(Ordering::Relaxed))))
            .collect();
        let gauges: serde_json::Map<String, serde_json::Value> = read(&self.gauges)
            .iter()
            .map(|(k, v)| (series_key(k), serde_json::json!(v.load(Ordering::Relaxed))))
            .collect();
        let histograms: serde_json::Map<String, serde_json::Value> = read(&self.histograms)
            .iter()
            .map(|(name, h)| {
                (
                    name.clone(),
                    serde_json::json!({ "sum": h.get_sum(), "count": h.get_count() }),
                )
            })
            .collect();

        serde_json::json!({
            "counters": counters,
            "gauges": gauges,
            "histograms": histograms,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// The process-wide collector.
pub fn global_metrics() -> &'static MetricsCollector {
    use std::sync::OnceLock;
    static INSTANCE: OnceLock<MetricsCollector> = OnceLock::new();
    INSTANCE.get_or_init(MetricsCollector::with_defaults)
}

//! Metric series kinds and their statistics

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Trend,
    Rate,
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Trend => "trend",
            MetricKind::Rate => "rate",
            MetricKind::Counter => "counter",
        }
    }
}

/// Full sample set of a distribution, in milliseconds for latencies
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trend {
    samples: Vec<f64>,
}

impl Trend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_samples(samples: impl IntoIterator<Item = f64>) -> Self {
        Self {
            samples: samples.into_iter().collect(),
        }
    }

    pub fn add(&mut self, value: f64) {
        self.samples.push(value);
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn min(&self) -> Option<f64> {
        self.samples.iter().copied().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.samples.iter().copied().reduce(f64::max)
    }

    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    pub fn median(&self) -> Option<f64> {
        self.percentile(50.0)
    }

    /// Exact percentile for `p` in [0, 100]
    pub fn percentile(&self, p: f64) -> Option<f64> {
        percentile_of_sorted(&self.sorted(), p)
    }

    /// All summary statistics from a single sort
    pub fn summary(&self) -> TrendSummary {
        let sorted = self.sorted();
        TrendSummary {
            count: sorted.len(),
            min: sorted.first().copied(),
            max: sorted.last().copied(),
            avg: self.mean(),
            med: percentile_of_sorted(&sorted, 50.0),
            p90: percentile_of_sorted(&sorted, 90.0),
            p95: percentile_of_sorted(&sorted, 95.0),
            p99: percentile_of_sorted(&sorted, 99.0),
        }
    }

    fn sorted(&self) -> Vec<f64> {
        let mut sorted = self.samples.clone();
        sorted.sort_by(f64::total_cmp);
        sorted
    }
}

/// Linear interpolation between the closest ranks
fn percentile_of_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = (p.clamp(0.0, 100.0) / 100.0) * last as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Ratio of `true` samples to all samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rate {
    hits: u64,
    total: u64,
}

impl Rate {
    pub fn add(&mut self, hit: bool) {
        self.total += 1;
        if hit {
            self.hits += 1;
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.hits as f64 / self.total as f64)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counter {
    value: u64,
}

impl Counter {
    pub fn add(&mut self, n: u64) {
        self.value += n;
    }

    pub fn value(&self) -> u64 {
        self.value
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricSeries {
    Trend(Trend),
    Rate(Rate),
    Counter(Counter),
}

impl MetricSeries {
    pub fn empty(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Trend => MetricSeries::Trend(Trend::new()),
            MetricKind::Rate => MetricSeries::Rate(Rate::default()),
            MetricKind::Counter => MetricSeries::Counter(Counter::default()),
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            MetricSeries::Trend(_) => MetricKind::Trend,
            MetricSeries::Rate(_) => MetricKind::Rate,
            MetricSeries::Counter(_) => MetricKind::Counter,
        }
    }

    pub fn summary(&self) -> MetricSummary {
        match self {
            MetricSeries::Trend(trend) => MetricSummary::Trend(trend.summary()),
            MetricSeries::Rate(rate) => MetricSummary::Rate {
                rate: rate.rate(),
                hits: rate.hits(),
                total: rate.total(),
            },
            MetricSeries::Counter(counter) => MetricSummary::Counter {
                count: counter.value(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSummary {
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub med: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

/// Report view of one series
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetricSummary {
    Trend(TrendSummary),
    Rate {
        rate: Option<f64>,
        hits: u64,
        total: u64,
    },
    Counter {
        count: u64,
    },
}

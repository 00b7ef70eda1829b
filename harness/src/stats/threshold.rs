//! Threshold rules evaluated against the final metrics
//!
//! Expressions take the form `<aggregate> <op> <limit>`, for example
//! `p(95)<1500`, `avg <= 500` or `rate<0.05`.

use std::fmt;

use serde::Serialize;

use crate::config::ConfigurationError;

use super::series::{MetricKind, MetricSeries};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregate {
    Avg,
    Min,
    Max,
    Med,
    Percentile(f64),
    Rate,
    Count,
}

impl Aggregate {
    fn parse(s: &str) -> Option<Self> {
        let aggregate = match s {
            "avg" => Aggregate::Avg,
            "min" => Aggregate::Min,
            "max" => Aggregate::Max,
            "med" => Aggregate::Med,
            "rate" => Aggregate::Rate,
            "count" => Aggregate::Count,
            other => {
                let inner = other.strip_prefix('p')?;
                let inner = inner
                    .strip_prefix('(')
                    .and_then(|i| i.strip_suffix(')'))
                    .unwrap_or(inner);
                let p: f64 = inner.trim().parse().ok()?;
                if !(0.0..=100.0).contains(&p) {
                    return None;
                }
                Aggregate::Percentile(p)
            }
        };
        Some(aggregate)
    }

    /// Value of this aggregate over `series`, `None` when it has no samples.
    /// Errors when the aggregate does not apply to the series kind.
    fn observe(&self, series: &MetricSeries) -> Result<Option<f64>, String> {
        match (self, series) {
            (Aggregate::Avg, MetricSeries::Trend(t)) => Ok(t.mean()),
            (Aggregate::Min, MetricSeries::Trend(t)) => Ok(t.min()),
            (Aggregate::Max, MetricSeries::Trend(t)) => Ok(t.max()),
            (Aggregate::Med, MetricSeries::Trend(t)) => Ok(t.median()),
            (Aggregate::Percentile(p), MetricSeries::Trend(t)) => Ok(t.percentile(*p)),
            (Aggregate::Count, MetricSeries::Trend(t)) => Ok(Some(t.count() as f64)),
            (Aggregate::Rate, MetricSeries::Rate(r)) => Ok(r.rate()),
            (Aggregate::Count, MetricSeries::Rate(r)) => Ok(Some(r.total() as f64)),
            (Aggregate::Count, MetricSeries::Counter(c)) => Ok(Some(c.value() as f64)),
            (aggregate, series) => Err(format!(
                "{} does not apply to a {} series",
                aggregate,
                series.kind().as_str()
            )),
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregate::Avg => f.write_str("avg"),
            Aggregate::Min => f.write_str("min"),
            Aggregate::Max => f.write_str("max"),
            Aggregate::Med => f.write_str("med"),
            Aggregate::Percentile(p) => write!(f, "p({})", p),
            Aggregate::Rate => f.write_str("rate"),
            Aggregate::Count => f.write_str("count"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }

    pub fn holds(&self, observed: f64, limit: f64) -> bool {
        match self {
            Comparison::Lt => observed < limit,
            Comparison::Le => observed <= limit,
            Comparison::Gt => observed > limit,
            Comparison::Ge => observed >= limit,
            Comparison::Eq => observed == limit,
            Comparison::Ne => observed != limit,
        }
    }

    /// Operator at the start of `s` and its length
    fn split(s: &str) -> Option<(Self, usize)> {
        let two = s.get(..2);
        let op = match two {
            Some("<=") => (Comparison::Le, 2),
            Some(">=") => (Comparison::Ge, 2),
            Some("==") => (Comparison::Eq, 2),
            Some("!=") => (Comparison::Ne, 2),
            _ => match s.chars().next()? {
                '<' => (Comparison::Lt, 1),
                '>' => (Comparison::Gt, 1),
                _ => return None,
            },
        };
        Some(op)
    }
}

/// One pass/fail rule on a named series
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSpec {
    pub metric: String,
    pub aggregate: Aggregate,
    pub comparison: Comparison,
    pub limit: f64,
}

impl ThresholdSpec {
    pub fn parse(metric: &str, expression: &str) -> Result<Self, ConfigurationError> {
        let invalid = || ConfigurationError::InvalidThreshold {
            metric: metric.to_string(),
            expression: expression.to_string(),
        };

        let metric = metric.trim();
        if metric.is_empty() {
            return Err(invalid());
        }

        let expr = expression.trim();
        let op_start = expr.find(['<', '>', '=', '!']).ok_or_else(invalid)?;
        let (comparison, op_len) = Comparison::split(&expr[op_start..]).ok_or_else(invalid)?;
        let aggregate = Aggregate::parse(expr[..op_start].trim()).ok_or_else(invalid)?;
        let limit: f64 = expr[op_start + op_len..]
            .trim()
            .parse()
            .map_err(|_| invalid())?;
        if !limit.is_finite() {
            return Err(invalid());
        }

        Ok(Self {
            metric: metric.to_string(),
            aggregate,
            comparison,
            limit,
        })
    }

    pub fn expression(&self) -> String {
        format!("{}{}{}", self.aggregate, self.comparison.as_str(), self.limit)
    }

    /// Check this rule against the final state of its series
    pub fn evaluate(&self, series: Option<&MetricSeries>) -> ThresholdResult {
        let observed = match series {
            Some(series) => self.aggregate.observe(series),
            // A counter that never fired counted nothing
            None if self.aggregate == Aggregate::Count => Ok(Some(0.0)),
            None => Ok(None),
        };

        let (passed, observed, reason) = match observed {
            Ok(Some(value)) => {
                let passed = self.comparison.holds(value, self.limit);
                let reason = (!passed).then(|| {
                    format!(
                        "{} was {:.2}, required {} {}",
                        self.aggregate,
                        value,
                        self.comparison.as_str(),
                        self.limit
                    )
                });
                (passed, Some(value), reason)
            }
            Ok(None) => (true, None, Some("no samples".to_string())),
            Err(reason) => (false, None, Some(reason)),
        };

        ThresholdResult {
            metric: self.metric.clone(),
            expression: self.expression(),
            passed,
            observed,
            reason,
        }
    }

    /// Series kinds this rule can be checked against
    pub fn applies_to(&self, kind: MetricKind) -> bool {
        matches!(
            (self.aggregate, kind),
            (Aggregate::Count, _)
                | (Aggregate::Rate, MetricKind::Rate)
                | (
                    Aggregate::Avg
                        | Aggregate::Min
                        | Aggregate::Max
                        | Aggregate::Med
                        | Aggregate::Percentile(_),
                    MetricKind::Trend
                )
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    pub passed: bool,
    pub observed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Outcome of evaluating every threshold of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdReport {
    pub passed: bool,
    pub results: Vec<ThresholdResult>,
}

impl ThresholdReport {
    pub fn from_results(results: Vec<ThresholdResult>) -> Self {
        Self {
            passed: results.iter().all(|r| r.passed),
            results,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}

//! Console summary of a finished run

use crate::stats::MetricSummary;

use super::report::RunReport;

const RULE: &str = "═══════════════════════════════════════════════════════════════";

fn ms(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}ms", v))
        .unwrap_or_else(|| "-".to_string())
}

/// Print a human-readable summary of `report` to stdout
pub fn print_summary(report: &RunReport) {
    println!();
    println!("{}", RULE);
    println!(
        " RUN {} ({} on {}, {:.1}s of {:.0}s planned)",
        report.test_type.to_uppercase(),
        report.run_id,
        report.environment,
        report.duration_secs,
        report.planned_duration_secs
    );
    println!("{}", RULE);
    println!();
    println!(
        "   Actors:       peak {}, spawned {}, interrupted {}",
        report.actors.peak, report.actors.spawned, report.actors.interrupted
    );
    println!("   Iterations:   {}", report.iterations);
    println!("   Requests:     {}", report.http_reqs);
    if let Some(rate) = report.failure_rate {
        println!("   Failed:       {:.2}%", rate * 100.0);
    }
    println!();

    println!(" ─── Metrics ─────────────────────────────────────────────────");
    println!();
    for (name, summary) in &report.metrics {
        match summary {
            MetricSummary::Trend(t) => println!(
                "   {:40} avg={} med={} p(90)={} p(95)={} p(99)={} max={} n={}",
                name,
                ms(t.avg),
                ms(t.med),
                ms(t.p90),
                ms(t.p95),
                ms(t.p99),
                ms(t.max),
                t.count
            ),
            MetricSummary::Rate { rate, hits, total } => println!(
                "   {:40} {} ({}/{})",
                name,
                rate.map(|r| format!("{:.2}%", r * 100.0))
                    .unwrap_or_else(|| "-".to_string()),
                hits,
                total
            ),
            MetricSummary::Counter { count } => println!("   {:40} {}", name, count),
        }
    }
    println!();

    if !report.thresholds.is_empty() {
        println!(" ─── Thresholds ──────────────────────────────────────────────");
        println!();
        for result in &report.thresholds {
            let mark = if result.passed { "✓" } else { "✗" };
            let observed = result
                .observed
                .map(|v| format!("{:.3}", v))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "   {} {:30} {:20} observed {}",
                mark, result.metric, result.expression, observed
            );
            if let Some(reason) = result.reason.as_ref().filter(|_| !result.passed) {
                println!("       {}", reason);
            }
        }
        println!();
    }

    println!("{}", RULE);
    println!(" OVERALL: {}", if report.passed { "PASS" } else { "FAIL" });
    println!("{}", RULE);
    println!();
}

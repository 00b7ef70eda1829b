use std::process::ExitCode;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use taskload::config::HarnessConfig;
use taskload::runner::print_summary;
use taskload::{HttpBackend, RunController, TaskBackend};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit code for configuration problems, distinct from a failed run
const CONFIG_ERROR_EXIT: u8 = 2;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskload=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = match HarnessConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return Ok(ExitCode::from(CONFIG_ERROR_EXIT));
        }
    };
    let run_config = match config.run_config() {
        Ok(run_config) => run_config,
        Err(e) => {
            error!("Invalid run configuration: {}", e);
            return Ok(ExitCode::from(CONFIG_ERROR_EXIT));
        }
    };
    info!(
        "Loaded configuration: env={}, backend={}, test_type={}",
        config.environment,
        config.target.backend_url,
        config.test_type.as_str()
    );

    // Live metrics are optional; the report is the result
    if let Some(addr) = config.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        info!("Prometheus exporter listening on {}", addr);
    }

    let backend: Arc<dyn TaskBackend> = match HttpBackend::new(config.target.clone()) {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            return Ok(ExitCode::from(CONFIG_ERROR_EXIT));
        }
    };

    let controller = RunController::new(run_config, backend);
    let report = match controller.run().await {
        Ok(report) => report,
        Err(e) => {
            error!("Run aborted: {}", e);
            return Ok(ExitCode::from(CONFIG_ERROR_EXIT));
        }
    };

    print_summary(&report);
    let json = report.to_json()?;
    println!("JSON: {}", json);

    if let Some(ref path) = config.report_path {
        tokio::fs::write(path, &json).await?;
        info!("Report written to {:?}", path);
    }

    Ok(ExitCode::from(report.exit_code()))
}

use clap::Parser;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use netprobe_insight::config::{CommandLineArgs, Config};
use netprobe_insight::services::query_engine::QueryPipeline;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let _ = dotenvy::dotenv();
    let args = CommandLineArgs::parse();

    // Load configuration first
    let config = Config::load(&args)?;

    // Initialize logging. Logs go to stderr so stdout carries only the JSON output.
    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    // Held until main returns so buffered file logs are flushed
    let mut _guard = None;
    if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let log_dir = log_path
            .parent()
            .and_then(|p| p.to_str())
            .filter(|p| !p.is_empty())
            .unwrap_or("logs");
        let file_name = log_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("netprobe-insight.log");
        // Rolling appender adds the date suffix
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        _guard = Some(guard);
        registry
            .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)).init();
    }
    tracing::info!("NetProbe Insight starting up");
    tracing::info!("Configuration loaded successfully");

    let question = args
        .question
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| anyhow::anyhow!("a question is required, e.g. netprobe-insight \"近1小时各运营商丢包率\""))?;

    let pipeline = QueryPipeline::from_config(&config).await?;

    match pipeline.run(question).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            tracing::info!("Quality summary:\n{}", output.report.render_summary());
            Ok(())
        },
        Err(e) => {
            let body = json!({
                "stage": e.stage(),
                "error": e.to_string(),
                "report": e.quality_report(),
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
            Err(anyhow::anyhow!("{} stage failed: {}", e.stage(), e))
        },
    }
}

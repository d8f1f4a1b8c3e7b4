//! Feedback pipeline: one-shot batch runner.
//!
//! Reads a JSON array of raw feedback items, ingests and analyses them, then prints the
//! ranked action plan as JSON on stdout.
//!
//! Usage: `feedback-pipeline <items.json>`

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feedback_pipeline::analyze::build_gateway_from_env;
use feedback_pipeline::{InMemoryStore, PipelineConfig, PipelineManager};

/// Logs go to stderr so stdout stays clean JSON.
/// `LOG_FORMAT=json` switches to JSON lines; filtering follows `RUST_LOG`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // no-op when there is no .env
    let _ = dotenvy::dotenv();
    init_tracing();

    let Some(path) = std::env::args().nth(1) else {
        bail!("usage: feedback-pipeline <items.json>");
    };
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let items: Vec<Value> =
        serde_json::from_str(&raw).with_context(|| format!("{path} is not a JSON array"))?;

    let cfg = PipelineConfig::load_default().context("loading pipeline config")?;
    let gateway = build_gateway_from_env(
        Duration::from_millis(cfg.engine.task_timeout_ms),
        cfg.analyzer.daily_limit,
    );
    let store = Arc::new(InMemoryStore::new());
    let pipeline = PipelineManager::new(cfg, store, gateway)?;

    pipeline.initialize().await?;
    let mut batch = Map::new();
    batch.insert("input_file".into(), Value::String(path.clone()));
    let result = pipeline.process_incoming(&items, &batch, true).await?;
    info!(
        accepted = result.accepted,
        rejected = result.rejected,
        "waiting for analysis to finish"
    );

    pipeline.wait_idle(Duration::from_millis(50)).await;
    let scores = pipeline.prioritize().await?;
    let plan = pipeline.plan(&scores, None);
    pipeline.shutdown().await?;

    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

//! Quizhive server binary.
//!
//! Usage:
//!     quizhive --bind 127.0.0.1:8000 --secret-key <secret> \
//!         --generator-api-key <key>

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use quizhive::{AppState, ServerArgs};
use quizhive_logging::LogConfig;

/// How often the periodic job GC runs.
const JOB_GC_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();

    quizhive_logging::init_logging(LogConfig {
        app_name: "quizhive",
        verbose: args.verbose,
        log_to_file: args.log_file,
    })?;

    tracing::info!("Starting quizhive server");
    tracing::info!("  Bind: {}", args.bind);
    tracing::info!("  Database: {}", args.database_url());
    tracing::info!("  Workers: {}", args.max_workers);

    std::fs::create_dir_all(quizhive_logging::quizhive_home())
        .context("failed to create quizhive home directory")?;

    let state = AppState::build(&args).await?;

    // Periodic GC of terminal jobs.
    let jobs = state.jobs.clone();
    let ttl = chrono::Duration::hours(args.job_ttl_hours);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(JOB_GC_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            jobs.cleanup(ttl);
        }
    });

    quizhive::http::serve(state, &args.bind).await
}

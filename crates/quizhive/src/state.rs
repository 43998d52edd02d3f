//! Root object wiring the components together.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use quizhive_generator::{ChatCompletionsGenerator, GeneratorConfig, QuestionGenerator};
use quizhive_jobs::{JobManager, JobManagerConfig, SupplyController};
use quizhive_push::PushHub;
use quizhive_store::Store;
use quizhive_telemetry::{AlertThresholds, Metrics, SystemSample};

use crate::auth::TokenVerifier;
use crate::config::ServerArgs;

/// Everything the handlers need. Cloning is cheap; all components are
/// shared behind `Arc`s (the store carries its own pool).
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub jobs: Arc<JobManager>,
    pub supply: Arc<SupplyController>,
    pub push: Arc<PushHub>,
    pub metrics: Arc<Metrics>,
    pub thresholds: Arc<AlertThresholds>,
    pub auth: Arc<TokenVerifier>,
    /// Whether a generation API key is configured (for the detailed
    /// health probe).
    pub generator_configured: bool,
    pub admin_cleanup_ttl: chrono::Duration,
}

impl AppState {
    /// Wire the production stack from CLI args.
    pub async fn build(args: &ServerArgs) -> Result<Self> {
        let store = Store::open(&args.database_url())
            .await
            .with_context(|| format!("failed to open store at {}", args.database_url()))?;

        let mut generator_config = GeneratorConfig::new(
            args.generator_url.clone(),
            args.generator_model.clone(),
            args.generator_api_key.clone(),
        );
        generator_config.timeout = Duration::from_secs(args.generator_timeout_secs);
        let generator_configured = args.generator_api_key.is_some();
        let generator: Arc<dyn QuestionGenerator> =
            Arc::new(ChatCompletionsGenerator::new(generator_config));

        let manager_config = JobManagerConfig {
            workers: args.max_workers,
            ..JobManagerConfig::default()
        };

        let state = Self::assemble(
            store,
            generator,
            &args.secret_key,
            manager_config,
            generator_configured,
            chrono::Duration::hours(args.admin_cleanup_ttl_hours),
        )
        .with_thresholds(AlertThresholds {
            max_active_jobs: args.alert_max_active_jobs,
            min_success_rate: args.alert_min_success_rate,
            max_duplicate_ratio: args.alert_max_duplicate_ratio,
            max_push_streams: args.alert_max_push_streams,
        });
        Ok(state)
    }

    /// Replace the default alert thresholds.
    pub fn with_thresholds(mut self, thresholds: AlertThresholds) -> Self {
        self.thresholds = Arc::new(thresholds);
        self
    }

    /// Assemble the state from explicit components. Tests use this with
    /// an in-memory store and a scripted generator.
    pub fn assemble(
        store: Store,
        generator: Arc<dyn QuestionGenerator>,
        secret_key: &str,
        manager_config: JobManagerConfig,
        generator_configured: bool,
        admin_cleanup_ttl: chrono::Duration,
    ) -> Self {
        let push = Arc::new(PushHub::new());
        let metrics = Arc::new(Metrics::new());
        let jobs = JobManager::new(
            store.clone(),
            generator,
            Arc::clone(&push),
            Arc::clone(&metrics),
            manager_config,
        );
        let supply = Arc::new(SupplyController::new(store.clone(), Arc::clone(&jobs)));

        Self {
            store,
            jobs,
            supply,
            push,
            metrics,
            thresholds: Arc::new(AlertThresholds::default()),
            auth: Arc::new(TokenVerifier::new(secret_key)),
            generator_configured,
            admin_cleanup_ttl,
        }
    }

    /// Gather the live numbers alert evaluation needs.
    pub fn sample(&self) -> SystemSample {
        SystemSample {
            metrics: self.metrics.snapshot(),
            active_jobs: self.jobs.active_jobs(),
            push_streams: self.push.stream_count(),
        }
    }
}

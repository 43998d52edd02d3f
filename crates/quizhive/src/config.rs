//! Server configuration: CLI flags with environment fallbacks.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "quizhive", about = "Trivia question supply server")]
pub struct ServerArgs {
    /// HTTP bind address.
    #[arg(long, env = "QUIZHIVE_BIND", default_value = "127.0.0.1:8000")]
    pub bind: String,

    /// Database URL (sqlite:/path/to/db?mode=rwc). Defaults to a file
    /// under the quizhive home directory.
    #[arg(long, env = "QUIZHIVE_DATABASE")]
    pub database: Option<String>,

    /// Shared secret for bearer-token verification.
    #[arg(long, env = "QUIZHIVE_SECRET_KEY")]
    pub secret_key: String,

    /// Chat completions endpoint of the generation service.
    #[arg(
        long,
        env = "QUIZHIVE_GENERATOR_URL",
        default_value = "https://api.openai.com/v1/chat/completions"
    )]
    pub generator_url: String,

    /// Model name sent to the generation service.
    #[arg(long, env = "QUIZHIVE_GENERATOR_MODEL", default_value = "gpt-4")]
    pub generator_model: String,

    /// API key for the generation service. Without it, generation jobs
    /// will fail at the transport layer; reads still work.
    #[arg(long, env = "QUIZHIVE_GENERATOR_API_KEY")]
    pub generator_api_key: Option<String>,

    /// Per-call deadline for generation requests, in seconds.
    #[arg(long, env = "QUIZHIVE_GENERATOR_TIMEOUT_SECS", default_value_t = 30)]
    pub generator_timeout_secs: u64,

    /// Worker pool width (W).
    #[arg(long, env = "QUIZHIVE_MAX_WORKERS", default_value_t = 3)]
    pub max_workers: usize,

    /// TTL for terminal jobs before the periodic GC purges them, hours.
    #[arg(long, env = "QUIZHIVE_JOB_TTL_HOURS", default_value_t = 24)]
    pub job_ttl_hours: i64,

    /// TTL used by the admin cleanup endpoint, hours.
    #[arg(long, env = "QUIZHIVE_ADMIN_CLEANUP_TTL_HOURS", default_value_t = 1)]
    pub admin_cleanup_ttl_hours: i64,

    /// Alert when more jobs than this are Pending or Running.
    #[arg(long, env = "QUIZHIVE_ALERT_MAX_ACTIVE_JOBS", default_value_t = 15)]
    pub alert_max_active_jobs: usize,

    /// Alert when the job success rate drops below this percentage.
    #[arg(long, env = "QUIZHIVE_ALERT_MIN_SUCCESS_RATE", default_value_t = 80.0)]
    pub alert_min_success_rate: f64,

    /// Alert when the duplicate ratio exceeds this percentage.
    #[arg(long, env = "QUIZHIVE_ALERT_MAX_DUPLICATE_RATIO", default_value_t = 50.0)]
    pub alert_max_duplicate_ratio: f64,

    /// Alert when more push streams than this are open.
    #[arg(long, env = "QUIZHIVE_ALERT_MAX_PUSH_STREAMS", default_value_t = 100)]
    pub alert_max_push_streams: usize,

    /// Verbose console logging.
    #[arg(long)]
    pub verbose: bool,

    /// Also log to a file under the quizhive home directory.
    #[arg(long)]
    pub log_file: bool,
}

impl ServerArgs {
    /// The effective database URL.
    pub fn database_url(&self) -> String {
        self.database.clone().unwrap_or_else(default_db_url)
    }
}

fn default_db_url() -> String {
    let home: PathBuf = quizhive_logging::quizhive_home();
    format!("sqlite:{}?mode=rwc", home.join("quizhive.db").display())
}

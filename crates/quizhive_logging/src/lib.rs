//! Shared logging setup for the quizhive server.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str =
    "quizhive=info,quizhive_store=info,quizhive_jobs=info,quizhive_push=info";
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration for the server binary.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
    /// Also write to a log file under `QUIZHIVE_HOME/logs`.
    pub log_to_file: bool,
}

/// Initialize tracing with a stderr layer and, optionally, a size-capped
/// file writer.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if config.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new(DEFAULT_LOG_FILTER)
        }
    });

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_filter(filter);

    if config.log_to_file {
        let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
        let writer = CappedFileWriter::new(log_dir, config.app_name)
            .context("Failed to initialize log file writer")?;
        let file_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(file_filter),
            )
            .init();
    } else {
        tracing_subscriber::registry().with(stderr_layer).init();
    }

    Ok(())
}

/// The quizhive home directory: `QUIZHIVE_HOME` or `~/.quizhive`.
pub fn quizhive_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("QUIZHIVE_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".quizhive")
}

/// The logs directory: `<home>/logs`.
pub fn logs_dir() -> PathBuf {
    quizhive_home().join("logs")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// Append-only log file that rolls to `<name>.log.1` when it exceeds the
/// size cap. One previous generation is kept.
struct CappedFile {
    path: PathBuf,
    file: File,
    current_size: u64,
}

impl CappedFile {
    fn open(path: PathBuf) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let current_size = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            current_size,
        })
    }

    fn roll(&mut self) -> io::Result<()> {
        let _ = self.file.flush();
        let previous = self.path.with_extension("log.1");
        if previous.exists() {
            fs::remove_file(&previous)?;
        }
        fs::rename(&self.path, &previous)?;
        let replacement = CappedFile::open(self.path.clone())?;
        self.file = replacement.file;
        self.current_size = 0;
        Ok(())
    }
}

impl Write for CappedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.current_size + buf.len() as u64 > MAX_LOG_FILE_SIZE {
            self.roll()?;
        }
        let bytes = self.file.write(buf)?;
        self.current_size += bytes as u64;
        Ok(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

#[derive(Clone)]
struct CappedFileWriter {
    inner: Arc<Mutex<CappedFile>>,
}

impl CappedFileWriter {
    fn new(dir: PathBuf, app_name: &str) -> io::Result<Self> {
        let name: String = app_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let file = CappedFile::open(dir.join(format!("{name}.log")))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(file)),
        })
    }
}

impl Write for CappedFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut file = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        file.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CappedFileWriter {
    type Writer = CappedFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

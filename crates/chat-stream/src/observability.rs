use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

/// Logging settings read from `CHAT_STREAM_*` variables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSettings {
    /// `CHAT_STREAM_OBSERVABILITY`; only an explicit off value disables it.
    pub enabled: bool,
    /// `CHAT_STREAM_LOG_LEVEL`, falling back to `RUST_LOG`, then `info`.
    pub filter: Option<String>,
    /// `CHAT_STREAM_JSON_LOG_PATH`: JSONL file instead of compact stderr.
    pub json_path: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: None,
            json_path: None,
        }
    }
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup("CHAT_STREAM_OBSERVABILITY").is_none_or(|value| {
            !matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "no" | "off" | "disabled"
            )
        });
        Self {
            enabled,
            filter: lookup("CHAT_STREAM_LOG_LEVEL").filter(|v| !v.trim().is_empty()),
            json_path: lookup("CHAT_STREAM_JSON_LOG_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        self.filter
            .as_deref()
            .and_then(|level| EnvFilter::try_new(level).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    }
}

/// Splits a log path into the directory and file name tracing-appender wants.
fn split_log_path(path: &Path) -> (&Path, &str) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("chat-stream.logs.jsonl");
    (dir, file)
}

/// Installs the process-wide tracing subscriber from the environment, once.
pub fn init_observability() {
    init_with(&LogSettings::from_env());
}

/// Installs the process-wide subscriber from `settings`. Later calls are
/// ignored, as is a subscriber installed by someone else first.
pub fn init_with(settings: &LogSettings) {
    INIT.get_or_init(|| {
        if !settings.enabled {
            return;
        }
        // Exactly one of the two layers is present.
        let json = settings.json_path.as_deref().map(|path| {
            let (dir, file) = split_log_path(path);
            let _ = std::fs::create_dir_all(dir);
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(false)
                .with_writer(tracing_appender::rolling::never(dir, file))
        });
        let console = json.is_none().then(|| {
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr)
        });
        let _ = tracing_subscriber::registry()
            .with(settings.env_filter())
            .with(json)
            .with(console)
            .try_init();
    });
}

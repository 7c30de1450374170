//! Tracing subscriber setup for the CLI and server.
//!
//! `RUST_LOG` overrides the filter. Without it the tipjar crate logs at
//! `info` and the HTTP stack underneath only at `warn`, so RPC polling does
//! not drown session events. `TIPJAR_LOG_FORMAT` picks `compact` (default),
//! `pretty` or `json`; `TIPJAR_LOG_JSON=1` is shorthand for `json`.

use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info,hyper=warn,hyper_util=warn,reqwest=warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Format from `TIPJAR_LOG_FORMAT`, then `TIPJAR_LOG_JSON`.
    pub fn from_env() -> Self {
        Self::resolve(
            std::env::var("TIPJAR_LOG_FORMAT").ok().as_deref(),
            std::env::var("TIPJAR_LOG_JSON").ok().as_deref(),
        )
    }

    fn resolve(format: Option<&str>, json_flag: Option<&str>) -> Self {
        if let Some(format) = format.and_then(Self::parse) {
            return format;
        }
        if json_flag == Some("1") { Self::Json } else { Self::default() }
    }
}

pub fn init_logging() {
    init_logging_with(LogFormat::from_env());
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_logging_with(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = fmt::Subscriber::builder().with_env_filter(env_filter).with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().with_target(false).try_init(),
    };
}

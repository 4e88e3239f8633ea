use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Used when `RUST_LOG` is not set.
    pub log_level: String,
    pub ansi: bool,
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string(), ansi: true, with_target: false }
    }
}

/// Installs the global subscriber. Returns false if one was already set, which
/// happens in tests and is harmless.
pub fn init_tracing(config: &LogConfig) -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let stdout_layer = fmt::layer().with_target(config.with_target).with_ansi(config.ansi);

    match Registry::default().with(env_filter).with(stdout_layer).try_init() {
        Ok(()) => true,
        Err(e) => {
            let msg = e.to_string();
            if !msg.contains("already been set") {
                eprintln!("failed to initialize tracing: {e}");
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let cfg = LogConfig::default();
        init_tracing(&cfg);
        assert!(!init_tracing(&cfg));
    }
}

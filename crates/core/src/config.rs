use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LoopError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

// ── Panic policy ──────────────────────────────────────────────

/// What the main loop does when a callback panics.
///
/// The policy is fixed per loop and applied to every callback it runs,
/// whether the callback was posted directly or produced by a timer.
///
/// Parsed case-insensitively from both TOML and `MSGLOOP_ON_PANIC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PanicPolicy {
    /// Catch the panic, log it, and keep running the loop.
    #[default]
    Continue,
    /// Catch the panic, log it, shut the loop down and report it from `run`.
    Propagate,
}

impl PanicPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "continue" => Some(Self::Continue),
            "propagate" => Some(Self::Propagate),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for PanicPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "unknown panic policy '{value}', expected 'continue' or 'propagate'"
            ))
        })
    }
}

// ── Loop config ───────────────────────────────────────────────

/// Event loop configuration, typically parsed from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Loop name, used as the prefix for thread names and in log fields.
    #[serde(default = "default_name")]
    pub name: String,
    /// Offload pool size. 0 = available parallelism.
    #[serde(default)]
    pub worker_threads: usize,
    /// Callbacks running longer than this are reported. 0 disables the check.
    #[serde(default = "default_slow_callback_ms")]
    pub slow_callback_ms: u64,
    /// Behaviour when a callback panics.
    #[serde(default)]
    pub on_panic: PanicPolicy,
}

fn default_name() -> String { "msgloop".to_string() }
fn default_slow_callback_ms() -> u64 { 100 }

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            worker_threads: 0,
            slow_callback_ms: default_slow_callback_ms(),
            on_panic: PanicPolicy::default(),
        }
    }
}

impl LoopConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, LoopError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LoopError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LoopError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Build config from defaults plus environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Result<Self, LoopError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve worker thread count (0 means use available parallelism).
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.worker_threads
        }
    }

    /// Threshold above which a callback counts as slow, if enabled.
    pub fn slow_callback_threshold(&self) -> Option<Duration> {
        (self.slow_callback_ms > 0).then(|| Duration::from_millis(self.slow_callback_ms))
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Loop config loaded ({}):", self.name);
        tracing::info!("  worker_threads:   {}", self.resolved_worker_threads());
        tracing::info!("  slow_callback_ms: {}", self.slow_callback_ms);
        tracing::info!("  on_panic:         {:?}", self.on_panic);
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// - `MSGLOOP_NAME` -> `name`
    /// - `MSGLOOP_WORKER_THREADS` -> `worker_threads`
    /// - `MSGLOOP_SLOW_CALLBACK_MS` -> `slow_callback_ms`
    /// - `MSGLOOP_ON_PANIC` -> `on_panic` (`continue` or `propagate`)
    fn apply_env_overrides(&mut self) -> Result<(), LoopError> {
        if let Some(v) = env_opt("MSGLOOP_NAME") {
            self.name = v;
        }
        if let Some(v) = env_opt("MSGLOOP_WORKER_THREADS") {
            self.worker_threads = v.parse().map_err(|_| {
                LoopError::Config(format!("MSGLOOP_WORKER_THREADS is not a number: '{v}'"))
            })?;
        }
        if let Some(v) = env_opt("MSGLOOP_SLOW_CALLBACK_MS") {
            self.slow_callback_ms = v.parse().map_err(|_| {
                LoopError::Config(format!("MSGLOOP_SLOW_CALLBACK_MS is not a number: '{v}'"))
            })?;
        }
        if let Some(v) = env_opt("MSGLOOP_ON_PANIC") {
            self.on_panic = PanicPolicy::parse(&v).ok_or_else(|| {
                LoopError::Config(format!(
                    "invalid MSGLOOP_ON_PANIC '{v}', expected 'continue' or 'propagate'"
                ))
            })?;
        }
        Ok(())
    }

    /// Validate the config.
    pub fn validate(&self) -> Result<(), LoopError> {
        if self.name.trim().is_empty() {
            return Err(LoopError::Config("loop name must not be empty".into()));
        }
        if self.name.contains('\0') {
            return Err(LoopError::Config(
                "loop name must not contain NUL bytes".into(),
            ));
        }
        Ok(())
    }
}

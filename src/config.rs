//! Client configuration: in-code defaults, TOML text or files, and `FLUXLINE__*`
//! environment overrides, merged in that order.

use crate::error::ClientError;
use crate::telemetry::{noop_event_listener, ClientEventListener};

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Default number of lines that triggers a flush.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Default interval between timed flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(500);

/// Environment variable prefix, e.g. `FLUXLINE__BATCH_SIZE=100`.
pub const ENV_PREFIX: &str = "FLUXLINE";

/// Batching parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    /// Lines that trigger an immediate flush.
    pub batch_size: usize,
    /// Interval between timed flushes; zero disables the background flush.
    pub flush_interval: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

/// Configuration options for the [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Batching parameters, or `None` to transmit every write immediately.
    pub batching: Option<BatchSettings>,
    /// Tags merged into every line, in order.
    pub global_tags: Vec<(String, String)>,
    /// Structured event hook for observability (no-op by default).
    pub event_listener: Arc<dyn ClientEventListener>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            batching: None,
            global_tags: Vec::new(),
            event_listener: noop_event_listener(),
        }
    }
}

/// Client section as read from file + env. Every field optional for layering.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientFileConfig {
    /// Setting either batching field turns batching on; the other takes its default.
    pub batch_size: Option<usize>,
    pub flush_interval_ms: Option<u64>,
    /// Disables batching even when sizes are given.
    pub batching: Option<bool>,
    #[serde(default)]
    pub global_tags: BTreeMap<String, String>,
}

impl ClientFileConfig {
    /// Parses TOML text only; the environment is not consulted.
    pub fn from_toml_str(toml: &str) -> Result<Self, ClientError> {
        let merged = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Ok(merged.try_deserialize()?)
    }

    /// Loads an optional TOML file, then applies `FLUXLINE__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ClientError> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load), but reads overrides from `env` instead of the process
    /// environment when given.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ClientError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ClientError::ConfigError(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .ignore_empty(true)
                .source(env),
        );

        let merged = builder.build()?;
        Ok(merged.try_deserialize()?)
    }

    /// Merges onto `base`. Only fields that are set overwrite.
    pub fn merge_into(&self, base: &mut ClientConfig) {
        if self.batch_size.is_some() || self.flush_interval_ms.is_some() {
            let mut settings = base.batching.unwrap_or_default();
            if let Some(n) = self.batch_size {
                settings.batch_size = n;
            }
            if let Some(ms) = self.flush_interval_ms {
                settings.flush_interval = Duration::from_millis(ms);
            }
            base.batching = Some(settings);
        }
        match self.batching {
            Some(false) => base.batching = None,
            Some(true) if base.batching.is_none() => base.batching = Some(BatchSettings::default()),
            _ => {}
        }
        for (key, value) in &self.global_tags {
            base.global_tags.push((key.clone(), value.clone()));
        }
    }

    /// Builds a full config from defaults plus this partial one.
    pub fn into_client_config(self) -> ClientConfig {
        let mut config = ClientConfig::default();
        self.merge_into(&mut config);
        config
    }
}

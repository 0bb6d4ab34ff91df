//! mb-configs
//!
//! Layered runtime settings: `.env`, then `config/default.toml`, then
//! `config/local.toml`, then `MICROBLOG__*` environment variables.
//! Later layers win.

use config::{Config, Environment, File, FileFormat};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const ENV_PREFIX: &str = "MICROBLOG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub search: SearchSettings,
    pub feed: FeedSettings,
    pub log: LogSettings,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// sqlx connection url, e.g. `sqlite:microblog.db` or `sqlite::memory:`
    pub url: SecretString,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: SecretString::from("sqlite:microblog.db"),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend {
    /// Search disabled; queries return nothing and writes skip the index
    #[default]
    None,
    Memory,
    Elastic,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub backend: SearchBackend,
    /// Base url of the Elasticsearch cluster
    pub url: Option<String>,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            backend: SearchBackend::None,
            url: None,
            api_key: None,
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    pub posts_per_page: u32,
    pub reindex_batch_size: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            posts_per_page: 25,
            reindex_batch_size: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence when set
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl Settings {
    /// Loads every layer from the working directory and the process environment.
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }

        let builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(env_source());
        Self::build(builder)
    }

    /// Parses a single TOML document, ignoring files and the environment.
    pub fn from_toml(toml: &str) -> Result<Self> {
        Self::build(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.search.backend == SearchBackend::Elastic && self.search.url.is_none() {
            return Err(ConfigError::Invalid {
                key: "search.url",
                reason: "required when search.backend = \"elastic\"".into(),
            });
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "database.max_connections",
                reason: "must be at least 1".into(),
            });
        }
        if self.feed.posts_per_page == 0 {
            return Err(ConfigError::Invalid {
                key: "feed.posts_per_page",
                reason: "must be at least 1".into(),
            });
        }
        if self.feed.reindex_batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "feed.reindex_batch_size",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

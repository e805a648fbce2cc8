//! [`Config`]-related definitions.

use std::time;

use config::{builder::DefaultState, ConfigBuilder, ConfigError};
use secrecy::SecretString;
use serde::Deserialize;
use smart_default::SmartDefault;

use crate::{agent, llm, tool};

/// Application configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: Server,

    /// Postgres configuration.
    pub postgres: Postgres,

    /// Language model configuration.
    pub llm: Llm,

    /// Conversational agent configuration.
    pub agent: Agent,

    /// Listing page scraping configuration.
    pub scrape: Scrape,

    /// Log configuration.
    pub log: Log,
}

impl Config {
    /// Creates a new [`Config`] by:
    /// - loading it from the provided `path` (if any);
    /// - merging it with the environment variables (if any);
    /// - using default values for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(path: impl AsRef<str>) -> Result<Self, ConfigError> {
        ConfigBuilder::<DefaultState>::default()
            .add_source(config::File::with_name(path.as_ref()).required(false))
            .add_source(config::Environment::with_prefix("CONF").separator("."))
            .build()?
            .try_deserialize()
    }
}

/// Server configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Server {
    /// Host to bind the server to.
    #[default("0.0.0.0".to_owned())]
    pub host: String,

    /// Port to bind the server to.
    #[default(8080)]
    pub port: u16,

    /// [CORS] configuration.
    ///
    /// [CORS]: https://developer.mozilla.org/en-US/docs/Web/HTTP/CORS
    pub cors: Cors,
}

/// [CORS] configuration.
///
/// [CORS]: https://developer.mozilla.org/en-US/docs/Web/HTTP/CORS
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Cors {
    /// List of allowed origins.
    #[default(vec!["*".to_owned()])]
    pub origins: Vec<String>,
}

/// Postgres configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Postgres {
    /// Host to connect to.
    #[default("127.0.0.1".to_owned())]
    pub host: String,

    /// Port to connect to.
    #[default(5432)]
    pub port: u16,

    /// User to connect as.
    #[default("postgres".to_owned())]
    pub user: String,

    /// Password to connect with.
    #[default("postgres".to_owned())]
    pub password: String,

    /// Database name to connect to.
    #[default("postgres".to_owned())]
    pub dbname: String,
}

impl From<Postgres> for service::infra::postgres::Config {
    fn from(value: Postgres) -> Self {
        let Postgres {
            host,
            port,
            user,
            password,
            dbname,
        } = value;

        Self {
            host: Some(host),
            port: Some(port),
            user: Some(user),
            password: Some(password),
            dbname: Some(dbname),
            ..Self::default()
        }
    }
}

/// Language model configuration.
///
/// Any [OpenAI]-compatible chat completions API may be used.
///
/// [OpenAI]: https://platform.openai.com/docs/api-reference/chat
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Llm {
    /// Base URL of the API.
    #[default("https://api.groq.com/openai/v1".to_owned())]
    pub base_url: String,

    /// API key to authorize with.
    #[default(SecretString::from(""))]
    pub api_key: SecretString,

    /// Model to complete chats with.
    #[default("llama-3.3-70b-versatile".to_owned())]
    pub model: String,

    /// Sampling temperature.
    #[default(0.7)]
    pub temperature: f32,

    /// Timeout of a single API request.
    #[default(time::Duration::from_secs(60))]
    #[serde(with = "humantime_serde")]
    pub timeout: time::Duration,
}

impl From<Llm> for llm::Config {
    fn from(value: Llm) -> Self {
        let Llm {
            base_url,
            api_key,
            model,
            temperature,
            timeout,
        } = value;

        Self {
            base_url,
            api_key,
            model,
            temperature,
            timeout,
        }
    }
}

/// Conversational agent configuration.
#[derive(Clone, Copy, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Agent {
    /// Maximum number of tool calling rounds in a single turn.
    #[default(10)]
    pub max_iterations: usize,

    /// Maximum number of retries of an empty model response.
    #[default(2)]
    pub max_empty_retries: usize,

    /// Time a conversation thread is kept for since its last activity.
    #[default(time::Duration::from_secs(24 * 60 * 60))]
    #[serde(with = "humantime_serde")]
    pub thread_ttl: time::Duration,
}

impl From<Agent> for agent::Config {
    fn from(value: Agent) -> Self {
        let Agent {
            max_iterations,
            max_empty_retries,
            thread_ttl,
        } = value;

        Self {
            max_iterations,
            max_empty_retries,
            thread_ttl,
        }
    }
}

/// Listing page scraping configuration.
///
/// Scraping is disabled unless an [`Scrape::api_key`] is provided.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Scrape {
    /// API key of the scraping API.
    pub api_key: Option<SecretString>,

    /// Base URL of the scraping API.
    #[default("https://api.firecrawl.dev".to_owned())]
    pub base_url: String,

    /// Template of a listing page URL, with `{city}` placeholders.
    #[default("https://housing.com/in/buy/{city}/{city}".to_owned())]
    pub listing_url: String,

    /// Maximum number of characters of a scraped page.
    #[default(9000)]
    pub max_chars: usize,

    /// Timeout of a single scraping request.
    #[default(time::Duration::from_secs(60))]
    #[serde(with = "humantime_serde")]
    pub timeout: time::Duration,
}

impl Scrape {
    /// Converts this [`Scrape`] configuration into a [`tool::scrape::Config`],
    /// if scraping is enabled.
    #[must_use]
    pub fn enabled(self) -> Option<tool::scrape::Config> {
        let Self {
            api_key,
            base_url,
            listing_url,
            max_chars,
            timeout,
        } = self;

        Some(tool::scrape::Config {
            api_key: api_key?,
            base_url,
            listing_url,
            max_chars,
            timeout,
        })
    }
}

/// Log configuration.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Log {
    /// Log level.
    pub level: LogLevel,
}

/// Log level.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    /// Designates very low priority, often extremely verbose, information.
    Trace,

    /// Designates lower priority information.
    Debug,

    /// Designates useful information.
    #[default]
    Info,

    /// Designates hazardous situations.
    Warn,

    /// Designates very serious errors.
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

#[cfg(test)]
mod spec {
    use secrecy::ExposeSecret as _;

    use super::Config;

    #[test]
    fn defaults_missing_file() {
        let config = Config::new("missing.toml").unwrap();

        assert_eq!(config.llm.model, "llama-3.3-70b-versatile");
        assert_eq!(config.agent.max_iterations, 10);
        assert_eq!(config.agent.thread_ttl.as_secs(), 24 * 60 * 60);
        assert_eq!(config.scrape.max_chars, 9000);
        assert!(config.scrape.enabled().is_none());
    }

    #[test]
    fn enables_scraping_with_api_key() {
        let mut config = Config::default();
        config.scrape.api_key = Some("fc-key".into());

        let scrape = config.scrape.enabled().unwrap();

        assert_eq!(scrape.api_key.expose_secret(), "fc-key");
        assert_eq!(scrape.base_url, "https://api.firecrawl.dev");
    }
}

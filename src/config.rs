use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use log::{debug, info, warn};
use serde::Deserialize;
use thiserror::Error;
use validator::Validate;

use crate::api::ApiClient;
use crate::assessment::{AssessmentKind, DEFAULT_TIME_LIMIT_SECONDS};
use crate::session::ControllerOptions;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const CONFIG_FILE: &str = "talentgate";
pub const ENV_PREFIX: &str = "TALENTGATE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Failed to read token file {path}: {source}")]
    TokenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Api(#[from] crate::api::ApiError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Deserialize, Clone, Debug, Validate)]
pub struct ApiSettings {
    #[validate(url(message = "api.base_url must be a valid URL"))]
    pub base_url: String,
    pub token: Option<String>,
    pub token_file: Option<PathBuf>,
    #[validate(range(min = 1, message = "api.request_timeout_secs must be positive"))]
    pub request_timeout_secs: u64,
}

#[derive(Deserialize, Clone, Debug, Validate)]
pub struct AssessmentSettings {
    pub kind: String,
    #[validate(range(min = 1, message = "assessment.default_time_limit_seconds must be positive"))]
    pub default_time_limit_seconds: u64,
    pub coding_language: String,
    #[validate(range(min = 1, message = "assessment.tick_millis must be positive"))]
    pub tick_millis: u64,
}

#[derive(Deserialize, Clone, Debug, Validate)]
pub struct AppConfig {
    #[validate]
    pub api: ApiSettings,
    #[validate]
    pub assessment: AssessmentSettings,
}

impl AppConfig {
    /// Defaults, then `talentgate.toml` if present, then `TALENTGATE_*`
    /// environment variables (`TALENTGATE_API__BASE_URL` and so on).
    pub fn load() -> Result<Self> {
        Self::load_from(Some(Path::new(CONFIG_FILE)))
    }

    pub fn load_from(file: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut builder = Self::defaults()?;
        if let Some(path) = file {
            debug!("📁 Looking for configuration in {}", path.display());
            builder = builder.add_source(File::from(path).required(false));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;
        Self::finish(settings)
    }

    /// Parses a TOML document on top of the defaults. No environment lookup.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let settings = Self::defaults()?
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?;
        Self::finish(settings)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(Config::builder()
            .set_default("api.base_url", DEFAULT_BASE_URL)?
            .set_default("api.request_timeout_secs", 30_i64)?
            .set_default("assessment.kind", "aptitude")?
            .set_default("assessment.default_time_limit_seconds", DEFAULT_TIME_LIMIT_SECONDS as i64)?
            .set_default("assessment.coding_language", "python")?
            .set_default("assessment.tick_millis", 1000_i64)?)
    }

    fn finish(settings: Config) -> Result<Self> {
        let config: AppConfig = settings.try_deserialize()?;
        config.validate().map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.kind()?;
        info!(
            "⚙️ Configuration loaded: backend {} ({} round)",
            config.api.base_url, config.assessment.kind
        );
        Ok(config)
    }

    pub fn kind(&self) -> Result<AssessmentKind> {
        self.assessment.kind.parse().map_err(ConfigError::Invalid)
    }

    /// The bearer token, from `api.token` or else the first line of
    /// `api.token_file`.
    pub fn token(&self) -> Result<Option<String>> {
        if let Some(token) = self.api.token.as_deref().filter(|t| !t.trim().is_empty()) {
            return Ok(Some(token.trim().to_string()));
        }
        let Some(path) = &self.api.token_file else {
            return Ok(None);
        };
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::TokenFile {
            path: path.clone(),
            source,
        })?;
        let token = contents.lines().next().map(str::trim).unwrap_or_default();
        if token.is_empty() {
            warn!("⚠️ Token file {} is empty", path.display());
            return Ok(None);
        }
        Ok(Some(token.to_string()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    pub fn api_client(&self) -> Result<ApiClient> {
        Ok(ApiClient::new(&self.api.base_url, self.token()?, Some(self.request_timeout()))?)
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            default_time_limit: self.assessment.default_time_limit_seconds,
            tick_period: Duration::from_millis(self.assessment.tick_millis),
            auto_tick: true,
        }
    }
}

use planscope_engine::GraphConfig;
use serde::Deserialize;
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "PLANSCOPE_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "crates/planscope/config/default.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub graph: GraphConfig,
}

fn default_api_base_url() -> String {
    planscope_client::DEFAULT_BASE_URL.to_string()
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Loads settings from `path`, else from `PLANSCOPE_CONFIG_PATH`, else
    /// from the default file when it exists, then applies `PLANSCOPE_*`
    /// environment overrides.
    pub fn new(path: Option<&str>) -> Result<Self, config::ConfigError> {
        Self::with_environment(path, Self::environment())
    }

    /// `PLANSCOPE_API_BASE_URL`, `PLANSCOPE_GRAPH__OUTPUT_GAP` and so on.
    pub fn environment() -> config::Environment {
        config::Environment::with_prefix("PLANSCOPE")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    pub fn with_environment(
        path: Option<&str>,
        environment: config::Environment,
    ) -> Result<Self, config::ConfigError> {
        let (config_file_path, required) = match path {
            Some(path) => (path.to_string(), true),
            None => match std::env::var(CONFIG_PATH_ENV) {
                Ok(path) => (path, true),
                Err(_) => (DEFAULT_CONFIG_PATH.to_string(), false),
            },
        };

        let s = config::Config::builder()
            .add_source(config::File::with_name(&config_file_path).required(required))
            .add_source(environment)
            .build()?;
        s.try_deserialize()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

const DEFAULT_MODEL: &str = "llama3";
const DEFAULT_CONFIG_PATH: &str = "config/client.toml";
const DEFAULT_MAX_ITERATIONS: usize = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_API_KEY_ENV: &str = "TOOLBRIDGE_API_KEY";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model: String,
    pub system_prompt: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub max_iterations: usize,
    pub request_timeout_secs: u64,
    pub provider: ProviderConfig,
    pub servers: Vec<ServerConfig>,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub base_url: String,
    pub api_path: Option<String>,
    pub api_key_env: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    Openai,
}

/// One remote tool server entry. The name doubles as the namespace prefix
/// for every tool the server exposes.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    pub name: String,
    pub base_url: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config from {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config from {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    model: Option<String>,
    system_prompt: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    max_iterations: Option<usize>,
    request_timeout_secs: Option<u64>,
    provider: Option<RawProvider>,
    #[serde(default)]
    servers: Vec<ServerConfig>,
}

#[derive(Debug, Deserialize)]
struct RawProvider {
    kind: Option<ProviderKind>,
    base_url: Option<String>,
    api_path: Option<String>,
    api_key_env: Option<String>,
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return read_config(path);
        }
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        match read_config(default_path) {
            Ok(config) => Ok(config),
            Err(ConfigError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                info!("Configuration file not found; using defaults");
                Ok(Self::default())
            }
            Err(other) => Err(other),
        }
    }

    pub fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            system_prompt: None,
            temperature: None,
            max_tokens: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            provider: ProviderConfig::default(),
            servers: Vec::new(),
        }
    }
}

impl ProviderConfig {
    pub fn default() -> Self {
        Self {
            kind: ProviderKind::Ollama,
            base_url: "http://127.0.0.1:11434".to_string(),
            api_path: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
        }
    }

    /// Resolves the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|key| !key.is_empty())
    }
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    debug!(path = %path.display(), "Reading client configuration file");
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed: RawConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let provider = match parsed.provider {
        Some(raw) => {
            let defaults = ProviderConfig::default();
            ProviderConfig {
                kind: raw.kind.unwrap_or(defaults.kind),
                base_url: raw.base_url.unwrap_or(defaults.base_url),
                api_path: raw.api_path,
                api_key_env: raw.api_key_env.unwrap_or(defaults.api_key_env),
            }
        }
        None => ProviderConfig::default(),
    };

    Ok(AppConfig {
        model: parsed.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        system_prompt: parsed.system_prompt,
        temperature: parsed.temperature,
        max_tokens: parsed.max_tokens,
        max_iterations: parsed.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS),
        request_timeout_secs: parsed
            .request_timeout_secs
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        provider,
        servers: parsed.servers,
    })
}

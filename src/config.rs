//! Persistent service configuration model, defaults, and environment overrides.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::image_scraper::ImageProvider;

const CONFIG_ENV_VAR: &str = "PLANTDEX_CONFIG";
const CONFIG_DIR_NAME: &str = "plantdex";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// HTTP listener and catalog storage.
    pub server: ServerConfig,
    #[serde(default)]
    /// Chat-completion endpoint used for plant facts.
    pub model: ModelConfig,
    #[serde(default)]
    /// Headless browser image search.
    pub scraper: ScraperConfig,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Catalog file, rewritten in full on every change.
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
    /// Upper bound on find requests running the acquisition pipeline at once.
    #[serde(default = "default_max_concurrent_acquisitions")]
    pub max_concurrent_acquisitions: usize,
}

/// Known chat-completion vendors with built-in endpoint and model presets.
#[derive(Debug, Clone, Copy, serde::Deserialize, serde::Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelProvider {
    #[default]
    Glm,
    Gemini,
}

impl ModelProvider {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "glm" => Some(Self::Glm),
            "gemini" => Some(Self::Gemini),
            _ => None,
        }
    }

    pub fn default_endpoint(self) -> &'static str {
        match self {
            Self::Glm => "https://open.bigmodel.cn/api/paas/v4/chat/completions",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::Glm => "glm-4-flash",
            Self::Gemini => "gemini-2.0-flash-lite",
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: ModelProvider,
    /// Leave empty to use the provider preset.
    #[serde(default)]
    pub endpoint: String,
    /// Leave empty to use the provider preset.
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ScraperConfig {
    /// Provider used for cover image candidates on find.
    #[serde(default)]
    pub provider: ImageProvider,
    #[serde(default = "default_timeout_secs")]
    pub session_timeout_secs: u64,
    /// Chrome binary to launch. Auto-detected when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_executable: Option<PathBuf>,
}

fn default_port() -> u16 {
    2333
}

fn default_data_file() -> PathBuf {
    PathBuf::from("plants.json")
}

fn default_max_concurrent_acquisitions() -> usize {
    2
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            data_file: default_data_file(),
            max_concurrent_acquisitions: default_max_concurrent_acquisitions(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::default(),
            endpoint: String::new(),
            model: String::new(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            provider: ImageProvider::default(),
            session_timeout_secs: default_timeout_secs(),
            chrome_executable: None,
        }
    }
}

/// Resolves the config file location: `$PLANTDEX_CONFIG`, then the user config dir.
pub fn config_file_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME)
}

/// Reads `path`, writing a default file first when none exists. An
/// unparseable file falls back to defaults.
pub fn load_or_create(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| format!("failed to create config dir: {err}"))?;
        }
        let default_config = toml::to_string(&Config::default())
            .map_err(|err| format!("failed to serialize default config: {err}"))?;
        std::fs::write(path, default_config)
            .map_err(|err| format!("failed to write default config: {err}"))?;
    }

    let content =
        std::fs::read_to_string(path).map_err(|err| format!("failed to read config: {err}"))?;
    Ok(toml::from_str::<Config>(&content).unwrap_or_else(|err| {
        warn!(
            "Config file is invalid, using defaults. path={} error={err}",
            path.display()
        );
        Config::default()
    }))
}

/// Applies `LLM`, `LLM_URL`, `LLM_MODEL`, `LLM_APIKEY` and `PORT` on top of
/// the file, plus the `provider:apikey` (or bare `apikey`) credential argument.
pub fn apply_overrides<F>(mut config: Config, credentials: Option<&str>, lookup: F) -> Config
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(provider) = lookup("LLM").as_deref().and_then(ModelProvider::from_label) {
        config.model.provider = provider;
    }

    if let Some(credentials) = credentials {
        match credentials.split_once(':') {
            Some((provider, api_key)) => {
                match ModelProvider::from_label(provider) {
                    Some(provider) => config.model.provider = provider,
                    None => warn!("Unknown model provider {provider:?}, keeping current"),
                }
                config.model.api_key = api_key.trim().to_string();
            }
            None => config.model.api_key = credentials.trim().to_string(),
        }
    }

    if let Some(endpoint) = lookup("LLM_URL") {
        config.model.endpoint = endpoint;
    }
    if let Some(model) = lookup("LLM_MODEL") {
        config.model.model = model;
    }
    if let Some(api_key) = lookup("LLM_APIKEY") {
        config.model.api_key = api_key;
    }
    if let Some(port) = lookup("PORT") {
        match port.trim().parse::<u16>() {
            Ok(port) => config.server.port = port,
            Err(err) => warn!("Ignoring invalid PORT {port:?}: {err}"),
        }
    }
    config
}

/// Clamps numeric settings and fills provider presets for blank model fields.
pub fn sanitize_config(config: Config) -> Config {
    let provider = config.model.provider;
    let endpoint = if config.model.endpoint.trim().is_empty() {
        provider.default_endpoint().to_string()
    } else {
        config.model.endpoint.trim().to_string()
    };
    let model = if config.model.model.trim().is_empty() {
        provider.default_model().to_string()
    } else {
        config.model.model.trim().to_string()
    };

    Config {
        server: ServerConfig {
            port: config.server.port,
            data_file: config.server.data_file,
            max_concurrent_acquisitions: config.server.max_concurrent_acquisitions.clamp(1, 16),
        },
        model: ModelConfig {
            provider,
            endpoint,
            model,
            api_key: config.model.api_key,
            timeout_secs: config.model.timeout_secs.clamp(1, 120),
        },
        scraper: ScraperConfig {
            provider: config.scraper.provider,
            session_timeout_secs: config.scraper.session_timeout_secs.clamp(1, 120),
            chrome_executable: config.scraper.chrome_executable,
        },
    }
}

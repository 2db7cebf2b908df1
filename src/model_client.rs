//! Chat-completion client that asks a language model for structured plant facts.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use log::{debug, info};
use regex::Regex;
use serde_json::{json, Value};

use crate::config::ModelConfig;

const SYSTEM_PROMPT: &str = "你是一个资深植物专家, 我会问你几种植物, 每种植物以空格间隔, 你需要用简短的文字回答各个植物的中文(cnname), 英文(enname), 科属(genus), 类别(category), 习性(habit), 分布(distribution), 尺寸(size), 毒性(toxicity), 花期(period), 光照(light), 温度(temperature), 浇水(watering), 施肥(fertilization), 简介(notes), 百科(link). 其中英文为英文学名,科属的格式为xx科xx属, 尺寸的格式为xx-xxcm, 温度的格式为xx-xx°C, 习性为生态喜好和忌讳, 花期明确月份, 浇水和施肥明确周期, 光照明确喜光度, 简介为此植物的特色内涵用途等, 百科为其中文维基百科的链接, 类别为草本木本分类(草本明确几年生, 木本明确是乔木灌木还是藤木). 回答只输出json数组, 不要输出其他文字, 示例为:[{\"cnname\":\"\",\"enname\":\"\",\"genus\":\"\",\"category\":\"\",\"habit\":\"\",\"distribution\":\"\",\"size\":\"\",\"toxicity\":\"\",\"period\":\"\",\"light\":\"\",\"temperature\":\"\",\"watering\":\"\",\"fertilization\":\"\",\"notes\":\"\",\"link\":\"\"}]";

const MAX_LOGGED_BODY_CHARS: usize = 200;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[a-zA-Z]*\n(.*?)\n```").expect("fenced block pattern is valid")
});

#[derive(Debug, thiserror::Error)]
pub enum ModelQueryError {
    #[error("model request failed: {0}")]
    Transport(String),
    #[error("model endpoint returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },
    #[error("unexpected model response shape: {0}")]
    Shape(String),
}

/// Source of raw plant facts for a space-separated list of species names.
pub trait PlantFactSource: Send + Sync {
    fn query(&self, names: &str) -> Result<String, ModelQueryError>;
}

/// Blocking chat-completion client backed by `ureq`.
pub struct ModelQueryClient {
    http_client: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: String,
}

impl ModelQueryClient {
    /// Creates a client with relaxed TLS verification that honors the
    /// environment HTTP proxy.
    pub fn new(config: &ModelConfig) -> Result<Self, String> {
        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|err| format!("failed to create model tls connector: {err}"))?;
        let http_client = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .tls_connector(Arc::new(connector))
            .try_proxy_from_env(true)
            .build();

        Ok(Self {
            http_client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn request_body(model: &str, names: &str) -> Value {
        json!({
            "model": model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": names },
            ],
        })
    }

    fn truncate_for_log(body: &str) -> String {
        body.chars().take(MAX_LOGGED_BODY_CHARS).collect()
    }

    /// Pulls `choices[0].message.content` out of a chat-completion body.
    fn message_content(body: &str) -> Result<String, ModelQueryError> {
        let parsed: Value = serde_json::from_str(body).map_err(|err| {
            ModelQueryError::Shape(format!(
                "invalid json ({err}); body={}",
                Self::truncate_for_log(body)
            ))
        })?;
        parsed["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                ModelQueryError::Shape(format!(
                    "no choices found in response; body={}",
                    Self::truncate_for_log(body)
                ))
            })
    }
}

/// Extracts the JSON payload from free-form model output.
///
/// A fenced block spanning lines wins; otherwise a literal leading
/// "```json" and trailing "```" are stripped.
pub fn extract_payload(content: &str) -> String {
    if let Some(inner) = FENCED_BLOCK
        .captures(content)
        .and_then(|captures| captures.get(1))
    {
        return inner.as_str().trim().to_string();
    }

    let trimmed = content.trim();
    let trimmed = trimmed.strip_prefix("```json").unwrap_or(trimmed).trim();
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed);
    trimmed.trim().to_string()
}

impl PlantFactSource for ModelQueryClient {
    fn query(&self, names: &str) -> Result<String, ModelQueryError> {
        info!(
            "Model: retrieving {names} plant information from {} ({})",
            self.endpoint, self.model
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .set("Content-Type", "application/json")
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(Self::request_body(&self.model, names))
            .map_err(|error| match error {
                ureq::Error::Status(status, response) => ModelQueryError::UpstreamStatus {
                    status,
                    body: response
                        .into_string()
                        .map(|body| Self::truncate_for_log(&body))
                        .unwrap_or_default(),
                },
                ureq::Error::Transport(transport) => {
                    ModelQueryError::Transport(transport.to_string())
                }
            })?;

        let body = response
            .into_string()
            .map_err(|err| ModelQueryError::Transport(format!("failed to read body: {err}")))?;
        let content = Self::message_content(&body)?;
        debug!("Model: raw content for {names}: {}", Self::truncate_for_log(&content));
        Ok(extract_payload(&content))
    }
}

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::prompt::InterpolationMethod;

/// Backend connection and pacing for an
/// [`InferenceClient`](crate::inference::InferenceClient).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InferenceConfig {
    /// Completion endpoint, fixed at client construction.
    #[serde(default = "default_url")]
    #[schemars(with = "String")]
    pub url: Url,

    /// Model queried unless the request overrides it.
    #[serde(default = "default_model")]
    pub model: String,

    /// Minimum spacing between submissions, in seconds.
    #[serde(default = "default_interval")]
    pub interval_secs: f32,

    /// Upper bound on a single backend call. A hung call frees the
    /// in-flight slot when this expires.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            model: default_model(),
            interval_secs: default_interval(),
            timeout_secs: default_timeout(),
        }
    }
}

impl InferenceConfig {
    /// Defaults, overridden by `OLLAMA_URL` and `OLLAMA_MODEL` when set.
    /// Loads a local `.env` first if one exists.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("OLLAMA_URL") {
            match Url::parse(&raw) {
                Ok(url) => config.url = url,
                Err(e) => warn!("ignoring unparseable OLLAMA_URL {raw:?}: {e}"),
            }
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            config.model = model;
        }
        config
    }

    /// The throttle interval as a `Duration`, for
    /// [`should_submit`](crate::inference::InferenceClient::should_submit).
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f32(self.interval_secs)
    }
}

/// Port selection for a channel. The port is the channel id; the group
/// address is fixed process-wide.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChannelConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

/// Injection parameters handed to
/// [`PromptManager::inject_if_new`](crate::prompt::PromptManager::inject_if_new)
/// each frame.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PromptConfig {
    #[serde(default = "default_weight")]
    pub weight: f32,

    /// Zero applies new prompts instantly; anything higher smooths them
    /// over that many steps.
    #[serde(default)]
    pub transition_steps: u32,

    #[serde(default)]
    pub interpolation: InterpolationMethod,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            weight: default_weight(),
            transition_steps: 0,
            interpolation: InterpolationMethod::default(),
        }
    }
}

fn default_url() -> Url {
    Url::parse("http://localhost:11434").expect("default endpoint is valid")
}

fn default_model() -> String {
    "llama3.2:3b".to_string()
}

fn default_interval() -> f32 {
    3.0
}

fn default_timeout() -> u64 {
    60
}

fn default_port() -> u16 {
    9400
}

fn default_weight() -> f32 {
    100.0
}

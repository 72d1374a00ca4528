//! Configuration types, loaded from environment variables.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// Confidence below which a draft is never auto-sent.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.6;

/// Default number of jobs the queue runs at once.
pub const DEFAULT_QUEUE_CONCURRENCY: usize = 4;

const DEFAULT_GRAPH_URL: &str = "https://graph.facebook.com/v19.0";
const DEFAULT_DB_PATH: &str = "./data/dm-autopilot.db";
const DEFAULT_PORT: u16 = 3000;

/// Settings for the per-job processing state machine.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Drafts scoring below this are skipped.
    pub confidence_threshold: f32,
    /// Our own account id; recorded as the sender of outbound messages.
    pub business_account_id: String,
}

impl ProcessorConfig {
    pub fn new(business_account_id: impl Into<String>) -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            business_account_id: business_account_id.into(),
        }
    }
}

/// Outbound Graph API settings.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub base_url: String,
    pub access_token: SecretString,
}

/// Webhook ingestion settings.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Shared secret for `X-Hub-Signature-256`.
    pub app_secret: SecretString,
    /// Token echoed back during the subscription handshake.
    pub verify_token: Option<String>,
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub db_path: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub queue_concurrency: usize,
    pub webhook: WebhookConfig,
    pub graph: GraphConfig,
    pub processor: ProcessorConfig,
    /// `None` when no model key is configured; the pipeline then relies on
    /// keyword rules plus the fallback draft.
    pub llm: Option<LlmConfig>,
}

impl AppConfig {
    /// Load configuration from `DM_AUTOPILOT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let app_secret = required("DM_AUTOPILOT_APP_SECRET")?;
        let access_token = required("DM_AUTOPILOT_ACCESS_TOKEN")?;
        let business_account_id = required("DM_AUTOPILOT_BUSINESS_ID")?;

        let port = parse_or("DM_AUTOPILOT_PORT", DEFAULT_PORT)?;
        let queue_concurrency = parse_or("DM_AUTOPILOT_CONCURRENCY", DEFAULT_QUEUE_CONCURRENCY)?;
        if queue_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "DM_AUTOPILOT_CONCURRENCY".into(),
                message: "must be at least 1".into(),
            });
        }

        let confidence_threshold =
            parse_or("DM_AUTOPILOT_CONFIDENCE_THRESHOLD", DEFAULT_CONFIDENCE_THRESHOLD)?;
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "DM_AUTOPILOT_CONFIDENCE_THRESHOLD".into(),
                message: format!("{confidence_threshold} is outside [0, 1]"),
            });
        }

        let llm = match std::env::var("DM_AUTOPILOT_LLM_API_KEY") {
            Ok(key) if !key.trim().is_empty() => {
                let backend = match std::env::var("DM_AUTOPILOT_LLM_BACKEND") {
                    Ok(value) => value.parse::<LlmBackend>().map_err(|message| {
                        ConfigError::InvalidValue {
                            key: "DM_AUTOPILOT_LLM_BACKEND".into(),
                            message,
                        }
                    })?,
                    Err(_) => LlmBackend::Anthropic,
                };
                let model = std::env::var("DM_AUTOPILOT_MODEL")
                    .unwrap_or_else(|_| backend.default_model().to_string());
                Some(LlmConfig {
                    backend,
                    api_key: SecretString::from(key),
                    model,
                })
            }
            _ => None,
        };

        Ok(Self {
            port,
            db_path: std::env::var("DM_AUTOPILOT_DB_PATH")
                .unwrap_or_else(|_| DEFAULT_DB_PATH.to_string())
                .into(),
            log_dir: std::env::var("DM_AUTOPILOT_LOG_DIR").ok().map(PathBuf::from),
            queue_concurrency,
            webhook: WebhookConfig {
                app_secret: SecretString::from(app_secret),
                verify_token: std::env::var("DM_AUTOPILOT_VERIFY_TOKEN")
                    .ok()
                    .filter(|t| !t.is_empty()),
            },
            graph: GraphConfig {
                base_url: std::env::var("DM_AUTOPILOT_GRAPH_URL")
                    .unwrap_or_else(|_| DEFAULT_GRAPH_URL.to_string()),
                access_token: SecretString::from(access_token),
            },
            processor: ProcessorConfig {
                confidence_threshold,
                business_account_id,
            },
            llm,
        })
    }
}

fn required(key: &str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

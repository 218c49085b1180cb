//! Configuration types.
//!
//! `MailConfig` is the effective configuration the pipeline runs with. It is
//! built by layering `ConfigOverride`s on top of the process defaults:
//! defaults < persisted per-user override < request override. A layer only
//! replaces fields it sets to a non-empty value, so an override that omits
//! (or empties) the VIP list never erases it.

use std::sync::Arc;

use arc_swap::ArcSwap;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Free-text definitions of each priority level, sent to the AI classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityPrompts {
    pub high: String,
    pub medium: String,
    pub low: String,
}

/// Effective configuration for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailConfig {
    /// How many days back to fetch mail.
    pub lookback_days: u32,
    /// Maximum number of messages fetched per request (> 0).
    pub batch_size: u32,
    /// The user's own address, matched exactly against To/Cc recipients.
    pub user_email: String,
    /// Sender substrings that always force high priority.
    pub vip_senders: Vec<String>,
    /// Subject/body substrings that force high priority.
    pub urgent_keywords: Vec<String>,
    pub priority_prompts: PriorityPrompts,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            lookback_days: 2,
            batch_size: 30,
            user_email: "meu.email@empresa.com".to_string(),
            vip_senders: vec![
                "chefe@empresa.com".to_string(),
                "diretoria@empresa.com".to_string(),
                "clienteimportante@cliente.com".to_string(),
            ],
            urgent_keywords: [
                "urgente",
                "prazo",
                "hoje",
                "aprovacao",
                "contrato",
                "pagamento",
                "amanha",
                "deadline",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            priority_prompts: PriorityPrompts {
                high: "High = boss/board/VIP client; urgent terms (urgente, prazo, hoje, aprovacao, \
                       contrato, pagamento); direct requests to the user; immediate deadlines."
                    .to_string(),
                medium: "Medium = team requests or information requests without immediate urgency."
                    .to_string(),
                low: "Low = general announcements, newsletters, automated notifications."
                    .to_string(),
            },
        }
    }
}

/// Partial priority prompts, used inside a `ConfigOverride`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<String>,
}

/// A partial configuration layer.
///
/// Used for persisted per-user settings, `POST /config` bodies, and
/// request query overrides. Unknown fields in a request body are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookback_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vip_senders: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urgent_keywords: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_prompts: Option<PromptOverrides>,
}

impl ConfigOverride {
    /// An override that only sets the user's email.
    pub fn user_email(email: impl Into<String>) -> Self {
        Self {
            user_email: Some(email.into()),
            ..Self::default()
        }
    }

    /// Layer `newer` on top of `self`, carrying forward every field `newer`
    /// leaves unset or empty.
    pub fn merge(&self, newer: &ConfigOverride) -> ConfigOverride {
        let prompts = match (&self.priority_prompts, &newer.priority_prompts) {
            (None, None) => None,
            (old, new) => {
                let old = old.clone().unwrap_or_default();
                let new = new.clone().unwrap_or_default();
                Some(PromptOverrides {
                    high: non_empty_string(new.high).or(old.high),
                    medium: non_empty_string(new.medium).or(old.medium),
                    low: non_empty_string(new.low).or(old.low),
                })
            }
        };

        ConfigOverride {
            lookback_days: newer.lookback_days.or(self.lookback_days),
            batch_size: positive(newer.batch_size).or(positive(self.batch_size)),
            user_email: non_empty_string(newer.user_email.clone())
                .or_else(|| self.user_email.clone()),
            vip_senders: non_empty_list(newer.vip_senders.clone())
                .or_else(|| self.vip_senders.clone()),
            urgent_keywords: non_empty_list(newer.urgent_keywords.clone())
                .or_else(|| self.urgent_keywords.clone()),
            priority_prompts: prompts,
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &ConfigOverride::default()
    }
}

impl MailConfig {
    /// Apply one override layer, producing a new configuration.
    pub fn apply(&self, layer: &ConfigOverride) -> MailConfig {
        let prompts = layer.priority_prompts.clone().unwrap_or_default();
        MailConfig {
            lookback_days: layer.lookback_days.unwrap_or(self.lookback_days),
            batch_size: positive(layer.batch_size).unwrap_or(self.batch_size),
            user_email: non_empty_string(layer.user_email.clone())
                .unwrap_or_else(|| self.user_email.clone()),
            vip_senders: non_empty_list(layer.vip_senders.clone())
                .unwrap_or_else(|| self.vip_senders.clone()),
            urgent_keywords: non_empty_list(layer.urgent_keywords.clone())
                .unwrap_or_else(|| self.urgent_keywords.clone()),
            priority_prompts: PriorityPrompts {
                high: non_empty_string(prompts.high)
                    .unwrap_or_else(|| self.priority_prompts.high.clone()),
                medium: non_empty_string(prompts.medium)
                    .unwrap_or_else(|| self.priority_prompts.medium.clone()),
                low: non_empty_string(prompts.low)
                    .unwrap_or_else(|| self.priority_prompts.low.clone()),
            },
        }
    }
}

/// Resolve the effective configuration: defaults < persisted < request.
pub fn resolve_config(
    defaults: &MailConfig,
    persisted: Option<&ConfigOverride>,
    request: Option<&ConfigOverride>,
) -> MailConfig {
    let mut config = defaults.clone();
    if let Some(layer) = persisted {
        config = config.apply(layer);
    }
    if let Some(layer) = request {
        config = config.apply(layer);
    }
    config
}

fn non_empty_string(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn non_empty_list(value: Option<Vec<String>>) -> Option<Vec<String>> {
    value.filter(|list| !list.is_empty())
}

fn positive(value: Option<u32>) -> Option<u32> {
    value.filter(|n| *n > 0)
}

// ── Process-wide defaults ───────────────────────────────────────────

/// Holder for the current default configuration.
///
/// Readers take an `Arc` snapshot; writers replace the whole value.
/// Concurrent replace-then-read is last-write-wins.
#[derive(Debug)]
pub struct ConfigHolder {
    current: ArcSwap<MailConfig>,
}

impl ConfigHolder {
    pub fn new(config: MailConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(config),
        }
    }

    pub fn snapshot(&self) -> Arc<MailConfig> {
        self.current.load_full()
    }

    pub fn replace(&self, config: MailConfig) {
        self.current.store(Arc::new(config));
    }
}

impl Default for ConfigHolder {
    fn default() -> Self {
        Self::new(MailConfig::default())
    }
}

// ── Server settings (environment) ───────────────────────────────────

/// How `/config` behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigMode {
    /// `/config` reads and replaces the process-wide defaults; no auth.
    #[default]
    Stateless,
    /// `/config` reads and writes the caller's persisted preferences.
    PerUser,
}

impl std::str::FromStr for ConfigMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stateless" | "" => Ok(Self::Stateless),
            "per_user" | "per-user" | "peruser" => Ok(Self::PerUser),
            other => Err(ConfigError::InvalidValue {
                key: "SMART_MAIL_CONFIG_MODE".to_string(),
                message: format!("expected 'stateless' or 'per_user', got '{other}'"),
            }),
        }
    }
}

/// Hosted persistence credentials.
#[derive(Debug, Clone)]
pub struct SupabaseSettings {
    pub url: String,
    pub service_key: SecretString,
}

/// Classifier credentials. At most one backend is active.
#[derive(Debug, Clone)]
pub enum ClassifierSettings {
    OpenAi { api_key: SecretString, model: String },
    Anthropic { api_key: SecretString, model: String },
}

/// Process settings read from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub port: u16,
    pub config_mode: ConfigMode,
    pub graph_api_base: String,
    pub classifier: Option<ClassifierSettings>,
    pub supabase: Option<SupabaseSettings>,
    pub db_path: Option<String>,
    pub user_email: Option<String>,
}

pub const DEFAULT_GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-latest";

impl ServerSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup (the environment in
    /// production, a map in tests). Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORT".to_string(),
                message: format!("'{raw}' is not a valid port"),
            })?,
            None => 4000,
        };

        let config_mode = match get("SMART_MAIL_CONFIG_MODE") {
            Some(raw) => raw.parse()?,
            None => ConfigMode::default(),
        };

        let classifier = if let Some(key) = get("OPENAI_API_KEY") {
            Some(ClassifierSettings::OpenAi {
                api_key: SecretString::from(key),
                model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            })
        } else {
            get("ANTHROPIC_API_KEY").map(|key| ClassifierSettings::Anthropic {
                api_key: SecretString::from(key),
                model: get("ANTHROPIC_MODEL")
                    .unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string()),
            })
        };

        let supabase = match (get("SUPABASE_URL"), get("SUPABASE_SERVICE_ROLE_KEY")) {
            (Some(url), Some(key)) => Some(SupabaseSettings {
                url: url.trim_end_matches('/').to_string(),
                service_key: SecretString::from(key),
            }),
            _ => None,
        };

        Ok(Self {
            port,
            config_mode,
            graph_api_base: get("GRAPH_API_BASE")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_GRAPH_API_BASE.to_string()),
            classifier,
            supabase,
            db_path: get("SMART_MAIL_DB_PATH"),
            user_email: get("SMART_MAIL_USER_EMAIL"),
        })
    }

    /// Process defaults, with the user email overridden from the environment.
    pub fn default_mail_config(&self) -> MailConfig {
        let base = MailConfig::default();
        match &self.user_email {
            Some(email) => base.apply(&ConfigOverride::user_email(email.clone())),
            None => base,
        }
    }
}

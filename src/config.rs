use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("sentinel.alert_channel_id is required in production")]
    MissingAlertChannel,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub env: String,
    pub app: App,
    pub discord: Discord,
    pub logging: Logging,
    pub sentinel: SentinelConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct App {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Discord {
    pub token: String,
    pub app_id: Option<String>,
    pub intents: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logging {
    pub json: Option<bool>,
    pub level: Option<String>,
}

/// Detection thresholds and sink wiring. Read once at startup; immutable for
/// the process lifetime (no hot-reload).
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SentinelConfig {
    /// Operator channel for alert embeds; 0 disables delivery.
    #[serde(default)]
    pub alert_channel_id: u64,
    pub spam_threshold: Option<usize>,
    pub channel_hop_threshold: Option<usize>,
    pub reaction_threshold: Option<usize>,
    pub voice_hop_threshold: Option<usize>,
    pub failed_command_threshold: Option<u32>,
    pub reclaim_interval_secs: Option<u64>,
    /// Optional repeat-alert suppression per (user, category). Off by
    /// default: every qualifying event re-alerts.
    pub alert_cooldown_secs: Option<u64>,
}

impl Settings {
    pub fn load() -> Result<Self> {
        // Which environment?
        let env = std::env::var("MSC_ENV").unwrap_or_else(|_| "development".to_string());

        // Load .env.<env> and .env (if present)
        let _ = dotenvy::from_filename(format!(".env.{}", env));
        let _ = dotenvy::dotenv();

        #[derive(Deserialize, Serialize)]
        struct Defaults {
            env: String,
            app: App,
            discord: Discord,
            logging: Logging,
            sentinel: SentinelConfig,
        }

        let defaults = Defaults {
            env: env.clone(),
            app: App {
                name: "Monroe Sentinel".into(),
            },
            discord: Discord {
                token: "".into(),
                app_id: None,
                intents: vec![
                    "GUILDS".into(),
                    "GUILD_MEMBERS".into(),
                    "GUILD_MESSAGES".into(),
                    "MESSAGE_CONTENT".into(),
                    "GUILD_MESSAGE_REACTIONS".into(),
                    "GUILD_VOICE_STATES".into(),
                ],
            },
            logging: Logging {
                json: Some(false),
                level: Some("info".into()),
            },
            sentinel: SentinelConfig::default(),
        };

        // Layers: defaults -> TOML file -> MSC_* environment variables
        let figment = Figment::from(Serialized::defaults(defaults))
            .merge(Toml::file(format!("config/{}.toml", env)))
            // MSC_DISCORD_TOKEN => discord.token etc.
            .merge(Env::prefixed("MSC_").split("_"));

        let mut s: Settings = figment.extract()?;
        s.env = env;

        if s.env == "production" && s.sentinel.alert_channel_id == 0 {
            return Err(ConfigError::MissingAlertChannel.into());
        }

        Ok(s)
    }
}

// src/lib.rs

pub mod actguard;
pub mod alerts;
pub mod automod;
pub mod config;
pub mod discord;
pub mod logging;
pub mod status_cmd;
pub mod tracker;

use anyhow::Result;
use once_cell::sync::OnceCell;
use std::sync::Arc;

use actguard::{ActGuard, DetectionThresholds};
use config::Settings;

use serenity::all::GatewayIntents;

/// Global application context: settings plus the detection engine.
/// All engine state is in-memory and intentionally resets on restart.
#[derive(Clone)]
pub struct AppContext {
    pub settings: Settings,
    actguard: OnceCell<Arc<ActGuard>>,
}

impl AppContext {
    /// Bootstrap:
    /// - logging
    /// - detection engine + reclaimer task, injected into the OnceCell
    pub fn bootstrap(settings: Settings) -> Result<Arc<Self>> {
        logging::init(&settings);

        let thresholds = DetectionThresholds::from_config(&settings.sentinel);
        let ctx = Arc::new(Self {
            settings,
            actguard: OnceCell::new(),
        });

        let ag = ActGuard::new(thresholds);
        ag.spawn_reclaimer();
        let _ = ctx.actguard.set(ag); // set() can only be called once

        Ok(ctx)
    }

    /// Convenience getter: the detection engine (Arc).
    pub fn actguard(&self) -> Arc<ActGuard> {
        self.actguard
            .get()
            .expect("ActGuard not initialized")
            .clone()
    }

    /// Operator channel for alert embeds; 0 means delivery is disabled.
    #[inline]
    pub fn alert_channel(&self) -> u64 {
        self.settings.sentinel.alert_channel_id
    }
}

/// Gateway intents the sentinel needs:
/// - GUILDS, GUILD_MESSAGES, MESSAGE_CONTENT (content classifiers),
/// - GUILD_MEMBERS (join monitoring),
/// - GUILD_MESSAGE_REACTIONS, GUILD_VOICE_STATES (reaction/voice windows).
pub fn default_gateway_intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::GUILD_VOICE_STATES
}

/// Start the Discord client (gateway + slash commands).
pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    discord::run_bot(ctx).await
}

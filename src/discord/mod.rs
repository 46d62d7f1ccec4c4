// src/discord/mod.rs
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;

use serenity::all::*;
use serenity::async_trait;

use crate::actguard::{self, JoinEvent, MessageEvent, ReactionEvent, VoiceEvent};
use crate::alerts::{Alert, AlertLog};
use crate::status_cmd::StatusCmd;
use crate::AppContext;

pub struct Handler {
    pub app: Arc<AppContext>,
    pub actguard: Arc<actguard::ActGuard>,
}

impl Handler {
    /// Run one detection call behind a panic guard. A crash in the detection
    /// core must never take the bot down; a panicked event is skipped.
    fn detect<F>(&self, what: &'static str, f: F) -> Vec<Alert>
    where
        F: FnOnce() -> Vec<Alert>,
    {
        match std::panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(alerts) => alerts,
            Err(_) => {
                tracing::warn!(event = what, "detection panicked; event skipped");
                Vec::new()
            }
        }
    }

    async fn deliver(&self, ctx: &Context, alerts: Vec<Alert>) {
        let channel = self.app.alert_channel();
        for alert in &alerts {
            AlertLog::deliver(ctx, channel, alert).await;
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!("Logged in as {}", ready.user.name);

        for g in ready.guilds {
            if let Err(e) = StatusCmd::register_commands(&ctx, g.id).await {
                tracing::warn!(error=?e, gid=%g.id.get(), "register_commands failed");
            }
        }
    }

    async fn guild_create(&self, ctx: Context, guild: Guild, _is_new: Option<bool>) {
        if let Err(e) = StatusCmd::register_commands(&ctx, guild.id).await {
            tracing::warn!(error=?e, gid=%guild.id.get(), "register_commands failed (on guild_create)");
        }
        tracing::info!(guild=%guild.name, gid=%guild.id.get(), "sentinel active");
    }

    async fn message(&self, ctx: Context, msg: Message) {
        // Guild messages only; DMs and bots are out of scope.
        if msg.guild_id.is_none() || msg.author.bot {
            return;
        }

        let ev = MessageEvent {
            user_id: msg.author.id.get(),
            display_name: display_name_of(&msg.author),
            channel_id: msg.channel_id.get(),
            content: msg.content.clone(),
            mention_count: msg.mentions.len(),
            at: Utc::now(),
        };
        let alerts = self.detect("message", || self.actguard.on_message(&ev));
        self.deliver(&ctx, alerts).await;
    }

    async fn reaction_add(&self, ctx: Context, reaction: Reaction) {
        let Some(user_id) = reaction.user_id else {
            return;
        };
        if reaction.guild_id.is_none() {
            return;
        }
        if reaction
            .member
            .as_ref()
            .map(|m| m.user.bot)
            .unwrap_or(false)
        {
            return;
        }

        let ev = ReactionEvent {
            user_id: user_id.get(),
            display_name: reaction
                .member
                .as_ref()
                .map(|m| display_name_of(&m.user))
                .unwrap_or_default(),
            channel_id: reaction.channel_id.get(),
            at: Utc::now(),
        };
        let alerts = self.detect("reaction_add", || self.actguard.on_reaction(&ev));
        self.deliver(&ctx, alerts).await;
    }

    // `old` is only populated by the cache feature, which this build does not
    // carry; the engine remembers the previous channel per user instead.
    async fn voice_state_update(&self, ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        if new
            .member
            .as_ref()
            .map(|m| m.user.bot)
            .unwrap_or(false)
        {
            return;
        }

        let ev = VoiceEvent {
            user_id: new.user_id.get(),
            display_name: new
                .member
                .as_ref()
                .map(|m| display_name_of(&m.user))
                .unwrap_or_default(),
            channel: new.channel_id.map(|c| c.get()),
            at: Utc::now(),
        };
        let alerts = self.detect("voice_state_update", || self.actguard.on_voice_state(&ev));
        self.deliver(&ctx, alerts).await;
    }

    async fn guild_member_addition(&self, ctx: Context, member: Member) {
        if member.user.bot {
            return;
        }

        let ev = JoinEvent {
            user_id: member.user.id.get(),
            username: member.user.name.clone(),
            account_created_at: to_utc(member.user.id.created_at()),
            at: Utc::now(),
        };
        let alerts = self.detect("guild_member_addition", || {
            self.actguard.on_member_join(&ev)
        });
        self.deliver(&ctx, alerts).await;
    }

    /// Interaction gateway: slash commands. A panicking handler counts as a
    /// failed command like any other error.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let fut = StatusCmd::on_interaction(&ctx, &self.app, interaction);
        if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
            tracing::warn!("interaction handler panicked");
        }
    }
}

fn display_name_of(user: &User) -> String {
    user.global_name
        .clone()
        .unwrap_or_else(|| user.name.clone())
}

fn to_utc(ts: Timestamp) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(ts.unix_timestamp(), 0).unwrap_or_default()
}

pub async fn run_bot(app: Arc<AppContext>) -> Result<()> {
    let token = app.settings.discord.token.clone();
    if token.is_empty() {
        bail!("discord token not configured (MSC_DISCORD_TOKEN)");
    }

    let handler = Handler {
        actguard: app.actguard(),
        app,
    };

    let mut client = Client::builder(&token, crate::default_gateway_intents())
        .event_handler(handler)
        .await?;

    client.start().await?;
    Ok(())
}

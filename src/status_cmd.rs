// src/status_cmd.rs
use anyhow::Result;
use chrono::Utc;
use serenity::all::*;

use crate::actguard::CommandFailedEvent;
use crate::alerts::AlertLog;
use crate::AppContext;

pub struct StatusCmd;

impl StatusCmd {
    pub async fn register_commands(ctx: &Context, gid: GuildId) -> Result<()> {
        gid.create_command(
            &ctx.http,
            CreateCommand::new("sentinel")
                .description("Sentinel status: tracked users and thresholds")
                .default_member_permissions(Permissions::MODERATE_MEMBERS),
        )
        .await?;
        Ok(())
    }

    pub async fn on_interaction(ctx: &Context, app: &AppContext, interaction: Interaction) {
        let Some(cmd) = interaction.command() else {
            return;
        };
        if cmd.data.name.as_str() != "sentinel" {
            return;
        }
        if let Err(e) = handle_status(ctx, app, &cmd).await {
            tracing::warn!(?e, "sentinel status failed");

            // A failing invocation feeds the failed-command counter.
            let ag = app.actguard();
            let ev = CommandFailedEvent {
                user_id: cmd.user.id.get(),
                display_name: cmd
                    .user
                    .global_name
                    .clone()
                    .unwrap_or_else(|| cmd.user.name.clone()),
                command: cmd.data.name.clone(),
                error: e.to_string(),
                at: Utc::now(),
            };
            for alert in ag.on_command_failed(&ev) {
                AlertLog::deliver(ctx, app.alert_channel(), &alert).await;
            }

            let _ = cmd
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("❌ Could not read sentinel status.")
                            .ephemeral(true),
                    ),
                )
                .await;
        }
    }
}

async fn handle_status(ctx: &Context, app: &AppContext, cmd: &CommandInteraction) -> Result<()> {
    let ag = app.actguard();
    let t = ag.thresholds();

    let embed = CreateEmbed::new()
        .title("🛡️ Sentinel Status")
        .colour(Colour::new(0x3498DB))
        .field("Tracked users", ag.tracked_users().to_string(), true)
        .field(
            "Message spam",
            format!("{} msgs / {}s", t.spam_count, t.spam_window_secs),
            true,
        )
        .field(
            "Channel hopping",
            format!("{} channels / {}s", t.channel_hop_distinct, t.channel_hop_window_secs),
            true,
        )
        .field(
            "Reaction spam",
            format!("{} reactions / {}s", t.reaction_count, t.reaction_window_secs),
            true,
        )
        .field(
            "Voice hopping",
            format!("{} switches / {}s", t.voice_hop_count, t.voice_hop_window_secs),
            true,
        )
        .field(
            "Failed commands",
            format!("{} / hour", t.failed_command_count),
            true,
        )
        .footer(CreateEmbedFooter::new("Monroe Social Club • Sentinel"));

    cmd.create_response(
        &ctx.http,
        CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new().embed(embed).ephemeral(true),
        ),
    )
    .await?;
    Ok(())
}

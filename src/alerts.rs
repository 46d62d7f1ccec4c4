//! src/alerts.rs
//! Alert records produced by the detection engine, plus the operator-channel
//! sink that renders them as embeds. Delivery is best-effort: a failed send is
//! logged and dropped, never retried, and never blocks detection.

use chrono::{DateTime, Utc};
use serenity::all::{
    ChannelId, Colour, Context, CreateEmbed, CreateEmbedFooter, CreateMessage, Timestamp,
};
use tracing::warn;

const BRAND_FOOTER: &str = "Monroe Social Club • Sentinel";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Severity::Low => "🟡",
            Severity::Medium => "🟠",
            Severity::High => "🔴",
            Severity::Critical => "⚠️",
        }
    }

    fn colour(self) -> Colour {
        match self {
            Severity::Low => Colour::new(0xFFFF00),
            Severity::Medium => Colour::new(0xFF8C00),
            Severity::High => Colour::new(0xFF0000),
            Severity::Critical => Colour::new(0x8B0000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertCategory {
    MessageSpam,
    ChannelHopping,
    SuspiciousKeywords,
    SpamPatterns,
    ContextViolation,
    MassMentions,
    InviteLinkPosted,
    ReactionSpam,
    VoiceChannelHopping,
    NewAccountJoined,
    SuspiciousUsername,
    ExcessiveFailedCommands,
}

impl AlertCategory {
    pub fn title(self) -> &'static str {
        match self {
            AlertCategory::MessageSpam => "Message Spam",
            AlertCategory::ChannelHopping => "Channel Hopping",
            AlertCategory::SuspiciousKeywords => "Suspicious Keywords",
            AlertCategory::SpamPatterns => "Spam Patterns",
            AlertCategory::ContextViolation => "Contextual Violation",
            AlertCategory::MassMentions => "Mass Mentions",
            AlertCategory::InviteLinkPosted => "Invite Link Posted",
            AlertCategory::ReactionSpam => "Reaction Spam",
            AlertCategory::VoiceChannelHopping => "Voice Channel Hopping",
            AlertCategory::NewAccountJoined => "New Account Joined",
            AlertCategory::SuspiciousUsername => "Suspicious Username",
            AlertCategory::ExcessiveFailedCommands => "Excessive Failed Commands",
        }
    }
}

/// Who an alert is about. Gateway events carry a real member; dashboard-style
/// synthetic actions carry an external source tag. Both render uniformly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorIdentity {
    Member { user_id: u64, display_name: String },
    External { source: String },
}

impl ActorIdentity {
    pub fn member(user_id: u64, display_name: impl Into<String>) -> Self {
        Self::Member {
            user_id,
            display_name: display_name.into(),
        }
    }

    pub fn user_id(&self) -> Option<u64> {
        match self {
            Self::Member { user_id, .. } => Some(*user_id),
            Self::External { .. } => None,
        }
    }

    fn render(&self) -> String {
        match self {
            Self::Member { user_id, display_name } => {
                format!("<@{}> ({})", user_id, display_name)
            }
            Self::External { source } => format!("external: {}", source),
        }
    }
}

/// Immutable detection result. Consumed exactly once by the sink; never
/// persisted.
#[derive(Debug, Clone)]
pub struct Alert {
    pub actor: ActorIdentity,
    pub category: AlertCategory,
    pub severity: Severity,
    pub description: String,
    pub fields: Vec<(String, String)>,
    pub at: DateTime<Utc>,
}

/// Char-boundary-safe clamp with an ellipsis, for message excerpts.
pub fn excerpt(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push('…');
    out
}

pub struct AlertLog;

impl AlertLog {
    /// Send one alert to the operator channel. `channel_id == 0` means the
    /// sink is unconfigured and the alert is silently discarded.
    pub async fn deliver(ctx: &Context, channel_id: u64, alert: &Alert) {
        if channel_id == 0 {
            return;
        }
        let embed = render_embed(alert);
        if let Err(e) = ChannelId::new(channel_id)
            .send_message(&ctx.http, CreateMessage::new().embed(embed))
            .await
        {
            warn!(
                error = ?e,
                category = alert.category.title(),
                "alert delivery failed; dropping"
            );
        }
    }
}

fn render_embed(alert: &Alert) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(format!(
            "{} Suspicious Activity Detected",
            alert.severity.emoji()
        ))
        .description(format!(
            "**Activity:** {}\n**Description:** {}",
            alert.category.title(),
            alert.description
        ))
        .colour(alert.severity.colour())
        .field("👤 User", alert.actor.render(), false);

    for (name, value) in &alert.fields {
        embed = embed.field(name.clone(), value.clone(), false);
    }

    embed = embed
        .field("⚠️ Severity", format!("**{}**", alert.severity.label()), true)
        .footer(CreateEmbedFooter::new(BRAND_FOOTER));

    if let Ok(ts) = Timestamp::from_unix_timestamp(alert.at.timestamp()) {
        embed = embed.timestamp(ts);
    }
    embed
}

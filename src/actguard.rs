//! src/actguard.rs
//! ActGuard – the suspicious-activity detection engine.
//!
//! One inbound platform event goes in, zero or more [`Alert`]s come out. The
//! engine itself holds no per-event state machine: everything mutable lives in
//! the injected [`ActivityTracker`]. Threshold crossings re-emit on every
//! qualifying event – continuous visibility is the default, an optional
//! cooldown can be configured to suppress repeats per (user, category).
//!
//! The reclaimer task bounds tracker memory: every `reclaim_interval_secs` it
//! trims each signal window to its retention horizon and drops idle users. A
//! panicking sweep is caught and logged; the next cycle proceeds normally.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::alerts::{excerpt, ActorIdentity, Alert, AlertCategory, Severity};
use crate::automod;
use crate::config::SentinelConfig;
use crate::tracker::{ActivityTracker, Signal};

/* =========================================
   Thresholds (process-lifetime constants)
   ========================================= */

#[derive(Debug, Clone)]
pub struct DetectionThresholds {
    pub spam_count: usize,
    pub spam_window_secs: i64,
    pub channel_hop_distinct: usize,
    pub channel_hop_window_secs: i64,
    pub reaction_count: usize,
    pub reaction_window_secs: i64,
    pub voice_hop_count: usize,
    pub voice_hop_window_secs: i64,
    pub failed_command_count: u32,
    pub mass_mention_count: usize,
    pub new_account_max_age_hours: i64,
    pub reclaim_interval_secs: u64,
    /// `None` (the default) keeps the re-trigger-on-every-event semantics.
    pub alert_cooldown_secs: Option<i64>,
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        Self {
            spam_count: 8,
            spam_window_secs: 60,
            channel_hop_distinct: 5,
            channel_hop_window_secs: 120,
            reaction_count: 15,
            reaction_window_secs: 60,
            voice_hop_count: 4,
            voice_hop_window_secs: 300,
            failed_command_count: 10,
            mass_mention_count: 5,
            new_account_max_age_hours: 24,
            reclaim_interval_secs: 600,
            alert_cooldown_secs: None,
        }
    }
}

impl DetectionThresholds {
    pub fn from_config(cfg: &SentinelConfig) -> Self {
        let d = Self::default();
        Self {
            spam_count: cfg.spam_threshold.unwrap_or(d.spam_count),
            channel_hop_distinct: cfg.channel_hop_threshold.unwrap_or(d.channel_hop_distinct),
            reaction_count: cfg.reaction_threshold.unwrap_or(d.reaction_count),
            voice_hop_count: cfg.voice_hop_threshold.unwrap_or(d.voice_hop_count),
            failed_command_count: cfg
                .failed_command_threshold
                .unwrap_or(d.failed_command_count),
            reclaim_interval_secs: cfg
                .reclaim_interval_secs
                .unwrap_or(d.reclaim_interval_secs),
            alert_cooldown_secs: cfg.alert_cooldown_secs.map(|s| s as i64),
            ..d
        }
    }
}

/* =========================================
   Inbound event records
   ========================================= */

#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub user_id: u64,
    pub display_name: String,
    pub channel_id: u64,
    pub content: String,
    pub mention_count: usize,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ReactionEvent {
    pub user_id: u64,
    pub display_name: String,
    pub channel_id: u64,
    pub at: DateTime<Utc>,
}

/// `channel` is the channel the user is in after the update; `None` means
/// they left voice. The previous channel is remembered by the engine, not
/// taken from the event – gateway voice updates only carry the new state.
#[derive(Debug, Clone)]
pub struct VoiceEvent {
    pub user_id: u64,
    pub display_name: String,
    pub channel: Option<u64>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct JoinEvent {
    pub user_id: u64,
    pub username: String,
    pub account_created_at: DateTime<Utc>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CommandFailedEvent {
    pub user_id: u64,
    pub display_name: String,
    pub command: String,
    pub error: String,
    pub at: DateTime<Utc>,
}

/* =========================================
   Engine
   ========================================= */

#[derive(Debug)]
pub struct ActGuard {
    thresholds: DetectionThresholds,
    tracker: ActivityTracker,
    // user -> last observed voice channel; a hop is a change between two
    // observed channels.
    voice_channels: DashMap<u64, u64>,
    // (user, category) -> last alert time; only populated when a cooldown is
    // configured.
    last_alert: DashMap<(u64, AlertCategory), DateTime<Utc>>,
}

impl ActGuard {
    pub fn new(thresholds: DetectionThresholds) -> Arc<Self> {
        Arc::new(Self {
            thresholds,
            tracker: ActivityTracker::new(),
            voice_channels: DashMap::new(),
            last_alert: DashMap::new(),
        })
    }

    pub fn thresholds(&self) -> &DetectionThresholds {
        &self.thresholds
    }

    pub fn tracked_users(&self) -> usize {
        self.tracker.tracked_users()
    }

    /// Message posted: spam window, channel-visit window and every text
    /// classifier run independently; all applicable alerts are emitted.
    pub fn on_message(&self, ev: &MessageEvent) -> Vec<Alert> {
        let t = &self.thresholds;
        let now = ev.at;
        let mut alerts = Vec::new();

        self.tracker.record(ev.user_id, Signal::Message, now, None);
        let sent = self.tracker.count_in_window(
            ev.user_id,
            Signal::Message,
            Duration::seconds(t.spam_window_secs),
            now,
        );
        if sent >= t.spam_count {
            self.push(
                &mut alerts,
                ev.user_id,
                &ev.display_name,
                AlertCategory::MessageSpam,
                Severity::High,
                format!("Sent {} messages in {}s", sent, t.spam_window_secs),
                vec![
                    ("Channel".into(), format!("<#{}>", ev.channel_id)),
                    (
                        "Threshold".into(),
                        format!("{} msgs / {}s", t.spam_count, t.spam_window_secs),
                    ),
                ],
                now,
            );
        }

        self.tracker
            .record(ev.user_id, Signal::ChannelVisit, now, Some(ev.channel_id));
        let distinct = self.tracker.distinct_in_window(
            ev.user_id,
            Signal::ChannelVisit,
            Duration::seconds(t.channel_hop_window_secs),
            now,
        );
        if distinct >= t.channel_hop_distinct {
            let recent = self
                .tracker
                .recent_payloads(ev.user_id, Signal::ChannelVisit, 5)
                .iter()
                .map(|c| format!("<#{}>", c))
                .collect::<Vec<_>>()
                .join(", ");
            self.push(
                &mut alerts,
                ev.user_id,
                &ev.display_name,
                AlertCategory::ChannelHopping,
                Severity::Medium,
                format!(
                    "Posted in {} different channels within {}s",
                    distinct, t.channel_hop_window_secs
                ),
                vec![
                    ("Recent channels".into(), recent),
                    (
                        "Threshold".into(),
                        format!("{} channels", t.channel_hop_distinct),
                    ),
                ],
                now,
            );
        }

        let patterns = automod::match_spam_patterns(&ev.content);
        if !patterns.is_empty() {
            let names = patterns
                .iter()
                .map(|p| p.name())
                .collect::<Vec<_>>()
                .join(", ");
            self.push(
                &mut alerts,
                ev.user_id,
                &ev.display_name,
                AlertCategory::SpamPatterns,
                Severity::Medium,
                format!("Message matched spam patterns: {}", names),
                vec![
                    ("Channel".into(), format!("<#{}>", ev.channel_id)),
                    ("Message".into(), format!("`{}`", excerpt(&ev.content, 200))),
                ],
                now,
            );
        }

        for (cluster, keywords) in automod::match_context_clusters(&ev.content) {
            self.push(
                &mut alerts,
                ev.user_id,
                &ev.display_name,
                AlertCategory::ContextViolation,
                Severity::Medium,
                format!("Message matched the '{}' keyword cluster", cluster.name()),
                vec![
                    ("Keywords".into(), keywords.join(", ")),
                    ("Channel".into(), format!("<#{}>", ev.channel_id)),
                ],
                now,
            );
        }

        let harmful = automod::find_harmful_keywords(&ev.content);
        let profane = automod::contains_profanity(&ev.content);
        if !harmful.is_empty() || profane.is_some() {
            let mut tokens: Vec<&str> = harmful;
            if let Some(word) = profane {
                if !tokens.contains(&word) {
                    tokens.push(word);
                }
            }
            self.push(
                &mut alerts,
                ev.user_id,
                &ev.display_name,
                AlertCategory::SuspiciousKeywords,
                Severity::High,
                "Used potentially harmful or blocklisted keywords".into(),
                vec![
                    ("Keywords".into(), tokens.join(", ")),
                    (
                        "Language".into(),
                        automod::detect_language(&ev.content).to_uppercase(),
                    ),
                    ("Message".into(), format!("`{}`", excerpt(&ev.content, 200))),
                    ("Channel".into(), format!("<#{}>", ev.channel_id)),
                ],
                now,
            );
        }

        if ev.mention_count >= t.mass_mention_count {
            self.push(
                &mut alerts,
                ev.user_id,
                &ev.display_name,
                AlertCategory::MassMentions,
                Severity::Medium,
                format!("Mentioned {} users in a single message", ev.mention_count),
                vec![("Channel".into(), format!("<#{}>", ev.channel_id))],
                now,
            );
        }

        if automod::contains_invite_link(&ev.content) {
            self.push(
                &mut alerts,
                ev.user_id,
                &ev.display_name,
                AlertCategory::InviteLinkPosted,
                Severity::Medium,
                "Posted a server invite link".into(),
                vec![
                    ("Channel".into(), format!("<#{}>", ev.channel_id)),
                    ("Message".into(), format!("`{}`", excerpt(&ev.content, 200))),
                ],
                now,
            );
        }

        alerts
    }

    pub fn on_reaction(&self, ev: &ReactionEvent) -> Vec<Alert> {
        let t = &self.thresholds;
        let now = ev.at;
        let mut alerts = Vec::new();

        self.tracker.record(ev.user_id, Signal::Reaction, now, None);
        let added = self.tracker.count_in_window(
            ev.user_id,
            Signal::Reaction,
            Duration::seconds(t.reaction_window_secs),
            now,
        );
        if added >= t.reaction_count {
            self.push(
                &mut alerts,
                ev.user_id,
                &ev.display_name,
                AlertCategory::ReactionSpam,
                Severity::Medium,
                format!("Added {} reactions in {}s", added, t.reaction_window_secs),
                vec![
                    ("Channel".into(), format!("<#{}>", ev.channel_id)),
                    (
                        "Threshold".into(),
                        format!("{} reactions / {}s", t.reaction_count, t.reaction_window_secs),
                    ),
                ],
                now,
            );
        }
        alerts
    }

    /// Only an actual channel-to-channel move counts. A first join seeds the
    /// last-seen map without recording a hop; leaving voice clears the entry.
    pub fn on_voice_state(&self, ev: &VoiceEvent) -> Vec<Alert> {
        let t = &self.thresholds;
        let now = ev.at;
        let mut alerts = Vec::new();

        let Some(after) = ev.channel else {
            self.voice_channels.remove(&ev.user_id);
            return alerts;
        };
        let Some(before) = self.voice_channels.insert(ev.user_id, after) else {
            return alerts;
        };
        if before == after {
            return alerts;
        }

        self.tracker
            .record(ev.user_id, Signal::VoiceHop, now, Some(after));
        let hops = self.tracker.count_in_window(
            ev.user_id,
            Signal::VoiceHop,
            Duration::seconds(t.voice_hop_window_secs),
            now,
        );
        if hops >= t.voice_hop_count {
            let recent = self
                .tracker
                .recent_payloads(ev.user_id, Signal::VoiceHop, 3)
                .iter()
                .map(|c| format!("<#{}>", c))
                .collect::<Vec<_>>()
                .join(", ");
            self.push(
                &mut alerts,
                ev.user_id,
                &ev.display_name,
                AlertCategory::VoiceChannelHopping,
                Severity::Low,
                format!(
                    "Switched between {} voice channels in {}s",
                    hops, t.voice_hop_window_secs
                ),
                vec![
                    ("Recent channels".into(), recent),
                    ("Threshold".into(), format!("{} switches", t.voice_hop_count)),
                ],
                now,
            );
        }
        alerts
    }

    /// New-account age check, then the username patterns. The two checks are
    /// independent; the username patterns themselves are first-match-wins.
    pub fn on_member_join(&self, ev: &JoinEvent) -> Vec<Alert> {
        let t = &self.thresholds;
        let now = ev.at;
        let mut alerts = Vec::new();

        let age = now - ev.account_created_at;
        if age < Duration::hours(t.new_account_max_age_hours) {
            self.push(
                &mut alerts,
                ev.user_id,
                &ev.username,
                AlertCategory::NewAccountJoined,
                Severity::Low,
                format!("Account created {} day(s) ago", age.num_days()),
                vec![(
                    "Account created".into(),
                    format!("<t:{}:R>", ev.account_created_at.timestamp()),
                )],
                now,
            );
        }

        if let Some(pattern) = automod::match_suspicious_username(&ev.username) {
            self.push(
                &mut alerts,
                ev.user_id,
                &ev.username,
                AlertCategory::SuspiciousUsername,
                Severity::Low,
                format!("Username matches suspicious pattern: {}", pattern),
                vec![("Username".into(), ev.username.clone())],
                now,
            );
        }
        alerts
    }

    /// The counter is not reset on crossing the threshold: every further
    /// failure inside the hour re-triggers.
    pub fn on_command_failed(&self, ev: &CommandFailedEvent) -> Vec<Alert> {
        let t = &self.thresholds;
        let mut alerts = Vec::new();

        let failures = self.tracker.record_failed_command(ev.user_id);
        if failures >= t.failed_command_count {
            self.push(
                &mut alerts,
                ev.user_id,
                &ev.display_name,
                AlertCategory::ExcessiveFailedCommands,
                Severity::Medium,
                format!("Failed {} commands in the past hour", failures),
                vec![
                    ("Command".into(), format!("/{}", ev.command)),
                    ("Latest error".into(), excerpt(&ev.error, 200)),
                    (
                        "Threshold".into(),
                        format!("{} failures / hour", t.failed_command_count),
                    ),
                ],
                ev.at,
            );
        }
        alerts
    }

    /* --------- Reclaimer --------- */

    /// One reclaimer pass. Exposed for tests; production runs it from the
    /// spawned task.
    pub fn sweep(&self, now: DateTime<Utc>) {
        self.tracker.sweep(now);
        if let Some(cooldown) = self.thresholds.alert_cooldown_secs {
            self.last_alert
                .retain(|_, at| now - *at <= Duration::seconds(cooldown));
        }
        debug!(tracked_users = self.tracker.tracked_users(), "reclaimer sweep done");
    }

    /// Background sweep on a fixed interval. The task holds only a weak
    /// reference and winds down once the engine is dropped.
    pub fn spawn_reclaimer(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let period = StdDuration::from_secs(self.thresholds.reclaim_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick fires immediately; skip it so the first sweep lands
            // one full interval after startup.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(strong) = weak.upgrade() else { break };
                let swept =
                    std::panic::catch_unwind(AssertUnwindSafe(|| strong.sweep(Utc::now())));
                if swept.is_err() {
                    warn!("reclaimer sweep panicked; skipping this cycle");
                }
            }
        });
    }

    /* --------- Internals --------- */

    #[allow(clippy::too_many_arguments)]
    fn push(
        &self,
        alerts: &mut Vec<Alert>,
        user_id: u64,
        display_name: &str,
        category: AlertCategory,
        severity: Severity,
        description: String,
        fields: Vec<(String, String)>,
        at: DateTime<Utc>,
    ) {
        if !self.cooldown_allows(user_id, category, at) {
            return;
        }
        alerts.push(Alert {
            actor: ActorIdentity::member(user_id, display_name),
            category,
            severity,
            description,
            fields,
            at,
        });
    }

    fn cooldown_allows(&self, user_id: u64, category: AlertCategory, now: DateTime<Utc>) -> bool {
        let Some(cooldown) = self.thresholds.alert_cooldown_secs else {
            return true;
        };
        let key = (user_id, category);
        let suppressed = self
            .last_alert
            .get(&key)
            .map(|last| now - *last < Duration::seconds(cooldown))
            .unwrap_or(false);
        if suppressed {
            return false;
        }
        self.last_alert.insert(key, now);
        true
    }
}

use chrono::{DateTime, Duration, TimeZone, Utc};

use monroe_sentinel::actguard::{
    ActGuard, CommandFailedEvent, DetectionThresholds, JoinEvent, MessageEvent, ReactionEvent,
    VoiceEvent,
};
use monroe_sentinel::alerts::{AlertCategory, Severity};

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn msg(user: u64, channel: u64, content: &str, at: DateTime<Utc>) -> MessageEvent {
    MessageEvent {
        user_id: user,
        display_name: "beachgoer".into(),
        channel_id: channel,
        content: content.into(),
        mention_count: 0,
        at,
    }
}

#[test]
fn message_spam_fires_from_eighth_message_onward() {
    let ag = ActGuard::new(DetectionThresholds::default());

    // Eight messages inside ten seconds in #general.
    for i in 0..7 {
        let alerts = ag.on_message(&msg(1, 100, "surf's up", ts(i)));
        assert!(alerts.is_empty(), "no alert expected at message {}", i + 1);
    }
    let alerts = ag.on_message(&msg(1, 100, "surf's up", ts(7)));
    assert_eq!(alerts.len(), 1);
    let alert = &alerts[0];
    assert_eq!(alert.category, AlertCategory::MessageSpam);
    assert_eq!(alert.severity, Severity::High);
    assert!(alert.fields.iter().any(|(_, v)| v.contains("<#100>")));
    assert!(alert.fields.iter().any(|(_, v)| v.contains("8 msgs / 60s")));

    // Re-triggering is expected, not deduplicated: a ninth message inside the
    // window alerts again.
    let alerts = ag.on_message(&msg(1, 100, "surf's up", ts(8)));
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].category, AlertCategory::MessageSpam);
}

#[test]
fn spam_window_slides_past_old_messages() {
    let ag = ActGuard::new(DetectionThresholds::default());
    for i in 0..7 {
        ag.on_message(&msg(1, 100, "hi", ts(i)));
    }
    // The eighth message lands 70s later: the first seven are stale.
    let alerts = ag.on_message(&msg(1, 100, "hi", ts(70)));
    assert!(alerts.is_empty());
}

#[test]
fn channel_hopping_counts_distinct_channels() {
    let ag = ActGuard::new(DetectionThresholds::default());
    // Five posts in the same channel: no hop.
    for i in 0..5 {
        let alerts = ag.on_message(&msg(2, 100, "hi", ts(i)));
        assert!(alerts.iter().all(|a| a.category != AlertCategory::ChannelHopping));
    }
    // Five distinct channels inside 120s: hop alert.
    let ag = ActGuard::new(DetectionThresholds::default());
    let mut last = Vec::new();
    for (i, ch) in [100u64, 101, 102, 103, 104].iter().enumerate() {
        last = ag.on_message(&msg(2, *ch, "hi", ts(i as i64 * 10)));
    }
    let hop = last
        .iter()
        .find(|a| a.category == AlertCategory::ChannelHopping)
        .expect("channel hop alert");
    assert_eq!(hop.severity, Severity::Medium);
    assert!(hop.fields.iter().any(|(_, v)| v.contains("<#104>")));
}

#[test]
fn all_applicable_message_checks_fire_independently() {
    let ag = ActGuard::new(DetectionThresholds::default());
    let ev = MessageEvent {
        mention_count: 6,
        ..msg(3, 100, "join discord.gg/beach for a free giveaway, winner gets it", ts(0))
    };
    let alerts = ag.on_message(&ev);
    let cats: Vec<AlertCategory> = alerts.iter().map(|a| a.category).collect();
    assert!(cats.contains(&AlertCategory::MassMentions));
    assert!(cats.contains(&AlertCategory::InviteLinkPosted));
    // "free" + "giveaway" + "winner" is a scam-cluster hit.
    assert!(cats.contains(&AlertCategory::ContextViolation));
}

#[test]
fn harmful_keywords_alert_is_high_severity() {
    let ag = ActGuard::new(DetectionThresholds::default());
    let alerts = ag.on_message(&msg(4, 100, "we should raid and nuke this place", ts(0)));
    let alert = alerts
        .iter()
        .find(|a| a.category == AlertCategory::SuspiciousKeywords)
        .expect("keyword alert");
    assert_eq!(alert.severity, Severity::High);
    assert!(alert.fields.iter().any(|(_, v)| v.contains("raid") && v.contains("nuke")));
}

#[test]
fn reaction_spam_threshold_is_fifteen_per_minute() {
    let ag = ActGuard::new(DetectionThresholds::default());
    let ev = |at| ReactionEvent {
        user_id: 5,
        display_name: "reactor".into(),
        channel_id: 200,
        at,
    };
    for i in 0..14 {
        assert!(ag.on_reaction(&ev(ts(i))).is_empty());
    }
    let alerts = ag.on_reaction(&ev(ts(14)));
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].category, AlertCategory::ReactionSpam);
    assert_eq!(alerts[0].severity, Severity::Medium);
}

#[test]
fn voice_join_and_leave_do_not_count_as_hops() {
    let ag = ActGuard::new(DetectionThresholds::default());
    let ev = |channel, at| VoiceEvent {
        user_id: 6,
        display_name: "hopper".into(),
        channel,
        at,
    };

    // Join from nowhere, leave to nowhere: nothing recorded.
    assert!(ag.on_voice_state(&ev(Some(300), ts(0))).is_empty());
    assert!(ag.on_voice_state(&ev(None, ts(1))).is_empty());

    // Rejoin, then move three times: three moves so far; the fourth move
    // reaches the threshold of 4 switches.
    assert!(ag.on_voice_state(&ev(Some(300), ts(5))).is_empty());
    assert!(ag.on_voice_state(&ev(Some(301), ts(10))).is_empty());
    assert!(ag.on_voice_state(&ev(Some(302), ts(20))).is_empty());
    assert!(ag.on_voice_state(&ev(Some(303), ts(30))).is_empty());
    let alerts = ag.on_voice_state(&ev(Some(304), ts(40)));
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].category, AlertCategory::VoiceChannelHopping);
    assert_eq!(alerts[0].severity, Severity::Low);
}

#[test]
fn voice_moves_are_derived_without_an_externally_supplied_before_channel() {
    // Updates carry only the new channel; the engine must still recognize
    // moves by remembering where the user last was.
    let ag = ActGuard::new(DetectionThresholds::default());
    let ev = |user, channel, at| VoiceEvent {
        user_id: user,
        display_name: "hopper".into(),
        channel,
        at,
    };

    // A leave and a fresh rejoin are not a move, even into a new channel.
    ag.on_voice_state(&ev(7, Some(300), ts(0)));
    ag.on_voice_state(&ev(7, None, ts(1)));
    ag.on_voice_state(&ev(7, Some(301), ts(2)));

    // One genuine move remains below the threshold of 4.
    assert!(ag.on_voice_state(&ev(7, Some(302), ts(3))).is_empty());

    // A duplicate update for the same channel is not a move either.
    for i in 0..10 {
        assert!(ag.on_voice_state(&ev(7, Some(302), ts(4 + i))).is_empty());
    }
}

#[test]
fn member_join_checks_account_age_and_username_independently() {
    let ag = ActGuard::new(DetectionThresholds::default());

    // Brand-new account with a name hitting two patterns: exactly one
    // SuspiciousUsername (first match wins) plus the age alert.
    let ev = JoinEvent {
        user_id: 7,
        username: "admin12345".into(),
        account_created_at: ts(0) - Duration::hours(3),
        at: ts(0),
    };
    let alerts = ag.on_member_join(&ev);
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].category, AlertCategory::NewAccountJoined);
    let usernames: Vec<_> = alerts
        .iter()
        .filter(|a| a.category == AlertCategory::SuspiciousUsername)
        .collect();
    assert_eq!(usernames.len(), 1);
    assert!(usernames[0].description.contains("digit run"));

    // Old account, plain name: nothing.
    let ev = JoinEvent {
        user_id: 8,
        username: "sunnybeach".into(),
        account_created_at: ts(0) - Duration::days(400),
        at: ts(0),
    };
    assert!(ag.on_member_join(&ev).is_empty());
}

#[test]
fn failed_commands_retrigger_past_the_threshold() {
    let ag = ActGuard::new(DetectionThresholds::default());
    let ev = |at| CommandFailedEvent {
        user_id: 9,
        display_name: "fumbler".into(),
        command: "sentinel".into(),
        error: "missing permissions".into(),
        at,
    };
    for i in 0..9 {
        assert!(ag.on_command_failed(&ev(ts(i))).is_empty());
    }
    let alerts = ag.on_command_failed(&ev(ts(9)));
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].category, AlertCategory::ExcessiveFailedCommands);
    // Counter keeps accumulating: the 11th failure re-triggers.
    let alerts = ag.on_command_failed(&ev(ts(10)));
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].description.contains("11"));
}

#[test]
fn optional_cooldown_suppresses_repeat_alerts() {
    let thresholds = DetectionThresholds {
        alert_cooldown_secs: Some(120),
        ..DetectionThresholds::default()
    };
    let ag = ActGuard::new(thresholds);

    for i in 0..7 {
        ag.on_message(&msg(10, 100, "hi", ts(i)));
    }
    assert_eq!(ag.on_message(&msg(10, 100, "hi", ts(7))).len(), 1);
    // Inside the cooldown: suppressed.
    assert!(ag.on_message(&msg(10, 100, "hi", ts(8))).is_empty());
    // Past the cooldown the same category may fire again.
    for i in 0..7 {
        ag.on_message(&msg(10, 100, "hi", ts(200 + i)));
    }
    assert_eq!(ag.on_message(&msg(10, 100, "hi", ts(207))).len(), 1);
}

#[test]
fn engine_sweep_is_idempotent() {
    let ag = ActGuard::new(DetectionThresholds::default());
    ag.on_message(&msg(11, 100, "hi", ts(0)));
    ag.on_message(&msg(12, 100, "hi", ts(590)));
    ag.sweep(ts(600));
    let after_first = ag.tracked_users();
    ag.sweep(ts(600));
    assert_eq!(ag.tracked_users(), after_first);
}

//! src/tracker.rs
//! Rate Window Tracker – per-user, per-signal sliding windows of event
//! timestamps, plus the hourly failed-command counter.
//!
//! The tracker is a plain owned store (no globals): the detection engine gets
//! one injected instance, tests build as many as they like. All mutation for a
//! given user happens under that user's DashMap entry lock, so trim-then-append
//! stays atomic per user even if the caller dispatches events from more than
//! one task.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Trackable event category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Message,
    Reaction,
    ChannelVisit,
    VoiceHop,
}

impl Signal {
    /// Maximum age an entry may reach before the reclaimer sweep drops it,
    /// regardless of whether any query ever counted it.
    pub fn retention(self) -> Duration {
        match self {
            Signal::Message => Duration::seconds(300),
            Signal::Reaction => Duration::seconds(300),
            Signal::ChannelVisit => Duration::seconds(600),
            Signal::VoiceHop => Duration::seconds(600),
        }
    }
}

/// Append-only, time-ordered sequence of `(timestamp, payload)` records.
/// Eviction is a destructive prefix trim – sequences are time-ordered, so
/// everything older than the cutoff sits at the front.
#[derive(Debug, Default)]
pub struct SignalWindow {
    entries: VecDeque<(DateTime<Utc>, Option<u64>)>,
}

impl SignalWindow {
    pub fn push(&mut self, at: DateTime<Utc>, payload: Option<u64>) {
        self.entries.push_back((at, payload));
    }

    /// Drop every entry strictly older than `now - window`. An entry exactly
    /// `window` old still counts.
    pub fn evict_older_than(&mut self, window: Duration, now: DateTime<Utc>) {
        while let Some(&(front, _)) = self.entries.front() {
            if now - front > window {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn distinct_payloads(&self) -> usize {
        self.entries
            .iter()
            .filter_map(|(_, p)| *p)
            .collect::<HashSet<u64>>()
            .len()
    }

    /// Last `n` payloads, newest last. Used for alert detail ("recent
    /// channels").
    pub fn recent_payloads(&self, n: usize) -> Vec<u64> {
        self.entries
            .iter()
            .rev()
            .take(n)
            .filter_map(|(_, p)| *p)
            .rev()
            .collect()
    }
}

#[derive(Debug, Default)]
struct UserActivity {
    messages: SignalWindow,
    reactions: SignalWindow,
    channel_visits: SignalWindow,
    voice_hops: SignalWindow,
}

impl UserActivity {
    fn window_mut(&mut self, signal: Signal) -> &mut SignalWindow {
        match signal {
            Signal::Message => &mut self.messages,
            Signal::Reaction => &mut self.reactions,
            Signal::ChannelVisit => &mut self.channel_visits,
            Signal::VoiceHop => &mut self.voice_hops,
        }
    }

    fn is_empty(&self) -> bool {
        self.messages.is_empty()
            && self.reactions.is_empty()
            && self.channel_visits.is_empty()
            && self.voice_hops.is_empty()
    }
}

/// Per-user activity store. Everything here is volatile and intentionally
/// discarded on restart.
#[derive(Debug, Default)]
pub struct ActivityTracker {
    users: DashMap<u64, UserActivity>,
    failed_commands: DashMap<u64, u32>,
    // Wall-clock hour of the last failed-command reset.
    last_hour_reset: Mutex<Option<DateTime<Utc>>>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event. Payload carries the channel id for the hopping
    /// signals; `None` for the plain counters.
    pub fn record(&self, user: u64, signal: Signal, at: DateTime<Utc>, payload: Option<u64>) {
        self.users
            .entry(user)
            .or_default()
            .window_mut(signal)
            .push(at, payload);
    }

    /// Evict-then-count. The eviction mutates the stored sequence; a missing
    /// user or signal yields 0.
    pub fn count_in_window(
        &self,
        user: u64,
        signal: Signal,
        window: Duration,
        now: DateTime<Utc>,
    ) -> usize {
        let Some(mut ua) = self.users.get_mut(&user) else {
            return 0;
        };
        let w = ua.window_mut(signal);
        w.evict_older_than(window, now);
        w.len()
    }

    /// Evict-then-count distinct payload values (distinct channels for the
    /// hopping signals).
    pub fn distinct_in_window(
        &self,
        user: u64,
        signal: Signal,
        window: Duration,
        now: DateTime<Utc>,
    ) -> usize {
        let Some(mut ua) = self.users.get_mut(&user) else {
            return 0;
        };
        let w = ua.window_mut(signal);
        w.evict_older_than(window, now);
        w.distinct_payloads()
    }

    /// Newest payloads in a signal's window, for alert detail.
    pub fn recent_payloads(&self, user: u64, signal: Signal, n: usize) -> Vec<u64> {
        self.users
            .get_mut(&user)
            .map(|mut ua| ua.window_mut(signal).recent_payloads(n))
            .unwrap_or_default()
    }

    /// Bump the hourly failed-command counter and return the new total. The
    /// counter keeps accumulating past any threshold; only the hourly sweep
    /// clears it.
    pub fn record_failed_command(&self, user: u64) -> u32 {
        let mut entry = self.failed_commands.entry(user).or_insert(0);
        *entry += 1;
        *entry
    }

    pub fn tracked_users(&self) -> usize {
        self.users.len()
    }

    /// Reclaimer sweep: trim every window to its signal's retention horizon,
    /// drop users whose windows are all empty, and clear the failed-command
    /// counters when the wall-clock hour rolls over. Safe to run twice in a
    /// row – the second pass finds nothing to evict.
    pub fn sweep(&self, now: DateTime<Utc>) {
        for signal in [
            Signal::Message,
            Signal::Reaction,
            Signal::ChannelVisit,
            Signal::VoiceHop,
        ] {
            for mut entry in self.users.iter_mut() {
                entry.window_mut(signal).evict_older_than(signal.retention(), now);
            }
        }
        self.users.retain(|_, ua| !ua.is_empty());

        let mut last = self
            .last_hour_reset
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let hour_index = |t: DateTime<Utc>| t.timestamp().div_euclid(3600);
        let rolled = match *last {
            Some(prev) => hour_index(prev) != hour_index(now),
            None => false,
        };
        if rolled {
            self.failed_commands.clear();
        }
        *last = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn count_evicts_stale_entries() {
        let t = ActivityTracker::new();
        t.record(1, Signal::Message, ts(0), None);
        t.record(1, Signal::Message, ts(61), None);
        // 60s window queried at t=61: the t=0 entry is out.
        assert_eq!(t.count_in_window(1, Signal::Message, Duration::seconds(60), ts(61)), 1);
    }

    #[test]
    fn entry_exactly_window_old_still_counts() {
        let t = ActivityTracker::new();
        t.record(1, Signal::Message, ts(0), None);
        assert_eq!(t.count_in_window(1, Signal::Message, Duration::seconds(60), ts(60)), 1);
        assert_eq!(t.count_in_window(1, Signal::Message, Duration::seconds(60), ts(61)), 0);
    }

    #[test]
    fn missing_user_counts_zero() {
        let t = ActivityTracker::new();
        assert_eq!(t.count_in_window(42, Signal::Reaction, Duration::seconds(60), ts(0)), 0);
        assert_eq!(t.distinct_in_window(42, Signal::VoiceHop, Duration::seconds(300), ts(0)), 0);
    }

    #[test]
    fn distinct_counts_channels_not_events() {
        let t = ActivityTracker::new();
        t.record(1, Signal::ChannelVisit, ts(0), Some(100));
        t.record(1, Signal::ChannelVisit, ts(1), Some(100));
        t.record(1, Signal::ChannelVisit, ts(2), Some(200));
        assert_eq!(
            t.distinct_in_window(1, Signal::ChannelVisit, Duration::seconds(120), ts(3)),
            2
        );
        assert_eq!(
            t.count_in_window(1, Signal::ChannelVisit, Duration::seconds(120), ts(3)),
            3
        );
    }

    #[test]
    fn failed_commands_accumulate() {
        let t = ActivityTracker::new();
        for expected in 1..=12u32 {
            assert_eq!(t.record_failed_command(7), expected);
        }
    }

    #[test]
    fn sweep_trims_to_retention_and_drops_empty_users() {
        let t = ActivityTracker::new();
        t.record(1, Signal::Message, ts(0), None);
        t.record(2, Signal::Message, ts(590), None);
        // Message retention is 300s; at t=600 user 1 is stale, user 2 fresh.
        t.sweep(ts(600));
        assert_eq!(t.tracked_users(), 1);
        assert_eq!(t.count_in_window(2, Signal::Message, Duration::seconds(60), ts(600)), 1);
    }

    #[test]
    fn sweep_is_idempotent() {
        let t = ActivityTracker::new();
        t.record(1, Signal::Message, ts(0), None);
        t.record(1, Signal::ChannelVisit, ts(550), Some(9));
        t.sweep(ts(600));
        let users = t.tracked_users();
        let visits = t.count_in_window(1, Signal::ChannelVisit, Duration::seconds(120), ts(600));
        t.sweep(ts(600));
        assert_eq!(t.tracked_users(), users);
        assert_eq!(
            t.count_in_window(1, Signal::ChannelVisit, Duration::seconds(120), ts(600)),
            visits
        );
    }

    #[test]
    fn failed_commands_reset_on_hour_rollover() {
        let t = ActivityTracker::new();
        let in_hour = Utc.with_ymd_and_hms(2025, 3, 1, 14, 10, 0).unwrap();
        let next_hour = Utc.with_ymd_and_hms(2025, 3, 1, 15, 0, 30).unwrap();
        t.sweep(in_hour);
        t.record_failed_command(5);
        t.record_failed_command(5);
        // Same hour: nothing cleared.
        t.sweep(in_hour + Duration::minutes(10));
        assert_eq!(t.record_failed_command(5), 3);
        // Hour rolled over: counter starts fresh.
        t.sweep(next_hour);
        assert_eq!(t.record_failed_command(5), 1);
    }

    proptest! {
        #[test]
        fn count_is_exact_inside_span(offsets in proptest::collection::vec(0i64..60, 1..40)) {
            let t = ActivityTracker::new();
            let mut sorted = offsets.clone();
            sorted.sort_unstable();
            for &o in &sorted {
                t.record(1, Signal::Message, ts(o), None);
            }
            let now = ts(*sorted.last().unwrap());
            prop_assert_eq!(
                t.count_in_window(1, Signal::Message, Duration::seconds(60), now),
                sorted.len()
            );
        }
    }
}

//! Connection health monitors: lag, desync, and lobby readiness.
//!
//! All three monitors run on the host only and gate themselves to at most one
//! evaluation per configured check interval, so the session can call them on
//! every poll without doing redundant work. Each evaluation returns a list of
//! [`MonitorOutcome`]s; the session owns turning those into warnings, system
//! notices, and kicks.
//!
//! The monitors never touch a non-human seat, the host's own seat, a seat
//! without a live connection, or a seat already marked for disconnect.

use smallvec::SmallVec;
use tracing::{debug, trace};
use web_time::{Duration, Instant};

use crate::sessions::config::MonitorConfig;
use crate::sessions::roster::{ConnectionFlag, Roster};
use crate::SlotIndex;

/// Kick threshold cap for spectators still loading once every game seat has
/// finished. Watching is optional; holding up the match is not.
const SPECTATOR_LAG_KICK_CAP_SECONDS: u32 = 10;

/// Seconds short of the lag and desync thresholds at which every evaluation
/// produces a warning.
const FINAL_WARNING_MARGIN_SECONDS: u32 = 3;

/// Seconds short of the not-ready threshold at which warnings start.
const NOT_READY_WARNING_MARGIN_SECONDS: u32 = 6;

/// Cadence of periodic lag warnings below the final-warning margin.
const LAG_REMINDER_EVERY_SECONDS: u32 = 15;

/// Cadence of periodic desync warnings below the final-warning margin.
const DESYNC_REMINDER_EVERY_SECONDS: u32 = 2;

/// What one monitor evaluation decided about one seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MonitorOutcome {
    /// The seat is in trouble but below its kick threshold.
    Warn {
        /// The seat in trouble.
        slot: SlotIndex,
        /// Seconds accumulated against the threshold so far.
        seconds: u32,
        /// Seconds at which the kick fires.
        kick_at: u32,
    },
    /// The seat crossed its kick threshold.
    Kick {
        /// The seat to remove.
        slot: SlotIndex,
    },
}

pub(crate) type Outcomes = SmallVec<[MonitorOutcome; 4]>;

/// Per-seat latency bookkeeping for the ping service.
///
/// One probe may be outstanding per seat. An answered probe updates the
/// rolling estimate; a probe that outlives the configured limit saturates it,
/// so a peer that stopped answering reads as lagging instead of keeping its
/// last healthy value.
#[derive(Debug, Clone)]
pub(crate) struct PingTracker {
    states: Vec<PingState>,
    interval: Duration,
    limit: Duration,
}

#[derive(Debug, Clone, Copy, Default)]
struct PingState {
    rolling: Duration,
    sent_at: Option<Instant>,
    last_probe: Option<Instant>,
}

impl PingTracker {
    pub(crate) fn new(num_slots: usize, config: &MonitorConfig) -> Self {
        Self {
            states: vec![PingState::default(); num_slots],
            interval: config.ping_interval,
            limit: config.ping_limit,
        }
    }

    /// Seats due for a latency probe, each marked as probed at `now`.
    /// The caller sends the actual probe envelopes.
    pub(crate) fn due_probes(
        &mut self,
        roster: &Roster,
        now: Instant,
    ) -> SmallVec<[SlotIndex; 8]> {
        let mut due = SmallVec::new();
        for (index, state) in self.states.iter_mut().enumerate() {
            let slot = SlotIndex::new(index);
            if slot == roster.local_slot() {
                continue;
            }
            let eligible = roster
                .slot(slot)
                .is_some_and(|entry| entry.connected && entry.is_human());
            if !eligible {
                continue;
            }
            if let Some(sent) = state.sent_at {
                let waited = now.saturating_duration_since(sent);
                if waited >= self.limit {
                    state.rolling = waited;
                }
            }
            if state.last_probe.is_none_or(|at| at + self.interval <= now) {
                state.last_probe = Some(now);
                state.sent_at = Some(now);
                due.push(slot);
            }
        }
        due
    }

    /// Records an answered probe from `slot`. A pong without an outstanding
    /// probe is ignored.
    pub(crate) fn record_pong(&mut self, slot: SlotIndex, now: Instant) {
        if let Some(state) = self.states.get_mut(slot.as_usize()) {
            if let Some(sent) = state.sent_at.take() {
                state.rolling = now.saturating_duration_since(sent);
                trace!(%slot, rolling_ms = state.rolling.as_millis(), "ping answered");
            }
        }
    }

    /// Best current estimate of the seat's latency: the rolling value, or
    /// the age of an unanswered probe if that is already worse.
    pub(crate) fn current_ping(&self, slot: SlotIndex, now: Instant) -> Duration {
        let Some(state) = self.states.get(slot.as_usize()) else {
            return Duration::ZERO;
        };
        let outstanding = state
            .sent_at
            .map_or(Duration::ZERO, |sent| now.saturating_duration_since(sent));
        state.rolling.max(outstanding)
    }

    pub(crate) fn reset_slot(&mut self, slot: SlotIndex) {
        if let Some(state) = self.states.get_mut(slot.as_usize()) {
            *state = PingState::default();
        }
    }
}

/// Clock for one seat's lobby readiness: accumulated not-ready time plus the
/// start of the current streak. Toggling ready ends the streak but keeps the
/// total.
#[derive(Debug, Clone, Copy, Default)]
struct NotReadyClock {
    accumulated: Duration,
    since: Option<Instant>,
}

/// The host's three seat-health monitors and their per-seat counters.
#[derive(Debug, Clone)]
pub(crate) struct HealthMonitors {
    config: MonitorConfig,
    lag_counters: Vec<u32>,
    desync_counters: Vec<u32>,
    not_ready: Vec<NotReadyClock>,
    last_lag_check: Option<Instant>,
    last_desync_check: Option<Instant>,
    last_ready_check: Option<Instant>,
    match_start: Option<Instant>,
    match_ended: bool,
}

impl HealthMonitors {
    pub(crate) fn new(num_slots: usize, config: MonitorConfig) -> Self {
        Self {
            config,
            lag_counters: vec![0; num_slots],
            desync_counters: vec![0; num_slots],
            not_ready: vec![NotReadyClock::default(); num_slots],
            last_lag_check: None,
            last_desync_check: None,
            last_ready_check: None,
            match_start: None,
            match_ended: false,
        }
    }

    /// Stamps the start of the match; the initial-load grace counts from
    /// here. Later calls keep the first stamp.
    pub(crate) fn mark_match_started(&mut self, now: Instant) {
        if self.match_start.is_none() {
            self.match_start = Some(now);
        }
    }

    /// Suspends the desync monitor for the rest of the session.
    pub(crate) fn mark_match_ended(&mut self) {
        self.match_ended = true;
    }

    /// Clears every counter for a seat whose occupant departed.
    pub(crate) fn reset_slot(&mut self, slot: SlotIndex) {
        let index = slot.as_usize();
        if let Some(counter) = self.lag_counters.get_mut(index) {
            *counter = 0;
        }
        if let Some(counter) = self.desync_counters.get_mut(index) {
            *counter = 0;
        }
        if let Some(clock) = self.not_ready.get_mut(index) {
            *clock = NotReadyClock::default();
        }
    }

    fn due(gate: &mut Option<Instant>, interval: Duration, now: Instant) -> bool {
        if gate.is_some_and(|last| last + interval > now) {
            return false;
        }
        *gate = Some(now);
        true
    }

    fn skip(roster: &Roster, slot: SlotIndex) -> bool {
        if slot == roster.host_slot() {
            return true;
        }
        roster
            .slot(slot)
            .is_none_or(|entry| !entry.is_human() || !entry.connected || entry.pending_disconnect)
    }

    /// Evaluates seat lag against the rolling ping estimates.
    ///
    /// First pass fixes the thresholds per seat category: players keep the
    /// initial-load grace and the configured kick threshold; spectators lose
    /// the grace and get a capped threshold once every game seat has loaded.
    /// Second pass walks the seats. A lagging seat gains a second, a healthy
    /// one decays by one with a floor of zero.
    pub(crate) fn check_lag(
        &mut self,
        roster: &mut Roster,
        pings: &PingTracker,
        now: Instant,
    ) -> Outcomes {
        let mut outcomes = Outcomes::new();
        let kick_seconds = self.config.lag_kick_seconds;
        if kick_seconds == 0 {
            return outcomes;
        }
        if !Self::due(&mut self.last_lag_check, self.config.check_interval, now) {
            return outcomes;
        }

        let all_loaded = roster.all_player_seats_loaded();
        let player_grace = self.config.initial_load_grace;
        let (spectator_grace, spectator_kick) = if all_loaded {
            (
                Duration::ZERO,
                kick_seconds.min(SPECTATOR_LAG_KICK_CAP_SECONDS),
            )
        } else {
            (player_grace, kick_seconds)
        };
        let since_start = self
            .match_start
            .map_or(Duration::ZERO, |start| now.saturating_duration_since(start));

        for index in 0..roster.num_slots() {
            let slot = SlotIndex::new(index);
            if Self::skip(roster, slot) {
                continue;
            }
            let Some(entry) = roster.slot(slot) else {
                continue;
            };
            let (grace, kick_at) = if entry.spectator {
                (spectator_grace, spectator_kick)
            } else {
                (player_grace, kick_seconds)
            };
            let lagging = if entry.joining_in_progress {
                since_start >= grace
            } else {
                pings.current_ping(slot, now) >= self.config.ping_limit
            };

            let Some(counter) = self.lag_counters.get_mut(index) else {
                continue;
            };
            if !lagging {
                if *counter > 0 {
                    *counter -= 1;
                    trace!(%slot, counter = *counter, "lag counter decaying");
                }
                continue;
            }

            *counter += 1;
            if let Some(entry) = roster.slot_mut(slot) {
                entry.status.set(ConnectionFlag::Waiting);
            }
            if *counter >= kick_at {
                debug!(%slot, seconds = *counter, "lag kick threshold crossed");
                outcomes.push(MonitorOutcome::Kick { slot });
                *counter = 0;
            } else if *counter + FINAL_WARNING_MARGIN_SECONDS >= kick_at
                || *counter % LAG_REMINDER_EVERY_SECONDS == 0
            {
                outcomes.push(MonitorOutcome::Warn {
                    slot,
                    seconds: *counter,
                    kick_at,
                });
            }
        }
        outcomes
    }

    /// Evaluates sustained desync, driven by the Desynced connection flag on
    /// game seats. A clear flag resets the streak outright; there is no
    /// decay. Suspended once the match end has been recorded.
    pub(crate) fn check_desync(&mut self, roster: &Roster, now: Instant) -> Outcomes {
        let mut outcomes = Outcomes::new();
        let kick_seconds = self.config.desync_kick_seconds;
        if kick_seconds == 0 || self.match_ended {
            return outcomes;
        }
        if !Self::due(&mut self.last_desync_check, self.config.check_interval, now) {
            return outcomes;
        }

        for index in 0..roster.game_slot_count() {
            let slot = SlotIndex::new(index);
            if Self::skip(roster, slot) {
                continue;
            }
            let desynced = roster
                .slot(slot)
                .is_some_and(|entry| entry.status.contains(ConnectionFlag::Desynced));
            let Some(counter) = self.desync_counters.get_mut(index) else {
                continue;
            };
            if !desynced {
                *counter = 0;
                continue;
            }

            *counter += 1;
            if *counter >= kick_seconds {
                debug!(%slot, seconds = *counter, "desync kick threshold crossed");
                outcomes.push(MonitorOutcome::Kick { slot });
                *counter = 0;
            } else if *counter + FINAL_WARNING_MARGIN_SECONDS >= kick_seconds
                || *counter % DESYNC_REMINDER_EVERY_SECONDS == 0
            {
                outcomes.push(MonitorOutcome::Warn {
                    slot,
                    seconds: *counter,
                    kick_at: kick_seconds,
                });
            }
        }
        outcomes
    }

    /// Evaluates lobby readiness. The session calls this only while the
    /// lobby is open and the ruleset enforces a ready check. The kick
    /// threshold is shared with the lag monitor.
    pub(crate) fn check_not_ready(&mut self, roster: &Roster, now: Instant) -> Outcomes {
        let mut outcomes = Outcomes::new();
        let kick_seconds = self.config.lag_kick_seconds;
        if kick_seconds == 0 || !self.config.ready_check_enabled {
            return outcomes;
        }
        if !Self::due(&mut self.last_ready_check, self.config.check_interval, now) {
            return outcomes;
        }

        for index in 0..roster.num_slots() {
            let slot = SlotIndex::new(index);
            if Self::skip(roster, slot) {
                continue;
            }
            let ready = roster.slot(slot).is_some_and(|entry| entry.ready);
            let Some(clock) = self.not_ready.get_mut(index) else {
                continue;
            };
            if ready {
                if let Some(since) = clock.since.take() {
                    clock.accumulated += now.saturating_duration_since(since);
                }
                continue;
            }

            let since = *clock.since.get_or_insert(now);
            let total = clock.accumulated + now.saturating_duration_since(since);
            let seconds = u32::try_from(total.as_secs()).unwrap_or(u32::MAX);
            if seconds >= kick_seconds {
                debug!(%slot, seconds, "not-ready kick threshold crossed");
                outcomes.push(MonitorOutcome::Kick { slot });
                *clock = NotReadyClock::default();
            } else if seconds + NOT_READY_WARNING_MARGIN_SECONDS >= kick_seconds {
                outcomes.push(MonitorOutcome::Warn {
                    slot,
                    seconds,
                    kick_at: kick_seconds,
                });
            }
        }
        outcomes
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::sessions::roster::{PlayerSlot, SlotControl};

    const HOST: SlotIndex = SlotIndex::new(0);
    const PLAYER: SlotIndex = SlotIndex::new(1);
    const SPECTATOR: SlotIndex = SlotIndex::new(2);

    // Two game seats plus one spectator seat, host at 0, all human and
    // connected.
    fn test_roster() -> Roster {
        let mut slots = vec![PlayerSlot::default(); 3];
        for (index, slot) in slots.iter_mut().enumerate() {
            slot.name = format!("player-{index}");
            slot.control = SlotControl::Human;
            slot.connected = true;
        }
        slots[2].spectator = true;
        Roster::new(slots, 2, HOST, HOST)
    }

    fn test_config(lag_kick_seconds: u32, desync_kick_seconds: u32) -> MonitorConfig {
        MonitorConfig {
            lag_kick_seconds,
            desync_kick_seconds,
            ..MonitorConfig::default()
        }
    }

    fn saturate_ping(pings: &mut PingTracker, slot: SlotIndex) {
        pings.states[slot.as_usize()].rolling = Duration::from_secs(30);
    }

    // ===== PingTracker Tests =====

    #[test]
    fn probes_respect_the_interval() {
        let roster = test_roster();
        let mut pings = PingTracker::new(3, &MonitorConfig::default());
        let base = Instant::now();

        let due = pings.due_probes(&roster, base);
        assert_eq!(due.as_slice(), &[PLAYER, SPECTATOR]);

        // Within the interval nothing is due.
        let due = pings.due_probes(&roster, base + Duration::from_millis(500));
        assert!(due.is_empty());

        let due = pings.due_probes(&roster, base + Duration::from_millis(2000));
        assert_eq!(due.len(), 2);
    }

    #[test]
    fn probes_skip_unoccupied_and_disconnected_seats() {
        let mut roster = test_roster();
        roster.slot_mut(PLAYER).unwrap().connected = false;
        roster.slot_mut(SPECTATOR).unwrap().control = SlotControl::Open;
        let mut pings = PingTracker::new(3, &MonitorConfig::default());

        let due = pings.due_probes(&roster, Instant::now());
        assert!(due.is_empty());
    }

    #[test]
    fn answered_probe_updates_the_rolling_estimate() {
        let roster = test_roster();
        let mut pings = PingTracker::new(3, &MonitorConfig::default());
        let base = Instant::now();

        pings.due_probes(&roster, base);
        pings.record_pong(PLAYER, base + Duration::from_millis(120));

        let ping = pings.current_ping(PLAYER, base + Duration::from_millis(200));
        assert_eq!(ping, Duration::from_millis(120));
    }

    #[test]
    fn unanswered_probe_saturates_the_estimate() {
        let roster = test_roster();
        let mut pings = PingTracker::new(3, &MonitorConfig::default());
        let base = Instant::now();

        pings.due_probes(&roster, base);
        // No pong. Past the limit the outstanding age wins.
        let ping = pings.current_ping(PLAYER, base + Duration::from_secs(5));
        assert_eq!(ping, Duration::from_secs(5));

        // The next probe pass writes the saturated value into the estimate.
        pings.due_probes(&roster, base + Duration::from_secs(6));
        assert!(pings.states[PLAYER.as_usize()].rolling >= Duration::from_secs(4));
    }

    #[test]
    fn stray_pong_is_ignored() {
        let mut pings = PingTracker::new(3, &MonitorConfig::default());
        pings.record_pong(PLAYER, Instant::now());
        assert_eq!(pings.states[PLAYER.as_usize()].rolling, Duration::ZERO);

        // Out of range never panics.
        pings.record_pong(SlotIndex::new(99), Instant::now());
    }

    // ===== Lag Monitor Tests =====

    #[test]
    fn lag_monitor_gates_itself() {
        let mut roster = test_roster();
        let mut pings = PingTracker::new(3, &MonitorConfig::default());
        saturate_ping(&mut pings, PLAYER);
        let mut monitors = HealthMonitors::new(3, test_config(60, 10));
        let base = Instant::now();

        let first = monitors.check_lag(&mut roster, &pings, base);
        assert_eq!(first.len(), 0);
        assert_eq!(monitors.lag_counters[PLAYER.as_usize()], 1);

        // Same instant again: gated, no double count.
        monitors.check_lag(&mut roster, &pings, base);
        assert_eq!(monitors.lag_counters[PLAYER.as_usize()], 1);

        monitors.check_lag(&mut roster, &pings, base + Duration::from_secs(1));
        assert_eq!(monitors.lag_counters[PLAYER.as_usize()], 2);
    }

    #[test]
    fn lag_counter_decays_when_healthy() {
        let mut roster = test_roster();
        let pings = PingTracker::new(3, &MonitorConfig::default());
        let mut monitors = HealthMonitors::new(3, test_config(60, 10));
        monitors.lag_counters[PLAYER.as_usize()] = 2;
        let base = Instant::now();

        monitors.check_lag(&mut roster, &pings, base);
        assert_eq!(monitors.lag_counters[PLAYER.as_usize()], 1);
        monitors.check_lag(&mut roster, &pings, base + Duration::from_secs(1));
        monitors.check_lag(&mut roster, &pings, base + Duration::from_secs(2));
        assert_eq!(monitors.lag_counters[PLAYER.as_usize()], 0);
    }

    #[test]
    fn alternating_lag_never_reaches_the_threshold() {
        let mut roster = test_roster();
        let mut lagging = PingTracker::new(3, &MonitorConfig::default());
        saturate_ping(&mut lagging, PLAYER);
        let healthy = PingTracker::new(3, &MonitorConfig::default());
        let mut monitors = HealthMonitors::new(3, test_config(5, 10));
        let base = Instant::now();

        // One second gained on a lagging tick, one given back on the next.
        for tick in 0..60_u64 {
            let pings = if tick % 2 == 0 { &lagging } else { &healthy };
            let outcomes = monitors.check_lag(&mut roster, pings, base + Duration::from_secs(tick));
            assert!(!outcomes.contains(&MonitorOutcome::Kick { slot: PLAYER }));
            assert!(monitors.lag_counters[PLAYER.as_usize()] <= 1);
        }
    }

    #[test]
    fn lag_kick_fires_at_the_threshold_and_resets() {
        let mut roster = test_roster();
        let mut pings = PingTracker::new(3, &MonitorConfig::default());
        saturate_ping(&mut pings, PLAYER);
        let mut monitors = HealthMonitors::new(3, test_config(5, 10));
        let base = Instant::now();

        let mut kicked = false;
        for tick in 0..5_u64 {
            let outcomes = monitors.check_lag(&mut roster, &pings, base + Duration::from_secs(tick));
            if outcomes.contains(&MonitorOutcome::Kick { slot: PLAYER }) {
                kicked = true;
                assert_eq!(tick, 4);
            }
        }
        assert!(kicked);
        assert_eq!(monitors.lag_counters[PLAYER.as_usize()], 0);
    }

    #[test]
    fn lag_warning_cadence() {
        let mut roster = test_roster();
        let mut pings = PingTracker::new(3, &MonitorConfig::default());
        saturate_ping(&mut pings, PLAYER);
        let mut monitors = HealthMonitors::new(3, test_config(20, 10));
        let base = Instant::now();

        let mut warned_at = Vec::new();
        for tick in 0..20_u64 {
            let outcomes = monitors.check_lag(&mut roster, &pings, base + Duration::from_secs(tick));
            for outcome in outcomes {
                if let MonitorOutcome::Warn { seconds, .. } = outcome {
                    warned_at.push(seconds);
                }
            }
        }
        // A reminder at 15 accumulated seconds, then every second within the
        // final margin.
        assert_eq!(warned_at, vec![15, 17, 18, 19]);
    }

    #[test]
    fn lag_marks_the_seat_as_waited_on() {
        let mut roster = test_roster();
        let mut pings = PingTracker::new(3, &MonitorConfig::default());
        saturate_ping(&mut pings, PLAYER);
        let mut monitors = HealthMonitors::new(3, test_config(60, 10));

        monitors.check_lag(&mut roster, &pings, Instant::now());
        assert!(roster
            .slot(PLAYER)
            .unwrap()
            .status
            .contains(ConnectionFlag::Waiting));
    }

    #[test]
    fn loading_seat_is_spared_during_the_grace_window() {
        let mut roster = test_roster();
        roster.slot_mut(PLAYER).unwrap().joining_in_progress = true;
        let pings = PingTracker::new(3, &MonitorConfig::default());
        let mut monitors = HealthMonitors::new(3, test_config(60, 10));
        let base = Instant::now();
        monitors.mark_match_started(base);

        monitors.check_lag(&mut roster, &pings, base + Duration::from_secs(10));
        assert_eq!(monitors.lag_counters[PLAYER.as_usize()], 0);

        // Past the grace window the still-loading seat counts as lagging.
        monitors.check_lag(&mut roster, &pings, base + Duration::from_secs(61));
        assert_eq!(monitors.lag_counters[PLAYER.as_usize()], 1);
    }

    #[test]
    fn loading_spectator_loses_grace_once_players_are_in() {
        let mut roster = test_roster();
        roster.slot_mut(SPECTATOR).unwrap().joining_in_progress = true;
        let pings = PingTracker::new(3, &MonitorConfig::default());
        let mut monitors = HealthMonitors::new(3, test_config(60, 10));
        let base = Instant::now();
        monitors.mark_match_started(base);

        // Game seats are loaded, so the spectator gets no grace and a capped
        // threshold.
        let mut kick_tick = None;
        for tick in 0..12_u64 {
            let outcomes = monitors.check_lag(&mut roster, &pings, base + Duration::from_secs(tick));
            if outcomes.contains(&MonitorOutcome::Kick { slot: SPECTATOR }) {
                kick_tick = Some(tick);
                break;
            }
        }
        assert_eq!(kick_tick, Some(9));
    }

    #[test]
    fn loading_spectator_keeps_grace_while_players_load() {
        let mut roster = test_roster();
        roster.slot_mut(PLAYER).unwrap().joining_in_progress = true;
        roster.slot_mut(SPECTATOR).unwrap().joining_in_progress = true;
        let pings = PingTracker::new(3, &MonitorConfig::default());
        let mut monitors = HealthMonitors::new(3, test_config(60, 10));
        let base = Instant::now();
        monitors.mark_match_started(base);

        monitors.check_lag(&mut roster, &pings, base + Duration::from_secs(5));
        assert_eq!(monitors.lag_counters[SPECTATOR.as_usize()], 0);
    }

    #[test]
    fn lag_monitor_skips_host_and_quarantined_seats() {
        let mut roster = test_roster();
        roster.slot_mut(PLAYER).unwrap().pending_disconnect = true;
        let mut pings = PingTracker::new(3, &MonitorConfig::default());
        saturate_ping(&mut pings, HOST);
        saturate_ping(&mut pings, PLAYER);
        let mut monitors = HealthMonitors::new(3, test_config(60, 10));

        monitors.check_lag(&mut roster, &pings, Instant::now());
        assert_eq!(monitors.lag_counters[HOST.as_usize()], 0);
        assert_eq!(monitors.lag_counters[PLAYER.as_usize()], 0);
    }

    #[test]
    fn lag_monitor_disabled_at_zero_threshold() {
        let mut roster = test_roster();
        let mut pings = PingTracker::new(3, &MonitorConfig::default());
        saturate_ping(&mut pings, PLAYER);
        let mut monitors = HealthMonitors::new(3, test_config(0, 10));

        let outcomes = monitors.check_lag(&mut roster, &pings, Instant::now());
        assert!(outcomes.is_empty());
        assert_eq!(monitors.lag_counters[PLAYER.as_usize()], 0);
    }

    // ===== Desync Monitor Tests =====

    #[test]
    fn desync_counter_tracks_the_flag() {
        let mut roster = test_roster();
        roster
            .slot_mut(PLAYER)
            .unwrap()
            .status
            .set(ConnectionFlag::Desynced);
        let mut monitors = HealthMonitors::new(3, test_config(60, 10));
        let base = Instant::now();

        monitors.check_desync(&roster, base);
        monitors.check_desync(&roster, base + Duration::from_secs(1));
        assert_eq!(monitors.desync_counters[PLAYER.as_usize()], 2);

        // Recovery resets the streak outright.
        roster
            .slot_mut(PLAYER)
            .unwrap()
            .status
            .unset(ConnectionFlag::Desynced);
        monitors.check_desync(&roster, base + Duration::from_secs(2));
        assert_eq!(monitors.desync_counters[PLAYER.as_usize()], 0);
    }

    #[test]
    fn desync_kick_and_warning_cadence() {
        let mut roster = test_roster();
        roster
            .slot_mut(PLAYER)
            .unwrap()
            .status
            .set(ConnectionFlag::Desynced);
        let mut monitors = HealthMonitors::new(3, test_config(60, 8));
        let base = Instant::now();

        let mut warned_at = Vec::new();
        let mut kick_tick = None;
        for tick in 0..8_u64 {
            let outcomes = monitors.check_desync(&roster, base + Duration::from_secs(tick));
            for outcome in outcomes {
                match outcome {
                    MonitorOutcome::Warn { seconds, .. } => warned_at.push(seconds),
                    MonitorOutcome::Kick { slot } => {
                        assert_eq!(slot, PLAYER);
                        kick_tick = Some(tick);
                    }
                }
            }
        }
        // Every even count, then every second within the final margin.
        assert_eq!(warned_at, vec![2, 4, 5, 6, 7]);
        assert_eq!(kick_tick, Some(7));
        assert_eq!(monitors.desync_counters[PLAYER.as_usize()], 0);
    }

    #[test]
    fn desync_monitor_ignores_spectator_seats() {
        let mut roster = test_roster();
        roster
            .slot_mut(SPECTATOR)
            .unwrap()
            .status
            .set(ConnectionFlag::Desynced);
        let mut monitors = HealthMonitors::new(3, test_config(60, 5));

        let outcomes = monitors.check_desync(&roster, Instant::now());
        assert!(outcomes.is_empty());
        assert_eq!(monitors.desync_counters[SPECTATOR.as_usize()], 0);
    }

    #[test]
    fn desync_monitor_suspends_after_match_end() {
        let mut roster = test_roster();
        roster
            .slot_mut(PLAYER)
            .unwrap()
            .status
            .set(ConnectionFlag::Desynced);
        let mut monitors = HealthMonitors::new(3, test_config(60, 5));
        monitors.mark_match_ended();

        let outcomes = monitors.check_desync(&roster, Instant::now());
        assert!(outcomes.is_empty());
        assert_eq!(monitors.desync_counters[PLAYER.as_usize()], 0);
    }

    // ===== Not-Ready Monitor Tests =====

    fn ready_config(lag_kick_seconds: u32) -> MonitorConfig {
        MonitorConfig {
            lag_kick_seconds,
            ready_check_enabled: true,
            ..MonitorConfig::default()
        }
    }

    #[test]
    fn ready_seats_are_left_alone() {
        let mut roster = test_roster();
        for index in 0..3 {
            roster.slot_mut(SlotIndex::new(index)).unwrap().ready = true;
        }
        let mut monitors = HealthMonitors::new(3, ready_config(10));
        let base = Instant::now();

        for tick in 0..12_u64 {
            let outcomes = monitors.check_not_ready(&roster, base + Duration::from_secs(tick));
            assert!(outcomes.is_empty());
        }
    }

    #[test]
    fn idle_seat_is_warned_then_kicked() {
        let roster = test_roster();
        let mut monitors = HealthMonitors::new(3, ready_config(10));
        let base = Instant::now();

        let mut first_warning = None;
        let mut kick_tick = None;
        for tick in 0..=10_u64 {
            let outcomes = monitors.check_not_ready(&roster, base + Duration::from_secs(tick));
            for outcome in outcomes {
                match outcome {
                    MonitorOutcome::Warn { slot, seconds, kick_at } => {
                        if slot == PLAYER && first_warning.is_none() {
                            first_warning = Some(seconds);
                            assert_eq!(kick_at, 10);
                        }
                    }
                    MonitorOutcome::Kick { slot } => {
                        if slot == PLAYER && kick_tick.is_none() {
                            kick_tick = Some(tick);
                        }
                    }
                }
            }
        }
        // The streak starts at the first evaluation, so the clock reads
        // tick seconds at evaluation `tick`.
        assert_eq!(first_warning, Some(4));
        assert_eq!(kick_tick, Some(10));
    }

    #[test]
    fn toggling_ready_keeps_the_accumulated_total() {
        let mut roster = test_roster();
        let mut monitors = HealthMonitors::new(3, ready_config(10));
        let base = Instant::now();

        // Not ready from the first evaluation onward.
        monitors.check_not_ready(&roster, base);
        monitors.check_not_ready(&roster, base + Duration::from_secs(6));

        // Ready for a while: a seven second streak is banked, nothing more
        // accumulates.
        roster.slot_mut(PLAYER).unwrap().ready = true;
        monitors.check_not_ready(&roster, base + Duration::from_secs(7));
        monitors.check_not_ready(&roster, base + Duration::from_secs(60));

        // Not ready again: four more seconds cross the threshold of ten.
        roster.slot_mut(PLAYER).unwrap().ready = false;
        monitors.check_not_ready(&roster, base + Duration::from_secs(61));
        let outcomes = monitors.check_not_ready(&roster, base + Duration::from_secs(65));
        assert!(outcomes.contains(&MonitorOutcome::Kick { slot: PLAYER }));
    }

    #[test]
    fn not_ready_monitor_requires_the_ready_check() {
        let roster = test_roster();
        let mut monitors = HealthMonitors::new(3, test_config(10, 10));
        let base = Instant::now();

        for tick in 0..=12_u64 {
            let outcomes = monitors.check_not_ready(&roster, base + Duration::from_secs(tick));
            assert!(outcomes.is_empty());
        }
    }

    // ===== Shared Behavior Tests =====

    #[test]
    fn reset_slot_clears_every_counter() {
        let mut monitors = HealthMonitors::new(3, ready_config(60));
        monitors.lag_counters[PLAYER.as_usize()] = 5;
        monitors.desync_counters[PLAYER.as_usize()] = 3;
        monitors.not_ready[PLAYER.as_usize()].accumulated = Duration::from_secs(9);

        monitors.reset_slot(PLAYER);
        assert_eq!(monitors.lag_counters[PLAYER.as_usize()], 0);
        assert_eq!(monitors.desync_counters[PLAYER.as_usize()], 0);
        assert_eq!(monitors.not_ready[PLAYER.as_usize()].accumulated, Duration::ZERO);
    }

    #[test]
    fn match_start_stamp_is_first_wins() {
        let mut monitors = HealthMonitors::new(3, test_config(60, 10));
        let base = Instant::now();
        monitors.mark_match_started(base);
        monitors.mark_match_started(base + Duration::from_secs(30));
        assert_eq!(monitors.match_start, Some(base));
    }
}

//! The two-phase data integrity handshake.
//!
//! Phase 1 runs once per match: when everyone has joined, each client reports
//! its [`ContentDigest`] and the host compares it word for word against its
//! own. Phase 2 runs for the rest of the match: the host periodically
//! challenges each game seat and validates the answer, which carries the
//! digest again plus a snapshot of local state that honest peers cannot
//! disagree on (overlay layers, AI assignment, god mode).
//!
//! [`IntegrityTracker`] owns the host-side bookkeeping and returns verdicts;
//! the session turns verdicts into kicks and events.

use smallvec::SmallVec;
use tracing::{debug, error, warn};
use web_time::{Duration, Instant};

use crate::hash::ContentDigest;
use crate::network::messages::{IntegrityResponse, OverlayLayer};
use crate::sessions::config::{IntegrityConfig, MonitorConfig};
use crate::sessions::roster::Roster;
use crate::{GameTime, SlotIndex};

/// Most overlay-layer entries an answer may report before it counts as
/// corrupt.
const OVERLAY_LAYER_LIMIT: usize = 1024;

/// Lowest z-order of the reserved overlay band. Entries here are logged but
/// tolerated.
const RESERVED_LAYER_FLOOR: u16 = 65_530;

/// The overlay layer the script debugger installs.
const SCRIPT_DEBUGGER_LAYER: u16 = u16::MAX - 2;

/// The overlay layer used for notifications. At most one is expected.
const NOTIFICATION_LAYER: u16 = u16::MAX;

/// Floor for the challenge response timeout, in seconds.
const MIN_RESPONSE_TIMEOUT_SECONDS: u64 = 60;

/// Slack added to the lag kick threshold when deriving the response timeout,
/// so the lag monitor gets the first say on an unresponsive peer.
const RESPONSE_TIMEOUT_MARGIN_SECONDS: u64 = 3;

/// Supplies the local state that integrity answers report.
///
/// The session asks its probe for the Phase-1 digest and for every Phase-2
/// answer. Implementations must be cheap to call and must return the same
/// digest for the same loaded data on every peer.
pub trait IntegrityProbe {
    /// Digest of the data set this endpoint loaded.
    fn content_digest(&self) -> ContentDigest;

    /// Snapshot of the currently installed overlay layers.
    fn overlay_layers(&self) -> Vec<OverlayLayer>;

    /// Whether a local cheat mode is active.
    fn god_mode(&self) -> bool;
}

/// Probe for endpoints with nothing to report: an all-zero digest, no
/// overlays, no cheats. Suitable for tests and tools; real matches want a
/// probe wired to the caller's data loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLocalState;

impl IntegrityProbe for NoLocalState {
    fn content_digest(&self) -> ContentDigest {
        ContentDigest::zeroed()
    }

    fn overlay_layers(&self) -> Vec<OverlayLayer> {
        Vec::new()
    }

    fn god_mode(&self) -> bool {
        false
    }
}

/// Outcome of recording a Phase-1 digest report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase1Verdict {
    /// The digest matches; the seat is now verified.
    Verified,
    /// The digest diverges, starting at the given word.
    Mismatch {
        /// Index of the first differing digest word.
        first_difference: usize,
    },
}

/// Outcome of validating a Phase-2 answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResponseVerdict {
    /// Every field checks out.
    Clean {
        /// The seat the answer was for.
        slot: SlotIndex,
    },
    /// The answer proves the peer's data or state diverged.
    WrongData {
        /// The seat the answer was for.
        slot: SlotIndex,
    },
    /// The sender answered for a seat it is not responsible for.
    BadParam {
        /// The seat that sent the corrupt claim.
        offender: SlotIndex,
    },
    /// The answer is malformed or moot; drop it without consequence.
    Discard,
}

#[derive(Debug, Clone, Copy, Default)]
struct ChallengeState {
    outstanding_since: Option<Instant>,
    last_sent: Option<Instant>,
}

/// Host-side bookkeeping for both handshake phases.
#[derive(Debug, Clone)]
pub(crate) struct IntegrityTracker {
    config: IntegrityConfig,
    response_timeout: Duration,
    host_digest: ContentDigest,
    everyone_joined_at: Option<GameTime>,
    phase1_settled: bool,
    challenges: Vec<ChallengeState>,
}

impl IntegrityTracker {
    pub(crate) fn new(
        num_slots: usize,
        config: IntegrityConfig,
        monitors: &MonitorConfig,
        host_digest: ContentDigest,
    ) -> Self {
        let from_lag =
            Duration::from_secs(u64::from(monitors.lag_kick_seconds) + RESPONSE_TIMEOUT_MARGIN_SECONDS);
        Self {
            config,
            response_timeout: from_lag.max(Duration::from_secs(MIN_RESPONSE_TIMEOUT_SECONDS)),
            host_digest,
            everyone_joined_at: None,
            phase1_settled: false,
            challenges: vec![ChallengeState::default(); num_slots],
        }
    }

    /// Stamps the game time at which every human finished joining. The
    /// Phase-1 deadline and the Phase-2 schedule both count from here.
    /// Later calls keep the first stamp.
    pub(crate) fn record_everyone_joined(&mut self, at: GameTime) {
        if self.everyone_joined_at.is_none() {
            self.everyone_joined_at = Some(at);
        }
    }

    /// Records a Phase-1 digest report for `slot`, marking the seat verified
    /// on a match.
    pub(crate) fn record_phase1(
        &mut self,
        roster: &mut Roster,
        slot: SlotIndex,
        digest: &ContentDigest,
    ) -> Phase1Verdict {
        match self.host_digest.first_difference(digest) {
            None => {
                if let Some(entry) = roster.slot_mut(slot) {
                    entry.integrity_verified = true;
                }
                debug!(%slot, "content digest verified");
                Phase1Verdict::Verified
            }
            Some(first_difference) => {
                warn!(%slot, word = first_difference, "content digest diverges");
                Phase1Verdict::Mismatch { first_difference }
            }
        }
    }

    /// Seats that never reported a matching digest within the verification
    /// window, measured in game time from the everyone-joined stamp. Fires at
    /// most once; permissive sessions never sweep.
    pub(crate) fn sweep_unverified(
        &mut self,
        roster: &Roster,
        game_now: GameTime,
    ) -> SmallVec<[SlotIndex; 4]> {
        let mut overdue = SmallVec::new();
        if self.phase1_settled || self.config.permissive {
            return overdue;
        }
        let Some(joined) = self.everyone_joined_at else {
            return overdue;
        };
        if game_now.millis_since(joined) < self.config.join_verify_window_millis {
            return overdue;
        }
        self.phase1_settled = true;

        for index in 0..roster.num_slots() {
            let slot = SlotIndex::new(index);
            if slot == roster.host_slot() {
                continue;
            }
            let unverified = roster.slot(slot).is_some_and(|entry| {
                entry.is_human() && !entry.integrity_verified && !entry.pending_disconnect
            });
            if unverified {
                overdue.push(slot);
            }
        }
        overdue
    }

    /// Game seats due for a Phase-2 challenge, each marked outstanding. A
    /// seat with an unanswered challenge is never challenged again; answered
    /// seats wait out the challenge interval first.
    pub(crate) fn due_challenges(
        &mut self,
        roster: &Roster,
        now: Instant,
    ) -> SmallVec<[SlotIndex; 4]> {
        let mut due = SmallVec::new();
        if self.everyone_joined_at.is_none() {
            return due;
        }
        for index in 0..roster.game_slot_count() {
            let slot = SlotIndex::new(index);
            if slot == roster.host_slot() {
                continue;
            }
            let eligible = roster.slot(slot).is_some_and(|entry| {
                entry.is_human() && entry.connected && !entry.pending_disconnect && !entry.kicked
            });
            if !eligible {
                continue;
            }
            let Some(state) = self.challenges.get_mut(index) else {
                continue;
            };
            if state.outstanding_since.is_some() {
                continue;
            }
            if state
                .last_sent
                .is_some_and(|at| at + self.config.challenge_interval > now)
            {
                continue;
            }
            state.outstanding_since = Some(now);
            state.last_sent = Some(now);
            due.push(slot);
        }
        due
    }

    /// Seats whose challenge went unanswered past the response timeout.
    /// Each is cleared and reported once; seats already on their way out are
    /// cleared silently.
    pub(crate) fn check_timeouts(
        &mut self,
        roster: &Roster,
        now: Instant,
    ) -> SmallVec<[SlotIndex; 4]> {
        let mut overdue = SmallVec::new();
        for (index, state) in self.challenges.iter_mut().enumerate() {
            let Some(sent) = state.outstanding_since else {
                continue;
            };
            if now.saturating_duration_since(sent) < self.response_timeout {
                continue;
            }
            state.outstanding_since = None;
            let slot = SlotIndex::new(index);
            let still_present = roster
                .slot(slot)
                .is_some_and(|entry| entry.is_human() && !entry.pending_disconnect);
            if still_present {
                warn!(%slot, "integrity challenge went unanswered");
                overdue.push(slot);
            }
        }
        overdue
    }

    /// Validates a Phase-2 answer from `origin`.
    ///
    /// The checks run in a fixed order: the claimed seat must be in range,
    /// `origin` must be responsible for it, the answer must pass its own echo
    /// check, and the seat must still hold an unkicked human. Only then is
    /// the outstanding challenge cleared and the content judged. Content
    /// faults are collected rather than short-circuited so the log shows
    /// everything that diverged.
    pub(crate) fn validate_response(
        &mut self,
        roster: &Roster,
        origin: SlotIndex,
        response: &IntegrityResponse,
    ) -> ResponseVerdict {
        let claimed_index = response.claimed_slot as usize;
        if claimed_index >= roster.num_slots() {
            error!(
                claimed = response.claimed_slot,
                %origin,
                "integrity answer names an out-of-range seat"
            );
            return ResponseVerdict::Discard;
        }
        let claimed = SlotIndex::new(claimed_index);
        if roster.whos_responsible(claimed) != origin {
            return ResponseVerdict::BadParam { offender: origin };
        }
        if response.echo_slot != response.claimed_slot {
            error!(
                claimed = response.claimed_slot,
                echo = response.echo_slot,
                "integrity answer fails its own echo check"
            );
            return ResponseVerdict::Discard;
        }
        let Some(entry) = roster.slot(claimed) else {
            return ResponseVerdict::Discard;
        };
        if !entry.is_human() || entry.kicked {
            debug!(%claimed, "integrity answer for a seat no longer in play");
            return ResponseVerdict::Discard;
        }

        if let Some(state) = self.challenges.get_mut(claimed_index) {
            state.outstanding_since = None;
        }

        let mut wrong = false;
        if response.overlay_layers.len() > OVERLAY_LAYER_LIMIT {
            warn!(
                %claimed,
                layers = response.overlay_layers.len(),
                "overlay report exceeds the layer limit"
            );
            wrong = true;
        } else {
            let mut notification_layers = 0_usize;
            for layer in &response.overlay_layers {
                match layer.z_order {
                    SCRIPT_DEBUGGER_LAYER => {
                        if !self.config.debug_mappings_allowed {
                            warn!(%claimed, "script debugger overlay reported");
                            wrong = true;
                        }
                    }
                    NOTIFICATION_LAYER => notification_layers += 1,
                    z_order if (RESERVED_LAYER_FLOOR..SCRIPT_DEBUGGER_LAYER).contains(&z_order) => {
                        warn!(
                            %claimed,
                            z_order,
                            count = layer.count,
                            "reserved overlay layer reported"
                        );
                    }
                    _ => {}
                }
            }
            if notification_layers > 1 {
                warn!(%claimed, notification_layers, "multiple notification layers reported");
            }
        }
        if let Some(word) = self.host_digest.first_difference(&response.digest) {
            warn!(%claimed, word, "content digest diverges");
            wrong = true;
        }
        let expected_ai = entry.control.ai_index();
        if response.ai_index != expected_ai {
            warn!(
                %claimed,
                reported = response.ai_index,
                expected = expected_ai,
                "AI assignment diverges"
            );
            wrong = true;
        }
        if response.god_mode && !entry.spectator {
            warn!(%claimed, "god mode active on a game seat");
            wrong = true;
        }

        if wrong {
            ResponseVerdict::WrongData { slot: claimed }
        } else {
            ResponseVerdict::Clean { slot: claimed }
        }
    }

    /// Whether `slot` has an unanswered challenge.
    #[cfg(test)]
    pub(crate) fn has_outstanding(&self, slot: SlotIndex) -> bool {
        self.challenges
            .get(slot.as_usize())
            .is_some_and(|state| state.outstanding_since.is_some())
    }

    /// Forgets all challenge state for a seat whose occupant departed.
    pub(crate) fn reset_slot(&mut self, slot: SlotIndex) {
        if let Some(state) = self.challenges.get_mut(slot.as_usize()) {
            *state = ChallengeState::default();
        }
    }
}

/// Builds the answer to a Phase-2 challenge from the local probe.
pub(crate) fn build_response(probe: &dyn IntegrityProbe, roster: &Roster) -> IntegrityResponse {
    let local = roster.local_slot();
    let ai_index = roster
        .slot(local)
        .map_or(-2, |entry| entry.control.ai_index());
    IntegrityResponse {
        claimed_slot: local.as_usize() as u32,
        echo_slot: local.as_usize() as u32,
        overlay_layers: probe.overlay_layers(),
        digest: probe.content_digest(),
        ai_index,
        god_mode: probe.god_mode(),
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
    use crate::hash::CONTENT_DIGEST_WORDS;
    use crate::sessions::roster::{PlayerSlot, SlotControl};

    const HOST: SlotIndex = SlotIndex::new(0);
    const PLAYER: SlotIndex = SlotIndex::new(1);
    const COMPUTER: SlotIndex = SlotIndex::new(2);
    const SPECTATOR: SlotIndex = SlotIndex::new(3);

    fn test_roster() -> Roster {
        let mut slots = vec![PlayerSlot::default(); 4];
        for (index, slot) in slots.iter_mut().enumerate() {
            slot.name = format!("player-{index}");
            slot.control = SlotControl::Human;
            slot.connected = true;
        }
        slots[2].control = SlotControl::Computer { ai_index: 1 };
        slots[3].spectator = true;
        Roster::new(slots, 3, HOST, HOST)
    }

    fn host_digest() -> ContentDigest {
        ContentDigest::new([7; CONTENT_DIGEST_WORDS])
    }

    fn tracker() -> IntegrityTracker {
        IntegrityTracker::new(
            4,
            IntegrityConfig::default(),
            &MonitorConfig::default(),
            host_digest(),
        )
    }

    fn clean_response(slot: SlotIndex) -> IntegrityResponse {
        IntegrityResponse {
            claimed_slot: slot.as_usize() as u32,
            echo_slot: slot.as_usize() as u32,
            overlay_layers: Vec::new(),
            digest: host_digest(),
            ai_index: -1,
            god_mode: false,
        }
    }

    // ===== Timeout Derivation Tests =====

    #[test]
    fn response_timeout_follows_the_lag_threshold() {
        let lenient = MonitorConfig {
            lag_kick_seconds: 120,
            ..MonitorConfig::default()
        };
        let tracker =
            IntegrityTracker::new(4, IntegrityConfig::default(), &lenient, host_digest());
        assert_eq!(tracker.response_timeout, Duration::from_secs(123));
    }

    #[test]
    fn response_timeout_has_a_floor() {
        let aggressive = MonitorConfig {
            lag_kick_seconds: 10,
            ..MonitorConfig::default()
        };
        let tracker =
            IntegrityTracker::new(4, IntegrityConfig::default(), &aggressive, host_digest());
        assert_eq!(tracker.response_timeout, Duration::from_secs(60));
    }

    // ===== Phase 1 Tests =====

    #[test]
    fn matching_digest_verifies_the_seat() {
        let mut roster = test_roster();
        let mut tracker = tracker();

        let verdict = tracker.record_phase1(&mut roster, PLAYER, &host_digest());
        assert_eq!(verdict, Phase1Verdict::Verified);
        assert!(roster.slot(PLAYER).unwrap().integrity_verified);
    }

    #[test]
    fn diverging_digest_reports_the_first_word() {
        let mut roster = test_roster();
        let mut tracker = tracker();
        let mut words = *host_digest().words();
        words[4] = 99;
        words[11] = 100;

        let verdict = tracker.record_phase1(&mut roster, PLAYER, &ContentDigest::new(words));
        assert_eq!(verdict, Phase1Verdict::Mismatch { first_difference: 4 });
        assert!(!roster.slot(PLAYER).unwrap().integrity_verified);
    }

    #[test]
    fn sweep_waits_for_the_window() {
        let roster = test_roster();
        let mut tracker = tracker();
        tracker.record_everyone_joined(GameTime::new(5_000));

        assert!(tracker.sweep_unverified(&roster, GameTime::new(30_000)).is_empty());
        let overdue = tracker.sweep_unverified(&roster, GameTime::new(65_000));
        // The player and the spectator never verified; the computer seat and
        // the host are exempt.
        assert_eq!(overdue.as_slice(), &[PLAYER, SPECTATOR]);
    }

    #[test]
    fn sweep_fires_once() {
        let roster = test_roster();
        let mut tracker = tracker();
        tracker.record_everyone_joined(GameTime::new(0));

        assert!(!tracker.sweep_unverified(&roster, GameTime::new(60_000)).is_empty());
        assert!(tracker.sweep_unverified(&roster, GameTime::new(120_000)).is_empty());
    }

    #[test]
    fn sweep_spares_verified_seats() {
        let mut roster = test_roster();
        let mut tracker = tracker();
        tracker.record_everyone_joined(GameTime::new(0));
        tracker.record_phase1(&mut roster, PLAYER, &host_digest());

        let overdue = tracker.sweep_unverified(&roster, GameTime::new(60_000));
        assert_eq!(overdue.as_slice(), &[SPECTATOR]);
    }

    #[test]
    fn permissive_sessions_never_sweep() {
        let roster = test_roster();
        let mut tracker = IntegrityTracker::new(
            4,
            IntegrityConfig::permissive(),
            &MonitorConfig::default(),
            host_digest(),
        );
        tracker.record_everyone_joined(GameTime::new(0));
        assert!(tracker.sweep_unverified(&roster, GameTime::new(600_000)).is_empty());
    }

    #[test]
    fn sweep_needs_the_joined_stamp() {
        let roster = test_roster();
        let mut tracker = tracker();
        assert!(tracker.sweep_unverified(&roster, GameTime::new(600_000)).is_empty());
    }

    // ===== Phase 2 Scheduling Tests =====

    #[test]
    fn challenges_wait_for_everyone_joined() {
        let roster = test_roster();
        let mut tracker = tracker();
        assert!(tracker.due_challenges(&roster, Instant::now()).is_empty());

        tracker.record_everyone_joined(GameTime::new(0));
        let due = tracker.due_challenges(&roster, Instant::now());
        // Game seats minus the host and the computer seat.
        assert_eq!(due.as_slice(), &[PLAYER]);
    }

    #[test]
    fn only_one_challenge_outstanding_per_seat() {
        let roster = test_roster();
        let mut tracker = tracker();
        tracker.record_everyone_joined(GameTime::new(0));
        let base = Instant::now();

        assert_eq!(tracker.due_challenges(&roster, base).len(), 1);
        assert!(tracker.has_outstanding(PLAYER));

        // Unanswered: no re-send, not even after the interval.
        assert!(tracker.due_challenges(&roster, base + Duration::from_secs(11)).is_empty());
        assert!(tracker
            .due_challenges(&roster, base + Duration::from_secs(59))
            .is_empty());
    }

    #[test]
    fn answered_seats_wait_out_the_interval() {
        let roster = test_roster();
        let mut tracker = tracker();
        tracker.record_everyone_joined(GameTime::new(0));
        let base = Instant::now();

        tracker.due_challenges(&roster, base);
        let verdict = tracker.validate_response(&roster, PLAYER, &clean_response(PLAYER));
        assert_eq!(verdict, ResponseVerdict::Clean { slot: PLAYER });
        assert!(!tracker.has_outstanding(PLAYER));

        // Within the spacing interval nothing is due; after it the next
        // challenge goes out.
        assert!(tracker.due_challenges(&roster, base + Duration::from_secs(5)).is_empty());
        assert_eq!(
            tracker
                .due_challenges(&roster, base + Duration::from_secs(10))
                .as_slice(),
            &[PLAYER]
        );
    }

    #[test]
    fn quarantined_seats_are_not_challenged() {
        let mut roster = test_roster();
        roster.quarantine(PLAYER);
        let mut tracker = tracker();
        tracker.record_everyone_joined(GameTime::new(0));
        assert!(tracker.due_challenges(&roster, Instant::now()).is_empty());
    }

    #[test]
    fn unanswered_challenge_times_out() {
        let roster = test_roster();
        let mut tracker = tracker();
        tracker.record_everyone_joined(GameTime::new(0));
        let base = Instant::now();
        tracker.due_challenges(&roster, base);

        assert!(tracker.check_timeouts(&roster, base + Duration::from_secs(59)).is_empty());
        let overdue = tracker.check_timeouts(&roster, base + Duration::from_secs(63));
        assert_eq!(overdue.as_slice(), &[PLAYER]);
        assert!(!tracker.has_outstanding(PLAYER));

        // Cleared: the same timeout never fires twice.
        assert!(tracker.check_timeouts(&roster, base + Duration::from_secs(120)).is_empty());
    }

    #[test]
    fn departed_seats_time_out_silently() {
        let mut roster = test_roster();
        let mut tracker = tracker();
        tracker.record_everyone_joined(GameTime::new(0));
        let base = Instant::now();
        tracker.due_challenges(&roster, base);

        roster.quarantine(PLAYER);
        let overdue = tracker.check_timeouts(&roster, base + Duration::from_secs(120));
        assert!(overdue.is_empty());
        assert!(!tracker.has_outstanding(PLAYER));
    }

    // ===== Phase 2 Validation Tests =====

    #[test]
    fn clean_answer_passes() {
        let roster = test_roster();
        let mut tracker = tracker();
        let verdict = tracker.validate_response(&roster, PLAYER, &clean_response(PLAYER));
        assert_eq!(verdict, ResponseVerdict::Clean { slot: PLAYER });
    }

    #[test]
    fn out_of_range_claim_is_discarded() {
        let roster = test_roster();
        let mut tracker = tracker();
        let mut response = clean_response(PLAYER);
        response.claimed_slot = 99;
        response.echo_slot = 99;
        let verdict = tracker.validate_response(&roster, PLAYER, &response);
        assert_eq!(verdict, ResponseVerdict::Discard);
    }

    #[test]
    fn answering_for_someone_else_is_a_bad_param() {
        let roster = test_roster();
        let mut tracker = tracker();
        // The player answers for the host's seat.
        let verdict = tracker.validate_response(&roster, PLAYER, &clean_response(HOST));
        assert_eq!(verdict, ResponseVerdict::BadParam { offender: PLAYER });
    }

    #[test]
    fn host_may_answer_for_its_computer_seats() {
        let roster = test_roster();
        let mut tracker = tracker();
        let mut response = clean_response(COMPUTER);
        response.ai_index = 1;
        let verdict = tracker.validate_response(&roster, HOST, &response);
        // The computer seat is not human, so the answer is moot, but it is
        // not an authority violation.
        assert_eq!(verdict, ResponseVerdict::Discard);
    }

    #[test]
    fn echo_mismatch_is_discarded() {
        let roster = test_roster();
        let mut tracker = tracker();
        let mut response = clean_response(PLAYER);
        response.echo_slot = 2;
        let verdict = tracker.validate_response(&roster, PLAYER, &response);
        assert_eq!(verdict, ResponseVerdict::Discard);
    }

    #[test]
    fn diverging_digest_is_wrong_data() {
        let roster = test_roster();
        let mut tracker = tracker();
        let mut response = clean_response(PLAYER);
        let mut words = *host_digest().words();
        words[0] = 1;
        response.digest = ContentDigest::new(words);
        let verdict = tracker.validate_response(&roster, PLAYER, &response);
        assert_eq!(verdict, ResponseVerdict::WrongData { slot: PLAYER });
    }

    #[test]
    fn wrong_ai_assignment_is_wrong_data() {
        let roster = test_roster();
        let mut tracker = tracker();
        let mut response = clean_response(PLAYER);
        response.ai_index = 3;
        let verdict = tracker.validate_response(&roster, PLAYER, &response);
        assert_eq!(verdict, ResponseVerdict::WrongData { slot: PLAYER });
    }

    #[test]
    fn god_mode_on_a_game_seat_is_wrong_data() {
        let roster = test_roster();
        let mut tracker = tracker();
        let mut response = clean_response(PLAYER);
        response.god_mode = true;
        let verdict = tracker.validate_response(&roster, PLAYER, &response);
        assert_eq!(verdict, ResponseVerdict::WrongData { slot: PLAYER });
    }

    #[test]
    fn oversized_overlay_report_is_wrong_data() {
        let roster = test_roster();
        let mut tracker = tracker();
        let mut response = clean_response(PLAYER);
        response.overlay_layers = (0..=OVERLAY_LAYER_LIMIT)
            .map(|index| OverlayLayer {
                z_order: index as u16,
                count: 1,
            })
            .collect();
        let verdict = tracker.validate_response(&roster, PLAYER, &response);
        assert_eq!(verdict, ResponseVerdict::WrongData { slot: PLAYER });
    }

    #[test]
    fn script_debugger_layer_is_wrong_data_unless_allowed() {
        let roster = test_roster();
        let mut response = clean_response(PLAYER);
        response.overlay_layers = vec![OverlayLayer {
            z_order: SCRIPT_DEBUGGER_LAYER,
            count: 1,
        }];

        let mut strict = tracker();
        assert_eq!(
            strict.validate_response(&roster, PLAYER, &response),
            ResponseVerdict::WrongData { slot: PLAYER }
        );

        let mut lenient = IntegrityTracker::new(
            4,
            IntegrityConfig {
                debug_mappings_allowed: true,
                ..IntegrityConfig::default()
            },
            &MonitorConfig::default(),
            host_digest(),
        );
        assert_eq!(
            lenient.validate_response(&roster, PLAYER, &response),
            ResponseVerdict::Clean { slot: PLAYER }
        );
    }

    #[test]
    fn reserved_and_notification_layers_are_logged_only() {
        let roster = test_roster();
        let mut tracker = tracker();
        let mut response = clean_response(PLAYER);
        response.overlay_layers = vec![
            OverlayLayer {
                z_order: RESERVED_LAYER_FLOOR,
                count: 12,
            },
            OverlayLayer {
                z_order: NOTIFICATION_LAYER,
                count: 1,
            },
            OverlayLayer {
                z_order: NOTIFICATION_LAYER,
                count: 1,
            },
        ];
        let verdict = tracker.validate_response(&roster, PLAYER, &response);
        assert_eq!(verdict, ResponseVerdict::Clean { slot: PLAYER });
    }

    #[test]
    fn answering_clears_the_outstanding_challenge_even_on_mismatch() {
        let roster = test_roster();
        let mut tracker = tracker();
        tracker.record_everyone_joined(GameTime::new(0));
        tracker.due_challenges(&roster, Instant::now());
        assert!(tracker.has_outstanding(PLAYER));

        let mut response = clean_response(PLAYER);
        response.god_mode = true;
        let verdict = tracker.validate_response(&roster, PLAYER, &response);
        assert_eq!(verdict, ResponseVerdict::WrongData { slot: PLAYER });
        assert!(!tracker.has_outstanding(PLAYER));
    }

    // ===== Response Building Tests =====

    #[test]
    fn built_response_reflects_the_probe_and_the_seat() {
        let slots = (0..4)
            .map(|index| {
                let mut slot = PlayerSlot::default();
                slot.control = SlotControl::Human;
                slot.connected = true;
                slot.name = format!("player-{index}");
                slot
            })
            .collect();
        // Viewed from the player's endpoint, not the host's.
        let roster = Roster::new(slots, 3, HOST, PLAYER);

        let response = build_response(&NoLocalState, &roster);
        assert_eq!(response.claimed_slot, 1);
        assert_eq!(response.echo_slot, 1);
        assert_eq!(response.ai_index, -1);
        assert!(!response.god_mode);
        assert!(response.overlay_layers.is_empty());
        assert_eq!(response.digest, ContentDigest::zeroed());
    }
}

//! The seat registry and the responsibility model built on top of it.
//!
//! A session is created with a fixed-size array of seats: game seats first,
//! spectator seats after them. Seats never move; occupants come and go. The
//! registry answers the one question every trust decision reduces to: which
//! endpoint is *responsible* for a given seat, and therefore allowed to act
//! on its behalf.

use crate::SlotIndex;

/// Who controls a seat.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlotControl {
    /// Nobody occupies the seat.
    Open,
    /// A human endpoint occupies the seat.
    Human,
    /// A computer opponent occupies the seat. Computer seats are simulated
    /// by the endpoint responsible for them, which is the host.
    Computer {
        /// Index into the caller's AI roster.
        ai_index: i8,
    },
}

impl SlotControl {
    /// The AI index reported in integrity responses: the roster index for a
    /// computer seat, -1 for a human seat, -2 for an open seat.
    #[inline]
    #[must_use]
    pub const fn ai_index(self) -> i8 {
        match self {
            SlotControl::Open => -2,
            SlotControl::Human => -1,
            SlotControl::Computer { ai_index } => ai_index,
        }
    }
}

/// One connection-health flag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionFlag {
    /// The peer's link went down without a voluntary leave.
    Dropped = 0,
    /// The peer announced it is leaving.
    Leaving = 1,
    /// The caller reported that the peer's simulation diverged.
    Desynced = 2,
    /// The match is stalled waiting on this peer.
    Waiting = 3,
}

/// Cumulative set of [`ConnectionFlag`]s for one seat.
///
/// Flags accumulate until [`clear`](Self::clear) or a full slot reset; a
/// transient stall still leaves its mark for anyone inspecting the seat
/// later.
///
/// # Examples
///
/// ```
/// use garrison_lockstep::{ConnectionFlag, ConnectionStatus};
///
/// let mut status = ConnectionStatus::default();
/// status.set(ConnectionFlag::Waiting);
/// status.set(ConnectionFlag::Desynced);
/// assert!(status.contains(ConnectionFlag::Desynced));
/// assert!(!status.contains(ConnectionFlag::Dropped));
///
/// status.clear();
/// assert!(status.is_empty());
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    bits: u8,
}

impl ConnectionStatus {
    const fn bit(flag: ConnectionFlag) -> u8 {
        1 << (flag as u8)
    }

    /// Adds a flag to the set.
    pub fn set(&mut self, flag: ConnectionFlag) {
        self.bits |= Self::bit(flag);
    }

    /// Removes a single flag from the set.
    pub fn unset(&mut self, flag: ConnectionFlag) {
        self.bits &= !Self::bit(flag);
    }

    /// Whether the set contains the given flag.
    #[inline]
    #[must_use]
    pub const fn contains(self, flag: ConnectionFlag) -> bool {
        self.bits & Self::bit(flag) != 0
    }

    /// Whether no flag is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }

    /// Removes every flag.
    pub fn clear(&mut self) {
        self.bits = 0;
    }
}

/// One seat of the fixed-size registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerSlot {
    /// Display name of the occupant, empty while the seat is open.
    pub name: String,
    /// Who controls the seat.
    pub control: SlotControl,
    /// Whether this is a spectator seat. Structural: assigned at session
    /// creation from the seat's position and preserved across resets.
    pub spectator: bool,
    /// Whether the occupant holds admin rights granted by the host.
    pub admin: bool,
    /// Team number, meaningful to the caller only.
    pub team: u8,
    /// Display position in the lobby, meaningful to the caller only.
    pub position: u8,
    /// Lobby ready state, reported by the occupant.
    pub ready: bool,
    /// Cumulative connection-health flags.
    pub status: ConnectionStatus,
    /// Printable address of the occupant's endpoint, for operator logs.
    pub ip_address: String,
    /// Set once the host has issued a kick for this occupant. A kicked seat
    /// is quarantined: no further message from it is accepted.
    pub kicked: bool,
    /// Set while the occupant is still loading the match.
    pub joining_in_progress: bool,
    /// Set when the host has logically dropped the occupant but the
    /// departure has not yet been consumed at its scheduled game time.
    pub pending_disconnect: bool,
    /// Set once the occupant's Phase-1 content digest matched the host's.
    pub integrity_verified: bool,
    /// Whether chat from this occupant is suppressed locally.
    pub muted: bool,
    /// Whether this endpoint currently has a live link to the occupant.
    pub connected: bool,
}

impl Default for PlayerSlot {
    fn default() -> Self {
        Self {
            name: String::new(),
            control: SlotControl::Open,
            spectator: false,
            admin: false,
            team: 0,
            position: 0,
            ready: false,
            status: ConnectionStatus::default(),
            ip_address: String::new(),
            kicked: false,
            joining_in_progress: false,
            pending_disconnect: false,
            integrity_verified: false,
            muted: false,
            connected: false,
        }
    }
}

impl PlayerSlot {
    /// Returns the seat to its open defaults. The structural `spectator`
    /// marker survives, everything about the departed occupant is erased.
    pub(crate) fn reset(&mut self) {
        let spectator = self.spectator;
        *self = Self::default();
        self.spectator = spectator;
    }

    /// Whether a human occupies the seat.
    #[inline]
    #[must_use]
    pub const fn is_human(&self) -> bool {
        matches!(self.control, SlotControl::Human)
    }
}

/// A handle to a seat that survives the seat's reuse.
///
/// While live, reads follow the registry and see whoever currently occupies
/// the seat. Once [`detach`](Self::detach)ed, the handle freezes a deep copy
/// and every later read resolves to that snapshot, never to a new occupant
/// of the recycled seat. The session detaches references to departing
/// occupants so their names can still be shown after the seat is reset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayerReference {
    /// Resolves through the registry.
    Live(SlotIndex),
    /// A frozen copy taken at disconnect time.
    Snapshot(Box<PlayerSlot>),
}

impl PlayerReference {
    /// Whether the handle has been frozen.
    #[inline]
    #[must_use]
    pub const fn is_detached(&self) -> bool {
        matches!(self, PlayerReference::Snapshot(_))
    }

    /// Freezes the handle with a deep copy of the seat's current contents.
    /// Detaching an already detached handle is a no-op.
    pub fn detach(&mut self, roster: &Roster) {
        if let PlayerReference::Live(slot) = self {
            if let Some(snapshot) = roster.slot(*slot) {
                *self = PlayerReference::Snapshot(Box::new(snapshot.clone()));
            }
        }
    }

    /// Reads the seat this handle refers to: the live registry entry while
    /// attached, the frozen snapshot after [`detach`](Self::detach).
    #[must_use]
    pub fn read<'a>(&'a self, roster: &'a Roster) -> Option<&'a PlayerSlot> {
        match self {
            PlayerReference::Live(slot) => roster.slot(*slot),
            PlayerReference::Snapshot(snapshot) => Some(snapshot),
        }
    }
}

/// The seat registry: a fixed array of [`PlayerSlot`]s plus the identities
/// (host seat, local seat) every trust decision is relative to.
#[derive(Clone, PartialEq, Eq)]
pub struct Roster {
    slots: Vec<PlayerSlot>,
    game_slot_count: usize,
    host_slot: SlotIndex,
    local_slot: SlotIndex,
    debug_override: bool,
}

impl std::fmt::Debug for Roster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Destructure to ensure all fields are included when new fields are added.
        let Self {
            slots,
            game_slot_count,
            host_slot,
            local_slot,
            debug_override,
        } = self;

        f.debug_struct("Roster")
            .field("slots", slots)
            .field("game_slot_count", game_slot_count)
            .field("host_slot", host_slot)
            .field("local_slot", local_slot)
            .field("debug_override", debug_override)
            .finish()
    }
}

impl Roster {
    pub(crate) fn new(
        slots: Vec<PlayerSlot>,
        game_slot_count: usize,
        host_slot: SlotIndex,
        local_slot: SlotIndex,
    ) -> Self {
        Self {
            slots,
            game_slot_count,
            host_slot,
            local_slot,
            debug_override: false,
        }
    }

    /// Total number of seats, game and spectator.
    #[must_use]
    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    /// Number of game seats; seats at or past this index are spectator seats.
    #[inline]
    #[must_use]
    pub const fn game_slot_count(&self) -> usize {
        self.game_slot_count
    }

    /// The host's seat.
    #[inline]
    #[must_use]
    pub const fn host_slot(&self) -> SlotIndex {
        self.host_slot
    }

    /// The local endpoint's seat.
    #[inline]
    #[must_use]
    pub const fn local_slot(&self) -> SlotIndex {
        self.local_slot
    }

    /// Whether this endpoint is the host.
    #[inline]
    #[must_use]
    pub const fn local_is_host(&self) -> bool {
        self.local_slot.as_usize() == self.host_slot.as_usize()
    }

    /// The seat at `slot`, if in range.
    #[must_use]
    pub fn slot(&self, slot: SlotIndex) -> Option<&PlayerSlot> {
        self.slots.get(slot.as_usize())
    }

    pub(crate) fn slot_mut(&mut self, slot: SlotIndex) -> Option<&mut PlayerSlot> {
        self.slots.get_mut(slot.as_usize())
    }

    /// Whether a human occupies the seat. Out-of-range seats are not human.
    #[must_use]
    pub fn is_human(&self, slot: SlotIndex) -> bool {
        self.slot(slot).is_some_and(PlayerSlot::is_human)
    }

    /// Whether the seat is a spectator seat.
    #[must_use]
    pub fn is_spectator(&self, slot: SlotIndex) -> bool {
        self.slot(slot).is_some_and(|entry| entry.spectator)
    }

    /// Whether the seat's occupant holds admin rights.
    #[must_use]
    pub fn is_admin(&self, slot: SlotIndex) -> bool {
        self.slot(slot).is_some_and(|entry| entry.admin)
    }

    /// The endpoint responsible for a seat: a human seat answers for itself,
    /// the local endpoint answers for its own seat, and the host answers for
    /// everything else, including out-of-range indices.
    #[must_use]
    pub fn whos_responsible(&self, slot: SlotIndex) -> SlotIndex {
        if self.is_human(slot) {
            slot
        } else if slot.as_usize() == self.local_slot.as_usize() {
            self.local_slot
        } else {
            self.host_slot
        }
    }

    /// Whether the local endpoint is responsible for the seat.
    #[must_use]
    pub fn my_responsibility(&self, slot: SlotIndex) -> bool {
        self.whos_responsible(slot).as_usize() == self.local_slot.as_usize()
    }

    /// Whether `actor`'s endpoint is responsible for `subject`.
    #[must_use]
    pub fn responsible_for(&self, actor: SlotIndex, subject: SlotIndex) -> bool {
        self.whos_responsible(subject).as_usize() == actor.as_usize()
    }

    /// Whether `actor` may issue orders on behalf of `subject`: the subject
    /// must be a game seat, and the actor must be the subject itself, its
    /// responsible endpoint, or anyone while the debug override is on.
    #[must_use]
    pub fn can_give_orders_for(&self, actor: SlotIndex, subject: SlotIndex) -> bool {
        subject.is_game_seat_for(self.game_slot_count)
            && (subject.as_usize() == actor.as_usize()
                || self.responsible_for(actor, subject)
                || self.debug_override)
    }

    /// Whether the order-authority debug override is on.
    #[inline]
    #[must_use]
    pub const fn debug_override(&self) -> bool {
        self.debug_override
    }

    pub(crate) fn set_debug_override(&mut self, enabled: bool) {
        self.debug_override = enabled;
    }

    /// All seats, in index order.
    #[must_use = "iterators are lazy and do nothing unless consumed"]
    pub fn seats(&self) -> impl Iterator<Item = SlotIndex> {
        (0..self.slots.len()).map(SlotIndex::new)
    }

    /// Game seats only, in index order.
    #[must_use = "iterators are lazy and do nothing unless consumed"]
    pub fn game_seats(&self) -> impl Iterator<Item = SlotIndex> {
        (0..self.game_slot_count).map(SlotIndex::new)
    }

    /// Seats occupied by a human, in index order.
    #[must_use = "iterators are lazy and do nothing unless consumed"]
    pub fn human_seats(&self) -> impl Iterator<Item = SlotIndex> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| entry.is_human().then_some(SlotIndex::new(index)))
    }

    /// Number of seats occupied by a human.
    #[must_use]
    pub fn num_humans(&self) -> usize {
        self.human_seats().count()
    }

    /// Whether every human game seat has finished loading. Spectator seats
    /// do not count: the match can start without them.
    #[must_use]
    pub fn all_player_seats_loaded(&self) -> bool {
        self.game_seats().all(|slot| {
            self.slot(slot)
                .is_none_or(|entry| !entry.is_human() || !entry.joining_in_progress)
        })
    }

    /// Marks a seat as logically dropped; its departure still has to be
    /// consumed at a scheduled game time.
    pub(crate) fn quarantine(&mut self, slot: SlotIndex) {
        if let Some(entry) = self.slot_mut(slot) {
            entry.pending_disconnect = true;
        }
    }

    /// Quarantines a seat and marks it kicked so no further message from it
    /// is accepted.
    pub(crate) fn mark_kicked(&mut self, slot: SlotIndex) {
        if let Some(entry) = self.slot_mut(slot) {
            entry.kicked = true;
            entry.pending_disconnect = true;
        }
    }

    /// Returns a seat to its open defaults once its departure has been
    /// fully consumed.
    pub(crate) fn reset_slot(&mut self, slot: SlotIndex) {
        if let Some(entry) = self.slot_mut(slot) {
            entry.reset();
        }
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

    // Four game seats and one spectator seat; host at 0, local at 2.
    fn test_roster() -> Roster {
        let mut slots = vec![PlayerSlot::default(); 5];
        for (index, slot) in slots.iter_mut().enumerate() {
            slot.name = format!("player-{index}");
            slot.control = SlotControl::Human;
            slot.connected = true;
        }
        slots[1].control = SlotControl::Computer { ai_index: 3 };
        slots[3].control = SlotControl::Open;
        slots[3].name.clear();
        slots[4].spectator = true;
        Roster::new(slots, 4, SlotIndex::new(0), SlotIndex::new(2))
    }

    #[test]
    fn human_seats_answer_for_themselves() {
        let roster = test_roster();
        assert_eq!(roster.whos_responsible(SlotIndex::new(2)), SlotIndex::new(2));
        assert_eq!(roster.whos_responsible(SlotIndex::new(4)), SlotIndex::new(4));
    }

    #[test]
    fn host_answers_for_computer_and_open_seats() {
        let roster = test_roster();
        assert_eq!(roster.whos_responsible(SlotIndex::new(1)), SlotIndex::new(0));
        assert_eq!(roster.whos_responsible(SlotIndex::new(3)), SlotIndex::new(0));
    }

    #[test]
    fn host_answers_for_out_of_range_indices() {
        let roster = test_roster();
        assert_eq!(roster.whos_responsible(SlotIndex::new(99)), SlotIndex::new(0));
        assert!(!roster.is_human(SlotIndex::new(99)));
    }

    #[test]
    fn local_seat_falls_back_to_local() {
        // A non-human local seat still answers for itself.
        let mut roster = test_roster();
        roster.slot_mut(SlotIndex::new(2)).unwrap().control = SlotControl::Open;
        assert_eq!(roster.whos_responsible(SlotIndex::new(2)), SlotIndex::new(2));
    }

    #[test]
    fn my_responsibility_tracks_local_slot() {
        let roster = test_roster();
        assert!(roster.my_responsibility(SlotIndex::new(2)));
        assert!(!roster.my_responsibility(SlotIndex::new(1)));
        assert!(!roster.local_is_host());
    }

    #[test]
    fn orders_allowed_for_self_and_responsibility() {
        let roster = test_roster();
        // A seat may order itself around.
        assert!(roster.can_give_orders_for(SlotIndex::new(2), SlotIndex::new(2)));
        // The host is responsible for the computer seat.
        assert!(roster.can_give_orders_for(SlotIndex::new(0), SlotIndex::new(1)));
        // A client is not responsible for someone else's seat.
        assert!(!roster.can_give_orders_for(SlotIndex::new(2), SlotIndex::new(0)));
    }

    #[test]
    fn orders_never_target_spectator_seats() {
        let roster = test_roster();
        assert!(!roster.can_give_orders_for(SlotIndex::new(4), SlotIndex::new(4)));
        assert!(!roster.can_give_orders_for(SlotIndex::new(0), SlotIndex::new(4)));
    }

    #[test]
    fn debug_override_widens_order_authority() {
        let mut roster = test_roster();
        assert!(!roster.can_give_orders_for(SlotIndex::new(2), SlotIndex::new(0)));

        roster.set_debug_override(true);
        assert!(roster.can_give_orders_for(SlotIndex::new(2), SlotIndex::new(0)));
        // Spectator seats stay out of reach even then.
        assert!(!roster.can_give_orders_for(SlotIndex::new(2), SlotIndex::new(4)));
    }

    #[test]
    fn connection_status_accumulates_until_cleared() {
        let mut status = ConnectionStatus::default();
        assert!(status.is_empty());

        status.set(ConnectionFlag::Waiting);
        status.set(ConnectionFlag::Dropped);
        assert!(status.contains(ConnectionFlag::Waiting));
        assert!(status.contains(ConnectionFlag::Dropped));
        assert!(!status.contains(ConnectionFlag::Leaving));

        status.unset(ConnectionFlag::Waiting);
        assert!(!status.contains(ConnectionFlag::Waiting));
        assert!(status.contains(ConnectionFlag::Dropped));

        status.clear();
        assert!(status.is_empty());
    }

    #[test]
    fn reset_erases_occupant_but_keeps_seat_kind() {
        let mut roster = test_roster();
        let spectator = SlotIndex::new(4);
        {
            let entry = roster.slot_mut(spectator).unwrap();
            entry.kicked = true;
            entry.ready = true;
            entry.status.set(ConnectionFlag::Desynced);
        }

        roster.reset_slot(spectator);
        let entry = roster.slot(spectator).unwrap();
        assert!(entry.spectator);
        assert!(!entry.kicked);
        assert!(!entry.ready);
        assert!(entry.status.is_empty());
        assert_eq!(entry.control, SlotControl::Open);
        assert!(entry.name.is_empty());
    }

    #[test]
    fn quarantine_and_kick_marking() {
        let mut roster = test_roster();
        let slot = SlotIndex::new(3);

        roster.quarantine(slot);
        assert!(roster.slot(slot).unwrap().pending_disconnect);
        assert!(!roster.slot(slot).unwrap().kicked);

        roster.mark_kicked(slot);
        assert!(roster.slot(slot).unwrap().kicked);
    }

    #[test]
    fn detached_reference_survives_slot_reuse() {
        let mut roster = test_roster();
        let slot = SlotIndex::new(1);
        let mut reference = PlayerReference::Live(slot);
        assert!(!reference.is_detached());
        assert_eq!(reference.read(&roster).unwrap().name, "player-1");

        reference.detach(&roster);
        assert!(reference.is_detached());

        // The seat is recycled for a new occupant.
        roster.reset_slot(slot);
        roster.slot_mut(slot).unwrap().name = "newcomer".to_owned();

        assert_eq!(reference.read(&roster).unwrap().name, "player-1");
        assert_eq!(roster.slot(slot).unwrap().name, "newcomer");
    }

    #[test]
    fn live_reference_follows_the_registry() {
        let mut roster = test_roster();
        let slot = SlotIndex::new(1);
        let reference = PlayerReference::Live(slot);

        roster.slot_mut(slot).unwrap().name = "renamed".to_owned();
        assert_eq!(reference.read(&roster).unwrap().name, "renamed");
    }

    #[test]
    fn ai_index_reporting() {
        assert_eq!(SlotControl::Human.ai_index(), -1);
        assert_eq!(SlotControl::Open.ai_index(), -2);
        assert_eq!(SlotControl::Computer { ai_index: 5 }.ai_index(), 5);
    }

    #[test]
    fn loaded_check_ignores_spectators_and_computers() {
        let mut roster = test_roster();
        roster
            .slot_mut(SlotIndex::new(4))
            .unwrap()
            .joining_in_progress = true;
        assert!(roster.all_player_seats_loaded());

        roster
            .slot_mut(SlotIndex::new(2))
            .unwrap()
            .joining_in_progress = true;
        assert!(!roster.all_player_seats_loaded());
    }
}

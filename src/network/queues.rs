//! Per-seat receive queues.
//!
//! Each seat's endpoint owns two inbound queues per remote seat: a net queue
//! whose messages are handled the moment they are popped, and a game queue
//! whose entries are stamped with a scheduled game time and may only be
//! popped once the local simulation has reached that time. The stamping
//! follows the stream marker: a [`MsgKind::GameTime`] message never enters
//! the queue itself, it advances the marker that every later message on the
//! same stream is stamped with. Identical game-time markers on every peer
//! mean identical pop order on every peer, which is what keeps the
//! simulations in lockstep.

use std::collections::VecDeque;

use tracing::warn;

use crate::network::codec;
use crate::network::messages::{Envelope, GameTimePayload, MsgKind};
use crate::GameTime;

/// A game-queue entry and the simulation time it must not run before.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct GameEntry {
    pub(crate) at: GameTime,
    pub(crate) envelope: Envelope,
}

/// The inbound queues for one originating seat.
#[derive(Clone, Debug, Default)]
pub(crate) struct SlotQueues {
    net: VecDeque<Envelope>,
    game: VecDeque<GameEntry>,
    marker: GameTime,
}

impl SlotQueues {
    /// Appends a net-channel envelope.
    pub(crate) fn push_net(&mut self, envelope: Envelope) {
        self.net.push_back(envelope);
    }

    /// Appends a game-channel envelope, stamped with the stream marker.
    ///
    /// A [`MsgKind::GameTime`] envelope is consumed here: it advances the
    /// marker and is not queued. A malformed time payload is dropped so a
    /// broken peer cannot wedge the stream.
    pub(crate) fn push_game(&mut self, envelope: Envelope) {
        if envelope.kind() == Some(MsgKind::GameTime) {
            match codec::decode_value::<GameTimePayload>(envelope.payload()) {
                Ok(payload) => {
                    self.marker = GameTime::new(payload.game_time);
                },
                Err(error) => {
                    warn!(%error, "dropping malformed game-time marker");
                },
            }
            return;
        }
        self.game.push_back(GameEntry {
            at: self.marker,
            envelope,
        });
    }

    /// Pops the oldest net-channel envelope, if any.
    pub(crate) fn pop_net(&mut self) -> Option<Envelope> {
        self.net.pop_front()
    }

    /// Pops the oldest game entry whose scheduled time has been reached.
    pub(crate) fn pop_game_due(&mut self, now: GameTime) -> Option<GameEntry> {
        let due = self
            .game
            .front()
            .is_some_and(|entry| entry.at.as_millis() <= now.as_millis());
        if due {
            self.game.pop_front()
        } else {
            None
        }
    }

    /// The stream marker later game entries will be stamped with.
    pub(crate) fn marker(&self) -> GameTime {
        self.marker
    }

    pub(crate) fn net_len(&self) -> usize {
        self.net.len()
    }

    pub(crate) fn game_len(&self) -> usize {
        self.game.len()
    }

    /// Discards everything queued for this seat and resets the marker.
    pub(crate) fn clear(&mut self) {
        self.net.clear();
        self.game.clear();
        self.marker = GameTime::new(0);
    }
}

/// One [`SlotQueues`] per seat in the roster.
#[derive(Clone, Debug)]
pub(crate) struct QueueSet {
    slots: Vec<SlotQueues>,
}

impl QueueSet {
    pub(crate) fn new(num_slots: usize) -> Self {
        Self {
            slots: vec![SlotQueues::default(); num_slots],
        }
    }

    pub(crate) fn num_slots(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn slot(&self, slot: usize) -> Option<&SlotQueues> {
        self.slots.get(slot)
    }

    pub(crate) fn slot_mut(&mut self, slot: usize) -> Option<&mut SlotQueues> {
        self.slots.get_mut(slot)
    }

    /// Discards everything queued for one seat, for seat reuse after a
    /// departure has been fully consumed.
    pub(crate) fn reset_slot(&mut self, slot: usize) {
        if let Some(queues) = self.slots.get_mut(slot) {
            queues.clear();
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
    use crate::network::messages::Channel;

    fn game_time_envelope(at: u32) -> Envelope {
        let payload = codec::encode(&GameTimePayload { game_time: at }).unwrap();
        Envelope::game(MsgKind::GameTime, payload)
    }

    #[test]
    fn net_queue_is_fifo() {
        let mut queues = SlotQueues::default();
        queues.push_net(Envelope::net(MsgKind::Ping, vec![1]));
        queues.push_net(Envelope::net(MsgKind::Ping, vec![2]));

        assert_eq!(queues.net_len(), 2);
        assert_eq!(queues.pop_net().unwrap().payload(), &[1]);
        assert_eq!(queues.pop_net().unwrap().payload(), &[2]);
        assert!(queues.pop_net().is_none());
    }

    #[test]
    fn game_time_advances_marker_without_queueing() {
        let mut queues = SlotQueues::default();
        assert_eq!(queues.marker(), GameTime::new(0));

        queues.push_game(game_time_envelope(100));
        assert_eq!(queues.marker(), GameTime::new(100));
        assert_eq!(queues.game_len(), 0);
    }

    #[test]
    fn entries_are_stamped_with_the_current_marker() {
        let mut queues = SlotQueues::default();
        queues.push_game(Envelope::game(MsgKind::UnitOrder, vec![1]));
        queues.push_game(game_time_envelope(100));
        queues.push_game(Envelope::game(MsgKind::UnitOrder, vec![2]));

        let first = queues.pop_game_due(GameTime::new(0)).unwrap();
        assert_eq!(first.at, GameTime::new(0));
        assert_eq!(first.envelope.payload(), &[1]);

        // The second entry is scheduled at 100ms and is not due yet.
        assert!(queues.pop_game_due(GameTime::new(99)).is_none());

        let second = queues.pop_game_due(GameTime::new(100)).unwrap();
        assert_eq!(second.at, GameTime::new(100));
        assert_eq!(second.envelope.payload(), &[2]);
    }

    #[test]
    fn same_stamp_preserves_order() {
        let mut queues = SlotQueues::default();
        queues.push_game(game_time_envelope(50));
        queues.push_game(Envelope::game(MsgKind::UnitOrder, vec![1]));
        queues.push_game(Envelope::game(MsgKind::Alliance, vec![2]));

        let first = queues.pop_game_due(GameTime::new(50)).unwrap();
        let second = queues.pop_game_due(GameTime::new(50)).unwrap();
        assert_eq!(first.envelope.kind(), Some(MsgKind::UnitOrder));
        assert_eq!(second.envelope.kind(), Some(MsgKind::Alliance));
    }

    #[test]
    fn malformed_game_time_is_dropped() {
        let mut queues = SlotQueues::default();
        queues.push_game(Envelope::raw(Channel::Game, MsgKind::GameTime.as_u8(), vec![0xFF]));
        assert_eq!(queues.marker(), GameTime::new(0));
        assert_eq!(queues.game_len(), 0);
    }

    #[test]
    fn clear_resets_marker_and_entries() {
        let mut queues = SlotQueues::default();
        queues.push_game(game_time_envelope(100));
        queues.push_game(Envelope::game(MsgKind::UnitOrder, Vec::new()));
        queues.push_net(Envelope::net(MsgKind::Ping, Vec::new()));

        queues.clear();
        assert_eq!(queues.marker(), GameTime::new(0));
        assert_eq!(queues.game_len(), 0);
        assert_eq!(queues.net_len(), 0);
    }

    #[test]
    fn queue_set_indexes_by_slot() {
        let mut set = QueueSet::new(3);
        assert_eq!(set.num_slots(), 3);
        assert!(set.slot(3).is_none());

        set.slot_mut(1)
            .unwrap()
            .push_net(Envelope::net(MsgKind::Ping, Vec::new()));
        assert_eq!(set.slot(1).unwrap().net_len(), 1);
        assert_eq!(set.slot(0).unwrap().net_len(), 0);

        set.reset_slot(1);
        assert_eq!(set.slot(1).unwrap().net_len(), 0);
    }
}

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::network::messages::Envelope;
use crate::NonBlockingSocket;

/// Per-address mailboxes. Each entry holds `(sender, envelope)` pairs in
/// arrival order.
type Mailboxes = HashMap<usize, VecDeque<(usize, Envelope)>>;

/// An in-process message fabric connecting several [`LoopbackSocket`]
/// endpoints in the same process.
///
/// Delivery is reliable and ordered per sender, which satisfies the transport
/// contract of [`NonBlockingSocket`]. Envelopes sent to an address nobody has
/// claimed yet are buffered until an endpoint attaches, so wiring order does
/// not matter.
///
/// This is the transport used by the integration tests and by single-process
/// demos; production code is expected to bring its own transport.
#[derive(Clone, Debug, Default)]
pub struct LoopbackHub {
    mailboxes: Arc<Mutex<Mailboxes>>,
}

impl LoopbackHub {
    /// Creates an empty hub with no endpoints attached.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches an endpoint under the given address.
    ///
    /// Each address should be claimed by exactly one socket; two sockets on
    /// the same address would drain each other's mail.
    #[must_use]
    pub fn endpoint(&self, address: usize) -> LoopbackSocket {
        self.mailboxes.lock().entry(address).or_default();
        LoopbackSocket {
            address,
            mailboxes: Arc::clone(&self.mailboxes),
        }
    }
}

/// One endpoint of a [`LoopbackHub`].
///
/// Implements [`NonBlockingSocket`] over plain `usize` addresses, so a pair
/// (or any number) of sessions can talk to each other without touching the
/// operating system's network stack.
#[derive(Debug)]
pub struct LoopbackSocket {
    address: usize,
    mailboxes: Arc<Mutex<Mailboxes>>,
}

impl LoopbackSocket {
    /// The address this endpoint receives mail under.
    #[must_use]
    pub fn address(&self) -> usize {
        self.address
    }
}

impl NonBlockingSocket<usize> for LoopbackSocket {
    fn send_to(&mut self, envelope: &Envelope, addr: &usize) {
        // Buffer for unclaimed addresses too; an endpoint attaching later
        // must still see everything sent to it.
        self.mailboxes
            .lock()
            .entry(*addr)
            .or_default()
            .push_back((self.address, envelope.clone()));
    }

    fn receive_all_messages(&mut self) -> Vec<(usize, Envelope)> {
        match self.mailboxes.lock().get_mut(&self.address) {
            Some(inbox) => inbox.drain(..).collect(),
            None => Vec::new(),
        }
    }
}

/// Creates two endpoints wired to each other, at addresses `0` and `1`.
///
/// Convenience for the common two-session case; use [`LoopbackHub`] directly
/// when a host needs to address more than one peer.
#[must_use]
pub fn loopback_pair() -> (LoopbackSocket, LoopbackSocket) {
    let hub = LoopbackHub::new();
    (hub.endpoint(0), hub.endpoint(1))
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
    use crate::network::messages::{Channel, MsgKind};

    fn envelope(tag: u8) -> Envelope {
        Envelope::raw(Channel::Net, 36, vec![tag])
    }

    #[test]
    fn pair_delivers_in_order() {
        let (mut a, mut b) = loopback_pair();

        a.send_to(&envelope(1), &1);
        a.send_to(&envelope(2), &1);

        let received = b.receive_all_messages();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].0, 0);
        assert_eq!(received[0].1.payload(), &[1]);
        assert_eq!(received[1].1.payload(), &[2]);
    }

    #[test]
    fn receive_is_non_blocking() {
        let (mut a, _b) = loopback_pair();
        assert!(a.receive_all_messages().is_empty());
        assert!(a.receive_all_messages().is_empty());
    }

    #[test]
    fn directions_do_not_cross() {
        let (mut a, mut b) = loopback_pair();

        a.send_to(&envelope(1), &1);
        b.send_to(&envelope(2), &0);

        let at_b = b.receive_all_messages();
        let at_a = a.receive_all_messages();
        assert_eq!(at_b.len(), 1);
        assert_eq!(at_b[0].1.payload(), &[1]);
        assert_eq!(at_a.len(), 1);
        assert_eq!(at_a[0].1.payload(), &[2]);
    }

    #[test]
    fn receive_drains_the_mailbox() {
        let (mut a, mut b) = loopback_pair();

        a.send_to(&envelope(1), &1);
        assert_eq!(b.receive_all_messages().len(), 1);
        assert!(b.receive_all_messages().is_empty());
    }

    #[test]
    fn mail_waits_for_a_late_endpoint() {
        let hub = LoopbackHub::new();
        let mut host = hub.endpoint(0);

        host.send_to(&envelope(7), &2);

        let mut late = hub.endpoint(2);
        let received = late.receive_all_messages();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, 0);
        assert_eq!(received[0].1.payload(), &[7]);
    }

    #[test]
    fn hub_routes_each_address_separately() {
        let hub = LoopbackHub::new();
        let mut host = hub.endpoint(0);
        let mut first = hub.endpoint(1);
        let mut second = hub.endpoint(2);

        host.send_to(&envelope(1), &1);
        host.send_to(&envelope(2), &2);

        let at_first = first.receive_all_messages();
        let at_second = second.receive_all_messages();
        assert_eq!(at_first.len(), 1);
        assert_eq!(at_first[0].1.payload(), &[1]);
        assert_eq!(at_second.len(), 1);
        assert_eq!(at_second[0].1.payload(), &[2]);
    }

    #[test]
    fn self_send_loops_back() {
        let hub = LoopbackHub::new();
        let mut only = hub.endpoint(5);

        only.send_to(&envelope(9), &5);

        let received = only.receive_all_messages();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, 5);
    }

    #[test]
    fn envelopes_survive_the_trip_intact() {
        let (mut a, mut b) = loopback_pair();
        let sent = Envelope::net(MsgKind::Chat, vec![3, 1, 4, 1, 5]);

        a.send_to(&sent, &1);

        let received = b.receive_all_messages();
        assert_eq!(received[0].1, sent);
    }
}

//! Session wiring helpers for the integration tests.
//!
//! Every test session here runs over [`LoopbackHub`] endpoints, so whole
//! multi-endpoint matches execute in-process with no timing dependence: one
//! `poll` on the sender followed by one `poll` on the receiver delivers a
//! message deterministically.

use garrison_lockstep::hash::DigestBuilder;
use garrison_lockstep::network::messages::OverlayLayer;
use garrison_lockstep::{
    Config, ContentDigest, GameTime, GarrisonEvent, GarrisonResult, IntegrityProbe,
    LockstepSession, LoopbackHub, SeatOccupant, SessionBuilder, SlotIndex,
};

/// Loopback addresses double as seat numbers in these tests, which keeps the
/// wiring readable; nothing in the crate requires that correspondence.
pub const HOST_ADDR: usize = 0;
#[allow(dead_code)]
pub const CLIENT_ADDR: usize = 1;
#[allow(dead_code)]
pub const WATCHER_ADDR: usize = 2;

pub const HOST_SEAT: SlotIndex = SlotIndex::new(0);
pub const CLIENT_SEAT: SlotIndex = SlotIndex::new(1);
#[allow(dead_code)]
pub const WATCHER_SEAT: SlotIndex = SlotIndex::new(2);

/// Marker config for loopback-backed sessions.
pub struct LockstepConfig;

impl Config for LockstepConfig {
    type Address = usize;
}

pub type TestSession = LockstepSession<LockstepConfig>;

/// A probe whose digest is a pure function of its seed, so endpoints given
/// the same seed pass the data check and endpoints given different seeds
/// fail it.
#[derive(Clone, Copy)]
pub struct SeededProbe {
    digest: ContentDigest,
}

impl SeededProbe {
    #[must_use]
    pub fn new(seed: &str) -> Self {
        let mut builder = DigestBuilder::new();
        builder.add_category("test data", seed.as_bytes());
        Self {
            digest: builder.finish(),
        }
    }
}

impl IntegrityProbe for SeededProbe {
    fn content_digest(&self) -> ContentDigest {
        self.digest
    }

    fn overlay_layers(&self) -> Vec<OverlayLayer> {
        Vec::new()
    }

    fn god_mode(&self) -> bool {
        false
    }
}

/// Host session (seat 0, local) with one remote player (seat 1) expected at
/// [`CLIENT_ADDR`] on the given hub. Used by tests that drive the peer's
/// wire traffic by hand instead of through a second session.
pub fn host_on_hub(hub: &LoopbackHub, seed: &str) -> GarrisonResult<TestSession> {
    SessionBuilder::<LockstepConfig>::new()
        .add_player(
            SeatOccupant::Local {
                name: "alice".to_owned(),
            },
            HOST_SEAT,
        )?
        .add_player(
            SeatOccupant::Remote {
                name: "bob".to_owned(),
                address: CLIENT_ADDR,
            },
            CLIENT_SEAT,
        )?
        .with_host(HOST_SEAT)
        .with_integrity_probe(SeededProbe::new(seed))
        .start_session(hub.endpoint(HOST_ADDR))
}

/// A fully wired host/client pair whose probes carry the given seeds.
#[allow(dead_code)]
pub fn pair_with_seeds(
    host_seed: &str,
    client_seed: &str,
) -> GarrisonResult<(TestSession, TestSession)> {
    let hub = LoopbackHub::new();
    let host = host_on_hub(&hub, host_seed)?;
    let client = SessionBuilder::<LockstepConfig>::new()
        .add_player(
            SeatOccupant::Remote {
                name: "alice".to_owned(),
                address: HOST_ADDR,
            },
            HOST_SEAT,
        )?
        .add_player(
            SeatOccupant::Local {
                name: "bob".to_owned(),
            },
            CLIENT_SEAT,
        )?
        .with_host(HOST_SEAT)
        .with_integrity_probe(SeededProbe::new(client_seed))
        .start_session(hub.endpoint(CLIENT_ADDR))?;
    Ok((host, client))
}

/// A host/client pair with matching data, ready to join cleanly.
#[allow(dead_code)]
pub fn host_client_pair() -> GarrisonResult<(TestSession, TestSession)> {
    pair_with_seeds("shared", "shared")
}

/// Host, remote player and remote spectator, all with matching data.
#[allow(dead_code)]
pub fn lobby_trio() -> GarrisonResult<(TestSession, TestSession, TestSession)> {
    let hub = LoopbackHub::new();
    let probe = SeededProbe::new("shared");

    let host = SessionBuilder::<LockstepConfig>::new()
        .with_spectator_slots(1)
        .add_player(
            SeatOccupant::Local {
                name: "alice".to_owned(),
            },
            HOST_SEAT,
        )?
        .add_player(
            SeatOccupant::Remote {
                name: "bob".to_owned(),
                address: CLIENT_ADDR,
            },
            CLIENT_SEAT,
        )?
        .add_spectator(
            SeatOccupant::Remote {
                name: "carol".to_owned(),
                address: WATCHER_ADDR,
            },
            WATCHER_SEAT,
        )?
        .with_host(HOST_SEAT)
        .with_integrity_probe(probe)
        .start_session(hub.endpoint(HOST_ADDR))?;

    let client = SessionBuilder::<LockstepConfig>::new()
        .with_spectator_slots(1)
        .add_player(
            SeatOccupant::Remote {
                name: "alice".to_owned(),
                address: HOST_ADDR,
            },
            HOST_SEAT,
        )?
        .add_player(
            SeatOccupant::Local {
                name: "bob".to_owned(),
            },
            CLIENT_SEAT,
        )?
        .add_spectator(
            SeatOccupant::Remote {
                name: "carol".to_owned(),
                address: WATCHER_ADDR,
            },
            WATCHER_SEAT,
        )?
        .with_host(HOST_SEAT)
        .with_integrity_probe(probe)
        .start_session(hub.endpoint(CLIENT_ADDR))?;

    let watcher = SessionBuilder::<LockstepConfig>::new()
        .with_spectator_slots(1)
        .add_player(
            SeatOccupant::Remote {
                name: "alice".to_owned(),
                address: HOST_ADDR,
            },
            HOST_SEAT,
        )?
        .add_player(
            SeatOccupant::Remote {
                name: "bob".to_owned(),
                address: CLIENT_ADDR,
            },
            CLIENT_SEAT,
        )?
        .add_spectator(
            SeatOccupant::Local {
                name: "carol".to_owned(),
            },
            WATCHER_SEAT,
        )?
        .with_host(HOST_SEAT)
        .with_integrity_probe(probe)
        .start_session(hub.endpoint(WATCHER_ADDR))?;

    Ok((host, client, watcher))
}

/// Polls both sessions `rounds` times at game time zero, discarding
/// commands. Events accumulate in each session for later draining.
#[allow(dead_code)]
pub fn pump_pair(a: &mut TestSession, b: &mut TestSession, rounds: usize) -> GarrisonResult<()> {
    for _ in 0..rounds {
        a.poll(GameTime::new(0))?;
        b.poll(GameTime::new(0))?;
    }
    Ok(())
}

/// Three-session variant of [`pump_pair`].
#[allow(dead_code)]
pub fn pump_trio(
    a: &mut TestSession,
    b: &mut TestSession,
    c: &mut TestSession,
    rounds: usize,
) -> GarrisonResult<()> {
    for _ in 0..rounds {
        a.poll(GameTime::new(0))?;
        b.poll(GameTime::new(0))?;
        c.poll(GameTime::new(0))?;
    }
    Ok(())
}

/// Drains a session's queued events into a vector.
#[allow(dead_code)]
pub fn drain_events(session: &mut TestSession) -> Vec<GarrisonEvent> {
    session.events().collect()
}

/// Walks a pair through the full join choreography: start, load, respond,
/// and poll until both sides have flipped to the active stage.
#[allow(dead_code)]
pub fn activate_pair(host: &mut TestSession, client: &mut TestSession) -> GarrisonResult<()> {
    host.start_match()?;
    host.mark_loaded()?;
    client.start_match()?;
    client.mark_loaded()?;
    pump_pair(host, client, 3)
}

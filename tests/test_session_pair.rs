//! End-to-end tests of a host/client pair wired over the loopback hub:
//! the join choreography, chat, departures, kicks, the data check, and
//! file transfer, each asserted from both endpoints' points of view.

mod common;

use std::time::Duration;

use common::{
    activate_pair, drain_events, host_client_pair, pair_with_seeds, pump_pair, CLIENT_SEAT,
    HOST_SEAT,
};
use garrison_lockstep::{
    FileDigest, GameTime, GarrisonError, GarrisonEvent, LeaveReason, MatchStage, MsgKind,
    SessionRole,
};

#[test]
fn a_fresh_pair_polls_cleanly() -> Result<(), GarrisonError> {
    let (mut host, mut client) = host_client_pair()?;

    assert_eq!(host.role(), SessionRole::Host);
    assert_eq!(client.role(), SessionRole::Client);
    assert_eq!(host.current_stage(), MatchStage::Lobby);

    let commands = host.poll(GameTime::new(0))?;
    assert!(commands.is_empty());
    let commands = client.poll(GameTime::new(0))?;
    assert!(commands.is_empty());
    Ok(())
}

#[test]
fn chat_crosses_the_wire_with_the_senders_seat() -> Result<(), GarrisonError> {
    let (mut host, mut client) = host_client_pair()?;

    client.send_chat("good luck", false)?;
    host.send_chat("have fun", false)?;
    pump_pair(&mut host, &mut client, 1)?;

    let at_host = drain_events(&mut host);
    assert!(at_host.iter().any(|event| matches!(
        event,
        GarrisonEvent::Chat { sender, team_only: false, text }
            if *sender == CLIENT_SEAT && text == "good luck"
    )));

    let at_client = drain_events(&mut client);
    assert!(at_client.iter().any(|event| matches!(
        event,
        GarrisonEvent::Chat { sender, text, .. }
            if *sender == HOST_SEAT && text == "have fun"
    )));
    Ok(())
}

#[test]
fn game_commands_come_back_on_every_endpoint() -> Result<(), GarrisonError> {
    let (mut host, mut client) = host_client_pair()?;

    host.send_game_command(MsgKind::UnitOrder, vec![1, 2, 3])?;

    let at_host = host.poll(GameTime::new(0))?;
    let at_client = client.poll(GameTime::new(0))?;

    for commands in [&at_host, &at_client] {
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].origin, HOST_SEAT);
        assert_eq!(commands[0].kind, MsgKind::UnitOrder);
        assert_eq!(commands[0].payload, vec![1, 2, 3]);
    }
    Ok(())
}

#[test]
fn the_join_choreography_reaches_active_everywhere() -> Result<(), GarrisonError> {
    let (mut host, mut client) = host_client_pair()?;

    activate_pair(&mut host, &mut client)?;

    assert_eq!(host.current_stage(), MatchStage::Active);
    assert_eq!(client.current_stage(), MatchStage::Active);

    let at_host = drain_events(&mut host);
    assert!(at_host
        .iter()
        .any(|event| matches!(event, GarrisonEvent::EveryoneJoined { .. })));
    assert!(at_host.iter().any(|event| matches!(
        event,
        GarrisonEvent::PlayerResponding { slot } if *slot == CLIENT_SEAT
    )));
    // The client reported its digest after joining and it matched.
    assert!(at_host.iter().any(|event| matches!(
        event,
        GarrisonEvent::IntegrityVerified { slot } if *slot == CLIENT_SEAT
    )));
    assert!(host
        .roster()
        .slot(CLIENT_SEAT)
        .is_some_and(|seat| seat.integrity_verified));

    let at_client = drain_events(&mut client);
    assert!(at_client
        .iter()
        .any(|event| matches!(event, GarrisonEvent::EveryoneJoined { .. })));
    assert!(at_client.iter().any(|event| matches!(
        event,
        GarrisonEvent::PlayerResponding { slot } if *slot == HOST_SEAT
    )));
    Ok(())
}

#[test]
fn mismatched_data_gets_the_client_removed() -> Result<(), GarrisonError> {
    let (mut host, mut client) = pair_with_seeds("expansion pack", "base game")?;

    activate_pair(&mut host, &mut client)?;

    let at_host = drain_events(&mut host);
    assert!(at_host.iter().any(|event| matches!(
        event,
        GarrisonEvent::IntegrityFailed { slot } if *slot == CLIENT_SEAT
    )));
    assert!(at_host.iter().any(|event| matches!(
        event,
        GarrisonEvent::KickIssued { slot, code: LeaveReason::WrongData, .. }
            if *slot == CLIENT_SEAT
    )));

    let at_client = drain_events(&mut client);
    assert!(at_client.iter().any(|event| matches!(
        event,
        GarrisonEvent::KickedFromSession { code: LeaveReason::WrongData, .. }
    )));
    assert!(at_client.iter().any(|event| matches!(
        event,
        GarrisonEvent::PlayerLeft { slot, .. } if *slot == CLIENT_SEAT
    )));
    Ok(())
}

#[test]
fn a_kick_tells_the_target_why_and_schedules_the_departure() -> Result<(), GarrisonError> {
    let (mut host, mut client) = host_client_pair()?;

    host.kick(CLIENT_SEAT, "Making room for a friend.", LeaveReason::Kicked, false)?;
    pump_pair(&mut host, &mut client, 2)?;

    let at_host = drain_events(&mut host);
    assert!(at_host.iter().any(|event| matches!(
        event,
        GarrisonEvent::KickIssued { slot, code: LeaveReason::Kicked, .. }
            if *slot == CLIENT_SEAT
    )));
    assert!(at_host.iter().any(|event| matches!(
        event,
        GarrisonEvent::PlayerLeft { slot, .. } if *slot == CLIENT_SEAT
    )));

    let at_client = drain_events(&mut client);
    assert!(at_client.iter().any(|event| matches!(
        event,
        GarrisonEvent::KickedFromSession { reason, code: LeaveReason::Kicked }
            if reason == "Making room for a friend."
    )));
    // Everyone else around the table hears about it too.
    assert!(at_client.iter().any(|event| matches!(
        event,
        GarrisonEvent::SystemMessage { text } if text.contains("removed from the match")
    )));
    assert!(at_client.iter().any(|event| matches!(
        event,
        GarrisonEvent::PlayerLeft { slot, .. } if *slot == CLIENT_SEAT
    )));
    Ok(())
}

#[test]
fn the_hosts_goodbye_ends_the_session_for_clients() -> Result<(), GarrisonError> {
    let (mut host, mut client) = host_client_pair()?;

    host.announce_leaving()?;
    client.poll(GameTime::new(0))?;

    assert!(client.host_has_dropped());
    let at_client = drain_events(&mut client);
    assert!(at_client
        .iter()
        .any(|event| matches!(event, GarrisonEvent::HostDropped)));
    // The departed host's identity survives as a snapshot.
    assert!(client
        .player_reference(HOST_SEAT)
        .is_some_and(garrison_lockstep::PlayerReference::is_detached));
    Ok(())
}

#[test]
fn a_clients_goodbye_is_turned_into_a_scheduled_departure() -> Result<(), GarrisonError> {
    let (mut host, mut client) = host_client_pair()?;

    client.announce_leaving()?;
    pump_pair(&mut host, &mut client, 2)?;

    let at_host = drain_events(&mut host);
    assert!(at_host.iter().any(|event| matches!(
        event,
        GarrisonEvent::PlayerLeft { slot, .. } if *slot == CLIENT_SEAT
    )));

    // The departing endpoint sees the same departure at the same game time.
    let at_client = drain_events(&mut client);
    assert!(at_client.iter().any(|event| matches!(
        event,
        GarrisonEvent::PlayerLeft { slot, .. } if *slot == CLIENT_SEAT
    )));
    Ok(())
}

#[test]
fn file_transfer_completes_end_to_end() -> Result<(), GarrisonError> {
    let (mut host, mut client) = host_client_pair()?;

    let digest = FileDigest([7; 32]);
    let contents: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    host.host_file(digest, "custom_map.pak", contents.clone())?;

    client.request_file(digest)?;
    for _ in 0..10 {
        host.poll(GameTime::new(0))?;
        client.poll(GameTime::new(0))?;
        if let Some((got_digest, got_bytes)) = client.take_received_file() {
            assert_eq!(got_digest, digest);
            assert_eq!(got_bytes, contents);

            let at_client = drain_events(&mut client);
            assert!(at_client
                .iter()
                .any(|event| matches!(event, GarrisonEvent::FileReceiveProgress { .. })));
            assert!(at_client
                .iter()
                .any(|event| matches!(event, GarrisonEvent::FileReceiveComplete)));

            let at_host = drain_events(&mut host);
            assert!(at_host.iter().any(|event| matches!(
                event,
                GarrisonEvent::FileSendProgress { slot, percent: 100 }
                    if *slot == CLIENT_SEAT
            )));
            return Ok(());
        }
    }
    panic!("file transfer did not complete");
}

#[test]
fn requesting_an_unknown_file_is_quietly_refused() -> Result<(), GarrisonError> {
    let (mut host, mut client) = host_client_pair()?;

    client.request_file(FileDigest([9; 32]))?;
    pump_pair(&mut host, &mut client, 2)?;

    assert!(client.take_received_file().is_none());
    let at_client = drain_events(&mut client);
    assert!(!at_client
        .iter()
        .any(|event| matches!(event, GarrisonEvent::FileReceiveComplete)));
    Ok(())
}

#[test]
fn pings_flow_between_the_endpoints() -> Result<(), GarrisonError> {
    let (mut host, mut client) = host_client_pair()?;

    pump_pair(&mut host, &mut client, 3)?;

    // Probe and echo both crossed an in-process pipe.
    assert!(host.current_ping(CLIENT_SEAT) < Duration::from_secs(1));
    assert!(client.current_ping(HOST_SEAT) < Duration::from_secs(1));
    Ok(())
}

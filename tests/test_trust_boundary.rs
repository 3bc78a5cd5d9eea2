mod common;

use common::{
    drain_events, host_on_hub, lobby_trio, pump_pair, pump_trio, CLIENT_ADDR, CLIENT_SEAT,
    HOST_ADDR, HOST_SEAT, WATCHER_SEAT,
};
use garrison_lockstep::network::codec;
use garrison_lockstep::network::messages::{
    ChatPayload, IntegrityChallenge, KickPayload, SlotPayload, SYSTEM_MESSAGE_SENDER,
};
use garrison_lockstep::{
    Channel, Envelope, GameTime, GarrisonEvent, GarrisonResult, LeaveReason, LoopbackHub, MsgKind,
    NonBlockingSocket, PlayerReference,
};

/// Payloads of every envelope of `kind` in captured wire traffic.
fn payloads_of(traffic: &[(usize, Envelope)], kind: MsgKind) -> Vec<Vec<u8>> {
    traffic
        .iter()
        .filter(|(_, envelope)| envelope.kind_byte() == kind.as_u8())
        .map(|(_, envelope)| envelope.payload().to_vec())
        .collect()
}

#[test]
fn a_forged_sender_claim_is_pinned_to_its_origin() -> GarrisonResult<()> {
    let hub = LoopbackHub::new();
    let mut host = host_on_hub(&hub, "shared")?;
    let mut wire = hub.endpoint(CLIENT_ADDR);

    // The guest claims the host's seat wrote this line.
    let line = codec::encode(&ChatPayload {
        sender: HOST_SEAT.as_usize() as i32,
        team_only: false,
        text: "free stuff at my website".to_owned(),
    })?;
    wire.send_to(&Envelope::net(MsgKind::Chat, line), &HOST_ADDR);
    host.poll(GameTime::new(0))?;

    let events = drain_events(&mut host);
    assert!(events.iter().any(|event| matches!(
        event,
        GarrisonEvent::Chat { sender, .. } if *sender == CLIENT_SEAT
    )));
    assert!(!events.iter().any(|event| matches!(
        event,
        GarrisonEvent::Chat { sender, .. } if *sender == HOST_SEAT
    )));
    Ok(())
}

#[test]
fn a_spoofed_system_notice_reads_as_ordinary_chat() -> GarrisonResult<()> {
    let hub = LoopbackHub::new();
    let mut host = host_on_hub(&hub, "shared")?;
    let mut wire = hub.endpoint(CLIENT_ADDR);

    let line = codec::encode(&ChatPayload {
        sender: SYSTEM_MESSAGE_SENDER,
        team_only: false,
        text: "you have been selected for a prize".to_owned(),
    })?;
    wire.send_to(&Envelope::net(MsgKind::Chat, line), &HOST_ADDR);
    host.poll(GameTime::new(0))?;

    // Only the host's own endpoint may speak as the system; from a guest
    // the claim is corrected back to the sending seat.
    let events = drain_events(&mut host);
    assert!(!events
        .iter()
        .any(|event| matches!(event, GarrisonEvent::SystemMessage { .. })));
    assert!(events.iter().any(|event| matches!(
        event,
        GarrisonEvent::Chat { sender, .. } if *sender == CLIENT_SEAT
    )));
    Ok(())
}

#[test]
fn sender_claims_outside_the_roster_are_dropped() -> GarrisonResult<()> {
    let hub = LoopbackHub::new();
    let mut host = host_on_hub(&hub, "shared")?;
    let mut wire = hub.endpoint(CLIENT_ADDR);

    let line = codec::encode(&ChatPayload {
        sender: 40,
        team_only: false,
        text: "hello from seat forty".to_owned(),
    })?;
    wire.send_to(&Envelope::net(MsgKind::Chat, line), &HOST_ADDR);
    host.poll(GameTime::new(0))?;

    let events = drain_events(&mut host);
    assert!(!events
        .iter()
        .any(|event| matches!(event, GarrisonEvent::Chat { .. })));
    Ok(())
}

#[test]
fn host_only_kinds_from_a_guest_remove_the_seat() -> GarrisonResult<()> {
    let hub = LoopbackHub::new();
    let mut host = host_on_hub(&hub, "shared")?;
    let mut wire = hub.endpoint(CLIENT_ADDR);

    wire.send_to(&Envelope::net(MsgKind::Options, vec![0]), &HOST_ADDR);
    host.poll(GameTime::new(0))?;

    let events = drain_events(&mut host);
    assert!(events.iter().any(|event| matches!(
        event,
        GarrisonEvent::KickIssued { slot, code, .. }
            if *slot == CLIENT_SEAT && *code == LeaveReason::Invalid
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        GarrisonEvent::PlayerLeft { slot, .. } if *slot == CLIENT_SEAT
    )));
    assert!(host
        .roster()
        .slot(CLIENT_SEAT)
        .is_some_and(|seat| seat.kicked));

    // The wire sees the whole choreography: the notice naming the offender,
    // the kick telling it why, and the scheduled departure.
    let traffic = wire.receive_all_messages();
    let notices = payloads_of(&traffic, MsgKind::Chat);
    assert!(notices.iter().any(|payload| {
        codec::decode_value::<ChatPayload>(payload).is_ok_and(|chat| {
            chat.sender == SYSTEM_MESSAGE_SENDER
                && chat.text.contains("unauthorized Options message")
        })
    }));
    let kicks = payloads_of(&traffic, MsgKind::Kick);
    assert!(kicks.iter().any(|payload| {
        codec::decode_value::<KickPayload>(payload).is_ok_and(|kick| {
            kick.slot == CLIENT_SEAT.as_usize() as u32 && kick.code == LeaveReason::Invalid
        })
    }));
    assert!(!payloads_of(&traffic, MsgKind::PlayerLeft).is_empty());
    Ok(())
}

#[test]
fn an_unknown_kind_byte_is_dropped_without_side_effects() -> GarrisonResult<()> {
    let hub = LoopbackHub::new();
    let mut host = host_on_hub(&hub, "shared")?;
    let mut wire = hub.endpoint(CLIENT_ADDR);

    wire.send_to(&Envelope::raw(Channel::Net, 222, vec![1, 2, 3]), &HOST_ADDR);
    host.poll(GameTime::new(0))?;

    assert!(drain_events(&mut host).is_empty());
    assert!(host
        .roster()
        .slot(CLIENT_SEAT)
        .is_some_and(|seat| seat.connected && !seat.kicked));
    Ok(())
}

#[test]
fn garbage_payload_bytes_for_a_known_kind_are_dropped() -> GarrisonResult<()> {
    let hub = LoopbackHub::new();
    let mut host = host_on_hub(&hub, "shared")?;
    let mut wire = hub.endpoint(CLIENT_ADDR);

    wire.send_to(
        &Envelope::raw(Channel::Net, MsgKind::Chat.as_u8(), vec![0xFF, 0xFF, 0xFF]),
        &HOST_ADDR,
    );
    host.poll(GameTime::new(0))?;

    assert!(drain_events(&mut host).is_empty());
    assert!(host
        .roster()
        .slot(CLIENT_SEAT)
        .is_some_and(|seat| !seat.kicked));
    Ok(())
}

#[test]
fn a_guest_cannot_pose_as_the_integrity_challenger() -> GarrisonResult<()> {
    let hub = LoopbackHub::new();
    let mut host = host_on_hub(&hub, "shared")?;
    let mut wire = hub.endpoint(CLIENT_ADDR);

    // A challenge is the host-to-client half of the exchange. Arriving at
    // the host it fails to parse as a response and goes nowhere.
    let challenge = codec::encode(&IntegrityChallenge {
        host_slot: HOST_SEAT.as_usize() as u32,
    })?;
    wire.send_to(&Envelope::net(MsgKind::DataCheck2, challenge), &HOST_ADDR);
    host.poll(GameTime::new(0))?;

    let events = drain_events(&mut host);
    assert!(!events
        .iter()
        .any(|event| matches!(event, GarrisonEvent::IntegrityFailed { .. })));
    assert!(!events
        .iter()
        .any(|event| matches!(event, GarrisonEvent::KickIssued { .. })));
    assert!(host
        .roster()
        .slot(CLIENT_SEAT)
        .is_some_and(|seat| seat.connected && !seat.kicked));
    Ok(())
}

#[test]
fn kick_requests_naming_the_host_boomerang() -> GarrisonResult<()> {
    let hub = LoopbackHub::new();
    let mut host = host_on_hub(&hub, "shared")?;
    let mut wire = hub.endpoint(CLIENT_ADDR);

    let order = codec::encode(&KickPayload {
        slot: HOST_SEAT.as_usize() as u32,
        reason: "new management".to_owned(),
        code: LeaveReason::Kicked,
    })?;
    wire.send_to(&Envelope::net(MsgKind::Kick, order), &HOST_ADDR);
    host.poll(GameTime::new(0))?;

    let events = drain_events(&mut host);
    assert!(events.iter().any(|event| matches!(
        event,
        GarrisonEvent::KickIssued { slot, code, .. }
            if *slot == CLIENT_SEAT && *code == LeaveReason::Invalid
    )));
    assert!(!host.host_has_dropped());
    assert!(!host
        .player_reference(HOST_SEAT)
        .is_some_and(PlayerReference::is_detached));

    let traffic = wire.receive_all_messages();
    let kicks = payloads_of(&traffic, MsgKind::Kick);
    assert!(kicks.iter().any(|payload| {
        codec::decode_value::<KickPayload>(payload)
            .is_ok_and(|kick| kick.slot == CLIENT_SEAT.as_usize() as u32)
    }));
    Ok(())
}

#[test]
fn a_guest_cannot_announce_another_seats_departure() -> GarrisonResult<()> {
    let hub = LoopbackHub::new();
    let mut host = host_on_hub(&hub, "shared")?;
    let mut wire = hub.endpoint(CLIENT_ADDR);

    let claim = codec::encode(&SlotPayload {
        slot: HOST_SEAT.as_usize() as u32,
    })?;
    wire.send_to(&Envelope::game(MsgKind::PlayerLeft, claim), &HOST_ADDR);
    host.poll(GameTime::new(0))?;
    host.poll(GameTime::new(0))?;

    let events = drain_events(&mut host);
    assert!(!events.iter().any(|event| matches!(
        event,
        GarrisonEvent::PlayerLeft { slot, .. } if *slot == HOST_SEAT
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        GarrisonEvent::KickIssued { slot, code, .. }
            if *slot == CLIENT_SEAT && *code == LeaveReason::Invalid
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        GarrisonEvent::PlayerLeft { slot, .. } if *slot == CLIENT_SEAT
    )));
    assert!(!host.host_has_dropped());
    Ok(())
}

#[test]
fn policy_violations_do_not_spread_beyond_the_host() -> GarrisonResult<()> {
    let (mut host, mut client, mut watcher) = lobby_trio()?;
    host.start_match()?;
    host.mark_loaded()?;
    client.start_match()?;
    client.mark_loaded()?;
    watcher.start_match()?;
    watcher.mark_loaded()?;
    pump_trio(&mut host, &mut client, &mut watcher, 3)?;
    drain_events(&mut host);
    drain_events(&mut client);
    drain_events(&mut watcher);

    // Open chat from a spectator seat is a lobby privilege; once the match
    // is running the host treats it as a violation.
    watcher.send_chat("they are massing units on the left", false)?;
    pump_trio(&mut host, &mut client, &mut watcher, 2)?;

    let host_events = drain_events(&mut host);
    assert!(host_events.iter().any(|event| matches!(
        event,
        GarrisonEvent::KickIssued { slot, code, .. }
            if *slot == WATCHER_SEAT && *code == LeaveReason::Invalid
    )));

    // Other endpoints drop the line without acting on it themselves; the
    // removal arrives only as the host's verdict.
    let client_events = drain_events(&mut client);
    assert!(!client_events.iter().any(|event| matches!(
        event,
        GarrisonEvent::Chat { sender, .. } if *sender == WATCHER_SEAT
    )));
    assert!(client_events.iter().any(|event| matches!(
        event,
        GarrisonEvent::PlayerLeft { slot, .. } if *slot == WATCHER_SEAT
    )));

    let watcher_events = drain_events(&mut watcher);
    assert!(watcher_events.iter().any(|event| matches!(
        event,
        GarrisonEvent::KickedFromSession { code, .. } if *code == LeaveReason::Invalid
    )));
    Ok(())
}

#[test]
fn the_host_probes_a_silent_guest_unprompted() -> GarrisonResult<()> {
    let hub = LoopbackHub::new();
    let mut host = host_on_hub(&hub, "shared")?;
    let mut wire = hub.endpoint(CLIENT_ADDR);

    host.poll(GameTime::new(0))?;

    // The guest has said nothing, yet the ping service already probes it.
    let traffic = wire.receive_all_messages();
    assert!(!payloads_of(&traffic, MsgKind::Ping).is_empty());
    Ok(())
}

/// Two live sessions stay healthy while a third party floods forged
/// envelopes: the hostile seat gets removed, the honest one keeps playing.
#[test]
fn honest_endpoints_survive_a_flood_of_forgeries() -> GarrisonResult<()> {
    let (mut host, mut client, mut watcher) = lobby_trio()?;
    host.start_match()?;
    host.mark_loaded()?;
    client.start_match()?;
    client.mark_loaded()?;
    watcher.start_match()?;
    watcher.mark_loaded()?;
    pump_trio(&mut host, &mut client, &mut watcher, 3)?;
    drain_events(&mut host);
    drain_events(&mut client);
    drain_events(&mut watcher);

    // The watcher turns hostile: orders from a seat it does not control.
    watcher.send_game_command(MsgKind::UnitOrder, vec![9, 9, 9])?;
    pump_trio(&mut host, &mut client, &mut watcher, 2)?;

    let host_events = drain_events(&mut host);
    assert!(host_events.iter().any(|event| matches!(
        event,
        GarrisonEvent::KickIssued { slot, .. } if *slot == WATCHER_SEAT
    )));

    // The honest pair still exchanges traffic normally afterwards.
    client.send_chat("still here", false)?;
    pump_pair(&mut host, &mut client, 2)?;
    let host_events = drain_events(&mut host);
    assert!(host_events.iter().any(|event| matches!(
        event,
        GarrisonEvent::Chat { sender, text, .. }
            if *sender == CLIENT_SEAT && text == "still here"
    )));
    Ok(())
}

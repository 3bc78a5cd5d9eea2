//! Benchmarks for the authorization decision taken on every received
//! message.
//!
//! Run with: cargo bench --bench policy

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use garrison_lockstep::network::policy::{action_for, route, MessageAction, Phase};
use garrison_lockstep::{
    Config, LockstepSession, LoopbackHub, MatchStage, MsgKind, SeatOccupant, SessionBuilder,
    SessionRole, SlotIndex,
};

struct BenchConfig;

impl Config for BenchConfig {
    type Address = usize;
}

/// Three game seats (host, a remote player, a computer) and one spectator,
/// the shape a typical skirmish roster has.
fn bench_session() -> LockstepSession<BenchConfig> {
    let hub = LoopbackHub::new();
    SessionBuilder::<BenchConfig>::new()
        .with_game_slots(3)
        .expect("three game seats are valid")
        .with_spectator_slots(1)
        .add_player(
            SeatOccupant::Local {
                name: "commander".to_owned(),
            },
            SlotIndex::new(0),
        )
        .expect("the host seat is free")
        .add_player(
            SeatOccupant::Remote {
                name: "rival".to_owned(),
                address: 1,
            },
            SlotIndex::new(1),
        )
        .expect("the rival seat is free")
        .add_player(
            SeatOccupant::Computer {
                name: "Nexus".to_owned(),
                ai_index: 0,
            },
            SlotIndex::new(2),
        )
        .expect("the computer seat is free")
        .add_spectator(
            SeatOccupant::Remote {
                name: "witness".to_owned(),
                address: 2,
            },
            SlotIndex::new(3),
        )
        .expect("the spectator seat is free")
        .start_session(hub.endpoint(0))
        .expect("a valid seat table starts")
}

fn policy_decisions(c: &mut Criterion) {
    let session = bench_session();
    let roster = session.roster();
    let origins = [
        ("host", SlotIndex::new(0)),
        ("player", SlotIndex::new(1)),
        ("spectator", SlotIndex::new(3)),
    ];

    let mut group = c.benchmark_group("action_for");
    for (label, origin) in origins {
        group.bench_with_input(BenchmarkId::new("chat", label), &origin, |b, &origin| {
            b.iter(|| {
                action_for(
                    black_box(roster),
                    black_box(origin),
                    MsgKind::Chat,
                    MatchStage::Active,
                    SessionRole::Host,
                )
            });
        });
        group.bench_with_input(
            BenchmarkId::new("unit_order", label),
            &origin,
            |b, &origin| {
                b.iter(|| {
                    action_for(
                        black_box(roster),
                        black_box(origin),
                        MsgKind::UnitOrder,
                        MatchStage::Active,
                        SessionRole::Host,
                    )
                });
            },
        );
    }
    group.finish();
}

fn policy_sweep(c: &mut Criterion) {
    let session = bench_session();
    let roster = session.roster();
    let kinds: Vec<MsgKind> = (0u8..=255)
        .filter_map(|byte| MsgKind::try_from(byte).ok())
        .collect();

    c.bench_function("action_for_every_kind", |b| {
        b.iter(|| {
            kinds
                .iter()
                .filter(|&&kind| {
                    action_for(
                        black_box(roster),
                        SlotIndex::new(1),
                        kind,
                        MatchStage::Active,
                        SessionRole::Host,
                    ) == MessageAction::Process
                })
                .count()
        });
    });
}

fn routing(c: &mut Criterion) {
    let kinds: Vec<MsgKind> = (0u8..=255)
        .filter_map(|byte| MsgKind::try_from(byte).ok())
        .collect();

    c.bench_function("route_every_kind", |b| {
        b.iter(|| {
            kinds
                .iter()
                .filter(|&&kind| route(black_box(kind)) == Phase::GameOnly)
                .count()
        });
    });

    c.bench_function("kind_from_byte", |b| {
        b.iter(|| {
            (0u8..=255)
                .filter(|&byte| MsgKind::try_from(black_box(byte)).is_ok())
                .count()
        });
    });
}

criterion_group!(benches, policy_decisions, policy_sweep, routing);
criterion_main!(benches);

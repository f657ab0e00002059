//! Benchmarks for the session poll loop and the wire codec.
//!
//! Run with: cargo bench --bench session_loop

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use web_time::Duration;
use whack_sync::__internal::{decode_message, encode_message, Envelope};
use whack_sync::{
    AnchorPlacement, ManualClock, MemoryNetwork, Pose, Role, ScheduleConfig, SessionBuilder,
    SlotIndex, SyncMessage, TargetId,
};

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    let placement = Envelope {
        seq: 42,
        message: SyncMessage::AnchorPlacement(AnchorPlacement::new(
            TargetId::new(0x1234_5678_9abc_def0),
            SlotIndex::new(5),
            Pose::default(),
        )),
    };
    let encoded = encode_message(&placement).unwrap_or_default();
    group.bench_function("encode_placement", |b| {
        b.iter(|| encode_message(black_box(&placement)));
    });
    group.bench_function("decode_placement", |b| {
        b.iter(|| decode_message(black_box(&encoded)));
    });
    let world = Envelope {
        seq: 1,
        message: SyncMessage::WorldReference {
            snapshot: vec![0x5A; 64 * 1024],
        },
    };
    group.bench_function("encode_world_reference_64k", |b| {
        b.iter(|| encode_message(black_box(&world)));
    });
    group.finish();
}

fn bench_round(c: &mut Criterion) {
    c.bench_function("host_and_two_guests_full_round", |b| {
        b.iter(|| {
            let network = MemoryNetwork::<u8>::new();
            let clock = ManualClock::new();
            let build = |role, addr| {
                SessionBuilder::<u8>::new()
                    .with_role(role)
                    .with_schedule_config(ScheduleConfig::deterministic(3))
                    .with_clock(clock.clone())
                    .start_session(network.endpoint(addr))
            };
            let (Ok(mut host), Ok(mut guest_a), Ok(mut guest_b)) =
                (build(Role::Host, 0), build(Role::Guest, 1), build(Role::Guest, 2))
            else {
                return;
            };
            for _ in 0..320 {
                clock.advance(Duration::from_millis(100));
                host.poll();
                guest_a.poll();
                guest_b.poll();
                let visible: Vec<TargetId> = guest_a
                    .state()
                    .targets()
                    .filter(|t| t.state().is_active())
                    .map(|t| t.id())
                    .collect();
                for target in visible {
                    guest_a.on_tap_resolved(Some(target));
                }
                black_box(host.events().count() + guest_a.events().count() + guest_b.events().count());
            }
        });
    });
}

criterion_group!(benches, bench_codec, bench_round);
criterion_main!(benches);

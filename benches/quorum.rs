//! Benchmarks for the quorum evaluator
//!
//! Tally and status derivation run on every vote and every deploy, against
//! rosters far larger than any real founder set.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use quorate::admission::Role;
use quorate::governance::{derive_status, invitation_quorum_met, tally, ProposalStatus, Vote};
use quorate::principals::{Principal, PrincipalId, PrincipalRegistry, RosterSnapshot};

fn roster(size: usize) -> RosterSnapshot {
    PrincipalRegistry::with_founders(
        3,
        (0..size).map(|i| {
            Principal::new(
                format!("founder{i}"),
                format!("Founder {i}"),
                format!("founder{i}@example.org"),
            )
        }),
    )
    .map(|registry| registry.snapshot())
    .unwrap()
}

/// Every founder votes; two thirds approve.
fn votes(size: usize) -> Vec<Vote> {
    (0..size)
        .map(|i| Vote {
            founder_id: PrincipalId::from(format!("founder{i}")),
            approve: i % 3 != 0,
            voted_at: i as u64,
            signature: None,
        })
        .collect()
}

fn benchmark_tally(c: &mut Criterion) {
    let mut group = c.benchmark_group("tally");
    for size in [5, 50, 500] {
        let roster = roster(size);
        let votes = votes(size);
        let required = (size as u32 / 2).max(1);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| tally(black_box(&votes), black_box(required), black_box(&roster)))
        });
    }
    group.finish();
}

fn benchmark_derive_status(c: &mut Criterion) {
    let mut group = c.benchmark_group("derive_status");
    for size in [5, 50, 500] {
        let roster = roster(size);
        let votes = votes(size);
        let required = size as u32;
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                derive_status(
                    black_box(ProposalStatus::Voting),
                    black_box(&votes),
                    black_box(required),
                    black_box(&roster),
                )
            })
        });
    }
    group.finish();
}

fn benchmark_invitation_quorum(c: &mut Criterion) {
    let approvals: Vec<PrincipalId> = (0..500)
        .map(|i| PrincipalId::from(format!("founder{}", i % 250)))
        .collect();

    c.bench_function("invitation_quorum_met_admin_500", |b| {
        b.iter(|| invitation_quorum_met(black_box(Role::Admin), black_box(&approvals), 250))
    });
}

criterion_group!(
    benches,
    benchmark_tally,
    benchmark_derive_status,
    benchmark_invitation_quorum
);
criterion_main!(benches);

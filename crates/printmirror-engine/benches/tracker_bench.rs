// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for fingerprint tracking and payload hashing in the
// printmirror-engine crate.

use chrono::{TimeZone, Utc};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

use printmirror_core::types::{JobFingerprint, QueueJobId};
use printmirror_engine::FingerprintTracker;
use printmirror_engine::integrity::hash_bytes;

fn fingerprint(id: u32) -> JobFingerprint {
    JobFingerprint {
        queue: "Office".into(),
        job_id: QueueJobId(id),
        submitted_at: Utc
            .timestamp_opt(1_700_000_000 + i64::from(id), 0)
            .single()
            .unwrap_or_default(),
    }
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Mark 10k new fingerprints into a tracker that never evicts.
fn bench_mark_seen(c: &mut Criterion) {
    let fingerprints: Vec<_> = (0..10_000).map(fingerprint).collect();

    c.bench_function("mark_seen (10k new)", |b| {
        b.iter(|| {
            let tracker = FingerprintTracker::new(20_000);
            for fp in &fingerprints {
                black_box(tracker.mark_seen(fp.clone()));
            }
        });
    });
}

/// Mark fingerprints into a full tracker, so every insert evicts.
fn bench_mark_seen_evicting(c: &mut Criterion) {
    let tracker = FingerprintTracker::new(1_000);
    for id in 0..1_000 {
        tracker.mark_seen(fingerprint(id));
    }
    let mut next = 1_000u32;

    c.bench_function("mark_seen (evicting)", |b| {
        b.iter(|| {
            next = next.wrapping_add(1);
            black_box(tracker.mark_seen(fingerprint(next)));
        });
    });
}

/// The per-cycle filter check for a job that was relayed already.
fn bench_is_seen_hit(c: &mut Criterion) {
    let tracker = FingerprintTracker::default();
    for id in 0..10_000 {
        tracker.mark_seen(fingerprint(id));
    }
    let probe = fingerprint(5_000);

    c.bench_function("is_seen (hit, 10k tracked)", |b| {
        b.iter(|| black_box(tracker.is_seen(black_box(&probe))));
    });
}

/// SHA-256 of typical spool payload sizes.
fn bench_payload_hash(c: &mut Criterion) {
    let sizes: &[(&str, usize)] = &[("10 KiB", 10 * 1024), ("1 MiB", 1024 * 1024)];

    let mut group = c.benchmark_group("payload_hash_sha256");
    for &(label, size) in sizes {
        let data = vec![0x1Bu8; size];
        group.bench_function(label, |b| {
            b.iter(|| black_box(hash_bytes(black_box(&data))));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_mark_seen,
    bench_mark_seen_evicting,
    bench_is_seen_hit,
    bench_payload_hash
);
criterion_main!(benches);

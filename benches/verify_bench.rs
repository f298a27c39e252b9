// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use criterion::{criterion_group, criterion_main, Criterion};
use pm_rpm::core::gem::batch::decode;
use pm_rpm::core::sim::{SimBackend, SimConfig};
use pm_rpm::core::workload::{verify_rect, Pattern, BLT_DST_SIDE, BLT_RECT, PATTERN_BUF_SIZE};
use pm_rpm::core::{Harness, HarnessConfig, RunOptions, ScenarioRunner, Subtest};
use std::hint::black_box;

fn pattern_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern");

    group.bench_function("fill", |b| {
        let mut buf = vec![0u8; PATTERN_BUF_SIZE];
        b.iter(|| Pattern::Inverse.fill(black_box(&mut buf)));
    });

    group.bench_function("verify", |b| {
        let buf = Pattern::Index.to_vec(PATTERN_BUF_SIZE);
        b.iter(|| Pattern::Index.verify(black_box(&buf), "bench").unwrap());
    });

    group.finish();
}

fn blit_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("blit");

    group.bench_function("encode_decode", |b| {
        b.iter(|| {
            let encoded = black_box(BLT_RECT).encode(0x10_0000);
            black_box(decode(encoded.batch.dwords()).unwrap());
        });
    });

    group.bench_function("verify_rect", |b| {
        let side = BLT_DST_SIDE as usize;
        let mut pixels = vec![0u8; side * side * 4];
        for y in BLT_RECT.y..BLT_RECT.y + BLT_RECT.height {
            for x in BLT_RECT.x..BLT_RECT.x + BLT_RECT.width {
                let at = (y as usize * side + x as usize) * 4;
                pixels[at..at + 4].copy_from_slice(&BLT_RECT.color.to_ne_bytes());
            }
        }
        b.iter(|| verify_rect(black_box(&pixels), BLT_DST_SIDE, &BLT_RECT, "bench").unwrap());
    });

    group.finish();
}

fn sim_benchmark(c: &mut Criterion) {
    // Virtual time, so this measures harness and simulator overhead only
    c.bench_function("sim_rte", |b| {
        let mut backend = SimBackend::new(SimConfig::default());
        let mut harness = Harness::setup(HarnessConfig::default(), &mut backend).unwrap();
        b.iter(|| {
            let mut runner = ScenarioRunner::new(&mut harness, RunOptions::default());
            black_box(runner.run(Subtest::Rte));
        });
    });
}

criterion_group!(benches, pattern_benchmark, blit_benchmark, sim_benchmark);
criterion_main!(benches);

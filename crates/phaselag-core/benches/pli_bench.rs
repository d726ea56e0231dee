//! PLI Benchmarks
//!
//! Compares accumulation strategies, taper sets and the incremental cache.
//!
//! Run with: cargo bench -p phaselag-core --bench pli_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::sync::Arc;
use std::time::Duration;

use phaselag_core::prelude::*;
use phaselag_core::spectral::TrialSpectralEstimator;
use phaselag_core::taper::TaperSet;

const SAMPLING_FREQUENCY: f64 = 250.0;

fn noise_trials(count: usize, channels: usize, samples: usize) -> Vec<Trial> {
    let mut rng = StdRng::seed_from_u64(42);
    let normal = Normal::new(0.0, 1.0).unwrap();
    (0..count)
        .map(|_| {
            let data = (0..channels)
                .map(|_| (0..samples).map(|_| normal.sample(&mut rng)).collect())
                .collect();
            Trial::from_channels(data).unwrap()
        })
        .collect()
}

/// Fold/reduce vs mutex accumulation over growing trial counts
fn bench_accumulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("accumulation");
    group.measurement_time(Duration::from_secs(10));

    for num_trials in [8, 32, 128].iter() {
        let trials = noise_trials(*num_trials, 16, 256);
        group.throughput(Throughput::Elements(*num_trials as u64));

        for (label, strategy) in [
            ("fold_reduce", AccumulationStrategy::FoldReduce),
            ("locked", AccumulationStrategy::Locked),
        ] {
            group.bench_with_input(BenchmarkId::new(label, num_trials), &trials, |b, trials| {
                b.iter(|| {
                    let mut settings = ConnectivitySettings::new(SAMPLING_FREQUENCY).with_accumulation(strategy);
                    settings.append_many(trials.iter().cloned());
                    PhaseLagIndex::new().calculate(black_box(&mut settings)).unwrap()
                })
            });
        }
    }

    group.finish();
}

/// Cost of one trial's CSD for single vs multitaper sets
fn bench_trial_contribution(c: &mut Criterion) {
    let mut group = c.benchmark_group("trial_contribution");
    let samples = 512;
    let trial = noise_trials(1, 32, samples).remove(0);

    let configs = [
        ("hann", TaperConfig::default()),
        (
            "dpss_4hz",
            TaperConfig::Multitaper {
                bandwidth_hz: 4.0,
                num_tapers: None,
                low_bias: true,
            },
        ),
    ];
    for (label, config) in configs {
        let tapers = Arc::new(TaperSet::new(&config, samples, SAMPLING_FREQUENCY).unwrap());
        let estimator = TrialSpectralEstimator::new(tapers, samples, 32).unwrap();
        group.bench_function(label, |b| {
            b.iter(|| estimator.trial_contribution(0, black_box(&trial)).unwrap())
        });
    }

    group.finish();
}

/// Sliding window of trials: full recompute vs incremental cache
fn bench_sliding_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("sliding_window");
    let window = 64;
    let trials = noise_trials(window + 1, 16, 256);

    group.bench_function("recompute", |b| {
        b.iter(|| {
            let mut settings = ConnectivitySettings::new(SAMPLING_FREQUENCY);
            settings.append_many(trials[1..].iter().cloned());
            PhaseLagIndex::new().calculate(&mut settings).unwrap()
        })
    });

    let mut cached = ConnectivitySettings::new(SAMPLING_FREQUENCY).with_trial_cache(true);
    cached.append_many(trials[..window].iter().cloned());
    PhaseLagIndex::new().calculate(&mut cached).unwrap();

    group.bench_function("incremental", |b| {
        b.iter(|| {
            cached.remove_first(1).unwrap();
            cached.append(trials[window].clone());
            PhaseLagIndex::new().calculate(&mut cached).unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_accumulation, bench_trial_contribution, bench_sliding_window);
criterion_main!(benches);

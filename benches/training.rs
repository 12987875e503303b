use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use tripcast::prelude::*;

fn create_trips(n_rows: usize) -> Vec<RawObservation> {
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    (0..n_rows)
        .map(|_| {
            let hour: u32 = rng.gen_range(0..24);
            let day: u32 = rng.gen_range(1..29);
            let pickup: (f64, f64) = (rng.gen_range(40.70..40.80), rng.gen_range(-74.02..-73.93));
            let dropoff: (f64, f64) = (rng.gen_range(40.70..40.80), rng.gen_range(-74.02..-73.93));
            let distance: f64 = (pickup.0 - dropoff.0).hypot(pickup.1 - dropoff.1);
            let duration = 240.0 + 40.0 * hour as f64 + 9000.0 * distance + rng.gen::<f64>() * 60.0;

            RawObservation::new(format!("2016-03-{:02} {:02}:15:00", day, hour), pickup, dropoff)
                .with_trip_duration(duration)
        })
        .collect()
}

fn bench_training(c: &mut Criterion) {
    let mut group = c.benchmark_group("training");
    group.sample_size(10); // Fewer samples for training benchmarks

    let registry = ModelRegistry::default().without("neural_network");

    for n_rows in [1000, 5000].iter() {
        let data = DatasetPreparer::new(FeatureSchema::PickupOnly)
            .prepare(&create_trips(*n_rows))
            .unwrap();

        group.bench_with_input(BenchmarkId::new("registry", n_rows), &data, |b, data| {
            b.iter(|| {
                let engine = TrainEngine::new(TrainingConfig::default());
                engine.run(black_box(data), &registry).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_prediction(c: &mut Criterion) {
    let mut group = c.benchmark_group("prediction");

    // Train and publish once
    let data = DatasetPreparer::new(FeatureSchema::PickupOnly)
        .prepare(&create_trips(2000))
        .unwrap();
    let run = TrainEngine::new(TrainingConfig::default())
        .run(&data, &ModelRegistry::default().without("neural_network"))
        .unwrap();
    let dir = tempfile::TempDir::new().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();
    store.publish(&run).unwrap();
    let service = PredictionService::open(store).unwrap();

    let trip = RawObservation::new("2023-06-15T08:30:00Z", (40.7128, -74.0060), (40.7580, -73.9855));

    group.bench_function("single_trip", |b| {
        b.iter(|| service.predict(black_box(&trip)).unwrap())
    });

    group.bench_function("extract", |b| {
        b.iter(|| extract(FeatureSchema::PickupOnly, black_box(&trip)).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_training, bench_prediction);
criterion_main!(benches);

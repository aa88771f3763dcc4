use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ncp_core::{
    Endpoint, TelemetryMetrics, ValidationConfig,
    metrics::{LatencyMetrics, PathHop, PathMetrics},
    validate, validate_connectivity,
};
use std::time::SystemTime;

fn snapshot(samples: &[f64], route: &[&str]) -> TelemetryMetrics {
    let source = Endpoint::new("h1").unwrap();
    let destination = Endpoint::new("h4").unwrap();
    let hops = route
        .iter()
        .zip(1..)
        .map(|(address, index)| PathHop::responded(index, *address, Some(0.2)))
        .collect();

    TelemetryMetrics {
        latency: Some(LatencyMetrics::from_samples(
            source.clone(),
            destination.clone(),
            samples,
            5,
            SystemTime::UNIX_EPOCH,
        )),
        path: Some(PathMetrics::new(source, destination, hops, SystemTime::UNIX_EPOCH).unwrap()),
        ..TelemetryMetrics::default()
    }
}

fn validation(c: &mut Criterion) {
    let rules = ValidationConfig::default();
    let baseline = snapshot(&[1.0, 1.1, 0.9, 1.0, 1.0], &["10.0.1.1", "10.0.2.1", "10.0.4.10"]);
    let current = snapshot(&[4.0, 4.2, 3.9], &["10.0.1.1", "10.0.3.1", "10.0.4.10"]);

    c.bench_function("validate_unchanged", |b| {
        b.iter(|| validate(black_box(&baseline), black_box(&baseline), &rules))
    });
    c.bench_function("validate_changed", |b| {
        b.iter(|| validate(black_box(&baseline), black_box(&current), &rules))
    });
    c.bench_function("validate_connectivity", |b| {
        b.iter(|| validate_connectivity(black_box(&current), &rules))
    });
}

criterion_group!(benches, validation);
criterion_main!(benches);

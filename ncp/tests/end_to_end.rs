use ncp::{
    CollectError, CollectorSettings, Endpoint, KindOutcome, PacketLoss, ProbeFailure, ProbeKind,
    ProbeKinds, SimulatedProber, TelemetryCollector, ValidationConfig, ValidationStatus, validate,
    validate_connectivity,
};
use ncp_core::validation::Check;
use std::time::Duration;

/// h1 -- r1 -- r2 -- h2, 5ms away with a little jitter.
fn lab_network(seed: u64) -> (SimulatedProber, Endpoint, Endpoint) {
    let h1 = Endpoint::new("h1").unwrap();
    let h2 = Endpoint::new("h2").unwrap();

    let network = SimulatedProber::new(seed);
    network.add_node(&h1, "10.0.1.10");
    network.add_node(&h2, "10.0.2.10");
    network
        .configure_link(&h1, &h2)
        .set_latency(Duration::from_millis(5))
        .set_jitter(Duration::from_micros(200))
        .set_route(["10.0.1.1", "10.0.12.2"])
        .apply();

    (network, h1, h2)
}

fn lab(seed: u64) -> (TelemetryCollector<SimulatedProber>, Endpoint, Endpoint) {
    let (network, h1, h2) = lab_network(seed);
    (TelemetryCollector::new(network), h1, h2)
}

#[tokio::test]
async fn unchanged_network_passes() {
    let (collector, h1, h2) = lab(1);

    let baseline = collector.collect(&h1, &h2, ProbeKinds::ALL).await.unwrap();
    let current = collector.collect(&h1, &h2, ProbeKinds::ALL).await.unwrap();

    let result = validate(&baseline, &current, &ValidationConfig::default()).unwrap();
    assert_eq!(result.status, ValidationStatus::Pass, "{result}");
    assert_eq!(result.details.len(), 4);
}

#[tokio::test]
async fn congestion_fails_on_latency() {
    let (collector, h1, h2) = lab(2);
    let baseline = collector.collect(&h1, &h2, ProbeKinds::ALL).await.unwrap();

    collector
        .prober()
        .configure_link(&h1, &h2)
        .set_latency(Duration::from_millis(40))
        .apply();
    let current = collector.collect(&h1, &h2, ProbeKinds::ALL).await.unwrap();

    let result = validate(&baseline, &current, &ValidationConfig::default()).unwrap();
    assert_eq!(result.status, ValidationStatus::Fail);
    assert_eq!(
        result.check(Check::LatencyDelta).map(|c| c.status),
        Some(ValidationStatus::Fail)
    );
    assert!(result.message.contains("latency-delta"), "{}", result.message);
}

#[tokio::test]
async fn outage_fails_on_packet_loss() {
    let (collector, h1, h2) = lab(3);
    let baseline = collector.collect(&h1, &h2, ProbeKinds::ALL).await.unwrap();

    collector
        .prober()
        .configure_link(&h1, &h2)
        .set_packet_loss(PacketLoss::TOTAL)
        .apply();
    let current = collector
        .collect(&h1, &h2, ProbeKinds::only(ProbeKind::Latency))
        .await
        .unwrap();

    let rules = ValidationConfig::default();
    let result = validate(&baseline, &current, &rules).unwrap();
    assert_eq!(result.status, ValidationStatus::Fail);
    assert!(result.message.contains("packet-loss"), "{}", result.message);

    let connectivity = validate_connectivity(&current, &rules).unwrap();
    assert_eq!(connectivity.status, ValidationStatus::Fail);
}

#[tokio::test]
async fn reroute_warns() {
    let (collector, h1, h2) = lab(4);
    let baseline = collector.collect(&h1, &h2, ProbeKinds::ALL).await.unwrap();

    collector
        .prober()
        .configure_link(&h1, &h2)
        .set_route(["10.0.1.1", "10.0.13.3"])
        .apply();
    let current = collector.collect(&h1, &h2, ProbeKinds::ALL).await.unwrap();

    let result = validate(&baseline, &current, &ValidationConfig::default()).unwrap();
    assert_eq!(result.status, ValidationStatus::Warn, "{result}");
    assert_eq!(
        result.message,
        "WARN: path-change: route changed from [10.0.1.1 -> 10.0.12.2 -> 10.0.2.10] (3 hops) \
         to [10.0.1.1 -> 10.0.13.3 -> 10.0.2.10] (3 hops)"
    );

    let strict = ValidationConfig::default().with_path_change_is_warn(false);
    let result = validate(&baseline, &current, &strict).unwrap();
    assert_eq!(result.status, ValidationStatus::Fail);
}

#[tokio::test]
async fn broken_traceroute_leaves_path_absent() {
    let (collector, h1, h2) = lab(5);
    let baseline = collector.collect(&h1, &h2, ProbeKinds::ALL).await.unwrap();

    collector.prober().fail_probe(
        ProbeKind::Path,
        &h1,
        ProbeFailure::tool_unavailable("traceroute", "not found"),
    );
    let current = collector.collect(&h1, &h2, ProbeKinds::ALL).await.unwrap();

    assert!(current.latency.is_some());
    assert!(current.path.is_none());

    let result = validate(&baseline, &current, &ValidationConfig::default()).unwrap();
    assert_eq!(result.status, ValidationStatus::Warn);
    assert_eq!(
        result.details[3],
        "path-change: WARN - path metric missing in current"
    );
}

#[tokio::test]
async fn no_tools_at_all() {
    let (collector, h1, h2) = lab(6);
    for kind in ProbeKind::ALL {
        collector.prober().fail_probe(
            kind,
            &h1,
            ProbeFailure::tool_unavailable("nsenter", "permission denied"),
        );
    }

    let error = collector.collect(&h1, &h2, ProbeKinds::ALL).await.unwrap_err();
    assert!(matches!(
        error,
        CollectError::InfrastructureUnavailable { ref failures } if failures.len() == 3
    ));
}

#[tokio::test]
async fn same_seed_same_verdict() {
    async fn run(seed: u64) -> String {
        let (collector, h1, h2) = lab(seed);
        let baseline = collector.collect(&h1, &h2, ProbeKinds::ALL).await.unwrap();
        collector
            .prober()
            .configure_link(&h1, &h2)
            .set_latency(Duration::from_millis(8))
            .set_packet_loss(PacketLoss::rate(0.2).unwrap())
            .apply();
        let current = collector.collect(&h1, &h2, ProbeKinds::ALL).await.unwrap();
        validate(&baseline, &current, &ValidationConfig::default())
            .unwrap()
            .to_string()
    }

    assert_eq!(run(42).await, run(42).await);
}

#[tokio::test(start_paused = true)]
async fn slow_probe_is_cancelled_by_the_deadline() {
    let (network, h1, h2) = lab_network(7);
    network.delay_probe(ProbeKind::Path, &h1, Duration::from_secs(25));
    let collector = TelemetryCollector::with_settings(
        network,
        CollectorSettings::default().set_deadline(Duration::from_secs(2)),
    );

    let collection = collector
        .collect_detailed(&h1, &h2, ProbeKinds::ALL)
        .await;

    assert_eq!(
        collection.outcome(ProbeKind::Path),
        Some(&KindOutcome::Cancelled)
    );
    assert!(collection.metrics.latency.is_some());
    assert!(!collection.metrics.interfaces.is_empty());
}

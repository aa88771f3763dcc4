use crate::runner::Prober;
use ncp_core::{
    Endpoint, Metric, ParseFailure, ProbeFailure, ProbeKind, ProbeKinds, TelemetryMetrics,
    defaults::{DEFAULT_COLLECTION_DEADLINE, DEFAULT_PROBE_TIMEOUT},
    parser,
};
use std::{
    fmt,
    time::{Duration, SystemTime},
};
use thiserror::Error;
use tokio::time::{Instant, timeout_at};
use tracing::{info, warn};

/// Time budgets of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorSettings {
    /// Time budget of every single probe.
    pub probe_timeout: Duration,
    /// Time budget of the whole collection. The probes still running
    /// when it expires are cancelled.
    pub deadline: Option<Duration>,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            deadline: DEFAULT_COLLECTION_DEADLINE,
        }
    }
}

impl CollectorSettings {
    pub fn set_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    pub fn set_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// What became of one requested kind of metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindOutcome {
    Collected,
    ProbeFailed(ProbeFailure),
    Unparseable(ParseFailure),
    /// The collection deadline expired before the probe completed.
    Cancelled,
}

impl KindOutcome {
    pub fn is_collected(&self) -> bool {
        matches!(self, Self::Collected)
    }
}

impl fmt::Display for KindOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collected => f.write_str("collected"),
            Self::ProbeFailed(failure) => write!(f, "probe failed: {failure}"),
            Self::Unparseable(failure) => write!(f, "unparseable: {failure}"),
            Self::Cancelled => f.write_str("cancelled by the collection deadline"),
        }
    }
}

/// A snapshot along with the fate of every requested kind of metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    pub metrics: TelemetryMetrics,
    /// One entry per requested kind, in the fixed order of [`ProbeKind`].
    pub outcomes: Vec<(ProbeKind, KindOutcome)>,
}

impl Collection {
    pub fn outcome(&self, kind: ProbeKind) -> Option<&KindOutcome> {
        self.outcomes
            .iter()
            .find_map(|(k, outcome)| (*k == kind).then_some(outcome))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectError {
    #[error("probe infrastructure unavailable: {}", describe(.failures))]
    InfrastructureUnavailable {
        failures: Vec<(ProbeKind, ProbeFailure)>,
    },
}

fn describe(failures: &[(ProbeKind, ProbeFailure)]) -> String {
    failures
        .iter()
        .map(|(kind, failure)| format!("{kind}: {failure}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Collect telemetry snapshots between pairs of nodes.
///
/// The collector holds no state between calls: collecting twice with the
/// same prober is two independent collections.
///
/// ```
/// use ncp::{SimulatedProber, TelemetryCollector};
/// use ncp_core::ProbeKinds;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let h1 = "h1".parse().unwrap();
/// let h2 = "h2".parse().unwrap();
/// let network = SimulatedProber::new(0);
/// network.add_node(&h1, "10.0.0.1");
/// network.add_node(&h2, "10.0.0.2");
/// network.configure_link(&h1, &h2).apply();
///
/// let collector = TelemetryCollector::new(network);
/// let snapshot = collector.collect(&h1, &h2, ProbeKinds::ALL).await.unwrap();
/// assert!(snapshot.latency.is_some());
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TelemetryCollector<P> {
    prober: P,
    settings: CollectorSettings,
}

impl<P: Prober> TelemetryCollector<P> {
    pub fn new(prober: P) -> Self {
        Self::with_settings(prober, CollectorSettings::default())
    }

    pub fn with_settings(prober: P, settings: CollectorSettings) -> Self {
        Self { prober, settings }
    }

    pub fn prober(&self) -> &P {
        &self.prober
    }

    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }

    /// Collect a snapshot of the `requested` metrics from `source` to
    /// `destination`.
    ///
    /// A metric that could not be collected is absent from the snapshot.
    ///
    /// # Errors
    ///
    /// Fails only if every requested probe reported its tool as
    /// unavailable: there is no probing infrastructure to speak of.
    pub async fn collect(
        &self,
        source: &Endpoint,
        destination: &Endpoint,
        requested: ProbeKinds,
    ) -> Result<TelemetryMetrics, CollectError> {
        let Collection { metrics, outcomes } =
            self.collect_detailed(source, destination, requested).await;

        let failures: Vec<(ProbeKind, ProbeFailure)> = outcomes
            .iter()
            .filter_map(|(kind, outcome)| match outcome {
                KindOutcome::ProbeFailed(failure @ ProbeFailure::ToolUnavailable { .. }) => {
                    Some((*kind, failure.clone()))
                }
                _ => None,
            })
            .collect();

        if !outcomes.is_empty() && failures.len() == outcomes.len() {
            return Err(CollectError::InfrastructureUnavailable { failures });
        }

        Ok(metrics)
    }

    /// Same as [`collect`](Self::collect) but also reports what happened
    /// to every requested kind of metric, and never fails.
    ///
    /// The probes run concurrently. Every collected metric is stamped
    /// with the time the collection started.
    pub async fn collect_detailed(
        &self,
        source: &Endpoint,
        destination: &Endpoint,
        requested: ProbeKinds,
    ) -> Collection {
        let collected_at = SystemTime::now();
        let deadline = self.settings.deadline.map(|deadline| Instant::now() + deadline);

        let probe = |kind: ProbeKind| async move {
            if !requested.contains(kind) {
                return None;
            }
            Some(
                self.probe(kind, source, destination, collected_at, deadline)
                    .await,
            )
        };

        let (latency, path, interfaces) = tokio::join!(
            probe(ProbeKind::Latency),
            probe(ProbeKind::Path),
            probe(ProbeKind::Interfaces),
        );

        let mut metrics = TelemetryMetrics::new();
        let mut outcomes = Vec::with_capacity(requested.len());
        for (kind, result) in [
            (ProbeKind::Latency, latency),
            (ProbeKind::Path, path),
            (ProbeKind::Interfaces, interfaces),
        ] {
            let outcome = match result {
                None => continue,
                Some(Ok(metric)) => {
                    metrics.insert(metric);
                    KindOutcome::Collected
                }
                Some(Err(outcome)) => outcome,
            };
            outcomes.push((kind, outcome));
        }

        Collection { metrics, outcomes }
    }

    async fn probe(
        &self,
        kind: ProbeKind,
        source: &Endpoint,
        destination: &Endpoint,
        collected_at: SystemTime,
        deadline: Option<Instant>,
    ) -> Result<Metric, KindOutcome> {
        let probe_timeout = self.settings.probe_timeout;
        let probe_deadline = Instant::now() + probe_timeout;
        let (limit, cancelling) = match deadline {
            Some(deadline) if deadline < probe_deadline => (deadline, true),
            _ => (probe_deadline, false),
        };

        let run = self.prober.run(kind, source, destination, probe_timeout);
        let raw = match timeout_at(limit, run).await {
            Ok(raw) => raw,
            Err(_elapsed) if cancelling => {
                warn!(%kind, %source, %destination, "probe cancelled by the collection deadline");
                return Err(KindOutcome::Cancelled);
            }
            Err(_elapsed) => Err(ProbeFailure::Timeout {
                after: probe_timeout,
            }),
        };

        let raw = raw.map_err(|failure| {
            warn!(%kind, %source, %destination, %failure, "probe failed");
            KindOutcome::ProbeFailed(failure)
        })?;

        let metric = parser::parse(&raw, collected_at).map_err(|failure| {
            warn!(%kind, %source, %destination, %failure, "probe output unparseable");
            KindOutcome::Unparseable(failure)
        })?;

        info!(%kind, %source, %destination, "probe collected");
        Ok(metric)
    }
}

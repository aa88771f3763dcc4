//! The telemetry data model.
//!
//! A [`TelemetryMetrics`] is a snapshot of what could be measured between
//! two nodes at a given time. A metric that could not be measured is
//! absent rather than zeroed, and its absence is meaningful to the
//! validation.

mod interface;
mod latency;
mod path;

pub use self::{
    interface::{CounterDelta, InterfaceCounter},
    latency::{LatencyMetrics, LatencyMetricsError, RttStats},
    path::{HopIndexError, PathHop, PathMetrics},
};
use crate::ProbeKind;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// A single parsed measurement, as produced by the parser for one probe.
#[derive(Debug, Clone, PartialEq)]
pub enum Metric {
    Latency(LatencyMetrics),
    Path(PathMetrics),
    Interfaces(Vec<InterfaceCounter>),
}

impl Metric {
    pub fn kind(&self) -> ProbeKind {
        match self {
            Metric::Latency(_) => ProbeKind::Latency,
            Metric::Path(_) => ProbeKind::Path,
            Metric::Interfaces(_) => ProbeKind::Interfaces,
        }
    }
}

/// Snapshot of the telemetry between two nodes.
///
/// The snapshot is owned by whoever asked for the collection and is
/// handed, by reference, to the validation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TelemetryMetrics {
    #[serde(default)]
    pub latency: Option<LatencyMetrics>,
    #[serde(default)]
    pub path: Option<PathMetrics>,
    /// Counters of the source node, by interface name. Empty when the
    /// counters were not collected.
    #[serde(default)]
    pub interfaces: BTreeMap<String, InterfaceCounter>,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the metric in its slot, replacing any previous value.
    pub fn insert(&mut self, metric: Metric) {
        match metric {
            Metric::Latency(latency) => self.latency = Some(latency),
            Metric::Path(path) => self.path = Some(path),
            Metric::Interfaces(counters) => {
                self.interfaces = counters
                    .into_iter()
                    .map(|counter| (counter.interface_name.clone(), counter))
                    .collect();
            }
        }
    }

    pub fn has(&self, kind: ProbeKind) -> bool {
        match kind {
            ProbeKind::Latency => self.latency.is_some(),
            ProbeKind::Path => self.path.is_some(),
            ProbeKind::Interfaces => !self.interfaces.is_empty(),
        }
    }

    pub fn is_empty(&self) -> bool {
        ProbeKind::ALL.into_iter().all(|kind| !self.has(kind))
    }
}

impl fmt::Display for TelemetryMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.latency {
            Some(latency) => writeln!(f, "latency: {latency}")?,
            None => writeln!(f, "latency: absent")?,
        }
        match &self.path {
            Some(path) => writeln!(f, "path: {path}")?,
            None => writeln!(f, "path: absent")?,
        }
        if self.interfaces.is_empty() {
            write!(f, "interfaces: absent")
        } else {
            write!(f, "interfaces: {}", self.interfaces.len())?;
            for counter in self.interfaces.values() {
                write!(f, "\n  {counter}")?;
            }
            Ok(())
        }
    }
}

use crate::Endpoint;
use serde::{Deserialize, Serialize};
use std::{fmt, time::SystemTime};
use thiserror::Error;

/// One hop of the route between two nodes.
///
/// A hop where no router answered before the probe gave up still
/// occupies its index, with neither `address` nor `rtt_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathHop {
    /// 1-based position of the hop on the route.
    pub hop_index: u32,
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub rtt_ms: Option<f64>,
}

impl PathHop {
    pub fn responded(hop_index: u32, address: impl Into<String>, rtt_ms: Option<f64>) -> Self {
        Self {
            hop_index,
            address: Some(address.into()),
            hostname: None,
            rtt_ms,
        }
    }

    pub fn no_response(hop_index: u32) -> Self {
        Self {
            hop_index,
            address: None,
            hostname: None,
            rtt_ms: None,
        }
    }

    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// What identifies a hop when comparing two routes.
    pub fn key(&self) -> (u32, Option<&str>) {
        (self.hop_index, self.address.as_deref())
    }
}

impl fmt::Display for PathHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>2}  ", self.hop_index)?;
        match (&self.address, &self.hostname) {
            (None, _) => return f.write_str("*"),
            (Some(address), Some(hostname)) => write!(f, "{hostname} ({address})")?,
            (Some(address), None) => f.write_str(address)?,
        }
        match self.rtt_ms {
            Some(rtt) => write!(f, "  {rtt:.3} ms"),
            None => f.write_str("  *"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("hop #{position} has index {found}, expecting {expected}")]
pub struct HopIndexError {
    position: usize,
    expected: u32,
    found: u32,
}

/// The route between two nodes, as discovered from `source`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PathMetricsRepr", into = "PathMetricsRepr")]
pub struct PathMetrics {
    source: Endpoint,
    destination: Endpoint,
    hops: Vec<PathHop>,
    collected_at: SystemTime,
}

impl PathMetrics {
    /// # Errors
    ///
    /// The hop indices must be `1, 2, 3, ...` with no gap.
    pub fn new(
        source: Endpoint,
        destination: Endpoint,
        hops: Vec<PathHop>,
        collected_at: SystemTime,
    ) -> Result<Self, HopIndexError> {
        for (position, (hop, expected)) in hops.iter().zip(1..).enumerate() {
            if hop.hop_index != expected {
                return Err(HopIndexError {
                    position,
                    expected,
                    found: hop.hop_index,
                });
            }
        }

        Ok(Self {
            source,
            destination,
            hops,
            collected_at,
        })
    }

    pub fn source(&self) -> &Endpoint {
        &self.source
    }

    pub fn destination(&self) -> &Endpoint {
        &self.destination
    }

    pub fn hops(&self) -> &[PathHop] {
        &self.hops
    }

    pub fn total_hops(&self) -> usize {
        self.hops.len()
    }

    pub fn collected_at(&self) -> SystemTime {
        self.collected_at
    }

    /// `true` if both routes go through the same addresses in the same
    /// order. Round trip times and hostnames are ignored.
    pub fn same_route(&self, other: &Self) -> bool {
        self.hops.len() == other.hops.len()
            && self
                .hops
                .iter()
                .zip(&other.hops)
                .all(|(a, b)| a.key() == b.key())
    }

    /// The addresses along the route, `*` for silent hops.
    pub fn route(&self) -> String {
        self.hops
            .iter()
            .map(|hop| hop.address.as_deref().unwrap_or("*"))
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

impl fmt::Display for PathMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}: {} hops",
            self.source,
            self.destination,
            self.total_hops()
        )?;
        for hop in &self.hops {
            write!(f, "\n  {hop}")?;
        }
        Ok(())
    }
}

/// Serialized form of [`PathMetrics`]: carries `total_hops` for the
/// readers of the JSON and goes back through [`PathMetrics::new`] when
/// loaded.
#[derive(Serialize, Deserialize)]
struct PathMetricsRepr {
    source: Endpoint,
    destination: Endpoint,
    hops: Vec<PathHop>,
    total_hops: usize,
    collected_at: SystemTime,
}

impl From<PathMetrics> for PathMetricsRepr {
    fn from(value: PathMetrics) -> Self {
        Self {
            total_hops: value.total_hops(),
            source: value.source,
            destination: value.destination,
            hops: value.hops,
            collected_at: value.collected_at,
        }
    }
}

impl TryFrom<PathMetricsRepr> for PathMetrics {
    type Error = HopIndexError;
    fn try_from(value: PathMetricsRepr) -> Result<Self, Self::Error> {
        Self::new(value.source, value.destination, value.hops, value.collected_at)
    }
}

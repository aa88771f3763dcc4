use crate::Endpoint;
use serde::{Deserialize, Serialize};
use std::{fmt, time::SystemTime};
use thiserror::Error;

/// Round trip time statistics over the echo replies that came back.
///
/// Always satisfies `0 <= min_ms <= avg_ms <= max_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RttStats {
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
}

impl RttStats {
    /// Summarise the given round trip samples.
    ///
    /// Returns `None` if there is no sample or if one of them is negative
    /// or not a number.
    ///
    /// ```
    /// # use ncp_core::metrics::RttStats;
    /// let stats = RttStats::from_samples(&[0.5, 1.5, 1.0]).unwrap();
    /// assert_eq!(stats.min_ms, 0.5);
    /// assert_eq!(stats.avg_ms, 1.0);
    /// assert_eq!(stats.max_ms, 1.5);
    ///
    /// assert!(RttStats::from_samples(&[]).is_none());
    /// ```
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() || samples.iter().any(|s| !(s.is_finite() && *s >= 0.0)) {
            return None;
        }

        let min_ms = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max_ms = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let sum: f64 = samples.iter().sum();
        // the rounding of the sum may push the mean just outside of the
        // observed range (e.g. three samples of 0.1)
        let avg_ms = (sum / samples.len() as f64).clamp(min_ms, max_ms);

        Some(Self {
            min_ms,
            avg_ms,
            max_ms,
        })
    }

    fn is_ordered(&self) -> bool {
        0.0 <= self.min_ms && self.min_ms <= self.avg_ms && self.avg_ms <= self.max_ms
    }
}

/// A deserialized [`LatencyMetrics`] that contradicts itself.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LatencyMetricsError {
    #[error("packet loss {0}% is not within [0%, 100%]")]
    LossOutOfRange(f64),
    #[error("round trip times given with 100% packet loss")]
    RttWithoutReply,
    #[error("no round trip time given with {0}% packet loss")]
    MissingRtt(f64),
    #[error("round trip times min/avg/max = {min_ms}/{avg_ms}/{max_ms} are not ordered")]
    UnorderedRtt { min_ms: f64, avg_ms: f64, max_ms: f64 },
    #[error("{received} replies received for {transmitted} requests")]
    TooManyReplies { transmitted: u32, received: u32 },
}

/// Latency and packet loss between two nodes, as seen from `source`.
///
/// Loaded snapshots are checked against the same rules
/// [`from_counts`](Self::from_counts) builds with: the loss is within
/// `[0, 100]` and round trip times are present exactly when some reply
/// came back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LatencyMetricsRepr")]
pub struct LatencyMetrics {
    pub source: Endpoint,
    pub destination: Endpoint,
    /// `None` when no reply came back (100% packet loss): there is
    /// nothing to compute a round trip time from.
    pub rtt: Option<RttStats>,
    pub packets_transmitted: u32,
    pub packets_received: u32,
    pub packet_loss_percent: f64,
    pub collected_at: SystemTime,
}

impl LatencyMetrics {
    /// Build the metrics from the per-packet round trip times of the
    /// replies and the number of echo requests sent.
    ///
    /// The loss is derived from `transmitted` and the number of samples.
    /// Without any sample the loss is 100%, even if nothing was
    /// transmitted.
    pub fn from_samples(
        source: Endpoint,
        destination: Endpoint,
        samples: &[f64],
        transmitted: u32,
        collected_at: SystemTime,
    ) -> Self {
        let received = u32::try_from(samples.len()).unwrap_or(u32::MAX);
        Self::from_counts(
            source,
            destination,
            RttStats::from_samples(samples),
            transmitted,
            received,
            collected_at,
        )
    }

    /// Build the metrics from already summarised statistics and the
    /// packet counts reported by the probe.
    ///
    /// Replies without statistics are not accounted for: the metrics
    /// never claim a loss below 100% without a round trip time to show
    /// for it.
    pub fn from_counts(
        source: Endpoint,
        destination: Endpoint,
        rtt: Option<RttStats>,
        transmitted: u32,
        received: u32,
        collected_at: SystemTime,
    ) -> Self {
        let (rtt, received) = match rtt {
            Some(rtt) if received > 0 => (Some(rtt), received),
            _ => (None, 0),
        };
        let transmitted = transmitted.max(received);
        let packet_loss_percent = match rtt {
            None => 100.0,
            Some(_) => f64::from(transmitted - received) * 100.0 / f64::from(transmitted),
        };

        Self {
            source,
            destination,
            rtt,
            packets_transmitted: transmitted,
            packets_received: received,
            packet_loss_percent,
            collected_at,
        }
    }

    /// `true` if not a single reply came back.
    pub fn is_unreachable(&self) -> bool {
        self.rtt.is_none()
    }

    pub fn min_ms(&self) -> Option<f64> {
        self.rtt.map(|rtt| rtt.min_ms)
    }

    pub fn avg_ms(&self) -> Option<f64> {
        self.rtt.map(|rtt| rtt.avg_ms)
    }

    pub fn max_ms(&self) -> Option<f64> {
        self.rtt.map(|rtt| rtt.max_ms)
    }
}

#[derive(Deserialize)]
struct LatencyMetricsRepr {
    source: Endpoint,
    destination: Endpoint,
    rtt: Option<RttStats>,
    packets_transmitted: u32,
    packets_received: u32,
    packet_loss_percent: f64,
    collected_at: SystemTime,
}

impl TryFrom<LatencyMetricsRepr> for LatencyMetrics {
    type Error = LatencyMetricsError;

    fn try_from(value: LatencyMetricsRepr) -> Result<Self, Self::Error> {
        let loss = value.packet_loss_percent;
        if !(0.0..=100.0).contains(&loss) {
            return Err(LatencyMetricsError::LossOutOfRange(loss));
        }
        if value.packets_received > value.packets_transmitted {
            return Err(LatencyMetricsError::TooManyReplies {
                transmitted: value.packets_transmitted,
                received: value.packets_received,
            });
        }
        match value.rtt {
            Some(_) if loss >= 100.0 || value.packets_received == 0 => {
                return Err(LatencyMetricsError::RttWithoutReply);
            }
            Some(rtt) if !rtt.is_ordered() => {
                return Err(LatencyMetricsError::UnorderedRtt {
                    min_ms: rtt.min_ms,
                    avg_ms: rtt.avg_ms,
                    max_ms: rtt.max_ms,
                });
            }
            None if loss < 100.0 => return Err(LatencyMetricsError::MissingRtt(loss)),
            _ => (),
        }

        Ok(Self {
            source: value.source,
            destination: value.destination,
            rtt: value.rtt,
            packets_transmitted: value.packets_transmitted,
            packets_received: value.packets_received,
            packet_loss_percent: loss,
            collected_at: value.collected_at,
        })
    }
}

impl fmt::Display for LatencyMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}: ", self.source, self.destination)?;
        match self.rtt {
            Some(rtt) => write!(
                f,
                "rtt min/avg/max = {:.3}/{:.3}/{:.3} ms, ",
                rtt.min_ms, rtt.avg_ms, rtt.max_ms
            )?,
            None => write!(f, "no reply, ")?,
        }
        write!(
            f,
            "{}/{} received, {:.2}% packet loss",
            self.packets_received, self.packets_transmitted, self.packet_loss_percent
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng as _, SeedableRng as _, rngs::StdRng};

    fn endpoints() -> (Endpoint, Endpoint) {
        (Endpoint::new("h1").unwrap(), Endpoint::new("h2").unwrap())
    }

    #[test]
    fn stats_ordered_for_random_samples() {
        let mut rng = StdRng::seed_from_u64(0x6e6370);
        for _ in 0..1_000 {
            let len = rng.gen_range(1..20);
            let samples: Vec<f64> = (0..len).map(|_| rng.gen_range(0.0..250.0)).collect();
            let stats = RttStats::from_samples(&samples).unwrap();
            assert!(0.0 <= stats.min_ms, "{stats:?}");
            assert!(stats.min_ms <= stats.avg_ms, "{stats:?}");
            assert!(stats.avg_ms <= stats.max_ms, "{stats:?}");
        }
    }

    #[test]
    fn stats_identical_samples_stay_in_range() {
        let stats = RttStats::from_samples(&[0.1, 0.1, 0.1]).unwrap();
        assert_eq!(stats.avg_ms, 0.1);
    }

    #[test]
    fn stats_reject_invalid_samples() {
        assert!(RttStats::from_samples(&[1.0, -0.5]).is_none());
        assert!(RttStats::from_samples(&[f64::NAN]).is_none());
        assert!(RttStats::from_samples(&[f64::INFINITY]).is_none());
    }

    #[test]
    fn partial_loss() {
        let (h1, h2) = endpoints();
        let metrics =
            LatencyMetrics::from_samples(h1, h2, &[1.0, 2.0, 3.0, 4.0], 5, SystemTime::UNIX_EPOCH);
        assert_eq!(metrics.packet_loss_percent, 20.0);
        assert_eq!(metrics.avg_ms(), Some(2.5));
        assert!(!metrics.is_unreachable());
    }

    #[test]
    fn no_reply_is_total_loss_without_stats() {
        let (h1, h2) = endpoints();
        let metrics = LatencyMetrics::from_samples(h1, h2, &[], 5, SystemTime::UNIX_EPOCH);
        assert_eq!(metrics.packet_loss_percent, 100.0);
        assert_eq!(metrics.rtt, None);
        assert_eq!(metrics.min_ms(), None);
        assert!(metrics.is_unreachable());
    }

    #[test]
    fn nothing_transmitted_is_total_loss() {
        let (h1, h2) = endpoints();
        let metrics = LatencyMetrics::from_samples(h1, h2, &[], 0, SystemTime::UNIX_EPOCH);
        assert_eq!(metrics.packet_loss_percent, 100.0);
    }

    #[test]
    fn more_replies_than_requests_is_no_loss() {
        let (h1, h2) = endpoints();
        let metrics = LatencyMetrics::from_samples(h1, h2, &[1.0, 1.0], 1, SystemTime::UNIX_EPOCH);
        assert_eq!(metrics.packets_transmitted, 2);
        assert_eq!(metrics.packet_loss_percent, 0.0);
    }

    fn from_json(rtt: &str, received: u32, loss: &str) -> Result<LatencyMetrics, String> {
        let json = format!(
            r#"{{"source":"h1","destination":"h2","rtt":{rtt},"packets_transmitted":5,"packets_received":{received},"packet_loss_percent":{loss},"collected_at":{{"secs_since_epoch":0,"nanos_since_epoch":0}}}}"#
        );
        serde_json::from_str(&json).map_err(|error| error.to_string())
    }

    const RTT: &str = r#"{"min_ms":1.0,"avg_ms":2.0,"max_ms":3.0}"#;

    #[test]
    fn loaded_metrics_round_trip() {
        let (h1, h2) = endpoints();
        let metrics =
            LatencyMetrics::from_samples(h1, h2, &[1.0, 2.0, 3.0], 5, SystemTime::UNIX_EPOCH);
        let json = serde_json::to_string(&metrics).unwrap();
        assert_eq!(serde_json::from_str::<LatencyMetrics>(&json).unwrap(), metrics);

        assert!(from_json(RTT, 3, "40.0").is_ok());
        assert!(from_json("null", 0, "100.0").is_ok());
    }

    #[test]
    fn loaded_metrics_are_checked() {
        let error = from_json(RTT, 0, "100.0").unwrap_err();
        assert!(error.contains("100% packet loss"), "{error}");

        let error = from_json(RTT, 3, "-50.0").unwrap_err();
        assert!(error.contains("not within"), "{error}");

        let error = from_json(RTT, 3, "150.0").unwrap_err();
        assert!(error.contains("not within"), "{error}");

        let error = from_json("null", 3, "40.0").unwrap_err();
        assert!(error.contains("no round trip time"), "{error}");

        let error = from_json(r#"{"min_ms":3.0,"avg_ms":2.0,"max_ms":1.0}"#, 3, "40.0")
            .unwrap_err();
        assert!(error.contains("not ordered"), "{error}");

        let error = from_json(RTT, 6, "0.0").unwrap_err();
        assert!(error.contains("6 replies received for 5 requests"), "{error}");
    }

    #[test]
    fn display() {
        let (h1, h2) = endpoints();
        let metrics = LatencyMetrics::from_samples(h1, h2, &[1.0, 3.0], 2, SystemTime::UNIX_EPOCH);
        assert_eq!(
            metrics.to_string(),
            "h1 -> h2: rtt min/avg/max = 1.000/2.000/3.000 ms, 2/2 received, 0.00% packet loss"
        );
    }
}

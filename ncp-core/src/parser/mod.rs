//! Turn the raw output of a probe into a [`Metric`].
//!
//! Diagnostic tools are chatty and their output is not always complete:
//! a probe may have been cut short, a line may be garbled. The parsers
//! keep whatever can be understood and skip the rest (with a log event).
//! Only an output from which nothing at all can be understood is an
//! error.
//!
//! Parsing is a pure function of the raw output and of the collection
//! time it is given.

mod lexer;
mod ping;
mod proc_net_dev;
mod traceroute;

use crate::{ProbeKind, RawProbeOutput, metrics::Metric};
use std::time::SystemTime;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("no {kind} record could be parsed from the probe output")]
    NoRecords { kind: ProbeKind },
}

/// Parse the raw output of a probe, according to its [`ProbeKind`].
///
/// Every parsed record is stamped with `collected_at`.
///
/// ```
/// # use ncp_core::{Endpoint, ProbeKind, RawProbeOutput, metrics::Metric, parser};
/// # use std::time::SystemTime;
/// let raw = RawProbeOutput::new(
///     ProbeKind::Latency,
///     "h1".parse().unwrap(),
///     "h2".parse().unwrap(),
///     "64 bytes from 10.0.0.2: icmp_seq=1 ttl=64 time=0.250 ms\n",
/// );
/// let Metric::Latency(latency) = parser::parse(&raw, SystemTime::now()).unwrap() else {
///     unreachable!()
/// };
/// assert_eq!(latency.avg_ms(), Some(0.25));
/// ```
pub fn parse(raw: &RawProbeOutput, collected_at: SystemTime) -> Result<Metric, ParseFailure> {
    let no_records = ParseFailure::NoRecords { kind: raw.kind };

    match raw.kind {
        ProbeKind::Latency => ping::parse(raw, collected_at)
            .map(Metric::Latency)
            .ok_or(no_records),
        ProbeKind::Path => traceroute::parse(raw, collected_at)
            .map(Metric::Path)
            .ok_or(no_records),
        ProbeKind::Interfaces => {
            let counters = proc_net_dev::parse(raw, collected_at);
            if counters.is_empty() {
                Err(no_records)
            } else {
                Ok(Metric::Interfaces(counters))
            }
        }
    }
}

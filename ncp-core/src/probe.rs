//! What a probe is asked to measure and what it hands back before
//! parsing.

use crate::Endpoint;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};
use thiserror::Error;

/// The kind of diagnostic measurement a probe performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// Round trip time and packet loss (`ping`).
    Latency,
    /// Hop by hop route to the destination (`traceroute`).
    Path,
    /// Interface counters of the source node (`/proc/net/dev`).
    Interfaces,
}

impl ProbeKind {
    /// Every kind, in the order snapshots are assembled and rendered.
    pub const ALL: [ProbeKind; 3] = [ProbeKind::Latency, ProbeKind::Path, ProbeKind::Interfaces];

    pub const fn as_str(self) -> &'static str {
        match self {
            ProbeKind::Latency => "latency",
            ProbeKind::Path => "path",
            ProbeKind::Interfaces => "interfaces",
        }
    }

    const fn bit(self) -> u8 {
        match self {
            ProbeKind::Latency => 0b001,
            ProbeKind::Path => 0b010,
            ProbeKind::Interfaces => 0b100,
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown probe kind `{0}', expecting latency, path or interfaces")]
pub struct UnknownProbeKind(String);

impl FromStr for ProbeKind {
    type Err = UnknownProbeKind;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "latency" => Ok(ProbeKind::Latency),
            "path" => Ok(ProbeKind::Path),
            "interfaces" => Ok(ProbeKind::Interfaces),
            other => Err(UnknownProbeKind(other.to_owned())),
        }
    }
}

/// A set of [`ProbeKind`]: what a collection is asked to measure.
///
/// ```
/// # use ncp_core::{ProbeKind, ProbeKinds};
/// let kinds: ProbeKinds = "latency,path".parse().unwrap();
/// assert!(kinds.contains(ProbeKind::Path));
/// assert!(!kinds.contains(ProbeKind::Interfaces));
/// assert_eq!(kinds.to_string(), "latency,path");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProbeKinds(u8);

impl ProbeKinds {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(0b111);

    pub const fn only(kind: ProbeKind) -> Self {
        Self(kind.bit())
    }

    #[must_use = "function does not modify the current value"]
    pub const fn with(self, kind: ProbeKind) -> Self {
        Self(self.0 | kind.bit())
    }

    pub fn insert(&mut self, kind: ProbeKind) {
        self.0 |= kind.bit();
    }

    pub const fn contains(self, kind: ProbeKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterate over the kinds of the set, in [`ProbeKind::ALL`] order.
    pub fn iter(self) -> impl Iterator<Item = ProbeKind> {
        ProbeKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

impl FromIterator<ProbeKind> for ProbeKinds {
    fn from_iter<I: IntoIterator<Item = ProbeKind>>(iter: I) -> Self {
        let mut kinds = Self::NONE;
        for kind in iter {
            kinds.insert(kind);
        }
        kinds
    }
}

impl FromStr for ProbeKinds {
    type Err = UnknownProbeKind;

    /// Comma separated list of kinds, or `all`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == "all" {
            return Ok(Self::ALL);
        }
        s.split(',')
            .filter(|item| !item.trim().is_empty())
            .map(ProbeKind::from_str)
            .collect()
    }
}

impl fmt::Display for ProbeKinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, kind) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            kind.fmt(f)?;
        }
        Ok(())
    }
}

/// The untouched output of a probe that ran to completion.
///
/// Running to completion does not mean the probe succeeded: a `ping`
/// towards an unreachable destination completes with every request
/// lost, and this is valid latency data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawProbeOutput {
    pub kind: ProbeKind,
    pub source: Endpoint,
    pub destination: Endpoint,
    pub stdout: String,
    pub stderr: String,
}

impl RawProbeOutput {
    pub fn new(kind: ProbeKind, source: Endpoint, destination: Endpoint, stdout: impl Into<String>) -> Self {
        Self {
            kind,
            source,
            destination,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    #[must_use]
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }
}

/// Why a probe could not produce any output.
///
/// This is never fatal to a collection: the corresponding metric is
/// simply absent from the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeFailure {
    #[error("probe did not complete within {after:?}")]
    Timeout { after: Duration },
    #[error("diagnostic tool `{tool}' unavailable: {reason}")]
    ToolUnavailable { tool: String, reason: String },
    #[error("no execution context known for node `{endpoint}'")]
    UnresolvedContext { endpoint: Endpoint },
}

impl ProbeFailure {
    pub fn tool_unavailable(tool: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::ToolUnavailable {
            tool: tool.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_iterate_in_fixed_order() {
        let kinds = ProbeKinds::only(ProbeKind::Interfaces).with(ProbeKind::Latency);
        assert_eq!(
            kinds.iter().collect::<Vec<_>>(),
            vec![ProbeKind::Latency, ProbeKind::Interfaces]
        );
        assert_eq!(kinds.len(), 2);
    }

    #[test]
    fn parse_kinds() {
        assert_eq!("all".parse::<ProbeKinds>().unwrap(), ProbeKinds::ALL);
        assert_eq!(
            "path, latency".parse::<ProbeKinds>().unwrap(),
            ProbeKinds::only(ProbeKind::Latency).with(ProbeKind::Path)
        );
        assert_eq!("".parse::<ProbeKinds>().unwrap(), ProbeKinds::NONE);
        assert!("latency,bandwidth".parse::<ProbeKinds>().is_err());
    }

    #[test]
    fn display_kinds() {
        assert_eq!(ProbeKinds::ALL.to_string(), "latency,path,interfaces");
        assert_eq!(ProbeKinds::NONE.to_string(), "");
    }

    #[test]
    fn failure_display() {
        let failure = ProbeFailure::tool_unavailable("traceroute", "No such file or directory");
        assert_eq!(
            failure.to_string(),
            "diagnostic tool `traceroute' unavailable: No such file or directory"
        );
    }
}

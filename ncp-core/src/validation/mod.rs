//! Compare two telemetry snapshots and decide whether the network
//! behaviour changed meaningfully between them.
//!
//! The validation is a pure function of its inputs: the same baseline,
//! current snapshot and rules always give the same [`ValidationResult`],
//! byte for byte.
//!
//! ```
//! use ncp_core::{
//!     Endpoint,
//!     metrics::{LatencyMetrics, TelemetryMetrics},
//!     validation::{self, ValidationConfig, ValidationStatus},
//! };
//! use std::time::SystemTime;
//!
//! let snapshot = |samples: &[f64]| TelemetryMetrics {
//!     latency: Some(LatencyMetrics::from_samples(
//!         Endpoint::new("h1").unwrap(),
//!         Endpoint::new("h2").unwrap(),
//!         samples,
//!         samples.len() as u32,
//!         SystemTime::now(),
//!     )),
//!     ..TelemetryMetrics::default()
//! };
//!
//! let baseline = snapshot(&[10.0, 10.0]);
//! let current = snapshot(&[13.0, 13.0]);
//!
//! let result = validation::validate(&baseline, &current, &ValidationConfig::default()).unwrap();
//! assert_eq!(result.status, ValidationStatus::Warn);
//! ```

mod config;
mod engine;

pub use self::{
    config::{ValidationConfig, ValidationConfigError},
    engine::{validate, validate_connectivity},
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a check, or of the whole validation.
///
/// Ordered from the mildest to the most severe so the overall status is
/// the maximum of the checks'.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationStatus {
    #[default]
    Pass,
    Warn,
    Fail,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Warn => "WARN",
            Self::Fail => "FAIL",
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Check {
    LatencyPresence,
    PacketLoss,
    LatencyDelta,
    PathChange,
    Connectivity,
}

impl Check {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LatencyPresence => "latency-presence",
            Self::PacketLoss => "packet-loss",
            Self::LatencyDelta => "latency-delta",
            Self::PathChange => "path-change",
            Self::Connectivity => "connectivity",
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The verdict of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub check: Check,
    pub status: ValidationStatus,
    pub detail: String,
}

impl CheckOutcome {
    pub(crate) fn new(check: Check, status: ValidationStatus, detail: impl Into<String>) -> Self {
        Self {
            check,
            status,
            detail: detail.into(),
        }
    }

    pub(crate) fn pass(check: Check, detail: impl Into<String>) -> Self {
        Self::new(check, ValidationStatus::Pass, detail)
    }

    pub(crate) fn not_evaluated(check: Check, reason: impl fmt::Display) -> Self {
        Self::pass(check, format!("not evaluated: {reason}"))
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} - {}", self.check, self.status, self.detail)
    }
}

/// Outcome of a validation.
///
/// `details[i]` is the rendering of `checks[i]`, and the checks are
/// always listed in the same order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub message: String,
    pub details: Vec<String>,
    pub checks: Vec<CheckOutcome>,
}

impl ValidationResult {
    pub(crate) fn from_checks(checks: Vec<CheckOutcome>) -> Self {
        let status = checks
            .iter()
            .map(|outcome| outcome.status)
            .max()
            .unwrap_or_default();

        let message = if status == ValidationStatus::Pass {
            "network validation passed: all checks within thresholds".to_owned()
        } else {
            let culprits = checks
                .iter()
                .filter(|outcome| outcome.status == status)
                .map(|outcome| format!("{}: {}", outcome.check, outcome.detail))
                .collect::<Vec<_>>()
                .join("; ");
            format!("{status}: {culprits}")
        };

        let details = checks.iter().map(CheckOutcome::to_string).collect();

        Self {
            status,
            message,
            details,
            checks,
        }
    }

    pub fn is_pass(&self) -> bool {
        self.status == ValidationStatus::Pass
    }

    /// The outcome of the given check, if it was part of the validation.
    pub fn check(&self, check: Check) -> Option<&CheckOutcome> {
        self.checks.iter().find(|outcome| outcome.check == check)
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for detail in &self.details {
            write!(f, "\n  {detail}")?;
        }
        Ok(())
    }
}

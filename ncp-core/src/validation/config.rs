use crate::defaults::{
    DEFAULT_CONNECTIVITY_LOSS_FAIL_PERCENT, DEFAULT_LATENCY_DELTA_FAIL_MS,
    DEFAULT_LATENCY_DELTA_WARN_MS, DEFAULT_PACKET_LOSS_FAIL_PERCENT, DEFAULT_PATH_CHANGE_IS_WARN,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The thresholds the validation compares the telemetry against.
///
/// ## Defaults
///
/// | Rule | Default |
/// |------|---------|
/// | `latency_delta_warn_ms` | [`DEFAULT_LATENCY_DELTA_WARN_MS`] (2ms) |
/// | `latency_delta_fail_ms` | [`DEFAULT_LATENCY_DELTA_FAIL_MS`] (5ms) |
/// | `packet_loss_fail_percent` | [`DEFAULT_PACKET_LOSS_FAIL_PERCENT`] (5%) |
/// | `path_change_is_warn` | [`DEFAULT_PATH_CHANGE_IS_WARN`] (`true`) |
/// | `connectivity_loss_fail_percent` | [`DEFAULT_CONNECTIVITY_LOSS_FAIL_PERCENT`] (50%) |
///
/// ## Example
///
/// ```
/// use ncp_core::validation::ValidationConfig;
///
/// let rules = ValidationConfig::default()
///     .with_latency_delta(5.0, 20.0)
///     .with_path_change_is_warn(false);
/// assert!(rules.check().is_ok());
///
/// let broken = ValidationConfig::default().with_packet_loss_fail_percent(-1.0);
/// assert!(broken.check().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Increase of the average round trip time over the baseline, in
    /// milliseconds, from which the latency is a warning.
    pub latency_delta_warn_ms: f64,
    /// Increase of the average round trip time over the baseline, in
    /// milliseconds, from which the latency is a failure.
    pub latency_delta_fail_ms: f64,
    /// Packet loss of the current snapshot, in percent, above which the
    /// validation fails whatever the baseline was.
    pub packet_loss_fail_percent: f64,
    /// Whether a different route is only a warning (unless the packet
    /// loss got worse too) or a failure.
    pub path_change_is_warn: bool,
    /// Packet loss, in percent, above which a single snapshot has lost
    /// connectivity.
    pub connectivity_loss_fail_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ValidationConfigError {
    #[error("{field} must be a number, got {value}")]
    NotFinite { field: &'static str, value: f64 },
    #[error("{field} cannot be negative, got {value}")]
    Negative { field: &'static str, value: f64 },
    #[error("{field} is a percentage and cannot be above 100, got {value}")]
    PercentOutOfRange { field: &'static str, value: f64 },
    #[error(
        "latency_delta_warn_ms ({warn}) cannot be above latency_delta_fail_ms ({fail})"
    )]
    WarnAboveFail { warn: f64, fail: f64 },
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            latency_delta_warn_ms: DEFAULT_LATENCY_DELTA_WARN_MS,
            latency_delta_fail_ms: DEFAULT_LATENCY_DELTA_FAIL_MS,
            packet_loss_fail_percent: DEFAULT_PACKET_LOSS_FAIL_PERCENT,
            path_change_is_warn: DEFAULT_PATH_CHANGE_IS_WARN,
            connectivity_loss_fail_percent: DEFAULT_CONNECTIVITY_LOSS_FAIL_PERCENT,
        }
    }
}

impl ValidationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_latency_delta(mut self, warn_ms: f64, fail_ms: f64) -> Self {
        self.latency_delta_warn_ms = warn_ms;
        self.latency_delta_fail_ms = fail_ms;
        self
    }

    #[must_use]
    pub fn with_packet_loss_fail_percent(mut self, percent: f64) -> Self {
        self.packet_loss_fail_percent = percent;
        self
    }

    #[must_use]
    pub fn with_path_change_is_warn(mut self, path_change_is_warn: bool) -> Self {
        self.path_change_is_warn = path_change_is_warn;
        self
    }

    #[must_use]
    pub fn with_connectivity_loss_fail_percent(mut self, percent: f64) -> Self {
        self.connectivity_loss_fail_percent = percent;
        self
    }

    /// Make sure the rules make sense before comparing anything with
    /// them.
    ///
    /// # Errors
    ///
    /// Every threshold must be a finite, non-negative number, the
    /// percentages cannot exceed 100 and the latency warning cannot be
    /// above the latency failure.
    pub fn check(&self) -> Result<(), ValidationConfigError> {
        let thresholds = [
            ("latency_delta_warn_ms", self.latency_delta_warn_ms, false),
            ("latency_delta_fail_ms", self.latency_delta_fail_ms, false),
            ("packet_loss_fail_percent", self.packet_loss_fail_percent, true),
            (
                "connectivity_loss_fail_percent",
                self.connectivity_loss_fail_percent,
                true,
            ),
        ];

        for (field, value, is_percent) in thresholds {
            if !value.is_finite() {
                return Err(ValidationConfigError::NotFinite { field, value });
            }
            if value < 0.0 {
                return Err(ValidationConfigError::Negative { field, value });
            }
            if is_percent && value > 100.0 {
                return Err(ValidationConfigError::PercentOutOfRange { field, value });
            }
        }

        if self.latency_delta_warn_ms > self.latency_delta_fail_ms {
            return Err(ValidationConfigError::WarnAboveFail {
                warn: self.latency_delta_warn_ms,
                fail: self.latency_delta_fail_ms,
            });
        }

        Ok(())
    }
}

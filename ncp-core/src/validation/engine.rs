use super::{Check, CheckOutcome, ValidationConfig, ValidationConfigError, ValidationResult};
use super::ValidationStatus::{Fail, Warn};
use crate::metrics::{LatencyMetrics, PathMetrics, TelemetryMetrics};
use tracing::info;

/// Compare the `current` snapshot with the `baseline` one.
///
/// The checks run in a fixed order: `latency-presence`, `packet-loss`,
/// `latency-delta` then `path-change`. The overall status is the most
/// severe of theirs.
///
/// # Errors
///
/// The rules are checked before anything is compared: nonsensical rules
/// are an error, not a failed validation.
pub fn validate(
    baseline: &TelemetryMetrics,
    current: &TelemetryMetrics,
    rules: &ValidationConfig,
) -> Result<ValidationResult, ValidationConfigError> {
    rules.check()?;

    let checks = vec![
        latency_presence(baseline.latency.as_ref(), current.latency.as_ref()),
        packet_loss(current.latency.as_ref(), rules),
        latency_delta(baseline.latency.as_ref(), current.latency.as_ref(), rules),
        path_change(baseline, current, rules),
    ];

    let result = ValidationResult::from_checks(checks);
    info!(status = %result.status, summary = %result.message, "network validation");
    Ok(result)
}

/// Decide, from a single snapshot, whether the destination can be reached
/// at all.
///
/// The snapshot fails if there is no latency metric, if no echo reply
/// came back, or if the packet loss is above
/// [`connectivity_loss_fail_percent`].
///
/// [`connectivity_loss_fail_percent`]: ValidationConfig::connectivity_loss_fail_percent
pub fn validate_connectivity(
    snapshot: &TelemetryMetrics,
    rules: &ValidationConfig,
) -> Result<ValidationResult, ValidationConfigError> {
    rules.check()?;

    let threshold = rules.connectivity_loss_fail_percent;
    let outcome = match &snapshot.latency {
        None => CheckOutcome::new(Check::Connectivity, Fail, "no latency metric collected"),
        Some(latency) if latency.packet_loss_percent >= 100.0 => CheckOutcome::new(
            Check::Connectivity,
            Fail,
            format!(
                "no packets returned from {} ({:.2}% packet loss)",
                latency.destination, latency.packet_loss_percent
            ),
        ),
        Some(latency) if latency.packet_loss_percent > threshold => CheckOutcome::new(
            Check::Connectivity,
            Fail,
            format!(
                "connectivity to {} degraded: {:.2}% packet loss above {threshold:.2}%",
                latency.destination, latency.packet_loss_percent
            ),
        ),
        Some(latency) => CheckOutcome::pass(
            Check::Connectivity,
            format!(
                "{} reachable with {:.2}% packet loss",
                latency.destination, latency.packet_loss_percent
            ),
        ),
    };

    let result = ValidationResult::from_checks(vec![outcome]);
    info!(status = %result.status, summary = %result.message, "connectivity validation");
    Ok(result)
}

fn latency_presence(
    baseline: Option<&LatencyMetrics>,
    current: Option<&LatencyMetrics>,
) -> CheckOutcome {
    match (baseline, current) {
        (Some(_), Some(_)) => {
            CheckOutcome::pass(Check::LatencyPresence, "latency present in baseline and current")
        }
        (Some(_), None) => CheckOutcome::new(
            Check::LatencyPresence,
            Fail,
            "latency metric missing in current",
        ),
        (None, Some(_)) => CheckOutcome::new(
            Check::LatencyPresence,
            Fail,
            "latency metric missing in baseline",
        ),
        (None, None) => CheckOutcome::not_evaluated(
            Check::LatencyPresence,
            "no latency metric in baseline and current",
        ),
    }
}

fn packet_loss(current: Option<&LatencyMetrics>, rules: &ValidationConfig) -> CheckOutcome {
    let Some(current) = current else {
        return CheckOutcome::not_evaluated(Check::PacketLoss, "no latency metric in current");
    };

    let observed = current.packet_loss_percent;
    let threshold = rules.packet_loss_fail_percent;
    if observed > threshold {
        CheckOutcome::new(
            Check::PacketLoss,
            Fail,
            format!("packet loss {observed:.2}% above threshold {threshold:.2}%"),
        )
    } else {
        CheckOutcome::pass(
            Check::PacketLoss,
            format!("packet loss {observed:.2}% within threshold {threshold:.2}%"),
        )
    }
}

/// The average round trip time, if any reply came back.
fn replied_avg_ms(latency: &LatencyMetrics) -> Option<f64> {
    latency
        .avg_ms()
        .filter(|_| latency.packet_loss_percent < 100.0)
}

fn latency_delta(
    baseline: Option<&LatencyMetrics>,
    current: Option<&LatencyMetrics>,
    rules: &ValidationConfig,
) -> CheckOutcome {
    let (Some(baseline), Some(current)) = (baseline, current) else {
        return CheckOutcome::not_evaluated(
            Check::LatencyDelta,
            "latency not measured in both snapshots",
        );
    };
    let (Some(before), Some(after)) = (replied_avg_ms(baseline), replied_avg_ms(current)) else {
        let side = if replied_avg_ms(baseline).is_none() {
            "baseline"
        } else {
            "current"
        };
        return CheckOutcome::not_evaluated(
            Check::LatencyDelta,
            format!("no reply in {side} (100.00% packet loss)"),
        );
    };

    let delta = after - before;
    let change = format!("average latency {before:.2}ms -> {after:.2}ms (delta {delta:+.2}ms)");

    if delta >= rules.latency_delta_fail_ms {
        CheckOutcome::new(
            Check::LatencyDelta,
            Fail,
            format!(
                "{change} reached fail threshold {:.2}ms",
                rules.latency_delta_fail_ms
            ),
        )
    } else if delta >= rules.latency_delta_warn_ms {
        CheckOutcome::new(
            Check::LatencyDelta,
            Warn,
            format!(
                "{change} reached warn threshold {:.2}ms",
                rules.latency_delta_warn_ms
            ),
        )
    } else {
        CheckOutcome::pass(
            Check::LatencyDelta,
            format!(
                "{change} below warn threshold {:.2}ms",
                rules.latency_delta_warn_ms
            ),
        )
    }
}

fn path_change(
    baseline: &TelemetryMetrics,
    current: &TelemetryMetrics,
    rules: &ValidationConfig,
) -> CheckOutcome {
    match (&baseline.path, &current.path) {
        (Some(before), Some(after)) => {
            if before.same_route(after) {
                return CheckOutcome::pass(
                    Check::PathChange,
                    format!("route unchanged ({} hops)", after.total_hops()),
                );
            }

            let regressed = loss_regressed(baseline, current);
            let status = if rules.path_change_is_warn && !regressed {
                Warn
            } else {
                Fail
            };
            let mut detail = format!("route changed from {} to {}", describe(before), describe(after));
            if regressed {
                detail.push_str(" with packet loss regression");
            }
            CheckOutcome::new(Check::PathChange, status, detail)
        }
        (Some(_), None) => {
            CheckOutcome::new(Check::PathChange, Warn, "path metric missing in current")
        }
        (None, Some(_)) => {
            CheckOutcome::new(Check::PathChange, Warn, "path metric missing in baseline")
        }
        (None, None) => CheckOutcome::not_evaluated(
            Check::PathChange,
            "no path metric in baseline and current",
        ),
    }
}

/// `true` if the current snapshot loses strictly more packets than the
/// baseline did.
fn loss_regressed(baseline: &TelemetryMetrics, current: &TelemetryMetrics) -> bool {
    match (&baseline.latency, &current.latency) {
        (Some(before), Some(after)) => after.packet_loss_percent > before.packet_loss_percent,
        _ => false,
    }
}

fn describe(path: &PathMetrics) -> String {
    format!("[{}] ({} hops)", path.route(), path.total_hops())
}

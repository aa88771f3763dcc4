use std::time::Duration;

/// Default increase of the average round trip time (in milliseconds)
/// over the baseline from which the latency check reports a warning.
///
/// ```
/// # use ncp_core::defaults::*;
/// # use ncp_core::validation::ValidationConfig;
/// assert_eq!(
///     ValidationConfig::default().latency_delta_warn_ms,
///     DEFAULT_LATENCY_DELTA_WARN_MS,
/// );
/// ```
pub const DEFAULT_LATENCY_DELTA_WARN_MS: f64 = 2.0;

/// Default increase of the average round trip time (in milliseconds)
/// over the baseline from which the latency check fails.
pub const DEFAULT_LATENCY_DELTA_FAIL_MS: f64 = 5.0;

/// Default packet loss (in percent) above which the current snapshot
/// fails, whatever the baseline was.
pub const DEFAULT_PACKET_LOSS_FAIL_PERCENT: f64 = 5.0;

/// By default a changed route is only a warning: the traffic still
/// flows, it just takes another way.
pub const DEFAULT_PATH_CHANGE_IS_WARN: bool = true;

/// Default packet loss (in percent) above which a single snapshot is
/// considered to have lost connectivity.
///
/// See [`validate_connectivity`] for more details.
///
/// [`validate_connectivity`]: crate::validation::validate_connectivity
pub const DEFAULT_CONNECTIVITY_LOSS_FAIL_PERCENT: f64 = 50.0;

/// Default number of echo requests sent by a latency probe (`ping -c`).
pub const DEFAULT_PING_COUNT: u32 = 5;

/// Default time to wait for each echo reply (`ping -W`).
pub const DEFAULT_PING_WAIT: Duration = Duration::from_secs(2);

/// Default maximum number of hops explored by a path probe
/// (`traceroute -m`).
pub const DEFAULT_MAX_HOPS: u8 = 30;

/// Default time budget of a single probe.
///
/// It needs to cover a full `ping` run: [`DEFAULT_PING_COUNT`] requests
/// one second apart plus the [`DEFAULT_PING_WAIT`] of the last one.
///
/// ```
/// # use ncp_core::defaults::*;
/// # use std::time::Duration;
/// assert!(
///     DEFAULT_PROBE_TIMEOUT
///         > Duration::from_secs(DEFAULT_PING_COUNT as u64) + DEFAULT_PING_WAIT
/// );
/// ```
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default overall deadline of a collection. `None` means the collection
/// only ends when every probe reached its own timeout.
pub const DEFAULT_COLLECTION_DEADLINE: Option<Duration> = None;

use crate::context::{ContextResolver, ExecutionContext};
use ncp_core::{
    Endpoint, ProbeFailure, ProbeKind, RawProbeOutput,
    defaults::{DEFAULT_MAX_HOPS, DEFAULT_PING_COUNT, DEFAULT_PING_WAIT},
};
use std::{future::Future, io, process::Stdio, sync::Arc, time::Duration};
use tokio::process::Command;
use tracing::debug;

/// Run a single diagnostic probe between two endpoints.
///
/// The returned future completes within `timeout`: a probe that is
/// still running by then is abandoned and reported as
/// [`ProbeFailure::Timeout`]. Dropping the future cancels the probe.
pub trait Prober: Send + Sync {
    fn run(
        &self,
        kind: ProbeKind,
        source: &Endpoint,
        destination: &Endpoint,
        timeout: Duration,
    ) -> impl Future<Output = Result<RawProbeOutput, ProbeFailure>> + Send;
}

impl<P: Prober> Prober for Arc<P> {
    fn run(
        &self,
        kind: ProbeKind,
        source: &Endpoint,
        destination: &Endpoint,
        timeout: Duration,
    ) -> impl Future<Output = Result<RawProbeOutput, ProbeFailure>> + Send {
        (**self).run(kind, source, destination, timeout)
    }
}

/// How the diagnostic tools are invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSettings {
    ping_count: u32,
    ping_wait: Duration,
    max_hops: u8,
    numeric_path: bool,
    ping_program: String,
    traceroute_program: String,
    cat_program: String,
    ip_program: String,
    nsenter_program: String,
    proc_net_dev: String,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            ping_count: DEFAULT_PING_COUNT,
            ping_wait: DEFAULT_PING_WAIT,
            max_hops: DEFAULT_MAX_HOPS,
            numeric_path: true,
            ping_program: "ping".to_owned(),
            traceroute_program: "traceroute".to_owned(),
            cat_program: "cat".to_owned(),
            ip_program: "ip".to_owned(),
            nsenter_program: "nsenter".to_owned(),
            proc_net_dev: "/proc/net/dev".to_owned(),
        }
    }
}

impl ProbeSettings {
    /// Number of echo requests of a latency probe (at least one).
    pub fn set_ping_count(mut self, count: u32) -> Self {
        self.ping_count = count.max(1);
        self
    }

    /// Time to wait for each echo reply, rounded up to the second.
    pub fn set_ping_wait(mut self, wait: Duration) -> Self {
        self.ping_wait = wait;
        self
    }

    pub fn set_max_hops(mut self, max_hops: u8) -> Self {
        self.max_hops = max_hops.max(1);
        self
    }

    /// Whether `traceroute` skips the reverse name resolution of the
    /// hops (`-n`).
    pub fn set_numeric_path(mut self, numeric: bool) -> Self {
        self.numeric_path = numeric;
        self
    }

    pub fn set_ping_program(mut self, program: impl Into<String>) -> Self {
        self.ping_program = program.into();
        self
    }

    pub fn set_traceroute_program(mut self, program: impl Into<String>) -> Self {
        self.traceroute_program = program.into();
        self
    }

    pub fn set_cat_program(mut self, program: impl Into<String>) -> Self {
        self.cat_program = program.into();
        self
    }

    pub fn set_ip_program(mut self, program: impl Into<String>) -> Self {
        self.ip_program = program.into();
        self
    }

    pub fn set_nsenter_program(mut self, program: impl Into<String>) -> Self {
        self.nsenter_program = program.into();
        self
    }

    pub fn ping_count(&self) -> u32 {
        self.ping_count
    }

    pub fn ping_wait(&self) -> Duration {
        self.ping_wait
    }

    pub fn max_hops(&self) -> u8 {
        self.max_hops
    }

    /// The diagnostic command of the given probe, before it is wrapped
    /// in an execution context.
    fn tool(&self, kind: ProbeKind, target: &str) -> Vec<String> {
        match kind {
            ProbeKind::Latency => {
                let wait = self.ping_wait.as_secs_f64().ceil().max(1.0) as u64;
                vec![
                    self.ping_program.clone(),
                    "-n".to_owned(),
                    "-c".to_owned(),
                    self.ping_count.to_string(),
                    "-W".to_owned(),
                    wait.to_string(),
                    target.to_owned(),
                ]
            }
            ProbeKind::Path => {
                let mut command = vec![self.traceroute_program.clone()];
                if self.numeric_path {
                    command.push("-n".to_owned());
                }
                command.extend(["-m".to_owned(), self.max_hops.to_string(), target.to_owned()]);
                command
            }
            ProbeKind::Interfaces => vec![self.cat_program.clone(), self.proc_net_dev.clone()],
        }
    }

    /// The full command line of a probe running in `context`.
    pub fn command_line(
        &self,
        kind: ProbeKind,
        context: &ExecutionContext,
        target: &str,
    ) -> Vec<String> {
        let tool = self.tool(kind, target);
        let mut command = match context {
            ExecutionContext::Host => Vec::with_capacity(tool.len()),
            ExecutionContext::Namespace(name) => vec![
                self.ip_program.clone(),
                "netns".to_owned(),
                "exec".to_owned(),
                name.clone(),
            ],
            ExecutionContext::Pid(pid) => vec![
                self.nsenter_program.clone(),
                "--net".to_owned(),
                "--target".to_owned(),
                pid.to_string(),
            ],
        };
        command.extend(tool);
        command
    }
}

/// Probe the network by running the diagnostic tools as child processes.
///
/// The tool runs in the execution context of the source node, as given by
/// the [`ContextResolver`]. The child process is killed as soon as the
/// probe is abandoned (timeout or cancellation).
#[derive(Debug, Clone)]
pub struct CommandProber<R> {
    resolver: R,
    settings: ProbeSettings,
}

impl<R: ContextResolver> CommandProber<R> {
    pub fn new(resolver: R) -> Self {
        Self::with_settings(resolver, ProbeSettings::default())
    }

    pub fn with_settings(resolver: R, settings: ProbeSettings) -> Self {
        Self { resolver, settings }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    fn tool_name(&self, kind: ProbeKind) -> &str {
        match kind {
            ProbeKind::Latency => &self.settings.ping_program,
            ProbeKind::Path => &self.settings.traceroute_program,
            ProbeKind::Interfaces => &self.settings.cat_program,
        }
    }
}

impl<R: ContextResolver> Prober for CommandProber<R> {
    async fn run(
        &self,
        kind: ProbeKind,
        source: &Endpoint,
        destination: &Endpoint,
        timeout: Duration,
    ) -> Result<RawProbeOutput, ProbeFailure> {
        let context = self
            .resolver
            .context_of(source)
            .ok_or_else(|| ProbeFailure::UnresolvedContext {
                endpoint: source.clone(),
            })?;
        let target = self
            .resolver
            .address_of(destination)
            .unwrap_or_else(|| destination.to_string());

        let command_line = self.settings.command_line(kind, &context, &target);
        let Some((program, args)) = command_line.split_first() else {
            return Err(ProbeFailure::tool_unavailable(
                self.tool_name(kind),
                "empty command line",
            ));
        };
        debug!(%kind, %source, %destination, %context, command = %command_line.join(" "), "running probe");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| ProbeFailure::tool_unavailable(program, spawn_error(&error)))?;

        // the child is dropped, hence killed, with this future
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(error)) => return Err(ProbeFailure::tool_unavailable(program, error)),
            Err(_elapsed) => {
                debug!(%kind, %source, %destination, ?timeout, "probe timed out");
                return Err(ProbeFailure::Timeout { after: timeout });
            }
        };

        let raw = RawProbeOutput::new(
            kind,
            source.clone(),
            destination.clone(),
            String::from_utf8_lossy(&output.stdout),
        )
        .with_stderr(String::from_utf8_lossy(&output.stderr));

        interpret(self.tool_name(kind), output.status.code(), raw)
    }
}

fn spawn_error(error: &io::Error) -> String {
    match error.kind() {
        io::ErrorKind::NotFound => "not found".to_owned(),
        io::ErrorKind::PermissionDenied => "permission denied".to_owned(),
        _ => error.to_string(),
    }
}

/// Decide whether a completed process produced probe output.
///
/// A tool that ran and printed something produced output, whatever its
/// exit status: `ping` exits with `1` when no reply came back. Exit
/// statuses `126` and `127` are the shell's "cannot execute" and "not
/// found". A failure with nothing but an error message is an
/// infrastructure problem (a namespace that does not exist, missing
/// privileges), except for the unreachable network reported by `ping`.
fn interpret(
    tool: &str,
    code: Option<i32>,
    raw: RawProbeOutput,
) -> Result<RawProbeOutput, ProbeFailure> {
    match code {
        Some(0) => Ok(raw),
        Some(126 | 127) => Err(ProbeFailure::tool_unavailable(tool, reason(code, &raw.stderr))),
        _ if !raw.stdout.trim().is_empty() => Ok(raw),
        _ if raw.kind == ProbeKind::Latency
            && raw.stderr.to_ascii_lowercase().contains("unreachable") =>
        {
            Ok(raw)
        }
        Some(_) if !raw.stderr.trim().is_empty() => {
            Err(ProbeFailure::tool_unavailable(tool, reason(code, &raw.stderr)))
        }
        _ => Ok(raw),
    }
}

fn reason(code: Option<i32>, stderr: &str) -> String {
    let stderr = stderr.trim();
    match code {
        Some(code) if stderr.is_empty() => format!("exited with status {code}"),
        Some(code) => format!("exited with status {code}: {stderr}"),
        None => format!("terminated by a signal: {stderr}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HostOnly, Topology};

    fn endpoints() -> (Endpoint, Endpoint) {
        (Endpoint::new("h1").unwrap(), Endpoint::new("h2").unwrap())
    }

    fn raw(kind: ProbeKind, stdout: &str, stderr: &str) -> RawProbeOutput {
        let (h1, h2) = endpoints();
        RawProbeOutput::new(kind, h1, h2, stdout).with_stderr(stderr)
    }

    #[test]
    fn ping_command_line() {
        let settings = ProbeSettings::default();
        assert_eq!(
            settings.command_line(ProbeKind::Latency, &ExecutionContext::Host, "10.0.0.2"),
            vec!["ping", "-n", "-c", "5", "-W", "2", "10.0.0.2"]
        );
    }

    #[test]
    fn traceroute_in_namespace() {
        let settings = ProbeSettings::default().set_max_hops(8);
        assert_eq!(
            settings.command_line(
                ProbeKind::Path,
                &ExecutionContext::Namespace("h1".to_owned()),
                "h2"
            ),
            vec!["ip", "netns", "exec", "h1", "traceroute", "-n", "-m", "8", "h2"]
        );
    }

    #[test]
    fn counters_in_process_namespace() {
        let settings = ProbeSettings::default();
        assert_eq!(
            settings.command_line(ProbeKind::Interfaces, &ExecutionContext::Pid(42), "h2"),
            vec!["nsenter", "--net", "--target", "42", "cat", "/proc/net/dev"]
        );
    }

    #[test]
    fn settings_are_bounded() {
        let settings = ProbeSettings::default()
            .set_ping_count(0)
            .set_ping_wait(Duration::from_millis(1_500))
            .set_numeric_path(false);
        assert_eq!(settings.ping_count(), 1);
        assert_eq!(
            settings.command_line(ProbeKind::Latency, &ExecutionContext::Host, "h2")[5],
            "2"
        );
        assert_eq!(
            settings.command_line(ProbeKind::Path, &ExecutionContext::Host, "h2"),
            vec!["traceroute", "-m", "30", "h2"]
        );
    }

    #[test]
    fn lossy_ping_is_output() {
        let raw = raw(ProbeKind::Latency, "PING h2\n2 packets transmitted, 0 received\n", "");
        assert!(interpret("ping", Some(1), raw).is_ok());
    }

    #[test]
    fn unreachable_network_is_output() {
        let raw = raw(ProbeKind::Latency, "", "ping: connect: Network is unreachable\n");
        assert!(interpret("ping", Some(2), raw).is_ok());
    }

    #[test]
    fn missing_namespace_is_unavailable() {
        let raw = raw(
            ProbeKind::Path,
            "",
            "Cannot open network namespace \"h9\": No such file or directory\n",
        );
        assert_eq!(
            interpret("traceroute", Some(1), raw),
            Err(ProbeFailure::ToolUnavailable {
                tool: "traceroute".to_owned(),
                reason: "exited with status 1: Cannot open network namespace \"h9\": No such file or directory".to_owned(),
            })
        );
    }

    #[test]
    fn command_not_found_is_unavailable() {
        let raw = raw(ProbeKind::Latency, "", "");
        assert!(matches!(
            interpret("ping", Some(127), raw),
            Err(ProbeFailure::ToolUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_source() {
        let (h1, h2) = endpoints();
        let prober = CommandProber::new(Topology::new());
        assert_eq!(
            prober
                .run(ProbeKind::Latency, &h1, &h2, Duration::from_secs(1))
                .await,
            Err(ProbeFailure::UnresolvedContext { endpoint: h1 })
        );
    }

    #[tokio::test]
    async fn missing_program() {
        let (h1, h2) = endpoints();
        let settings = ProbeSettings::default().set_ping_program("ncp-no-such-ping");
        let prober = CommandProber::with_settings(HostOnly, settings);
        assert_eq!(
            prober
                .run(ProbeKind::Latency, &h1, &h2, Duration::from_secs(5))
                .await,
            Err(ProbeFailure::tool_unavailable("ncp-no-such-ping", "not found"))
        );
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn host_interface_counters() {
        let (h1, h2) = endpoints();
        let prober = CommandProber::new(HostOnly);
        let raw = prober
            .run(ProbeKind::Interfaces, &h1, &h2, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(raw.stdout.contains("lo:"), "{}", raw.stdout);
    }
}

use anyhow::{Context as _, Result, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ncp::{
    Collection, CollectorSettings, CommandProber, Endpoint, ExecutionContext, PacketLoss,
    ProbeKind, ProbeKinds, Prober, SimulatedProber, TelemetryCollector, TelemetryMetrics,
    Topology, ValidationConfig, ValidationResult, ValidationStatus, validate,
    validate_connectivity,
};
use ncp_core::time;
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
    str::FromStr,
    time::Duration,
};
use tracing::info;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

#[derive(Parser)]
struct Command {
    /// a node of the topology: `NAME=CONTEXT[@ADDRESS]` where CONTEXT is
    /// `host`, `netns:<name>` or `pid:<pid>`
    #[arg(long = "node", value_name = "NODE")]
    nodes: Vec<NodeArg>,

    /// time budget of every single probe
    #[arg(long, default_value = "30s")]
    timeout: time::Duration,

    /// time budget of the whole collection
    #[arg(long)]
    deadline: Option<time::Duration>,

    /// print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    /// round trip latency and packet loss between two nodes
    Ping {
        source: Endpoint,
        destination: Endpoint,
    },
    /// route between two nodes
    Trace {
        source: Endpoint,
        destination: Endpoint,
    },
    /// interface counters of a node
    Counters { node: Endpoint },
    /// collect a telemetry snapshot between two nodes
    Collect {
        source: Endpoint,
        destination: Endpoint,
        /// comma separated kinds (latency, path, interfaces) or `all`
        #[arg(long, default_value = "all")]
        kinds: ProbeKinds,
        /// write the snapshot (JSON) to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// validate a snapshot against a baseline, both JSON files
    Validate {
        baseline: PathBuf,
        current: PathBuf,
        #[command(flatten)]
        rules: Rules,
    },
    /// run a baseline and a degraded collection in a simulated network
    Simulate {
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[arg(long, value_enum, default_value_t = Scenario::Congestion)]
        scenario: Scenario,
        #[command(flatten)]
        rules: Rules,
    },
}

#[derive(Args)]
struct Rules {
    /// latency increase (ms) reported as a warning
    #[arg(long)]
    warn_ms: Option<f64>,
    /// latency increase (ms) failing the validation
    #[arg(long)]
    fail_ms: Option<f64>,
    /// packet loss above which the validation fails, e.g. `5%`
    #[arg(long)]
    max_loss: Option<PacketLoss>,
    /// a changed route fails the validation instead of warning
    #[arg(long)]
    strict_path: bool,
}

impl Rules {
    fn config(&self) -> ValidationConfig {
        let mut config = ValidationConfig::default();
        if self.warn_ms.is_some() || self.fail_ms.is_some() {
            config = config.with_latency_delta(
                self.warn_ms.unwrap_or(config.latency_delta_warn_ms),
                self.fail_ms.unwrap_or(config.latency_delta_fail_ms),
            );
        }
        if let Some(loss) = self.max_loss {
            config = config.with_packet_loss_fail_percent(loss.percent());
        }
        config.with_path_change_is_warn(!self.strict_path)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Scenario {
    /// the link gets 8 times slower
    Congestion,
    /// traffic goes through another router
    Reroute,
    /// the link drops every packet
    Outage,
}

#[derive(Clone)]
struct NodeArg {
    endpoint: Endpoint,
    context: ExecutionContext,
    address: Option<String>,
}

impl FromStr for NodeArg {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, rest) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expecting NAME=CONTEXT[@ADDRESS], got `{s}'"))?;
        let (context, address) = match rest.split_once('@') {
            Some((context, address)) => (context, Some(address.trim().to_owned())),
            None => (rest, None),
        };

        Ok(Self {
            endpoint: name.parse()?,
            context: context.parse()?,
            address,
        })
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let cmd = Command::parse();
    let settings = collector_settings(&cmd);
    let json = cmd.json;

    match cmd.action {
        Action::Ping {
            source,
            destination,
        } => {
            let collector = TelemetryCollector::with_settings(command_prober(cmd.nodes), settings);
            let collection =
                probe_one(&collector, &source, &destination, ProbeKind::Latency).await;
            print_collection(&collection, json)?;
        }
        Action::Trace {
            source,
            destination,
        } => {
            let collector = TelemetryCollector::with_settings(command_prober(cmd.nodes), settings);
            let collection = probe_one(&collector, &source, &destination, ProbeKind::Path).await;
            print_collection(&collection, json)?;
        }
        Action::Counters { node } => {
            let collector = TelemetryCollector::with_settings(command_prober(cmd.nodes), settings);
            let collection = probe_one(&collector, &node, &node, ProbeKind::Interfaces).await;
            print_collection(&collection, json)?;
        }
        Action::Collect {
            source,
            destination,
            kinds,
            output,
        } => {
            let collector = TelemetryCollector::with_settings(command_prober(cmd.nodes), settings);
            let snapshot = collector.collect(&source, &destination, kinds).await?;
            match output {
                Some(path) => {
                    let file = fs::File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    serde_json::to_writer_pretty(file, &snapshot)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!(path = %path.display(), "snapshot saved");
                }
                None => print(&snapshot, json)?,
            }
        }
        Action::Validate {
            baseline,
            current,
            rules,
        } => {
            let baseline = load(&baseline)?;
            let current = load(&current)?;
            let result = validate(&baseline, &current, &rules.config())?;
            print(&result, json)?;
            return Ok(exit_code(&result));
        }
        Action::Simulate {
            seed,
            scenario,
            rules,
        } => {
            let result = simulate(seed, scenario, &rules.config(), settings, json).await?;
            return Ok(exit_code(&result));
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn collector_settings(cmd: &Command) -> CollectorSettings {
    let settings = CollectorSettings::default().set_probe_timeout(cmd.timeout.into_duration());
    match cmd.deadline {
        Some(deadline) => settings.set_deadline(deadline.into_duration()),
        None => settings,
    }
}

fn command_prober(nodes: Vec<NodeArg>) -> CommandProber<Topology> {
    let mut topology = Topology::new();
    for node in nodes {
        topology.add_node(node.endpoint, node.context, node.address);
    }
    CommandProber::new(topology)
}

async fn probe_one<P: Prober>(
    collector: &TelemetryCollector<P>,
    source: &Endpoint,
    destination: &Endpoint,
    kind: ProbeKind,
) -> Collection {
    collector
        .collect_detailed(source, destination, ProbeKinds::only(kind))
        .await
}

async fn simulate(
    seed: u64,
    scenario: Scenario,
    rules: &ValidationConfig,
    settings: CollectorSettings,
    json: bool,
) -> Result<ValidationResult> {
    let h1: Endpoint = "h1".parse()?;
    let h2: Endpoint = "h2".parse()?;

    let network = SimulatedProber::new(seed);
    network.add_node(&h1, "10.0.1.10");
    network.add_node(&h2, "10.0.2.10");
    network
        .configure_link(&h1, &h2)
        .set_latency(Duration::from_millis(5))
        .set_jitter(Duration::from_micros(500))
        .set_route(["10.0.1.1", "10.0.12.2"])
        .apply();
    let collector = TelemetryCollector::with_settings(network, settings);

    let baseline = collector.collect(&h1, &h2, ProbeKinds::ALL).await?;

    let link = collector.prober().configure_link(&h1, &h2);
    match scenario {
        Scenario::Congestion => link.set_latency(Duration::from_millis(40)).apply(),
        Scenario::Reroute => link.set_route(["10.0.1.1", "10.0.13.3"]).apply(),
        Scenario::Outage => link.set_packet_loss(PacketLoss::TOTAL).apply(),
    }

    let current = collector.collect(&h1, &h2, ProbeKinds::ALL).await?;
    let result = validate(&baseline, &current, rules)?;
    let connectivity = validate_connectivity(&current, rules)?;

    if json {
        #[derive(Serialize)]
        struct Report<'a> {
            baseline: &'a TelemetryMetrics,
            current: &'a TelemetryMetrics,
            validation: &'a ValidationResult,
            connectivity: &'a ValidationResult,
        }
        let report = Report {
            baseline: &baseline,
            current: &current,
            validation: &result,
            connectivity: &connectivity,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("baseline:\n{baseline}\n");
        println!("current:\n{current}\n");
        println!("{result}\n");
        println!("{connectivity}");
    }

    Ok(result)
}

fn load(path: &Path) -> Result<TelemetryMetrics> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_collection(collection: &Collection, json: bool) -> Result<()> {
    for (kind, outcome) in &collection.outcomes {
        if !outcome.is_collected() {
            eprintln!("{kind}: {outcome}");
        }
    }
    print(&collection.metrics, json)
}

fn print<T>(value: &T, json: bool) -> Result<()>
where
    T: Serialize + std::fmt::Display,
{
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{value}");
    }
    Ok(())
}

fn exit_code(result: &ValidationResult) -> ExitCode {
    match result.status {
        ValidationStatus::Pass => ExitCode::SUCCESS,
        ValidationStatus::Warn => ExitCode::from(1),
        ValidationStatus::Fail => ExitCode::from(2),
    }
}

/*!
# Network control plane telemetry

Run diagnostic probes between the nodes of a simulated network, collect
them into [`TelemetryMetrics`] snapshots and hand the snapshots to the
[`validate`] function of `ncp_core`.

* a [`Prober`] runs one probe: [`CommandProber`] with the actual tools,
  inside of the node's [`ExecutionContext`], or [`SimulatedProber`] in a
  seeded, in-memory network;
* the [`TelemetryCollector`] runs the requested probes concurrently and
  assembles the snapshot.

*/

mod collector;
mod context;
mod runner;
mod sim;

// convenient re-export of `ncp_core` core objects
pub use ncp_core::{
    Endpoint, PacketLoss, ProbeFailure, ProbeKind, ProbeKinds, RawProbeOutput, TelemetryMetrics,
    ValidationConfig, ValidationResult, ValidationStatus, validate, validate_connectivity,
};

pub use self::{
    collector::{Collection, CollectError, CollectorSettings, KindOutcome, TelemetryCollector},
    context::{ContextResolver, ExecutionContext, ExecutionContextError, HostOnly, Topology},
    runner::{CommandProber, ProbeSettings, Prober},
    sim::{SimLinkBuilder, SimulatedProber},
};

//! Telemetry and validation core of the network control plane.
//!
//! This crate is synchronous and deterministic. It knows nothing of
//! processes or of the runtime that executes the probes:
//!
//! * [`RawProbeOutput`] is what a probe produced, [`ProbeFailure`] is why
//!   it produced nothing;
//! * the [`parser`] turns raw outputs into [`metrics`];
//! * a [`TelemetryMetrics`] snapshot groups the metrics collected
//!   between two nodes at one point in time;
//! * the [`validation`] compares two snapshots and says whether the
//!   network behaviour changed meaningfully.
//!
//! The probes themselves and the collection of a snapshot live in the
//! `ncp` crate.

pub mod defaults;
mod endpoint;
pub mod metrics;
mod packet_loss;
pub mod parser;
mod probe;
pub mod time;
pub mod validation;

pub use self::{
    endpoint::{Endpoint, EndpointError},
    metrics::{Metric, TelemetryMetrics},
    packet_loss::{PacketLoss, PacketLossError},
    parser::ParseFailure,
    probe::{ProbeFailure, ProbeKind, ProbeKinds, RawProbeOutput, UnknownProbeKind},
    validation::{
        ValidationConfig, ValidationConfigError, ValidationResult, ValidationStatus, validate,
        validate_connectivity,
    },
};

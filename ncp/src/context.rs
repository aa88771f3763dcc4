use ncp_core::Endpoint;
use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};
use thiserror::Error;

/// The isolated network context a probe runs in.
///
/// In the simulated network every node is either a named network
/// namespace or a process (a container) holding its own namespace. The
/// probe has to run inside of the source's context to see the network
/// the way the source node sees it.
///
/// Parses from (and displays as) `host`, `netns:<name>` or `pid:<pid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExecutionContext {
    /// The network of the host running the probes.
    Host,
    /// A named network namespace, entered with `ip netns exec`.
    Namespace(String),
    /// The network namespace of a running process, entered with
    /// `nsenter`.
    Pid(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionContextError {
    #[error("unknown execution context `{0}', expected `host', `netns:<name>' or `pid:<pid>'")]
    Unknown(String),
    #[error("network namespace name cannot be empty")]
    EmptyNamespace,
    #[error("invalid process id `{0}'")]
    InvalidPid(String),
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => f.write_str("host"),
            Self::Namespace(name) => write!(f, "netns:{name}"),
            Self::Pid(pid) => write!(f, "pid:{pid}"),
        }
    }
}

impl FromStr for ExecutionContext {
    type Err = ExecutionContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "host" {
            return Ok(Self::Host);
        }

        match s.split_once(':') {
            Some(("netns", name)) if name.trim().is_empty() => {
                Err(ExecutionContextError::EmptyNamespace)
            }
            Some(("netns", name)) => Ok(Self::Namespace(name.trim().to_owned())),
            Some(("pid", pid)) => pid
                .trim()
                .parse()
                .map(Self::Pid)
                .map_err(|_| ExecutionContextError::InvalidPid(pid.to_owned())),
            _ => Err(ExecutionContextError::Unknown(s.to_owned())),
        }
    }
}

/// Where the topology layer tells the probe runner how to reach a node.
pub trait ContextResolver: Send + Sync {
    /// The context the probes of `endpoint` have to run in, `None` if the
    /// endpoint is not part of the topology.
    fn context_of(&self, endpoint: &Endpoint) -> Option<ExecutionContext>;

    /// The address probes towards `endpoint` should target.
    ///
    /// Without an address the endpoint name is used as is and left to the
    /// tools' name resolution.
    fn address_of(&self, endpoint: &Endpoint) -> Option<String> {
        let _ = endpoint;
        None
    }
}

impl<R: ContextResolver + ?Sized> ContextResolver for Arc<R> {
    fn context_of(&self, endpoint: &Endpoint) -> Option<ExecutionContext> {
        (**self).context_of(endpoint)
    }

    fn address_of(&self, endpoint: &Endpoint) -> Option<String> {
        (**self).address_of(endpoint)
    }
}

/// Every endpoint is reached from the host itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostOnly;

impl ContextResolver for HostOnly {
    fn context_of(&self, _: &Endpoint) -> Option<ExecutionContext> {
        Some(ExecutionContext::Host)
    }
}

#[derive(Debug, Clone)]
struct Node {
    context: ExecutionContext,
    address: Option<String>,
}

/// An explicit table of the nodes of the topology.
///
/// ```
/// use ncp::{ContextResolver, ExecutionContext, Topology};
///
/// let topology = Topology::new()
///     .with_node("h1".parse().unwrap(), ExecutionContext::Namespace("h1".to_owned()))
///     .with_node_address(
///         "h2".parse().unwrap(),
///         ExecutionContext::Pid(4242),
///         "10.0.2.10",
///     );
///
/// assert_eq!(
///     topology.context_of(&"h2".parse().unwrap()),
///     Some(ExecutionContext::Pid(4242))
/// );
/// assert_eq!(topology.address_of(&"h2".parse().unwrap()).as_deref(), Some("10.0.2.10"));
/// assert_eq!(topology.context_of(&"h3".parse().unwrap()), None);
/// ```
#[derive(Debug, Default, Clone)]
pub struct Topology {
    nodes: HashMap<Endpoint, Node>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_node(mut self, endpoint: Endpoint, context: ExecutionContext) -> Self {
        self.add_node(endpoint, context, None);
        self
    }

    #[must_use]
    pub fn with_node_address(
        mut self,
        endpoint: Endpoint,
        context: ExecutionContext,
        address: impl Into<String>,
    ) -> Self {
        self.add_node(endpoint, context, Some(address.into()));
        self
    }

    /// Add (or replace) a node of the topology.
    pub fn add_node(
        &mut self,
        endpoint: Endpoint,
        context: ExecutionContext,
        address: Option<String>,
    ) {
        self.nodes.insert(endpoint, Node { context, address });
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl ContextResolver for Topology {
    fn context_of(&self, endpoint: &Endpoint) -> Option<ExecutionContext> {
        self.nodes.get(endpoint).map(|node| node.context.clone())
    }

    fn address_of(&self, endpoint: &Endpoint) -> Option<String> {
        self.nodes.get(endpoint)?.address.clone()
    }
}

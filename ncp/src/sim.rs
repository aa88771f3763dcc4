use crate::runner::Prober;
use ncp_core::{
    Endpoint, PacketLoss, ProbeFailure, ProbeKind, RawProbeOutput,
    defaults::{DEFAULT_MAX_HOPS, DEFAULT_PING_COUNT},
};
use rand_chacha::ChaChaRng;
use rand_core::{Rng, SeedableRng as _};
use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tracing::debug;

/// Latency of a link that was never configured.
const DEFAULT_LINK_LATENCY: Duration = Duration::from_millis(1);
/// Size on the wire of an echo request or reply (ethernet + IP + ICMP).
const ECHO_FRAME_BYTES: u64 = 98;
/// Size on the wire of a traceroute UDP probe.
const TRACE_FRAME_BYTES: u64 = 74;
const PROBES_PER_HOP: usize = 3;
const INITIAL_TTL: usize = 64;

/// Characteristics of the simulated link from one node to another.
#[derive(Debug, Clone, PartialEq)]
struct SimLink {
    latency: Duration,
    jitter: Duration,
    packet_loss: PacketLoss,
    /// routers between the two nodes, `None` for a router that does not
    /// answer traceroute probes
    route: Vec<Option<String>>,
}

impl Default for SimLink {
    fn default() -> Self {
        Self {
            latency: DEFAULT_LINK_LATENCY,
            jitter: Duration::ZERO,
            packet_loss: PacketLoss::NONE,
            route: Vec::new(),
        }
    }
}

impl SimLink {
    fn reversed(&self) -> Self {
        let mut link = self.clone();
        link.route.reverse();
        link
    }

    /// Round trip time, in milliseconds, to the `hop`-th of `hops` hops.
    fn sample_rtt<R: Rng>(&self, rng: &mut R, hop: usize, hops: usize) -> f64 {
        let share = hop as f64 / hops.max(1) as f64;
        let base = self.latency.as_secs_f64() * 1_000.0 * share;
        let jitter = self.jitter.as_secs_f64() * 1_000.0 * (2.0 * unit(rng) - 1.0);
        (base + jitter).max(0.001)
    }
}

/// Uniform sample in `[0, 1)`.
fn unit<R: Rng>(rng: &mut R) -> f64 {
    (rng.next_u64() >> 11) as f64 / (1u64 << 53) as f64
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    rx_bytes: u64,
    rx_packets: u64,
    rx_drops: u64,
    tx_bytes: u64,
    tx_packets: u64,
    tx_drops: u64,
}

#[derive(Debug)]
struct SimNode {
    address: String,
    interfaces: BTreeMap<String, Counters>,
}

impl SimNode {
    fn new(endpoint: &Endpoint) -> Self {
        let interfaces = ["lo".to_owned(), format!("{endpoint}-eth0")]
            .into_iter()
            .map(|name| (name, Counters::default()))
            .collect();
        Self {
            address: String::new(),
            interfaces,
        }
    }

    /// Account for the traffic of a probe on the node's uplink.
    fn record(&mut self, frame_bytes: u64, sent: usize, received: usize) {
        let Some(uplink) = self
            .interfaces
            .iter_mut()
            .find_map(|(name, counters)| (name != "lo").then_some(counters))
        else {
            return;
        };
        let (sent, received) = (sent as u64, received as u64);
        uplink.tx_packets += sent;
        uplink.tx_bytes += sent * frame_bytes;
        uplink.rx_packets += received;
        uplink.rx_bytes += received * frame_bytes;
    }
}

struct SimState {
    rng: ChaChaRng,
    nodes: BTreeMap<Endpoint, SimNode>,
    links: BTreeMap<(Endpoint, Endpoint), SimLink>,
    failures: BTreeMap<(ProbeKind, Endpoint), ProbeFailure>,
    delays: BTreeMap<(ProbeKind, Endpoint), Duration>,
}

/// A deterministic, in-memory network answering probes the way the
/// diagnostic tools would.
///
/// The responses are the text `ping`, `traceroute` and `/proc/net/dev`
/// would have produced, so they go through the very same parsers as
/// the real probes. All the randomness (jitter and packet drops) comes
/// from one generator seeded at construction: the same seed and the same
/// sequence of probes give the same outputs.
///
/// ```
/// use ncp::SimulatedProber;
/// use std::time::Duration;
///
/// let h1 = "h1".parse().unwrap();
/// let h2 = "h2".parse().unwrap();
///
/// let network = SimulatedProber::new(42);
/// network.add_node(&h1, "10.0.1.10");
/// network.add_node(&h2, "10.0.2.10");
/// network
///     .configure_link(&h1, &h2)
///     .set_latency(Duration::from_millis(10))
///     .set_route(["10.0.1.1", "10.0.2.1"])
///     .apply();
/// ```
pub struct SimulatedProber {
    state: Mutex<SimState>,
    ping_count: u32,
    max_hops: u8,
}

impl SimulatedProber {
    pub fn new(seed: u64) -> Self {
        Self {
            state: Mutex::new(SimState {
                rng: ChaChaRng::seed_from_u64(seed),
                nodes: BTreeMap::new(),
                links: BTreeMap::new(),
                failures: BTreeMap::new(),
                delays: BTreeMap::new(),
            }),
            ping_count: DEFAULT_PING_COUNT,
            max_hops: DEFAULT_MAX_HOPS,
        }
    }

    pub fn set_ping_count(mut self, count: u32) -> Self {
        self.ping_count = count.max(1);
        self
    }

    pub fn set_max_hops(mut self, max_hops: u8) -> Self {
        self.max_hops = max_hops.max(1);
        self
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a node to the network (or change the address of a known one).
    ///
    /// A new node has two interfaces: `lo` and `<endpoint>-eth0`.
    pub fn add_node(&self, endpoint: &Endpoint, address: impl Into<String>) {
        let mut state = self.state();
        let node = state
            .nodes
            .entry(endpoint.clone())
            .or_insert_with(|| SimNode::new(endpoint));
        node.address = address.into();
    }

    /// Change the characteristics of the link between `a` and `b`, in
    /// both directions. Whatever is not set keeps its current value.
    pub fn configure_link(&self, a: &Endpoint, b: &Endpoint) -> SimLinkBuilder<'_> {
        let link = self
            .state()
            .links
            .get(&(a.clone(), b.clone()))
            .cloned()
            .unwrap_or_default();
        SimLinkBuilder {
            prober: self,
            a: a.clone(),
            b: b.clone(),
            link,
        }
    }

    /// Cut the link between `a` and `b`: the destination becomes
    /// unreachable.
    pub fn remove_link(&self, a: &Endpoint, b: &Endpoint) {
        let mut state = self.state();
        state.links.remove(&(a.clone(), b.clone()));
        state.links.remove(&(b.clone(), a.clone()));
    }

    /// Make every probe of `kind` run from `source` fail.
    pub fn fail_probe(&self, kind: ProbeKind, source: &Endpoint, failure: ProbeFailure) {
        self.state().failures.insert((kind, source.clone()), failure);
    }

    /// Make every probe of `kind` run from `source` take `delay` before
    /// it answers.
    pub fn delay_probe(&self, kind: ProbeKind, source: &Endpoint, delay: Duration) {
        self.state().delays.insert((kind, source.clone()), delay);
    }

    /// Remove the injected failures and delays.
    pub fn clear_faults(&self) {
        let mut state = self.state();
        state.failures.clear();
        state.delays.clear();
    }

    fn delay_of(&self, kind: ProbeKind, source: &Endpoint) -> Duration {
        self.state()
            .delays
            .get(&(kind, source.clone()))
            .copied()
            .unwrap_or_default()
    }

    fn respond(
        &self,
        kind: ProbeKind,
        source: &Endpoint,
        destination: &Endpoint,
    ) -> Result<RawProbeOutput, ProbeFailure> {
        let mut state = self.state();

        if let Some(failure) = state.failures.get(&(kind, source.clone())) {
            return Err(failure.clone());
        }
        if !state.nodes.contains_key(source) {
            return Err(ProbeFailure::UnresolvedContext {
                endpoint: source.clone(),
            });
        }

        let stdout = match kind {
            ProbeKind::Latency => state.ping(source, destination, self.ping_count)?,
            ProbeKind::Path => state.traceroute(source, destination, self.max_hops)?,
            ProbeKind::Interfaces => state.proc_net_dev(source),
        };

        Ok(RawProbeOutput::new(
            kind,
            source.clone(),
            destination.clone(),
            stdout,
        ))
    }
}

impl Prober for SimulatedProber {
    async fn run(
        &self,
        kind: ProbeKind,
        source: &Endpoint,
        destination: &Endpoint,
        timeout: Duration,
    ) -> Result<RawProbeOutput, ProbeFailure> {
        let delay = self.delay_of(kind, source);
        if !delay.is_zero() {
            if delay >= timeout {
                tokio::time::sleep(timeout).await;
                return Err(ProbeFailure::Timeout { after: timeout });
            }
            tokio::time::sleep(delay).await;
        }

        let response = self.respond(kind, source, destination);
        debug!(%kind, %source, %destination, ok = response.is_ok(), "simulated probe");
        response
    }
}

impl SimState {
    fn destination_address(
        &self,
        tool: &str,
        destination: &Endpoint,
    ) -> Result<String, ProbeFailure> {
        self.nodes
            .get(destination)
            .map(|node| node.address.clone())
            .ok_or_else(|| {
                ProbeFailure::tool_unavailable(
                    tool,
                    format!("{destination}: Name or service not known"),
                )
            })
    }

    fn link(&self, source: &Endpoint, destination: &Endpoint) -> Option<SimLink> {
        self.links
            .get(&(source.clone(), destination.clone()))
            .cloned()
    }

    fn ping(
        &mut self,
        source: &Endpoint,
        destination: &Endpoint,
        count: u32,
    ) -> Result<String, ProbeFailure> {
        let address = self.destination_address("ping", destination)?;
        let source_address = self
            .nodes
            .get(source)
            .map(|node| node.address.clone())
            .unwrap_or_default();

        let mut lines = vec![format!("PING {address} ({address}) 56(84) bytes of data.")];
        let mut samples = Vec::new();

        match self.link(source, destination) {
            None => lines.extend((1..=count).map(|seq| {
                format!("From {source_address} icmp_seq={seq} Destination Host Unreachable")
            })),
            Some(link) => {
                let ttl = INITIAL_TTL.saturating_sub(link.route.len());
                let hops = link.route.len() + 1;
                for seq in 1..=count {
                    if link.packet_loss.should_drop(&mut self.rng) {
                        continue;
                    }
                    let rtt = link.sample_rtt(&mut self.rng, hops, hops);
                    samples.push(rtt);
                    lines.push(format!(
                        "64 bytes from {address}: icmp_seq={seq} ttl={ttl} time={rtt:.3} ms"
                    ));
                }
            }
        }

        let transmitted = count as usize;
        let received = samples.len();
        let loss = (transmitted - received) * 100 / transmitted;
        lines.push(String::new());
        lines.push(format!("--- {address} ping statistics ---"));
        lines.push(format!(
            "{transmitted} packets transmitted, {received} received, {loss}% packet loss, time {}ms",
            (transmitted - 1) * 1_000
        ));
        if received > 0 {
            let n = received as f64;
            let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
            let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let avg = samples.iter().sum::<f64>() / n;
            let mdev = (samples.iter().map(|s| s * s).sum::<f64>() / n - avg * avg)
                .max(0.0)
                .sqrt();
            lines.push(format!(
                "rtt min/avg/max/mdev = {min:.3}/{avg:.3}/{max:.3}/{mdev:.3} ms"
            ));
        }

        if let Some(node) = self.nodes.get_mut(source) {
            node.record(ECHO_FRAME_BYTES, transmitted, received);
        }

        Ok(lines.join("\n") + "\n")
    }

    fn traceroute(
        &mut self,
        source: &Endpoint,
        destination: &Endpoint,
        max_hops: u8,
    ) -> Result<String, ProbeFailure> {
        let address = self.destination_address("traceroute", destination)?;
        let max_hops = usize::from(max_hops);

        let mut lines = vec![format!(
            "traceroute to {address} ({address}), {max_hops} hops max, 60 byte packets"
        )];
        let mut sent = 0;
        let mut received = 0;

        match self.link(source, destination) {
            None => {
                sent = max_hops * PROBES_PER_HOP;
                lines.extend((1..=max_hops).map(|hop| format!("{hop:>2}  * * *")));
            }
            Some(link) => {
                let hops: Vec<Option<String>> = link
                    .route
                    .iter()
                    .cloned()
                    .chain(std::iter::once(Some(address.clone())))
                    .take(max_hops)
                    .collect();
                let count = link.route.len() + 1;

                for (index, hop) in hops.iter().enumerate() {
                    let hop_index = index + 1;
                    sent += PROBES_PER_HOP;
                    let Some(hop_address) = hop else {
                        lines.push(format!("{hop_index:>2}  * * *"));
                        continue;
                    };

                    let mut line = format!("{hop_index:>2} ");
                    let mut named = false;
                    for _ in 0..PROBES_PER_HOP {
                        if link.packet_loss.should_drop(&mut self.rng) {
                            line.push_str(" *");
                            continue;
                        }
                        received += 1;
                        if !named {
                            line.push_str(&format!(" {hop_address}"));
                            named = true;
                        }
                        let rtt = link.sample_rtt(&mut self.rng, hop_index, count);
                        line.push_str(&format!("  {rtt:.3} ms"));
                    }
                    lines.push(line);
                }
            }
        }

        if let Some(node) = self.nodes.get_mut(source) {
            node.record(TRACE_FRAME_BYTES, sent, received);
        }

        Ok(lines.join("\n") + "\n")
    }

    fn proc_net_dev(&self, node: &Endpoint) -> String {
        let mut lines = vec![
            "Inter-|   Receive                                                |  Transmit".to_owned(),
            " face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed".to_owned(),
        ];
        if let Some(node) = self.nodes.get(node) {
            lines.extend(node.interfaces.iter().map(|(name, c)| {
                format!(
                    "{name:>6}: {:>8} {:>7}    0 {:>4}    0     0          0         0 {:>8} {:>7}    0 {:>4}    0     0       0          0",
                    c.rx_bytes, c.rx_packets, c.rx_drops, c.tx_bytes, c.tx_packets, c.tx_drops
                )
            }));
        }
        lines.join("\n") + "\n"
    }
}

/// Configure a link of the [`SimulatedProber`], see
/// [`SimulatedProber::configure_link`].
pub struct SimLinkBuilder<'a> {
    prober: &'a SimulatedProber,
    a: Endpoint,
    b: Endpoint,
    link: SimLink,
}

impl SimLinkBuilder<'_> {
    /// Round trip time to the far end of the link.
    pub fn set_latency(mut self, latency: Duration) -> Self {
        self.link.latency = latency;
        self
    }

    /// Each round trip deviates from the latency by up to `jitter`.
    pub fn set_jitter(mut self, jitter: Duration) -> Self {
        self.link.jitter = jitter;
        self
    }

    pub fn set_packet_loss(mut self, packet_loss: PacketLoss) -> Self {
        self.link.packet_loss = packet_loss;
        self
    }

    /// The routers between the two ends, in order from `a`. A `*` is a
    /// router that does not answer.
    pub fn set_route<I, S>(mut self, route: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.link.route = route
            .into_iter()
            .map(|hop| match hop.as_ref().trim() {
                "*" => None,
                address => Some(address.to_owned()),
            })
            .collect();
        self
    }

    pub fn apply(self) {
        let Self { prober, a, b, link } = self;
        debug!(%a, %b, ?link, "configuring simulated link");

        let reversed = link.reversed();
        let mut state = prober.state();
        state.links.insert((b.clone(), a.clone()), reversed);
        state.links.insert((a, b), link);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ncp_core::{metrics::Metric, parser};
    use std::time::SystemTime;

    const TIMEOUT: Duration = Duration::from_secs(30);

    fn network(seed: u64) -> (SimulatedProber, Endpoint, Endpoint) {
        let h1 = Endpoint::new("h1").unwrap();
        let h2 = Endpoint::new("h2").unwrap();
        let network = SimulatedProber::new(seed);
        network.add_node(&h1, "10.0.1.10");
        network.add_node(&h2, "10.0.2.10");
        network
            .configure_link(&h1, &h2)
            .set_latency(Duration::from_millis(10))
            .set_jitter(Duration::from_millis(1))
            .set_route(["10.0.1.1", "10.0.2.1"])
            .apply();
        (network, h1, h2)
    }

    async fn probe(
        network: &SimulatedProber,
        kind: ProbeKind,
        source: &Endpoint,
        destination: &Endpoint,
    ) -> Metric {
        let raw = network.run(kind, source, destination, TIMEOUT).await.unwrap();
        parser::parse(&raw, SystemTime::UNIX_EPOCH).unwrap()
    }

    #[tokio::test]
    async fn same_seed_same_outputs() {
        let (a, h1, h2) = network(7);
        let (b, _, _) = network(7);
        for kind in ProbeKind::ALL {
            assert_eq!(
                a.run(kind, &h1, &h2, TIMEOUT).await,
                b.run(kind, &h1, &h2, TIMEOUT).await
            );
        }
    }

    #[tokio::test]
    async fn latency_follows_the_link() {
        let (network, h1, h2) = network(1);
        let Metric::Latency(latency) = probe(&network, ProbeKind::Latency, &h1, &h2).await else {
            panic!("expected latency");
        };
        assert_eq!(latency.packet_loss_percent, 0.0);
        let avg = latency.avg_ms().unwrap();
        assert!((9.0..=11.0).contains(&avg), "{avg}");

        network
            .configure_link(&h1, &h2)
            .set_latency(Duration::from_millis(50))
            .apply();
        let Metric::Latency(slower) = probe(&network, ProbeKind::Latency, &h1, &h2).await else {
            panic!("expected latency");
        };
        assert!(slower.avg_ms().unwrap() > 45.0);
    }

    #[tokio::test]
    async fn reconfiguring_keeps_the_route() {
        let (network, h1, h2) = network(1);
        network
            .configure_link(&h1, &h2)
            .set_packet_loss(PacketLoss::NONE)
            .apply();
        let Metric::Path(path) = probe(&network, ProbeKind::Path, &h1, &h2).await else {
            panic!("expected path");
        };
        assert_eq!(path.route(), "10.0.1.1 -> 10.0.2.1 -> 10.0.2.10");
    }

    #[tokio::test]
    async fn reverse_direction() {
        let (network, h1, h2) = network(1);
        let Metric::Path(path) = probe(&network, ProbeKind::Path, &h2, &h1).await else {
            panic!("expected path");
        };
        assert_eq!(path.route(), "10.0.2.1 -> 10.0.1.1 -> 10.0.1.10");
    }

    #[tokio::test]
    async fn silent_router() {
        let (network, h1, h2) = network(1);
        network
            .configure_link(&h1, &h2)
            .set_route(["10.0.1.1", "*", "10.0.3.1"])
            .apply();
        let Metric::Path(path) = probe(&network, ProbeKind::Path, &h1, &h2).await else {
            panic!("expected path");
        };
        assert_eq!(path.total_hops(), 4);
        assert_eq!(path.route(), "10.0.1.1 -> * -> 10.0.3.1 -> 10.0.2.10");
    }

    #[tokio::test]
    async fn total_loss() {
        let (network, h1, h2) = network(1);
        network
            .configure_link(&h1, &h2)
            .set_packet_loss(PacketLoss::TOTAL)
            .apply();
        let Metric::Latency(latency) = probe(&network, ProbeKind::Latency, &h1, &h2).await else {
            panic!("expected latency");
        };
        assert_eq!(latency.packet_loss_percent, 100.0);
        assert!(latency.is_unreachable());
    }

    #[tokio::test]
    async fn removed_link_is_unreachable() {
        let (network, h1, h2) = network(1);
        network.remove_link(&h1, &h2);
        let Metric::Latency(latency) = probe(&network, ProbeKind::Latency, &h1, &h2).await else {
            panic!("expected latency");
        };
        assert!(latency.is_unreachable());

        let network = network.set_max_hops(3);
        let Metric::Path(path) = probe(&network, ProbeKind::Path, &h1, &h2).await else {
            panic!("expected path");
        };
        assert_eq!(path.route(), "* -> * -> *");
    }

    #[tokio::test]
    async fn counters_grow_with_probes() {
        let (network, h1, h2) = network(1);
        let Metric::Interfaces(before) = probe(&network, ProbeKind::Interfaces, &h1, &h2).await
        else {
            panic!("expected interfaces");
        };
        probe(&network, ProbeKind::Latency, &h1, &h2).await;
        let Metric::Interfaces(after) = probe(&network, ProbeKind::Interfaces, &h1, &h2).await
        else {
            panic!("expected interfaces");
        };

        assert_eq!(before.len(), 2);
        let delta = after[0].delta(&before[0]).unwrap();
        assert_eq!(after[0].interface_name, "h1-eth0");
        assert_eq!(delta.tx_packets, u64::from(DEFAULT_PING_COUNT));
    }

    #[tokio::test]
    async fn unknown_nodes() {
        let (network, h1, _) = network(1);
        let h9 = Endpoint::new("h9").unwrap();

        assert_eq!(
            network.run(ProbeKind::Latency, &h9, &h1, TIMEOUT).await,
            Err(ProbeFailure::UnresolvedContext {
                endpoint: h9.clone()
            })
        );
        assert!(matches!(
            network.run(ProbeKind::Path, &h1, &h9, TIMEOUT).await,
            Err(ProbeFailure::ToolUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn injected_failure() {
        let (network, h1, h2) = network(1);
        let failure = ProbeFailure::tool_unavailable("traceroute", "not found");
        network.fail_probe(ProbeKind::Path, &h1, failure.clone());

        assert_eq!(
            network.run(ProbeKind::Path, &h1, &h2, TIMEOUT).await,
            Err(failure)
        );
        assert!(network.run(ProbeKind::Latency, &h1, &h2, TIMEOUT).await.is_ok());

        network.clear_faults();
        assert!(network.run(ProbeKind::Path, &h1, &h2, TIMEOUT).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn delay_beyond_timeout() {
        let (network, h1, h2) = network(1);
        network.delay_probe(ProbeKind::Latency, &h1, Duration::from_secs(60));

        let started = tokio::time::Instant::now();
        let result = network
            .run(ProbeKind::Latency, &h1, &h2, Duration::from_secs(5))
            .await;

        assert_eq!(
            result,
            Err(ProbeFailure::Timeout {
                after: Duration::from_secs(5)
            })
        );
        assert!(started.elapsed() >= Duration::from_secs(5));
    }
}

use crate::RawProbeOutput;
use crate::metrics::InterfaceCounter;
use std::time::SystemTime;
use tracing::warn;

/// Number of counters per interface line: 8 for receive, 8 for transmit.
const FIELDS: usize = 16;

/// Parse the content of `/proc/net/dev`.
///
/// ```text
/// Inter-|   Receive                                                |  Transmit
///  face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
///     lo:    2776      28    0    0    0     0          0         0     2776      28    0    0    0     0       0          0
/// h1-eth0:  10710     105    0    1    0     0          0         0     9926      99    0    0    0     0       0          0
/// ```
///
/// The counters are reported for `raw.source`, the node the file was
/// read on. Returns an empty list if no interface line could be parsed.
pub(super) fn parse(raw: &RawProbeOutput, collected_at: SystemTime) -> Vec<InterfaceCounter> {
    raw.stdout
        .lines()
        .filter_map(|line| {
            // the two header lines have no `:`, alias names (`eth0:1`) have
            // more than one
            let (name, counters) = line.rsplit_once(':')?;
            let counter = interface(raw, name, counters, collected_at);
            if counter.is_none() {
                warn!(%line, node = %raw.source, "skipping malformed interface counters");
            }
            counter
        })
        .collect()
}

fn interface(
    raw: &RawProbeOutput,
    name: &str,
    counters: &str,
    collected_at: SystemTime,
) -> Option<InterfaceCounter> {
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }

    let fields = counters
        .split_whitespace()
        .map(str::parse::<u64>)
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    if fields.len() < FIELDS {
        return None;
    }

    Some(InterfaceCounter {
        node: raw.source.clone(),
        interface_name: name.to_owned(),
        rx_bytes: fields[0],
        rx_packets: fields[1],
        rx_drops: fields[3],
        tx_bytes: fields[8],
        tx_packets: fields[9],
        tx_drops: fields[11],
        collected_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Endpoint, ProbeKind};

    const PROC_NET_DEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:    2776      28    0    0    0     0          0         0     2776      28    0    0    0     0       0          0
h1-eth0:  10710     105    0    1    0     0          0         0     9926      99    0    2    0     0       0          0
";

    fn parse_str(stdout: &str) -> Vec<InterfaceCounter> {
        let raw = RawProbeOutput::new(
            ProbeKind::Interfaces,
            Endpoint::new("h1").unwrap(),
            Endpoint::new("h2").unwrap(),
            stdout,
        );
        parse(&raw, SystemTime::UNIX_EPOCH)
    }

    #[test]
    fn counters() {
        let counters = parse_str(PROC_NET_DEV);
        assert_eq!(counters.len(), 2);

        let eth0 = &counters[1];
        assert_eq!(eth0.node.as_str(), "h1");
        assert_eq!(eth0.interface_name, "h1-eth0");
        assert_eq!(eth0.rx_bytes, 10_710);
        assert_eq!(eth0.rx_packets, 105);
        assert_eq!(eth0.rx_drops, 1);
        assert_eq!(eth0.tx_bytes, 9_926);
        assert_eq!(eth0.tx_packets, 99);
        assert_eq!(eth0.tx_drops, 2);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let output = format!(
            "{PROC_NET_DEV}eth9: 1 2 3\nbad name: 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16\neth8: -1 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0\n"
        );
        let counters = parse_str(&output);
        assert_eq!(
            counters
                .iter()
                .map(|c| c.interface_name.as_str())
                .collect::<Vec<_>>(),
            vec!["lo", "h1-eth0"]
        );
    }

    #[test]
    fn alias_interface() {
        let output = format!(
            "{PROC_NET_DEV}eth0:1:   500       5    0    0    0     0          0         0      400       4    0    0    0     0       0          0\n"
        );
        let counters = parse_str(&output);
        assert_eq!(counters.len(), 3);
        assert_eq!(counters[2].interface_name, "eth0:1");
        assert_eq!(counters[2].rx_bytes, 500);
        assert_eq!(counters[2].tx_packets, 4);
    }

    #[test]
    fn headers_only() {
        let headers: String = PROC_NET_DEV.lines().take(2).collect::<Vec<_>>().join("\n");
        assert!(parse_str(&headers).is_empty());
    }
}

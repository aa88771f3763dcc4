use crate::Endpoint;
use serde::{Deserialize, Serialize};
use std::{fmt, time::SystemTime};

/// Traffic counters of one network interface of a node.
///
/// Counters only ever go up during the lifetime of a node. They start
/// again from zero when the node is recreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceCounter {
    pub node: Endpoint,
    pub interface_name: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_drops: u64,
    pub tx_drops: u64,
    pub collected_at: SystemTime,
}

/// Increase of every counter of an interface between two readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CounterDelta {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_drops: u64,
    pub tx_drops: u64,
}

impl InterfaceCounter {
    /// What happened on the interface since the `earlier` reading.
    ///
    /// Returns `None` if the readings are not for the same interface of
    /// the same node, or if a counter went down (the node was recreated
    /// in between).
    pub fn delta(&self, earlier: &Self) -> Option<CounterDelta> {
        if self.node != earlier.node || self.interface_name != earlier.interface_name {
            return None;
        }

        Some(CounterDelta {
            rx_bytes: self.rx_bytes.checked_sub(earlier.rx_bytes)?,
            tx_bytes: self.tx_bytes.checked_sub(earlier.tx_bytes)?,
            rx_packets: self.rx_packets.checked_sub(earlier.rx_packets)?,
            tx_packets: self.tx_packets.checked_sub(earlier.tx_packets)?,
            rx_drops: self.rx_drops.checked_sub(earlier.rx_drops)?,
            tx_drops: self.tx_drops.checked_sub(earlier.tx_drops)?,
        })
    }

    pub fn total_drops(&self) -> u64 {
        self.rx_drops.saturating_add(self.tx_drops)
    }
}

impl fmt::Display for InterfaceCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}: rx {} bytes {} packets {} dropped, tx {} bytes {} packets {} dropped",
            self.node,
            self.interface_name,
            self.rx_bytes,
            self.rx_packets,
            self.rx_drops,
            self.tx_bytes,
            self.tx_packets,
            self.tx_drops,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn counter(rx_bytes: u64, tx_drops: u64) -> InterfaceCounter {
        InterfaceCounter {
            node: Endpoint::new("h1").unwrap(),
            interface_name: "h1-eth0".to_owned(),
            rx_bytes,
            tx_bytes: 100,
            rx_packets: 10,
            tx_packets: 1,
            rx_drops: 0,
            tx_drops,
            collected_at: SystemTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn delta() {
        let mut later = counter(1_500, 3);
        later.collected_at += Duration::from_secs(10);
        let delta = later.delta(&counter(500, 1)).unwrap();
        assert_eq!(delta.rx_bytes, 1_000);
        assert_eq!(delta.tx_drops, 2);
        assert_eq!(delta.tx_packets, 0);
    }

    #[test]
    fn delta_after_reset() {
        assert_eq!(counter(10, 0).delta(&counter(500, 0)), None);
    }

    #[test]
    fn delta_of_another_interface() {
        let mut other = counter(0, 0);
        other.interface_name = "h1-eth1".to_owned();
        assert_eq!(counter(10, 0).delta(&other), None);
    }

    #[test]
    fn display() {
        assert_eq!(
            counter(1_500, 3).to_string(),
            "h1/h1-eth0: rx 1500 bytes 10 packets 0 dropped, tx 100 bytes 1 packets 3 dropped"
        );
    }
}

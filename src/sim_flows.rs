use std::collections::BTreeMap;

use indexmap::IndexMap;
use log::{debug, warn};

use crate::sim_interface::{FlowEvent, FlowEventSink, FlowId, FlowKey, SimError, SimTime};

/// Cumulative counters for one flow
///
/// Counters only ever grow during a run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlowStats {
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub lost_packets: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,

    /// Sum of one-way delays of received packets (seconds)
    pub delay_sum: SimTime,

    /// Sum of |delay(n) - delay(n-1)| over consecutive received packets
    pub jitter_sum: SimTime,

    pub time_first_tx: Option<SimTime>,
    pub time_last_tx: Option<SimTime>,
    pub time_first_rx: Option<SimTime>,
    pub time_last_rx: Option<SimTime>,

    last_delay: Option<SimTime>,
}

impl FlowStats {
    /// Packets that left the source but are neither received nor lost yet
    pub fn in_flight(&self) -> u64 {
        self.tx_packets.saturating_sub(self.rx_packets + self.lost_packets)
    }
}

/// One row of a snapshot
#[derive(Clone, Debug, PartialEq)]
pub struct FlowRecord {
    pub flow_id: FlowId,
    pub key: FlowKey,
    pub stats: FlowStats,
}

/// Immutable copy of the tracker, ordered by flow key
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlowSnapshot {
    /// Time the snapshot was taken
    pub time: SimTime,
    flows: BTreeMap<FlowKey, FlowRecord>,
}

impl FlowSnapshot {
    pub fn get(&self, key: &FlowKey) -> Option<&FlowRecord> {
        self.flows.get(key)
    }

    /// Records in flow-key order
    pub fn iter(&self) -> impl Iterator<Item = &FlowRecord> {
        self.flows.values()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

/// Maps five-tuples to cumulative packet counters
///
/// Entries are created on the first packet seen for a key and live until
/// [`FlowTracker::reset`]. Insertion order fixes the flow id: the first flow
/// observed is flow 1.
///
/// # Example
/// ```
/// use flow_sim::sim_flows::FlowTracker;
/// use flow_sim::sim_interface::{FlowKey, NoOpSink, Protocol};
/// use std::net::Ipv4Addr;
///
/// let key = FlowKey::new(
///     Protocol::Udp,
///     (Ipv4Addr::new(192, 168, 0, 1), 49153),
///     (Ipv4Addr::new(10, 1, 1, 1), 10),
/// );
///
/// let mut flows = FlowTracker::new();
/// let mut sink = NoOpSink;
/// flows.on_packet_sent(key, 1024, 2.0, &mut sink);
/// flows.on_packet_received(key, 1024, 2.0, 2.005, &mut sink).unwrap();
///
/// let snapshot = flows.snapshot(3.0);
/// assert_eq!(snapshot.get(&key).unwrap().stats.rx_packets, 1);
/// ```
#[derive(Debug, Default)]
pub struct FlowTracker {
    flows: IndexMap<FlowKey, FlowStats>,
}

impl FlowTracker {
    pub fn new() -> Self {
        Self {
            flows: IndexMap::new(),
        }
    }

    fn entry(
        &mut self,
        key: FlowKey,
        time: SimTime,
        sink: &mut dyn FlowEventSink,
    ) -> (FlowId, &mut FlowStats) {
        let entry = self.flows.entry(key);
        let created = matches!(entry, indexmap::map::Entry::Vacant(_));
        let flow_id = entry.index() as FlowId + 1;
        let stats = entry.or_default();

        if created {
            debug!("flow {} created: {}", flow_id, key);
            sink.log(time, flow_id, FlowEvent::FlowCreated { key });
        }

        (flow_id, stats)
    }

    /// Count a packet leaving its source
    pub fn on_packet_sent(
        &mut self,
        key: FlowKey,
        bytes: u32,
        send_time: SimTime,
        sink: &mut dyn FlowEventSink,
    ) {
        let (flow_id, stats) = self.entry(key, send_time, sink);

        stats.tx_packets += 1;
        stats.tx_bytes += bytes as u64;
        stats.time_first_tx.get_or_insert(send_time);
        stats.time_last_tx = Some(send_time);

        sink.log(send_time, flow_id, FlowEvent::PacketSent { key, bytes });
    }

    /// Count a packet arriving at its destination
    ///
    /// Fails with `ReceiveBeforeSend` when `receive_time < send_time`; the
    /// tracker is left untouched in that case.
    pub fn on_packet_received(
        &mut self,
        key: FlowKey,
        bytes: u32,
        send_time: SimTime,
        receive_time: SimTime,
        sink: &mut dyn FlowEventSink,
    ) -> Result<(), SimError> {
        // also rejects NaN
        if !(receive_time >= send_time) {
            warn!(
                "flow {}: receive at {} precedes send at {}",
                key, receive_time, send_time
            );
            return Err(SimError::ReceiveBeforeSend {
                send_time,
                receive_time,
            });
        }

        let delay = receive_time - send_time;
        let (flow_id, stats) = self.entry(key, receive_time, sink);

        stats.rx_packets += 1;
        stats.rx_bytes += bytes as u64;
        stats.delay_sum += delay;
        if let Some(last) = stats.last_delay {
            stats.jitter_sum += (delay - last).abs();
        }
        stats.last_delay = Some(delay);
        stats.time_first_rx.get_or_insert(receive_time);
        stats.time_last_rx = Some(receive_time);

        sink.log(
            receive_time,
            flow_id,
            FlowEvent::PacketReceived { key, bytes, delay },
        );
        Ok(())
    }

    /// Count a packet as lost
    pub fn on_packet_lost(&mut self, key: FlowKey, time: SimTime, sink: &mut dyn FlowEventSink) {
        let (flow_id, stats) = self.entry(key, time, sink);
        stats.lost_packets += 1;

        sink.log(time, flow_id, FlowEvent::PacketLost { key });
    }

    /// Copy of all flows, ordered by key
    pub fn snapshot(&self, time: SimTime) -> FlowSnapshot {
        let flows = self
            .flows
            .iter()
            .enumerate()
            .map(|(index, (key, stats))| {
                (
                    *key,
                    FlowRecord {
                        flow_id: index as FlowId + 1,
                        key: *key,
                        stats: stats.clone(),
                    },
                )
            })
            .collect();

        FlowSnapshot { time, flows }
    }

    pub fn get(&self, key: &FlowKey) -> Option<&FlowStats> {
        self.flows.get(key)
    }

    pub fn flow_id(&self, key: &FlowKey) -> Option<FlowId> {
        self.flows.get_index_of(key).map(|i| i as FlowId + 1)
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Drop every flow (simulation teardown)
    pub fn reset(&mut self) {
        self.flows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim_interface::{NoOpSink, Protocol};
    use std::net::Ipv4Addr;

    fn udp_key(client: u8) -> FlowKey {
        FlowKey::new(
            Protocol::Udp,
            (Ipv4Addr::new(192, 168, 0, client), 49153),
            (Ipv4Addr::new(10, 1, 1, 1), 10),
        )
    }

    struct Recording(Vec<(FlowId, &'static str)>);

    impl FlowEventSink for Recording {
        fn log(&mut self, _time: SimTime, flow: FlowId, event: FlowEvent) {
            let name = match event {
                FlowEvent::FlowCreated { .. } => "created",
                FlowEvent::PacketSent { .. } => "sent",
                FlowEvent::PacketReceived { .. } => "received",
                FlowEvent::PacketLost { .. } => "lost",
            };
            self.0.push((flow, name));
        }
    }

    #[test]
    fn test_counts_match_calls() {
        let mut flows = FlowTracker::new();
        let key = udp_key(1);

        for i in 0..7 {
            flows.on_packet_sent(key, 512, i as f64, &mut NoOpSink);
        }
        for i in 0..4 {
            flows
                .on_packet_received(key, 512, i as f64, i as f64 + 0.01, &mut NoOpSink)
                .unwrap();
        }
        flows.on_packet_lost(key, 6.0, &mut NoOpSink);

        let stats = flows.get(&key).unwrap();
        assert_eq!(stats.tx_packets, 7);
        assert_eq!(stats.tx_bytes, 7 * 512);
        assert_eq!(stats.rx_packets, 4);
        assert_eq!(stats.rx_bytes, 4 * 512);
        assert_eq!(stats.lost_packets, 1);
        assert_eq!(stats.in_flight(), 2);
        assert!((stats.delay_sum - 0.04).abs() < 1e-9);
    }

    #[test]
    fn test_receive_before_send_rejected() {
        let mut flows = FlowTracker::new();
        let key = udp_key(1);

        let result = flows.on_packet_received(key, 100, 5.0, 4.0, &mut NoOpSink);

        assert_eq!(
            result,
            Err(SimError::ReceiveBeforeSend {
                send_time: 5.0,
                receive_time: 4.0
            })
        );
        assert!(flows.is_empty());
    }

    #[test]
    fn test_flow_ids_follow_first_observation() {
        let mut flows = FlowTracker::new();

        flows.on_packet_sent(udp_key(3), 10, 0.0, &mut NoOpSink);
        flows.on_packet_lost(udp_key(1), 0.5, &mut NoOpSink);
        flows.on_packet_sent(udp_key(3), 10, 1.0, &mut NoOpSink);

        assert_eq!(flows.flow_id(&udp_key(3)), Some(1));
        assert_eq!(flows.flow_id(&udp_key(1)), Some(2));
        assert_eq!(flows.flow_id(&udp_key(2)), None);
        assert_eq!(flows.len(), 2);
    }

    #[test]
    fn test_snapshot_sorted_and_detached() {
        let mut flows = FlowTracker::new();

        flows.on_packet_sent(udp_key(9), 10, 0.0, &mut NoOpSink);
        flows.on_packet_sent(udp_key(2), 10, 0.0, &mut NoOpSink);
        flows.on_packet_sent(udp_key(5), 10, 0.0, &mut NoOpSink);

        let snapshot = flows.snapshot(1.0);
        flows.on_packet_sent(udp_key(2), 10, 1.5, &mut NoOpSink);

        let order: Vec<_> = snapshot.iter().map(|r| r.key.source_address.octets()[3]).collect();
        assert_eq!(order, vec![2, 5, 9]);

        // later traffic does not leak into the copy
        assert_eq!(snapshot.get(&udp_key(2)).unwrap().stats.tx_packets, 1);
        assert_eq!(snapshot.get(&udp_key(2)).unwrap().flow_id, 2);
        assert_eq!(flows.get(&udp_key(2)).unwrap().tx_packets, 2);
    }

    #[test]
    fn test_jitter_and_timestamps() {
        let mut flows = FlowTracker::new();
        let key = udp_key(1);

        flows.on_packet_received(key, 1, 1.0, 1.010, &mut NoOpSink).unwrap();
        flows.on_packet_received(key, 1, 2.0, 2.030, &mut NoOpSink).unwrap();
        flows.on_packet_received(key, 1, 3.0, 3.020, &mut NoOpSink).unwrap();

        let stats = flows.get(&key).unwrap();
        assert!((stats.jitter_sum - 0.030).abs() < 1e-9);
        assert_eq!(stats.time_first_rx, Some(1.010));
        assert_eq!(stats.time_last_rx, Some(3.020));
        assert_eq!(stats.time_first_tx, None);
    }

    #[test]
    fn test_sink_sees_creation_once() {
        let mut flows = FlowTracker::new();
        let mut sink = Recording(Vec::new());
        let key = udp_key(1);

        flows.on_packet_sent(key, 1, 0.0, &mut sink);
        flows.on_packet_sent(key, 1, 0.1, &mut sink);
        flows.on_packet_lost(key, 0.2, &mut sink);

        assert_eq!(
            sink.0,
            vec![(1, "created"), (1, "sent"), (1, "sent"), (1, "lost")]
        );
    }

    #[test]
    fn test_reset_clears_flows() {
        let mut flows = FlowTracker::new();
        flows.on_packet_sent(udp_key(1), 1, 0.0, &mut NoOpSink);
        flows.reset();
        assert!(flows.is_empty());
        assert!(flows.snapshot(0.0).is_empty());
    }
}

//! In-memory flow event sink for tests

use std::cell::RefCell;
use std::rc::Rc;

use flow_sim::{FlowEvent, FlowEventSink, FlowId, SimTime};

#[derive(Debug, Clone)]
pub struct EventRecord {
    pub time: SimTime,
    pub flow: FlowId,
    pub event: FlowEvent,
}

/// Collects events in memory; clone the handle before boxing the sink
#[derive(Clone, Default)]
pub struct CollectorEventSink {
    events: Rc<RefCell<Vec<EventRecord>>>,
}

#[derive(Debug, Default, PartialEq)]
pub struct EventTypeCounts {
    pub flow_created: usize,
    pub packet_sent: usize,
    pub packet_received: usize,
    pub packet_lost: usize,
}

impl CollectorEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn for_flow(&self, flow: FlowId) -> Vec<EventRecord> {
        self.events
            .borrow()
            .iter()
            .filter(|e| e.flow == flow)
            .cloned()
            .collect()
    }

    /// Event times in the order they were logged
    pub fn times(&self) -> Vec<SimTime> {
        self.events.borrow().iter().map(|e| e.time).collect()
    }

    pub fn count_by_type(&self) -> EventTypeCounts {
        let mut counts = EventTypeCounts::default();
        for record in self.events.borrow().iter() {
            match record.event {
                FlowEvent::FlowCreated { .. } => counts.flow_created += 1,
                FlowEvent::PacketSent { .. } => counts.packet_sent += 1,
                FlowEvent::PacketReceived { .. } => counts.packet_received += 1,
                FlowEvent::PacketLost { .. } => counts.packet_lost += 1,
            }
        }
        counts
    }
}

impl FlowEventSink for CollectorEventSink {
    fn log(&mut self, time: SimTime, flow: FlowId, event: FlowEvent) {
        self.events
            .borrow_mut()
            .push(EventRecord { time, flow, event });
    }
}

#[cfg(test)]
mod tests {
    use super::super::event_sinks::MultiEventSink;
    use super::*;
    use flow_sim::{FlowKey, Protocol};
    use std::net::Ipv4Addr;

    fn key() -> FlowKey {
        FlowKey::new(
            Protocol::Udp,
            (Ipv4Addr::new(192, 168, 0, 1), 49153),
            (Ipv4Addr::new(10, 1, 1, 1), 9),
        )
    }

    #[test]
    fn test_records_time_and_flow() {
        let collector = CollectorEventSink::new();
        let mut sink = collector.clone();

        sink.log(2.0, 1, FlowEvent::PacketSent { key: key(), bytes: 1024 });
        sink.log(2.5, 2, FlowEvent::PacketLost { key: key() });

        assert_eq!(collector.len(), 2);
        assert_eq!(collector.times(), vec![2.0, 2.5]);
        assert_eq!(collector.for_flow(2)[0].time, 2.5);
    }

    #[test]
    fn test_multi_sink_fans_out() {
        let first = CollectorEventSink::new();
        let second = CollectorEventSink::new();

        let mut multi = MultiEventSink::new();
        assert!(multi.is_empty());
        multi.add_sink(Box::new(first.clone()));
        multi.add_sink(Box::new(second.clone()));

        multi.log(1.0, 1, FlowEvent::FlowCreated { key: key() });

        assert_eq!(first.count_by_type().flow_created, 1);
        assert_eq!(second.times(), vec![1.0]);
    }
}

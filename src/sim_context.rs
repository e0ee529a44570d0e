use log::info;

use crate::sim_flows::{FlowSnapshot, FlowTracker};
use crate::sim_interface::{EventId, FlowEventSink, FlowKey, NoOpSink, SimError, SimTime};
use crate::sim_report::{build_report, SimReport};
use crate::sim_scheduler::Scheduler;

/// State handed to every event action
///
/// `world` is whatever the scenario needs on top of the flow tracker
/// (topology, random source, application state).
pub struct SimState<W> {
    pub flows: FlowTracker,
    pub sink: Box<dyn FlowEventSink>,
    pub world: W,
}

impl<W> SimState<W> {
    pub fn packet_sent(&mut self, key: FlowKey, bytes: u32, send_time: SimTime) {
        self.flows
            .on_packet_sent(key, bytes, send_time, self.sink.as_mut());
    }

    pub fn packet_received(
        &mut self,
        key: FlowKey,
        bytes: u32,
        send_time: SimTime,
        receive_time: SimTime,
    ) -> Result<(), SimError> {
        self.flows
            .on_packet_received(key, bytes, send_time, receive_time, self.sink.as_mut())
    }

    pub fn packet_lost(&mut self, key: FlowKey, time: SimTime) {
        self.flows.on_packet_lost(key, time, self.sink.as_mut());
    }
}

/// Owns one simulation run: the timeline plus the flow state it mutates
///
/// Lifecycle: create, schedule the initial events, [`SimContext::run_until`],
/// then [`SimContext::report`].
///
/// # Example
/// ```
/// use flow_sim::sim_context::SimContext;
/// use flow_sim::sim_interface::{FlowKey, Protocol};
/// use std::net::Ipv4Addr;
///
/// let key = FlowKey::new(
///     Protocol::Udp,
///     (Ipv4Addr::new(192, 168, 0, 1), 49153),
///     (Ipv4Addr::new(10, 1, 1, 1), 10),
/// );
///
/// let mut ctx = SimContext::new(());
/// ctx.schedule(1.0, move |s, state| {
///     let sent = s.now();
///     state.packet_sent(key, 1024, sent);
///     s.schedule(0.004, move |s, state| {
///         state.packet_received(key, 1024, sent, s.now()).unwrap();
///     })
///     .unwrap();
/// })
/// .unwrap();
///
/// ctx.run_until(2.0).unwrap();
/// let report = ctx.report().unwrap();
/// assert_eq!(report.flows[0].rx_packets, 1);
/// ```
pub struct SimContext<W> {
    scheduler: Scheduler<SimState<W>>,
    state: SimState<W>,

    /// Stop time of the most recent run, None before the first run
    stop_time: Option<SimTime>,
}

impl<W> SimContext<W> {
    pub fn new(world: W) -> Self {
        Self::with_sink(world, Box::new(NoOpSink))
    }

    pub fn with_sink(world: W, sink: Box<dyn FlowEventSink>) -> Self {
        Self {
            scheduler: Scheduler::new(),
            state: SimState {
                flows: FlowTracker::new(),
                sink,
                world,
            },
            stop_time: None,
        }
    }

    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    pub fn schedule<F>(&mut self, delay: SimTime, action: F) -> Result<EventId, SimError>
    where
        F: FnOnce(&mut Scheduler<SimState<W>>, &mut SimState<W>) + 'static,
    {
        self.scheduler.schedule(delay, action)
    }

    pub fn schedule_at<F>(&mut self, time: SimTime, action: F) -> Result<EventId, SimError>
    where
        F: FnOnce(&mut Scheduler<SimState<W>>, &mut SimState<W>) + 'static,
    {
        self.scheduler.schedule_at(time, action)
    }

    pub fn cancel(&mut self, id: EventId) -> bool {
        self.scheduler.cancel(id)
    }

    /// Drive the timeline up to `stop_time`
    pub fn run_until(&mut self, stop_time: SimTime) -> Result<u64, SimError> {
        let ran = self.scheduler.run_until(stop_time, &mut self.state)?;
        self.stop_time = Some(stop_time);

        info!(
            "simulation stopped at {:.3}s: {} events, {} flows, {} still queued",
            stop_time,
            ran,
            self.state.flows.len(),
            self.scheduler.pending()
        );
        Ok(ran)
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        self.state.flows.snapshot(self.now())
    }

    /// Report over the whole run, using the last stop time as duration
    ///
    /// Fails with `NotRun` before the first call to `run_until`.
    pub fn report(&self) -> Result<SimReport, SimError> {
        let duration = self.stop_time.ok_or(SimError::NotRun)?;
        build_report(&self.snapshot(), duration)
    }

    pub fn scheduler(&self) -> &Scheduler<SimState<W>> {
        &self.scheduler
    }

    pub fn state(&self) -> &SimState<W> {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SimState<W> {
        &mut self.state
    }

    pub fn world(&self) -> &W {
        &self.state.world
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim_interface::{ErrorKind, Protocol};
    use std::net::Ipv4Addr;

    fn key() -> FlowKey {
        FlowKey::new(
            Protocol::Tcp,
            (Ipv4Addr::new(192, 168, 0, 1), 49153),
            (Ipv4Addr::new(10, 1, 1, 1), 9),
        )
    }

    #[test]
    fn test_report_before_run_is_invalid_state() {
        let ctx = SimContext::new(());
        let err = ctx.report().unwrap_err();
        assert_eq!(err, SimError::NotRun);
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_periodic_sender_with_cancel() {
        // world counts how many times the sender fired
        let mut ctx = SimContext::new(0u32);

        fn send(s: &mut Scheduler<SimState<u32>>, state: &mut SimState<u32>) {
            let now = s.now();
            state.world += 1;
            state.packet_sent(key(), 100, now);
            s.schedule(0.001, move |s, state| {
                state.packet_received(key(), 100, now, s.now()).unwrap();
            })
            .unwrap();
            s.schedule(1.0, send).unwrap();
        }

        ctx.schedule(1.0, send).unwrap();
        let stopper = ctx.schedule(3.5, |_, state| state.world = 1000).unwrap();
        assert!(ctx.cancel(stopper));

        ctx.run_until(5.0).unwrap();

        // sends at 1, 2, 3, 4, 5
        assert_eq!(*ctx.world(), 5);

        let report = ctx.report().unwrap();
        let flow = &report.flows[0];
        assert_eq!(flow.tx_packets, 5);
        // receive of the t=5 send lands at 5.001, past the stop time
        assert_eq!(flow.rx_packets, 4);
        assert!((flow.avg_delay_ms.unwrap() - 1.0).abs() < 1e-6);
        assert_eq!(report.duration, 5.0);
    }

    #[test]
    fn test_receive_error_surfaces_from_state() {
        let mut ctx = SimContext::new(());
        let result = ctx.state_mut().packet_received(key(), 1, 2.0, 1.0);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidState);
        assert!(ctx.state().flows.is_empty());
    }
}

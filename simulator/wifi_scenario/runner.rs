//! Scenario runner: drives TCP/UDP client traffic through the event scheduler

use super::config::{ConfigError, LinkProfile, ScenarioConfig};
use super::event_sinks::{ConsoleEventSink, CsvEventSink, MultiEventSink};
use super::stats::{DeliveryCounters, ScenarioResult};
use super::topology::{Topology, AP_WIRED_ADDRESS, SERVER_ADDRESS};
use flow_sim::sim_context::{SimContext, SimState};
use flow_sim::sim_scheduler::Scheduler;
use flow_sim::{FlowEventSink, FlowKey, NoOpSink, Protocol, SimError};
use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;

type State = SimState<ScenarioWorld>;
type Sched = Scheduler<State>;

/// Everything the event actions need besides the flow tracker
pub struct ScenarioWorld {
    config: ScenarioConfig,
    topology: Topology,
    rng: StdRng,
    counters: DeliveryCounters,
    errors: Vec<SimError>,
}

/// Which way a packet travels
#[derive(Debug, Clone, Copy, PartialEq)]
enum Direction {
    /// client -> access point -> server
    Uplink,
    /// server -> access point -> client
    Downlink,
}

/// Errors that abort a scenario
#[derive(Debug)]
pub enum ScenarioError {
    Config(ConfigError),
    Sim(SimError),
    Io(std::io::Error),
    Export(String),
}

impl fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioError::Config(e) => write!(f, "invalid configuration: {}", e),
            ScenarioError::Sim(e) => write!(f, "simulation error: {}", e),
            ScenarioError::Io(e) => write!(f, "i/o error: {}", e),
            ScenarioError::Export(e) => write!(f, "export failed: {}", e),
        }
    }
}

impl std::error::Error for ScenarioError {}

impl From<ConfigError> for ScenarioError {
    fn from(e: ConfigError) -> Self {
        ScenarioError::Config(e)
    }
}

impl From<SimError> for ScenarioError {
    fn from(e: SimError) -> Self {
        ScenarioError::Sim(e)
    }
}

impl From<std::io::Error> for ScenarioError {
    fn from(e: std::io::Error) -> Self {
        ScenarioError::Io(e)
    }
}

/// Wired + Wi-Fi scenario runner
pub struct ScenarioRunner {
    seed: [u8; 32],
    context: SimContext<ScenarioWorld>,
}

impl ScenarioRunner {
    /// Create a runner with sinks taken from the output configuration
    pub fn new(config: ScenarioConfig) -> Result<Self, ScenarioError> {
        let mut sinks = MultiEventSink::new();
        if config.output.enable_console {
            sinks.add_sink(Box::new(ConsoleEventSink));
        }
        if let Some(ref path) = config.output.trace_csv_path {
            sinks.add_sink(Box::new(CsvEventSink::new(path)?));
            info!("tracing packet events to {}", path);
        }

        let sink: Box<dyn FlowEventSink> = if sinks.is_empty() {
            Box::new(NoOpSink)
        } else {
            Box::new(sinks)
        };

        Self::with_sink(config, sink)
    }

    /// Create a runner that reports flow events to `sink`
    pub fn with_sink(
        config: ScenarioConfig,
        sink: Box<dyn FlowEventSink>,
    ) -> Result<Self, ScenarioError> {
        config.validate()?;

        let seed = config.resolve_seed();
        let world = ScenarioWorld {
            topology: Topology::new(config.n_clients),
            rng: StdRng::from_seed(seed),
            counters: DeliveryCounters::default(),
            errors: Vec::new(),
            config,
        };

        let mut runner = Self {
            seed,
            context: SimContext::with_sink(world, sink),
        };
        runner.install_applications()?;

        Ok(runner)
    }

    /// Schedule the first send of every client application
    fn install_applications(&mut self) -> Result<(), ScenarioError> {
        let world = self.context.world();
        let config = &world.config;
        let (tcp_clients, udp_clients) = config.client_split();
        let tcp_start = config.tcp_start();
        let udp_start = config.udp_start();

        // first half of the clients run TCP, the rest UDP
        let tcp_flows: Vec<FlowKey> = (0..tcp_clients)
            .map(|slot| {
                let port = config.server_port(Protocol::Tcp, slot);
                world.topology.client_flow(slot, Protocol::Tcp, port)
            })
            .collect();
        let udp_flows: Vec<FlowKey> = (0..udp_clients)
            .map(|slot| {
                let port = config.server_port(Protocol::Udp, slot);
                world
                    .topology
                    .client_flow(tcp_clients + slot, Protocol::Udp, port)
            })
            .collect();

        for key in tcp_flows {
            self.context
                .schedule_at(tcp_start, move |s, state| tcp_send(s, state, key))?;
        }
        info!("{} TCP clients start at {:.1}s", tcp_clients, tcp_start);

        for key in udp_flows {
            self.context
                .schedule_at(udp_start, move |s, state| udp_send(s, state, key, 0))?;
        }
        info!("{} UDP clients start at {:.1}s", udp_clients, udp_start);

        Ok(())
    }

    /// Main simulation loop
    pub fn run(mut self) -> Result<ScenarioResult, ScenarioError> {
        let config = self.context.world().config.clone();

        println!("Starting {} simulation...", config.title());
        println!("  Clients: {}", config.n_clients);
        println!(
            "  Server: {} (access point {} / {})",
            SERVER_ADDRESS,
            AP_WIRED_ADDRESS,
            self.context.world().topology.ap_wireless
        );
        println!("  Simulation time: {}s", config.simulation_time);
        println!("  Seed: {:?}", self.seed);
        println!();

        info!("starting simulation");
        let executed = self.context.run_until(config.simulation_time)?;
        info!("simulation finished");

        let report = self.context.report()?;
        report.log_summary();

        if let Some(ref path) = config.output.report_csv_path {
            report.export_csv(path)?;
        }
        if let Some(ref path) = config.output.report_yaml_path {
            report
                .export_yaml(path)
                .map_err(|e| ScenarioError::Export(e.to_string()))?;
        }

        let world = self.context.world();
        if !world.errors.is_empty() {
            warn!("{} errors raised by event actions", world.errors.len());
        }

        Ok(ScenarioResult {
            seed_used: self.seed,
            title: config.title(),
            events_executed: executed,
            events_pending: self.context.scheduler().pending(),
            delivery: world.counters.clone(),
            errors: world.errors.clone(),
            report,
        })
    }
}

/// Queue `action`, keeping any scheduling error for the result
fn defer<F>(s: &mut Sched, world: &mut ScenarioWorld, delay: f64, action: F)
where
    F: FnOnce(&mut Sched, &mut State) + 'static,
{
    if let Err(e) = s.schedule(delay, action) {
        warn!("could not schedule event: {}", e);
        world.errors.push(e);
    }
}

/// One hop: returns the time spent on it and whether the packet survived
fn cross_link(rng: &mut StdRng, link: &LinkProfile, bytes: u32) -> (f64, bool) {
    let mut delay = link.base_delay(bytes);
    if link.jitter_ms > 0.0 {
        delay += rng.gen_range(0.0..link.jitter_ms) / 1000.0;
    }
    let delivered = !rng.gen_bool(link.loss_fraction);
    (delay, delivered)
}

/// Send one packet on `key` and schedule its arrival or loss
///
/// Delivered TCP data segments trigger an ack on the reverse flow.
fn transmit(s: &mut Sched, state: &mut State, key: FlowKey, bytes: u32, direction: Direction) {
    let sent = s.now();
    state.packet_sent(key, bytes, sent);

    let world = &mut state.world;
    let hops = match direction {
        Direction::Uplink => [&world.config.wireless, &world.config.wired],
        Direction::Downlink => [&world.config.wired, &world.config.wireless],
    };

    let mut delay = 0.0;
    let mut dropped = false;
    for (hop, link) in hops.into_iter().enumerate() {
        let (hop_delay, delivered) = cross_link(&mut world.rng, link, bytes);
        delay += hop_delay;
        if !delivered {
            // wireless is hop 0 going up, hop 1 coming down
            let wireless = (hop == 0) == (direction == Direction::Uplink);
            if wireless {
                world.counters.dropped_wireless += 1;
            } else {
                world.counters.dropped_wired += 1;
            }
            dropped = true;
            break;
        }
    }

    if !dropped && direction == Direction::Uplink && sent + delay < world.config.server_start {
        world.counters.dropped_server_closed += 1;
        dropped = true;
    }

    if dropped {
        trace!("{} lost after {:.6}s", key, delay);
        defer(s, world, delay, move |s, state| {
            state.packet_lost(key, s.now());
        });
        return;
    }

    let is_data = direction == Direction::Uplink;
    defer(s, world, delay, move |s, state| {
        if let Err(e) = state.packet_received(key, bytes, sent, s.now()) {
            state.world.errors.push(e);
            return;
        }

        if is_data && key.protocol == Protocol::Tcp {
            let ack_size = state.world.config.tcp.ack_size;
            state.world.counters.ack_packets += 1;
            transmit(s, state, key.reversed(), ack_size, Direction::Downlink);
        }
    });
}

/// Bulk sender: one segment every interval until the run stops
fn tcp_send(s: &mut Sched, state: &mut State, key: FlowKey) {
    let send_size = state.world.config.tcp.send_size;
    let interval = state.world.config.tcp.interval_s;

    state.world.counters.data_packets += 1;
    transmit(s, state, key, send_size, Direction::Uplink);

    defer(s, &mut state.world, interval, move |s, state| {
        tcp_send(s, state, key)
    });
}

/// UDP client: `max_packets` datagrams (0 = no limit), one per interval
fn udp_send(s: &mut Sched, state: &mut State, key: FlowKey, sent: u64) {
    let max_packets = state.world.config.udp.max_packets;
    if max_packets > 0 && sent >= max_packets {
        debug!("{} done after {} packets", key, sent);
        return;
    }

    let packet_size = state.world.config.udp.packet_size;
    let interval = state.world.config.udp.interval_s;

    state.world.counters.data_packets += 1;
    transmit(s, state, key, packet_size, Direction::Uplink);

    defer(s, &mut state.world, interval, move |s, state| {
        udp_send(s, state, key, sent + 1)
    });
}

#[cfg(test)]
mod tests {
    use super::super::config::{TrafficMode, UdpAppConfig};
    use super::super::collector::CollectorEventSink;
    use super::*;

    fn lossless(mut config: ScenarioConfig) -> ScenarioConfig {
        config.wired.loss_fraction = 0.0;
        config.wired.jitter_ms = 0.0;
        config.wireless.loss_fraction = 0.0;
        config.wireless.jitter_ms = 0.0;
        config.seed = Some([7u8; 32]);
        config
    }

    #[test]
    fn test_fixed_seed_is_deterministic() {
        let config = ScenarioConfig {
            seed: Some([42u8; 32]),
            simulation_time: 4.0,
            ..Default::default()
        };

        let a = ScenarioRunner::new(config.clone()).unwrap().run().unwrap();
        let b = ScenarioRunner::new(config).unwrap().run().unwrap();

        assert_eq!(a.report, b.report);
        assert_eq!(a.events_executed, b.events_executed);
    }

    #[test]
    fn test_lossless_udp_delay() {
        let config = lossless(ScenarioConfig {
            n_clients: 1,
            mode: TrafficMode::Udp,
            udp: UdpAppConfig {
                packet_size: 1000,
                interval_s: 1.0,
                ..Default::default()
            },
            ..Default::default()
        });
        let expected_delay =
            config.wireless.base_delay(1000) + config.wired.base_delay(1000);

        let result = ScenarioRunner::new(config).unwrap().run().unwrap();
        let flow = &result.report.flows[0];

        // sends at 2..=11, the last one is still in flight at the stop time
        assert_eq!(flow.tx_packets, 10);
        assert_eq!(flow.rx_packets, 9);
        assert_eq!(flow.lost_packets, 0);
        assert_eq!(flow.loss_ratio_pct, Some(0.0));
        assert!((flow.avg_delay_ms.unwrap() - expected_delay * 1000.0).abs() < 1e-6);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_mixed_mode_flows() {
        let config = lossless(ScenarioConfig {
            n_clients: 4,
            simulation_time: 3.0,
            ..Default::default()
        });

        let result = ScenarioRunner::new(config).unwrap().run().unwrap();
        let report = &result.report;

        let tcp = report.flows.iter().filter(|f| f.protocol == Protocol::Tcp).count();
        let udp = report.flows.iter().filter(|f| f.protocol == Protocol::Udp).count();

        // two TCP data flows with their ack flows, two UDP flows
        assert_eq!(tcp, 4);
        assert_eq!(udp, 2);
        assert!(report
            .flows
            .iter()
            .any(|f| f.source_address == SERVER_ADDRESS && f.protocol == Protocol::Tcp));
        assert!(result.delivery.ack_packets > 0);
    }

    #[test]
    fn test_udp_max_packets() {
        let config = lossless(ScenarioConfig {
            n_clients: 2,
            mode: TrafficMode::Udp,
            udp: UdpAppConfig {
                max_packets: 1,
                interval_s: 1.0,
                ..Default::default()
            },
            ..Default::default()
        });

        let result = ScenarioRunner::new(config).unwrap().run().unwrap();

        assert_eq!(result.report.flows.len(), 2);
        for flow in &result.report.flows {
            assert_eq!(flow.tx_packets, 1);
            assert_eq!(flow.rx_packets, 1);
        }
    }

    #[test]
    fn test_per_client_server_ports() {
        let mut config = lossless(ScenarioConfig {
            n_clients: 4,
            simulation_time: 2.5,
            ..Default::default()
        });
        config.tcp.port_per_client = true;
        config.tcp.start_time = Some(2.0);
        config.udp.port = 14;
        config.udp.port_per_client = true;

        let result = ScenarioRunner::new(config).unwrap().run().unwrap();
        let mut uplink: Vec<(Protocol, u16)> = result
            .report
            .flows
            .iter()
            .filter(|f| f.destination_address == SERVER_ADDRESS)
            .map(|f| (f.protocol, f.destination_port))
            .collect();
        uplink.sort();

        assert_eq!(
            uplink,
            vec![
                (Protocol::Tcp, 9),
                (Protocol::Tcp, 10),
                (Protocol::Udp, 14),
                (Protocol::Udp, 15)
            ]
        );
    }

    #[test]
    fn test_odd_clients_rejected_in_mixed_mode() {
        let config = ScenarioConfig {
            n_clients: 3,
            ..Default::default()
        };
        assert!(matches!(
            ScenarioRunner::new(config),
            Err(ScenarioError::Config(ConfigError::OddClientCount(3)))
        ));
    }

    #[test]
    fn test_server_not_listening_drops_packets() {
        let config = lossless(ScenarioConfig {
            n_clients: 1,
            mode: TrafficMode::Udp,
            server_start: 5.0,
            simulation_time: 6.0,
            udp: UdpAppConfig {
                interval_s: 1.0,
                start_time: Some(1.0),
                ..Default::default()
            },
            ..Default::default()
        });

        let result = ScenarioRunner::new(config).unwrap().run().unwrap();
        let flow = &result.report.flows[0];

        // sends at 1, 2, 3, 4 arrive before the sink opens
        assert_eq!(result.delivery.dropped_server_closed, 4);
        assert_eq!(flow.lost_packets, 4);
        assert_eq!(flow.rx_packets, 1);
    }

    #[test]
    fn test_total_loss_link() {
        let mut config = lossless(ScenarioConfig {
            n_clients: 1,
            mode: TrafficMode::Udp,
            simulation_time: 3.0,
            ..Default::default()
        });
        config.wireless.loss_fraction = 1.0;

        let result = ScenarioRunner::new(config).unwrap().run().unwrap();
        let flow = &result.report.flows[0];

        assert_eq!(flow.rx_packets, 0);
        assert_eq!(flow.avg_delay_ms, None);
        assert_eq!(flow.loss_ratio_pct, Some(100.0));
        assert_eq!(result.delivery.dropped_wired, 0);
        assert!(result.delivery.dropped_wireless > 0);
    }

    #[test]
    fn test_sink_receives_events() {
        let collector = CollectorEventSink::new();
        let config = lossless(ScenarioConfig {
            n_clients: 1,
            mode: TrafficMode::Udp,
            simulation_time: 2.5,
            udp: UdpAppConfig {
                interval_s: 0.1,
                ..Default::default()
            },
            ..Default::default()
        });

        let result = ScenarioRunner::with_sink(config, Box::new(collector.clone()))
            .unwrap()
            .run()
            .unwrap();
        let counts = collector.count_by_type();

        assert_eq!(counts.flow_created, 1);
        assert_eq!(counts.packet_sent as u64, result.report.flows[0].tx_packets);
        assert_eq!(counts.packet_received as u64, result.report.flows[0].rx_packets);
        assert_eq!(collector.for_flow(1).len(), collector.len());
    }
}

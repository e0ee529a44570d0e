//! Configuration for the wired + Wi-Fi traffic scenarios

use super::topology::{TCP_PORT, UDP_PORT};
use flow_sim::{Port, Protocol};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::fmt;

/// Main configuration for one scenario run
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    /// Number of wireless clients
    pub n_clients: usize,

    /// Simulation stop time and report duration (seconds)
    pub simulation_time: f64,

    /// Random seed (None = generate random)
    pub seed: Option<[u8; 32]>,

    /// Which applications the clients run
    pub mode: TrafficMode,

    /// Clients move around; selects the wireless link defaults
    pub mobility: bool,

    /// Server <-> access point link
    pub wired: LinkProfile,

    /// Access point <-> client link
    pub wireless: LinkProfile,

    /// Server sinks accept packets from this time on
    pub server_start: f64,

    pub tcp: TcpAppConfig,
    pub udp: UdpAppConfig,

    pub output: OutputConfig,
}

/// Traffic mix
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficMode {
    /// Every client runs a TCP bulk sender
    Tcp,
    /// Every client runs a UDP client
    Udp,
    /// First half TCP, second half UDP (client count must be even)
    Mixed,
}

impl fmt::Display for TrafficMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrafficMode::Tcp => write!(f, "TCP"),
            TrafficMode::Udp => write!(f, "UDP"),
            TrafficMode::Mixed => write!(f, "UDP/TCP"),
        }
    }
}

/// One hop of the path
#[derive(Debug, Clone, PartialEq)]
pub struct LinkProfile {
    /// Propagation delay
    pub delay_ms: f64,

    /// Extra delay drawn uniformly from [0, jitter_ms)
    pub jitter_ms: f64,

    /// Probability a packet is dropped on this hop
    pub loss_fraction: f64,

    /// Used for the serialization delay of each packet
    pub data_rate_mbps: f64,
}

impl LinkProfile {
    /// 100 Mbps point-to-point, 2 ms
    pub fn wired() -> Self {
        Self {
            delay_ms: 2.0,
            jitter_ms: 0.0,
            loss_fraction: 0.0,
            data_rate_mbps: 100.0,
        }
    }

    /// 802.11g with clients standing still near the access point
    pub fn wireless_static() -> Self {
        Self {
            delay_ms: 1.0,
            jitter_ms: 0.5,
            loss_fraction: 0.005,
            data_rate_mbps: 54.0,
        }
    }

    /// 802.11g with clients walking around a 100x100 m area
    pub fn wireless_mobile() -> Self {
        Self {
            delay_ms: 1.5,
            jitter_ms: 3.0,
            loss_fraction: 0.05,
            data_rate_mbps: 24.0,
        }
    }

    /// Propagation plus serialization delay for `bytes`, without jitter
    pub fn base_delay(&self, bytes: u32) -> f64 {
        self.delay_ms / 1000.0 + bytes as f64 * 8.0 / (self.data_rate_mbps * 1e6)
    }
}

/// Bulk TCP sender, never runs out of data
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct TcpAppConfig {
    /// Segment size
    pub send_size: u32,

    /// Time between segments
    pub interval_s: f64,

    /// Size of the ack each delivered segment triggers
    pub ack_size: u32,

    /// Defaults to the mode's client start time
    pub start_time: Option<f64>,

    /// Server port (first port when `port_per_client` is set)
    pub port: Port,

    /// Client n of this application sends to `port + n`
    pub port_per_client: bool,
}

impl Default for TcpAppConfig {
    fn default() -> Self {
        Self {
            send_size: 1024,
            interval_s: 0.001,
            ack_size: 40,
            start_time: None,
            port: TCP_PORT,
            port_per_client: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct UdpAppConfig {
    pub packet_size: u32,
    pub interval_s: f64,

    /// 0 = unlimited
    pub max_packets: u64,

    pub start_time: Option<f64>,

    pub port: Port,
    pub port_per_client: bool,
}

impl Default for UdpAppConfig {
    fn default() -> Self {
        Self {
            packet_size: 1024,
            // 1 Mbps offered load
            interval_s: 0.008192,
            max_packets: 0,
            start_time: None,
            port: UDP_PORT,
            port_per_client: false,
        }
    }
}

/// Where results go besides the console
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Print every flow event to the console
    pub enable_console: bool,

    /// Per-packet event trace
    pub trace_csv_path: Option<String>,

    /// Flow report as CSV
    pub report_csv_path: Option<String>,

    /// Flow report as YAML
    pub report_yaml_path: Option<String>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            n_clients: 4,
            simulation_time: 11.0,
            seed: None,
            mode: TrafficMode::Mixed,
            mobility: false,
            wired: LinkProfile::wired(),
            wireless: LinkProfile::wireless_static(),
            server_start: 1.0,
            tcp: TcpAppConfig::default(),
            udp: UdpAppConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Errors in a scenario configuration
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Mixed mode splits clients 50/50
    OddClientCount(usize),

    /// Clients are numbered inside one /24
    ClientCount(usize),

    /// A probability outside [0, 1]
    Probability { field: &'static str, value: f64 },

    /// A time, interval or rate that must be positive
    NotPositive { field: &'static str, value: f64 },

    /// An application starts after the simulation ends
    StartAfterStop { start: f64, stop: f64 },

    /// Per-client server ports run past 65535
    PortRange { base: Port, clients: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::OddClientCount(n) => write!(
                f,
                "client count {} must be even to split 50% TCP and 50% UDP",
                n
            ),
            ConfigError::ClientCount(n) => write!(f, "client count {} not in 1..=253", n),
            ConfigError::Probability { field, value } => {
                write!(f, "{} = {} is not a probability", field, value)
            }
            ConfigError::NotPositive { field, value } => {
                write!(f, "{} = {} must be positive", field, value)
            }
            ConfigError::StartAfterStop { start, stop } => {
                write!(f, "application start {} is after stop {}", start, stop)
            }
            ConfigError::PortRange { base, clients } => {
                write!(f, "{} ports from {} do not fit below 65536", clients, base)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn probability(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Probability { field, value })
    }
}

fn check_ports(base: Port, per_client: bool, clients: usize) -> Result<(), ConfigError> {
    if per_client && base as usize + clients > Port::MAX as usize + 1 {
        return Err(ConfigError::PortRange { base, clients });
    }
    Ok(())
}

impl ScenarioConfig {
    /// Get or generate seed
    pub fn resolve_seed(&self) -> [u8; 32] {
        self.seed.unwrap_or_else(|| {
            let mut temp_rng = StdRng::from_entropy();
            let mut seed = [0u8; 32];
            temp_rng.fill_bytes(&mut seed);
            seed
        })
    }

    /// Start time of the TCP senders
    ///
    /// In mixed runs TCP starts together with the servers, UDP a second later.
    pub fn tcp_start(&self) -> f64 {
        self.tcp.start_time.unwrap_or(match self.mode {
            TrafficMode::Mixed => self.server_start,
            _ => self.server_start + 1.0,
        })
    }

    pub fn udp_start(&self) -> f64 {
        self.udp.start_time.unwrap_or(self.server_start + 1.0)
    }

    /// Server port the `slot`-th client of `protocol` sends to
    pub fn server_port(&self, protocol: Protocol, slot: usize) -> Port {
        let (base, per_client) = match protocol {
            Protocol::Tcp => (self.tcp.port, self.tcp.port_per_client),
            Protocol::Udp => (self.udp.port, self.udp.port_per_client),
        };

        if per_client {
            base + slot as Port
        } else {
            base
        }
    }

    /// Number of (tcp, udp) clients
    pub fn client_split(&self) -> (usize, usize) {
        match self.mode {
            TrafficMode::Tcp => (self.n_clients, 0),
            TrafficMode::Udp => (0, self.n_clients),
            TrafficMode::Mixed => (self.n_clients / 2, self.n_clients - self.n_clients / 2),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_clients == 0 || self.n_clients > 253 {
            return Err(ConfigError::ClientCount(self.n_clients));
        }
        if self.mode == TrafficMode::Mixed && self.n_clients % 2 != 0 {
            return Err(ConfigError::OddClientCount(self.n_clients));
        }

        positive("simulation_time", self.simulation_time)?;
        for (name, link) in [("wired", &self.wired), ("wireless", &self.wireless)] {
            probability(name, link.loss_fraction)?;
            positive(name, link.data_rate_mbps)?;
            for value in [link.delay_ms, link.jitter_ms] {
                if !(value.is_finite() && value >= 0.0) {
                    return Err(ConfigError::NotPositive { field: name, value });
                }
            }
        }

        let (tcp_clients, udp_clients) = self.client_split();
        if tcp_clients > 0 {
            positive("tcp.interval_s", self.tcp.interval_s)?;
            positive("tcp.send_size", self.tcp.send_size as f64)?;
            self.check_start(self.tcp_start())?;
            check_ports(self.tcp.port, self.tcp.port_per_client, tcp_clients)?;
        }
        if udp_clients > 0 {
            positive("udp.interval_s", self.udp.interval_s)?;
            positive("udp.packet_size", self.udp.packet_size as f64)?;
            self.check_start(self.udp_start())?;
            check_ports(self.udp.port, self.udp.port_per_client, udp_clients)?;
        }

        Ok(())
    }

    fn check_start(&self, start: f64) -> Result<(), ConfigError> {
        if !(start >= 0.0) || start > self.simulation_time {
            return Err(ConfigError::StartAfterStop {
                start,
                stop: self.simulation_time,
            });
        }
        Ok(())
    }

    /// Report headline
    pub fn title(&self) -> String {
        format!(
            "{} {} Mobility",
            self.mode,
            if self.mobility { "with" } else { "without" }
        )
    }
}

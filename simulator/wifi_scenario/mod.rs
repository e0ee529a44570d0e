//! Wired + Wi-Fi traffic scenarios
//!
//! A server on a point-to-point link behind an access point, with wireless
//! clients running TCP bulk senders, UDP clients, or half of each. Link
//! behaviour is reduced to delay, jitter and loss per hop; mobility only
//! changes the wireless link profile.

#[cfg(test)]
pub mod collector;
pub mod config;
pub mod event_sinks;
pub mod runner;
pub mod stats;
pub mod topology;

#[allow(unused_imports)]
pub use config::{
    ConfigError, LinkProfile, OutputConfig, ScenarioConfig, TcpAppConfig, TrafficMode,
    UdpAppConfig,
};
#[allow(unused_imports)]
pub use runner::{ScenarioError, ScenarioRunner};
#[allow(unused_imports)]
pub use stats::{DeliveryCounters, ScenarioResult};

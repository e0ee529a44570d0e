//! # flow_sim - Discrete-Event Flow Simulator Core
//!
//! A small, deterministic discrete-event simulation core for network traffic
//! experiments. Link, MAC and transport behaviour live outside this crate;
//! scenario code feeds packet events in and reads flow statistics out.
//!
//! ## Core Components
//!
//! - **Scheduler**: time-ordered event queue with deterministic tie-breaking
//!   and cancellation
//! - **FlowTracker**: per five-tuple packet, byte and delay counters
//! - **Report**: throughput, average delay, jitter and loss per flow
//! - **SimContext**: owns one run (scheduler + flow state), no globals
//!
//! ## Usage
//!
//! ```no_run
//! use flow_sim::sim_context::SimContext;
//! use flow_sim::{FlowKey, Protocol};
//! use std::net::Ipv4Addr;
//!
//! let key = FlowKey::new(
//!     Protocol::Tcp,
//!     (Ipv4Addr::new(192, 168, 0, 1), 49153),
//!     (Ipv4Addr::new(10, 1, 1, 1), 9),
//! );
//!
//! let mut ctx = SimContext::new(());
//! ctx.schedule(1.0, move |s, state| state.packet_sent(key, 1024, s.now()))
//!     .unwrap();
//!
//! ctx.run_until(11.0).unwrap();
//! print!("{}", ctx.report().unwrap().render_table("TCP"));
//! ```
//!
//! ## Scenarios
//!
//! The `simulator/` directory holds the wired + Wi-Fi scenario driver and the
//! `scenario_runner` binary that loads scenarios from YAML files.

pub mod sim_context;
pub mod sim_flows;
pub mod sim_interface;
pub mod sim_report;
pub mod sim_scheduler;

// Re-export commonly used types
pub use sim_context::{SimContext, SimState};
pub use sim_flows::{FlowSnapshot, FlowStats, FlowTracker};
pub use sim_interface::{
    ErrorKind, EventId, FlowEvent, FlowEventSink, FlowId, FlowKey, NoOpSink, Port, Protocol,
    SimError, SimTime,
};
pub use sim_report::{build_report, FlowReport, SimReport};
pub use sim_scheduler::Scheduler;

//! Statistics and results for the wired + Wi-Fi scenarios

use flow_sim::sim_report::SimReport;
use flow_sim::SimError;

/// Scenario result
#[derive(Debug)]
pub struct ScenarioResult {
    /// Seed used for the simulation
    pub seed_used: [u8; 32],

    /// Headline used for the report table
    pub title: String,

    /// Actions executed by the scheduler
    pub events_executed: u64,

    /// Events still queued at the stop time (mostly packets in flight)
    pub events_pending: usize,

    pub delivery: DeliveryCounters,

    /// Errors raised inside event actions
    pub errors: Vec<SimError>,

    pub report: SimReport,
}

/// Packet counters kept by the traffic model, independent of the flow tracker
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DeliveryCounters {
    /// Data packets handed to the network by client applications
    pub data_packets: u64,

    /// TCP acks sent by the server
    pub ack_packets: u64,

    pub dropped_wireless: u64,
    pub dropped_wired: u64,

    /// Arrived before the server sink was listening
    pub dropped_server_closed: u64,
}

impl ScenarioResult {
    /// Print a summary of the simulation results
    pub fn print_summary(&self) {
        println!("\n╔════════════════════════════════════════════════════════╗");
        println!("║        Flow Simulation Results                        ║");
        println!("╚════════════════════════════════════════════════════════╝\n");

        println!("Configuration:");
        println!("  Seed: {:?}", self.seed_used);
        println!("  Duration: {}s\n", self.report.duration);

        println!("Scheduler:");
        println!("  Events executed: {}", self.events_executed);
        println!("  Events pending at stop: {}", self.events_pending);
        println!();

        println!("Delivery:");
        println!("  Data packets sent: {}", self.delivery.data_packets);
        println!("  TCP acks sent: {}", self.delivery.ack_packets);
        println!("  Dropped on wireless hop: {}", self.delivery.dropped_wireless);
        println!("  Dropped on wired hop: {}", self.delivery.dropped_wired);
        println!(
            "  Dropped before server start: {}",
            self.delivery.dropped_server_closed
        );
        println!();

        if !self.errors.is_empty() {
            println!("Errors ({}):", self.errors.len());
            for e in self.errors.iter().take(10) {
                println!("  {}", e);
            }
            println!();
        }

        print!("{}", self.report.render_table(&self.title));
        println!();
    }
}

//! Mixed TCP/UDP Simulation Example
//!
//! Run with: cargo run --bin mixed_traffic_sim [n_clients]

mod wifi_scenario;

use log::{error, info};
use simple_logger::SimpleLogger;
use wifi_scenario::{
    LinkProfile, OutputConfig, ScenarioConfig, ScenarioRunner, TcpAppConfig, TrafficMode,
    UdpAppConfig,
};

fn main() {
    if let Err(e) = SimpleLogger::new().init() {
        eprintln!("Failed to initialise logger: {}", e);
    }

    println!("╔════════════════════════════════════════════════════════╗");
    println!("║        Mixed TCP/UDP Flow Simulator                    ║");
    println!("╚════════════════════════════════════════════════════════╝\n");

    let n_clients = match std::env::args().nth(1).map(|arg| arg.parse::<usize>()) {
        None => 4,
        Some(Ok(n)) => n,
        Some(Err(e)) => {
            eprintln!("Invalid client count: {}", e);
            std::process::exit(1);
        }
    };

    info!("Setting up mixed traffic simulation...");

    // Configure simulation
    let config = ScenarioConfig {
        n_clients,
        simulation_time: 11.0,
        seed: Some([42u8; 32]),
        mode: TrafficMode::Mixed,
        mobility: true,

        wired: LinkProfile::wired(),
        wireless: LinkProfile::wireless_mobile(),
        server_start: 1.0,

        tcp: TcpAppConfig {
            send_size: 1024,
            interval_s: 0.001,
            ..Default::default()
        },

        udp: UdpAppConfig {
            packet_size: 1024,
            interval_s: 1.0,
            max_packets: 1,
            ..Default::default()
        },

        output: OutputConfig {
            trace_csv_path: Some("mixed_traffic_events.csv".to_string()),
            ..Default::default()
        },
    };

    info!("Configuration:");
    info!("  Clients: {}", config.n_clients);
    info!("  Simulation time: {}s", config.simulation_time);
    info!("  Wireless loss: {}", config.wireless.loss_fraction);
    info!("  Wired delay: {} ms", config.wired.delay_ms);

    let result = ScenarioRunner::new(config).and_then(|runner| runner.run());

    match result {
        Ok(result) => {
            result.print_summary();
            info!("Packet trace written to mixed_traffic_events.csv");
            info!("✓ Simulation complete!");
        }
        Err(e) => {
            error!("Simulation failed: {}", e);
            std::process::exit(1);
        }
    }
}

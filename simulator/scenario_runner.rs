// Scenario Runner - Load and execute scenario YAML files
//
// Usage:
//   cargo run --bin scenario_runner scenarios/udp-tcp-mobility.yaml
//   cargo run --bin scenario_runner scenarios/  (runs all .yaml files in directory)
//   cargo run --bin scenario_runner scenarios/tcp-no-mobility.yaml --seed 0x1234... --clients 8

mod wifi_scenario;

use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;
use std::env;
use std::fs;
use std::path::Path;
use wifi_scenario::{
    LinkProfile, OutputConfig, ScenarioConfig, ScenarioRunner, TcpAppConfig, TrafficMode,
    UdpAppConfig,
};

/// Scenario file format
#[derive(Debug, serde::Deserialize)]
struct ScenarioFile {
    /// Scenario metadata
    #[serde(default)]
    meta: ScenarioMeta,

    /// Configuration overrides
    config: ScenarioFileConfig,

    #[serde(default)]
    output: OutputConfig,
}

#[derive(Debug, Default, serde::Deserialize)]
struct ScenarioMeta {
    name: Option<String>,
    description: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct ScenarioFileConfig {
    mode: TrafficMode,

    #[serde(default)]
    mobility: bool,

    n_clients: Option<usize>,
    simulation_time: Option<f64>,
    server_start: Option<f64>,

    // Link overrides (optional), applied over the mobility defaults
    #[serde(default)]
    wired: Option<LinkOverrides>,
    #[serde(default)]
    wireless: Option<LinkOverrides>,

    #[serde(default)]
    tcp: TcpAppConfig,
    #[serde(default)]
    udp: UdpAppConfig,
}

#[derive(Debug, Default, serde::Deserialize)]
struct LinkOverrides {
    delay_ms: Option<f64>,
    jitter_ms: Option<f64>,
    loss_fraction: Option<f64>,
    data_rate_mbps: Option<f64>,
}

impl LinkOverrides {
    fn apply(&self, link: &mut LinkProfile) {
        if let Some(v) = self.delay_ms {
            link.delay_ms = v;
        }
        if let Some(v) = self.jitter_ms {
            link.jitter_ms = v;
        }
        if let Some(v) = self.loss_fraction {
            link.loss_fraction = v;
        }
        if let Some(v) = self.data_rate_mbps {
            link.data_rate_mbps = v;
        }
    }
}

/// Command line options
struct CliOptions {
    seed: Option<[u8; 32]>,
    n_clients: Option<usize>,
    verbose: bool,
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!(
            "Usage: {} <scenario.yaml | directory/> [--seed SEED_HEX] [--clients N] [--verbose]",
            args[0]
        );
        eprintln!("\nExamples:");
        eprintln!("  {} scenarios/udp-tcp-mobility.yaml", args[0]);
        eprintln!("  {} scenarios/", args[0]);
        eprintln!("  {} scenarios/tcp-no-mobility.yaml --seed 0x123456...", args[0]);
        std::process::exit(1);
    }

    let options = parse_options(&args[2..]).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    let level = if options.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(e) = SimpleLogger::new().with_level(level).init() {
        eprintln!("Failed to initialise logger: {}", e);
    }

    let path = Path::new(&args[1]);

    if path.is_file() {
        if !run_scenario_file(path, &options) {
            std::process::exit(1);
        }
    } else if path.is_dir() {
        run_scenario_directory(path, &options);
    } else {
        eprintln!("Error: Path does not exist: {}", path.display());
        std::process::exit(1);
    }
}

fn parse_options(args: &[String]) -> Result<CliOptions, String> {
    let mut options = CliOptions {
        seed: None,
        n_clients: None,
        verbose: false,
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--seed" => {
                let value = iter.next().ok_or("--seed needs a value")?;
                options.seed = Some(parse_seed_hex(value)?);
            }
            "--clients" => {
                let value = iter.next().ok_or("--clients needs a value")?;
                let n = value
                    .parse::<usize>()
                    .map_err(|e| format!("invalid client count {}: {}", value, e))?;
                options.n_clients = Some(n);
            }
            "--verbose" | "-v" => options.verbose = true,
            other => return Err(format!("unknown argument {}", other)),
        }
    }

    Ok(options)
}

fn run_scenario_directory(dir: &Path, options: &CliOptions) {
    let mut scenarios = Vec::new();

    // Find all .yaml files
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            let ext = path.extension().and_then(|s| s.to_str());
            if ext == Some("yaml") || ext == Some("yml") {
                scenarios.push(path);
            }
        }
    }

    scenarios.sort();

    if scenarios.is_empty() {
        eprintln!("No .yaml files found in {}", dir.display());
        std::process::exit(1);
    }

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  SCENARIO RUNNER - Multiple Scenarios                 ║");
    println!("╚════════════════════════════════════════════════════════╝\n");
    println!("Found {} scenario(s) to run\n", scenarios.len());

    let mut failed = 0;
    for (i, scenario_path) in scenarios.iter().enumerate() {
        println!("\n{}/{} Running: {}\n", i + 1, scenarios.len(), scenario_path.display());
        if !run_scenario_file(scenario_path, options) {
            failed += 1;
        }
    }

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  All scenarios complete!                               ║");
    println!("╚════════════════════════════════════════════════════════╝\n");

    if failed > 0 {
        eprintln!("{} scenario(s) failed", failed);
        std::process::exit(1);
    }
}

/// Build the runtime configuration from a parsed scenario file
fn build_config(scenario: ScenarioFile, options: &CliOptions) -> ScenarioConfig {
    let file = scenario.config;
    let mut config = ScenarioConfig {
        mode: file.mode,
        mobility: file.mobility,
        tcp: file.tcp,
        udp: file.udp,
        output: scenario.output,
        seed: options.seed,
        ..Default::default()
    };

    if file.mobility {
        config.wireless = LinkProfile::wireless_mobile();
    }
    if let Some(v) = file.n_clients {
        config.n_clients = v;
    }
    if let Some(v) = file.simulation_time {
        config.simulation_time = v;
    }
    if let Some(v) = file.server_start {
        config.server_start = v;
    }
    if let Some(ref overrides) = file.wired {
        overrides.apply(&mut config.wired);
    }
    if let Some(ref overrides) = file.wireless {
        overrides.apply(&mut config.wireless);
    }

    // command line wins over the file
    if let Some(n) = options.n_clients {
        config.n_clients = n;
    }

    config
}

/// Returns false when the scenario could not be loaded or run
fn run_scenario_file(path: &Path, options: &CliOptions) -> bool {
    println!("Loading scenario from: {}", path.display());

    let yaml_content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            error!("Failed to read {}: {}", path.display(), e);
            return false;
        }
    };

    let scenario: ScenarioFile = match serde_yaml::from_str(&yaml_content) {
        Ok(scenario) => scenario,
        Err(e) => {
            error!("Failed to parse {}: {}", path.display(), e);
            return false;
        }
    };

    // Print scenario header
    let name = scenario
        .meta
        .name
        .clone()
        .or_else(|| path.file_stem().and_then(|s| s.to_str()).map(String::from))
        .unwrap_or_default();
    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  {}{}║", name, " ".repeat(54_usize.saturating_sub(name.len())));
    println!("╚════════════════════════════════════════════════════════╝\n");

    if let Some(ref desc) = scenario.meta.description {
        println!("{}\n", desc);
    }

    let config = build_config(scenario, options);

    println!("Configuration:");
    println!("  Mode: {}", config.mode);
    println!("  Mobility: {}", config.mobility);
    println!("  Clients: {}", config.n_clients);
    println!(
        "  Wireless: {} ms, +{} ms jitter, {:.1}% loss, {} Mbps",
        config.wireless.delay_ms,
        config.wireless.jitter_ms,
        config.wireless.loss_fraction * 100.0,
        config.wireless.data_rate_mbps
    );
    println!("\nStarting simulation...\n");

    let result = ScenarioRunner::new(config).and_then(|runner| runner.run());

    match result {
        Ok(result) => {
            result.print_summary();
            info!("scenario {} complete", name);
            println!("\n✓ Scenario complete!\n");
            true
        }
        Err(e) => {
            error!("Scenario {} failed: {}", name, e);
            false
        }
    }
}

/// Parse a 32-byte seed written as exactly 64 hex digits, `0x` prefix optional
fn parse_seed_hex(hex: &str) -> Result<[u8; 32], String> {
    let hex = hex.strip_prefix("0x").unwrap_or(hex);
    if hex.len() != 64 {
        return Err(format!(
            "Invalid hex seed: expected 64 hex digits, got {}",
            hex.len()
        ));
    }
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err("Invalid hex seed: non-hex character".to_string());
    }

    let mut seed = [0u8; 32];
    for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
        let byte_str = std::str::from_utf8(chunk).map_err(|e| e.to_string())?;
        seed[i] = u8::from_str_radix(byte_str, 16)
            .map_err(|e| format!("Invalid hex seed: {}", e))?;
    }

    Ok(seed)
}

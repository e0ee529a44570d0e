use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::net::Ipv4Addr;
use std::path::Path;

use log::{info, warn};

use crate::sim_flows::{FlowRecord, FlowSnapshot};
use crate::sim_interface::{FlowId, FlowKey, Port, Protocol, SimError, SimTime};

/// Derived metrics for one flow
///
/// `None` means the metric is undefined for this flow (nothing received,
/// nothing accounted for) and is rendered as `N/A`.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct FlowReport {
    pub flow_id: FlowId,
    pub protocol: Protocol,
    pub source_address: Ipv4Addr,
    pub source_port: Port,
    pub destination_address: Ipv4Addr,
    pub destination_port: Port,

    pub tx_packets: u64,
    pub rx_packets: u64,
    pub lost_packets: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,

    pub throughput_mbps: f64,
    pub avg_delay_ms: Option<f64>,
    pub avg_jitter_ms: Option<f64>,
    pub loss_ratio_pct: Option<f64>,
}

impl FlowReport {
    pub fn key(&self) -> FlowKey {
        FlowKey::new(
            self.protocol,
            (self.source_address, self.source_port),
            (self.destination_address, self.destination_port),
        )
    }
}

/// Sums over every flow of a report
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct ReportTotals {
    pub flows: usize,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub lost_packets: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub throughput_mbps: f64,
    pub loss_ratio_pct: Option<f64>,
}

/// Report over a whole run, rows ordered by flow key
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct SimReport {
    pub duration: SimTime,
    pub flows: Vec<FlowReport>,
    pub totals: ReportTotals,
}

pub fn throughput_mbps(rx_bytes: u64, duration: SimTime) -> f64 {
    rx_bytes as f64 * 8.0 / duration / 1e6
}

/// Average one-way delay in milliseconds, undefined without received packets
pub fn avg_delay_ms(delay_sum: SimTime, rx_packets: u64) -> Option<f64> {
    if rx_packets == 0 {
        return None;
    }
    Some(delay_sum / rx_packets as f64 * 1000.0)
}

/// Average jitter in milliseconds, needs at least two received packets
pub fn avg_jitter_ms(jitter_sum: SimTime, rx_packets: u64) -> Option<f64> {
    if rx_packets < 2 {
        return None;
    }
    Some(jitter_sum / (rx_packets - 1) as f64 * 1000.0)
}

/// `lost / (lost + rx)` as a percentage, undefined when both are zero
pub fn loss_ratio_pct(lost_packets: u64, rx_packets: u64) -> Option<f64> {
    let accounted = lost_packets + rx_packets;
    if accounted == 0 {
        return None;
    }
    Some(lost_packets as f64 / accounted as f64 * 100.0)
}

fn flow_report(record: &FlowRecord, duration: SimTime) -> FlowReport {
    let stats = &record.stats;
    let key = &record.key;

    FlowReport {
        flow_id: record.flow_id,
        protocol: key.protocol,
        source_address: key.source_address,
        source_port: key.source_port,
        destination_address: key.destination_address,
        destination_port: key.destination_port,
        tx_packets: stats.tx_packets,
        rx_packets: stats.rx_packets,
        lost_packets: stats.lost_packets,
        tx_bytes: stats.tx_bytes,
        rx_bytes: stats.rx_bytes,
        throughput_mbps: throughput_mbps(stats.rx_bytes, duration),
        avg_delay_ms: avg_delay_ms(stats.delay_sum, stats.rx_packets),
        avg_jitter_ms: avg_jitter_ms(stats.jitter_sum, stats.rx_packets),
        loss_ratio_pct: loss_ratio_pct(stats.lost_packets, stats.rx_packets),
    }
}

/// Compute per-flow metrics from a snapshot over `duration` seconds
///
/// Pure: nothing is printed or written here.
pub fn build_report(snapshot: &FlowSnapshot, duration: SimTime) -> Result<SimReport, SimError> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(SimError::InvalidDuration { duration });
    }

    let flows: Vec<FlowReport> = snapshot
        .iter()
        .map(|record| flow_report(record, duration))
        .collect();

    let mut totals = ReportTotals {
        flows: flows.len(),
        ..Default::default()
    };
    for flow in &flows {
        totals.tx_packets += flow.tx_packets;
        totals.rx_packets += flow.rx_packets;
        totals.lost_packets += flow.lost_packets;
        totals.tx_bytes += flow.tx_bytes;
        totals.rx_bytes += flow.rx_bytes;
    }
    totals.throughput_mbps = throughput_mbps(totals.rx_bytes, duration);
    totals.loss_ratio_pct = loss_ratio_pct(totals.lost_packets, totals.rx_packets);

    Ok(SimReport {
        duration,
        flows,
        totals,
    })
}

fn fmt_metric(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:>10.6}", v),
        None => format!("{:>10}", "N/A"),
    }
}

impl SimReport {
    /// Fixed-width table: flow id, source, destination, rate, delay, loss
    pub fn render_table(&self, title: &str) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "|================= {} =================|", title);
        let _ = writeln!(
            out,
            "{:<8} {:<5} {:<22} {:<22} {:>12} {:>10} {:>10}",
            "Flow", "Proto", "Source", "Destination", "Rate (Mbps)", "Delay (ms)", "Loss (%)"
        );

        for flow in &self.flows {
            let _ = writeln!(
                out,
                "{:<8} {:<5} {:<22} {:<22} {:>12.6} {} {}",
                flow.flow_id,
                flow.protocol,
                format!("{}:{}", flow.source_address, flow.source_port),
                format!("{}:{}", flow.destination_address, flow.destination_port),
                flow.throughput_mbps,
                fmt_metric(flow.avg_delay_ms),
                fmt_metric(flow.loss_ratio_pct),
            );
        }

        let _ = writeln!(
            out,
            "{:<8} {:<5} {:<22} {:<22} {:>12.6} {:>10} {}",
            "total",
            "",
            format!("{} flows", self.totals.flows),
            "",
            self.totals.throughput_mbps,
            "",
            fmt_metric(self.totals.loss_ratio_pct),
        );

        out
    }

    /// Log a one-line summary per flow
    pub fn log_summary(&self) {
        if self.flows.is_empty() {
            warn!("no flows collected");
            return;
        }

        info!("flows collected: {}", self.flows.len());
        for flow in &self.flows {
            info!(
                "flow {} {}:{} -> {}:{} ({}) tx={} rx={} lost={}",
                flow.flow_id,
                flow.source_address,
                flow.source_port,
                flow.destination_address,
                flow.destination_port,
                flow.protocol,
                flow.tx_packets,
                flow.rx_packets,
                flow.lost_packets
            );
        }
    }

    /// CSV with one row per flow; undefined metrics are written as `N/A`
    pub fn write_csv<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writeln!(
            writer,
            "flow_id,protocol,source,source_port,destination,destination_port,\
             tx_packets,rx_packets,lost_packets,tx_bytes,rx_bytes,\
             throughput_mbps,avg_delay_ms,avg_jitter_ms,loss_ratio_pct"
        )?;

        let csv_metric = |v: Option<f64>| match v {
            Some(v) => format!("{:.6}", v),
            None => "N/A".to_string(),
        };

        for flow in &self.flows {
            writeln!(
                writer,
                "{},{},{},{},{},{},{},{},{},{},{},{:.6},{},{},{}",
                flow.flow_id,
                flow.protocol,
                flow.source_address,
                flow.source_port,
                flow.destination_address,
                flow.destination_port,
                flow.tx_packets,
                flow.rx_packets,
                flow.lost_packets,
                flow.tx_bytes,
                flow.rx_bytes,
                flow.throughput_mbps,
                csv_metric(flow.avg_delay_ms),
                csv_metric(flow.avg_jitter_ms),
                csv_metric(flow.loss_ratio_pct),
            )?;
        }

        writer.flush()
    }

    pub fn export_csv<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let file = File::create(path.as_ref())?;
        self.write_csv(BufWriter::new(file))?;
        info!("report written to {}", path.as_ref().display());
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn export_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let yaml = self.to_yaml()?;
        std::fs::write(path.as_ref(), yaml)?;
        info!("report written to {}", path.as_ref().display());
        Ok(())
    }
}

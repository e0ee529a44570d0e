//! Various flow event sinks for different use cases

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use flow_sim::{FlowEvent, FlowEventSink, FlowId, SimTime};

// ============================================================================
// Console Logging Sink
// ============================================================================

/// Prints every flow event on stdout
pub struct ConsoleEventSink;

impl FlowEventSink for ConsoleEventSink {
    fn log(&mut self, time: SimTime, flow: FlowId, event: FlowEvent) {
        match event {
            FlowEvent::FlowCreated { key } => {
                println!("{:>12.6} {:>4} FlowCreated    {}", time, flow, key);
            }
            FlowEvent::PacketSent { bytes, .. } => {
                println!("{:>12.6} {:>4} PacketSent     bytes:{}", time, flow, bytes);
            }
            FlowEvent::PacketReceived { bytes, delay, .. } => {
                println!(
                    "{:>12.6} {:>4} PacketReceived bytes:{} delay:{:.3}ms",
                    time,
                    flow,
                    bytes,
                    delay * 1000.0
                );
            }
            FlowEvent::PacketLost { .. } => {
                println!("{:>12.6} {:>4} PacketLost", time, flow);
            }
        }
    }
}

// ============================================================================
// CSV Event Sink
// ============================================================================

/// CSV trace of every packet event
pub struct CsvEventSink {
    writer: BufWriter<File>,
}

impl CsvEventSink {
    pub fn new<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writeln!(writer, "time,flow_id,event_type,protocol,source,destination,bytes,delay")?;

        Ok(Self { writer })
    }
}

impl FlowEventSink for CsvEventSink {
    fn log(&mut self, time: SimTime, flow: FlowId, event: FlowEvent) {
        let result = match event {
            FlowEvent::FlowCreated { key } => writeln!(
                self.writer,
                "{:.9},{},FlowCreated,{},{}:{},{}:{},0,0",
                time,
                flow,
                key.protocol,
                key.source_address,
                key.source_port,
                key.destination_address,
                key.destination_port
            ),
            FlowEvent::PacketSent { key, bytes } => writeln!(
                self.writer,
                "{:.9},{},PacketSent,{},{}:{},{}:{},{},0",
                time,
                flow,
                key.protocol,
                key.source_address,
                key.source_port,
                key.destination_address,
                key.destination_port,
                bytes
            ),
            FlowEvent::PacketReceived { key, bytes, delay } => writeln!(
                self.writer,
                "{:.9},{},PacketReceived,{},{}:{},{}:{},{},{:.9}",
                time,
                flow,
                key.protocol,
                key.source_address,
                key.source_port,
                key.destination_address,
                key.destination_port,
                bytes,
                delay
            ),
            FlowEvent::PacketLost { key } => writeln!(
                self.writer,
                "{:.9},{},PacketLost,{},{}:{},{}:{},0,0",
                time,
                flow,
                key.protocol,
                key.source_address,
                key.source_port,
                key.destination_address,
                key.destination_port
            ),
        };

        if let Err(e) = result {
            eprintln!("Error writing to CSV: {}", e);
        }
    }
}

impl Drop for CsvEventSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

// ============================================================================
// Multi Sink (Combine Multiple Sinks)
// ============================================================================

/// Fans every event out to several sinks
pub struct MultiEventSink {
    sinks: Vec<Box<dyn FlowEventSink>>,
}

impl MultiEventSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(&mut self, sink: Box<dyn FlowEventSink>) {
        self.sinks.push(sink);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl FlowEventSink for MultiEventSink {
    fn log(&mut self, time: SimTime, flow: FlowId, event: FlowEvent) {
        for sink in &mut self.sinks {
            sink.log(time, flow, event.clone());
        }
    }
}

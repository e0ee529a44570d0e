use std::fmt;
use std::net::Ipv4Addr;

/// Logical simulation time in seconds
pub type SimTime = f64;

/// Flow ids are handed out 1, 2, 3... in order of first observation
pub type FlowId = u32;

pub type Port = u16;

/// Handle returned by the scheduler, used to cancel a pending event
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub(crate) u64);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
        }
    }
}

/// Five-tuple identifying a unidirectional flow
///
/// The derived ordering (protocol, source, source port, destination,
/// destination port) is the ordering used for snapshots and reports.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowKey {
    pub protocol: Protocol,
    pub source_address: Ipv4Addr,
    pub source_port: Port,
    pub destination_address: Ipv4Addr,
    pub destination_port: Port,
}

impl FlowKey {
    pub fn new(
        protocol: Protocol,
        source: (Ipv4Addr, Port),
        destination: (Ipv4Addr, Port),
    ) -> Self {
        Self {
            protocol,
            source_address: source.0,
            source_port: source.1,
            destination_address: destination.0,
            destination_port: destination.1,
        }
    }

    /// The key of the flow travelling the opposite way (e.g. TCP acks)
    pub fn reversed(&self) -> Self {
        Self {
            protocol: self.protocol,
            source_address: self.destination_address,
            source_port: self.destination_port,
            destination_address: self.source_address,
            destination_port: self.source_port,
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{} -> {}:{}",
            self.protocol,
            self.source_address,
            self.source_port,
            self.destination_address,
            self.destination_port
        )
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Broad category of a [`SimError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller passed a value outside the accepted domain
    InvalidArgument,
    /// Call is not valid for the current state of the simulation
    InvalidState,
}

/// Errors raised by the scheduler, the flow tracker and the reporter
///
/// All of these describe a caller mistake; nothing here is transient, so
/// there is no retry story. The caller decides whether to abort the run.
#[derive(Debug, Clone, PartialEq)]
pub enum SimError {
    /// Delay was negative, NaN or infinite
    InvalidDelay { delay: SimTime },

    /// Absolute time lies before the current clock or is not finite
    TimeInPast { time: SimTime, now: SimTime },

    /// Report duration must be strictly positive and finite
    InvalidDuration { duration: SimTime },

    /// A packet was received before it was sent
    ReceiveBeforeSend {
        send_time: SimTime,
        receive_time: SimTime,
    },

    /// A report was requested before the simulation ran
    NotRun,
}

impl SimError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SimError::InvalidDelay { .. }
            | SimError::TimeInPast { .. }
            | SimError::InvalidDuration { .. } => ErrorKind::InvalidArgument,
            SimError::ReceiveBeforeSend { .. } | SimError::NotRun => ErrorKind::InvalidState,
        }
    }
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::InvalidDelay { delay } => {
                write!(f, "invalid delay {}: must be finite and non-negative", delay)
            }
            SimError::TimeInPast { time, now } => {
                write!(f, "time {} is not reachable from current time {}", time, now)
            }
            SimError::InvalidDuration { duration } => {
                write!(f, "invalid duration {}: must be finite and positive", duration)
            }
            SimError::ReceiveBeforeSend {
                send_time,
                receive_time,
            } => write!(
                f,
                "packet received at {} before it was sent at {}",
                receive_time, send_time
            ),
            SimError::NotRun => write!(f, "report requested before any run"),
        }
    }
}

impl std::error::Error for SimError {}

// ============================================================================
// Flow Event Logging
// ============================================================================

/// Events emitted by the flow tracker for debugging and trace export
#[derive(Debug, Clone)]
pub enum FlowEvent {
    /// First packet seen for a five-tuple
    FlowCreated { key: FlowKey },
    PacketSent { key: FlowKey, bytes: u32 },
    PacketReceived {
        key: FlowKey,
        bytes: u32,
        delay: SimTime,
    },
    PacketLost { key: FlowKey },
}

/// Trait for consuming flow events
pub trait FlowEventSink {
    fn log(&mut self, time: SimTime, flow: FlowId, event: FlowEvent);
}

/// Sink that drops everything
pub struct NoOpSink;

impl FlowEventSink for NoOpSink {
    #[inline(always)]
    fn log(&mut self, _time: SimTime, _flow: FlowId, _event: FlowEvent) {}
}

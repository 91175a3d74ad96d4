use serde::Serialize;
use std::fmt;
use std::net::IpAddr;

use super::conversation::Phase;
use super::histogram::{Frequencies, SIZE_BUCKETS, TIME_BUCKETS};

/// Number of values emitted per flow: size and time buckets for both directions.
pub const FEATURE_COUNT: usize = 2 * (SIZE_BUCKETS + TIME_BUCKETS);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Direction {
    /// Client to server
    Up,
    /// Server to client
    Down,
}

impl Direction {
    /// The side with the higher (ephemeral) port is taken to be the client.
    ///
    /// Overrides whatever direction the capture layer reports: request and response roles follow
    /// the ports, not who sent the first packet.
    pub fn from_ports(src_port: u16, dst_port: u16) -> Self {
        if src_port > dst_port {
            Direction::Up
        } else {
            Direction::Down
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// What the capture layer tells us about one packet of a flow.
#[derive(Clone, Debug, Default)]
pub struct PacketMeta {
    /// Sent by the stream initiator, as reported by the capture layer. Informational only.
    pub up: bool,
    pub duplicate: bool,
    pub src_addr: Option<IpAddr>,
    pub dst_addr: Option<IpAddr>,
    pub src_port: u16,
    pub dst_port: u16,
    /// Seconds
    pub timestamp: f64,
    pub push: bool,
    pub payload: Option<Vec<u8>>,
    pub payload_len: u32,
}

/// The 60 per-flow values, in emission order by [FlowFeatures::values].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlowFeatures {
    pub up_size: [f64; SIZE_BUCKETS],
    pub down_size: [f64; SIZE_BUCKETS],
    pub up_time: [f64; TIME_BUCKETS],
    pub down_time: [f64; TIME_BUCKETS],
}

impl FlowFeatures {
    pub fn new(up: Frequencies, down: Frequencies) -> Self {
        Self {
            up_size: up.size,
            down_size: down.size,
            up_time: up.time,
            down_time: down.time,
        }
    }

    /// up-size, down-size, up-time, down-time.
    pub fn values(&self) -> Vec<f64> {
        let mut values = Vec::with_capacity(FEATURE_COUNT);
        values.extend_from_slice(&self.up_size);
        values.extend_from_slice(&self.down_size);
        values.extend_from_slice(&self.up_time);
        values.extend_from_slice(&self.down_time);
        values
    }
}

/// One side of a flow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub addr: Option<IpAddr>,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.addr {
            Some(addr) => write!(f, "{},{}", addr, self.port),
            None => write!(f, "?,{}", self.port),
        }
    }
}

/// Result of analysing one TCP stream.
#[derive(Clone, Debug, Serialize)]
pub struct FlowReport {
    pub stream: u32,
    /// Microseconds since the epoch of the first packet, if known
    pub started_at: Option<i64>,
    pub protocol: &'static str,
    /// Sender of the first packet
    pub initiator: Endpoint,
    pub peer: Endpoint,
    pub packets: usize,
    pub up_messages: u32,
    pub down_messages: u32,
    pub final_phase: Phase,
    pub features: FlowFeatures,
}

//! Capture-side helpers: loading a trace via tshark and turning its packets into [PacketMeta].
use rtshark::{Packet, RTShark};
use std::collections::HashMap;
use std::net::IpAddr;
use super::containers::PacketMeta;

/// tshark markers that make us treat a packet as a duplicate.
const DUPLICATE_MARKERS: [&str; 3] = [
    "tcp.analysis.retransmission",
    "tcp.analysis.fast_retransmission",
    "tcp.analysis.spurious_retransmission",
];

/// Display filter handed to tshark: all TCP, optionally narrowed by the user.
pub fn display_filter(extra: Option<&str>) -> String {
    match extra {
        Some(extra) if !extra.trim().is_empty() => format!("tcp && ({})", extra.trim()),
        _ => String::from("tcp"),
    }
}

/// Limits applied while collecting streams.
#[derive(Clone, Copy, Debug)]
pub struct Selection {
    /// Only keep this `tcp.stream`, -1 for all
    pub stream: i32,
    /// Packets kept per stream, 0 for no cap
    pub limit: usize,
    /// Seconds of capture to read from its first packet, 0 for all
    pub time_limit: f64,
}

impl Default for Selection {
    fn default() -> Self {
        Self { stream: -1, limit: 0, time_limit: 0.0 }
    }
}

/// Iterates through rtshark packets, grouping them per `tcp.stream`.
pub fn get_streams(rtshark: &mut RTShark, selection: Selection) -> HashMap<u32, Vec<PacketMeta>> {
    log::info!("Collecting streams.");

    let packets = std::iter::from_fn(|| {
        rtshark.read().unwrap_or_else(|e| {
            log::error!("Error parsing TShark output when collecting streams: {e}");
            None
        })
    })
    .filter_map(|packet| {
        let Some(stream_id) = stream_id(&packet) else {
            log::warn!("Failed to read tcp.stream of packet, skipping");
            return None;
        };
        match packet_meta(&packet) {
            Some(meta) => Some((stream_id, meta)),
            None => {
                log::warn!("Packet in stream {stream_id} is missing TCP metadata, skipping");
                None
            }
        }
    });

    group_streams(packets, selection)
}

/// Groups packets per stream, applying `selection`.
///
/// The first packet kept for a stream names its initiator; every packet sent from the
/// initiator's port is reported as upload.
pub fn group_streams(
    packets: impl IntoIterator<Item = (u32, PacketMeta)>,
    selection: Selection,
) -> HashMap<u32, Vec<PacketMeta>> {
    let mut stream_map: HashMap<u32, Vec<PacketMeta>> = HashMap::new();
    // Source port of the first packet seen per stream
    let mut initiators: HashMap<u32, u16> = HashMap::new();
    let mut capture_start: Option<f64> = None;

    for (stream_id, mut meta) in packets {
        let start = *capture_start.get_or_insert(meta.timestamp);
        if selection.time_limit > 0.0 && meta.timestamp - start > selection.time_limit {
            log::info!("Time limit of {}s reached", selection.time_limit);
            break;
        }

        if selection.stream != -1 && i64::from(stream_id) != i64::from(selection.stream) {
            continue;
        }

        let packets = stream_map.entry(stream_id).or_default();
        if selection.limit != 0 && packets.len() >= selection.limit {
            continue;
        }

        let initiator = *initiators.entry(stream_id).or_insert(meta.src_port);
        meta.up = meta.src_port == initiator;
        packets.push(meta);
    }

    stream_map
}

/// Loads PCAP/PCAPNG file via rtshark and collects its TCP streams.
pub fn load_file(
    filepath: &str,
    filter: &str,
    selection: Selection,
) -> std::io::Result<HashMap<u32, Vec<PacketMeta>>> {
    log::info!("Loading capture file.");

    let builder = rtshark::RTSharkBuilder::builder()
        .input_path(filepath)
        .display_filter(filter);

    let mut rtshark = builder.spawn().map_err(|err| {
        log::error!("Error spawning tshark: {err}");
        err
    })?;
    log::info!("Reading from {filepath} with filter '{filter}'");

    let streams = get_streams(&mut rtshark, selection);
    rtshark.kill();

    log::info!("Found {} stream(s)", streams.len());
    Ok(streams)
}

fn stream_id(packet: &Packet) -> Option<u32> {
    packet
        .layer_name("tcp")?
        .metadata("tcp.stream")?
        .value()
        .parse()
        .ok()
}

/// Peels what we need off a tshark packet. None if it has no usable TCP layer.
pub fn packet_meta(packet: &Packet) -> Option<PacketMeta> {
    // Fields are looked up in the layer named by their prefix, e.g. "ipv6" for "ipv6.src"
    let field = |name: &str| {
        let layer = name.split('.').next()?;
        packet.layer_name(layer)?.metadata(name).map(|m| m.value())
    };
    meta_from_fields(field, packet.timestamp_micros())
}

/// Builds a [PacketMeta] from tshark field values. None without both TCP ports.
///
/// The reported direction is left unset; [group_streams] fills it in from the stream initiator.
pub fn meta_from_fields<'p>(
    field: impl Fn(&str) -> Option<&'p str>,
    timestamp_micros: Option<i64>,
) -> Option<PacketMeta> {
    let src_port: u16 = field("tcp.srcport")?.parse().ok()?;
    let dst_port: u16 = field("tcp.dstport")?.parse().ok()?;
    let payload_len: u32 = field("tcp.len").and_then(|v| v.parse().ok()).unwrap_or(0);
    let push = field("tcp.flags.push").map(is_set).unwrap_or(false);

    let address = |v4: &str, v6: &str| {
        field(v4)
            .or_else(|| field(v6))
            .and_then(|v| v.parse::<IpAddr>().ok())
    };
    let src_addr = address("ip.src", "ipv6.src");
    let dst_addr = address("ip.dst", "ipv6.dst");

    let payload = field("tcp.payload")
        .or_else(|| field("tcp.segment_data"))
        .and_then(decode_payload);

    let duplicate = DUPLICATE_MARKERS.iter().any(|marker| field(*marker).is_some());

    let timestamp = timestamp_micros
        .map(|micros| micros as f64 / 1_000_000.0)
        .unwrap_or(0.0);

    Some(PacketMeta {
        up: false,
        duplicate,
        src_addr,
        dst_addr,
        src_port,
        dst_port,
        timestamp,
        push,
        payload,
        payload_len,
    })
}

/// tshark prints flags as "1"/"0" or "True"/"False" depending on version.
fn is_set(value: &str) -> bool {
    matches!(value, "1" | "True" | "true")
}

/// Decodes tshark's byte fields, with or without ':' separators.
pub fn decode_payload(value: &str) -> Option<Vec<u8>> {
    let compact: String = value.chars().filter(|c| *c != ':').collect();
    match hex::decode(compact) {
        Ok(bytes) if !bytes.is_empty() => Some(bytes),
        Ok(_) => None,
        Err(e) => {
            log::warn!("Could not decode payload bytes: {e}");
            None
        }
    }
}

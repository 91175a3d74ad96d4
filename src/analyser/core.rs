//! Flow lifecycle: the three entry points driven by whoever tracks flows.
//!
//! A [FlowRecord] is owned by the caller for the lifetime of one flow and only ever mutated
//! through [on_packet]. Nothing here is shared between flows.
use super::containers::{Direction, Endpoint, FlowFeatures, FlowReport, PacketMeta};
use super::conversation::ConversationState;
use super::segment::DirectionalState;

#[derive(Clone, Debug, Default)]
pub struct FlowRecord {
    pub up: DirectionalState,
    pub down: DirectionalState,
    pub conversation: ConversationState,
}

impl FlowRecord {
    fn side_mut(&mut self, direction: Direction) -> &mut DirectionalState {
        match direction {
            Direction::Up => &mut self.up,
            Direction::Down => &mut self.down,
        }
    }
}

/// Zero state for a new flow.
pub fn on_flow_start() -> FlowRecord {
    FlowRecord::default()
}

/// Feeds one packet of the flow.
pub fn on_packet(flow: &mut FlowRecord, meta: &PacketMeta) {
    if meta.duplicate || meta.payload_len == 0 {
        return;
    }
    let payload = match meta.payload.as_deref() {
        Some(payload) if !payload.is_empty() => payload,
        _ => return,
    };

    let direction = Direction::from_ports(meta.src_port, meta.dst_port);
    if (direction == Direction::Up) != meta.up {
        log::trace!(
            "Port {} -> {} overrides reported direction, using {direction}",
            meta.src_port,
            meta.dst_port
        );
    }

    let completed = flow.side_mut(direction).on_packet(payload, meta.payload_len, meta.push);
    let Some(length) = completed else {
        return;
    };
    log::debug!("Message {direction} of {length} bytes at {:.6}", meta.timestamp);

    if let Some(timing) = flow.conversation.on_message_completed(direction, meta.timestamp) {
        flow.side_mut(timing.side).register_time(timing.seconds);
    }
}

/// Normalised histograms of both directions.
pub fn on_flow_end(flow: &FlowRecord) -> FlowFeatures {
    FlowFeatures::new(flow.up.frequencies(), flow.down.frequencies())
}

/// Runs a whole captured stream through the lifecycle.
pub fn analyse(stream: u32, packets: &[PacketMeta]) -> FlowReport {
    log::info!("Analysing stream {stream} ({} packets)", packets.len());

    let mut flow = on_flow_start();
    for meta in packets {
        on_packet(&mut flow, meta);
    }

    let first = packets.first();
    let started_at = first.map(|meta| (meta.timestamp * 1_000_000.0).round() as i64);
    let (initiator, peer) = first
        .map(|meta| {
            (
                Endpoint { addr: meta.src_addr, port: meta.src_port },
                Endpoint { addr: meta.dst_addr, port: meta.dst_port },
            )
        })
        .unwrap_or_default();

    FlowReport {
        stream,
        started_at,
        protocol: "TCP",
        initiator,
        peer,
        packets: packets.len(),
        up_messages: flow.up.message_count,
        down_messages: flow.down.message_count,
        final_phase: flow.conversation.phase,
        features: on_flow_end(&flow),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyser::containers::FEATURE_COUNT;
    use crate::analyser::conversation::Phase;
    use crate::analyser::segment::SegmentState;

    const CLIENT: u16 = 51000;
    const SERVER: u16 = 443;

    fn packet(direction: Direction, timestamp: f64, payload: Vec<u8>, push: bool) -> PacketMeta {
        let (src_port, dst_port) = match direction {
            Direction::Up => (CLIENT, SERVER),
            Direction::Down => (SERVER, CLIENT),
        };
        PacketMeta {
            up: direction == Direction::Up,
            duplicate: false,
            src_addr: None,
            dst_addr: None,
            src_port,
            dst_port,
            timestamp,
            push,
            payload_len: payload.len() as u32,
            payload: Some(payload),
        }
    }

    fn app_data(len: usize) -> Vec<u8> {
        let mut payload = vec![0x17, 3, 3, 0, 0];
        payload.resize(len.max(5), 0);
        payload
    }

    fn message(direction: Direction, timestamp: f64, len: usize) -> PacketMeta {
        packet(direction, timestamp, app_data(len), true)
    }

    #[test]
    fn test_flow_start_is_zeroed() {
        let flow = on_flow_start();
        assert_eq!(flow.up.segment_state, SegmentState::Empty);
        assert_eq!(flow.down.segment_state, SegmentState::Empty);
        assert_eq!(flow.conversation.phase, Phase::Idle);
        assert_eq!(flow.conversation.last_query_timestamp, None);
    }

    #[test]
    fn test_empty_flow_is_all_zeros() {
        let features = on_flow_end(&on_flow_start());
        let values = features.values();
        assert_eq!(values.len(), FEATURE_COUNT);
        assert!(values.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_duplicates_and_empty_packets_are_dropped() {
        let mut flow = on_flow_start();

        let mut dup = message(Direction::Up, 0.0, 100);
        dup.duplicate = true;
        on_packet(&mut flow, &dup);

        let mut ack = packet(Direction::Up, 0.1, Vec::new(), true);
        ack.payload = None;
        on_packet(&mut flow, &ack);

        assert_eq!(flow.up.message_count, 0);
        assert_eq!(flow.conversation.phase, Phase::Idle);
    }

    #[test]
    fn test_ports_override_reported_direction() {
        let mut flow = on_flow_start();
        let mut meta = message(Direction::Up, 0.0, 100);
        // Capture layer claims upload, but 443 -> 51000 is the server side
        meta.src_port = 443;
        meta.dst_port = 51000;
        meta.up = true;
        on_packet(&mut flow, &meta);

        assert_eq!(flow.up.message_count, 0);
        assert_eq!(flow.down.message_count, 1);

        let features = on_flow_end(&flow);
        assert!(features.up_size.iter().all(|&v| v == 0.0));
        assert_eq!(features.down_size[2], 1.0);
    }

    #[test]
    fn test_segmented_message() {
        let mut flow = on_flow_start();
        on_packet(&mut flow, &packet(Direction::Up, 0.0, app_data(40), false));
        on_packet(&mut flow, &packet(Direction::Up, 0.001, vec![0; 60], true));

        assert_eq!(flow.up.message_count, 1);
        let features = on_flow_end(&flow);
        assert_eq!(features.up_size[2], 1.0);
    }

    #[test]
    fn test_handshake_is_not_counted() {
        let mut flow = on_flow_start();
        let client_hello = {
            let mut p = vec![0x16, 3, 1, 0x02, 0x00];
            p.resize(517, 0);
            p
        };
        let server_hello = {
            let mut p = vec![0x16, 3, 3, 0x10, 0x00];
            p.resize(1448, 0);
            p
        };
        on_packet(&mut flow, &packet(Direction::Up, 0.0, client_hello, true));
        on_packet(&mut flow, &packet(Direction::Down, 0.05, server_hello, false));
        on_packet(&mut flow, &packet(Direction::Down, 0.05, vec![0; 1448], true));

        // Finished + first request in one packet
        let mut finished = vec![0x14, 3, 3, 0, 1, 1, 0x16, 3, 3, 0, 40];
        finished.resize(51, 0);
        finished.extend_from_slice(&app_data(300));
        on_packet(&mut flow, &packet(Direction::Up, 0.1, finished, true));

        assert_eq!(flow.up.message_count, 1);
        assert_eq!(flow.down.message_count, 0);
        assert_eq!(flow.down.segment_state, SegmentState::Empty);
        assert_eq!(flow.conversation.phase, Phase::Asking);
    }

    #[test]
    fn test_conversation_timings() {
        // The last latency is respond - ask = 0.5 - 0.25, the 5.1 s arrival only ends the turn
        let packets = vec![
            message(Direction::Up, 0.0, 200),
            message(Direction::Down, 0.2, 1500),
            message(Direction::Up, 0.25, 200),
            message(Direction::Down, 0.5, 1500),
            message(Direction::Up, 5.1, 200),
        ];
        let report = analyse(7, &packets);

        assert_eq!(report.stream, 7);
        assert_eq!(report.up_messages, 3);
        assert_eq!(report.down_messages, 2);
        assert_eq!(report.final_phase, Phase::Asking);
        assert_eq!(report.started_at, Some(0));
        assert_eq!(report.protocol, "TCP");
        assert_eq!(report.initiator, Endpoint { addr: None, port: CLIENT });
        assert_eq!(report.peer, Endpoint { addr: None, port: SERVER });

        let features = &report.features;
        // 0.2 s and 0.25 s latencies: both in <500
        assert_eq!(features.down_time[3], 0.0);
        assert_eq!(features.down_time[4], 1.0);
        // One 0.25 s spacing between query groups over three queries
        assert!((features.up_time[4] - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(features.up_size[4], 1.0);
        assert_eq!(features.down_size[14], 1.0);
    }

    #[test]
    fn test_value_order() {
        let packets = vec![message(Direction::Up, 0.0, 20), message(Direction::Down, 0.1, 20000)];
        let values = analyse(0, &packets).features.values();

        assert_eq!(values.len(), FEATURE_COUNT);
        assert_eq!(values[0], 1.0); // up <50
        assert_eq!(values[22 + 21], 1.0); // down >=10000
        assert!(values[44..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_normalisation_and_determinism() {
        let mut packets = Vec::new();
        for i in 0..20 {
            let ts = i as f64 * 0.3;
            packets.push(message(Direction::Up, ts, 100 + i * 37));
            packets.push(message(Direction::Down, ts + 0.04, 900 + i * 411));
        }

        let first = analyse(1, &packets);
        let second = analyse(1, &packets);
        assert_eq!(first.features, second.features);

        let f = &first.features;
        for (size, time) in [(&f.up_size, &f.up_time), (&f.down_size, &f.down_time)] {
            assert!((size.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            assert!(time.iter().sum::<f64>() <= 1.0 + 1e-9);
        }
    }
}

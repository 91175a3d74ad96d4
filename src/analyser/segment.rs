//! Coalesces same-direction packets into logical messages.
//!
//! The NIC usually does TCP offloading, so a PSH flag effectively marks the point where the TLS
//! library flushed a record (up to 16KB). We treat it as the message boundary.
use super::histogram::{Frequencies, SizeHistogram, TimeHistogram};
use super::tls;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SegmentState {
    /// Nothing seen for the current message
    #[default]
    Empty,
    /// First packet was TLS Application Data, accumulating
    InApplicationData,
    /// First packet was something else, discarding until the boundary
    Ignoring,
}

/// Assembly state and histograms of one direction of a flow.
#[derive(Clone, Debug, Default)]
pub struct DirectionalState {
    pub segment_length: u32,
    pub segment_state: SegmentState,
    pub message_count: u32,
    pub sizes: SizeHistogram,
    pub times: TimeHistogram,
}

impl DirectionalState {
    /// Feeds one packet into the current message.
    ///
    /// `payload` holds the captured bytes used for classification, `length` the transport payload
    /// length that is counted. Returns the message length once a push completes an Application
    /// Data message; ignored messages never complete.
    pub fn on_packet(&mut self, payload: &[u8], length: u32, push: bool) -> Option<u32> {
        if length == 0 || payload.is_empty() {
            return None;
        }

        // Resolve the state first, then look at the boundary
        if self.segment_state == SegmentState::Empty {
            self.segment_state = if tls::is_application_data(payload) {
                SegmentState::InApplicationData
            } else {
                SegmentState::Ignoring
            };
        }

        match self.segment_state {
            SegmentState::InApplicationData => {
                self.segment_length = self.segment_length.saturating_add(length);
                if push {
                    Some(self.complete())
                } else {
                    None
                }
            }
            SegmentState::Ignoring => {
                if push {
                    self.reset();
                }
                None
            }
            SegmentState::Empty => None,
        }
    }

    fn complete(&mut self) -> u32 {
        let length = self.segment_length;
        self.message_count += 1;
        self.sizes.register(length);
        self.reset();
        length
    }

    fn reset(&mut self) {
        self.segment_state = SegmentState::Empty;
        self.segment_length = 0;
    }

    /// Registers a turn timing for this direction.
    pub fn register_time(&mut self, seconds: f64) {
        self.times.register(seconds);
    }

    pub fn frequencies(&self) -> Frequencies {
        Frequencies::normalise(&self.sizes, &self.times, self.message_count)
    }
}

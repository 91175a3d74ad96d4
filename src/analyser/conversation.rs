//! Half-duplex request/response model of a flow.
//!
//! Completed messages are paired across directions into turns. Timestamps of bursts are smoothed
//! by averaging, and two kinds of timing come out of it: the spacing between query groups
//! (attributed to the upload side) and the response latency (attributed to the download side).
use serde::Serialize;

use super::containers::Direction;

/// Queries closer together than this belong to the same group.
pub const GROUP_TIME: f64 = 5.0;
/// Responses closer together than this belong to the same response.
pub const RESPONSE_TIME: f64 = 5.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Phase {
    #[default]
    Idle,
    Asking,
    Responding,
}

/// A timing value to be put in the time histogram of `side`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timing {
    pub side: Direction,
    pub seconds: f64,
}

#[derive(Clone, Debug, Default)]
pub struct ConversationState {
    pub phase: Phase,
    pub ask_timestamp: f64,
    pub respond_timestamp: f64,
    pub last_query_timestamp: Option<f64>,
}

impl ConversationState {
    /// Advances the conversation by one completed message.
    ///
    /// Differences below the thresholds are reported even when negative (out-of-order
    /// timestamps); the caller registers them as they are.
    pub fn on_message_completed(&mut self, direction: Direction, timestamp: f64) -> Option<Timing> {
        match (self.phase, direction) {
            (Phase::Idle, Direction::Up) => {
                self.ask_timestamp = timestamp;
                self.set_phase(Phase::Asking);
                None
            }
            (Phase::Idle, Direction::Down) => {
                self.respond_timestamp = timestamp;
                self.set_phase(Phase::Responding);
                None
            }
            (Phase::Asking, Direction::Up) => {
                if timestamp - self.ask_timestamp > GROUP_TIME {
                    // another group of queries
                    self.ask_timestamp = timestamp;
                } else {
                    self.ask_timestamp = (self.ask_timestamp + timestamp) / 2.0;
                }
                None
            }
            (Phase::Asking, Direction::Down) => {
                let spacing = self
                    .last_query_timestamp
                    .map(|last| self.ask_timestamp - last)
                    .filter(|&diff| diff < GROUP_TIME)
                    .map(|seconds| Timing {
                        side: Direction::Up,
                        seconds,
                    });

                self.last_query_timestamp = Some(self.ask_timestamp);
                self.respond_timestamp = timestamp;
                self.set_phase(Phase::Responding);
                spacing
            }
            (Phase::Responding, Direction::Down) => {
                if timestamp - self.respond_timestamp < RESPONSE_TIME {
                    self.respond_timestamp = (self.respond_timestamp + timestamp) / 2.0;
                }
                None
            }
            (Phase::Responding, Direction::Up) => {
                let diff = self.respond_timestamp - self.ask_timestamp;
                let latency = (diff < RESPONSE_TIME).then_some(Timing {
                    side: Direction::Down,
                    seconds: diff,
                });

                self.ask_timestamp = timestamp;
                self.set_phase(Phase::Asking);
                latency
            }
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        log::debug!("Conversation {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }
}

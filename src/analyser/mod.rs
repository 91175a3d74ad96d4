//! Passive analysis of TLS-wrapped flows.
//! Infer request/response structure from message sizes and timing, without decrypting anything.
pub mod utils;
pub mod core;
pub mod containers;
pub mod tls;
pub mod segment;
pub mod conversation;
pub mod histogram;

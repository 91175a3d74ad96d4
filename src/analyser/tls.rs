//! Lightweight TLS record header walking.
//!
//! We never decode TLS, we only look at the 5-byte record headers to decide whether a
//! transport payload starts (or continues) TLS Application Data.

pub const CHANGE_CIPHER_SPEC: u8 = 0x14;
pub const ALERT: u8 = 0x15;
pub const HANDSHAKE: u8 = 0x16;
pub const APPLICATION_DATA: u8 = 0x17;

/// Content type, major version, minor version, 2-byte length.
pub const RECORD_HEADER_LEN: usize = 5;

/// Maximum plaintext record size allowed by the TLS record layer.
pub const MAX_RECORD_LEN: usize = 16384;

/// Walks the chain of TLS record headers in `buffer` and reports whether one of them is
/// Application Data.
///
/// Handshake, Alert and ChangeCipherSpec records are skipped using their length field, so a
/// packet that carries e.g. `Finished` followed by the first Application Data record is still
/// accepted. Anything that does not look like a TLS 1.x header fails the check, as does a
/// record whose length would take us past the end of the buffer before we find Application Data.
pub fn is_application_data(buffer: &[u8]) -> bool {
    if buffer.len() < RECORD_HEADER_LEN {
        return false;
    }

    let mut i: usize = 0;

    while i < buffer.len() {
        // Need at least content type and version to say anything
        let (content_type, major, minor) = match buffer.get(i..i + 3) {
            Some(&[t, ma, mi]) => (t, ma, mi),
            _ => return false,
        };

        if major != 3 || minor > 3 {
            log::trace!("Not TLS at offset {i}: version {major}.{minor}");
            return false;
        }

        match content_type {
            APPLICATION_DATA => return true,
            CHANGE_CIPHER_SPEC | ALERT | HANDSHAKE => {}
            other => {
                log::trace!("Unknown TLS content type {other:#04x} at offset {i}");
                return false;
            }
        }

        let record_len = match buffer.get(i + 3..i + RECORD_HEADER_LEN) {
            Some(&[hi, lo]) => u16::from_be_bytes([hi, lo]) as usize,
            _ => return false,
        };

        if record_len > MAX_RECORD_LEN {
            return false;
        }

        // Strictly increasing, so the walk ends once we run out of input.
        i += RECORD_HEADER_LEN + record_len;
    }

    false
}

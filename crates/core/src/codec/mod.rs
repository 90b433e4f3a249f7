//! Binary stream format understood by the suit firmware.
//!
//! Each suit receives a flat run of 5-byte records: a big-endian `u32`
//! millisecond timestamp followed by one status byte. Bits 5..0 of the status
//! byte flag head, body primary, body secondary, leg primary, leg secondary
//! and reserve. There is no header, length prefix or checksum, so a receiver
//! finds record boundaries from the fixed stride alone.

use std::fmt::Write as _;

use crate::{LedSuitError, Result, SuitPart, SuitState, Waypoint};

/// Size in bytes of one encoded waypoint.
pub const RECORD_LEN: usize = 5;

/// Presence bitmask of a suit state. Only whether a part is lit survives;
/// the colors themselves are not transmitted.
pub fn compress_suit_state(state: &SuitState) -> u8 {
    SuitPart::ALL
        .iter()
        .filter(|part| state.part(**part).is_lit())
        .fold(0, |mask, part| mask | part.bit())
}

/// Big-endian millisecond timestamp. Rounds half away from zero and
/// saturates at the `u32` range.
pub fn time_to_bytes(time_seconds: f64) -> [u8; 4] {
    let millis = (time_seconds * 1000.0).round();
    let millis = if millis.is_nan() {
        0
    } else {
        millis.clamp(0.0, u32::MAX as f64) as u32
    };
    millis.to_be_bytes()
}

/// Encodes one byte stream per suit.
///
/// `connection_count` is the number of endpoints the streams will be sent
/// to. Nothing is encoded unless it matches `suit_count` and every waypoint
/// holds exactly `suit_count` states. Waypoints are written in ascending time
/// order whatever order they are passed in.
pub fn encode(
    waypoints: &[Waypoint],
    suit_count: usize,
    connection_count: usize,
) -> Result<Vec<Vec<u8>>> {
    if connection_count != suit_count {
        return Err(LedSuitError::SuitCountMismatch {
            suits: suit_count,
            connections: connection_count,
        });
    }
    if let Some(bad) = waypoints.iter().find(|w| w.suit_count() != suit_count) {
        return Err(LedSuitError::StateCountMismatch {
            expected: suit_count,
            actual: bad.suit_count(),
        });
    }

    let mut ordered: Vec<&Waypoint> = waypoints.iter().collect();
    ordered.sort_by(|a, b| a.time_seconds.total_cmp(&b.time_seconds));

    let streams: Vec<Vec<u8>> = (0..suit_count)
        .map(|suit| {
            let mut stream = Vec::with_capacity(ordered.len() * RECORD_LEN);
            for waypoint in &ordered {
                stream.extend_from_slice(&time_to_bytes(waypoint.time_seconds));
                stream.push(compress_suit_state(&waypoint.suit_states[suit]));
            }
            stream
        })
        .collect();

    tracing::debug!(
        suits = suit_count,
        waypoints = ordered.len(),
        "encoded waypoint streams"
    );
    Ok(streams)
}

/// One decoded record of a suit stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireRecord {
    pub time_ms: u32,
    pub mask: u8,
}

impl WireRecord {
    pub fn time_seconds(&self) -> f64 {
        f64::from(self.time_ms) / 1000.0
    }

    pub fn is_lit(&self, part: SuitPart) -> bool {
        self.mask & part.bit() != 0
    }
}

/// Splits a suit stream back into records the way the firmware does.
pub fn decode_stream(bytes: &[u8]) -> Result<Vec<WireRecord>> {
    if bytes.len() % RECORD_LEN != 0 {
        return Err(LedSuitError::invalid(format!(
            "stream of {} bytes ends with a partial {RECORD_LEN}-byte record",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(RECORD_LEN)
        .map(|chunk| WireRecord {
            time_ms: u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
            mask: chunk[4],
        })
        .collect())
}

/// Upper-case, space separated hex dump.
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{byte:02X}");
    }
    out
}

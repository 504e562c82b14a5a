//! Frame decoding
//!
//! Turns the noisy character stream of a scale into weight values.
//!
//! - Legacy scales send `+NNNNNN` frames that may be split across reads, so
//!   text accumulates in a rolling buffer until a complete frame appears.
//! - Standard scales send bare digit groups, one per read. Each chunk is
//!   decoded on its own; letters stand in for digits on some display states
//!   and are read as `8`, the glyph with every segment lit.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use super::classifier::ProtocolVariant;
use super::DEFAULT_DECODE_BUFFER_LIMIT;

/// Length of a complete legacy frame (`+` followed by six digits)
pub const LEGACY_FRAME_LEN: usize = 7;

/// Divisor applied to the raw standard-scale value
pub const STANDARD_SCALE_DIVISOR: f64 = 1000.0;

fn legacy_frame() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\+([0-9]{6})").expect("legacy frame pattern is valid"))
}

/// A decoded weight and the rule used to present it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Weight {
    /// Integer count of scale units (legacy scales)
    Units(u32),
    /// Fixed-point value, raw reading divided by 1000 (standard scales)
    Scaled(f64),
}

impl Weight {
    /// Numeric value without display rounding
    pub fn value(&self) -> f64 {
        match self {
            Weight::Units(units) => f64::from(*units),
            Weight::Scaled(value) => *value,
        }
    }

    /// Value as shown to the user: scaled readings round to the nearest
    /// integer, halves away from zero.
    pub fn display_value(&self) -> i64 {
        match self {
            Weight::Units(units) => i64::from(*units),
            Weight::Scaled(value) => value.round() as i64,
        }
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_value())
    }
}

/// Latest weight produced by a decode session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightReading {
    /// Decoded weight
    pub weight: Weight,
    /// When the reading was decoded
    pub received_at: DateTime<Utc>,
}

impl WeightReading {
    /// Stamp a weight with the current time
    pub fn new(weight: Weight) -> Self {
        Self {
            weight,
            received_at: Utc::now(),
        }
    }
}

/// Remove everything outside printable ASCII (space through tilde)
pub fn strip_non_printable(text: &str) -> String {
    text.chars().filter(|c| (' '..='~').contains(c)).collect()
}

/// Extract the next weight from `buffer`, consuming what was used.
///
/// `buffer` must contain printable ASCII only. For [`ProtocolVariant::Legacy`]
/// the buffer is drained through the end of the first complete frame and
/// anything after it is kept for the next call. For
/// [`ProtocolVariant::Standard`] the buffer holds one chunk and is always
/// consumed entirely.
///
/// Malformed input is ordinary traffic and only ever yields `None`.
pub fn decode(buffer: &mut String, variant: ProtocolVariant) -> Option<Weight> {
    match variant {
        ProtocolVariant::Legacy => decode_legacy(buffer),
        ProtocolVariant::Standard => {
            let chunk = std::mem::take(buffer);
            decode_standard(&chunk)
        }
    }
}

fn decode_legacy(buffer: &mut String) -> Option<Weight> {
    let (end, units) = {
        let captures = legacy_frame().captures(buffer)?;
        let end = captures.get(0)?.end();
        (end, captures[1].parse::<u32>().ok())
    };
    buffer.drain(..end);
    units.map(Weight::Units)
}

fn decode_standard(chunk: &str) -> Option<Weight> {
    let normalized: String = chunk
        .chars()
        .map(|c| if c.is_ascii_alphabetic() { '8' } else { c })
        .collect();
    let raw = normalized.trim().parse::<f64>().ok()?;
    let value = raw / STANDARD_SCALE_DIVISOR;
    (value > 0.0).then_some(Weight::Scaled(value))
}

/// Decode state for one connection
///
/// Created when a read loop starts and dropped with it, so nothing carries
/// over between connections.
#[derive(Debug)]
pub struct DecodeSession {
    variant: ProtocolVariant,
    buffer: String,
    buffer_limit: usize,
}

impl DecodeSession {
    /// Create a session with the default buffer limit
    pub fn new(variant: ProtocolVariant) -> Self {
        Self::with_buffer_limit(variant, DEFAULT_DECODE_BUFFER_LIMIT)
    }

    /// Create a session whose legacy buffer is trimmed beyond `limit` characters
    pub fn with_buffer_limit(variant: ProtocolVariant, limit: usize) -> Self {
        Self {
            variant,
            buffer: String::new(),
            buffer_limit: limit.max(LEGACY_FRAME_LEN),
        }
    }

    /// Variant this session decodes
    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    /// Text held back waiting for the rest of a frame
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Feed one raw chunk read from the port.
    ///
    /// Returns the most recent weight the chunk completed, if any.
    pub fn push(&mut self, bytes: &[u8]) -> Option<WeightReading> {
        let text = String::from_utf8_lossy(bytes);
        let printable = strip_non_printable(&text);

        let weight = match self.variant {
            ProtocolVariant::Legacy => {
                self.buffer.push_str(&printable);
                let mut latest = None;
                while let Some(weight) = decode(&mut self.buffer, ProtocolVariant::Legacy) {
                    latest = Some(weight);
                }
                self.enforce_limit();
                latest
            }
            ProtocolVariant::Standard => {
                let mut chunk = printable;
                decode(&mut chunk, ProtocolVariant::Standard)
            }
        };

        weight.map(WeightReading::new)
    }

    // Keep only the tail that could still grow into a frame.
    fn enforce_limit(&mut self) {
        if self.buffer.len() <= self.buffer_limit {
            return;
        }
        let cut = self.buffer.len() - (LEGACY_FRAME_LEN - 1);
        tracing::warn!(
            discarded = cut,
            limit = self.buffer_limit,
            "legacy decode buffer over limit without a frame, trimming"
        );
        self.buffer.drain(..cut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_legacy_frame_in_noise() {
        let mut buffer = String::from("junk+000123trailing");
        assert_eq!(decode(&mut buffer, ProtocolVariant::Legacy), Some(Weight::Units(123)));
        assert_eq!(buffer, "trailing");
    }

    #[test]
    fn test_legacy_incomplete_frame_waits() {
        let mut buffer = String::from("+12");
        assert_eq!(decode(&mut buffer, ProtocolVariant::Legacy), None);
        assert_eq!(buffer, "+12");

        buffer.push_str("3456");
        assert_eq!(decode(&mut buffer, ProtocolVariant::Legacy), Some(Weight::Units(123456)));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_legacy_requires_plus_prefix() {
        let mut buffer = String::from("000123 -000456");
        assert_eq!(decode(&mut buffer, ProtocolVariant::Legacy), None);
    }

    #[test]
    fn test_legacy_digits_are_ascii_only() {
        let mut buffer = String::from("+\u{0661}\u{0662}\u{0663}\u{0664}\u{0665}\u{0666} +000123");
        assert_eq!(decode(&mut buffer, ProtocolVariant::Legacy), Some(Weight::Units(123)));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_legacy_seven_digits_takes_first_six() {
        let mut buffer = String::from("+1234567");
        assert_eq!(decode(&mut buffer, ProtocolVariant::Legacy), Some(Weight::Units(123456)));
        assert_eq!(buffer, "7");
    }

    #[test]
    fn test_standard_scaled_value() {
        let mut buffer = String::from("01500");
        let weight = decode(&mut buffer, ProtocolVariant::Standard).unwrap();
        assert_eq!(weight, Weight::Scaled(1.5));
        assert_eq!(weight.display_value(), 2);
        assert_eq!(weight.to_string(), "2");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_standard_zero_is_ignored() {
        let mut buffer = String::from("0000");
        assert_eq!(decode(&mut buffer, ProtocolVariant::Standard), None);
    }

    #[test]
    fn test_standard_letters_become_eights() {
        let mut buffer = String::from("A1B2C3");
        assert_eq!(
            decode(&mut buffer, ProtocolVariant::Standard),
            Some(Weight::Scaled(818.283))
        );
    }

    #[test]
    fn test_standard_noise_is_ignored() {
        for chunk in ["", "   ", "-", "1.2.3", "12 34", "--5", "-01500"] {
            let mut buffer = String::from(chunk);
            assert_eq!(decode(&mut buffer, ProtocolVariant::Standard), None, "{:?}", chunk);
        }
    }

    #[test]
    fn test_standard_surrounding_spaces() {
        let mut buffer = String::from("  02500 ");
        assert_eq!(
            decode(&mut buffer, ProtocolVariant::Standard),
            Some(Weight::Scaled(2.5))
        );
    }

    #[test]
    fn test_display_rounding() {
        assert_eq!(Weight::Scaled(2.5).display_value(), 3);
        assert_eq!(Weight::Scaled(2.4999).display_value(), 2);
        assert_eq!(Weight::Scaled(0.001).display_value(), 0);
        assert_eq!(Weight::Units(42).display_value(), 42);
    }

    #[test]
    fn test_strip_non_printable() {
        assert_eq!(strip_non_printable("\u{2}+000123\r\n"), "+000123");
        assert_eq!(strip_non_printable("a\u{fffd}b\tc~"), "abc~");
    }

    #[test]
    fn test_session_legacy_split_across_chunks() {
        let mut session = DecodeSession::new(ProtocolVariant::Legacy);
        assert!(session.push(b"\x02+00").is_none());
        assert!(session.push(b"12").is_none());
        let reading = session.push(b"34\r\n").unwrap();
        assert_eq!(reading.weight, Weight::Units(1234));
        assert_eq!(session.buffered(), "");
    }

    #[test]
    fn test_session_legacy_latest_frame_wins() {
        let mut session = DecodeSession::new(ProtocolVariant::Legacy);
        let reading = session.push(b"+000100\r\n+000200\r\n+0003").unwrap();
        assert_eq!(reading.weight, Weight::Units(200));
        assert_eq!(session.buffered(), "+0003");
    }

    #[test]
    fn test_session_legacy_invalid_utf8_does_not_break_frame() {
        let mut session = DecodeSession::new(ProtocolVariant::Legacy);
        let reading = session.push(&[0xff, b'+', b'0', b'0', b'0', 0xfe, b'0', b'4', b'2']);
        assert_eq!(reading.map(|r| r.weight), Some(Weight::Units(42)));
    }

    #[test]
    fn test_session_standard_is_per_chunk() {
        let mut session = DecodeSession::new(ProtocolVariant::Standard);
        assert!(session.push(b"01").is_none());
        let reading = session.push(b"500\r\n").unwrap();
        assert_eq!(reading.weight, Weight::Scaled(0.5));
        assert_eq!(session.buffered(), "");
    }

    #[test]
    fn test_session_standard_strips_control_bytes() {
        let mut session = DecodeSession::new(ProtocolVariant::Standard);
        let reading = session.push(b"\x0201500\x03").unwrap();
        assert_eq!(reading.weight, Weight::Scaled(1.5));
    }

    #[test]
    fn test_session_legacy_buffer_is_bounded() {
        let mut session = DecodeSession::with_buffer_limit(ProtocolVariant::Legacy, 16);
        assert!(session.push(b"noise noise noise noise +0001").is_none());
        assert_eq!(session.buffered(), " +0001");

        let reading = session.push(b"23").unwrap();
        assert_eq!(reading.weight, Weight::Units(123));
    }
}

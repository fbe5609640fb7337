//! Payload translation between the browser and the analyzer.
//!
//! The web client speaks WebSocket *text* frames in which each character is
//! one serial byte (see [`vna_core::codec`]).  These functions are the only
//! place the bridge converts between the two representations.
//!
//! ```text
//! Browser → Device:  text frame  → bytes   call: translate_browser_to_device()
//! Device  → Browser: bytes       → text    call: translate_device_to_browser()
//! ```
//!
//! No framing or validation of the serial protocol happens here: the payload
//! is opaque.

use thiserror::Error;
use vna_core::codec::{decode_payload, encode_payload, CodecError};

/// Errors that can occur while translating a browser payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// The browser sent a character that does not stand for a single byte.
    #[error("browser payload is not byte-per-character text: {0}")]
    NotBytePayload(#[from] CodecError),
}

/// Converts a browser text payload into the bytes to write to the device.
///
/// # Errors
///
/// Returns [`BridgeError::NotBytePayload`] if any character is above
/// `U+00FF`.  The whole message is rejected; nothing should be written.
///
/// # Example
///
/// ```rust
/// use vna_web_bridge::application::translate_browser_to_device;
///
/// assert_eq!(translate_browser_to_device("scan\r").unwrap(), b"scan\r");
/// ```
pub fn translate_browser_to_device(text: &str) -> Result<Vec<u8>, BridgeError> {
    Ok(decode_payload(text)?)
}

/// Converts bytes read from the device into a browser text payload.
pub fn translate_device_to_browser(bytes: &[u8]) -> String {
    encode_payload(bytes)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_command_translates_unchanged() {
        assert_eq!(
            translate_browser_to_device("sweep 50000 900000000 101\r").unwrap(),
            b"sweep 50000 900000000 101\r"
        );
    }

    #[test]
    fn test_high_byte_characters_become_single_bytes() {
        // "ÿ" is U+00FF; in UTF-8 it is two bytes, but on the wire it is one.
        assert_eq!(translate_browser_to_device("ÿ\u{0}").unwrap(), vec![0xFF, 0x00]);
    }

    #[test]
    fn test_wide_character_is_rejected() {
        let result = translate_browser_to_device("€");
        assert!(matches!(result, Err(BridgeError::NotBytePayload(_))));
    }

    #[test]
    fn test_device_bytes_become_one_char_each() {
        let text = translate_device_to_browser(&[b'c', b'h', b'>', 0x80, 0xFE]);
        assert_eq!(text.chars().count(), 5);
        assert_eq!(text, "ch>\u{80}\u{FE}");
    }

    #[test]
    fn test_binary_payload_survives_both_directions() {
        let bytes: Vec<u8> = (0..=255u8).chain((0..=255u8).rev()).collect();
        let back = translate_browser_to_device(&translate_device_to_browser(&bytes)).unwrap();
        assert_eq!(back, bytes);
    }
}

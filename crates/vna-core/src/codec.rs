//! Lossless mapping between raw serial bytes and WebSocket text payloads.
//!
//! The browser front end exchanges serial data as WebSocket *text* frames in
//! which every character stands for exactly one byte: the byte `0xNN` is the
//! code point `U+00NN`.  This is the ISO-8859-1 (Latin-1) identity map, and it
//! is the only mapping that survives UTF-8 text framing unchanged for all 256
//! byte values, including control bytes and sequences that are not valid
//! UTF-8 on their own.
//!
//! ```text
//! bytes:  [0x00, 0x41, 0xFF]
//! text:   "\u{0000}A\u{00FF}"   (sent on the wire as UTF-8: 00 41 C3 BF)
//! ```

use thiserror::Error;

/// Errors that can occur when turning an inbound text payload back into bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The text contained a character outside `U+0000..=U+00FF`, which has no
    /// single-byte representation.
    #[error("character {ch:?} at index {index} is outside U+0000..=U+00FF")]
    Unrepresentable { index: usize, ch: char },
}

/// Encodes raw device bytes as a text payload, one code point per byte.
///
/// # Examples
///
/// ```rust
/// use vna_core::codec::encode_payload;
///
/// assert_eq!(encode_payload(b"ch 0\r\n"), "ch 0\r\n");
/// assert_eq!(encode_payload(&[0xFF]), "\u{FF}");
/// ```
pub fn encode_payload(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

/// Decodes a text payload back into the raw bytes it represents.
///
/// # Errors
///
/// Returns [`CodecError::Unrepresentable`] for the first character above
/// `U+00FF`.  Nothing is partially decoded: either every character maps to a
/// byte or the whole payload is rejected.
pub fn decode_payload(text: &str) -> Result<Vec<u8>, CodecError> {
    text.chars()
        .enumerate()
        .map(|(index, ch)| u8::try_from(ch).map_err(|_| CodecError::Unrepresentable { index, ch }))
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_byte_value_survives_encode_then_decode() {
        // Arrange: all 256 byte values, in order
        let bytes: Vec<u8> = (0..=255u8).collect();

        // Act
        let text = encode_payload(&bytes);
        let back = decode_payload(&text).unwrap();

        // Assert
        assert_eq!(text.chars().count(), 256, "one code point per byte");
        assert_eq!(back, bytes);
    }

    #[test]
    fn test_every_latin1_string_survives_decode_then_encode() {
        let text: String = (0..=255u8).rev().map(char::from).collect();
        let bytes = decode_payload(&text).unwrap();
        assert_eq!(encode_payload(&bytes), text);
    }

    #[test]
    fn test_empty_payload_is_empty_text() {
        assert_eq!(encode_payload(&[]), "");
        assert_eq!(decode_payload("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_invalid_utf8_bytes_are_preserved() {
        // A lone continuation byte and an overlong lead byte are not valid
        // UTF-8; String::from_utf8_lossy would replace them with U+FFFD.
        let bytes = [0x80, 0xC0, 0x0D, 0x0A];
        assert_eq!(decode_payload(&encode_payload(&bytes)).unwrap(), bytes);
    }

    #[test]
    fn test_high_bytes_are_not_utf8_passthrough() {
        // 0xE9 must become U+00E9, which UTF-8 encodes as two bytes.
        let text = encode_payload(&[0xE9]);
        assert_eq!(text, "é");
        assert_eq!(text.as_bytes(), &[0xC3, 0xA9]);
    }

    #[test]
    fn test_decode_rejects_code_point_above_ff() {
        // Arrange: 'Ā' is U+0100
        let result = decode_payload("abĀ");

        // Assert: the error names the offending character and its position
        assert_eq!(
            result,
            Err(CodecError::Unrepresentable {
                index: 2,
                ch: 'Ā'
            })
        );
    }

    #[test]
    fn test_decode_rejects_astral_code_point() {
        assert!(matches!(
            decode_payload("😀"),
            Err(CodecError::Unrepresentable { index: 0, .. })
        ));
    }
}

//! NMEA 0183 sentence checksum.
//!
//! The checksum is the XOR of every byte between the leading `!`/`$` and
//! the `*` delimiter, written as two hex digits after the `*`.

use crate::types::{hex_byte, hex_digit, AisError, Result};

/// XOR of all bytes in `body`.
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0u8, |acc, b| acc ^ b)
}

/// Split a sentence into its checksummed body (without leading `!`/`$`)
/// and validate the declared checksum.
///
/// Returns `MalformedField` when there is no `*hh` suffix at all and
/// `Checksum` when the suffix does not match.
pub fn verify(sentence: &str) -> Result<&str> {
    let sentence = sentence.trim();
    let rest = sentence
        .strip_prefix('!')
        .or_else(|| sentence.strip_prefix('$'))
        .ok_or(AisError::MalformedField("start delimiter"))?;

    let (body, suffix) = rest
        .rsplit_once('*')
        .ok_or(AisError::MalformedField("checksum delimiter"))?;

    let digits = suffix.as_bytes();
    if digits.len() != 2 {
        return Err(AisError::MalformedField("checksum"));
    }
    let declared = match (hex_digit(digits[0]), hex_digit(digits[1])) {
        (Some(h), Some(l)) => (h << 4) | l,
        _ => return Err(AisError::MalformedField("checksum")),
    };

    let computed = checksum(body);
    if computed != declared {
        return Err(AisError::Checksum { computed, declared });
    }
    Ok(body)
}

/// Wrap a body as `!<body>*HH`.
pub fn armor(body: &str) -> String {
    format!("!{body}*{}", hex_byte(checksum(body)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

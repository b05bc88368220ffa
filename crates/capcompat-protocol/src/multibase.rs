//! Multibase strings and unsigned varints.
//!
//! Only the two bases the process contract uses are supported:
//! `base64pad` (prefix `M`) for key material and proof archives on the
//! command line, and `base58btc` (prefix `z`) for `did:key` identifiers.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::EncodingError;

/// RFC 4648 padded base64 with the `M` multibase prefix.
pub mod base64pad {
    use super::*;

    pub const PREFIX: char = 'M';

    pub fn encode(bytes: &[u8]) -> String {
        format!("{PREFIX}{}", STANDARD.encode(bytes))
    }

    pub fn decode(input: &str) -> Result<Vec<u8>, EncodingError> {
        let rest = strip(input, PREFIX)?;
        Ok(STANDARD.decode(rest)?)
    }
}

/// Bitcoin-alphabet base58 with the `z` multibase prefix.
pub mod base58btc {
    use super::*;

    pub const PREFIX: char = 'z';

    pub fn encode(bytes: &[u8]) -> String {
        format!("{PREFIX}{}", bs58::encode(bytes).into_string())
    }

    pub fn decode(input: &str) -> Result<Vec<u8>, EncodingError> {
        let rest = strip(input, PREFIX)?;
        Ok(bs58::decode(rest).into_vec()?)
    }
}

fn strip(input: &str, prefix: char) -> Result<&str, EncodingError> {
    input
        .strip_prefix(prefix)
        .ok_or_else(|| EncodingError::Prefix {
            expected: prefix,
            actual: input.chars().next(),
        })
}

/// Unsigned LEB128 varints as used by multicodec tags and CAR framing.
pub mod varint {
    use crate::error::EncodingError;

    pub fn encode(mut value: u64) -> Vec<u8> {
        let mut out = Vec::with_capacity(10);
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                out.push(byte);
                return out;
            }
            out.push(byte | 0x80);
        }
    }

    /// Decode a varint from the front of `bytes`, returning the value and
    /// the number of bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<(u64, usize), EncodingError> {
        let mut value = 0u64;
        for (i, byte) in bytes.iter().enumerate() {
            if i >= 10 {
                return Err(EncodingError::VarintOverflow);
            }
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok((value, i + 1));
            }
        }
        Err(EncodingError::TruncatedVarint)
    }

    /// Prefix `payload` with the varint encoding of `code`.
    pub fn tag(code: u64, payload: &[u8]) -> Vec<u8> {
        let mut out = encode(code);
        out.extend_from_slice(payload);
        out
    }
}

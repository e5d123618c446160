//! Byte-to-string encoders.
//!
//! An [`Encoder`] turns an arbitrary byte sequence into a printable string.
//! Encoders are deterministic and total: every input produces a string.

use crate::generator::OidError;

/// Crockford base 32 dictionary (<https://www.crockford.com/base32.html>), lowercase.
pub const CROCKFORD_ALPHABET: &[u8; 32] = b"0123456789abcdefghjkmnpqrstvwxyz";

/// Anything that can encode bytes into a string.
pub trait Encoder: Send + Sync {
    fn encode(&self, bytes: &[u8]) -> String;
}

/// Adapts a plain function or closure into an [`Encoder`].
///
/// ```
/// use oid::{Encoder, FnEncoder};
///
/// let upper = FnEncoder(|b: &[u8]| hex::encode_upper(b));
/// assert_eq!(upper.encode(&[0xab, 0x01]), "AB01");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FnEncoder<F>(pub F);

impl<F> Encoder for FnEncoder<F>
where
    F: Fn(&[u8]) -> String + Send + Sync,
{
    #[inline]
    fn encode(&self, bytes: &[u8]) -> String {
        (self.0)(bytes)
    }
}

/// Unpadded Crockford base 32.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Crockford32;

impl Crockford32 {
    /// Decode an unpadded Crockford base 32 string. Upper-case input is accepted.
    pub fn decode(&self, s: &str) -> Result<Vec<u8>, OidError> {
        // 8n/5 rounded up never leaves 1, 3 or 6 characters in the last group
        if matches!(s.len() % 8, 1 | 3 | 6) {
            return Err(OidError::InvalidFormat(s.to_string()));
        }

        let mut out = Vec::with_capacity(s.len() * 5 / 8);
        let mut acc: u16 = 0;
        let mut bits = 0u32;

        for c in s.bytes() {
            let v = crockford_value(c).ok_or_else(|| OidError::InvalidFormat(s.to_string()))?;
            acc = (acc << 5) | u16::from(v);
            bits += 5;
            if bits >= 8 {
                bits -= 8;
                out.push((acc >> bits) as u8);
                acc &= (1 << bits) - 1;
            }
        }

        // leftover padding bits must be zero for a canonical encoding
        if acc != 0 {
            return Err(OidError::InvalidFormat(s.to_string()));
        }

        Ok(out)
    }
}

fn crockford_value(c: u8) -> Option<u8> {
    let c = c.to_ascii_lowercase();
    CROCKFORD_ALPHABET
        .iter()
        .position(|&a| a == c)
        .map(|i| i as u8)
}

impl Encoder for Crockford32 {
    fn encode(&self, bytes: &[u8]) -> String {
        let mut out = String::with_capacity(bytes.len().div_ceil(5) * 8);
        let mut acc: u16 = 0;
        let mut bits = 0u32;

        for &b in bytes {
            acc = (acc << 8) | u16::from(b);
            bits += 8;
            while bits >= 5 {
                bits -= 5;
                out.push(CROCKFORD_ALPHABET[((acc >> bits) & 0x1f) as usize] as char);
            }
            acc &= (1 << bits) - 1;
        }

        if bits > 0 {
            out.push(CROCKFORD_ALPHABET[((acc << (5 - bits)) & 0x1f) as usize] as char);
        }

        out
    }
}

/// Lowercase hexadecimal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hex;

impl Hex {
    pub fn decode(&self, s: &str) -> Result<Vec<u8>, OidError> {
        hex::decode(s).map_err(|_| OidError::InvalidFormat(s.to_string()))
    }
}

impl Encoder for Hex {
    #[inline]
    fn encode(&self, bytes: &[u8]) -> String {
        hex::encode(bytes)
    }
}

/// Selects one of the built-in encoders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Crockford32,
    Hex,
}

impl Encoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Crockford32 => "crockford32",
            Self::Hex => "hex",
        }
    }

    pub fn encode(self, bytes: &[u8]) -> String {
        match self {
            Self::Crockford32 => Crockford32.encode(bytes),
            Self::Hex => Hex.encode(bytes),
        }
    }

    pub fn decode(self, s: &str) -> Result<Vec<u8>, OidError> {
        match self {
            Self::Crockford32 => Crockford32.decode(s),
            Self::Hex => Hex.decode(s),
        }
    }
}

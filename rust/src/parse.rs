//! Decoding and validation of ordered IDs.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};

use crate::encoding::Encoding;
use crate::generator::{Kind, OidError, TIMESTAMP_LEN};

static CROCKFORD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-hjkmnp-tv-zA-HJKMNP-TV-Z]+$").unwrap());

static HEX_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:[0-9a-fA-F]{2})+$").unwrap());

/// Parsed OID components.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedOid {
    pub raw: String,
    pub timestamp: DateTime<Utc>,
    pub timestamp_nanos: i64,
    #[serde(serialize_with = "as_hex")]
    pub entropy: Vec<u8>,
}

impl ParsedOid {
    /// Get Unix timestamp in seconds.
    pub fn timestamp_sec(&self) -> i64 {
        self.timestamp.timestamp()
    }
}

fn as_hex<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

fn pattern(encoding: Encoding) -> &'static Regex {
    match encoding {
        Encoding::Crockford32 => &CROCKFORD_PATTERN,
        Encoding::Hex => &HEX_PATTERN,
    }
}

/// Parse an ordered ID produced with `entropy_len` bytes of entropy.
pub fn parse_oid(id: &str, encoding: Encoding, entropy_len: usize) -> Result<ParsedOid, OidError> {
    if !pattern(encoding).is_match(id) {
        return Err(OidError::InvalidFormat(id.to_string()));
    }

    let raw = encoding.decode(id)?;
    let expected = Kind::Ordered
        .byte_len(entropy_len.max(1))
        .ok_or(OidError::InvalidLength {
            expected: usize::MAX,
            got: raw.len(),
        })?;
    if raw.len() != expected {
        return Err(OidError::InvalidLength {
            expected,
            got: raw.len(),
        });
    }

    let (ts, entropy) = raw.split_at(TIMESTAMP_LEN);
    let mut ts_bytes = [0u8; TIMESTAMP_LEN];
    ts_bytes.copy_from_slice(ts);
    let timestamp_nanos = i64::from_be_bytes(ts_bytes);

    Ok(ParsedOid {
        raw: id.to_string(),
        timestamp: DateTime::from_timestamp_nanos(timestamp_nanos),
        timestamp_nanos,
        entropy: entropy.to_vec(),
    })
}

/// Validate an ordered ID.
pub fn validate_oid(id: &str, encoding: Encoding, entropy_len: usize) -> bool {
    parse_oid(id, encoding, entropy_len).is_ok()
}

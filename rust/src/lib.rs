//! oid: compact, string-encoded un/ordered identifiers.
//!
//! OIDs are ordered, UIDs and SIDs are not. The default entropy source is not
//! cryptographically secure; use [`CryptoSource`] when that matters.
//!
//! # Format
//!
//! ```text
//! OID ::= TS(8) ENT(N)      TS = big-endian i64 nanoseconds since the Unix epoch
//! UID ::= ENT(N) ENT(N)
//! SID ::= ENT(N)
//! ```
//!
//! By default N = 8 and the bytes are encoded with lowercase Crockford base 32
//! (no padding), so an OID is 26 characters and safe for URLs and filenames.
//! OIDs run out of nanoseconds on Fri, 11 Apr 2262 23:47:16 UTC.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use oid::{CryptoSource, Generator, Hex};
//!
//! let id = oid::oid().expect("default source never fails");
//! assert_eq!(id.len(), 26);
//!
//! let hex_gen = Generator::new(Arc::new(Hex), Arc::new(CryptoSource), 4);
//! let uid = hex_gen.uid().unwrap();
//! assert_eq!(uid.len(), 16);
//! ```

mod config;
mod encoding;
mod generator;
mod parse;
mod source;

use once_cell::sync::Lazy;

pub use config::Config;
pub use encoding::{CROCKFORD_ALPHABET, Crockford32, Encoder, Encoding, FnEncoder, Hex};
pub use generator::{
    Clock, DEFAULT_ENTROPY_LEN, Generator, GeneratorState, Kind, MAX_ENTROPY_LEN, OidError,
    TIMESTAMP_LEN, system_clock,
};
pub use parse::{ParsedOid, parse_oid, validate_oid};
pub use source::{CryptoSource, EntropySource, MathSource};

static DEFAULT_GENERATOR: Lazy<Generator> = Lazy::new(|| {
    log::debug!("initializing default generator");
    Generator::default()
});

/// The process-wide generator behind [`oid()`], [`uid()`] and [`sid()`].
pub fn default_generator() -> &'static Generator {
    &DEFAULT_GENERATOR
}

/// Ordered ID from the default generator.
pub fn oid() -> Result<String, OidError> {
    default_generator().oid()
}

/// Unordered ID from the default generator.
pub fn uid() -> Result<String, OidError> {
    default_generator().uid()
}

/// Short unordered ID from the default generator.
pub fn sid() -> Result<String, OidError> {
    default_generator().sid()
}

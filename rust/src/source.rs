//! Entropy sources.

use chrono::Utc;
use once_cell::sync::Lazy;
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use std::sync::{Mutex, PoisonError};

use crate::generator::OidError;

/// Supplies random bytes on demand.
///
/// Implementations must be safe to share between threads and generators.
pub trait EntropySource: Send + Sync {
    /// Fill `buf` with random bytes, returning how many were written.
    fn fill(&self, buf: &mut [u8]) -> Result<usize, OidError>;
}

// Seeded once per process from the wall clock.
static MATH_RNG: Lazy<Mutex<SmallRng>> = Lazy::new(|| {
    let seed = Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| Utc::now().timestamp_micros());
    Mutex::new(SmallRng::seed_from_u64(seed as u64))
});

/// Fast, non-cryptographic PRNG. Not suitable for secrets.
#[derive(Debug, Clone, Copy, Default)]
pub struct MathSource;

impl EntropySource for MathSource {
    fn fill(&self, buf: &mut [u8]) -> Result<usize, OidError> {
        MATH_RNG
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fill_bytes(buf);
        Ok(buf.len())
    }
}

/// The platform's cryptographically secure RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct CryptoSource;

impl EntropySource for CryptoSource {
    fn fill(&self, buf: &mut [u8]) -> Result<usize, OidError> {
        getrandom::fill(buf).map_err(|e| OidError::Entropy(e.to_string()))?;
        Ok(buf.len())
    }
}

//! Generator configuration.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::encoding::{Crockford32, Encoder, Encoding, Hex};
use crate::generator::{DEFAULT_ENTROPY_LEN, Generator, Kind, OidError};
use crate::source::{CryptoSource, EntropySource, MathSource};

/// Selects the built-in source, encoder, layout and amount of IDs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bytes of entropy per draw; values below 1 are coerced to 1.
    pub length: i64,
    /// Use the cryptographically secure source.
    pub secure: bool,
    /// Use hex instead of Crockford base 32.
    pub hex: bool,
    pub kind: Kind,
    pub count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            length: DEFAULT_ENTROPY_LEN as i64,
            secure: false,
            hex: false,
            kind: Kind::Ordered,
            count: 1,
        }
    }
}

impl Config {
    /// Load a configuration from JSON; missing fields keep their defaults.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn encoding(&self) -> Encoding {
        if self.hex {
            Encoding::Hex
        } else {
            Encoding::Crockford32
        }
    }

    pub fn encoder(&self) -> Arc<dyn Encoder> {
        match self.encoding() {
            Encoding::Crockford32 => Arc::new(Crockford32),
            Encoding::Hex => Arc::new(Hex),
        }
    }

    pub fn source(&self) -> Arc<dyn EntropySource> {
        if self.secure {
            Arc::new(CryptoSource)
        } else {
            Arc::new(MathSource)
        }
    }

    pub fn generator(&self) -> Generator {
        Generator::new(self.encoder(), self.source(), self.length)
    }

    /// Build a generator and emit `count` IDs of the configured kind.
    pub fn emit(&self) -> Result<Vec<String>, OidError> {
        self.generator().next_n(self.kind, self.count)
    }
}

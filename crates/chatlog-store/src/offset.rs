//! Opaque, lexicographically comparable log offsets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A server-assigned cursor into one session's log.
///
/// Offsets are total-ordered within a session and carry no meaning across
/// sessions (spec §3). Internally backed by a `u64` sequence number, but
/// the wire representation is a zero-padded decimal string so that
/// lexicographic string comparison agrees with numeric comparison —
/// callers are expected to treat it as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Offset(u64);

const WIDTH: usize = 20;

impl Offset {
    pub const ZERO: Offset = Offset(0);

    pub fn new(raw: u64) -> Self {
        Offset(raw)
    }

    pub fn next(self) -> Self {
        Offset(self.0 + 1)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.0, width = WIDTH)
    }
}

impl FromStr for Offset {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Offset)
    }
}

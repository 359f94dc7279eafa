//! Content fingerprinting for change detection
//!
//! Validators returned by the source are only a fast path. Some sources
//! (spreadsheet export links in particular) answer every request with a 200
//! and identical bytes, or send no validators at all, so the fingerprint of
//! the raw payload is what decides whether content actually changed.

use std::fmt;

use serde::{Serialize, Serializer};

/// A 256-bit BLAKE3 hash of a raw payload
///
/// Equality is constant-time (inherited from [`blake3::Hash`]).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(blake3::Hash);

impl Fingerprint {
    /// Fingerprint a byte payload
    pub fn of(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes))
    }

    /// Raw hash bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Lowercase hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    /// Short form for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.as_bytes()[..6])
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Fingerprint a byte payload
pub fn fingerprint(bytes: &[u8]) -> Fingerprint {
    Fingerprint::of(bytes)
}

/// Whether a freshly fetched payload differs from the cached one
///
/// With nothing cached every payload counts as a change.
pub fn has_changed(new: &Fingerprint, cached: Option<&Fingerprint>) -> bool {
    match cached {
        Some(cached) => new != cached,
        None => true,
    }
}

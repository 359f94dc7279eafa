//! Immutable dataset snapshots and their provenance

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::fingerprint::Fingerprint;

/// Cache validators returned by the content source
///
/// Sent back as `If-None-Match` / `If-Modified-Since` on the next
/// conditional request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Validators {
    /// Opaque version token (`ETag`)
    pub etag: Option<String>,
    /// Timestamp validator (`Last-Modified`), kept verbatim
    pub last_modified: Option<String>,
}

impl Validators {
    /// Validators with only an entity tag
    pub fn with_etag(etag: impl Into<String>) -> Self {
        Self {
            etag: Some(etag.into()),
            last_modified: None,
        }
    }

    /// Set the last-modified validator
    pub fn and_last_modified(mut self, last_modified: impl Into<String>) -> Self {
        self.last_modified = Some(last_modified.into());
        self
    }

    /// True if neither validator is present
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }

    /// Fill validators missing from a fresh response with the previous ones
    pub fn or_previous(self, previous: Option<&Validators>) -> Self {
        match previous {
            Some(prev) => Self {
                etag: self.etag.or_else(|| prev.etag.clone()),
                last_modified: self.last_modified.or_else(|| prev.last_modified.clone()),
            },
            None => self,
        }
    }
}

/// A fully-formed dataset installed into the cache in one step
///
/// Never mutated once published; a newer snapshot replaces it wholesale.
#[derive(Debug)]
pub struct DatasetSnapshot<D> {
    dataset: D,
    fingerprint: Fingerprint,
    validators: Validators,
    fetched_at: DateTime<Utc>,
    payload_len: usize,
    version: u64,
}

impl<D> DatasetSnapshot<D> {
    /// Build a snapshot. The cache assigns the version on commit.
    pub fn new(
        dataset: D,
        fingerprint: Fingerprint,
        validators: Validators,
        fetched_at: DateTime<Utc>,
        payload_len: usize,
    ) -> Self {
        Self {
            dataset,
            fingerprint,
            validators,
            fetched_at,
            payload_len,
            version: 0,
        }
    }

    /// The parsed dataset
    pub fn dataset(&self) -> &D {
        &self.dataset
    }

    /// Fingerprint of the raw payload this snapshot was built from
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Validators the source sent with the payload
    pub fn validators(&self) -> &Validators {
        &self.validators
    }

    /// When the payload was fetched
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Size of the raw payload in bytes
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Commit sequence number (1 for the first committed snapshot)
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Provenance summary without the dataset itself
    pub fn info(&self) -> SnapshotInfo {
        SnapshotInfo {
            version: self.version,
            fingerprint: self.fingerprint.to_hex(),
            validators: self.validators.clone(),
            fetched_at: self.fetched_at,
            payload_len: self.payload_len,
        }
    }
}

/// Serializable provenance of a snapshot
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInfo {
    pub version: u64,
    pub fingerprint: String,
    pub validators: Validators,
    pub fetched_at: DateTime<Utc>,
    pub payload_len: usize,
}

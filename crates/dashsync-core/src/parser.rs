//! Parser seam between a fetched payload and a usable dataset
//!
//! Turning the payload into rows and columns belongs to the consumers of the
//! cache; the engine only needs something that accepts or rejects bytes.

use bytes::Bytes;

use crate::error::ParseError;

/// Builds a dataset from a raw payload
pub trait DatasetParser: Send + Sync {
    /// The dataset type stored in snapshots
    type Dataset: Send + Sync + 'static;

    /// Parse a payload, or reject it
    fn parse(&self, payload: &Bytes) -> Result<Self::Dataset, ParseError>;
}

/// The payload bytes, handed through unparsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDataset {
    bytes: Bytes,
}

impl RawDataset {
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Accepts any non-empty payload as a [`RawDataset`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDatasetParser;

impl DatasetParser for RawDatasetParser {
    type Dataset = RawDataset;

    fn parse(&self, payload: &Bytes) -> Result<RawDataset, ParseError> {
        if payload.is_empty() {
            return Err(ParseError::Empty);
        }
        Ok(RawDataset::new(payload.clone()))
    }
}

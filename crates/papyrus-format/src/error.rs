//! Closed error taxonomy for the object-graph decoder and re-encoder (spec §7).

use papyrus_codec::Truncated;
use std::fmt;

/// Invalid tag ordinal, magic mismatch, invalid variable count, invalid
/// opcode, invalid type code — recoverable per-entry, fatal per-block.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("format error at {where_}: {detail}")]
pub struct FormatError {
    /// Where in the decode recipe the mismatch was found.
    pub where_: &'static str,
    /// Human-readable detail (expected vs. found).
    pub detail: String,
}

impl FormatError {
    /// Builds a `FormatError` at `where_` with `detail`.
    pub fn new(where_: &'static str, detail: impl Into<String>) -> Self {
        Self { where_, detail: detail.into() }
    }
}

/// Any single decode failure the graph can recover from at the finest
/// granularity, carrying the partially decoded value where one exists.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// A primitive read ran past the end of the buffer.
    #[error(transparent)]
    Truncated(#[from] Truncated),
    /// A tag, magic, count, or opcode did not match an expected value.
    #[error(transparent)]
    Format(#[from] FormatError),
}

/// Wraps a failure inside a length-prefixed collection, keeping the
/// partially built container so callers can still inspect it.
#[derive(Debug)]
pub struct ListError<T> {
    /// Index of the element that failed.
    pub index: usize,
    /// Declared element count of the collection.
    pub count: usize,
    /// The underlying cause.
    pub cause: Box<DecodeError>,
    /// The elements successfully decoded before the failure.
    pub partial: Vec<T>,
}

impl<T> fmt::Display for ListError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error decoding element {} of {}: {}", self.index, self.count, self.cause)
    }
}

impl<T: fmt::Debug> std::error::Error for ListError<T> {}

/// Wraps a failure decoding a single node, keeping the partial node.
#[derive(Debug)]
pub struct ElementError<T> {
    /// The element identifier or name that failed, for diagnostics.
    pub element: String,
    /// The underlying cause.
    pub cause: Box<DecodeError>,
    /// The partially decoded node, if one could be constructed at all.
    pub partial: Option<T>,
}

impl<T> fmt::Display for ElementError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error decoding element {}: {}", self.element, self.cause)
    }
}

impl<T: fmt::Debug> std::error::Error for ElementError<T> {}

/// Result alias used throughout the decoder.
pub type DecodeResult<T> = Result<T, DecodeError>;

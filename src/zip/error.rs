//! Error types for header decoding and archive scanning.
//!
//! [`DecodeError`] is what the pure decoder reports about one buffer.
//! [`ScanError`] is what a scan reports to its caller: the same failures
//! lifted to absolute offsets, plus the byte source failures.

use std::str::Utf8Error;

use super::structures::LFH_SIGNATURE;

/// Boxed cause carried by errors that wrap a collaborator failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A Result type alias over ScanError.
pub type Result<T> = std::result::Result<T, ScanError>;

/// Failure to decode a local file header from a buffer.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("need {required} bytes to decode the header, buffer holds {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("unexpected signature {found:#010x} (expected {:#010x})", LFH_SIGNATURE)]
    BadSignature { found: u32 },

    #[error("file name is not valid UTF-8")]
    InvalidFileName(#[from] Utf8Error),
}

/// Failure of an archive scan.
///
/// Records emitted before the failure stay valid; none of these roll back.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The archive's total length could not be determined.
    #[error("archive size unavailable")]
    SizeUnavailable {
        #[source]
        source: BoxError,
    },

    /// No reader could be built for the archive's location.
    #[error("could not set up a reader for the archive")]
    SourceSetup {
        #[source]
        source: BoxError,
    },

    /// A range request failed after the byte source gave up retrying.
    #[error("fetch of {length} bytes at offset {offset} failed")]
    FetchFailed {
        offset: u64,
        length: u64,
        #[source]
        source: BoxError,
    },

    /// A fetch came back shorter than the header's declared length.
    #[error("header at offset {offset} needs {required} bytes, got {available}")]
    InsufficientData {
        offset: u64,
        required: u64,
        available: u64,
    },

    /// The bytes at the cursor are not a local file header.
    #[error("malformed local file header at offset {offset}: signature {found:#010x}")]
    MalformedHeader { offset: u64, found: u32 },

    #[error("file name of the entry at offset {offset} is not valid UTF-8")]
    InvalidFileName {
        offset: u64,
        #[source]
        source: Utf8Error,
    },

    /// The entry claims more bytes than the object holds.
    #[error("entry at offset {offset} ends at {end}, past the end of the {object_size} byte object")]
    EntryOutOfBounds {
        offset: u64,
        end: u64,
        object_size: u64,
    },

    /// Sizes live in a data descriptor after the payload, so the next
    /// header cannot be located from this one.
    #[error("entry {file_name:?} at offset {offset} defers its sizes to a data descriptor")]
    DeferredSizes { offset: u64, file_name: String },
}

impl ScanError {
    /// Absolute offset the failure relates to, if any
    pub fn offset(&self) -> Option<u64> {
        match self {
            ScanError::SizeUnavailable { .. } | ScanError::SourceSetup { .. } => None,
            ScanError::FetchFailed { offset, .. }
            | ScanError::InsufficientData { offset, .. }
            | ScanError::MalformedHeader { offset, .. }
            | ScanError::InvalidFileName { offset, .. }
            | ScanError::EntryOutOfBounds { offset, .. }
            | ScanError::DeferredSizes { offset, .. } => Some(*offset),
        }
    }
}

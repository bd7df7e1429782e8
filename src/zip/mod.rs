//! ZIP local file header decoding and scanning.
//!
//! This module lists the entries of an archive without its central
//! directory, by walking the local file headers from the front.
//!
//! ## Architecture
//!
//! - [`structures`]: the local file header record, its decoder and encoder,
//!   and the format constants
//! - [`scanner`]: the cursor loop that fetches and decodes one header at a
//!   time from a [`ReadAt`](crate::io::ReadAt) source
//! - [`error`]: decode and scan failures
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! Only part 1 is read here. Each local header states how long its name,
//! extra field and payload are, which is enough to find the next header.
//!
//! ## Limitations
//!
//! - No ZIP64 extended sizes
//! - Entries written with a data descriptor (sizes after the payload) stop
//!   the scan
//! - File names must be UTF-8

pub mod error;
pub mod scanner;
pub mod structures;

pub use error::{DecodeError, Result, ScanError};
pub use scanner::{
    ArchiveScanner, ScanEnd, ScanOptions, ScanOutcome, DEFAULT_FETCH_UNIT, MIN_TRAILER_RESERVE,
};
pub use structures::{CompressionMethod, LocalFileHeaderRecord, LFH_SIGNATURE, LFH_SIZE};

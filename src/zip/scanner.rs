//! Incremental local file header scanner.
//!
//! This module walks an archive from the front, one local file header at
//! a time, reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Scanning Strategy
//!
//! Each step fetches a small range at the cursor, decodes the header found
//! there and jumps over the entry's payload to the next header:
//!
//! ```text
//! cursor --> [30-byte header][name][extra][compressed payload] --> next cursor
//! ```
//!
//! Only headers are ever downloaded, so listing a multi-gigabyte archive
//! costs one small range request per entry. The walk ends when the cursor
//! reaches the reserve kept for end-of-archive records, runs into the
//! central directory, or fails.
//!
//! The next offset depends on the current header, so requests are issued
//! strictly one after another.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::io::ReadAt;
use crate::observe::{FetchEvent, NoopObserver, ScanObserver};

use super::error::{DecodeError, Result, ScanError};
use super::structures::*;

/// Bytes requested per header unless configured otherwise.
pub const DEFAULT_FETCH_UNIT: u64 = 256;

/// Bytes at the end of the object that are never parsed as a local header.
///
/// Every archive ends with an End of Central Directory record of at least
/// this size.
pub const MIN_TRAILER_RESERVE: u64 = EOCD_MIN_SIZE as u64;

/// Tunables for [`ArchiveScanner`].
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Size of the range requested at each header
    pub fetch_unit: u64,
    /// Bytes before end of object where scanning stops
    pub trailer_reserve: u64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            fetch_unit: DEFAULT_FETCH_UNIT,
            trailer_reserve: MIN_TRAILER_RESERVE,
        }
    }
}

impl ScanOptions {
    pub fn fetch_unit(mut self, fetch_unit: u64) -> Self {
        self.fetch_unit = fetch_unit;
        self
    }

    pub fn trailer_reserve(mut self, trailer_reserve: u64) -> Self {
        self.trailer_reserve = trailer_reserve;
        self
    }
}

/// Why a scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanEnd {
    /// The cursor entered the reserve at the end of the object.
    ReserveReached,
    /// Central directory or another end-of-archive structure found at `offset`.
    TrailerFound { offset: u64, signature: u32 },
    /// Fewer bytes than a fixed header remain.
    EndOfObject,
    /// The scan stopped on an error.
    Failed,
}

/// Everything a finished scan produced.
#[derive(Debug)]
pub struct ScanOutcome {
    /// Records in archive order
    pub records: Vec<LocalFileHeaderRecord>,
    pub end: ScanEnd,
    /// Set when `end` is [`ScanEnd::Failed`]
    pub error: Option<ScanError>,
    pub object_size: u64,
    /// Cursor position when the scan stopped
    pub cursor: u64,
}

impl ScanOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

enum Probe {
    Record(LocalFileHeaderRecord),
    Trailer(u32),
}

/// Walks the local file headers of one archive.
///
/// A scanner is built per archive, driven to completion and dropped.
///
/// ## Example
///
/// ```no_run
/// use std::sync::Arc;
/// use zipscan::{ArchiveScanner, MemoryReader, ScanOptions};
///
/// # async fn demo(bytes: Vec<u8>) -> zipscan::zip::Result<()> {
/// let reader = Arc::new(MemoryReader::new(bytes));
/// let mut scanner = ArchiveScanner::initialize(reader, &ScanOptions::default()).await?;
/// for record in scanner.run().await? {
///     println!("{} at {}..{}", record.file_name, record.data_start(), record.data_end());
/// }
/// # Ok(())
/// # }
/// ```
pub struct ArchiveScanner<R: ReadAt + ?Sized> {
    reader: Arc<R>,
    object_size: u64,
    cursor: u64,
    fetch_unit: u64,
    trailer_reserve: u64,
    emitted: Vec<LocalFileHeaderRecord>,
    observer: Arc<dyn ScanObserver>,
    /// Error raised after the record that caused it was emitted
    pending: Option<ScanError>,
    end: Option<ScanEnd>,
}

impl<R: ReadAt + ?Sized> ArchiveScanner<R> {
    /// Create a scanner over `reader`, asking it for the object size.
    ///
    /// # Errors
    ///
    /// [`ScanError::SizeUnavailable`] if the source cannot report a size,
    /// typically because the object does not exist.
    pub async fn initialize(reader: Arc<R>, options: &ScanOptions) -> Result<Self> {
        let object_size = reader
            .size()
            .await
            .map_err(|e| ScanError::SizeUnavailable { source: e.into() })?;

        // never request less than a fixed header; small objects fit one request
        let fetch_unit = options.fetch_unit.max(LFH_SIZE as u64).min(object_size);

        tracing::debug!(object_size, fetch_unit, "scanner initialized");

        Ok(Self {
            reader,
            object_size,
            cursor: 0,
            fetch_unit,
            trailer_reserve: options.trailer_reserve,
            emitted: Vec::new(),
            observer: Arc::new(NoopObserver),
            pending: None,
            end: None,
        })
    }

    /// Report each fetch to `observer`
    pub fn with_observer(mut self, observer: Arc<dyn ScanObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn object_size(&self) -> u64 {
        self.object_size
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn fetch_unit(&self) -> u64 {
        self.fetch_unit
    }

    /// Records decoded so far, in archive order
    pub fn emitted(&self) -> &[LocalFileHeaderRecord] {
        &self.emitted
    }

    /// How the scan ended, once it has
    pub fn end(&self) -> Option<ScanEnd> {
        self.end
    }

    /// Scan to the end and return every record.
    ///
    /// On error the records found before the failure remain available
    /// through [`emitted`](Self::emitted).
    pub async fn run(&mut self) -> Result<&[LocalFileHeaderRecord]> {
        while self.next_record().await?.is_some() {}
        Ok(&self.emitted)
    }

    /// Scan to the end, handing each record to `on_record` as soon as it
    /// is decoded.
    pub async fn scan_with<F>(mut self, mut on_record: F) -> ScanOutcome
    where
        F: FnMut(&LocalFileHeaderRecord),
    {
        let error = loop {
            match self.next_record().await {
                Ok(Some(record)) => on_record(record),
                Ok(None) => break None,
                Err(e) => break Some(e),
            }
        };

        ScanOutcome {
            records: self.emitted,
            end: self.end.unwrap_or(ScanEnd::Failed),
            error,
            object_size: self.object_size,
            cursor: self.cursor,
        }
    }

    /// Decode the next header and advance past its entry.
    ///
    /// Returns `Ok(None)` once the scan has ended. After an error every
    /// further call returns `Ok(None)`.
    pub async fn next_record(&mut self) -> Result<Option<&LocalFileHeaderRecord>> {
        if let Some(err) = self.pending.take() {
            self.end = Some(ScanEnd::Failed);
            return Err(err);
        }
        if self.end.is_some() {
            return Ok(None);
        }
        if let Some(end) = self.boundary() {
            tracing::debug!(cursor = self.cursor, ?end, "scan finished");
            self.end = Some(end);
            return Ok(None);
        }

        let offset = self.cursor;
        let probe = match self.probe(offset).await {
            Ok(probe) => probe,
            Err(e) => {
                self.end = Some(ScanEnd::Failed);
                return Err(e);
            }
        };

        let record = match probe {
            Probe::Record(record) => record,
            Probe::Trailer(signature) => {
                tracing::debug!(offset, signature, "reached end-of-archive structures");
                self.end = Some(ScanEnd::TrailerFound { offset, signature });
                return Ok(None);
            }
        };

        let end = record.data_end();
        if end > self.object_size {
            self.end = Some(ScanEnd::Failed);
            return Err(ScanError::EntryOutOfBounds {
                offset,
                end,
                object_size: self.object_size,
            });
        }

        tracing::debug!(
            offset,
            file_name = %record.file_name,
            compressed_size = record.compressed_size,
            data_start = record.data_start(),
            "decoded local file header"
        );

        if record.has_data_descriptor() {
            // the header itself is sound; the cursor just cannot move past it
            self.pending = Some(ScanError::DeferredSizes {
                offset,
                file_name: record.file_name.clone(),
            });
        } else {
            self.cursor = end;
        }

        self.emitted.push(record);
        Ok(self.emitted.last())
    }

    fn boundary(&self) -> Option<ScanEnd> {
        if self.cursor >= self.object_size.saturating_sub(self.trailer_reserve) {
            return Some(ScanEnd::ReserveReached);
        }
        if self.object_size - self.cursor < LFH_SIZE as u64 {
            return Some(ScanEnd::EndOfObject);
        }
        None
    }

    /// Fetch and decode whatever sits at `offset`, widening the request
    /// once if the header's name and extra field did not fit.
    async fn probe(&self, offset: u64) -> Result<Probe> {
        let remaining = self.object_size - offset;
        let request_len = self.fetch_unit.min(remaining);
        let buf = self.fetch(offset, request_len).await?;

        let decoded = match LocalFileHeaderRecord::decode(&buf, offset) {
            Err(DecodeError::InsufficientData { required, .. }) => {
                let required = required as u64;
                if required > remaining {
                    return Err(ScanError::EntryOutOfBounds {
                        offset,
                        end: offset + required,
                        object_size: self.object_size,
                    });
                }

                tracing::debug!(offset, required, "widening header fetch");
                let buf = self.fetch(offset, required).await?;
                match LocalFileHeaderRecord::decode(&buf, offset) {
                    Err(DecodeError::InsufficientData { available, .. }) => {
                        return Err(ScanError::FetchFailed {
                            offset,
                            length: required,
                            source: Box::new(ScanError::InsufficientData {
                                offset,
                                required,
                                available: available as u64,
                            }),
                        });
                    }
                    other => other,
                }
            }
            other => other,
        };

        match decoded {
            Ok(record) => Ok(Probe::Record(record)),
            Err(DecodeError::BadSignature { found }) if is_trailer_signature(found) => {
                Ok(Probe::Trailer(found))
            }
            Err(DecodeError::BadSignature { found }) => {
                Err(ScanError::MalformedHeader { offset, found })
            }
            Err(DecodeError::InvalidFileName(source)) => {
                Err(ScanError::InvalidFileName { offset, source })
            }
            Err(DecodeError::InsufficientData {
                required,
                available,
            }) => Err(ScanError::InsufficientData {
                offset,
                required: required as u64,
                available: available as u64,
            }),
        }
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn fetch(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let started = Instant::now();
        let buf = self
            .reader
            .fetch(offset, length)
            .await
            .map_err(|e| ScanError::FetchFailed {
                offset,
                length,
                source: e.into(),
            })?;

        self.observer.fetch_completed(&FetchEvent {
            offset,
            requested: length,
            received: buf.len() as u64,
            elapsed: started.elapsed(),
        });
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;
    use anyhow::anyhow;
    use async_trait::async_trait;

    #[derive(Default)]
    struct Builder {
        bytes: Vec<u8>,
    }

    impl Builder {
        fn file(mut self, name: &str, payload: &[u8]) -> Self {
            let mut record = LocalFileHeaderRecord::new(self.bytes.len() as u64, name, Vec::new()).unwrap();
            record.compressed_size = payload.len() as u32;
            record.uncompressed_size = payload.len() as u32;
            self.bytes.extend_from_slice(&record.encode());
            self.bytes.extend_from_slice(payload);
            self
        }

        fn tail(mut self, tail: &[u8]) -> Vec<u8> {
            self.bytes.extend_from_slice(tail);
            self.bytes
        }
    }

    fn eocd() -> Vec<u8> {
        let mut tail = EOCD_SIGNATURE.to_le_bytes().to_vec();
        tail.resize(EOCD_MIN_SIZE, 0);
        tail
    }

    /// A zeroed central directory header followed by the end record
    fn central_directory() -> Vec<u8> {
        let mut tail = CDFH_SIGNATURE.to_le_bytes().to_vec();
        tail.resize(46, 0);
        tail.extend_from_slice(&eocd());
        tail
    }

    async fn scanner(data: Vec<u8>, options: ScanOptions) -> ArchiveScanner<MemoryReader> {
        ArchiveScanner::initialize(Arc::new(MemoryReader::new(data)), &options)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn emits_entries_in_order_without_overlap() {
        let data = Builder::default()
            .file("one", b"1111")
            .file("two/", b"")
            .file("three.bin", &[7u8; 300])
            .tail(&central_directory());
        let mut scanner = scanner(data, ScanOptions::default()).await;
        let records = scanner.run().await.unwrap().to_vec();

        let names: Vec<_> = records.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, ["one", "two/", "three.bin"]);
        for pair in records.windows(2) {
            assert!(pair[0].data_end() <= pair[1].start_offset());
        }
        assert_eq!(scanner.end(), Some(ScanEnd::TrailerFound {
            offset: records[2].data_end(),
            signature: CDFH_SIGNATURE,
        }));
    }

    #[tokio::test]
    async fn cursor_moves_forward_at_least_a_header_each_step() {
        let data = Builder::default()
            .file("a", b"")
            .file("b", b"")
            .file("c", b"xyz")
            .tail(&eocd());
        let mut scanner = scanner(data, ScanOptions::default()).await;

        let mut last = scanner.cursor();
        while scanner.next_record().await.unwrap().is_some() {
            assert!(scanner.cursor() >= last + LFH_SIZE as u64);
            last = scanner.cursor();
        }
        assert_eq!(scanner.emitted().len(), 3);
    }

    #[tokio::test]
    async fn objects_smaller_than_a_header_yield_nothing() {
        let mut small = scanner(vec![0x50; 29], ScanOptions::default()).await;
        assert!(small.run().await.unwrap().is_empty());
        assert_eq!(small.end(), Some(ScanEnd::EndOfObject));

        let mut empty = scanner(Vec::new(), ScanOptions::default()).await;
        assert!(empty.run().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_unit_shrinks_to_small_objects() {
        let data = Builder::default().file("x", b"12").tail(&eocd());
        let len = data.len() as u64;
        let scanner = scanner(data, ScanOptions::default()).await;
        assert_eq!(scanner.fetch_unit(), len);
    }

    #[tokio::test]
    async fn long_names_are_fetched_with_a_wider_range() {
        let name = "n".repeat(300);
        let data = Builder::default().file(&name, b"payload").tail(&[0u8; 512]);
        let reader = Arc::new(MemoryReader::new(data));
        let mut scanner = ArchiveScanner::initialize(reader.clone(), &ScanOptions::default())
            .await
            .unwrap();

        let record = scanner.next_record().await.unwrap().unwrap().clone();
        assert_eq!(record.file_name, name);
        assert_eq!(record.data_start(), 330);
        assert_eq!(record.data_end(), 337);
        // one short read, one widened read
        assert_eq!(reader.reads(), 2);
    }

    #[tokio::test]
    async fn bad_signature_stops_but_keeps_earlier_records() {
        let data = Builder::default().file("good", b"ok").tail(&[0xAB; 200]);
        let mut scanner = scanner(data, ScanOptions::default()).await;

        let err = scanner.run().await.unwrap_err();
        assert!(matches!(
            err,
            ScanError::MalformedHeader { offset: 36, found: 0xABAB_ABAB }
        ));
        assert_eq!(scanner.emitted().len(), 1);
        assert_eq!(scanner.emitted()[0].file_name, "good");
        assert_eq!(scanner.end(), Some(ScanEnd::Failed));
        assert!(scanner.next_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_name_aborts_the_scan() {
        let mut data = Builder::default().file("ok", b"").file("bad", b"").tail(&eocd());
        // first byte of the second name
        data[32 + 30] = 0xff;
        let mut scanner = scanner(data, ScanOptions::default()).await;

        let err = scanner.run().await.unwrap_err();
        assert!(matches!(err, ScanError::InvalidFileName { offset: 32, .. }));
        assert_eq!(scanner.emitted().len(), 1);
    }

    #[tokio::test]
    async fn payload_past_end_of_object_is_not_emitted() {
        let mut record = LocalFileHeaderRecord::new(0, "big", Vec::new()).unwrap();
        record.compressed_size = 10_000;
        let mut data = record.encode();
        data.extend_from_slice(&[0u8; 100]);
        let mut scanner = scanner(data, ScanOptions::default()).await;

        let err = scanner.run().await.unwrap_err();
        assert!(matches!(err, ScanError::EntryOutOfBounds { offset: 0, .. }));
        assert!(scanner.emitted().is_empty());
    }

    #[tokio::test]
    async fn data_descriptor_entry_is_emitted_then_reported() {
        let mut record = LocalFileHeaderRecord::new(0, "streamed", Vec::new()).unwrap();
        record.flags = FLAG_DATA_DESCRIPTOR;
        let mut data = record.encode();
        data.extend_from_slice(&[0u8; 200]);
        let mut scanner = scanner(data, ScanOptions::default()).await;

        assert_eq!(
            scanner.next_record().await.unwrap().map(|r| r.file_name.clone()),
            Some("streamed".to_string())
        );
        let err = scanner.next_record().await.unwrap_err();
        assert!(matches!(err, ScanError::DeferredSizes { offset: 0, .. }));
        assert_eq!(scanner.cursor(), 0);
        assert_eq!(scanner.emitted().len(), 1);
    }

    #[tokio::test]
    async fn reserve_keeps_scanner_out_of_the_tail() {
        // an entry that ends exactly where the reserve begins
        let data = Builder::default().file("last", b"zz").tail(&[0u8; 22]);
        let mut scanner = scanner(data, ScanOptions::default()).await;
        assert_eq!(scanner.run().await.unwrap().len(), 1);
        assert_eq!(scanner.end(), Some(ScanEnd::ReserveReached));
    }

    struct FailingReader;

    #[async_trait]
    impl ReadAt for FailingReader {
        async fn read_at(&self, _offset: u64, _buf: &mut [u8]) -> anyhow::Result<usize> {
            Err(anyhow!("connection reset"))
        }

        async fn size(&self) -> anyhow::Result<u64> {
            Ok(4096)
        }
    }

    struct MissingObject;

    #[async_trait]
    impl ReadAt for MissingObject {
        async fn read_at(&self, _offset: u64, _buf: &mut [u8]) -> anyhow::Result<usize> {
            unreachable!("size lookup fails first")
        }

        async fn size(&self) -> anyhow::Result<u64> {
            Err(anyhow!("404 Not Found"))
        }
    }

    #[tokio::test]
    async fn fetch_errors_surface_with_range() {
        let mut scanner = ArchiveScanner::initialize(Arc::new(FailingReader), &ScanOptions::default())
            .await
            .unwrap();
        let err = scanner.run().await.unwrap_err();
        assert!(matches!(err, ScanError::FetchFailed { offset: 0, length: 256, .. }));
    }

    #[tokio::test]
    async fn missing_object_has_no_size() {
        let result = ArchiveScanner::initialize(Arc::new(MissingObject), &ScanOptions::default()).await;
        assert!(matches!(result, Err(ScanError::SizeUnavailable { .. })));
    }

    #[tokio::test]
    async fn scan_with_streams_records() {
        let data = Builder::default()
            .file("a", b"1")
            .file("b", b"22")
            .tail(&central_directory());
        let scanner = scanner(data, ScanOptions::default()).await;

        let mut seen = Vec::new();
        let outcome = scanner.scan_with(|r| seen.push(r.file_name.clone())).await;
        assert_eq!(seen, ["a", "b"]);
        assert!(outcome.is_success());
        assert_eq!(outcome.records.len(), 2);
        assert!(matches!(outcome.end, ScanEnd::TrailerFound { .. }));
    }
}

#[cfg(test)]
mod proptest_tests {
    use super::*;
    use crate::io::MemoryReader;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    struct Entry {
        name: String,
        extra_field: Vec<u8>,
        flags: u16,
        payload_len: u32,
    }

    fn entry_strategy() -> impl Strategy<Value = Entry> {
        (
            proptest::string::string_regex("[a-zA-Z0-9_.+/-]{1,700}").expect("valid regex"),
            proptest::collection::vec(any::<u8>(), 0..400),
            // sizes must be in the header for the cursor to move on
            any::<u16>().prop_map(|flags| flags & !FLAG_DATA_DESCRIPTOR),
            0u32..2048,
        )
            .prop_map(|(name, extra_field, flags, payload_len)| Entry {
                name,
                extra_field,
                flags,
                payload_len,
            })
    }

    fn fetch_unit_strategy() -> impl Strategy<Value = u64> {
        prop_oneof![
            Just(1u64),
            Just(30),
            Just(31),
            Just(64),
            Just(DEFAULT_FETCH_UNIT),
            1u64..100_000,
        ]
    }

    /// Entries back to back, then one central directory header and the
    /// end record. Returns the bytes and the records a scan should find.
    fn lay_out(entries: &[Entry]) -> (Vec<u8>, Vec<LocalFileHeaderRecord>) {
        let mut bytes = Vec::new();
        let mut records = Vec::new();
        for entry in entries {
            let mut record = LocalFileHeaderRecord::new(
                bytes.len() as u64,
                entry.name.clone(),
                entry.extra_field.clone(),
            )
            .expect("lengths fit in 16 bits");
            record.flags = entry.flags;
            record.compressed_size = entry.payload_len;
            record.uncompressed_size = entry.payload_len;

            bytes.extend_from_slice(&record.encode());
            bytes.resize(bytes.len() + entry.payload_len as usize, 0xa5);
            records.push(record);
        }

        let central = bytes.len();
        bytes.extend_from_slice(&CDFH_SIGNATURE.to_le_bytes());
        bytes.resize(central + 46, 0);
        bytes.extend_from_slice(&EOCD_SIGNATURE.to_le_bytes());
        bytes.resize(central + 46 + EOCD_MIN_SIZE, 0);
        (bytes, records)
    }

    struct Walk {
        records: Vec<LocalFileHeaderRecord>,
        cursors: Vec<u64>,
        end: Option<ScanEnd>,
    }

    fn walk(bytes: Vec<u8>, fetch_unit: u64) -> Result<Walk> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("current thread runtime");
        runtime.block_on(async {
            let options = ScanOptions::default().fetch_unit(fetch_unit);
            let mut scanner =
                ArchiveScanner::initialize(Arc::new(MemoryReader::new(bytes)), &options).await?;
            let mut cursors = vec![scanner.cursor()];
            while scanner.next_record().await?.is_some() {
                cursors.push(scanner.cursor());
            }
            Ok::<_, ScanError>(Walk {
                records: scanner.emitted().to_vec(),
                cursors,
                end: scanner.end(),
            })
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn finds_every_entry_in_file_order(
            entries in proptest::collection::vec(entry_strategy(), 0..8),
            fetch_unit in fetch_unit_strategy(),
        ) {
            let (bytes, expected) = lay_out(&entries);
            let walk = walk(bytes, fetch_unit)
                .map_err(|e| TestCaseError::fail(format!("scan failed: {e}")))?;

            prop_assert_eq!(&walk.records, &expected);
            for pair in walk.records.windows(2) {
                prop_assert!(pair[0].data_end() <= pair[1].start_offset());
            }
            for pair in walk.cursors.windows(2) {
                prop_assert!(pair[1] >= pair[0] + LFH_SIZE as u64);
            }

            let central = expected.last().map_or(0, |r| r.data_end());
            prop_assert_eq!(
                walk.end,
                Some(ScanEnd::TrailerFound { offset: central, signature: CDFH_SIGNATURE })
            );
        }
    }
}

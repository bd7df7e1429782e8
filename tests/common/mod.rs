#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::sync::Mutex;

use async_trait::async_trait;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use zipscan::{EntryMessage, LocalFileHeaderRecord, MetadataSink};

/// Files written by [`stored_archive`], in order. Directories have no content.
pub fn sample_files() -> Vec<(String, Vec<u8>)> {
    vec![
        ("readme.txt".to_string(), b"hello, remote world\n".to_vec()),
        ("docs/".to_string(), Vec::new()),
        ("docs/numbers.bin".to_string(), (0..=255u8).cycle().take(1500).collect()),
        ("empty.txt".to_string(), Vec::new()),
        (format!("deep/{}.dat", "x".repeat(300)), b"long name payload".to_vec()),
    ]
}

/// A real archive with every sample file stored uncompressed.
pub fn stored_archive() -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    for (name, content) in sample_files() {
        if name.ends_with('/') {
            writer.add_directory(name.as_str(), options).unwrap();
        } else {
            writer.start_file(name.as_str(), options).unwrap();
            writer.write_all(&content).unwrap();
        }
    }

    writer.finish().unwrap().into_inner()
}

/// Encoded local header plus a zeroed payload of `compressed` bytes.
pub fn local_entry(offset: u64, name: &str, compressed: u32, uncompressed: u32) -> Vec<u8> {
    let mut record = LocalFileHeaderRecord::new(offset, name, Vec::new()).unwrap();
    record.compressed_size = compressed;
    record.uncompressed_size = uncompressed;
    let mut bytes = record.encode();
    bytes.resize(bytes.len() + compressed as usize, 0);
    bytes
}

/// Keeps every published message.
#[derive(Default)]
pub struct CollectingSink {
    pub messages: Mutex<Vec<EntryMessage>>,
}

#[async_trait]
impl MetadataSink for CollectingSink {
    async fn publish(&self, message: &EntryMessage) -> anyhow::Result<()> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}

use byteorder::{ByteOrder, LittleEndian};

use super::error::DecodeError;

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }
}

/// Local File Header (LFH) - 30 bytes fixed, then name and extra field
pub const LFH_SIGNATURE: u32 = 0x0403_4b50;
pub const LFH_SIZE: usize = 30;

/// Central Directory File Header
pub const CDFH_SIGNATURE: u32 = 0x0201_4b50;
/// End of Central Directory record
pub const EOCD_SIGNATURE: u32 = 0x0605_4b50;
/// End of Central Directory - 22 bytes minimum
pub const EOCD_MIN_SIZE: usize = 22;
pub const ZIP64_EOCD_SIGNATURE: u32 = 0x0606_4b50;
pub const ZIP64_EOCD_LOCATOR_SIGNATURE: u32 = 0x0706_4b50;
pub const DIGITAL_SIGNATURE: u32 = 0x0505_4b50;
pub const ARCHIVE_EXTRA_DATA_SIGNATURE: u32 = 0x0806_4b50;

/// General purpose flag: sizes and CRC follow the payload in a data descriptor
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
/// General purpose flag: file name and comment are UTF-8
pub const FLAG_UTF8: u16 = 1 << 11;

/// Whether `signature` opens one of the structures that follow the last
/// local entry (central directory and end-of-archive records).
pub fn is_trailer_signature(signature: u32) -> bool {
    matches!(
        signature,
        CDFH_SIGNATURE
            | EOCD_SIGNATURE
            | ZIP64_EOCD_SIGNATURE
            | ZIP64_EOCD_LOCATOR_SIGNATURE
            | DIGITAL_SIGNATURE
            | ARCHIVE_EXTRA_DATA_SIGNATURE
    )
}

/// One decoded local file header.
///
/// Layout (APPNOTE 4.3.7), all integers little-endian:
///
/// ```text
///  0  signature            u32
///  4  version needed       u16
///  6  flags                u16
///  8  compression method   u16
/// 10  last mod time        u16
/// 12  last mod date        u16
/// 14  crc-32               u32
/// 18  compressed size      u32
/// 22  uncompressed size    u32
/// 26  file name length     u16
/// 28  extra field length   u16
/// 30  file name, then extra field
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeaderRecord {
    pub signature: u32,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub mod_time: u16,
    pub mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
    pub file_name: String,
    pub extra_field: Vec<u8>,
    start_offset: u64,
}

impl LocalFileHeaderRecord {
    /// Build a header for `file_name` at `start_offset`.
    ///
    /// Numeric fields other than the lengths start at zero. Returns `None`
    /// if the name or extra field do not fit a 16-bit length.
    pub fn new(start_offset: u64, file_name: impl Into<String>, extra_field: Vec<u8>) -> Option<Self> {
        let file_name = file_name.into();
        let file_name_length = u16::try_from(file_name.len()).ok()?;
        let extra_field_length = u16::try_from(extra_field.len()).ok()?;

        Some(Self {
            signature: LFH_SIGNATURE,
            version_needed: 20,
            flags: 0,
            compression_method: 0,
            mod_time: 0,
            mod_date: 0,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            file_name_length,
            extra_field_length,
            file_name,
            extra_field,
            start_offset,
        })
    }

    /// Decode the header starting at byte 0 of `buf`.
    ///
    /// `start_offset` is the absolute position of `buf[0]` in the archive.
    /// A buffer that stops short of the declared name and extra field fails
    /// with [`DecodeError::InsufficientData`] carrying the length needed.
    pub fn decode(buf: &[u8], start_offset: u64) -> Result<Self, DecodeError> {
        if buf.len() < LFH_SIZE {
            return Err(DecodeError::InsufficientData {
                required: LFH_SIZE,
                available: buf.len(),
            });
        }

        let signature = LittleEndian::read_u32(&buf[0..4]);
        if signature != LFH_SIGNATURE {
            return Err(DecodeError::BadSignature { found: signature });
        }

        let file_name_length = LittleEndian::read_u16(&buf[26..28]);
        let extra_field_length = LittleEndian::read_u16(&buf[28..30]);

        let name_end = LFH_SIZE + file_name_length as usize;
        let required = name_end + extra_field_length as usize;
        if buf.len() < required {
            return Err(DecodeError::InsufficientData {
                required,
                available: buf.len(),
            });
        }

        let file_name = std::str::from_utf8(&buf[LFH_SIZE..name_end])?.to_owned();

        Ok(Self {
            signature,
            version_needed: LittleEndian::read_u16(&buf[4..6]),
            flags: LittleEndian::read_u16(&buf[6..8]),
            compression_method: LittleEndian::read_u16(&buf[8..10]),
            mod_time: LittleEndian::read_u16(&buf[10..12]),
            mod_date: LittleEndian::read_u16(&buf[12..14]),
            crc32: LittleEndian::read_u32(&buf[14..18]),
            compressed_size: LittleEndian::read_u32(&buf[18..22]),
            uncompressed_size: LittleEndian::read_u32(&buf[22..26]),
            file_name_length,
            extra_field_length,
            file_name,
            extra_field: buf[name_end..required].to_vec(),
            start_offset,
        })
    }

    /// Serialize the header back to its on-disk form.
    ///
    /// The length fields are written as stored, so a decoded record encodes
    /// to exactly the bytes it was decoded from.
    pub fn encode(&self) -> Vec<u8> {
        let mut fixed = [0u8; LFH_SIZE];
        LittleEndian::write_u32(&mut fixed[0..4], self.signature);
        LittleEndian::write_u16(&mut fixed[4..6], self.version_needed);
        LittleEndian::write_u16(&mut fixed[6..8], self.flags);
        LittleEndian::write_u16(&mut fixed[8..10], self.compression_method);
        LittleEndian::write_u16(&mut fixed[10..12], self.mod_time);
        LittleEndian::write_u16(&mut fixed[12..14], self.mod_date);
        LittleEndian::write_u32(&mut fixed[14..18], self.crc32);
        LittleEndian::write_u32(&mut fixed[18..22], self.compressed_size);
        LittleEndian::write_u32(&mut fixed[22..26], self.uncompressed_size);
        LittleEndian::write_u16(&mut fixed[26..28], self.file_name_length);
        LittleEndian::write_u16(&mut fixed[28..30], self.extra_field_length);

        let mut out = Vec::with_capacity(self.header_len() as usize);
        out.extend_from_slice(&fixed);
        out.extend_from_slice(self.file_name.as_bytes());
        out.extend_from_slice(&self.extra_field);
        out
    }

    /// Absolute offset of the signature within the archive
    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    /// Bytes occupied by the header itself, name and extra field included
    pub fn header_len(&self) -> u64 {
        LFH_SIZE as u64 + self.file_name_length as u64 + self.extra_field_length as u64
    }

    /// Offset of the first payload byte
    pub fn data_start(&self) -> u64 {
        self.start_offset + self.header_len()
    }

    /// Offset one past the last payload byte
    pub fn data_end(&self) -> u64 {
        self.data_start() + self.compressed_size as u64
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    pub fn is_utf8_name(&self) -> bool {
        self.flags & FLAG_UTF8 != 0
    }

    /// Directory entries end with '/'
    pub fn is_directory(&self) -> bool {
        self.file_name.ends_with('/')
    }

    pub fn compression(&self) -> CompressionMethod {
        CompressionMethod::from_u16(self.compression_method)
    }

    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.mod_date & 0x1F) as u8;
        let month = ((self.mod_date >> 5) & 0x0F) as u8;
        let year = ((self.mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.mod_time & 0x1F) * 2) as u8;
        let minute = ((self.mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }
}

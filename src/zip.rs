//! In-memory ZIP reader for EPUB containers
//!
//! The document source hands the reader one byte buffer per book, so the
//! archive is indexed once (central directory into a fixed-size table) and
//! entries are inflated on demand from the shared buffer. Reads take `&self`,
//! which lets section loads run concurrently without locking.

use heapless::Vec as HeaplessVec;
use std::sync::Arc;

pub use crate::error::ZipError;

/// Maximum number of central directory entries to index
const MAX_CD_ENTRIES: usize = 256;

/// Maximum filename length in ZIP entries
const MAX_FILENAME_LEN: usize = 256;

const SIG_LOCAL_FILE_HEADER: u32 = 0x04034b50;
const SIG_CD_ENTRY: u32 = 0x02014b50;
const SIG_EOCD: u32 = 0x06054b50;
const SIG_ZIP64_EOCD_LOCATOR: u32 = 0x07064b50;
const EOCD_MIN_SIZE: usize = 22;
const MAX_EOCD_SCAN: usize = EOCD_MIN_SIZE + u16::MAX as usize;
const CD_ENTRY_FIXED: usize = 46;
const LOCAL_HEADER_FIXED: usize = 30;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATED: u16 = 8;

const EPUB_MIMETYPE: &str = "application/epub+zip";

/// Runtime-configurable ZIP safety limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZipLimits {
    /// Maximum compressed or uncompressed size allowed for a single entry.
    pub max_entry_size: usize,
    /// Maximum allowed size for the required `mimetype` entry.
    pub max_mimetype_size: usize,
    /// Fail on entries beyond the index capacity instead of truncating.
    pub strict: bool,
}

impl Default for ZipLimits {
    fn default() -> Self {
        Self {
            max_entry_size: 32 * 1024 * 1024,
            max_mimetype_size: 1024,
            strict: false,
        }
    }
}

/// Central directory entry metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    /// Entry path inside the archive
    pub name: String,
    /// Compression method (0=stored, 8=deflated)
    pub method: u16,
    /// Compressed size in bytes
    pub compressed_size: u32,
    /// Uncompressed size in bytes
    pub uncompressed_size: u32,
    /// CRC32 checksum
    pub crc32: u32,
    local_header_offset: u32,
}

/// Indexed, read-only view of a ZIP archive held in memory
#[derive(Debug, Clone)]
pub struct Archive {
    data: Arc<[u8]>,
    entries: HeaplessVec<ZipEntry, MAX_CD_ENTRIES>,
    limits: ZipLimits,
}

impl Archive {
    /// Index an archive with default limits
    pub fn new(data: impl Into<Arc<[u8]>>) -> Result<Self, ZipError> {
        Self::with_limits(data, ZipLimits::default())
    }

    /// Index an archive with explicit limits
    pub fn with_limits(data: impl Into<Arc<[u8]>>, limits: ZipLimits) -> Result<Self, ZipError> {
        let data = data.into();
        let eocd = find_eocd(&data)?;
        if eocd.uses_zip64 {
            return Err(ZipError::UnsupportedZip64);
        }
        if limits.strict && eocd.num_entries > MAX_CD_ENTRIES {
            return Err(ZipError::CentralDirFull);
        }

        let mut entries = HeaplessVec::new();
        let mut pos = eocd.cd_offset;
        let cd_end = eocd.cd_offset + eocd.cd_size;
        for _ in 0..eocd.num_entries.min(MAX_CD_ENTRIES) {
            if pos >= cd_end {
                break;
            }
            let (entry, next) = read_cd_entry(&data, pos)?;
            pos = next;
            if let Some(entry) = entry {
                entries.push(entry).map_err(|_| ZipError::CentralDirFull)?;
            }
        }

        if eocd.num_entries > MAX_CD_ENTRIES {
            log::warn!(
                "[ZIP] Archive has {} entries but only {} were indexed",
                eocd.num_entries,
                entries.len()
            );
        }
        log::debug!("[ZIP] Indexed {} entries", entries.len());

        Ok(Self {
            data,
            entries,
            limits,
        })
    }

    /// Entries in central directory order
    pub fn entries(&self) -> impl Iterator<Item = &ZipEntry> {
        self.entries.iter()
    }

    /// Look up an entry by path (case-insensitive, leading `/` ignored)
    pub fn entry(&self, name: &str) -> Option<&ZipEntry> {
        let wanted = name.trim_start_matches('/');
        self.entries
            .iter()
            .find(|e| e.name.trim_start_matches('/').eq_ignore_ascii_case(wanted))
    }

    /// Read and decompress an entry by path
    pub fn read(&self, name: &str) -> Result<Vec<u8>, ZipError> {
        let entry = self.entry(name).ok_or(ZipError::FileNotFound)?;
        self.read_entry(entry)
    }

    /// Read and decompress an entry
    pub fn read_entry(&self, entry: &ZipEntry) -> Result<Vec<u8>, ZipError> {
        if entry.uncompressed_size as usize > self.limits.max_entry_size
            || entry.compressed_size as usize > self.limits.max_entry_size
        {
            return Err(ZipError::FileTooLarge);
        }

        let start = self.data_offset(entry)?;
        let end = start
            .checked_add(entry.compressed_size as usize)
            .ok_or(ZipError::InvalidFormat)?;
        let raw = self.data.get(start..end).ok_or(ZipError::Truncated)?;

        let bytes = match entry.method {
            METHOD_STORED => raw.to_vec(),
            METHOD_DEFLATED => miniz_oxide::inflate::decompress_to_vec_with_limit(
                raw,
                self.limits.max_entry_size,
            )
            .map_err(|e| {
                log::warn!("[ZIP] Inflate failed for '{}': {:?}", entry.name, e.status);
                ZipError::DecompressError
            })?,
            _ => return Err(ZipError::UnsupportedCompression),
        };

        if entry.crc32 != 0 && crc32fast::hash(&bytes) != entry.crc32 {
            return Err(ZipError::CrcMismatch);
        }
        Ok(bytes)
    }

    /// Check that the archive carries the `application/epub+zip` mimetype entry
    pub fn validate_mimetype(&self) -> Result<(), ZipError> {
        let entry = self.entry("mimetype").ok_or_else(|| {
            ZipError::InvalidMimetype("mimetype file not found in archive".to_string())
        })?;
        if entry.uncompressed_size as usize > self.limits.max_mimetype_size {
            return Err(ZipError::InvalidMimetype(
                "mimetype file too large".to_string(),
            ));
        }
        let bytes = self.read_entry(entry)?;
        let content = core::str::from_utf8(&bytes).map_err(|_| {
            ZipError::InvalidMimetype("mimetype file is not valid UTF-8".to_string())
        })?;
        if content.trim_end() != EPUB_MIMETYPE {
            return Err(ZipError::InvalidMimetype(format!(
                "expected '{}', got '{}'",
                EPUB_MIMETYPE, content
            )));
        }
        Ok(())
    }

    fn data_offset(&self, entry: &ZipEntry) -> Result<usize, ZipError> {
        let offset = entry.local_header_offset as usize;
        let header = self
            .data
            .get(offset..offset + LOCAL_HEADER_FIXED)
            .ok_or(ZipError::Truncated)?;
        if read_u32_le(header, 0) != SIG_LOCAL_FILE_HEADER {
            return Err(ZipError::InvalidFormat);
        }
        let name_len = read_u16_le(header, 26) as usize;
        let extra_len = read_u16_le(header, 28) as usize;
        Ok(offset + LOCAL_HEADER_FIXED + name_len + extra_len)
    }
}

#[derive(Clone, Copy, Debug)]
struct EocdInfo {
    cd_offset: usize,
    cd_size: usize,
    num_entries: usize,
    uses_zip64: bool,
}

fn find_eocd(data: &[u8]) -> Result<EocdInfo, ZipError> {
    if data.len() < EOCD_MIN_SIZE {
        return Err(ZipError::InvalidFormat);
    }
    let scan_start = data.len().saturating_sub(MAX_EOCD_SCAN);

    for i in (scan_start..=data.len() - EOCD_MIN_SIZE).rev() {
        if read_u32_le(data, i) != SIG_EOCD {
            continue;
        }
        let num_entries = read_u16_le(data, i + 10);
        let cd_size = read_u32_le(data, i + 12);
        let cd_offset = read_u32_le(data, i + 16);
        let comment_len = read_u16_le(data, i + 20) as usize;
        if i + EOCD_MIN_SIZE + comment_len != data.len() {
            continue;
        }

        let cd_end = (cd_offset as usize)
            .checked_add(cd_size as usize)
            .ok_or(ZipError::InvalidFormat)?;
        if cd_end > i {
            return Err(ZipError::InvalidFormat);
        }

        let uses_zip64 = num_entries == u16::MAX
            || cd_size == u32::MAX
            || cd_offset == u32::MAX
            || (i >= 20 && read_u32_le(data, i - 20) == SIG_ZIP64_EOCD_LOCATOR);

        return Ok(EocdInfo {
            cd_offset: cd_offset as usize,
            cd_size: cd_size as usize,
            num_entries: num_entries as usize,
            uses_zip64,
        });
    }

    Err(ZipError::InvalidFormat)
}

/// Parse one central directory record at `pos`, returning it and the next record offset.
///
/// Records with over-long names are skipped (`None`) rather than failing the archive.
fn read_cd_entry(data: &[u8], pos: usize) -> Result<(Option<ZipEntry>, usize), ZipError> {
    let fixed = data
        .get(pos..pos + CD_ENTRY_FIXED)
        .ok_or(ZipError::Truncated)?;
    if read_u32_le(fixed, 0) != SIG_CD_ENTRY {
        return Err(ZipError::InvalidFormat);
    }

    let name_len = read_u16_le(fixed, 28) as usize;
    let extra_len = read_u16_le(fixed, 30) as usize;
    let comment_len = read_u16_le(fixed, 32) as usize;
    let name_start = pos + CD_ENTRY_FIXED;
    let next = name_start + name_len + extra_len + comment_len;
    if next > data.len() {
        return Err(ZipError::Truncated);
    }
    if name_len == 0 || name_len > MAX_FILENAME_LEN {
        return Ok((None, next));
    }

    let name = String::from_utf8_lossy(&data[name_start..name_start + name_len]).into_owned();
    let entry = ZipEntry {
        name,
        method: read_u16_le(fixed, 10),
        crc32: read_u32_le(fixed, 16),
        compressed_size: read_u32_le(fixed, 20),
        uncompressed_size: read_u32_le(fixed, 24),
        local_header_offset: read_u32_le(fixed, 42),
    };
    Ok((Some(entry), next))
}

fn read_u16_le(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

//! Unified error types for mu-reader
//!
//! `ReaderError` covers everything that can make a document fail to open or a
//! section fail to load. Errors from the external collaborators (translation,
//! dictionary, stores) use `ServiceError` and are surfaced inline by whoever
//! requested them.

use core::fmt;

/// Top-level error type for document and section operations
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReaderError {
    /// ZIP archive error
    Zip(ZipError),
    /// XML/XHTML parsing error
    Parse(String),
    /// Invalid EPUB structure (missing required files, broken references, etc.)
    InvalidEpub(String),
    /// Navigation document could not be parsed
    Navigation(String),
    /// I/O error (description only, since `std::io::Error` is not `Clone`)
    Io(String),
    /// Section index requested is out of bounds
    SectionOutOfBounds {
        /// Requested section index.
        index: usize,
        /// Total number of sections in the spine.
        section_count: usize,
    },
    /// Spine references a manifest item that does not exist
    ManifestItemMissing {
        /// Missing manifest `id` referenced by spine `idref`.
        idref: String,
    },
    /// Section content could not be decoded as UTF-8
    SectionNotUtf8 {
        /// Section href/path in the EPUB archive.
        href: String,
    },
    /// Operation requires an open document
    NotReady,
    /// Session has been torn down
    Destroyed,
}

impl fmt::Display for ReaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderError::Zip(kind) => write!(f, "ZIP error: {}", kind),
            ReaderError::Parse(msg) => write!(f, "Parse error: {}", msg),
            ReaderError::InvalidEpub(msg) => write!(f, "Invalid EPUB: {}", msg),
            ReaderError::Navigation(msg) => write!(f, "Navigation error: {}", msg),
            ReaderError::Io(msg) => write!(f, "I/O error: {}", msg),
            ReaderError::SectionOutOfBounds {
                index,
                section_count,
            } => write!(
                f,
                "Section index {} out of bounds (section count: {})",
                index, section_count
            ),
            ReaderError::ManifestItemMissing { idref } => {
                write!(f, "Spine item '{}' does not exist in manifest", idref)
            }
            ReaderError::SectionNotUtf8 { href } => {
                write!(f, "Section content is not valid UTF-8: {}", href)
            }
            ReaderError::NotReady => write!(f, "no document is open"),
            ReaderError::Destroyed => write!(f, "reading session was destroyed"),
        }
    }
}

/// ZIP-specific error variants
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ZipErrorKind {
    /// File not found in archive
    FileNotFound,
    /// Invalid ZIP format
    InvalidFormat,
    /// Unsupported compression method
    UnsupportedCompression,
    /// Decompression failed
    DecompressError,
    /// CRC32 mismatch
    CrcMismatch,
    /// Read past the end of the archive data
    Truncated,
    /// Central directory full (exceeded max entries)
    CentralDirFull,
    /// File exceeds maximum allowed size
    FileTooLarge,
    /// Invalid or missing mimetype file
    InvalidMimetype(String),
    /// ZIP64 structures are present but unsupported
    UnsupportedZip64,
}

/// Public ZIP error type alias used across the crate API.
pub type ZipError = ZipErrorKind;

impl fmt::Display for ZipErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZipErrorKind::FileNotFound => write!(f, "file not found in archive"),
            ZipErrorKind::InvalidFormat => write!(f, "invalid ZIP format"),
            ZipErrorKind::UnsupportedCompression => write!(f, "unsupported compression method"),
            ZipErrorKind::DecompressError => write!(f, "decompression failed"),
            ZipErrorKind::CrcMismatch => write!(f, "CRC32 checksum mismatch"),
            ZipErrorKind::Truncated => write!(f, "archive data truncated"),
            ZipErrorKind::CentralDirFull => write!(f, "central directory full"),
            ZipErrorKind::FileTooLarge => write!(f, "file too large"),
            ZipErrorKind::InvalidMimetype(msg) => write!(f, "invalid mimetype: {}", msg),
            ZipErrorKind::UnsupportedZip64 => write!(f, "ZIP64 is not supported"),
        }
    }
}

impl std::error::Error for ReaderError {}

impl std::error::Error for ZipErrorKind {}

impl From<ZipError> for ReaderError {
    fn from(err: ZipError) -> Self {
        ReaderError::Zip(err)
    }
}

impl From<std::io::Error> for ReaderError {
    fn from(err: std::io::Error) -> Self {
        ReaderError::Io(err.to_string())
    }
}

/// Failure reported by an external collaborator (translation, dictionary, stores)
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ServiceError {
    /// Lookup target does not exist (e.g. a word with no dictionary entry)
    NotFound(String),
    /// Transport failure
    Network(String),
    /// Service answered but refused the request
    Rejected(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::NotFound(what) => write!(f, "No definition found for \"{}\"", what),
            ServiceError::Network(msg) => write!(f, "network error: {}", msg),
            ServiceError::Rejected(msg) => write!(f, "request rejected: {}", msg),
        }
    }
}

impl std::error::Error for ServiceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_error_display() {
        let err = ReaderError::Parse("bad xml".into());
        assert_eq!(format!("{}", err), "Parse error: bad xml");
    }

    #[test]
    fn test_section_out_of_bounds_display() {
        let err = ReaderError::SectionOutOfBounds {
            index: 12,
            section_count: 3,
        };
        assert_eq!(
            err.to_string(),
            "Section index 12 out of bounds (section count: 3)"
        );
    }

    #[test]
    fn test_zip_error_converts() {
        let err: ReaderError = ZipErrorKind::InvalidMimetype("wrong content type".into()).into();
        assert!(err.to_string().contains("ZIP error"));
    }

    #[test]
    fn test_not_found_message_names_word() {
        let err = ServiceError::NotFound("serendipity".into());
        assert_eq!(err.to_string(), "No definition found for \"serendipity\"");
    }
}

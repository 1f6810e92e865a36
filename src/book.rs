//! Opened documents and the seams used to fetch and load them
//!
//! [`Book`] is the document primitive: an indexed archive plus the parsed
//! package, section list, and navigation tree. The reading engine talks to it
//! through two async traits so that tests and embedders can substitute their
//! own sources:
//!
//! - [`DocumentProvider`] turns a document URL into bytes.
//! - [`SectionLoader`] turns a spine index into [`SectionContent`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::content::{parse_section, SectionContent};
use crate::error::ReaderError;
use crate::navigation::{parse_nav_xhtml, parse_ncx, Navigation};
use crate::package::{parse_container, parse_package, BookMetadata, Package};
use crate::zip::{Archive, ZipLimits};

/// Fetches packaged-document bytes for a URL
#[async_trait]
pub trait DocumentProvider: Send + Sync {
    /// Fetch the full document
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ReaderError>;
}

/// Reads documents from the local filesystem; the URL is a path
#[derive(Clone, Copy, Debug, Default)]
pub struct FileProvider;

#[async_trait]
impl DocumentProvider for FileProvider {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ReaderError> {
        let path = url.strip_prefix("file://").unwrap_or(url);
        Ok(tokio::fs::read(path).await?)
    }
}

/// Serves documents registered in memory
#[derive(Clone, Debug, Default)]
pub struct MemoryProvider {
    documents: HashMap<String, Arc<[u8]>>,
}

impl MemoryProvider {
    /// Empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` under `url`
    pub fn insert(&mut self, url: impl Into<String>, bytes: impl Into<Arc<[u8]>>) {
        self.documents.insert(url.into(), bytes.into());
    }

    /// Builder-style [`MemoryProvider::insert`]
    pub fn with(mut self, url: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        self.insert(url, bytes);
        self
    }
}

#[async_trait]
impl DocumentProvider for MemoryProvider {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ReaderError> {
        self.documents
            .get(url)
            .map(|bytes| bytes.to_vec())
            .ok_or_else(|| ReaderError::Io(format!("no document at '{}'", url)))
    }
}

/// Loads and parses section content on demand
#[async_trait]
pub trait SectionLoader: Send + Sync {
    /// Number of sections in the spine
    fn section_count(&self) -> usize;

    /// Load and parse one section
    async fn load_section(&self, index: usize) -> Result<SectionContent, ReaderError>;
}

/// One spine item resolved against the manifest
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    /// Zero-based spine index
    pub index: usize,
    /// Manifest id
    pub idref: String,
    /// Archive path of the section document
    pub href: String,
    /// Manifest media type
    pub media_type: String,
    /// Whether the item is part of the linear reading order
    pub linear: bool,
}

/// An opened packaged document
#[derive(Debug, Clone)]
pub struct Book {
    archive: Archive,
    package: Package,
    sections: Vec<Section>,
    navigation: Navigation,
}

impl Book {
    /// Open a document from its bytes with default archive limits
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Result<Self, ReaderError> {
        Self::from_bytes_with_limits(bytes, ZipLimits::default())
    }

    /// Open a document from its bytes
    pub fn from_bytes_with_limits(
        bytes: impl Into<Arc<[u8]>>,
        limits: ZipLimits,
    ) -> Result<Self, ReaderError> {
        let archive = Archive::with_limits(bytes, limits)?;
        archive.validate_mimetype()?;

        let container = archive.read("META-INF/container.xml")?;
        let opf_path = parse_container(&container)?;
        let opf = archive.read(&opf_path)?;
        let package = parse_package(&opf_path, &opf)?;

        let sections = package
            .spine
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let manifest = package
                    .item(&item.idref)
                    .ok_or_else(|| ReaderError::ManifestItemMissing {
                        idref: item.idref.clone(),
                    })?;
                Ok(Section {
                    index,
                    idref: item.idref.clone(),
                    href: package.resolve(&manifest.href),
                    media_type: manifest.media_type.clone(),
                    linear: item.linear,
                })
            })
            .collect::<Result<Vec<_>, ReaderError>>()?;

        let navigation = load_navigation(&archive, &package);
        log::debug!(
            "[BOOK] Opened '{}': {} sections, {} toc entries",
            package.metadata.title,
            sections.len(),
            navigation.toc_count()
        );

        Ok(Self {
            archive,
            package,
            sections,
            navigation,
        })
    }

    /// Descriptive metadata
    pub fn metadata(&self) -> &BookMetadata {
        &self.package.metadata
    }

    /// Parsed package document
    pub fn package(&self) -> &Package {
        &self.package
    }

    /// Sections in spine order
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Section descriptor by spine index
    pub fn section(&self, index: usize) -> Result<&Section, ReaderError> {
        self.sections
            .get(index)
            .ok_or(ReaderError::SectionOutOfBounds {
                index,
                section_count: self.sections.len(),
            })
    }

    /// Navigation tree (empty when the document has none)
    pub fn navigation(&self) -> &Navigation {
        &self.navigation
    }

    /// Spine index of the section stored at an archive path
    pub fn section_index(&self, href: &str) -> Option<usize> {
        let path = href.split('#').next().unwrap_or(href);
        self.sections.iter().position(|s| s.href == path)
    }

    /// Read and parse a section synchronously
    pub fn read_section(&self, index: usize) -> Result<SectionContent, ReaderError> {
        let section = self.section(index)?;
        let bytes = self.archive.read(&section.href)?;
        let text = core::str::from_utf8(&bytes).map_err(|_| ReaderError::SectionNotUtf8 {
            href: section.href.clone(),
        })?;
        parse_section(index, &section.href, text.as_bytes())
    }
}

#[async_trait]
impl SectionLoader for Book {
    fn section_count(&self) -> usize {
        self.sections.len()
    }

    async fn load_section(&self, index: usize) -> Result<SectionContent, ReaderError> {
        tokio::task::yield_now().await;
        self.read_section(index)
    }
}

/// Best-effort navigation: a missing or broken nav document yields an empty tree
fn load_navigation(archive: &Archive, package: &Package) -> Navigation {
    let Some(item) = package.navigation_item() else {
        log::debug!("[BOOK] No navigation document declared");
        return Navigation::default();
    };
    let path = package.resolve(&item.href);
    let parsed = archive.read(&path).map_err(ReaderError::from).and_then(|bytes| {
        if item.media_type == "application/x-dtbncx+xml" {
            parse_ncx(&bytes)
        } else {
            parse_nav_xhtml(&bytes)
        }
    });
    match parsed {
        Ok(mut nav) => {
            nav.resolve_against(&path);
            nav
        }
        Err(err) => {
            log::warn!("[BOOK] Ignoring unreadable navigation '{}': {}", path, err);
            Navigation::default()
        }
    }
}

/// Fetch and open a document through a provider
pub async fn open_document(
    provider: &dyn DocumentProvider,
    url: &str,
) -> Result<Book, ReaderError> {
    let bytes = provider.fetch(url).await?;
    Book::from_bytes(bytes)
}

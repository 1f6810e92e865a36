//! Container and package document parsing
//!
//! Reads `META-INF/container.xml` to locate the OPF, then extracts the
//! metadata, manifest, and spine needed to address sections.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::ReaderError;

/// Maximum number of spine items kept from a package document
const MAX_SPINE_ITEMS: usize = 4096;

/// Manifest item (resource declaration)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestItem {
    /// Unique identifier within the package
    pub id: String,
    /// Path relative to the OPF file
    pub href: String,
    /// MIME type (e.g. "application/xhtml+xml")
    pub media_type: String,
    /// Space-separated properties (e.g. "nav", "cover-image")
    pub properties: Option<String>,
}

impl ManifestItem {
    /// Whether the item carries a given property token
    pub fn has_property(&self, name: &str) -> bool {
        self.properties
            .as_deref()
            .is_some_and(|p| p.split_whitespace().any(|t| t == name))
    }
}

/// One `<itemref>` of the spine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpineItem {
    /// Manifest item id
    pub idref: String,
    /// `linear="no"` marks auxiliary content
    pub linear: bool,
}

/// Dublin Core fields shown by the reader chrome
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BookMetadata {
    /// `dc:title`
    pub title: String,
    /// `dc:creator`, if any
    pub creator: Option<String>,
    /// `dc:language`, if any
    pub language: Option<String>,
}

/// Parsed package document
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Package {
    /// Archive path of the OPF itself
    pub opf_path: String,
    /// Descriptive metadata
    pub metadata: BookMetadata,
    /// All declared resources
    pub manifest: Vec<ManifestItem>,
    /// Reading order
    pub spine: Vec<SpineItem>,
    /// Manifest id of the NCX referenced by `<spine toc="...">`
    pub toc_id: Option<String>,
}

impl Package {
    /// Find a manifest item by id
    pub fn item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    /// Archive path of a manifest href
    pub fn resolve(&self, href: &str) -> String {
        resolve_relative_path(&self.opf_path, href)
    }

    /// The EPUB 3 navigation document, falling back to the NCX
    pub fn navigation_item(&self) -> Option<&ManifestItem> {
        self.manifest
            .iter()
            .find(|item| item.has_property("nav"))
            .or_else(|| self.toc_id.as_deref().and_then(|id| self.item(id)))
            .or_else(|| {
                self.manifest
                    .iter()
                    .find(|item| item.media_type == "application/x-dtbncx+xml")
            })
    }
}

/// Parse `META-INF/container.xml` and return the rootfile path
pub fn parse_container(content: &[u8]) -> Result<String, ReaderError> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if local_name(&reader, &e)? == "rootfile" {
                    if let Some(path) = attr_value(&reader, &e, "full-path")? {
                        return Ok(path);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ReaderError::Parse(format!("XML parse error: {:?}", e))),
            _ => {}
        }
        buf.clear();
    }

    Err(ReaderError::InvalidEpub(
        "No rootfile found in container.xml".into(),
    ))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum DcField {
    Title,
    Creator,
    Language,
}

/// Parse an OPF package document located at `opf_path`
pub fn parse_package(opf_path: &str, content: &[u8]) -> Result<Package, ReaderError> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut package = Package {
        opf_path: opf_path.to_string(),
        ..Package::default()
    };
    let mut in_metadata = false;
    let mut in_spine = false;
    let mut field: Option<DcField> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = local_name(&reader, &e)?;
                match name.as_str() {
                    "metadata" => in_metadata = true,
                    "title" if in_metadata => field = Some(DcField::Title),
                    "creator" if in_metadata => field = Some(DcField::Creator),
                    "language" if in_metadata => field = Some(DcField::Language),
                    "item" => {
                        if let Some(item) = parse_manifest_item(&reader, &e)? {
                            package.manifest.push(item);
                        }
                    }
                    "spine" => {
                        in_spine = true;
                        package.toc_id = attr_value(&reader, &e, "toc")?.filter(|v| !v.is_empty());
                    }
                    "itemref" if in_spine && package.spine.len() < MAX_SPINE_ITEMS => {
                        if let Some(idref) = attr_value(&reader, &e, "idref")? {
                            let linear = attr_value(&reader, &e, "linear")?.as_deref() != Some("no");
                            package.spine.push(SpineItem { idref, linear });
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(field) = field {
                    let text = reader
                        .decoder()
                        .decode(&e)
                        .map_err(|e| ReaderError::Parse(format!("Decode error: {:?}", e)))?;
                    let meta = &mut package.metadata;
                    match field {
                        DcField::Title => meta.title.push_str(&text),
                        DcField::Creator => meta.creator.get_or_insert_with(String::new).push_str(&text),
                        DcField::Language => meta.language.get_or_insert_with(String::new).push_str(&text),
                    }
                }
            }
            Ok(Event::End(e)) => {
                let local = e.local_name();
                let name = reader
                    .decoder()
                    .decode(local.as_ref())
                    .map_err(|e| ReaderError::Parse(format!("Decode error: {:?}", e)))?;
                match name.as_ref() {
                    "metadata" => in_metadata = false,
                    "spine" => in_spine = false,
                    "title" | "creator" | "language" => field = None,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ReaderError::Parse(format!("OPF parse error: {:?}", e))),
            _ => {}
        }
        buf.clear();
    }

    if package.spine.is_empty() {
        return Err(ReaderError::InvalidEpub("package has an empty spine".into()));
    }
    Ok(package)
}

fn parse_manifest_item(
    reader: &Reader<&[u8]>,
    e: &BytesStart<'_>,
) -> Result<Option<ManifestItem>, ReaderError> {
    let id = attr_value(reader, e, "id")?;
    let href = attr_value(reader, e, "href")?;
    let media_type = attr_value(reader, e, "media-type")?;
    let properties = attr_value(reader, e, "properties")?;

    Ok(match (id, href, media_type) {
        (Some(id), Some(href), Some(media_type)) => Some(ManifestItem {
            id,
            href,
            media_type,
            properties,
        }),
        _ => None,
    })
}

/// Element name without its namespace prefix
pub(crate) fn local_name(reader: &Reader<&[u8]>, e: &BytesStart<'_>) -> Result<String, ReaderError> {
    reader
        .decoder()
        .decode(e.local_name().as_ref())
        .map(|name| name.into_owned())
        .map_err(|e| ReaderError::Parse(format!("Decode error: {:?}", e)))
}

/// Value of the first attribute whose (possibly prefixed) key ends in `key`
pub(crate) fn attr_value(
    reader: &Reader<&[u8]>,
    e: &BytesStart<'_>,
    key: &str,
) -> Result<Option<String>, ReaderError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ReaderError::Parse(format!("Attr error: {:?}", e)))?;
        let local = attr.key.local_name();
        let name = reader
            .decoder()
            .decode(local.as_ref())
            .map_err(|e| ReaderError::Parse(format!("Decode error: {:?}", e)))?;
        if name == key {
            let value = reader
                .decoder()
                .decode(&attr.value)
                .map_err(|e| ReaderError::Parse(format!("Decode error: {:?}", e)))?;
            let value = quick_xml::escape::unescape(&value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.into_owned());
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Resolve `href` against the directory of `base_path`, dropping any fragment
pub fn resolve_relative_path(base_path: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or(href);
    if href.is_empty() {
        return normalize_path(base_path);
    }
    if let Some(absolute) = href.strip_prefix('/') {
        return normalize_path(absolute);
    }
    if href.contains("://") {
        return href.to_string();
    }

    match base_path.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => normalize_path(&format!("{}/{}", dir, href)),
        _ => normalize_path(href),
    }
}

fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPF: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Moby Dick</dc:title>
    <dc:creator>Herman Melville</dc:creator>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="c1" href="text/c1.xhtml" media-type="application/xhtml+xml"/>
    <item id="c2" href="text/c2.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="c1"/>
    <itemref idref="c2" linear="no"/>
  </spine>
</package>"#;

    #[test]
    fn test_parse_container() {
        let xml = br#"<container><rootfiles><rootfile full-path="OPS/book.opf"/></rootfiles></container>"#;
        assert_eq!(parse_container(xml).unwrap(), "OPS/book.opf");
    }

    #[test]
    fn test_parse_container_without_rootfile() {
        let err = parse_container(b"<container/>").unwrap_err();
        assert!(matches!(err, ReaderError::InvalidEpub(_)));
    }

    #[test]
    fn test_parse_package() {
        let package = parse_package("OEBPS/content.opf", OPF.as_bytes()).unwrap();
        assert_eq!(package.metadata.title, "Moby Dick");
        assert_eq!(package.metadata.creator.as_deref(), Some("Herman Melville"));
        assert_eq!(package.metadata.language.as_deref(), Some("en"));
        assert_eq!(package.manifest.len(), 4);
        assert_eq!(package.spine.len(), 2);
        assert!(package.spine[0].linear);
        assert!(!package.spine[1].linear);
        assert_eq!(package.toc_id.as_deref(), Some("ncx"));
    }

    #[test]
    fn test_navigation_item_prefers_nav_property() {
        let package = parse_package("OEBPS/content.opf", OPF.as_bytes()).unwrap();
        assert_eq!(package.navigation_item().unwrap().id, "nav");
    }

    #[test]
    fn test_empty_spine_is_invalid() {
        let opf = br#"<package><manifest/><spine/></package>"#;
        assert!(matches!(
            parse_package("content.opf", opf),
            Err(ReaderError::InvalidEpub(_))
        ));
    }

    #[test]
    fn test_resolve_relative_path() {
        assert_eq!(
            resolve_relative_path("OEBPS/content.opf", "text/c1.xhtml#p3"),
            "OEBPS/text/c1.xhtml"
        );
        assert_eq!(
            resolve_relative_path("OEBPS/text/nav.xhtml", "../images/a.png"),
            "OEBPS/images/a.png"
        );
        assert_eq!(resolve_relative_path("content.opf", "c1.xhtml"), "c1.xhtml");
        assert_eq!(resolve_relative_path("OEBPS/content.opf", "/c1.xhtml"), "c1.xhtml");
    }
}

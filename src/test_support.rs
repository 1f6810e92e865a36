//! Fixture builders shared by the unit and integration tests.

use std::fmt::Write as _;

struct PendingEntry {
    name: String,
    payload: Vec<u8>,
    method: u16,
    crc: u32,
    size: u32,
}

/// Minimal ZIP writer (stored and deflated entries, no data descriptors).
pub(crate) struct ZipBuilder {
    entries: Vec<PendingEntry>,
}

impl ZipBuilder {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn stored(mut self, name: &str, data: &[u8]) -> Self {
        self.entries.push(PendingEntry {
            name: name.to_string(),
            payload: data.to_vec(),
            method: 0,
            crc: crc32fast::hash(data),
            size: data.len() as u32,
        });
        self
    }

    pub(crate) fn deflated(mut self, name: &str, data: &[u8]) -> Self {
        self.entries.push(PendingEntry {
            name: name.to_string(),
            payload: miniz_oxide::deflate::compress_to_vec(data, 6),
            method: 8,
            crc: crc32fast::hash(data),
            size: data.len() as u32,
        });
        self
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut central = Vec::new();

        for entry in &self.entries {
            let offset = out.len() as u32;
            out.extend_from_slice(&0x04034b50u32.to_le_bytes());
            out.extend_from_slice(&20u16.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&entry.method.to_le_bytes());
            out.extend_from_slice(&[0u8; 4]);
            out.extend_from_slice(&entry.crc.to_le_bytes());
            out.extend_from_slice(&(entry.payload.len() as u32).to_le_bytes());
            out.extend_from_slice(&entry.size.to_le_bytes());
            out.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(entry.name.as_bytes());
            out.extend_from_slice(&entry.payload);

            central.extend_from_slice(&0x02014b50u32.to_le_bytes());
            central.extend_from_slice(&20u16.to_le_bytes());
            central.extend_from_slice(&20u16.to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes());
            central.extend_from_slice(&entry.method.to_le_bytes());
            central.extend_from_slice(&[0u8; 4]);
            central.extend_from_slice(&entry.crc.to_le_bytes());
            central.extend_from_slice(&(entry.payload.len() as u32).to_le_bytes());
            central.extend_from_slice(&entry.size.to_le_bytes());
            central.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
            central.extend_from_slice(&[0u8; 12]);
            central.extend_from_slice(&offset.to_le_bytes());
            central.extend_from_slice(entry.name.as_bytes());
        }

        let cd_offset = out.len() as u32;
        out.extend_from_slice(&central);
        out.extend_from_slice(&0x06054b50u32.to_le_bytes());
        out.extend_from_slice(&[0u8; 4]);
        out.extend_from_slice(&(self.entries.len() as u16).to_le_bytes());
        out.extend_from_slice(&(self.entries.len() as u16).to_le_bytes());
        out.extend_from_slice(&(central.len() as u32).to_le_bytes());
        out.extend_from_slice(&cd_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }
}

pub(crate) fn chapter_xhtml(title: &str, body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
<html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>{title}</title></head>\
<body><h1>{title}</h1><p>{body}</p></body></html>"
    )
}

/// Build an EPUB 3 package with one spine item per paragraph.
///
/// Section `i` lives at `OEBPS/text/ch{i}.xhtml` and is titled `Chapter {i+1}`.
pub(crate) fn epub_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
    let mut manifest = String::new();
    let mut spine = String::new();
    let mut toc = String::new();
    for i in 0..paragraphs.len() {
        let _ = write!(
            manifest,
            "<item id=\"ch{i}\" href=\"text/ch{i}.xhtml\" media-type=\"application/xhtml+xml\"/>"
        );
        let _ = write!(spine, "<itemref idref=\"ch{i}\"/>");
        let _ = write!(
            toc,
            "<li><a href=\"text/ch{i}.xhtml\">Chapter {}</a></li>",
            i + 1
        );
    }

    let opf = format!(
        "<?xml version=\"1.0\"?>\
<package xmlns=\"http://www.idpf.org/2007/opf\" version=\"3.0\">\
<metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\
<dc:title>Fixture Book</dc:title><dc:creator>A. Writer</dc:creator><dc:language>en</dc:language>\
</metadata><manifest>\
<item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\
{manifest}</manifest><spine>{spine}</spine></package>"
    );
    let nav = format!(
        "<?xml version=\"1.0\"?>\
<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\">\
<body><nav epub:type=\"toc\"><ol>{toc}</ol></nav></body></html>"
    );

    let mut zip = ZipBuilder::new()
        .stored("mimetype", b"application/epub+zip")
        .stored(
            "META-INF/container.xml",
            b"<?xml version=\"1.0\"?><container version=\"1.0\" \
xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\"><rootfiles>\
<rootfile full-path=\"OEBPS/content.opf\" media-type=\"application/oebps-package+xml\"/>\
</rootfiles></container>",
        )
        .deflated("OEBPS/content.opf", opf.as_bytes())
        .stored("OEBPS/nav.xhtml", nav.as_bytes());
    for (i, paragraph) in paragraphs.iter().enumerate() {
        let title = format!("Chapter {}", i + 1);
        zip = zip.deflated(
            &format!("OEBPS/text/ch{i}.xhtml"),
            chapter_xhtml(&title, paragraph).as_bytes(),
        );
    }
    zip.finish()
}

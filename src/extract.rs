//! Document text extraction (PDF, DOCX, plain text).
//!
//! Uploads arrive as raw bytes; the format is sniffed from the content:
//!
//! | Magic | Format | Pages |
//! |-------|--------|-------|
//! | `%PDF` | PDF | one [`Page`] per PDF page, via `lopdf` |
//! | `PK` + `word/document.xml` | DOCX | a single page |
//! | valid UTF-8 | plain text | a single page |
//!
//! A PDF page whose text cannot be decoded yields empty text rather than an
//! error; only a document that cannot be opened at all is a
//! [`Error::Parse`].

use std::io::Read;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::Page;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Capability: turn an uploaded file into ordered pages of text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<Vec<Page>>;
}

/// Detected upload format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Pdf,
    Docx,
    Text,
}

impl Format {
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Pdf => "pdf",
            Format::Docx => "docx",
            Format::Text => "txt",
        }
    }
}

/// Guess the format from the leading bytes.
pub fn sniff(bytes: &[u8]) -> Option<Format> {
    if bytes.starts_with(b"%PDF") {
        Some(Format::Pdf)
    } else if bytes.starts_with(b"PK\x03\x04") {
        Some(Format::Docx)
    } else if std::str::from_utf8(bytes).is_ok() {
        Some(Format::Text)
    } else {
        None
    }
}

/// Extractor that dispatches on [`sniff`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultExtractor;

impl TextExtractor for DefaultExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<Vec<Page>> {
        match sniff(bytes) {
            Some(Format::Pdf) => extract_pdf(bytes),
            Some(Format::Docx) => Ok(vec![Page::new(1, extract_docx(bytes)?)]),
            Some(Format::Text) => Ok(vec![Page::new(
                1,
                String::from_utf8_lossy(bytes).into_owned(),
            )]),
            None => Err(Error::Parse(
                "unsupported file: expected PDF, DOCX, or UTF-8 text".to_string(),
            )),
        }
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<Vec<Page>> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| Error::Parse(format!("PDF extraction failed: {}", e)))?;

    let pages: Vec<Page> = doc
        .get_pages()
        .keys()
        .map(|&number| {
            let text = doc.extract_text(&[number]).unwrap_or_else(|e| {
                warn!(page = number, error = %e, "unreadable PDF page");
                String::new()
            });
            Page::new(number, text)
        })
        .collect();

    debug!(pages = pages.len(), "extracted PDF");
    Ok(pages)
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| Error::Parse(format!("DOCX extraction failed: {}", e)))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| Error::Parse("word/document.xml not found".to_string()))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(Error::Parse(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    extract_w_t_elements(&xml)
}

/// Concatenate `<w:t>` runs, one line per `<w:p>` paragraph.
fn extract_w_t_elements(xml: &[u8]) -> Result<String> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" if !out.is_empty() && !out.ends_with('\n') => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Parse(format!("DOCX XML error: {}", e))),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Minimal PDF with one page per phrase, with correct xref offsets.
    fn pdf_with_pages(phrases: &[&str]) -> Vec<u8> {
        let n = phrases.len();
        // Objects: 1 catalog, 2 pages, 3 font, then (page, content) pairs.
        let mut objects: Vec<String> = Vec::new();
        objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
        let kids: Vec<String> = (0..n).map(|i| format!("{} 0 R", 4 + 2 * i)).collect();
        objects.push(format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            n
        ));
        objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string());
        for (i, phrase) in phrases.iter().enumerate() {
            let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R /Resources << /Font << /F1 3 0 R >> >> >>",
                5 + 2 * i
            ));
            objects.push(format!(
                "<< /Length {} >>\nstream\n{}\nendstream",
                content.len(),
                content
            ));
        }

        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n");
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj {} endobj\n", i + 1, body).as_bytes());
        }
        let xref_start = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
        out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
        for off in offsets {
            out.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                xref_start
            )
            .as_bytes(),
        );
        out
    }

    fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            let body: String = paragraphs
                .iter()
                .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
                .collect();
            let xml = format!(
                "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
                body
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn test_sniff() {
        assert_eq!(sniff(b"%PDF-1.7 ..."), Some(Format::Pdf));
        assert_eq!(sniff(b"PK\x03\x04rest"), Some(Format::Docx));
        assert_eq!(sniff("plain résumé".as_bytes()), Some(Format::Text));
        assert_eq!(sniff(&[0xff, 0xfe, 0x00, 0x9f]), None);
    }

    #[test]
    fn test_pdf_pages_are_one_based_and_ordered() {
        let bytes = pdf_with_pages(&["first page phrase", "second page phrase"]);
        let pages = DefaultExtractor.extract(&bytes).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_number, 1);
        assert_eq!(pages[1].page_number, 2);
        assert!(pages[0].text.contains("first page phrase"));
        assert!(pages[1].text.contains("second page phrase"));
    }

    #[test]
    fn test_invalid_pdf_is_parse_error() {
        let err = DefaultExtractor.extract(b"%PDF-1.4 garbage").unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn test_docx_single_page() {
        let bytes = docx_with_paragraphs(&["Senior Rust Engineer", "Built &amp; shipped APIs"]);
        let pages = DefaultExtractor.extract(&bytes).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].text, "Senior Rust Engineer\nBuilt & shipped APIs");
    }

    #[test]
    fn test_zip_without_document_xml_is_parse_error() {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("other.txt", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"hello").unwrap();
            zip.finish().unwrap();
        }
        let err = DefaultExtractor.extract(&buf).unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn test_plain_text_single_page() {
        let pages = DefaultExtractor.extract(b"Kafka, Postgres, Rust").unwrap();
        assert_eq!(pages, vec![Page::new(1, "Kafka, Postgres, Rust")]);
    }

    #[test]
    fn test_binary_garbage_is_parse_error() {
        let err = DefaultExtractor.extract(&[0xff, 0xfe, 0x00, 0x9f]).unwrap_err();
        assert_eq!(err.kind(), "parse");
    }
}

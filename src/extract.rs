//! Text and metadata extraction for the document formats the ingester accepts.
//!
//! A file's extension maps to a [`FileType`] tag, and [`extractor_for`]
//! maps the tag to the [`Extractor`] that handles it:
//!
//! | Extension | Type | Backend |
//! |-----------|------|---------|
//! | `pdf` | [`FileType::Pdf`] | `pdf-extract` |
//! | `docx` | [`FileType::Docx`] | `zip` + `quick-xml` (`word/document.xml`) |
//! | `html`, `htm` | [`FileType::Html`] | `scraper` |
//! | `csv` | [`FileType::Csv`] | `csv` |
//! | `txt`, `md`, `markdown` | [`FileType::Text`] | UTF-8 (lossy) |
//!
//! Anything else is [`ExtractError::UnsupportedFileType`], which the
//! ingester treats as a hard failure.

use std::io::Read;
use std::path::Path;
use std::time::SystemTime;

use quick_xml::events::Event;
use scraper::{Html, Selector};
use thiserror::Error;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Elements whose text never reaches the extracted output.
const HTML_SKIPPED: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Elements that start a new paragraph in the extracted output.
const HTML_BLOCKS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "main", "aside", "nav", "h1", "h2",
    "h3", "h4", "h5", "h6", "li", "ul", "ol", "table", "tr", "pre", "blockquote", "br", "hr",
];

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("DOCX extraction failed: {0}")]
    Docx(String),

    #[error("CSV extraction failed: {0}")]
    Csv(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Pdf,
    Docx,
    Html,
    Csv,
    Text,
}

impl FileType {
    /// Case-insensitive lookup; `None` for extensions with no extractor.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(FileType::Pdf),
            "docx" => Some(FileType::Docx),
            "html" | "htm" => Some(FileType::Html),
            "csv" => Some(FileType::Csv),
            "txt" | "md" | "markdown" => Some(FileType::Text),
            _ => None,
        }
    }

    /// The type of `path`, judged by its extension.
    pub fn from_path(path: &Path) -> Result<Self, ExtractError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        Self::from_extension(ext).ok_or_else(|| {
            ExtractError::UnsupportedFileType(if ext.is_empty() {
                format!("{} has no extension", path.display())
            } else {
                format!("'.{}' ({})", ext, path.display())
            })
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Docx => "docx",
            FileType::Html => "html",
            FileType::Csv => "csv",
            FileType::Text => "text",
        }
    }
}

/// Descriptive facts about a source document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentMetadata {
    pub file_name: String,
    pub file_type: FileType,
    pub size_bytes: u64,
    pub modified: Option<SystemTime>,
    pub title: Option<String>,
}

/// Extraction capability for one file type.
pub trait Extractor: Send + Sync {
    fn file_type(&self) -> FileType;

    /// Plain UTF-8 text of the document.
    fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractError>;

    /// File-system facts plus whatever title the format carries.
    fn extract_metadata(&self, path: &Path, bytes: &[u8]) -> Result<DocumentMetadata, ExtractError> {
        Ok(base_metadata(path, self.file_type(), bytes))
    }
}

pub struct PdfExtractor;
pub struct DocxExtractor;
pub struct HtmlExtractor;
pub struct CsvExtractor;
pub struct TextExtractor;

/// The extractor registered for `file_type`.
pub fn extractor_for(file_type: FileType) -> &'static dyn Extractor {
    match file_type {
        FileType::Pdf => &PdfExtractor,
        FileType::Docx => &DocxExtractor,
        FileType::Html => &HtmlExtractor,
        FileType::Csv => &CsvExtractor,
        FileType::Text => &TextExtractor,
    }
}

fn base_metadata(path: &Path, file_type: FileType, bytes: &[u8]) -> DocumentMetadata {
    DocumentMetadata {
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        file_type,
        size_bytes: bytes.len() as u64,
        modified: std::fs::metadata(path).and_then(|m| m.modified()).ok(),
        title: None,
    }
}

// ============ PDF ============

impl Extractor for PdfExtractor {
    fn file_type(&self) -> FileType {
        FileType::Pdf
    }

    fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
    }
}

// ============ DOCX ============

impl Extractor for DocxExtractor {
    fn file_type(&self) -> FileType {
        FileType::Docx
    }

    fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let mut archive = open_zip(bytes)?;
        let xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?
            .ok_or_else(|| ExtractError::Docx("word/document.xml not found".to_string()))?;
        docx_paragraphs(&xml)
    }

    fn extract_metadata(&self, path: &Path, bytes: &[u8]) -> Result<DocumentMetadata, ExtractError> {
        let mut meta = base_metadata(path, FileType::Docx, bytes);
        let mut archive = open_zip(bytes)?;
        if let Some(core) = read_zip_entry_bounded(&mut archive, "docProps/core.xml")? {
            meta.title = docx_title(&core)?;
        }
        Ok(meta)
    }
}

fn open_zip(bytes: &[u8]) -> Result<zip::ZipArchive<std::io::Cursor<&[u8]>>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Docx(e.to_string()))
}

/// Contents of entry `name`, or `None` if the archive has no such entry.
fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<Vec<u8>>, ExtractError> {
    let entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(ExtractError::Docx(e.to_string())),
    };
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(Some(out))
}

/// Text of every `w:t` run, one line per `w:p` paragraph.
fn docx_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| ExtractError::Docx(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    Ok(paragraphs.join("\n"))
}

/// `dc:title` from `docProps/core.xml`.
fn docx_title(xml: &[u8]) -> Result<Option<String>, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_title = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"title" => in_title = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == b"title" => in_title = false,
            Ok(Event::Text(te)) if in_title => {
                let title = te.unescape().map_err(|e| ExtractError::Docx(e.to_string()))?;
                if !title.is_empty() {
                    return Ok(Some(title.into_owned()));
                }
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
}

// ============ HTML ============

impl Extractor for HtmlExtractor {
    fn file_type(&self) -> FileType {
        FileType::Html
    }

    fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let document = Html::parse_document(&String::from_utf8_lossy(bytes));
        Ok(html_body_text(&document))
    }

    fn extract_metadata(&self, path: &Path, bytes: &[u8]) -> Result<DocumentMetadata, ExtractError> {
        let document = Html::parse_document(&String::from_utf8_lossy(bytes));
        let mut meta = base_metadata(path, FileType::Html, bytes);
        meta.title = html_title(&document);
        Ok(meta)
    }
}

/// Visible body text, with block-level elements separated by blank lines.
fn html_body_text(document: &Html) -> String {
    let root = match Selector::parse("body")
        .ok()
        .and_then(|s| document.select(&s).next())
    {
        Some(body) => body,
        None => document.root_element(),
    };

    let mut raw = String::new();
    for node in root.descendants() {
        if let Some(element) = node.value().as_element() {
            if HTML_BLOCKS.contains(&element.name()) {
                raw.push_str("\n\n");
            }
        } else if let Some(text) = node.value().as_text() {
            let hidden = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .map(|e| HTML_SKIPPED.contains(&e.name()))
                    .unwrap_or(false)
            });
            if !hidden {
                raw.push_str(text);
                raw.push(' ');
            }
        }
    }

    raw.split("\n\n")
        .map(|para| para.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|para| !para.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn html_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
}

// ============ CSV ============

impl Extractor for CsvExtractor {
    fn file_type(&self) -> FileType {
        FileType::Csv
    }

    /// One line per record: `header: value` pairs joined by `", "`.
    fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(bytes);
        let headers = reader
            .headers()
            .map_err(|e| ExtractError::Csv(e.to_string()))?
            .clone();

        let mut lines = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| ExtractError::Csv(e.to_string()))?;
            let pairs: Vec<String> = record
                .iter()
                .enumerate()
                .filter(|(_, value)| !value.trim().is_empty())
                .map(|(i, value)| match headers.get(i) {
                    Some(header) if !header.trim().is_empty() => {
                        format!("{}: {}", header.trim(), value.trim())
                    }
                    _ => value.trim().to_string(),
                })
                .collect();
            if !pairs.is_empty() {
                lines.push(pairs.join(", "));
            }
        }
        Ok(lines.join("\n"))
    }
}

// ============ Plain text ============

impl Extractor for TextExtractor {
    fn file_type(&self) -> FileType {
        FileType::Text
    }

    fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// A leading Markdown `# ` heading becomes the title.
    fn extract_metadata(&self, path: &Path, bytes: &[u8]) -> Result<DocumentMetadata, ExtractError> {
        let mut meta = base_metadata(path, FileType::Text, bytes);
        let text = String::from_utf8_lossy(bytes);
        meta.title = text
            .lines()
            .find(|line| !line.trim().is_empty())
            .and_then(|line| line.trim().strip_prefix("# "))
            .map(|title| title.trim().to_string());
        Ok(meta)
    }
}

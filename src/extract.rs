//! Text extraction and MIME detection for uploaded files.
//!
//! Callers hand over raw bytes, a file name and optionally a declared MIME
//! type; this module decides the effective type and returns plain UTF-8 text.
//! Plain-text types are decoded directly, PDF goes through `pdf-extract`
//! and DOCX is unpacked with `zip` + `quick-xml`.

use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use thiserror::Error;

pub const MIME_PLAIN: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_CSV: &str = "text/csv";
pub const MIME_JSON: &str = "application/json";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Source-like extensions treated as plain text.
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "log", "rs", "py", "js", "ts", "go", "java", "c", "h", "cpp", "toml", "yaml", "yml",
    "xml", "html", "htm", "sh", "sql", "ini", "cfg",
];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
    #[error("content is not valid UTF-8: {0}")]
    InvalidEncoding(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

/// Effective MIME type for a file.
///
/// A declared type wins unless it is missing, blank or the generic
/// `application/octet-stream`; otherwise the extension decides.
pub fn detect_mime(file_name: &str, declared: Option<&str>) -> String {
    if let Some(declared) = declared.map(str::trim) {
        if !declared.is_empty() && declared != MIME_OCTET_STREAM {
            // Drop parameters such as "; charset=utf-8".
            let base = declared.split(';').next().unwrap_or(declared).trim();
            return base.to_ascii_lowercase();
        }
    }

    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "md" | "markdown" => MIME_MARKDOWN,
        "csv" => MIME_CSV,
        "json" => MIME_JSON,
        "pdf" => MIME_PDF,
        "docx" => MIME_DOCX,
        e if TEXT_EXTENSIONS.contains(&e) => MIME_PLAIN,
        _ => MIME_OCTET_STREAM,
    }
    .to_string()
}

fn is_text_mime(mime: &str) -> bool {
    mime.starts_with("text/")
        || mime == MIME_JSON
        || mime == "application/xml"
        || mime == "application/x-yaml"
        || mime == "application/toml"
}

/// Whether [`extract_text`] can handle `mime` at all.
pub fn is_supported(mime: &str) -> bool {
    is_text_mime(mime) || mime == MIME_PDF || mime == MIME_DOCX
}

/// Extract plain text from `bytes` of type `mime`.
pub fn extract_text(bytes: &[u8], mime: &str) -> Result<String, ExtractError> {
    if is_text_mime(mime) {
        return decode_utf8(bytes);
    }
    match mime {
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_docx(bytes),
        _ => Err(ExtractError::UnsupportedContentType(mime.to_string())),
    }
}

fn decode_utf8(bytes: &[u8]) -> Result<String, ExtractError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8(bytes.to_vec()).map_err(|e| ExtractError::InvalidEncoding(e.to_string()))
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;
    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    docx_paragraphs(&xml)
}

/// Concatenate `<w:t>` runs, one blank line between `<w:p>` paragraphs so the
/// chunker can still find paragraph boundaries.
fn docx_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Docx(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"tab" => current.push('\t'),
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let para = current.trim();
                    if !para.is_empty() {
                        paragraphs.push(para.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    let tail = current.trim();
    if !tail.is_empty() {
        paragraphs.push(tail.to_string());
    }
    Ok(paragraphs.join("\n\n"))
}

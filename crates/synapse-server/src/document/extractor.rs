use encoding_rs::UTF_8;
use lopdf::Document as PdfDocument;
use pulldown_cmark::{html, Options, Parser as MdParser};
use scraper::{Html, Selector};
use std::io::{Cursor, Read};
use thiserror::Error;
use tracing::{debug, warn};

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Unsupported content type: {0}")]
    Unsupported(String),

    #[error("Extraction failed: {0}")]
    Malformed(String),
}

/// Extract plain text from uploaded bytes, classified by the declared MIME
/// type. Anything that cannot be reduced to text here is unsupported; the
/// pipeline turns that into a terminal `failed` status.
pub fn extract_text(content_type: &str, bytes: &[u8]) -> Result<String, ExtractError> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    debug!("Extracting text ({}, {} bytes)", mime, bytes.len());

    let text = match mime.as_str() {
        "application/pdf" => extract_pdf(bytes)?,
        DOCX_MIME => extract_docx(bytes)?,
        "text/markdown" => extract_markdown(bytes),
        "text/html" | "application/xhtml+xml" => extract_html(&decode_text(bytes)),
        "application/json" | "application/xml" => decode_text(bytes),
        t if t.starts_with("text/") => decode_text(bytes),
        other => return Err(ExtractError::Unsupported(other.to_string())),
    };

    // Null bytes upset Postgres TEXT columns downstream
    Ok(text.replace('\0', ""))
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let doc = PdfDocument::load_mem(bytes)
        .map_err(|e| ExtractError::Malformed(format!("Failed to load PDF: {}", e)))?;

    let mut content = String::new();
    for (page_num, _) in doc.get_pages() {
        match doc.extract_text(&[page_num]) {
            Ok(text) => {
                content.push_str(&text);
                content.push('\n');
            }
            Err(e) => {
                warn!("Failed to extract text from page {}: {}", page_num, e);
            }
        }
    }

    Ok(content)
}

/// DOCX is a zip archive; the document body lives in word/document.xml.
fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractError::Malformed(format!("Failed to open DOCX archive: {}", e)))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Malformed(format!("DOCX has no document.xml: {}", e)))?
        .read_to_string(&mut xml)
        .map_err(|e| ExtractError::Malformed(format!("Failed to read document.xml: {}", e)))?;

    Ok(strip_xml_tags(&xml))
}

fn extract_markdown(bytes: &[u8]) -> String {
    let content = decode_text(bytes);

    // Render to HTML first, then flatten the HTML to text
    let parser = MdParser::new_ext(&content, Options::all());
    let mut html_output = String::new();
    html::push_html(&mut html_output, parser);

    extract_html(&html_output)
}

fn extract_html(html: &str) -> String {
    let document = Html::parse_document(html);
    let body_selector = Selector::parse("body").unwrap();

    let mut text = String::new();
    for element in document.select(&body_selector) {
        text.push_str(&element.text().collect::<String>());
    }
    if text.is_empty() {
        text = document.root_element().text().collect();
    }

    text.lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_text(bytes: &[u8]) -> String {
    // UTF-8 fast path, lossy fallback for anything else
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let (decoded, _, _) = UTF_8.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Strip tags from Office XML; a space per closed tag keeps runs of text from
/// gluing together.
fn strip_xml_tags(xml: &str) -> String {
    let mut text = String::new();
    let mut inside_tag = false;

    for c in xml.chars() {
        if c == '<' {
            inside_tag = true;
        } else if c == '>' {
            inside_tag = false;
            text.push(' ');
        } else if !inside_tag {
            text.push(c);
        }
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

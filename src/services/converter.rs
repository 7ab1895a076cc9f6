//! Word document to HTML conversion.
//!
//! A `.docx` file is a zip archive whose body lives in `word/document.xml`.
//! Paragraph styles become heading tags so the chapterizer can find chapter
//! boundaries; bold/italic/underline runs keep their emphasis.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::io::{Cursor, Read};
use thiserror::Error;

pub const SUPPORTED_EXTENSIONS: &[&str] = &[".docx", ".doc"];

const DOCUMENT_PART: &str = "word/document.xml";

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("unsupported document type '{0}', upload a .docx or .doc file")]
    Unsupported(String),

    #[error("could not open the document, it is not a valid Word file: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("could not read the document body: {0}")]
    Io(#[from] std::io::Error),

    #[error("the document body is malformed: {0}")]
    Xml(String),

    #[error("document conversion was interrupted: {0}")]
    Worker(String),
}

/// Returns the normalized extension (".docx") when the file name is accepted.
pub fn supported_extension(filename: &str) -> Option<&'static str> {
    let lower = filename.trim().to_lowercase();
    SUPPORTED_EXTENSIONS
        .iter()
        .copied()
        .find(|ext| lower.ends_with(ext))
}

pub fn convert_document(data: &[u8], extension: &str) -> Result<String, ConversionError> {
    let ext = extension.trim().to_lowercase();
    let ext = ext.strip_prefix('.').unwrap_or(&ext);
    match ext {
        // Legacy .doc uploads are accepted only when they are really OOXML.
        "docx" | "doc" => docx_to_html(data),
        other => Err(ConversionError::Unsupported(other.to_string())),
    }
}

pub fn docx_to_html(data: &[u8]) -> Result<String, ConversionError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))?;
    let mut part = archive.by_name(DOCUMENT_PART)?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)?;
    document_xml_to_html(&xml)
}

#[derive(Default)]
struct RunFormat {
    bold: bool,
    italic: bool,
    underline: bool,
}

#[derive(Default)]
struct HtmlBuilder {
    html: String,
    paragraph: String,
    paragraph_style: Option<String>,
    run_text: String,
    run_format: RunFormat,
    in_paragraph: bool,
    in_paragraph_props: bool,
    in_run_props: bool,
    in_text: bool,
}

impl HtmlBuilder {
    fn start(&mut self, e: &BytesStart) {
        match e.local_name().as_ref() {
            b"p" => {
                self.in_paragraph = true;
                self.paragraph.clear();
                self.paragraph_style = None;
            }
            b"pPr" => self.in_paragraph_props = true,
            b"rPr" if !self.in_paragraph_props => self.in_run_props = true,
            b"r" => {
                self.run_text.clear();
                self.run_format = RunFormat::default();
            }
            b"t" => self.in_text = true,
            _ => self.property(e),
        }
    }

    /// Self-closing elements: formatting flags, styles, tabs and breaks.
    fn property(&mut self, e: &BytesStart) {
        match e.local_name().as_ref() {
            b"pStyle" if self.in_paragraph_props => self.paragraph_style = attr_val(e),
            b"b" if self.in_run_props => self.run_format.bold = toggle_on(e),
            b"i" if self.in_run_props => self.run_format.italic = toggle_on(e),
            b"u" if self.in_run_props => self.run_format.underline = toggle_on(e),
            b"tab" if self.in_paragraph && !self.in_paragraph_props => self.run_text.push('\t'),
            b"br" if self.in_paragraph => self.run_text.push_str("<br />"),
            _ => {}
        }
    }

    fn end(&mut self, name: &[u8]) {
        match name {
            b"t" => self.in_text = false,
            b"rPr" => self.in_run_props = false,
            b"pPr" => self.in_paragraph_props = false,
            b"r" => self.flush_run(),
            b"p" => self.flush_paragraph(),
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.in_text {
            self.run_text.push_str(&html_escape::encode_text(text));
        }
    }

    fn flush_run(&mut self) {
        if self.run_text.is_empty() {
            return;
        }
        let mut run = std::mem::take(&mut self.run_text);
        if self.run_format.underline {
            run = format!("<u>{run}</u>");
        }
        if self.run_format.italic {
            run = format!("<em>{run}</em>");
        }
        if self.run_format.bold {
            run = format!("<strong>{run}</strong>");
        }
        self.paragraph.push_str(&run);
    }

    fn flush_paragraph(&mut self) {
        self.flush_run();
        self.in_paragraph = false;
        if self.paragraph.trim().is_empty() {
            return;
        }
        let tag = match self.paragraph_style.as_deref().and_then(heading_level) {
            Some(level) => format!("h{level}"),
            None => "p".to_string(),
        };
        self.html.push_str(&format!("<{tag}>{}</{tag}>\n", self.paragraph));
        self.paragraph.clear();
    }
}

pub fn document_xml_to_html(xml: &str) -> Result<String, ConversionError> {
    let mut reader = Reader::from_str(xml);
    let mut builder = HtmlBuilder::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => builder.start(&e),
            Ok(Event::Empty(e)) => builder.property(&e),
            Ok(Event::End(e)) => builder.end(e.local_name().as_ref()),
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| ConversionError::Xml(e.to_string()))?;
                builder.text(&text);
            }
            Ok(Event::CData(e)) => builder.text(&String::from_utf8_lossy(&e)),
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ConversionError::Xml(format!(
                    "error at position {}: {e}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
    }

    Ok(builder.html)
}

/// Maps Word style ids such as `Heading2` or `heading 2` to a heading level.
fn heading_level(style: &str) -> Option<u8> {
    let normalized: String = style
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    if normalized == "title" {
        return Some(1);
    }
    normalized
        .strip_prefix("heading")
        .and_then(|n| n.parse::<u8>().ok())
        .filter(|level| (1..=6).contains(level))
}

fn attr_val(e: &BytesStart) -> Option<String> {
    e.attributes()
        .with_checks(false)
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == b"val")
        .and_then(|attr| attr.unescape_value().ok())
        .map(|value| value.into_owned())
}

/// `<w:b/>` switches a property on, `w:val="0"`/`"false"`/`"none"` switches it off.
fn toggle_on(e: &BytesStart) -> bool {
    !matches!(attr_val(e).as_deref(), Some("0" | "false" | "off" | "none"))
}

use docx_rs::{Docx, Paragraph, Run};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Pdf,
    Docx,
    Csv,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Result<Self, OutputError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "txt" => Ok(OutputFormat::Text),
            "pdf" => Ok(OutputFormat::Pdf),
            "docx" => Ok(OutputFormat::Docx),
            "csv" => Ok(OutputFormat::Csv),
            "" => Err(OutputError::UnsupportedFormat("(no extension)".to_string())),
            other => Err(OutputError::UnsupportedFormat(format!(".{}", other))),
        }
    }
}

/// Write `text` to `path` in the format named by its extension.
///
/// The format is resolved before anything touches the filesystem, so an unsupported
/// extension never leaves a file behind.
pub fn write_output(text: &str, path: &Path) -> Result<OutputFormat, OutputError> {
    let format = OutputFormat::from_path(path)?;
    match format {
        OutputFormat::Text => std::fs::write(path, text)?,
        OutputFormat::Docx => write_docx(text, path)?,
        OutputFormat::Csv => write_csv(text, path)?,
        OutputFormat::Pdf => write_pdf(text, path)?,
    }
    Ok(format)
}

fn write_docx(text: &str, path: &Path) -> Result<(), OutputError> {
    let docx = text.split('\n').fold(Docx::new(), |docx, line| {
        docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(line)))
    });

    let file = File::create(path)?;
    docx.build()
        .pack(file)
        .map_err(|e| OutputError::Encode(e.to_string()))
}

fn write_csv(text: &str, path: &Path) -> Result<(), OutputError> {
    let encode = |e: csv::Error| OutputError::Encode(e.to_string());

    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::CRLF)
        .from_path(path)
        .map_err(encode)?;

    for line in text.split('\n') {
        if line.contains(',') {
            writer
                .write_record(line.split(',').map(str::trim))
                .map_err(encode)?;
        } else {
            writer.write_record([line]).map_err(encode)?;
        }
    }

    writer.flush()?;
    Ok(())
}

// US Letter, in points.
const PAGE_WIDTH: i64 = 612;
const PAGE_HEIGHT: i64 = 792;
const MARGIN: i64 = 72;
const FONT_SIZE: i64 = 10;
const LEADING: i64 = 12;
const PARAGRAPH_SPACING: i64 = 12;
// Approximate Helvetica 10pt capacity of the text column.
const WRAP_COLUMNS: usize = 90;

/// A positioned line of text on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PlacedLine {
    y: i64,
    text: String,
}

fn wrap(paragraph: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in paragraph.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            lines.push(word.drain(..width).collect());
        }
        let word: String = word.into_iter().collect();
        if word.is_empty() {
            continue;
        }

        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// One paragraph per non-blank line, wrapped and spread over as many pages as needed.
fn layout_pages(text: &str) -> Vec<Vec<PlacedLine>> {
    let top = PAGE_HEIGHT - MARGIN;
    let mut pages = Vec::new();
    let mut current = Vec::new();
    let mut y = top;

    for paragraph in text.split('\n').filter(|line| !line.trim().is_empty()) {
        for line in wrap(paragraph, WRAP_COLUMNS) {
            if y - LEADING < MARGIN {
                pages.push(std::mem::take(&mut current));
                y = top;
            }
            y -= LEADING;
            current.push(PlacedLine { y, text: line });
        }
        y -= PARAGRAPH_SPACING;
    }

    if !current.is_empty() || pages.is_empty() {
        pages.push(current);
    }
    pages
}

/// Latin-1 bytes for the standard Type1 font; anything else becomes '?'.
fn encode_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

fn write_pdf(text: &str, path: &Path) -> Result<(), OutputError> {
    let encode = |e: lopdf::Error| OutputError::Encode(e.to_string());

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for page in layout_pages(text) {
        let mut operations = Vec::with_capacity(page.len() * 5);
        for line in page {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]));
            operations.push(Operation::new("Td", vec![MARGIN.into(), line.y.into()]));
            operations.push(Operation::new(
                "Tj",
                vec![Object::String(encode_latin1(&line.text), StringFormat::Literal)],
            ));
            operations.push(Operation::new("ET", vec![]));
        }

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().map_err(encode)?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "Resources" => resources_id,
        "MediaBox" => vec![0_i64.into(), 0_i64.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();
    doc.save(path)?;
    Ok(())
}

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use docx_rs::{DocumentChild, ParagraphChild, RunChild};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Something plain text can be pulled out of.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn load(&self) -> Result<String>;
}

/// Which handler a source reference is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Web,
    Pdf,
    WordProcessor,
    Spreadsheet,
    PlainText,
}

impl SourceKind {
    /// Classify a reference by scheme first, then by file extension.
    pub fn classify(reference: &str) -> Self {
        let lowered = reference.to_ascii_lowercase();
        if lowered.starts_with("http://") || lowered.starts_with("https://") {
            return SourceKind::Web;
        }

        let extension = Path::new(reference)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("pdf") => SourceKind::Pdf,
            Some("docx") => SourceKind::WordProcessor,
            Some("csv") => SourceKind::Spreadsheet,
            _ => SourceKind::PlainText,
        }
    }
}

pub struct UrlSource {
    url: Url,
    client: Client,
    timeout: Duration,
}

impl UrlSource {
    pub fn new(url: &str, client: Client, timeout: Duration) -> Result<Self> {
        Ok(Self {
            url: Url::parse(url)?,
            client,
            timeout,
        })
    }
}

#[async_trait]
impl DataSource for UrlSource {
    async fn load(&self) -> Result<String> {
        let response = self
            .client
            .get(self.url.as_str())
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }
}

pub struct PdfSource {
    path: PathBuf,
}

impl PdfSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_owned(),
        }
    }
}

#[async_trait]
impl DataSource for PdfSource {
    async fn load(&self) -> Result<String> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Cannot read '{}'", self.path.display()))?;
        let document = lopdf::Document::load_mem(&bytes)
            .with_context(|| format!("Cannot open PDF '{}'", self.path.display()))?;

        let pages: Vec<String> = document
            .get_pages()
            .keys()
            .map(|&number| match document.extract_text(&[number]) {
                Ok(text) => text,
                Err(e) => {
                    tracing::debug!(page = number, error = %e, "No extractable text on page");
                    String::new()
                }
            })
            .collect();

        Ok(pages.join("\n"))
    }
}

pub struct DocxSource {
    path: PathBuf,
}

impl DocxSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_owned(),
        }
    }
}

#[async_trait]
impl DataSource for DocxSource {
    async fn load(&self) -> Result<String> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Cannot read '{}'", self.path.display()))?;
        let docx = docx_rs::read_docx(&bytes)
            .map_err(|e| anyhow!("Cannot parse DOCX '{}': {:?}", self.path.display(), e))?;

        let paragraphs: Vec<String> = docx
            .document
            .children
            .iter()
            .filter_map(|child| match child {
                DocumentChild::Paragraph(paragraph) => Some(paragraph_text(paragraph)),
                _ => None,
            })
            .collect();

        Ok(paragraphs.join("\n"))
    }
}

fn paragraph_text(paragraph: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    for child in &paragraph.children {
        if let ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                if let RunChild::Text(t) = run_child {
                    text.push_str(&t.text);
                }
            }
        }
    }
    text
}

/// Plain text and CSV files, decoded lossily as UTF-8.
pub struct TextSource {
    path: PathBuf,
}

impl TextSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_owned(),
        }
    }
}

#[async_trait]
impl DataSource for TextSource {
    async fn load(&self) -> Result<String> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Cannot read '{}'", self.path.display()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Result of loading one source reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(String),
    Empty,
    Failed(String),
}

impl LoadOutcome {
    /// The loaded text; empty for `Empty` and `Failed`.
    pub fn text(&self) -> &str {
        match self {
            LoadOutcome::Loaded(text) => text,
            LoadOutcome::Empty | LoadOutcome::Failed(_) => "",
        }
    }
}

pub struct SourceLoader {
    client: Client,
    timeout: Duration,
}

impl SourceLoader {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Pick the handler for a reference.
    pub fn open(&self, reference: &str) -> Result<Box<dyn DataSource>> {
        let source: Box<dyn DataSource> = match SourceKind::classify(reference) {
            SourceKind::Web => Box::new(UrlSource::new(
                reference,
                self.client.clone(),
                self.timeout,
            )?),
            SourceKind::Pdf => Box::new(PdfSource::new(reference)),
            SourceKind::WordProcessor => Box::new(DocxSource::new(reference)),
            SourceKind::Spreadsheet | SourceKind::PlainText => Box::new(TextSource::new(reference)),
        };
        Ok(source)
    }

    /// Load a reference, never failing: errors are logged and reported in the outcome.
    pub async fn load(&self, reference: &str) -> LoadOutcome {
        let loaded = match self.open(reference) {
            Ok(source) => source.load().await,
            Err(e) => Err(e),
        };

        match loaded {
            Ok(text) if text.trim().is_empty() => LoadOutcome::Empty,
            Ok(text) => LoadOutcome::Loaded(text),
            Err(e) => {
                tracing::warn!(source = reference, error = %format!("{:#}", e), "Could not load source");
                LoadOutcome::Failed(format!("{:#}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, MockServer};
    use std::fs;

    fn loader() -> SourceLoader {
        SourceLoader::new(Client::new(), Duration::from_secs(5))
    }

    #[test]
    fn test_classify() {
        assert_eq!(SourceKind::classify("https://example.com/a.pdf"), SourceKind::Web);
        assert_eq!(SourceKind::classify("HTTP://example.com"), SourceKind::Web);
        assert_eq!(SourceKind::classify("report.pdf"), SourceKind::Pdf);
        assert_eq!(SourceKind::classify("Report.PDF"), SourceKind::Pdf);
        assert_eq!(SourceKind::classify("notes/letter.docx"), SourceKind::WordProcessor);
        assert_eq!(SourceKind::classify("table.csv"), SourceKind::Spreadsheet);
        assert_eq!(SourceKind::classify("notes.txt"), SourceKind::PlainText);
        assert_eq!(SourceKind::classify("README"), SourceKind::PlainText);
        assert_eq!(SourceKind::classify("ftp://example.com/a.txt"), SourceKind::PlainText);
    }

    #[tokio::test]
    async fn test_text_file_is_decoded_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"Hello \xff world").unwrap();

        let outcome = loader().load(path.to_str().unwrap()).await;
        assert_eq!(outcome, LoadOutcome::Loaded("Hello \u{fffd} world".to_string()));
    }

    #[tokio::test]
    async fn test_csv_is_read_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");
        fs::write(&path, "name,age\nada,36\n").unwrap();

        let outcome = loader().load(path.to_str().unwrap()).await;
        assert_eq!(outcome.text(), "name,age\nada,36\n");
    }

    #[tokio::test]
    async fn test_blank_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.txt");
        fs::write(&path, "  \n\t\n").unwrap();

        let outcome = loader().load(path.to_str().unwrap()).await;
        assert_eq!(outcome, LoadOutcome::Empty);
        assert_eq!(outcome.text(), "");
    }

    #[tokio::test]
    async fn test_missing_files_fail_softly() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["missing.pdf", "missing.docx", "missing.txt"] {
            let path = dir.path().join(name);
            let outcome = loader().load(path.to_str().unwrap()).await;
            assert!(matches!(outcome, LoadOutcome::Failed(_)), "{name} should fail");
            assert_eq!(outcome.text(), "");
        }
    }

    #[tokio::test]
    async fn test_corrupt_pdf_fails_softly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        fs::write(&path, "definitely not a pdf").unwrap();

        let outcome = loader().load(path.to_str().unwrap()).await;
        assert!(matches!(outcome, LoadOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_pdf_text_is_extracted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answer.pdf");
        crate::output::write_output("First paragraph\nSecond paragraph", &path).unwrap();

        let outcome = loader().load(path.to_str().unwrap()).await;
        assert!(matches!(outcome, LoadOutcome::Loaded(_)), "{outcome:?}");
        assert!(outcome.text().contains("Second paragraph"));
    }

    #[tokio::test]
    async fn test_docx_paragraphs_are_joined() {
        use docx_rs::{Docx, Paragraph, Run};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("letter.docx");
        let file = fs::File::create(&path).unwrap();
        Docx::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("First paragraph")))
            .add_paragraph(
                Paragraph::new()
                    .add_run(Run::new().add_text("Second "))
                    .add_run(Run::new().add_text("paragraph")),
            )
            .build()
            .pack(file)
            .unwrap();

        let outcome = loader().load(path.to_str().unwrap()).await;
        assert_eq!(outcome.text(), "First paragraph\nSecond paragraph");
    }

    #[tokio::test]
    async fn test_url_source_fetches_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/article");
                then.status(200).body("Remote article text");
            })
            .await;

        let outcome = loader().load(&server.url("/article")).await;
        assert_eq!(outcome, LoadOutcome::Loaded("Remote article text".to_string()));
    }

    #[tokio::test]
    async fn test_url_source_rejects_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/gone");
                then.status(404).body("not here");
            })
            .await;

        let outcome = loader().load(&server.url("/gone")).await;
        assert!(matches!(outcome, LoadOutcome::Failed(_)));
    }
}

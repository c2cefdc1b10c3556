use std::sync::Arc;
use thiserror::Error;

use crate::datasource::{LoadOutcome, SourceLoader};
use crate::external::{ChatClient, ChatMessage, ChatRequest};

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant.";
pub const MAP_QUESTION: &str = "Summarize this file in detail.";
pub const DEFAULT_QUESTION: &str = "Summarize the content";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PipelineError {
    #[error("No usable summaries produced")]
    NoUsableInput,
}

/// Result of one summarization call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Answered(String),
    /// The call failed; carries the error message and reads as empty text.
    Degraded(String),
}

impl CallOutcome {
    pub fn text(&self) -> &str {
        match self {
            CallOutcome::Answered(text) => text,
            CallOutcome::Degraded(_) => "",
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, CallOutcome::Degraded(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRecord {
    pub source: String,
    pub summary: String,
}

impl SummaryRecord {
    /// Rendering fed to the reduce call.
    pub fn labeled(&self) -> String {
        format!("--- Summary of {} ---\n{}\n", self.source, self.summary)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    Summarized {
        original_chars: usize,
        truncated: bool,
        degraded: bool,
    },
    Empty,
    LoadFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub source: String,
    pub status: SourceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub sources: Vec<SourceReport>,
    pub records: Vec<SummaryRecord>,
    pub answer: CallOutcome,
}

pub fn build_prompt(context: &str, question: &str) -> String {
    format!("Context:\n{}\n\nQuestion: {}\nAnswer:", context, question)
}

/// Keep at most `budget` characters from the start of `text`.
///
/// Returns the kept text and, when something was cut, the original length in characters.
pub fn truncate_chars(text: &str, budget: usize) -> (String, Option<usize>) {
    match text.char_indices().nth(budget) {
        Some((cut, _)) => (text[..cut].to_string(), Some(text.chars().count())),
        None => (text.to_string(), None),
    }
}

/// Ask the model a question about a context, degrading to empty text on failure.
pub async fn summarize_text(
    client: &dyn ChatClient,
    model: &str,
    context: &str,
    question: &str,
) -> CallOutcome {
    let request = ChatRequest::new(
        model,
        vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_prompt(context, question)),
        ],
    );

    match client.complete(&request).await {
        Ok(text) => CallOutcome::Answered(text.trim().to_string()),
        Err(e) => {
            tracing::error!(error = %e, "Error during summarization");
            CallOutcome::Degraded(e.to_string())
        }
    }
}

/// Summarizes each source on its own, then folds the summaries into one answer.
pub struct MapReduceSummarizer {
    client: Arc<dyn ChatClient>,
    loader: SourceLoader,
    model: String,
    max_chars: usize,
}

impl MapReduceSummarizer {
    pub fn new(
        client: Arc<dyn ChatClient>,
        loader: SourceLoader,
        model: impl Into<String>,
        max_chars: usize,
    ) -> Self {
        Self {
            client,
            loader,
            model: model.into(),
            max_chars,
        }
    }

    /// Summarize every source in order. Sources that fail to load or are blank are skipped.
    pub async fn map(&self, sources: &[String]) -> (Vec<SourceReport>, Vec<SummaryRecord>) {
        let mut reports = Vec::with_capacity(sources.len());
        let mut records = Vec::new();

        for source in sources {
            tracing::info!(source = %source, "Processing source");

            let text = match self.loader.load(source).await {
                LoadOutcome::Loaded(text) => text,
                LoadOutcome::Empty => {
                    tracing::warn!(source = %source, "No text found, skipping");
                    reports.push(SourceReport {
                        source: source.clone(),
                        status: SourceStatus::Empty,
                    });
                    continue;
                }
                LoadOutcome::Failed(error) => {
                    tracing::warn!(source = %source, error = %error, "Could not load source, skipping");
                    reports.push(SourceReport {
                        source: source.clone(),
                        status: SourceStatus::LoadFailed(error),
                    });
                    continue;
                }
            };

            let (text, cut_from) = truncate_chars(&text, self.max_chars);
            if let Some(original) = cut_from {
                tracing::warn!(
                    source = %source,
                    chars = original,
                    budget = self.max_chars,
                    "Source too long, truncating"
                );
            }

            let outcome =
                summarize_text(self.client.as_ref(), &self.model, &text, MAP_QUESTION).await;

            reports.push(SourceReport {
                source: source.clone(),
                status: SourceStatus::Summarized {
                    original_chars: cut_from.unwrap_or_else(|| text.chars().count()),
                    truncated: cut_from.is_some(),
                    degraded: outcome.is_degraded(),
                },
            });
            records.push(SummaryRecord {
                source: source.clone(),
                summary: outcome.text().to_string(),
            });
        }

        (reports, records)
    }

    /// Combine the labeled summaries and answer the query (or summarize) in one call.
    pub async fn reduce(&self, records: &[SummaryRecord], query: Option<&str>) -> CallOutcome {
        let combined = records
            .iter()
            .map(SummaryRecord::labeled)
            .collect::<Vec<_>>()
            .join("\n");
        let question = query.unwrap_or(DEFAULT_QUESTION);
        summarize_text(self.client.as_ref(), &self.model, &combined, question).await
    }

    pub async fn run(
        &self,
        sources: &[String],
        query: Option<&str>,
    ) -> Result<RunReport, PipelineError> {
        let (reports, records) = self.map(sources).await;
        if records.is_empty() {
            return Err(PipelineError::NoUsableInput);
        }

        tracing::info!(summaries = records.len(), "Combining summaries");
        let answer = self.reduce(&records, query).await;

        Ok(RunReport {
            sources: reports,
            records,
            answer,
        })
    }
}

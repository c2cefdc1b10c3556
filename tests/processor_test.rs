use async_trait::async_trait;
use mockall::mock;
use mockall::predicate;
use promptkit::datasource::SourceLoader;
use promptkit::external::{ChatClient, ChatRequest, ExternalError};
use promptkit::processor::{
    CallOutcome, MapReduceSummarizer, PipelineError, SourceStatus, DEFAULT_QUESTION, MAP_QUESTION,
    SYSTEM_PROMPT,
};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

mock! {
    pub Chat {}

    #[async_trait]
    impl ChatClient for Chat {
        async fn complete(&self, request: &ChatRequest) -> Result<String, ExternalError>;
    }
}

fn is_map_call(request: &ChatRequest) -> bool {
    request
        .user_text()
        .ends_with(&format!("Question: {}\nAnswer:", MAP_QUESTION))
}

fn is_reduce_call(request: &ChatRequest) -> bool {
    !is_map_call(request)
}

/// Pull the context back out of a `Context:/Question:` prompt.
fn context_of(request: &ChatRequest) -> String {
    let prompt = request.user_text();
    let body = prompt.strip_prefix("Context:\n").unwrap();
    let end = body.rfind("\n\nQuestion: ").unwrap();
    body[..end].to_string()
}

fn summarizer(mock: MockChat, max_chars: usize) -> MapReduceSummarizer {
    let loader = SourceLoader::new(reqwest::Client::new(), Duration::from_secs(5));
    MapReduceSummarizer::new(Arc::new(mock), loader, "gpt-4o-mini", max_chars)
}

fn write_source(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path.to_str().unwrap().to_string()
}

#[tokio::test]
async fn test_one_record_per_non_empty_source() {
    let temp = tempfile::tempdir().unwrap();
    let sources = vec![
        write_source(temp.path(), "a.txt", "Alpha document"),
        write_source(temp.path(), "blank.txt", "   \n"),
        write_source(temp.path(), "b.csv", "name,score\nada,10"),
    ];

    let mut mock = MockChat::new();
    mock.expect_complete()
        .with(predicate::function(is_map_call))
        .times(2)
        .returning(|r| Ok(format!("summary of {}", context_of(r).len())));
    mock.expect_complete()
        .with(predicate::function(is_reduce_call))
        .times(1)
        .returning(|_| Ok("final".to_string()));

    let report = summarizer(mock, 12_000).run(&sources, None).await.unwrap();

    assert_eq!(report.records.len(), 2);
    assert_eq!(report.records[0].source, sources[0]);
    assert_eq!(report.records[1].source, sources[2]);
    assert_eq!(report.sources.len(), 3);
    assert_eq!(report.sources[1].status, SourceStatus::Empty);
    assert_eq!(report.answer, CallOutcome::Answered("final".to_string()));
}

#[tokio::test]
async fn test_long_source_is_truncated_to_budget() {
    let temp = tempfile::tempdir().unwrap();
    let original: String = (0..12_500u32)
        .map(|i| char::from(b'a' + (i % 26) as u8))
        .collect();
    let sources = vec![write_source(temp.path(), "long.txt", &original)];

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in_mock = Arc::clone(&seen);

    let mut mock = MockChat::new();
    mock.expect_complete()
        .with(predicate::function(is_map_call))
        .times(1)
        .returning(move |r| {
            seen_in_mock.lock().unwrap().push(context_of(r));
            Ok("summary".to_string())
        });
    mock.expect_complete()
        .with(predicate::function(is_reduce_call))
        .times(1)
        .returning(|_| Ok("final".to_string()));

    let report = summarizer(mock, 12_000).run(&sources, None).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].chars().count(), 12_000);
    assert_eq!(seen[0], original[..12_000]);
    assert_eq!(
        report.sources[0].status,
        SourceStatus::Summarized {
            original_chars: 12_500,
            truncated: true,
            degraded: false,
        }
    );
}

#[tokio::test]
async fn test_no_sources_is_fatal() {
    let mut mock = MockChat::new();
    mock.expect_complete().times(0);

    let result = summarizer(mock, 12_000).run(&[], None).await;
    assert_eq!(result.unwrap_err(), PipelineError::NoUsableInput);
}

#[tokio::test]
async fn test_all_empty_sources_is_fatal() {
    let temp = tempfile::tempdir().unwrap();
    let sources = vec![
        write_source(temp.path(), "blank.txt", ""),
        temp.path().join("missing.docx").to_str().unwrap().to_string(),
    ];

    let mut mock = MockChat::new();
    mock.expect_complete().times(0);

    let result = summarizer(mock, 12_000).run(&sources, Some("anything?")).await;
    assert_eq!(result.unwrap_err(), PipelineError::NoUsableInput);
}

#[tokio::test]
async fn test_reduce_runs_exactly_once() {
    for count in [1usize, 5, 50] {
        let temp = tempfile::tempdir().unwrap();
        let sources: Vec<String> = (0..count)
            .map(|i| write_source(temp.path(), &format!("doc{i}.txt"), &format!("document {i}")))
            .collect();

        let mut mock = MockChat::new();
        mock.expect_complete()
            .with(predicate::function(is_map_call))
            .times(count)
            .returning(|_| Ok("summary".to_string()));
        mock.expect_complete()
            .with(predicate::function(is_reduce_call))
            .times(1)
            .returning(|_| Ok("final".to_string()));

        let report = summarizer(mock, 12_000).run(&sources, None).await.unwrap();
        assert_eq!(report.records.len(), count);
    }
}

#[tokio::test]
async fn test_text_file_and_missing_pdf() {
    let temp = tempfile::tempdir().unwrap();
    let a = write_source(temp.path(), "a.txt", "Hello world");
    let missing = temp.path().join("missing.pdf").to_str().unwrap().to_string();
    let sources = vec![a.clone(), missing.clone()];

    let mut mock = MockChat::new();
    mock.expect_complete()
        .with(predicate::function(|r: &ChatRequest| {
            is_map_call(r) && context_of(r) == "Hello world"
        }))
        .times(1)
        .returning(|_| Ok("A greeting.".to_string()));
    mock.expect_complete()
        .with(predicate::function(|r: &ChatRequest| {
            is_reduce_call(r) && r.messages[0].text() == SYSTEM_PROMPT
        }))
        .times(1)
        .returning(|r| {
            let expected_question = format!("Question: {}\nAnswer:", DEFAULT_QUESTION);
            assert!(r.user_text().ends_with(&expected_question));
            Ok("The file greets the world.".to_string())
        });

    let report = summarizer(mock, 12_000).run(&sources, None).await.unwrap();

    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].source, a);
    assert_eq!(report.records[0].summary, "A greeting.");
    match &report.sources[1].status {
        SourceStatus::LoadFailed(error) => assert!(error.contains("missing.pdf"), "{error}"),
        other => panic!("expected a load failure, got {other:?}"),
    }
    assert_eq!(report.answer.text(), "The file greets the world.");
}

#[tokio::test]
async fn test_reduce_receives_labeled_summaries_and_query() {
    let temp = tempfile::tempdir().unwrap();
    let sources = vec![
        write_source(temp.path(), "one.txt", "first"),
        write_source(temp.path(), "two.txt", "second"),
    ];
    let expected_context = format!(
        "--- Summary of {} ---\nS-first\n\n--- Summary of {} ---\nS-second\n",
        sources[0], sources[1]
    );

    let mut mock = MockChat::new();
    mock.expect_complete()
        .with(predicate::function(is_map_call))
        .times(2)
        .returning(|r| Ok(format!("S-{}", context_of(r))));
    mock.expect_complete()
        .with(predicate::function(move |r: &ChatRequest| {
            is_reduce_call(r)
                && context_of(r) == expected_context
                && r.user_text().ends_with("Question: Which is first?\nAnswer:")
        }))
        .times(1)
        .returning(|_| Ok("one.txt".to_string()));

    let report = summarizer(mock, 12_000)
        .run(&sources, Some("Which is first?"))
        .await
        .unwrap();
    assert_eq!(report.answer.text(), "one.txt");
}

#[tokio::test]
async fn test_failed_calls_degrade_to_empty_text() {
    let temp = tempfile::tempdir().unwrap();
    let sources = vec![write_source(temp.path(), "a.txt", "content")];

    let mut mock = MockChat::new();
    mock.expect_complete()
        .times(2)
        .returning(|_| Err(ExternalError::ConnectionError("offline".to_string())));

    let report = summarizer(mock, 12_000).run(&sources, None).await.unwrap();

    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].summary, "");
    assert_eq!(
        report.sources[0].status,
        SourceStatus::Summarized {
            original_chars: 7,
            truncated: false,
            degraded: true,
        }
    );
    assert!(report.answer.is_degraded());
    assert_eq!(report.answer.text(), "");
}

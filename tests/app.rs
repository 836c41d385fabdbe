use std::sync::Mutex;
use std::time::Duration;

use assert_matches::assert_matches;

use kira_geo_explorer::app::{App, FetchStatus, ProgressEvent, ProgressSink};
use kira_geo_explorer::batch::BatchOptions;
use kira_geo_explorer::domain::{MetadataMap, MetadataRecord, RecordId, SearchQuery, SearchResult};
use kira_geo_explorer::error::KiraError;
use kira_geo_explorer::eutils::EutilsClient;
use kira_geo_explorer::extract::RuleSet;

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

struct MockEutils {
    search: Result<Vec<&'static str>, u16>,
    failing_call: Option<usize>,
    summary_calls: Mutex<Vec<Vec<String>>>,
}

impl MockEutils {
    fn new(ids: Vec<&'static str>) -> Self {
        Self {
            search: Ok(ids),
            failing_call: None,
            summary_calls: Mutex::new(Vec::new()),
        }
    }
}

impl EutilsClient for MockEutils {
    fn search(&self, _query: &SearchQuery) -> Result<SearchResult, KiraError> {
        match &self.search {
            Ok(ids) => Ok(SearchResult {
                ids: ids.iter().map(|id| id.parse().unwrap()).collect(),
                total_count: ids.len() as u64,
            }),
            Err(status) => Err(KiraError::EutilsStatus {
                status: *status,
                message: "Service Unavailable".to_string(),
            }),
        }
    }

    fn summary(&self, ids: &[RecordId]) -> Result<MetadataMap, KiraError> {
        let mut calls = self.summary_calls.lock().unwrap();
        calls.push(ids.iter().map(|id| id.as_str().to_string()).collect());
        if Some(calls.len()) == self.failing_call {
            return Err(KiraError::EutilsStatus {
                status: 500,
                message: "Internal Server Error".to_string(),
            });
        }
        Ok(ids
            .iter()
            .map(|id| {
                let mut record = MetadataRecord::new(id.clone());
                record.uid = Some(id.as_str().to_string());
                record.title = Some(format!("Dataset {id}"));
                record.summary = Some(format!("A single-cell study with {id}00 cells"));
                record.taxon = vec!["Homo sapiens".to_string()];
                record
            })
            .collect())
    }
}

fn app(client: MockEutils, chunk_size: usize) -> App<MockEutils> {
    App::new(
        client,
        BatchOptions::new(chunk_size, Duration::ZERO).unwrap(),
        RuleSet::standard(),
    )
}

#[test]
fn failed_second_chunk_leaves_rows_from_first_chunk() {
    let mut client = MockEutils::new(vec!["1", "2", "3"]);
    client.failing_call = Some(2);
    let app = app(client, 2);
    let sink = RecordingSink::default();

    let result = app.fetch(&SearchQuery::default(), &sink).unwrap();

    let ids = result
        .table
        .rows()
        .iter()
        .map(|row| row.dataset_id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["1", "2"]);
    assert_eq!(result.status, FetchStatus::Partial);
    assert_eq!(result.total_count, 3);
    assert_eq!(result.chunks_requested, 2);
    assert_eq!(result.failed_chunks.len(), 1);
    assert_eq!(result.failed_chunks[0].ids.len(), 1);
    assert_eq!(result.table.value(&result.table.rows()[1], "Cell Count").unwrap(), "200");

    let messages = sink.messages.lock().unwrap();
    assert!(messages.iter().any(|message| message.contains("skipped")));
}

#[test]
fn chunk_requests_follow_search_order() {
    let app = app(MockEutils::new(vec!["1", "2", "3"]), 2);
    let result = app.fetch(&SearchQuery::default(), &RecordingSink::default()).unwrap();
    assert_eq!(result.status, FetchStatus::Complete);
    assert_eq!(result.rows(), 3);
}

#[test]
fn search_failure_aborts_without_metadata_requests() {
    let client = MockEutils {
        search: Err(503),
        failing_call: None,
        summary_calls: Mutex::new(Vec::new()),
    };
    let app = app(client, 2);
    let err = app
        .fetch(&SearchQuery::default(), &RecordingSink::default())
        .unwrap_err();
    assert_matches!(err, KiraError::EutilsStatus { status: 503, .. });
}

#[test]
fn empty_search_reports_no_matches() {
    let app = app(MockEutils::new(Vec::new()), 2);
    let result = app.fetch(&SearchQuery::default(), &RecordingSink::default()).unwrap();
    assert_eq!(result.status, FetchStatus::NoMatches);
    assert!(result.table.is_empty());
}

#[test]
fn all_chunks_failing_reports_nothing_processed() {
    let mut client = MockEutils::new(vec!["1"]);
    client.failing_call = Some(1);
    let app = app(client, 2);
    let result = app.fetch(&SearchQuery::default(), &RecordingSink::default()).unwrap();
    assert_eq!(result.status, FetchStatus::NothingProcessed);
}

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use kira_geo_explorer::batch::{BatchOptions, ChunkOutcome, fetch_batched, fetch_chunk};
use kira_geo_explorer::domain::{MetadataMap, MetadataRecord, RecordId, SearchQuery, SearchResult};
use kira_geo_explorer::error::KiraError;
use kira_geo_explorer::eutils::EutilsClient;
use kira_geo_explorer::output::JsonOutput;

/// Fails any chunk containing a poisoned id, omits ids it does not know.
#[derive(Default)]
struct ScriptedEutils {
    poisoned: HashSet<String>,
    unknown: HashSet<String>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl EutilsClient for ScriptedEutils {
    fn search(&self, _query: &SearchQuery) -> Result<SearchResult, KiraError> {
        Err(KiraError::EutilsHttp("not used".to_string()))
    }

    fn summary(&self, ids: &[RecordId]) -> Result<MetadataMap, KiraError> {
        self.calls
            .lock()
            .unwrap()
            .push(ids.iter().map(|id| id.as_str().to_string()).collect());
        if ids.iter().any(|id| self.poisoned.contains(id.as_str())) {
            return Err(KiraError::EutilsStatus {
                status: 429,
                message: "API rate limit exceeded".to_string(),
            });
        }
        Ok(ids
            .iter()
            .filter(|id| !self.unknown.contains(id.as_str()))
            .map(|id| MetadataRecord::new(id.clone()))
            .collect())
    }
}

fn ids(count: usize) -> Vec<RecordId> {
    (1..=count).map(|n| n.to_string().parse().unwrap()).collect()
}

fn options(chunk_size: usize) -> BatchOptions {
    BatchOptions::new(chunk_size, Duration::ZERO).unwrap()
}

#[test]
fn merged_map_has_each_id_of_successful_chunks_once() {
    for count in [0usize, 1, 5, 12] {
        for chunk_size in 1..=6 {
            let list = ids(count);
            let client = ScriptedEutils {
                poisoned: ["4".to_string(), "11".to_string()].into_iter().collect(),
                ..Default::default()
            };
            let report = fetch_batched(&client, &list, options(chunk_size), &JsonOutput);

            let calls = client.calls.lock().unwrap().clone();
            assert_eq!(calls.len(), count.div_ceil(chunk_size));
            assert!(calls.iter().all(|call| call.len() <= chunk_size));

            let expected = calls
                .iter()
                .filter(|call| !call.iter().any(|id| client.poisoned.contains(id)))
                .flatten()
                .cloned()
                .collect::<Vec<_>>();
            let merged = report
                .metadata
                .ids()
                .map(|id| id.as_str().to_string())
                .collect::<Vec<_>>();
            assert_eq!(merged, expected, "count={count} chunk_size={chunk_size}");

            for failure in &report.failures {
                for id in &failure.ids {
                    assert!(!report.metadata.contains(id));
                }
            }
            assert_eq!(report.skipped_ids() + merged.len(), count);
        }
    }
}

#[test]
fn unknown_ids_are_silently_absent() {
    let client = ScriptedEutils {
        unknown: ["2".to_string()].into_iter().collect(),
        ..Default::default()
    };
    let report = fetch_batched(&client, &ids(3), options(100), &JsonOutput);
    assert!(!report.is_partial());
    assert_eq!(report.metadata.len(), 2);
}

#[test]
fn fetch_chunk_reports_failure_reason() {
    let client = ScriptedEutils {
        poisoned: ["1".to_string()].into_iter().collect(),
        ..Default::default()
    };
    let outcome = fetch_chunk(&client, &ids(2));
    assert!(outcome.is_failed());
    match outcome {
        ChunkOutcome::Failed { ids, reason } => {
            assert_eq!(ids.len(), 2);
            assert!(reason.contains("429"));
        }
        ChunkOutcome::Fetched { .. } => panic!("expected failure"),
    }
}

#[test]
fn delay_is_only_inserted_between_chunks() {
    let client = ScriptedEutils::default();
    let started = std::time::Instant::now();
    let opts = BatchOptions::new(1, Duration::from_millis(30)).unwrap();
    fetch_batched(&client, &ids(3), opts, &JsonOutput);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(60));

    let started = std::time::Instant::now();
    fetch_batched(&client, &ids(1), opts, &JsonOutput);
    assert!(started.elapsed() < Duration::from_millis(30));
}

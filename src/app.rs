use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use crate::batch::{BatchOptions, ChunkFailure, fetch_batched};
use crate::domain::SearchQuery;
use crate::error::KiraError;
use crate::eutils::EutilsClient;
use crate::extract::RuleSet;
use crate::table::ResultTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Complete,
    Partial,
    NoMatches,
    NothingProcessed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub term: String,
    pub total_count: u64,
    pub returned_ids: usize,
    pub fetched_records: usize,
    pub chunks_requested: usize,
    pub failed_chunks: Vec<ChunkFailure>,
    pub status: FetchStatus,
    pub fetched_at: String,
    #[serde(skip)]
    pub table: ResultTable,
}

impl FetchResult {
    pub fn rows(&self) -> usize {
        self.table.len()
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Clone)]
pub struct App<E: EutilsClient> {
    client: E,
    batch: BatchOptions,
    rules: RuleSet,
}

impl<E: EutilsClient> App<E> {
    pub fn new(client: E, batch: BatchOptions, rules: RuleSet) -> Self {
        Self {
            client,
            batch,
            rules,
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Search, then batched esummary, then extraction. Only the search
    /// stage can fail the run.
    pub fn fetch(
        &self,
        query: &SearchQuery,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, KiraError> {
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Search; eutils.request esearch \"{}\"", query.term()),
            elapsed: None,
        });
        let search = self.client.search(query)?;
        info!(
            term = query.term(),
            total = search.total_count,
            returned = search.ids.len(),
            "search finished"
        );
        sink.event(ProgressEvent {
            message: format!(
                "found {} datasets in total, fetching up to {}",
                search.total_count,
                search.ids.len()
            ),
            elapsed: Some(started.elapsed()),
        });

        if search.is_empty() {
            return Ok(FetchResult {
                term: query.term().to_string(),
                total_count: search.total_count,
                returned_ids: 0,
                fetched_records: 0,
                chunks_requested: 0,
                failed_chunks: Vec::new(),
                status: FetchStatus::NoMatches,
                fetched_at: iso_timestamp(),
                table: ResultTable::new(self.rules.columns()),
            });
        }

        let report = fetch_batched(&self.client, &search.ids, self.batch, sink);

        sink.event(ProgressEvent {
            message: format!("phase=Extract; applying {} rules", self.rules.rules.len()),
            elapsed: Some(started.elapsed()),
        });
        let table = self.rules.tabulate(&report.metadata);
        info!(
            records = report.metadata.len(),
            rows = table.len(),
            "extraction finished"
        );

        let status = if table.is_empty() {
            FetchStatus::NothingProcessed
        } else if report.is_partial() {
            FetchStatus::Partial
        } else {
            FetchStatus::Complete
        };
        sink.event(ProgressEvent {
            message: format!("phase=Done; {} datasets processed", table.len()),
            elapsed: Some(started.elapsed()),
        });

        Ok(FetchResult {
            term: query.term().to_string(),
            total_count: search.total_count,
            returned_ids: search.ids.len(),
            fetched_records: report.metadata.len(),
            chunks_requested: report.chunks_requested,
            failed_chunks: report.failures,
            status,
            fetched_at: iso_timestamp(),
            table,
        })
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{MetadataMap, RecordId};
use crate::error::KiraError;
use crate::eutils::EutilsClient;

pub const DEFAULT_CHUNK_SIZE: usize = 100;
pub const MAX_CHUNK_SIZE: usize = 500;
pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    chunk_size: usize,
    pub delay: Duration,
}

impl BatchOptions {
    pub fn new(chunk_size: usize, delay: Duration) -> Result<Self, KiraError> {
        if !(1..=MAX_CHUNK_SIZE).contains(&chunk_size) {
            return Err(KiraError::InvalidChunkSize(chunk_size));
        }
        Ok(Self { chunk_size, delay })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            delay: DEFAULT_DELAY,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ChunkOutcome {
    Fetched { ids: Vec<RecordId>, records: MetadataMap },
    Failed { ids: Vec<RecordId>, reason: String },
}

impl ChunkOutcome {
    pub fn ids(&self) -> &[RecordId] {
        match self {
            ChunkOutcome::Fetched { ids, .. } | ChunkOutcome::Failed { ids, .. } => ids,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ChunkOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkFailure {
    pub index: usize,
    pub ids: Vec<RecordId>,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub metadata: MetadataMap,
    pub chunks_requested: usize,
    pub failures: Vec<ChunkFailure>,
}

impl BatchReport {
    pub fn from_outcomes(outcomes: Vec<ChunkOutcome>) -> Self {
        let mut report = BatchReport {
            chunks_requested: outcomes.len(),
            ..Default::default()
        };
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                ChunkOutcome::Fetched { records, .. } => {
                    report.metadata.merge(records);
                }
                ChunkOutcome::Failed { ids, reason } => {
                    report.failures.push(ChunkFailure { index, ids, reason });
                }
            }
        }
        report
    }

    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn skipped_ids(&self) -> usize {
        self.failures.iter().map(|failure| failure.ids.len()).sum()
    }
}

pub fn partition(ids: &[RecordId], chunk_size: usize) -> Vec<&[RecordId]> {
    ids.chunks(chunk_size.max(1)).collect()
}

pub fn fetch_chunk<E: EutilsClient + ?Sized>(client: &E, ids: &[RecordId]) -> ChunkOutcome {
    match client.summary(ids) {
        Ok(records) => ChunkOutcome::Fetched {
            ids: ids.to_vec(),
            records,
        },
        Err(err) => ChunkOutcome::Failed {
            ids: ids.to_vec(),
            reason: err.to_string(),
        },
    }
}

/// Requests esummary one chunk at a time. A failed chunk is reported and
/// skipped; it never aborts the batch and is never retried.
pub fn fetch_batched<E: EutilsClient + ?Sized>(
    client: &E,
    ids: &[RecordId],
    options: BatchOptions,
    sink: &dyn ProgressSink,
) -> BatchReport {
    let chunks = partition(ids, options.chunk_size());
    let total = chunks.len();
    let mut outcomes = Vec::with_capacity(total);

    for (index, chunk) in chunks.into_iter().enumerate() {
        if index > 0 && !options.delay.is_zero() {
            thread::sleep(options.delay);
        }
        sink.event(ProgressEvent {
            message: format!(
                "phase=Fetch; eutils.request chunk {}/{} ({} ids)",
                index + 1,
                total,
                chunk.len()
            ),
            elapsed: None,
        });
        let outcome = fetch_chunk(client, chunk);
        if let ChunkOutcome::Failed { reason, .. } = &outcome {
            warn!(chunk = index + 1, ids = chunk.len(), %reason, "skipping failed chunk");
            sink.event(ProgressEvent {
                message: format!("chunk {}/{} skipped: {reason}", index + 1, total),
                elapsed: None,
            });
        }
        outcomes.push(outcome);
    }

    let report = BatchReport::from_outcomes(outcomes);
    info!(
        chunks = report.chunks_requested,
        failed = report.failures.len(),
        records = report.metadata.len(),
        "metadata fetch finished"
    );
    report
}

use chrono::{DateTime, Utc};

use crate::domain::SearchQuery;
use crate::error::KiraError;
use crate::table::{ResultTable, TableFilter};

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub query: SearchQuery,
    pub fetched_at: DateTime<Utc>,
    pub table: ResultTable,
}

#[derive(Debug, Default)]
pub struct SessionTable {
    current: Option<Snapshot>,
    generation: u64,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, query: SearchQuery, table: ResultTable) -> &Snapshot {
        self.generation = self.generation.wrapping_add(1);
        self.current.insert(Snapshot {
            query,
            fetched_at: Utc::now(),
            table,
        })
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.current.as_ref()
    }

    pub fn table(&self) -> Option<&ResultTable> {
        self.current.as_ref().map(|snapshot| &snapshot.table)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn view(&self, filter: &TableFilter) -> Result<ResultTable, KiraError> {
        match self.table() {
            Some(table) => filter.apply(table),
            None => Ok(ResultTable::default()),
        }
    }
}

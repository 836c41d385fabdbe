use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KiraError;

pub const DEFAULT_TERM: &str = "single-cell RNA-seq";
pub const DEFAULT_RETMAX: u32 = 1000;
pub const RETMAX_MIN: u32 = 10;
pub const RETMAX_MAX: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchQuery {
    term: String,
    retmax: u32,
}

impl SearchQuery {
    pub fn new(term: impl Into<String>, retmax: u32) -> Result<Self, KiraError> {
        let term = term.into();
        let trimmed = term.trim();
        if trimmed.is_empty() {
            return Err(KiraError::InvalidQuery(term));
        }
        if !(RETMAX_MIN..=RETMAX_MAX).contains(&retmax) {
            return Err(KiraError::InvalidRetmax(retmax));
        }
        Ok(Self {
            term: trimmed.to_string(),
            retmax,
        })
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn retmax(&self) -> u32 {
        self.retmax
    }
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            term: DEFAULT_TERM.to_string(),
            retmax: DEFAULT_RETMAX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty()
            && !normalized.contains(',')
            && !normalized.chars().any(char::is_whitespace);
        if !is_valid {
            return Err(KiraError::InvalidRecordId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub ids: Vec<RecordId>,
    pub total_count: u64,
}

impl SearchResult {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataRecord {
    pub id: RecordId,
    pub uid: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub accession: Option<String>,
    pub taxon: Vec<String>,
}

impl MetadataRecord {
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            uid: None,
            title: None,
            summary: None,
            accession: None,
            taxon: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataMap {
    records: Vec<MetadataRecord>,
    #[serde(skip)]
    seen: HashSet<RecordId>,
}

impl MetadataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: MetadataRecord) -> bool {
        if !self.seen.insert(record.id.clone()) {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn merge(&mut self, other: MetadataMap) -> usize {
        other
            .records
            .into_iter()
            .filter(|record| self.insert(record.clone()))
            .count()
    }

    pub fn get(&self, id: &RecordId) -> Option<&MetadataRecord> {
        if !self.seen.contains(id) {
            return None;
        }
        self.records.iter().find(|record| &record.id == id)
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetadataRecord> {
        self.records.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &RecordId> {
        self.records.iter().map(|record| &record.id)
    }
}

impl FromIterator<MetadataRecord> for MetadataMap {
    fn from_iter<T: IntoIterator<Item = MetadataRecord>>(iter: T) -> Self {
        let mut map = MetadataMap::new();
        for record in iter {
            map.insert(record);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, title: &str) -> MetadataRecord {
        let mut record = MetadataRecord::new(id.parse().unwrap());
        record.title = Some(title.to_string());
        record
    }

    #[test]
    fn insert_keeps_first_entry_per_id() {
        let mut map = MetadataMap::new();
        assert!(map.insert(record("1", "first")));
        assert!(!map.insert(record("1", "second")));
        assert_eq!(map.len(), 1);
        let id: RecordId = "1".parse().unwrap();
        assert_eq!(map.get(&id).unwrap().title.as_deref(), Some("first"));
    }

    #[test]
    fn merge_preserves_order() {
        let mut left: MetadataMap = vec![record("3", "c"), record("1", "a")].into_iter().collect();
        let right: MetadataMap = vec![record("2", "b")].into_iter().collect();
        assert_eq!(left.merge(right), 1);
        let ids = left.ids().map(RecordId::as_str).collect::<Vec<_>>();
        assert_eq!(ids, vec!["3", "1", "2"]);
    }
}

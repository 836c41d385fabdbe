use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::KiraError;

pub const NOT_AVAILABLE: &str = "N/A";
pub const UNKNOWN: &str = "Unknown";

pub const COLUMN_ID: &str = "Dataset ID";
pub const COLUMN_ACCESSION: &str = "Accession";
pub const COLUMN_TITLE: &str = "Title";
pub const COLUMN_SPECIES: &str = "Species";
pub const COLUMN_SUMMARY: &str = "Summary";

/// A derived cell. `Unknown` is the explicit no-match sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Count(u64),
    Label(String),
    Unknown,
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Count(value) => write!(f, "{value}"),
            CellValue::Label(label) => write!(f, "{label}"),
            CellValue::Unknown => write!(f, "{UNKNOWN}"),
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetRow {
    pub dataset_id: String,
    pub accession: String,
    pub title: String,
    pub species: String,
    pub derived: Vec<CellValue>,
    pub summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultTable {
    derived_columns: Vec<String>,
    rows: Vec<DatasetRow>,
}

impl ResultTable {
    pub fn new(derived_columns: Vec<String>) -> Self {
        Self {
            derived_columns,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: DatasetRow) {
        debug_assert_eq!(row.derived.len(), self.derived_columns.len());
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[DatasetRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn derived_columns(&self) -> &[String] {
        &self.derived_columns
    }

    pub fn header(&self) -> Vec<String> {
        let mut header = vec![
            COLUMN_ID.to_string(),
            COLUMN_ACCESSION.to_string(),
            COLUMN_TITLE.to_string(),
            COLUMN_SPECIES.to_string(),
        ];
        header.extend(self.derived_columns.iter().cloned());
        header.push(COLUMN_SUMMARY.to_string());
        header
    }

    pub fn row_values(&self, row: &DatasetRow) -> Vec<String> {
        let mut values = vec![
            row.dataset_id.clone(),
            row.accession.clone(),
            row.title.clone(),
            row.species.clone(),
        ];
        values.extend(row.derived.iter().map(CellValue::to_string));
        values.push(row.summary.clone());
        values
    }

    pub fn value(&self, row: &DatasetRow, column: &str) -> Option<String> {
        let header = self.header();
        let index = header
            .iter()
            .position(|name| name.eq_ignore_ascii_case(column))?;
        self.row_values(row).into_iter().nth(index)
    }

    pub fn distinct_values(&self, column: &str) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| self.value(row, column))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn retain_rows(&self, keep: impl Fn(&DatasetRow) -> bool) -> ResultTable {
        ResultTable {
            derived_columns: self.derived_columns.clone(),
            rows: self.rows.iter().filter(|row| keep(row)).cloned().collect(),
        }
    }

    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), KiraError> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(self.header())
            .map_err(|err| KiraError::CsvWrite(err.to_string()))?;
        for row in &self.rows {
            csv.write_record(self.row_values(row))
                .map_err(|err| KiraError::CsvWrite(err.to_string()))?;
        }
        csv.flush()
            .map_err(|err| KiraError::CsvWrite(err.to_string()))?;
        Ok(())
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, KiraError> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        Ok(buffer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFilter {
    pub column: String,
    pub value: String,
}

impl FromStr for ColumnFilter {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let Some((column, expected)) = value.split_once('=') else {
            return Err(KiraError::InvalidFilter(value.to_string()));
        };
        let column = column.trim();
        if column.is_empty() {
            return Err(KiraError::InvalidFilter(value.to_string()));
        }
        Ok(Self {
            column: column.to_string(),
            value: expected.trim().to_string(),
        })
    }
}

impl fmt::Display for ColumnFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.column, self.value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableFilter {
    pub text: Option<String>,
    pub columns: Vec<ColumnFilter>,
}

impl TableFilter {
    pub fn is_empty(&self) -> bool {
        self.text.as_deref().is_none_or(|text| text.trim().is_empty()) && self.columns.is_empty()
    }

    pub fn set_column(&mut self, column: &str, value: Option<String>) {
        self.columns
            .retain(|filter| !filter.column.eq_ignore_ascii_case(column));
        if let Some(value) = value {
            self.columns.push(ColumnFilter {
                column: column.to_string(),
                value,
            });
        }
    }

    pub fn column_value(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|filter| filter.column.eq_ignore_ascii_case(column))
            .map(|filter| filter.value.as_str())
    }

    pub fn check_columns(&self, header: &[String]) -> Result<(), KiraError> {
        for filter in &self.columns {
            if !header
                .iter()
                .any(|name| name.eq_ignore_ascii_case(&filter.column))
            {
                return Err(KiraError::InvalidFilter(format!(
                    "unknown column {}",
                    filter.column
                )));
            }
        }
        Ok(())
    }

    pub fn apply(&self, table: &ResultTable) -> Result<ResultTable, KiraError> {
        self.check_columns(&table.header())?;
        let needle = self
            .text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_lowercase);

        Ok(table.retain_rows(|row| {
            if let Some(needle) = &needle {
                if !row.summary.to_lowercase().contains(needle.as_str()) {
                    return false;
                }
            }
            self.columns.iter().all(|filter| {
                table
                    .value(row, &filter.column)
                    .is_some_and(|value| value.eq_ignore_ascii_case(&filter.value))
            })
        }))
    }
}

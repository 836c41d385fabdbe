use std::fs::File;
use std::io::{self, Write};

use camino::Utf8Path;
use serde::Serialize;

use crate::app::{FetchResult, FetchStatus};
use crate::error::KiraError;
use crate::extract::{FieldRule, RuleSet};
use crate::table::ResultTable;

pub const DEFAULT_EXPORT_FILE: &str = "filtered_geo_datasets.csv";

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

#[derive(Debug, Serialize)]
struct FetchSummary<'a> {
    #[serde(flatten)]
    result: &'a FetchResult,
    rows: usize,
    filtered_rows: usize,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_fetch(result: &FetchResult, filtered_rows: usize) -> io::Result<()> {
        Self::print_json(&FetchSummary {
            result,
            rows: result.rows(),
            filtered_rows,
        })
    }

    pub fn print_rules(rules: &RuleSet) -> io::Result<()> {
        Self::print_json(&rules.to_config())
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl crate::app::ProgressSink for JsonOutput {
    fn event(&self, _event: crate::app::ProgressEvent) {}
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_rules(rules: &RuleSet) -> io::Result<()> {
        let mut stdout = io::stdout();
        stdout.write_all(rules_listing(rules).as_bytes())
    }
}

pub fn rules_listing(rules: &RuleSet) -> String {
    let keywords = rules.inclusion.keywords();
    let mut out = if keywords.is_empty() {
        "inclusion: all records\n".to_string()
    } else {
        format!("inclusion: {}\n", keywords.join(", "))
    };
    for rule in &rules.rules {
        let detail = match rule {
            FieldRule::Numeric {
                pattern, lowercase, ..
            } => {
                let case = if *lowercase { " (lowercased)" } else { "" };
                format!("numeric       /{}/{case}", pattern.as_str())
            }
            FieldRule::AnyKeyword {
                keywords,
                matched,
                unmatched,
                ..
            } => format!(
                "any_keyword   {} -> {matched} / {unmatched}",
                keywords.join(", ")
            ),
            FieldRule::Priority {
                tiers, fallback, ..
            } => {
                let tiers = tiers
                    .iter()
                    .map(|tier| format!("{} [{}]", tier.label, tier.keywords.join(", ")))
                    .collect::<Vec<_>>()
                    .join("; ");
                format!("priority      {tiers}; else {fallback}")
            }
            FieldRule::AllKeywords {
                keywords,
                matched,
                unmatched,
                ..
            } => format!(
                "all_keywords  {} -> {matched} / {unmatched}",
                keywords.join(" + ")
            ),
        };
        out.push_str(&format!("{:<24} {detail}\n", rule.column()));
    }
    out
}

pub struct CsvOutput;

impl CsvOutput {
    pub fn write(table: &ResultTable, destination: &Utf8Path) -> Result<(), KiraError> {
        if destination.as_str() == "-" {
            let stdout = io::stdout();
            return table.write_csv(stdout.lock());
        }
        if let Some(parent) = destination.parent().filter(|p| !p.as_str().is_empty()) {
            std::fs::create_dir_all(parent.as_std_path())
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        }
        let file = File::create(destination.as_std_path())
            .map_err(|err| KiraError::Filesystem(format!("create {destination}: {err}")))?;
        table.write_csv(file)
    }
}

pub fn status_line(result: &FetchResult, filtered_rows: usize) -> String {
    let headline = format!(
        "Found {} datasets in total. Displaying up to {}.",
        result.total_count, result.returned_ids
    );
    let detail = match result.status {
        FetchStatus::NoMatches => "No datasets found for the given query.".to_string(),
        FetchStatus::NothingProcessed => "No datasets could be processed.".to_string(),
        FetchStatus::Complete => format!(
            "Processed {} datasets ({filtered_rows} after filters).",
            result.rows()
        ),
        FetchStatus::Partial => format!(
            "Processed {} datasets ({filtered_rows} after filters); {} of {} chunks failed.",
            result.rows(),
            result.failed_chunks.len(),
            result.chunks_requested
        ),
    };
    format!("{headline} {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::InclusionPredicate;

    #[test]
    fn rules_listing_shows_kind_and_match_source_per_column() {
        let listing = rules_listing(&RuleSet::standard());
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines[0], "inclusion: single-cell, scrnaseq, scrna-seq");
        assert_eq!(lines.len(), RuleSet::standard().rules.len() + 1);
        for (line, rule) in lines[1..].iter().zip(&RuleSet::standard().rules) {
            assert!(line.starts_with(rule.column()), "{line}");
        }
        assert!(listing.contains("numeric"));
        assert!(listing.contains("priority"));
    }

    #[test]
    fn rules_listing_without_inclusion_keywords_admits_all() {
        let rules = RuleSet {
            inclusion: InclusionPredicate::accept_all(),
            rules: vec![FieldRule::numeric("Cell Count", r"(\d+) cells", false).unwrap()],
        };
        assert_eq!(
            rules_listing(&rules),
            format!("inclusion: all records\n{:<24} numeric       /(\\d+) cells/\n", "Cell Count")
        );
    }
}

use regex::{Regex, RegexBuilder};

use crate::config::{FieldRuleConfig, PriorityTierConfig, RulesConfig};
use crate::domain::{MetadataMap, MetadataRecord};
use crate::error::KiraError;
use crate::table::{CellValue, DatasetRow, NOT_AVAILABLE, ResultTable, UNKNOWN};

pub const SINGLE_CELL_KEYWORDS: &[&str] = &["single-cell", "scrnaseq", "scrna-seq"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusionPredicate {
    keywords: Vec<String>,
}

impl InclusionPredicate {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: normalize_keywords(keywords),
        }
    }

    pub fn accept_all() -> Self {
        Self {
            keywords: Vec::new(),
        }
    }

    pub fn single_cell() -> Self {
        Self::new(SINGLE_CELL_KEYWORDS)
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn admits(&self, summary_lower: &str) -> bool {
        self.keywords.is_empty()
            || self
                .keywords
                .iter()
                .any(|keyword| summary_lower.contains(keyword.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityTier {
    pub label: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum FieldRule {
    Numeric {
        column: String,
        pattern: Regex,
        lowercase: bool,
    },
    AnyKeyword {
        column: String,
        keywords: Vec<String>,
        matched: String,
        unmatched: String,
    },
    Priority {
        column: String,
        tiers: Vec<PriorityTier>,
        fallback: String,
    },
    AllKeywords {
        column: String,
        keywords: Vec<String>,
        matched: String,
        unmatched: String,
    },
}

impl FieldRule {
    pub fn numeric(column: &str, pattern: &str, lowercase: bool) -> Result<Self, KiraError> {
        let pattern = RegexBuilder::new(pattern)
            .build()
            .map_err(|err| KiraError::InvalidRule {
                column: column.to_string(),
                reason: err.to_string(),
            })?;
        Ok(FieldRule::Numeric {
            column: column.to_string(),
            pattern,
            lowercase,
        })
    }

    pub fn column(&self) -> &str {
        match self {
            FieldRule::Numeric { column, .. }
            | FieldRule::AnyKeyword { column, .. }
            | FieldRule::Priority { column, .. }
            | FieldRule::AllKeywords { column, .. } => column,
        }
    }

    pub fn apply(&self, summary: &str, summary_lower: &str) -> CellValue {
        match self {
            FieldRule::Numeric {
                pattern, lowercase, ..
            } => {
                let haystack = if *lowercase { summary_lower } else { summary };
                let Some(found) = pattern
                    .captures(haystack)
                    .and_then(|caps| caps.get(1).or_else(|| caps.get(0)))
                else {
                    return CellValue::Unknown;
                };
                let digits = found.as_str().replace(',', "");
                match digits.parse::<u64>() {
                    Ok(count) => CellValue::Count(count),
                    Err(_) if !digits.is_empty() => CellValue::Label(digits),
                    Err(_) => CellValue::Unknown,
                }
            }
            FieldRule::AnyKeyword {
                keywords,
                matched,
                unmatched,
                ..
            } => {
                let hit = keywords
                    .iter()
                    .any(|keyword| summary_lower.contains(keyword.as_str()));
                CellValue::Label(if hit { matched } else { unmatched }.clone())
            }
            FieldRule::Priority {
                tiers, fallback, ..
            } => tiers
                .iter()
                .find(|tier| {
                    tier.keywords
                        .iter()
                        .any(|keyword| summary_lower.contains(keyword.as_str()))
                })
                .map(|tier| CellValue::Label(tier.label.clone()))
                .unwrap_or_else(|| label_or_unknown(fallback)),
            FieldRule::AllKeywords {
                keywords,
                matched,
                unmatched,
                ..
            } => {
                let hit = !keywords.is_empty()
                    && keywords
                        .iter()
                        .all(|keyword| summary_lower.contains(keyword.as_str()));
                CellValue::Label(if hit { matched } else { unmatched }.clone())
            }
        }
    }

    fn from_config(config: &FieldRuleConfig) -> Result<Self, KiraError> {
        let rule = match config {
            FieldRuleConfig::Numeric {
                column,
                pattern,
                lowercase,
            } => FieldRule::numeric(column, pattern, *lowercase)?,
            FieldRuleConfig::AnyKeyword {
                column,
                keywords,
                matched,
                unmatched,
            } => FieldRule::AnyKeyword {
                column: column.clone(),
                keywords: normalize_keywords(keywords),
                matched: matched.clone(),
                unmatched: unmatched.clone(),
            },
            FieldRuleConfig::Priority {
                column,
                tiers,
                fallback,
            } => FieldRule::Priority {
                column: column.clone(),
                tiers: tiers
                    .iter()
                    .map(|tier| PriorityTier {
                        label: tier.label.clone(),
                        keywords: normalize_keywords(&tier.keywords),
                    })
                    .collect(),
                fallback: fallback.clone(),
            },
            FieldRuleConfig::AllKeywords {
                column,
                keywords,
                matched,
                unmatched,
            } => FieldRule::AllKeywords {
                column: column.clone(),
                keywords: normalize_keywords(keywords),
                matched: matched.clone(),
                unmatched: unmatched.clone(),
            },
        };
        if rule.column().trim().is_empty() {
            return Err(KiraError::InvalidRule {
                column: rule.column().to_string(),
                reason: "column name is empty".to_string(),
            });
        }
        Ok(rule)
    }

    fn to_config(&self) -> FieldRuleConfig {
        match self {
            FieldRule::Numeric {
                column,
                pattern,
                lowercase,
            } => FieldRuleConfig::Numeric {
                column: column.clone(),
                pattern: pattern.as_str().to_string(),
                lowercase: *lowercase,
            },
            FieldRule::AnyKeyword {
                column,
                keywords,
                matched,
                unmatched,
            } => FieldRuleConfig::AnyKeyword {
                column: column.clone(),
                keywords: keywords.clone(),
                matched: matched.clone(),
                unmatched: unmatched.clone(),
            },
            FieldRule::Priority {
                column,
                tiers,
                fallback,
            } => FieldRuleConfig::Priority {
                column: column.clone(),
                tiers: tiers
                    .iter()
                    .map(|tier| PriorityTierConfig {
                        label: tier.label.clone(),
                        keywords: tier.keywords.clone(),
                    })
                    .collect(),
                fallback: fallback.clone(),
            },
            FieldRule::AllKeywords {
                column,
                keywords,
                matched,
                unmatched,
            } => FieldRuleConfig::AllKeywords {
                column: column.clone(),
                keywords: keywords.clone(),
                matched: matched.clone(),
                unmatched: unmatched.clone(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuleSet {
    pub inclusion: InclusionPredicate,
    pub rules: Vec<FieldRule>,
}

impl RuleSet {
    pub fn standard() -> Self {
        Self {
            inclusion: InclusionPredicate::single_cell(),
            rules: standard_rules(),
        }
    }

    pub fn from_config(config: &RulesConfig) -> Result<Self, KiraError> {
        let inclusion = match &config.inclusion_keywords {
            Some(keywords) => InclusionPredicate::new(keywords),
            None => InclusionPredicate::single_cell(),
        };
        let rules = match &config.fields {
            Some(fields) => fields
                .iter()
                .map(FieldRule::from_config)
                .collect::<Result<Vec<_>, KiraError>>()?,
            None => standard_rules(),
        };
        let mut seen = Vec::new();
        for rule in &rules {
            let column = rule.column().to_lowercase();
            if seen.contains(&column) {
                return Err(KiraError::InvalidRule {
                    column: rule.column().to_string(),
                    reason: "column defined twice".to_string(),
                });
            }
            seen.push(column);
        }
        Ok(Self { inclusion, rules })
    }

    pub fn to_config(&self) -> RulesConfig {
        RulesConfig {
            inclusion_keywords: Some(self.inclusion.keywords().to_vec()),
            fields: Some(self.rules.iter().map(FieldRule::to_config).collect()),
        }
    }

    pub fn columns(&self) -> Vec<String> {
        self.rules
            .iter()
            .map(|rule| rule.column().to_string())
            .collect()
    }

    pub fn row_for(&self, record: &MetadataRecord) -> Option<DatasetRow> {
        let summary = record
            .summary
            .clone()
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        let summary_lower = summary.to_lowercase();
        if !self.inclusion.admits(&summary_lower) {
            return None;
        }

        let derived = self
            .rules
            .iter()
            .map(|rule| rule.apply(&summary, &summary_lower))
            .collect();

        Some(DatasetRow {
            dataset_id: record
                .uid
                .clone()
                .unwrap_or_else(|| record.id.as_str().to_string()),
            accession: text_or_na(record.accession.as_deref()),
            title: text_or_na(record.title.as_deref()),
            species: species(&record.taxon),
            derived,
            summary,
        })
    }

    pub fn tabulate(&self, metadata: &MetadataMap) -> ResultTable {
        let mut table = ResultTable::new(self.columns());
        for row in metadata.iter().filter_map(|record| self.row_for(record)) {
            table.push(row);
        }
        table
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::standard()
    }
}

fn standard_rules() -> Vec<FieldRule> {
    let numeric = |column: &str, pattern: &str, lowercase: bool| FieldRule::Numeric {
        column: column.to_string(),
        pattern: Regex::new(pattern).expect("built-in pattern compiles"),
        lowercase,
    };
    vec![
        numeric("Cell Count", r"(\d[\d,]*) cells?", false),
        numeric("Sequencing Depth", r"sequencing depth of (\d[\d,]*)", true),
        numeric("Condition Count", r"(\d+) (?:conditions|groups)", true),
        FieldRule::AnyKeyword {
            column: "Longitudinal".to_string(),
            keywords: normalize_keywords(["longitudinal", "time points", "day", "week", "month"]),
            matched: "Yes".to_string(),
            unmatched: "No".to_string(),
        },
        FieldRule::Priority {
            column: "Trajectory Type".to_string(),
            tiers: vec![
                PriorityTier {
                    label: "Linear".to_string(),
                    keywords: normalize_keywords(["differentiation", "linear"]),
                },
                PriorityTier {
                    label: "Branched".to_string(),
                    keywords: normalize_keywords(["branch", "cyclic"]),
                },
            ],
            fallback: UNKNOWN.to_string(),
        },
        FieldRule::AllKeywords {
            column: "Conditions".to_string(),
            keywords: normalize_keywords(["healthy", "disease"]),
            matched: "Multiple".to_string(),
            unmatched: "Single".to_string(),
        },
    ]
}

fn normalize_keywords<I, S>(keywords: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keywords
        .into_iter()
        .map(|keyword| keyword.as_ref().trim().to_lowercase())
        .filter(|keyword| !keyword.is_empty())
        .collect()
}

fn label_or_unknown(label: &str) -> CellValue {
    if label == UNKNOWN {
        CellValue::Unknown
    } else {
        CellValue::Label(label.to_string())
    }
}

fn text_or_na(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => NOT_AVAILABLE.to_string(),
    }
}

pub fn species(taxon: &[String]) -> String {
    let joined = taxon
        .iter()
        .flat_map(|name| name.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        UNKNOWN.to_string()
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(rules: &RuleSet, column: &str, summary: &str) -> CellValue {
        let rule = rules
            .rules
            .iter()
            .find(|rule| rule.column() == column)
            .unwrap();
        rule.apply(summary, &summary.to_lowercase())
    }

    #[test]
    fn cell_count_strips_grouping_commas() {
        let rules = RuleSet::standard();
        assert_eq!(
            cell(&rules, "Cell Count", "We profiled 1,200 cells from lung."),
            CellValue::Count(1200)
        );
        assert_eq!(cell(&rules, "Cell Count", "a single cell"), CellValue::Unknown);
        assert_eq!(cell(&rules, "Cell Count", "bulk RNA-seq"), CellValue::Unknown);
    }

    #[test]
    fn cell_count_keeps_digits_beyond_u64() {
        let rules = RuleSet::standard();
        assert_eq!(
            cell(
                &rules,
                "Cell Count",
                "A single-cell atlas of 99,999,999,999,999,999,999 cells"
            ),
            CellValue::Label("99999999999999999999999".to_string())
        );
        assert_eq!(
            cell(&rules, "Cell Count", "profiled ١٢٠ cells"),
            CellValue::Label("١٢٠".to_string())
        );
    }

    #[test]
    fn sequencing_depth_is_case_insensitive() {
        let rules = RuleSet::standard();
        assert_eq!(
            cell(&rules, "Sequencing Depth", "Sequencing depth of 50,000 reads per cell"),
            CellValue::Count(50_000)
        );
    }

    #[test]
    fn condition_count_reads_groups() {
        let rules = RuleSet::standard();
        assert_eq!(
            cell(&rules, "Condition Count", "Samples from 4 groups"),
            CellValue::Count(4)
        );
    }

    #[test]
    fn trajectory_prefers_linear_over_branched() {
        let rules = RuleSet::standard();
        assert_eq!(
            cell(&rules, "Trajectory Type", "Branch points during differentiation"),
            CellValue::Label("Linear".to_string())
        );
        assert_eq!(
            cell(&rules, "Trajectory Type", "A cyclic process"),
            CellValue::Label("Branched".to_string())
        );
        assert_eq!(cell(&rules, "Trajectory Type", "steady state"), CellValue::Unknown);
    }

    #[test]
    fn multiplicity_needs_both_keywords() {
        let rules = RuleSet::standard();
        assert_eq!(
            cell(&rules, "Conditions", "Healthy donors and DISEASE cohorts"),
            CellValue::Label("Multiple".to_string())
        );
        assert_eq!(
            cell(&rules, "Conditions", "healthy donors"),
            CellValue::Label("Single".to_string())
        );
        assert_eq!(
            cell(&rules, "Conditions", "tumor"),
            CellValue::Label("Single".to_string())
        );
    }

    #[test]
    fn longitudinal_flag() {
        let rules = RuleSet::standard();
        assert_eq!(
            cell(&rules, "Longitudinal", "collected at three time points"),
            CellValue::Label("Yes".to_string())
        );
        assert_eq!(
            cell(&rules, "Longitudinal", "single snapshot"),
            CellValue::Label("No".to_string())
        );
    }

    #[test]
    fn species_normalizes_whitespace() {
        let taxon = vec!["Homo  sapiens; ".to_string(), " Mus musculus".to_string()];
        assert_eq!(species(&taxon), "Homo sapiens; Mus musculus");
        assert_eq!(species(&[]), UNKNOWN);
    }

    #[test]
    fn empty_inclusion_accepts_everything() {
        assert!(InclusionPredicate::accept_all().admits("bulk"));
        assert!(!InclusionPredicate::single_cell().admits("bulk"));
        assert!(InclusionPredicate::single_cell().admits("an scrna-seq atlas"));
    }
}

use std::fs;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::batch::{BatchOptions, DEFAULT_CHUNK_SIZE};
use crate::domain::{DEFAULT_RETMAX, DEFAULT_TERM, SearchQuery};
use crate::error::KiraError;
use crate::eutils::{DEFAULT_BASE_URL, EutilsSettings};
use crate::extract::RuleSet;

pub const CONFIG_FILE: &str = "kira-geo.json";
const DEFAULT_DELAY_MS: u64 = 500;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub eutils: EutilsConfig,
    #[serde(default)]
    pub rules: RulesConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub term: Option<String>,
    #[serde(default)]
    pub retmax: Option<u32>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct BatchConfig {
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct EutilsConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct RulesConfig {
    #[serde(default)]
    pub inclusion_keywords: Option<Vec<String>>,
    #[serde(default)]
    pub fields: Option<Vec<FieldRuleConfig>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldRuleConfig {
    Numeric {
        column: String,
        pattern: String,
        #[serde(default)]
        lowercase: bool,
    },
    AnyKeyword {
        column: String,
        keywords: Vec<String>,
        #[serde(default = "default_yes")]
        matched: String,
        #[serde(default = "default_no")]
        unmatched: String,
    },
    Priority {
        column: String,
        tiers: Vec<PriorityTierConfig>,
        #[serde(default = "default_unknown")]
        fallback: String,
    },
    AllKeywords {
        column: String,
        keywords: Vec<String>,
        #[serde(default = "default_yes")]
        matched: String,
        #[serde(default = "default_no")]
        unmatched: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PriorityTierConfig {
    pub label: String,
    pub keywords: Vec<String>,
}

fn default_yes() -> String {
    "Yes".to_string()
}

fn default_no() -> String {
    "No".to_string()
}

fn default_unknown() -> String {
    crate::table::UNKNOWN.to_string()
}

#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub term: Option<String>,
    pub retmax: Option<u32>,
    pub chunk_size: Option<usize>,
    pub delay_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub source: Option<Utf8PathBuf>,
    pub query: SearchQuery,
    pub batch: BatchOptions,
    pub eutils: EutilsSettings,
    pub rules: RuleSet,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>, overrides: &Overrides) -> Result<ResolvedConfig, KiraError> {
        let (config, source) = match path {
            Some(path) => {
                let path = Utf8PathBuf::from(path);
                (Self::read(&path)?, Some(path))
            }
            None => match Self::discover() {
                Some(path) => (Self::read(&path)?, Some(path)),
                None => (Config::default(), None),
            },
        };
        let mut resolved = Self::resolve_config(config, overrides)?;
        resolved.source = source;
        Ok(resolved)
    }

    pub fn read(path: &Utf8PathBuf) -> Result<Config, KiraError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| KiraError::ConfigRead(path.clone().into_std_path_buf()))?;
        serde_json::from_str(&content).map_err(|err| KiraError::ConfigParse(err.to_string()))
    }

    pub fn discover() -> Option<Utf8PathBuf> {
        let local = Utf8PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        ProjectDirs::from("", "", "kira-geo-explorer")
            .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.config_dir().join(CONFIG_FILE)).ok())
            .filter(|path| path.exists())
    }

    pub fn resolve_config(config: Config, overrides: &Overrides) -> Result<ResolvedConfig, KiraError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let term = overrides
            .term
            .clone()
            .or(config.search.term)
            .unwrap_or_else(|| DEFAULT_TERM.to_string());
        let retmax = overrides
            .retmax
            .or(config.search.retmax)
            .unwrap_or(DEFAULT_RETMAX);
        let query = SearchQuery::new(term, retmax)?;

        let chunk_size = overrides
            .chunk_size
            .or(config.batch.chunk_size)
            .unwrap_or(DEFAULT_CHUNK_SIZE);
        let delay_ms = overrides
            .delay_ms
            .or(config.batch.delay_ms)
            .unwrap_or(DEFAULT_DELAY_MS);
        let batch = BatchOptions::new(chunk_size, Duration::from_millis(delay_ms))?;

        let defaults = EutilsSettings::default();
        let eutils = EutilsSettings {
            base_url: config
                .eutils
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            tool: config.eutils.tool.or(defaults.tool),
            email: config.eutils.email,
        };

        let rules = RuleSet::from_config(&config.rules)?;

        Ok(ResolvedConfig {
            schema_version,
            source: None,
            query,
            batch,
            eutils,
            rules,
        })
    }
}

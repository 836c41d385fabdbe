use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::debug;

use crate::domain::{MetadataMap, MetadataRecord, RecordId, SearchQuery, SearchResult};
use crate::error::KiraError;

pub const DEFAULT_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const DATABASE: &str = "gds";
const BOOKKEEPING_KEY: &str = "uids";

pub trait EutilsClient: Send + Sync {
    fn search(&self, query: &SearchQuery) -> Result<SearchResult, KiraError>;
    fn summary(&self, ids: &[RecordId]) -> Result<MetadataMap, KiraError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EutilsSettings {
    pub base_url: String,
    pub tool: Option<String>,
    pub email: Option<String>,
}

impl Default for EutilsSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            tool: Some("kira-geo".to_string()),
            email: None,
        }
    }
}

#[derive(Clone)]
pub struct EutilsHttpClient {
    client: Client,
    base_url: String,
    identity: Vec<(&'static str, String)>,
}

impl EutilsHttpClient {
    pub fn new(settings: &EutilsSettings) -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-geo/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::EutilsHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| KiraError::EutilsHttp(err.to_string()))?;

        let mut identity = Vec::new();
        if let Some(tool) = settings.tool.as_deref().filter(|v| !v.trim().is_empty()) {
            identity.push(("tool", tool.trim().to_string()));
        }
        if let Some(email) = settings.email.as_deref().filter(|v| !v.trim().is_empty()) {
            identity.push(("email", email.trim().to_string()));
        }
        if let Ok(api_key) = std::env::var("NCBI_API_KEY") {
            if !api_key.trim().is_empty() {
                identity.push(("api_key", api_key.trim().to_string()));
            }
        }

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            identity,
        })
    }

    fn get_json(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value, KiraError> {
        let url = format!("{}/{endpoint}", self.base_url);
        debug!(%url, ?params, "eutils request");
        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&self.identity)
            .send()
            .map_err(|err| KiraError::EutilsHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "E-utilities request failed".to_string());
            return Err(KiraError::EutilsStatus { status, message });
        }
        let body = response
            .text()
            .map_err(|err| KiraError::EutilsHttp(err.to_string()))?;
        serde_json::from_str(&body).map_err(|err| KiraError::EutilsParse(err.to_string()))
    }
}

impl EutilsClient for EutilsHttpClient {
    fn search(&self, query: &SearchQuery) -> Result<SearchResult, KiraError> {
        let body = self.get_json(
            "esearch.fcgi",
            &[
                ("db", DATABASE.to_string()),
                ("term", query.term().to_string()),
                ("retmax", query.retmax().to_string()),
                ("retmode", "json".to_string()),
            ],
        )?;
        Ok(parse_esearch(&body))
    }

    fn summary(&self, ids: &[RecordId]) -> Result<MetadataMap, KiraError> {
        if ids.is_empty() {
            return Ok(MetadataMap::new());
        }
        let joined = ids
            .iter()
            .map(RecordId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let body = self.get_json(
            "esummary.fcgi",
            &[
                ("db", DATABASE.to_string()),
                ("id", joined),
                ("retmode", "json".to_string()),
            ],
        )?;
        parse_esummary(&body)
    }
}

/// Reads `esearchresult.idlist` and `esearchresult.count`; absent keys mean no results.
pub fn parse_esearch(body: &Value) -> SearchResult {
    let Some(result) = body.get("esearchresult") else {
        return SearchResult::default();
    };
    let ids = result
        .get("idlist")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(value_as_text)
                .filter_map(|id| id.parse::<RecordId>().ok())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let total_count = result
        .get("count")
        .and_then(|count| match count {
            Value::String(text) => text.trim().parse::<u64>().ok(),
            Value::Number(number) => number.as_u64(),
            _ => None,
        })
        .unwrap_or(0);
    SearchResult { ids, total_count }
}

/// Reads the `result` map of an esummary body, skipping the `uids` key and
/// entries the service flagged as unknown. A top-level `error` (rate limit,
/// bad key) fails the whole chunk.
pub fn parse_esummary(body: &Value) -> Result<MetadataMap, KiraError> {
    if let Some(message) = body.get("error").and_then(Value::as_str) {
        return Err(KiraError::EutilsHttp(message.to_string()));
    }
    let Some(result) = body.get("result").and_then(Value::as_object) else {
        return Ok(MetadataMap::new());
    };

    let mut keys = result
        .get(BOOKKEEPING_KEY)
        .and_then(Value::as_array)
        .map(|uids| uids.iter().filter_map(value_as_text).collect::<Vec<_>>())
        .unwrap_or_default();
    for key in result.keys() {
        if key != BOOKKEEPING_KEY && !keys.iter().any(|known| known == key) {
            keys.push(key.clone());
        }
    }

    let map = keys
        .iter()
        .filter_map(|key| {
            let entry = result.get(key)?.as_object()?;
            if entry.contains_key("error") && !entry.contains_key("summary") {
                return None;
            }
            let id = key.parse::<RecordId>().ok()?;
            let mut record = MetadataRecord::new(id);
            record.uid = entry.get("uid").and_then(value_as_text);
            record.title = entry.get("title").and_then(value_as_text);
            record.summary = entry.get("summary").and_then(value_as_text);
            record.accession = entry.get("accession").and_then(value_as_text);
            record.taxon = entry.get("taxon").map(taxon_values).unwrap_or_default();
            Some(record)
        })
        .collect();
    Ok(map)
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn taxon_values(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(value_as_text).collect(),
        other => value_as_text(other).into_iter().collect(),
    }
}

use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use kira_geo_explorer::config::{ConfigLoader, FieldRuleConfig, Overrides};
use kira_geo_explorer::error::KiraError;

fn write_config(content: &str) -> (tempfile::TempDir, String) {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("kira-geo.json");
    fs::write(&path, content).unwrap();
    let path = Utf8PathBuf::from_path_buf(path).unwrap().to_string();
    (temp, path)
}

#[test]
fn config_file_defines_rule_set() {
    let (_temp, path) = write_config(
        r#"{
            "schema_version": 1,
            "search": { "term": "scATAC-seq", "retmax": 50 },
            "batch": { "chunk_size": 20, "delay_ms": 0 },
            "rules": {
                "inclusion_keywords": [],
                "fields": [
                    { "kind": "numeric", "column": "Cell Count", "pattern": "(\\d[\\d,]*) nuclei", "lowercase": true },
                    { "kind": "any_keyword", "column": "Organoid", "keywords": ["organoid"] },
                    { "kind": "priority", "column": "Tissue", "tiers": [
                        { "label": "Brain", "keywords": ["cortex", "brain"] },
                        { "label": "Gut", "keywords": ["intestin", "colon"] }
                    ] }
                ]
            }
        }"#,
    );

    let resolved = ConfigLoader::resolve(Some(&path), &Overrides::default()).unwrap();
    assert_eq!(resolved.query.term(), "scATAC-seq");
    assert_eq!(resolved.query.retmax(), 50);
    assert_eq!(resolved.batch.chunk_size(), 20);
    assert!(resolved.batch.delay.is_zero());
    assert_eq!(resolved.rules.columns(), vec!["Cell Count", "Organoid", "Tissue"]);
    assert!(resolved.rules.inclusion.keywords().is_empty());
    assert_eq!(resolved.source.as_ref().map(|p| p.to_string()), Some(path));
}

#[test]
fn rule_defaults_fill_labels() {
    let rule: FieldRuleConfig = serde_json::from_str(
        r#"{ "kind": "all_keywords", "column": "Paired", "keywords": ["tumor", "normal"] }"#,
    )
    .unwrap();
    assert_matches!(
        rule,
        FieldRuleConfig::AllKeywords { ref matched, ref unmatched, .. } if matched == "Yes" && unmatched == "No"
    );
}

#[test]
fn invalid_pattern_is_rejected() {
    let (_temp, path) = write_config(
        r#"{ "rules": { "fields": [ { "kind": "numeric", "column": "Broken", "pattern": "(\\d+" } ] } }"#,
    );
    let err = ConfigLoader::resolve(Some(&path), &Overrides::default()).unwrap_err();
    assert_matches!(err, KiraError::InvalidRule { column, .. } if column == "Broken");
}

#[test]
fn duplicate_columns_are_rejected() {
    let (_temp, path) = write_config(
        r#"{ "rules": { "fields": [
            { "kind": "any_keyword", "column": "Flag", "keywords": ["a"] },
            { "kind": "any_keyword", "column": "flag", "keywords": ["b"] }
        ] } }"#,
    );
    let err = ConfigLoader::resolve(Some(&path), &Overrides::default()).unwrap_err();
    assert_matches!(err, KiraError::InvalidRule { .. });
}

#[test]
fn explicit_missing_path_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let missing = temp.path().join("nope.json");
    let err = ConfigLoader::resolve(missing.to_str(), &Overrides::default()).unwrap_err();
    assert_matches!(err, KiraError::ConfigRead(_));
}

#[test]
fn malformed_json_is_a_parse_error() {
    let (_temp, path) = write_config("{ not json");
    let err = ConfigLoader::resolve(Some(&path), &Overrides::default()).unwrap_err();
    assert_matches!(err, KiraError::ConfigParse(_));
}

#[test]
fn out_of_range_overrides_are_rejected() {
    let (_temp, path) = write_config("{}");
    let overrides = Overrides {
        retmax: Some(5),
        ..Overrides::default()
    };
    let err = ConfigLoader::resolve(Some(&path), &overrides).unwrap_err();
    assert_matches!(err, KiraError::InvalidRetmax(5));

    let overrides = Overrides {
        chunk_size: Some(0),
        ..Overrides::default()
    };
    let err = ConfigLoader::resolve(Some(&path), &overrides).unwrap_err();
    assert_matches!(err, KiraError::InvalidChunkSize(0));
}

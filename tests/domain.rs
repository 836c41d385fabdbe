use assert_matches::assert_matches;

use kira_geo_explorer::domain::{RecordId, SearchQuery};
use kira_geo_explorer::error::KiraError;

#[test]
fn search_query_trims_term() {
    let query = SearchQuery::new("  single-cell RNA-seq ", 10).unwrap();
    assert_eq!(query.term(), "single-cell RNA-seq");
    assert_eq!(query.retmax(), 10);
}

#[test]
fn search_query_rejects_blank_term() {
    let err = SearchQuery::new("   ", 100).unwrap_err();
    assert_matches!(err, KiraError::InvalidQuery(_));
}

#[test]
fn search_query_bounds_retmax() {
    assert_matches!(
        SearchQuery::new("x", 9).unwrap_err(),
        KiraError::InvalidRetmax(9)
    );
    assert_matches!(
        SearchQuery::new("x", 10_001).unwrap_err(),
        KiraError::InvalidRetmax(10_001)
    );
    assert!(SearchQuery::new("x", 10_000).is_ok());
}

#[test]
fn record_id_rejects_separators() {
    assert_matches!(
        "1,2".parse::<RecordId>().unwrap_err(),
        KiraError::InvalidRecordId(_)
    );
    assert!("".parse::<RecordId>().is_err());
    assert_eq!(" 200245678 ".parse::<RecordId>().unwrap().as_str(), "200245678");
}

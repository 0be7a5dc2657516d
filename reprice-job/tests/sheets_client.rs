//! Integration tests for the Sheets API adapter.
//!
//! A wiremock server stands in for the Sheets API so the client, the token
//! exchange and the sheet repository are exercised over real HTTP.

use std::sync::Arc;

use chrono::NaiveDate;
use reprice_common::config::{PolicyKind, SelectionConfig, SheetsConfig};
use reprice_common::Error;
use reprice_job::sheets::{
    ServiceAccountKey, ServiceAccountTokenSource, SheetsClient, StaticTokenSource, TokenSource,
    ValueRange,
};
use reprice_job::{ProductRepository, RepriceJob, SheetRepository, StalenessPolicy};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SPREADSHEET: &str = "/v4/spreadsheets/sheet-1";
const FIXTURE_KEY: &str = include_str!("fixtures/service_account_key.pem");

// ============================================================================
// Helpers
// ============================================================================

fn sheets_config(server: &MockServer) -> SheetsConfig {
    SheetsConfig {
        spreadsheet_id: "sheet-1".into(),
        api_base_url: server.uri(),
        ..SheetsConfig::default()
    }
}

fn client(server: &MockServer) -> SheetsClient {
    SheetsClient::new(&sheets_config(server), Arc::new(StaticTokenSource::new("test-token")))
        .unwrap()
}

fn tabs() -> Value {
    json!({
        "sheets": [
            {"properties": {"title": "Rules", "index": 1}},
            {"properties": {"title": "Products", "index": 0}}
        ]
    })
}

fn product_rows() -> Value {
    json!({
        "range": "'Products'!A1:L4",
        "values": [
            ["number", "brand", "description", "stock", "price", "updated_date",
             "turnover_ratio", "norm_stock", "product_group", "rule", "select_flag", "id_rule"],
            ["A-100", "Bosch", "Oil filter", "4", "", "01.01.2023", "k9", "5", "G1", "1", "", "1"],
            ["A-200", "Mann", "Air filter", "2", "350", "01.01.2023", "k3", "2", "G1", "1", "", "1"],
            ["A-300", "Febi", "Belt", "7", "120", "10.06.2024", "k5", "7", "G2", "1", "", "1"]
        ]
    })
}

fn rules_rows() -> Value {
    json!({
        "range": "'Rules'!A1:C5",
        "values": [
            ["", "setting", "value"],
            ["", "quota", "2"],
            ["", "stale days", "30"],
            [],
            ["", "9", "60"]
        ]
    })
}

async fn mount_spreadsheet(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(SPREADSHEET))
        .respond_with(ResponseTemplate::new(200).set_body_json(tabs()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/v4/spreadsheets/sheet-1/values/.*Products.*$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(product_rows()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/v4/spreadsheets/sheet-1/values/.*Rules.*$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rules_rows()))
        .mount(server)
        .await;
}

async fn batch_requests(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path().ends_with("values:batchUpdate"))
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

/// Marker value written for each range of a batchUpdate body.
fn markers(body: &Value) -> Vec<(String, String)> {
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| {
            (
                d["range"].as_str().unwrap().to_string(),
                d["values"][0][0].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

// ============================================================================
// Client
// ============================================================================

#[tokio::test]
async fn test_read_sheets_in_tab_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SPREADSHEET))
        .and(query_param("fields", "sheets.properties(title,index)"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tabs()))
        .expect(1)
        .mount(&server)
        .await;

    let titles = client(&server).read_sheets().await.unwrap();
    assert_eq!(titles, vec!["Products", "Rules"]);
}

#[tokio::test]
async fn test_sheet_title_out_of_range() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SPREADSHEET))
        .respond_with(ResponseTemplate::new(200).set_body_json(tabs()))
        .mount(&server)
        .await;

    let err = client(&server).sheet_title(5).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_read_values_empty_range() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/v4/spreadsheets/sheet-1/values/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"range": "'Empty'!A1:Z1000"})))
        .mount(&server)
        .await;

    let rows = client(&server).read_values("'Empty'").await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_batch_update_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}/values:batchUpdate", SPREADSHEET)))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(json!({"valueInputOption": "USER_ENTERED"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"totalUpdatedCells": 2})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let data = vec![
        ValueRange {
            range: "'Products'!J2".into(),
            values: vec![vec!["1".into()]],
        },
        ValueRange {
            range: "'Products'!J3".into(),
            values: vec![vec!["".into()]],
        },
    ];
    let cells = client(&server).batch_update(&data).await.unwrap();
    assert_eq!(cells, 2);

    let bodies = batch_requests(&server).await;
    assert_eq!(
        markers(&bodies[0]),
        vec![
            ("'Products'!J2".to_string(), "1".to_string()),
            ("'Products'!J3".to_string(), "".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_status_mapping() {
    let cases = [
        (401, "auth"),
        (403, "auth"),
        (404, "not_found"),
        (429, "rate_limited"),
        (500, "external"),
    ];

    for (status, expected) in cases {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SPREADSHEET))
            .respond_with(ResponseTemplate::new(status).set_body_string("denied"))
            .mount(&server)
            .await;

        let err = client(&server).read_sheets().await.unwrap_err();
        let kind = match err {
            Error::Auth(_) => "auth",
            Error::NotFound(_) => "not_found",
            Error::RateLimited(_) => "rate_limited",
            Error::External(_) => "external",
            other => panic!("unexpected error for {}: {:?}", status, other),
        };
        assert_eq!(kind, expected, "status {}", status);
    }
}

#[tokio::test]
async fn test_malformed_response_is_json_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SPREADSHEET))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = client(&server).read_sheets().await.unwrap_err();
    assert!(matches!(err, Error::Json(_)));
}

// ============================================================================
// Service Account Token Exchange
// ============================================================================

fn token_source(server: &MockServer) -> ServiceAccountTokenSource {
    let key = ServiceAccountKey::from_json(
        &json!({
            "client_email": "reprice@project.iam.gserviceaccount.com",
            "private_key": FIXTURE_KEY,
            "private_key_id": "kid-1",
            "token_uri": format!("{}/token", server.uri()),
        })
        .to_string(),
    )
    .unwrap();
    ServiceAccountTokenSource::new(key).unwrap()
}

#[tokio::test]
async fn test_token_exchange_is_cached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("jwt-bearer"))
        .and(body_string_contains("assertion="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.fixture",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = token_source(&server);
    assert_eq!(source.client_email(), "reprice@project.iam.gserviceaccount.com");
    assert_eq!(source.access_token().await.unwrap(), "ya29.fixture");
    assert_eq!(source.access_token().await.unwrap(), "ya29.fixture");
}

#[tokio::test]
async fn test_short_lived_token_is_refreshed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.short",
            "expires_in": 30
        })))
        .expect(2)
        .mount(&server)
        .await;

    let source = token_source(&server);
    source.access_token().await.unwrap();
    source.access_token().await.unwrap();
}

#[tokio::test]
async fn test_rejected_grant_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})),
        )
        .mount(&server)
        .await;

    let err = token_source(&server).access_token().await.unwrap_err();
    assert!(err.is_auth());
}

// ============================================================================
// Sheet Repository
// ============================================================================

fn repository(server: &MockServer, selection: SelectionConfig) -> SheetRepository {
    SheetRepository::new(client(server), sheets_config(server), selection)
}

#[tokio::test]
async fn test_repository_load_products() {
    let server = MockServer::start().await;
    mount_spreadsheet(&server).await;

    let records = repository(&server, SelectionConfig::default()).load().await.unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].number, "A-100");
    assert_eq!(records[0].row_index, 2);
    assert!(!records[0].has_price());
    assert_eq!(records[1].turnover_ratio, 3.0);
    assert_eq!(records[2].updated_date, NaiveDate::from_ymd_opt(2024, 6, 10).unwrap());
}

#[tokio::test]
async fn test_repository_load_rules() {
    let server = MockServer::start().await;
    mount_spreadsheet(&server).await;

    let rules = repository(&server, SelectionConfig::default())
        .load_rules()
        .await
        .unwrap();
    assert_eq!(rules.quota, 2);
    assert_eq!(rules.policy, StalenessPolicy::PriceAware { stale_days: 30 });

    let bucketed = SelectionConfig {
        policy: PolicyKind::Bucketed,
        ..SelectionConfig::default()
    };
    let rules = repository(&server, bucketed).load_rules().await.unwrap();
    assert_eq!(rules.policy.bucket_days(9), Some(60));
    assert_eq!(rules.policy.bucket_days(4), Some(30));
}

#[tokio::test]
async fn test_repository_load_auth_failure_keeps_kind() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SPREADSHEET))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let err = repository(&server, SelectionConfig::default())
        .load()
        .await
        .unwrap_err();
    assert!(err.is_auth());
    assert!(err.to_string().contains("reading products sheet"));
}

#[tokio::test]
async fn test_repository_commit_without_rows_writes_nothing() {
    let server = MockServer::start().await;
    mount_spreadsheet(&server).await;

    repository(&server, SelectionConfig::default())
        .commit(&[], 0)
        .await
        .unwrap();
    assert!(server.received_requests().await.unwrap().is_empty());
}

// ============================================================================
// End to end
// ============================================================================

#[tokio::test]
async fn test_job_marks_selected_rows() {
    let server = MockServer::start().await;
    mount_spreadsheet(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("{}/values:batchUpdate", SPREADSHEET)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"totalUpdatedCells": 3})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let job = RepriceJob::new(repository(&server, SelectionConfig::default()));
    let report = job
        .run(NaiveDate::from_ymd_opt(2024, 7, 1).unwrap())
        .await
        .unwrap();

    // Row 2 is unpriced and stale, row 3 priced and stale, row 4 fresh.
    assert_eq!(report.selected_rows, vec![2, 3]);
    assert!(report.committed);

    let bodies = batch_requests(&server).await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(
        markers(&bodies[0]),
        vec![
            ("'Products'!J2".to_string(), "1".to_string()),
            ("'Products'!J3".to_string(), "1".to_string()),
            ("'Products'!J4".to_string(), "".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_job_rules_failure_writes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SPREADSHEET))
        .respond_with(ResponseTemplate::new(200).set_body_json(tabs()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/v4/spreadsheets/sheet-1/values/.*Products.*$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(product_rows()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/v4/spreadsheets/sheet-1/values/.*Rules.*$"))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let job = RepriceJob::new(repository(&server, SelectionConfig::default()));
    let err = job
        .run(NaiveDate::from_ymd_opt(2024, 7, 1).unwrap())
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("selection rules"));
    assert!(batch_requests(&server).await.is_empty());
}

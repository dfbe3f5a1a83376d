//! Whole runs through `app::run`, from configuration to exit status

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use wiremock::MockServer;

use crate::common::api_mock::{chart_json, mount_chart, not_found_json, ymd, Bar};
use crate::common::logging::{init_test_logging, log_test_step};
use crate::common::test_data::env_for;
use stocks_to_sheet::app::{self, exit_status, RunOptions};
use stocks_to_sheet::models::{Config, ConfigError};

fn bars() -> Vec<Bar> {
    vec![
        (ymd(2025, 9, 26), 100.0, 110.0, 95.0, 100.0, 1_000),
        (ymd(2025, 9, 29), 101.0, 112.0, 99.0, 110.0, 2_000),
    ]
}

/// Chart data for AAA and the reference index; BAD is unknown
async fn mock_provider(server: &MockServer) {
    mount_chart(server, "AAA", 200, chart_json("AAA", "AAA Holdings", 99.0, &bars())).await;
    mount_chart(server, "BAD", 404, not_found_json()).await;
    mount_chart(server, r"(\^|%5E)KS11", 200, chart_json("^KS11", "KOSPI", 99.0, &bars())).await;
}

fn options(dry_run: bool) -> RunOptions {
    RunOptions {
        run_date: Some(ymd(2025, 9, 29)),
        dry_run,
    }
}

/// Quote-provider settings only, as a dry run would have
fn dry_run_env(server_uri: &str, tickers: &str) -> HashMap<String, String> {
    let mut vars = env_for(server_uri);
    vars.remove("GOOGLE_SERVICE_ACCOUNT_JSON");
    vars.remove("SPREADSHEET_ID");
    vars.insert("TICKERS".to_string(), tickers.to_string());
    vars
}

#[tokio::test]
async fn test_missing_setting_fails_before_any_request() {
    init_test_logging();
    log_test_step("Run with required settings removed");

    let server = MockServer::start().await;
    mock_provider(&server).await;

    for required in ["SPREADSHEET_ID", "GOOGLE_SERVICE_ACCOUNT_JSON"] {
        let mut vars = env_for(&server.uri());
        vars.insert("TICKERS".to_string(), "AAA".to_string());
        vars.remove(required);

        let outcome = app::run(
            |destination| Config::from_lookup_for(|key| vars.get(key).cloned(), destination),
            &options(false),
            Vec::new(),
        )
        .await;

        assert_eq!(exit_status(&outcome), 1);
        let err = outcome.unwrap_err();
        assert_matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Missing(name)) if *name == required
        );
    }

    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests.is_empty(), "got {} requests", requests.len());
}

#[tokio::test]
async fn test_dry_run_writes_csv_without_spreadsheet_settings() {
    init_test_logging();
    log_test_step("Dry run with only quote settings");

    let server = MockServer::start().await;
    mock_provider(&server).await;

    let vars = dry_run_env(&server.uri(), "AAA");
    let mut out = Vec::new();
    let outcome = app::run(
        |destination| Config::from_lookup_for(|key| vars.get(key).cloned(), destination),
        &options(true),
        &mut out,
    )
    .await;

    assert_eq!(exit_status(&outcome), 0);
    assert_eq!(outcome.unwrap().appended, 1);

    let csv = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("Worksheet,Date,Code,Name"));
    assert!(lines[1].starts_with("Daily,2025-09-29,AAA,AAA Holdings,"));

    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests
        .iter()
        .all(|r| r.url.path().starts_with("/v8/finance/chart/")));
}

#[tokio::test]
async fn test_failed_ticker_gives_failing_exit_status() {
    let server = MockServer::start().await;
    mock_provider(&server).await;

    let vars = dry_run_env(&server.uri(), "AAA,BAD");
    let mut out = Vec::new();
    let outcome = app::run(
        |destination| Config::from_lookup_for(|key| vars.get(key).cloned(), destination),
        &options(true),
        &mut out,
    )
    .await;

    assert_eq!(exit_status(&outcome), 1);
    let summary = outcome.unwrap();
    assert_eq!(summary.appended, 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, "BAD");

    // The good ticker's row still went out
    let csv = String::from_utf8(out).unwrap();
    assert!(csv.contains("Daily,2025-09-29,AAA,"));
}

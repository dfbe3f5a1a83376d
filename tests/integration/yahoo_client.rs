//! Quote provider tests against a mocked chart endpoint

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::MockServer;

use crate::common::api_mock::{chart_json, mount_chart, not_found_json, received, ymd};
use crate::common::logging::{init_test_logging, log_test_step};
use crate::common::test_data::create_test_config;
use stocks_to_sheet::api::{fetch_daily_quote, FetchError, QuoteProvider, YahooClient};
use stocks_to_sheet::models::Ticker;
use stocks_to_sheet::utils::TradingCalendar;

#[tokio::test]
async fn test_daily_bars_request_and_parse() {
    init_test_logging();
    log_test_step("Fetching daily bars from mocked chart endpoint");

    let server = MockServer::start().await;
    let bars = [
        (ymd(2025, 9, 26), 20100.0, 20800.0, 19900.0, 20400.0, 152_340),
        (ymd(2025, 9, 29), 20500.0, 21000.0, 20300.0, 20910.0, 98_000),
    ];
    mount_chart(&server, r"082270\.KQ", 200, chart_json("082270.KQ", "GemVax", 20000.0, &bars)).await;

    let client = YahooClient::new(&create_test_config(&server.uri(), &[])).unwrap();
    let series = client
        .daily_bars("082270.KQ", ymd(2025, 9, 15), ymd(2025, 9, 30))
        .await
        .unwrap();

    assert_eq!(series.name, "GemVax");
    assert_eq!(series.bars.len(), 2);
    assert_eq!(series.bars[1].date, ymd(2025, 9, 29));
    assert_eq!(series.bars[1].close, Some(20910.0));

    let requests = received(&server, "GET", "/v8/finance/chart/082270.KQ").await;
    assert_eq!(requests.len(), 1);
    let query: std::collections::HashMap<_, _> = requests[0].url.query_pairs().into_owned().collect();
    assert_eq!(query["interval"], "1d");
    // 2025-09-15 00:00 UTC and the start of 2025-10-01 UTC
    assert_eq!(query["period1"], "1757894400");
    assert_eq!(query["period2"], "1759276800");
}

#[tokio::test]
async fn test_fetch_daily_quote_computes_change() {
    let server = MockServer::start().await;
    let bars = [
        (ymd(2025, 9, 26), 20100.0, 20800.0, 19900.0, 20000.0, 152_340),
        (ymd(2025, 9, 29), 20500.0, 21000.0, 20300.0, 20910.0, 98_000),
    ];
    mount_chart(&server, r"082270\.KQ", 200, chart_json("082270.KQ", "GemVax", 19000.0, &bars)).await;

    let client = YahooClient::new(&create_test_config(&server.uri(), &[])).unwrap();
    let ticker = Ticker::parse("082270.KQ").unwrap();
    let quote = fetch_daily_quote(&client, &ticker, ymd(2025, 9, 29))
        .await
        .unwrap()
        .expect("quote for trade date");

    assert_eq!(quote.code, "082270");
    assert_eq!(quote.open, 20500.0);
    assert_eq!(quote.volume, 98_000);
    assert_eq!(quote.change_pct, Some(4.55));

    // A date the ticker did not trade yields no quote
    let none = fetch_daily_quote(&client, &ticker, ymd(2025, 9, 30)).await.unwrap();
    assert_eq!(none, None);
}

#[tokio::test]
async fn test_unknown_symbol() {
    let server = MockServer::start().await;
    mount_chart(&server, "NOPE", 404, not_found_json()).await;

    let client = YahooClient::new(&create_test_config(&server.uri(), &[])).unwrap();
    let err = client
        .daily_bars("NOPE", ymd(2025, 9, 1), ymd(2025, 9, 2))
        .await
        .unwrap_err();

    assert_matches!(err, FetchError::UnknownSymbol(symbol) if symbol == "NOPE");
}

#[tokio::test]
async fn test_server_error_status() {
    let server = MockServer::start().await;
    mount_chart(&server, "AAPL", 503, json!({ "message": "busy" })).await;

    let client = YahooClient::new(&create_test_config(&server.uri(), &[])).unwrap();
    let err = client
        .daily_bars("AAPL", ymd(2025, 9, 1), ymd(2025, 9, 2))
        .await
        .unwrap_err();

    assert_matches!(err, FetchError::Status { status: 503, .. });
}

#[tokio::test]
async fn test_calendar_uses_reference_index() {
    init_test_logging();
    log_test_step("Resolving trade date across a holiday");

    let server = MockServer::start().await;
    // Index traded Wed and Thu; Fri 2025-10-03 was a holiday
    let bars = [
        (ymd(2025, 10, 1), 3400.0, 3420.0, 3390.0, 3410.0, 1),
        (ymd(2025, 10, 2), 3410.0, 3450.0, 3400.0, 3440.0, 1),
    ];
    mount_chart(&server, r"(\^|%5E)KS11", 200, chart_json("^KS11", "KOSPI", 3390.0, &bars)).await;

    let client = YahooClient::new(&create_test_config(&server.uri(), &[])).unwrap();
    let calendar = TradingCalendar::new(&client, Ticker::parse("^KS11").unwrap());

    assert_eq!(calendar.recent_trading_day(ymd(2025, 10, 3)).await, ymd(2025, 10, 2));
    // Sunday with the provider answering nothing useful falls back to Friday
    let empty_server = MockServer::start().await;
    let client = YahooClient::new(&create_test_config(&empty_server.uri(), &[])).unwrap();
    let calendar = TradingCalendar::new(&client, Ticker::parse("^KS11").unwrap());
    assert_eq!(calendar.recent_trading_day(ymd(2025, 10, 5)).await, ymd(2025, 10, 3));
}

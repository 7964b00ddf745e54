#![allow(clippy::unwrap_used)]
// DNS-over-HTTPS tier against a wiremock endpoint.

use std::net::Ipv4Addr;
use std::time::Duration;

use serde_json::json;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vpnbypass_core::dns::query_doh;

async fn setup() -> (MockServer, Url) {
    let server = MockServer::start().await;
    let endpoint = Url::parse(&format!("{}/dns-query", server.uri())).unwrap();
    (server, endpoint)
}

#[tokio::test]
async fn keeps_only_a_records() {
    let (server, endpoint) = setup().await;

    Mock::given(method("GET"))
        .and(path("/dns-query"))
        .and(query_param("name", "web.telegram.org"))
        .and(query_param("type", "A"))
        .and(header("accept", "application/dns-json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Status": 0,
            "Answer": [
                { "name": "web.telegram.org", "type": 5, "TTL": 300, "data": "edge.telegram.org." },
                { "name": "edge.telegram.org", "type": 1, "TTL": 300, "data": "149.154.167.99" },
                { "name": "edge.telegram.org", "type": 1, "TTL": 300, "data": "149.154.167.99" },
                { "name": "edge.telegram.org", "type": 1, "TTL": 300, "data": "not-an-ip" }
            ]
        })))
        .mount(&server)
        .await;

    let ips = query_doh(
        &reqwest::Client::new(),
        &endpoint,
        "web.telegram.org",
        Duration::from_secs(3),
    )
    .await
    .unwrap();

    assert_eq!(ips, vec![Ipv4Addr::new(149, 154, 167, 99)]);
}

#[tokio::test]
async fn nxdomain_has_no_answer_section() {
    let (server, endpoint) = setup().await;

    Mock::given(method("GET"))
        .and(path("/dns-query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Status": 3 })))
        .mount(&server)
        .await;

    let ips = query_doh(
        &reqwest::Client::new(),
        &endpoint,
        "nowhere.invalid",
        Duration::from_secs(3),
    )
    .await
    .unwrap();

    assert!(ips.is_empty());
}

#[tokio::test]
async fn server_error_is_an_error() {
    let (server, endpoint) = setup().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let result = query_doh(
        &reqwest::Client::new(),
        &endpoint,
        "example.com",
        Duration::from_secs(3),
    )
    .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn slow_server_times_out() {
    let (server, endpoint) = setup().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "Answer": [] }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = query_doh(
        &reqwest::Client::new(),
        &endpoint,
        "example.com",
        Duration::from_millis(200),
    )
    .await
    .unwrap_err();

    assert!(err.is_timeout());
}

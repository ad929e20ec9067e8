// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::helpers::{
    post_report, scrape_metrics, send_tcp_request, start_collector, TEST_REPORT,
};
use csp_collector::collector::CspCollector;
use csp_collector::config::Config;
use csp_collector::error::CollectorError;
use csp_collector::label_policy::LabelPolicy;
use std::net::{IpAddr, Ipv4Addr};
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_report_accepted_over_tcp() {
    let running = start_collector(LabelPolicy::Minimal, false).await;

    let response = post_report(running.port, Some("shop.example"), TEST_REPORT).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "");

    let exposition = scrape_metrics(running.port).await;
    assert!(exposition.contains(
        "csp_reports_total{host=\"shop.example\",violated_directive=\"script-src-elem\"} 1"
    ));
    assert!(exposition.contains("csp_reports_errors_total 0"));
}

#[tokio::test]
async fn test_host_header_used_without_forwarded_host() {
    let running = start_collector(LabelPolicy::Minimal, false).await;

    let response = post_report(running.port, None, TEST_REPORT).await;
    assert_eq!(response.status, 200);

    let host = format!("127.0.0.1:{}", running.port);
    assert_eq!(
        running
            .collector
            .metrics
            .reports()
            .with_label_values(&["script-src-elem", host.as_str()])
            .get(),
        1
    );
}

#[tokio::test]
async fn test_wrong_method_over_tcp() {
    let running = start_collector(LabelPolicy::HostScoped, false).await;

    let response = send_tcp_request(
        running.port,
        "/report",
        "GET",
        &[],
        Some(TEST_REPORT.as_bytes().to_vec()),
    )
    .await
    .unwrap();
    assert_eq!(response.status, 405);
    assert_eq!(response.body, "Method not allowed");

    let exposition = scrape_metrics(running.port).await;
    assert!(exposition.contains("csp_reports_errors_total 1"));
    assert!(!exposition.contains("csp_reports_total{"));
}

#[tokio::test]
async fn test_malformed_json_over_tcp() {
    let running = start_collector(LabelPolicy::DocumentScoped, false).await;

    let response = post_report(running.port, Some("shop.example"), "{\"csp-report\": [").await;
    assert_eq!(response.status, 400);
    assert_eq!(response.body, "Invalid JSON");

    let exposition = scrape_metrics(running.port).await;
    assert!(exposition.contains("csp_reports_errors_total 1"));
    assert!(!exposition.contains("csp_reports_total{"));
    assert!(!exposition.contains("csp_reports_detailed_uri_total{"));
}

#[tokio::test]
async fn test_oversized_report_over_tcp() {
    let running = start_collector(LabelPolicy::Minimal, false).await;

    let policy = "script-src 'self' ".repeat(512);
    let body = format!(r#"{{"csp-report": {{"original-policy": "{policy}"}}}}"#);
    let response = post_report(running.port, None, &body).await;
    assert_eq!(response.status, 413);
    assert_eq!(response.body, "Payload too large");
    assert_eq!(running.collector.metrics.errors().get(), 1);
}

#[tokio::test]
async fn test_referrer_counter_only_for_non_empty_referrer() {
    let running = start_collector(LabelPolicy::HostScoped, false).await;

    let without_referrer = r#"{"csp-report": {"violated-directive": "img-src", "referrer": ""}}"#;
    let with_referrer =
        r#"{"csp-report": {"violated-directive": "img-src", "referrer": "https://r.example"}}"#;
    assert_eq!(post_report(running.port, Some("a.example"), without_referrer).await.status, 200);
    assert_eq!(post_report(running.port, Some("a.example"), with_referrer).await.status, 200);

    let exposition = scrape_metrics(running.port).await;
    assert!(exposition.contains(
        "csp_reports_referrers_total{host=\"a.example\",referrer=\"https://r.example\"} 1"
    ));
    assert!(!exposition.contains("referrer=\"\""));
}

#[tokio::test]
async fn test_document_scoped_policy_over_tcp() {
    let running = start_collector(LabelPolicy::DocumentScoped, false).await;

    assert_eq!(post_report(running.port, None, TEST_REPORT).await.status, 200);

    let exposition = scrape_metrics(running.port).await;
    assert!(exposition.contains(
        "csp_reports_detailed_uri_total{base_uri=\"https://site.example/checkout\",full_uri=\"https://cdn.evil.example/skim.js\",violated_directive=\"script-src-elem\"} 1"
    ));
    assert!(!exposition.contains("cart=123"));
}

#[tokio::test]
async fn test_unknown_path_returns_404() {
    let running = start_collector(LabelPolicy::Minimal, false).await;

    let response = send_tcp_request(running.port, "/csp-report", "POST", &[], None)
        .await
        .unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(running.collector.metrics.errors().get(), 0);
}

#[tokio::test]
async fn test_dedicated_metrics_port() {
    let running = start_collector(LabelPolicy::Minimal, true).await;
    let metrics_port = running.metrics_port.unwrap();

    assert_eq!(post_report(running.port, Some("a.example"), TEST_REPORT).await.status, 200);

    let exposition = scrape_metrics(metrics_port).await;
    assert!(exposition.contains("csp_reports_total{host=\"a.example\""));

    // exposition moved off the report port
    let response = send_tcp_request(running.port, "/metrics", "GET", &[], None)
        .await
        .unwrap();
    assert_eq!(response.status, 404);

    // and the metrics port does not accept reports
    let response = send_tcp_request(
        metrics_port,
        "/report",
        "POST",
        &[],
        Some(TEST_REPORT.as_bytes().to_vec()),
    )
    .await
    .unwrap();
    assert_eq!(response.status, 404);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reports_over_tcp() {
    const REQUESTS: u64 = 64;
    let running = start_collector(LabelPolicy::HostScoped, false).await;

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..REQUESTS {
        let port = running.port;
        tasks.spawn(async move { post_report(port, Some("a.example"), TEST_REPORT).await.status });
    }
    while let Some(status) = tasks.join_next().await {
        assert_eq!(status.unwrap(), 200);
    }

    assert_eq!(
        running
            .collector
            .metrics
            .reports()
            .with_label_values(&[
                "script-src-elem",
                "a.example",
                "https://cdn.evil.example/skim.js"
            ])
            .get(),
        REQUESTS
    );
}

#[tokio::test]
async fn test_start_fails_when_port_in_use() {
    let occupied = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = occupied.local_addr().unwrap().port();

    let collector = CspCollector::new(Config {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port,
        ..Default::default()
    })
    .unwrap();

    let result = timeout(
        Duration::from_secs(2),
        collector.start(CancellationToken::new()),
    )
    .await
    .expect("start should fail immediately");
    assert!(matches!(result, Err(CollectorError::Bind { .. })));
}

#[tokio::test]
async fn test_start_stops_on_cancel() {
    let probe = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);

    let collector = CspCollector::new(Config {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port,
        ..Default::default()
    })
    .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = timeout(Duration::from_secs(2), collector.start(cancel))
        .await
        .expect("start should return once cancelled");
    assert!(result.is_ok());
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use csp_collector::collector::{serve_metrics, CspCollector};
use csp_collector::config::{Config, MetricsMode};
use csp_collector::label_policy::LabelPolicy;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::Request;
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

pub const TEST_REPORT: &str = r#"{
    "csp-report": {
        "document-uri": "https://site.example/checkout?cart=123#pay",
        "referrer": "https://r.example/",
        "violated-directive": "script-src-elem",
        "effective-directive": "script-src-elem",
        "original-policy": "script-src 'self'; report-uri /report",
        "blocked-uri": "https://cdn.evil.example/skim.js",
        "status-code": 200
    }
}"#;

pub struct TestResponse {
    pub status: u16,
    pub body: String,
}

/// A collector serving on an ephemeral port until dropped
pub struct RunningCollector {
    pub port: u16,
    pub metrics_port: Option<u16>,
    pub collector: Arc<CspCollector>,
    cancel: CancellationToken,
}

impl Drop for RunningCollector {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn bind_ephemeral() -> TcpListener {
    TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener")
}

/// Starts a collector on `127.0.0.1:0`. With `dedicated_metrics`, the exposition gets a second
/// ephemeral listener; otherwise it is served on the report port.
pub async fn start_collector(policy: LabelPolicy, dedicated_metrics: bool) -> RunningCollector {
    let listener = bind_ephemeral().await;
    let port = listener.local_addr().unwrap().port();
    let metrics_listener = if dedicated_metrics {
        Some(bind_ephemeral().await)
    } else {
        None
    };
    let metrics_port = metrics_listener
        .as_ref()
        .map(|listener| listener.local_addr().unwrap().port());

    let config = Config {
        port,
        metrics: match metrics_port {
            Some(metrics_port) => MetricsMode::DedicatedPort(metrics_port),
            None => MetricsMode::SamePort,
        },
        label_policy: policy,
        max_report_bytes: 4096,
        ..Default::default()
    };
    let collector = Arc::new(CspCollector::new(config).expect("Failed to create collector"));
    let cancel = CancellationToken::new();

    let server = Arc::clone(&collector);
    let server_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = server.serve(listener, server_cancel).await;
    });

    if let Some(metrics_listener) = metrics_listener {
        let metrics = Arc::clone(&collector.metrics);
        let metrics_cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = serve_metrics(metrics_listener, metrics, metrics_cancel).await;
        });
    }

    RunningCollector {
        port,
        metrics_port,
        collector,
        cancel,
    }
}

/// Send an HTTP request over TCP and return the status and body
pub async fn send_tcp_request(
    port: u16,
    uri: &str,
    method: &str,
    headers: &[(&str, &str)],
    body: Option<Vec<u8>>,
) -> Result<TestResponse, Box<dyn std::error::Error + Send + Sync>> {
    let stream = timeout(
        Duration::from_secs(2),
        tokio::net::TcpStream::connect(format!("127.0.0.1:{}", port)),
    )
    .await??;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        let _ = conn.await;
    });

    let mut request_builder = Request::builder()
        .uri(uri)
        .method(method)
        .header("Host", format!("127.0.0.1:{}", port))
        .header("Content-Type", "application/csp-report");
    for (name, value) in headers {
        request_builder = request_builder.header(*name, *value);
    }

    let body_data = body.unwrap_or_default();
    request_builder = request_builder.header("Content-Length", body_data.len().to_string());
    let request = request_builder.body(Full::new(Bytes::from(body_data)))?;

    let response = timeout(Duration::from_secs(2), sender.send_request(request)).await??;
    let status = response.status().as_u16();
    let bytes = response.into_body().collect().await?.to_bytes();

    Ok(TestResponse {
        status,
        body: String::from_utf8(bytes.to_vec())?,
    })
}

pub async fn post_report(
    port: u16,
    forwarded_host: Option<&str>,
    body: &str,
) -> TestResponse {
    let headers: Vec<(&str, &str)> = forwarded_host
        .map(|host| vec![("X-Forwarded-Host", host)])
        .unwrap_or_default();
    send_tcp_request(
        port,
        "/report",
        "POST",
        &headers,
        Some(body.as_bytes().to_vec()),
    )
    .await
    .expect("Failed to send report")
}

pub async fn scrape_metrics(port: u16) -> String {
    let response = send_tcp_request(port, "/metrics", "GET", &[], None)
        .await
        .expect("Failed to scrape metrics");
    assert_eq!(response.status, 200);
    response.body
}

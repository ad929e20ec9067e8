// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{header, http, Method, Request, Response, StatusCode};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{CollectorError, ReportError};
use crate::http_utils::{
    create_empty_http_response, create_http_response, create_not_found_response,
    read_body_limited, verify_request_content_length, Body, HttpResponse,
};
use crate::metrics::ReportMetrics;
use crate::normalize::{request_host, resolve_host};
use crate::report::{decode_report, NormalizedReport};

pub const REPORT_ENDPOINT_PATH: &str = "/report";
pub const METRICS_ENDPOINT_PATH: &str = "/metrics";

pub struct CspCollector {
    pub config: Arc<Config>,
    pub metrics: Arc<ReportMetrics>,
}

impl CspCollector {
    /// Creates a collector with a fresh metrics registry for the configured label policy.
    pub fn new(config: Config) -> Result<Self, CollectorError> {
        let metrics = ReportMetrics::new(config.label_policy)?;
        Ok(CspCollector {
            config: Arc::new(config),
            metrics: Arc::new(metrics),
        })
    }

    /// Binds the report listener (and the metrics listener in dual-port mode) and serves until
    /// `cancel` fires or a listener fails.
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), CollectorError> {
        let now = Instant::now();

        let listener = bind(self.config.report_addr()).await?;
        info!(
            port = self.config.port,
            label_policy = %self.config.label_policy,
            max_report_bytes = self.config.max_report_bytes,
            "Starting CSP report collector"
        );
        let report_server = self.serve(listener, cancel.clone());

        match self.config.metrics_addr() {
            Some(metrics_addr) => {
                let metrics_listener = bind(metrics_addr).await?;
                info!(port = metrics_addr.port(), "Starting metrics server");
                debug!(
                    "Time taken to start the collector: {} ms",
                    now.elapsed().as_millis()
                );
                tokio::try_join!(
                    report_server,
                    serve_metrics(metrics_listener, Arc::clone(&self.metrics), cancel)
                )
                .map(|_| ())
            }
            None => {
                debug!(
                    "Time taken to start the collector: {} ms",
                    now.elapsed().as_millis()
                );
                report_server.await
            }
        }
    }

    /// Serves the report endpoint on an already bound listener.
    pub async fn serve(
        &self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> Result<(), CollectorError> {
        let config = Arc::clone(&self.config);
        let metrics = Arc::clone(&self.metrics);

        let service = service_fn(move |req: Request<Incoming>| {
            // called for each http request
            let config = Arc::clone(&config);
            let metrics = Arc::clone(&metrics);
            CspCollector::endpoint_handler(config, metrics, req)
        });

        serve_tcp(listener, service, cancel).await
    }

    pub async fn endpoint_handler<B>(
        config: Arc<Config>,
        metrics: Arc<ReportMetrics>,
        req: Request<B>,
    ) -> http::Result<HttpResponse>
    where
        B: hyper::body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        match (req.method(), req.uri().path()) {
            (_, REPORT_ENDPOINT_PATH) => Self::report_handler(&config, &metrics, req).await,
            (&Method::GET, METRICS_ENDPOINT_PATH) if config.serves_metrics_on_report_port() => {
                metrics_handler(&metrics)
            }
            _ => create_not_found_response(),
        }
    }

    async fn report_handler<B>(
        config: &Config,
        metrics: &ReportMetrics,
        req: Request<B>,
    ) -> http::Result<HttpResponse>
    where
        B: hyper::body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let host = resolve_host(req.headers(), &request_host(&req));
        let path = req.uri().path().to_string();

        match Self::process_report(config, req, host.clone()).await {
            Ok(report) => {
                if let Err(e) = metrics.record(&report) {
                    error!("Failed to update report metrics: {e}");
                }
                info!(
                    document_uri = %report.document_uri,
                    blocked_uri = %report.blocked_uri,
                    violated_directive = %report.violated_directive,
                    effective_directive = %report.effective_directive,
                    original_policy = %report.original_policy,
                    host = %report.host,
                    referrer = %report.referrer,
                    status_code = report.status_code,
                    "CSP violation report received"
                );
                create_empty_http_response(StatusCode::OK)
            }
            Err(err) => {
                metrics.record_error();
                log_report_error(&err, &host, &path);
                create_http_response(err.client_message(), err.status_code())
            }
        }
    }

    /// Method check, size check, body read, decode. Nothing here touches the metrics, so a
    /// request that fails part way leaves only the error counter to be bumped by the caller.
    async fn process_report<B>(
        config: &Config,
        req: Request<B>,
        host: String,
    ) -> Result<NormalizedReport, ReportError>
    where
        B: hyper::body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if req.method() != Method::POST {
            return Err(ReportError::MethodNotAllowed(req.method().to_string()));
        }

        let (parts, body) = req.into_parts();
        verify_request_content_length(&parts.headers, config.max_report_bytes)?;
        let body = read_body_limited(body, config.max_report_bytes).await?;
        let raw = decode_report(&body)?;

        Ok(NormalizedReport::new(raw, host, config.label_policy))
    }
}

fn log_report_error(err: &ReportError, host: &str, path: &str) {
    match err {
        ReportError::MethodNotAllowed(method) => {
            warn!(method = %method, host = %host, path = %path, "Invalid request method")
        }
        ReportError::PayloadTooLarge { limit } => {
            warn!(limit = *limit, host = %host, "Report body too large")
        }
        ReportError::InvalidJson(_) | ReportError::BodyRead(_) => {
            error!(error = %err, host = %host, "Failed to decode JSON")
        }
    }
}

fn metrics_handler(metrics: &ReportMetrics) -> http::Result<HttpResponse> {
    match metrics.encode() {
        Ok(exposition) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, metrics.content_type())
            .body(Body::from(exposition)),
        Err(e) => {
            error!("Failed to encode metrics: {e}");
            create_http_response(
                "Failed to encode metrics",
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        }
    }
}

/// Serves only `GET /metrics`; used when the exposition has its own port.
pub async fn serve_metrics(
    listener: TcpListener,
    metrics: Arc<ReportMetrics>,
    cancel: CancellationToken,
) -> Result<(), CollectorError> {
    let service = service_fn(move |req: Request<Incoming>| {
        let metrics = Arc::clone(&metrics);
        async move {
            match (req.method(), req.uri().path()) {
                (&Method::GET, METRICS_ENDPOINT_PATH) => metrics_handler(&metrics),
                _ => create_not_found_response(),
            }
        }
    });

    serve_tcp(listener, service, cancel).await
}

async fn bind(addr: SocketAddr) -> Result<TcpListener, CollectorError> {
    TcpListener::bind(addr).await.map_err(|source| {
        error!("Failed to bind {addr}: {source}");
        CollectorError::Bind { addr, source }
    })
}

async fn serve_tcp<S>(
    listener: TcpListener,
    service: S,
    cancel: CancellationToken,
) -> Result<(), CollectorError>
where
    S: hyper::service::Service<Request<Incoming>, Response = HttpResponse>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let server = hyper::server::conn::http1::Builder::new();
    let mut joinset = tokio::task::JoinSet::new();

    loop {
        let conn = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Shutting down listener, dropping {} open connections", joinset.len());
                return Ok(());
            },
            con_res = listener.accept() => match con_res {
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionAborted
                            | io::ErrorKind::ConnectionReset
                            | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    error!("Server error: {e}");
                    return Err(e.into());
                }
                Ok((conn, _)) => conn,
            },
            finished = async {
                match joinset.join_next().await {
                    Some(finished) => finished,
                    None => std::future::pending().await,
                }
            } => match finished {
                Err(e) if e.is_panic() => {
                    error!("Connection handler panicked: {:?}", e);
                    continue;
                },
                Ok(()) | Err(_) => continue,
            },
        };
        let conn = hyper_util::rt::TokioIo::new(conn);
        let server = server.clone();
        let service = service.clone();
        joinset.spawn(async move {
            if let Err(e) = server.serve_connection(conn, service).await {
                debug!("Connection error: {e}");
            }
        });
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use hyper::StatusCode;

/// Per-request failures of the report endpoint. None of these is fatal; each one is counted
/// once in `csp_reports_errors_total` and answered with a fixed, generic body.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Method {0} not allowed")]
    MethodNotAllowed(String),

    #[error("Report body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Failed to decode JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Failed to read report body: {0}")]
    BodyRead(String),
}

impl ReportError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ReportError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ReportError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ReportError::InvalidJson(_) | ReportError::BodyRead(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// The body sent back to the client. Never includes parser or I/O details.
    pub fn client_message(&self) -> &'static str {
        match self {
            ReportError::MethodNotAllowed(_) => "Method not allowed",
            ReportError::PayloadTooLarge { .. } => "Payload too large",
            ReportError::InvalidJson(_) | ReportError::BodyRead(_) => "Invalid JSON",
        }
    }
}

/// Errors that stop the collector process (or prevent it from starting)
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

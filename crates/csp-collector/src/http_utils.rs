// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Bytes;
use hyper::{header, http, http::HeaderMap, Response, StatusCode};

use crate::error::ReportError;

pub type Body = Full<Bytes>;
pub type HttpResponse = Response<Body>;

/// Builds a `text/plain` response with a fixed body.
pub fn create_http_response(message: &'static str, status: StatusCode) -> http::Result<HttpResponse> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(message))
}

/// 200 with an empty body, as browsers expect for an accepted report.
pub fn create_empty_http_response(status: StatusCode) -> http::Result<HttpResponse> {
    Response::builder().status(status).body(Body::default())
}

pub fn create_not_found_response() -> http::Result<HttpResponse> {
    create_http_response("Not found", StatusCode::NOT_FOUND)
}

/// Rejects a request up front when its declared `Content-Length` exceeds `max_content_length`.
///
/// A missing or unreadable header is not an error here; browsers may stream reports with
/// `Transfer-Encoding: chunked`, and those are capped while reading in [`read_body_limited`].
pub fn verify_request_content_length(
    header_map: &HeaderMap,
    max_content_length: usize,
) -> Result<(), ReportError> {
    let content_length = header_map
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    match content_length {
        Some(length) if length > max_content_length => Err(ReportError::PayloadTooLarge {
            limit: max_content_length,
        }),
        _ => Ok(()),
    }
}

/// Collects `body`, failing with [`ReportError::PayloadTooLarge`] once more than `limit` bytes
/// arrive. Any other read failure, including the client going away mid-body, is a
/// [`ReportError::BodyRead`].
pub async fn read_body_limited<B>(body: B, limit: usize) -> Result<Bytes, ReportError>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(ReportError::PayloadTooLarge { limit })
        }
        Err(e) => Err(ReportError::BodyRead(e.to_string())),
    }
}

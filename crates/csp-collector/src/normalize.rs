// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Host attribution and document URI canonicalization.

use hyper::header::{self, HeaderMap};
use hyper::Request;
use url::{ParseError, Url};

pub const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Returns `X-Forwarded-Host` if it is present and non-empty, otherwise `request_host`.
///
/// The forwarded header is trusted as-is. It must be stripped or overwritten by the ingress in
/// front of the collector; if clients can set it, they control the `host` label and its
/// cardinality.
pub fn resolve_host(headers: &HeaderMap, request_host: &str) -> String {
    headers
        .get(X_FORWARDED_HOST)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .unwrap_or(request_host)
        .to_string()
}

/// The host the request was addressed to, including the port when the client sent one.
pub fn request_host<B>(req: &Request<B>) -> String {
    req.headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|authority| authority.to_string()))
        .unwrap_or_default()
}

/// Strips the query and fragment from `raw` so per-session parameters collapse onto one page.
///
/// Absolute URLs are re-serialized, which lowercases the host and gives an empty path a
/// trailing `/` (`https://SITE.example?x=1` becomes `https://site.example/`). Relative
/// references are cut at the first `?` or `#`. Anything else that fails to parse is returned
/// unchanged.
pub fn canonicalize_uri(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.into()
        }
        Err(ParseError::RelativeUrlWithoutBase) => raw
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
        Err(_) => raw.to_string(),
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoding of browser CSP violation reports.
//!
//! Browsers POST a document of the form:
//!
//! ```json
//! {
//!   "csp-report": {
//!     "document-uri": "https://example.com/page",
//!     "referrer": "",
//!     "violated-directive": "script-src",
//!     "effective-directive": "script-src",
//!     "original-policy": "script-src 'self'",
//!     "blocked-uri": "https://cdn.example.net/x.js",
//!     "status-code": 200
//!   }
//! }
//! ```
//!
//! Every field is optional. Missing or `null` members read as empty strings (or `0`), since
//! browsers legitimately omit them.

use serde::de::{Error as _, Unexpected};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ReportError;
use crate::label_policy::LabelPolicy;
use crate::normalize::canonicalize_uri;

const REPORT_MEMBER: &str = "csp-report";

/// The `csp-report` member exactly as the client sent it
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RawReport {
    pub document_uri: String,
    pub referrer: String,
    pub violated_directive: String,
    pub effective_directive: String,
    pub original_policy: String,
    pub blocked_uri: String,
    pub status_code: i64,
}

impl RawReport {
    fn from_object(object: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        Ok(RawReport {
            document_uri: field(object, "document-uri")?,
            referrer: field(object, "referrer")?,
            violated_directive: field(object, "violated-directive")?,
            effective_directive: field(object, "effective-directive")?,
            original_policy: field(object, "original-policy")?,
            blocked_uri: field(object, "blocked-uri")?,
            status_code: field(object, "status-code")?,
        })
    }
}

/// Looks up a member by name, falling back to an ASCII case-insensitive match.
///
/// Repeated keys collapse to their last value while the document is parsed.
fn member<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    object.get(name).or_else(|| {
        object
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

fn field<'a, T>(object: &'a Map<String, Value>, name: &str) -> Result<T, serde_json::Error>
where
    T: Default + Deserialize<'a>,
{
    match member(object, name) {
        Some(value) => Ok(Option::<T>::deserialize(value)?.unwrap_or_default()),
        None => Ok(T::default()),
    }
}

fn expect_object(value: &Value) -> Result<&Map<String, Value>, serde_json::Error> {
    let unexpected = match value {
        Value::Object(object) => return Ok(object),
        Value::Null => Unexpected::Unit,
        Value::Bool(b) => Unexpected::Bool(*b),
        Value::Number(_) => Unexpected::Other("number"),
        Value::String(s) => Unexpected::Str(s),
        Value::Array(_) => Unexpected::Seq,
    };
    Err(serde_json::Error::invalid_type(unexpected, &"a JSON object"))
}

/// Parses a request body as a `{"csp-report": {...}}` envelope.
///
/// The body must hold exactly one JSON object, and `csp-report` must be an object or `null`;
/// arrays are rejected at both levels. Trailing bytes other than whitespace are rejected.
/// Member names match case-insensitively and a repeated member keeps its last value.
/// No URI or directive validation happens here.
pub fn decode_report(body: &[u8]) -> Result<RawReport, ReportError> {
    let document: Value = serde_json::from_slice(body)?;
    let envelope = expect_object(&document)?;
    match member(envelope, REPORT_MEMBER) {
        None | Some(Value::Null) => Ok(RawReport::default()),
        Some(report) => Ok(RawReport::from_object(expect_object(report)?)?),
    }
}

/// A decoded report attributed to a host. Lives for a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedReport {
    pub host: String,
    pub document_uri: String,
    /// Set only when the active policy canonicalizes document URIs.
    pub canonical_document_uri: Option<String>,
    pub referrer: String,
    pub violated_directive: String,
    pub effective_directive: String,
    pub original_policy: String,
    pub blocked_uri: String,
    pub status_code: i64,
}

impl NormalizedReport {
    pub fn new(raw: RawReport, host: String, policy: LabelPolicy) -> Self {
        let canonical_document_uri = policy
            .canonicalizes_document_uri()
            .then(|| canonicalize_uri(&raw.document_uri));
        NormalizedReport {
            host,
            document_uri: raw.document_uri,
            canonical_document_uri,
            referrer: raw.referrer,
            violated_directive: raw.violated_directive,
            effective_directive: raw.effective_directive,
            original_policy: raw.original_policy,
            blocked_uri: raw.blocked_uri,
            status_code: raw.status_code,
        }
    }

    /// Document URI as used for metric labels.
    pub fn document_uri_label(&self) -> &str {
        self.canonical_document_uri
            .as_deref()
            .unwrap_or(&self.document_uri)
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Label selection for the report aggregates.
//!
//! Every aggregate the collector exports has a fixed, ordered list of label names that is decided
//! once at startup by the active [`LabelPolicy`]. Label values are only ever read from the declared
//! fields of a [`NormalizedReport`]; nothing in the payload can add a label dimension.
//!
//! The three policies trade detail against series cardinality:
//!
//! | Policy | Primary labels | Risk |
//! |---|---|---|
//! | [`LabelPolicy::Minimal`] | directive, host | bounded by directives x hosts |
//! | [`LabelPolicy::HostScoped`] | directive, host, blocked URI | blocked URI and referrer are client strings |
//! | [`LabelPolicy::DocumentScoped`] | directive, canonical document URI, blocked URI | long tail of paths and origins |
//!
//! `host` is taken from `X-Forwarded-Host` when present, so the host axis is only bounded if the
//! ingress in front of the collector strips or overwrites that header.

use std::fmt;
use std::str::FromStr;

use crate::report::NormalizedReport;

/// The aggregates a policy may declare. `csp_reports_errors_total` is not listed here because it
/// carries no labels and exists under every policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMetric {
    Reports,
    StatusCodes,
    Referrers,
    BlockedUris,
    DetailedUri,
}

impl ReportMetric {
    pub fn name(&self) -> &'static str {
        match self {
            ReportMetric::Reports => "csp_reports_total",
            ReportMetric::StatusCodes => "csp_reports_status_codes",
            ReportMetric::Referrers => "csp_reports_referrers_total",
            ReportMetric::BlockedUris => "csp_reports_blocked_uris_total",
            ReportMetric::DetailedUri => "csp_reports_detailed_uri_total",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            ReportMetric::Reports => "Total number of CSP violation reports received",
            ReportMetric::StatusCodes => "Status codes distribution for CSP violation reports",
            ReportMetric::Referrers => "Total number of CSP violations by referrer",
            ReportMetric::BlockedUris => "Total number of blocked URIs by directive",
            ReportMetric::DetailedUri => "Total number of CSP violations with full URI details",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelPolicy {
    /// Directive and host only.
    #[default]
    Minimal,
    /// Adds the blocked URI to the report counter, plus per-host status codes and referrers.
    HostScoped,
    /// Keys everything by the canonicalized document URI and adds the detailed URI counter.
    DocumentScoped,
}

const MINIMAL_METRICS: &[ReportMetric] = &[ReportMetric::Reports];
const HOST_SCOPED_METRICS: &[ReportMetric] = &[
    ReportMetric::Reports,
    ReportMetric::StatusCodes,
    ReportMetric::Referrers,
];
const DOCUMENT_SCOPED_METRICS: &[ReportMetric] = &[
    ReportMetric::Reports,
    ReportMetric::StatusCodes,
    ReportMetric::Referrers,
    ReportMetric::BlockedUris,
    ReportMetric::DetailedUri,
];

impl LabelPolicy {
    /// Aggregates exported under this policy, in registration order.
    pub fn metrics(&self) -> &'static [ReportMetric] {
        match self {
            LabelPolicy::Minimal => MINIMAL_METRICS,
            LabelPolicy::HostScoped => HOST_SCOPED_METRICS,
            LabelPolicy::DocumentScoped => DOCUMENT_SCOPED_METRICS,
        }
    }

    pub fn declares(&self, metric: ReportMetric) -> bool {
        self.metrics().contains(&metric)
    }

    /// Whether `document-uri` is stripped of query and fragment before use as a label.
    pub fn canonicalizes_document_uri(&self) -> bool {
        matches!(self, LabelPolicy::DocumentScoped)
    }

    /// Ordered labels of `metric`. Empty when the policy does not declare it.
    pub fn labels(&self, metric: ReportMetric) -> &'static [Label] {
        use Label::*;
        use ReportMetric::*;
        match (self, metric) {
            (LabelPolicy::Minimal, Reports) => &[ViolatedDirective, Host],
            (LabelPolicy::HostScoped, Reports) => &[ViolatedDirective, Host, BlockedUri],
            (LabelPolicy::HostScoped, StatusCodes) => &[Host],
            (LabelPolicy::HostScoped, Referrers) => &[Host, Referrer],
            (LabelPolicy::DocumentScoped, Reports) => &[ViolatedDirective, DocumentUri, BlockedUri],
            (LabelPolicy::DocumentScoped, StatusCodes) => &[DocumentUri],
            (LabelPolicy::DocumentScoped, Referrers) => &[DocumentUri, Referrer],
            (LabelPolicy::DocumentScoped, BlockedUris) => {
                &[DocumentUri, ViolatedDirective, BlockedUri]
            }
            (LabelPolicy::DocumentScoped, DetailedUri) => &[BaseUri, FullUri, ViolatedDirective],
            _ => &[],
        }
    }

    /// Ordered label names of `metric`, as registered with prometheus.
    pub fn label_names(&self, metric: ReportMetric) -> Vec<&'static str> {
        self.labels(metric).iter().map(Label::name).collect()
    }

    /// Label values of `metric` for `report`, in the same order as [`Self::label_names`].
    pub fn label_values<'a>(
        &self,
        metric: ReportMetric,
        report: &'a NormalizedReport,
    ) -> Vec<&'a str> {
        self.labels(metric)
            .iter()
            .map(|label| label.value(report))
            .collect()
    }
}

/// A label dimension and the report field it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    ViolatedDirective,
    Host,
    BlockedUri,
    DocumentUri,
    Referrer,
    BaseUri,
    FullUri,
}

impl Label {
    pub fn name(&self) -> &'static str {
        match self {
            Label::ViolatedDirective => "violated_directive",
            Label::Host => "host",
            Label::BlockedUri => "blocked_uri",
            Label::DocumentUri => "document_uri",
            Label::Referrer => "referrer",
            Label::BaseUri => "base_uri",
            Label::FullUri => "full_uri",
        }
    }

    pub fn value<'a>(&self, report: &'a NormalizedReport) -> &'a str {
        match self {
            Label::ViolatedDirective => &report.violated_directive,
            Label::Host => &report.host,
            Label::BlockedUri | Label::FullUri => &report.blocked_uri,
            Label::DocumentUri | Label::BaseUri => report.document_uri_label(),
            Label::Referrer => &report.referrer,
        }
    }
}

impl FromStr for LabelPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "minimal" | "a" => Ok(LabelPolicy::Minimal),
            "host" | "host-scoped" | "b" => Ok(LabelPolicy::HostScoped),
            "document" | "document-scoped" | "c" => Ok(LabelPolicy::DocumentScoped),
            other => Err(format!(
                "Unknown label policy '{other}'. Must be one of: minimal, host-scoped, document-scoped"
            )),
        }
    }
}

impl fmt::Display for LabelPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelPolicy::Minimal => write!(f, "minimal"),
            LabelPolicy::HostScoped => write!(f, "host-scoped"),
            LabelPolicy::DocumentScoped => write!(f, "document-scoped"),
        }
    }
}

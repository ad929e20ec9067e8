// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Aggregates updated for every report.
//!
//! [`ReportMetrics`] owns its own Prometheus registry. The server constructs one at startup and
//! hands it to the request handler, so tests can build a fresh instance instead of sharing
//! process-wide state. Counter and histogram updates are atomic; concurrent requests need no
//! extra locking.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use tracing::debug;

use crate::label_policy::{LabelPolicy, ReportMetric};
use crate::report::NormalizedReport;

pub const ERRORS_METRIC_NAME: &str = "csp_reports_errors_total";

/// Bucket bounds for `status-code`. These mark HTTP status classes rather than a distribution.
pub const STATUS_CODE_BUCKETS: [f64; 4] = [200.0, 300.0, 400.0, 500.0];

pub struct ReportMetrics {
    policy: LabelPolicy,
    registry: Registry,
    errors: IntCounter,
    reports: IntCounterVec,
    status_codes: Option<HistogramVec>,
    referrers: Option<IntCounterVec>,
    blocked_uris: Option<IntCounterVec>,
    detailed_uri: Option<IntCounterVec>,
}

impl ReportMetrics {
    /// Registers the error counter plus every aggregate `policy` declares.
    pub fn new(policy: LabelPolicy) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let errors = IntCounter::new(
            ERRORS_METRIC_NAME,
            "Total number of errors processing CSP reports",
        )?;
        registry.register(Box::new(errors.clone()))?;

        let reports = register_counter(&registry, policy, ReportMetric::Reports)?;
        let status_codes = if policy.declares(ReportMetric::StatusCodes) {
            let metric = ReportMetric::StatusCodes;
            let histogram = HistogramVec::new(
                HistogramOpts::new(metric.name(), metric.help())
                    .buckets(STATUS_CODE_BUCKETS.to_vec()),
                &policy.label_names(metric),
            )?;
            registry.register(Box::new(histogram.clone()))?;
            Some(histogram)
        } else {
            None
        };
        let referrers = register_optional_counter(&registry, policy, ReportMetric::Referrers)?;
        let blocked_uris = register_optional_counter(&registry, policy, ReportMetric::BlockedUris)?;
        let detailed_uri = register_optional_counter(&registry, policy, ReportMetric::DetailedUri)?;

        debug!(
            "Registered {} report aggregates for label policy {}",
            policy.metrics().len(),
            policy
        );

        Ok(ReportMetrics {
            policy,
            registry,
            errors,
            reports,
            status_codes,
            referrers,
            blocked_uris,
            detailed_uri,
        })
    }

    pub fn policy(&self) -> LabelPolicy {
        self.policy
    }

    /// Updates every declared aggregate once for `report`. The referrer counter is skipped when
    /// the referrer is empty.
    pub fn record(&self, report: &NormalizedReport) -> Result<(), prometheus::Error> {
        let policy = self.policy;

        self.reports
            .get_metric_with_label_values(&policy.label_values(ReportMetric::Reports, report))?
            .inc();

        if let Some(status_codes) = &self.status_codes {
            status_codes
                .get_metric_with_label_values(
                    &policy.label_values(ReportMetric::StatusCodes, report),
                )?
                .observe(report.status_code as f64);
        }

        if let Some(referrers) = &self.referrers {
            if !report.referrer.is_empty() {
                referrers
                    .get_metric_with_label_values(
                        &policy.label_values(ReportMetric::Referrers, report),
                    )?
                    .inc();
            }
        }

        for (metric, counter) in [
            (ReportMetric::BlockedUris, &self.blocked_uris),
            (ReportMetric::DetailedUri, &self.detailed_uri),
        ] {
            if let Some(counter) = counter {
                counter
                    .get_metric_with_label_values(&policy.label_values(metric, report))?
                    .inc();
            }
        }

        Ok(())
    }

    pub fn record_error(&self) {
        self.errors.inc();
    }

    pub fn errors(&self) -> &IntCounter {
        &self.errors
    }

    pub fn reports(&self) -> &IntCounterVec {
        &self.reports
    }

    pub fn status_codes(&self) -> Option<&HistogramVec> {
        self.status_codes.as_ref()
    }

    pub fn referrers(&self) -> Option<&IntCounterVec> {
        self.referrers.as_ref()
    }

    pub fn blocked_uris(&self) -> Option<&IntCounterVec> {
        self.blocked_uris.as_ref()
    }

    pub fn detailed_uri(&self) -> Option<&IntCounterVec> {
        self.detailed_uri.as_ref()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Renders all series in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}

fn register_counter(
    registry: &Registry,
    policy: LabelPolicy,
    metric: ReportMetric,
) -> Result<IntCounterVec, prometheus::Error> {
    let counter = IntCounterVec::new(
        Opts::new(metric.name(), metric.help()),
        &policy.label_names(metric),
    )?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

fn register_optional_counter(
    registry: &Registry,
    policy: LabelPolicy,
    metric: ReportMetric,
) -> Result<Option<IntCounterVec>, prometheus::Error> {
    if policy.declares(metric) {
        register_counter(registry, policy, metric).map(Some)
    } else {
        Ok(None)
    }
}

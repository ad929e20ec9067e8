// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Collector for browser Content-Security-Policy violation reports.
//!
//! Reports POSTed to `/report` are decoded, attributed to a host, turned into a fixed set of
//! Prometheus aggregates chosen by a [`label_policy::LabelPolicy`], and logged as one structured
//! event each. Nothing is stored beyond the in-memory counters.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod collector;
pub mod config;
pub mod error;
pub mod http_utils;
pub mod label_policy;
pub mod metrics;
pub mod normalize;
pub mod report;

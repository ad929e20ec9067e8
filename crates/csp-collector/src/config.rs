// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::error::CollectorError;
use crate::label_policy::LabelPolicy;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_METRICS_PORT: u16 = 9090;
pub const DEFAULT_MAX_REPORT_BYTES: usize = 16 * 1024;
const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Where the Prometheus exposition is served, if anywhere
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsMode {
    Disabled,
    /// `GET /metrics` on the report listener. Selected by setting `METRICS_PORT` to `PORT`.
    SamePort,
    /// `GET /metrics` on its own listener
    DedicatedPort(u16),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Address both listeners bind to
    pub host: IpAddr,
    /// Report listener port
    pub port: u16,
    pub metrics: MetricsMode,
    pub label_policy: LabelPolicy,
    /// Largest accepted report body, in bytes
    pub max_report_bytes: usize,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST,
            port: DEFAULT_PORT,
            metrics: MetricsMode::Disabled,
            label_policy: LabelPolicy::default(),
            max_report_bytes: DEFAULT_MAX_REPORT_BYTES,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Reads `HOST`, `PORT`, `ENABLE_METRICS`, `METRICS_PORT`, `LABEL_POLICY`,
    /// `MAX_REPORT_BYTES` and `LOG_LEVEL`.
    ///
    /// With metrics enabled the exposition gets its own listener on `METRICS_PORT`
    /// (default 9090), unless `METRICS_PORT` is set to the report port.
    pub fn from_env() -> Result<Self, CollectorError> {
        let host = match env::var("HOST") {
            Ok(host) => host.parse::<IpAddr>().map_err(|_| {
                CollectorError::InvalidConfig(format!("HOST '{host}' is not an IP address"))
            })?,
            Err(_) => DEFAULT_HOST,
        };
        let port = parse_env_number("PORT")?.unwrap_or(DEFAULT_PORT);

        let enable_metrics = env::var("ENABLE_METRICS")
            .map(|val| val.to_lowercase() == "true")
            .unwrap_or(false);
        let metrics = match (enable_metrics, parse_env_number::<u16>("METRICS_PORT")?) {
            (false, _) => MetricsMode::Disabled,
            (true, Some(metrics_port)) if metrics_port == port => MetricsMode::SamePort,
            (true, Some(metrics_port)) => MetricsMode::DedicatedPort(metrics_port),
            (true, None) => MetricsMode::DedicatedPort(DEFAULT_METRICS_PORT),
        };

        let label_policy = match env::var("LABEL_POLICY") {
            Ok(val) => val
                .parse::<LabelPolicy>()
                .map_err(CollectorError::InvalidConfig)?,
            Err(_) => LabelPolicy::default(),
        };
        let max_report_bytes =
            parse_env_number("MAX_REPORT_BYTES")?.unwrap_or(DEFAULT_MAX_REPORT_BYTES);
        let log_level = env::var("LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|_| "info".to_string());

        let config = Self {
            host,
            port,
            metrics,
            label_policy,
            max_report_bytes,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CollectorError> {
        if self.port == 0 {
            return Err(CollectorError::InvalidConfig(
                "PORT must be greater than 0".to_string(),
            ));
        }

        if let MetricsMode::DedicatedPort(metrics_port) = self.metrics {
            if metrics_port == 0 {
                return Err(CollectorError::InvalidConfig(
                    "METRICS_PORT must be greater than 0".to_string(),
                ));
            }
            if metrics_port == self.port {
                return Err(CollectorError::InvalidConfig(format!(
                    "metrics port {metrics_port} collides with PORT; set METRICS_PORT to another port, or to PORT to serve /metrics on the report listener"
                )));
            }
        }

        if self.max_report_bytes == 0 {
            return Err(CollectorError::InvalidConfig(
                "MAX_REPORT_BYTES must be greater than 0".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(CollectorError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    pub fn report_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        match self.metrics {
            MetricsMode::DedicatedPort(port) => Some(SocketAddr::new(self.host, port)),
            _ => None,
        }
    }

    pub fn serves_metrics_on_report_port(&self) -> bool {
        self.metrics == MetricsMode::SamePort
    }
}

fn parse_env_number<T: std::str::FromStr>(name: &str) -> Result<Option<T>, CollectorError> {
    match env::var(name) {
        Ok(val) => val.trim().parse::<T>().map(Some).map_err(|_| {
            CollectorError::InvalidConfig(format!("{name} '{val}' is not a valid number"))
        }),
        Err(_) => Ok(None),
    }
}

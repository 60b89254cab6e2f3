// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client configuration.
//!
//! Every field is optional in spirit: zero-valued limits are replaced with their defaults by
//! [`Config::normalized`], mirroring how the client treats an unset option.

use crate::error::Error;
use std::env;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Endpoint for the Objects API
pub const DEFAULT_BASE_ENDPOINT: &str = "https://objects.segment.com";

/// Source reported in every batch envelope
pub const DEFAULT_SOURCE: &str = "project";

pub const DEFAULT_MAX_BATCH_BYTES: usize = 500 << 10;
pub const DEFAULT_MAX_BATCH_COUNT: usize = 100;
pub const DEFAULT_MAX_BATCH_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_DISPATCH_CONCURRENCY: usize = 10;
pub const DEFAULT_RETRY_MAX_ELAPSED: Duration = Duration::from_secs(10);
pub const DEFAULT_MAILBOX_CAPACITY: usize = 100;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the intake, `/v1/set` is appended to it
    pub base_endpoint: String,
    /// Identifier of the producing system
    pub source: String,
    /// Upper bound on the summed size of the serialized objects in one batch
    pub max_batch_bytes: usize,
    /// Upper bound on the number of objects in one batch
    pub max_batch_count: usize,
    /// A collection with buffered objects is flushed at least this often
    pub max_batch_interval: Duration,
    /// Emit warnings for dropped objects and errors for abandoned deliveries
    pub log_errors: bool,
    /// Maximum number of deliveries in flight across all collections
    pub dispatch_concurrency: usize,
    /// A delivery is abandoned once retrying would take longer than this
    pub retry_max_elapsed: Duration,
    /// Capacity of each collection's mailbox; `set` waits when it is full
    pub mailbox_capacity: usize,
    /// Timeout applied to each individual HTTP request
    pub request_timeout: Duration,
    /// Optional HTTPS proxy, ignored when `http_client` is provided
    pub https_proxy: Option<String>,
    /// Caller-provided HTTP transport
    pub http_client: Option<reqwest::Client>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_endpoint: DEFAULT_BASE_ENDPOINT.to_string(),
            source: DEFAULT_SOURCE.to_string(),
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            max_batch_count: DEFAULT_MAX_BATCH_COUNT,
            max_batch_interval: DEFAULT_MAX_BATCH_INTERVAL,
            log_errors: false,
            dispatch_concurrency: DEFAULT_DISPATCH_CONCURRENCY,
            retry_max_elapsed: DEFAULT_RETRY_MAX_ELAPSED,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            https_proxy: None,
            http_client: None,
        }
    }
}

impl Config {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, Error> {
        let defaults = Self::default();

        let base_endpoint =
            env::var("OBJECTS_BASE_ENDPOINT").unwrap_or(defaults.base_endpoint);
        let source = env::var("OBJECTS_SOURCE").unwrap_or(defaults.source);
        let max_batch_bytes =
            parse_env("OBJECTS_MAX_BATCH_BYTES").unwrap_or(defaults.max_batch_bytes);
        let max_batch_count =
            parse_env("OBJECTS_MAX_BATCH_COUNT").unwrap_or(defaults.max_batch_count);
        let max_batch_interval = parse_env("OBJECTS_MAX_BATCH_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.max_batch_interval);
        let log_errors = env::var("OBJECTS_LOG_ERRORS")
            .map(|val| val.to_lowercase() == "true")
            .unwrap_or(defaults.log_errors);
        let dispatch_concurrency = parse_env("OBJECTS_DISPATCH_CONCURRENCY")
            .unwrap_or(defaults.dispatch_concurrency);
        let retry_max_elapsed = parse_env("OBJECTS_RETRY_MAX_ELAPSED_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_max_elapsed);
        let mailbox_capacity =
            parse_env("OBJECTS_MAILBOX_CAPACITY").unwrap_or(defaults.mailbox_capacity);
        let https_proxy = env::var("OBJECTS_HTTPS_PROXY")
            .or_else(|_| env::var("HTTPS_PROXY"))
            .ok();

        let config = Self {
            base_endpoint,
            source,
            max_batch_bytes,
            max_batch_count,
            max_batch_interval,
            log_errors,
            dispatch_concurrency,
            retry_max_elapsed,
            mailbox_capacity,
            https_proxy,
            ..defaults
        }
        .normalized();

        config.validate()?;
        Ok(config)
    }

    /// Replace unset (zero or empty) options with their defaults
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.base_endpoint.trim().is_empty() {
            self.base_endpoint = DEFAULT_BASE_ENDPOINT.to_string();
        }
        if self.source.trim().is_empty() {
            self.source = DEFAULT_SOURCE.to_string();
        }
        if self.max_batch_bytes == 0 {
            self.max_batch_bytes = DEFAULT_MAX_BATCH_BYTES;
        }
        if self.max_batch_count == 0 {
            self.max_batch_count = DEFAULT_MAX_BATCH_COUNT;
        }
        if self.max_batch_interval.is_zero() {
            self.max_batch_interval = DEFAULT_MAX_BATCH_INTERVAL;
        }
        if self.dispatch_concurrency == 0 {
            self.dispatch_concurrency = DEFAULT_DISPATCH_CONCURRENCY;
        }
        if self.retry_max_elapsed.is_zero() {
            self.retry_max_elapsed = DEFAULT_RETRY_MAX_ELAPSED;
        }
        if self.mailbox_capacity == 0 {
            self.mailbox_capacity = DEFAULT_MAILBOX_CAPACITY;
        }
        if self.request_timeout.is_zero() {
            self.request_timeout = DEFAULT_REQUEST_TIMEOUT;
        }
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Error> {
        reqwest::Url::parse(&self.base_endpoint).map_err(|e| {
            Error::InvalidConfig(format!(
                "base endpoint '{}' is not a valid URL: {e}",
                self.base_endpoint
            ))
        })?;

        if self.source.trim().is_empty() {
            return Err(Error::InvalidConfig("source cannot be empty".to_string()));
        }

        if self.max_batch_count == 0 || self.max_batch_bytes == 0 {
            return Err(Error::InvalidConfig(
                "batch ceilings must be greater than 0".to_string(),
            ));
        }

        if self.dispatch_concurrency == 0 || self.mailbox_capacity == 0 {
            return Err(Error::InvalidConfig(
                "dispatch concurrency and mailbox capacity must be greater than 0".to_string(),
            ));
        }

        // tokio panics when a semaphore or channel is sized above this
        if self.dispatch_concurrency > Semaphore::MAX_PERMITS {
            return Err(Error::InvalidConfig(format!(
                "dispatch concurrency must not exceed {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.mailbox_capacity > Semaphore::MAX_PERMITS {
            return Err(Error::InvalidConfig(format!(
                "mailbox capacity must not exceed {}",
                Semaphore::MAX_PERMITS
            )));
        }

        Ok(())
    }

    /// Full URL batches are posted to
    pub(crate) fn set_url(&self) -> String {
        format!("{}/v1/set", self.base_endpoint.trim_end_matches('/'))
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|val| val.trim().parse::<T>().ok())
}

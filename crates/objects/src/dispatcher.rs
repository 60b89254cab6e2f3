// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of flushed batches to the Objects API.
//!
//! A worker hands a drained buffer to [`Dispatcher::dispatch`], which waits for one of a fixed
//! number of delivery slots and then posts the batch from its own task, so the worker can go
//! back to accumulating while the request is in flight. Failed requests are retried with
//! exponential backoff until the retry budget is spent; the batch is then dropped.

use crate::backoff::ExponentialBackoff;
use crate::config::Config;
use crate::error::Error;
use crate::http::get_client;
use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

const USER_AGENT_VALUE: &str = concat!("objects-rust/", env!("CARGO_PKG_VERSION"));

/// Envelope posted for every flush, minus the objects array
#[derive(Debug, Serialize)]
pub struct Batch<'a> {
    pub source: &'a str,
    pub collection: &'a str,
    pub write_key: &'a str,
}

impl Batch<'_> {
    /// Encodes the envelope with `objects`, an already serialized JSON array, appended as its
    /// last field. The array bytes are copied verbatim.
    pub fn encode(&self, objects: &[u8]) -> Result<Bytes, Error> {
        let mut body = serde_json::to_vec(self)?;
        // drop the closing brace and reopen the object for the array
        body.pop();
        body.reserve(objects.len() + 12);
        body.extend_from_slice(br#","objects":"#);
        body.extend_from_slice(objects);
        body.push(b'}');
        Ok(Bytes::from(body))
    }
}

pub struct Dispatcher {
    client: reqwest::Client,
    url: String,
    source: String,
    write_key: String,
    permits: Arc<Semaphore>,
    deliveries: TaskTracker,
    retry_max_elapsed: Duration,
    log_errors: bool,
}

impl Dispatcher {
    pub fn new(write_key: String, config: &Config) -> Self {
        Dispatcher {
            client: get_client(config),
            url: config.set_url(),
            source: config.source.clone(),
            write_key,
            permits: Arc::new(Semaphore::new(config.dispatch_concurrency)),
            deliveries: TaskTracker::new(),
            retry_max_elapsed: config.retry_max_elapsed,
            log_errors: config.log_errors,
        }
    }

    /// Starts delivering `objects`, a JSON array of serialized objects, for `collection`.
    ///
    /// Returns once a delivery slot is acquired and the request task is spawned. Empty arrays
    /// are never sent.
    pub async fn dispatch(self: &Arc<Self>, collection: Arc<str>, objects: Vec<u8>, count: usize) {
        if count == 0 {
            return;
        }

        let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
            error!("Delivery slots closed, dropping {count} objects for `{collection}`");
            return;
        };

        let this = Arc::clone(self);
        self.deliveries.spawn(async move {
            let _permit = permit;
            this.deliver_and_report(&collection, &objects, count).await;
        });
    }

    async fn deliver_and_report(&self, collection: &str, objects: &[u8], count: usize) {
        let time = Instant::now();
        match self.deliver(collection, objects).await {
            Ok(()) => debug!(
                "Delivered {count} objects for `{collection}` in {} ms",
                time.elapsed().as_millis()
            ),
            Err(e) => {
                if self.log_errors {
                    error!(
                        "Batch failed making request, {count} objects for `{collection}` abandoned: {e}"
                    );
                }
            }
        }
    }

    /// Builds the envelope and posts it, retrying until the retry budget is exhausted
    pub async fn deliver(&self, collection: &str, objects: &[u8]) -> Result<(), Error> {
        let payload = Batch {
            source: &self.source,
            collection,
            write_key: &self.write_key,
        }
        .encode(objects)?;

        let mut backoff = ExponentialBackoff::new(self.retry_max_elapsed);
        let mut attempts = 0;
        loop {
            attempts += 1;
            let err = match self.send(payload.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            debug!("Delivery attempt {attempts} for `{collection}` failed: {err}");

            match backoff.next_backoff() {
                Some(wait) => tokio::time::sleep(wait).await,
                None => {
                    debug!(
                        "Giving up on `{collection}` after {attempts} attempts in {} ms",
                        backoff.elapsed().as_millis()
                    );
                    return Err(err);
                }
            }
        }
    }

    async fn send(&self, payload: Bytes) -> Result<(), Error> {
        let resp = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, USER_AGENT_VALUE)
            .body(payload)
            .send()
            .await?;

        let status = resp.status();
        // Don't read response body unless needed
        if status == StatusCode::OK {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(Error::UnexpectedStatus { status, body })
    }

    /// Number of deliveries currently in flight
    pub fn in_flight(&self) -> usize {
        self.deliveries.len()
    }

    /// Waits for every spawned delivery to finish. No new deliveries may be started after this.
    pub async fn wait(&self) {
        self.deliveries.close();
        self.deliveries.wait().await;
    }
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One buffering task per collection.
//!
//! The worker owns its [`Buffer`] and reacts to three events: an object arriving on its
//! mailbox, the flush interval ticking, and the shutdown token being cancelled. On shutdown it
//! closes the mailbox, drains whatever is still queued and flushes one last time.

use crate::buffer::Buffer;
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::object::Object;
use crate::tableize::Transform;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Cloneable handle used by the client to reach a collection's worker
#[derive(Clone, Debug)]
pub struct WorkerHandle {
    tx: mpsc::Sender<Object>,
    shutdown: CancellationToken,
}

impl WorkerHandle {
    /// Enqueues an object, waiting for room when the mailbox is full
    pub async fn send(&self, object: Object) -> Result<(), mpsc::error::SendError<Object>> {
        self.tx.send(object).await
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    #[cfg(test)]
    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct BufferWorker {
    collection: Arc<str>,
    buffer: Buffer,
    rx: mpsc::Receiver<Object>,
    shutdown: CancellationToken,
    config: Arc<Config>,
    dispatcher: Arc<Dispatcher>,
    transform: Arc<dyn Transform>,
}

impl BufferWorker {
    pub fn new(
        collection: &str,
        config: Arc<Config>,
        dispatcher: Arc<Dispatcher>,
        transform: Arc<dyn Transform>,
    ) -> (Self, WorkerHandle) {
        let (tx, rx) = mpsc::channel(config.mailbox_capacity);
        let shutdown = CancellationToken::new();

        let worker = Self {
            collection: Arc::from(collection),
            buffer: Buffer::new(),
            rx,
            shutdown: shutdown.clone(),
            config,
            dispatcher,
            transform,
        };

        (worker, WorkerHandle { tx, shutdown })
    }

    pub async fn run(mut self) {
        debug!("Worker for `{}` started", self.collection);

        let period = self.config.max_batch_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                received = self.rx.recv() => match received {
                    Some(object) => self.ingest(object).await,
                    // every handle is gone, nothing more can arrive
                    None => break,
                },
                _ = ticker.tick() => self.flush().await,
            }
        }

        debug!("Worker for `{}` draining", self.collection);
        self.rx.close();
        while let Some(object) = self.rx.recv().await {
            self.ingest(object).await;
        }
        self.flush().await;

        debug!("Worker for `{}` stopped", self.collection);
    }

    async fn ingest(&mut self, object: Object) {
        let Some(payload) = self.serialize(object) else {
            return;
        };
        if self.should_flush_before(payload.len()) {
            self.flush().await;
        }
        self.buffer.append(payload);
    }

    fn serialize(&self, mut object: Object) -> Option<Vec<u8>> {
        let properties = std::mem::take(&mut object.properties);
        let encoded = self.transform.transform(properties).and_then(|properties| {
            object.properties = properties;
            Ok(serde_json::to_vec(&object)?)
        });
        match encoded {
            Ok(payload) => Some(payload),
            Err(e) => {
                if self.config.log_errors {
                    warn!("Message `{}` excluded from batch: {}", object.id, e);
                }
                None
            }
        }
    }

    /// Ceilings are inclusive: a buffer may reach them but never go past them, unless a single
    /// object is larger than the byte ceiling on its own.
    fn should_flush_before(&self, payload_len: usize) -> bool {
        if self.buffer.is_empty() {
            return false;
        }
        self.buffer.size_bytes() + payload_len > self.config.max_batch_bytes
            || self.buffer.count() + 1 > self.config.max_batch_count
    }

    async fn flush(&mut self) {
        let count = self.buffer.count();
        if count == 0 {
            return;
        }
        let objects = self.buffer.drain_as_array();
        self.dispatcher
            .dispatch(Arc::clone(&self.collection), objects, count)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::tableize::{Identity, Tableize};
    use serde_json::{json, Map, Value};
    use std::time::Duration;
    use tracing_test::traced_test;

    /// Rejects objects carrying a `secret` property
    struct RejectSecrets;

    impl Transform for RejectSecrets {
        fn transform(
            &self,
            properties: Map<String, Value>,
        ) -> Result<Map<String, Value>, Error> {
            if properties.contains_key("secret") {
                return Err(Error::InvalidObject("secret property".to_string()));
            }
            Ok(properties)
        }
    }

    fn rejecting_worker(log_errors: bool) -> (BufferWorker, WorkerHandle) {
        let config = Arc::new(Config {
            log_errors,
            ..Default::default()
        });
        let dispatcher = Arc::new(Dispatcher::new("writeKey".to_string(), &config));
        BufferWorker::new("users", config, dispatcher, Arc::new(RejectSecrets))
    }

    fn secret(id: &str) -> Object {
        let mut properties = Map::new();
        properties.insert("secret".to_string(), json!("hunter2"));
        Object::new("users", id, properties)
    }

    fn object(id: &str) -> Object {
        let mut properties = Map::new();
        properties.insert("p".to_string(), json!("x"));
        Object::new("users", id, properties)
    }

    fn worker(config: Config) -> (BufferWorker, WorkerHandle) {
        let config = Arc::new(config);
        let dispatcher = Arc::new(Dispatcher::new("writeKey".to_string(), &config));
        BufferWorker::new("users", config, dispatcher, Arc::new(Identity))
    }

    fn payload_len(id: &str) -> usize {
        serde_json::to_vec(&object(id)).unwrap().len()
    }

    #[tokio::test]
    async fn test_ingest_appends_serialized_object() {
        let (mut worker, _handle) = worker(Config::default());
        worker.ingest(object("id")).await;

        assert_eq!(worker.buffer.count(), 1);
        assert_eq!(worker.buffer.size_bytes(), payload_len("id"));
    }

    #[tokio::test]
    async fn test_should_flush_at_count_ceiling() {
        let (mut worker, _handle) = worker(Config {
            max_batch_count: 2,
            ..Default::default()
        });
        let len = payload_len("a");

        assert!(!worker.should_flush_before(len));
        worker.ingest(object("a")).await;
        assert!(!worker.should_flush_before(len));
        worker.ingest(object("b")).await;
        // two buffered, a third would exceed the ceiling
        assert!(worker.should_flush_before(len));
    }

    #[tokio::test]
    async fn test_should_flush_at_byte_ceiling() {
        let len = payload_len("a");
        let (mut worker, _handle) = worker(Config {
            max_batch_bytes: 2 * len,
            ..Default::default()
        });

        worker.ingest(object("a")).await;
        // exactly at the ceiling is allowed
        assert!(!worker.should_flush_before(len));
        worker.ingest(object("b")).await;
        assert_eq!(worker.buffer.size_bytes(), 2 * len);
        assert!(worker.should_flush_before(1));
    }

    #[tokio::test]
    async fn test_oversized_object_is_buffered_alone() {
        let (mut worker, _handle) = worker(Config {
            max_batch_bytes: 1,
            ..Default::default()
        });
        assert!(!worker.should_flush_before(payload_len("big")));
        worker.ingest(object("big")).await;
        assert_eq!(worker.buffer.count(), 1);
    }

    #[tokio::test]
    async fn test_transform_is_applied_before_serialization() {
        let config = Arc::new(Config::default());
        let dispatcher = Arc::new(Dispatcher::new("writeKey".to_string(), &config));
        let (mut worker, _handle) =
            BufferWorker::new("users", config, dispatcher, Arc::new(Tableize));

        let mut properties = Map::new();
        properties.insert("userInfo".to_string(), json!({ "firstName": "a" }));
        worker.ingest(Object::new("users", "id", properties)).await;

        let array: Vec<Value> = serde_json::from_slice(&worker.buffer.drain_as_array()).unwrap();
        assert_eq!(
            array,
            vec![json!({ "id": "id", "properties": { "user_info_first_name": "a" } })]
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failed_object_is_dropped_and_logged() {
        let (mut worker, _handle) = rejecting_worker(true);

        worker.ingest(object("a")).await;
        worker.ingest(secret("leaky")).await;
        worker.ingest(object("b")).await;

        assert_eq!(worker.buffer.count(), 2);
        assert_eq!(worker.buffer.size_bytes(), 2 * payload_len("a"));
        assert!(logs_contain("Message `leaky` excluded from batch"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failed_object_is_silent_without_log_errors() {
        let (mut worker, _handle) = rejecting_worker(false);

        worker.ingest(secret("leaky")).await;

        assert!(worker.buffer.is_empty());
        assert!(!logs_contain("excluded from batch"));
    }

    #[tokio::test]
    async fn test_shutdown_drains_mailbox() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/set")
            .match_body(mockito::Matcher::PartialJson(json!({
                "collection": "users",
                "objects": [
                    {"id": "a", "properties": {"p": "x"}},
                    {"id": "b", "properties": {"p": "x"}}
                ]
            })))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let config = Arc::new(Config {
            base_endpoint: server.url(),
            max_batch_interval: Duration::from_secs(3600),
            ..Default::default()
        });
        let dispatcher = Arc::new(Dispatcher::new("writeKey".to_string(), &config));
        let (worker, handle) = BufferWorker::new(
            "users",
            config,
            Arc::clone(&dispatcher),
            Arc::new(Identity),
        );
        let task = tokio::spawn(worker.run());

        handle.send(object("a")).await.expect("send");
        handle.send(object("b")).await.expect("send");
        handle.shutdown();
        task.await.expect("worker task");
        dispatcher.wait().await;

        assert!(handle.is_closed());
        assert!(handle.send(object("late")).await.is_err());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_interval_flushes_below_ceiling() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/set")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let config = Arc::new(Config {
            base_endpoint: server.url(),
            max_batch_interval: Duration::from_millis(50),
            ..Default::default()
        });
        let dispatcher = Arc::new(Dispatcher::new("writeKey".to_string(), &config));
        let (worker, handle) = BufferWorker::new(
            "users",
            config,
            Arc::clone(&dispatcher),
            Arc::new(Identity),
        );
        let task = tokio::spawn(worker.run());

        handle.send(object("a")).await.expect("send");
        tokio::time::timeout(Duration::from_secs(2), async {
            while !mock.matched_async().await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out before the interval flush");

        // nothing left to deliver on shutdown
        handle.shutdown();
        task.await.expect("worker task");
        dispatcher.wait().await;
        mock.assert_async().await;
    }
}

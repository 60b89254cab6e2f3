// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Public entry point.
//!
//! [`Client::set`] routes each object to the worker of its collection, creating the worker
//! the first time a collection is seen. [`Client::close`] stops every worker, waits for them
//! to drain and for every delivery they started to finish.

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::object::Object;
use crate::shard_map::ShardMap;
use crate::tableize::{Tableize, Transform};
use crate::worker::{BufferWorker, WorkerHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::debug;

pub struct Client {
    config: Arc<Config>,
    workers: ShardMap<WorkerHandle>,
    tracker: TaskTracker,
    dispatcher: Arc<Dispatcher>,
    transform: Arc<dyn Transform>,
    closed: AtomicBool,
}

impl Client {
    /// Client with the default configuration
    pub fn new(write_key: impl Into<String>) -> Result<Self, Error> {
        Self::with_config(write_key, Config::default())
    }

    /// Client with `config`; properties are flattened with [`Tableize`]
    pub fn with_config(write_key: impl Into<String>, config: Config) -> Result<Self, Error> {
        Self::with_transform(write_key, config, Arc::new(Tableize))
    }

    pub fn with_transform(
        write_key: impl Into<String>,
        config: Config,
        transform: Arc<dyn Transform>,
    ) -> Result<Self, Error> {
        let config = config.normalized();
        config.validate()?;

        let dispatcher = Arc::new(Dispatcher::new(write_key.into(), &config));

        Ok(Client {
            config: Arc::new(config),
            workers: ShardMap::new(),
            tracker: TaskTracker::new(),
            dispatcher,
            transform,
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Queues `object` for delivery.
    ///
    /// Fails without queuing anything if the client is closed or the object is invalid. Waits
    /// when the collection's mailbox is full.
    pub async fn set(&self, object: Object) -> Result<(), Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::ClientClosed);
        }
        object.validate()?;

        let worker = self
            .workers
            .fetch_or_create(&object.collection, |collection| self.spawn_worker(collection));

        // close may have started after the first check and missed a worker created here
        if self.closed.load(Ordering::Acquire) {
            worker.shutdown();
            return Err(Error::ClientClosed);
        }

        // the mailbox is only closed by a worker draining during close
        worker.send(object).await.map_err(|_| Error::ClientClosed)
    }

    fn spawn_worker(&self, collection: &str) -> WorkerHandle {
        debug!("Creating worker for `{collection}`");
        let (worker, handle) = BufferWorker::new(
            collection,
            Arc::clone(&self.config),
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.transform),
        );
        self.tracker.spawn(worker.run());
        handle
    }

    /// Flushes everything that was set and waits for the deliveries to finish.
    ///
    /// Only the first call does anything; later calls return [`Error::ClientClosed`].
    pub async fn close(&self) -> Result<(), Error> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::ClientClosed);
        }

        debug!("Closing client with {} workers", self.workers.count());
        self.workers.for_each(|_, worker| worker.shutdown());

        self.tracker.close();
        self.tracker.wait().await;
        self.dispatcher.wait().await;

        debug!("Client closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of collections seen so far
    pub fn worker_count(&self) -> usize {
        self.workers.count()
    }

    /// Workers that have not terminated yet
    pub fn active_workers(&self) -> usize {
        self.tracker.len()
    }

    /// Deliveries currently in flight
    pub fn in_flight(&self) -> usize {
        self.dispatcher.in_flight()
    }
}

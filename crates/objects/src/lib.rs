// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching write client for the Objects API.
//!
//! Objects are grouped by collection. Each collection gets its own worker task which buffers
//! serialized objects and flushes them as one batch when a size or count ceiling would be
//! crossed, when the flush interval elapses, or when the client is closed.
//!
//! ```rust,no_run
//! use objects::{Client, Object};
//! use serde_json::{json, Map};
//!
//! # async fn run() -> Result<(), objects::Error> {
//! let client = Client::new("write-key")?;
//!
//! let mut properties = Map::new();
//! properties.insert("plan".to_string(), json!("enterprise"));
//! client.set(Object::new("accounts", "account-1", properties)).await?;
//!
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod backoff;
pub mod buffer;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod object;
pub mod shard_map;
pub mod tableize;
pub mod worker;

pub use client::Client;
pub use config::Config;
pub use error::Error;
pub use object::Object;
pub use tableize::{Identity, Tableize, Transform};

/// Version of the client library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

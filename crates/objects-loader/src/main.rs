// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Streams newline-delimited JSON objects into the Objects API.
//!
//! Each line is one object: `{"collection": "...", "id": "...", "properties": {...}}`. Records
//! are read from the file given as the first argument, or from stdin when there is none.
//! Configuration comes from `OBJECTS_*` environment variables and the write key from
//! `OBJECTS_WRITE_KEY`.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod logger;

use objects::{Client, Config, Object};
use std::env;
use std::process::ExitCode;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default, PartialEq, Eq)]
struct LoadStats {
    queued: usize,
    skipped: usize,
}

#[tokio::main]
pub async fn main() -> ExitCode {
    let log_level = env::var("OBJECTS_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    let env_filter = format!("h2=off,hyper=off,rustls=off,{log_level}");

    let filter = match EnvFilter::try_new(env_filter) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("could not parse OBJECTS_LOG_LEVEL: {e}");
            return ExitCode::FAILURE;
        }
    };
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .event_format(logger::Formatter)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
        return ExitCode::FAILURE;
    }

    debug!("Logging subsystem enabled");

    let Ok(write_key) = env::var("OBJECTS_WRITE_KEY") else {
        error!("OBJECTS_WRITE_KEY is not set, shutting down");
        return ExitCode::FAILURE;
    };

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    let client = match Client::with_config(write_key, config) {
        Ok(client) => client,
        Err(e) => {
            error!("Unable to create client: {e}");
            return ExitCode::FAILURE;
        }
    };

    let stats = match env::args().nth(1) {
        Some(path) => match tokio::fs::File::open(&path).await {
            Ok(file) => load(&client, BufReader::new(file)).await,
            Err(e) => {
                error!("Unable to open {path}: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => load(&client, BufReader::new(tokio::io::stdin())).await,
    };

    if let Err(e) = client.close().await {
        error!("Error closing client: {e}");
        return ExitCode::FAILURE;
    }
    info!(
        "Queued {} objects, skipped {} records",
        stats.queued, stats.skipped
    );
    ExitCode::SUCCESS
}

/// Sets every record read from `reader` on `client`, skipping blank and malformed lines
async fn load<R: AsyncBufRead + Unpin>(client: &Client, reader: R) -> LoadStats {
    let mut stats = LoadStats::default();
    let mut lines = reader.lines();
    let mut line_number = 0;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Stopped reading input at line {}: {e}", line_number + 1);
                break;
            }
        };
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }

        let object: Object = match serde_json::from_str(&line) {
            Ok(object) => object,
            Err(e) => {
                warn!("Skipping line {line_number}: {e}");
                stats.skipped += 1;
                continue;
            }
        };
        match client.set(object).await {
            Ok(()) => stats.queued += 1,
            Err(e) => {
                warn!("Skipping line {line_number}: {e}");
                stats.skipped += 1;
            }
        }
    }

    stats
}

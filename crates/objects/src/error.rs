// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// Errors surfaced by the client and its delivery path
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Client is closed")]
    ClientClosed,

    #[error("Invalid object: {0}")]
    InvalidObject(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP Post Request Failed, Status Code {status}. Response: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },
}

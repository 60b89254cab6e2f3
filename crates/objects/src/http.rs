// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::Config;
use crate::error::Error;
use core::time::Duration;
use tracing::error;

/// Returns the caller-provided transport, or builds one from the configuration.
///
/// An unusable proxy setting is logged and the client falls back to a direct connection.
pub fn get_client(config: &Config) -> reqwest::Client {
    if let Some(client) = &config.http_client {
        return client.clone();
    }
    match build_client(config.https_proxy.as_deref(), config.request_timeout) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            build_client(None, config.request_timeout).unwrap_or_else(|inner| {
                error!(
                    "Failed to build HTTP client without proxy: {}, using reqwest defaults",
                    inner
                );
                reqwest::Client::new()
            })
        }
    }
}

/// Builds a reqwest client with optional proxy configuration and timeout
pub fn build_client(proxy_url: Option<&str>, timeout: Duration) -> Result<reqwest::Client, Error> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));
    if let Some(proxy) = proxy_url {
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_client_without_proxy() {
        assert!(build_client(None, Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_build_client_with_proxy() {
        assert!(build_client(Some("http://proxy.example.com:3128"), Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_build_client_invalid_proxy() {
        let result = build_client(Some("not a proxy url"), Duration::from_secs(5));
        assert!(matches!(result, Err(Error::Http(_))));
    }

    #[test]
    fn test_get_client_falls_back_on_invalid_proxy() {
        let config = Config {
            https_proxy: Some("not a proxy url".to_string()),
            ..Default::default()
        };
        // must not panic
        let _client = get_client(&config);
    }
}

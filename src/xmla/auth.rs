//! Authentication and endpoint helpers for XMLA connections.
//!
//! This module provides:
//! - Endpoint resolution from a server name and the configured template
//! - HTTP client construction with the configured timeouts
//! - Per-request authentication (anonymous, basic, bearer token)

use crate::config::{AuthConfig, TransportConfig};
use crate::constants::ENDPOINT_SERVER_PLACEHOLDER;
use crate::error::ConnectionError;
use reqwest::{Client, RequestBuilder};
use tracing::debug;

/// Resolve the HTTP endpoint for a server name.
///
/// Server names that already are http(s) URLs are used as-is; anything else is
/// substituted into the endpoint template.
pub fn resolve_endpoint(server_name: &str, template: &str) -> Result<String, ConnectionError> {
    let server_name = server_name.trim();
    if server_name.is_empty() {
        return Err(ConnectionError::config("Server name is empty"));
    }

    let lower = server_name.to_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Ok(server_name.to_string());
    }

    if !template.contains(ENDPOINT_SERVER_PLACEHOLDER) {
        return Err(ConnectionError::config(format!(
            "Endpoint template '{}' has no {} placeholder",
            template, ENDPOINT_SERVER_PLACEHOLDER
        )));
    }

    // Named instances (HOST\INSTANCE) are served by the pump of the host.
    let host = server_name.split('\\').next().unwrap_or(server_name);
    Ok(template.replace(ENDPOINT_SERVER_PLACEHOLDER, host))
}

/// Build the HTTP client used for one server session.
pub fn create_client(config: &TransportConfig) -> Result<Client, ConnectionError> {
    Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| ConnectionError::transport_with_source("Failed to create HTTP client", e))
}

/// Apply the configured authentication to a request.
pub fn configure_auth(request: RequestBuilder, auth: &AuthConfig) -> RequestBuilder {
    match auth {
        AuthConfig::None => request,
        AuthConfig::Basic { username, password } => {
            debug!("Using basic authentication as {}", username);
            request.basic_auth(username, Some(password))
        }
        AuthConfig::Bearer { token } => request.bearer_auth(token),
    }
}

/// Truncate a string for logging purposes.
///
/// Cuts on a character boundary at or below `max_len` bytes.
pub fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let mut cut = max_len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &s[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_ENDPOINT_TEMPLATE;

    #[test]
    fn test_resolve_endpoint_from_template() {
        assert_eq!(
            resolve_endpoint("olap01", DEFAULT_ENDPOINT_TEMPLATE).unwrap(),
            "http://olap01/olap/msmdpump.dll"
        );
        assert_eq!(
            resolve_endpoint("olap01\\TABULAR", DEFAULT_ENDPOINT_TEMPLATE).unwrap(),
            "http://olap01/olap/msmdpump.dll"
        );
    }

    #[test]
    fn test_resolve_endpoint_keeps_urls() {
        assert_eq!(
            resolve_endpoint("https://pump.example.com/olap/msmdpump.dll", "unused").unwrap(),
            "https://pump.example.com/olap/msmdpump.dll"
        );
    }

    #[test]
    fn test_resolve_endpoint_rejects_empty() {
        assert!(resolve_endpoint("  ", DEFAULT_ENDPOINT_TEMPLATE).is_err());
        assert!(resolve_endpoint("olap01", "http://fixed/").is_err());
    }

    #[test]
    fn test_create_client() {
        let _client = create_client(&TransportConfig::default()).unwrap();
    }

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("short", 10), "short");
        assert_eq!(truncate_for_log("this is a long string", 10), "this is a ...");
        assert_eq!(truncate_for_log("exactly10!", 10), "exactly10!");
        assert_eq!(truncate_for_log("ééééé", 3), "é...");
    }
}

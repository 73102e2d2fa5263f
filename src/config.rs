//! Configuration management for tabular connections.
//!
//! Configuration is loaded from environment variables following the 12-factor app pattern.

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_ENDPOINT_TEMPLATE,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_REQUEST_TIMEOUT_SECS, ENDPOINT_SERVER_PLACEHOLDER,
};
use crate::error::ConnectionError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Which endpoint to initialize
    pub endpoint: EndpointConfig,

    /// How to reach the server
    pub transport: TransportConfig,
}

/// Endpoint addressing: an explicit server/database pair, a project, or both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Server name or XMLA endpoint URL
    pub server: Option<String>,

    /// Database name on the server
    pub database: Option<String>,

    /// Project descriptor (enables project mode)
    pub project_file: Option<PathBuf>,

    /// User name used to pick the per-user settings file
    pub user_name: Option<String>,

    /// The model definition file was open in a designer and has just been closed
    pub closed_bim_file: bool,
}

/// Transport configuration for the XMLA HTTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Endpoint URL template, `{server}` is replaced by the server name
    pub endpoint_template: String,

    /// Authentication configuration
    pub auth: AuthConfig,

    /// TCP connect timeout
    pub connect_timeout: Duration,

    /// Whole-request timeout
    pub request_timeout: Duration,
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum AuthConfig {
    /// No credentials (anonymous or handled by a proxy)
    #[default]
    None,

    /// HTTP basic authentication
    Basic { username: String, password: String },

    /// Bearer access token (Azure Analysis Services, Power BI XMLA endpoints)
    Bearer { token: String },
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// ## Endpoint
    /// - `TABULAR_SERVER`: Server name or endpoint URL
    /// - `TABULAR_DATABASE`: Database name
    /// - `TABULAR_PROJECT_FILE`: Project descriptor path (enables project mode)
    /// - `TABULAR_USER_NAME`: Override for the OS user name
    /// - `TABULAR_CLOSED_BIM_FILE`: Skip applying the model definition (default: false)
    ///
    /// Either `TABULAR_PROJECT_FILE` or both `TABULAR_SERVER` and
    /// `TABULAR_DATABASE` are required.
    ///
    /// ## Transport
    /// - `TABULAR_ENDPOINT_TEMPLATE`: default `http://{server}/olap/msmdpump.dll`
    /// - `TABULAR_AUTH_TYPE`: none, basic, bearer (default: none)
    /// - `TABULAR_USERNAME` / `TABULAR_PASSWORD`: for basic auth
    /// - `TABULAR_ACCESS_TOKEN`: for bearer auth
    /// - `TABULAR_CONNECT_TIMEOUT`: seconds (default: 30)
    /// - `TABULAR_REQUEST_TIMEOUT`: seconds (default: 600)
    pub fn from_env() -> Result<Self, ConnectionError> {
        let server = non_empty_var("TABULAR_SERVER");
        let database = non_empty_var("TABULAR_DATABASE");
        let project_file = non_empty_var("TABULAR_PROJECT_FILE").map(PathBuf::from);

        if project_file.is_none() && (server.is_none() || database.is_none()) {
            return Err(ConnectionError::config(
                "Set TABULAR_PROJECT_FILE, or both TABULAR_SERVER and TABULAR_DATABASE",
            ));
        }

        let user_name = non_empty_var("TABULAR_USER_NAME");

        let closed_bim_file = std::env::var("TABULAR_CLOSED_BIM_FILE")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false);

        let auth_type = std::env::var("TABULAR_AUTH_TYPE")
            .ok()
            .map(|s| s.to_lowercase());

        let auth = match auth_type.as_deref() {
            Some("basic") => {
                let username = std::env::var("TABULAR_USERNAME").map_err(|_| {
                    ConnectionError::config("TABULAR_USERNAME is required for basic authentication")
                })?;
                let password = std::env::var("TABULAR_PASSWORD").map_err(|_| {
                    ConnectionError::config("TABULAR_PASSWORD is required for basic authentication")
                })?;
                AuthConfig::Basic { username, password }
            }
            Some("bearer") | Some("token") => {
                let token = std::env::var("TABULAR_ACCESS_TOKEN").map_err(|_| {
                    ConnectionError::config(
                        "TABULAR_ACCESS_TOKEN is required for bearer authentication",
                    )
                })?;
                AuthConfig::Bearer { token }
            }
            None | Some("none") | Some("") => AuthConfig::None,
            Some(other) => {
                return Err(ConnectionError::config(format!(
                    "Unknown TABULAR_AUTH_TYPE '{}': expected none, basic or bearer",
                    other
                )))
            }
        };

        let endpoint_template = std::env::var("TABULAR_ENDPOINT_TEMPLATE")
            .unwrap_or_else(|_| DEFAULT_ENDPOINT_TEMPLATE.to_string());
        if !endpoint_template.contains(ENDPOINT_SERVER_PLACEHOLDER) {
            return Err(ConnectionError::config(format!(
                "TABULAR_ENDPOINT_TEMPLATE must contain {}",
                ENDPOINT_SERVER_PLACEHOLDER
            )));
        }

        let connect_timeout_secs = std::env::var("TABULAR_CONNECT_TIMEOUT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);

        let request_timeout_secs = std::env::var("TABULAR_REQUEST_TIMEOUT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        Ok(Config {
            endpoint: EndpointConfig {
                server,
                database,
                project_file,
                user_name,
                closed_bim_file,
            },
            transport: TransportConfig {
                endpoint_template,
                auth,
                connect_timeout: Duration::from_secs(connect_timeout_secs),
                request_timeout: Duration::from_secs(request_timeout_secs),
            },
        })
    }

    /// Check if running against a project rather than an explicit database.
    pub fn is_project_mode(&self) -> bool {
        self.endpoint.project_file.is_some()
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint_template: DEFAULT_ENDPOINT_TEMPLATE.to_string(),
            auth: AuthConfig::None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

//! Error types for tabular connection resolution and server initialization.
//!
//! Every failure in this crate surfaces as a [`ConnectionError`]. All variants
//! carry a message meant to be shown to the user as-is, and none of them are
//! recovered from locally: the initialization sequence aborts on the first one.

use thiserror::Error;

/// Errors raised while resolving or initializing a tabular connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Per-user settings file missing, unreadable or malformed
    #[error("{0}")]
    Settings(String),

    /// Project descriptor missing or unparseable
    #[error("{0}")]
    ProjectFile(String),

    /// Server is not running in tabular mode
    #[error("{0}")]
    ServerMode(String),

    /// Database could not be found or created
    #[error("{0}")]
    DatabaseNotFound(String),

    /// Model definition file unreadable in both supported formats
    #[error("{0}")]
    ModelDefinition(String),

    /// Transport-level failure talking to the server
    #[error("Connection error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Server returned a SOAP fault or XMLA error, or an unreadable response
    #[error("Server error: {0}")]
    Protocol(String),

    /// Source and target compatibility levels cannot be compared
    #[error("{0}")]
    IncompatibleLevels(String),

    /// Local file system error
    #[error("{message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConnectionError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a settings file error.
    pub fn settings(msg: impl Into<String>) -> Self {
        Self::Settings(msg.into())
    }

    /// Create a project file error.
    pub fn project_file(msg: impl Into<String>) -> Self {
        Self::ProjectFile(msg.into())
    }

    /// Create a server mode error.
    pub fn server_mode(msg: impl Into<String>) -> Self {
        Self::ServerMode(msg.into())
    }

    /// Create a database not found error.
    pub fn database_not_found(msg: impl Into<String>) -> Self {
        Self::DatabaseNotFound(msg.into())
    }

    /// Create a model definition error.
    pub fn model_definition(msg: impl Into<String>) -> Self {
        Self::ModelDefinition(msg.into())
    }

    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a transport error with a source.
    pub fn transport_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create an incompatible compatibility levels error.
    pub fn incompatible_levels(msg: impl Into<String>) -> Self {
        Self::IncompatibleLevels(msg.into())
    }

    /// Create an I/O error naming the path involved.
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            message: format!("Could not read {}: {}", path.display(), source),
            source,
        }
    }

    /// Get a user-friendly suggestion for how to fix this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Config(_) => Some("Check your environment variables and configuration"),
            Self::Settings(_) => Some(
                "Open the project once in the designer so the workspace settings file is created, \
                 or supply the server and database explicitly",
            ),
            Self::ProjectFile(_) => Some("Check the project file path and that it is valid XML"),
            Self::ServerMode(_) => Some("Connect to an instance running in tabular mode"),
            Self::DatabaseNotFound(_) => Some("Check the database name and ensure it exists"),
            Self::ModelDefinition(_) => {
                Some("Check that the model definition file is valid JSON or legacy XML")
            }
            Self::Transport { .. } => {
                Some("Check server name, endpoint template, and network connectivity")
            }
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ConnectionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ConnectionError::transport_with_source("Request to server timed out", e)
        } else if e.is_connect() {
            ConnectionError::transport_with_source("Could not connect to server", e)
        } else {
            ConnectionError::transport_with_source(format!("HTTP error: {}", e), e)
        }
    }
}

impl From<quick_xml::Error> for ConnectionError {
    fn from(e: quick_xml::Error) -> Self {
        ConnectionError::protocol(format!("Malformed XML: {}", e))
    }
}

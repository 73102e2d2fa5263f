//! Centralized constants for tabular connection handling.
//!
//! Namespaces, file extensions, protocol literals and default values used
//! throughout the codebase live here so they are easy to find and modify.

use std::time::Duration;

// =============================================================================
// Timeout Constants
// =============================================================================

/// Default HTTP connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP request timeout in seconds.
///
/// Creating a database from a large model definition can take minutes.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;

/// Default connect timeout as Duration.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS);

/// Default request timeout as Duration.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS);

// =============================================================================
// Endpoint Constants
// =============================================================================

/// Default endpoint template; `{server}` is replaced by the server name.
pub const DEFAULT_ENDPOINT_TEMPLATE: &str = "http://{server}/olap/msmdpump.dll";

/// Placeholder substituted in the endpoint template.
pub const ENDPOINT_SERVER_PLACEHOLDER: &str = "{server}";

// =============================================================================
// Project File Constants
// =============================================================================

/// Extension of the model definition file.
pub const MODEL_FILE_EXTENSION: &str = ".bim";

/// Extension of per-user workspace settings files.
pub const SETTINGS_FILE_EXTENSION: &str = "settings";

/// MSBuild namespace used by project descriptors.
pub const MSBUILD_NAMESPACE: &str = "http://schemas.microsoft.com/developer/msbuild/2003";

/// Settings file markers.
pub const SERVER_NAME_START: &str = "<ServerName>";
pub const SERVER_NAME_END: &str = "</ServerName>";
pub const DATABASE_NAME_START: &str = "<DatabaseName>";
pub const DATABASE_NAME_END: &str = "</DatabaseName>";

// =============================================================================
// Protocol Constants
// =============================================================================

/// SOAP 1.1 envelope namespace.
pub const SOAP_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// XMLA method namespace.
pub const XMLA_NAMESPACE: &str = "urn:schemas-microsoft-com:xml-analysis";

/// XMLA rowset result namespace.
pub const ROWSET_NAMESPACE: &str = "urn:schemas-microsoft-com:xml-analysis:rowset";

/// Analysis Services engine (ASSL) namespace.
pub const ENGINE_NAMESPACE: &str = "http://schemas.microsoft.com/analysisservices/2003/engine";

/// SOAPAction header values.
pub const SOAP_ACTION_EXECUTE: &str = "\"urn:schemas-microsoft-com:xml-analysis:Execute\"";
pub const SOAP_ACTION_DISCOVER: &str = "\"urn:schemas-microsoft-com:xml-analysis:Discover\"";

/// Name of the server property holding the data directory.
pub const DATA_DIR_PROPERTY: &str = "DataDir";

/// First compatibility level whose metadata is exposed through TMSCHEMA rowsets
/// and whose model definitions are JSON.
pub const TABULAR_METADATA_COMPATIBILITY_LEVEL: i32 = 1200;

// =============================================================================
// Logging Constants
// =============================================================================

/// Default truncation length for command logging.
pub const LOG_COMMAND_TRUNCATE_LENGTH: usize = 200;

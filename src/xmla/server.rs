//! Server object model over XMLA.
//!
//! [`TabularServer`] is the seam between the initializer and the analytical
//! server. [`XmlaServer`] implements it with discover and execute requests
//! over a single [`XmlaClient`] session.

use super::client::XmlaClient;
use super::envelope::XmlaCommand;
use super::response::Row;
use crate::config::TransportConfig;
use crate::constants::{DATA_DIR_PROPERTY, TABULAR_METADATA_COMPATIBILITY_LEVEL};
use crate::error::ConnectionError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Deployment mode an instance runs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerMode {
    Multidimensional,
    SharePoint,
    Tabular,
    Unknown(String),
}

impl ServerMode {
    /// Parse the server metadata value. `Default` is multidimensional.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "tabular" | "2" => Self::Tabular,
            "multidimensional" | "default" | "0" => Self::Multidimensional,
            "sharepoint" | "1" => Self::SharePoint,
            _ => Self::Unknown(value.trim().to_string()),
        }
    }
}

impl std::fmt::Display for ServerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Multidimensional => write!(f, "Multidimensional"),
            Self::SharePoint => write!(f, "SharePoint"),
            Self::Tabular => write!(f, "Tabular"),
            Self::Unknown(value) => write!(f, "{}", value),
        }
    }
}

/// A database in the server catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSummary {
    pub id: String,
    pub name: String,
    pub compatibility_level: i32,
}

impl DatabaseSummary {
    /// Rows without a catalog name are skipped; a missing or unreadable
    /// compatibility level is an error.
    fn from_row(row: &Row) -> Result<Option<Self>, ConnectionError> {
        let Some(name) = row.get("CATALOG_NAME").cloned() else {
            return Ok(None);
        };
        let id = row
            .get("DATABASE_ID")
            .filter(|id| !id.is_empty())
            .cloned()
            .unwrap_or_else(|| name.clone());
        let compatibility_level = row
            .get("COMPATIBILITY_LEVEL")
            .and_then(|level| level.trim().parse().ok())
            .ok_or_else(|| {
                ConnectionError::protocol(format!(
                    "Catalog entry for database {} has no readable compatibility level",
                    name
                ))
            })?;
        Ok(Some(Self {
            id,
            name,
            compatibility_level,
        }))
    }
}

/// A subdirectory returned by `SystemGetSubdirs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubdirEntry {
    pub dir: String,
    pub allowed: bool,
}

impl SubdirEntry {
    fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            dir: row.get("Dir")?.clone(),
            allowed: row
                .get("Allowed")
                .is_some_and(|allowed| {
                    let allowed = allowed.trim();
                    allowed.eq_ignore_ascii_case("true") || allowed == "1"
                }),
        })
    }
}

/// Default storage mode of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelDefaultMode {
    #[default]
    Import,
    DirectQuery,
    Default,
    Push,
    Dual,
}

impl ModelDefaultMode {
    /// Parse a `TMSCHEMA_MODEL.DefaultMode` value (numeric or named).
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "1" | "directquery" => Self::DirectQuery,
            "2" | "default" => Self::Default,
            "3" | "push" => Self::Push,
            "4" | "dual" => Self::Dual,
            _ => Self::Import,
        }
    }
}

/// Database-level direct query mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DirectQueryMode {
    #[default]
    InMemory,
    DirectQuery,
    InMemoryWithDirectQuery,
    DirectQueryWithInMemory,
}

impl DirectQueryMode {
    /// Parse a database metadata value (named or numeric).
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "directquery" | "1" => Self::DirectQuery,
            "inmemorywithdirectquery" | "2" => Self::InMemoryWithDirectQuery,
            "directquerywithinmemory" | "3" => Self::DirectQueryWithInMemory,
            _ => Self::InMemory,
        }
    }

    /// True for the direct and hybrid modes.
    pub fn uses_direct_query(&self) -> bool {
        matches!(
            self,
            Self::DirectQuery | Self::InMemoryWithDirectQuery | Self::DirectQueryWithInMemory
        )
    }
}

/// Storage mode facts needed to derive the direct query flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DirectQueryFacts {
    pub model_default_mode: ModelDefaultMode,
    pub database_mode: DirectQueryMode,
}

impl DirectQueryFacts {
    /// Model defaults to direct query, or the database runs a direct/hybrid mode.
    pub fn is_direct_query(&self) -> bool {
        self.model_default_mode == ModelDefaultMode::DirectQuery
            || self.database_mode.uses_direct_query()
    }
}

/// Operations the initializer needs from an analytical server.
///
/// Calls are made one at a time against a single session.
#[allow(async_fn_in_trait)]
pub trait TabularServer {
    /// Open a session against the named server and load its properties.
    async fn connect(&mut self, server_name: &str) -> Result<(), ConnectionError>;

    /// Mode reported at connect time.
    fn server_mode(&self) -> ServerMode;

    /// Server data directory reported at connect time.
    fn data_dir(&self) -> Option<&str>;

    /// Look a database up by name in the (cached) catalog.
    async fn find_database(&mut self, name: &str)
        -> Result<Option<DatabaseSummary>, ConnectionError>;

    /// Drop the cached catalog and reload it.
    async fn refresh(&mut self) -> Result<(), ConnectionError>;

    /// List subdirectories of a server-side directory.
    async fn get_subdirs(&mut self, dir: &str) -> Result<Vec<SubdirEntry>, ConnectionError>;

    /// Attach a database folder.
    async fn attach(&mut self, folder: &str) -> Result<(), ConnectionError>;

    /// Execute a command, discarding any result rows.
    async fn execute(&mut self, command: XmlaCommand) -> Result<(), ConnectionError>;

    /// Storage mode facts for a database.
    async fn direct_query_facts(
        &mut self,
        database: &DatabaseSummary,
    ) -> Result<DirectQueryFacts, ConnectionError>;
}

/// [`TabularServer`] over an XMLA HTTP endpoint.
#[derive(Debug)]
pub struct XmlaServer {
    transport: TransportConfig,
    client: Option<XmlaClient>,
    mode: ServerMode,
    data_dir: Option<String>,
    catalog: Option<Vec<DatabaseSummary>>,
}

impl XmlaServer {
    /// Create an unconnected server.
    pub fn new(transport: TransportConfig) -> Self {
        Self {
            transport,
            client: None,
            mode: ServerMode::Unknown(String::new()),
            data_dir: None,
            catalog: None,
        }
    }

    /// Close the session, if connected.
    pub async fn disconnect(&mut self) -> Result<(), ConnectionError> {
        if let Some(client) = self.client.as_mut() {
            client.end_session().await?;
        }
        self.client = None;
        self.catalog = None;
        Ok(())
    }

    fn client(&mut self) -> Result<&mut XmlaClient, ConnectionError> {
        self.client
            .as_mut()
            .ok_or_else(|| ConnectionError::transport("Not connected to a server"))
    }

    async fn load_catalog(&mut self) -> Result<&[DatabaseSummary], ConnectionError> {
        if self.catalog.is_none() {
            let response = self.client()?.discover("DBSCHEMA_CATALOGS", &[]).await?;
            let mut databases = Vec::with_capacity(response.rows.len());
            for row in &response.rows {
                databases.extend(DatabaseSummary::from_row(row)?);
            }
            debug!("Catalog holds {} databases", databases.len());
            self.catalog = Some(databases);
        }
        Ok(self.catalog.as_deref().unwrap_or_default())
    }
}

impl TabularServer for XmlaServer {
    async fn connect(&mut self, server_name: &str) -> Result<(), ConnectionError> {
        let mut client = XmlaClient::new(server_name, &self.transport)?;
        info!("Connecting to {} via {}", server_name, client.endpoint());

        let response = client
            .begin_session(
                "DISCOVER_XML_METADATA",
                &[("ObjectExpansion", "ObjectProperties")],
                &[],
            )
            .await?;

        self.mode = response
            .element_text("ServerMode")?
            .map(|mode| ServerMode::parse(&mode))
            .unwrap_or(ServerMode::Multidimensional);
        self.data_dir = response.server_property(DATA_DIR_PROPERTY)?;
        self.catalog = None;
        self.client = Some(client);

        debug!("Server mode {}, data dir {:?}", self.mode, self.data_dir);
        Ok(())
    }

    fn server_mode(&self) -> ServerMode {
        self.mode.clone()
    }

    fn data_dir(&self) -> Option<&str> {
        self.data_dir.as_deref()
    }

    async fn find_database(
        &mut self,
        name: &str,
    ) -> Result<Option<DatabaseSummary>, ConnectionError> {
        let wanted = name.to_lowercase();
        Ok(self
            .load_catalog()
            .await?
            .iter()
            .find(|db| db.name.to_lowercase() == wanted)
            .cloned())
    }

    async fn refresh(&mut self) -> Result<(), ConnectionError> {
        self.catalog = None;
        self.load_catalog().await.map(|_| ())
    }

    async fn get_subdirs(&mut self, dir: &str) -> Result<Vec<SubdirEntry>, ConnectionError> {
        let rows = self
            .client()?
            .execute_rows(XmlaCommand::system_get_subdirs(dir))
            .await?;
        Ok(rows.iter().filter_map(SubdirEntry::from_row).collect())
    }

    async fn attach(&mut self, folder: &str) -> Result<(), ConnectionError> {
        info!("Attaching database folder {}", folder);
        let command = XmlaCommand::attach(folder)?;
        self.client()?.execute(command).await.map(|_| ())
    }

    async fn execute(&mut self, command: XmlaCommand) -> Result<(), ConnectionError> {
        self.client()?.execute(command).await.map(|_| ())
    }

    async fn direct_query_facts(
        &mut self,
        database: &DatabaseSummary,
    ) -> Result<DirectQueryFacts, ConnectionError> {
        let client = self.client()?;

        let metadata = client
            .discover(
                "DISCOVER_XML_METADATA",
                &[
                    ("DatabaseID", database.id.as_str()),
                    ("ObjectExpansion", "ObjectProperties"),
                ],
            )
            .await?;
        let database_mode = metadata
            .element_text("DirectQueryMode")?
            .map(|mode| DirectQueryMode::parse(&mode))
            .unwrap_or_default();

        let model_default_mode =
            if database.compatibility_level >= TABULAR_METADATA_COMPATIBILITY_LEVEL {
                let model = client
                    .discover("TMSCHEMA_MODEL", &[("DatabaseName", database.name.as_str())])
                    .await?;
                model
                    .rows
                    .first()
                    .and_then(|row| row.get("DefaultMode"))
                    .map(|mode| ModelDefaultMode::parse(mode))
                    .unwrap_or_default()
            } else {
                ModelDefaultMode::Import
            };

        Ok(DirectQueryFacts {
            model_default_mode,
            database_mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_mode_parse() {
        assert_eq!(ServerMode::parse("Tabular"), ServerMode::Tabular);
        assert_eq!(ServerMode::parse("Default"), ServerMode::Multidimensional);
        assert_eq!(ServerMode::parse(" sharepoint "), ServerMode::SharePoint);
        assert_eq!(ServerMode::parse("Other"), ServerMode::Unknown("Other".into()));
    }

    #[test]
    fn test_direct_query_flag() {
        let in_memory = DirectQueryFacts::default();
        assert!(!in_memory.is_direct_query());

        for mode in [
            DirectQueryMode::DirectQuery,
            DirectQueryMode::InMemoryWithDirectQuery,
            DirectQueryMode::DirectQueryWithInMemory,
        ] {
            let facts = DirectQueryFacts {
                model_default_mode: ModelDefaultMode::Import,
                database_mode: mode,
            };
            assert!(facts.is_direct_query(), "{:?}", mode);
        }

        let model_dq = DirectQueryFacts {
            model_default_mode: ModelDefaultMode::DirectQuery,
            database_mode: DirectQueryMode::InMemory,
        };
        assert!(model_dq.is_direct_query());

        let dual = DirectQueryFacts {
            model_default_mode: ModelDefaultMode::Dual,
            database_mode: DirectQueryMode::InMemory,
        };
        assert!(!dual.is_direct_query());
    }

    #[test]
    fn test_mode_parsing_accepts_numbers() {
        assert_eq!(ModelDefaultMode::parse("1"), ModelDefaultMode::DirectQuery);
        assert_eq!(ModelDefaultMode::parse("0"), ModelDefaultMode::Import);
        assert_eq!(
            DirectQueryMode::parse("InMemoryWithDirectQuery"),
            DirectQueryMode::InMemoryWithDirectQuery
        );
        assert_eq!(DirectQueryMode::parse(""), DirectQueryMode::InMemory);
    }

    #[test]
    fn test_rows_to_descriptors() {
        let mut row = Row::new();
        row.insert("CATALOG_NAME".into(), "Sales".into());
        row.insert("COMPATIBILITY_LEVEL".into(), "1500".into());
        let db = DatabaseSummary::from_row(&row).unwrap().unwrap();
        assert_eq!(db.id, "Sales");
        assert_eq!(db.compatibility_level, 1500);

        for (value, allowed) in [("True", true), (" 1 ", true), ("false", false), ("0", false)] {
            let mut row = Row::new();
            row.insert("Dir".into(), "Sales.0.db".into());
            row.insert("Allowed".into(), value.into());
            assert_eq!(SubdirEntry::from_row(&row).unwrap().allowed, allowed, "{}", value);
        }
    }

    #[test]
    fn test_catalog_row_without_level_fails() {
        let mut row = Row::new();
        row.insert("CATALOG_NAME".into(), "Sales".into());
        let err = DatabaseSummary::from_row(&row).unwrap_err();
        assert!(matches!(err, ConnectionError::Protocol(_)));
        assert!(err.to_string().contains("Sales"));

        row.insert("COMPATIBILITY_LEVEL".into(), "n/a".into());
        assert!(DatabaseSummary::from_row(&row).is_err());

        assert_eq!(DatabaseSummary::from_row(&Row::new()).unwrap(), None);
    }

    #[tokio::test]
    async fn test_calls_before_connect_fail() {
        let mut server = XmlaServer::new(TransportConfig::default());
        let err = server.get_subdirs("C:\\Data").await.unwrap_err();
        assert!(matches!(err, ConnectionError::Transport { .. }));
        assert!(server.data_dir().is_none());
    }
}

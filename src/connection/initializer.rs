//! Server initialization state machine.
//!
//! `NotConnected → Connected → ModeVerified → DatabaseResolved →
//! ModelApplied (project mode only) → Finalized`. The first failure aborts
//! the sequence; nothing is retried.

use super::info::ConnectionInfo;
use super::model_file::prepare_model_command;
use crate::error::ConnectionError;
use crate::xmla::{DatabaseSummary, ServerMode, TabularServer};
use tracing::{debug, info, warn};

/// Progress of a [`ServerInitializer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InitState {
    NotConnected,
    Connected,
    ModeVerified,
    DatabaseResolved,
    ModelApplied,
    Finalized,
}

impl std::fmt::Display for InitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotConnected => "not connected",
            Self::Connected => "connected",
            Self::ModeVerified => "mode verified",
            Self::DatabaseResolved => "database resolved",
            Self::ModelApplied => "model applied",
            Self::Finalized => "finalized",
        };
        write!(f, "{}", name)
    }
}

/// Result of a successful initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializedDatabase {
    pub database: DatabaseSummary,
    pub compatibility_level: i32,
    pub direct_query: bool,
}

/// Drives one [`ConnectionInfo`] through connect, mode check, database
/// resolution, model application and finalization.
pub struct ServerInitializer<'a, S: TabularServer> {
    server: &'a mut S,
    state: InitState,
    closed_bim_file: bool,
}

impl<'a, S: TabularServer> ServerInitializer<'a, S> {
    /// Create an initializer over a server.
    pub fn new(server: &'a mut S) -> Self {
        Self {
            server,
            state: InitState::NotConnected,
            closed_bim_file: false,
        }
    }

    /// Skip model application: the model file was open and has just been closed.
    pub fn closed_bim_file(mut self, closed_bim_file: bool) -> Self {
        self.closed_bim_file = closed_bim_file;
        self
    }

    /// Last state reached.
    pub fn state(&self) -> InitState {
        self.state
    }

    fn advance(&mut self, next: InitState) {
        debug!("Initialization: {} -> {}", self.state, next);
        self.state = next;
    }

    /// Run the whole sequence for `info`.
    pub async fn run(
        &mut self,
        info: &ConnectionInfo,
    ) -> Result<InitializedDatabase, ConnectionError> {
        let server_name = info
            .server_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConnectionError::config(format!("No server name for {}", info)))?;
        let database_name = info
            .database_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConnectionError::config(format!("No database name for {}", info)))?;

        self.server.connect(server_name).await?;
        self.advance(InitState::Connected);

        let mode = self.server.server_mode();
        if mode != ServerMode::Tabular {
            return Err(ConnectionError::server_mode(format!(
                "Server {} is not running in Tabular mode (mode is {})",
                server_name, mode
            )));
        }
        self.advance(InitState::ModeVerified);

        let mut database = self.server.find_database(database_name).await?;
        if database.is_none() {
            if !info.use_project {
                return Err(not_found(database_name, server_name));
            }
            database = self.attach_existing_directory(database_name).await?;
        }
        self.advance(InitState::DatabaseResolved);

        if info.use_project && !self.closed_bim_file {
            database = Some(self.apply_model(info, server_name, database_name).await?);
            self.advance(InitState::ModelApplied);
        }

        let database = database.ok_or_else(|| not_found(database_name, server_name))?;
        let facts = self.server.direct_query_facts(&database).await?;
        self.advance(InitState::Finalized);

        info!(
            "Initialized {} on {}: compatibility level {}, direct query {}",
            database.name,
            server_name,
            database.compatibility_level,
            facts.is_direct_query()
        );
        Ok(InitializedDatabase {
            compatibility_level: database.compatibility_level,
            direct_query: facts.is_direct_query(),
            database,
        })
    }

    /// Look for a detached database folder in the data directory and attach it.
    ///
    /// Returns `None` when nothing suitable is found so that model application
    /// can create the database instead.
    async fn attach_existing_directory(
        &mut self,
        database_name: &str,
    ) -> Result<Option<DatabaseSummary>, ConnectionError> {
        let Some(data_dir) = self.server.data_dir().map(str::to_string) else {
            warn!("Server did not report a data directory, skipping folder discovery");
            return Ok(None);
        };

        // Folder names compare without case, like catalog names.
        let prefix = database_name.to_lowercase();
        let entries = self.server.get_subdirs(&data_dir).await?;
        let Some(entry) = entries
            .iter()
            .find(|entry| entry.allowed && entry.dir.to_lowercase().starts_with(&prefix))
        else {
            debug!("No attachable folder for {} in {}", database_name, data_dir);
            return Ok(None);
        };

        let folder = join_server_path(&data_dir, &entry.dir);
        self.server.attach(&folder).await?;
        self.server.refresh().await?;
        self.server.find_database(database_name).await
    }

    async fn apply_model(
        &mut self,
        info: &ConnectionInfo,
        server_name: &str,
        database_name: &str,
    ) -> Result<DatabaseSummary, ConnectionError> {
        let bim_file = info.bim_file_full_name.as_deref().ok_or_else(|| {
            ConnectionError::model_definition(format!(
                "Could not find the model definition file for project {}",
                info.project_name.as_deref().unwrap_or_default()
            ))
        })?;
        info!("Applying {} to {}", bim_file.display(), database_name);

        let content = tokio::fs::read_to_string(bim_file)
            .await
            .map_err(|e| ConnectionError::io(bim_file, e))?;
        let command = prepare_model_command(&content, database_name)?;
        self.server.execute(command).await?;

        self.server.refresh().await?;
        self.server
            .find_database(database_name)
            .await?
            .ok_or_else(|| not_found(database_name, server_name))
    }
}

fn not_found(database_name: &str, server_name: &str) -> ConnectionError {
    ConnectionError::database_not_found(format!(
        "Could not connect to database {} on server {}",
        database_name, server_name
    ))
}

/// Join a server-side directory and a child name using the server's separator.
fn join_server_path(dir: &str, child: &str) -> String {
    let separator = if dir.contains('/') && !dir.contains('\\') {
        '/'
    } else {
        '\\'
    };
    format!("{}{}{}", dir.trim_end_matches(['\\', '/']), separator, child)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::{database, FakeServer};
    use crate::xmla::{DirectQueryMode, SubdirEntry, XmlaCommand};
    use std::path::PathBuf;

    fn project_info(database_name: &str, bim_file: Option<PathBuf>) -> ConnectionInfo {
        let mut info = ConnectionInfo::for_database("localhost", database_name);
        info.use_project = true;
        info.project_name = Some("Sales".to_string());
        info.bim_file_full_name = bim_file;
        info
    }

    fn write_bim(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Model.bim");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_existing_database() {
        let mut server = FakeServer::tabular().with_database("Sales", 1500);
        server.facts.database_mode = DirectQueryMode::DirectQuery;
        let info = ConnectionInfo::for_database("localhost", "Sales");

        let mut initializer = ServerInitializer::new(&mut server);
        let result = initializer.run(&info).await.unwrap();
        assert_eq!(initializer.state(), InitState::Finalized);
        assert_eq!(result.compatibility_level, 1500);
        assert!(result.direct_query);
        assert!(!server.called("subdirs"));
        assert!(!server.called("execute"));
    }

    #[tokio::test]
    async fn test_wrong_mode_fails_after_connect() {
        let mut server = FakeServer::tabular().with_database("Sales", 1500);
        server.mode = ServerMode::Multidimensional;
        let info = ConnectionInfo::for_database("localhost", "Sales");

        let mut initializer = ServerInitializer::new(&mut server);
        let err = initializer.run(&info).await.unwrap_err();
        assert_eq!(initializer.state(), InitState::Connected);
        assert!(matches!(err, ConnectionError::ServerMode(_)));
        assert!(!server.called("find"));
    }

    #[tokio::test]
    async fn test_missing_explicit_database_fails_without_discovery() {
        let mut server = FakeServer::tabular();
        let info = ConnectionInfo::for_database("localhost", "Sales");

        let err = ServerInitializer::new(&mut server).run(&info).await.unwrap_err();
        assert_eq!(err.to_string(), "Could not connect to database Sales on server localhost");
        assert!(!server.called("subdirs"));
    }

    #[tokio::test]
    async fn test_attaches_allowed_matching_folder() {
        let mut server = FakeServer::tabular();
        server.subdirs = vec![
            SubdirEntry { dir: "Other.0.db".into(), allowed: true },
            SubdirEntry { dir: "Sales_ws.1.db".into(), allowed: false },
            SubdirEntry { dir: "Sales_ws.2.db".into(), allowed: true },
        ];
        server.on_attach = Some(database("Sales_ws", 1200));
        let info = project_info("Sales_ws", None);

        let result = ServerInitializer::new(&mut server)
            .closed_bim_file(true)
            .run(&info)
            .await
            .unwrap();
        assert_eq!(result.database.name, "Sales_ws");
        assert!(server.called("subdirs C:\\OLAP\\Data"));
        assert!(server.called("attach C:\\OLAP\\Data\\Sales_ws.2.db"));
        assert!(!server.called("execute"));
    }

    #[tokio::test]
    async fn test_folder_match_ignores_case() {
        let mut server = FakeServer::tabular();
        server.subdirs = vec![SubdirEntry { dir: "SALES_WS.3.db".into(), allowed: true }];
        server.on_attach = Some(database("Sales_ws", 1400));
        let info = project_info("sales_ws", None);

        let result = ServerInitializer::new(&mut server)
            .closed_bim_file(true)
            .run(&info)
            .await
            .unwrap();
        assert_eq!(result.compatibility_level, 1400);
        assert!(server.called("attach C:\\OLAP\\Data\\SALES_WS.3.db"));
    }

    #[tokio::test]
    async fn test_no_folder_defers_to_model_application() {
        let (_dir, bim) = write_bim(r#"{"name": "SemanticModel", "id": "SemanticModel", "compatibilityLevel": 1500}"#);
        let mut server = FakeServer::tabular();
        server.subdirs = vec![SubdirEntry { dir: "Sales_ws.0.db".into(), allowed: false }];
        server.on_execute = Some(database("Sales_ws", 1500));
        let info = project_info("Sales_ws", Some(bim));

        let mut initializer = ServerInitializer::new(&mut server);
        let result = initializer.run(&info).await.unwrap();
        assert_eq!(initializer.state(), InitState::Finalized);
        assert_eq!(result.compatibility_level, 1500);
        assert!(!server.called("attach"));

        let XmlaCommand::Statement(statement) = &server.executed[0] else {
            panic!("expected a JSON statement");
        };
        assert!(statement.contains("createOrReplace"));
        assert!(statement.contains("\"Sales_ws\""));
    }

    #[tokio::test]
    async fn test_closed_bim_file_and_nothing_found_fails_at_finalize() {
        let mut server = FakeServer::tabular();
        let info = project_info("Sales_ws", None);

        let mut initializer = ServerInitializer::new(&mut server).closed_bim_file(true);
        let err = initializer.run(&info).await.unwrap_err();
        assert_eq!(initializer.state(), InitState::DatabaseResolved);
        assert!(matches!(err, ConnectionError::DatabaseNotFound(_)));
    }

    #[tokio::test]
    async fn test_model_that_creates_nothing_fails() {
        let (_dir, bim) = write_bim(r#"{"name": "m", "id": "m"}"#);
        let mut server = FakeServer::tabular();
        let info = project_info("Sales_ws", Some(bim));

        let err = ServerInitializer::new(&mut server).run(&info).await.unwrap_err();
        assert!(matches!(err, ConnectionError::DatabaseNotFound(_)));
        assert!(server.called("refresh"));
    }

    #[tokio::test]
    async fn test_invalid_model_fails_before_execute() {
        let (_dir, bim) = write_bim(r#"{"id": "m"}"#);
        let mut server = FakeServer::tabular().with_database("Sales_ws", 1500);
        let info = project_info("Sales_ws", Some(bim));

        let err = ServerInitializer::new(&mut server).run(&info).await.unwrap_err();
        assert!(matches!(err, ConnectionError::ModelDefinition(_)));
        assert!(!server.called("execute"));
    }

    #[tokio::test]
    async fn test_missing_bim_path_fails() {
        let mut server = FakeServer::tabular().with_database("Sales_ws", 1500);
        let info = project_info("Sales_ws", None);
        let err = ServerInitializer::new(&mut server).run(&info).await.unwrap_err();
        assert!(err.to_string().contains("project Sales"));
    }

    #[tokio::test]
    async fn test_missing_data_dir_defers() {
        let mut server = FakeServer::tabular();
        server.data_dir = None;
        let info = project_info("Sales_ws", None);
        let err = ServerInitializer::new(&mut server)
            .closed_bim_file(true)
            .run(&info)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::DatabaseNotFound(_)));
        assert!(!server.called("subdirs"));
    }

    #[test]
    fn test_join_server_path() {
        assert_eq!(join_server_path("C:\\Data\\", "a.db"), "C:\\Data\\a.db");
        assert_eq!(join_server_path("/var/olap/data", "a.db"), "/var/olap/data/a.db");
    }
}

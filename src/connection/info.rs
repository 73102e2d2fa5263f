//! One endpoint of a comparison.

use super::initializer::ServerInitializer;
use super::project::{read_project_file, ProjectContext};
use super::settings::{find_settings_file, parse_settings, UserIdentity};
use crate::error::ConnectionError;
use crate::xmla::TabularServer;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Connection details for a source or target model.
///
/// Either an explicit server and database pair, or a local project whose
/// workspace database is found through the per-user settings file and whose
/// model definition may be applied to the server.
#[derive(Debug, Clone, Default)]
pub struct ConnectionInfo {
    pub use_project: bool,
    pub server_name: Option<String>,
    pub database_name: Option<String>,
    pub project_name: Option<String>,
    pub project_file: Option<PathBuf>,
    pub project: ProjectContext,
    pub bim_file_full_name: Option<PathBuf>,
    pub deployment_server_name: Option<String>,
    pub deployment_server_database: Option<String>,
    pub deployment_server_cube_name: Option<String>,
    compatibility_level: Option<i32>,
    direct_query: Option<bool>,
}

impl ConnectionInfo {
    /// An explicit server and database.
    pub fn for_database(server_name: impl Into<String>, database_name: impl Into<String>) -> Self {
        Self {
            server_name: Some(server_name.into()),
            database_name: Some(database_name.into()),
            ..Self::default()
        }
    }

    /// A local project; the workspace database is resolved later.
    pub fn for_project(project_file: impl Into<PathBuf>, project: ProjectContext) -> Self {
        Self {
            use_project: true,
            project_file: Some(project_file.into()),
            project,
            ..Self::default()
        }
    }

    /// Compatibility level of the resolved database, once initialized.
    pub fn compatibility_level(&self) -> Option<i32> {
        self.compatibility_level
    }

    /// Whether the resolved model uses direct query, once initialized.
    pub fn direct_query(&self) -> Option<bool> {
        self.direct_query
    }

    /// Directory holding the project descriptor.
    pub fn project_directory(&self) -> Option<&Path> {
        self.project_file
            .as_deref()
            .and_then(Path::parent)
            .map(|dir| if dir.as_os_str().is_empty() { Path::new(".") } else { dir })
    }

    /// Server and database the project deploys to, when both are known.
    pub fn deployment_target(&self) -> Option<(&str, &str)> {
        match (&self.deployment_server_name, &self.deployment_server_database) {
            (Some(server), Some(database)) => Some((server, database)),
            _ => None,
        }
    }

    fn require_project_file(&self) -> Result<&Path, ConnectionError> {
        self.project_file
            .as_deref()
            .ok_or_else(|| ConnectionError::config("No project file for a project connection"))
    }

    /// Read the workspace server and database from the user's settings file.
    ///
    /// A missing settings file is only tolerated headless, and only when the
    /// server and database have already been supplied.
    pub fn read_settings_file(&mut self, user: &UserIdentity) -> Result<(), ConnectionError> {
        self.require_project_file()?;
        let dir = self.project_directory().unwrap_or_else(|| Path::new(".")).to_path_buf();

        let Some(path) = find_settings_file(&dir, user)? else {
            let supplied = self.server_name.is_some() && self.database_name.is_some();
            if self.project.is_interactive() || !supplied {
                return Err(ConnectionError::settings(format!(
                    "Could not find a settings file for user {} in {}. Open the model in the designer to create a workspace database.",
                    user.normalized(),
                    dir.display()
                )));
            }
            debug!("No settings file for {}, keeping supplied server and database", user.normalized());
            return Ok(());
        };

        let content = std::fs::read_to_string(&path).map_err(|e| ConnectionError::io(&path, e))?;
        let settings = parse_settings(&content)?;
        info!(
            "Workspace from {}: {}.{}",
            path.display(),
            settings.server_name,
            settings.database_name
        );
        self.server_name = Some(settings.server_name);
        self.database_name = Some(settings.database_name);
        Ok(())
    }

    /// Read deployment properties and locate the model definition file.
    pub fn read_project_file(&mut self) -> Result<(), ConnectionError> {
        let project_file = self.require_project_file()?.to_path_buf();
        let settings = read_project_file(&project_file, &self.project)?;

        self.deployment_server_name = settings.deployment_server_name;
        self.deployment_server_database = settings.deployment_server_database;
        self.deployment_server_cube_name = settings.deployment_server_cube_name;
        self.bim_file_full_name = settings.bim_file;
        Ok(())
    }

    /// Resolve everything a project connection needs before initialization.
    pub fn resolve_project(&mut self, user: &UserIdentity) -> Result<(), ConnectionError> {
        let stem = self
            .require_project_file()?
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned());
        if self.project_name.is_none() {
            self.project_name = stem;
        }
        self.read_settings_file(user)?;
        self.read_project_file()
    }

    /// Connect, resolve or create the database, and record its compatibility
    /// level and direct query flag.
    ///
    /// Both facts are cleared first and only set again on success.
    pub async fn initialize_compatibility_level<S: TabularServer>(
        &mut self,
        server: &mut S,
        closed_bim_file: bool,
    ) -> Result<(), ConnectionError> {
        self.compatibility_level = None;
        self.direct_query = None;

        let initialized = ServerInitializer::new(server)
            .closed_bim_file(closed_bim_file)
            .run(self)
            .await?;

        self.compatibility_level = Some(initialized.compatibility_level);
        self.direct_query = Some(initialized.direct_query);
        Ok(())
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let server = self.server_name.as_deref().unwrap_or("?");
        let database = self.database_name.as_deref().unwrap_or("?");
        match (self.use_project, &self.project_name) {
            (true, Some(project)) => write!(f, "{} (workspace {}.{})", project, server, database),
            _ => write!(f, "{}.{}", server, database),
        }
    }
}

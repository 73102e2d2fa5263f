//! Per-user workspace settings files.
//!
//! The designer keeps one `*.settings` file per user next to the project,
//! naming the workspace server and database. The file is read as plain text
//! with literal start/end markers: it is not treated as XML.

use crate::constants::{
    DATABASE_NAME_END, DATABASE_NAME_START, SERVER_NAME_END, SERVER_NAME_START,
    SETTINGS_FILE_EXTENSION,
};
use crate::error::ConnectionError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The OS user a settings file is matched against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    name: String,
}

impl UserIdentity {
    /// Wrap a user name, with or without a `DOMAIN\` prefix.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Current OS user from `USERNAME` or `USER`.
    pub fn from_env() -> Option<Self> {
        std::env::var("USERNAME")
            .or_else(|_| std::env::var("USER"))
            .ok()
            .filter(|name| !name.trim().is_empty())
            .map(Self::new)
    }

    /// User name without any domain prefix.
    pub fn normalized(&self) -> &str {
        self.name.rsplit('\\').next().unwrap_or(&self.name).trim()
    }
}

/// Workspace server and database named by a settings file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceSettings {
    pub server_name: String,
    pub database_name: String,
}

/// Find the settings file in `dir` whose name contains the user name.
pub fn find_settings_file(
    dir: &Path,
    user: &UserIdentity,
) -> Result<Option<PathBuf>, ConnectionError> {
    let user_name = user.normalized().to_lowercase();
    if user_name.is_empty() {
        return Ok(None);
    }

    let entries = std::fs::read_dir(dir).map_err(|e| ConnectionError::io(dir, e))?;
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(SETTINGS_FILE_EXTENSION))
        })
        .collect();
    candidates.sort();

    let found = candidates.into_iter().find(|path| {
        path.file_name()
            .map(|name| name.to_string_lossy().to_lowercase().contains(&user_name))
            .unwrap_or(false)
    });
    debug!("Settings file for {}: {:?}", user.normalized(), found);
    Ok(found)
}

/// Extract the workspace server and database from settings file content.
pub fn parse_settings(content: &str) -> Result<WorkspaceSettings, ConnectionError> {
    Ok(WorkspaceSettings {
        server_name: extract_between(content, SERVER_NAME_START, SERVER_NAME_END)?,
        database_name: extract_between(content, DATABASE_NAME_START, DATABASE_NAME_END)?,
    })
}

/// Text between the first `start` marker and the first `end` marker after it.
fn extract_between(content: &str, start: &str, end: &str) -> Result<String, ConnectionError> {
    let malformed = || {
        ConnectionError::settings(format!(
            "Settings file is missing a well-formed {}...{} entry",
            start, end
        ))
    };

    let value_start = content.find(start).ok_or_else(malformed)? + start.len();
    let end_index = content.find(end).ok_or_else(malformed)?;
    if end_index < value_start {
        return Err(malformed());
    }
    Ok(content[value_start..end_index].to_string())
}

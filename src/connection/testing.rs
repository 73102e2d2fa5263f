//! In-memory [`TabularServer`] for unit tests.

use crate::error::ConnectionError;
use crate::xmla::{
    DatabaseSummary, DirectQueryFacts, ServerMode, SubdirEntry, TabularServer, XmlaCommand,
};

#[derive(Debug)]
pub(crate) struct FakeServer {
    pub mode: ServerMode,
    pub data_dir: Option<String>,
    pub databases: Vec<DatabaseSummary>,
    pub subdirs: Vec<SubdirEntry>,
    /// Database that appears once a folder is attached.
    pub on_attach: Option<DatabaseSummary>,
    /// Database that appears once a command is executed.
    pub on_execute: Option<DatabaseSummary>,
    pub facts: DirectQueryFacts,
    pub calls: Vec<String>,
    pub executed: Vec<XmlaCommand>,
    pending: Vec<DatabaseSummary>,
}

impl FakeServer {
    pub fn tabular() -> Self {
        Self {
            mode: ServerMode::Tabular,
            data_dir: Some("C:\\OLAP\\Data".to_string()),
            databases: Vec::new(),
            subdirs: Vec::new(),
            on_attach: None,
            on_execute: None,
            facts: DirectQueryFacts::default(),
            calls: Vec::new(),
            executed: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn with_database(mut self, name: &str, compatibility_level: i32) -> Self {
        self.databases.push(database(name, compatibility_level));
        self
    }

    pub fn called(&self, call: &str) -> bool {
        self.calls.iter().any(|c| c.starts_with(call))
    }
}

pub(crate) fn database(name: &str, compatibility_level: i32) -> DatabaseSummary {
    DatabaseSummary {
        id: name.to_string(),
        name: name.to_string(),
        compatibility_level,
    }
}

impl TabularServer for FakeServer {
    async fn connect(&mut self, server_name: &str) -> Result<(), ConnectionError> {
        self.calls.push(format!("connect {}", server_name));
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
        self.calls.push(format!("find {}", name));
        Ok(self
            .databases
            .iter()
            .find(|db| db.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn refresh(&mut self) -> Result<(), ConnectionError> {
        self.calls.push("refresh".to_string());
        self.databases.append(&mut self.pending);
        Ok(())
    }

    async fn get_subdirs(&mut self, dir: &str) -> Result<Vec<SubdirEntry>, ConnectionError> {
        self.calls.push(format!("subdirs {}", dir));
        Ok(self.subdirs.clone())
    }

    async fn attach(&mut self, folder: &str) -> Result<(), ConnectionError> {
        self.calls.push(format!("attach {}", folder));
        self.pending.extend(self.on_attach.take());
        Ok(())
    }

    async fn execute(&mut self, command: XmlaCommand) -> Result<(), ConnectionError> {
        self.calls.push("execute".to_string());
        self.executed.push(command);
        self.pending.extend(self.on_execute.take());
        Ok(())
    }

    async fn direct_query_facts(
        &mut self,
        database: &DatabaseSummary,
    ) -> Result<DirectQueryFacts, ConnectionError> {
        self.calls.push(format!("facts {}", database.name));
        Ok(self.facts)
    }
}

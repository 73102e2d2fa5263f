//! Connection resolution and server initialization.
//!
//! A [`ConnectionInfo`] starts either as an explicit server and database or as
//! a project reference. Project connections are resolved from the settings
//! file and project descriptor, then every connection is initialized against
//! a [`TabularServer`](crate::xmla::TabularServer).

mod info;
mod initializer;
mod model_file;
mod project;
mod settings;

#[cfg(test)]
pub(crate) mod testing;

pub use info::ConnectionInfo;
pub use initializer::{InitState, InitializedDatabase, ServerInitializer};
pub use model_file::prepare_model_command;
pub use project::{read_project_file, IdeProject, ProjectContext, ProjectFileSettings, StaticProject};
pub use settings::{find_settings_file, parse_settings, UserIdentity, WorkspaceSettings};

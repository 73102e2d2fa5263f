//! Project descriptor resolution.
//!
//! Reads deployment properties and locates the model definition file, either
//! through an interactive host's project handle or, headless, from the
//! descriptor's own item list.

use crate::constants::{MODEL_FILE_EXTENSION, MSBUILD_NAMESPACE};
use crate::error::ConnectionError;
use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Quoted value compared against in a `Condition`,
/// e.g. `'$(Configuration)|$(Platform)' == 'Development|AnyCPU'`.
static CONDITION_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"==\s*'([^']*)'").expect("valid condition regex"));

/// A live project in an interactive host.
pub trait IdeProject: Send + Sync + std::fmt::Debug {
    /// Name of the active build configuration, if any.
    fn active_configuration(&self) -> Option<String>;

    /// Full paths of the project's items.
    fn item_paths(&self) -> Vec<PathBuf>;
}

/// Whether an interactive host is present.
#[derive(Debug, Clone, Default)]
pub enum ProjectContext {
    /// Command-line or other non-interactive caller.
    #[default]
    Headless,

    /// Project open in an interactive host.
    Interactive(Arc<dyn IdeProject>),
}

impl ProjectContext {
    /// True when a project handle is present.
    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::Interactive(_))
    }

    /// Active configuration of the host project. Always `None` headless.
    pub fn active_configuration(&self) -> Option<String> {
        match self {
            Self::Headless => None,
            Self::Interactive(project) => project
                .active_configuration()
                .filter(|name| !name.trim().is_empty()),
        }
    }
}

/// In-memory [`IdeProject`] for hosts that already know the project layout.
#[derive(Debug, Clone, Default)]
pub struct StaticProject {
    pub configuration: Option<String>,
    pub items: Vec<PathBuf>,
}

impl IdeProject for StaticProject {
    fn active_configuration(&self) -> Option<String> {
        self.configuration.clone()
    }

    fn item_paths(&self) -> Vec<PathBuf> {
        self.items.clone()
    }
}

/// Values resolved from a project descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectFileSettings {
    pub deployment_server_name: Option<String>,
    pub deployment_server_database: Option<String>,
    pub deployment_server_cube_name: Option<String>,
    pub bim_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct PropertyGroup {
    condition: Option<String>,
    values: BTreeMap<String, String>,
}

/// How closely a group's `Condition` names a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConditionMatch {
    /// One `|`-separated part of the compared value is the configuration.
    Exact,
    /// The condition text contains the configuration name.
    Contains,
}

impl PropertyGroup {
    fn condition_match(&self, configuration: &str) -> Option<ConditionMatch> {
        let condition = self.condition.as_deref()?.to_lowercase();
        let configuration = configuration.trim().to_lowercase();
        if configuration.is_empty() || !condition.contains(&configuration) {
            return None;
        }
        let exact = CONDITION_VALUE.captures_iter(&condition).any(|captures| {
            captures[1]
                .split('|')
                .any(|part| part.trim() == configuration)
        });
        Some(if exact {
            ConditionMatch::Exact
        } else {
            ConditionMatch::Contains
        })
    }
}

#[derive(Debug, Default)]
struct ProjectDocument {
    property_groups: Vec<PropertyGroup>,
    compile_includes: Vec<String>,
}

impl ProjectDocument {
    /// Property value scoped to `configuration`, falling back to any group.
    fn property(&self, configuration: Option<&str>, name: &str) -> Option<String> {
        if let Some(configuration) = configuration {
            let scoped = [ConditionMatch::Exact, ConditionMatch::Contains]
                .into_iter()
                .find_map(|wanted| {
                    self.property_groups
                        .iter()
                        .filter(|group| group.condition_match(configuration) == Some(wanted))
                        .find_map(|group| group.values.get(name))
                });
            if let Some(value) = scoped {
                return Some(value.clone());
            }
            debug!("No {} for configuration {}, using unscoped lookup", name, configuration);
        }
        self.property_groups
            .iter()
            .find_map(|group| group.values.get(name))
            .cloned()
    }
}

/// Read deployment properties and the model definition path from a project descriptor.
pub fn read_project_file(
    project_file: &Path,
    context: &ProjectContext,
) -> Result<ProjectFileSettings, ConnectionError> {
    let content =
        std::fs::read_to_string(project_file).map_err(|e| ConnectionError::io(project_file, e))?;
    let document = parse_project(content.trim_start_matches('\u{feff}')).map_err(|e| {
        ConnectionError::project_file(format!(
            "Could not parse project file {}: {}",
            project_file.display(),
            e
        ))
    })?;

    let configuration = context.active_configuration();
    let configuration = configuration.as_deref();
    let project_dir = project_file.parent().unwrap_or_else(|| Path::new("."));

    let bim_file = match context {
        ProjectContext::Interactive(project) => project
            .item_paths()
            .into_iter()
            .find(|path| has_model_extension(&path.to_string_lossy())),
        ProjectContext::Headless => document
            .compile_includes
            .iter()
            .find(|include| has_model_extension(include))
            .map(|include| resolve_include(project_dir, include)),
    };

    let settings = ProjectFileSettings {
        deployment_server_name: document.property(configuration, "DeploymentServerName"),
        deployment_server_database: document.property(configuration, "DeploymentServerDatabase"),
        deployment_server_cube_name: document.property(configuration, "DeploymentServerCubeName"),
        bim_file,
    };
    debug!("Project file {}: {:?}", project_file.display(), settings);
    Ok(settings)
}

fn has_model_extension(name: &str) -> bool {
    name.to_lowercase().ends_with(MODEL_FILE_EXTENSION)
}

/// Resolve a (possibly backslash-separated) item include against the project directory.
fn resolve_include(project_dir: &Path, include: &str) -> PathBuf {
    include
        .split(['\\', '/'])
        .filter(|part| !part.is_empty())
        .fold(project_dir.to_path_buf(), |path, part| path.join(part))
}

fn is_msbuild(ns: &ResolveResult) -> bool {
    match ns {
        ResolveResult::Bound(Namespace(uri)) => *uri == MSBUILD_NAMESPACE.as_bytes(),
        ResolveResult::Unbound => true,
        ResolveResult::Unknown(_) => false,
    }
}

fn attribute(element: &BytesStart, name: &[u8]) -> Result<Option<String>, ConnectionError> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| ConnectionError::project_file(e.to_string()))?;
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Collect property groups and `Compile` includes. Elements must be in the
/// MSBuild namespace (or none, for SDK-style projects).
fn parse_project(xml: &str) -> Result<ProjectDocument, ConnectionError> {
    let mut reader = NsReader::from_str(xml);
    let mut document = ProjectDocument::default();
    let mut depth = 0usize;
    let mut group: Option<(usize, PropertyGroup)> = None;
    let mut property: Option<(String, String)> = None;

    loop {
        let (ns, event) = reader.read_resolved_event()?;
        let msbuild = is_msbuild(&ns);
        match event {
            Event::Start(e) => {
                depth += 1;
                match group.as_mut() {
                    Some((group_depth, _)) if depth == *group_depth + 1 && msbuild => {
                        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                        property = Some((name, String::new()));
                    }
                    Some(_) => {}
                    None if msbuild && e.local_name().as_ref() == b"PropertyGroup" => {
                        let condition = attribute(&e, b"Condition")?;
                        group = Some((
                            depth,
                            PropertyGroup {
                                condition,
                                values: BTreeMap::new(),
                            },
                        ));
                    }
                    None if msbuild && e.local_name().as_ref() == b"Compile" => {
                        if let Some(include) = attribute(&e, b"Include")? {
                            document.compile_includes.push(include);
                        }
                    }
                    None => {}
                }
            }
            Event::Empty(e) => {
                if let Some((group_depth, current)) = group.as_mut() {
                    if depth == *group_depth && msbuild {
                        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                        current.values.entry(name).or_default();
                    }
                } else if msbuild && e.local_name().as_ref() == b"Compile" {
                    if let Some(include) = attribute(&e, b"Include")? {
                        document.compile_includes.push(include);
                    }
                }
            }
            Event::Text(t) => {
                if let Some((_, value)) = property.as_mut() {
                    value.push_str(&t.unescape()?);
                }
            }
            Event::End(_) => {
                if let Some((group_depth, current)) = group.as_mut() {
                    if depth == *group_depth + 1 {
                        if let Some((name, value)) = property.take() {
                            current.values.entry(name).or_insert_with(|| value.trim().to_string());
                        }
                    } else if depth == *group_depth {
                        if let Some((_, finished)) = group.take() {
                            document.property_groups.push(finished);
                        }
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const PROJECT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Project DefaultTargets="Build" ToolsVersion="4.0" xmlns="http://schemas.microsoft.com/developer/msbuild/2003">
  <PropertyGroup>
    <Configuration Condition=" '$(Configuration)' == '' ">Development</Configuration>
    <Name>Sales</Name>
  </PropertyGroup>
  <PropertyGroup Condition=" '$(Configuration)|$(Platform)' == 'Development|AnyCPU' ">
    <DeploymentServerName>localhost\tabular</DeploymentServerName>
    <DeploymentServerDatabase>Sales_Dev</DeploymentServerDatabase>
    <DeploymentServerCubeName>Model</DeploymentServerCubeName>
  </PropertyGroup>
  <PropertyGroup Condition=" '$(Configuration)|$(Platform)' == 'Production|AnyCPU' ">
    <DeploymentServerName>prod-olap</DeploymentServerName>
    <DeploymentServerDatabase>Sales</DeploymentServerDatabase>
  </PropertyGroup>
  <ItemGroup>
    <Compile Include="Model\Model.BIM">
      <SubType>Code</SubType>
    </Compile>
  </ItemGroup>
</Project>"#;

    fn write_project(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Sales.smproj");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    fn interactive(configuration: &str, items: Vec<PathBuf>) -> ProjectContext {
        ProjectContext::Interactive(Arc::new(StaticProject {
            configuration: Some(configuration.to_string()),
            items,
        }))
    }

    #[test]
    fn test_headless_uses_first_unscoped_and_compile_include() {
        let (dir, path) = write_project(PROJECT);
        let settings = read_project_file(&path, &ProjectContext::Headless).unwrap();
        assert_eq!(settings.deployment_server_name.as_deref(), Some("localhost\\tabular"));
        assert_eq!(settings.deployment_server_database.as_deref(), Some("Sales_Dev"));
        assert_eq!(
            settings.bim_file.unwrap(),
            dir.path().join("Model").join("Model.BIM")
        );
    }

    #[test]
    fn test_scoped_lookup_preferred() {
        let (_dir, path) = write_project(PROJECT);
        let context = interactive("Production", vec![PathBuf::from("/work/Model.bim")]);
        let settings = read_project_file(&path, &context).unwrap();
        assert_eq!(settings.deployment_server_name.as_deref(), Some("prod-olap"));
        assert_eq!(settings.deployment_server_database.as_deref(), Some("Sales"));
        // Production has no cube name: unscoped fallback finds Development's.
        assert_eq!(settings.deployment_server_cube_name.as_deref(), Some("Model"));
        assert_eq!(settings.bim_file, Some(PathBuf::from("/work/Model.bim")));
    }

    #[test]
    fn test_unknown_configuration_falls_back() {
        let (_dir, path) = write_project(PROJECT);
        let context = interactive("Test", vec![]);
        let settings = read_project_file(&path, &context).unwrap();
        assert_eq!(settings.deployment_server_name.as_deref(), Some("localhost\\tabular"));
        assert_eq!(settings.bim_file, None);
    }

    #[test]
    fn test_missing_deployment_nodes_are_not_an_error() {
        let (_dir, path) = write_project(
            r#"<Project xmlns="http://schemas.microsoft.com/developer/msbuild/2003"><PropertyGroup><Name>x</Name></PropertyGroup></Project>"#,
        );
        let settings = read_project_file(&path, &ProjectContext::Headless).unwrap();
        assert_eq!(settings, ProjectFileSettings::default());
    }

    #[test]
    fn test_other_namespace_ignored() {
        let (_dir, path) = write_project(
            r#"<Project xmlns="urn:not-msbuild"><PropertyGroup><DeploymentServerName>x</DeploymentServerName></PropertyGroup></Project>"#,
        );
        let settings = read_project_file(&path, &ProjectContext::Headless).unwrap();
        assert_eq!(settings.deployment_server_name, None);
    }

    #[test]
    fn test_malformed_project_is_error() {
        let (_dir, path) = write_project("<Project><PropertyGroup></Project>");
        let err = read_project_file(&path, &ProjectContext::Headless).unwrap_err();
        assert!(matches!(err, ConnectionError::ProjectFile(_)));
    }

    #[test]
    fn test_platform_first_condition_is_scoped() {
        let (_dir, path) = write_project(
            r#"<Project xmlns="http://schemas.microsoft.com/developer/msbuild/2003">
  <PropertyGroup Condition=" '$(Configuration)|$(Platform)' == 'Development|AnyCPU' ">
    <DeploymentServerName>dev-olap</DeploymentServerName>
  </PropertyGroup>
  <PropertyGroup Condition=" '$(Platform)|$(Configuration)' == 'AnyCPU|Production' ">
    <DeploymentServerName>prod-olap</DeploymentServerName>
  </PropertyGroup>
</Project>"#,
        );
        let settings = read_project_file(&path, &interactive("Production", vec![])).unwrap();
        assert_eq!(settings.deployment_server_name.as_deref(), Some("prod-olap"));
    }

    #[test]
    fn test_exact_condition_preferred_over_substring() {
        let (_dir, path) = write_project(
            r#"<Project xmlns="http://schemas.microsoft.com/developer/msbuild/2003">
  <PropertyGroup Condition=" '$(Configuration)' == 'ProdTest' ">
    <DeploymentServerName>test-olap</DeploymentServerName>
  </PropertyGroup>
  <PropertyGroup Condition=" '$(Configuration)' == 'Prod' ">
    <DeploymentServerName>prod-olap</DeploymentServerName>
  </PropertyGroup>
</Project>"#,
        );
        let settings = read_project_file(&path, &interactive("Prod", vec![])).unwrap();
        assert_eq!(settings.deployment_server_name.as_deref(), Some("prod-olap"));
    }

    #[test]
    fn test_condition_matching() {
        let group = PropertyGroup {
            condition: Some(" '$(Configuration)|$(Platform)' == 'Development|AnyCPU' ".into()),
            values: BTreeMap::new(),
        };
        assert_eq!(group.condition_match("development"), Some(ConditionMatch::Exact));
        assert_eq!(group.condition_match("Dev"), Some(ConditionMatch::Contains));
        assert_eq!(group.condition_match("Production"), None);

        let loose = PropertyGroup {
            condition: Some("$(Configuration.StartsWith('Development'))".into()),
            values: BTreeMap::new(),
        };
        assert_eq!(loose.condition_match("Development"), Some(ConditionMatch::Contains));

        let unconditional = PropertyGroup::default();
        assert_eq!(unconditional.condition_match("Development"), None);
    }
}

//! Model definition files and the commands that apply them.
//!
//! Two formats are supported and told apart by whether the content parses as
//! JSON, not by file extension:
//! - JSON models: `name` and `id` are rewritten and the document is wrapped in
//!   a `createOrReplace` command.
//! - Legacy XML models: an ASSL `Alter` command whose database id and name
//!   nodes are rewritten; the root element is then sent as-is.

use crate::constants::ENGINE_NAMESPACE;
use crate::error::ConnectionError;
use crate::xmla::XmlaCommand;
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesText, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::{NsReader, Writer};
use serde_json::{json, Value};
use tracing::debug;

/// Element paths below the root that a legacy definition must contain.
const LEGACY_TARGETS: [&[&[u8]]; 3] = [
    &[b"Object", b"DatabaseID"],
    &[b"ObjectDefinition", b"Database", b"ID"],
    &[b"ObjectDefinition", b"Database", b"Name"],
];

const LEGACY_TARGET_NAMES: [&str; 3] = [
    "Object/DatabaseID",
    "ObjectDefinition/Database/ID",
    "ObjectDefinition/Database/Name",
];

/// Build the command that creates or replaces `database_name` from a model definition.
pub fn prepare_model_command(
    content: &str,
    database_name: &str,
) -> Result<XmlaCommand, ConnectionError> {
    let content = content.trim_start_matches('\u{feff}');
    match serde_json::from_str::<Value>(content) {
        Ok(document) => json_command(document, database_name),
        Err(json_error) => {
            debug!("Model definition is not JSON ({}), trying legacy XML", json_error);
            legacy_command(content, database_name)
        }
    }
}

fn json_command(mut document: Value, database_name: &str) -> Result<XmlaCommand, ConnectionError> {
    let object = document.as_object_mut().ok_or_else(|| {
        ConnectionError::model_definition("Model definition file is not a JSON object")
    })?;
    for field in ["name", "id"] {
        if !object.contains_key(field) {
            return Err(ConnectionError::model_definition(format!(
                "Model definition file has no '{}' property",
                field
            )));
        }
    }
    object.insert("name".to_string(), Value::from(database_name));
    object.insert("id".to_string(), Value::from(database_name));

    let command = json!({
        "createOrReplace": {
            "object": { "database": database_name },
            "database": document,
        }
    });
    serde_json::to_string_pretty(&command)
        .map(XmlaCommand::Statement)
        .map_err(|e| ConnectionError::model_definition(format!("Could not write command: {}", e)))
}

fn legacy_error(detail: impl std::fmt::Display) -> ConnectionError {
    ConnectionError::model_definition(format!(
        "Model definition file is not valid JSON and could not be read as a legacy XML definition: {}",
        detail
    ))
}

/// Index of the legacy target whose path matches `path` (root excluded).
fn legacy_target(path: &[(Vec<u8>, bool)]) -> Option<usize> {
    let below_root = path.get(1..)?;
    LEGACY_TARGETS.iter().position(|target| {
        target.len() == below_root.len()
            && target
                .iter()
                .zip(below_root)
                .all(|(want, (local, engine))| *engine && local.as_slice() == *want)
    })
}

fn legacy_command(content: &str, database_name: &str) -> Result<XmlaCommand, ConnectionError> {
    let mut reader = NsReader::from_str(content);
    let mut writer = Writer::new(Vec::new());
    let mut path: Vec<(Vec<u8>, bool)> = Vec::new();
    let mut found = [false; 3];
    let mut replacing: Option<usize> = None;
    let mut seen_root = false;

    let replacement = partial_escape(database_name);

    loop {
        let (ns, event) = reader.read_resolved_event().map_err(legacy_error)?;
        let engine =
            matches!(ns, ResolveResult::Bound(Namespace(uri)) if uri == ENGINE_NAMESPACE.as_bytes());

        if let Event::Eof = event {
            break;
        }
        // Only the root element is sent; drop the prolog and anything after the root.
        let outside_root = path.is_empty() && !matches!(event, Event::Start(_) | Event::Empty(_));
        if outside_root || (path.is_empty() && seen_root) {
            continue;
        }

        match event {
            Event::Start(e) => {
                seen_root = true;
                path.push((e.local_name().as_ref().to_vec(), engine));
                if replacing.is_some() {
                    continue;
                }
                let target = legacy_target(&path);
                writer.write_event(Event::Start(e)).map_err(legacy_error)?;
                if let Some(index) = target {
                    found[index] = true;
                    replacing = Some(path.len());
                    writer
                        .write_event(Event::Text(BytesText::from_escaped(replacement.clone())))
                        .map_err(legacy_error)?;
                }
            }
            Event::Empty(e) => {
                seen_root = true;
                if replacing.is_some() {
                    continue;
                }
                path.push((e.local_name().as_ref().to_vec(), engine));
                match legacy_target(&path) {
                    Some(index) => {
                        found[index] = true;
                        let end = e.to_end().into_owned();
                        writer.write_event(Event::Start(e)).map_err(legacy_error)?;
                        writer
                            .write_event(Event::Text(BytesText::from_escaped(replacement.clone())))
                            .map_err(legacy_error)?;
                        writer.write_event(Event::End(end)).map_err(legacy_error)?;
                    }
                    None => writer.write_event(Event::Empty(e)).map_err(legacy_error)?,
                }
                path.pop();
            }
            Event::End(e) => {
                match replacing {
                    Some(depth) if depth == path.len() => {
                        replacing = None;
                        writer.write_event(Event::End(e)).map_err(legacy_error)?;
                    }
                    Some(_) => {}
                    None => writer.write_event(Event::End(e)).map_err(legacy_error)?,
                }
                path.pop();
            }
            other => {
                if replacing.is_none() {
                    writer.write_event(other).map_err(legacy_error)?;
                }
            }
        }
    }

    if !seen_root {
        return Err(legacy_error("no root element"));
    }
    let missing: Vec<&str> = found
        .iter()
        .zip(LEGACY_TARGET_NAMES)
        .filter(|(present, _)| !**present)
        .map(|(_, name)| name)
        .collect();
    if !missing.is_empty() {
        return Err(legacy_error(format!("missing {}", missing.join(", "))));
    }

    String::from_utf8(writer.into_inner())
        .map(XmlaCommand::Xml)
        .map_err(legacy_error)
}

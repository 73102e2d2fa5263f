//! XMLA response parsing.
//!
//! Responses are fully buffered and scanned once with a namespace-aware
//! reader. Tabular results are the `row` elements bound to the rowset
//! namespace; each row becomes a map from child element name to its text.

use crate::constants::{ROWSET_NAMESPACE, XMLA_NAMESPACE};
use crate::error::ConnectionError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use std::collections::BTreeMap;
use tracing::warn;

/// One result row keyed by column element name.
pub type Row = BTreeMap<String, String>;

/// A parsed XMLA response.
#[derive(Debug, Clone, Default)]
pub struct XmlaResponse {
    /// Session id announced in the response header, if any.
    pub session_id: Option<String>,

    /// Rows from the rowset result, in document order.
    pub rows: Vec<Row>,

    /// `faultstring` of a SOAP fault.
    pub fault: Option<String>,

    /// Descriptions of XMLA `Error` messages.
    pub errors: Vec<String>,

    /// Descriptions of XMLA `Warning` messages.
    pub warnings: Vec<String>,

    /// The response body, for metadata lookups.
    pub body: String,
}

impl XmlaResponse {
    /// Parse a response envelope.
    pub fn parse(body: String) -> Result<Self, ConnectionError> {
        let mut response = XmlaResponse {
            rows: collect_records(&body, |ns, local| {
                local == b"row" && is_bound_to(ns, ROWSET_NAMESPACE)
            })?,
            ..Default::default()
        };

        let mut reader = NsReader::from_str(&body);
        let mut in_faultstring = false;
        let mut fault = String::new();

        loop {
            let (ns, event) = reader.read_resolved_event()?;
            let xmla_bound = is_bound_to(&ns, XMLA_NAMESPACE);
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    match e.local_name().as_ref() {
                        b"faultstring" => in_faultstring = !is_empty,
                        b"Session" if xmla_bound => {
                            if let Some(id) = attribute(e, b"SessionId")? {
                                response.session_id = Some(id);
                            }
                        }
                        b"Error" => {
                            if let Some(description) = attribute(e, b"Description")? {
                                response.errors.push(description);
                            }
                        }
                        b"Warning" => {
                            if let Some(description) = attribute(e, b"Description")? {
                                response.warnings.push(description);
                            }
                        }
                        _ => {}
                    }
                }
                Event::Text(ref t) if in_faultstring => fault.push_str(&t.unescape()?),
                Event::End(ref e) if e.local_name().as_ref() == b"faultstring" => {
                    in_faultstring = false;
                    response.fault = Some(fault.trim().to_string());
                }
                Event::Eof => break,
                _ => {}
            }
        }

        response.body = body;
        Ok(response)
    }

    /// Turn SOAP faults and XMLA errors into a [`ConnectionError`].
    ///
    /// Warnings are logged and do not fail the request.
    pub fn into_result(self) -> Result<Self, ConnectionError> {
        for warning in &self.warnings {
            warn!("Server warning: {}", warning);
        }

        if !self.errors.is_empty() {
            return Err(ConnectionError::protocol(self.errors.join(" ")));
        }
        if let Some(fault) = &self.fault {
            return Err(ConnectionError::protocol(fault.clone()));
        }
        Ok(self)
    }

    /// Text of the first element with the given local name, in any namespace.
    pub fn element_text(&self, local_name: &str) -> Result<Option<String>, ConnectionError> {
        let records = collect_records(&self.body, |_, local| local == local_name.as_bytes())?;
        Ok(records.into_iter().next().map(|mut record| {
            record.remove(TEXT_KEY).unwrap_or_default()
        }))
    }

    /// Value of a named `ServerProperty` in server metadata.
    pub fn server_property(&self, name: &str) -> Result<Option<String>, ConnectionError> {
        let properties = collect_records(&self.body, |_, local| local == b"ServerProperty")?;
        Ok(properties
            .into_iter()
            .find(|p| p.get("Name").map(String::as_str) == Some(name))
            .and_then(|mut p| p.remove("Value")))
    }
}

/// Key under which a record's own direct text is stored.
const TEXT_KEY: &str = "";

fn is_bound_to(ns: &ResolveResult, uri: &str) -> bool {
    matches!(ns, ResolveResult::Bound(Namespace(bound)) if *bound == uri.as_bytes())
}

fn attribute(element: &BytesStart, local_name: &[u8]) -> Result<Option<String>, ConnectionError> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| ConnectionError::protocol(format!("Malformed XML: {}", e)))?;
        if attr.key.local_name().as_ref() == local_name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

struct OpenRecord {
    depth: usize,
    values: Row,
    column: Option<String>,
    text: String,
}

/// Collect every element accepted by `matches` as a record of its child
/// elements. Text nested below a child is flattened into that child's value;
/// the record's own direct text is stored under [`TEXT_KEY`].
fn collect_records<F>(xml: &str, matches: F) -> Result<Vec<Row>, ConnectionError>
where
    F: Fn(&ResolveResult, &[u8]) -> bool,
{
    let mut reader = NsReader::from_str(xml);
    let mut records = Vec::new();
    let mut open: Option<OpenRecord> = None;
    let mut depth = 0usize;

    loop {
        let (ns, event) = reader.read_resolved_event()?;
        match event {
            Event::Start(e) => {
                depth += 1;
                match open.as_mut() {
                    Some(record) if depth == record.depth + 1 => {
                        record.column = Some(local_name(&e));
                        record.text.clear();
                    }
                    Some(_) => {}
                    None if matches(&ns, e.local_name().as_ref()) => {
                        open = Some(OpenRecord {
                            depth,
                            values: Row::new(),
                            column: None,
                            text: String::new(),
                        });
                    }
                    None => {}
                }
            }
            Event::Empty(e) => match open.as_mut() {
                Some(record) if depth == record.depth => {
                    record.values.insert(local_name(&e), String::new());
                }
                Some(_) => {}
                None if matches(&ns, e.local_name().as_ref()) => records.push(Row::new()),
                None => {}
            },
            Event::Text(t) => {
                if let Some(record) = open.as_mut() {
                    record.text.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some(record) = open.as_mut() {
                    record.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                if let Some(record) = open.as_mut() {
                    if depth == record.depth + 1 {
                        if let Some(column) = record.column.take() {
                            let text = std::mem::take(&mut record.text);
                            record.values.insert(column, text.trim().to_string());
                        }
                    } else if depth == record.depth {
                        let text = std::mem::take(&mut record.text);
                        let trimmed = text.trim();
                        if !trimmed.is_empty() {
                            record.values.insert(TEXT_KEY.to_string(), trimmed.to_string());
                        }
                    }
                }
                if open.as_ref().is_some_and(|r| r.depth == depth) {
                    if let Some(record) = open.take() {
                        records.push(record.values);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(records)
}

fn local_name(element: &BytesStart) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).into_owned()
}

//! SOAP envelope construction for XMLA requests.
//!
//! [`EnvelopeBuilder`] is a small typed builder over `quick_xml::Writer`. An
//! envelope carries at most one session header and exactly one `Execute` or
//! `Discover` request.

use crate::constants::{ENGINE_NAMESPACE, SOAP_NAMESPACE, XMLA_NAMESPACE};
use crate::error::ConnectionError;
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

/// Command carried by an `Execute` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlaCommand {
    /// Free-text statement (JSON TMSL, DMX/MDX, or server statements such as
    /// `SystemGetSubdirs`). Escaped on output.
    Statement(String),

    /// Raw XML command element (ASSL), written verbatim.
    Xml(String),
}

impl XmlaCommand {
    /// ASSL command attaching a database folder.
    pub fn attach(folder: &str) -> Result<Self, ConnectionError> {
        let mut writer = Writer::new(Vec::new());
        start(&mut writer, "Attach", &[("xmlns", ENGINE_NAMESPACE)])?;
        text_element(&mut writer, "Folder", folder)?;
        text_element(&mut writer, "ReadWriteMode", "ReadWrite")?;
        end(&mut writer, "Attach")?;
        into_string(writer).map(Self::Xml)
    }

    /// `SystemGetSubdirs` statement listing the subdirectories of `dir`.
    pub fn system_get_subdirs(dir: &str) -> Self {
        Self::Statement(format!("SystemGetSubdirs '{}'", dir.replace('\'', "''")))
    }

    /// Command text, for logging.
    pub fn text(&self) -> &str {
        match self {
            Self::Statement(s) | Self::Xml(s) => s,
        }
    }
}

/// Session header placed in the SOAP header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum SessionHeader {
    #[default]
    None,
    Begin,
    Active(String),
    End(String),
}

#[derive(Debug, Clone)]
enum RequestBody {
    Execute(XmlaCommand),
    Discover(String),
}

/// Typed builder for XMLA SOAP envelopes.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeBuilder {
    session: SessionHeader,
    body: Option<RequestBody>,
    restrictions: Vec<(String, String)>,
    properties: Vec<(String, String)>,
}

impl EnvelopeBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the server to open a session with this request.
    pub fn begin_session(mut self) -> Self {
        self.session = SessionHeader::Begin;
        self
    }

    /// Run the request inside an existing session, if there is one.
    pub fn session(mut self, session_id: Option<&str>) -> Self {
        if let Some(id) = session_id {
            self.session = SessionHeader::Active(id.to_string());
        }
        self
    }

    /// Close the given session with this request.
    pub fn end_session(mut self, session_id: &str) -> Self {
        self.session = SessionHeader::End(session_id.to_string());
        self
    }

    /// Body is an `Execute` request carrying `command`.
    pub fn execute(mut self, command: XmlaCommand) -> Self {
        self.body = Some(RequestBody::Execute(command));
        self
    }

    /// Body is a `Discover` request for the given rowset.
    pub fn discover(mut self, request_type: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Discover(request_type.into()));
        self
    }

    /// Add a restriction (ignored for `Execute`).
    pub fn restriction(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.restrictions.push((name.into(), value.into()));
        self
    }

    /// Add an XMLA property to the property list.
    pub fn property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push((name.into(), value.into()));
        self
    }

    /// SOAPAction header value matching the request body.
    pub fn soap_action(&self) -> &'static str {
        match self.body {
            Some(RequestBody::Discover(_)) => crate::constants::SOAP_ACTION_DISCOVER,
            _ => crate::constants::SOAP_ACTION_EXECUTE,
        }
    }

    /// Serialize the envelope.
    pub fn build(&self) -> Result<String, ConnectionError> {
        let body = self
            .body
            .as_ref()
            .ok_or_else(|| ConnectionError::protocol("XMLA envelope has no request body"))?;

        let mut writer = Writer::new(Vec::new());
        start(&mut writer, "soap:Envelope", &[("xmlns:soap", SOAP_NAMESPACE)])?;

        match &self.session {
            SessionHeader::None => {}
            SessionHeader::Begin => {
                start(&mut writer, "soap:Header", &[])?;
                empty(
                    &mut writer,
                    "BeginSession",
                    &[("xmlns", XMLA_NAMESPACE), ("soap:mustUnderstand", "1")],
                )?;
                end(&mut writer, "soap:Header")?;
            }
            SessionHeader::Active(id) => {
                start(&mut writer, "soap:Header", &[])?;
                empty(
                    &mut writer,
                    "Session",
                    &[
                        ("xmlns", XMLA_NAMESPACE),
                        ("soap:mustUnderstand", "1"),
                        ("SessionId", id.as_str()),
                    ],
                )?;
                end(&mut writer, "soap:Header")?;
            }
            SessionHeader::End(id) => {
                start(&mut writer, "soap:Header", &[])?;
                empty(
                    &mut writer,
                    "EndSession",
                    &[
                        ("xmlns", XMLA_NAMESPACE),
                        ("soap:mustUnderstand", "1"),
                        ("SessionId", id.as_str()),
                    ],
                )?;
                end(&mut writer, "soap:Header")?;
            }
        }

        start(&mut writer, "soap:Body", &[])?;
        match body {
            RequestBody::Execute(command) => {
                start(&mut writer, "Execute", &[("xmlns", XMLA_NAMESPACE)])?;
                start(&mut writer, "Command", &[])?;
                match command {
                    XmlaCommand::Statement(text) => text_element(&mut writer, "Statement", text)?,
                    XmlaCommand::Xml(xml) => writer.get_mut().extend_from_slice(xml.as_bytes()),
                }
                end(&mut writer, "Command")?;
                self.write_properties(&mut writer)?;
                end(&mut writer, "Execute")?;
            }
            RequestBody::Discover(request_type) => {
                start(&mut writer, "Discover", &[("xmlns", XMLA_NAMESPACE)])?;
                text_element(&mut writer, "RequestType", request_type)?;
                start(&mut writer, "Restrictions", &[])?;
                start(&mut writer, "RestrictionList", &[])?;
                for (name, value) in &self.restrictions {
                    text_element(&mut writer, name, value)?;
                }
                end(&mut writer, "RestrictionList")?;
                end(&mut writer, "Restrictions")?;
                self.write_properties(&mut writer)?;
                end(&mut writer, "Discover")?;
            }
        }
        end(&mut writer, "soap:Body")?;
        end(&mut writer, "soap:Envelope")?;

        into_string(writer)
    }

    fn write_properties(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), ConnectionError> {
        start(writer, "Properties", &[])?;
        start(writer, "PropertyList", &[])?;
        for (name, value) in &self.properties {
            text_element(writer, name, value)?;
        }
        end(writer, "PropertyList")?;
        end(writer, "Properties")
    }
}

fn write_error(e: impl std::fmt::Display) -> ConnectionError {
    ConnectionError::protocol(format!("Failed to write XMLA request: {}", e))
}

fn start(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    attributes: &[(&str, &str)],
) -> Result<(), ConnectionError> {
    let element = BytesStart::new(name).with_attributes(attributes.iter().copied());
    writer
        .write_event(Event::Start(element))
        .map_err(write_error)
}

fn empty(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    attributes: &[(&str, &str)],
) -> Result<(), ConnectionError> {
    let element = BytesStart::new(name).with_attributes(attributes.iter().copied());
    writer
        .write_event(Event::Empty(element))
        .map_err(write_error)
}

fn end(writer: &mut Writer<Vec<u8>>, name: &str) -> Result<(), ConnectionError> {
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(write_error)
}

fn text_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    text: &str,
) -> Result<(), ConnectionError> {
    start(writer, name, &[])?;
    writer
        .write_event(Event::Text(BytesText::from_escaped(partial_escape(text))))
        .map_err(write_error)?;
    end(writer, name)
}

fn into_string(writer: Writer<Vec<u8>>) -> Result<String, ConnectionError> {
    String::from_utf8(writer.into_inner()).map_err(write_error)
}

//! XMLA request/response cycle over HTTP.
//!
//! One envelope per request, one fully buffered reply. The client remembers
//! the session id the server hands out and sends it with every later request.

use super::auth::{configure_auth, create_client, resolve_endpoint, truncate_for_log};
use super::envelope::{EnvelopeBuilder, XmlaCommand};
use super::response::{Row, XmlaResponse};
use crate::config::{AuthConfig, TransportConfig};
use crate::constants::LOG_COMMAND_TRUNCATE_LENGTH;
use crate::error::ConnectionError;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use std::time::Instant;
use tracing::{debug, info};

/// HTTP client for one XMLA endpoint and session.
#[derive(Debug, Clone)]
pub struct XmlaClient {
    http: Client,
    endpoint: String,
    auth: AuthConfig,
    session_id: Option<String>,
}

impl XmlaClient {
    /// Create a client for the endpoint serving `server_name`.
    pub fn new(server_name: &str, config: &TransportConfig) -> Result<Self, ConnectionError> {
        let endpoint = resolve_endpoint(server_name, &config.endpoint_template)?;
        Ok(Self {
            http: create_client(config)?,
            endpoint,
            auth: config.auth.clone(),
            session_id: None,
        })
    }

    /// Endpoint URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Current session id, if a session was opened.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Send one envelope, running it in the current session when there is one.
    pub async fn send(&mut self, builder: EnvelopeBuilder) -> Result<XmlaResponse, ConnectionError> {
        let builder = builder.session(self.session_id.as_deref());
        let envelope = builder.build()?;
        debug!(
            "XMLA request to {}: {}",
            self.endpoint,
            truncate_for_log(&envelope, LOG_COMMAND_TRUNCATE_LENGTH)
        );

        let start = Instant::now();
        let (status, body) = self.post(&builder, envelope).await?;
        debug!(
            "XMLA response {} ({} bytes) in {}ms",
            status,
            body.len(),
            start.elapsed().as_millis()
        );

        let parsed = read_reply(status, body)?;
        if let Some(id) = &parsed.session_id {
            if self.session_id.as_deref() != Some(id.as_str()) {
                info!("Opened XMLA session {}", id);
                self.session_id = Some(id.clone());
            }
        }
        Ok(parsed)
    }

    /// Execute a command.
    pub async fn execute(&mut self, command: XmlaCommand) -> Result<XmlaResponse, ConnectionError> {
        debug!(
            "Executing: {}",
            truncate_for_log(command.text(), LOG_COMMAND_TRUNCATE_LENGTH)
        );
        self.send(EnvelopeBuilder::new().execute(command)).await
    }

    /// Execute a command and return its result rows.
    pub async fn execute_rows(&mut self, command: XmlaCommand) -> Result<Vec<Row>, ConnectionError> {
        Ok(self.execute(command).await?.rows)
    }

    /// Run a discover request with the given restrictions.
    pub async fn discover(
        &mut self,
        request_type: &str,
        restrictions: &[(&str, &str)],
    ) -> Result<XmlaResponse, ConnectionError> {
        let mut builder = EnvelopeBuilder::new().discover(request_type);
        for (name, value) in restrictions {
            builder = builder.restriction(*name, *value);
        }
        self.send(builder).await
    }

    /// Open a session with a discover request, unless one is already open.
    pub async fn begin_session(
        &mut self,
        request_type: &str,
        restrictions: &[(&str, &str)],
        properties: &[(&str, &str)],
    ) -> Result<XmlaResponse, ConnectionError> {
        let mut builder = EnvelopeBuilder::new().begin_session().discover(request_type);
        for (name, value) in restrictions {
            builder = builder.restriction(*name, *value);
        }
        for (name, value) in properties {
            builder = builder.property(*name, *value);
        }
        self.send(builder).await
    }

    /// Close the current session, if any.
    pub async fn end_session(&mut self) -> Result<(), ConnectionError> {
        if let Some(id) = self.session_id.take() {
            let builder = EnvelopeBuilder::new()
                .end_session(&id)
                .execute(XmlaCommand::Statement(String::new()));
            let envelope = builder.build()?;
            let (status, body) = self.post(&builder, envelope).await?;
            read_reply(status, body)?;
            info!("Closed XMLA session {}", id);
        }
        Ok(())
    }

    async fn post(
        &self,
        builder: &EnvelopeBuilder,
        envelope: String,
    ) -> Result<(StatusCode, String), ConnectionError> {
        let request = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", builder.soap_action())
            .body(envelope);
        let response = configure_auth(request, &self.auth).send().await?;
        let status = response.status();
        Ok((status, response.text().await?))
    }
}

/// Parse a reply, turning HTTP failures, SOAP faults and XMLA errors into errors.
fn read_reply(status: StatusCode, body: String) -> Result<XmlaResponse, ConnectionError> {
    let parsed = match XmlaResponse::parse(body) {
        Ok(parsed) => parsed,
        Err(e) if status.is_success() => return Err(e),
        Err(_) => return Err(status_error(status)),
    };
    let has_failure = parsed.fault.is_some() || !parsed.errors.is_empty();
    if !status.is_success() && !has_failure {
        return Err(status_error(status));
    }
    parsed.into_result()
}

fn status_error(status: StatusCode) -> ConnectionError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ConnectionError::transport(format!("Authentication failed (HTTP {})", status))
        }
        _ => ConnectionError::transport(format!("Server returned HTTP {}", status)),
    }
}

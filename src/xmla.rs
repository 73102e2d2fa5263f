//! XMLA protocol plumbing: envelopes, responses, HTTP transport and the
//! server object model built on top of them.

pub mod auth;
mod client;
mod envelope;
mod response;
mod server;

pub use client::XmlaClient;
pub use envelope::{EnvelopeBuilder, XmlaCommand};
pub use response::{Row, XmlaResponse};
pub use server::{
    DatabaseSummary, DirectQueryFacts, DirectQueryMode, ModelDefaultMode, ServerMode,
    SubdirEntry, TabularServer, XmlaServer,
};

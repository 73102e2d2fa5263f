//! # tabular-connect
//!
//! Connection layer for comparing tabular analytical models.
//!
//! This crate provides:
//! - **Connection resolution**: workspace settings files and project descriptors
//! - **Server initialization**: mode check, database discovery and attach, model application
//! - **XMLA transport**: SOAP envelopes over HTTP with session tracking
//! - **Comparison sessions**: source and target endpoints with compatibility checks
//!
//! ## Architecture
//!
//! A [`ConnectionInfo`] is resolved first (project connections only), then
//! driven through the [`ServerInitializer`] state machine against any
//! [`TabularServer`]; [`XmlaServer`] is the HTTP implementation.

pub mod comparison;
pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod types;
pub mod xmla;

pub use comparison::{ComparisonSession, ServerFactory, XmlaServerFactory};
pub use config::Config;
pub use connection::{ConnectionInfo, ProjectContext, ServerInitializer, UserIdentity};
pub use error::ConnectionError;
pub use xmla::{TabularServer, XmlaServer};

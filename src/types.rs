//! Shared vocabulary used by callers of the connection layer.
//!
//! These closed tag sets are produced and consumed by the comparison and
//! deployment engine; the connection layer only carries them.

use serde::{Deserialize, Serialize};

/// Generate `name()`, `Display` and `FromStr` for a closed tag set.
macro_rules! tag_set {
    ($ty:ident, $err:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// Display name of this tag.
            #[must_use]
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.name())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = ParseTagError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim().to_lowercase().replace([' ', '-', '_'], "");
                $(
                    if wanted == $name.to_lowercase().replace([' ', '-', '_'], "") {
                        return Ok(Self::$variant);
                    }
                )+
                Err(ParseTagError { kind: $err, value: s.to_string() })
            }
        }
    };
}

/// Error returned when parsing a vocabulary tag fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTagError {
    kind: &'static str,
    value: String,
}

impl std::fmt::Display for ParseTagError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {}: '{}'", self.kind, self.value)
    }
}

impl std::error::Error for ParseTagError {}

/// Kind of model object reported by a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonObjectType {
    Model,
    DataSource,
    Table,
    Relationship,
    Measure,
    Kpi,
    CalculationItem,
    Expression,
    Perspective,
    Culture,
    Role,
    Action,
}

tag_set!(ComparisonObjectType, "comparison object type", {
    Model => "Model",
    DataSource => "Data Source",
    Table => "Table",
    Relationship => "Relationship",
    Measure => "Measure",
    Kpi => "KPI",
    CalculationItem => "Calculation Item",
    Expression => "Expression",
    Perspective => "Perspective",
    Culture => "Culture",
    Role => "Role",
    Action => "Action",
});

/// Action the merge engine will take for one compared object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MergeAction {
    Create,
    Update,
    Delete,
    #[default]
    Skip,
}

tag_set!(MergeAction, "merge action", {
    Create => "Create",
    Update => "Update",
    Delete => "Delete",
    Skip => "Skip",
});

/// Processing requested after deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProcessingOption {
    #[default]
    Recalc,
    Default,
    DoNotProcess,
    Full,
}

tag_set!(ProcessingOption, "processing option", {
    Recalc => "Recalc",
    Default => "Default",
    DoNotProcess => "Do Not Process",
    Full => "Full",
});

/// Outcome of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeploymentStatus {
    Success,
    Cancel,
    ConnectionFailure,
    Failure,
}

tag_set!(DeploymentStatus, "deployment status", {
    Success => "Success",
    Cancel => "Cancel",
    ConnectionFailure => "Connection Failure",
    Failure => "Failure",
});

/// How a data source authenticates against its provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthenticationKind {
    UsernamePassword,
    Windows,
    Key,
    OAuth2,
}

tag_set!(AuthenticationKind, "authentication kind", {
    UsernamePassword => "UsernamePassword",
    Windows => "Windows",
    Key => "Key",
    OAuth2 => "OAuth2",
});

/// One-shot request for data source credentials.
///
/// A handler fills in `username`/`password` or sets `cancel`. Not reused
/// across prompts.
#[derive(Debug, Clone)]
pub struct PasswordPrompt {
    pub authentication_kind: AuthenticationKind,
    pub data_source_name: String,
    pub username: String,
    pub password: String,
    pub cancel: bool,
}

impl PasswordPrompt {
    /// Create a prompt for a data source, prefilled with its current username.
    pub fn new(
        authentication_kind: AuthenticationKind,
        data_source_name: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            authentication_kind,
            data_source_name: data_source_name.into(),
            username: username.into(),
            password: String::new(),
            cancel: false,
        }
    }

    /// True when the handler supplied a password and did not cancel.
    pub fn is_answered(&self) -> bool {
        !self.cancel && !self.password.is_empty()
    }
}

/// Host-provided handler for password prompts.
pub trait PasswordPromptHandler {
    /// Fill in or cancel the prompt.
    fn prompt(&self, request: &mut PasswordPrompt);
}

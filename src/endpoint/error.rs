use crate::form::FieldErrors;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("select a workspace first")]
    NoWorkspace,

    #[error("no authenticated user, begin a session first")]
    RequireLogin,

    #[error("context {0} not found")]
    ContextNotFound(i64),

    #[error("missing capability {capability}")]
    PermissionDenied { capability: String },

    #[error("required field missing")]
    MissingRequiredField(#[source] FieldErrors),

    #[error("series {0} not found")]
    SeriesNotFound(String),

    #[error("series {series_id} could not be imported")]
    ImportFailed { series_id: String },

    #[error("series service request failed: {0:#}")]
    Bridge(anyhow::Error),

    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
}

impl EndpointError {
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParameter { .. } => "invalid_parameter",
            Self::NoWorkspace => "no_workspace",
            Self::RequireLogin => "require_login",
            Self::ContextNotFound(_) => "context_not_found",
            Self::PermissionDenied { .. } => "nopermissions",
            Self::MissingRequiredField(_) => "missing_required_field",
            Self::SeriesNotFound(_) => "series_not_found",
            Self::ImportFailed { .. } => "validation_error",
            Self::Bridge(_) => "bridge_failed",
            Self::Storage(_) => "db_query_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InvalidParameter { name, .. } => Some(json!({ "param": name })),
            Self::PermissionDenied { capability } => Some(json!({ "capability": capability })),
            Self::MissingRequiredField(errors) => Some(json!({ "fields": errors.0 })),
            _ => None,
        }
    }
}

//! Error taxonomy for the adapter layer and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::types::ActionOutcome;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid action '{action}' for {scope}")]
    InvalidAction { scope: &'static str, action: String },
    #[error("`{program}` exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` did not finish within {millis}ms")]
    Timeout { program: String, millis: u64 },
    #[error("docker engine: {0}")]
    Docker(String),
    #[error("upstream api: {0}")]
    Upstream(String),
    #[error("unexpected output: {0}")]
    Parse(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} backend disabled")]
    Disabled(&'static str),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl AdapterError {
    pub fn status(&self) -> StatusCode {
        match self {
            AdapterError::InvalidAction { .. } | AdapterError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AdapterError::NotFound(_) => StatusCode::NOT_FOUND,
            AdapterError::Disabled(_) => StatusCode::SERVICE_UNAVAILABLE,
            AdapterError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AdapterError::CommandFailed { .. }
            | AdapterError::Spawn { .. }
            | AdapterError::Docker(_)
            | AdapterError::Upstream(_)
            | AdapterError::Parse(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AdapterError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(ActionOutcome::failed(self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_action_is_a_client_error() {
        let e = AdapterError::InvalidAction {
            scope: "pm2",
            action: "explode".into(),
        };
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
        assert!(e.to_string().contains("invalid action"));
    }

    #[test]
    fn upstream_failures_map_to_bad_gateway() {
        assert_eq!(
            AdapterError::Upstream("refused".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AdapterError::Disabled("docker").status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}

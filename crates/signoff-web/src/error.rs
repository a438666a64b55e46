use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use signoff_core::Error;

/// Engine errors rendered as JSON with a matching status code
pub struct ApiError(pub Error);

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

pub fn status_for(e: &Error) -> StatusCode {
    match e {
        Error::NotAnAssignedSigner { .. } => StatusCode::FORBIDDEN,
        Error::BlockedByExistingRejection
        | Error::WaitingOnOtherApprovals { .. }
        | Error::NotRejected(_)
        | Error::InvalidSourceState { .. }
        | Error::InvalidTransition(_)
        | Error::ConflictRetry(_) => StatusCode::CONFLICT,
        Error::MissingJustification(_)
        | Error::DuplicateRole(_)
        | Error::EmptySignerSet
        | Error::InvalidRole(_)
        | Error::InvalidStatus(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::DocumentNotFound(_) | Error::VersionNotFound(_) | Error::SignatureNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        Error::PersistenceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::NotificationFailed(_) | Error::RegistrationFailed(_) => StatusCode::BAD_GATEWAY,
        Error::CorruptRecord(_) | Error::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, code = self.0.code(), "request failed");
        }

        let body = ErrorBody {
            code: self.0.code(),
            message: self.0.to_string(),
            retryable: self.0.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

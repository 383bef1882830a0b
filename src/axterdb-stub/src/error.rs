use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use axterdb_core::{MessageDetail, SchemaError};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum StubError {
    #[error("Invalid key")]
    Unauthorized,

    #[error("table {0} not found")]
    TableNotFound(String),

    #[error("table {0} already exists")]
    TableExists(String),

    #[error("table is required")]
    MissingTable,

    #[error("rows are required")]
    MissingRows,

    #[error("rows contain unaccepted type {0}")]
    UnacceptedType(String),

    #[error("{0} is not a column in the table")]
    UnknownColumn(String),

    #[error("{column} does not accept {value}")]
    TypeMismatch { column: String, value: Value },

    #[error("key not found")]
    UnknownKey,

    #[error("status {0} forced by test setup")]
    Forced(u16),
}

impl From<SchemaError> for StubError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::UnacceptedType(tag) => StubError::UnacceptedType(tag),
        }
    }
}

impl ResponseError for StubError {
    fn status_code(&self) -> StatusCode {
        match self {
            StubError::Unauthorized => StatusCode::UNAUTHORIZED,
            StubError::TableNotFound(_) | StubError::UnknownKey => StatusCode::NOT_FOUND,
            StubError::TableExists(_) => StatusCode::CONFLICT,
            StubError::MissingTable
            | StubError::MissingRows
            | StubError::UnacceptedType(_)
            | StubError::UnknownColumn(_)
            | StubError::TypeMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            StubError::Forced(status) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut response = HttpResponse::build(self.status_code());
        match self {
            // Column errors carry the message directly under `detail`
            StubError::UnknownColumn(_) | StubError::TypeMismatch { .. } => {
                response.json(serde_json::json!({ "detail": self.to_string() }))
            }
            _ => response.json(MessageDetail::envelope(self.to_string())),
        }
    }
}

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use tracing::error;

use crate::services::blob::BlobError;

pub type IncidentResult<T> = Result<T, IncidentError>;

/// Failure of an incident operation.
///
/// The first four variants are business-rule violations the caller can act on
/// and never leave partial state behind. `ExternalStorage` and `Store` are
/// infrastructure failures.
#[derive(Debug, thiserror::Error)]
pub enum IncidentError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Authorization(String),

    #[error("{0}")]
    StateConflict(String),

    #[error("{0}")]
    ExternalStorage(String),

    #[error("{0}")]
    Store(String),
}

impl From<mongodb::error::Error> for IncidentError {
    fn from(error: mongodb::error::Error) -> Self {
        IncidentError::Store(format!("DATABASE_ERROR: {}", error))
    }
}

impl From<mongodb::bson::ser::Error> for IncidentError {
    fn from(error: mongodb::bson::ser::Error) -> Self {
        IncidentError::Store(format!("SERIALIZATION_ERROR: {}", error))
    }
}

impl From<BlobError> for IncidentError {
    fn from(error: BlobError) -> Self {
        IncidentError::ExternalStorage(format!("BLOB_STORAGE_ERROR: {}", error))
    }
}

impl ResponseError for IncidentError {
    fn status_code(&self) -> StatusCode {
        match self {
            IncidentError::Validation(_) => StatusCode::BAD_REQUEST,
            IncidentError::NotFound(_) => StatusCode::NOT_FOUND,
            IncidentError::Authorization(_) => StatusCode::FORBIDDEN,
            IncidentError::StateConflict(_) => StatusCode::CONFLICT,
            IncidentError::ExternalStorage(_) => StatusCode::BAD_GATEWAY,
            IncidentError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            IncidentError::ExternalStorage(message) | IncidentError::Store(message) => {
                error!("{}", message);
                HttpResponse::build(self.status_code()).body("INTERNAL_FAILURE")
            }
            _ => HttpResponse::build(self.status_code()).body(self.to_string()),
        }
    }
}

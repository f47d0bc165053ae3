use thiserror::Error;

use crate::FieldType;

/// Stable label for each failure a prediction request can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ErrorKind {
    MissingField,
    BadType,
    DecodeFailure,
    ModelFailure,
    NotFound,
    MalformedRequest,
}

/// Failure of a single prediction request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredictionError {
    /// A field declared by the schema is absent or `null`.
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// A field is present but cannot be coerced to its declared type.
    #[error("Field '{field}' must be {}", .expected.describe())]
    BadType { field: String, expected: FieldType },

    /// An image payload could not be decoded.
    #[error("Failed to decode image: {0}")]
    DecodeFailure(String),

    /// The model call failed or produced an unusable output.
    #[error("Model failure: {0}")]
    ModelFailure(String),

    /// No model is registered under the requested name.
    #[error("Unknown model: {0}")]
    NotFound(String),

    /// The request body could not be read as the expected envelope.
    #[error("Malformed request: {0}")]
    MalformedRequest(String),
}

impl PredictionError {
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn bad_type(field: impl Into<String>, expected: FieldType) -> Self {
        Self::BadType {
            field: field.into(),
            expected,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingField { .. } => ErrorKind::MissingField,
            Self::BadType { .. } => ErrorKind::BadType,
            Self::DecodeFailure(_) => ErrorKind::DecodeFailure,
            Self::ModelFailure(_) => ErrorKind::ModelFailure,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::MalformedRequest(_) => ErrorKind::MalformedRequest,
        }
    }

    /// HTTP status code the failure maps to.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::MissingField { .. }
            | Self::BadType { .. }
            | Self::DecodeFailure(_)
            | Self::MalformedRequest(_) => 400,
            Self::NotFound(_) => 404,
            Self::ModelFailure(_) => 500,
        }
    }

    /// Whether the caller is responsible for the failure.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

use std::time::Duration;

use bytesize::ByteSize;
use http::StatusCode;
use thiserror::Error;

use super::graft::GraftError;
use crate::graphql;

/// Errors that abort a whole multipart request.
///
/// Problems with a single file are not reported here: they settle that file's placeholder
/// with an [`UploadRejection`](super::UploadRejection) instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FileUploadError {
    /// Represents an invalid request, wrapping the context as a string
    #[error("invalid multipart request: {0}")]
    InvalidMultipartRequest(#[from] multer::Error),

    #[error("Missing multipart field 'operations'.")]
    MissingOperationsField,

    #[error("Missing multipart field 'map'.")]
    MissingMapField,

    #[error("Invalid JSON in the 'operations' multipart field: {0}")]
    InvalidJsonInOperationsField(serde_json::Error),

    #[error("Invalid JSON in the 'map' multipart field: {0}")]
    InvalidJsonInMapField(serde_json::Error),

    #[error("The '{0}' multipart field must be a JSON object.")]
    NotAnObject(&'static str),

    #[error("Invalid 'operations' multipart field: {0}.")]
    InvalidOperationsField(String),

    #[error("Invalid entry '{0}' in the 'map' multipart field, it should be a list of paths.")]
    InvalidMapEntry(String),

    #[error("Batched requests are not supported for file uploads.")]
    BatchRequestAreNotSupported,

    #[error("Invalid path '{0}' found inside 'map' field, it should start with 'variables.'.")]
    InvalidPathInsideMapField(String),

    #[error("Invalid path '{0}' found inside 'map' field, missing name of variable.")]
    MissingVariableNameInsideMapField(String),

    #[error("{0}")]
    InvalidVariablePath(#[from] GraftError),

    #[error("Reading multipart part '{filename}' did not finish within {timeout:?}.")]
    ReadTimeout { filename: String, timeout: Duration },

    #[error("Exceeded the limit of {0} file uploads of files in a single request.")]
    MaxFilesLimitExceeded(usize),

    #[error("File '{filename}' exceeds the maximum allowed size of {limit}.")]
    MaxFileSizeLimitExceeded { limit: ByteSize, filename: String },

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl FileUploadError {
    /// The HTTP status of the response reporting this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            FileUploadError::MaxFilesLimitExceeded(_)
            | FileUploadError::MaxFileSizeLimitExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            FileUploadError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<FileUploadError> for graphql::Error {
    fn from(value: FileUploadError) -> Self {
        Self::builder()
            .message(value.to_string())
            .extension_code(match &value {
                FileUploadError::MaxFilesLimitExceeded(_) => {
                    "FILE_UPLOADS_LIMITS_MAX_FILES_EXCEEDED".to_string()
                }
                FileUploadError::MaxFileSizeLimitExceeded { .. } => {
                    "FILE_UPLOADS_LIMITS_MAX_FILE_SIZE_EXCEEDED".to_string()
                }
                FileUploadError::Internal(_) => "INTERNAL_SERVER_ERROR".to_string(),
                _ => "FILE_UPLOADS_MALFORMED_REQUEST".to_string(),
            })
            .build()
    }
}

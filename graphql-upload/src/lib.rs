//! GraphQL multipart file uploads in front of a GraphQL engine.
//!
//! A multipart request is read in full, each file is grafted into the operation variables as a
//! [`PendingUpload`] and checked against the configured limits and MIME types. The operation
//! then goes to an [`Engine`], and its result is sent back as JSON. Incremental results are
//! collected before the response is written.
//!
//! [`FileUploadLayer`] wires this into a tower stack; other requests reach the inner service
//! unchanged.

pub mod configuration;
mod context;
pub mod engine;
pub mod file_uploads;
pub mod graphql;
pub mod json_ext;
pub mod response;
pub mod variables;

pub use crate::configuration::FileUploadsConfig;
pub use crate::context::Context;
pub use crate::context::ExtensionsGuard;
pub use crate::context::ExtensionsMutex;
pub use crate::engine::Engine;
pub use crate::engine::ExecutionResult;
pub use crate::engine::UploadRequest;
pub use crate::file_uploads::FileUploadError;
pub use crate::file_uploads::FileUploadLayer;
pub use crate::file_uploads::FileUploadService;
pub use crate::file_uploads::FileUploads;
pub use crate::file_uploads::PendingUpload;
pub use crate::file_uploads::ResolvedFile;
pub use crate::file_uploads::UploadRejection;
pub use crate::file_uploads::UploadState;
pub use crate::response::WireBody;
pub use crate::response::WireResponse;
pub use crate::variables::VariableValue;
pub use crate::variables::Variables;

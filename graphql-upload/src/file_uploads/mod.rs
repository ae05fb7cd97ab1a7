//! Multipart file uploads, following the GraphQL multipart request protocol.
//!
//! A request carries an `operations` field (the GraphQL operation), a `map` field (which
//! variables each file belongs to) and the files themselves. Every file is checked before the
//! operation runs: its placeholder in the variables is either resolved with the file or
//! rejected.

use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use http::HeaderMap;
use http::header::CONTENT_TYPE;
use mediatype::MediaType;
use mediatype::ReadParams;
use mediatype::names::BOUNDARY;
use mediatype::names::FORM_DATA;
use mediatype::names::MULTIPART;
use tracing::Instrument;

pub use self::error::FileUploadError;
pub use self::graft::GraftError;
pub use self::layer::FileUploadLayer;
pub use self::layer::FileUploadService;
pub use self::pending::PendingUpload;
pub use self::pending::UploadState;
pub use self::upload::ResolvedFile;
pub use self::upload::UploadRejection;
use crate::Context;
use crate::configuration::FileUploadsConfig;
use crate::engine::Engine;
use crate::response::WireResponse;

mod classify;
mod error;
mod graft;
mod layer;
mod map_field;
mod multipart_request;
mod orchestrator;
mod pending;
mod upload;

type Result<T> = std::result::Result<T, FileUploadError>;

/// Handles multipart requests on behalf of an [`Engine`].
#[derive(Clone)]
pub struct FileUploads {
    config: Arc<FileUploadsConfig>,
    engine: Arc<dyn Engine>,
}

impl FileUploads {
    pub fn new<E: Engine>(config: FileUploadsConfig, engine: E) -> Self {
        Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
        }
    }

    pub fn config(&self) -> &FileUploadsConfig {
        &self.config
    }

    /// Returns `true` if the headers announce a `multipart/form-data` body.
    pub fn is_multipart(headers: &HeaderMap) -> bool {
        get_multipart_mime(headers).is_some()
    }

    /// Reads a multipart request, runs its operation and returns the response to send.
    ///
    /// Failures never escape: they are reported as a GraphQL error with a matching status.
    pub async fn handle<S, E>(&self, headers: &HeaderMap, body: S, context: Context) -> WireResponse
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let span = tracing::debug_span!("file_uploads");
        async move {
            let boundary = match multipart_boundary(headers) {
                Ok(boundary) => boundary,
                Err(error) => return WireResponse::from_error(error),
            };
            let parts =
                match multipart_request::extract(body, boundary, self.config.limits).await {
                    Ok(parts) => parts,
                    Err(error) => {
                        tracing::warn!(%error, "could not read multipart request");
                        return WireResponse::from_error(error);
                    }
                };
            tracing::debug!(
                files = parts.files.len(),
                entries = parts.map.len(),
                "read multipart request"
            );
            orchestrator::process(parts, &self.config, context, self.engine.as_ref()).await
        }
        .instrument(span)
        .await
    }
}

fn get_multipart_mime(headers: &HeaderMap) -> Option<MediaType<'_>> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|header| header.to_str().ok())
        .and_then(|str| MediaType::parse(str).ok())
        .filter(|mime| mime.ty == MULTIPART && mime.subty == FORM_DATA)
}

fn multipart_boundary(headers: &HeaderMap) -> Result<String> {
    let mime = get_multipart_mime(headers)
        .ok_or(FileUploadError::InvalidMultipartRequest(multer::Error::NoMultipart))?;
    Ok(mime
        .get_param(BOUNDARY)
        .ok_or(FileUploadError::InvalidMultipartRequest(multer::Error::NoBoundary))?
        .unquoted_str()
        .into_owned())
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;
    use pretty_assertions::assert_eq;

    use super::*;

    fn headers(content_type: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers
    }

    #[test]
    fn it_detects_multipart_requests() {
        assert!(FileUploads::is_multipart(&headers(
            "multipart/form-data; boundary=abc"
        )));
        assert!(!FileUploads::is_multipart(&headers("application/json")));
        assert!(!FileUploads::is_multipart(&headers("multipart/mixed; boundary=abc")));
        assert!(!FileUploads::is_multipart(&HeaderMap::new()));
    }

    #[test]
    fn it_reads_the_boundary() {
        assert_eq!(
            multipart_boundary(&headers("multipart/form-data; boundary=\"xyz\"")).unwrap(),
            "xyz"
        );
        assert!(matches!(
            multipart_boundary(&headers("multipart/form-data")),
            Err(FileUploadError::InvalidMultipartRequest(
                multer::Error::NoBoundary
            ))
        ));
        assert!(matches!(
            multipart_boundary(&headers("text/plain")),
            Err(FileUploadError::InvalidMultipartRequest(
                multer::Error::NoMultipart
            ))
        ));
    }
}

use std::task::Poll;

use bytes::Bytes;
use futures::future::BoxFuture;
use http_body_util::BodyExt;
use tower::BoxError;
use tower::Layer;
use tower::Service;

use super::FileUploads;
use crate::Context;

/// Tower layer that answers multipart requests with [`FileUploads`].
///
/// Other requests reach the wrapped service untouched. A [`Context`] found in the request
/// extensions is handed to the engine.
#[derive(Clone)]
pub struct FileUploadLayer {
    uploads: FileUploads,
}

impl FileUploadLayer {
    pub fn new(uploads: FileUploads) -> Self {
        Self { uploads }
    }
}

impl<S> Layer<S> for FileUploadLayer {
    type Service = FileUploadService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        FileUploadService {
            inner,
            uploads: self.uploads.clone(),
        }
    }
}

/// Tower service answering multipart requests, see [`FileUploadLayer`].
#[derive(Clone)]
pub struct FileUploadService<S> {
    inner: S,
    uploads: FileUploads,
}

impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for FileUploadService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>, Error = BoxError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    ReqBody: http_body::Body<Data = Bytes> + Send + 'static,
    ReqBody::Error: Into<BoxError>,
    ResBody: From<Bytes> + Send + 'static,
{
    type Response = http::Response<ResBody>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<ReqBody>) -> Self::Future {
        if !self.uploads.config().enabled || !FileUploads::is_multipart(req.headers()) {
            return Box::pin(self.inner.call(req));
        }

        let uploads = self.uploads.clone();
        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let context = parts
                .extensions
                .get::<Context>()
                .cloned()
                .unwrap_or_default();
            let response = uploads
                .handle(&parts.headers, body.into_data_stream(), context)
                .await;
            Ok(response.into_http_response().map(ResBody::from))
        })
    }
}

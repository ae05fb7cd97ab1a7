//! The boundary to the GraphQL engine that executes operations.

use tower::BoxError;

use crate::Context;
use crate::graphql::Response;
use crate::graphql::ResponseStream;
use crate::json_ext::Object;
use crate::variables::Variables;

/// An operation whose variables hold the uploaded files.
///
/// By the time the engine receives it, every upload placeholder has settled: resolvers can
/// call [`PendingUpload::wait`](crate::file_uploads::PendingUpload::wait) without blocking.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct UploadRequest {
    pub query: String,
    pub operation_name: Option<String>,
    pub variables: Variables,
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl UploadRequest {
    #[builder(visibility = "pub")]
    fn new(
        query: String,
        operation_name: Option<String>,
        variables: Option<Variables>,
        extensions: Option<Object>,
    ) -> Self {
        Self {
            query,
            operation_name,
            variables: variables.unwrap_or_default(),
            extensions: extensions.unwrap_or_default(),
        }
    }
}

/// What an engine produced for an operation.
pub enum ExecutionResult {
    /// A single response.
    Single(Response),
    /// A response followed by patches, for `@defer` and `@stream`. The stream is finite.
    Incremental {
        initial: Response,
        subsequent: ResponseStream,
    },
    /// An unbounded stream of events. Multipart uploads cannot start a subscription.
    Subscription(ResponseStream),
}

/// Executes GraphQL operations.
#[async_trait::async_trait]
pub trait Engine: Send + Sync + 'static {
    async fn execute(
        &self,
        request: UploadRequest,
        context: Context,
    ) -> Result<ExecutionResult, BoxError>;
}

//! Turns what the engine produced into the body of the HTTP response.

use bytes::Bytes;
use futures::StreamExt;
use http::HeaderValue;
use http::StatusCode;
use http::header::CONTENT_TYPE;
use serde::Serialize;
use tower::BoxError;

use crate::engine::ExecutionResult;
use crate::file_uploads::FileUploadError;
use crate::graphql;

const APPLICATION_JSON: &str = "application/json";

/// The body sent back for a multipart request.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WireBody {
    Single(graphql::Response),
    /// An incremental result, drained into one document.
    Incremental {
        #[serde(rename = "initialResult")]
        initial_result: graphql::Response,
        #[serde(rename = "subsequentResults")]
        subsequent_results: Vec<graphql::Response>,
    },
}

/// An HTTP status with its JSON body.
#[derive(Clone, Debug, PartialEq)]
pub struct WireResponse {
    status: StatusCode,
    body: WireBody,
}

impl WireResponse {
    pub(crate) fn new(status: StatusCode, body: WireBody) -> Self {
        Self { status, body }
    }

    /// A response carrying a single GraphQL error for `error`.
    pub fn from_error(error: FileUploadError) -> Self {
        let status = error.status_code();
        let response = graphql::Response::builder()
            .error(graphql::Error::from(error))
            .build();
        Self::new(status, WireBody::Single(response))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &WireBody {
        &self.body
    }

    /// Serializes the body as JSON.
    pub fn into_http_response(self) -> http::Response<Bytes> {
        let (status, body) = match serde_json::to_vec(&self.body) {
            Ok(body) => (self.status, Bytes::from(body)),
            Err(error) => {
                tracing::error!(%error, "could not serialize the GraphQL response");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Bytes::from_static(
                        br#"{"errors":[{"message":"Internal server error","extensions":{"code":"INTERNAL_SERVER_ERROR"}}]}"#,
                    ),
                )
            }
        };
        let mut response = http::Response::new(body);
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        response
    }
}

/// Maps an engine outcome to a response.
///
/// Incremental results are collected in full before anything is sent. Subscriptions and
/// engine failures become a generic internal error, the details only go to the logs.
pub async fn adapt(result: Result<ExecutionResult, BoxError>) -> WireResponse {
    match result {
        Ok(ExecutionResult::Single(response)) => {
            WireResponse::new(StatusCode::OK, WireBody::Single(response))
        }
        Ok(ExecutionResult::Incremental {
            initial,
            subsequent,
        }) => {
            let subsequent_results: Vec<graphql::Response> = subsequent.collect().await;
            tracing::debug!(
                patches = subsequent_results.len(),
                "drained incremental result"
            );
            WireResponse::new(
                StatusCode::OK,
                WireBody::Incremental {
                    initial_result: initial,
                    subsequent_results,
                },
            )
        }
        Ok(ExecutionResult::Subscription(_)) => {
            tracing::error!("the GraphQL engine started a subscription for a multipart request");
            internal_error()
        }
        Err(error) => {
            tracing::error!(%error, "the GraphQL engine failed");
            internal_error()
        }
    }
}

fn internal_error() -> WireResponse {
    WireResponse::from_error(FileUploadError::Internal(
        "unexpected response from the GraphQL engine".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;
    use test_log::test;

    use super::*;
    use crate::json_ext::Value;

    fn body_json(response: WireResponse) -> (StatusCode, serde_json::Value) {
        let response = response.into_http_response();
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            APPLICATION_JSON
        );
        let status = response.status();
        (status, serde_json::from_slice(response.body()).unwrap())
    }

    fn data(value: Value) -> graphql::Response {
        graphql::Response::builder().data(value).build()
    }

    #[test(tokio::test)]
    async fn it_passes_single_responses_through() {
        let response = adapt(Ok(ExecutionResult::Single(data(json!({ "ok": true }))))).await;
        let (status, body) = body_json(response);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "data": { "ok": true } }));
    }

    #[test(tokio::test)]
    async fn it_drains_incremental_results() {
        let initial = graphql::Response::builder()
            .data(json!({ "a": 1 }))
            .has_next(true)
            .build();
        let patches = vec![
            graphql::Response::builder()
                .data(json!({ "b": 2 }))
                .has_next(true)
                .build(),
            graphql::Response::builder()
                .data(json!({ "c": 3 }))
                .has_next(false)
                .build(),
        ];
        let response = adapt(Ok(ExecutionResult::Incremental {
            initial,
            subsequent: Box::pin(stream::iter(patches)),
        }))
        .await;

        let (status, body) = body_json(response);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!({
                "initialResult": { "data": { "a": 1 }, "hasNext": true },
                "subsequentResults": [
                    { "data": { "b": 2 }, "hasNext": true },
                    { "data": { "c": 3 }, "hasNext": false }
                ]
            })
        );
    }

    #[test(tokio::test)]
    async fn it_refuses_subscriptions() {
        let events = Box::pin(stream::iter(vec![data(json!({ "tick": 1 }))]));
        let response = adapt(Ok(ExecutionResult::Subscription(events))).await;
        let (status, body) = body_json(response);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["errors"][0]["extensions"]["code"], "INTERNAL_SERVER_ERROR");
        assert!(body.get("data").is_none());
    }

    #[test(tokio::test)]
    async fn it_hides_engine_failures() {
        let response = adapt(Err("connection reset by subgraph".into())).await;
        let (status, body) = body_json(response);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body["errors"][0]["message"].as_str().unwrap();
        assert!(!message.contains("connection reset"));
    }

    #[test]
    fn it_reports_upload_errors_with_their_status() {
        let response = WireResponse::from_error(FileUploadError::MissingOperationsField);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let (_, body) = body_json(response);
        assert_eq!(
            body,
            serde_json::json!({
                "errors": [{
                    "message": "Missing multipart field 'operations'.",
                    "extensions": { "code": "FILE_UPLOADS_MALFORMED_REQUEST" }
                }]
            })
        );
    }
}

//! Turns extracted parts into an operation whose variables hold upload placeholders.

use bytesize::ByteSize;
use futures::future::join_all;

use super::PendingUpload;
use super::Result as UploadResult;
use super::classify::classify;
use super::error::FileUploadError;
use super::graft::graft;
use super::map_field::MapField;
use super::multipart_request::ExtractedParts;
use super::multipart_request::RawFilePart;
use crate::Context;
use crate::configuration::AllowedTypes;
use crate::configuration::FileUploadsConfig;
use crate::engine::Engine;
use crate::engine::UploadRequest;
use crate::response::WireResponse;
use crate::response::adapt;
use crate::variables::VariableValue;
use crate::variables::Variables;

/// Builds the operation to execute from the parts of a multipart request.
///
/// Each `map` entry is grafted into the variables at all of its paths: `null` when the
/// request has no part for it, otherwise one placeholder shared by every path. Files are then
/// checked concurrently, and every placeholder has settled when this returns.
///
/// Any file over the size limit refuses the whole request before a single graft happens.
pub(crate) async fn prepare(
    parts: ExtractedParts,
    config: &FileUploadsConfig,
) -> UploadResult<UploadRequest> {
    let ExtractedParts {
        mut files,
        map,
        operations,
    } = parts;
    let max_file_size = config.limits.max_file_size.as_u64();
    if let Some(oversized) = files.values().find(|file| file.size > max_file_size) {
        return Err(FileUploadError::MaxFileSizeLimitExceeded {
            limit: config.limits.max_file_size,
            filename: oversized.file_name.clone(),
        });
    }

    let map = MapField::new(map)?;
    let mut variables = Variables::from_json(operations.variables);
    let mut checks = Vec::new();
    for (name, paths) in map.iter() {
        let Some(part) = files.shift_remove(name) else {
            tracing::debug!(file = %name, "no part for map entry, setting its paths to null");
            for path in paths {
                graft(&mut variables, path, VariableValue::Null, config.path_conflict)?;
            }
            continue;
        };

        let upload = PendingUpload::new();
        for path in paths {
            graft(
                &mut variables,
                path,
                upload.clone().into(),
                config.path_conflict,
            )?;
        }
        checks.push(check_file(part, upload, &config.allowed_types));
    }
    for name in files.keys() {
        tracing::debug!(file = %name, "ignoring a file that is not referenced by the map");
    }

    join_all(checks).await;

    Ok(UploadRequest::builder()
        .query(operations.query)
        .and_operation_name(operations.operation_name)
        .variables(variables)
        .extensions(operations.extensions)
        .build())
}

async fn check_file(part: RawFilePart, upload: PendingUpload, allowed_types: &AllowedTypes) {
    // let the other checks start before this one runs to completion
    tokio::task::yield_now().await;
    match classify(&part, allowed_types) {
        Ok(file) => {
            tracing::debug!(
                file = %part.name,
                file_name = %file.file_name(),
                mime_type = %file.mime_type(),
                size = %ByteSize::b(file.file_size()),
                "accepted file upload"
            );
            upload.resolve(file);
        }
        Err(rejection) => {
            tracing::warn!(file = %part.name, %rejection, "rejected file upload");
            upload.reject(rejection);
        }
    }
}

/// Prepares the operation, hands it to the engine and adapts what comes back.
pub(crate) async fn process(
    parts: ExtractedParts,
    config: &FileUploadsConfig,
    context: Context,
    engine: &dyn Engine,
) -> WireResponse {
    let request = match prepare(parts, config).await {
        Ok(request) => request,
        Err(error) => {
            tracing::warn!(%error, "refusing multipart request");
            return WireResponse::from_error(error);
        }
    };
    adapt(engine.execute(request, context).await).await
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;
    use test_log::test;

    use super::*;
    use crate::configuration::MultipartRequestLimits;
    use crate::file_uploads::UploadRejection;
    use crate::file_uploads::UploadState;
    use crate::file_uploads::multipart_request::Operations;
    use crate::json_ext::Value;

    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00];

    fn file(name: &str, file_name: &str, content: &'static [u8]) -> (String, RawFilePart) {
        (
            name.to_string(),
            RawFilePart {
                name: name.to_string(),
                file_name: file_name.to_string(),
                declared_mime_type: "application/octet-stream".to_string(),
                encoding: "binary".to_string(),
                size: content.len() as u64,
                content: Bytes::from_static(content),
            },
        )
    }

    fn parts(
        variables: Value,
        map: &[(&str, &[&str])],
        files: Vec<(String, RawFilePart)>,
    ) -> ExtractedParts {
        let Value::Object(variables) = variables else {
            panic!("variables must be an object");
        };
        ExtractedParts {
            files: files.into_iter().collect(),
            map: map
                .iter()
                .map(|(name, paths)| {
                    (
                        name.to_string(),
                        paths.iter().map(|path| path.to_string()).collect(),
                    )
                })
                .collect::<IndexMap<_, _>>(),
            operations: Operations {
                query: "mutation($file: Upload) { upload(file: $file) }".to_string(),
                operation_name: None,
                variables,
                extensions: Default::default(),
            },
        }
    }

    #[test(tokio::test)]
    async fn it_grafts_null_for_missing_parts() {
        let request = prepare(
            parts(
                json!({ "file": "placeholder" }),
                &[("0", &["variables.file"])],
                vec![],
            ),
            &FileUploadsConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(
            serde_json_bytes::to_value(&request.variables).unwrap(),
            json!({ "file": null })
        );
    }

    #[test(tokio::test)]
    async fn it_settles_every_placeholder() {
        let request = prepare(
            parts(
                json!({ "file": null, "files": [null, null] }),
                &[
                    ("0", &["variables.file", "variables.files.1"]),
                    ("1", &["variables.files.0"]),
                ],
                vec![file("0", "note.txt", b"0123456789"), file("1", "a.png", PNG)],
            ),
            &FileUploadsConfig::default(),
        )
        .await
        .unwrap();

        let uploads = request.variables.uploads();
        assert_eq!(uploads.len(), 3);
        assert!(uploads.iter().all(|upload| upload.is_settled()));
        // both paths of the first file share one placeholder
        let first = request.variables.get_path("file").unwrap().as_upload().unwrap();
        let copy = request.variables.get_path("files.1").unwrap().as_upload().unwrap();
        assert!(first.ptr_eq(copy));
        assert_eq!(
            serde_json_bytes::to_value(&request.variables).unwrap(),
            json!({
                "file": {
                    "encoding": "binary",
                    "fileName": "note.txt",
                    "fileSize": 10,
                    "mimeType": "text/plain"
                },
                "files": [
                    {
                        "encoding": "binary",
                        "fileName": "a.png",
                        "fileSize": 10,
                        "mimeType": "image/png"
                    },
                    {
                        "encoding": "binary",
                        "fileName": "note.txt",
                        "fileSize": 10,
                        "mimeType": "text/plain"
                    }
                ]
            })
        );
    }

    #[test(tokio::test)]
    async fn it_rejects_files_independently() {
        let config = FileUploadsConfig::builder()
            .allowed_type("text/plain")
            .build();
        let request = prepare(
            parts(
                json!({ "a": null, "b": null }),
                &[("0", &["variables.a"]), ("1", &["variables.b"])],
                vec![file("0", "note.txt", b"hello"), file("1", "a.png", PNG)],
            ),
            &config,
        )
        .await
        .unwrap();

        let accepted = request.variables.get_path("a").unwrap().as_upload().unwrap();
        assert_eq!(accepted.wait().await.unwrap().file_name(), "note.txt");
        let rejected = request.variables.get_path("b").unwrap().as_upload().unwrap();
        assert_eq!(
            rejected.state(),
            UploadState::Rejected(UploadRejection::DisallowedType {
                file_name: "a.png".to_string(),
                mime_type: "image/png".to_string(),
            })
        );
    }

    #[test(tokio::test)]
    async fn it_refuses_oversized_files_before_grafting() {
        let config = FileUploadsConfig::builder()
            .limits(
                MultipartRequestLimits::builder()
                    .max_file_size(ByteSize::b(4))
                    .build(),
            )
            .build();
        let error = prepare(
            parts(
                json!({}),
                &[("0", &["variables.a"])],
                // not referenced by the map, still refused
                vec![file("0", "ok.txt", b"abc"), file("9", "big.txt", b"0123456789")],
            ),
            &config,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            error,
            FileUploadError::MaxFileSizeLimitExceeded { ref filename, .. } if filename == "big.txt"
        ));
    }

    #[test(tokio::test)]
    async fn it_accepts_files_of_exactly_the_maximum_size() {
        let config = FileUploadsConfig::builder()
            .limits(
                MultipartRequestLimits::builder()
                    .max_file_size(ByteSize::b(10))
                    .build(),
            )
            .build();
        let request = prepare(
            parts(
                json!({ "file": null }),
                &[("0", &["variables.file"])],
                vec![file("0", "exact.txt", b"0123456789")],
            ),
            &config,
        )
        .await
        .unwrap();

        let upload = request.variables.get_path("file").unwrap().as_upload().unwrap();
        assert_eq!(upload.wait().await.unwrap().file_size(), 10);
    }

    #[test(tokio::test)]
    async fn it_refuses_invalid_paths() {
        let config = FileUploadsConfig::builder()
            .path_conflict(crate::configuration::PathConflictPolicy::Strict)
            .build();
        let error = prepare(
            parts(
                json!({ "files": "not a list" }),
                &[("0", &["variables.files.0"])],
                vec![file("0", "note.txt", b"hello")],
            ),
            &config,
        )
        .await
        .unwrap_err();
        assert!(matches!(error, FileUploadError::InvalidVariablePath(_)));
        assert_eq!(error.status_code(), http::StatusCode::BAD_REQUEST);
    }
}

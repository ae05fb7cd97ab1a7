use std::time::Duration;

use bytes::Bytes;
use bytes::BytesMut;
use bytesize::ByteSize;
use futures::Stream;
use indexmap::IndexMap;
use multer::Field;
use multer::Multipart;

use super::Result as UploadResult;
use super::error::FileUploadError;
use super::map_field::MapFieldRaw;
use crate::configuration::MultipartRequestLimits;
use crate::json_ext::Object;
use crate::json_ext::Value;

static CONTENT_TRANSFER_ENCODING: http::HeaderName =
    http::HeaderName::from_static("content-transfer-encoding");

const DEFAULT_ENCODING: &str = "binary";

/// A file part of the request, fully buffered.
#[derive(Clone, Debug)]
pub(crate) struct RawFilePart {
    /// The multipart field name, referenced by the keys of the `map` field.
    pub(crate) name: String,
    pub(crate) file_name: String,
    pub(crate) declared_mime_type: String,
    pub(crate) encoding: String,
    /// Bytes received. Above the size limit the content is dropped and only the size is kept.
    pub(crate) size: u64,
    pub(crate) content: Bytes,
}

/// The `operations` field.
#[derive(Clone, Debug, Default)]
pub(crate) struct Operations {
    pub(crate) query: String,
    pub(crate) operation_name: Option<String>,
    pub(crate) variables: Object,
    pub(crate) extensions: Object,
}

#[derive(Debug)]
pub(crate) struct ExtractedParts {
    pub(crate) files: IndexMap<String, RawFilePart>,
    pub(crate) map: MapFieldRaw,
    pub(crate) operations: Operations,
}

/// Reads every part of a `multipart/form-data` body.
///
/// `operations` and `map` may come in any order. Reading stops at the first file over the
/// size limit: that file is returned with its observed size so that the request can be refused.
pub(crate) async fn extract<S, E>(
    body: S,
    boundary: String,
    limits: MultipartRequestLimits,
) -> UploadResult<ExtractedParts>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let max_file_size = limits.max_file_size.as_u64();
    let mut multipart = Multipart::new(body, boundary);
    let mut operations = None;
    let mut map = None;
    let mut files: IndexMap<String, RawFilePart> = IndexMap::new();

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(file_name) = field.file_name().map(str::to_owned) {
            if files.len() >= limits.max_files {
                return Err(FileUploadError::MaxFilesLimitExceeded(limits.max_files));
            }
            let declared_mime_type = field
                .content_type()
                .map(|mime| mime.to_string())
                .unwrap_or_default();
            let encoding = field
                .headers()
                .get(&CONTENT_TRANSFER_ENCODING)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
                .unwrap_or_else(|| DEFAULT_ENCODING.to_string());

            let (content, size) = within_deadline(
                &file_name,
                limits.read_timeout,
                read_file(&mut field, max_file_size),
            )
            .await?;
            tracing::debug!(field = %name, file_name = %file_name, size, "received file part");

            let oversized = size > max_file_size;
            if oversized && (operations.is_none() || map.is_none()) {
                return Err(FileUploadError::MaxFileSizeLimitExceeded {
                    limit: ByteSize::b(max_file_size),
                    filename: file_name,
                });
            }
            files.insert(
                name.clone(),
                RawFilePart {
                    name,
                    file_name,
                    declared_mime_type,
                    encoding,
                    size,
                    content,
                },
            );
            if oversized {
                break;
            }
            continue;
        }

        let content = within_deadline(
            &name,
            limits.read_timeout,
            read_field(&mut field, &name, max_file_size),
        )
        .await?;
        match name.as_str() {
            "operations" => {
                let object = parse_object(
                    "operations",
                    content,
                    FileUploadError::InvalidJsonInOperationsField,
                )?;
                operations = Some(parse_operations(object)?);
            }
            "map" => {
                let object =
                    parse_object("map", content, FileUploadError::InvalidJsonInMapField)?;
                map = Some(parse_map(object)?);
            }
            _ => {
                tracing::debug!(field = %name, "ignoring multipart field");
            }
        }
    }

    Ok(ExtractedParts {
        operations: operations.ok_or(FileUploadError::MissingOperationsField)?,
        map: map.ok_or(FileUploadError::MissingMapField)?,
        files,
    })
}

async fn within_deadline<T>(
    part: &str,
    timeout: Duration,
    read: impl Future<Output = UploadResult<T>>,
) -> UploadResult<T> {
    tokio::time::timeout(timeout, read)
        .await
        .map_err(|_| FileUploadError::ReadTimeout {
            filename: part.to_string(),
            timeout,
        })?
}

/// Buffers a text field. Text fields share the size limit of files.
async fn read_field(field: &mut Field<'_>, name: &str, limit: u64) -> UploadResult<Bytes> {
    let mut content = BytesMut::new();
    while let Some(chunk) = field.chunk().await? {
        if (content.len() + chunk.len()) as u64 > limit {
            return Err(multer::Error::FieldSizeExceeded {
                limit,
                field_name: Some(name.to_string()),
            }
            .into());
        }
        content.extend_from_slice(&chunk);
    }
    Ok(content.freeze())
}

/// Buffers a file. Past `max_file_size` the content is discarded and only counted up to the
/// first chunk over the limit.
async fn read_file(field: &mut Field<'_>, max_file_size: u64) -> UploadResult<(Bytes, u64)> {
    let mut content = BytesMut::new();
    let mut size = 0u64;
    while let Some(chunk) = field.chunk().await? {
        size += chunk.len() as u64;
        if size > max_file_size {
            return Ok((Bytes::new(), size));
        }
        content.extend_from_slice(&chunk);
    }
    Ok((content.freeze(), size))
}

fn parse_object(
    field: &'static str,
    bytes: Bytes,
    invalid_json: fn(serde_json::Error) -> FileUploadError,
) -> UploadResult<Object> {
    match Value::from_bytes(bytes).map_err(invalid_json)? {
        Value::Object(object) => Ok(object),
        _ => Err(FileUploadError::NotAnObject(field)),
    }
}

fn parse_operations(mut object: Object) -> UploadResult<Operations> {
    let query = match object.remove("query") {
        Some(Value::String(query)) => query.as_str().to_owned(),
        Some(_) => {
            return Err(FileUploadError::InvalidOperationsField(
                "'query' must be a string".to_string(),
            ));
        }
        None => {
            return Err(FileUploadError::InvalidOperationsField(
                "missing 'query'".to_string(),
            ));
        }
    };
    let operation_name = match object.remove("operationName") {
        None | Some(Value::Null) => None,
        Some(Value::String(name)) => Some(name.as_str().to_owned()),
        Some(_) => {
            return Err(FileUploadError::InvalidOperationsField(
                "'operationName' must be a string".to_string(),
            ));
        }
    };

    Ok(Operations {
        query,
        operation_name,
        variables: optional_object(&mut object, "variables")?,
        extensions: optional_object(&mut object, "extensions")?,
    })
}

fn optional_object(object: &mut Object, key: &str) -> UploadResult<Object> {
    match object.remove(key) {
        None | Some(Value::Null) => Ok(Object::new()),
        Some(Value::Object(value)) => Ok(value),
        Some(_) => Err(FileUploadError::InvalidOperationsField(format!(
            "'{key}' must be an object"
        ))),
    }
}

fn parse_map(object: Object) -> UploadResult<MapFieldRaw> {
    object
        .into_iter()
        .map(|(file, paths)| {
            let file = file.as_str().to_owned();
            let Value::Array(paths) = paths else {
                return Err(FileUploadError::InvalidMapEntry(file));
            };
            let paths = paths
                .into_iter()
                .map(|path| match path {
                    Value::String(path) => Some(path.as_str().to_owned()),
                    _ => None,
                })
                .collect::<Option<Vec<String>>>();
            match paths {
                Some(paths) => Ok((file, paths)),
                None => Err(FileUploadError::InvalidMapEntry(file)),
            }
        })
        .collect()
}

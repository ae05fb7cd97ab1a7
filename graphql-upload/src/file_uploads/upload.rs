use std::io;

use bytes::Bytes;
use displaydoc::Display;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;
use serde_json_bytes::json;
use thiserror::Error;

use crate::json_ext::Value;

const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Why a single uploaded file was refused.
///
/// A rejection only settles the placeholders of the offending file; the rest of the request
/// carries on and the engine decides how to report it.
#[derive(Debug, Clone, Error, Display, PartialEq, Eq)]
#[non_exhaustive]
pub enum UploadRejection {
    /// invalid file '{field}': {reason}
    InvalidFile {
        /// The multipart field name of the file.
        field: String,
        /// What is missing.
        reason: String,
    },

    /// file '{file_name}' has type '{mime_type}' which is not allowed
    DisallowedType {
        /// The client supplied file name.
        file_name: String,
        /// The MIME type resolved from the content.
        mime_type: String,
    },
}

/// An uploaded file whose type was checked against the allow-list.
///
/// The content is fully buffered; [`ResolvedFile::content`] and [`ResolvedFile::stream`]
/// may be called any number of times, each call producing an independent view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedFile {
    encoding: String,
    file_name: String,
    file_size: u64,
    mime_type: String,
    #[serde(skip)]
    content: Bytes,
}

#[buildstructor::buildstructor]
impl ResolvedFile {
    #[builder(visibility = "pub")]
    fn new(
        encoding: Option<String>,
        file_name: String,
        mime_type: String,
        content: Bytes,
    ) -> Self {
        Self {
            encoding: encoding.unwrap_or_else(|| "binary".to_string()),
            file_name,
            file_size: content.len() as u64,
            mime_type,
            content,
        }
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The whole content. Cloning [`Bytes`] does not copy the buffer.
    pub fn content(&self) -> Bytes {
        self.content.clone()
    }

    /// A fresh stream over the content, in chunks of at most 64KiB.
    pub fn stream(&self) -> BoxStream<'static, io::Result<Bytes>> {
        let content = self.content.clone();
        let chunks: Vec<io::Result<Bytes>> = (0..content.len())
            .step_by(STREAM_CHUNK_SIZE)
            .map(|start| {
                let end = (start + STREAM_CHUNK_SIZE).min(content.len());
                Ok(content.slice(start..end))
            })
            .collect();
        futures::stream::iter(chunks).boxed()
    }

    /// The metadata of the file, as exposed to GraphQL resolvers.
    pub fn to_json(&self) -> Value {
        json!({
            "encoding": self.encoding.as_str(),
            "fileName": self.file_name.as_str(),
            "fileSize": self.file_size,
            "mimeType": self.mime_type.as_str(),
        })
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;
    use pretty_assertions::assert_eq;

    use super::*;

    fn file(content: Bytes) -> ResolvedFile {
        ResolvedFile::builder()
            .file_name("data.bin")
            .mime_type("application/octet-stream")
            .content(content)
            .build()
    }

    #[tokio::test]
    async fn it_replays_the_content() {
        let content = Bytes::from(vec![7u8; STREAM_CHUNK_SIZE * 2 + 3]);
        let file = file(content.clone());

        for _ in 0..2 {
            let chunks: Vec<Bytes> = file.stream().try_collect().await.unwrap();
            assert_eq!(chunks.len(), 3);
            assert_eq!(chunks.concat(), content.to_vec());
        }
        assert_eq!(file.content(), content);
    }

    #[tokio::test]
    async fn it_streams_nothing_for_empty_files() {
        let chunks: Vec<Bytes> = file(Bytes::new()).stream().try_collect().await.unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn it_exposes_metadata() {
        let file = file(Bytes::from_static(b"0123456789"));
        assert_eq!(
            file.to_json(),
            json!({
                "encoding": "binary",
                "fileName": "data.bin",
                "fileSize": 10,
                "mimeType": "application/octet-stream"
            })
        );
        assert_eq!(
            serde_json_bytes::to_value(&file).unwrap(),
            file.to_json()
        );
    }

    #[test]
    fn it_describes_rejections() {
        let rejection = UploadRejection::DisallowedType {
            file_name: "a.exe".to_string(),
            mime_type: "application/x-msdownload".to_string(),
        };
        assert_eq!(
            rejection.to_string(),
            "file 'a.exe' has type 'application/x-msdownload' which is not allowed"
        );
    }
}

//! Configuration for multipart file uploads.

use std::time::Duration;

use bytesize::ByteSize;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

fn default_read_timeout() -> Duration {
    DEFAULT_READ_TIMEOUT
}

/// Errors raised while loading the upload configuration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The YAML document could not be deserialized.
    #[error("could not parse file uploads configuration: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),
}

/// What to do when a `map` path runs into a value of the wrong shape.
///
/// `variables.files.0` expects `files` to be a list; if the operation already carries an
/// object (or a scalar) there, the value is either replaced or the request is refused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PathConflictPolicy {
    /// Replace the mismatched value with an empty container of the expected kind.
    #[default]
    Overwrite,
    /// Refuse the request.
    Strict,
}

/// MIME types accepted after content sniffing.
///
/// Entries are compared on their essence (`type/subtype`), ignoring case and parameters.
/// `type/*` accepts every subtype. An empty list accepts everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct AllowedTypes(Vec<String>);

impl AllowedTypes {
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(types.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if the given MIME type may be uploaded.
    pub fn allows(&self, mime_type: &str) -> bool {
        if self.0.is_empty() {
            return true;
        }
        let wanted = essence(mime_type);
        self.0.iter().any(|allowed| {
            let allowed = essence(allowed);
            match allowed.strip_suffix("/*") {
                Some(top_level) => wanted
                    .split_once('/')
                    .is_some_and(|(ty, _)| ty == top_level),
                None => allowed == wanted,
            }
        })
    }
}

fn essence(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Limits applied to a single multipart request.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct MultipartRequestLimits {
    /// The maximum number of files in a single request
    pub max_files: usize,

    /// The maximum size of a single file, and of the `operations` and `map` fields. A larger
    /// part aborts the whole request.
    #[schemars(with = "String")]
    pub max_file_size: ByteSize,

    /// How long reading one part may take; defaults to 30s
    #[serde(
        deserialize_with = "humantime_serde::deserialize",
        serialize_with = "humantime_serde::serialize",
        default = "default_read_timeout"
    )]
    #[schemars(with = "String", default = "default_read_timeout")]
    pub read_timeout: Duration,
}

impl Default for MultipartRequestLimits {
    fn default() -> Self {
        Self {
            max_files: 5,
            max_file_size: ByteSize::b(5_242_820), // 5mb
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

#[buildstructor::buildstructor]
impl MultipartRequestLimits {
    #[builder(visibility = "pub")]
    fn new(
        max_files: Option<usize>,
        max_file_size: Option<ByteSize>,
        read_timeout: Option<Duration>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            max_files: max_files.unwrap_or(defaults.max_files),
            max_file_size: max_file_size.unwrap_or(defaults.max_file_size),
            read_timeout: read_timeout.unwrap_or(defaults.read_timeout),
        }
    }
}

/// Configuration for File Uploads
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct FileUploadsConfig {
    /// Whether multipart requests are handled; other requests are never affected
    pub enabled: bool,

    /// MIME types that uploaded files may have; empty accepts every type
    pub allowed_types: AllowedTypes,

    /// Behaviour when a `map` path conflicts with the shape of the operation variables
    pub path_conflict: PathConflictPolicy,

    /// Request limits
    pub limits: MultipartRequestLimits,
}

impl Default for FileUploadsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_types: AllowedTypes::default(),
            path_conflict: PathConflictPolicy::default(),
            limits: MultipartRequestLimits::default(),
        }
    }
}

#[buildstructor::buildstructor]
impl FileUploadsConfig {
    #[builder(visibility = "pub")]
    fn new(
        enabled: Option<bool>,
        allowed_types: Vec<String>,
        path_conflict: Option<PathConflictPolicy>,
        limits: Option<MultipartRequestLimits>,
    ) -> Self {
        Self {
            enabled: enabled.unwrap_or(true),
            allowed_types: AllowedTypes(allowed_types),
            path_conflict: path_conflict.unwrap_or_default(),
            limits: limits.unwrap_or_default(),
        }
    }

    /// Parses the configuration from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigurationError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// The JSON schema of the configuration, for editor tooling.
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(FileUploadsConfig)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn it_builds_default_configuration() {
        let config = FileUploadsConfig::builder().build();
        assert_eq!(config, FileUploadsConfig::default());
        assert!(config.enabled);
        assert!(config.allowed_types.is_empty());
        assert_eq!(config.path_conflict, PathConflictPolicy::Overwrite);
        assert_eq!(config.limits.max_files, 5);
        assert_eq!(config.limits.max_file_size, ByteSize::b(5_242_820));
        assert_eq!(config.limits.read_timeout, Duration::from_secs(30));
    }

    #[test]
    fn it_json_parses_defaults_when_omitted() {
        let config: FileUploadsConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config, FileUploadsConfig::default());

        let config: FileUploadsConfig =
            serde_json::from_value(json!({ "limits": { "max_files": 2 } })).unwrap();
        assert_eq!(config.limits.max_files, 2);
        assert_eq!(config.limits.read_timeout, Duration::from_secs(30));
    }

    #[test]
    fn it_parses_yaml_with_human_readable_limits() {
        let config = FileUploadsConfig::from_yaml(
            r#"
enabled: true
allowed_types:
  - image/png
  - text/plain
path_conflict: strict
limits:
  max_files: 10
  max_file_size: 10mb
  read_timeout: 1m
"#,
        )
        .unwrap();

        assert_eq!(
            config.allowed_types,
            AllowedTypes::new(["image/png", "text/plain"])
        );
        assert_eq!(config.path_conflict, PathConflictPolicy::Strict);
        assert_eq!(config.limits.max_files, 10);
        assert_eq!(config.limits.max_file_size, ByteSize::mb(10));
        assert_eq!(config.limits.read_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_deny_unknown_fields() {
        let result = FileUploadsConfig::from_yaml("limits:\n  max_bytes: 10\n");
        assert!(result.unwrap_err().to_string().contains("unknown field"));
    }

    #[test]
    fn it_matches_allowed_types_on_essence() {
        let allowed = AllowedTypes::new(["text/plain", "image/*"]);
        assert!(allowed.allows("text/plain"));
        assert!(allowed.allows("Text/Plain; charset=utf-8"));
        assert!(allowed.allows("image/png"));
        assert!(allowed.allows("image/jpeg"));
        assert!(!allowed.allows("application/pdf"));
        assert!(!allowed.allows("imagefoo"));
    }

    #[test]
    fn it_allows_everything_with_an_empty_list() {
        assert!(AllowedTypes::default().allows("application/x-msdownload"));
    }

    #[test]
    fn it_builds_limits_with_overrides() {
        let limits = MultipartRequestLimits::builder()
            .max_file_size(ByteSize::kb(1))
            .build();
        assert_eq!(limits.max_file_size, ByteSize::kb(1));
        assert_eq!(limits.max_files, 5);
    }

    #[test]
    fn it_produces_a_json_schema() {
        let schema = serde_json::to_value(FileUploadsConfig::json_schema()).unwrap();
        assert!(schema["properties"]["limits"].is_object());
    }
}

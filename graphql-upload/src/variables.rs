//! The variables of an operation, with room for files that are still being checked.

use std::ops::Deref;
use std::ops::DerefMut;

use indexmap::IndexMap;
use serde::Serialize;
use serde::Serializer;

use crate::file_uploads::PendingUpload;
use crate::file_uploads::UploadState;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// A node of the variables document.
///
/// Mirrors JSON, plus an [`VariableValue::Upload`] variant holding the placeholder of a file.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum VariableValue {
    #[default]
    Null,
    /// A boolean, number or string.
    Scalar(Value),
    Array(Vec<VariableValue>),
    Object(IndexMap<String, VariableValue>),
    Upload(PendingUpload),
}

impl VariableValue {
    pub fn is_null(&self) -> bool {
        matches!(self, VariableValue::Null)
    }

    pub fn as_upload(&self) -> Option<&PendingUpload> {
        match self {
            VariableValue::Upload(upload) => Some(upload),
            _ => None,
        }
    }

    /// Converts to JSON.
    ///
    /// Accepted files become their metadata; pending or rejected files become `null`.
    pub fn to_json(&self) -> Value {
        match self {
            VariableValue::Null => Value::Null,
            VariableValue::Scalar(value) => value.clone(),
            VariableValue::Array(list) => Value::Array(list.iter().map(Self::to_json).collect()),
            VariableValue::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.as_str().into(), value.to_json()))
                    .collect(),
            ),
            VariableValue::Upload(upload) => match upload.state() {
                UploadState::Resolved(file) => file.to_json(),
                UploadState::Pending | UploadState::Rejected(_) => Value::Null,
            },
        }
    }

    fn collect_uploads<'a>(&'a self, uploads: &mut Vec<&'a PendingUpload>) {
        match self {
            VariableValue::Upload(upload) => uploads.push(upload),
            VariableValue::Array(list) => {
                list.iter().for_each(|value| value.collect_uploads(uploads))
            }
            VariableValue::Object(map) => map
                .values()
                .for_each(|value| value.collect_uploads(uploads)),
            VariableValue::Null | VariableValue::Scalar(_) => {}
        }
    }
}

impl From<Value> for VariableValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => VariableValue::Null,
            Value::Array(list) => VariableValue::Array(list.into_iter().map(Into::into).collect()),
            Value::Object(map) => VariableValue::Object(
                map.into_iter()
                    .map(|(key, value)| (key.as_str().to_owned(), value.into()))
                    .collect(),
            ),
            scalar => VariableValue::Scalar(scalar),
        }
    }
}

impl From<PendingUpload> for VariableValue {
    fn from(upload: PendingUpload) -> Self {
        VariableValue::Upload(upload)
    }
}

impl Serialize for VariableValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// The `variables` of an operation: a JSON object whose values may hold uploads.
#[derive(Clone, Debug, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Variables(IndexMap<String, VariableValue>);

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the document from the JSON variables of an operation.
    pub fn from_json(object: Object) -> Self {
        Self(
            object
                .into_iter()
                .map(|(key, value)| (key.as_str().to_owned(), value.into()))
                .collect(),
        )
    }

    pub fn to_json(&self) -> Object {
        self.0
            .iter()
            .map(|(key, value)| (key.as_str().into(), value.to_json()))
            .collect()
    }

    /// Looks up a value by its dot separated path, such as `files.0`.
    pub fn get_path(&self, path: &str) -> Option<&VariableValue> {
        let mut segments = path.split('.');
        let root = self.0.get(segments.next()?)?;
        segments.try_fold(root, |parent, segment| match parent {
            VariableValue::Object(map) => map.get(segment),
            VariableValue::Array(list) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| list.get(index)),
            _ => None,
        })
    }

    /// Every upload placeholder in the document, in document order.
    pub fn uploads(&self) -> Vec<&PendingUpload> {
        let mut uploads = Vec::new();
        self.0
            .values()
            .for_each(|value| value.collect_uploads(&mut uploads));
        uploads
    }
}

impl Deref for Variables {
    type Target = IndexMap<String, VariableValue>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Variables {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

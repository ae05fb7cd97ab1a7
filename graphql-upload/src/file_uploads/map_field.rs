use indexmap::IndexMap;

use super::Result as UploadResult;
use super::error::FileUploadError;
use crate::json_ext::is_index_segment;

pub(crate) type MapFieldRaw = IndexMap<String, Vec<String>>;

/// The `map` field, with each path relative to the operation variables.
///
/// `variables.input.files.0` is kept as `input.files.0`. Files keep the order of the `map` field.
#[derive(Debug, Default)]
pub(crate) struct MapField {
    pub(crate) per_file: IndexMap<String, Vec<String>>,
}

impl MapField {
    pub(crate) fn new(map_field: MapFieldRaw) -> UploadResult<Self> {
        let mut per_file = IndexMap::new();
        for (filename, paths) in map_field.into_iter() {
            let mut variable_paths = Vec::with_capacity(paths.len());
            for path in paths.into_iter() {
                let mut segments = path.splitn(2, '.');
                let first_segment = segments.next();
                if first_segment != Some("variables") {
                    if first_segment.is_some_and(is_index_segment) {
                        return Err(FileUploadError::BatchRequestAreNotSupported);
                    }
                    return Err(FileUploadError::InvalidPathInsideMapField(path));
                }
                let variable_path = match segments.next() {
                    Some(rest) if !rest.is_empty() && !rest.starts_with('.') => rest.to_owned(),
                    _ => return Err(FileUploadError::MissingVariableNameInsideMapField(path)),
                };
                variable_paths.push(variable_path);
            }
            per_file.insert(filename, variable_paths);
        }

        Ok(Self { per_file })
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.per_file.iter()
    }

    pub(crate) fn contains_file(&self, name: &str) -> bool {
        self.per_file.contains_key(name)
    }
}

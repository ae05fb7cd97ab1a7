//! Writes values into the variables document at `map` paths.

use indexmap::IndexMap;
use thiserror::Error;

use crate::configuration::PathConflictPolicy;
use crate::json_ext::is_index_segment;
use crate::variables::VariableValue;
use crate::variables::Variables;

// Bounds the padding a single path can cause in a list.
const MAX_LIST_INDEX: usize = u16::MAX as usize;

/// A `map` path that cannot be applied to the operation variables.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraftError {
    #[error("Invalid path '{0}', it contains an empty segment.")]
    EmptySegment(String),

    #[error("Invalid path '{path}', '{segment}' does not match the shape of the operation variables.")]
    Conflict { path: String, segment: String },

    #[error("Invalid path '{path}', index {index} is too large.")]
    IndexTooLarge { path: String, index: usize },
}

/// Sets `value` at the dot separated `path` of `variables`.
///
/// Missing intermediate values are created: a list when the following segment is a number,
/// an object otherwise. A value of the wrong kind on the way is replaced, unless the policy is
/// [`PathConflictPolicy::Strict`]. Whatever sits at the final segment is overwritten.
pub(crate) fn graft(
    variables: &mut Variables,
    path: &str,
    value: VariableValue,
    policy: PathConflictPolicy,
) -> Result<(), GraftError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(GraftError::EmptySegment(path.to_string()));
    }
    let Some((first, rest)) = segments.split_first() else {
        return Err(GraftError::EmptySegment(path.to_string()));
    };

    let mut slot = variables
        .entry((*first).to_string())
        .or_insert(VariableValue::Null);
    for segment in rest {
        slot = descend(slot, segment, path, policy)?;
    }
    *slot = value;
    Ok(())
}

fn descend<'a>(
    slot: &'a mut VariableValue,
    segment: &str,
    path: &str,
    policy: PathConflictPolicy,
) -> Result<&'a mut VariableValue, GraftError> {
    let index = if is_index_segment(segment) {
        let index = segment.parse::<usize>().unwrap_or(usize::MAX);
        if index > MAX_LIST_INDEX {
            return Err(GraftError::IndexTooLarge {
                path: path.to_string(),
                index,
            });
        }
        Some(index)
    } else {
        None
    };

    let fits = matches!(
        (&*slot, index),
        (VariableValue::Object(_), None) | (VariableValue::Array(_), Some(_))
    );
    if !fits {
        if policy == PathConflictPolicy::Strict && !slot.is_null() {
            return Err(GraftError::Conflict {
                path: path.to_string(),
                segment: segment.to_string(),
            });
        }
        if !slot.is_null() {
            tracing::debug!(path, segment, "replacing a value of the wrong kind");
        }
        *slot = match index {
            Some(_) => VariableValue::Array(Vec::new()),
            None => VariableValue::Object(IndexMap::new()),
        };
    }

    match (slot, index) {
        (VariableValue::Object(map), None) => {
            Ok(map.entry(segment.to_string()).or_insert(VariableValue::Null))
        }
        (VariableValue::Array(list), Some(index)) => {
            if list.len() <= index {
                list.resize_with(index + 1, VariableValue::default);
            }
            Ok(&mut list[index])
        }
        _ => Err(GraftError::Conflict {
            path: path.to_string(),
            segment: segment.to_string(),
        }),
    }
}

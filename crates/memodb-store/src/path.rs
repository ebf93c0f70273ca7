//! Path splitting and key validation.
//!
//! A path is a `/`-delimited list of segments. One leading `/` is optional,
//! so `users/alice` and `/users/alice` name the same node. The empty path and
//! a bare `/` both name the root. Empty segments (`a//b`, `a/`) are rejected.

use crate::error::{StoreError, StoreResult};
use crate::limits::StoreLimits;

/// Splits `path` into validated segments, root first.
///
/// Returns an empty list for the root.
pub fn segments<'a>(path: &'a str, limits: &StoreLimits) -> StoreResult<Vec<&'a str>> {
    let relative = path.strip_prefix('/').unwrap_or(path);
    if relative.is_empty() {
        return Ok(Vec::new());
    }

    relative
        .split('/')
        .map(|segment| validate_segment(path, segment, limits))
        .collect()
}

fn validate_segment<'a>(
    path: &str,
    segment: &'a str,
    limits: &StoreLimits,
) -> StoreResult<&'a str> {
    if segment.is_empty() {
        return Err(StoreError::InvalidPath {
            path: path.to_string(),
            reason: "empty path segment".to_string(),
        });
    }
    if segment.len() > limits.max_segment_len {
        return Err(StoreError::InvalidPath {
            path: path.to_string(),
            reason: format!(
                "segment of {} bytes exceeds the {}-byte limit",
                segment.len(),
                limits.max_segment_len
            ),
        });
    }
    Ok(segment)
}

/// Checks that `key` is non-empty, within limits and free of `/`.
pub fn validate_key(key: &str, limits: &StoreLimits) -> StoreResult<()> {
    let reason = if key.is_empty() {
        "key is empty".to_string()
    } else if key.contains('/') {
        "key contains '/'".to_string()
    } else if key.len() > limits.max_key_len {
        format!(
            "key of {} bytes exceeds the {}-byte limit",
            key.len(),
            limits.max_key_len
        )
    } else {
        return Ok(());
    };

    Err(StoreError::InvalidKey {
        key: key.to_string(),
        reason,
    })
}

/// Joins segments into the canonical `/a/b` form.
pub fn join<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for segment in segments {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

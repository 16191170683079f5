use crate::errors::DashError;
use std::fs;
use std::path::{Path, PathBuf};

fn io_error(err: std::io::Error) -> DashError {
    DashError::Io(err.to_string())
}

/// `run.jsonl` rotates into `run.1.jsonl`, `run.2.jsonl`, ...
fn segment_parts(active: &Path) -> Option<(&str, &str)> {
    let stem = active.file_stem()?.to_str()?;
    let extension = active.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    Some((stem, extension))
}

fn segment_number(active: &Path, candidate: &Path) -> Option<u64> {
    let (stem, extension) = segment_parts(active)?;
    let name = candidate.file_name()?.to_str()?;
    let rest = name.strip_prefix(stem)?.strip_prefix('.')?;
    let number = if extension.is_empty() {
        rest
    } else {
        rest.strip_suffix(extension)?.strip_suffix('.')?
    };
    number.parse().ok()
}

/// Rotated segments of `active` with their sizes, oldest first.
pub fn rotated_segments(active: &Path) -> Result<Vec<(u64, PathBuf, u64)>, DashError> {
    let Some(dir) = active.parent() else {
        return Ok(Vec::new());
    };
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut segments = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if let Some(number) = segment_number(active, &path) {
            let len = fs::metadata(&path).map_err(io_error)?.len();
            segments.push((number, path, len));
        }
    }
    segments.sort_by_key(|(number, _, _)| *number);
    Ok(segments)
}

/// Moves `active` aside once it grows past `max_bytes`.
pub fn rotate_if_oversized(active: &Path, max_bytes: u64) -> Result<Option<PathBuf>, DashError> {
    let len = match fs::metadata(active) {
        Ok(meta) => meta.len(),
        Err(_) => return Ok(None),
    };
    if len <= max_bytes {
        return Ok(None);
    }
    let Some((stem, extension)) = segment_parts(active) else {
        return Ok(None);
    };
    let next = rotated_segments(active)?
        .last()
        .map(|(number, _, _)| number + 1)
        .unwrap_or(1);
    let name = if extension.is_empty() {
        format!("{stem}.{next}")
    } else {
        format!("{stem}.{next}.{extension}")
    };
    let target = active.with_file_name(name);
    fs::rename(active, &target).map_err(io_error)?;
    Ok(Some(target))
}

/// Deletes the oldest segments until `active` plus its segments fit in
/// `budget_bytes`. The active file itself is never removed.
pub fn prune_segments(active: &Path, budget_bytes: u64) -> Result<Vec<PathBuf>, DashError> {
    let segments = rotated_segments(active)?;
    let active_len = fs::metadata(active).map(|meta| meta.len()).unwrap_or(0);
    let mut total = active_len + segments.iter().map(|(_, _, len)| len).sum::<u64>();

    let mut deleted = Vec::new();
    for (_, path, len) in segments {
        if total <= budget_bytes {
            break;
        }
        fs::remove_file(&path).map_err(io_error)?;
        total = total.saturating_sub(len);
        deleted.push(path);
    }
    Ok(deleted)
}

//! Shared utility functions for the specflow crate.

use std::cmp::Ordering;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Width of a canonical phase number ("0010").
pub const PHASE_NUMBER_WIDTH: usize = 4;

/// Zero-pad a numeric phase identifier to the canonical width.
///
/// Legacy documents used short prefixes ("010", "10"); those are padded so
/// they compare equal to the current form. Non-numeric input is returned
/// trimmed but otherwise unchanged.
pub fn normalize_phase_number(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return trimmed.to_string();
    }
    if trimmed.len() >= PHASE_NUMBER_WIDTH {
        trimmed.to_string()
    } else {
        format!("{:0>width$}", trimmed, width = PHASE_NUMBER_WIDTH)
    }
}

/// Compare two dotted schema versions ("3.0", "v2.1") numerically.
///
/// Missing components count as zero. `None` when either side has a
/// non-numeric component.
pub fn compare_versions(a: &str, b: &str) -> Option<Ordering> {
    fn parts(v: &str) -> Option<Vec<u64>> {
        v.trim()
            .trim_start_matches(['v', 'V'])
            .split('.')
            .map(|p| p.parse().ok())
            .collect()
    }
    let (a, b) = (parts(a)?, parts(b)?);
    let len = a.len().max(b.len());
    let at = |v: &[u64], i: usize| v.get(i).copied().unwrap_or(0);
    Some(
        (0..len)
            .map(|i| at(&a, i).cmp(&at(&b, i)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal),
    )
}

/// Whether `version` is a schema generation newer than `current`.
pub fn is_newer_version(version: &str, current: &str) -> bool {
    compare_versions(version, current) == Some(Ordering::Greater)
}

/// Turn a phase name into a branch/directory friendly slug.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Leading digits of a `NNNN-name` style directory or branch name.
pub fn numeric_prefix(name: &str) -> Option<&str> {
    let end = name
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(name.len());
    if end == 0 {
        return None;
    }
    match name[end..].chars().next() {
        None | Some('-') | Some('_') => Some(&name[..end]),
        _ => None,
    }
}

/// Replace `path` with `content` so readers never observe a partial file.
///
/// Writes to a sibling temporary file, syncs it, then renames it over the
/// destination. If the rename fails the temporary file is removed before
/// the error is returned.
pub fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "specflow".to_string());
    let temp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));

    {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    Ok(())
}

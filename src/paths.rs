//! Vault-relative path handling.
//!
//! Note identities are `/`-separated strings relative to the vault root, in Unicode NFC form,
//! with no `.` or `..` components. Every path that enters the crate from the outside passes
//! through [normalize] before it touches the filesystem.
use std::{
    borrow::Cow,
    path::{Component, Path, PathBuf, MAIN_SEPARATOR_STR},
};

use unicode_normalization::UnicodeNormalization;

use crate::error::VaultError;

/// Turn a vault-relative path string into its canonical note identity.
///
/// Rejects NUL bytes, absolute paths and any `..` that would climb above the vault root with
/// [VaultError::SecurityViolation]. Backslashes are folded into `/`, empty and `.` segments
/// are dropped. The empty string (the vault root) is a valid result.
pub fn normalize(rel: &str) -> Result<String, VaultError> {
    if rel.contains('\0') {
        return Err(VaultError::SecurityViolation(format!(
            "path contains a NUL byte: {rel:?}"
        )));
    }
    let folded = rel.replace('\\', "/");
    if folded.starts_with('/') || is_drive_prefixed(&folded) {
        return Err(VaultError::SecurityViolation(format!(
            "absolute paths are not allowed: {rel}"
        )));
    }
    let mut segments: Vec<&str> = Vec::new();
    for segment in folded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(VaultError::SecurityViolation(format!(
                        "path escapes the vault root: {rel}"
                    )));
                }
            }
            other => segments.push(other),
        }
    }
    Ok(segments.join("/").nfc().collect::<String>())
}

/// The NFD spelling of a note identity, for file names stored decomposed on disk.
pub fn decomposed(path: &str) -> String {
    path.nfd().collect()
}

fn is_drive_prefixed(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// File name component of a note identity.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Display name of a note: the file name without its final extension.
pub fn stem(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

/// Final extension of a note identity, without the dot.
pub fn extension(path: &str) -> Option<&str> {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(&name[idx + 1..]),
    }
}

/// Containing folder of a note identity; `""` for notes at the vault root.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

pub fn join(folder: &str, rel: &str) -> String {
    if folder.is_empty() {
        rel.to_string()
    } else if rel.is_empty() {
        folder.to_string()
    } else {
        format!("{folder}/{rel}")
    }
}

/// True when the final extension of `path` is one of `extensions` (ASCII case-insensitive).
pub fn has_extension(path: &str, extensions: &[String]) -> bool {
    extension(path)
        .map(|ext| extensions.iter().any(|known| known.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Strip the final extension when it is one of `extensions`.
pub fn strip_extension<'a>(path: &'a str, extensions: &[String]) -> &'a str {
    match extension(path) {
        Some(ext) if extensions.iter().any(|known| known.eq_ignore_ascii_case(ext)) => {
            &path[..path.len() - ext.len() - 1]
        }
        _ => path,
    }
}

pub fn os_path_to_string<P: AsRef<Path>>(os_path_ref: P) -> String {
    let res = os_path_ref
        .as_ref()
        .components()
        .filter_map(|c| match c {
            Component::RootDir | Component::CurDir => None,
            Component::Prefix(_) => None,
            _ => Some(c.as_os_str().to_string_lossy()),
        })
        .collect::<Vec<Cow<'_, str>>>()
        .join("/");
    tracing::trace!(
        "os_path_to_string: turned {:?} into {}",
        os_path_ref.as_ref(),
        res
    );
    res
}

pub fn string_to_os_path(path_string: &str) -> PathBuf {
    let res = PathBuf::from(path_string.replace('/', MAIN_SEPARATOR_STR));
    tracing::trace!("string_to_os_path: turned '{}' into {:?}", path_string, res);
    res
}

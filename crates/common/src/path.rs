// Lexical path rules for the workspace sandbox: traversal resolution,
// escape detection, protected version-control names.

use thiserror::Error;

/// Reserved directory name for version-control metadata.
pub const VCS_DIR: &str = ".git";
/// Placeholder file keeping otherwise-empty directories tracked.
pub const KEEP_FILE: &str = ".gitkeep";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path must be relative")]
    Absolute,

    #[error("path escapes workspace boundaries")]
    Escapes,

    #[error("path contains null byte")]
    NullByte,
}

/// Lexically clean a workspace-relative path.
///
/// `.` segments and empty segments are dropped, `..` pops the previous
/// segment. Backslashes are treated as separators so Windows-style input
/// cannot smuggle a traversal through. Returns the cleaned relative path
/// with `/` separators; an empty string denotes the workspace root itself.
///
/// Fails when the input is absolute or when `..` would climb above the
/// workspace root.
pub fn clean_relative(input: &str) -> Result<String, PathError> {
    if input.contains('\0') {
        return Err(PathError::NullByte);
    }

    let unified = input.replace('\\', "/");
    if unified.starts_with('/') || has_windows_drive_prefix(&unified) {
        return Err(PathError::Absolute);
    }

    let mut segments: Vec<&str> = Vec::new();
    for seg in unified.split('/') {
        match seg {
            "" | "." => continue,
            ".." => {
                if segments.pop().is_none() {
                    return Err(PathError::Escapes);
                }
            }
            other => segments.push(other),
        }
    }

    Ok(segments.join("/"))
}

fn has_windows_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// True if `name` is reserved for version-control internals.
pub fn is_protected_name(name: &str) -> bool {
    name == VCS_DIR || name == KEEP_FILE
}

/// True if any segment of the (uncleaned) relative path is a protected name.
pub fn is_protected_path(rel: &str) -> bool {
    rel.replace('\\', "/")
        .split('/')
        .filter(|seg| !seg.is_empty())
        .any(is_protected_name)
}

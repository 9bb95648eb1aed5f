//! User-data resolution for new servers.
//!
//! User data can be given inline or loaded from a file; the two sources are
//! mutually exclusive. The blob is opaque bytes here (a gzip-compressed
//! cloud-config is as valid as a shell script) and is only checked for being
//! non-blank.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

use crate::transport::expand_tilde;

/// Errors raised while resolving user data.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum UserDataError {
    /// Raised when both inline and file sources are provided.
    #[error("user data cannot be provided both inline and via file")]
    BothProvided,
    /// Raised when an inline payload is empty or only whitespace.
    #[error("user data must not be empty")]
    InlineEmpty,
    /// Raised when a file path is empty or only whitespace.
    #[error("user data file path must not be empty")]
    FilePathEmpty,
    /// Raised when a file resolves to empty or only whitespace.
    #[error("user data file `{path}` is empty")]
    FileEmpty {
        /// Expanded path of the empty file.
        path: String,
    },
    /// Raised when reading the file source fails.
    #[error("failed to read user data file `{path}`: {message}")]
    FileRead {
        /// Expanded path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

/// Resolves user data from either an inline value or a file.
///
/// The returned payload preserves the original bytes; a payload made only
/// of ASCII whitespace counts as blank.
///
/// # Errors
///
/// Returns [`UserDataError`] when both sources are given, a source is blank,
/// or the file cannot be read.
pub fn resolve_user_data(
    inline: Option<&str>,
    file: Option<&str>,
) -> Result<Option<Vec<u8>>, UserDataError> {
    match (inline, file) {
        (Some(_), Some(_)) => Err(UserDataError::BothProvided),
        (Some(payload), None) => {
            if payload.trim().is_empty() {
                return Err(UserDataError::InlineEmpty);
            }
            Ok(Some(payload.as_bytes().to_vec()))
        }
        (None, Some(path)) => read_user_data_file(path).map(Some),
        (None, None) => Ok(None),
    }
}

fn read_user_data_file(path: &str) -> Result<Vec<u8>, UserDataError> {
    if path.trim().is_empty() {
        return Err(UserDataError::FilePathEmpty);
    }
    let expanded = expand_tilde(path);
    let content = read_ambient(&expanded).map_err(|message| UserDataError::FileRead {
        path: expanded.clone(),
        message,
    })?;
    if content.iter().all(u8::is_ascii_whitespace) {
        return Err(UserDataError::FileEmpty { path: expanded });
    }
    Ok(content)
}

fn read_ambient(path: &str) -> Result<Vec<u8>, String> {
    let target = Utf8Path::new(path);
    let (dir_path, file_path) = if target.is_absolute() {
        let parent = target
            .parent()
            .ok_or_else(|| format!("path has no parent directory: {target}"))?;
        let file_name = target
            .file_name()
            .ok_or_else(|| format!("path has no file name: {target}"))?;
        (parent, Utf8Path::new(file_name))
    } else {
        (Utf8Path::new("."), target)
    };

    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read(file_path).map_err(|err| err.to_string())
}

//! Character dictionary loading.

use crate::core::OcrError;
use std::path::Path;

/// Reads a recognizer dictionary: UTF-8 text, one symbol per line, no header.
///
/// Lines are returned verbatim (empty lines included); the CTC decoder adds
/// the blank and trailing-space entries itself.
///
/// # Errors
///
/// Returns [`OcrError::InvalidInput`] when the file cannot be read.
pub fn read_character_dict(path: &Path) -> Result<Vec<String>, OcrError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        OcrError::invalid_input(format!(
            "failed to read character dictionary from '{}': {e}",
            path.display()
        ))
    })?;
    Ok(content.lines().map(str::to_string).collect())
}

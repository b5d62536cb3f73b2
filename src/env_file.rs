//! Loader for `KEY VALUE` environment files

use std::io;
use std::path::Path;

use tracing::debug;

use crate::Result;

/// Parse environment file content into key/value pairs
///
/// Each line must hold exactly two fields separated by a single space.
/// Anything else is skipped.
#[must_use]
pub fn parse(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim_end_matches('\r');
            let mut fields = line.split(' ');
            match (fields.next(), fields.next(), fields.next()) {
                (Some(key), Some(value), None) if !key.is_empty() => {
                    Some((key.to_string(), value.to_string()))
                }
                _ => None,
            }
        })
        .collect()
}

/// Load an environment file into the process environment
///
/// A missing file is not an error: tests without a `.env` simply run with
/// the environment they were given. Returns the number of variables set.
///
/// # Errors
///
/// Returns error if the file exists but cannot be read
pub fn load(path: &Path) -> Result<usize> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No environment file at {}", path.display());
            return Ok(0);
        }
        Err(e) => return Err(e.into()),
    };

    let pairs = parse(&content);
    for (key, value) in &pairs {
        std::env::set_var(key, value);
    }

    debug!("Loaded {} variables from {}", pairs.len(), path.display());
    Ok(pairs.len())
}

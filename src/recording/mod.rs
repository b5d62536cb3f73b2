//! Recording session lifecycle against the test proxy

mod session;

pub use session::{Session, SessionState, Variables};

use std::path::Path;

use crate::{Result, ShimError};

/// Directory, under the recording path, that holds recording files
pub const RECORDINGS_DIR: &str = "recordings";

/// Extension of recording files
pub const RECORDING_EXTENSION: &str = "json";

/// Compute the recording file path for a test
///
/// `{recording_path}/recordings/{test_name}.json`, always with forward
/// slashes since the path is interpreted by the proxy, not by this process.
///
/// # Errors
///
/// Returns error if the test name is invalid
pub fn recording_file_path(recording_path: &Path, test_name: &str) -> Result<String> {
    validate_test_name(test_name)?;

    let root = recording_path.to_string_lossy().replace('\\', "/");
    let root = root.trim_end_matches('/');

    let file = format!("{RECORDINGS_DIR}/{test_name}.{RECORDING_EXTENSION}");
    if root.is_empty() {
        if recording_path.has_root() {
            return Ok(format!("/{file}"));
        }
        return Ok(file);
    }

    Ok(format!("{root}/{file}"))
}

/// Name of the test running on the current thread
///
/// The test harness names each test thread after the test's path; `::`
/// separators become `.` so every test maps to one flat file name. Returns
/// `None` outside a named test thread.
#[must_use]
pub fn current_test_name() -> Option<String> {
    let thread = std::thread::current();
    let name = thread.name()?;

    if name == "main" {
        return None;
    }

    Some(name.replace("::", "."))
}

/// Validate a test name
///
/// `/` is allowed so subtests can nest under their parent test.
///
/// # Errors
///
/// Returns error if test name is invalid
fn validate_test_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ShimError::Configuration(
            "Test name cannot be empty".to_string(),
        ));
    }

    if name.len() > 255 {
        return Err(ShimError::Configuration(format!(
            "Test name too long: {} > 255",
            name.len()
        )));
    }

    if name.contains('\0') {
        return Err(ShimError::Configuration(
            "Test name cannot contain null bytes".to_string(),
        ));
    }

    if name.starts_with('/') || name.split('/').any(|segment| segment == "..") {
        return Err(ShimError::Configuration(format!(
            "Test name cannot escape the recordings directory: {name}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_file_path() {
        let path = recording_file_path(Path::new("/tmp/rec"), "TestFoo").unwrap();
        assert_eq!(path, "/tmp/rec/recordings/TestFoo.json");

        let path = recording_file_path(Path::new("/tmp/rec/"), "TestFoo").unwrap();
        assert_eq!(path, "/tmp/rec/recordings/TestFoo.json");
    }

    #[test]
    fn test_recording_file_path_edges() {
        assert_eq!(
            recording_file_path(Path::new(""), "TestFoo").unwrap(),
            "recordings/TestFoo.json"
        );
        assert_eq!(
            recording_file_path(Path::new("/"), "TestFoo").unwrap(),
            "/recordings/TestFoo.json"
        );
        assert_eq!(
            recording_file_path(Path::new("sdk/tables"), "TestFoo/create").unwrap(),
            "sdk/tables/recordings/TestFoo/create.json"
        );
    }

    #[test]
    fn test_validate_test_name() {
        assert!(validate_test_name("TestCosmosDBTables").is_ok());
        assert!(validate_test_name("test-123").is_ok());
        assert!(validate_test_name("TestTables/create").is_ok());

        assert!(validate_test_name("").is_err());
        assert!(validate_test_name("/absolute").is_err());
        assert!(validate_test_name("../escape").is_err());
        assert!(validate_test_name("a/../b").is_err());
        assert!(validate_test_name("test\0name").is_err());
        assert!(validate_test_name(&"x".repeat(256)).is_err());
    }

    #[test]
    fn test_current_test_name() {
        let name = current_test_name().unwrap();
        assert!(name.ends_with("tests.test_current_test_name"), "{name}");
    }
}

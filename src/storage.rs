// ABOUTME: Local storage helpers: atomic file writes and credentials persistence
// ABOUTME: Never replaces a persisted refresh token with an empty one

use crate::{Error, Result};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::Path;
use tracing::info;

/// Permissions for published content files.
pub const CONTENT_MODE: u32 = 0o644;
/// Permissions for files holding secrets.
pub const SECRET_MODE: u32 = 0o600;

pub const REFRESH_TOKEN_KEY: &str = "google_refresh_token";

/// Write via a temp file in the target's directory, then rename over the target.
pub fn write_atomic(path: &Path, content: &[u8], mode: u32) -> Result<()> {
    use rand::Rng;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    // Create temp file
    let random: u32 = rand::thread_rng().gen();
    let tmp_path = parent.join(format!(".{:x}.part", random));

    // Write to temp
    fs::write(&tmp_path, content)?;

    // Set permissions
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(mode);
        fs::set_permissions(&tmp_path, perms)?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    // Atomic rename
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    Ok(())
}

fn read_mapping(path: &Path) -> Result<Mapping> {
    if !path.exists() {
        return Ok(Mapping::new());
    }
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Mapping::new());
    }
    match serde_yaml::from_str::<Value>(&content)? {
        Value::Mapping(m) => Ok(m),
        Value::Null => Ok(Mapping::new()),
        _ => Err(Error::Config(format!(
            "{} must contain a key/value mapping",
            path.display()
        ))),
    }
}

/// Store a newly minted refresh token, keeping every other key in the file.
pub fn persist_refresh_token(path: &Path, refresh_token: &str) -> Result<()> {
    if refresh_token.is_empty() {
        return Err(Error::Auth(
            "refusing to overwrite the stored refresh token with an empty value".into(),
        ));
    }

    let mut credentials = read_mapping(path)?;
    credentials.insert(
        Value::String(REFRESH_TOKEN_KEY.into()),
        Value::String(refresh_token.into()),
    );
    let yaml = serde_yaml::to_string(&Value::Mapping(credentials))?;
    write_atomic(path, yaml.as_bytes(), SECRET_MODE)?;

    info!(file = %path.display(), "Stored refresh token");
    Ok(())
}

#[cfg(test)]
mod write_tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_creates_file_and_parents() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("nested/dir/test.txt");
        write_atomic(&target, b"hello", CONTENT_MODE).unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "hello");
        // no temp files left behind
        let leftovers: Vec<_> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_write_atomic_replaces_existing() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("test.txt");
        write_atomic(&target, b"one", CONTENT_MODE).unwrap();
        write_atomic(&target, b"two", CONTENT_MODE).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "two");
    }

    #[test]
    #[cfg(unix)]
    fn test_write_atomic_sets_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let target = temp.path().join("secret.yaml");
        write_atomic(&target, b"hello", SECRET_MODE).unwrap();

        let perms = fs::metadata(&target).unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o600);
    }
}

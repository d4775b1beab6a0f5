use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

/// Load `.env` (or `.env.{env}`) from the current directory or the nearest ancestor.
///
/// Returns the file that was loaded. A missing default `.env` is fine; a
/// missing named environment file is an error.
pub fn load_dotenv(env: Option<&str>) -> Result<Option<PathBuf>> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let file_name = match env {
        Some(name) => format!(".env.{}", name),
        None => ".env".to_string(),
    };

    match find_in_ancestors(&cwd, &file_name) {
        Some(path) => {
            dotenvy::from_path(&path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            info!("Loaded {}", path.display());
            Ok(Some(path))
        }
        None if env.is_some() => anyhow::bail!(
            "No {} file found.\n\nSearched from {} to filesystem root.",
            file_name,
            cwd.display()
        ),
        None => {
            debug!("No .env file found");
            Ok(None)
        }
    }
}

fn find_in_ancestors(start: &Path, file_name: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(file_name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_find_in_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(".env"), "A=1").unwrap();
        let nested = temp_dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let found = find_in_ancestors(&nested, ".env").unwrap();
        assert_eq!(found, temp_dir.path().join(".env"));
    }

    #[test]
    #[serial]
    fn test_load_named_environment() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(".env.staging"),
            "SLOTSTREAM_TEST_STAGING=loaded",
        )
        .unwrap();

        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(temp_dir.path()).unwrap();

        let loaded = load_dotenv(Some("staging"));

        std::env::set_current_dir(original_dir).unwrap();

        assert!(loaded.unwrap().is_some());
        assert_eq!(std::env::var("SLOTSTREAM_TEST_STAGING").unwrap(), "loaded");
        std::env::remove_var("SLOTSTREAM_TEST_STAGING");
    }

    #[test]
    #[serial]
    fn test_missing_named_environment_is_error() {
        let temp_dir = TempDir::new().unwrap();

        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(temp_dir.path()).unwrap();

        let result = load_dotenv(Some("slotstream-test-missing"));

        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.is_err());
    }
}

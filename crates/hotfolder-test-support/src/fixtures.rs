//! Test fixtures and filesystem helpers.

use std::fs;
use std::path::Path;

use anyhow::Result;
use tempfile::TempDir;

/// Create a temporary directory whose name starts with `hotfolder-<prefix>-`.
///
/// # Errors
///
/// Returns an error when the directory cannot be created.
pub fn temp_dir(prefix: &str) -> Result<TempDir> {
    Ok(tempfile::Builder::new()
        .prefix(&format!("hotfolder-{prefix}-"))
        .tempdir()?)
}

/// Names of the regular files directly inside `dir`, sorted.
///
/// # Errors
///
/// Returns an error when the directory cannot be read.
pub fn file_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_lists_only_files() -> Result<()> {
        let dir = temp_dir("fixtures")?;
        fs::write(dir.path().join("b.csv"), "b")?;
        fs::write(dir.path().join("a.csv"), "a")?;
        fs::create_dir(dir.path().join("nested"))?;
        assert_eq!(file_names(dir.path())?, vec!["a.csv", "b.csv"]);
        assert!(
            dir.path()
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with("hotfolder-fixtures-"))
        );
        Ok(())
    }
}

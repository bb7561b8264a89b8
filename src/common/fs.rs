use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Create the directory if it doesn’t exist; error if a non-directory exists there.
pub(crate) fn ensure_dir_exists(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            anyhow::bail!("Path exists but is not a directory: {}", path.display());
        }
    } else {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory {}", path.display()))?;
    }
    Ok(())
}

/// Create the parent directory of an output file, if it has one.
pub(crate) fn ensure_parent_exists(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir_exists(parent),
        _ => Ok(()),
    }
}

/// Error if a shapefile is already present at `path`.
pub(crate) fn require_shapefile_absent(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("{} exists. Please delete before creating new shapefile", path.display());
    }
    Ok(())
}

/// `<dir>/<stem><suffix>.<ext>` for a file next to `path`.
pub(crate) fn sibling_path(path: &Path, suffix: &str, ext: &str) -> PathBuf {
    let stem = path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}{suffix}.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_path_keeps_directory() {
        let path = Path::new("data/ABW_L1_mastergrid.tif");
        assert_eq!(sibling_path(path, "_A", "tif"), Path::new("data/ABW_L1_mastergrid_A.tif"));
        assert_eq!(sibling_path(path, "", "shp"), Path::new("data/ABW_L1_mastergrid.shp"));
    }

    #[test]
    fn existing_shapefile_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("units.shp");
        assert!(require_shapefile_absent(&path).is_ok());

        fs::write(&path, b"").unwrap();
        let err = require_shapefile_absent(&path).unwrap_err();
        assert!(err.to_string().contains("Please delete before creating new shapefile"));
    }

    #[test]
    fn parent_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/out.shp");
        ensure_parent_exists(&path).unwrap();
        assert!(dir.path().join("a/b").is_dir());
        assert!(ensure_parent_exists(Path::new("out.shp")).is_ok());
    }

    #[test]
    fn file_in_place_of_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file");
        fs::write(&path, b"x").unwrap();
        assert!(ensure_dir_exists(&path).is_err());
    }
}

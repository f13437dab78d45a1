//! Storage Layer
//!
//! Locates the configuration directory and lists image files on disk.

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "cardtracker", "CardTracker")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

/// Whether `path` carries one of `extensions` (compared case-insensitively)
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// List the image files directly inside `dir`, sorted by file name
pub fn list_images(dir: &Path, extensions: &[String]) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_extension(path, extensions))
        .collect();

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exts() -> Vec<String> {
        vec!["png".to_string(), "jpg".to_string()]
    }

    #[test]
    fn test_has_extension_case_insensitive() {
        assert!(has_extension(Path::new("Hearts Ace.PNG"), &exts()));
        assert!(has_extension(Path::new("a/b/c.jpg"), &exts()));
        assert!(!has_extension(Path::new("notes.txt"), &exts()));
        assert!(!has_extension(Path::new("README"), &exts()));
    }

    #[test]
    fn test_list_images_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.jpg", "c.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("d.png")).unwrap();

        let files = list_images(dir.path(), &exts()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();

        assert_eq!(names, vec!["a.jpg", "b.png"]);
    }

    #[test]
    fn test_list_images_missing_dir() {
        assert!(list_images(Path::new("/nonexistent/frames"), &exts()).is_err());
    }
}

//! File I/O helpers for the evaluators.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use walkdir::WalkDir;

/// Expand `--include` arguments: files pass through, directories are walked
/// for `.json` files. The result is sorted for deterministic processing.
pub fn collect_include_paths(includes: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for include in includes {
        let p = Path::new(include);
        if p.is_file() {
            paths.push(p.to_path_buf());
        } else if p.is_dir() {
            for entry in WalkDir::new(p).follow_links(false) {
                let entry = entry.with_context(|| format!("walking {include}"))?;
                if entry.file_type().is_file()
                    && entry.path().extension().is_some_and(|e| e == "json")
                {
                    paths.push(entry.path().to_path_buf());
                }
            }
        } else {
            return Err(anyhow!("include path does not exist: {include}"));
        }
    }
    paths.sort();
    paths.dedup();
    Ok(paths)
}

pub fn read_json_file(path: &Path) -> Result<serde_json::Value> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parsing {}", path.display()))
}

pub fn read_text_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

/// Write with a trailing newline, creating parent directories.
pub fn write_text_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let mut owned = contents.to_string();
    if !owned.ends_with('\n') {
        owned.push('\n');
    }
    std::fs::write(path, owned).with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn include_collection_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.json"), "{}").unwrap();
        std::fs::write(dir.path().join("a.json"), "{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let paths =
            collect_include_paths(&[dir.path().to_string_lossy().into_owned()]).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("a.json"));
        assert!(paths[1].ends_with("b.json"));
    }

    #[test]
    fn missing_include_is_an_error() {
        assert!(collect_include_paths(&["/definitely/missing".to_string()]).is_err());
    }
}

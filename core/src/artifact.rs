use comfy_table::{presets::ASCII_FULL, Table};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessArtifact {
    pub engine: String,
    pub command: Vec<String>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub started_at: String,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryArtifact {
    pub location: String,
    pub listing: Vec<FileEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the directory root, `/`-separated.
    pub path: String,
    pub size: u64,
}

impl DirectoryArtifact {
    /// Records every regular file below `root`, sorted by relative path.
    pub fn scan(root: &Path) -> io::Result<Self> {
        let mut listing = Vec::new();
        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(root)
                .map_err(io::Error::other)?;
            let path = relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            listing.push(FileEntry {
                path,
                size: entry.metadata().map_err(io::Error::from)?.len(),
            });
        }

        Ok(Self {
            location: root.to_string_lossy().to_string(),
            listing,
        })
    }

    pub fn total_size(&self) -> u64 {
        self.listing.iter().map(|entry| entry.size).sum()
    }

    pub fn render_listing(&self) -> String {
        let mut display = Table::new();
        display.load_preset(ASCII_FULL);
        display.set_header(vec!["path", "bytes"]);
        for entry in &self.listing {
            display.add_row(vec![entry.path.clone(), entry.size.to_string()]);
        }
        display.to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ArtifactKind {
    Directory,
    File,
    Process,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub name: String,
    pub kind: ArtifactKind,
    pub path: Option<String>,
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn scan_lists_nested_files_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("nested")).expect("nested dir");
        fs::write(dir.path().join("catalog.json"), b"{}").expect("write catalog");
        fs::write(dir.path().join("nested/item.json"), b"[1, 2]").expect("write item");

        let artifact = DirectoryArtifact::scan(dir.path()).expect("scan succeeds");
        assert_eq!(
            artifact.listing,
            vec![
                FileEntry {
                    path: "catalog.json".to_string(),
                    size: 2
                },
                FileEntry {
                    path: "nested/item.json".to_string(),
                    size: 6
                },
            ]
        );
        assert_eq!(artifact.total_size(), 8);

        let table = artifact.render_listing();
        assert!(table.contains("nested/item.json"));
        assert!(table.contains("bytes"));
    }

    #[cfg(unix)]
    #[test]
    fn scan_skips_symlinks_inside_the_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outside = tempfile::tempdir().expect("outside");
        fs::create_dir_all(outside.path().join("host")).expect("host dir");
        fs::write(outside.path().join("host/secret.txt"), b"host data").expect("secret");
        fs::write(dir.path().join("catalog.json"), b"{}").expect("write catalog");
        std::os::unix::fs::symlink(outside.path().join("host"), dir.path().join("linked"))
            .expect("dir symlink");
        std::os::unix::fs::symlink(
            outside.path().join("host/secret.txt"),
            dir.path().join("secret.txt"),
        )
        .expect("file symlink");

        let artifact = DirectoryArtifact::scan(dir.path()).expect("scan succeeds");
        let paths: Vec<&str> = artifact.listing.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["catalog.json"]);
    }
}

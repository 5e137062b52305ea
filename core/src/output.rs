use crate::artifact::{ArtifactKind, DirectoryArtifact, FileEntry, StoredArtifact};
use crate::command::OutputTarget;
use crate::manifest::TypeKind;
use serde_json::json;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("glob '{0}' must stay inside the working directory")]
    Escapes(String),
    #[error("output '{name}' is missing: glob '{glob}' matched nothing")]
    Missing { name: String, glob: String },
    #[error("output '{name}' is ambiguous: glob '{glob}' matched {count} entries")]
    Ambiguous {
        name: String,
        glob: String,
        count: usize,
    },
    #[error("output '{name}' expects a {expected}, but '{path}' is not one")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        path: String,
    },
    #[error("output '{name}' has type {kind}, which cannot be collected from a glob")]
    Unsupported { name: String, kind: &'static str },
    #[error("failed to inspect output '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Resolves `pattern` against `root`. Supports `*` and `?` within a path segment.
///
/// Matches whose real path (after following symlinks) leaves `root` are rejected.
pub fn resolve_glob(root: &Path, pattern: &str) -> Result<Vec<PathBuf>, OutputError> {
    let trimmed = pattern.trim();
    if trimmed.starts_with('/') {
        return Err(OutputError::Escapes(pattern.to_string()));
    }

    let segments: Vec<&str> = trimmed
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    if segments.iter().any(|segment| *segment == "..") {
        return Err(OutputError::Escapes(pattern.to_string()));
    }

    let mut candidates = vec![root.to_path_buf()];
    for segment in segments {
        let mut next = Vec::new();
        for dir in &candidates {
            if !has_wildcard(segment) {
                let path = dir.join(segment);
                if fs::symlink_metadata(&path).is_ok() {
                    next.push(path);
                }
                continue;
            }
            let Ok(entries) = fs::read_dir(dir) else {
                continue;
            };
            let mut matched: Vec<PathBuf> = entries
                .filter_map(Result::ok)
                .filter(|entry| wildcard_match(segment, &entry.file_name().to_string_lossy()))
                .map(|entry| entry.path())
                .collect();
            matched.sort();
            next.extend(matched);
        }
        candidates = next;
    }

    let base = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    for candidate in &candidates {
        if let Ok(real) = fs::canonicalize(candidate) {
            if !real.starts_with(&base) {
                return Err(OutputError::Escapes(pattern.to_string()));
            }
        }
    }

    Ok(candidates)
}

/// Collects the single entry matched by the output's glob as a stored artifact.
pub fn collect_output(
    root: &Path,
    name: &str,
    target: &OutputTarget,
) -> Result<StoredArtifact, OutputError> {
    let expected = match target.param_type.kind {
        TypeKind::Directory => "directory",
        TypeKind::File => "file",
        other => {
            return Err(OutputError::Unsupported {
                name: name.to_string(),
                kind: other.as_str(),
            })
        }
    };

    let mut matches = resolve_glob(root, &target.glob)?;
    let path = match matches.len() {
        0 => {
            return Err(OutputError::Missing {
                name: name.to_string(),
                glob: target.glob.clone(),
            })
        }
        1 => matches.remove(0),
        count => {
            return Err(OutputError::Ambiguous {
                name: name.to_string(),
                glob: target.glob.clone(),
                count,
            })
        }
    };

    let io_error = |source| OutputError::Io {
        name: name.to_string(),
        source,
    };
    let metadata = fs::metadata(&path).map_err(io_error)?;
    let location = path.to_string_lossy().to_string();

    match target.param_type.kind {
        TypeKind::Directory if metadata.is_dir() => {
            let directory = DirectoryArtifact::scan(&path).map_err(io_error)?;
            Ok(StoredArtifact {
                name: name.to_string(),
                kind: ArtifactKind::Directory,
                path: Some(location),
                data: json!(directory),
            })
        }
        TypeKind::File if metadata.is_file() => Ok(StoredArtifact {
            name: name.to_string(),
            kind: ArtifactKind::File,
            path: Some(location.clone()),
            data: json!(FileEntry {
                path: location,
                size: metadata.len(),
            }),
        }),
        _ => Err(OutputError::TypeMismatch {
            name: name.to_string(),
            expected,
            path: location,
        }),
    }
}

fn has_wildcard(segment: &str) -> bool {
    segment.contains(['*', '?'])
}

fn wildcard_match(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();
    let (mut p, mut c) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while c < candidate.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, c));
                p += 1;
            }
            Some('?') => {
                p += 1;
                c += 1;
            }
            Some(expected) if *expected == candidate[c] => {
                p += 1;
                c += 1;
            }
            _ => match backtrack {
                Some((star, consumed)) => {
                    p = star + 1;
                    c = consumed + 1;
                    backtrack = Some((star, consumed + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|ch| *ch == '*')
}

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::Document;

/// A file that could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub documents: Vec<Document>,
    pub skipped: Vec<SkippedFile>,
}

/// Reads a corpus directory into `Document`s, one per file.
pub struct DocumentLoader {
    extensions: Vec<String>,
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self::new(vec!["txt".to_string(), "md".to_string()])
    }
}

impl DocumentLoader {
    pub fn new(extensions: Vec<String>) -> Self {
        let extensions = extensions.into_iter().map(|e| e.trim_start_matches('.').to_ascii_lowercase()).collect();
        Self { extensions }
    }

    pub fn load_dir(&self, data_dir: &Path) -> Result<LoadOutcome> {
        self.load(data_dir, None)
    }

    pub fn load_dir_limited(&self, data_dir: &Path, limit: usize) -> Result<LoadOutcome> {
        self.load(data_dir, Some(limit))
    }

    fn load(&self, data_dir: &Path, limit: Option<usize>) -> Result<LoadOutcome> {
        if !data_dir.is_dir() {
            return Err(Error::config(format!("corpus directory {} does not exist", data_dir.display())));
        }
        let mut files = self.list_files(data_dir);
        if let Some(limit) = limit {
            if files.len() > limit {
                files.truncate(limit);
                info!(limit, "limited corpus to first files");
            }
        }
        if files.is_empty() {
            warn!(dir = %data_dir.display(), "no matching files found");
        }
        let mut outcome = LoadOutcome::default();
        for file_path in files {
            match read_file_content(&file_path) {
                Ok(content) => {
                    let id = document_id(&file_path, data_dir);
                    debug!(doc_id = %id, bytes = content.len(), "loaded document");
                    outcome.documents.push(Document::new(id, content, file_path.to_string_lossy()));
                }
                Err(e) => {
                    warn!(path = %file_path.display(), error = %e, "skipping unreadable file");
                    outcome.skipped.push(SkippedFile { path: file_path, reason: e.to_string() });
                }
            }
        }
        info!(documents = outcome.documents.len(), skipped = outcome.skipped.len(), "corpus loaded");
        Ok(outcome)
    }

    fn list_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            // symlinks are kept so a dangling one is reported, not silently dropped
            .filter(|e| e.file_type().is_file() || e.path_is_symlink())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
            })
            .collect();
        files.sort();
        files
    }
}

// Invalid UTF-8 is decoded lossily; the chunker rejects text that ends up unusable.
fn read_file_content(file_path: &Path) -> std::io::Result<String> {
    let bytes = fs::read(file_path)?;
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => Ok(String::from_utf8_lossy(e.as_bytes()).into_owned()),
    }
}

fn document_id(file_path: &Path, data_dir: &Path) -> String {
    let relative = file_path.strip_prefix(data_dir).unwrap_or(file_path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

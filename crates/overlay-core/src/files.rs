use std::path::{Path, PathBuf};
use tracing::warn;

/// Make a show title safe to use as a file name.
///
/// Drops path separators and reserved characters, then anything that is not
/// a word character, whitespace or `-`.
pub fn sanitize_filename(title: &str) -> String {
    title
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect::<String>()
        .trim()
        .to_string()
}

/// File stem for a show's output images, falling back to its key when the
/// title sanitizes to nothing.
pub fn poster_stem(title: &str, rating_key: &str) -> String {
    let sanitized = sanitize_filename(title);
    if sanitized.is_empty() {
        rating_key.to_string()
    } else {
        sanitized
    }
}

pub fn preview_path(dir: &Path, stem: &str, label: &str) -> PathBuf {
    dir.join(format!("{}_{}.png", stem, label))
}

pub fn staging_path(dir: &Path, stem: &str, label: &str) -> PathBuf {
    dir.join(format!("temp_{}_{}.png", stem, label))
}

/// A file written only to be uploaded; removed when dropped.
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!("Failed to remove staging file {}: {}", self.path.display(), e);
            }
        }
    }
}

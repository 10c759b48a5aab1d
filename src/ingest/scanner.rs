//! Document discovery
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// A document found under the knowledge-base root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    pub path: PathBuf,
    pub filename: String,
    /// Relative folder, or the root's own name for top-level files
    pub category: String,
    /// Relative folder, `.` for top-level files
    pub folder_path: String,
    /// Lowercased extension
    pub file_type: String,
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.') || name.starts_with('_'))
}

/// Recursively list documents with one of `extensions`
///
/// Folders starting with `.` or `_` are not entered. Results are sorted by
/// path so repeated runs visit files in the same order.
pub fn find_documents(root: &Path, extensions: &[String]) -> Vec<DocumentInfo> {
    let root_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.to_string_lossy().into_owned());

    let mut documents: Vec<DocumentInfo> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let path = entry.path();
            let file_type = path.extension()?.to_str()?.to_ascii_lowercase();
            if !extensions.iter().any(|ext| ext.eq_ignore_ascii_case(&file_type)) {
                return None;
            }

            let folder = path
                .parent()
                .and_then(|p| p.strip_prefix(root).ok())
                .map(|rel| rel.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            let (category, folder_path) = if folder.is_empty() {
                (root_name.clone(), ".".to_string())
            } else {
                (folder.clone(), folder)
            };

            Some(DocumentInfo {
                path: path.to_path_buf(),
                filename: entry.file_name().to_string_lossy().into_owned(),
                category,
                folder_path,
                file_type,
            })
        })
        .collect();

    documents.sort_by(|a, b| a.path.cmp(&b.path));
    documents
}

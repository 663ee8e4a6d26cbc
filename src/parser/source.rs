use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::DescriptorError;

/// Yields descriptor text by logical path
pub trait DescriptorSource {
    /// Raw text under `path`; `NotFound` when nothing is there
    fn read(&self, path: &str) -> Result<String, DescriptorError>;
}

/// Descriptors stored as files below a root directory
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DescriptorSource for DirectorySource {
    fn read(&self, path: &str) -> Result<String, DescriptorError> {
        let full = self.root.join(path);
        tracing::debug!(path = %full.display(), "reading descriptor");

        fs::read_to_string(&full).map_err(|err| match err.kind() {
            ErrorKind::NotFound => DescriptorError::NotFound {
                path: full.display().to_string(),
            },
            _ => DescriptorError::Malformed {
                path: full.display().to_string(),
                message: err.to_string(),
            },
        })
    }
}

/// Descriptors held in memory, keyed by path
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    documents: HashMap<String, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, text: impl Into<String>) {
        self.documents.insert(path.into(), text.into());
    }
}

impl DescriptorSource for MemorySource {
    fn read(&self, path: &str) -> Result<String, DescriptorError> {
        self.documents
            .get(path)
            .cloned()
            .ok_or_else(|| DescriptorError::NotFound {
                path: path.to_string(),
            })
    }
}

/// `relative` resolved against the directory holding `base`
pub fn sibling_path(base: &str, relative: &str) -> String {
    match base.rfind('/') {
        Some(end) => format!("{}/{}", &base[..end], relative),
        None => relative.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_source() {
        let source = MemorySource::new().with("app.json", "{}");
        assert_eq!(source.read("app.json").unwrap(), "{}");
        assert!(matches!(
            source.read("missing.json"),
            Err(DescriptorError::NotFound { .. })
        ));
    }

    #[test]
    fn test_directory_source() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("entities")).unwrap();
        fs::write(dir.path().join("entities/User.json"), "{\"table_name\": \"User\"}").unwrap();

        let source = DirectorySource::new(dir.path());
        assert!(source.read("entities/User.json").unwrap().contains("User"));

        let err = source.read("entities/Order.json").unwrap_err();
        assert!(err.to_string().contains("Order.json"));
    }

    #[test]
    fn test_sibling_path() {
        assert_eq!(sibling_path("libs/audit/Library.json", "Log.json"), "libs/audit/Log.json");
        assert_eq!(sibling_path("Library.json", "Log.json"), "Log.json");
    }
}

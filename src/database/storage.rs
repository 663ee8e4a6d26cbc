use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::DatabaseError;
use crate::schema::DatabaseDescriptor;

/// Where database files live and how they are created or removed
pub trait StorageProvider: Send + Sync {
    /// Full path of the database file
    fn database_path(&self, database: &DatabaseDescriptor) -> PathBuf;

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    /// Create the directories a new database file needs
    fn prepare(&self, database: &DatabaseDescriptor, path: &Path) -> Result<(), DatabaseError>;

    /// Delete a database file
    fn remove(&self, database: &DatabaseDescriptor, path: &Path) -> Result<(), DatabaseError>;
}

/// Database files on the local filesystem
#[derive(Debug, Clone)]
pub struct FileStorage {
    data_dir: PathBuf,
    external_dir: Option<PathBuf>,
}

impl FileStorage {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            external_dir: None,
        }
    }

    /// Directory for databases that ask for external storage
    pub fn with_external_dir(self, external_dir: impl Into<PathBuf>) -> Self {
        Self {
            external_dir: Some(external_dir.into()),
            ..self
        }
    }

    /// Platform data directory of this tool, if the platform has one
    pub fn default_data_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "descriptor-orm").map(|dirs| dirs.data_dir().to_path_buf())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn storage_error(database: &DatabaseDescriptor, path: &Path, source: std::io::Error) -> DatabaseError {
        DatabaseError::Storage {
            database: database.database_name.clone(),
            path: path.display().to_string(),
            source,
        }
    }
}

impl StorageProvider for FileStorage {
    fn database_path(&self, database: &DatabaseDescriptor) -> PathBuf {
        let dir = match (&self.external_dir, database.external_storage) {
            (Some(external), true) => external,
            _ => &self.data_dir,
        };
        dir.join(database.file_name())
    }

    fn prepare(&self, database: &DatabaseDescriptor, path: &Path) -> Result<(), DatabaseError> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
                .map_err(|e| Self::storage_error(database, parent, e)),
            _ => Ok(()),
        }
    }

    fn remove(&self, database: &DatabaseDescriptor, path: &Path) -> Result<(), DatabaseError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::storage_error(database, path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_database_path() {
        let storage = FileStorage::new("/data").with_external_dir("/sdcard");
        let mut database = DatabaseDescriptor::new("shop");
        assert_eq!(storage.database_path(&database), PathBuf::from("/data/shop.db"));

        database.external_storage = true;
        assert_eq!(storage.database_path(&database), PathBuf::from("/sdcard/shop.db"));

        let internal_only = FileStorage::new("/data");
        assert_eq!(internal_only.database_path(&database), PathBuf::from("/data/shop.db"));
    }

    #[test]
    fn test_prepare_and_remove() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("nested/data"));
        let database = DatabaseDescriptor::new("shop");
        let path = storage.database_path(&database);

        storage.prepare(&database, &path).unwrap();
        assert!(path.parent().unwrap().is_dir());
        assert!(!storage.exists(&path));

        fs::write(&path, b"").unwrap();
        assert!(storage.exists(&path));
        storage.remove(&database, &path).unwrap();
        assert!(!storage.exists(&path));
        storage.remove(&database, &path).unwrap();
    }
}

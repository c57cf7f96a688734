use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufReader};
use uuid::Uuid;

/// Upload size cap enforced before anything touches disk.
pub const MAX_MEDIA_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum MediaStorageError {
    #[error("object not found")]
    NotFound,
    #[error("invalid OID format")]
    InvalidOid,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaStorageError {
    fn from_io(e: std::io::Error) -> Self {
        if e.kind() == ErrorKind::NotFound {
            Self::NotFound
        } else {
            Self::Io(e)
        }
    }
}

/// Content-addressed media pool under `<data_dir>/media`. Objects are
/// stored once per content hash; ownership lives in the database.
pub struct MediaStorage {
    base_path: PathBuf,
}

impl MediaStorage {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            base_path: data_dir.join("media"),
        }
    }

    fn object_path(&self, oid: &str) -> PathBuf {
        let prefix1 = &oid[0..2];
        let prefix2 = &oid[2..4];
        self.base_path
            .join("objects")
            .join(prefix1)
            .join(prefix2)
            .join(oid)
    }

    fn temp_path(&self) -> PathBuf {
        self.base_path.join("tmp").join(Uuid::new_v4().to_string())
    }

    pub async fn exists(&self, oid: &str) -> Result<bool, MediaStorageError> {
        validate_oid(oid)?;
        let path = self.object_path(oid);
        Ok(path.exists())
    }

    pub async fn size(&self, oid: &str) -> Result<i64, MediaStorageError> {
        validate_oid(oid)?;
        let path = self.object_path(oid);
        let metadata = fs::metadata(&path)
            .await
            .map_err(MediaStorageError::from_io)?;
        Ok(metadata.len() as i64)
    }

    pub async fn get(&self, oid: &str) -> Result<(BufReader<File>, i64), MediaStorageError> {
        validate_oid(oid)?;
        let path = self.object_path(oid);
        let file = File::open(&path)
            .await
            .map_err(MediaStorageError::from_io)?;

        let metadata = file.metadata().await?;
        let size = metadata.len() as i64;

        Ok((BufReader::new(file), size))
    }

    /// Hashes and stores the bytes, returning the content OID. Writing an
    /// object that already exists is a no-op beyond the temp write.
    pub async fn put(&self, data: &[u8]) -> Result<String, MediaStorageError> {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let oid = hex::encode(hasher.finalize());

        let temp_path = self.temp_path();
        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut temp_file = File::create(&temp_path).await?;
        temp_file.write_all(data).await?;
        temp_file.sync_all().await?;

        let final_path = self.object_path(&oid);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::rename(&temp_path, &final_path).await?;

        Ok(oid)
    }

    pub async fn delete(&self, oid: &str) -> Result<bool, MediaStorageError> {
        validate_oid(oid)?;
        let path = self.object_path(oid);

        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(MediaStorageError::Io(e)),
        }
    }
}

fn validate_oid(oid: &str) -> Result<(), MediaStorageError> {
    if oid.len() != 64 {
        return Err(MediaStorageError::InvalidOid);
    }

    if !oid
        .chars()
        .all(|c| c.is_ascii_hexdigit() && !c.is_uppercase())
    {
        return Err(MediaStorageError::InvalidOid);
    }

    Ok(())
}

#[must_use]
pub fn is_valid_oid(oid: &str) -> bool {
    validate_oid(oid).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    // sha256 of b"123"
    const OID_123: &str = "a665a45920422f9d417e4867efdc4fb8a04a1f3fff1fa07e998e86f7f7a27ae3";

    #[tokio::test]
    async fn test_put_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let storage = MediaStorage::new(temp_dir.path());

        let oid = storage.put(b"123").await.unwrap();
        assert_eq!(oid, OID_123);

        assert!(storage.exists(&oid).await.unwrap());
        assert_eq!(storage.size(&oid).await.unwrap(), 3);

        let (mut reader, size) = storage.get(&oid).await.unwrap();
        assert_eq!(size, 3);

        let mut content = Vec::new();
        reader.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"123");
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let storage = MediaStorage::new(temp_dir.path());

        let first = storage.put(b"123").await.unwrap();
        let second = storage.put(b"123").await.unwrap();
        assert_eq!(first, second);
        assert!(storage.exists(&first).await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_oid() {
        let temp_dir = TempDir::new().unwrap();
        let storage = MediaStorage::new(temp_dir.path());

        assert!(matches!(
            storage.exists("invalid").await,
            Err(MediaStorageError::InvalidOid)
        ));

        assert!(matches!(
            storage
                .exists("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA")
                .await,
            Err(MediaStorageError::InvalidOid)
        ));
    }

    #[tokio::test]
    async fn test_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let storage = MediaStorage::new(temp_dir.path());

        assert!(!storage.exists(OID_123).await.unwrap());
        assert!(matches!(
            storage.get(OID_123).await,
            Err(MediaStorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let temp_dir = TempDir::new().unwrap();
        let storage = MediaStorage::new(temp_dir.path());

        let oid = storage.put(b"123").await.unwrap();
        assert!(storage.delete(&oid).await.unwrap());
        assert!(!storage.exists(&oid).await.unwrap());
        assert!(!storage.delete(&oid).await.unwrap());
    }

    #[test]
    fn test_is_valid_oid() {
        assert!(is_valid_oid(OID_123));
        assert!(!is_valid_oid("short"));
        assert!(!is_valid_oid(
            "A665A45920422F9D417E4867EFDC4FB8A04A1F3FFF1FA07E998E86F7F7A27AE3"
        ));
        assert!(!is_valid_oid(
            "g665a45920422f9d417e4867efdc4fb8a04a1f3fff1fa07e998e86f7f7a27ae3"
        ));
    }
}

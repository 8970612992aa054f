use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use log::debug;

use crate::config::StorageOptions;
use crate::error::{Error, Result};

/// 按名称存取图片的对象存储
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Vec<u8>>;
    async fn put(&self, name: &str, data: &[u8]) -> Result<()>;

    /// 健康检查，默认总是可用
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// 对象名只允许普通路径分量，防止访问存储目录之外的文件
pub fn validate_blob_name(name: &str) -> Result<()> {
    let valid = !name.trim().is_empty()
        && Path::new(name).components().all(|c| matches!(c, Component::Normal(_)));
    if !valid {
        return Err(Error::validation(format!("invalid blob name: {name:?}")));
    }
    Ok(())
}

/// 以本地目录作为对象存储
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(opts: &StorageOptions) -> Self {
        Self { root: opts.blob_dir.clone() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        validate_blob_name(name)?;
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn get(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(name)?;
        debug!("读取图片: {}", path.display());
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::Blob(format!("blob not found: {name}")),
            _ => Error::Blob(format!("{name}: {e}")),
        })
    }

    async fn put(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve(name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| Error::Blob(e.to_string()))?;
        }
        tokio::fs::write(&path, data).await.map_err(|e| Error::Blob(format!("{name}: {e}")))
    }

    async fn ping(&self) -> Result<()> {
        let meta = tokio::fs::metadata(&self.root)
            .await
            .map_err(|e| Error::Blob(format!("{}: {e}", self.root.display())))?;
        if !meta.is_dir() {
            return Err(Error::Blob(format!("{} is not a directory", self.root.display())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn test_put_get() {
        let dir = tempdir().unwrap();
        let store = LocalBlobStore::new(&StorageOptions { blob_dir: dir.path().to_path_buf() });

        store.put("a/b.jpg", b"hello").await.unwrap();
        assert_eq!(store.get("a/b.jpg").await.unwrap(), b"hello");
        assert!(matches!(store.get("missing.jpg").await, Err(Error::Blob(_))));
    }

    #[tokio::test]
    async fn test_reject_escaping_names() {
        let dir = tempdir().unwrap();
        let store = LocalBlobStore::new(&StorageOptions { blob_dir: dir.path().to_path_buf() });

        for name in ["", "  ", "../secret", "/etc/passwd", "a/../../b", "./a.jpg"] {
            assert!(matches!(store.get(name).await, Err(Error::Validation(_))), "{name}");
            assert!(matches!(store.put(name, b"x").await, Err(Error::Validation(_))), "{name}");
        }
        assert!(validate_blob_name("a/b.jpg").is_ok());
    }

    #[tokio::test]
    async fn test_ping() {
        let dir = tempdir().unwrap();
        let store = LocalBlobStore::new(&StorageOptions { blob_dir: dir.path().to_path_buf() });
        assert!(store.ping().await.is_ok());

        let missing = dir.path().join("missing");
        let store = LocalBlobStore::new(&StorageOptions { blob_dir: missing });
        assert!(matches!(store.ping().await, Err(Error::Blob(_))));
    }
}

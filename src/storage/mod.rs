//! Blob fetching from object storage.
//!
//! A [`BlobFetcher`] copies one object, identified by bucket and key, to a
//! local path. [`ObjectStoreFetcher`] implements it on top of `object_store`
//! for S3 or for a local directory tree laid out as `<root>/<bucket>/<key>`.

mod local;
mod s3;

use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::ObjectStore;
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::emit;
use crate::error::{FetchError, LocalWriteSnafu, NotFoundSnafu, TransferSnafu};
use crate::metrics::events::BlobDownloaded;

/// Copies a remote object to a local file.
#[async_trait]
pub trait BlobFetcher: Send + Sync {
    /// Download `bucket/key` to `destination`, overwriting it.
    ///
    /// Returns the number of bytes written.
    async fn fetch(&self, bucket: &str, key: &str, destination: &Path) -> Result<u64, FetchError>;
}

/// Where buckets live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Amazon S3, credentials from the environment.
    S3 { region: Option<String> },
    /// Sub-directories of a local root.
    Local { root: PathBuf },
}

/// `object_store` backed fetcher with one client per bucket.
///
/// Clients are built on first use of a bucket and never validated up front.
pub struct ObjectStoreFetcher {
    backend: Backend,
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl std::fmt::Debug for ObjectStoreFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectStoreFetcher<{:?}>", self.backend)
    }
}

impl ObjectStoreFetcher {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Build a fetcher from the `storage` section of the config.
    pub fn from_config(config: &StorageConfig) -> Self {
        let backend = match &config.local_root {
            Some(root) => Backend::Local { root: root.clone() },
            None => Backend::S3 {
                region: config.region.clone(),
            },
        };
        Self::new(backend)
    }

    fn store_for(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, object_store::Error> {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = stores.get(bucket) {
            return Ok(store.clone());
        }

        let store = match &self.backend {
            Backend::S3 { region } => s3::construct(bucket, region.as_deref())?,
            Backend::Local { root } => local::construct(root, bucket)?,
        };
        debug!(bucket, "Created object store client");
        stores.insert(bucket.to_string(), store.clone());
        Ok(store)
    }
}

#[async_trait]
impl BlobFetcher for ObjectStoreFetcher {
    async fn fetch(&self, bucket: &str, key: &str, destination: &Path) -> Result<u64, FetchError> {
        info!(
            "Downloading from s3://{}/{} to {}",
            bucket,
            key,
            destination.display()
        );
        let start = Instant::now();

        let store = self.store_for(bucket).context(TransferSnafu { bucket, key })?;
        let location = object_store::path::Path::from(key);

        let result = match store.get(&location).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return NotFoundSnafu { bucket, key }.fail();
            }
            Err(source) => return Err(source).context(TransferSnafu { bucket, key }),
        };

        let mut file = tokio::fs::File::create(destination)
            .await
            .context(LocalWriteSnafu { path: destination })?;

        let mut stream = result.into_stream();
        let mut bytes = 0u64;
        while let Some(chunk) = stream
            .try_next()
            .await
            .context(TransferSnafu { bucket, key })?
        {
            file.write_all(&chunk)
                .await
                .context(LocalWriteSnafu { path: destination })?;
            bytes += chunk.len() as u64;
        }
        file.flush()
            .await
            .context(LocalWriteSnafu { path: destination })?;

        emit!(BlobDownloaded {
            bytes,
            duration: start.elapsed(),
        });
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn local_fetcher(root: &Path) -> ObjectStoreFetcher {
        ObjectStoreFetcher::new(Backend::Local {
            root: root.to_path_buf(),
        })
    }

    #[test]
    fn test_backend_from_config() {
        let s3 = ObjectStoreFetcher::from_config(&StorageConfig {
            region: Some("us-west-2".to_string()),
            local_root: None,
        });
        assert_eq!(
            &s3.backend,
            &Backend::S3 {
                region: Some("us-west-2".to_string())
            }
        );

        let local = ObjectStoreFetcher::from_config(&StorageConfig {
            region: None,
            local_root: Some(PathBuf::from("/data")),
        });
        assert_eq!(
            &local.backend,
            &Backend::Local {
                root: PathBuf::from("/data")
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_nested_key() {
        let root = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("tiles/2023/01")).unwrap();
        std::fs::write(root.path().join("tiles/2023/01/a.log"), b"line1\nline2\n").unwrap();

        let destination = work.path().join("2023.01.a.log");
        let fetcher = local_fetcher(root.path());
        let bytes = fetcher
            .fetch("tiles", "2023/01/a.log", &destination)
            .await
            .unwrap();

        assert_eq!(bytes, 12);
        assert_eq!(std::fs::read(&destination).unwrap(), b"line1\nline2\n");
    }

    #[tokio::test]
    async fn test_fetch_overwrites_destination() {
        let root = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("b")).unwrap();
        std::fs::write(root.path().join("b/k"), b"new").unwrap();

        let destination = work.path().join("k");
        std::fs::write(&destination, b"old contents that are longer").unwrap();

        local_fetcher(root.path())
            .fetch("b", "k", &destination)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_fetch_missing_key() {
        let root = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("b")).unwrap();

        let err = local_fetcher(root.path())
            .fetch("b", "missing.log", &work.path().join("missing.log"))
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Error: key not found: s3://b/missing.log");
        assert!(!work.path().join("missing.log").exists());
    }

    #[tokio::test]
    async fn test_store_is_reused_per_bucket() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("b")).unwrap();
        let fetcher = local_fetcher(root.path());

        let first = fetcher.store_for("b").unwrap();
        let second = fetcher.store_for("b").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}

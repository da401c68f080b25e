//! Local filesystem store.
//!
//! Development stand-in for S3: artifacts land under a root directory and
//! URLs are formed against a configured base. Actually serving the files is
//! someone else's job (nginx, a bind mount, ...).

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use url::Url;

use super::{DeliveryError, ObjectStore, Result};
use crate::config::LocalStoreConfig;

pub struct LocalStore {
    root: PathBuf,
    base_url: Url,
}

impl LocalStore {
    pub fn new(config: &LocalStoreConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.root)?;

        let mut base_url = config.base_url.clone();
        // Url::join treats a base without a trailing slash as a file and
        // would swallow its last segment.
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        Ok(Self {
            root: config.root.clone(),
            base_url,
        })
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn put(&self, key: &str, bytes: Bytes, _content_type: &str) -> Result<String> {
        // Keys become paths under `root`, so no empty or dot components.
        if key.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
            return Err(DeliveryError::Upload {
                message: format!("invalid artifact key `{key}`"),
            });
        }

        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;

        let url = self.base_url.join(key).map_err(|e| DeliveryError::Upload {
            message: format!("could not build artifact URL for `{key}`: {e}"),
        })?;
        Ok(url.to_string())
    }
}

//! S3-compatible object store.
//!
//! Works against AWS proper as well as MinIO/Ceph style deployments via
//! `endpoint_url` + `force_path_style`. Credentials come from the config
//! when given, otherwise from the ambient AWS credential chain.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::debug;
use url::Url;

use super::{DeliveryError, ObjectStore, Result};
use crate::config::S3StoreConfig;

pub struct S3Store {
    client: Client,
    bucket: String,
    region: String,
    key_prefix: Option<String>,
    endpoint_url: Option<Url>,
    public_base_url: Option<Url>,
}

impl S3Store {
    pub async fn new(config: &S3StoreConfig) -> anyhow::Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
        if let (Some(key), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(key.clone(), secret.clone(), None, None, "convertd-config"));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint.as_str());
        }
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }
        let client = Client::from_conf(builder.build());

        let public_base_url = match &config.public_base_url {
            Some(base) => {
                let mut base = base.clone();
                // Same trailing-slash dance as the local store: Url::join
                // against a slashless base swallows its last segment.
                if !base.path().ends_with('/') {
                    base.set_path(&format!("{}/", base.path()));
                }
                Some(base)
            }
            None => None,
        };

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            key_prefix: config.key_prefix.clone(),
            endpoint_url: config.endpoint_url.clone(),
            public_base_url,
        })
    }

    fn object_key(&self, key: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), key),
            None => key.to_string(),
        }
    }

    /// Public URL for a stored object: the configured base wins, then a
    /// path-style URL against the custom endpoint, then the virtual-hosted
    /// AWS form.
    fn object_url(&self, object_key: &str) -> Result<String> {
        if let Some(base) = &self.public_base_url {
            let url = base.join(object_key).map_err(|e| DeliveryError::Upload {
                message: format!("could not build artifact URL for `{object_key}`: {e}"),
            })?;
            return Ok(url.to_string());
        }
        if let Some(endpoint) = &self.endpoint_url {
            return Ok(format!(
                "{}/{}/{}",
                endpoint.as_str().trim_end_matches('/'),
                self.bucket,
                object_key
            ));
        }
        Ok(format!("https://{}.s3.{}.amazonaws.com/{}", self.bucket, self.region, object_key))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String> {
        let object_key = self.object_key(key);
        let size = bytes.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| DeliveryError::Upload {
                message: DisplayErrorContext(&e).to_string(),
            })?;

        debug!(bucket = %self.bucket, key = %object_key, size_bytes = size, "Uploaded artifact to S3");
        self.object_url(&object_key)
    }
}

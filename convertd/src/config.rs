//! Configuration management for convertd.
//!
//! Configuration is loaded from two sources, later entries overriding
//! earlier ones:
//!
//! 1. A YAML file (default `config.yaml`, override with `--config` or
//!    `CONVERTD_CONFIG`)
//! 2. Environment variables prefixed with `CONVERTD_`, using `__` to
//!    separate nested sections
//!
//! # Environment examples
//!
//! ```bash
//! CONVERTD_PORT=8080
//! CONVERTD_MAX_UPLOAD_BYTES=10485760
//! CONVERTD_ENGINE__TYPE=wasm
//! CONVERTD_ENGINE__MODULE_PATH=/opt/convertd/vendor/engine.wasm
//! CONVERTD_ENGINE__LICENSE__KEY=...
//! CONVERTD_ENGINE__LICENSE__APP_NAME=acme-docs
//! CONVERTD_DELIVERY__MODE=store
//! CONVERTD_DELIVERY__BACKEND__TYPE=s3
//! CONVERTD_DELIVERY__BACKEND__BUCKET=converted-artifacts
//! ```
//!
//! # Structure
//!
//! - [`Config`]: listen address, upload limit, CORS, telemetry switches
//! - [`EngineConfig`]: which conversion engine backs the service
//! - [`DeliveryConfig`] / [`StoreBackend`]: how converted PDFs reach the
//!   caller

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Deserializer};
use url::Url;

#[derive(Parser, Debug)]
#[command(version, about = "Document to PDF conversion service")]
pub struct Args {
    /// Path to the configuration file
    #[arg(short = 'f', long, env = "CONVERTD_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate the configuration and exit without starting the server
    #[arg(long)]
    pub validate: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address the HTTP server binds to
    pub host: String,
    /// Port the HTTP server listens on
    pub port: u16,
    /// Upper bound for one uploaded document, in bytes
    pub max_upload_bytes: u64,
    /// Cross-origin policy for browser callers
    pub cors: CorsConfig,
    /// Export spans to an OTLP collector in addition to local logs
    pub enable_otel_export: bool,
    /// Conversion engine backing the service
    pub engine: EngineConfig,
    /// How converted PDFs are returned to callers
    pub delivery: DeliveryConfig,
}

impl Config {
    /// Load configuration from the file named by `args`, apply environment
    /// overrides, and validate the result.
    pub fn load(args: &Args) -> Result<Config, figment::Error> {
        let config: Config = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            // CONVERTD_CONFIG names the file itself and is not a field.
            .merge(Env::prefixed("CONVERTD_").ignore(&["config"]).split("__"))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_upload_bytes == 0 {
            anyhow::bail!("max_upload_bytes must be greater than zero");
        }

        if let EngineConfig::Wasm {
            module_path,
            export_timeout,
            ..
        } = &self.engine
        {
            if module_path.as_os_str().is_empty() {
                anyhow::bail!("engine.module_path must not be empty");
            }
            if export_timeout.is_zero() {
                anyhow::bail!("engine.export_timeout must be greater than zero");
            }
        }

        let has_wildcard = self.cors.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard));
        if self.cors.allow_credentials && has_wildcard {
            anyhow::bail!("cors.allow_credentials cannot be combined with the wildcard origin");
        }
        for origin in &self.cors.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                if !matches!(url.scheme(), "http" | "https") {
                    anyhow::bail!("cors.allowed_origins entries must be http(s) URLs, got `{url}`");
                }
            }
        }

        if let DeliveryConfig::Store { backend } = &self.delivery {
            match backend {
                StoreBackend::S3(s3) => {
                    if s3.bucket.is_empty() {
                        anyhow::bail!("delivery.backend.bucket must not be empty");
                    }
                    if s3.region.is_empty() {
                        anyhow::bail!("delivery.backend.region must not be empty");
                    }
                    if s3.access_key_id.is_some() != s3.secret_access_key.is_some() {
                        anyhow::bail!("delivery.backend.access_key_id and secret_access_key must be set together");
                    }
                }
                StoreBackend::Local(local) => {
                    if local.root.as_os_str().is_empty() {
                        anyhow::bail!("delivery.backend.root must not be empty");
                    }
                }
            }
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_upload_bytes: 50 * 1024 * 1024,
            cors: CorsConfig::default(),
            enable_otel_export: false,
            engine: EngineConfig::default(),
            delivery: DeliveryConfig::Direct,
        }
    }
}

/// Which engine performs the actual conversion.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EngineConfig {
    /// The vendor WebAssembly module
    Wasm {
        /// Filesystem path of the vendor module, provisioned alongside the
        /// binary
        module_path: PathBuf,
        /// License pair forwarded to the engine; absent runs the engine in
        /// evaluation mode
        #[serde(default)]
        license: Option<LicenseConfig>,
        /// Budget for a single export call
        #[serde(with = "humantime_serde", default = "default_export_timeout")]
        export_timeout: Duration,
    },
    /// Deterministic built-in engine for development and smoke tests
    Stub,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::Wasm {
            module_path: PathBuf::from("vendor/engine.wasm"),
            license: None,
            export_timeout: default_export_timeout(),
        }
    }
}

fn default_export_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Vendor license credentials. Opaque secrets; the engine decides what they
/// mean.
#[derive(Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LicenseConfig {
    pub key: String,
    pub app_name: String,
}

impl fmt::Debug for LicenseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LicenseConfig")
            .field("key", &"<redacted>")
            .field("app_name", &self.app_name)
            .finish()
    }
}

/// Delivery mode for converted PDFs.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DeliveryConfig {
    /// Stream the PDF back in the response body
    Direct,
    /// Upload to an object store and answer with a reference
    Store { backend: StoreBackend },
}

/// Object store backing store-based delivery.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreBackend {
    S3(S3StoreConfig),
    Local(LocalStoreConfig),
}

/// S3-compatible object store settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct S3StoreConfig {
    /// Target bucket; must already exist
    pub bucket: String,
    /// AWS region, also used to build the default public URL
    pub region: String,
    /// Prefix prepended to every artifact key
    #[serde(default)]
    pub key_prefix: Option<String>,
    /// Custom endpoint for S3-compatible stores (MinIO, Ceph RGW)
    #[serde(default)]
    pub endpoint_url: Option<Url>,
    /// Path-style addressing, required by most S3-compatible stores
    #[serde(default)]
    pub force_path_style: bool,
    /// Static credentials; both or neither. When absent the ambient AWS
    /// credential chain is used
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Overrides the URL reported to clients, e.g. a CDN in front of the
    /// bucket
    #[serde(default)]
    pub public_base_url: Option<Url>,
}

/// Filesystem-backed store for development and tests.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LocalStoreConfig {
    /// Directory that receives the artifacts
    pub root: PathBuf,
    /// URL prefix reported back to clients for files under `root`
    pub base_url: Url,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Origins allowed to call the API; `"*"` allows any
    pub allowed_origins: Vec<CorsOrigin>,
    /// Send `Access-Control-Allow-Credentials`; incompatible with the
    /// wildcard origin
    pub allow_credentials: bool,
    /// Cache lifetime for preflight responses, in seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            allow_credentials: false,
            max_age: None,
        }
    }
}

/// One allowed origin: either the wildcard `"*"` or a concrete URL.
#[derive(Debug, Clone, PartialEq)]
pub enum CorsOrigin {
    Wildcard,
    Url(Url),
}

impl CorsOrigin {
    /// Origin in header form, without the trailing slash `Url` display adds.
    pub fn as_origin_string(&self) -> String {
        match self {
            CorsOrigin::Wildcard => "*".to_string(),
            CorsOrigin::Url(url) => url.origin().ascii_serialization(),
        }
    }
}

impl<'de> Deserialize<'de> for CorsOrigin {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if raw == "*" {
            return Ok(CorsOrigin::Wildcard);
        }
        Url::parse(&raw)
            .map(CorsOrigin::Url)
            .map_err(|e| serde::de::Error::custom(format!("invalid CORS origin `{raw}`: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn test_args(path: &str) -> Args {
        Args {
            config: path.to_string(),
            validate: false,
        }
    }

    #[test]
    fn test_defaults_without_file_or_env() {
        Jail::expect_with(|_jail| {
            let config = Config::load(&test_args("missing.yaml"))?;
            assert_eq!(config.host, "0.0.0.0");
            assert_eq!(config.port, 3000);
            assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
            assert!(!config.enable_otel_export);
            assert_eq!(config.delivery, DeliveryConfig::Direct);
            assert_eq!(config.cors.allowed_origins, vec![CorsOrigin::Wildcard]);
            match config.engine {
                EngineConfig::Wasm {
                    module_path,
                    license,
                    export_timeout,
                } => {
                    assert_eq!(module_path, PathBuf::from("vendor/engine.wasm"));
                    assert!(license.is_none());
                    assert_eq!(export_timeout, Duration::from_secs(30));
                }
                other => panic!("unexpected default engine: {other:?}"),
            }
            Ok(())
        });
    }

    #[test]
    fn test_yaml_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
                host: "127.0.0.1"
                port: 8080
                max_upload_bytes: 10485760
                engine:
                  type: wasm
                  module_path: /opt/convertd/vendor/engine.wasm
                  license:
                    key: secret-key
                    app_name: acme-docs
                  export_timeout: 45s
                delivery:
                  mode: store
                  backend:
                    type: s3
                    bucket: converted-artifacts
                    region: eu-central-1
                    endpoint_url: "http://127.0.0.1:9000"
                    force_path_style: true
                    access_key_id: minio
                    secret_access_key: miniosecret
                    public_base_url: "https://cdn.example.com/artifacts/"
                "#,
            )?;

            let config = Config::load(&test_args("test.yaml"))?;
            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.port, 8080);
            assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);

            match &config.engine {
                EngineConfig::Wasm {
                    module_path,
                    license,
                    export_timeout,
                } => {
                    assert_eq!(module_path, &PathBuf::from("/opt/convertd/vendor/engine.wasm"));
                    let license = license.as_ref().expect("license should be set");
                    assert_eq!(license.key, "secret-key");
                    assert_eq!(license.app_name, "acme-docs");
                    assert_eq!(*export_timeout, Duration::from_secs(45));
                }
                other => panic!("unexpected engine: {other:?}"),
            }

            match &config.delivery {
                DeliveryConfig::Store {
                    backend: StoreBackend::S3(s3),
                } => {
                    assert_eq!(s3.bucket, "converted-artifacts");
                    assert_eq!(s3.region, "eu-central-1");
                    assert!(s3.force_path_style);
                    assert_eq!(s3.access_key_id.as_deref(), Some("minio"));
                    assert_eq!(
                        s3.public_base_url.as_ref().map(Url::as_str),
                        Some("https://cdn.example.com/artifacts/")
                    );
                }
                other => panic!("unexpected delivery: {other:?}"),
            }
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "port: 8080\n")?;
            jail.set_env("CONVERTD_PORT", "9090");
            jail.set_env("CONVERTD_ENGINE__TYPE", "stub");

            let config = Config::load(&test_args("test.yaml"))?;
            assert_eq!(config.port, 9090);
            assert_eq!(config.engine, EngineConfig::Stub);
            Ok(())
        });
    }

    #[test]
    fn test_local_store_backend_parses() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
                delivery:
                  mode: store
                  backend:
                    type: local
                    root: /var/lib/convertd/artifacts
                    base_url: "http://localhost:3000/artifacts/"
                "#,
            )?;

            let config = Config::load(&test_args("test.yaml"))?;
            match &config.delivery {
                DeliveryConfig::Store {
                    backend: StoreBackend::Local(local),
                } => {
                    assert_eq!(local.root, PathBuf::from("/var/lib/convertd/artifacts"));
                    assert_eq!(local.base_url.as_str(), "http://localhost:3000/artifacts/");
                }
                other => panic!("unexpected delivery: {other:?}"),
            }
            Ok(())
        });
    }

    #[test]
    fn test_empty_bucket_fails_validation() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
                delivery:
                  mode: store
                  backend:
                    type: s3
                    bucket: ""
                    region: us-east-1
                "#,
            )?;

            let err = Config::load(&test_args("test.yaml")).expect_err("empty bucket should be rejected");
            assert!(err.to_string().contains("bucket"), "unexpected error: {err}");
            Ok(())
        });
    }

    #[test]
    fn test_lone_access_key_fails_validation() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
                delivery:
                  mode: store
                  backend:
                    type: s3
                    bucket: artifacts
                    region: us-east-1
                    access_key_id: minio
                "#,
            )?;

            let err = Config::load(&test_args("test.yaml")).expect_err("lone access key should be rejected");
            assert!(err.to_string().contains("secret_access_key"), "unexpected error: {err}");
            Ok(())
        });
    }

    #[test]
    fn test_wildcard_with_credentials_fails_validation() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
                cors:
                  allowed_origins: ["*"]
                  allow_credentials: true
                "#,
            )?;

            let err = Config::load(&test_args("test.yaml")).expect_err("wildcard with credentials should be rejected");
            assert!(err.to_string().contains("allow_credentials"), "unexpected error: {err}");
            Ok(())
        });
    }

    #[test]
    fn test_cors_origins_parse_and_normalize() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
                cors:
                  allowed_origins: ["*", "https://app.example.com"]
                "#,
            )?;

            let config = Config::load(&test_args("test.yaml"))?;
            assert_eq!(config.cors.allowed_origins.len(), 2);
            assert_eq!(config.cors.allowed_origins[0].as_origin_string(), "*");
            assert_eq!(config.cors.allowed_origins[1].as_origin_string(), "https://app.example.com");
            Ok(())
        });
    }

    #[test]
    fn test_zero_export_timeout_fails_validation() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
                engine:
                  type: wasm
                  module_path: vendor/engine.wasm
                  export_timeout: 0s
                "#,
            )?;

            let err = Config::load(&test_args("test.yaml")).expect_err("zero timeout should be rejected");
            assert!(err.to_string().contains("export_timeout"), "unexpected error: {err}");
            Ok(())
        });
    }

    #[test]
    fn test_unknown_top_level_field_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "listen_port: 3000\n")?;
            let err = Config::load(&test_args("test.yaml")).expect_err("unknown field should be rejected");
            assert!(err.to_string().contains("listen_port"), "unexpected error: {err}");
            Ok(())
        });
    }
}

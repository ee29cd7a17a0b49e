use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub package: PackageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

/// Storage backend selection; one backend per process, chosen at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    #[serde(default)]
    pub s3: S3StorageConfig,
    #[serde(default)]
    pub local: LocalStorageConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct S3StorageConfig {
    #[serde(default)]
    pub bucket: String,
    #[serde(default = "default_s3_region")]
    pub region: String,
    /// Custom endpoint for MinIO / LocalStack style deployments
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalStorageConfig {
    #[serde(default = "default_local_path")]
    pub base_path: String,
    /// Base URL the signed blob URLs are rooted at
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    #[serde(default)]
    pub url_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_max_upload_size")]
    pub max_size_bytes: u64,
    #[serde(default = "default_upload_url_ttl")]
    pub url_ttl_secs: u64,
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
    #[serde(default = "default_max_filename_len")]
    pub max_filename_len: usize,
    #[serde(default = "default_part_size")]
    pub part_size_bytes: u64,
    /// Age below which a pending row with no bytes is not yet drift
    #[serde(default = "default_pending_grace")]
    pub pending_grace_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_secs: u64,
    #[serde(default = "default_bulk_timeout")]
    pub bulk_timeout_secs: u64,
    #[serde(default = "default_dispatch_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackageConfig {
    #[serde(default = "default_package_max_photos")]
    pub max_photos: usize,
    #[serde(default = "default_package_url_ttl")]
    pub url_ttl_secs: u64,
    #[serde(default = "default_package_retention_days")]
    pub retention_days: i64,
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    1840
}

fn default_db_path() -> String {
    "data/photostash.db".to_string()
}

fn default_storage_backend() -> String {
    "local".to_string()
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_local_path() -> String {
    "data/objects".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:1840".to_string()
}

fn default_max_upload_size() -> u64 {
    500 * 1024 * 1024 // 500MB covers full-resolution camera originals
}

fn default_upload_url_ttl() -> u64 {
    900
}

fn default_allowed_types() -> Vec<String> {
    [
        "image/jpeg",
        "image/png",
        "image/webp",
        "image/tiff",
        "image/heic",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_filename_len() -> usize {
    255
}

fn default_part_size() -> u64 {
    16 * 1024 * 1024
}

fn default_pending_grace() -> i64 {
    3600
}

fn default_worker_endpoint() -> String {
    "http://localhost:1841".to_string()
}

fn default_dispatch_timeout() -> u64 {
    30
}

fn default_bulk_timeout() -> u64 {
    300
}

fn default_dispatch_concurrency() -> usize {
    4
}

fn default_max_batch_size() -> usize {
    500
}

fn default_package_max_photos() -> usize {
    200
}

fn default_package_url_ttl() -> u64 {
    3600
}

fn default_package_retention_days() -> i64 {
    7
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            s3: S3StorageConfig::default(),
            local: LocalStorageConfig::default(),
        }
    }
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_local_path(),
            public_base_url: default_public_base_url(),
            url_secret: String::new(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: default_max_upload_size(),
            url_ttl_secs: default_upload_url_ttl(),
            allowed_types: default_allowed_types(),
            max_filename_len: default_max_filename_len(),
            part_size_bytes: default_part_size(),
            pending_grace_secs: default_pending_grace(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_worker_endpoint(),
            dispatch_timeout_secs: default_dispatch_timeout(),
            bulk_timeout_secs: default_bulk_timeout(),
            concurrency: default_dispatch_concurrency(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            max_photos: default_package_max_photos(),
            url_ttl_secs: default_package_url_ttl(),
            retention_days: default_package_retention_days(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            upload: UploadConfig::default(),
            worker: WorkerConfig::default(),
            package: PackageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides();
        config.ensure_directories()?;
        config.ensure_url_secret()?;
        Ok(config)
    }

    /// Load configuration from config.toml
    fn load_from_file() -> anyhow::Result<Self> {
        let config_paths = ["config.toml", "data/config.toml"];

        for path in config_paths {
            if Path::new(path).exists() {
                let content = fs::read_to_string(path)?;
                let config: Config = toml::from_str(&content)?;
                tracing::info!("Loaded configuration from {}", path);
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    /// Apply environment variable overrides
    /// Format: PS_CONF_<SECTION>_<KEY>
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("PS_CONF_SERVER_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = env::var("PS_CONF_SERVER_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }

        if let Ok(val) = env::var("PS_CONF_DATABASE_PATH") {
            self.database.path = val;
        }

        if let Ok(val) = env::var("PS_CONF_STORAGE_BACKEND") {
            self.storage.backend = val;
        }
        if let Ok(val) = env::var("PS_CONF_STORAGE_S3_BUCKET") {
            self.storage.s3.bucket = val;
        }
        if let Ok(val) = env::var("PS_CONF_STORAGE_S3_REGION") {
            self.storage.s3.region = val;
        }
        if let Ok(val) = env::var("PS_CONF_STORAGE_S3_ENDPOINT") {
            if !val.trim().is_empty() {
                self.storage.s3.endpoint_url = Some(val);
            }
        }
        if let Ok(val) = env::var("PS_CONF_STORAGE_S3_FORCE_PATH_STYLE") {
            if let Ok(v) = val.parse() {
                self.storage.s3.force_path_style = v;
            }
        }
        if let Ok(val) = env::var("PS_CONF_STORAGE_LOCAL_PATH") {
            self.storage.local.base_path = val;
        }
        if let Ok(val) = env::var("PS_CONF_STORAGE_LOCAL_URL_SECRET") {
            self.storage.local.url_secret = val;
        }

        if let Ok(val) = env::var("PS_CONF_UPLOAD_MAX_SIZE") {
            if let Ok(v) = val.parse() {
                self.upload.max_size_bytes = v;
            }
        }
        if let Ok(val) = env::var("PS_CONF_UPLOAD_URL_TTL") {
            if let Ok(v) = val.parse() {
                self.upload.url_ttl_secs = v;
            }
        }

        if let Ok(val) = env::var("PS_CONF_WORKER_ENDPOINT") {
            self.worker.endpoint = val;
        }
        if let Ok(val) = env::var("PS_CONF_WORKER_DISPATCH_TIMEOUT") {
            if let Ok(v) = val.parse() {
                self.worker.dispatch_timeout_secs = v;
            }
        }
        if let Ok(val) = env::var("PS_CONF_WORKER_CONCURRENCY") {
            if let Ok(v) = val.parse() {
                self.worker.concurrency = v;
            }
        }
        if let Ok(val) = env::var("PS_CONF_WORKER_MAX_BATCH") {
            if let Ok(v) = val.parse() {
                self.worker.max_batch_size = v;
            }
        }

        if let Ok(val) = env::var("PS_CONF_PACKAGE_MAX_PHOTOS") {
            if let Ok(v) = val.parse() {
                self.package.max_photos = v;
            }
        }
    }

    /// Ensure the blob URL signing secret exists and is persisted
    fn ensure_url_secret(&mut self) -> anyhow::Result<()> {
        if self.storage.local.url_secret.is_empty() {
            let secret_path = Path::new("data/.url_secret");

            if secret_path.exists() {
                let secret = fs::read_to_string(secret_path)?;
                self.storage.local.url_secret = secret.trim().to_string();
                tracing::info!("Loaded persisted URL secret from data/.url_secret");
            } else {
                let secret = uuid::Uuid::new_v4().to_string();

                if let Some(parent) = secret_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                fs::write(secret_path, &secret)?;
                self.storage.local.url_secret = secret;
                tracing::info!("Generated and persisted new URL secret to data/.url_secret");
            }
        }
        Ok(())
    }

    /// Ensure required directories exist
    fn ensure_directories(&self) -> anyhow::Result<()> {
        if let Some(parent) = Path::new(&self.database.path).parent() {
            fs::create_dir_all(parent)?;
        }

        if self.storage.backend == "local" {
            fs::create_dir_all(&self.storage.local.base_path)?;
        }

        Ok(())
    }
}

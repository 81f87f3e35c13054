use std::env;

/// Which object store backend the process writes uploads to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    S3,
}

impl StorageBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "local" | "fs" | "filesystem" => Some(Self::Local),
            "s3" | "minio" | "remote" => Some(Self::S3),
            _ => None,
        }
    }
}

/// Runtime configuration for the hosting service
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// External base URL used to build delivery links (default: "http://localhost:3000")
    pub public_base_url: String,

    /// Name advertised as oEmbed provider and og:site_name
    pub site_name: String,

    /// Storage backend selected at start-up (default: local)
    pub storage_backend: StorageBackend,

    /// Root directory for the local backend (default: "./uploads")
    pub local_storage_path: String,

    /// Base URL the local root is exposed under (default: "{public_base_url}/raw")
    pub local_storage_base_url: String,

    /// S3 / MinIO connection settings
    pub s3_endpoint: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: String,
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,
    /// Public base URL for objects in the bucket (CDN or bucket URL)
    pub s3_public_url: Option<String>,

    /// Default single-file limit for new accounts in bytes (default: 100 MB)
    pub default_max_file_size: i64,

    /// Default cumulative storage limit for new accounts (default: unlimited)
    pub default_max_storage: Option<i64>,

    /// Whether newly seen accounts may upload without manual approval
    pub auto_approve_users: bool,

    /// Length of random short codes (default: 6)
    pub code_length: usize,

    /// Embed theme colour used when the owner has none configured
    pub default_embed_color: String,

    /// JWT secret for verifying bearer tokens
    pub jwt_secret: String,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:3000".to_string(),
            site_name: "rust-file-host".to_string(),
            storage_backend: StorageBackend::Local,
            local_storage_path: "./uploads".to_string(),
            local_storage_base_url: "http://localhost:3000/raw".to_string(),
            s3_endpoint: None,
            s3_bucket: None,
            s3_region: "us-east-1".to_string(),
            s3_access_key: None,
            s3_secret_key: None,
            s3_public_url: None,
            default_max_file_size: 100 * 1024 * 1024, // 100 MB
            default_max_storage: None,
            auto_approve_users: true,
            code_length: 6,
            default_embed_color: "#5865f2".to_string(),
            jwt_secret: "secret".to_string(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        let public_base_url = env::var("PUBLIC_BASE_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or(default.public_base_url);

        Self {
            local_storage_base_url: env::var("LOCAL_STORAGE_BASE_URL")
                .unwrap_or_else(|_| format!("{}/raw", public_base_url)),
            public_base_url,

            site_name: env::var("SITE_NAME").unwrap_or(default.site_name),

            storage_backend: env::var("STORAGE_BACKEND")
                .ok()
                .and_then(|v| StorageBackend::parse(&v))
                .unwrap_or(default.storage_backend),

            local_storage_path: env::var("LOCAL_STORAGE_PATH")
                .unwrap_or(default.local_storage_path),

            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION").unwrap_or(default.s3_region),
            s3_access_key: env::var("S3_ACCESS_KEY").ok(),
            s3_secret_key: env::var("S3_SECRET_KEY").ok(),
            s3_public_url: env::var("S3_PUBLIC_URL").ok(),

            default_max_file_size: env::var("DEFAULT_MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.default_max_file_size),

            default_max_storage: env::var("DEFAULT_MAX_STORAGE")
                .ok()
                .and_then(|v| v.parse().ok()),

            auto_approve_users: env::var("AUTO_APPROVE_USERS")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(default.auto_approve_users),

            code_length: env::var("CODE_LENGTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|len: &usize| *len > 0)
                .unwrap_or(default.code_length),

            default_embed_color: env::var("DEFAULT_EMBED_COLOR")
                .unwrap_or(default.default_embed_color),

            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| "secret".to_string()),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.allowed_origins),
        }
    }

    /// Create config for development (local storage, relaxed limits)
    pub fn development() -> Self {
        Self {
            default_max_file_size: 512 * 1024 * 1024,
            auto_approve_users: true,
            ..Self::default()
        }
    }

    /// Create config for production (strict security)
    pub fn production() -> anyhow::Result<Self> {
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("CRITICAL: JWT_SECRET must be set"))?;

        Ok(Self {
            auto_approve_users: env::var("AUTO_APPROVE_USERS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),
            jwt_secret,
            ..Self::from_env()
        })
    }

    /// Pick the profile named by `APP_ENV` (default: environment driven)
    pub fn load() -> anyhow::Result<Self> {
        match env::var("APP_ENV").as_deref() {
            Ok("production") => Self::production(),
            Ok("development") => Ok(Self::development()),
            _ => Ok(Self::from_env()),
        }
    }

    /// Canonical delivery URL for a short code
    pub fn delivery_url(&self, code: &str) -> String {
        format!("{}/f/{}", self.public_base_url, code)
    }

    /// Delivery URL of the thumbnail variant
    pub fn thumbnail_url(&self, code: &str) -> String {
        format!("{}/f/thumb_{}", self.public_base_url, code)
    }

    pub fn delete_url(&self, upload_id: &str) -> String {
        format!("{}/files/{}", self.public_base_url, upload_id)
    }

    pub fn short_link_url(&self, code: &str) -> String {
        format!("{}/s/{}", self.public_base_url, code)
    }
}

//! Application configuration constants
//!
//! Central location for all configuration constants, resource limits,
//! and validation boundaries used throughout the application, plus the
//! runtime configuration assembled by the binary.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ===== Note Limits =====

/// Maximum length of an access code
pub const MAX_CODE_LENGTH: usize = 500;

/// Maximum length of note content in characters
pub const MAX_CONTENT_LENGTH: usize = 50_000;

/// Minimum PIN length, enforced before anything is encrypted or stored
pub const MIN_PIN_LENGTH: usize = 4;

/// Maximum PIN length (the encrypted form must fit the pin column)
pub const MAX_PIN_LENGTH: usize = 128;

// ===== Upload Limits =====

/// Maximum upload size in bytes (50 MB)
pub const MAX_FILE_SIZE_BYTES: u64 = 50 * 1024 * 1024;

/// Maximum stored length of an original file name
pub const MAX_FILE_NAME_LENGTH: usize = 255;

/// Remote upload timeout (5 minutes, large videos are slow)
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 300;

// ===== Storage Layout =====

/// Root folder for every object this service stores remotely
pub const STORAGE_FOLDER_PREFIX: &str = "codesafe";

/// Base URL of the object storage upload API
pub const DEFAULT_CLOUD_API_BASE: &str = "https://api.cloudinary.com/v1_1";

// ===== Sessions =====

/// Cookie carrying the session id
pub const SESSION_COOKIE_NAME: &str = "codesafe_session";

/// Idle timeout after which a session and its PIN verifications are dropped
pub const DEFAULT_SESSION_IDLE_MINUTES: u64 = 30;

/// Length of generated session tokens
pub const SESSION_TOKEN_LENGTH: usize = 32;

/// Credentials for the remote object storage account
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CloudStorageSettings {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl CloudStorageSettings {
    /// All three values are required
    pub fn is_valid(&self) -> bool {
        !self.cloud_name.trim().is_empty()
            && !self.api_key.trim().is_empty()
            && !self.api_secret.trim().is_empty()
    }

    /// First characters of the API key, safe for logs
    pub fn api_key_prefix(&self) -> String {
        if self.api_key.is_empty() {
            return "empty".to_string();
        }
        self.api_key.chars().take(5).collect()
    }
}

/// Runtime configuration for the server
#[derive(Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Holds the SQLite database and, for local storage, uploaded files
    pub data_dir: PathBuf,
    /// Externally visible base URL, used to build file URLs
    pub public_url: String,
    /// Secret the PIN encryption key is derived from
    pub pin_secret: String,
    pub cloud: CloudStorageSettings,
    pub cloud_api_base: String,
    pub upload_timeout: Duration,
    pub session_idle_timeout: Duration,
    pub max_upload_size: u64,
}

impl ServerConfig {
    /// Configuration with defaults for everything but the data directory and secret
    pub fn new(data_dir: PathBuf, pin_secret: impl Into<String>) -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
            data_dir,
            public_url: "http://localhost:8080".to_string(),
            pin_secret: pin_secret.into(),
            cloud: CloudStorageSettings::default(),
            cloud_api_base: DEFAULT_CLOUD_API_BASE.to_string(),
            upload_timeout: Duration::from_secs(DEFAULT_UPLOAD_TIMEOUT_SECS),
            session_idle_timeout: Duration::from_secs(DEFAULT_SESSION_IDLE_MINUTES * 60),
            max_upload_size: MAX_FILE_SIZE_BYTES,
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("codesafe.db")
    }

    /// Root of the local object store
    pub fn files_dir(&self) -> PathBuf {
        self.data_dir.join("files")
    }

    pub fn secure_cookies(&self) -> bool {
        self.public_url.starts_with("https://")
    }
}

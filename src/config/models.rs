use crate::humanize::{ByteSize, HumanDuration};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub limits: UploadLimits,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Prefix for every public path handed out in responses.
    /// Empty means paths stay relative (`/uploads/...`).
    #[serde(default)]
    pub public_base_url: String,
    /// Origins allowed for browser calls. Empty allows any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            public_base_url: String::new(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}

/// Where uploads, artifacts and the expiry ledger live
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            ledger_path: default_ledger_path(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/retention")
}

/// Request limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadLimits {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: ByteSize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_max_upload_bytes() -> ByteSize {
    ByteSize::mib(10)
}

/// Retention window for uploads and their artifacts
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Delay between a successful response and deletion of every file it references
    #[serde(default = "default_retention_delay")]
    pub delay: HumanDuration,
    /// How often the expiry ledger is swept for overdue batches
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: HumanDuration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            delay: default_retention_delay(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

fn default_retention_delay() -> HumanDuration {
    HumanDuration::from_secs(60 * 60)
}

fn default_sweep_interval() -> HumanDuration {
    HumanDuration::from_secs(5 * 60)
}

/// Encoder tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversionConfig {
    #[serde(default = "default_encode_timeout")]
    pub encode_timeout: HumanDuration,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_avif_quality")]
    pub avif_quality: u8,
    /// rav1e speed preset, 1 (slowest) to 10 (fastest)
    #[serde(default = "default_avif_speed")]
    pub avif_speed: u8,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            encode_timeout: default_encode_timeout(),
            jpeg_quality: default_jpeg_quality(),
            avif_quality: default_avif_quality(),
            avif_speed: default_avif_speed(),
        }
    }
}

fn default_encode_timeout() -> HumanDuration {
    HumanDuration::from_secs(30)
}

fn default_jpeg_quality() -> u8 {
    80
}

fn default_avif_quality() -> u8 {
    70
}

fn default_avif_speed() -> u8 {
    6
}

//! Server configuration
//!
//! Loaded from one or more files (or directories of files) merged in order,
//! then overridden by `DIAGNOSE_`-prefixed environment variables.

use std::fs;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File, FileFormat, Map};
use serde::{Deserialize, Serialize};

/// Extensions picked up when a directory is given as a config source
const CONFIG_EXTENSIONS: &[&str] = &["toml", "json", "yaml", "yml"];

/// Storage backend stanza
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Plain files under a directory
    File { path: PathBuf },
    /// Volatile in-process storage
    Inmem,
    /// Integrated storage kept under a local data directory
    Raft {
        path: PathBuf,
        #[serde(default)]
        node_id: Option<String>,
    },
}

impl StorageConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            StorageConfig::File { .. } => "file",
            StorageConfig::Inmem => "inmem",
            StorageConfig::Raft { .. } => "raft",
        }
    }
}

/// Seal stanza; the shamir seal is used when none is configured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SealConfig {
    Shamir,
    /// Fixed 256-bit key read from a hex-encoded file
    #[serde(rename = "static")]
    StaticKey { key_file: PathBuf },
}

/// Service registration stanza
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRegistrationConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub address: Option<String>,
}

/// Listener stanza
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerConfig {
    #[serde(rename = "type", default = "default_listener_kind")]
    pub kind: String,
    #[serde(default = "default_listener_address")]
    pub address: String,
    #[serde(default)]
    pub tls_disable: bool,
    #[serde(default)]
    pub tls_cert_file: Option<PathBuf>,
    #[serde(default)]
    pub tls_key_file: Option<PathBuf>,
    #[serde(default)]
    pub tls_require_and_verify_client_cert: bool,
}

fn default_listener_kind() -> String {
    "tcp".to_string()
}

fn default_listener_address() -> String {
    "127.0.0.1:8200".to_string()
}

/// Configuration of the server being diagnosed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub storage: Option<StorageConfig>,
    #[serde(default)]
    pub ha_storage: Option<StorageConfig>,
    #[serde(default)]
    pub seal: Option<SealConfig>,
    #[serde(default)]
    pub service_registration: Option<ServiceRegistrationConfig>,
    #[serde(default, rename = "listener")]
    pub listeners: Vec<ListenerConfig>,
    /// Address advertised to clients for redirection
    #[serde(default)]
    pub api_addr: Option<String>,
    /// Address advertised to other cluster members
    #[serde(default)]
    pub cluster_addr: Option<String>,
    #[serde(default)]
    pub disable_clustering: bool,
}

impl ServerConfig {
    /// Loads and merges configuration from `paths`
    ///
    /// Sources are applied in the following order:
    /// 1. Each path in turn; a directory contributes its config files sorted by name
    /// 2. Environment variables with prefix DIAGNOSE_ (e.g., DIAGNOSE_API_ADDR)
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self, ConfigError> {
        Self::load_with_env(paths, None)
    }

    /// Like [`ServerConfig::load`], reading variables from `env` instead of
    /// the process environment when given
    fn load_with_env<P: AsRef<Path>>(
        paths: &[P],
        env: Option<Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        for path in paths {
            for file in expand_source(path.as_ref())? {
                builder = builder.add_source(File::from(file.as_path()).required(true));
            }
        }

        // Use __ as separator for nested fields (e.g., DIAGNOSE_STORAGE__PATH)
        builder = builder.add_source(
            Environment::with_prefix("DIAGNOSE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        builder.build()?.try_deserialize()
    }

    /// Parses configuration from a TOML document
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

fn expand_source(path: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files: Vec<PathBuf> = fs::read_dir(path)
        .map_err(|e| ConfigError::Foreign(Box::new(e)))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| CONFIG_EXTENSIONS.contains(&ext))
        })
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(ConfigError::Message(format!(
            "no configuration files found in {}",
            path.display()
        )));
    }
    Ok(files)
}

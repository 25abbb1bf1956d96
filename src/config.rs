use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub search: SearchConfig,
    #[serde(default)]
    pub batching: BatchingConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
}

/// Connection settings for the Azure Search service.
#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// Service endpoint, e.g. `https://myservice.search.windows.net`.
    #[serde(default)]
    pub endpoint: String,
    /// Name of the index to synchronize and query.
    #[serde(default = "default_index")]
    pub index: String,
    /// Admin/query key sent in the `api-key` header.
    #[serde(default)]
    pub api_key: String,
    /// REST API version appended to every request URL.
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_index() -> String {
    "content".to_string()
}
fn default_api_version() -> String {
    "2016-09-01".to_string()
}

/// Limits for the batch upload engine. The service rejects oversized
/// requests, so both a byte and a document bound are enforced.
#[derive(Debug, Deserialize, Clone)]
pub struct BatchingConfig {
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
    #[serde(default = "default_max_payload_docs")]
    pub max_payload_docs: usize,
    /// Page size used when reading back indexed file records.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
            max_payload_docs: default_max_payload_docs(),
            page_size: default_page_size(),
        }
    }
}

fn default_max_payload_bytes() -> usize {
    15_000_000
}
fn default_max_payload_docs() -> usize {
    990
}
fn default_page_size() -> usize {
    500
}

/// File indexing settings. Non-text file content is sent to an Apache Tika
/// server for text extraction before indexing.
#[derive(Debug, Deserialize, Clone)]
pub struct FilesConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_tika_hostname")]
    pub tika_hostname: String,
    #[serde(default = "default_tika_port")]
    pub tika_port: u16,
    /// Files larger than this are never sent for extraction.
    #[serde(default = "default_tika_send_bytes")]
    pub tika_send_bytes: u64,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tika_hostname: default_tika_hostname(),
            tika_port: default_tika_port(),
            tika_send_bytes: default_tika_send_bytes(),
        }
    }
}

fn default_tika_hostname() -> String {
    "http://127.0.0.1".to_string()
}
fn default_tika_port() -> u16 {
    9998
}
fn default_tika_send_bytes() -> u64 {
    512_000_000
}

/// Outbound proxy settings applied to the HTTP transport.
#[derive(Debug, Deserialize, Clone)]
pub struct ProxyConfig {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Comma-separated list of hosts to bypass the proxy for.
    #[serde(default)]
    pub bypass: Option<String>,
}

impl FilesConfig {
    /// Base URL of the Tika server, without the `/tika/form` path.
    pub fn tika_base_url(&self) -> String {
        format!(
            "{}:{}",
            self.tika_hostname.trim_end_matches('/'),
            self.tika_port
        )
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.batching.max_payload_bytes == 0 {
        anyhow::bail!("batching.max_payload_bytes must be > 0");
    }
    if config.batching.max_payload_docs == 0 {
        anyhow::bail!("batching.max_payload_docs must be > 0");
    }
    if config.batching.page_size == 0 {
        anyhow::bail!("batching.page_size must be > 0");
    }

    Ok(config)
}

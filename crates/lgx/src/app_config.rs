//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Deserializer};
// 🚀 tracing::info — because println! in production is a cry for help.
use tracing::info;

use crate::query::ChunkCommand;
use crate::retriever::ChunkingMethod;

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 📡 How do we reach the cluster, and how politely do we ask?
    pub search: SearchConfig,
    /// 📤 What to pull out, and where to put it.
    #[serde(default)]
    pub export: ExportConfig,
}

/// 📡 Everything the gateway and the retriever need to know about the remote cluster.
///
/// Threaded explicitly into [`crate::client::SearchClient`] and
/// [`crate::retriever::MultiChunkResultRetriever`]. No globals were harmed.
#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// 📡 The URL of your cluster. Include scheme + port. Yes, all of it.
    pub url: String,
    /// 🔒 Username for basic auth. Optional, like flossing.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// 🔒 API key auth. Wins over basic auth when both are set. This is not a democracy.
    #[serde(default)]
    pub api_key: Option<String>,
    /// 🖍️ Whether highlight fragments may be requested at all.
    #[serde(default)]
    pub allow_highlighting: bool,
    #[serde(default)]
    pub allow_leading_wildcard_searches: bool,
    /// ⏱️ Transport timeout, and the default deadline for timeout-bounded operations.
    #[serde(default = "default_request_timeout", deserialize_with = "human_duration")]
    pub request_timeout: Duration,
    #[serde(default = "default_connect_timeout", deserialize_with = "human_duration")]
    pub connect_timeout: Duration,
    /// ⏳ Scroll keep-alive, passed to the cluster verbatim. Unset or blank means "1m".
    #[serde(default)]
    pub scroll_keep_alive: Option<String>,
    /// 🔀 Scroll or search-after. Deployment-wide, not per search.
    #[serde(default)]
    pub chunking_method: ChunkingMethod,
    /// 🗜️ Ask the cluster for gzipped responses.
    #[serde(default)]
    pub compression_enabled: bool,
    /// 📏 Response bodies larger than this are refused mid-read.
    #[serde(default = "default_max_response_size_bytes")]
    pub max_response_size_bytes: u64,
    #[serde(default)]
    pub max_concurrent_searches: Option<u32>,
    #[serde(default)]
    pub max_concurrent_shard_requests: Option<u32>,
}

impl SearchConfig {
    /// 🏗️ A config for `url` with every knob at its default.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            api_key: None,
            allow_highlighting: false,
            allow_leading_wildcard_searches: false,
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            scroll_keep_alive: None,
            chunking_method: ChunkingMethod::default(),
            compression_enabled: false,
            max_response_size_bytes: default_max_response_size_bytes(),
            max_concurrent_searches: None,
            max_concurrent_shard_requests: None,
        }
    }
}

/// 📤 The export job the CLI runs.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExportConfig {
    /// 📁 NDJSON destination. `None` writes to stdout.
    #[serde(default)]
    pub output_file: Option<PathBuf>,
    #[serde(default)]
    pub command: ChunkCommand,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_response_size_bytes() -> u64 {
    100 * 1024 * 1024
}

/// ⏱️ "30s" is a duration. "30" is a mystery. humantime knows the difference.
fn human_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
}

/// 🚀 Load the config — from a file, from env vars, or from the sheer power of hoping.
///
/// 🔧 Merges environment variables (`LGX_*`, `__` between nested keys, so
/// `LGX_SEARCH__URL` lands in `search.url`) with an optional TOML file. TOML wins on conflicts.
///
/// 💀 Returns an error if config is unparseable. The error message says which source to blame.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    // 🏗️ env vars are the base layer — like a good sourdough starter.
    let config = Figment::new().merge(Env::prefixed("LGX_").split("__"));

    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (LGX_*). \
             The file exists in our hearts, but apparently not in a shape serde recognizes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (LGX_*). \
                 No file was provided — this one's all on the environment. Classic."
            .to_string(),
    };

    // ✅ or 💀, there is no try — actually there is, it's called `?`
    config.extract().context(context_msg)
}

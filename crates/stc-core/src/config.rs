//! Layered settings and path helpers.
//!
//! Uses Figment to merge defaults + `config.toml` + `config.<env>.toml` + `STC_*` env vars.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_REMOTE_URL: &str = "https://api.standard-template-construct.org";
pub const DEFAULT_REMOTE_NAME: &str = "Nebula Nomad Station";
/// Subdirectory of the cache holding bootstrapped replicas; ingested
/// collections live next to it.
pub const SEGMENTS_SUBDIR: &str = "segments";
pub const DEFAULT_DATA_URL: &str = "http://127.0.0.1:8080/ipns/standard-template-construct.org/data";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub log_level: String,
    pub store: StoreSettings,
    pub remote: Vec<RemoteSettings>,
    pub local: LocalSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSettings {
    pub name: String,
    pub base_url: String,
    pub index_name: String,
    pub page_size: usize,
    pub healthcheck_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSettings {
    pub enabled: bool,
    pub name: String,
    pub index_name: String,
    /// Base URL the segment files are served from; `<data_url>/<index_name>/<file>`.
    pub data_url: String,
    pub cache_dir: String,
    pub cache_size: u64,
    pub page_size: usize,
    pub healthcheck_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            store: StoreSettings { path: "~/.stc/meta.redb".to_string() },
            remote: vec![RemoteSettings {
                name: DEFAULT_REMOTE_NAME.to_string(),
                base_url: DEFAULT_REMOTE_URL.to_string(),
                index_name: "nexus_science".to_string(),
                page_size: 10,
                healthcheck_timeout_secs: 10,
            }],
            local: LocalSettings {
                enabled: true,
                name: "IPFS".to_string(),
                index_name: "nexus_science".to_string(),
                data_url: DEFAULT_DATA_URL.to_string(),
                cache_dir: "~/.stc/indices".to_string(),
                cache_size: 512 * 1024 * 1024,
                page_size: 5,
                healthcheck_timeout_secs: 30,
            },
        }
    }
}

impl Settings {
    /// Defaults, then `config.toml`, then `config.<RUST_ENV>.toml`, then `STC_*` env vars.
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::from_figment(Self::figment(&env_name))
    }

    pub fn figment(env_name: &str) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment.merge(Env::prefixed("STC_").split("__"))
    }

    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let settings: Settings = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> anyhow::Result<()> {
        for remote in &self.remote {
            if remote.page_size == 0 {
                anyhow::bail!("remote '{}': page_size must be positive", remote.name);
            }
        }
        if self.local.page_size == 0 {
            anyhow::bail!("local '{}': page_size must be positive", self.local.name);
        }
        Ok(())
    }

    pub fn store_path(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.store.path)
    }

    pub fn cache_dir(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.local.cache_dir)
    }

    pub fn segments_dir(&self, base: &Path) -> PathBuf {
        self.cache_dir(base).join(SEGMENTS_SUBDIR)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

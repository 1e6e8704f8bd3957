// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

use crate::cache::DEFAULT_KEY_PREFIX;
use crate::dedup::DEFAULT_CLAIM_FLAG;
use crate::feed::ItemShape;

pub const DEFAULT_CONFIG_PATH: &str = "config/misinfo.toml";

pub const ENV_CONFIG_PATH: &str = "MISINFO_CONFIG_PATH";
pub const ENV_ENDPOINT: &str = "MISINFO_ENDPOINT";
pub const ENV_MAX_CONCURRENT: &str = "MISINFO_MAX_CONCURRENT";

fn default_endpoint() -> String {
    "http://127.0.0.1:5000/analyze".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    4_000
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_max_concurrent() -> usize {
    4
}
fn default_cache_path() -> PathBuf {
    PathBuf::from("cache/misinfo.json")
}
fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}
fn default_item_tag() -> String {
    "article".to_string()
}
fn default_text_attr() -> String {
    "lang".to_string()
}
fn default_claim_flag() -> String {
    DEFAULT_CLAIM_FLAG.to_string()
}
fn default_report_capacity() -> usize {
    200
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Full URL of the classification endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Upper bound on simultaneous remote calls.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_item_tag")]
    pub item_tag: String,
    #[serde(default = "default_text_attr")]
    pub text_attr: String,
    #[serde(default = "default_claim_flag")]
    pub claim_flag: String,
    #[serde(default = "default_report_capacity")]
    pub report_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            max_concurrent_requests: default_max_concurrent(),
            cache_path: default_cache_path(),
            key_prefix: default_key_prefix(),
            item_tag: default_item_tag(),
            text_attr: default_text_attr(),
            claim_flag: default_claim_flag(),
            report_capacity: default_report_capacity(),
        }
    }
}

impl WatchConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let cfg: WatchConfig =
            toml::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
        Ok(cfg.sanitized())
    }

    /// Load order:
    /// 1) $MISINFO_CONFIG_PATH (must exist)
    /// 2) config/misinfo.toml
    /// 3) built-in defaults
    ///
    /// followed by env overrides for endpoint and concurrency.
    pub fn load_default() -> Result<Self> {
        let cfg = if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from_file(&pb)?
        } else if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::load_from_file(DEFAULT_CONFIG_PATH)?
        } else {
            Self::default()
        };
        Ok(cfg.with_env_overrides())
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(ep) = env::var(ENV_ENDPOINT) {
            let ep = ep.trim();
            if !ep.is_empty() {
                self.endpoint = ep.to_string();
            }
        }
        if let Some(n) = env::var(ENV_MAX_CONCURRENT)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            self.max_concurrent_requests = n;
        }
        self.sanitized()
    }

    fn sanitized(mut self) -> Self {
        self.max_concurrent_requests = self.max_concurrent_requests.max(1);
        self.report_capacity = self.report_capacity.max(1);
        if self.item_tag.trim().is_empty() {
            self.item_tag = default_item_tag();
        }
        if self.text_attr.trim().is_empty() {
            self.text_attr = default_text_attr();
        }
        if self.claim_flag.trim().is_empty() {
            self.claim_flag = default_claim_flag();
        }
        self
    }

    pub fn item_shape(&self) -> ItemShape {
        ItemShape::new(self.item_tag.clone(), self.text_attr.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_fills_defaults_and_sanitizes() {
        let cfg: WatchConfig = toml::from_str(
            r#"
            endpoint = "http://example.test/analyze"
            max_concurrent_requests = 0
            item_tag = ""
            "#,
        )
        .unwrap();
        let cfg = cfg.sanitized();
        assert_eq!(cfg.endpoint, "http://example.test/analyze");
        assert_eq!(cfg.max_concurrent_requests, 1);
        assert_eq!(cfg.item_tag, "article");
        assert_eq!(cfg.key_prefix, "misinfo_");
        assert_eq!(cfg.report_capacity, 200);
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_CONFIG_PATH);
        env::remove_var(ENV_ENDPOINT);
        env::remove_var(ENV_MAX_CONCURRENT);

        // No files in the temp cwd -> defaults
        assert_eq!(WatchConfig::load_default().unwrap(), WatchConfig::default());

        // config/misinfo.toml is picked up
        fs::create_dir_all("config").unwrap();
        fs::write(DEFAULT_CONFIG_PATH, "max_concurrent_requests = 9\n").unwrap();
        assert_eq!(WatchConfig::load_default().unwrap().max_concurrent_requests, 9);

        // Env path wins, env overrides apply last
        let p = tmp.path().join("other.toml");
        fs::write(&p, "report_capacity = 5\n").unwrap();
        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        env::set_var(ENV_MAX_CONCURRENT, "2");
        env::set_var(ENV_ENDPOINT, "http://override.test/analyze");
        let cfg = WatchConfig::load_default().unwrap();
        assert_eq!(cfg.report_capacity, 5);
        assert_eq!(cfg.max_concurrent_requests, 2);
        assert_eq!(cfg.endpoint, "http://override.test/analyze");

        env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
        assert!(WatchConfig::load_default().is_err());

        env::remove_var(ENV_CONFIG_PATH);
        env::remove_var(ENV_ENDPOINT);
        env::remove_var(ENV_MAX_CONCURRENT);
        env::set_current_dir(&old).unwrap();
    }
}

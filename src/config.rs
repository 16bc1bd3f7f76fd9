//! Configuration management for scrollharvest using the prefer crate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, Result};
use crate::models::ListingKind;

/// Default wait after each drive step.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 1500;
/// Default bound on waiting for a listing's first data.
pub const DEFAULT_FIRST_DATA_TIMEOUT_SECS: u64 = 60;
/// Batches without new items tolerated before a listing counts as stalled.
pub const DEFAULT_STALL_THRESHOLD: u32 = 5;
pub const DEFAULT_LIMIT: usize = 100;

/// Pagination tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestSettings {
    pub settle_delay_ms: u64,
    pub first_data_timeout_secs: u64,
    pub stall_threshold: u32,
    pub default_limit: usize,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            first_data_timeout_secs: DEFAULT_FIRST_DATA_TIMEOUT_SECS,
            stall_threshold: DEFAULT_STALL_THRESHOLD,
            default_limit: DEFAULT_LIMIT,
        }
    }
}

impl HarvestSettings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn first_data_timeout(&self) -> Duration {
        Duration::from_secs(self.first_data_timeout_secs)
    }
}

/// Browser launch/connect options.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserSettings {
    /// Run in headless mode (default: true).
    pub headless: bool,
    /// Proxy server URL (e.g., "socks5://127.0.0.1:1080").
    pub proxy: Option<String>,
    /// Remote Chrome DevTools URL. Connects instead of launching when set.
    pub remote_url: Option<String>,
    /// Navigation timeout in seconds.
    pub timeout_secs: u64,
    pub chrome_args: Vec<String>,
    /// Login cookies (JSON array of CDP cookie objects).
    pub cookies_file: Option<PathBuf>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            proxy: None,
            remote_url: None,
            timeout_secs: 30,
            chrome_args: Vec::new(),
            cookies_file: None,
        }
    }
}

impl BrowserSettings {
    /// Whether the session carries login cookies.
    pub fn is_logged_in(&self) -> bool {
        self.cookies_file.is_some()
    }
}

/// CSS selector that marks a page as rendered, and how long to wait for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessProbe {
    pub selector: String,
    pub timeout_ms: u64,
}

impl ReadinessProbe {
    fn new(selector: &str, timeout_ms: u64) -> Self {
        Self {
            selector: selector.to_string(),
            timeout_ms,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessSettings {
    pub post: ReadinessProbe,
    pub profile: ReadinessProbe,
    pub hashtag: ReadinessProbe,
    pub place: ReadinessProbe,
    /// Present on private profiles.
    pub private_selector: String,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            post: ReadinessProbe::new(".EtaWk", 15_000),
            profile: ReadinessProbe::new(".ySN3v", 5_000),
            hashtag: ReadinessProbe::new(".EZdmt", 25_000),
            place: ReadinessProbe::new(".EZdmt", 25_000),
            private_selector: ".rkEop".to_string(),
        }
    }
}

impl ReadinessSettings {
    pub fn probe_for(&self, kind: ListingKind) -> &ReadinessProbe {
        match kind {
            ListingKind::PostComments => &self.post,
            ListingKind::ProfilePosts => &self.profile,
            ListingKind::HashtagPosts => &self.hashtag,
            ListingKind::PlacePosts => &self.place,
        }
    }
}

/// Application settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub harvest: HarvestSettings,
    pub browser: BrowserSettings,
    pub readiness: ReadinessSettings,
}

impl Settings {
    /// Apply environment variable overrides.
    ///
    /// - `BROWSER_URL` - Remote Chrome DevTools URL
    /// - `SOCKS_PROXY` - SOCKS proxy for browser traffic
    /// - `SCROLLHARVEST_SETTLE_MS` - settle delay after each drive step
    /// - `SCROLLHARVEST_FIRST_DATA_TIMEOUT` - first-data wait, in seconds
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(url) = var("BROWSER_URL") {
            tracing::debug!("Using BROWSER_URL from environment: {}", url);
            self.browser.remote_url = Some(url);
        }
        if let Some(proxy) = var("SOCKS_PROXY") {
            self.browser.proxy = Some(proxy);
        }
        if let Some(ms) = var("SCROLLHARVEST_SETTLE_MS").and_then(|v| v.parse().ok()) {
            self.harvest.settle_delay_ms = ms;
        }
        if let Some(secs) = var("SCROLLHARVEST_FIRST_DATA_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.harvest.first_data_timeout_secs = secs;
        }
        self
    }
}

/// `[harvest]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, prefer::FromValue)]
pub struct HarvestConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settle_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_data_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stall_threshold: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_limit: Option<u64>,
}

/// `[browser]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, prefer::FromValue)]
pub struct BrowserConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headless: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[prefer(default)]
    pub chrome_args: Vec<String>,
    /// Relative paths resolve against the config file's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies_file: Option<String>,
}

/// `[readiness]` section. Timeouts are in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, prefer::FromValue)]
pub struct ReadinessConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashtag_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashtag_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_selector: Option<String>,
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, prefer::FromValue)]
pub struct Config {
    #[serde(default)]
    #[prefer(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    #[prefer(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    #[prefer(default)]
    pub readiness: ReadinessConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    #[prefer(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Discover a `scrollharvest` config file in the standard locations.
    /// Falls back to defaults when none is found or it fails to parse.
    pub async fn load() -> Self {
        match prefer::load("scrollharvest").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("Ignoring config file {}: {}", path.display(), e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path, by extension.
    pub async fn load_from_path(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| HarvestError::Config(format!("Failed to read config file: {}", e)))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| HarvestError::Config(format!("Failed to parse TOML config: {}", e)))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| HarvestError::Config(format!("Failed to parse YAML config: {}", e)))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| HarvestError::Config(format!("Failed to parse JSON config: {}", e)))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// The config file's directory, if loaded from a file.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Expand `~` and resolve relative paths against `base_dir`.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        let harvest = &self.harvest;
        if let Some(ms) = harvest.settle_delay_ms {
            settings.harvest.settle_delay_ms = ms;
        }
        if let Some(secs) = harvest.first_data_timeout_secs {
            settings.harvest.first_data_timeout_secs = secs;
        }
        if let Some(threshold) = harvest.stall_threshold {
            settings.harvest.stall_threshold = u32::try_from(threshold).unwrap_or(u32::MAX);
        }
        if let Some(limit) = harvest.default_limit {
            settings.harvest.default_limit = usize::try_from(limit).unwrap_or(usize::MAX);
        }

        let browser = &self.browser;
        if let Some(headless) = browser.headless {
            settings.browser.headless = headless;
        }
        if let Some(ref proxy) = browser.proxy {
            settings.browser.proxy = Some(proxy.clone());
        }
        if let Some(ref url) = browser.remote_url {
            settings.browser.remote_url = Some(url.clone());
        }
        if let Some(timeout) = browser.timeout {
            settings.browser.timeout_secs = timeout;
        }
        if !browser.chrome_args.is_empty() {
            settings.browser.chrome_args = browser.chrome_args.clone();
        }
        if let Some(ref cookies) = browser.cookies_file {
            settings.browser.cookies_file = Some(self.resolve_path(cookies, base_dir));
        }

        let readiness = &self.readiness;
        let probes = [
            (
                &mut settings.readiness.post,
                &readiness.post_selector,
                readiness.post_timeout_ms,
            ),
            (
                &mut settings.readiness.profile,
                &readiness.profile_selector,
                readiness.profile_timeout_ms,
            ),
            (
                &mut settings.readiness.hashtag,
                &readiness.hashtag_selector,
                readiness.hashtag_timeout_ms,
            ),
            (
                &mut settings.readiness.place,
                &readiness.place_selector,
                readiness.place_timeout_ms,
            ),
        ];
        for (probe, selector, timeout_ms) in probes {
            if let Some(selector) = selector {
                probe.selector = selector.clone();
            }
            if let Some(ms) = timeout_ms {
                probe.timeout_ms = ms;
            }
        }
        if let Some(ref selector) = readiness.private_selector {
            settings.readiness.private_selector = selector.clone();
        }
    }
}

/// Resolve settings: defaults, then the config file (explicit path or
/// discovered), then environment overrides.
pub async fn load_settings(config_path: Option<&Path>) -> Result<(Settings, Config)> {
    let config = match config_path {
        Some(path) => Config::load_from_path(path).await?,
        None => Config::load().await,
    };

    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings, &base_dir);
    Ok((settings.with_env_overrides(), config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.harvest.settle_delay(), Duration::from_millis(1500));
        assert_eq!(settings.harvest.first_data_timeout(), Duration::from_secs(60));
        assert_eq!(settings.harvest.stall_threshold, 5);
        assert_eq!(settings.readiness.probe_for(ListingKind::PostComments).selector, ".EtaWk");
        assert_eq!(
            settings.readiness.probe_for(ListingKind::ProfilePosts).timeout(),
            Duration::from_secs(5)
        );
        assert!(!settings.browser.is_logged_in());
    }

    #[tokio::test]
    async fn test_load_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scrollharvest.toml");
        tokio::fs::write(
            &path,
            r#"
[harvest]
settle_delay_ms = 250
stall_threshold = 2

[browser]
headless = false
cookies_file = "cookies.json"

[readiness]
profile_selector = "main article"
profile_timeout_ms = 9000
"#,
        )
        .await
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, &config.base_dir().unwrap());

        assert_eq!(settings.harvest.settle_delay_ms, 250);
        assert_eq!(settings.harvest.stall_threshold, 2);
        assert_eq!(settings.harvest.default_limit, DEFAULT_LIMIT);
        assert!(!settings.browser.headless);
        assert_eq!(
            settings.browser.cookies_file,
            Some(dir.path().join("cookies.json"))
        );
        assert_eq!(settings.readiness.profile.selector, "main article");
        assert_eq!(settings.readiness.profile.timeout_ms, 9000);
        assert_eq!(settings.readiness.post.selector, ".EtaWk");
    }

    #[tokio::test]
    async fn test_load_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("config.yaml");
        tokio::fs::write(&yaml, "harvest:\n  default_limit: 20\n")
            .await
            .unwrap();
        let config = Config::load_from_path(&yaml).await.unwrap();
        assert_eq!(config.harvest.default_limit, Some(20));

        let json = dir.path().join("config.json");
        tokio::fs::write(&json, r#"{"browser": {"remote_url": "ws://localhost:9222"}}"#)
            .await
            .unwrap();
        let config = Config::load_from_path(&json).await.unwrap();
        assert_eq!(
            config.browser.remote_url.as_deref(),
            Some("ws://localhost:9222")
        );
    }

    #[tokio::test]
    async fn test_invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        tokio::fs::write(&path, "[harvest\n").await.unwrap();

        let err = Config::load_from_path(&path).await.unwrap_err();
        assert!(matches!(err, HarvestError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("BROWSER_URL", "ws://remote:9222"),
            ("SOCKS_PROXY", ""),
            ("SCROLLHARVEST_SETTLE_MS", "40"),
            ("SCROLLHARVEST_FIRST_DATA_TIMEOUT", "not a number"),
        ]
        .into_iter()
        .collect();

        let settings = Settings::default()
            .with_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.browser.remote_url.as_deref(), Some("ws://remote:9222"));
        assert_eq!(settings.browser.proxy, None);
        assert_eq!(settings.harvest.settle_delay_ms, 40);
        assert_eq!(
            settings.harvest.first_data_timeout_secs,
            DEFAULT_FIRST_DATA_TIMEOUT_SECS
        );
    }
}

//! Engine configuration model, defaults and TOML loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;

/// Root configuration read from `artwork.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ArtworkConfig {
    #[serde(default)]
    /// External search endpoint settings.
    pub lookup: LookupConfig,
    #[serde(default)]
    /// Spacing and concurrency limits for external calls.
    pub throttle: ThrottleConfig,
    #[serde(default)]
    /// Default focus window used by background scheduling.
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    /// Download-and-decode verification of selected artwork.
    pub preload: PreloadConfig,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LookupConfig {
    #[serde(default = "default_search_base_url")]
    pub search_base_url: String,
    #[serde(default = "default_result_limit")]
    pub result_limit: u32,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Optional storefront code; omitted from the query when empty.
    #[serde(default)]
    pub country: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ThrottleConfig {
    /// Minimum gap between the starts of two external calls.
    #[serde(default = "default_min_spacing_ms")]
    pub min_spacing_ms: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Extra pause inserted after every `max_concurrent` starts.
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SchedulingConfig {
    #[serde(default = "default_preload_radius")]
    pub preload_radius: usize,
    #[serde(default = "default_lazy_radius")]
    pub lazy_radius: usize,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct MatchingConfig {
    #[serde(default = "default_min_match_score")]
    pub min_match_score: i32,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PreloadConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_preload_timeout_ms")]
    pub timeout_ms: u64,
}

/// Radii around the focus index for one scheduling pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusWindow {
    pub preload_radius: usize,
    pub lazy_radius: usize,
}

impl FocusWindow {
    pub fn new(preload_radius: usize, lazy_radius: usize) -> Self {
        Self {
            preload_radius,
            lazy_radius: lazy_radius.max(preload_radius),
        }
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            search_base_url: default_search_base_url(),
            result_limit: default_result_limit(),
            request_timeout_ms: default_request_timeout_ms(),
            country: String::new(),
            user_agent: default_user_agent(),
        }
    }
}

impl LookupConfig {
    pub fn effective_result_limit(&self) -> u32 {
        self.result_limit.clamp(1, 25)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_spacing_ms: default_min_spacing_ms(),
            max_concurrent: default_max_concurrent(),
            batch_pause_ms: default_batch_pause_ms(),
        }
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            preload_radius: default_preload_radius(),
            lazy_radius: default_lazy_radius(),
        }
    }
}

impl SchedulingConfig {
    pub fn focus_window(&self) -> FocusWindow {
        FocusWindow::new(self.preload_radius, self.lazy_radius)
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            min_match_score: default_min_match_score(),
        }
    }
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            timeout_ms: default_preload_timeout_ms(),
        }
    }
}

impl PreloadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

fn default_true() -> bool {
    true
}

fn default_search_base_url() -> String {
    "https://itunes.apple.com/search".to_string()
}

fn default_result_limit() -> u32 {
    5
}

fn default_request_timeout_ms() -> u64 {
    8_000
}

fn default_user_agent() -> String {
    "artwork-resolver/0.1.0".to_string()
}

fn default_min_spacing_ms() -> u64 {
    300
}

fn default_max_concurrent() -> usize {
    3
}

fn default_batch_pause_ms() -> u64 {
    1_000
}

fn default_preload_radius() -> usize {
    2
}

fn default_lazy_radius() -> usize {
    6
}

fn default_min_match_score() -> i32 {
    crate::match_scoring::DEFAULT_MIN_MATCH_SCORE
}

fn default_preload_timeout_ms() -> u64 {
    10_000
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|path| path.join("artwork-resolver").join("artwork.toml"))
}

pub fn parse_config(text: &str) -> Result<ArtworkConfig, toml::de::Error> {
    toml::from_str(text)
}

/// Reads `path`, falling back to defaults when the file is missing or invalid.
pub fn load_config_file(path: &Path) -> ArtworkConfig {
    let config_content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!(
                "Failed to read artwork config {}. Using defaults. error={}",
                path.display(),
                err
            );
            return ArtworkConfig::default();
        }
    };

    match parse_config(&config_content) {
        Ok(config) => config,
        Err(err) => {
            warn!(
                "Failed to parse artwork config {}. Using defaults. error={}",
                path.display(),
                err
            );
            ArtworkConfig::default()
        }
    }
}

pub fn load_or_default() -> ArtworkConfig {
    match default_config_path() {
        Some(path) if path.exists() => load_config_file(&path),
        _ => ArtworkConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::{load_config_file, parse_config, ArtworkConfig, FocusWindow};
    use std::path::Path;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = parse_config("").expect("empty toml parses");
        assert_eq!(config, ArtworkConfig::default());
        assert_eq!(config.throttle.max_concurrent, 3);
        assert_eq!(config.preload.timeout_ms, 10_000);
        assert_eq!(config.matching.min_match_score, 10);
    }

    #[test]
    fn test_partial_sections_keep_remaining_defaults() {
        let config = parse_config(
            r#"
[throttle]
min_spacing_ms = 50

[scheduling]
lazy_radius = 12
"#,
        )
        .expect("partial toml parses");
        assert_eq!(config.throttle.min_spacing_ms, 50);
        assert_eq!(config.throttle.batch_pause_ms, 1_000);
        assert_eq!(config.scheduling.preload_radius, 2);
        assert_eq!(config.scheduling.lazy_radius, 12);
    }

    #[test]
    fn test_result_limit_is_clamped() {
        let mut config = ArtworkConfig::default();
        config.lookup.result_limit = 0;
        assert_eq!(config.lookup.effective_result_limit(), 1);
        config.lookup.result_limit = 500;
        assert_eq!(config.lookup.effective_result_limit(), 25);
    }

    #[test]
    fn test_focus_window_raises_lazy_radius() {
        assert_eq!(FocusWindow::new(4, 1), FocusWindow::new(4, 4));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = load_config_file(Path::new("/definitely/not/here/artwork.toml"));
        assert_eq!(config, ArtworkConfig::default());
    }

    #[test]
    fn test_round_trips_through_toml_serializer() {
        let mut config = ArtworkConfig::default();
        config.lookup.country = "GB".to_string();
        let text = toml::to_string(&config).expect("serialize config");
        assert_eq!(parse_config(&text).expect("parse config"), config);
    }
}

// src/config.rs
//! Unified automation configuration - environment first, optional TOML file,
//! sensible defaults otherwise.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub delays: DelayConfig,
    pub timeouts: TimeoutConfig,
    pub platforms: PlatformConfig,
    /// Ceiling for the multi-page advancing loop.
    pub max_form_pages: u32,
    pub screenshot_dir: PathBuf,
    pub cookies_dir: PathBuf,
}

/// Delay ranges in milliseconds unless stated otherwise. Randomized pacing
/// between DOM actions is a functional requirement, not tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DelayConfig {
    pub between_fields_ms: (u64, u64),
    pub around_clicks_ms: (u64, u64),
    pub keystroke_ms: (u64, u64),
    pub between_jobs_secs: (u64, u64),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub navigation_secs: u64,
    pub selector_secs: u64,
    pub llm_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub linkedin_enabled: bool,
    pub indeed_enabled: bool,
    /// Applications allowed per platform per hour before the gate trips.
    pub max_applications_per_hour: u32,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            between_fields_ms: (200, 500),
            around_clicks_ms: (100, 300),
            keystroke_ms: (30, 120),
            between_jobs_secs: (8, 25),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            navigation_secs: 45,
            selector_secs: 10,
            llm_secs: 60,
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            linkedin_enabled: true,
            indeed_enabled: true,
            max_applications_per_hour: 12,
        }
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            delays: DelayConfig::default(),
            timeouts: TimeoutConfig::default(),
            platforms: PlatformConfig::default(),
            max_form_pages: 10,
            screenshot_dir: PathBuf::from("screenshots"),
            cookies_dir: PathBuf::from("cookies"),
        }
    }
}

impl AutomationConfig {
    /// Load configuration. `AUTOMATION_CONFIG` may point to a TOML file;
    /// otherwise `automation.toml` in the working directory is used when
    /// present, and defaults apply for everything unset.
    pub fn load() -> Result<Self> {
        let path = std::env::var("AUTOMATION_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("automation.toml"));

        if path.exists() {
            info!("Loading automation config from {}", path.display());
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Self = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            Ok(config)
        } else {
            info!("No automation config file found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn cookie_jar_path(&self, platform: &str) -> PathBuf {
        self.cookies_dir.join(format!("{}.json", platform))
    }

    pub fn screenshot_path(&self, application_id: &str, label: &str) -> PathBuf {
        self.screenshot_dir
            .join(format!("{}_{}.png", application_id, label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AutomationConfig::default();
        assert_eq!(config.delays.between_fields_ms, (200, 500));
        assert_eq!(config.delays.around_clicks_ms, (100, 300));
        assert_eq!(config.max_form_pages, 10);
    }

    #[test]
    fn test_partial_toml_overlays_defaults() {
        let config: AutomationConfig = toml::from_str(
            r#"
            max_form_pages = 6

            [platforms]
            linkedin_enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(config.max_form_pages, 6);
        assert!(!config.platforms.linkedin_enabled);
        assert!(config.platforms.indeed_enabled);
        assert_eq!(config.timeouts.selector_secs, 10);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("automation.toml");
        std::fs::write(
            &path,
            r#"
            screenshot_dir = "/tmp/shots"

            [delays]
            between_jobs_secs = [3, 5]
            "#,
        )
        .unwrap();

        std::env::set_var("AUTOMATION_CONFIG", &path);
        let config = AutomationConfig::load().unwrap();
        std::env::remove_var("AUTOMATION_CONFIG");

        assert_eq!(config.screenshot_dir, PathBuf::from("/tmp/shots"));
        assert_eq!(config.delays.between_jobs_secs, (3, 5));
        assert_eq!(config.delays.between_fields_ms, (200, 500));
    }

    #[test]
    fn test_paths() {
        let config = AutomationConfig::default();
        assert_eq!(
            config.cookie_jar_path("linkedin"),
            PathBuf::from("cookies/linkedin.json")
        );
        assert_eq!(
            config.screenshot_path("abc", "pre-submit"),
            PathBuf::from("screenshots/abc_pre-submit.png")
        );
    }
}

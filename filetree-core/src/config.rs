use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub appearance: AppearanceConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

fn default_renderer() -> RendererConfig {
    RendererConfig::Auto
}

fn default_wgpu_backend() -> WgpuBackendConfig {
    WgpuBackendConfig::Auto
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RendererConfig {
    Auto,
    Wgpu,
    Glow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WgpuBackendConfig {
    Auto,
    Dx12,
    Vulkan,
    Gl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Folder shown at startup; empty means the current directory.
    #[serde(default)]
    pub start_folder: String,
    #[serde(default = "default_renderer")]
    pub renderer: RendererConfig,
    #[serde(default = "default_wgpu_backend")]
    pub wgpu_backend: WgpuBackendConfig,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            start_folder: String::new(),
            renderer: RendererConfig::Auto,
            wgpu_backend: WgpuBackendConfig::Auto,
        }
    }
}

fn default_window_width() -> u32 {
    1100
}

fn default_window_height() -> u32 {
    700
}

fn default_show_icons() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppearanceConfig {
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    #[serde(default = "default_show_icons")]
    pub show_icons: bool,
    #[serde(default)]
    pub show_hidden: bool,
}

impl Default for AppearanceConfig {
    fn default() -> Self {
        Self {
            window_width: default_window_width(),
            window_height: default_window_height(),
            show_icons: true,
            show_hidden: false,
        }
    }
}

fn default_search_mode() -> SearchModeConfig {
    SearchModeConfig::Substring
}

fn default_max_visited() -> usize {
    4000
}

fn default_collapse_before_search() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchModeConfig {
    Prefix,
    Substring,
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_mode")]
    pub mode: SearchModeConfig,
    #[serde(default = "default_max_visited")]
    pub max_visited: usize,
    #[serde(default = "default_collapse_before_search")]
    pub collapse_before_search: bool,
    /// Pattern filter applied at startup, e.g. `*.rs;*.toml`.
    #[serde(default)]
    pub default_patterns: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            mode: SearchModeConfig::Substring,
            max_visited: default_max_visited(),
            collapse_before_search: true,
            default_patterns: String::new(),
        }
    }
}

impl Config {
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("FileTree"))
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.toml"))
    }

    /// Reads the user's config file. The file is never written; a missing
    /// or unparsable file yields defaults.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|err| {
                tracing::warn!(path = %path.display(), error = %err, "invalid config, using defaults");
                Self::default()
            }),
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "no config file, using defaults");
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(content)?;
        config.search.max_visited = config.search.max_visited.max(1);
        Ok(config)
    }

    /// Startup folder: config value if set, otherwise the working directory.
    pub fn start_folder(&self) -> PathBuf {
        let configured = self.general.start_folder.trim();
        if configured.is_empty() {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        } else {
            PathBuf::from(configured)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_full_config() {
        let toml_str = r#"
            [general]
            start_folder = "/home/me/projects"
            renderer = "glow"
            wgpu_backend = "vulkan"

            [appearance]
            window_width = 800
            window_height = 600
            show_icons = false
            show_hidden = true

            [search]
            mode = "fuzzy"
            max_visited = 10000
            collapse_before_search = false
            default_patterns = "*.rs;*.toml"
        "#;
        let config = Config::parse(toml_str).expect("parse");
        assert_eq!(config.general.start_folder, "/home/me/projects");
        assert_eq!(config.general.renderer, RendererConfig::Glow);
        assert_eq!(config.general.wgpu_backend, WgpuBackendConfig::Vulkan);
        assert_eq!(config.appearance.window_width, 800);
        assert_eq!(config.appearance.window_height, 600);
        assert!(!config.appearance.show_icons);
        assert!(config.appearance.show_hidden);
        assert_eq!(config.search.mode, SearchModeConfig::Fuzzy);
        assert_eq!(config.search.max_visited, 10000);
        assert!(!config.search.collapse_before_search);
        assert_eq!(config.search.default_patterns, "*.rs;*.toml");
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::parse("").expect("parse");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_section_fills_missing_fields() {
        let toml_str = r#"
            [search]
            mode = "prefix"
        "#;
        let config = Config::parse(toml_str).expect("parse");
        assert_eq!(config.search.mode, SearchModeConfig::Prefix);
        assert_eq!(config.search.max_visited, 4000);
        assert!(config.search.collapse_before_search);
        assert_eq!(config.appearance.window_width, 1100);
        assert!(config.appearance.show_icons);
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert!(config.general.start_folder.is_empty());
        assert_eq!(config.general.renderer, RendererConfig::Auto);
        assert_eq!(config.general.wgpu_backend, WgpuBackendConfig::Auto);
        assert_eq!(config.appearance.window_width, 1100);
        assert_eq!(config.appearance.window_height, 700);
        assert!(config.appearance.show_icons);
        assert!(!config.appearance.show_hidden);
        assert_eq!(config.search.mode, SearchModeConfig::Substring);
        assert_eq!(config.search.max_visited, 4000);
        assert!(config.search.collapse_before_search);
        assert!(config.search.default_patterns.is_empty());
    }

    #[test]
    fn zero_visit_cap_is_clamped() {
        let config = Config::parse("[search]\nmax_visited = 0\n").expect("parse");
        assert_eq!(config.search.max_visited, 1);
    }

    #[test]
    fn unknown_mode_is_an_error() {
        assert!(Config::parse("[search]\nmode = \"regex\"\n").is_err());
    }

    #[test]
    fn load_from_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = Config::load_from(&dir.path().join("config.toml"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_from_invalid_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is = = not toml").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }

    #[test]
    fn blank_start_folder_means_current_dir() {
        let config = Config::default();
        assert_eq!(
            config.start_folder(),
            std::env::current_dir().expect("cwd")
        );
    }
}

//! Application configuration: named quality presets plus tool locations.
//!
//! Read from `glyphtile.toml` or `glyphtile.json`; the format follows the file
//! extension.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::brightness::ErosionParams;
use crate::compression::CompressionLevel;
use crate::video::FfmpegConfig;

/// Base names searched for when no config path is given.
pub const CONFIG_FILE_NAMES: &[&str] = &["glyphtile.toml", "glyphtile.json"];

fn default_kernel_size() -> u32 {
    ErosionParams::default().kernel_size
}

fn default_iterations() -> u32 {
    ErosionParams::default().iterations
}

/// Configuration preset defining quality settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub columns: u32,
    #[serde(default = "default_kernel_size")]
    pub kernel_size: u32,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
}

impl Preset {
    pub fn new(columns: u32) -> Self {
        Self {
            columns,
            kernel_size: default_kernel_size(),
            iterations: default_iterations(),
        }
    }

    pub fn erosion(&self) -> ErosionParams {
        ErosionParams::new(self.kernel_size, self.iterations)
    }
}

fn default_preset_name() -> String {
    "default".to_string()
}

fn default_compression() -> Option<CompressionLevel> {
    Some(CompressionLevel::Medium)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub presets: HashMap<String, Preset>,
    #[serde(default = "default_preset_name")]
    pub default_preset: String,
    /// Glyph directory used when none is given on the command line.
    #[serde(default)]
    pub glyph_dir: Option<PathBuf>,
    /// Re-encode tier applied to rendered videos; `None` disables the pass.
    #[serde(default = "default_compression")]
    pub compression: Option<CompressionLevel>,
    #[serde(default)]
    pub ffmpeg: FfmpegConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let presets = HashMap::from([
            ("default".to_string(), Preset::new(200)),
            ("small".to_string(), Preset::new(80)),
            ("large".to_string(), Preset::new(400)),
        ]);
        Self {
            presets,
            default_preset: default_preset_name(),
            glyph_dir: None,
            compression: default_compression(),
            ffmpeg: FfmpegConfig::default(),
        }
    }
}

impl AppConfig {
    /// Parse a config file, TOML or JSON by extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let cfg = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&text).with_context(|| format!("parsing {}", path.display()))?,
            Some("json") => Self::from_json_str(&text).with_context(|| format!("parsing {}", path.display()))?,
            _ => return Err(anyhow!("config {} must be a .toml or .json file", path.display())),
        };
        cfg.validate().with_context(|| format!("validating config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("parsing config toml")
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("parsing config json")
    }

    /// Candidate config locations, most specific last: the user config
    /// directory, then the current directory.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(dir) = dirs::config_dir() {
            for name in CONFIG_FILE_NAMES {
                paths.push(dir.join("glyphtile").join(name));
            }
        }
        for name in CONFIG_FILE_NAMES {
            paths.push(PathBuf::from(name));
        }
        paths
    }

    /// Load `explicit` if given, otherwise the last existing file of
    /// [`AppConfig::search_paths`], otherwise the built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match Self::search_paths().into_iter().filter(|p| p.exists()).last() {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.presets.contains_key(&self.default_preset) {
            return Err(anyhow!("default preset '{}' is not defined", self.default_preset));
        }
        for (name, preset) in &self.presets {
            if preset.columns == 0 {
                return Err(anyhow!("preset '{}' has zero columns", name));
            }
            preset.erosion().validate().with_context(|| format!("preset '{}'", name))?;
        }
        Ok(())
    }

    pub fn preset(&self, name: &str) -> Option<&Preset> {
        self.presets.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.preset("default").unwrap().columns, 200);
        assert_eq!(cfg.preset("small").unwrap().erosion(), ErosionParams::new(3, 4));
        assert_eq!(cfg.compression, Some(CompressionLevel::Medium));
    }

    #[test]
    fn toml_config() {
        let cfg = AppConfig::from_toml_str(
            r#"
            default_preset = "fine"
            glyph_dir = "/usr/share/glyphs"
            compression = "high"

            [presets.fine]
            columns = 300
            kernel_size = 5

            [ffmpeg]
            ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"
            "#,
        )
        .unwrap();
        cfg.validate().unwrap();
        let fine = cfg.preset("fine").unwrap();
        assert_eq!((fine.columns, fine.kernel_size, fine.iterations), (300, 5, 4));
        assert_eq!(cfg.glyph_dir, Some(PathBuf::from("/usr/share/glyphs")));
        assert_eq!(cfg.compression, Some(CompressionLevel::High));
        assert_eq!(cfg.ffmpeg.ffmpeg_cmd(), "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(cfg.ffmpeg.ffprobe_cmd(), "ffprobe");
    }

    #[test]
    fn json_config_round_trips_through_serde() {
        let text = serde_json::to_string(&AppConfig::default()).unwrap();
        assert_eq!(AppConfig::from_json_str(&text).unwrap(), AppConfig::default());
    }

    #[test]
    fn missing_default_preset_is_invalid() {
        let cfg = AppConfig::from_json_str(r#"{"presets": {"a": {"columns": 10}}, "default_preset": "b"}"#).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_column_preset_is_invalid() {
        let cfg = AppConfig::from_json_str(r#"{"presets": {"default": {"columns": 0}}}"#).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn from_file_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glyphtile.toml");
        fs::write(&path, "[presets.default]\ncolumns = 42\n").unwrap();
        assert_eq!(AppConfig::from_file(&path).unwrap().preset("default").unwrap().columns, 42);

        let bad = dir.path().join("glyphtile.yaml");
        fs::write(&bad, "presets: {}").unwrap();
        assert!(AppConfig::from_file(&bad).is_err());
    }
}

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Result;

const SETTINGS_FILE: &str = "redactfe_settings.cfg";

/// Editor settings that persist across sessions
#[derive(Clone, Debug, PartialEq)]
pub struct RedactSettings {
    /// Brush diameter in image pixels
    pub brush_size: f32,
    /// Total blur strength
    pub blur_intensity: f32,
    /// Sequential passes the blur is split into (high quality only)
    pub blur_passes: u32,
    /// Multi-pass blur; off = one pass at full intensity
    pub high_quality: bool,
    /// Maximum number of undo steps
    pub max_history: usize,
    /// Snapshot memory cap in megabytes (0 = unlimited)
    pub max_history_mb: usize,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    /// Loaded images are downscaled so the longest edge fits this
    pub max_dimension: u32,
    /// Minimum time between two renders outside of a gesture
    pub min_frame_interval_ms: u64,
}

impl Default for RedactSettings {
    fn default() -> Self {
        Self {
            brush_size: 20.0,
            blur_intensity: 15.0,
            blur_passes: 5,
            high_quality: true,
            max_history: 20,
            max_history_mb: 256,
            thumbnail_width: 100,
            thumbnail_height: 75,
            max_dimension: 2500,
            min_frame_interval_ms: 16,
        }
    }
}

impl RedactSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/redactfe/redactfe_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\RedactFE\redactfe_settings.cfg
    /// On macOS:   ~/Library/Application Support/RedactFE/redactfe_settings.cfg
    /// Fallback:   same directory as the executable.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("redactfe");
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).unwrap_or_else(|_| {
                std::env::current_exe()
                    .ok()
                    .and_then(|p| p.parent().map(|d| d.to_string_lossy().into_owned()))
                    .unwrap_or_default()
            });
            return Some(PathBuf::from(appdata).join("RedactFE").join(SETTINGS_FILE));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("RedactFE")
                    .join(SETTINGS_FILE),
            );
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join(SETTINGS_FILE)))
        }
    }

    /// Parse `key=value` lines. Unknown keys are ignored and unparsable
    /// values keep their default.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "brush_size" => {
                    if let Some(v) = val.parse::<f32>().ok().filter(|v| v.is_finite() && *v > 0.0) {
                        s.brush_size = v;
                    }
                }
                "blur_intensity" => {
                    if let Some(v) = val.parse::<f32>().ok().filter(|v| v.is_finite() && *v >= 0.0) {
                        s.blur_intensity = v;
                    }
                }
                "blur_passes" => {
                    s.blur_passes = val.parse::<u32>().ok().filter(|&v| v >= 1).unwrap_or(s.blur_passes);
                }
                "high_quality" => {
                    s.high_quality = val == "true";
                }
                "max_history" => {
                    s.max_history = val.parse::<usize>().ok().filter(|&v| v >= 1).unwrap_or(s.max_history);
                }
                "max_history_mb" => {
                    s.max_history_mb = val.parse().unwrap_or(s.max_history_mb);
                }
                "thumbnail_width" => {
                    s.thumbnail_width = val.parse().unwrap_or(s.thumbnail_width);
                }
                "thumbnail_height" => {
                    s.thumbnail_height = val.parse().unwrap_or(s.thumbnail_height);
                }
                "max_dimension" => {
                    s.max_dimension = val.parse::<u32>().ok().filter(|&v| v >= 1).unwrap_or(s.max_dimension);
                }
                "min_frame_interval_ms" => {
                    s.min_frame_interval_ms = val.parse().unwrap_or(s.min_frame_interval_ms);
                }
                _ => {}
            }
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "brush_size={}\n\
             blur_intensity={}\n\
             blur_passes={}\n\
             high_quality={}\n\
             max_history={}\n\
             max_history_mb={}\n\
             thumbnail_width={}\n\
             thumbnail_height={}\n\
             max_dimension={}\n\
             min_frame_interval_ms={}\n",
            self.brush_size,
            self.blur_intensity,
            self.blur_passes,
            self.high_quality,
            self.max_history,
            self.max_history_mb,
            self.thumbnail_width,
            self.thumbnail_height,
            self.max_dimension,
            self.min_frame_interval_ms,
        )
    }

    /// History byte cap, `None` when unlimited.
    pub fn history_memory_limit(&self) -> Option<usize> {
        (self.max_history_mb > 0).then(|| self.max_history_mb * 1024 * 1024)
    }

    /// Load settings from disk (returns default if file missing or corrupt)
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                debug!(path = %path.display(), "settings loaded");
                Self::parse(&content)
            }
            Err(_) => Self::default(),
        }
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::settings_path() else {
            warn!("no settings location available");
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_survive_a_round_trip() {
        let s = RedactSettings::default();
        assert_eq!(RedactSettings::parse(&s.to_config_string()), s);
    }

    #[test]
    fn bad_values_and_unknown_keys_fall_back() {
        let s = RedactSettings::parse(
            "brush_size=abc\nblur_passes=0\nhigh_quality=false\ntheme=dark\nnot a line\nmax_history= 7 \n",
        );
        assert_eq!(s.brush_size, 20.0);
        assert_eq!(s.blur_passes, 5);
        assert!(!s.high_quality);
        assert_eq!(s.max_history, 7);
    }

    #[test]
    fn memory_limit_zero_is_unlimited() {
        let mut s = RedactSettings::default();
        assert_eq!(s.history_memory_limit(), Some(256 * 1024 * 1024));
        s.max_history_mb = 0;
        assert_eq!(s.history_memory_limit(), None);
    }

    #[test]
    fn save_and_load_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);
        let s = RedactSettings { brush_size: 42.5, blur_passes: 2, ..Default::default() };
        s.save_to(&path).unwrap();
        assert_eq!(RedactSettings::load_from(&path), s);
        assert_eq!(RedactSettings::load_from(&dir.path().join("missing.cfg")), RedactSettings::default());
    }
}

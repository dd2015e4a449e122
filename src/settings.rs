use std::path::{Path, PathBuf};

use crate::components::history::{DEFAULT_MAX_AREA, DEFAULT_MAX_ENTRIES};
use crate::ops::smoothing::DEFAULT_SAMPLES_PER_UNIT;
use crate::overlay::{DEFAULT_LEVELS, ToneMap};
use crate::viewport::DEFAULT_MAX_SCALE;

/// Engine settings that persist across sessions.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmenterSettings {
    /// Largest zoom in canvas pixels per image pixel
    pub max_scale: f32,
    /// Number of overlay pyramid levels (level k is reduced by 2^k)
    pub pyramid_levels: usize,
    /// Maximum number of undo steps
    pub max_undo_entries: usize,
    /// Pixel-area budget for undo snapshots
    pub max_undo_area: u64,
    /// Brush diameter in image pixels
    pub brush_size: f32,
    pub min_brush_size: f32,
    pub max_brush_size: f32,
    /// Smooth freehand contours before filling
    pub smoothing: bool,
    pub samples_per_unit: f32,
    /// Tone curve for the base image
    pub tone_map: ToneMap,
    pub show_segmentation: bool,
    /// Debounce for display-only changes, in milliseconds (0 = immediate)
    pub display_delay_ms: u64,
}

impl Default for SegmenterSettings {
    fn default() -> Self {
        Self {
            max_scale: DEFAULT_MAX_SCALE,
            pyramid_levels: DEFAULT_LEVELS,
            max_undo_entries: DEFAULT_MAX_ENTRIES,
            max_undo_area: DEFAULT_MAX_AREA,
            brush_size: 10.0,
            min_brush_size: 1.0,
            max_brush_size: 200.0,
            smoothing: true,
            samples_per_unit: DEFAULT_SAMPLES_PER_UNIT,
            tone_map: ToneMap::None,
            show_segmentation: true,
            display_delay_ms: 150,
        }
    }
}

impl SegmenterSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/segmenter/segmenter_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\segmenter\segmenter_settings.cfg
    /// On macOS:   ~/Library/Application Support/segmenter/segmenter_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
            return Some(PathBuf::from(appdata).join("segmenter").join("segmenter_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("segmenter")
                    .join("segmenter_settings.cfg"),
            );
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
                .ok()?;
            Some(config_dir.join("segmenter").join("segmenter_settings.cfg"))
        }
    }

    /// Load from the default path (defaults if the file is missing or corrupt).
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_config_str(&content),
            Err(_) => Self::default(),
        }
    }

    /// Save to the default path.
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::settings_path().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "no settings directory")
        })?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "max_scale={}\n\
             pyramid_levels={}\n\
             max_undo_entries={}\n\
             max_undo_area={}\n\
             brush_size={}\n\
             min_brush_size={}\n\
             max_brush_size={}\n\
             smoothing={}\n\
             samples_per_unit={}\n\
             tone_map={}\n\
             show_segmentation={}\n\
             display_delay_ms={}\n",
            self.max_scale,
            self.pyramid_levels,
            self.max_undo_entries,
            self.max_undo_area,
            self.brush_size,
            self.min_brush_size,
            self.max_brush_size,
            self.smoothing,
            self.samples_per_unit,
            tone_map_to_str(self.tone_map),
            self.show_segmentation,
            self.display_delay_ms,
        )
    }

    /// Parse `key=value` lines.  Unknown keys and unparsable values keep
    /// their defaults.
    pub fn from_config_str(content: &str) -> Self {
        let mut s = Self::default();
        let d = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "max_scale" => s.max_scale = parse_positive(val).unwrap_or(d.max_scale),
                "pyramid_levels" => {
                    s.pyramid_levels = val.parse().ok().filter(|l| (1..=16).contains(l)).unwrap_or(d.pyramid_levels)
                }
                "max_undo_entries" => {
                    s.max_undo_entries = val.parse().ok().filter(|n| *n > 0).unwrap_or(d.max_undo_entries)
                }
                "max_undo_area" => s.max_undo_area = val.parse().unwrap_or(d.max_undo_area),
                "brush_size" => s.brush_size = parse_positive(val).unwrap_or(d.brush_size),
                "min_brush_size" => s.min_brush_size = parse_positive(val).unwrap_or(d.min_brush_size),
                "max_brush_size" => s.max_brush_size = parse_positive(val).unwrap_or(d.max_brush_size),
                "smoothing" => s.smoothing = val == "true",
                "samples_per_unit" => s.samples_per_unit = parse_positive(val).unwrap_or(d.samples_per_unit),
                "tone_map" => s.tone_map = str_to_tone_map(val).unwrap_or(d.tone_map),
                "show_segmentation" => s.show_segmentation = val == "true",
                "display_delay_ms" => s.display_delay_ms = val.parse().unwrap_or(d.display_delay_ms),
                _ => {}
            }
        }
        if s.min_brush_size > s.max_brush_size {
            s.min_brush_size = d.min_brush_size;
            s.max_brush_size = d.max_brush_size;
        }
        s.brush_size = s.brush_size.clamp(s.min_brush_size, s.max_brush_size);
        s
    }
}

fn parse_positive(val: &str) -> Option<f32> {
    val.parse::<f32>().ok().filter(|v| v.is_finite() && *v > 0.0)
}

/// "none" | "invert" | "brightness:<gamma>"
fn tone_map_to_str(t: ToneMap) -> String {
    match t {
        ToneMap::None => "none".to_string(),
        ToneMap::Invert => "invert".to_string(),
        ToneMap::Brightness { gamma } => format!("brightness:{}", gamma),
    }
}

fn str_to_tone_map(s: &str) -> Option<ToneMap> {
    match s {
        "none" => Some(ToneMap::None),
        "invert" => Some(ToneMap::Invert),
        _ => {
            let gamma = parse_positive(s.strip_prefix("brightness:")?)?;
            Some(ToneMap::Brightness { gamma })
        }
    }
}

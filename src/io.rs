use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Maximum supported image dimension in pixels (per axis).
/// Prevents memory exhaustion from crafted or corrupt inputs.
pub const MAX_IMAGE_DIM: u32 = 32_768;

// ============================================================================
// IMAGE LOADING
// ============================================================================

/// Error type for image loading
#[derive(Debug)]
pub enum LoadError {
    Io(std::io::Error),
    Decode(image::ImageError),
    InvalidDimensions { width: u32, height: u32 },
    /// The session already holds an image or a load failure; reset it first.
    SessionNotLoading,
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "I/O error: {}", e),
            LoadError::Decode(e) => write!(f, "decode error: {}", e),
            LoadError::InvalidDimensions { width, height } => {
                write!(f, "unsupported image size {}×{}", width, height)
            }
            LoadError::SessionNotLoading => write!(f, "session is not waiting for an image"),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e)
    }
}

impl From<image::ImageError> for LoadError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::IoError(io) => LoadError::Io(io),
            other => LoadError::Decode(other),
        }
    }
}

/// Reject empty or oversized rasters.
pub fn check_dimensions(width: u32, height: u32) -> Result<(), LoadError> {
    if width == 0 || height == 0 || width > MAX_IMAGE_DIM || height > MAX_IMAGE_DIM {
        return Err(LoadError::InvalidDimensions { width, height });
    }
    Ok(())
}

/// Synchronously decode any format supported by the `image` crate to RGBA.
pub fn load_image(path: &Path) -> Result<RgbaImage, LoadError> {
    let img = image::open(path)?.to_rgba8();
    check_dimensions(img.width(), img.height())?;
    Ok(img)
}

/// Decode an in-memory encoded image (PNG, JPEG, …).
pub fn load_image_from_memory(bytes: &[u8]) -> Result<RgbaImage, LoadError> {
    let img = image::load_from_memory(bytes)?.to_rgba8();
    check_dimensions(img.width(), img.height())?;
    Ok(img)
}

// ============================================================================
// SAVE PAYLOAD
// ============================================================================

/// What the save collaborator receives.
///
/// `label_rle` is the flat `(count, value)` run list of the label map and
/// `tags[i]` (`[name, "#rrggbb"]`) describes label value `i + 1`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavePayload {
    pub width: u32,
    pub height: u32,
    #[serde(rename = "labelRLE")]
    pub label_rle: Vec<u32>,
    pub tags: Vec<(String, String)>,
}

/// Error type for payload encoding and delivery
#[derive(Debug)]
pub enum SaveError {
    Io(std::io::Error),
    Serialize(String),
    Rejected(String),
}

impl std::fmt::Display for SaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaveError::Io(e) => write!(f, "I/O error: {}", e),
            SaveError::Serialize(e) => write!(f, "serialization error: {}", e),
            SaveError::Rejected(e) => write!(f, "save rejected: {}", e),
        }
    }
}

impl std::error::Error for SaveError {}

impl From<std::io::Error> for SaveError {
    fn from(e: std::io::Error) -> Self {
        SaveError::Io(e)
    }
}

impl From<serde_json::Error> for SaveError {
    fn from(e: serde_json::Error) -> Self {
        SaveError::Serialize(e.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for SaveError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        SaveError::Serialize(e.to_string())
    }
}

impl SavePayload {
    pub fn to_json(&self) -> Result<String, SaveError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, SaveError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Compact binary form.
    pub fn to_bincode(&self) -> Result<Vec<u8>, SaveError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bincode(bytes: &[u8]) -> Result<Self, SaveError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// The external collaborator that persists a finished segmentation.
pub trait SaveSink {
    fn save(&mut self, payload: &SavePayload) -> Result<(), SaveError>;
}

/// Writes the payload as JSON to a fixed path.
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SaveSink for JsonFileSink {
    fn save(&mut self, payload: &SavePayload) -> Result<(), SaveError> {
        let writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer(writer, payload)?;
        Ok(())
    }
}

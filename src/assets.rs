use crate::error::CertError;
use image::GenericImageView;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Decoded raster image ready for embedding: 8-bit RGB samples plus an optional alpha plane.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAsset {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
    pub alpha: Option<Vec<u8>>,
}

impl ImageAsset {
    pub fn load(path: &Path) -> Result<Self, CertError> {
        let bytes = std::fs::read(path).map_err(|err| {
            CertError::Image(format!("cannot read image {}: {err}", path.display()))
        })?;
        Self::from_bytes(&bytes)
            .map_err(|err| CertError::Image(format!("{}: {err}", path.display())))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, CertError> {
        let decoded =
            image::load_from_memory(data).map_err(|err| CertError::Image(err.to_string()))?;
        let (width, height) = decoded.dimensions();
        let rgba = decoded.to_rgba8();
        let mut rgb = Vec::with_capacity((width as usize) * (height as usize) * 3);
        let mut alpha = Vec::with_capacity((width as usize) * (height as usize));
        let mut has_alpha = false;
        for pixel in rgba.pixels() {
            let [r, g, b, a] = pixel.0;
            if a != 255 {
                has_alpha = true;
            }
            rgb.extend_from_slice(&[r, g, b]);
            alpha.push(a);
        }
        Ok(Self {
            width,
            height,
            rgb,
            alpha: has_alpha.then_some(alpha),
        })
    }

    /// Height over width of the pixel grid; 0 for degenerate images.
    pub fn aspect(&self) -> f32 {
        if self.width == 0 {
            return 0.0;
        }
        self.height as f32 / self.width as f32
    }
}

/// Images decoded once per engine; signatures and logos repeat across renders.
#[derive(Debug, Default)]
pub struct ImageCache {
    entries: Mutex<HashMap<PathBuf, Arc<ImageAsset>>>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(&self, path: &Path) -> Result<Arc<ImageAsset>, CertError> {
        if let Ok(entries) = self.entries.lock() {
            if let Some(found) = entries.get(path) {
                return Ok(found.clone());
            }
        }
        let loaded = Arc::new(ImageAsset::load(path)?);
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(path.to_path_buf(), loaded.clone());
        }
        Ok(loaded)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

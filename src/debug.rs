use std::path::{Path, PathBuf};

use image::{GrayImage, RgbImage};
use log::debug;

use crate::error::{PlateError, Result};

/// Writes intermediate pipeline images to a directory for inspection.
#[derive(Clone, Debug)]
pub struct DebugOutput {
    output_dir: PathBuf,
}

impl DebugOutput {
    /// The directory must be empty or non-existent
    pub fn new(output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let mut entries = std::fs::read_dir(&output_dir).map_err(debug_err)?;
            if entries.next().is_some() {
                return Err(PlateError::Debug(format!(
                    "debug directory is not empty: {}",
                    output_dir.display()
                )));
            }
        } else {
            std::fs::create_dir_all(&output_dir).map_err(debug_err)?;
        }
        Ok(Self { output_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.output_dir
    }

    /// Output for one input of a multi-image run, in its own subdirectory.
    pub fn for_item(&self, name: &str) -> Result<Self> {
        Self::new(self.output_dir.join(name))
    }

    pub fn save_gray(&self, name: &str, img: &GrayImage) -> Result<()> {
        let path = self.output_dir.join(format!("{}.png", name));
        img.save(&path).map_err(debug_err)?;
        debug!("Debug: saved {}", path.display());
        Ok(())
    }

    pub fn save_rgb(&self, name: &str, img: &RgbImage) -> Result<()> {
        let path = self.output_dir.join(format!("{}.png", name));
        img.save(&path).map_err(debug_err)?;
        debug!("Debug: saved {}", path.display());
        Ok(())
    }

    /// Save a padded candidate crop as `06_candidates/NN.png` (1-indexed).
    pub fn save_candidate(&self, index: usize, img: &RgbImage) -> Result<()> {
        let dir = self.output_dir.join("06_candidates");
        std::fs::create_dir_all(&dir).map_err(debug_err)?;
        let path = dir.join(format!("{:02}.png", index + 1));
        img.save(&path).map_err(debug_err)?;
        debug!("Debug: saved {}", path.display());
        Ok(())
    }
}

fn debug_err(e: impl std::fmt::Display) -> PlateError {
    PlateError::Debug(e.to_string())
}

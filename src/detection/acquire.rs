use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::RgbImage;
use log::debug;
use url::Url;

use crate::config::AcquireConfig;
use crate::error::{PlateError, Result};

/// Where an input image lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLocation {
    Url(Url),
    Path(PathBuf),
}

impl ImageLocation {
    /// `http(s)://` becomes a URL, `file://` and anything else a path.
    pub fn parse(raw: &str) -> Self {
        if let Ok(url) = Url::parse(raw) {
            match url.scheme() {
                "http" | "https" => return ImageLocation::Url(url),
                "file" => {
                    if let Ok(path) = url.to_file_path() {
                        return ImageLocation::Path(path);
                    }
                }
                _ => {}
            }
        }
        ImageLocation::Path(PathBuf::from(raw))
    }
}

impl fmt::Display for ImageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageLocation::Url(url) => write!(f, "{}", url),
            ImageLocation::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

impl From<&Path> for ImageLocation {
    fn from(path: &Path) -> Self {
        ImageLocation::Path(path.to_path_buf())
    }
}

/// Fetches, decodes and width-normalizes input images.
pub struct ImageAcquirer {
    config: AcquireConfig,
    agent: ureq::Agent,
}

impl ImageAcquirer {
    pub fn new(config: AcquireConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.fetch_timeout())
            .build();
        Self { config, agent }
    }

    /// Retrieve, decode and normalize the image at `location`.
    pub fn acquire(&self, location: &ImageLocation) -> Result<RgbImage> {
        let bytes = match location {
            ImageLocation::Url(url) => self.fetch(url)?,
            ImageLocation::Path(path) => read_file(path)?,
        };
        debug!("Read {} bytes from {}", bytes.len(), location);

        let decoded = decode(&bytes, &location.to_string())?;
        Ok(normalize_width(decoded, self.config.max_width))
    }

    fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        let source_ref = url.to_string();
        let response = self.agent.get(url.as_str()).call().map_err(|e| match e {
            ureq::Error::Status(code, _) => PlateError::Acquisition {
                source_ref: source_ref.clone(),
                reason: format!("HTTP status {}", code),
            },
            ureq::Error::Transport(transport) => {
                if transport_timed_out(&transport) {
                    PlateError::Timeout {
                        stage: "image fetch",
                        budget: self.config.fetch_timeout(),
                    }
                } else {
                    PlateError::Acquisition {
                        source_ref: source_ref.clone(),
                        reason: transport.to_string(),
                    }
                }
            }
        })?;

        let limit = self.config.max_download_bytes;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(limit + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| {
                if is_timeout(&e) {
                    PlateError::Timeout {
                        stage: "image fetch",
                        budget: self.config.fetch_timeout(),
                    }
                } else {
                    PlateError::Acquisition {
                        source_ref: source_ref.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        if bytes.len() as u64 > limit {
            return Err(PlateError::Acquisition {
                source_ref,
                reason: format!("response exceeds {} bytes", limit),
            });
        }
        Ok(bytes)
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| PlateError::Acquisition {
        source_ref: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn transport_timed_out(transport: &ureq::Transport) -> bool {
    std::error::Error::source(transport)
        .and_then(|source| source.downcast_ref::<io::Error>())
        .is_some_and(is_timeout)
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

/// Decode raw bytes into an RGB raster, sniffing the format.
pub fn decode(bytes: &[u8], source_ref: &str) -> Result<RgbImage> {
    let img = image::load_from_memory(bytes).map_err(|e| PlateError::Decode {
        source_ref: source_ref.to_string(),
        reason: e.to_string(),
    })?;
    let rgb = img.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(PlateError::EmptyImage {
            width: rgb.width(),
            height: rgb.height(),
        });
    }
    Ok(rgb)
}

/// Target dimensions for an image of `width` x `height`.
///
/// Wider than `max_width` scales to exactly `max_width` wide with height
/// `round(max_width * height / width)`; otherwise unchanged.
pub fn normalized_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width {
        return (width, height);
    }
    let scaled = (max_width as f64 * height as f64 / width as f64).round() as u32;
    (max_width, scaled.max(1))
}

/// Resize `img` down to `max_width` if it is wider.
pub fn normalize_width(img: RgbImage, max_width: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    let (target_w, target_h) = normalized_dimensions(width, height, max_width);
    if (target_w, target_h) == (width, height) {
        return img;
    }
    debug!("Resizing {}x{} -> {}x{}", width, height, target_w, target_h);
    image::imageops::resize(&img, target_w, target_h, FilterType::Triangle)
}

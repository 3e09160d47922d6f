use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::filter::separable_filter_equal;
use imageproc::morphology::dilate;
use log::debug;

use crate::config::PreprocessConfig;
use crate::debug::DebugOutput;
use crate::detection::{clahe, denoise};
use crate::error::{PlateError, Result};
use crate::models::BinaryMask;

/// Convert image to grayscale
pub fn to_grayscale(img: &RgbImage) -> GrayImage {
    image::imageops::grayscale(img)
}

/// Sigma implied by a Gaussian kernel of `size` taps.
pub fn gaussian_sigma_for_size(size: u32) -> f32 {
    0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = gaussian_sigma_for_size(size);
    let center = (size / 2) as f32;
    let mut kernel: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f32 = kernel.iter().sum();
    for k in kernel.iter_mut() {
        *k /= total;
    }
    kernel
}

/// Binarize against a Gaussian-weighted local mean.
///
/// A pixel becomes 255 when it is brighter than its neighbourhood mean
/// minus `offset`, else 0.
pub fn adaptive_threshold_gaussian(gray: &GrayImage, block_size: u32, offset: f32) -> GrayImage {
    let kernel = gaussian_kernel(block_size);
    let local_mean: GrayImage = separable_filter_equal(gray, &kernel);

    let mut out = GrayImage::new(gray.width(), gray.height());
    for ((src, mean), dst) in gray
        .pixels()
        .zip(local_mean.pixels())
        .zip(out.pixels_mut())
    {
        let value = if src[0] as f32 > mean[0] as f32 - offset {
            255u8
        } else {
            0u8
        };
        *dst = Luma([value]);
    }
    out
}

/// Dilate with a 3x3 square element `iterations` times.
pub fn dilate_square(mask: &GrayImage, iterations: u32) -> GrayImage {
    let mut out = mask.clone();
    for _ in 0..iterations {
        out = dilate(&out, Norm::LInf, 1);
    }
    out
}

/// Turns a color raster into a contour-ready binary mask.
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn process(&self, img: &RgbImage) -> Result<BinaryMask> {
        self.process_with_debug(img, None)
    }

    /// Grayscale, CLAHE, NL-means, adaptive threshold, dilation.
    pub fn process_with_debug(
        &self,
        img: &RgbImage,
        debug_out: Option<&DebugOutput>,
    ) -> Result<BinaryMask> {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(PlateError::EmptyImage { width, height });
        }
        let cfg = &self.config;

        debug!("Converting to grayscale...");
        let gray = to_grayscale(img);
        save_stage(debug_out, "01_grayscale", &gray)?;

        debug!(
            "Applying CLAHE (clip {}, {}x{} tiles)...",
            cfg.clahe_clip_limit, cfg.clahe_tiles, cfg.clahe_tiles
        );
        let equalized = clahe::equalize(&gray, cfg.clahe_clip_limit, cfg.clahe_tiles);
        save_stage(debug_out, "02_clahe", &equalized)?;

        debug!("Denoising (h = {})...", cfg.denoise_strength);
        let denoised = denoise::denoise(
            &equalized,
            denoise::NlMeansParams {
                h: cfg.denoise_strength,
                patch_size: cfg.denoise_patch_size,
                search_size: cfg.denoise_search_size,
            },
        );
        save_stage(debug_out, "03_denoised", &denoised)?;

        debug!(
            "Adaptive threshold (block {}, offset {})...",
            cfg.threshold_block_size, cfg.threshold_offset
        );
        let binary =
            adaptive_threshold_gaussian(&denoised, cfg.threshold_block_size, cfg.threshold_offset);
        save_stage(debug_out, "04_threshold", &binary)?;

        let dilated = dilate_square(&binary, cfg.dilate_iterations);
        save_stage(debug_out, "05_mask", &dilated)?;

        Ok(BinaryMask::from_gray(dilated))
    }
}

fn save_stage(debug_out: Option<&DebugOutput>, name: &str, img: &GrayImage) -> Result<()> {
    match debug_out {
        Some(out) => out.save_gray(name, img),
        None => Ok(()),
    }
}

//! Non-local-means denoising for single-channel images.
//!
//! For every displacement inside the search window the squared difference
//! between the image and its shifted copy is integrated once, which turns
//! each patch distance into four lookups.

use image::{GrayImage, Luma};
use rayon::prelude::*;

/// Parameters mirroring the classic fast NL-means defaults.
#[derive(Debug, Clone, Copy)]
pub struct NlMeansParams {
    /// Filter strength; larger removes more noise and more detail
    pub h: f32,
    /// Odd side length of the compared patches
    pub patch_size: u32,
    /// Odd side length of the search window
    pub search_size: u32,
}

impl Default for NlMeansParams {
    fn default() -> Self {
        Self {
            h: 30.0,
            patch_size: 7,
            search_size: 21,
        }
    }
}

pub fn denoise(gray: &GrayImage, params: NlMeansParams) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }
    let w = width as usize;
    let h = height as usize;
    let patch_r = (params.patch_size / 2) as i64;
    let search_r = (params.search_size / 2) as i64;
    let inv_h2 = 1.0 / (params.h * params.h).max(f32::EPSILON);

    let src = gray.as_raw();
    let mut weight_sum = vec![0f32; w * h];
    let mut value_sum = vec![0f32; w * h];
    let mut integral = vec![0u64; (w + 1) * (h + 1)];

    for dy in -search_r..=search_r {
        for dx in -search_r..=search_r {
            integrate_shifted_diff(src, w, h, dx, dy, &mut integral);
            let integral = &integral;

            weight_sum
                .par_chunks_mut(w)
                .zip(value_sum.par_chunks_mut(w))
                .enumerate()
                .for_each(|(y, (row_w, row_v))| {
                    let y0 = (y as i64 - patch_r).max(0) as usize;
                    let y1 = (y as i64 + patch_r + 1).min(h as i64) as usize;
                    let sy = clamp_index(y as i64 + dy, h);
                    for x in 0..w {
                        let x0 = (x as i64 - patch_r).max(0) as usize;
                        let x1 = (x as i64 + patch_r + 1).min(w as i64) as usize;
                        let ssd = box_sum(integral, w, x0, y0, x1, y1);
                        let count = ((x1 - x0) * (y1 - y0)) as f32;
                        let weight = patch_weight(ssd as f32 / count, inv_h2);
                        let sx = clamp_index(x as i64 + dx, w);
                        row_w[x] += weight;
                        row_v[x] += weight * src[sy * w + sx] as f32;
                    }
                });
        }
    }

    let mut out = GrayImage::new(width, height);
    for (i, pixel) in out.pixels_mut().enumerate() {
        let value = if weight_sum[i] > 0.0 {
            value_sum[i] / weight_sum[i]
        } else {
            src[i] as f32
        };
        *pixel = Luma([value.round().clamp(0.0, 255.0) as u8]);
    }
    out
}

fn clamp_index(i: i64, len: usize) -> usize {
    i.clamp(0, len as i64 - 1) as usize
}

fn patch_weight(mean_sq_distance: f32, inv_h2: f32) -> f32 {
    (-mean_sq_distance * inv_h2).exp()
}

/// Fill `integral` with the summed-area table of `(I(p) - I(p + d))^2`.
fn integrate_shifted_diff(src: &[u8], w: usize, h: usize, dx: i64, dy: i64, integral: &mut [u64]) {
    let stride = w + 1;
    integral[..stride].fill(0);
    for y in 0..h {
        let sy = clamp_index(y as i64 + dy, h);
        let mut row_sum = 0u64;
        integral[(y + 1) * stride] = 0;
        for x in 0..w {
            let sx = clamp_index(x as i64 + dx, w);
            let d = src[y * w + x] as i64 - src[sy * w + sx] as i64;
            row_sum += (d * d) as u64;
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
        }
    }
}

fn box_sum(integral: &[u64], w: usize, x0: usize, y0: usize, x1: usize, y1: usize) -> u64 {
    let stride = w + 1;
    integral[y1 * stride + x1] + integral[y0 * stride + x0]
        - integral[y0 * stride + x1]
        - integral[y1 * stride + x0]
}

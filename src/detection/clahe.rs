//! Contrast-limited adaptive histogram equalization.
//!
//! The image is split into a `tiles x tiles` grid. Each tile gets its own
//! equalization lookup table built from a clipped histogram, and every
//! output pixel blends the tables of the four nearest tile centres.
//! When the grid does not divide the image evenly, the trailing tiles are
//! filled by mirroring the image past its right and bottom edges, so the
//! grid always has `tiles` cells per axis.

use image::{GrayImage, Luma};

const BINS: usize = 256;

/// Apply CLAHE with the given clip limit and square tile grid.
pub fn equalize(gray: &GrayImage, clip_limit: f32, tiles: u32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }

    let tiles = tiles.max(1);
    let tile_w = width.div_ceil(tiles);
    let tile_h = height.div_ceil(tiles);
    let area = tile_w * tile_h;

    let mut luts = Vec::with_capacity((tiles * tiles) as usize);
    for ty in 0..tiles {
        for tx in 0..tiles {
            let hist = tile_histogram(gray, tx * tile_w, ty * tile_h, tile_w, tile_h);
            luts.push(tile_lut(hist, area, clip_limit));
        }
    }

    let lut_index = |tx: u32, ty: u32| (ty * tiles + tx) as usize;

    let mut out = GrayImage::new(width, height);
    for (x, y, pixel) in gray.enumerate_pixels() {
        // Position relative to tile centres
        let fx = (x as f32 + 0.5) / tile_w as f32 - 0.5;
        let fy = (y as f32 + 0.5) / tile_h as f32 - 0.5;

        let tx0 = fx.floor().clamp(0.0, (tiles - 1) as f32) as u32;
        let ty0 = fy.floor().clamp(0.0, (tiles - 1) as f32) as u32;
        let tx1 = (tx0 + 1).min(tiles - 1);
        let ty1 = (ty0 + 1).min(tiles - 1);
        let ax = (fx - tx0 as f32).clamp(0.0, 1.0);
        let ay = (fy - ty0 as f32).clamp(0.0, 1.0);

        let v = pixel[0] as usize;
        let sample = |tx: u32, ty: u32| luts[lut_index(tx, ty)][v] as f32;
        let top = sample(tx0, ty0) * (1.0 - ax) + sample(tx1, ty0) * ax;
        let bottom = sample(tx0, ty1) * (1.0 - ax) + sample(tx1, ty1) * ax;
        let value = top * (1.0 - ay) + bottom * ay;

        out.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
    }
    out
}

/// Mirror `i` into `0..len` without repeating the edge sample
/// (`.. 2 1 | 0 1 2 .. n-1 | n-2 n-3 ..`).
fn reflect_101(i: u32, len: u32) -> u32 {
    if len <= 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let m = i % period;
    if m >= len { period - m } else { m }
}

/// Histogram of the `tile_w x tile_h` cell at `(x0, y0)`, mirroring
/// coordinates that fall outside the image.
fn tile_histogram(gray: &GrayImage, x0: u32, y0: u32, tile_w: u32, tile_h: u32) -> [u32; BINS] {
    let (width, height) = gray.dimensions();
    let mut hist = [0u32; BINS];
    for y in y0..y0 + tile_h {
        let sy = reflect_101(y, height);
        for x in x0..x0 + tile_w {
            let sx = reflect_101(x, width);
            hist[gray.get_pixel(sx, sy)[0] as usize] += 1;
        }
    }
    hist
}

/// Clip the histogram, spread the excess evenly and integrate into a LUT.
fn tile_lut(mut hist: [u32; BINS], area: u32, clip_limit: f32) -> [u8; BINS] {
    let mut lut = [0u8; BINS];
    if area == 0 {
        for (i, entry) in lut.iter_mut().enumerate() {
            *entry = i as u8;
        }
        return lut;
    }

    let limit = ((clip_limit * area as f32 / BINS as f32) as u32).max(1);

    let mut excess = 0u32;
    for count in hist.iter_mut() {
        if *count > limit {
            excess += *count - limit;
            *count = limit;
        }
    }

    let per_bin = excess / BINS as u32;
    let residual = excess % BINS as u32;
    for count in hist.iter_mut() {
        *count += per_bin;
    }
    if residual > 0 {
        let step = (BINS as u32 / residual).max(1) as usize;
        for count in hist.iter_mut().step_by(step).take(residual as usize) {
            *count += 1;
        }
    }

    let scale = 255.0 / area as f32;
    let mut sum = 0u32;
    for (count, entry) in hist.iter().zip(lut.iter_mut()) {
        sum += count;
        *entry = (sum as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lut_is_monotonic_and_spans_range() {
        let mut hist = [0u32; BINS];
        hist[10] = 50;
        hist[200] = 50;
        let lut = tile_lut(hist, 100, 3.0);
        assert!(lut.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(lut[255], 255);
    }

    #[test]
    fn clipping_limits_single_spike() {
        let mut hist = [0u32; BINS];
        hist[128] = 256;
        // limit = 3 per bin, excess spread across every bin
        let lut = tile_lut(hist, 256, 3.0);
        assert!(lut[127] > 100 && lut[127] < 160);
    }

    #[test]
    fn uniform_image_stays_uniform() {
        let gray = GrayImage::from_pixel(64, 48, Luma([90u8]));
        let out = equalize(&gray, 3.0, 8);
        let first = out.get_pixel(0, 0)[0];
        assert!(out.pixels().all(|p| p[0] == first));
    }

    #[test]
    fn reflection_skips_the_edge_sample() {
        assert_eq!(reflect_101(8, 9), 8);
        assert_eq!(reflect_101(9, 9), 7);
        assert_eq!(reflect_101(10, 9), 6);
        assert_eq!((3..7).map(|i| reflect_101(i, 3)).collect::<Vec<_>>(), vec![1, 0, 1, 2]);
        assert_eq!(reflect_101(5, 1), 0);
    }

    #[test]
    fn trailing_tile_is_filled_by_mirroring() {
        // 9 px wide with 8 tiles: tiles are 2 px, the last one covers x = 14, 15
        let ramp = GrayImage::from_fn(9, 1, |x, _| Luma([x as u8 * 10]));
        let hist = tile_histogram(&ramp, 14, 0, 2, 1);
        assert_eq!(hist[20], 1);
        assert_eq!(hist[10], 1);
        assert_eq!(hist.iter().sum::<u32>(), 2);
    }

    #[test]
    fn preserves_dimensions_for_tiny_images() {
        let gray = GrayImage::from_pixel(3, 2, Luma([10u8]));
        let out = equalize(&gray, 3.0, 8);
        assert_eq!(out.dimensions(), (3, 2));
    }
}

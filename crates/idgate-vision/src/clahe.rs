// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Contrast-limited adaptive histogram equalization.
//
// The image is split into a `grid` x `grid` arrangement of tiles. Each tile
// gets its own clipped histogram and lookup table; every output pixel is a
// bilinear blend of the four nearest tile tables, so tile seams never show.

use image::GrayImage;

/// Equalize `image` with `grid` tiles per axis and the given clip limit.
///
/// `clip_limit` is a multiple of the mean bin height of a tile
/// (`tile_area / 256`). Images smaller than the grid are handled by
/// shrinking the grid to one tile per pixel.
pub fn equalize_clahe(image: &GrayImage, grid: u32, clip_limit: f32) -> GrayImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 || grid == 0 {
        return image.clone();
    }

    let tile_w = w.div_ceil(grid.min(w));
    let tile_h = h.div_ceil(grid.min(h));
    let cols = w.div_ceil(tile_w) as usize;
    let rows = h.div_ceil(tile_h) as usize;

    let mut luts = vec![[0u8; 256]; cols * rows];
    for ty in 0..rows {
        for tx in 0..cols {
            let x0 = tx as u32 * tile_w;
            let y0 = ty as u32 * tile_h;
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);
            let area = ((x1 - x0) * (y1 - y0)) as usize;

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[image.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            clip_histogram(&mut hist, area, clip_limit);
            luts[ty * cols + tx] = build_lut(&hist, area);
        }
    }

    let inv_tw = 1.0 / tile_w as f32;
    let inv_th = 1.0 / tile_h as f32;
    let mut out = GrayImage::new(w, h);

    for y in 0..h {
        let tyf = y as f32 * inv_th - 0.5;
        let ty0 = tyf.floor();
        let ay = tyf - ty0;
        let ty1 = ((ty0 as isize + 1).clamp(0, rows as isize - 1)) as usize;
        let ty0 = ((ty0 as isize).clamp(0, rows as isize - 1)) as usize;

        for x in 0..w {
            let txf = x as f32 * inv_tw - 0.5;
            let tx0 = txf.floor();
            let ax = txf - tx0;
            let tx1 = ((tx0 as isize + 1).clamp(0, cols as isize - 1)) as usize;
            let tx0 = ((tx0 as isize).clamp(0, cols as isize - 1)) as usize;

            let v = image.get_pixel(x, y)[0] as usize;
            let v00 = luts[ty0 * cols + tx0][v] as f32;
            let v10 = luts[ty0 * cols + tx1][v] as f32;
            let v01 = luts[ty1 * cols + tx0][v] as f32;
            let v11 = luts[ty1 * cols + tx1][v] as f32;

            let top = v00 * (1.0 - ax) + v10 * ax;
            let bottom = v01 * (1.0 - ax) + v11 * ax;
            let val = top * (1.0 - ay) + bottom * ay;
            out.put_pixel(x, y, image::Luma([val.round().clamp(0.0, 255.0) as u8]));
        }
    }

    out
}

/// Clip bins above the limit and spread the excess uniformly.
///
/// Whatever does not divide evenly over 256 bins is handed out one count
/// at a time at a regular stride across the histogram.
fn clip_histogram(hist: &mut [u32; 256], area: usize, clip_limit: f32) {
    let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);

    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }

    let batch = excess / 256;
    let residual = (excess - batch * 256) as usize;
    for bin in hist.iter_mut() {
        *bin += batch;
    }
    if residual > 0 {
        let step = (256 / residual).max(1);
        for i in (0..256).step_by(step).take(residual) {
            hist[i] += 1;
        }
    }
}

fn build_lut(hist: &[u32; 256], area: usize) -> [u8; 256] {
    let scale = 255.0 / area as f32;
    let mut lut = [0u8; 256];
    let mut sum = 0u32;
    for (i, &count) in hist.iter().enumerate() {
        sum += count;
        lut[i] = (sum as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Synthetic images shared by the unit tests.

use image::imageops::replace;
use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use idgate_core::{PixelRect, Point, RegionKind, TemplateLayout};

pub(crate) const CARD_BACKGROUND: u8 = 210;
pub(crate) const FRAME_BACKGROUND: u8 = 30;

fn hash(x: u32, y: u32, seed: u32) -> u32 {
    let mut h = x.wrapping_mul(0x9E37_79B1) ^ y.wrapping_mul(0x85EB_CA77) ^ seed.wrapping_mul(0xC2B2_AE3D);
    h ^= h >> 15;
    h = h.wrapping_mul(0x2C1B_3C6D);
    h ^= h >> 12;
    h
}

/// Random-intensity square blocks of side `block`.
pub(crate) fn block_texture(width: u32, height: u32, block: u32, seed: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        Luma([(hash(x / block, y / block, seed) % 256) as u8])
    })
}

fn fill(img: &mut GrayImage, rect: PixelRect, value: impl Fn(u32, u32) -> u8) {
    let Some(r) = rect.clip_to(img.width(), img.height()) else {
        return;
    };
    for y in r.y..r.y + r.height {
        for x in r.x..r.x + r.width {
            img.put_pixel(x, y, Luma([value(x - r.x, y - r.y)]));
        }
    }
}

/// A card-like template: plain light background with a textured chip,
/// a bar-code, three lines of glyph-like MRZ blocks and a decorative band.
/// The default layout is scaled to `width` x `height`.
pub(crate) fn synthetic_card(width: u32, height: u32) -> GrayImage {
    let mut card = GrayImage::from_pixel(width, height, Luma([CARD_BACKGROUND]));
    let sx = width as f32 / 640.0;
    let sy = height as f32 / 404.0;
    let scaled = |r: PixelRect| {
        PixelRect::new(
            (r.x as f32 * sx) as u32,
            (r.y as f32 * sy) as u32,
            (r.width as f32 * sx).max(1.0) as u32,
            (r.height as f32 * sy).max(1.0) as u32,
        )
    };
    let cell = (6.0 * sx).max(1.0) as u32;

    let layout = TemplateLayout::default();
    for region in &layout.regions {
        let rect = scaled(region.rect);
        match region.kind {
            RegionKind::Chip => fill(&mut card, rect, |x, y| {
                (hash(x / cell, y / cell, 1) % 200) as u8 + 20
            }),
            RegionKind::Barcode => fill(&mut card, rect, |x, y| {
                let bar = hash(x / (cell / 2).max(1), 0, 2) % 3;
                let notch = hash(x / cell, y / (cell * 3), 5) % 4 == 0;
                if bar == 0 || notch { 230 } else { 25 }
            }),
            RegionKind::MachineReadableZone => fill(&mut card, rect, |x, y| {
                // Glyph cells of 2x3 sub-blocks with a gap column and row.
                let (gw, gh) = (cell * 2 + cell / 2, cell * 4);
                let (gx, gy) = (x / gw, y / gh);
                let (ix, iy) = (x % gw, y % gh);
                if ix >= cell * 2 || iy >= cell * 3 {
                    return CARD_BACKGROUND;
                }
                if hash(gx * 2 + ix / cell, gy * 3 + iy / cell, 3) % 2 == 0 {
                    35
                } else {
                    CARD_BACKGROUND
                }
            }),
            RegionKind::DecorativeText => fill(&mut card, rect, |x, y| {
                if hash(x / cell, y / cell, 4) % 3 == 0 { 90 } else { CARD_BACKGROUND }
            }),
            RegionKind::PenNumber => {}
        }
    }
    card
}

/// A dark `frame_w` x `frame_h` frame with `card` pasted at (`x`, `y`).
pub(crate) fn card_in_frame(card: &GrayImage, frame_w: u32, frame_h: u32, x: i64, y: i64) -> GrayImage {
    let mut frame = GrayImage::from_pixel(frame_w, frame_h, Luma([FRAME_BACKGROUND]));
    replace(&mut frame, card, x, y);
    frame
}

/// Project `card` onto the quadrilateral `quad` (TL, TR, BR, BL) of a dark
/// frame.
pub(crate) fn card_warped_into_frame(card: &GrayImage, frame_w: u32, frame_h: u32, quad: [Point; 4]) -> GrayImage {
    let (w, h) = (card.width() as f32, card.height() as f32);
    let from = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];
    let projection = Projection::from_control_points(from, quad.map(|p| (p.x, p.y)))
        .expect("quad admits a projective transform");
    let mut frame = GrayImage::from_pixel(frame_w, frame_h, Luma([FRAME_BACKGROUND]));
    warp_into(card, &projection, Interpolation::Bilinear, Luma([FRAME_BACKGROUND]), &mut frame);
    frame
}

/// Corners (TL, TR, BR, BL) of a `w` x `h` rectangle centred on `(cx, cy)`
/// and turned `degrees` clockwise.
pub(crate) fn rotated_quad(cx: f32, cy: f32, w: f32, h: f32, degrees: f32) -> [Point; 4] {
    let (sin, cos) = degrees.to_radians().sin_cos();
    [(-w, -h), (w, -h), (w, h), (-w, h)].map(|(dx, dy)| {
        let (dx, dy) = (dx / 2.0, dy / 2.0);
        Point::new(cx + dx * cos - dy * sin, cy + dx * sin + dy * cos)
    })
}

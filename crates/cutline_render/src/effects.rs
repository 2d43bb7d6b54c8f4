//! Per-clip colour effects.
//!
//! A [`FilterChain`] is built from [`ClipEffects`] in a fixed order
//! (brightness, contrast, saturation, hue rotation, blur, opacity) so preview
//! and export always apply the same transforms. Colour filters follow the
//! CSS filter-effects definitions; blur is a box blur whose radius is given
//! at a 1080 pixel tall reference frame.

use crate::raster::Frame;
use cutline_core::types::ClipEffects;
use serde::{Deserialize, Serialize};

/// Frame height the blur radius is expressed against.
pub const BLUR_REFERENCE_HEIGHT: f64 = 1080.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Brightness(f64),
    Contrast(f64),
    Saturate(f64),
    /// Degrees.
    HueRotate(f64),
    /// Pixels at the reference height.
    Blur(f64),
    Opacity(f64),
}

type Matrix = [[f64; 3]; 3];

impl Filter {
    fn css(&self) -> String {
        match self {
            Filter::Brightness(v) => format!("brightness({v})"),
            Filter::Contrast(v) => format!("contrast({v})"),
            Filter::Saturate(v) => format!("saturate({v})"),
            Filter::HueRotate(v) => format!("hue-rotate({v}deg)"),
            Filter::Blur(v) => format!("blur({v}px)"),
            Filter::Opacity(v) => format!("opacity({v})"),
        }
    }

    fn apply_rgb(&self, rgb: [f64; 3]) -> [f64; 3] {
        let out = match *self {
            Filter::Brightness(a) => rgb.map(|c| c * a),
            Filter::Contrast(a) => rgb.map(|c| c * a + (0.5 - 0.5 * a)),
            Filter::Saturate(s) => multiply(&saturate_matrix(s), rgb),
            Filter::HueRotate(deg) => multiply(&hue_rotate_matrix(deg), rgb),
            Filter::Blur(_) | Filter::Opacity(_) => rgb,
        };
        out.map(|c| c.clamp(0.0, 1.0))
    }
}

fn saturate_matrix(s: f64) -> Matrix {
    [
        [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
    ]
}

fn hue_rotate_matrix(deg: f64) -> Matrix {
    let (sin, cos) = deg.to_radians().sin_cos();
    [
        [
            0.213 + cos * 0.787 - sin * 0.213,
            0.715 - cos * 0.715 - sin * 0.715,
            0.072 - cos * 0.072 + sin * 0.928,
        ],
        [
            0.213 - cos * 0.213 + sin * 0.143,
            0.715 + cos * 0.285 + sin * 0.140,
            0.072 - cos * 0.072 - sin * 0.283,
        ],
        [
            0.213 - cos * 0.213 - sin * 0.787,
            0.715 - cos * 0.715 + sin * 0.715,
            0.072 + cos * 0.928 + sin * 0.072,
        ],
    ]
}

fn multiply(m: &Matrix, rgb: [f64; 3]) -> [f64; 3] {
    [0, 1, 2].map(|row| m[row][0] * rgb[0] + m[row][1] * rgb[1] + m[row][2] * rgb[2])
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterChain {
    filters: Vec<Filter>,
}

impl FilterChain {
    pub fn from_effects(effects: &ClipEffects) -> Self {
        let neutral = ClipEffects::default();
        let candidates = [
            (effects.brightness != neutral.brightness, Filter::Brightness(effects.brightness)),
            (effects.contrast != neutral.contrast, Filter::Contrast(effects.contrast)),
            (effects.saturation != neutral.saturation, Filter::Saturate(effects.saturation)),
            (effects.hue_rotate != neutral.hue_rotate, Filter::HueRotate(effects.hue_rotate)),
            (effects.blur > 0.0, Filter::Blur(effects.blur)),
            (effects.opacity != neutral.opacity, Filter::Opacity(effects.opacity.clamp(0.0, 1.0))),
        ];
        Self {
            filters: candidates
                .into_iter()
                .filter_map(|(active, filter)| active.then_some(filter))
                .collect(),
        }
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn is_identity(&self) -> bool {
        self.filters.is_empty()
    }

    /// CSS `filter` property value, for hosts that render in a browser.
    pub fn to_css(&self) -> String {
        if self.filters.is_empty() {
            return "none".to_string();
        }
        self.filters.iter().map(Filter::css).collect::<Vec<_>>().join(" ")
    }

    /// Layer opacity; multiplies the blend weight rather than the pixels.
    pub fn opacity(&self) -> f64 {
        self.filters
            .iter()
            .filter_map(|f| match f {
                Filter::Opacity(v) => Some(*v),
                _ => None,
            })
            .product()
    }

    /// Blur radius in pixels for a frame of the given height.
    pub fn blur_radius(&self, frame_height: u32) -> usize {
        let blur: f64 = self
            .filters
            .iter()
            .filter_map(|f| match f {
                Filter::Blur(v) => Some(*v),
                _ => None,
            })
            .sum();
        (blur * frame_height as f64 / BLUR_REFERENCE_HEIGHT).round().max(0.0) as usize
    }

    /// Colour transforms only, on a normalized RGB triple.
    pub fn apply_rgb(&self, rgb: [f64; 3]) -> [f64; 3] {
        self.filters.iter().fold(rgb, |acc, f| f.apply_rgb(acc))
    }

    /// Apply colour transforms and blur in place. Alpha is left untouched
    /// except by the blur.
    pub fn apply(&self, frame: &mut Frame) {
        if self.is_identity() {
            return;
        }
        let has_color = self
            .filters
            .iter()
            .any(|f| !matches!(f, Filter::Blur(_) | Filter::Opacity(_)));
        if has_color {
            for px in frame.data.chunks_exact_mut(4) {
                let rgb = [px[0], px[1], px[2]].map(|c| c as f64 / 255.0);
                let out = self.apply_rgb(rgb);
                for (dst, c) in px.iter_mut().zip(out) {
                    *dst = (c * 255.0).round() as u8;
                }
            }
        }
        box_blur(frame, self.blur_radius(frame.height));
    }
}

fn box_blur(frame: &mut Frame, radius: usize) {
    if radius == 0 || frame.width == 0 || frame.height == 0 {
        return;
    }
    let (w, h) = (frame.width as usize, frame.height as usize);
    let mut tmp = vec![0u8; frame.data.len()];
    for y in 0..h {
        blur_line(&frame.data, &mut tmp, y * w * 4, 4, w, radius);
    }
    for x in 0..w {
        blur_line(&tmp, &mut frame.data, x * 4, w * 4, h, radius);
    }
}

/// Sliding-window average along one row or column, edges extended.
fn blur_line(src: &[u8], dst: &mut [u8], base: usize, stride: usize, len: usize, radius: usize) {
    let r = radius as isize;
    let last = len as isize - 1;
    let n = (2 * radius + 1) as u32;
    for c in 0..4 {
        let at = |i: isize| src[base + i.clamp(0, last) as usize * stride + c] as u32;
        let mut sum: u32 = (-r..=r).map(&at).sum();
        for i in 0..len {
            dst[base + i * stride + c] = ((sum + n / 2) / n) as u8;
            let i = i as isize;
            sum = sum + at(i + r + 1) - at(i - r);
        }
    }
}

//! RGBA compositing of a [`ResolvedFrame`].
//!
//! Each output pixel is `Σ wᵢ·cᵢ + (1 − Σ wᵢ)·matte` where a layer's weight
//! is its blend weight times effect opacity, wipe coverage and source alpha.

use crate::effects::FilterChain;
use crate::error::{RenderError, Result};
use cutline_core::resolve::{ResolvedFrame, VideoLayer};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A decoded source picture, RGBA8, row major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(RenderError::FrameSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { width, height, data })
    }

    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self { width, height, data }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// Scale into a `width`×`height` frame preserving aspect ratio. The
    /// letterbox bars are fully transparent.
    pub fn fit_contain(&self, width: u32, height: u32) -> Frame {
        let mut out = Frame::solid(width, height, [0, 0, 0, 0]);
        if self.width == 0 || self.height == 0 || width == 0 || height == 0 {
            return out;
        }
        let scale = (width as f64 / self.width as f64).min(height as f64 / self.height as f64);
        let fit_w = ((self.width as f64 * scale).round() as u32).clamp(1, width);
        let fit_h = ((self.height as f64 * scale).round() as u32).clamp(1, height);
        let ox = (width - fit_w) / 2;
        let oy = (height - fit_h) / 2;

        for y in 0..fit_h {
            let sy = (((y as f64 + 0.5) / scale) as u32).min(self.height - 1);
            for x in 0..fit_w {
                let sx = (((x as f64 + 0.5) / scale) as u32).min(self.width - 1);
                let src = (sy as usize * self.width as usize + sx as usize) * 4;
                let dst = ((oy + y) as usize * width as usize + (ox + x) as usize) * 4;
                out.data[dst..dst + 4].copy_from_slice(&self.data[src..src + 4]);
            }
        }
        out
    }
}

/// The output surface, RGBA8 with opaque alpha.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    data: Vec<u8>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: Frame::solid(width, height, [0, 0, 0, 255]).data,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// Render `frame` onto the canvas. `sources` maps clip ids to decoded
    /// pictures; layers without one are left out.
    pub fn composite(&mut self, frame: &ResolvedFrame, sources: &HashMap<Uuid, Arc<Frame>>) {
        let pixels = self.width as usize * self.height as usize;
        let mut acc = vec![[0.0f64; 3]; pixels];
        let mut weight = vec![0.0f64; pixels];

        for layer in &frame.layers {
            if let Some(source) = sources.get(&layer.clip_id) {
                self.accumulate(layer, source, &mut acc, &mut weight);
            }
        }

        let matte = frame.matte.rgb().map(|c| c as f64);
        for (i, px) in self.data.chunks_exact_mut(4).enumerate() {
            let rest = (1.0 - weight[i]).max(0.0);
            for c in 0..3 {
                px[c] = (acc[i][c] + rest * matte[c]).round().clamp(0.0, 255.0) as u8;
            }
            px[3] = 255;
        }
    }

    fn accumulate(&self, layer: &VideoLayer, source: &Frame, acc: &mut [[f64; 3]], weight: &mut [f64]) {
        let chain = FilterChain::from_effects(&layer.effects);
        let base = layer.weight * chain.opacity();
        if base <= 0.0 {
            return;
        }
        let mut fitted = source.fit_contain(self.width, self.height);
        chain.apply(&mut fitted);

        let (w, h) = (self.width as f64, self.height as f64);
        for (i, px) in fitted.data.chunks_exact(4).enumerate() {
            let alpha = px[3] as f64 / 255.0;
            if alpha == 0.0 {
                continue;
            }
            let coverage = match &layer.mask {
                Some(mask) => {
                    let x = (i % self.width as usize) as f64 + 0.5;
                    let y = (i / self.width as usize) as f64 + 0.5;
                    mask.coverage(x / w, y / h)
                }
                None => 1.0,
            };
            let wi = base * coverage * alpha;
            if wi == 0.0 {
                continue;
            }
            for c in 0..3 {
                acc[i][c] += wi * px[c] as f64;
            }
            weight[i] += wi;
        }
    }
}

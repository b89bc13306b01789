use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use image::{Rgb, RgbImage};

use crate::engine::{EngineState, Sampler};
use crate::error::EngineError;

/// Writes a small PNG whose colours are derived from the engine state, so
/// every sampled epoch leaves a visible artifact without a real renderer.
#[derive(Debug, Clone, Copy)]
pub struct PreviewSampler {
    size: u32,
}

impl PreviewSampler {
    pub fn new(size: u32) -> Self {
        Self { size: size.max(1) }
    }
}

impl Default for PreviewSampler {
    fn default() -> Self {
        Self::new(64)
    }
}

fn palette(state: &EngineState, epoch: u32) -> [u8; 6] {
    let mut hasher = DefaultHasher::new();
    state.as_bytes().hash(&mut hasher);
    epoch.hash(&mut hasher);
    let bytes = hasher.finish().to_le_bytes();
    [bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]]
}

fn blend(a: u8, b: u8, t: f32) -> u8 {
    (f32::from(a) * (1.0 - t) + f32::from(b) * t).round() as u8
}

impl Sampler for PreviewSampler {
    fn render(
        &mut self,
        epoch: u32,
        state: &EngineState,
        target: &Path,
    ) -> Result<(), EngineError> {
        let [r0, g0, b0, r1, g1, b1] = palette(state, epoch);
        let span = (2 * self.size).saturating_sub(2).max(1) as f32;
        let image = RgbImage::from_fn(self.size, self.size, |x, y| {
            let t = (x + y) as f32 / span;
            Rgb([blend(r0, r1, t), blend(g0, g1, t), blend(b0, b1, t)])
        });
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        image.save(target)?;
        Ok(())
    }
}

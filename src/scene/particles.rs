use glam::Vec3;
use rand::rngs::StdRng;
use rand::Rng;

use crate::theme::Theme;

pub const MIN_PARTICLE_SIZE: f32 = 0.03;
pub const MAX_PARTICLE_SIZE: f32 = 0.09;

const DARK_PALETTE: [Vec3; 3] = [
    Vec3::new(0.0, 0.83, 1.0),   // electric blue
    Vec3::new(0.55, 0.36, 0.96), // violet
    Vec3::new(0.08, 0.72, 0.65), // teal
];

const LIGHT_PALETTE: [Vec3; 3] = [
    Vec3::new(0.0, 0.45, 0.70),
    Vec3::new(0.40, 0.18, 0.80),
    Vec3::new(0.02, 0.45, 0.40),
];

pub fn palette(theme: Theme) -> [Vec3; 3] {
    match theme {
        Theme::Dark => DARK_PALETTE,
        Theme::Light => LIGHT_PALETTE,
    }
}

/// Relative luminance of a linear RGB color (Rec. 709 weights).
pub fn luminance(color: Vec3) -> f32 {
    0.2126 * color.x + 0.7152 * color.y + 0.0722 * color.z
}

/// Maps a uniform sample in [0, 1) to a palette slot, split 33/33/34.
pub fn palette_slot(choice: f32) -> usize {
    if choice < 0.33 {
        0
    } else if choice < 0.66 {
        1
    } else {
        2
    }
}

/// Point cloud with one position, color and size per particle. The count is
/// fixed at construction; regeneration rewrites the arrays in place.
#[derive(Debug, Clone)]
pub struct ParticleSystem {
    positions: Vec<[f32; 3]>,
    colors: Vec<[f32; 3]>,
    sizes: Vec<f32>,
    bounds: Vec3,
    theme: Theme,
}

impl ParticleSystem {
    pub fn generate(count: usize, bounds: [f32; 3], theme: Theme, rng: &mut StdRng) -> Self {
        let mut system = Self {
            positions: Vec::with_capacity(count),
            colors: Vec::with_capacity(count),
            sizes: Vec::with_capacity(count),
            bounds: Vec3::from_array(bounds),
            theme,
        };
        system.fill(count, rng);
        system
    }

    pub fn regenerate(&mut self, theme: Theme, rng: &mut StdRng) {
        let count = self.len();
        self.theme = theme;
        self.fill(count, rng);
    }

    fn fill(&mut self, count: usize, rng: &mut StdRng) {
        let palette = palette(self.theme);
        self.positions.clear();
        self.colors.clear();
        self.sizes.clear();

        for _ in 0..count {
            let unit = Vec3::new(rng.random::<f32>(), rng.random::<f32>(), rng.random::<f32>());
            self.positions.push(((unit - 0.5) * self.bounds).to_array());
            self.colors.push(palette[palette_slot(rng.random::<f32>())].to_array());
            self.sizes.push(rng.random_range(MIN_PARTICLE_SIZE..=MAX_PARTICLE_SIZE));
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    pub fn colors(&self) -> &[[f32; 3]] {
        &self.colors
    }

    pub fn sizes(&self) -> &[f32] {
        &self.sizes
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn bounds(&self) -> Vec3 {
        self.bounds
    }
}

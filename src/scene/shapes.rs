use glam::{EulerRot, Mat4, Quat, Vec2, Vec3};

use crate::config::SceneConfig;
use crate::theme::hex;

use super::geometry::{self, WireMesh};

/// How strongly z-distance damps the pointer parallax.
const DEPTH_FALLOFF: f32 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Icosahedron,
    Octahedron,
    Tetrahedron,
    Torus,
}

impl ShapeKind {
    pub const ALL: [ShapeKind; 4] = [
        ShapeKind::Icosahedron,
        ShapeKind::Octahedron,
        ShapeKind::Tetrahedron,
        ShapeKind::Torus,
    ];

    pub fn mesh(self) -> WireMesh {
        match self {
            ShapeKind::Icosahedron => geometry::icosahedron(),
            ShapeKind::Octahedron => geometry::octahedron(),
            ShapeKind::Tetrahedron => geometry::tetrahedron(),
            ShapeKind::Torus => geometry::torus(),
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeInstance {
    pub base_position: Vec3,
    pub kind: ShapeKind,
    pub color: Vec3,
    pub base_scale: f32,
    /// Spin around y in rad/s; x spins at half this rate.
    pub angular_speed: f32,
}

impl ShapeInstance {
    const fn new(
        base_position: [f32; 3],
        kind: ShapeKind,
        color: u32,
        base_scale: f32,
        angular_speed: f32,
    ) -> Self {
        Self {
            base_position: Vec3::from_array(base_position),
            kind,
            color: hex(color),
            base_scale,
            angular_speed,
        }
    }

    /// Bob phase, so neighbouring shapes do not move in lockstep.
    pub fn phase(&self) -> f32 {
        self.base_position.x
    }

    /// 1 at the camera plane, shrinking with distance behind it.
    pub fn depth_weight(&self) -> f32 {
        1.0 / (1.0 + (-self.base_position.z).max(0.0) * DEPTH_FALLOFF)
    }
}

const CYAN: u32 = 0x00d4ff;
const VIOLET: u32 = 0x8b5cf6;
const PINK: u32 = 0xec4899;
const TEAL: u32 = 0x14b8a6;

// Near, mid and far layers, four shapes each.
const LAYOUT: [ShapeInstance; 12] = [
    ShapeInstance::new([-3.0, -4.0, -2.0], ShapeKind::Octahedron, PINK, 0.8, 0.36),
    ShapeInstance::new([3.5, 3.0, -2.5], ShapeKind::Tetrahedron, TEAL, 0.7, 0.42),
    ShapeInstance::new([-6.5, 1.0, -3.0], ShapeKind::Tetrahedron, CYAN, 0.6, 0.40),
    ShapeInstance::new([6.0, -1.5, -3.0], ShapeKind::Icosahedron, VIOLET, 0.75, 0.33),
    ShapeInstance::new([-4.0, 2.0, -5.0], ShapeKind::Icosahedron, CYAN, 1.5, 0.30),
    ShapeInstance::new([1.0, -5.5, -5.5], ShapeKind::Torus, TEAL, 1.0, 0.27),
    ShapeInstance::new([8.0, 4.5, -6.0], ShapeKind::Octahedron, PINK, 1.2, 0.30),
    ShapeInstance::new([-9.0, -5.0, -6.0], ShapeKind::Torus, VIOLET, 1.1, 0.24),
    ShapeInstance::new([5.0, -3.0, -8.0], ShapeKind::Torus, VIOLET, 1.2, 0.24),
    ShapeInstance::new([-1.0, 6.5, -9.0], ShapeKind::Octahedron, TEAL, 1.8, 0.18),
    ShapeInstance::new([-12.0, 5.0, -10.0], ShapeKind::Icosahedron, PINK, 2.0, 0.15),
    ShapeInstance::new([12.0, -7.0, -10.0], ShapeKind::Tetrahedron, CYAN, 1.9, 0.20),
];

pub fn layout() -> Vec<ShapeInstance> {
    LAYOUT.to_vec()
}

/// Per-frame state derived from a [`ShapeInstance`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ShapeTransform {
    pub offset: Vec3,
    pub rotation: Vec3,
}

impl ShapeTransform {
    pub fn model(&self, instance: &ShapeInstance) -> Mat4 {
        let rotation = Quat::from_euler(
            EulerRot::XYZ,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
        );
        Mat4::from_scale_rotation_translation(
            Vec3::splat(instance.base_scale),
            rotation,
            instance.base_position + self.offset,
        )
    }
}

/// Rewrites `transforms` in place for time `elapsed` (seconds of scene time).
pub fn update_transforms(
    instances: &[ShapeInstance],
    transforms: &mut [ShapeTransform],
    elapsed: f32,
    pointer: Vec2,
    config: &SceneConfig,
) {
    for (instance, transform) in instances.iter().zip(transforms.iter_mut()) {
        let parallax = pointer * config.parallax_gain * instance.depth_weight();
        let bob = config.bob_amplitude * (elapsed * config.bob_frequency + instance.phase()).sin();

        transform.offset = Vec3::new(parallax.x, parallax.y + bob, 0.0);
        transform.rotation = Vec3::new(
            instance.angular_speed * 0.5 * elapsed,
            instance.angular_speed * elapsed,
            0.0,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twelve_shapes_over_three_layers() {
        let shapes = layout();
        assert_eq!(shapes.len(), 12);
        for layer in shapes.chunks(4) {
            let nearest = layer.iter().map(|s| s.base_position.z).fold(f32::MIN, f32::max);
            let farthest = layer.iter().map(|s| s.base_position.z).fold(f32::MAX, f32::min);
            assert!(nearest - farthest <= 2.0);
        }
        for kind in ShapeKind::ALL {
            assert!(shapes.iter().any(|s| s.kind == kind));
        }
    }

    #[test]
    fn far_shapes_move_less() {
        let shapes = layout();
        let config = SceneConfig::default();
        let mut transforms = vec![ShapeTransform::default(); shapes.len()];
        update_transforms(&shapes, &mut transforms, 0.0, Vec2::new(1.0, 0.0), &config);

        let near = transforms[0].offset.x;
        let far = transforms[11].offset.x;
        assert!(near > far && far > 0.0);
        assert!(near <= config.parallax_gain);
    }

    #[test]
    fn rotation_and_bob_follow_elapsed_time() {
        let shapes = layout();
        let config = SceneConfig::default();
        let mut transforms = vec![ShapeTransform::default(); shapes.len()];
        update_transforms(&shapes, &mut transforms, 2.0, Vec2::ZERO, &config);

        let shape = &shapes[4];
        let transform = transforms[4];
        assert!((transform.rotation.y - shape.angular_speed * 2.0).abs() < 1e-6);
        assert!((transform.rotation.x - shape.angular_speed).abs() < 1e-6);
        let bob = 0.5 * (2.0 + shape.phase()).sin();
        assert!((transform.offset.y - bob).abs() < 1e-6);
        assert_eq!(transform.offset.x, 0.0);
    }

    #[test]
    fn model_places_shape_at_offset_base() {
        let shape = layout()[0];
        let transform = ShapeTransform {
            offset: Vec3::new(0.5, 0.0, 0.0),
            rotation: Vec3::ZERO,
        };
        let origin = transform.model(&shape).transform_point3(Vec3::ZERO);
        assert!((origin - (shape.base_position + Vec3::new(0.5, 0.0, 0.0))).length() < 1e-6);
    }
}

//! The animated background: a rotating particle field and a set of floating
//! wireframe shapes, drawn through a [`SceneSink`].

pub mod geometry;
pub mod gpu;
pub mod particles;
pub mod shapes;

use glam::{EulerRot, Mat4, Vec2, Vec3};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::clock::{SceneClock, clock_seed};
use crate::config::SceneConfig;
use crate::error::Result;
use crate::frame::{AnimationLoop, FrameScheduler, FrameToken};
use crate::theme::{ColorParameters, Theme, color_parameters};

pub use particles::ParticleSystem;
pub use shapes::{ShapeInstance, ShapeKind, ShapeTransform};

/// Fixed perspective camera looking down -z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 12.0),
            target: Vec3::ZERO,
            fov_y_degrees: 60.0,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Camera {
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, Vec3::Y)
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_degrees.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }
}

/// Everything a sink needs to draw one frame.
#[derive(Debug, Clone, Copy)]
pub struct SceneFrame<'a> {
    pub view: Mat4,
    pub projection: Mat4,
    pub field_model: Mat4,
    pub colors: ColorParameters,
    pub shapes: &'a [ShapeInstance],
    pub transforms: &'a [ShapeTransform],
    pub elapsed: f32,
}

/// A render surface. Errors returned from `draw` are treated as fatal surface loss.
pub trait SceneSink {
    fn upload_particles(&mut self, particles: &ParticleSystem);
    fn draw(&mut self, frame: &SceneFrame<'_>) -> Result<()>;
    fn resize(&mut self, width: u32, height: u32);
}

pub struct SceneRenderer {
    config: SceneConfig,
    colors: ColorParameters,
    rng: StdRng,
    particles: ParticleSystem,
    field_rotation: Vec3,
    shapes: Vec<ShapeInstance>,
    transforms: Vec<ShapeTransform>,
    camera: Camera,
    clock: SceneClock,
    frame_loop: AnimationLoop,
    should_render: bool,
    sink: Option<Box<dyn SceneSink>>,
    surface_failed: bool,
    torn_down: bool,
}

impl SceneRenderer {
    pub fn new(config: &SceneConfig, theme: Theme) -> Self {
        let seed = config.seed.unwrap_or_else(clock_seed);
        let mut rng = StdRng::seed_from_u64(seed);
        let particles = ParticleSystem::generate(config.particle_count, config.bounds, theme, &mut rng);
        let shapes = shapes::layout();
        let transforms = vec![ShapeTransform::default(); shapes.len()];
        log::info!(
            "Scene built: {} particles, {} shapes (seed {})",
            particles.len(),
            shapes.len(),
            seed
        );

        Self {
            config: config.clone(),
            colors: color_parameters(theme),
            rng,
            particles,
            field_rotation: Vec3::ZERO,
            shapes,
            transforms,
            camera: Camera::default(),
            clock: SceneClock::new(config.max_frame_step),
            frame_loop: AnimationLoop::new("scene"),
            should_render: false,
            sink: None,
            surface_failed: false,
            torn_down: false,
        }
    }

    pub fn attach_sink(&mut self, mut sink: Box<dyn SceneSink>, scheduler: &mut dyn FrameScheduler) {
        if self.torn_down {
            return;
        }
        sink.upload_particles(&self.particles);
        self.sink = Some(sink);
        self.surface_failed = false;
        log::info!("Render surface attached");
        self.sync_loop(scheduler);
    }

    /// Disables the renderer after the surface could not be acquired or was lost.
    pub fn surface_failed(&mut self, reason: &str, scheduler: &mut dyn FrameScheduler) {
        log::error!("Scene renderer disabled: {}", reason);
        self.sink = None;
        self.surface_failed = true;
        self.sync_loop(scheduler);
    }

    /// Switches colors and regenerates the particle field. Shapes keep their state.
    pub fn set_theme(&mut self, theme: Theme) {
        self.colors = color_parameters(theme);
        if self.particles.theme() == theme {
            return;
        }
        self.particles.regenerate(theme, &mut self.rng);
        if let Some(sink) = &mut self.sink {
            sink.upload_particles(&self.particles);
        }
    }

    pub fn set_should_render(&mut self, should_render: bool, scheduler: &mut dyn FrameScheduler) {
        self.should_render = should_render;
        self.sync_loop(scheduler);
    }

    /// Advances and draws one frame if `token` is the scene's frame.
    pub fn on_frame(
        &mut self,
        token: FrameToken,
        now_ms: f64,
        pointer: Vec2,
        scheduler: &mut dyn FrameScheduler,
    ) -> bool {
        if !self.frame_loop.begin_frame(token, scheduler) {
            return false;
        }

        self.clock.tick(now_ms);
        self.field_rotation.y += self.config.field_spin;
        self.field_rotation.x = pointer.y * self.config.tilt_gain;
        self.field_rotation.z = pointer.x * self.config.tilt_gain;
        shapes::update_transforms(
            &self.shapes,
            &mut self.transforms,
            self.clock.elapsed(),
            pointer,
            &self.config,
        );

        let frame = SceneFrame {
            view: self.camera.view(),
            projection: self.camera.projection(),
            field_model: self.field_model(),
            colors: self.colors,
            shapes: &self.shapes,
            transforms: &self.transforms,
            elapsed: self.clock.elapsed(),
        };
        let drawn = match &mut self.sink {
            Some(sink) => sink.draw(&frame),
            None => Ok(()),
        };
        if let Err(e) = drawn {
            self.surface_failed(&e.to_string(), scheduler);
        }
        true
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.camera.set_viewport(width, height);
        if let Some(sink) = &mut self.sink {
            sink.resize(width, height);
        }
    }

    /// Cancels the pending frame and releases the surface. Permanent.
    pub fn teardown(&mut self, scheduler: &mut dyn FrameScheduler) {
        self.torn_down = true;
        self.sync_loop(scheduler);
        self.sink = None;
    }

    pub fn field_model(&self) -> Mat4 {
        Mat4::from_euler(
            EulerRot::XYZ,
            self.field_rotation.x,
            self.field_rotation.y,
            self.field_rotation.z,
        )
    }

    pub fn is_running(&self) -> bool {
        self.frame_loop.is_active()
    }

    pub fn frame_pending(&self) -> bool {
        self.frame_loop.pending().is_some()
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    pub fn has_failed(&self) -> bool {
        self.surface_failed
    }

    pub fn particles(&self) -> &ParticleSystem {
        &self.particles
    }

    pub fn shapes(&self) -> &[ShapeInstance] {
        &self.shapes
    }

    pub fn transforms(&self) -> &[ShapeTransform] {
        &self.transforms
    }

    pub fn field_rotation(&self) -> Vec3 {
        self.field_rotation
    }

    pub fn elapsed(&self) -> f32 {
        self.clock.elapsed()
    }

    pub fn colors(&self) -> ColorParameters {
        self.colors
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn frames_run(&self) -> u64 {
        self.frame_loop.frames_run()
    }

    fn sync_loop(&mut self, scheduler: &mut dyn FrameScheduler) {
        let wanted = self.should_render && self.sink.is_some() && !self.torn_down;
        if wanted == self.frame_loop.is_active() {
            return;
        }
        if wanted {
            self.frame_loop.start(scheduler);
        } else {
            self.frame_loop.stop(scheduler);
            self.clock.pause();
        }
    }
}

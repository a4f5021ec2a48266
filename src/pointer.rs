//! Pointer following: raw samples in, normalized vector and smoothed cursor out.

use bitflags::bitflags;
use glam::{Vec2, Vec3};

use crate::config::PointerConfig;
use crate::frame::{AnimationLoop, FrameScheduler, FrameToken};

bitflags! {
    /// What the host can do, read once at startup and again on resize.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Capabilities: u32 {
        const ANIMATION_FRAMES = 1 << 0;
        const INTERSECTION_OBSERVER = 1 << 1;
        const PERSISTENT_STORAGE = 1 << 2;
        const COARSE_POINTER = 1 << 3;
        const TOUCH = 1 << 4;
    }
}

/// Viewport size in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width * 0.5, self.height * 0.5)
    }

    /// Maps a pixel position to [-1, 1] on both axes with y pointing up.
    pub fn normalize(&self, position: Vec2) -> Vec2 {
        if self.width <= 0.0 || self.height <= 0.0 {
            return Vec2::ZERO;
        }
        let x = 2.0 * position.x / self.width - 1.0;
        let y = -(2.0 * position.y / self.height - 1.0);
        Vec2::new(x, y).clamp(Vec2::NEG_ONE, Vec2::ONE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceProbe {
    pub capabilities: Capabilities,
    pub viewport: Viewport,
}

impl DeviceProbe {
    /// A fine-pointer desktop with every host feature available.
    pub fn desktop(width: f32, height: f32) -> Self {
        Self {
            capabilities: Capabilities::ANIMATION_FRAMES
                | Capabilities::INTERSECTION_OBSERVER
                | Capabilities::PERSISTENT_STORAGE,
            viewport: Viewport::new(width, height),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn supports_pointer_following(&self, narrow_breakpoint: f32) -> bool {
        self.capabilities.contains(Capabilities::ANIMATION_FRAMES)
            && !self
                .capabilities
                .intersects(Capabilities::COARSE_POINTER | Capabilities::TOUCH)
            && self.viewport.width >= narrow_breakpoint
    }
}

/// What the pointer is currently over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoverTarget {
    Link,
    Button,
    Input,
    /// Any region explicitly marked interactive.
    Marked,
    Other,
}

impl HoverTarget {
    pub fn classify(tag: &str, role: Option<&str>, marked_interactive: bool) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "a" => HoverTarget::Link,
            "button" => HoverTarget::Button,
            "input" | "textarea" | "select" => HoverTarget::Input,
            _ if role == Some("button") => HoverTarget::Button,
            _ if marked_interactive => HoverTarget::Marked,
            _ => HoverTarget::Other,
        }
    }

    pub fn is_interactive(self) -> bool {
        self != HoverTarget::Other
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorKinematics {
    pub raw: Vec2,
    pub smoothed: Vec2,
    pub trail: Vec2,
    pub hovering: bool,
    pub clicking: bool,
}

impl CursorKinematics {
    fn at(position: Vec2) -> Self {
        Self {
            raw: position,
            smoothed: position,
            trail: position,
            hovering: false,
            clicking: false,
        }
    }
}

const CURSOR_OFFSET: f32 = 24.0;
const TRAIL_OFFSET: f32 = 20.0;

/// Transforms for the two cursor sprites, top-left positioned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorVisual {
    pub cursor_position: Vec2,
    pub cursor_scale: f32,
    pub trail_position: Vec2,
    pub trail_scale: f32,
    pub trail_opacity: f32,
    pub glow: Vec3,
}

impl CursorVisual {
    pub fn from_kinematics(kinematics: &CursorKinematics, glow: Vec3) -> Self {
        let cursor_scale = if kinematics.clicking {
            0.85
        } else if kinematics.hovering {
            1.15
        } else {
            1.0
        };
        let (trail_scale, trail_opacity) = if kinematics.hovering { (1.3, 0.5) } else { (1.0, 0.25) };

        Self {
            cursor_position: kinematics.smoothed - Vec2::splat(CURSOR_OFFSET),
            cursor_scale,
            trail_position: kinematics.trail - Vec2::splat(TRAIL_OFFSET),
            trail_scale,
            trail_opacity,
            glow,
        }
    }
}

#[derive(Debug)]
pub struct ActivePointer {
    kinematics: CursorKinematics,
    latest: Vec2,
    normalized: Vec2,
    viewport: Viewport,
    k_cursor: f32,
    k_trail: f32,
    frame_loop: AnimationLoop,
}

impl ActivePointer {
    fn new(viewport: Viewport, config: &PointerConfig) -> Self {
        let center = viewport.center();
        Self {
            kinematics: CursorKinematics::at(center),
            latest: center,
            normalized: Vec2::ZERO,
            viewport,
            k_cursor: config.k_cursor,
            k_trail: config.k_trail,
            frame_loop: AnimationLoop::new("cursor"),
        }
    }

    fn step(&mut self) {
        let raw = self.latest;
        self.normalized = self.viewport.normalize(raw);

        let k = &mut self.kinematics;
        k.raw = raw;
        k.smoothed += (raw - k.smoothed) * self.k_cursor;
        k.trail += (raw - k.trail) * self.k_trail;
    }
}

/// Pointer state machine. Which variant is live is decided by the device probe
/// at construction and on every re-probe; inert trackers ignore all input.
#[derive(Debug)]
pub enum PointerTracker {
    Inert,
    Active(ActivePointer),
}

impl PointerTracker {
    pub fn new(probe: &DeviceProbe, config: &PointerConfig) -> Self {
        if probe.supports_pointer_following(config.narrow_breakpoint) {
            PointerTracker::Active(ActivePointer::new(probe.viewport, config))
        } else {
            log::info!(
                "Pointer following disabled ({:?}, width {})",
                probe.capabilities,
                probe.viewport.width
            );
            PointerTracker::Inert
        }
    }

    /// Begins the per-frame smoothing loop. No-op while inert.
    pub fn start(&mut self, scheduler: &mut dyn FrameScheduler) {
        if let PointerTracker::Active(active) = self {
            active.frame_loop.start(scheduler);
        }
    }

    /// Re-evaluates the probe, switching variant when the answer changed.
    pub fn reprobe(
        &mut self,
        probe: &DeviceProbe,
        config: &PointerConfig,
        scheduler: &mut dyn FrameScheduler,
    ) {
        let wanted = probe.supports_pointer_following(config.narrow_breakpoint);
        match self {
            PointerTracker::Active(active) if wanted => {
                active.viewport = probe.viewport;
            }
            PointerTracker::Inert if !wanted => {}
            _ => {
                self.stop(scheduler);
                *self = PointerTracker::new(probe, config);
                self.start(scheduler);
            }
        }
    }

    pub fn pointer_moved(&mut self, x: f32, y: f32) {
        if let PointerTracker::Active(active) = self {
            active.latest = Vec2::new(x, y);
        }
    }

    pub fn hover(&mut self, target: HoverTarget) {
        if let PointerTracker::Active(active) = self {
            active.kinematics.hovering = target.is_interactive();
        }
    }

    pub fn set_clicking(&mut self, clicking: bool) {
        if let PointerTracker::Active(active) = self {
            active.kinematics.clicking = clicking;
        }
    }

    pub fn pointer_left(&mut self) {
        if let PointerTracker::Active(active) = self {
            active.kinematics.hovering = false;
            active.kinematics.clicking = false;
        }
    }

    /// Runs one smoothing step if `token` is this tracker's frame.
    pub fn on_frame(&mut self, token: FrameToken, scheduler: &mut dyn FrameScheduler) -> bool {
        match self {
            PointerTracker::Active(active) => {
                if !active.frame_loop.begin_frame(token, scheduler) {
                    return false;
                }
                active.step();
                true
            }
            PointerTracker::Inert => false,
        }
    }

    pub fn stop(&mut self, scheduler: &mut dyn FrameScheduler) {
        if let PointerTracker::Active(active) = self {
            active.frame_loop.stop(scheduler);
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, PointerTracker::Active(_))
    }

    /// Normalized pointer vector as of the last frame. Always zero while inert.
    pub fn normalized(&self) -> Vec2 {
        match self {
            PointerTracker::Active(active) => active.normalized,
            PointerTracker::Inert => Vec2::ZERO,
        }
    }

    pub fn kinematics(&self) -> Option<&CursorKinematics> {
        match self {
            PointerTracker::Active(active) => Some(&active.kinematics),
            PointerTracker::Inert => None,
        }
    }

    pub fn visual(&self, glow: Vec3) -> Option<CursorVisual> {
        self.kinematics()
            .map(|kinematics| CursorVisual::from_kinematics(kinematics, glow))
    }

    pub fn pending_token(&self) -> Option<FrameToken> {
        match self {
            PointerTracker::Active(active) => active.frame_loop.pending(),
            PointerTracker::Inert => None,
        }
    }

    pub fn frame_pending(&self) -> bool {
        self.pending_token().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::QueuedScheduler;

    fn run_frames(tracker: &mut PointerTracker, scheduler: &mut QueuedScheduler, frames: usize) {
        for _ in 0..frames {
            for token in scheduler.take_due() {
                tracker.on_frame(token, scheduler);
            }
        }
    }

    fn active_tracker(scheduler: &mut QueuedScheduler) -> PointerTracker {
        let mut tracker = PointerTracker::new(&DeviceProbe::desktop(1280.0, 800.0), &PointerConfig::default());
        tracker.start(scheduler);
        tracker
    }

    #[test]
    fn smoothing_converges_without_overshoot() {
        let mut scheduler = QueuedScheduler::new();
        let mut tracker = active_tracker(&mut scheduler);
        let target = Vec2::new(1000.0, 120.0);
        tracker.pointer_moved(target.x, target.y);

        let start = *tracker.kinematics().unwrap();
        let mut last_cursor = start.smoothed.distance(target);
        let mut last_trail = start.trail.distance(target);

        for _ in 0..60 {
            run_frames(&mut tracker, &mut scheduler, 1);
            let k = tracker.kinematics().unwrap();
            let cursor = k.smoothed.distance(target);
            let trail = k.trail.distance(target);
            assert!(cursor < last_cursor);
            assert!(trail < last_trail);
            assert!(cursor <= trail);
            assert!(k.smoothed.x <= target.x && k.smoothed.y >= target.y);
            last_cursor = cursor;
            last_trail = trail;
        }
        assert!(last_cursor < 0.5);
    }

    #[test]
    fn frame_uses_latest_sample() {
        let mut scheduler = QueuedScheduler::new();
        let mut tracker = active_tracker(&mut scheduler);
        tracker.pointer_moved(0.0, 0.0);
        tracker.pointer_moved(1280.0, 800.0);
        run_frames(&mut tracker, &mut scheduler, 1);

        assert_eq!(tracker.normalized(), Vec2::new(1.0, -1.0));
        assert_eq!(tracker.kinematics().unwrap().raw, Vec2::new(1280.0, 800.0));
    }

    #[test]
    fn normalization_corners_and_clamp() {
        let viewport = Viewport::new(800.0, 600.0);
        assert_eq!(viewport.normalize(Vec2::ZERO), Vec2::new(-1.0, 1.0));
        assert_eq!(viewport.normalize(Vec2::new(400.0, 300.0)), Vec2::ZERO);
        assert_eq!(viewport.normalize(Vec2::new(-50.0, 900.0)), Vec2::new(-1.0, -1.0));
        assert_eq!(Viewport::new(0.0, 0.0).normalize(Vec2::ONE), Vec2::ZERO);
    }

    #[test]
    fn touch_and_narrow_devices_are_inert() {
        let config = PointerConfig::default();
        let probes = [
            DeviceProbe::desktop(1280.0, 800.0).with_capabilities(
                Capabilities::ANIMATION_FRAMES | Capabilities::TOUCH,
            ),
            DeviceProbe::desktop(1280.0, 800.0).with_capabilities(
                Capabilities::ANIMATION_FRAMES | Capabilities::COARSE_POINTER,
            ),
            DeviceProbe::desktop(767.0, 800.0),
            DeviceProbe::desktop(1280.0, 800.0).with_capabilities(Capabilities::empty()),
        ];

        for probe in probes {
            let mut scheduler = QueuedScheduler::new();
            let mut tracker = PointerTracker::new(&probe, &config);
            tracker.start(&mut scheduler);
            tracker.pointer_moved(10.0, 10.0);
            tracker.hover(HoverTarget::Button);

            assert!(!tracker.is_active());
            assert!(!scheduler.has_pending());
            assert_eq!(tracker.normalized(), Vec2::ZERO);
            assert!(tracker.visual(Vec3::ONE).is_none());
        }
    }

    #[test]
    fn reprobe_switches_variant() {
        let config = PointerConfig::default();
        let mut scheduler = QueuedScheduler::new();
        let mut tracker = active_tracker(&mut scheduler);
        assert!(scheduler.has_pending());

        tracker.reprobe(&DeviceProbe::desktop(600.0, 800.0), &config, &mut scheduler);
        assert!(!tracker.is_active());
        assert!(!scheduler.has_pending());

        tracker.reprobe(&DeviceProbe::desktop(1024.0, 800.0), &config, &mut scheduler);
        assert!(tracker.is_active());
        assert!(tracker.frame_pending());
    }

    #[test]
    fn hover_and_click_shape_the_visual() {
        let mut scheduler = QueuedScheduler::new();
        let mut tracker = active_tracker(&mut scheduler);
        let glow = Vec3::new(0.0, 0.83, 1.0);

        let idle = tracker.visual(glow).unwrap();
        assert_eq!(idle.cursor_scale, 1.0);
        assert_eq!(idle.trail_opacity, 0.25);
        assert_eq!(idle.cursor_position, Vec2::new(640.0 - 24.0, 400.0 - 24.0));

        tracker.hover(HoverTarget::classify("DIV", Some("button"), false));
        let hovering = tracker.visual(glow).unwrap();
        assert_eq!(hovering.cursor_scale, 1.15);
        assert_eq!(hovering.trail_scale, 1.3);
        assert_eq!(hovering.trail_opacity, 0.5);

        tracker.set_clicking(true);
        assert_eq!(tracker.visual(glow).unwrap().cursor_scale, 0.85);

        tracker.pointer_left();
        let k = tracker.kinematics().unwrap();
        assert!(!k.hovering && !k.clicking);
    }

    #[test]
    fn hover_classification() {
        assert_eq!(HoverTarget::classify("a", None, false), HoverTarget::Link);
        assert_eq!(HoverTarget::classify("TEXTAREA", None, false), HoverTarget::Input);
        assert_eq!(HoverTarget::classify("section", None, true), HoverTarget::Marked);
        assert_eq!(HoverTarget::classify("p", Some("note"), false), HoverTarget::Other);
        assert!(!HoverTarget::Other.is_interactive());
    }
}

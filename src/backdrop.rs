//! Wires the theme, pointer, section, visibility and scene components to one
//! frame scheduler and one stream of host events.

use std::cell::Cell;
use std::rc::Rc;

use crate::config::BackdropConfig;
use crate::frame::{FrameToken, QueuedScheduler};
use crate::pointer::{Capabilities, CursorVisual, DeviceProbe, HoverTarget, PointerTracker};
use crate::scene::{SceneRenderer, SceneSink};
use crate::sections::{ScrollProgress, SectionEntry, SectionLayout, SectionTracker};
use crate::theme::{KeyValueStore, Theme, ThemeStore};
use crate::visibility::VisibilityGate;

/// Input from the host environment, already reduced to what components need.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    PointerMoved { x: f32, y: f32 },
    PointerButton { pressed: bool },
    PointerOver(HoverTarget),
    PointerLeft,
    Resized(DeviceProbe),
    SectionsIntersected(Vec<SectionEntry>),
    SceneIntersection(bool),
    TabVisibility(bool),
    ToggleTheme,
}

pub struct Backdrop {
    config: BackdropConfig,
    probe: DeviceProbe,
    theme: ThemeStore,
    pointer: PointerTracker,
    sections: SectionTracker,
    scroll: ScrollProgress,
    visibility: VisibilityGate,
    scene: SceneRenderer,
    scheduler: QueuedScheduler,
    /// Last theme broadcast by the store, not yet applied to the scene.
    pending_theme: Rc<Cell<Option<Theme>>>,
    /// Set by the visibility gate whenever `should_render` flips.
    pending_gate: Rc<Cell<Option<bool>>>,
    torn_down: bool,
}

impl Backdrop {
    pub fn new(
        config: BackdropConfig,
        probe: DeviceProbe,
        storage: Option<Box<dyn KeyValueStore>>,
        scheduler: QueuedScheduler,
    ) -> Self {
        let storage = if probe.capabilities.contains(Capabilities::PERSISTENT_STORAGE) {
            storage
        } else {
            None
        };
        let mut theme = ThemeStore::new(storage);
        let pending_theme = Rc::new(Cell::new(None));
        let signal = pending_theme.clone();
        theme.subscribe(move |theme| signal.set(Some(*theme)));

        let mut visibility = VisibilityGate::new();
        let pending_gate = Rc::new(Cell::new(None));
        let signal = pending_gate.clone();
        visibility.subscribe(move |should_render| signal.set(Some(*should_render)));

        let pointer = PointerTracker::new(&probe, &config.pointer);
        let sections = SectionTracker::new(config.sections.ids.clone(), config.sections.offset);
        let scene = SceneRenderer::new(&config.scene, theme.get());

        let mut backdrop = Self {
            config,
            probe,
            theme,
            pointer,
            sections,
            scroll: ScrollProgress::default(),
            visibility,
            scene,
            scheduler,
            pending_theme,
            pending_gate,
            torn_down: false,
        };
        backdrop.pointer.start(&mut backdrop.scheduler);
        backdrop.sync_scene_gate();
        backdrop
    }

    pub fn handle(&mut self, event: HostEvent) {
        if self.torn_down {
            return;
        }
        match event {
            HostEvent::PointerMoved { x, y } => self.pointer.pointer_moved(x, y),
            HostEvent::PointerButton { pressed } => self.pointer.set_clicking(pressed),
            HostEvent::PointerOver(target) => self.pointer.hover(target),
            HostEvent::PointerLeft => self.pointer.pointer_left(),
            HostEvent::Resized(probe) => {
                self.probe = probe;
                self.pointer
                    .reprobe(&probe, &self.config.pointer, &mut self.scheduler);
                self.sync_scene_gate();
            }
            HostEvent::SectionsIntersected(entries) => {
                self.sections.apply_batch(&entries);
            }
            HostEvent::SceneIntersection(in_viewport) => {
                self.visibility.set_in_viewport(in_viewport);
                self.apply_pending_gate();
            }
            HostEvent::TabVisibility(foreground) => {
                self.visibility.set_tab_foreground(foreground);
                self.apply_pending_gate();
            }
            HostEvent::ToggleTheme => {
                self.toggle_theme();
            }
        }
    }

    /// Attaches section observers. Without intersection support the tracker
    /// stays inert and the active id stays empty.
    pub fn observe_sections(&mut self, layout: &dyn SectionLayout) {
        if self.torn_down {
            return;
        }
        if !self
            .probe
            .capabilities
            .contains(Capabilities::INTERSECTION_OBSERVER)
        {
            log::info!("Intersection observers unavailable, section tracking disabled");
            return;
        }
        self.sections.observe(layout);
        self.sections.update_from_layout(layout);
    }

    /// Re-evaluates section intersections against the current layout.
    pub fn layout_changed(&mut self, layout: &dyn SectionLayout) -> bool {
        !self.torn_down && self.sections.update_from_layout(layout)
    }

    pub fn scroll(&mut self, scroll_top: f32, scroll_height: f32, client_height: f32) -> bool {
        !self.torn_down && self.scroll.update(scroll_top, scroll_height, client_height)
    }

    pub fn attach_sink(&mut self, sink: Box<dyn SceneSink>) {
        if self.torn_down {
            return;
        }
        self.scene.attach_sink(sink, &mut self.scheduler);
    }

    pub fn surface_failed(&mut self, reason: &str) {
        self.scene.surface_failed(reason, &mut self.scheduler);
    }

    /// Physical size of the render surface.
    pub fn resize_surface(&mut self, width: u32, height: u32) {
        self.scene.resize(width, height);
    }

    pub fn toggle_theme(&mut self) -> Theme {
        if self.torn_down {
            return self.theme.get();
        }
        let theme = self.theme.toggle();
        self.apply_pending_theme();
        theme
    }

    pub fn set_theme(&mut self, theme: Theme) {
        if self.torn_down {
            return;
        }
        self.theme.set(theme);
        self.apply_pending_theme();
    }

    /// Dispatches one delivered frame to whichever component owns it.
    pub fn on_frame(&mut self, token: FrameToken, now_ms: f64) {
        self.apply_pending_theme();
        if self.pointer.on_frame(token, &mut self.scheduler) {
            return;
        }
        let pointer = self.pointer.normalized();
        self.scene
            .on_frame(token, now_ms, pointer, &mut self.scheduler);
    }

    /// Runs every frame due at this vsync and returns how many were dispatched.
    /// The pointer frame runs first so the scene sees this frame's vector.
    pub fn pump(&mut self, now_ms: f64) -> usize {
        let mut due = self.scheduler.take_due();
        if let Some(pointer_token) = self.pointer.pending_token() {
            if let Some(position) = due.iter().position(|&token| token == pointer_token) {
                due.swap(0, position);
            }
        }
        for &token in &due {
            self.on_frame(token, now_ms);
        }
        due.len()
    }

    /// Releases every frame, observer and subscription. Permanent.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.pointer.stop(&mut self.scheduler);
        self.sections.disconnect();
        self.scene.teardown(&mut self.scheduler);
        self.theme.release();
        self.visibility.release();
        log::info!(
            "Backdrop torn down ({} frames requested, {} cancelled)",
            self.scheduler.total_requested(),
            self.scheduler.total_cancelled()
        );
    }

    pub fn theme(&self) -> Theme {
        self.theme.get()
    }

    pub fn theme_store(&self) -> &ThemeStore {
        &self.theme
    }

    /// Changes made through the store reach the scene by the next frame.
    pub fn theme_store_mut(&mut self) -> &mut ThemeStore {
        &mut self.theme
    }

    pub fn pointer(&self) -> &PointerTracker {
        &self.pointer
    }

    pub fn cursor_visual(&self) -> Option<CursorVisual> {
        self.pointer.visual(self.theme.color_parameters().cursor_glow)
    }

    pub fn active_section(&self) -> &str {
        self.sections.active()
    }

    pub fn scroll_progress(&self) -> ScrollProgress {
        self.scroll
    }

    pub fn visibility(&self) -> &VisibilityGate {
        &self.visibility
    }

    pub fn scene(&self) -> &SceneRenderer {
        &self.scene
    }

    pub fn scheduler(&self) -> &QueuedScheduler {
        &self.scheduler
    }

    pub fn probe(&self) -> &DeviceProbe {
        &self.probe
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    fn apply_pending_theme(&mut self) {
        if let Some(theme) = self.pending_theme.take() {
            self.scene.set_theme(theme);
        }
    }

    fn apply_pending_gate(&mut self) {
        if self.pending_gate.take().is_some() {
            self.sync_scene_gate();
        }
    }

    fn sync_scene_gate(&mut self) {
        let frames = self
            .probe
            .capabilities
            .contains(Capabilities::ANIMATION_FRAMES);
        let should_render = frames && self.visibility.should_render() && !self.torn_down;
        self.scene.set_should_render(should_render, &mut self.scheduler);
    }
}

impl Drop for Backdrop {
    fn drop(&mut self) {
        self.teardown();
    }
}

use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoopProxy},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use crate::backdrop::{Backdrop, HostEvent};
use crate::clock::Timer;
use crate::config::BackdropConfig;
use crate::frame::QueuedScheduler;
use crate::pointer::{DeviceProbe, Viewport};
use crate::scene::gpu::GpuSink;
use crate::sections::{SectionLayout, SectionRect};

#[cfg(target_arch = "wasm32")]
use std::{cell::RefCell, rc::Rc};

#[cfg(target_arch = "wasm32")]
use crate::error::Result;
#[cfg(target_arch = "wasm32")]
use crate::web;

const DIMX: u32 = 1280;
const DIMY: u32 = 800;
const LINE_HEIGHT: f32 = 40.0;

/// Events posted to the loop from outside winit's own event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum UserEvent {
    /// A frame was requested while the scheduler was idle.
    FrameRequested,
    /// Input observed by the page rather than the window.
    Host(HostEvent),
    Scrolled,
    ToggleTheme,
    #[cfg(target_arch = "wasm32")]
    SurfaceReady,
}

/// Stand-in page for the native window: full-height sections stacked in
/// order, scrolled with the mouse wheel.
#[derive(Debug, Clone)]
pub struct DemoPage {
    ids: Vec<String>,
    viewport_height: f32,
    scroll_top: f32,
}

impl DemoPage {
    pub fn new(ids: Vec<String>, viewport_height: f32) -> Self {
        Self {
            ids,
            viewport_height,
            scroll_top: 0.0,
        }
    }

    pub fn scroll_height(&self) -> f32 {
        self.ids.len() as f32 * self.viewport_height
    }

    pub fn scroll_top(&self) -> f32 {
        self.scroll_top
    }

    pub fn scroll_by(&mut self, delta: f32) {
        let max = (self.scroll_height() - self.viewport_height).max(0.0);
        self.scroll_top = (self.scroll_top + delta).clamp(0.0, max);
    }

    pub fn set_viewport_height(&mut self, height: f32) {
        let fraction = if self.viewport_height > 0.0 {
            self.scroll_top / self.viewport_height
        } else {
            0.0
        };
        self.viewport_height = height;
        self.scroll_top = fraction * height;
        self.scroll_by(0.0);
    }
}

impl SectionLayout for DemoPage {
    fn section_rect(&self, id: &str) -> Option<SectionRect> {
        let index = self.ids.iter().position(|candidate| candidate == id)?;
        let top = index as f32 * self.viewport_height - self.scroll_top;
        Some(SectionRect {
            top,
            bottom: top + self.viewport_height,
        })
    }

    fn viewport_height(&self) -> f32 {
        self.viewport_height
    }
}

pub struct BackdropApp {
    config: BackdropConfig,
    proxy: EventLoopProxy<UserEvent>,
    window: Option<Arc<Window>>,
    backdrop: Option<Backdrop>,
    timer: Timer,
    page: DemoPage,
    #[cfg(target_arch = "wasm32")]
    pending_sink: Rc<RefCell<Option<Result<GpuSink>>>>,
    #[cfg(target_arch = "wasm32")]
    listeners: Option<web::DomListeners>,
    #[cfg(target_arch = "wasm32")]
    section_observer: Option<web::SectionObserver>,
}

impl BackdropApp {
    pub fn new(config: BackdropConfig, proxy: EventLoopProxy<UserEvent>) -> Self {
        let page = DemoPage::new(config.sections.ids.clone(), DIMY as f32);
        Self {
            config,
            proxy,
            window: None,
            backdrop: None,
            timer: Timer::new(),
            page,
            #[cfg(target_arch = "wasm32")]
            pending_sink: Rc::new(RefCell::new(None)),
            #[cfg(target_arch = "wasm32")]
            listeners: None,
            #[cfg(target_arch = "wasm32")]
            section_observer: None,
        }
    }

    fn scheduler(&self) -> QueuedScheduler {
        let proxy = self.proxy.clone();
        QueuedScheduler::new().with_waker(move || {
            // Fails only once the loop has exited.
            let _ = proxy.send_event(UserEvent::FrameRequested);
        })
    }

    fn viewport(window: &Window) -> Viewport {
        let size = window.inner_size().to_logical::<f32>(window.scale_factor());
        Viewport::new(size.width, size.height)
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        #[cfg(target_arch = "wasm32")]
        {
            self.listeners = None;
            self.section_observer = None;
        }
        if let Some(backdrop) = &mut self.backdrop {
            backdrop.teardown();
        }
        event_loop.exit();
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn start(&mut self, window: Arc<Window>) {
        let viewport = Self::viewport(&window);
        let probe = DeviceProbe::desktop(viewport.width, viewport.height);
        let storage = crate::theme::FileStore::new(&self.config.storage_path);
        let mut backdrop = Backdrop::new(
            self.config.clone(),
            probe,
            Some(Box::new(storage)),
            self.scheduler(),
        );

        self.page.set_viewport_height(viewport.height);
        backdrop.observe_sections(&self.page);
        backdrop.scroll(self.page.scroll_top(), self.page.scroll_height(), viewport.height);

        match pollster::block_on(GpuSink::new(window.clone())) {
            Ok(sink) => backdrop.attach_sink(Box::new(sink)),
            Err(e) => backdrop.surface_failed(&e.to_string()),
        }
        let size = window.inner_size();
        backdrop.resize_surface(size.width, size.height);

        self.backdrop = Some(backdrop);
        self.publish_page_state();
    }

    #[cfg(target_arch = "wasm32")]
    fn start(&mut self, window: Arc<Window>) {
        web::mount_canvas(&window);
        let probe = web::probe_device();
        let storage = web::LocalStore::open().map(|store| Box::new(store) as Box<dyn crate::theme::KeyValueStore>);
        let mut backdrop = Backdrop::new(self.config.clone(), probe, storage, self.scheduler());

        web::apply_theme_class(backdrop.theme());
        backdrop
            .theme_store_mut()
            .subscribe(|theme| web::apply_theme_class(*theme));
        backdrop.observe_sections(&web::DomSectionLayout);
        if backdrop
            .probe()
            .capabilities
            .contains(crate::pointer::Capabilities::INTERSECTION_OBSERVER)
        {
            self.section_observer = web::SectionObserver::install(
                &self.config.sections.ids,
                self.config.sections.offset,
                self.proxy.clone(),
            );
        }
        if let Some((top, height, client)) = web::scroll_metrics() {
            backdrop.scroll(top, height, client);
        }
        self.listeners = web::DomListeners::install(self.proxy.clone());

        let slot = self.pending_sink.clone();
        let proxy = self.proxy.clone();
        let surface_window = window.clone();
        wasm_bindgen_futures::spawn_local(async move {
            let sink = GpuSink::new(surface_window).await;
            *slot.borrow_mut() = Some(sink);
            let _ = proxy.send_event(UserEvent::SurfaceReady);
        });

        self.backdrop = Some(backdrop);
        self.publish_page_state();
    }

    /// Surfaces theme, active section and scroll progress to the host chrome.
    #[cfg(not(target_arch = "wasm32"))]
    fn publish_page_state(&self) {
        if let (Some(window), Some(backdrop)) = (&self.window, &self.backdrop) {
            let section = match backdrop.active_section() {
                "" => "-",
                id => id,
            };
            window.set_title(&format!(
                "wbackdrop | {} | {} | {:.0}%",
                backdrop.theme().as_str(),
                section,
                backdrop.scroll_progress().progress * 100.0
            ));
        }
    }

    #[cfg(target_arch = "wasm32")]
    fn publish_page_state(&self) {
        if let Some(backdrop) = &self.backdrop {
            web::publish_page_state(backdrop.active_section(), backdrop.scroll_progress());
        }
    }

    fn scroll_page(&mut self, delta: f32) {
        let Some(backdrop) = &mut self.backdrop else {
            return;
        };
        self.page.scroll_by(delta);
        let page = &self.page;
        let changed = backdrop.scroll(page.scroll_top(), page.scroll_height(), page.viewport_height());
        if backdrop.layout_changed(page) || changed {
            self.publish_page_state();
        }
    }
}

impl ApplicationHandler<UserEvent> for BackdropApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let window = match event_loop.create_window(
            Window::default_attributes()
                .with_title("wbackdrop")
                .with_inner_size(winit::dpi::LogicalSize::new(DIMX, DIMY)),
        ) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        self.window = Some(window.clone());
        self.start(window.clone());
        window.request_redraw();
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: UserEvent) {
        let Some(backdrop) = &mut self.backdrop else {
            return;
        };
        match event {
            UserEvent::FrameRequested => {
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            UserEvent::Host(event) => {
                let sections = matches!(event, HostEvent::SectionsIntersected(_));
                backdrop.handle(event);
                if sections {
                    self.publish_page_state();
                }
            }
            UserEvent::Scrolled => {
                #[cfg(target_arch = "wasm32")]
                {
                    let changed = web::scroll_metrics()
                        .is_some_and(|(top, height, client)| backdrop.scroll(top, height, client));
                    if changed {
                        self.publish_page_state();
                    }
                }
            }
            UserEvent::ToggleTheme => {
                backdrop.toggle_theme();
                self.publish_page_state();
            }
            #[cfg(target_arch = "wasm32")]
            UserEvent::SurfaceReady => {
                let Some(result) = self.pending_sink.borrow_mut().take() else {
                    return;
                };
                match result {
                    Ok(sink) => backdrop.attach_sink(Box::new(sink)),
                    Err(e) => backdrop.surface_failed(&e.to_string()),
                }
                if let Some(window) = &self.window {
                    let size = window.inner_size();
                    backdrop.resize_surface(size.width, size.height);
                }
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        let window = match &self.window {
            Some(window) if window.id() == id => window.clone(),
            _ => return,
        };
        let Some(backdrop) = &mut self.backdrop else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested");
                self.shutdown(event_loop);
            }
            WindowEvent::Resized(size) => {
                let visible = size.width > 0 && size.height > 0;
                backdrop.handle(HostEvent::SceneIntersection(visible));
                if !visible {
                    return;
                }
                let viewport = Self::viewport(&window);
                let probe = DeviceProbe {
                    viewport,
                    ..*backdrop.probe()
                };
                backdrop.resize_surface(size.width, size.height);
                backdrop.handle(HostEvent::Resized(probe));

                #[cfg(not(target_arch = "wasm32"))]
                {
                    self.page.set_viewport_height(viewport.height);
                    self.scroll_page(0.0);
                }
            }
            WindowEvent::Occluded(occluded) => {
                // Native windows report minimising here; on the web this is the
                // canvas leaving the viewport.
                if cfg!(target_arch = "wasm32") {
                    backdrop.handle(HostEvent::SceneIntersection(!occluded));
                } else {
                    backdrop.handle(HostEvent::TabVisibility(!occluded));
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let logical = position.to_logical::<f32>(window.scale_factor());
                backdrop.handle(HostEvent::PointerMoved {
                    x: logical.x,
                    y: logical.y,
                });
            }
            WindowEvent::CursorLeft { .. } => backdrop.handle(HostEvent::PointerLeft),
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                backdrop.handle(HostEvent::PointerButton {
                    pressed: state == ElementState::Pressed,
                });
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let dy = match delta {
                    MouseScrollDelta::LineDelta(_, y) => -y * LINE_HEIGHT,
                    MouseScrollDelta::PixelDelta(position) => {
                        -position.to_logical::<f32>(window.scale_factor()).y
                    }
                };
                if cfg!(not(target_arch = "wasm32")) {
                    self.scroll_page(dy);
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::KeyT) => {
                        backdrop.handle(HostEvent::ToggleTheme);
                        self.publish_page_state();
                    }
                    PhysicalKey::Code(KeyCode::Escape) => self.shutdown(event_loop),
                    _ => {}
                }
            }
            WindowEvent::RedrawRequested => {
                backdrop.pump(self.timer.elapsed_ms());
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(backdrop) = &mut self.backdrop {
            backdrop.teardown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> DemoPage {
        let ids = ["home", "about", "contact"].iter().map(|id| id.to_string()).collect();
        DemoPage::new(ids, 800.0)
    }

    #[test]
    fn demo_page_scroll_is_clamped() {
        let mut page = page();
        page.scroll_by(-100.0);
        assert_eq!(page.scroll_top(), 0.0);
        page.scroll_by(10_000.0);
        assert_eq!(page.scroll_top(), 1600.0);
    }

    #[test]
    fn demo_page_keeps_position_on_resize() {
        let mut page = page();
        page.scroll_by(800.0);
        page.set_viewport_height(400.0);
        assert_eq!(page.scroll_top(), 400.0);
        let about = page.section_rect("about").unwrap();
        assert_eq!(about.top, 0.0);
        assert!(page.section_rect("missing").is_none());
    }
}

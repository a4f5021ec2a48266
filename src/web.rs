//! Browser integration: storage, capability probing, DOM layout and listeners.

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use winit::event_loop::EventLoopProxy;
use winit::window::Window;

use std::cell::RefCell;

use crate::app::UserEvent;
use crate::backdrop::HostEvent;
use crate::error::{BackdropError, Result};
use crate::pointer::{Capabilities, DeviceProbe, HoverTarget, Viewport};
use crate::sections::{ScrollProgress, SectionEntry, SectionLayout, SectionRect, TriggerBand};
use crate::theme::{KeyValueStore, Theme};

const HOVER_SELECTOR: &str = "a, button, [role=\"button\"], input, textarea, select, .interactive";

/// Page state mirrored for the JS exports below.
#[derive(Default)]
struct PageState {
    proxy: Option<EventLoopProxy<UserEvent>>,
    active_section: String,
    scroll_progress: f32,
}

thread_local! {
    static PAGE: RefCell<PageState> = RefCell::new(PageState::default());
}

fn window() -> Option<web_sys::Window> {
    web_sys::window()
}

fn document() -> Option<web_sys::Document> {
    window().and_then(|w| w.document())
}

fn js_error(context: &str, value: JsValue) -> BackdropError {
    BackdropError::Storage(format!("{}: {:?}", context, value))
}

/// `window.localStorage`.
pub struct LocalStore {
    storage: web_sys::Storage,
}

impl LocalStore {
    /// `None` when storage is disabled (private mode, sandboxed frames).
    pub fn open() -> Option<Self> {
        let storage = window()?.local_storage().ok().flatten()?;
        Some(Self { storage })
    }
}

impl KeyValueStore for LocalStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        self.storage
            .get_item(key)
            .map_err(|e| js_error("localStorage.getItem", e))
    }

    fn store(&mut self, key: &str, value: &str) -> Result<()> {
        self.storage
            .set_item(key, value)
            .map_err(|e| js_error("localStorage.setItem", e))
    }
}

fn has_global(window: &web_sys::Window, name: &str) -> bool {
    js_sys::Reflect::has(window, &JsValue::from_str(name)).unwrap_or(false)
}

fn media_matches(window: &web_sys::Window, query: &str) -> bool {
    window
        .match_media(query)
        .ok()
        .flatten()
        .is_some_and(|list| list.matches())
}

fn max_touch_points(window: &web_sys::Window) -> f64 {
    js_sys::Reflect::get(window, &JsValue::from_str("navigator"))
        .and_then(|navigator| js_sys::Reflect::get(&navigator, &JsValue::from_str("maxTouchPoints")))
        .ok()
        .and_then(|points| points.as_f64())
        .unwrap_or(0.0)
}

pub fn probe_device() -> DeviceProbe {
    let Some(window) = window() else {
        return DeviceProbe {
            capabilities: Capabilities::empty(),
            viewport: Viewport::new(0.0, 0.0),
        };
    };

    let mut capabilities = Capabilities::empty();
    capabilities.set(
        Capabilities::ANIMATION_FRAMES,
        has_global(&window, "requestAnimationFrame"),
    );
    capabilities.set(
        Capabilities::INTERSECTION_OBSERVER,
        has_global(&window, "IntersectionObserver"),
    );
    capabilities.set(
        Capabilities::PERSISTENT_STORAGE,
        window.local_storage().ok().flatten().is_some(),
    );
    capabilities.set(
        Capabilities::COARSE_POINTER,
        media_matches(&window, "(pointer: coarse)"),
    );
    capabilities.set(
        Capabilities::TOUCH,
        has_global(&window, "ontouchstart") || max_touch_points(&window) > 0.0,
    );

    let width = window.inner_width().ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
    let height = window.inner_height().ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
    let probe = DeviceProbe {
        capabilities,
        viewport: Viewport::new(width as f32, height as f32),
    };
    log::info!("Device probe: {:?}", probe);
    probe
}

/// Section rectangles read straight from the DOM.
pub struct DomSectionLayout;

impl SectionLayout for DomSectionLayout {
    fn section_rect(&self, id: &str) -> Option<SectionRect> {
        let rect = document()?.get_element_by_id(id)?.get_bounding_client_rect();
        Some(SectionRect {
            top: rect.top() as f32,
            bottom: rect.bottom() as f32,
        })
    }

    fn viewport_height(&self) -> f32 {
        window()
            .and_then(|w| w.inner_height().ok())
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0) as f32
    }
}

/// `(scroll_top, scroll_height, client_height)` of the document element.
pub fn scroll_metrics() -> Option<(f32, f32, f32)> {
    let root = document()?.document_element()?;
    Some((
        root.scroll_top() as f32,
        root.scroll_height() as f32,
        root.client_height() as f32,
    ))
}

/// Keeps exactly one of the `dark`/`light` classes on the document root.
pub fn apply_theme_class(theme: Theme) {
    let Some(root) = document().and_then(|d| d.document_element()) else {
        return;
    };
    let classes = root.class_list();
    let _ = classes.remove_1(theme.toggled().as_str());
    let _ = classes.add_1(theme.as_str());
}

/// Writes the active section and scroll progress onto the document root, as
/// `data-active-section`, `--scroll-progress` and the `scrolled` class.
pub fn publish_page_state(active_section: &str, progress: ScrollProgress) {
    PAGE.with(|page| {
        let mut page = page.borrow_mut();
        page.active_section.clear();
        page.active_section.push_str(active_section);
        page.scroll_progress = progress.progress;
    });

    let Some(root) = document().and_then(|d| d.document_element()) else {
        return;
    };
    let _ = root.set_attribute("data-active-section", active_section);
    let _ = root
        .class_list()
        .toggle_with_force("scrolled", progress.scrolled);
    if let Some(root) = root.dyn_ref::<web_sys::HtmlElement>() {
        let _ = root
            .style()
            .set_property("--scroll-progress", &format!("{:.4}", progress.progress));
    }
}

/// Flips the theme from page chrome. Returns `false` before the backdrop runs.
#[wasm_bindgen(js_name = toggleTheme)]
pub fn toggle_theme() -> bool {
    PAGE.with(|page| match &page.borrow().proxy {
        Some(proxy) => proxy.send_event(UserEvent::ToggleTheme).is_ok(),
        None => false,
    })
}

#[wasm_bindgen(js_name = activeSection)]
pub fn active_section() -> String {
    PAGE.with(|page| page.borrow().active_section.clone())
}

#[wasm_bindgen(js_name = scrollProgress)]
pub fn scroll_progress() -> f32 {
    PAGE.with(|page| page.borrow().scroll_progress)
}

fn hover_target(element: &web_sys::Element) -> HoverTarget {
    match element.closest(HOVER_SELECTOR) {
        Ok(Some(target)) => HoverTarget::classify(
            &target.tag_name(),
            target.get_attribute("role").as_deref(),
            target.class_list().contains("interactive"),
        ),
        _ => HoverTarget::Other,
    }
}

/// Pins the winit canvas behind the page content, full viewport. The canvas
/// takes no pointer events; pointer input comes from [`DomListeners`].
pub fn mount_canvas(window: &Window) {
    use winit::platform::web::WindowExtWebSys;

    let (Some(canvas), Some(document)) = (window.canvas(), document()) else {
        log::warn!("No canvas or document to mount into");
        return;
    };
    let style = canvas.style();
    for (property, value) in [
        ("position", "fixed"),
        ("inset", "0"),
        ("width", "100vw"),
        ("height", "100vh"),
        ("z-index", "-10"),
        ("pointer-events", "none"),
    ] {
        let _ = style.set_property(property, value);
    }

    let container = document
        .get_element_by_id("app")
        .or_else(|| document.body().map(Into::into));
    match container {
        Some(container) => {
            if let Err(e) = container.append_child(&web_sys::Element::from(canvas)) {
                log::warn!("Couldn't append canvas to document: {:?}", e);
            }
        }
        None => log::warn!("No container for the canvas"),
    }
}

type Listener = Closure<dyn FnMut(web_sys::Event)>;

/// DOM listeners forwarding page input into the event loop. Dropping this
/// removes every listener and disables the JS exports.
pub struct DomListeners {
    listeners: Vec<(web_sys::EventTarget, &'static str, Listener)>,
}

impl DomListeners {
    pub fn install(proxy: EventLoopProxy<UserEvent>) -> Option<Self> {
        let window = window()?;
        let document = window.document()?;
        let root = document.document_element()?;
        PAGE.with(|page| page.borrow_mut().proxy = Some(proxy.clone()));

        let mut listeners = Self {
            listeners: Vec::new(),
        };

        let forward = |map: fn(&web_sys::Event) -> Option<UserEvent>| {
            let proxy = proxy.clone();
            move |event: web_sys::Event| {
                if let Some(user_event) = map(&event) {
                    let _ = proxy.send_event(user_event);
                }
            }
        };

        listeners.listen(&document, "visibilitychange", forward(|_| {
            let hidden = web_sys::window()
                .and_then(|w| w.document())
                .is_some_and(|d| d.hidden());
            Some(UserEvent::Host(HostEvent::TabVisibility(!hidden)))
        }));
        listeners.listen(&window, "scroll", forward(|_| Some(UserEvent::Scrolled)));
        listeners.listen(&window, "mousemove", forward(|event| {
            let event = event.dyn_ref::<web_sys::MouseEvent>()?;
            Some(UserEvent::Host(HostEvent::PointerMoved {
                x: event.client_x() as f32,
                y: event.client_y() as f32,
            }))
        }));
        listeners.listen(&window, "mousedown", forward(|event| {
            let event = event.dyn_ref::<web_sys::MouseEvent>()?;
            (event.button() == 0).then_some(UserEvent::Host(HostEvent::PointerButton { pressed: true }))
        }));
        listeners.listen(&window, "mouseup", forward(|event| {
            let event = event.dyn_ref::<web_sys::MouseEvent>()?;
            (event.button() == 0).then_some(UserEvent::Host(HostEvent::PointerButton { pressed: false }))
        }));
        listeners.listen(&document, "mouseover", forward(|event| {
            let target = event.target()?.dyn_into::<web_sys::Element>().ok()?;
            Some(UserEvent::Host(HostEvent::PointerOver(hover_target(&target))))
        }));
        listeners.listen(&root, "mouseleave", forward(|_| Some(UserEvent::Host(HostEvent::PointerLeft))));

        Some(listeners)
    }

    fn listen(
        &mut self,
        target: &web_sys::EventTarget,
        name: &'static str,
        callback: impl FnMut(web_sys::Event) + 'static,
    ) {
        let closure = Closure::wrap(Box::new(callback) as Box<dyn FnMut(web_sys::Event)>);
        if let Err(e) = target.add_event_listener_with_callback(name, closure.as_ref().unchecked_ref()) {
            log::warn!("{} listener failed: {:?}", name, e);
            return;
        }
        self.listeners.push((target.clone(), name, closure));
    }
}

impl Drop for DomListeners {
    fn drop(&mut self) {
        for (target, name, closure) in self.listeners.drain(..) {
            let _ = target.remove_event_listener_with_callback(name, closure.as_ref().unchecked_ref());
        }
        PAGE.with(|page| page.borrow_mut().proxy = None);
    }
}

/// One `IntersectionObserver` over every section element, with its root
/// inset `offset` px from the top and half the viewport from the bottom.
/// Batches are forwarded as [`HostEvent::SectionsIntersected`].
pub struct SectionObserver {
    observer: web_sys::IntersectionObserver,
    _callback: Closure<dyn FnMut(js_sys::Array)>,
}

impl SectionObserver {
    pub fn install(ids: &[String], offset: f32, proxy: EventLoopProxy<UserEvent>) -> Option<Self> {
        let document = document()?;

        let callback = Closure::wrap(Box::new(move |entries: js_sys::Array| {
            let batch: Vec<SectionEntry> = entries
                .iter()
                .filter_map(|entry| entry.dyn_into::<web_sys::IntersectionObserverEntry>().ok())
                .map(|entry| SectionEntry::new(entry.target().id(), entry.is_intersecting()))
                .collect();
            if !batch.is_empty() {
                let _ = proxy.send_event(UserEvent::Host(HostEvent::SectionsIntersected(batch)));
            }
        }) as Box<dyn FnMut(js_sys::Array)>);

        let options = web_sys::IntersectionObserverInit::new();
        options.set_root_margin(&TriggerBand::root_margin(offset));
        let observer = match web_sys::IntersectionObserver::new_with_options(
            callback.as_ref().unchecked_ref(),
            &options,
        ) {
            Ok(observer) => observer,
            Err(e) => {
                log::warn!("IntersectionObserver construction failed: {:?}", e);
                return None;
            }
        };

        let mut observed = 0;
        for element in ids.iter().filter_map(|id| document.get_element_by_id(id)) {
            observer.observe(&element);
            observed += 1;
        }
        log::debug!("IntersectionObserver watching {}/{} sections", observed, ids.len());

        Some(Self {
            observer,
            _callback: callback,
        })
    }
}

impl Drop for SectionObserver {
    fn drop(&mut self) {
        self.observer.disconnect();
    }
}

//! Animated page backdrop: a pointer-following cursor, scroll-spy section
//! tracking and a themed 3D particle field, driven by winit and wgpu.

pub mod app;
pub mod backdrop;
pub mod clock;
pub mod config;
pub mod error;
pub mod frame;
pub mod observe;
pub mod pointer;
pub mod scene;
pub mod sections;
pub mod theme;
pub mod visibility;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use backdrop::{Backdrop, HostEvent};
pub use config::BackdropConfig;
pub use error::{BackdropError, Result};
pub use frame::{FrameScheduler, FrameToken, QueuedScheduler};
pub use pointer::{Capabilities, DeviceProbe, PointerTracker};
pub use scene::{SceneRenderer, SceneSink};
pub use sections::SectionTracker;
pub use theme::{Theme, ThemeStore};
pub use visibility::VisibilityGate;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;
use winit::event_loop::{ControlFlow, EventLoop};

use crate::app::{BackdropApp, UserEvent};

#[cfg_attr(target_arch = "wasm32", wasm_bindgen(start))]
pub fn run() {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "wasm32")] {
            std::panic::set_hook(Box::new(console_error_panic_hook::hook));
            if let Err(e) = console_log::init_with_level(log::Level::Info) {
                web_sys::console::log_1(&format!("Couldn't initialize logger: {}", e).into());
            }
        } else {
            env_logger::init();
        }
    }
    log::info!("Started wbackdrop v{}", env!("CARGO_PKG_VERSION"));

    let config = BackdropConfig::from_env();

    let event_loop = match EventLoop::<UserEvent>::with_user_event().build() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("Failed to create event loop: {}", e);
            return;
        }
    };
    // Frames are requested through the scheduler's waker, so the loop can sleep.
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = BackdropApp::new(config, event_loop.create_proxy());
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("Event loop terminated with an error: {}", e);
    }
}

//! Global light/dark theme.
//!
//! [`ThemeStore`] is the only writer of the active [`Theme`]. Dependents either
//! subscribe for synchronous change notifications or read the derived
//! [`ColorParameters`] table.

use std::collections::HashMap;
use std::path::PathBuf;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{BackdropError, Result};
use crate::observe::{SubscriptionId, Subscribers};

/// Storage key of the persisted theme.
pub const THEME_KEY: &str = "theme";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "dark" => Some(Theme::Dark),
            "light" => Some(Theme::Light),
            _ => None,
        }
    }

    pub fn is_dark(self) -> bool {
        self == Theme::Dark
    }
}

/// Rendering values keyed by theme.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorParameters {
    pub background: Vec3,
    pub fog: Vec3,
    pub ambient_intensity: f32,
    pub particle_opacity: f32,
    pub shape_opacity: f32,
    pub shape_emissive: f32,
    pub cursor_glow: Vec3,
}

pub(crate) const fn hex(rgb: u32) -> Vec3 {
    Vec3::new(
        ((rgb >> 16) & 0xff) as f32 / 255.0,
        ((rgb >> 8) & 0xff) as f32 / 255.0,
        (rgb & 0xff) as f32 / 255.0,
    )
}

const DARK_PARAMETERS: ColorParameters = ColorParameters {
    background: hex(0x020617),
    fog: hex(0x020617),
    ambient_intensity: 0.5,
    particle_opacity: 0.85,
    shape_opacity: 0.25,
    shape_emissive: 0.3,
    cursor_glow: hex(0x00d4ff),
};

const LIGHT_PARAMETERS: ColorParameters = ColorParameters {
    background: hex(0xf8fafc),
    fog: hex(0xf8fafc),
    ambient_intensity: 0.7,
    particle_opacity: 0.8,
    shape_opacity: 0.18,
    shape_emissive: 0.1,
    cursor_glow: hex(0x0284c7),
};

pub fn color_parameters(theme: Theme) -> ColorParameters {
    match theme {
        Theme::Dark => DARK_PARAMETERS,
        Theme::Light => LIGHT_PARAMETERS,
    }
}

/// Persistent string key-value storage.
pub trait KeyValueStore {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn store(&mut self, key: &str, value: &str) -> Result<()>;
}

/// In-process storage. `failing()` builds one that rejects every access.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
    failing: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, key: &str, value: &str) -> Self {
        self.entries.insert(key.to_string(), value.to_string());
        self
    }

    pub fn failing() -> Self {
        Self {
            entries: HashMap::new(),
            failing: true,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        if self.failing {
            return Err(BackdropError::Storage("memory store disabled".into()));
        }
        Ok(self.entries.get(key).cloned())
    }

    fn store(&mut self, key: &str, value: &str) -> Result<()> {
        if self.failing {
            return Err(BackdropError::Storage("memory store disabled".into()));
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// JSON object on disk, one string value per key.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_all(&self) -> Result<HashMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(source) => Ok(serde_json::from_str(&source)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl KeyValueStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn store(&mut self, key: &str, value: &str) -> Result<()> {
        // A corrupt file is replaced rather than blocking every later write.
        let mut entries = self.read_all().unwrap_or_default();
        entries.insert(key.to_string(), value.to_string());
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&entries)?)?;
        Ok(())
    }
}

pub struct ThemeStore {
    theme: Theme,
    storage: Option<Box<dyn KeyValueStore>>,
    subscribers: Subscribers<Theme>,
}

impl ThemeStore {
    /// Reads the persisted choice, defaulting to [`Theme::Dark`]. Passing `None`
    /// models a host without persistent storage.
    pub fn new(storage: Option<Box<dyn KeyValueStore>>) -> Self {
        let theme = match &storage {
            Some(storage) => match storage.load(THEME_KEY) {
                Ok(Some(value)) => Theme::parse(&value).unwrap_or_else(|| {
                    log::warn!("Ignoring unrecognized stored theme {:?}", value);
                    Theme::default()
                }),
                Ok(None) => Theme::default(),
                Err(e) => {
                    log::warn!("Theme storage unreadable, using default: {}", e);
                    Theme::default()
                }
            },
            None => Theme::default(),
        };
        log::info!("Theme initialised to {}", theme.as_str());

        Self {
            theme,
            storage,
            subscribers: Subscribers::new(),
        }
    }

    pub fn get(&self) -> Theme {
        self.theme
    }

    pub fn set(&mut self, theme: Theme) {
        if theme == self.theme {
            return;
        }
        self.theme = theme;
        self.persist();
        log::info!("Theme changed to {}", theme.as_str());
        self.subscribers.notify(&theme);
    }

    pub fn toggle(&mut self) -> Theme {
        self.set(self.theme.toggled());
        self.theme
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&Theme) + 'static) -> SubscriptionId {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn color_parameters(&self) -> ColorParameters {
        color_parameters(self.theme)
    }

    /// Drops every subscriber.
    pub fn release(&mut self) {
        self.subscribers.clear();
    }

    fn persist(&mut self) {
        if let Some(storage) = &mut self.storage {
            if let Err(e) = storage.store(THEME_KEY, self.theme.as_str()) {
                log::warn!("Failed to persist theme: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Storage handle that survives the store, like a browser's localStorage.
    #[derive(Clone, Default)]
    struct SharedStore(Rc<RefCell<MemoryStore>>);

    impl KeyValueStore for SharedStore {
        fn load(&self, key: &str) -> Result<Option<String>> {
            self.0.borrow().load(key)
        }

        fn store(&mut self, key: &str, value: &str) -> Result<()> {
            self.0.borrow_mut().store(key, value)
        }
    }

    #[test]
    fn defaults_to_dark() {
        assert_eq!(ThemeStore::new(None).get(), Theme::Dark);
        assert_eq!(ThemeStore::new(Some(Box::new(MemoryStore::new()))).get(), Theme::Dark);
    }

    #[test]
    fn invalid_or_unreadable_storage_gives_dark() {
        let store = MemoryStore::new().with_entry(THEME_KEY, "sepia");
        assert_eq!(ThemeStore::new(Some(Box::new(store))).get(), Theme::Dark);
        assert_eq!(ThemeStore::new(Some(Box::new(MemoryStore::failing()))).get(), Theme::Dark);
    }

    #[test]
    fn toggle_writes_through_and_survives_reload() {
        let shared = SharedStore::default();
        let mut store = ThemeStore::new(Some(Box::new(shared.clone())));
        let dark = store.color_parameters();

        assert_eq!(store.toggle(), Theme::Light);
        assert_eq!(shared.0.borrow().get(THEME_KEY), Some("light"));
        assert_ne!(store.color_parameters(), dark);

        let reloaded = ThemeStore::new(Some(Box::new(shared)));
        assert_eq!(reloaded.get(), Theme::Light);
    }

    #[test]
    fn failed_writes_are_swallowed() {
        let mut store = ThemeStore::new(Some(Box::new(MemoryStore::failing())));
        assert_eq!(store.toggle(), Theme::Light);
        assert_eq!(store.get(), Theme::Light);
    }

    #[test]
    fn subscribers_see_changes_only() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut store = ThemeStore::new(None);
        let sink = seen.clone();
        let id = store.subscribe(move |theme| sink.borrow_mut().push(*theme));

        store.set(Theme::Dark);
        store.toggle();
        store.toggle();
        assert!(store.unsubscribe(id));
        store.toggle();

        assert_eq!(*seen.borrow(), vec![Theme::Light, Theme::Dark]);
    }

    #[test]
    fn parameters_are_pure_and_differ_everywhere() {
        for theme in [Theme::Dark, Theme::Light] {
            assert_eq!(color_parameters(theme), color_parameters(theme));
        }
        let dark = color_parameters(Theme::Dark);
        let light = color_parameters(Theme::Light);
        assert_ne!(dark.background, light.background);
        assert_ne!(dark.fog, light.fog);
        assert_ne!(dark.ambient_intensity, light.ambient_intensity);
        assert_ne!(dark.particle_opacity, light.particle_opacity);
        assert_ne!(dark.shape_opacity, light.shape_opacity);
        assert_ne!(dark.shape_emissive, light.shape_emissive);
        assert_ne!(dark.cursor_glow, light.cursor_glow);
        assert!(light.shape_opacity < dark.shape_opacity);
        assert!(light.shape_emissive < dark.shape_emissive);
    }

    #[test]
    fn theme_strings() {
        assert_eq!(Theme::parse("light"), Some(Theme::Light));
        assert_eq!(Theme::parse("Light"), None);
        assert_eq!(Theme::Dark.as_str(), "dark");
        assert_eq!(serde_json::to_string(&Theme::Light).unwrap(), "\"light\"");
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn file_store_round_trip() {
        let dir = std::env::temp_dir().join(format!("wbackdrop-theme-{}", std::process::id()));
        let path = dir.join("prefs.json");
        let _ = std::fs::remove_file(&path);

        let mut store = ThemeStore::new(Some(Box::new(FileStore::new(&path))));
        assert_eq!(store.get(), Theme::Dark);
        store.toggle();

        let reloaded = ThemeStore::new(Some(Box::new(FileStore::new(&path))));
        assert_eq!(reloaded.get(), Theme::Light);
        let _ = std::fs::remove_dir_all(&dir);
    }
}

#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;

// Cross-platform wall clock used by hosts to timestamp frames.
pub struct Timer {
    #[cfg(not(target_arch = "wasm32"))]
    start: Instant,
    #[cfg(target_arch = "wasm32")]
    start_time_ms: f64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    pub fn new() -> Self {
        #[cfg(not(target_arch = "wasm32"))]
        {
            Self {
                start: Instant::now(),
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            Self {
                start_time_ms: Self::now_ms(),
            }
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        #[cfg(not(target_arch = "wasm32"))]
        {
            self.start.elapsed().as_secs_f64() * 1000.0
        }

        #[cfg(target_arch = "wasm32")]
        {
            Self::now_ms() - self.start_time_ms
        }
    }

    #[cfg(target_arch = "wasm32")]
    fn now_ms() -> f64 {
        web_sys::window()
            .and_then(|w| w.performance())
            .map(|p| p.now())
            .unwrap_or_else(js_sys::Date::now)
    }
}

/// Seed derived from the wall clock, for runs without a configured seed.
pub fn clock_seed() -> u64 {
    #[cfg(not(target_arch = "wasm32"))]
    {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x5eed)
    }

    #[cfg(target_arch = "wasm32")]
    {
        (js_sys::Date::now() * 1000.0) as u64 ^ (js_sys::Math::random() * u32::MAX as f64) as u64
    }
}

/// Animation time that only advances while frames are being run.
///
/// Host timestamps keep moving while a loop is paused; pausing drops the
/// reference timestamp so the first frame after a resume advances by zero
/// instead of jumping over the paused interval.
#[derive(Debug, Clone)]
pub struct SceneClock {
    elapsed: f32,
    last_ms: Option<f64>,
    max_step: f32,
}

impl SceneClock {
    pub fn new(max_step: f32) -> Self {
        Self {
            elapsed: 0.0,
            last_ms: None,
            max_step,
        }
    }

    /// Advances to `now_ms` and returns the applied step in seconds.
    pub fn tick(&mut self, now_ms: f64) -> f32 {
        let step = match self.last_ms {
            Some(last) => (((now_ms - last) / 1000.0) as f32).clamp(0.0, self.max_step),
            None => 0.0,
        };
        self.last_ms = Some(now_ms);
        self.elapsed += step;
        step
    }

    pub fn pause(&mut self) {
        self.last_ms = None;
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }
}

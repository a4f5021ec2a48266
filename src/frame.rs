//! Frame scheduling.
//!
//! Components never call the host's animation-frame API directly. They hold an
//! [`AnimationLoop`] and talk to a [`FrameScheduler`]; the host drains the
//! requested tokens once per vsync and hands each one back to whoever owns it.

/// Handle for one requested frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameToken(u64);

impl FrameToken {
    pub fn id(self) -> u64 {
        self.0
    }
}

pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameToken;
    fn cancel_frame(&mut self, token: FrameToken);
}

/// Scheduler backed by a token queue that the host drains each vsync.
///
/// An optional waker is invoked whenever a frame is requested while the queue
/// was empty, so an idle host (winit `ControlFlow::Wait`, or a browser that
/// stopped calling `requestAnimationFrame`) knows to produce another frame.
#[derive(Default)]
pub struct QueuedScheduler {
    next_token: u64,
    pending: Vec<FrameToken>,
    requested: u64,
    cancelled: u64,
    waker: Option<Box<dyn FnMut()>>,
}

impl QueuedScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_waker(mut self, waker: impl FnMut() + 'static) -> Self {
        self.waker = Some(Box::new(waker));
        self
    }

    /// Takes every token due at this vsync. Tokens requested while the batch
    /// is being dispatched land in the next batch.
    pub fn take_due(&mut self) -> Vec<FrameToken> {
        std::mem::take(&mut self.pending)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, token: FrameToken) -> bool {
        self.pending.contains(&token)
    }

    pub fn total_requested(&self) -> u64 {
        self.requested
    }

    pub fn total_cancelled(&self) -> u64 {
        self.cancelled
    }
}

impl FrameScheduler for QueuedScheduler {
    fn request_frame(&mut self) -> FrameToken {
        let token = FrameToken(self.next_token);
        self.next_token += 1;
        self.requested += 1;
        let was_idle = self.pending.is_empty();
        self.pending.push(token);
        if was_idle {
            if let Some(waker) = &mut self.waker {
                waker();
            }
        }
        token
    }

    fn cancel_frame(&mut self, token: FrameToken) {
        if let Some(index) = self.pending.iter().position(|&t| t == token) {
            self.pending.remove(index);
            self.cancelled += 1;
        }
    }
}

/// A repeating frame task bound to a single active flag.
///
/// While active exactly one frame is outstanding; each delivered frame re-arms
/// the next. Stopping cancels the outstanding frame right away.
#[derive(Debug)]
pub struct AnimationLoop {
    label: &'static str,
    active: bool,
    pending: Option<FrameToken>,
    frames_run: u64,
}

impl AnimationLoop {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            active: false,
            pending: None,
            frames_run: 0,
        }
    }

    pub fn start(&mut self, scheduler: &mut dyn FrameScheduler) {
        if self.active {
            return;
        }
        self.active = true;
        self.pending = Some(scheduler.request_frame());
        log::debug!("{} loop started", self.label);
    }

    pub fn stop(&mut self, scheduler: &mut dyn FrameScheduler) {
        if let Some(token) = self.pending.take() {
            scheduler.cancel_frame(token);
        }
        if self.active {
            self.active = false;
            log::debug!("{} loop stopped after {} frames", self.label, self.frames_run);
        }
    }

    /// Claims a delivered frame. Returns `true` when the token belongs to this
    /// loop and frame work should run; the next frame is already requested.
    pub fn begin_frame(&mut self, token: FrameToken, scheduler: &mut dyn FrameScheduler) -> bool {
        if !self.active || self.pending != Some(token) {
            return false;
        }
        self.frames_run += 1;
        self.pending = Some(scheduler.request_frame());
        true
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn pending(&self) -> Option<FrameToken> {
        self.pending
    }

    pub fn frames_run(&self) -> u64 {
        self.frames_run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn loop_rearms_each_frame() {
        let mut scheduler = QueuedScheduler::new();
        let mut frame_loop = AnimationLoop::new("test");
        frame_loop.start(&mut scheduler);

        for _ in 0..3 {
            let due = scheduler.take_due();
            assert_eq!(due.len(), 1);
            assert!(frame_loop.begin_frame(due[0], &mut scheduler));
        }
        assert_eq!(frame_loop.frames_run(), 3);
        assert_eq!(scheduler.pending_count(), 1);
    }

    #[test]
    fn stop_cancels_outstanding_frame() {
        let mut scheduler = QueuedScheduler::new();
        let mut frame_loop = AnimationLoop::new("test");
        frame_loop.start(&mut scheduler);
        frame_loop.stop(&mut scheduler);

        assert!(!scheduler.has_pending());
        assert_eq!(scheduler.total_cancelled(), 1);
        assert_eq!(frame_loop.pending(), None);
    }

    #[test]
    fn stale_token_is_ignored() {
        let mut scheduler = QueuedScheduler::new();
        let mut frame_loop = AnimationLoop::new("test");
        frame_loop.start(&mut scheduler);
        let due = scheduler.take_due();
        frame_loop.stop(&mut scheduler);

        assert!(!frame_loop.begin_frame(due[0], &mut scheduler));
        assert!(!scheduler.has_pending());
    }

    #[test]
    fn start_is_idempotent() {
        let mut scheduler = QueuedScheduler::new();
        let mut frame_loop = AnimationLoop::new("test");
        frame_loop.start(&mut scheduler);
        frame_loop.start(&mut scheduler);
        assert_eq!(scheduler.total_requested(), 1);
    }

    #[test]
    fn waker_fires_only_when_idle() {
        let wakes = Rc::new(Cell::new(0));
        let counter = wakes.clone();
        let mut scheduler = QueuedScheduler::new().with_waker(move || counter.set(counter.get() + 1));

        scheduler.request_frame();
        scheduler.request_frame();
        assert_eq!(wakes.get(), 1);

        scheduler.take_due();
        scheduler.request_frame();
        assert_eq!(wakes.get(), 2);
    }
}

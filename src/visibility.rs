use crate::observe::{SubscriptionId, Subscribers};
use crate::sections::SectionRect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityState {
    pub in_viewport: bool,
    pub tab_foreground: bool,
}

impl VisibilityState {
    pub fn should_render(&self) -> bool {
        self.in_viewport && self.tab_foreground
    }
}

impl Default for VisibilityState {
    fn default() -> Self {
        Self {
            in_viewport: true,
            tab_foreground: true,
        }
    }
}

/// True when `rect` lies within the viewport grown by `margin` px on both ends.
pub fn in_viewport(rect: SectionRect, viewport_height: f32, margin: f32) -> bool {
    rect.bottom > -margin && rect.top < viewport_height + margin
}

/// Combines the intersection and tab-foreground signals into one boolean.
///
/// Hosts without an intersection signal never call `set_in_viewport`, so the
/// gate then follows the tab signal alone.
pub struct VisibilityGate {
    state: VisibilityState,
    subscribers: Subscribers<bool>,
}

impl Default for VisibilityGate {
    fn default() -> Self {
        Self::new()
    }
}

impl VisibilityGate {
    pub fn new() -> Self {
        Self {
            state: VisibilityState::default(),
            subscribers: Subscribers::new(),
        }
    }

    /// Returns `true` when `should_render` flipped.
    pub fn set_in_viewport(&mut self, in_viewport: bool) -> bool {
        self.update(VisibilityState {
            in_viewport,
            ..self.state
        })
    }

    /// Returns `true` when `should_render` flipped.
    pub fn set_tab_foreground(&mut self, tab_foreground: bool) -> bool {
        self.update(VisibilityState {
            tab_foreground,
            ..self.state
        })
    }

    pub fn should_render(&self) -> bool {
        self.state.should_render()
    }

    pub fn state(&self) -> VisibilityState {
        self.state
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&bool) + 'static) -> SubscriptionId {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn release(&mut self) {
        self.subscribers.clear();
    }

    fn update(&mut self, next: VisibilityState) -> bool {
        let was = self.state.should_render();
        self.state = next;
        let now = next.should_render();
        if was == now {
            return false;
        }
        log::debug!("Visibility {:?} -> should_render {}", next, now);
        self.subscribers.notify(&now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn notifies_only_on_derived_change() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut gate = VisibilityGate::new();
        gate.subscribe(move |render| sink.borrow_mut().push(*render));

        assert!(gate.set_tab_foreground(false));
        assert!(!gate.set_in_viewport(false));
        assert!(!gate.set_tab_foreground(true));
        assert!(gate.set_in_viewport(true));
        assert!(!gate.set_in_viewport(true));

        assert_eq!(*seen.borrow(), vec![false, true]);
    }

    #[test]
    fn both_signals_required() {
        let mut gate = VisibilityGate::new();
        assert!(gate.should_render());
        gate.set_in_viewport(false);
        assert!(!gate.should_render());
        gate.set_in_viewport(true);
        gate.set_tab_foreground(false);
        assert!(!gate.should_render());
        assert_eq!(
            gate.state(),
            VisibilityState {
                in_viewport: true,
                tab_foreground: false
            }
        );
    }

    #[test]
    fn viewport_margin() {
        let rect = SectionRect {
            top: 950.0,
            bottom: 1500.0,
        };
        assert!(!in_viewport(rect, 900.0, 0.0));
        assert!(in_viewport(rect, 900.0, 100.0));
        assert!(in_viewport(SectionRect { top: -200.0, bottom: 10.0 }, 900.0, 0.0));
        assert!(!in_viewport(SectionRect { top: -200.0, bottom: -60.0 }, 900.0, 50.0));
    }
}

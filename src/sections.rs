//! Active page section and scroll progress.

/// Vertical extent of an element in viewport coordinates (px, y down).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionRect {
    pub top: f32,
    pub bottom: f32,
}

/// Where section elements currently sit on screen.
pub trait SectionLayout {
    /// `None` when no element carries this id.
    fn section_rect(&self, id: &str) -> Option<SectionRect>;
    fn viewport_height(&self) -> f32;
}

/// One observer report.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionEntry {
    pub id: String,
    pub is_intersecting: bool,
}

impl SectionEntry {
    pub fn new(id: impl Into<String>, is_intersecting: bool) -> Self {
        Self {
            id: id.into(),
            is_intersecting,
        }
    }
}

/// Viewport slice that decides whether a section counts as current: from
/// `offset` px below the top down to the middle of the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerBand {
    pub top: f32,
    pub bottom: f32,
}

impl TriggerBand {
    pub fn new(offset: f32, viewport_height: f32) -> Self {
        Self {
            top: offset,
            bottom: viewport_height * 0.5,
        }
    }

    pub fn intersects(&self, rect: SectionRect) -> bool {
        self.bottom > self.top && rect.top < self.bottom && rect.bottom > self.top
    }

    /// The same band as an `IntersectionObserver` root margin.
    pub fn root_margin(offset: f32) -> String {
        format!("-{}px 0px -50% 0px", offset)
    }
}

#[derive(Debug)]
struct ObservedSection {
    id: String,
    order: usize,
    intersecting: Option<bool>,
}

#[derive(Debug)]
pub struct SectionTracker {
    ids: Vec<String>,
    offset: f32,
    observed: Vec<ObservedSection>,
    active: String,
}

impl SectionTracker {
    /// `ids` are listed top to bottom.
    pub fn new(ids: Vec<String>, offset: f32) -> Self {
        Self {
            ids,
            offset,
            observed: Vec::new(),
            active: String::new(),
        }
    }

    /// Attaches an observer to every section that has an element. Sections
    /// without one are skipped.
    pub fn observe(&mut self, layout: &dyn SectionLayout) {
        self.observed.clear();
        for (order, id) in self.ids.iter().enumerate() {
            if layout.section_rect(id).is_none() {
                log::debug!("Section {:?} has no element, skipping", id);
                continue;
            }
            self.observed.push(ObservedSection {
                id: id.clone(),
                order,
                intersecting: None,
            });
        }
        log::debug!("Observing {}/{} sections", self.observed.len(), self.ids.len());
    }

    /// Applies one batch of observer reports. Returns `true` when the active
    /// id changed.
    ///
    /// Among the entries reporting intersection, the section declared lowest
    /// on the page wins regardless of the order entries arrive in. When no
    /// entry intersects the current id is kept.
    pub fn apply_batch(&mut self, entries: &[SectionEntry]) -> bool {
        let mut winner: Option<usize> = None;
        for entry in entries {
            let Some(section) = self.observed.iter_mut().find(|s| s.id == entry.id) else {
                continue;
            };
            section.intersecting = Some(entry.is_intersecting);
            if entry.is_intersecting && winner.is_none_or(|order| section.order > order) {
                winner = Some(section.order);
            }
        }

        let Some(order) = winner else {
            return false;
        };
        let id = &self.ids[order];
        if *id == self.active {
            return false;
        }
        log::debug!("Active section {:?} -> {:?}", self.active, id);
        self.active = id.clone();
        true
    }

    /// Computes observer reports from the current layout, emitting entries
    /// only for sections whose intersection state changed.
    pub fn update_from_layout(&mut self, layout: &dyn SectionLayout) -> bool {
        let band = TriggerBand::new(self.offset, layout.viewport_height());
        let entries: Vec<SectionEntry> = self
            .observed
            .iter()
            .filter_map(|section| {
                let intersecting = layout
                    .section_rect(&section.id)
                    .is_some_and(|rect| band.intersects(rect));
                (section.intersecting != Some(intersecting))
                    .then(|| SectionEntry::new(section.id.clone(), intersecting))
            })
            .collect();

        if entries.is_empty() {
            return false;
        }
        self.apply_batch(&entries)
    }

    pub fn active(&self) -> &str {
        &self.active
    }

    pub fn observed_count(&self) -> usize {
        self.observed.len()
    }

    /// Detaches every observer. Later batches are ignored.
    pub fn disconnect(&mut self) {
        if !self.observed.is_empty() {
            log::debug!("Disconnecting {} section observers", self.observed.len());
        }
        self.observed.clear();
    }
}

const SCROLLED_THRESHOLD: f32 = 50.0;

/// Fraction of the page scrolled, for the progress bar and nav chrome.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollProgress {
    pub progress: f32,
    pub scrolled: bool,
}

impl ScrollProgress {
    /// Returns `true` when either value changed.
    pub fn update(&mut self, scroll_top: f32, scroll_height: f32, client_height: f32) -> bool {
        let range = scroll_height - client_height;
        let progress = if range > 0.0 {
            (scroll_top / range).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let next = ScrollProgress {
            progress,
            scrolled: scroll_top > SCROLLED_THRESHOLD,
        };
        let changed = next != *self;
        *self = next;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sections of equal height stacked from the top of the page.
    struct StackedPage {
        ids: Vec<&'static str>,
        section_height: f32,
        viewport_height: f32,
        scroll_top: f32,
    }

    impl SectionLayout for StackedPage {
        fn section_rect(&self, id: &str) -> Option<SectionRect> {
            let index = self.ids.iter().position(|candidate| *candidate == id)?;
            let top = index as f32 * self.section_height - self.scroll_top;
            Some(SectionRect {
                top,
                bottom: top + self.section_height,
            })
        }

        fn viewport_height(&self) -> f32 {
            self.viewport_height
        }
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn scrolling_reports_sections_in_order() {
        let mut page = StackedPage {
            ids: vec!["a", "b", "c"],
            section_height: 800.0,
            viewport_height: 900.0,
            scroll_top: 0.0,
        };
        let mut tracker = SectionTracker::new(ids(&["a", "b", "c"]), 100.0);
        tracker.observe(&page);
        assert_eq!(tracker.active(), "");

        let mut seen = Vec::new();
        let mut scroll = 0.0;
        while scroll <= 1600.0 {
            page.scroll_top = scroll;
            if tracker.update_from_layout(&page) {
                seen.push(tracker.active().to_string());
            }
            scroll += 25.0;
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[test]
    fn lowest_section_wins_a_batch() {
        let mut tracker = SectionTracker::new(ids(&["a", "b", "c"]), 100.0);
        tracker.observe(&StackedPage {
            ids: vec!["a", "b", "c"],
            section_height: 100.0,
            viewport_height: 900.0,
            scroll_top: 0.0,
        });

        assert!(tracker.apply_batch(&[SectionEntry::new("c", true), SectionEntry::new("a", true)]));
        assert_eq!(tracker.active(), "c");
        assert!(!tracker.apply_batch(&[SectionEntry::new("a", true), SectionEntry::new("c", true)]));
        assert_eq!(tracker.active(), "c");
    }

    #[test]
    fn nothing_intersecting_keeps_active() {
        let mut tracker = SectionTracker::new(ids(&["a", "b"]), 0.0);
        tracker.observe(&StackedPage {
            ids: vec!["a", "b"],
            section_height: 100.0,
            viewport_height: 900.0,
            scroll_top: 0.0,
        });
        tracker.apply_batch(&[SectionEntry::new("b", true)]);
        assert!(!tracker.apply_batch(&[SectionEntry::new("b", false), SectionEntry::new("a", false)]));
        assert_eq!(tracker.active(), "b");
    }

    #[test]
    fn missing_sections_are_skipped() {
        let page = StackedPage {
            ids: vec!["a", "c"],
            section_height: 100.0,
            viewport_height: 900.0,
            scroll_top: 0.0,
        };
        let mut tracker = SectionTracker::new(ids(&["a", "b", "c"]), 100.0);
        tracker.observe(&page);
        assert_eq!(tracker.observed_count(), 2);
        assert!(!tracker.apply_batch(&[SectionEntry::new("b", true)]));
        assert_eq!(tracker.active(), "");
    }

    #[test]
    fn disconnect_ignores_later_batches() {
        let page = StackedPage {
            ids: vec!["a"],
            section_height: 500.0,
            viewport_height: 900.0,
            scroll_top: 0.0,
        };
        let mut tracker = SectionTracker::new(ids(&["a"]), 100.0);
        tracker.observe(&page);
        tracker.disconnect();
        assert!(!tracker.update_from_layout(&page));
        assert_eq!(tracker.active(), "");
    }

    #[test]
    fn trigger_band_edges_do_not_count() {
        let band = TriggerBand::new(100.0, 800.0);
        assert!(!band.intersects(SectionRect { top: -300.0, bottom: 100.0 }));
        assert!(!band.intersects(SectionRect { top: 400.0, bottom: 900.0 }));
        assert!(band.intersects(SectionRect { top: 399.0, bottom: 900.0 }));
        assert!(!TriggerBand::new(500.0, 800.0).intersects(SectionRect { top: 0.0, bottom: 800.0 }));
    }

    #[test]
    fn root_margin_insets_offset_and_lower_half() {
        assert_eq!(TriggerBand::root_margin(100.0), "-100px 0px -50% 0px");
        assert_eq!(TriggerBand::root_margin(72.5), "-72.5px 0px -50% 0px");
    }

    #[test]
    fn scroll_progress_bounds() {
        let mut progress = ScrollProgress::default();
        assert!(!progress.update(0.0, 900.0, 900.0));
        assert_eq!(progress.progress, 0.0);

        assert!(progress.update(550.0, 2000.0, 900.0));
        assert!((progress.progress - 0.5).abs() < 1e-6);
        assert!(progress.scrolled);

        progress.update(5000.0, 2000.0, 900.0);
        assert_eq!(progress.progress, 1.0);
        progress.update(40.0, 2000.0, 900.0);
        assert!(!progress.scrolled);
    }
}

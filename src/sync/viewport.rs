//! Vertical geometry of a pane's scrolling list.
//!
//! Items are stacked top to bottom in registry order. The viewport tracks
//! each item's height and the current scroll offset, and answers which items
//! sit in a given band of the visible area.

/// Fraction of the viewport height that still counts as the first page.
const FIRST_PAGE_FRACTION: f32 = 0.8;

/// A pair of indices, newest (top) and oldest (bottom).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopBottom<T> {
    pub top: T,
    pub bottom: T,
}

impl<T> TopBottom<T> {
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> TopBottom<U> {
        TopBottom {
            top: f(self.top),
            bottom: f(self.bottom),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Viewport {
    heights: Vec<f32>,
    /// `tops[i]` is the offset of item `i`; one extra slot holds the content height.
    tops: Vec<f32>,
    scroll_y: f32,
    height: f32,
    default_item_height: f32,
}

impl Viewport {
    pub fn new(height: f32, default_item_height: f32) -> Self {
        Self {
            heights: Vec::new(),
            tops: vec![0.0],
            scroll_y: 0.0,
            height,
            default_item_height,
        }
    }

    pub fn len(&self) -> usize {
        self.heights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn scroll_y(&self) -> f32 {
        self.scroll_y
    }

    pub fn content_height(&self) -> f32 {
        self.tops.last().copied().unwrap_or(0.0)
    }

    pub fn max_scroll(&self) -> f32 {
        (self.content_height() - self.height).max(0.0)
    }

    /// Changes the visible extent. Items without a measured height use
    /// `default_item_height` from now on.
    pub fn set_extent(&mut self, height: f32, default_item_height: f32) {
        self.height = height.max(0.0);
        self.default_item_height = default_item_height.max(0.0);
        self.scroll_y = self.clamp(self.scroll_y);
    }

    /// Moves the scroll offset, clamped to the content. Returns whether it
    /// changed.
    pub fn scroll_to(&mut self, y: f32) -> bool {
        let y = self.clamp(y);
        if (y - self.scroll_y).abs() < f32::EPSILON {
            return false;
        }
        self.scroll_y = y;
        true
    }

    pub fn clamp(&self, y: f32) -> f32 {
        y.clamp(0.0, self.max_scroll())
    }

    pub fn insert_item(&mut self, index: usize) {
        let index = index.min(self.heights.len());
        self.heights.insert(index, self.default_item_height);
        self.rebuild();
    }

    pub fn remove_item(&mut self, index: usize) {
        if index < self.heights.len() {
            self.heights.remove(index);
            self.rebuild();
        }
    }

    pub fn set_item_height(&mut self, index: usize, height: f32) {
        if let Some(slot) = self.heights.get_mut(index) {
            *slot = height.max(0.0);
            self.rebuild();
        }
    }

    pub fn reset(&mut self, count: usize) {
        self.heights = vec![self.default_item_height; count];
        self.scroll_y = 0.0;
        self.rebuild();
    }

    pub fn item_top(&self, index: usize) -> Option<f32> {
        (index < self.heights.len()).then(|| self.tops[index])
    }

    pub fn item_height(&self, index: usize) -> Option<f32> {
        self.heights.get(index).copied()
    }

    /// Scroll offset that puts item `index` in the middle of the viewport.
    pub fn centered_offset(&self, index: usize) -> Option<f32> {
        let top = self.item_top(index)?;
        let height = self.heights[index];
        Some(top - (self.height - height) / 2.0)
    }

    /// Index of the first item whose bottom edge is at or below `y`.
    fn first_reaching(&self, y: f32, from: usize) -> Option<usize> {
        (from..self.heights.len()).find(|&i| self.tops[i + 1] >= y)
    }

    /// Items between the top and bottom `margin` fractions of the viewport.
    ///
    /// The top item is the first one reaching into the band; the bottom item
    /// is the first one reaching its lower edge, or the last item.
    pub fn focus_window(&self, margin: f32) -> Option<TopBottom<usize>> {
        let upper = self.scroll_y + self.height * margin;
        let lower = self.scroll_y + self.height * (1.0 - margin);
        let top = self.first_reaching(upper, 0)?;
        let bottom = self
            .first_reaching(lower, top)
            .unwrap_or(self.heights.len() - 1);
        Some(TopBottom { top, bottom })
    }

    pub fn first_visible_index(&self) -> Option<usize> {
        self.heights
            .iter()
            .enumerate()
            .find(|&(i, _)| self.tops[i + 1] > self.scroll_y)
            .map(|(i, _)| i)
    }

    /// Number of items at least partly inside the viewport.
    pub fn visible_span(&self) -> usize {
        let Some(first) = self.first_visible_index() else {
            return 0;
        };
        let bottom = self.scroll_y + self.height;
        (first..self.heights.len())
            .take_while(|&i| self.tops[i] < bottom)
            .count()
    }

    pub fn on_first_page(&self) -> bool {
        self.scroll_y < self.height * FIRST_PAGE_FRACTION
    }

    fn rebuild(&mut self) {
        self.tops.clear();
        self.tops.reserve(self.heights.len() + 1);
        let mut offset = 0.0;
        self.tops.push(offset);
        for height in &self.heights {
            offset += height;
            self.tops.push(offset);
        }
        self.scroll_y = self.clamp(self.scroll_y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ten 100px items in a 400px viewport.
    fn viewport() -> Viewport {
        let mut viewport = Viewport::new(400.0, 100.0);
        viewport.reset(10);
        viewport
    }

    #[test]
    fn test_focus_window_at_top() {
        let viewport = viewport();
        // Band is 140..260.
        assert_eq!(viewport.focus_window(0.35), Some(TopBottom { top: 1, bottom: 2 }));
    }

    #[test]
    fn test_focus_window_scrolled() {
        let mut viewport = viewport();
        viewport.scroll_to(350.0);
        // Band is 490..610.
        assert_eq!(viewport.focus_window(0.35), Some(TopBottom { top: 4, bottom: 6 }));
        assert_eq!(viewport.first_visible_index(), Some(3));
    }

    #[test]
    fn test_focus_window_short_list() {
        let mut viewport = Viewport::new(400.0, 100.0);
        viewport.reset(2);
        // Lower band edge is past the content, so the last item closes it.
        assert_eq!(viewport.focus_window(0.35), Some(TopBottom { top: 1, bottom: 1 }));

        viewport.reset(1);
        assert_eq!(viewport.focus_window(0.35), None);
        assert_eq!(Viewport::new(400.0, 100.0).focus_window(0.35), None);
    }

    #[test]
    fn test_scroll_is_clamped() {
        let mut viewport = viewport();
        assert!(viewport.scroll_to(10_000.0));
        assert_eq!(viewport.scroll_y(), 600.0);
        assert!(!viewport.scroll_to(600.0));
        viewport.scroll_to(-5.0);
        assert_eq!(viewport.scroll_y(), 0.0);
    }

    #[test]
    fn test_centered_offset() {
        let viewport = viewport();
        assert_eq!(viewport.centered_offset(5), Some(350.0));
        assert_eq!(viewport.centered_offset(0), Some(-150.0));
        assert_eq!(viewport.centered_offset(10), None);
    }

    #[test]
    fn test_insert_and_remove_shift_items() {
        let mut viewport = viewport();
        viewport.insert_item(0);
        viewport.set_item_height(0, 250.0);
        assert_eq!(viewport.item_top(1), Some(250.0));
        assert_eq!(viewport.content_height(), 1250.0);

        viewport.remove_item(0);
        assert_eq!(viewport.item_top(1), Some(100.0));
        assert_eq!(viewport.len(), 10);
    }

    #[test]
    fn test_removal_clamps_scroll() {
        let mut viewport = viewport();
        viewport.scroll_to(600.0);
        for _ in 0..5 {
            viewport.remove_item(0);
        }
        assert_eq!(viewport.scroll_y(), 100.0);
    }

    #[test]
    fn test_visible_span_and_first_page() {
        let mut viewport = viewport();
        assert_eq!(viewport.visible_span(), 4);
        assert!(viewport.on_first_page());
        viewport.scroll_to(350.0);
        assert_eq!(viewport.visible_span(), 5);
        assert!(!viewport.on_first_page());
    }
}

//! Flow region stack.
//!
//! Floating images and tables narrow the region that text flows into until
//! the cursor passes below them. Each float pushes a level recording the
//! narrowed left/right edges and the bottom (and page) where the float ends.
//! The base level is the full printable area; the top edge is shared.

/// Deepest supported nesting of floats.
pub const MAX_REGION_DEPTH: usize = 128;

/// Current flow rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    /// Left edge
    pub left: f32,
    /// Right edge
    pub right: f32,
    /// Bottom edge
    pub bottom: f32,
    /// Top edge
    pub top: f32,
    /// Nesting level (0 = no active floats)
    pub level: usize,
}

impl Region {
    /// Vertical midpoint between top and bottom.
    pub fn halfway(&self) -> f32 {
        0.5 * (self.top + self.bottom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Level {
    left: f32,
    right: f32,
    bottom: f32,
    page: usize,
}

/// Stack of nested flow regions.
#[derive(Debug, Clone)]
pub struct RegionStack {
    levels: Vec<Level>,
    top: f32,
}

impl RegionStack {
    /// Create a stack whose base level is the given rectangle.
    pub fn new(left: f32, right: f32, bottom: f32, top: f32) -> Self {
        Self {
            levels: vec![Level {
                left,
                right,
                bottom,
                page: 0,
            }],
            top,
        }
    }

    fn current_level(&self) -> &Level {
        // levels is never empty: the base level is never popped
        &self.levels[self.levels.len() - 1]
    }

    /// Current nesting level.
    pub fn level(&self) -> usize {
        self.levels.len() - 1
    }

    /// Current left edge.
    pub fn left(&self) -> f32 {
        self.current_level().left
    }

    /// Current right edge.
    pub fn right(&self) -> f32 {
        self.current_level().right
    }

    /// Current bottom edge.
    pub fn bottom(&self) -> f32 {
        self.current_level().bottom
    }

    /// Bottom edge of the base level.
    pub fn base_bottom(&self) -> f32 {
        self.levels[0].bottom
    }

    /// Shared top edge.
    pub fn top(&self) -> f32 {
        self.top
    }

    /// Page on which the current level ends.
    pub fn page(&self) -> usize {
        self.current_level().page
    }

    /// Snapshot of the current region.
    pub fn current(&self) -> Region {
        let level = self.current_level();
        Region {
            left: level.left,
            right: level.right,
            bottom: self.levels[0].bottom,
            top: self.top,
            level: self.level(),
        }
    }

    /// Nest a narrower region for a float.
    ///
    /// `left_shift`/`right_shift` move the current edges inward; the float
    /// ends at `bottom` on `page`. A push beyond [`MAX_REGION_DEPTH`] is
    /// ignored.
    pub fn push(&mut self, left_shift: f32, right_shift: f32, bottom: f32, page: usize) {
        let left = self.left() + left_shift;
        let right = self.right() - right_shift;
        self.push_edges(left, right, bottom, page);
    }

    /// Nest a region given absolute edges.
    pub fn push_edges(&mut self, left: f32, right: f32, bottom: f32, page: usize) {
        let level = self.level();

        if bottom > self.bottom() || page > self.page() || level == 0 {
            // Ends before the current float: stack it on top.
            if level >= MAX_REGION_DEPTH - 1 {
                log::warn!("Region stack full; ignoring float ending at {:.1}", bottom);
                return;
            }
            self.levels.push(Level {
                left,
                right,
                bottom,
                page,
            });
        } else if bottom == self.bottom() && page == self.page() {
            // Ends together with the current float: narrow in place.
            let current = &mut self.levels[level];
            current.left = left;
            current.right = right;
        } else {
            // Ends after the current float: the new top level inherits the
            // old bottom and the current level is tightened down to `bottom`.
            if level >= MAX_REGION_DEPTH - 1 {
                log::warn!("Region stack full; ignoring float ending at {:.1}", bottom);
                return;
            }
            let outer = self.levels[level - 1];
            let current = self.levels[level];
            let inherited_bottom = current.bottom;

            let tightened = &mut self.levels[level];
            tightened.left = if current.left < left { left } else { outer.left };
            tightened.right = if current.right > right { right } else { outer.right };
            tightened.bottom = bottom;

            self.levels.push(Level {
                left,
                right,
                bottom: inherited_bottom,
                page,
            });
        }
    }

    fn pop(&mut self) {
        if self.levels.len() > 1 {
            self.levels.pop();
        }
    }

    /// Pop every level whose bottom the cursor `(y, page)` has passed.
    pub fn clear(&mut self, y: f32, page: usize) {
        while self.level() > 0
            && ((y <= self.bottom() && page == self.page()) || page > self.page())
        {
            self.pop();
        }
    }

    /// Force-pop all floats, moving the cursor below the outermost one.
    pub fn end(&mut self, y: &mut f32, page: &mut usize) {
        if self.level() > 0 {
            let outermost = self.levels[1];
            if outermost.page > *page {
                *page = outermost.page;
            }
            *y = outermost.bottom;
            self.levels.truncate(1);
        }
    }

    /// Shift the left edge of every level.
    pub fn adjust_left(&mut self, delta: f32) {
        for level in &mut self.levels {
            level.left += delta;
        }
    }

    /// Shift the right edge of every level.
    pub fn adjust_right(&mut self, delta: f32) {
        for level in &mut self.levels {
            level.right += delta;
        }
    }

    /// Shift the bottom edge of every level.
    pub fn adjust_bottom(&mut self, delta: f32) {
        for level in &mut self.levels {
            level.bottom += delta;
        }
    }

    /// Shift the shared top edge.
    pub fn adjust_top(&mut self, delta: f32) {
        self.top += delta;
    }

    /// Reset to a new base rectangle, dropping all floats (page size change).
    pub fn reset(&mut self, left: f32, right: f32, bottom: f32, top: f32) {
        *self = Self::new(left, right, bottom, top);
    }
}

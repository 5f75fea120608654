// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::ops::Range;

pub const DEFAULT_PREFETCH_THRESHOLD: usize = 10;
pub const DEFAULT_OVERSCAN: usize = 5;

/// Rows that should be materialized for a viewport of `height` rows whose
/// first visible row is `scroll`, padded by `overscan` on each side.
pub fn visible_range(total: usize, height: usize, scroll: usize, overscan: usize) -> Range<usize> {
    if total == 0 {
        return 0..0;
    }
    let first = scroll.min(total - 1);
    let start = first.saturating_sub(overscan);
    let end = first
        .saturating_add(height)
        .saturating_add(overscan)
        .min(total);
    start..end
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewport {
    scroll: usize,
    height: usize,
    overscan: usize,
    rendered: Range<usize>,
}

impl Viewport {
    pub fn new(overscan: usize) -> Self {
        Self {
            scroll: 0,
            height: 0,
            overscan,
            rendered: 0..0,
        }
    }

    pub fn scroll(&self) -> usize {
        self.scroll
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn rendered(&self) -> Range<usize> {
        self.rendered.clone()
    }

    pub fn set_height(&mut self, height: usize) {
        self.height = height;
    }

    /// Keep `row` on screen, scrolling by the minimum amount.
    pub fn scroll_to_reveal(&mut self, row: usize) {
        if row < self.scroll {
            self.scroll = row;
        } else if self.height > 0 && row >= self.scroll + self.height {
            self.scroll = row + 1 - self.height;
        }
    }

    /// Recompute the rendered range. Returns it only when it changed.
    pub fn update(&mut self, total: usize) -> Option<Range<usize>> {
        if total > 0 && self.scroll >= total {
            self.scroll = total - 1;
        }
        let next = visible_range(total, self.height, self.scroll, self.overscan);
        if next == self.rendered {
            return None;
        }
        self.rendered = next.clone();
        Some(next)
    }

    pub fn reset(&mut self) {
        self.scroll = 0;
        self.rendered = 0..0;
    }
}

/// Decides when to fetch the next page of rows. `loaded` counts rows the
/// server has handed over, which is also the next fetch offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLoader {
    page_size: usize,
    threshold: usize,
    loaded: usize,
    has_more: bool,
    in_flight: bool,
}

impl PageLoader {
    pub fn new(page_size: usize, threshold: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            threshold,
            loaded: 0,
            has_more: false,
            in_flight: false,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn loaded(&self) -> usize {
        self.loaded
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Offset of the next page when the last rendered row is within the
    /// threshold of the loaded edge.
    pub fn next_fetch(&mut self, last_rendered: usize) -> Option<usize> {
        if self.in_flight || !self.has_more {
            return None;
        }
        if last_rendered + self.threshold < self.loaded {
            return None;
        }
        self.in_flight = true;
        Some(self.loaded)
    }

    /// Mark a fetch as started without the threshold check, e.g. the first
    /// page or a full refresh.
    pub fn begin_fetch(&mut self) {
        self.in_flight = true;
    }

    pub fn page_loaded(&mut self, received: usize, has_more: bool, replace: bool) {
        self.in_flight = false;
        self.has_more = has_more;
        if replace {
            self.loaded = received;
        } else {
            self.loaded += received;
        }
    }

    pub fn fetch_failed(&mut self) {
        self.in_flight = false;
    }

    pub fn reset(&mut self) {
        self.loaded = 0;
        self.has_more = false;
        self.in_flight = false;
    }
}

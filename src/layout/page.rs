//! Page store: pages, their metadata and their render primitives.
//!
//! Pages are created lazily by [`PageStore::ensure`]. A new page copies its
//! predecessor's metadata (size, margins, media, header/footer) but never its
//! primitives. Primitives stay owned by their page until the serializer
//! drains them with [`Page::take_primitives`].

use crate::config::{ExportConfig, HeadFootFormat};
use crate::fonts::{FontStyle, Typeface};
use crate::progress::{Diagnostic, DiagnosticKind, ProgressSink};
use crate::tree::Rgb;

/// Axis-aligned rectangle in page-local points; `y` is the bottom edge.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    /// Left edge
    pub x: f32,
    /// Bottom edge
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
}

impl Rect {
    /// Create a rectangle.
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Right edge.
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    /// Top edge.
    pub fn top(&self) -> f32 {
        self.y + self.height
    }
}

/// Destination of a link primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Named target inside the document (without the leading `#`)
    Named(String),
    /// External URI
    Uri(String),
    /// Heading ordinal in the heading index (TOC entries)
    Heading(usize),
}

impl LinkTarget {
    /// Classify an `HREF` value.
    pub fn from_href(href: &str) -> Self {
        match href.strip_prefix('#') {
            Some(name) => LinkTarget::Named(name.to_string()),
            None => LinkTarget::Uri(href.to_string()),
        }
    }
}

/// What a primitive draws.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveKind {
    /// A run of text on one line
    Text {
        /// Text
        text: String,
        /// Typeface
        typeface: Typeface,
        /// Style within the typeface
        font_style: FontStyle,
        /// Font size in points
        size: f32,
        /// Fill color
        color: Rgb,
        /// Extra spacing after each character (justification)
        char_spacing: f32,
    },
    /// A raster image, keyed by its `SRC`
    Image {
        /// Image key in the document's image table
        src: String,
    },
    /// A stroked rectangle outline
    Box {
        /// Stroke color
        color: Rgb,
        /// Stroke width
        line_width: f32,
    },
    /// A filled rectangle (rules, borders, cell backgrounds)
    FilledBox {
        /// Fill color
        color: Rgb,
    },
    /// A clickable area
    Link {
        /// Destination
        target: LinkTarget,
    },
    /// Page background, drawn before everything else
    Background {
        /// Fill color
        color: Option<Rgb>,
        /// Tiled image key
        image: Option<String>,
    },
}

/// One positioned drawing instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    /// Page index
    pub page: usize,
    /// Bounding box in page-local coordinates
    pub rect: Rect,
    /// Payload
    pub kind: PrimitiveKind,
}

impl Primitive {
    /// Text baseline: half the leading plus a fifth of the font size above
    /// the box bottom.
    pub fn baseline(&self) -> f32 {
        match &self.kind {
            PrimitiveKind::Text { size, .. } => {
                let descent = (self.rect.height - size).max(0.0) * 0.5 + size * 0.2;
                self.rect.y + descent
            },
            _ => self.rect.y,
        }
    }

    /// Whether this is a text run.
    pub fn is_text(&self) -> bool {
        matches!(self.kind, PrimitiveKind::Text { .. })
    }
}

/// Which part of the output a page belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Section {
    /// Title page: no headers or footers
    Title,
    /// Table of contents: roman page numbers
    Contents,
    /// Document body
    #[default]
    Body,
}

/// One output page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Media width in points (after orientation)
    pub width: f32,
    /// Media length in points (after orientation)
    pub length: f32,
    /// Left margin
    pub left: f32,
    /// Right margin
    pub right: f32,
    /// Top margin
    pub top: f32,
    /// Bottom margin
    pub bottom: f32,
    /// Landscape orientation
    pub landscape: bool,
    /// Two-sided printing
    pub duplex: bool,
    /// Logical pages per sheet
    pub nup: u8,
    /// Output section
    pub section: Section,
    /// Chapter number (0 = contents or front matter)
    pub chapter: usize,
    /// Header format
    pub header: HeadFootFormat,
    /// Footer format
    pub footer: HeadFootFormat,
    /// Running chapter label (`$CHAPTER`)
    pub chapter_label: Option<String>,
    /// Running heading label (`$HEADING`)
    pub heading_label: Option<String>,
    /// Media color
    pub media_color: Option<String>,
    /// Media type
    pub media_type: Option<String>,
    /// Media source position
    pub media_position: u32,
    /// Background color
    pub background_color: Option<Rgb>,
    /// Background image key
    pub background_image: Option<String>,
    primitives: Vec<Primitive>,
}

impl Page {
    fn from_config(config: &ExportConfig) -> Self {
        let (width, length) = config.oriented_size();
        Self {
            width,
            length,
            left: config.margin_left,
            right: config.margin_right,
            top: config.margin_top,
            bottom: config.margin_bottom,
            landscape: config.landscape,
            duplex: config.duplex,
            nup: config.nup,
            section: Section::Body,
            chapter: 0,
            header: HeadFootFormat::default(),
            footer: HeadFootFormat::default(),
            chapter_label: None,
            heading_label: None,
            media_color: config.media_color.clone(),
            media_type: config.media_type.clone(),
            media_position: config.media_position,
            background_color: config.background_color,
            background_image: config.background_image.clone(),
            primitives: Vec::new(),
        }
    }

    fn successor(&self) -> Self {
        Self {
            width: self.width,
            length: self.length,
            left: self.left,
            right: self.right,
            top: self.top,
            bottom: self.bottom,
            landscape: self.landscape,
            duplex: self.duplex,
            nup: self.nup,
            section: self.section,
            chapter: self.chapter,
            header: self.header.clone(),
            footer: self.footer.clone(),
            chapter_label: self.chapter_label.clone(),
            heading_label: self.heading_label.clone(),
            media_color: self.media_color.clone(),
            media_type: self.media_type.clone(),
            media_position: self.media_position,
            background_color: self.background_color,
            background_image: self.background_image.clone(),
            primitives: Vec::new(),
        }
    }

    /// Printable width.
    pub fn print_width(&self) -> f32 {
        self.width - self.left - self.right
    }

    /// Printable length.
    pub fn print_length(&self) -> f32 {
        self.length - self.top - self.bottom
    }

    /// Primitives in drawing order.
    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    /// Mutable access to the primitives, for in-place shifting.
    pub fn primitives_mut(&mut self) -> &mut [Primitive] {
        &mut self.primitives
    }

    /// Number of primitives.
    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    /// Whether the page has no primitives.
    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    /// Move the primitives out, leaving the page empty.
    pub fn take_primitives(&mut self) -> Vec<Primitive> {
        std::mem::take(&mut self.primitives)
    }

    /// Concatenated text of all text primitives, in drawing order.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for prim in &self.primitives {
            if let PrimitiveKind::Text { text, .. } = &prim.kind {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(text);
            }
        }
        out
    }

    /// Merge touching link primitives that share a target.
    ///
    /// Two links merge when they sit on the same line and the second starts
    /// where the first ends.
    pub fn merge_links(&mut self) {
        let mut merged: Vec<Primitive> = Vec::with_capacity(self.primitives.len());
        let mut last_link: Option<usize> = None;

        for prim in self.primitives.drain(..) {
            if let PrimitiveKind::Link { target } = &prim.kind {
                if let Some(idx) = last_link {
                    let prev = &mut merged[idx];
                    let same_target =
                        matches!(&prev.kind, PrimitiveKind::Link { target: t } if t == target);
                    if same_target
                        && (prev.rect.y - prim.rect.y).abs() < 0.01
                        && (prev.rect.height - prim.rect.height).abs() < 0.01
                        && (prev.rect.right() - prim.rect.x).abs() < 0.5
                    {
                        prev.rect.width = prim.rect.right() - prev.rect.x;
                        continue;
                    }
                }
                last_link = Some(merged.len());
            }
            merged.push(prim);
        }
        self.primitives = merged;
    }
}

/// Header/footer sets and page attributes applied to newly created pages.
#[derive(Debug, Clone, PartialEq)]
pub struct PageDefaults {
    /// Body header
    pub header: HeadFootFormat,
    /// Body footer
    pub footer: HeadFootFormat,
    /// Contents header
    pub toc_header: HeadFootFormat,
    /// Contents footer
    pub toc_footer: HeadFootFormat,
    /// Background color
    pub background_color: Option<Rgb>,
    /// Background image
    pub background_image: Option<String>,
}

/// All pages of the export.
#[derive(Debug, Clone)]
pub struct PageStore {
    pages: Vec<Page>,
    first: Page,
    /// Settings applied by [`PageStore::ensure`]
    pub defaults: PageDefaults,
    /// Section assigned to new pages
    pub section: Section,
    /// Chapter assigned to new pages
    pub chapter: usize,
    max_pages: usize,
    overflowed: bool,
}

impl PageStore {
    /// Create an empty store.
    pub fn new(config: &ExportConfig) -> Self {
        Self {
            pages: Vec::new(),
            first: Page::from_config(config),
            defaults: PageDefaults {
                header: config.header.clone(),
                footer: config.footer.clone(),
                toc_header: config.toc_header.clone(),
                toc_footer: config.toc_footer.clone(),
                background_color: config.background_color,
                background_image: config.background_image.clone(),
            },
            section: Section::Body,
            chapter: 0,
            max_pages: config.limits.max_pages,
            overflowed: false,
        }
    }

    /// Number of pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Whether no page exists yet.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Maximum page count.
    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// Page by index.
    pub fn get(&self, page: usize) -> Option<&Page> {
        self.pages.get(page)
    }

    /// Mutable page by index.
    pub fn get_mut(&mut self, page: usize) -> Option<&mut Page> {
        self.pages.get_mut(page)
    }

    /// Iterate over pages.
    pub fn iter(&self) -> std::slice::Iter<'_, Page> {
        self.pages.iter()
    }

    /// Iterate mutably over pages.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Page> {
        self.pages.iter_mut()
    }

    /// Settings used for the first page (and after a media size change).
    pub fn template(&self) -> &Page {
        &self.first
    }

    /// Mutable first-page template.
    pub fn template_mut(&mut self) -> &mut Page {
        &mut self.first
    }

    /// Make sure pages `0..=page` exist.
    ///
    /// Returns `false` (after reporting once) when `page` is past the limit.
    pub fn ensure(&mut self, page: usize, progress: &mut dyn ProgressSink) -> bool {
        if page >= self.max_pages {
            if !self.overflowed {
                self.overflowed = true;
                progress.report(Diagnostic::new(
                    DiagnosticKind::TooManyPages,
                    format!("page limit of {} reached; later content dropped", self.max_pages),
                ));
            }
            return false;
        }

        while self.pages.len() <= page {
            let mut next = match self.pages.last() {
                Some(prev) => prev.successor(),
                None => self.first.clone(),
            };
            next.section = self.section;
            next.chapter = self.chapter;
            next.chapter_label = self.pages.last().and_then(|p| p.chapter_label.clone());
            next.heading_label = self.pages.last().and_then(|p| p.heading_label.clone());
            match self.section {
                Section::Title => {
                    next.header = HeadFootFormat::default();
                    next.footer = HeadFootFormat::default();
                },
                Section::Contents => {
                    next.header = self.defaults.toc_header.clone();
                    next.footer = self.defaults.toc_footer.clone();
                },
                Section::Body if self.chapter == 0 => {
                    next.header = self.defaults.toc_header.clone();
                    next.footer = self.defaults.toc_footer.clone();
                },
                Section::Body => {
                    next.header = self.defaults.header.clone();
                    next.footer = self.defaults.footer.clone();
                },
            }
            next.background_color = self.defaults.background_color;
            next.background_image = self.defaults.background_image.clone();
            log::debug!("Created page {} (chapter {})", self.pages.len(), self.chapter);
            self.pages.push(next);
        }
        true
    }

    /// Append a primitive to its page.
    pub fn add(&mut self, prim: Primitive, progress: &mut dyn ProgressSink) {
        if self.ensure(prim.page, progress) {
            let page = prim.page;
            self.pages[page].primitives.push(prim);
        }
    }

    /// Insert a primitive at the front of its page (drawn first).
    pub fn insert_front(&mut self, prim: Primitive, progress: &mut dyn ProgressSink) {
        if self.ensure(prim.page, progress) {
            let page = prim.page;
            self.pages[page].primitives.insert(0, prim);
        }
    }

    /// Insert a primitive at a position in its page's list.
    pub fn insert_at(&mut self, index: usize, prim: Primitive, progress: &mut dyn ProgressSink) {
        if self.ensure(prim.page, progress) {
            let page = prim.page;
            let list = &mut self.pages[page].primitives;
            let index = index.min(list.len());
            list.insert(index, prim);
        }
    }

    /// Primitive count of a page, 0 if it doesn't exist.
    pub fn primitive_count(&self, page: usize) -> usize {
        self.pages.get(page).map_or(0, |p| p.primitives.len())
    }

    /// Apply `f` to `page` and every existing later page of the same chapter.
    ///
    /// Used by header/footer directives, which take effect from the page
    /// they appear on.
    pub fn update_chapter_from(&mut self, page: usize, mut f: impl FnMut(&mut Page)) {
        let Some(chapter) = self.pages.get(page).map(|p| p.chapter) else {
            return;
        };
        for p in self.pages[page..].iter_mut().take_while(|p| p.chapter == chapter) {
            f(p);
        }
    }

    /// Merge adjacent links on every page.
    pub fn merge_links(&mut self) {
        for page in &mut self.pages {
            page.merge_links();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::CollectingProgress;

    fn text(page: usize, x: f32) -> Primitive {
        Primitive {
            page,
            rect: Rect::new(x, 100.0, 20.0, 12.0),
            kind: PrimitiveKind::Text {
                text: "word".to_string(),
                typeface: Typeface::Times,
                font_style: FontStyle::Normal,
                size: 10.0,
                color: Rgb::BLACK,
                char_spacing: 0.0,
            },
        }
    }

    fn link(x: f32, width: f32, target: &str) -> Primitive {
        Primitive {
            page: 0,
            rect: Rect::new(x, 100.0, width, 12.0),
            kind: PrimitiveKind::Link {
                target: LinkTarget::from_href(target),
            },
        }
    }

    #[test]
    fn test_ensure_creates_pages_with_defaults() {
        let config = ExportConfig::default().with_margins(50.0, 40.0, 30.0, 20.0);
        let mut store = PageStore::new(&config);
        let mut progress = CollectingProgress::new();
        assert!(store.ensure(2, &mut progress));
        assert_eq!(store.len(), 3);
        let p = store.get(2).unwrap();
        assert_eq!(p.left, 50.0);
        assert_eq!(p.print_width(), 595.0 - 90.0);
        assert_eq!(p.print_length(), 792.0 - 50.0);
    }

    #[test]
    fn test_successor_copies_metadata_not_primitives() {
        let config = ExportConfig::default();
        let mut store = PageStore::new(&config);
        let mut progress = CollectingProgress::new();
        store.add(text(0, 0.0), &mut progress);
        store.get_mut(0).unwrap().media_color = Some("Blue".to_string());
        store.ensure(1, &mut progress);
        let p = store.get(1).unwrap();
        assert_eq!(p.media_color.as_deref(), Some("Blue"));
        assert!(p.is_empty());
        assert_eq!(store.get(0).unwrap().len(), 1);
    }

    #[test]
    fn test_header_set_follows_chapter() {
        let config = ExportConfig::default();
        let mut store = PageStore::new(&config);
        let mut progress = CollectingProgress::new();
        store.ensure(0, &mut progress);
        store.chapter = 1;
        store.ensure(1, &mut progress);
        assert_eq!(store.get(0).unwrap().footer, config.toc_footer);
        assert_eq!(store.get(1).unwrap().footer, config.footer);
    }

    #[test]
    fn test_page_limit_reported_once() {
        let mut config = ExportConfig::default();
        config.limits.max_pages = 2;
        let mut store = PageStore::new(&config);
        let mut progress = CollectingProgress::new();
        assert!(store.ensure(1, &mut progress));
        assert!(!store.ensure(2, &mut progress));
        store.add(text(5, 0.0), &mut progress);
        assert_eq!(store.len(), 2);
        assert_eq!(progress.count(DiagnosticKind::TooManyPages), 1);
    }

    #[test]
    fn test_insert_front_and_take() {
        let config = ExportConfig::default();
        let mut store = PageStore::new(&config);
        let mut progress = CollectingProgress::new();
        store.add(text(0, 0.0), &mut progress);
        store.insert_front(
            Primitive {
                page: 0,
                rect: Rect::new(0.0, 0.0, 10.0, 10.0),
                kind: PrimitiveKind::Background {
                    color: Some(Rgb::WHITE),
                    image: None,
                },
            },
            &mut progress,
        );
        let prims = store.get_mut(0).unwrap().take_primitives();
        assert_eq!(prims.len(), 2);
        assert!(matches!(prims[0].kind, PrimitiveKind::Background { .. }));
        assert!(store.get(0).unwrap().is_empty());
    }

    #[test]
    fn test_merge_touching_links() {
        let config = ExportConfig::default();
        let mut store = PageStore::new(&config);
        let mut progress = CollectingProgress::new();
        store.add(link(10.0, 30.0, "#intro"), &mut progress);
        store.add(link(40.0, 5.0, "#intro"), &mut progress);
        store.add(link(45.0, 20.0, "#intro"), &mut progress);
        store.add(link(65.0, 20.0, "http://example.com"), &mut progress);
        store.add(link(200.0, 20.0, "http://example.com"), &mut progress);
        store.merge_links();
        let prims = store.get(0).unwrap().primitives();
        assert_eq!(prims.len(), 3);
        assert_eq!(prims[0].rect.x, 10.0);
        assert_eq!(prims[0].rect.width, 55.0);
        assert_eq!(prims[1].kind, PrimitiveKind::Link {
            target: LinkTarget::Uri("http://example.com".to_string())
        });
    }

    #[test]
    fn test_update_chapter_from_stops_at_next_chapter() {
        let config = ExportConfig::default();
        let mut store = PageStore::new(&config);
        let mut progress = CollectingProgress::new();
        store.chapter = 1;
        store.ensure(2, &mut progress);
        store.chapter = 2;
        store.ensure(3, &mut progress);
        store.update_chapter_from(1, |p| p.header.left = "X".to_string());
        let lefts: Vec<_> = store.iter().map(|p| p.header.left.clone()).collect();
        assert_eq!(lefts, vec!["", "X", "X", ""]);
    }

    #[test]
    fn test_text_baseline() {
        let prim = text(0, 0.0);
        assert!((prim.baseline() - (100.0 + 1.0 + 2.0)).abs() < 1e-4);
    }
}

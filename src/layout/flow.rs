//! Flow formatter.
//!
//! Walks the document tree in order and turns it into positioned primitives
//! in the page store. The cursor `(x, y, page)` and the current region are
//! passed explicitly to every call; `y` starts at the region top and
//! decreases as content is placed.
//!
//! Inline content is collected into a paragraph buffer of [`Frag`]s and
//! broken into lines when the next block element (or the end of the
//! container) is reached.

use super::directive::{parse_comment, Directive, MarginSide, ParsedComment};
use super::index::{HeadingEntry, HeadingIndex, LinkAdd, LinkIndex};
use super::page::{LinkTarget, Page, PageStore, Primitive, PrimitiveKind, Rect, Section};
use super::region::RegionStack;
use super::{parse_dimension, Pagination};
use crate::config::{ExportConfig, HeadFootFormat, OutputType};
use crate::fonts::{FontMetrics, FontStyle, FontUsage, Typeface};
use crate::numbering::{format_number, NumberStyle};
use crate::progress::{Diagnostic, DiagnosticKind, ProgressSink};
use crate::tree::{Document, Element, HAlign, Node, RasterImage, Rgb, Style, VAlign};
use std::collections::{HashMap, HashSet};

/// Indentation of list bodies and block quotes.
pub const INDENT: f32 = 36.0;

/// Formatting position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cursor {
    /// Horizontal position
    pub x: f32,
    /// Vertical position (top of the next line)
    pub y: f32,
    /// Page index
    pub page: usize,
}

/// Label style of a list level.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ListLabel {
    Bullet(char, Typeface),
    Number(NumberStyle),
    None,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ListState {
    label: ListLabel,
    value: i64,
}

/// Which page parity a break should land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parity {
    Any,
    Left,
    Right,
}

/// One flattened inline leaf with the link covering it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Frag<'t> {
    pub(crate) node: &'t Node,
    pub(crate) link: Option<&'t str>,
}

impl<'t> Frag<'t> {
    pub(crate) fn is_space(&self) -> bool {
        self.node.element == Element::Text
            && self
                .node
                .text
                .as_deref()
                .is_some_and(|t| !t.is_empty() && t.chars().all(char::is_whitespace))
    }

    pub(crate) fn is_break(&self) -> bool {
        self.node.element == Element::Br
    }

    /// Named anchor marker (zero width).
    pub(crate) fn anchor_name(&self) -> Option<&'t str> {
        match self.node.element {
            Element::Anchor | Element::Inline => {
                self.node.attr("NAME").or_else(|| self.node.attr("ID"))
            },
            _ => None,
        }
    }

    fn is_float(&self) -> bool {
        self.node.element == Element::Image
            && matches!(
                self.node.attr("ALIGN").map(str::to_ascii_lowercase).as_deref(),
                Some("left") | Some("right")
            )
    }
}

/// Flatten inline content into fragments.
pub(crate) fn flatten<'t>(node: &'t Node, link: Option<&'t str>, out: &mut Vec<Frag<'t>>) {
    let link = node.link.as_deref().or(link);
    match node.element {
        Element::Text | Element::Image | Element::Br => out.push(Frag { node, link }),
        Element::Anchor => {
            if node.has_attr("NAME") || node.has_attr("ID") {
                out.push(Frag { node, link: None });
            }
            let link = node.attr("HREF").or(link);
            for child in &node.children {
                flatten(child, link, out);
            }
        },
        _ => {
            if node.element == Element::Inline && node.has_attr("ID") {
                out.push(Frag { node, link: None });
            }
            for child in &node.children {
                flatten(child, link, out);
            }
        },
    }
}

fn contains_h1(nodes: &[Node]) -> bool {
    nodes
        .iter()
        .any(|n| n.element == Element::Heading(1) || contains_h1(&n.children))
}

/// Tree walker that fills a [`PageStore`].
pub struct Formatter<'a> {
    pub(crate) config: &'a ExportConfig,
    pub(crate) metrics: &'a dyn FontMetrics,
    pub(crate) progress: &'a mut dyn ProgressSink,
    pub(crate) images: &'a HashMap<String, RasterImage>,
    pub(crate) pages: PageStore,
    pub(crate) headings: HeadingIndex,
    pub(crate) links: LinkIndex,
    pub(crate) fonts: FontUsage,
    pub(crate) chapter: usize,
    pub(crate) chapter_starts: Vec<usize>,
    pub(crate) section_start: usize,
    pub(crate) front_matter: bool,
    lists: Vec<ListState>,
    pub(crate) pending_space: f32,
    pub(crate) needspace: bool,
    reported: HashSet<DiagnosticKind>,
    missing_images: HashSet<String>,
}

impl<'a> Formatter<'a> {
    /// Create a formatter for one export.
    pub fn new(
        config: &'a ExportConfig,
        metrics: &'a dyn FontMetrics,
        progress: &'a mut dyn ProgressSink,
        images: &'a HashMap<String, RasterImage>,
    ) -> Self {
        Self {
            config,
            metrics,
            progress,
            images,
            pages: PageStore::new(config),
            headings: HeadingIndex::new(config.limits.max_headings),
            links: LinkIndex::new(config.limits.max_links),
            fonts: FontUsage::new(),
            chapter: 0,
            chapter_starts: vec![0],
            section_start: 0,
            front_matter: false,
            lists: Vec::new(),
            pending_space: 0.0,
            needspace: false,
            reported: HashSet::new(),
            missing_images: HashSet::new(),
        }
    }

    /// Paginate a whole document: title pages, body, then the table of
    /// contents.
    pub fn paginate(mut self, doc: &Document) -> Pagination {
        let title_pages = self.render_title_pages(doc);

        // Body
        let body_start = self.pages.len();
        let book = self.config.output_type == OutputType::Book;
        let chaptered = book && contains_h1(&doc.root);
        if book && !chaptered {
            log::warn!("Book output without any H1; formatting as one chapter");
        }
        self.section_start = body_start;
        self.pages.section = Section::Body;
        self.chapter_starts = vec![body_start];
        if chaptered {
            self.chapter = 0;
            self.front_matter = true;
        } else {
            self.chapter = 1;
            self.chapter_starts.push(body_start);
        }
        self.pages.chapter = self.chapter;

        let mut frame = self.base_frame(body_start);
        let mut cur = Cursor {
            x: frame.left(),
            y: frame.top(),
            page: body_start,
        };
        self.progress.show(&format!("Formatting page {}", body_start + 1));
        self.render_nodes(&doc.root, HAlign::Left, &mut frame, &mut cur);
        self.close_section(&cur, &frame, body_start);
        let body_pages = body_start..self.pages.len();
        log::info!("Formatted {} body pages", body_pages.len());

        // Contents
        let toc_pages = if chaptered && self.config.generate_toc && self.config.toc_levels > 0 {
            self.render_toc(doc, &body_pages)
        } else {
            self.pages.len()..self.pages.len()
        };
        self.chapter_starts[0] = if toc_pages.is_empty() {
            body_start
        } else {
            toc_pages.start
        };

        self.finish(title_pages, toc_pages, body_pages)
    }

    fn finish(
        mut self,
        title_pages: std::ops::Range<usize>,
        toc_pages: std::ops::Range<usize>,
        body_pages: std::ops::Range<usize>,
    ) -> Pagination {
        self.pages.merge_links();

        // Page backgrounds go under everything else.
        for index in 0..self.pages.len() {
            let Some(page) = self.pages.get(index) else {
                continue;
            };
            if page.background_color.is_none() && page.background_image.is_none() {
                continue;
            }
            let prim = Primitive {
                page: index,
                rect: Rect::new(-page.left, -page.bottom, page.width, page.length),
                kind: PrimitiveKind::Background {
                    color: page.background_color,
                    image: page.background_image.clone(),
                },
            };
            self.pages.insert_front(prim, &mut *self.progress);
        }

        let mut chapter_ends = vec![0; self.chapter_starts.len()];
        for (index, page) in self.pages.iter().enumerate() {
            if page.section == Section::Title {
                continue;
            }
            if let Some(end) = chapter_ends.get_mut(page.chapter) {
                *end = index;
            }
        }
        for (chapter, end) in chapter_ends.iter_mut().enumerate() {
            if *end < self.chapter_starts[chapter] {
                *end = self.chapter_starts[chapter];
            }
        }

        let page_order: Vec<usize> = title_pages
            .clone()
            .chain(toc_pages.clone())
            .chain(body_pages.clone())
            .collect();

        Pagination {
            pages: self.pages,
            headings: self.headings,
            links: self.links,
            fonts: self.fonts,
            chapter_starts: self.chapter_starts,
            chapter_ends,
            page_order,
            title_pages,
            toc_pages,
            body_pages,
        }
    }

    fn render_title_pages(&mut self, doc: &Document) -> std::ops::Range<usize> {
        if !self.config.title_page {
            return 0..0;
        }
        self.pages.section = Section::Title;
        self.pages.chapter = 0;
        self.section_start = 0;

        let generated;
        let nodes: &[Node] = if doc.title_page.is_empty() {
            generated = self.default_title_page(doc);
            &generated
        } else {
            &doc.title_page
        };

        let mut frame = self.base_frame(0);
        let mut cur = Cursor {
            x: frame.left(),
            y: frame.top(),
            page: 0,
        };
        if doc.title_page.is_empty() {
            // Generated title sits a third of the way down.
            cur.y -= (frame.top() - frame.base_bottom()) / 3.0;
        }
        self.render_nodes(nodes, HAlign::Center, &mut frame, &mut cur);
        self.close_section(&cur, &frame, 0);

        if self.page_duplex(0) && self.pages.len() % 2 == 1 {
            let blank = self.pages.len();
            self.pages.ensure(blank, &mut *self.progress);
        }
        0..self.pages.len()
    }

    fn default_title_page(&self, doc: &Document) -> Vec<Node> {
        let mut nodes = Vec::new();
        if let Some(title) = &doc.title {
            let style = Style::sized(Typeface::Helvetica, 24.0)
                .with_font_style(FontStyle::Bold)
                .with_halign(HAlign::Center);
            nodes.push(Node::block(Element::Paragraph, title, style, self.metrics));
        }
        if let Some(author) = &doc.author {
            let style = Style::sized(Typeface::Helvetica, 14.0).with_halign(HAlign::Center);
            nodes.push(Node::block(Element::Paragraph, author, style, self.metrics));
        }
        nodes
    }

    /// Make sure the last page of a section exists.
    pub(crate) fn close_section(&mut self, cur: &Cursor, frame: &RegionStack, start: usize) {
        if cur.y < frame.top() || self.pages.len() <= start {
            self.pages.ensure(cur.page.max(start), &mut *self.progress);
        }
    }

    // ---------------------------------------------------------------------
    // Regions and pages

    pub(crate) fn page_like(&self, page: usize) -> &Page {
        self.pages
            .get(page)
            .or_else(|| self.pages.iter().last())
            .unwrap_or_else(|| self.pages.template())
    }

    fn active_head_foot(&self) -> (HeadFootFormat, HeadFootFormat) {
        let defaults = &self.pages.defaults;
        match self.pages.section {
            Section::Title => (HeadFootFormat::default(), HeadFootFormat::default()),
            Section::Contents => (defaults.toc_header.clone(), defaults.toc_footer.clone()),
            Section::Body if self.pages.chapter == 0 => {
                (defaults.toc_header.clone(), defaults.toc_footer.clone())
            },
            Section::Body => (defaults.header.clone(), defaults.footer.clone()),
        }
    }

    /// Region edges `(left, right, bottom, top)` of a page.
    fn frame_edges(&self, page: usize) -> (f32, f32, f32, f32) {
        let p = self.page_like(page);
        let (header, footer) = self.active_head_foot();
        let reserve = 2.0 * self.config.head_foot_size;
        let top = p.print_length() - if header.is_blank() { 0.0 } else { reserve };
        let bottom = if footer.is_blank() { 0.0 } else { reserve };
        (0.0, p.print_width(), bottom, top)
    }

    pub(crate) fn base_frame(&self, page: usize) -> RegionStack {
        let (left, right, bottom, top) = self.frame_edges(page);
        RegionStack::new(left, right, bottom, top)
    }

    fn refit_frame(&self, frame: &mut RegionStack, old: (f32, f32, f32, f32), page: usize) {
        let new = self.frame_edges(page);
        frame.adjust_left(new.0 - old.0);
        frame.adjust_right(new.1 - old.1);
        frame.adjust_bottom(new.2 - old.2);
        frame.adjust_top(new.3 - old.3);
    }

    /// Page index relative to the start of the current section.
    fn relative_page(&self, page: usize) -> usize {
        page.saturating_sub(self.section_start)
    }

    pub(crate) fn new_page(&mut self, frame: &mut RegionStack, cur: &mut Cursor) {
        cur.page += 1;
        cur.y = frame.top();
        cur.x = frame.left();
        frame.clear(cur.y, cur.page);
        self.pending_space = 0.0;
        self.needspace = false;
        self.progress.show(&format!("Formatting page {}", cur.page + 1));
    }

    fn break_page(&mut self, parity: Parity, frame: &mut RegionStack, cur: &mut Cursor) {
        if cur.y < frame.top() || self.pages.primitive_count(cur.page) > 0 {
            self.new_page(frame, cur);
        }
        let odd = self.relative_page(cur.page) % 2 == 1;
        let skip = match parity {
            Parity::Any => false,
            Parity::Right => odd,
            Parity::Left => !odd,
        };
        if skip {
            self.new_page(frame, cur);
        }
    }

    fn style_break(value: Option<&str>) -> Option<Parity> {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("always") => Some(Parity::Any),
            Some("left") => Some(Parity::Left),
            Some("right") => Some(Parity::Right),
            _ => None,
        }
    }

    // ---------------------------------------------------------------------
    // Diagnostics and primitives

    pub(crate) fn report(&mut self, kind: DiagnosticKind, message: String) {
        self.progress.report(Diagnostic::new(kind, message));
    }

    fn report_once(&mut self, kind: DiagnosticKind, message: String) {
        if self.reported.insert(kind) {
            self.report(kind, message);
        }
    }

    pub(crate) fn add(&mut self, page: usize, rect: Rect, kind: PrimitiveKind) {
        if let PrimitiveKind::Text {
            typeface,
            font_style,
            ..
        } = &kind
        {
            self.fonts.mark(*typeface, *font_style);
        }
        self.pages.add(Primitive { page, rect, kind }, &mut *self.progress);
    }

    pub(crate) fn add_text(&mut self, page: usize, rect: Rect, text: &str, style: &Style, color: Rgb) {
        self.add(page, rect, PrimitiveKind::Text {
            text: text.to_string(),
            typeface: style.typeface,
            font_style: style.font_style,
            size: style.size,
            color,
            char_spacing: 0.0,
        });
    }

    pub(crate) fn add_link(&mut self, name: &str, page: usize, y: f32) {
        if self.links.add(name, page, y) == LinkAdd::Full {
            let max = self.config.limits.max_links;
            self.report_once(
                DiagnosticKind::TooManyLinks,
                format!("more than {} link targets; '{}' and later dropped", max, name),
            );
        }
    }

    pub(crate) fn image_border(&self, node: &Node, link: Option<&str>) -> f32 {
        match node.attr("BORDER") {
            Some(value) => value.trim().parse::<f32>().unwrap_or(1.0).max(0.0),
            None if link.is_some() && self.config.links => 1.0,
            None => 0.0,
        }
    }

    /// Draw an image (and its border and link) with its outer box at `(x, y)`.
    pub(crate) fn emit_image(&mut self, node: &Node, link: Option<&str>, x: f32, y: f32, page: usize) {
        let border = self.image_border(node, link);
        let outer = Rect::new(x, y, node.width + 2.0 * border, node.height + 2.0 * border);
        let src = node.attr("SRC").unwrap_or_default().to_string();

        if self.images.contains_key(&src) {
            self.add(
                page,
                Rect::new(x + border, y + border, node.width, node.height),
                PrimitiveKind::Image { src },
            );
        } else if self.missing_images.insert(src.clone()) {
            self.report(DiagnosticKind::MissingImage, format!("image '{}' not found", src));
        }

        if border > 0.0 {
            let color = if link.is_some() && self.config.links {
                self.config.link_color
            } else {
                node.style.color
            };
            let half = border * 0.5;
            self.add(
                page,
                Rect::new(outer.x + half, outer.y + half, outer.width - border, outer.height - border),
                PrimitiveKind::Box {
                    color,
                    line_width: border,
                },
            );
        }
        if let (Some(href), true) = (link, self.config.links) {
            self.add(page, outer, PrimitiveKind::Link {
                target: LinkTarget::from_href(href),
            });
        }
    }

    // ---------------------------------------------------------------------
    // Tree walk

    /// Format a list of sibling nodes.
    pub fn render_nodes<'t>(
        &mut self,
        nodes: &'t [Node],
        halign: HAlign,
        frame: &mut RegionStack,
        cur: &mut Cursor,
    ) {
        let mut para: Vec<Frag<'t>> = Vec::new();

        for node in nodes {
            if self.front_matter {
                // Book mode: only directives count before the first chapter.
                match node.element {
                    Element::Heading(1) => self.front_matter = false,
                    Element::Comment => {
                        self.render_comment(node, &mut para, halign, frame, cur);
                        continue;
                    },
                    _ => {
                        self.render_nodes(&node.children, halign, frame, cur);
                        continue;
                    },
                }
            }

            if node.element.is_inline() {
                flatten(node, None, &mut para);
                continue;
            }
            match node.element {
                Element::Comment => self.render_comment(node, &mut para, halign, frame, cur),
                Element::Ignored => {},
                _ => {
                    self.flush_paragraph(&mut para, halign, frame, cur);
                    self.render_block(node, halign, frame, cur);
                },
            }
        }
        self.flush_paragraph(&mut para, halign, frame, cur);
    }

    fn render_comment<'t>(
        &mut self,
        node: &Node,
        para: &mut Vec<Frag<'t>>,
        halign: HAlign,
        frame: &mut RegionStack,
        cur: &mut Cursor,
    ) {
        let parsed = parse_comment(node.text.as_deref().unwrap_or_default());
        if parsed.directives.is_empty() && parsed.error.is_none() {
            return;
        }
        self.flush_paragraph(para, halign, frame, cur);
        self.apply_directives(parsed, frame, cur);
    }

    fn render_block(&mut self, node: &Node, halign: HAlign, frame: &mut RegionStack, cur: &mut Cursor) {
        let in_body = self.pages.section == Section::Body;
        let book = self.config.output_type == OutputType::Book;

        if node.element == Element::Heading(1) && book && in_body {
            self.start_chapter(frame, cur);
        } else if node.element == Element::File
            && self.config.output_type == OutputType::WebPages
            && in_body
        {
            self.start_file(frame, cur);
        }

        if let Some(parity) = Self::style_break(node.style.page_break_before.as_deref()) {
            self.break_page(parity, frame, cur);
        }

        if let Some(id) = node.attr("ID") {
            self.add_link(id, cur.page, cur.y);
        }

        let own_align = match node.element {
            Element::Center => HAlign::Center,
            _ if node.style.halign != HAlign::Left => node.style.halign,
            _ => halign,
        };

        match node.element {
            Element::Paragraph => {
                self.open_block(&node.style, frame, cur);
                self.render_nodes(&node.children, own_align, frame, cur);
                self.close_block(&node.style);
            },
            Element::Div | Element::Center | Element::File | Element::Dd => {
                self.render_nodes(&node.children, own_align, frame, cur);
            },
            Element::Blockquote => {
                self.open_block(&node.style, frame, cur);
                frame.adjust_left(INDENT);
                frame.adjust_right(-INDENT);
                self.render_nodes(&node.children, own_align, frame, cur);
                frame.adjust_left(-INDENT);
                frame.adjust_right(INDENT);
                self.close_block(&node.style);
            },
            Element::Heading(level) => self.render_heading(node, level, own_align, frame, cur),
            Element::Pre => self.render_pre(node, frame, cur),
            Element::Ul | Element::Ol | Element::Dl => self.render_list(node, own_align, frame, cur),
            Element::Li => self.render_list_item(node, own_align, frame, cur),
            Element::Dt => {
                frame.adjust_left(-INDENT);
                self.render_nodes(&node.children, own_align, frame, cur);
                frame.adjust_left(INDENT);
            },
            Element::Hr => self.render_rule(node, frame, cur),
            Element::Table => self.render_table(node, frame, cur),
            _ => self.render_nodes(&node.children, own_align, frame, cur),
        }

        if let Some(parity) = Self::style_break(node.style.page_break_after.as_deref()) {
            self.new_page(frame, cur);
            if parity != Parity::Any {
                let odd = self.relative_page(cur.page) % 2 == 1;
                if (parity == Parity::Right && odd) || (parity == Parity::Left && !odd) {
                    self.new_page(frame, cur);
                }
            }
        }
    }

    fn start_chapter(&mut self, frame: &mut RegionStack, cur: &mut Cursor) {
        if self.chapter > 0 {
            if cur.y < frame.top() || self.pages.primitive_count(cur.page) > 0 {
                self.new_page(frame, cur);
            }
            if self.page_duplex(cur.page) && self.relative_page(cur.page) % 2 == 1 {
                self.new_page(frame, cur);
            }
        }
        let old = self.frame_edges(cur.page);
        let at_top = cur.y >= frame.top();
        self.begin_chapter(cur.page);
        self.refit_frame(frame, old, cur.page);
        if at_top {
            cur.y = frame.top();
        }
    }

    fn start_file(&mut self, frame: &mut RegionStack, cur: &mut Cursor) {
        if cur.y < frame.top() || self.pages.primitive_count(cur.page) > 0 {
            self.new_page(frame, cur);
        }
        if self.chapter == 1 && self.chapter_starts[1] == cur.page {
            // First file shares chapter 1 with anything before it.
            return;
        }
        self.begin_chapter(cur.page);
    }

    fn begin_chapter(&mut self, page: usize) {
        if self.chapter + 1 >= self.config.limits.max_chapters {
            let max = self.config.limits.max_chapters;
            self.report_once(
                DiagnosticKind::TooManyChapters,
                format!("more than {} chapters; later chapters merged", max),
            );
            return;
        }
        self.chapter += 1;
        self.chapter_starts.push(page);
        self.pages.chapter = self.chapter;
        log::debug!("Chapter {} starts on page {}", self.chapter, page);

        let (header, footer) = self.active_head_foot();
        let chapter = self.chapter;
        if let Some(p) = self.pages.get_mut(page) {
            p.chapter = chapter;
            p.header = header;
            p.footer = footer;
        }
    }

    fn page_duplex(&self, page: usize) -> bool {
        self.page_like(page).duplex
    }

    /// Detach the list nesting (table cells start a fresh one).
    pub(crate) fn take_lists(&mut self) -> Vec<ListState> {
        std::mem::take(&mut self.lists)
    }

    pub(crate) fn restore_lists(&mut self, lists: Vec<ListState>) {
        self.lists = lists;
    }

    pub(crate) fn open_block(&mut self, style: &Style, frame: &RegionStack, cur: &mut Cursor) {
        let mut space = self.pending_space.max(style.margin_top);
        if self.needspace {
            space = space.max(self.config.paragraph_spacing);
        }
        if cur.y < frame.top() {
            cur.y -= space;
        }
        self.pending_space = 0.0;
        self.needspace = false;
    }

    pub(crate) fn close_block(&mut self, style: &Style) {
        self.pending_space = self.pending_space.max(style.margin_bottom);
        self.needspace = true;
    }

    fn flush_paragraph<'t>(
        &mut self,
        para: &mut Vec<Frag<'t>>,
        halign: HAlign,
        frame: &mut RegionStack,
        cur: &mut Cursor,
    ) {
        if para.is_empty() {
            return;
        }
        let visible = para
            .iter()
            .any(|f| !f.is_space() && f.anchor_name().is_none());
        if visible {
            self.open_block(&Style::default(), frame, cur);
            self.render_paragraph(para, halign, frame, cur);
            self.needspace = true;
        } else {
            for frag in para.iter() {
                if let Some(name) = frag.anchor_name() {
                    self.add_link(name, cur.page, cur.y);
                }
            }
        }
        para.clear();
    }

    // ---------------------------------------------------------------------
    // Paragraphs

    pub(crate) fn frag_width(&self, frag: &Frag<'_>) -> f32 {
        match frag.node.element {
            Element::Text => frag.node.width,
            Element::Image => frag.node.width + 2.0 * self.image_border(frag.node, frag.link),
            _ => 0.0,
        }
    }

    fn frag_height(&self, frag: &Frag<'_>) -> f32 {
        match frag.node.element {
            Element::Text => frag.node.height,
            Element::Image => frag.node.height + 2.0 * self.image_border(frag.node, frag.link),
            Element::Br => frag.node.style.line_height,
            _ => 0.0,
        }
    }

    /// End of the word starting at `start`.
    fn word_end(frags: &[Frag<'_>], start: usize) -> usize {
        if frags[start].is_space() {
            return start + 1;
        }
        let mut end = start + 1;
        while end < frags.len() && !frags[end].is_space() && !frags[end].is_break() {
            end += 1;
        }
        end
    }

    fn place_float(&mut self, frag: &Frag<'_>, frame: &mut RegionStack, cur: &mut Cursor) {
        let node = frag.node;
        let border = self.image_border(node, frag.link);
        let width = node.width + 2.0 * border;
        let height = node.height + 2.0 * border;
        let hspace = node.attr("HSPACE").and_then(|v| v.trim().parse::<f32>().ok()).unwrap_or(0.0);
        let vspace = node.attr("VSPACE").and_then(|v| v.trim().parse::<f32>().ok()).unwrap_or(0.0);

        frame.clear(cur.y, cur.page);
        if cur.y - height - vspace < frame.base_bottom() && cur.y < frame.top() {
            self.new_page(frame, cur);
        }
        if height > frame.top() - frame.base_bottom() || width > frame.right() - frame.left() {
            self.report(
                DiagnosticKind::ContentTooLarge,
                format!("image {:.0}x{:.0}pt larger than the page area", width, height),
            );
        }

        let left = node
            .attr("ALIGN")
            .is_some_and(|a| a.eq_ignore_ascii_case("left"));
        let x = if left { frame.left() } else { frame.right() - width };
        let bottom = cur.y - height;
        self.emit_image(node, frag.link, x, bottom, cur.page);

        if left {
            frame.push(width + hspace, 0.0, bottom - vspace, cur.page);
        } else {
            frame.push(0.0, width + hspace, bottom - vspace, cur.page);
        }
    }

    /// Break inline fragments into lines and place them.
    pub(crate) fn render_paragraph(
        &mut self,
        frags: &[Frag<'_>],
        halign: HAlign,
        frame: &mut RegionStack,
        cur: &mut Cursor,
    ) {
        let (floats, flow): (Vec<Frag<'_>>, Vec<Frag<'_>>) =
            frags.iter().copied().partition(|f| f.is_float());
        for float in &floats {
            self.place_float(float, frame, cur);
        }

        let n = flow.len();
        let mut i = 0;
        let mut first_line = true;

        while i < n {
            frame.clear(cur.y, cur.page);
            while i < n && flow[i].is_space() {
                i += 1;
            }
            if i >= n {
                break;
            }

            let avail = frame.right() - frame.left();
            let start = i;
            let mut width = 0.0f32;
            let mut hard_break = false;
            let mut restart = false;

            while i < n {
                if flow[i].is_break() {
                    i += 1;
                    hard_break = true;
                    break;
                }
                let end = Self::word_end(&flow, i);
                let word: f32 = flow[i..end].iter().map(|f| self.frag_width(f)).sum();
                if width + word > avail + 0.001 {
                    if i > start {
                        break;
                    }
                    if frame.level() > 0 {
                        frame.end(&mut cur.y, &mut cur.page);
                        restart = true;
                        break;
                    }
                    self.report(
                        DiagnosticKind::ContentTooLarge,
                        format!("content {:.0}pt wide does not fit in {:.0}pt", word, avail),
                    );
                }
                width += word;
                i = end;
            }
            if restart {
                i = start;
                continue;
            }

            let mut line_end = if hard_break { i - 1 } else { i };
            while line_end > start && flow[line_end - 1].is_space() {
                line_end -= 1;
                width -= self.frag_width(&flow[line_end]);
            }
            let line = &flow[start..line_end];

            let mut height = line.iter().map(|f| self.frag_height(f)).fold(0.0, f32::max);
            if height <= 0.0 {
                height = flow[start].node.style.line_height;
            }

            let more = i < n;
            let no_room = cur.y - height < frame.base_bottom()
                || (first_line && more && cur.y - 2.0 * height < frame.base_bottom());
            if no_room && cur.y < frame.top() {
                self.new_page(frame, cur);
                i = start;
                continue;
            }

            cur.y -= height;
            let avail = frame.right() - frame.left();
            let mut x = frame.left();
            let mut char_spacing = 0.0;
            match halign {
                HAlign::Center => x += (avail - width) * 0.5,
                HAlign::Right => x += avail - width,
                HAlign::Justify if more && !hard_break => {
                    let chars: usize = line
                        .iter()
                        .filter(|f| f.node.element == Element::Text)
                        .map(|f| f.node.text.as_deref().map_or(0, |t| t.chars().count()))
                        .sum();
                    if chars > 1 && avail > width {
                        char_spacing = (avail - width) / (chars - 1) as f32;
                    }
                },
                _ => {},
            }

            self.emit_line(line, x, cur.y, height, char_spacing, cur.page);
            cur.x = frame.left();
            first_line = false;
        }
    }

    fn descent(style: &Style, height: f32) -> f32 {
        (height - style.size).max(0.0) * 0.5 + style.size * 0.2
    }

    fn emit_line(&mut self, line: &[Frag<'_>], x0: f32, bottom: f32, height: f32, char_spacing: f32, page: usize) {
        let baseline = line
            .iter()
            .filter(|f| f.node.element == Element::Text)
            .map(|f| Self::descent(&f.node.style, f.node.height))
            .fold(0.0, f32::max);

        let mut x = x0;
        let mut i = 0;
        while i < line.len() {
            let frag = line[i];
            match frag.node.element {
                Element::Text => {
                    // Merge runs sharing style and link into one primitive.
                    let style = &frag.node.style;
                    let mut text = String::new();
                    let mut width = 0.0;
                    let mut j = i;
                    while j < line.len()
                        && line[j].node.element == Element::Text
                        && line[j].link == frag.link
                        && Self::same_run_style(&line[j].node.style, style)
                    {
                        let run = line[j].node.text.as_deref().unwrap_or_default();
                        text.push_str(run);
                        width += line[j].node.width + char_spacing * run.chars().count() as f32;
                        j += 1;
                    }
                    self.emit_text_run(&text, style, frag.link, x, bottom + baseline, width, char_spacing, page);
                    x += width;
                    i = j;
                    continue;
                },
                Element::Image => {
                    let h = self.frag_height(&frag);
                    let y = match frag.node.style.valign {
                        VAlign::Top => bottom + height - h,
                        VAlign::Middle => bottom + (height - h) * 0.5,
                        VAlign::Bottom => bottom,
                    };
                    self.emit_image(frag.node, frag.link, x, y, page);
                    x += self.frag_width(&frag);
                },
                _ => {
                    if let Some(name) = frag.anchor_name() {
                        self.add_link(name, page, bottom + height);
                    }
                },
            }
            i += 1;
        }
    }

    fn same_run_style(a: &Style, b: &Style) -> bool {
        a.typeface == b.typeface
            && a.font_style == b.font_style
            && a.size == b.size
            && a.color == b.color
            && a.underline == b.underline
            && a.strikethrough == b.strikethrough
            && a.superscript == b.superscript
            && a.subscript == b.subscript
            && a.line_height == b.line_height
    }

    /// Place one text run whose baseline is at `baseline`.
    #[allow(clippy::too_many_arguments)]
    fn emit_text_run(
        &mut self,
        text: &str,
        style: &Style,
        link: Option<&str>,
        x: f32,
        baseline: f32,
        width: f32,
        char_spacing: f32,
        page: usize,
    ) {
        let linked = link.is_some() && self.config.links;
        let color = if linked { self.config.link_color } else { style.color };
        let mut shift = 0.0;
        if style.superscript {
            shift = style.size * 0.33;
        } else if style.subscript {
            shift = -style.size * 0.2;
        }
        let height = style.line_height;
        let rect = Rect::new(x, baseline + shift - Self::descent(style, height), width, height);

        self.add(page, rect, PrimitiveKind::Text {
            text: text.to_string(),
            typeface: style.typeface,
            font_style: style.font_style,
            size: style.size,
            color,
            char_spacing,
        });

        let thickness = (style.size / 15.0).max(0.5);
        if style.underline || (linked && self.config.link_underline) {
            let y = baseline + shift - style.size * 0.1 - thickness;
            self.add(page, Rect::new(x, y, width, thickness), PrimitiveKind::FilledBox { color });
        }
        if style.strikethrough {
            let y = baseline + shift + style.size * 0.3;
            self.add(page, Rect::new(x, y, width, thickness), PrimitiveKind::FilledBox { color });
        }
        if let (Some(href), true) = (link, self.config.links) {
            self.add(page, rect, PrimitiveKind::Link {
                target: LinkTarget::from_href(href),
            });
        }
    }

    // ---------------------------------------------------------------------
    // Headings, preformatted text, rules

    fn render_heading(
        &mut self,
        node: &Node,
        level: u8,
        halign: HAlign,
        frame: &mut RegionStack,
        cur: &mut Cursor,
    ) {
        self.open_block(&node.style, frame, cur);
        let spacing = self.config.paragraph_spacing;
        if cur.y < frame.top() && cur.y < 5.0 * spacing + frame.base_bottom() {
            self.new_page(frame, cur);
        }

        if self.pages.section == Section::Body && self.pages.ensure(cur.page, &mut *self.progress) {
            let title = node.text_content();
            let previous = cur
                .page
                .checked_sub(1)
                .and_then(|p| self.pages.get(p))
                .and_then(|p| p.heading_label.clone());
            if let Some(page) = self.pages.get_mut(cur.page) {
                if level == 1 {
                    page.chapter_label = Some(title.clone());
                }
                if page.heading_label.is_none() || level == 1 || page.heading_label == previous {
                    page.heading_label = Some(title.clone());
                }
            }

            if level <= self.config.toc_levels {
                let entry = HeadingEntry {
                    page: cur.page,
                    y: cur.y,
                    level,
                    title,
                };
                if !self.headings.push(entry) {
                    let max = self.config.limits.max_headings;
                    self.report_once(
                        DiagnosticKind::TooManyHeadings,
                        format!("more than {} headings; later headings not indexed", max),
                    );
                }
            }
        }

        let mut frags = Vec::new();
        for child in &node.children {
            flatten(child, None, &mut frags);
        }
        self.render_paragraph(&frags, halign, frame, cur);
        self.close_block(&node.style);
    }

    fn render_pre(&mut self, node: &Node, frame: &mut RegionStack, cur: &mut Cursor) {
        self.open_block(&node.style, frame, cur);

        let mut frags = Vec::new();
        for child in &node.children {
            flatten(child, None, &mut frags);
        }

        // Split into lines of (text, frag) segments, expanding tabs.
        let mut lines: Vec<Vec<(String, Frag<'_>)>> = vec![Vec::new()];
        let mut column = 0usize;
        for frag in &frags {
            match frag.node.element {
                Element::Br => {
                    lines.push(Vec::new());
                    column = 0;
                },
                Element::Text => {
                    let text = frag.node.text.as_deref().unwrap_or_default();
                    let mut segment = String::new();
                    for c in text.chars() {
                        match c {
                            '\n' => {
                                if let Some(line) = lines.last_mut() {
                                    line.push((std::mem::take(&mut segment), *frag));
                                }
                                lines.push(Vec::new());
                                column = 0;
                            },
                            '\t' => {
                                let pad = 8 - column % 8;
                                segment.extend(std::iter::repeat(' ').take(pad));
                                column += pad;
                            },
                            '\r' => {},
                            _ => {
                                segment.push(c);
                                column += 1;
                            },
                        }
                    }
                    if let Some(line) = lines.last_mut() {
                        line.push((segment, *frag));
                    }
                },
                Element::Image => {
                    if let Some(line) = lines.last_mut() {
                        line.push((String::new(), *frag));
                    }
                },
                _ => {},
            }
        }

        // A newline right after the opening tag is not content.
        if lines.len() > 1 && lines[0].iter().all(|(t, f)| t.is_empty() && f.node.element == Element::Text) {
            lines.remove(0);
        }
        while lines
            .last()
            .is_some_and(|l| l.iter().all(|(t, f)| t.is_empty() && f.node.element == Element::Text))
            && lines.len() > 1
        {
            lines.pop();
        }

        for line in &lines {
            let height = line
                .iter()
                .map(|(_, f)| match f.node.element {
                    Element::Image => self.frag_height(f),
                    _ => f.node.style.line_height,
                })
                .fold(node.style.line_height, f32::max);
            if cur.y - height < frame.base_bottom() && cur.y < frame.top() {
                self.new_page(frame, cur);
            }
            cur.y -= height;

            let mut x = frame.left();
            for (text, frag) in line {
                if frag.node.element == Element::Image {
                    self.emit_image(frag.node, frag.link, x, cur.y, cur.page);
                    x += self.frag_width(frag);
                    continue;
                }
                if text.is_empty() {
                    continue;
                }
                let style = &frag.node.style;
                let width = self
                    .metrics
                    .text_width(text, style.typeface, style.font_style, style.size);
                let baseline = cur.y + Self::descent(style, style.line_height);
                self.emit_text_run(text, style, frag.link, x, baseline, width, 0.0, cur.page);
                x += width;
            }
            if x > frame.right() + 0.5 {
                self.report(
                    DiagnosticKind::ContentTooLarge,
                    format!("preformatted line {:.0}pt wide exceeds {:.0}pt", x - frame.left(), frame.right() - frame.left()),
                );
            }
        }
        cur.x = frame.left();
        self.close_block(&node.style);
    }

    fn render_rule(&mut self, node: &Node, frame: &mut RegionStack, cur: &mut Cursor) {
        if node.has_attr("BREAK") {
            self.break_page(Parity::Any, frame, cur);
            return;
        }

        let region = frame.right() - frame.left();
        let width = node
            .attr("WIDTH")
            .and_then(|w| parse_dimension(w, region))
            .unwrap_or(region)
            .min(region);
        let height = node
            .attr("SIZE")
            .and_then(|s| s.trim().parse::<f32>().ok())
            .unwrap_or(2.0);
        let spacing = self.config.paragraph_spacing;

        if cur.y < frame.top() {
            cur.y -= self.pending_space;
        }
        self.pending_space = 0.0;
        if cur.y < frame.base_bottom() + height + spacing && cur.y < frame.top() {
            self.new_page(frame, cur);
        }

        let align = node
            .attr("ALIGN")
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| "center".to_string());
        let x = match align.as_str() {
            "left" => frame.left(),
            "right" => frame.right() - width,
            _ => frame.left() + (region - width) * 0.5,
        };
        cur.y -= height + spacing;
        self.add(
            cur.page,
            Rect::new(x, cur.y + spacing * 0.5, width, height),
            PrimitiveKind::FilledBox {
                color: node.style.color,
            },
        );
        cur.x = frame.left();
        self.needspace = false;
    }

    // ---------------------------------------------------------------------
    // Lists

    fn render_list(&mut self, node: &Node, halign: HAlign, frame: &mut RegionStack, cur: &mut Cursor) {
        let label = match node.element {
            Element::Ol => {
                let code = node.attr("TYPE").and_then(|t| t.chars().next()).unwrap_or('1');
                ListLabel::Number(NumberStyle::from_code(code).unwrap_or_default())
            },
            Element::Ul => {
                let depth = self
                    .lists
                    .iter()
                    .filter(|l| matches!(l.label, ListLabel::Bullet(..)))
                    .count();
                let kind = node
                    .attr("TYPE")
                    .map(str::to_ascii_lowercase)
                    .unwrap_or_else(|| ["disc", "circle", "square"][depth % 3].to_string());
                match kind.as_str() {
                    "circle" => ListLabel::Bullet('\u{25CB}', Typeface::Dingbats),
                    "square" => ListLabel::Bullet('\u{25A0}', Typeface::Dingbats),
                    _ => ListLabel::Bullet('\u{2022}', Typeface::Symbol),
                }
            },
            _ => ListLabel::None,
        };
        let start = node
            .attr("START")
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(1);

        self.open_block(&node.style, frame, cur);
        self.lists.push(ListState { label, value: start });
        frame.adjust_left(INDENT);
        self.render_nodes(&node.children, halign, frame, cur);
        frame.adjust_left(-INDENT);
        self.lists.pop();
        self.close_block(&node.style);
    }

    fn list_value(value: &str) -> Option<i64> {
        let value = value.trim();
        let first = value.chars().next()?;
        if first.is_ascii_digit() {
            value.parse().ok()
        } else if first.is_ascii_uppercase() {
            Some(first as i64 - 'A' as i64 + 1)
        } else if first.is_ascii_lowercase() {
            Some(first as i64 - 'a' as i64 + 1)
        } else {
            None
        }
    }

    fn render_list_item(&mut self, node: &Node, halign: HAlign, frame: &mut RegionStack, cur: &mut Cursor) {
        let outside = self.lists.is_empty();
        if outside {
            frame.adjust_left(INDENT);
            self.lists.push(ListState {
                label: ListLabel::Bullet('\u{2022}', Typeface::Symbol),
                value: 1,
            });
        }

        let space = self.pending_space.max(node.style.margin_top);
        if cur.y < frame.top() {
            cur.y -= space;
        }
        self.pending_space = 0.0;
        self.needspace = false;

        let old_page = cur.page;
        let old_y = cur.y;
        let old_count = self.pages.primitive_count(old_page);
        let label_left = frame.left();

        self.render_nodes(&node.children, halign, frame, cur);

        // The label goes with the item's first line; if nothing landed on
        // the starting page it moves to the next one.
        let (label_page, first_index, fallback_y) =
            if cur.page != old_page && self.pages.primitive_count(old_page) == old_count {
                (old_page + 1, 0, frame.top())
            } else {
                (old_page, old_count, old_y)
            };

        let Some(state) = self.lists.last_mut() else {
            return;
        };
        if let Some(value) = node.attr("VALUE").and_then(Self::list_value) {
            state.value = value;
        }
        let (text, typeface) = match state.label {
            ListLabel::Number(style) => (format!("{}. ", format_number(state.value, style)), node.style.typeface),
            ListLabel::Bullet(c, typeface) => (format!("{} ", c), typeface),
            ListLabel::None => (String::new(), node.style.typeface),
        };
        state.value += 1;

        if !text.is_empty() {
            let mut style = node.style.clone();
            style.typeface = typeface;
            if typeface == Typeface::Symbol || typeface == Typeface::Dingbats {
                style.font_style = FontStyle::Normal;
            }
            let width = self
                .metrics
                .text_width(&text, style.typeface, style.font_style, style.size);

            let first_line = self
                .pages
                .get(label_page)
                .and_then(|p| p.primitives().get(first_index..))
                .and_then(|prims| {
                    prims.iter().find(|p| {
                        matches!(p.kind, PrimitiveKind::Text { .. } | PrimitiveKind::Image { .. })
                    })
                })
                .map(|p| match &p.kind {
                    PrimitiveKind::Text { .. } => p.baseline(),
                    _ => p.rect.y + Self::descent(&style, style.line_height),
                });
            let baseline = first_line
                .unwrap_or(fallback_y - style.line_height + Self::descent(&style, style.line_height));
            let rect = Rect::new(
                label_left - width,
                baseline - Self::descent(&style, style.line_height),
                width,
                style.line_height,
            );
            let color = style.color;
            self.add_text(label_page, rect, &text, &style, color);
        }

        if outside {
            self.lists.pop();
            frame.adjust_left(-INDENT);
        }
        self.needspace = false;
    }

    // ---------------------------------------------------------------------
    // Directives

    pub(crate) fn apply_directives(&mut self, parsed: ParsedComment, frame: &mut RegionStack, cur: &mut Cursor) {
        if let Some(error) = parsed.error {
            self.report(DiagnosticKind::BadDirective, error);
        }

        let mut top_of_form = cur.y >= frame.top();
        for directive in parsed.directives {
            log::debug!("Directive {:?} on page {}", directive, cur.page);
            if directive.needs_fresh_page() && !top_of_form {
                self.new_page(frame, cur);
                if self.page_duplex(cur.page) && self.relative_page(cur.page) % 2 == 1 {
                    self.new_page(frame, cur);
                }
                top_of_form = true;
            }

            match directive {
                Directive::PageBreak => {
                    self.new_page(frame, cur);
                    top_of_form = true;
                },
                Directive::NewSheet => {
                    self.new_page(frame, cur);
                    if self.page_duplex(cur.page) && self.relative_page(cur.page) % 2 == 1 {
                        self.new_page(frame, cur);
                    }
                    top_of_form = true;
                },
                Directive::HalfPage => {
                    let halfway = frame.current().halfway();
                    if cur.y <= halfway {
                        self.new_page(frame, cur);
                        top_of_form = true;
                    } else {
                        cur.y = halfway;
                        cur.x = frame.left();
                        top_of_form = false;
                    }
                },
                Directive::Need(amount) => {
                    if cur.y - amount < frame.base_bottom() {
                        self.new_page(frame, cur);
                        top_of_form = true;
                    }
                    cur.x = frame.left();
                },
                Directive::Header(pos, format) => {
                    let old = self.frame_edges(cur.page);
                    if let Some(slot) = self.pages.defaults.header.slot_mut(pos) {
                        *slot = format.clone();
                    }
                    if top_of_form && self.pages.ensure(cur.page, &mut *self.progress) {
                        self.pages.update_chapter_from(cur.page, |p| {
                            if let Some(slot) = p.header.slot_mut(pos) {
                                *slot = format.clone();
                            }
                        });
                    }
                    if top_of_form {
                        self.refit_frame(frame, old, cur.page);
                        cur.y = frame.top();
                    }
                },
                Directive::Footer(pos, format) => {
                    let old = self.frame_edges(cur.page);
                    if let Some(slot) = self.pages.defaults.footer.slot_mut(pos) {
                        *slot = format.clone();
                    }
                    if top_of_form && self.pages.ensure(cur.page, &mut *self.progress) {
                        self.pages.update_chapter_from(cur.page, |p| {
                            if let Some(slot) = p.footer.slot_mut(pos) {
                                *slot = format.clone();
                            }
                        });
                    }
                    if top_of_form {
                        self.refit_frame(frame, old, cur.page);
                    }
                },
                other => self.apply_media(other, frame, cur),
            }
        }
    }

    fn apply_media(&mut self, directive: Directive, frame: &mut RegionStack, cur: &mut Cursor) {
        if !self.pages.ensure(cur.page, &mut *self.progress) {
            return;
        }
        let old = self.frame_edges(cur.page);
        let Some(page) = self.pages.get_mut(cur.page) else {
            return;
        };
        match directive {
            Directive::MediaColor(color) => page.media_color = Some(color),
            Directive::MediaType(media) => page.media_type = Some(media),
            Directive::MediaPosition(position) => page.media_position = position,
            Directive::MediaSize(width, length) => {
                let (width, length) = if page.landscape {
                    (length, width)
                } else {
                    (width, length)
                };
                page.width = width;
                page.length = length;
            },
            Directive::MediaMargin(side, value) => match side {
                MarginSide::Left => page.left = value,
                MarginSide::Right => page.right = value,
                MarginSide::Top => page.top = value,
                MarginSide::Bottom => page.bottom = value,
            },
            Directive::MediaLandscape(landscape) => {
                if page.landscape != landscape {
                    std::mem::swap(&mut page.width, &mut page.length);
                    page.landscape = landscape;
                }
            },
            Directive::MediaDuplex(duplex) => page.duplex = duplex,
            Directive::NumberUp(nup) => page.nup = nup,
            _ => {},
        }

        if page.print_width() <= 0.0 || page.print_length() <= 0.0 {
            self.report(
                DiagnosticKind::BadDirective,
                format!("page {} has no printable area after media change", cur.page + 1),
            );
        }
        self.refit_frame(frame, old, cur.page);
        cur.x = frame.left();
        cur.y = frame.top();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::FixedMetrics;
    use crate::progress::CollectingProgress;

    fn continuous() -> ExportConfig {
        ExportConfig::default()
            .with_output_type(OutputType::Continuous)
            .with_header(HeadFootFormat::default())
            .with_footer(HeadFootFormat::default())
    }

    fn para(text: &str, metrics: &FixedMetrics) -> Node {
        Node::block(Element::Paragraph, text, Style::default(), metrics)
    }

    fn paginate(config: &ExportConfig, doc: &Document) -> (Pagination, CollectingProgress) {
        let metrics = FixedMetrics::default();
        let mut progress = CollectingProgress::new();
        let result = Formatter::new(config, &metrics, &mut progress, &doc.images).paginate(doc);
        (result, progress)
    }

    fn texts(page: &Page) -> Vec<(String, Rect)> {
        page.primitives()
            .iter()
            .filter_map(|p| match &p.kind {
                PrimitiveKind::Text { text, .. } => Some((text.clone(), p.rect)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_single_line_paragraph() {
        let metrics = FixedMetrics::default();
        let config = continuous();
        let doc = Document::new(vec![para("Hello world", &metrics)]);
        let (result, _) = paginate(&config, &doc);
        assert_eq!(result.pages.len(), 1);
        let runs = texts(result.pages.get(0).unwrap());
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].0, "Hello world");
        assert_eq!(runs[0].1.x, 0.0);
    }

    #[test]
    fn test_lines_wrap_to_region_width() {
        let metrics = FixedMetrics::default();
        // 100pt wide printable area; each word is 5 chars * 5.5pt = 27.5pt.
        let config = continuous().with_page_size(200.0, 400.0).with_margins(50.0, 50.0, 20.0, 20.0);
        let doc = Document::new(vec![para("aaaaa bbbbb ccccc ddddd", &metrics)]);
        let (result, _) = paginate(&config, &doc);
        let runs = texts(result.pages.get(0).unwrap());
        let lines: Vec<_> = runs.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(lines, vec!["aaaaa bbbbb ccccc", "ddddd"]);
        assert!(runs[1].1.y < runs[0].1.y);
        for (_, rect) in &runs {
            assert!(rect.right() <= 100.0 + 0.01);
        }
    }

    #[test]
    fn test_explicit_break_and_trailing_space() {
        let metrics = FixedMetrics::default();
        let config = continuous();
        let mut p = para("one two", &metrics);
        p.children.push(Node::text_run(" ", Style::default(), 5.5));
        p.children.push(Node::new(Element::Br));
        p.children.extend(Node::words("three", &Style::default(), &metrics));
        let (result, _) = paginate(&config, &Document::new(vec![p]));
        let lines: Vec<_> = texts(result.pages.get(0).unwrap()).into_iter().map(|(t, _)| t).collect();
        assert_eq!(lines, vec!["one two".to_string(), "three".to_string()]);
    }

    #[test]
    fn test_centered_and_right_aligned() {
        let metrics = FixedMetrics::default();
        let config = continuous().with_page_size(300.0, 400.0).with_margins(50.0, 50.0, 20.0, 20.0);
        let centered = Node::block(
            Element::Paragraph,
            "abcd",
            Style::default().with_halign(HAlign::Center),
            &metrics,
        );
        let right = Node::block(
            Element::Paragraph,
            "abcd",
            Style::default().with_halign(HAlign::Right),
            &metrics,
        );
        let (result, _) = paginate(&config, &Document::new(vec![centered, right]));
        let runs = texts(result.pages.get(0).unwrap());
        assert!((runs[0].1.x - (200.0 - 22.0) / 2.0).abs() < 0.01);
        assert!((runs[1].1.x - (200.0 - 22.0)).abs() < 0.01);
    }

    #[test]
    fn test_justified_lines_get_char_spacing() {
        let metrics = FixedMetrics::default();
        let config = continuous().with_page_size(200.0, 400.0).with_margins(50.0, 50.0, 20.0, 20.0);
        let p = Node::block(
            Element::Paragraph,
            "aaaaa bbbbb ccccc ddddd",
            Style::default().with_halign(HAlign::Justify),
            &metrics,
        );
        let (result, _) = paginate(&config, &Document::new(vec![p]));
        let spacing: Vec<f32> = result
            .pages
            .get(0)
            .unwrap()
            .primitives()
            .iter()
            .filter_map(|p| match &p.kind {
                PrimitiveKind::Text { char_spacing, .. } => Some(*char_spacing),
                _ => None,
            })
            .collect();
        assert!(spacing[0] > 0.0);
        assert_eq!(spacing[1], 0.0);
    }

    #[test]
    fn test_overflow_creates_pages() {
        let metrics = FixedMetrics::default();
        let config = continuous().with_page_size(200.0, 200.0).with_margins(20.0, 20.0, 20.0, 20.0);
        let nodes: Vec<Node> = (0..30).map(|i| para(&format!("line {}", i), &metrics)).collect();
        let (result, _) = paginate(&config, &Document::new(nodes));
        assert!(result.pages.len() > 1);
        for page in result.pages.iter() {
            for (_, rect) in texts(page) {
                assert!(rect.y >= -0.01);
                assert!(rect.top() <= 160.0 + 0.01);
            }
        }
    }

    #[test]
    fn test_paragraph_spacing_between_blocks() {
        let metrics = FixedMetrics::default();
        let config = continuous();
        let doc = Document::new(vec![para("first", &metrics), para("second", &metrics)]);
        let (result, _) = paginate(&config, &doc);
        let runs = texts(result.pages.get(0).unwrap());
        let gap = runs[0].1.y - runs[1].1.y;
        assert!((gap - (13.2 + config.paragraph_spacing)).abs() < 0.01);
    }

    #[test]
    fn test_margins_collapse_to_larger() {
        let metrics = FixedMetrics::default();
        let config = continuous().with_paragraph_spacing(0.0);
        let mut first = para("first", &metrics);
        first.style.margin_bottom = 10.0;
        let mut second = para("second", &metrics);
        second.style.margin_top = 25.0;
        let (result, _) = paginate(&config, &Document::new(vec![first, second]));
        let runs = texts(result.pages.get(0).unwrap());
        let gap = runs[0].1.y - runs[1].1.y;
        assert!((gap - (13.2 + 25.0)).abs() < 0.01);
    }

    #[test]
    fn test_page_break_directive() {
        let metrics = FixedMetrics::default();
        let config = continuous();
        let doc = Document::new(vec![
            para("before", &metrics),
            Node::comment(" PAGE BREAK "),
            para("after", &metrics),
        ]);
        let (result, _) = paginate(&config, &doc);
        assert_eq!(result.pages.len(), 2);
        assert_eq!(result.pages.get(1).unwrap().text(), "after");
    }

    #[test]
    fn test_bad_directive_reported() {
        let config = continuous();
        let doc = Document::new(vec![Node::comment("NEED plenty")]);
        let (_, progress) = paginate(&config, &doc);
        assert_eq!(progress.count(DiagnosticKind::BadDirective), 1);
    }

    #[test]
    fn test_media_directive_changes_page() {
        let metrics = FixedMetrics::default();
        let config = continuous();
        let doc = Document::new(vec![
            para("portrait", &metrics),
            Node::comment("MEDIA SIZE A4 MEDIA COLOR Blue"),
            para("a4", &metrics),
        ]);
        let (result, _) = paginate(&config, &doc);
        assert_eq!(result.pages.len(), 2);
        let second = result.pages.get(1).unwrap();
        assert_eq!((second.width, second.length), (595.0, 842.0));
        assert_eq!(second.media_color.as_deref(), Some("Blue"));
        assert_eq!(result.pages.get(0).unwrap().length, 792.0);
    }

    #[test]
    fn test_named_anchor_recorded() {
        let metrics = FixedMetrics::default();
        let config = continuous();
        let mut p = para("target", &metrics);
        p.children.insert(0, Node::new(Element::Anchor).with_attr("NAME", "Sec1"));
        let (result, _) = paginate(&config, &Document::new(vec![p]));
        let link = result.links.find("sec1").unwrap();
        assert_eq!(link.page, 0);
    }

    #[test]
    fn test_hyperlink_primitives_merge() {
        let metrics = FixedMetrics::default();
        let config = continuous();
        let anchor = Node::new(Element::Anchor)
            .with_attr("HREF", "http://example.com")
            .with_children(Node::words("click here now", &Style::default(), &metrics));
        let p = Node::new(Element::Paragraph).with_child(anchor);
        let (result, _) = paginate(&config, &Document::new(vec![p]));
        let links: Vec<_> = result
            .pages
            .get(0)
            .unwrap()
            .primitives()
            .iter()
            .filter(|p| matches!(p.kind, PrimitiveKind::Link { .. }))
            .collect();
        assert_eq!(links.len(), 1);
        assert!((links[0].rect.width - 14.0 * 5.5).abs() < 0.01);
    }

    #[test]
    fn test_list_labels() {
        let metrics = FixedMetrics::default();
        let config = continuous();
        let items: Vec<Node> = ["alpha", "beta"]
            .iter()
            .map(|t| Node::block(Element::Li, t, Style::default(), &metrics))
            .collect();
        let list = Node::new(Element::Ol).with_attr("TYPE", "i").with_attr("START", "3").with_children(items);
        let (result, _) = paginate(&config, &Document::new(vec![list]));
        let runs = texts(result.pages.get(0).unwrap());
        let labels: Vec<_> = runs.iter().filter(|(t, _)| t.ends_with(". ")).collect();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].0, "iii. ");
        assert_eq!(labels[1].0, "iv. ");
        // Label sits left of the indented body, on the same line.
        let body = runs.iter().find(|(t, _)| t == "alpha").unwrap();
        assert_eq!(body.1.x, INDENT);
        assert!((labels[0].1.right() - INDENT).abs() < 0.01);
        assert!((labels[0].1.y - body.1.y).abs() < 0.01);
    }

    #[test]
    fn test_left_float_narrows_lines() {
        let metrics = FixedMetrics::default();
        let config = continuous().with_page_size(300.0, 400.0).with_margins(50.0, 50.0, 20.0, 20.0);
        let words: Vec<String> = (0..30).map(|i| format!("w{:02}", i)).collect();
        let mut p = Node::new(Element::Paragraph)
            .with_child(Node::image("logo.png", 50.0, 20.0).with_attr("ALIGN", "left"));
        p.children.extend(Node::words(&words.join(" "), &Style::default(), &metrics));
        let image = crate::tree::RasterImage::new(1, 1, 1, vec![0]).unwrap();
        let doc = Document::new(vec![p]).with_image("logo.png", image);
        let (result, _) = paginate(&config, &doc);
        let page = result.pages.get(0).unwrap();
        let img = page
            .primitives()
            .iter()
            .find(|p| matches!(p.kind, PrimitiveKind::Image { .. }))
            .unwrap();
        assert_eq!(img.rect.x, 0.0);
        let runs = texts(page);
        assert_eq!(runs[0].1.x, 50.0);
        // Lines below the float return to the left edge.
        assert_eq!(runs.last().unwrap().1.x, 0.0);
    }

    #[test]
    fn test_image_border_surrounds_image() {
        let config = continuous();
        let p = Node::new(Element::Paragraph).with_child(Node::image("pic.png", 30.0, 20.0).with_attr("BORDER", "2"));
        let image = crate::tree::RasterImage::new(1, 1, 1, vec![0]).unwrap();
        let doc = Document::new(vec![p]).with_image("pic.png", image);
        let (result, _) = paginate(&config, &doc);
        let page = result.pages.get(0).unwrap();
        let img = page
            .primitives()
            .iter()
            .find(|p| matches!(p.kind, PrimitiveKind::Image { .. }))
            .unwrap();
        let (rect, line_width) = page
            .primitives()
            .iter()
            .find_map(|p| match p.kind {
                PrimitiveKind::Box { line_width, .. } => Some((p.rect, line_width)),
                _ => None,
            })
            .unwrap();
        assert_eq!(line_width, 2.0);
        // The stroke is centered on the border band.
        assert_eq!(rect.width, img.rect.width + 2.0);
        assert_eq!(rect.height, img.rect.height + 2.0);
        assert_eq!(img.rect.x - rect.x, 1.0);
    }

    #[test]
    fn test_missing_image_reported_once() {
        let config = continuous();
        let p = Node::new(Element::Paragraph)
            .with_child(Node::image("nope.png", 10.0, 10.0))
            .with_child(Node::image("nope.png", 10.0, 10.0));
        let (_, progress) = paginate(&config, &Document::new(vec![p]));
        assert_eq!(progress.count(DiagnosticKind::MissingImage), 1);
    }

    #[test]
    fn test_rule_break() {
        let metrics = FixedMetrics::default();
        let config = continuous();
        let doc = Document::new(vec![
            para("one", &metrics),
            Node::new(Element::Hr).with_attr("BREAK", ""),
            para("two", &metrics),
        ]);
        let (result, _) = paginate(&config, &doc);
        assert_eq!(result.pages.len(), 2);
    }

    #[test]
    fn test_rule_geometry() {
        let config = continuous().with_page_size(300.0, 400.0).with_margins(50.0, 50.0, 20.0, 20.0);
        let doc = Document::new(vec![Node::new(Element::Hr).with_attr("WIDTH", "50%")]);
        let (result, _) = paginate(&config, &doc);
        let rule = &result.pages.get(0).unwrap().primitives()[0];
        assert_eq!(rule.rect.width, 100.0);
        assert_eq!(rule.rect.x, 50.0);
        assert_eq!(rule.rect.height, 2.0);
    }

    #[test]
    fn test_preformatted_tabs() {
        let config = continuous();
        let style = Style::sized(Typeface::Courier, 10.0);
        let pre = Node::new(Element::Pre)
            .with_child(Node::text_run("\na\tb\nsecond", style.clone(), 0.0));
        let (result, _) = paginate(&config, &Document::new(vec![pre]));
        let runs = texts(result.pages.get(0).unwrap());
        assert_eq!(runs[0].0, "a       b");
        assert_eq!(runs[1].0, "second");
        assert!(runs[0].1.y > runs[1].1.y);
    }

    #[test]
    fn test_page_limit_degrades() {
        let metrics = FixedMetrics::default();
        let mut config = continuous().with_page_size(200.0, 100.0).with_margins(10.0, 10.0, 10.0, 10.0);
        config.limits.max_pages = 2;
        let nodes: Vec<Node> = (0..40).map(|i| para(&format!("p{}", i), &metrics)).collect();
        let (result, progress) = paginate(&config, &Document::new(nodes));
        assert_eq!(result.pages.len(), 2);
        assert_eq!(progress.count(DiagnosticKind::TooManyPages), 1);
    }
}

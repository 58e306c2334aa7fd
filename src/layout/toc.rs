//! Table of contents.
//!
//! Formatted after the body, once every heading has its final page. The
//! pages are appended to the store and moved in front of the body by the
//! output order in [`Pagination`](super::Pagination).

use super::flow::{flatten, Cursor, Formatter};
use super::index::HeadingEntry;
use super::page::{LinkTarget, PrimitiveKind, Rect, Section};
use crate::fonts::{FontStyle, Typeface};
use crate::tree::{Document, Element, HAlign, Node, Style};
use std::ops::Range;

/// Indentation per heading level.
const LEVEL_INDENT: f32 = 18.0;

/// Space kept for the page number column.
const NUMBER_COLUMN: f32 = 36.0;

impl<'a> Formatter<'a> {
    /// Format the contents pages; returns their page range.
    pub(crate) fn render_toc(&mut self, doc: &Document, body: &Range<usize>) -> Range<usize> {
        let start = self.pages.len();
        self.pages.section = Section::Contents;
        self.pages.chapter = 0;
        self.chapter = 0;
        self.section_start = start;
        self.front_matter = false;
        self.pending_space = 0.0;
        self.needspace = false;

        let mut frame = self.base_frame(start);
        let mut cur = Cursor {
            x: frame.left(),
            y: frame.top(),
            page: start,
        };
        self.progress.show(&format!("Formatting contents page {}", start + 1));

        let title_style = Style::sized(Typeface::Helvetica, 18.0)
            .with_font_style(FontStyle::Bold)
            .with_halign(HAlign::Center);
        let mut title = Node::block(Element::Paragraph, &self.config.toc_title, title_style, self.metrics);
        title.style.margin_bottom = self.config.paragraph_spacing;
        self.render_nodes(std::slice::from_ref(&title), HAlign::Center, &mut frame, &mut cur);

        if doc.toc.is_empty() {
            let entries: Vec<HeadingEntry> = self.headings.entries().to_vec();
            for (index, entry) in entries.iter().enumerate() {
                self.render_toc_entry(index, entry, body.start, &mut frame, &mut cur);
            }
        } else {
            self.render_nodes(&doc.toc, HAlign::Left, &mut frame, &mut cur);
        }
        self.close_section(&cur, &frame, start);

        if self.page_like(start).duplex && (self.pages.len() - start) % 2 == 1 {
            let blank = self.pages.len();
            self.pages.ensure(blank, &mut *self.progress);
        }
        log::info!("Formatted {} contents pages", self.pages.len() - start);
        start..self.pages.len()
    }

    fn render_toc_entry(
        &mut self,
        index: usize,
        entry: &HeadingEntry,
        body_start: usize,
        frame: &mut super::region::RegionStack,
        cur: &mut Cursor,
    ) {
        let style = if entry.level == 1 {
            Style::default().with_font_style(FontStyle::Bold)
        } else {
            Style::default()
        };
        let indent = f32::from(entry.level.saturating_sub(1)) * LEVEL_INDENT;

        if entry.level == 1 && index > 0 && cur.y < frame.top() {
            cur.y -= self.config.paragraph_spacing * 0.5;
        }
        let line_height = style.line_height;
        if cur.y - line_height < frame.base_bottom() && cur.y < frame.top() {
            self.new_page(frame, cur);
        }

        let top = (cur.page, cur.y);
        let words = Node::words(&entry.title, &style, self.metrics);
        let mut frags = Vec::new();
        for word in &words {
            flatten(word, None, &mut frags);
        }

        frame.adjust_left(indent);
        frame.adjust_right(-NUMBER_COLUMN);
        let first_index = self.pages.primitive_count(cur.page);
        self.render_paragraph(&frags, HAlign::Left, frame, cur);
        frame.adjust_left(-indent);
        frame.adjust_right(NUMBER_COLUMN);

        let page = cur.page;
        let from = if page == top.0 { first_index } else { 0 };
        let last_text = self
            .pages
            .get(page)
            .and_then(|p| p.primitives().get(from..))
            .and_then(|prims| prims.iter().rev().find(|p| p.is_text()))
            .map(|p| (p.rect.right(), p.rect.y));
        let (text_right, line_y) = last_text.unwrap_or((frame.left() + indent, cur.y));

        // Page number, right aligned, with dot leaders up to it.
        let number = (entry.page + 1).saturating_sub(body_start).to_string();
        let number_width = self
            .metrics
            .text_width(&number, style.typeface, style.font_style, style.size);
        let number_x = frame.right() - number_width;
        let color = style.color;
        self.add_text(
            page,
            Rect::new(number_x, line_y, number_width, line_height),
            &number,
            &style,
            color,
        );

        let dot = self
            .metrics
            .text_width(".", style.typeface, style.font_style, style.size);
        let gap = style.size * 0.5;
        let room = number_x - gap - (text_right + gap);
        if dot > 0.0 && room > dot {
            let count = (room / dot).floor() as usize;
            let leaders = ".".repeat(count);
            let width = count as f32 * dot;
            self.add_text(
                page,
                Rect::new(number_x - gap - width, line_y, width, line_height),
                &leaders,
                &style,
                color,
            );
        }

        // The whole entry links to its heading.
        let link_top = if page == top.0 { top.1 } else { frame.top() };
        let link_left = frame.left() + indent;
        if self.config.links {
            self.add(
                page,
                Rect::new(link_left, cur.y, frame.right() - link_left, link_top - cur.y),
                PrimitiveKind::Link {
                    target: LinkTarget::Heading(index),
                },
            );
        }
    }
}

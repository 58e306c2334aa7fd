//! Pagination.
//!
//! Turns a styled document tree into pages of positioned primitives:
//! - [`flow`]: block and inline formatting, lists, directives
//! - [`table`]: column solver and row formatting
//! - [`toc`]: the generated table of contents
//! - [`page`]: pages and their primitives
//! - [`index`]: headings and named links
//! - [`region`]: the float-aware flow region
//!
//! Everything is laid out before any output is written; the serializers
//! only read a finished [`Pagination`].

pub mod directive;
pub mod flow;
pub mod index;
pub mod page;
pub mod region;
pub mod table;
pub mod toc;

pub use directive::{parse_comment, Directive, MarginSide, ParsedComment};
pub use flow::{Cursor, Formatter, INDENT};
pub use index::{HeadingEntry, HeadingIndex, LinkAdd, LinkIndex, NamedLink};
pub use page::{LinkTarget, Page, PageStore, Primitive, PrimitiveKind, Rect, Section};
pub use region::{Region, RegionStack, MAX_REGION_DEPTH};
pub use table::{solve_columns, ColumnSizes, ColumnSolve, ColumnWidth, SpanSizes, TableGeometry};

use crate::fonts::FontUsage;
use std::ops::Range;

/// A fully paginated document.
#[derive(Debug, Clone)]
pub struct Pagination {
    /// Pages in creation order (title, body, then contents)
    pub pages: PageStore,
    /// Indexed headings
    pub headings: HeadingIndex,
    /// Named link targets
    pub links: LinkIndex,
    /// Fonts referenced by text primitives
    pub fonts: FontUsage,
    /// First page of each chapter; index 0 is the table of contents
    pub chapter_starts: Vec<usize>,
    /// Last page of each chapter
    pub chapter_ends: Vec<usize>,
    /// Page indices in output order
    pub page_order: Vec<usize>,
    /// Title pages
    pub title_pages: Range<usize>,
    /// Contents pages
    pub toc_pages: Range<usize>,
    /// Body pages
    pub body_pages: Range<usize>,
}

impl Pagination {
    /// Position of a page in the output, if it is output at all.
    pub fn output_index(&self, page: usize) -> Option<usize> {
        self.page_order.iter().position(|p| *p == page)
    }

    /// Chapter of a page.
    pub fn chapter_of(&self, page: usize) -> usize {
        self.pages.get(page).map_or(0, |p| p.chapter)
    }

    /// Number of output pages.
    pub fn page_count(&self) -> usize {
        self.page_order.len()
    }
}

/// Parse the leading decimal number of an attribute value (`"12px"` → 12).
pub(crate) fn leading_number(text: &str) -> Option<f32> {
    let text = text.trim();
    let end = text
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+'))))
        .map_or(text.len(), |(i, _)| i);
    text[..end].parse().ok()
}

/// Parse a length that may be a percentage of `relative`.
pub(crate) fn parse_dimension(text: &str, relative: f32) -> Option<f32> {
    let text = text.trim();
    match text.strip_suffix('%') {
        Some(pct) => leading_number(pct).map(|p| p * relative * 0.01),
        None => leading_number(text),
    }
}

//! Running headers and footers.
//!
//! Every page carries a header and a footer format with three slots (left,
//! center, right). Before serialization each slot is resolved against the
//! page's numbering context and turned into text or image primitives:
//!
//! - `$PAGE`, `$PAGES`, `$CHAPTERPAGE`, `$CHAPTERPAGES`, each optionally
//!   followed by a style code such as `(i)` or `(A)`
//! - `$TITLE`, `$CHAPTER`, `$HEADING`, `$DATE`, `$TIME`
//! - `$LOGOIMAGE` and `$HFIMAGE<n>` (whole-slot image references)
//! - `$$` for a literal dollar sign
//!
//! Unknown macros are copied through verbatim.

use crate::config::{ExportConfig, OutputType};
use crate::fonts::FontMetrics;
use crate::layout::{Page, Pagination, Primitive, PrimitiveKind, Rect, Section};
use crate::numbering::{format_number, NumberStyle};
use crate::progress::ProgressSink;
use crate::tree::{Document, RasterImage, Rgb};
use chrono::{DateTime, Local};

/// Nominal browser width used to size header/footer images from pixels.
pub const BROWSER_WIDTH: f32 = 680.0;

/// Horizontal placement of a slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HFAlignment {
    /// Flush with the left margin
    #[default]
    Left,
    /// Centered in the printable width
    Center,
    /// Flush with the right margin
    Right,
}

impl HFAlignment {
    /// Slot alignments in format order.
    pub const SLOTS: [HFAlignment; 3] = [HFAlignment::Left, HFAlignment::Center, HFAlignment::Right];

    /// X of an item `width` wide in a printable width of `print_width`.
    pub fn place(self, print_width: f32, width: f32) -> f32 {
        match self {
            HFAlignment::Left => 0.0,
            HFAlignment::Center => (print_width - width) * 0.5,
            HFAlignment::Right => print_width - width,
        }
    }
}

/// Values a format string can refer to, for one page.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderContext<'a> {
    /// Printed page number within its section
    pub page: i64,
    /// Style of a bare `$PAGE`
    pub page_style: NumberStyle,
    /// Body page count
    pub pages: i64,
    /// Page number within the chapter
    pub chapter_page: i64,
    /// Page count of the chapter
    pub chapter_pages: i64,
    /// Document title
    pub title: Option<&'a str>,
    /// Running chapter label
    pub chapter: Option<&'a str>,
    /// Running heading label
    pub heading: Option<&'a str>,
    /// Formatted date
    pub date: &'a str,
    /// Formatted time
    pub time: &'a str,
}

/// Parse an `(x)` style suffix. Returns the style and the bytes consumed.
fn style_suffix(after: &str) -> Option<(NumberStyle, usize)> {
    let bytes = after.as_bytes();
    if bytes.len() >= 3 && bytes[0] == b'(' && bytes[2] == b')' {
        let style = NumberStyle::from_code(bytes[1] as char).unwrap_or(NumberStyle::Arabic);
        Some((style, 3))
    } else {
        None
    }
}

/// Substitute the macros of one format string.
pub fn resolve(format: &str, ctx: &PlaceholderContext<'_>) -> String {
    let mut out = String::with_capacity(format.len());
    let mut rest = format;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 1..];
        if let Some(after) = rest.strip_prefix('$') {
            out.push('$');
            rest = after;
            continue;
        }
        if rest.is_empty() {
            break;
        }

        let word_len = rest
            .char_indices()
            .skip(1)
            .find(|(_, c)| !c.is_ascii_alphabetic())
            .map_or(rest.len(), |(i, _)| i);
        let word = &rest[..word_len];
        let mut after = &rest[word_len..];

        let number = |n: i64, default: NumberStyle, after: &mut &str| {
            let style = match style_suffix(after) {
                Some((style, used)) => {
                    *after = &after[used..];
                    style
                },
                None => default,
            };
            format_number(n, style)
        };

        match word.to_ascii_uppercase().as_str() {
            "PAGE" => out.push_str(&number(ctx.page, ctx.page_style, &mut after)),
            "PAGES" => out.push_str(&number(ctx.pages, NumberStyle::Arabic, &mut after)),
            "CHAPTERPAGE" => {
                out.push_str(&number(ctx.chapter_page, NumberStyle::Arabic, &mut after))
            },
            "CHAPTERPAGES" => {
                out.push_str(&number(ctx.chapter_pages, NumberStyle::Arabic, &mut after))
            },
            "TITLE" => out.push_str(ctx.title.unwrap_or_default()),
            "CHAPTER" => out.push_str(ctx.chapter.unwrap_or_default()),
            "HEADING" => out.push_str(ctx.heading.unwrap_or_default()),
            "DATE" => out.push_str(ctx.date),
            "TIME" => out.push_str(ctx.time),
            _ => {
                out.push('$');
                out.push_str(word);
            },
        }
        rest = after;
    }

    out.push_str(rest);
    out
}

/// Image named by a whole-slot image macro, if the slot is one.
fn slot_image<'d>(slot: &str, doc: &'d Document) -> Option<Option<&'d str>> {
    let upper = slot.trim().to_ascii_uppercase();
    if upper == "$LOGOIMAGE" {
        return Some(doc.logo_image.as_deref());
    }
    let n = upper.strip_prefix("$HFIMAGE")?;
    let index: usize = n.parse().ok()?;
    Some(doc.hf_images.get(index).map(|s| s.as_str()))
}

/// Turns header/footer formats into page primitives.
pub struct HeadFootRenderer<'a> {
    config: &'a ExportConfig,
    metrics: &'a dyn FontMetrics,
    doc: &'a Document,
    date: String,
    time: String,
}

impl<'a> HeadFootRenderer<'a> {
    /// Create a renderer stamped with the current local time.
    pub fn new(config: &'a ExportConfig, metrics: &'a dyn FontMetrics, doc: &'a Document) -> Self {
        Self::with_timestamp(config, metrics, doc, Local::now())
    }

    /// Create a renderer with a fixed `$DATE`/`$TIME`.
    pub fn with_timestamp(
        config: &'a ExportConfig,
        metrics: &'a dyn FontMetrics,
        doc: &'a Document,
        now: DateTime<Local>,
    ) -> Self {
        Self {
            config,
            metrics,
            doc,
            date: now.format("%x").to_string(),
            time: now.format("%X").to_string(),
        }
    }

    /// Numbering context of a page; `None` for pages without headers.
    pub fn context<'p>(&'p self, pagination: &'p Pagination, index: usize) -> Option<PlaceholderContext<'p>> {
        let page = pagination.pages.get(index)?;
        let (number, style) = match page.section {
            Section::Title => return None,
            Section::Contents => (
                index as i64 - pagination.toc_pages.start as i64 + 1,
                NumberStyle::LowerRoman,
            ),
            Section::Body if page.chapter == 0 => (
                index as i64 - pagination.body_pages.start as i64 + 1,
                NumberStyle::LowerRoman,
            ),
            Section::Body => (
                index as i64 - pagination.body_pages.start as i64 + 1,
                NumberStyle::Arabic,
            ),
        };

        let chapter_start = pagination.chapter_starts.get(page.chapter).copied().unwrap_or(index);
        let chapter_end = pagination.chapter_ends.get(page.chapter).copied().unwrap_or(index);

        // $CHAPTERPAGE is the printed number shifted by the chapter's offset
        // from the first chapter. Contents pages count as if they followed
        // the body, so they come out at or below zero.
        let first_chapter = pagination
            .chapter_starts
            .get(1)
            .copied()
            .unwrap_or(pagination.body_pages.start);
        let chapter_offset = match page.section {
            Section::Contents => pagination.body_pages.end as i64 - first_chapter as i64,
            _ => chapter_start as i64 - first_chapter as i64,
        };

        Some(PlaceholderContext {
            page: number,
            page_style: style,
            pages: pagination.body_pages.len() as i64,
            chapter_page: number - chapter_offset,
            chapter_pages: chapter_end as i64 - chapter_start as i64 + 1,
            title: self.doc.title.as_deref(),
            chapter: page.chapter_label.as_deref(),
            heading: page.heading_label.as_deref(),
            date: &self.date,
            time: &self.time,
        })
    }

    /// Header and footer primitives of one page.
    pub fn page_primitives(&self, pagination: &Pagination, index: usize) -> Vec<Primitive> {
        let Some(page) = pagination.pages.get(index) else {
            return Vec::new();
        };
        let Some(ctx) = self.context(pagination, index) else {
            return Vec::new();
        };

        let mirrored = page.duplex && pagination.output_index(index).is_some_and(|i| i % 2 == 1);
        let chapter_opening = self.config.output_type == OutputType::Book
            && page.chapter > 0
            && pagination.chapter_starts.get(page.chapter) == Some(&index);

        let mut out = Vec::new();
        if !chapter_opening {
            let y = page.print_length() - self.config.head_foot_size;
            self.slots(page, index, &page.header.slots(), y, mirrored, &ctx, &mut out);
        }
        self.slots(page, index, &page.footer.slots(), 0.0, mirrored, &ctx, &mut out);
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn slots(
        &self,
        page: &Page,
        index: usize,
        formats: &[&str; 3],
        y: f32,
        mirrored: bool,
        ctx: &PlaceholderContext<'_>,
        out: &mut Vec<Primitive>,
    ) {
        let print_width = page.print_width();
        for (pos, align) in HFAlignment::SLOTS.iter().enumerate() {
            let format = if mirrored { formats[2 - pos] } else { formats[pos] };
            if format.is_empty() {
                continue;
            }

            if let Some(src) = slot_image(format, self.doc) {
                let Some((src, image)) = src.and_then(|s| self.doc.images.get(s).map(|i| (s, i))) else {
                    log::debug!("Header/footer image {:?} not available", format);
                    continue;
                };
                let (width, height) = self.image_size(image, print_width);
                let image_y = if y < page.print_length() * 0.5 {
                    y
                } else {
                    y + self.config.head_foot_size - height
                };
                out.push(Primitive {
                    page: index,
                    rect: Rect::new(align.place(print_width, width), image_y, width, height),
                    kind: PrimitiveKind::Image { src: src.to_string() },
                });
                continue;
            }

            let text = resolve(format, ctx);
            if text.is_empty() {
                continue;
            }
            let size = self.config.head_foot_size;
            let width = self.metrics.text_width(
                &text,
                self.config.head_foot_font,
                self.config.head_foot_style,
                size,
            );
            out.push(Primitive {
                page: index,
                rect: Rect::new(align.place(print_width, width), y, width, size),
                kind: PrimitiveKind::Text {
                    text,
                    typeface: self.config.head_foot_font,
                    font_style: self.config.head_foot_style,
                    size,
                    color: Rgb::BLACK,
                    char_spacing: 0.0,
                },
            });
        }
    }

    fn image_size(&self, image: &RasterImage, print_width: f32) -> (f32, f32) {
        let width = image.width as f32 * print_width / BROWSER_WIDTH;
        let height = if image.width == 0 {
            0.0
        } else {
            width * image.height as f32 / image.width as f32
        };
        (width, height)
    }

    /// Add headers and footers to every page and record their font.
    pub fn decorate(&self, pagination: &mut Pagination, progress: &mut dyn ProgressSink) {
        pagination
            .fonts
            .mark(self.config.head_foot_font, self.config.head_foot_style);

        let mut added = 0usize;
        for index in 0..pagination.pages.len() {
            let prims = self.page_primitives(pagination, index);
            added += prims.len();
            for prim in prims {
                pagination.pages.add(prim, progress);
            }
        }
        log::debug!("Added {} header/footer primitives", added);
    }
}

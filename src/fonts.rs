//! Typefaces, font metrics provider and the font-usage table.
//!
//! Text is set in the standard Type 1 families. Width measurement is an
//! external concern: callers supply a [`FontMetrics`] implementation that
//! matches the measurements already recorded on the document tree.

use serde::{Deserialize, Serialize};

/// Standard typeface families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Typeface {
    /// Courier (fixed pitch)
    Courier,
    /// Times (serif)
    #[default]
    Times,
    /// Helvetica (sans serif)
    Helvetica,
    /// Symbol (Greek and math glyphs, list bullets)
    Symbol,
    /// ZapfDingbats
    Dingbats,
}

/// Font style within a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum FontStyle {
    /// Regular
    #[default]
    Normal,
    /// Bold
    Bold,
    /// Italic or oblique
    Italic,
    /// Bold italic or bold oblique
    BoldItalic,
}

impl FontStyle {
    /// Combine bold/italic flags into a style.
    pub fn from_flags(bold: bool, italic: bool) -> Self {
        match (bold, italic) {
            (false, false) => FontStyle::Normal,
            (true, false) => FontStyle::Bold,
            (false, true) => FontStyle::Italic,
            (true, true) => FontStyle::BoldItalic,
        }
    }
}

/// PostScript base font name for a typeface/style pair.
pub fn base_font_name(typeface: Typeface, style: FontStyle) -> &'static str {
    match (typeface, style) {
        (Typeface::Courier, FontStyle::Normal) => "Courier",
        (Typeface::Courier, FontStyle::Bold) => "Courier-Bold",
        (Typeface::Courier, FontStyle::Italic) => "Courier-Oblique",
        (Typeface::Courier, FontStyle::BoldItalic) => "Courier-BoldOblique",
        (Typeface::Times, FontStyle::Normal) => "Times-Roman",
        (Typeface::Times, FontStyle::Bold) => "Times-Bold",
        (Typeface::Times, FontStyle::Italic) => "Times-Italic",
        (Typeface::Times, FontStyle::BoldItalic) => "Times-BoldItalic",
        (Typeface::Helvetica, FontStyle::Normal) => "Helvetica",
        (Typeface::Helvetica, FontStyle::Bold) => "Helvetica-Bold",
        (Typeface::Helvetica, FontStyle::Italic) => "Helvetica-Oblique",
        (Typeface::Helvetica, FontStyle::BoldItalic) => "Helvetica-BoldOblique",
        (Typeface::Symbol, _) => "Symbol",
        (Typeface::Dingbats, _) => "ZapfDingbats",
    }
}

/// Width measurement for text runs.
///
/// Layout only measures strings it synthesizes itself (spaces, list labels,
/// header/footer text, TOC page numbers); document text arrives pre-measured.
pub trait FontMetrics {
    /// Advance width of `text` in points.
    fn text_width(&self, text: &str, typeface: Typeface, style: FontStyle, size: f32) -> f32;
}

/// Metrics with a constant advance per character.
///
/// Useful for tests and for callers without real metrics. Courier uses
/// its true 0.6 em advance; other faces use `average_em`.
#[derive(Debug, Clone, Copy)]
pub struct FixedMetrics {
    /// Average advance for proportional faces, in em
    pub average_em: f32,
}

impl Default for FixedMetrics {
    fn default() -> Self {
        Self { average_em: 0.5 }
    }
}

impl FontMetrics for FixedMetrics {
    fn text_width(&self, text: &str, typeface: Typeface, _style: FontStyle, size: f32) -> f32 {
        let em = match typeface {
            Typeface::Courier => 0.6,
            _ => self.average_em,
        };
        text.chars().count() as f32 * em * size
    }
}

/// Source of Type 1 font programs for embedding.
pub trait FontProgramSource {
    /// Font program (PFA or PFB bytes) for a base font name, if available.
    fn font_program(&self, base_font: &str) -> Option<Vec<u8>>;
}

/// Record of which fonts the laid-out pages reference.
///
/// Resource names are assigned in first-use order ("F0", "F1", ...), so the
/// serializers produce stable output for identical input.
#[derive(Debug, Clone, Default)]
pub struct FontUsage {
    used: indexmap::IndexSet<(Typeface, FontStyle)>,
}

impl FontUsage {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a font as used and return its resource index.
    pub fn mark(&mut self, typeface: Typeface, style: FontStyle) -> usize {
        let style = match typeface {
            Typeface::Symbol | Typeface::Dingbats => FontStyle::Normal,
            _ => style,
        };
        self.used.insert_full((typeface, style)).0
    }

    /// Resource index of a font, if it was used.
    pub fn index_of(&self, typeface: Typeface, style: FontStyle) -> Option<usize> {
        let style = match typeface {
            Typeface::Symbol | Typeface::Dingbats => FontStyle::Normal,
            _ => style,
        };
        self.used.get_index_of(&(typeface, style))
    }

    /// Iterate over used fonts in resource order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Typeface, FontStyle)> + '_ {
        self.used.iter().enumerate().map(|(i, (t, s))| (i, *t, *s))
    }

    /// Number of distinct fonts used.
    pub fn len(&self) -> usize {
        self.used.len()
    }

    /// Whether no font is used.
    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}

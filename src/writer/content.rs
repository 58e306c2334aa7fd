//! PDF content stream builder and text encoding.
//!
//! Builds PDF content streams containing graphics and text operators
//! according to PDF specification ISO 32000-1:2008 Section 8-9.

use super::sheet::{fmt_num, Matrix};
use crate::error::Result;
use crate::fonts::Typeface;
use crate::tree::Rgb;
use std::io::Write;

/// Characters in the 0x80..0x9F block of WinAnsiEncoding.
static WIN_ANSI_HIGH: phf::Map<char, u8> = phf::phf_map! {
    '€' => 0x80, '‚' => 0x82, 'ƒ' => 0x83, '„' => 0x84, '…' => 0x85,
    '†' => 0x86, '‡' => 0x87, 'ˆ' => 0x88, '‰' => 0x89, 'Š' => 0x8A,
    '‹' => 0x8B, 'Œ' => 0x8C, 'Ž' => 0x8E, '‘' => 0x91, '’' => 0x92,
    '“' => 0x93, '”' => 0x94, '•' => 0x95, '–' => 0x96, '—' => 0x97,
    '˜' => 0x98, '™' => 0x99, 'š' => 0x9A, '›' => 0x9B, 'œ' => 0x9C,
    'ž' => 0x9E, 'Ÿ' => 0x9F,
};

/// Codes in the built-in encoding of the Symbol font.
static SYMBOL_CODES: phf::Map<char, u8> = phf::phf_map! {
    '•' => 0xB7, '°' => 0xB0, '±' => 0xB1, '″' => 0xB2, '≥' => 0xB3,
    '×' => 0xB4, '∝' => 0xB5, '∂' => 0xB6, '÷' => 0xB8, '≠' => 0xB9,
    '≡' => 0xBA, '≈' => 0xBB, '…' => 0xBC, '≤' => 0xA3, '∞' => 0xA5,
    '←' => 0xAC, '↑' => 0xAD, '→' => 0xAE, '↓' => 0xAF, '′' => 0xA2,
    'α' => 0x61, 'β' => 0x62, 'χ' => 0x63, 'δ' => 0x64, 'ε' => 0x65,
    'φ' => 0x66, 'γ' => 0x67, 'η' => 0x68, 'ι' => 0x69, 'κ' => 0x6B,
    'λ' => 0x6C, 'μ' => 0x6D, 'ν' => 0x6E, 'ο' => 0x6F, 'π' => 0x70,
    'θ' => 0x71, 'ρ' => 0x72, 'σ' => 0x73, 'τ' => 0x74, 'υ' => 0x75,
    'ω' => 0x77, 'ξ' => 0x78, 'ψ' => 0x79, 'ζ' => 0x7A, 'Δ' => 0x44,
    'Σ' => 0x53, 'Ω' => 0x57, 'Π' => 0x50, 'Φ' => 0x46, 'Γ' => 0x47,
};

/// Codes in the built-in encoding of the ZapfDingbats font.
static DINGBAT_CODES: phf::Map<char, u8> = phf::phf_map! {
    '●' => 0x6C, '○' => 0x6D, '■' => 0x6E, '□' => 0x6F, '▲' => 0x73,
    '▼' => 0x74, '◆' => 0x75, '✓' => 0x33, '✔' => 0x34, '✗' => 0x37,
    '✘' => 0x38, '★' => 0x48, '☆' => 0x49, '➔' => 0xD4,
};

/// Encode text for a font of the given typeface.
///
/// Symbol and ZapfDingbats use their own built-in encodings; the other
/// faces are WinAnsi.
pub fn encode_text(text: &str, typeface: Typeface) -> Vec<u8> {
    let table = match typeface {
        Typeface::Symbol => &SYMBOL_CODES,
        Typeface::Dingbats => &DINGBAT_CODES,
        _ => return encode_win_ansi(text),
    };
    text.chars()
        .map(|c| match table.get(&c) {
            Some(code) => *code,
            None if c == ' ' || c == '\u{a0}' => b' ',
            None if c.is_ascii_graphic() => c as u8,
            None => b'?',
        })
        .collect()
}

/// Encode text for a WinAnsi-encoded Type 1 font.
///
/// Characters outside the encoding become `?`; a non-breaking space
/// becomes a plain space.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{a0}' => b' ',
            ' '..='~' => c as u8,
            '\u{a1}'..='\u{ff}' => c as u32 as u8,
            _ => WIN_ANSI_HIGH.get(&c).copied().unwrap_or(b'?'),
        })
        .collect()
}

/// Write bytes as the body of a literal string, without the parentheses.
///
/// With `seven_bit` set, bytes outside printable ASCII are written as
/// octal escapes.
pub fn write_escaped<W: Write>(w: &mut W, bytes: &[u8], seven_bit: bool) -> std::io::Result<()> {
    for &byte in bytes {
        match byte {
            b'(' => w.write_all(b"\\(")?,
            b')' => w.write_all(b"\\)")?,
            b'\\' => w.write_all(b"\\\\")?,
            b'\n' => w.write_all(b"\\n")?,
            b'\r' => w.write_all(b"\\r")?,
            b'\t' => w.write_all(b"\\t")?,
            0x20..=0x7E => w.write_all(&[byte])?,
            _ if seven_bit => write!(w, "\\{:03o}", byte)?,
            _ => w.write_all(&[byte])?,
        }
    }
    Ok(())
}

/// Operations that can be added to a content stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentStreamOp {
    /// Save graphics state (q)
    SaveState,
    /// Restore graphics state (Q)
    RestoreState,
    /// Concatenate a transformation matrix (cm)
    Transform(Matrix),
    /// Begin text object (BT)
    BeginText,
    /// End text object (ET)
    EndText,
    /// Set font resource and size (Tf)
    SetFont(String, f32),
    /// Move text position (Td)
    MoveText(f32, f32),
    /// Show text (Tj), already encoded
    ShowText(Vec<u8>),
    /// Set character spacing (Tc)
    SetCharacterSpacing(f32),
    /// Set fill color RGB (rg)
    SetFillColorRGB(f32, f32, f32),
    /// Set stroke color RGB (RG)
    SetStrokeColorRGB(f32, f32, f32),
    /// Set line width (w)
    SetLineWidth(f32),
    /// Rectangle (re)
    Rectangle(f32, f32, f32, f32),
    /// Stroke (S)
    Stroke,
    /// Fill (f)
    Fill,
    /// Paint XObject (Do)
    PaintXObject(String),
    /// Intersect the clip with the current path (W n)
    ClipPath,
}

/// Builder for PDF content streams.
///
/// Fill color and character spacing are tracked so repeated runs in the
/// same style do not repeat their state operators.
#[derive(Debug, Clone, Default)]
pub struct ContentStreamBuilder {
    operations: Vec<ContentStreamOp>,
    fill: Option<Rgb>,
    char_spacing: f32,
}

impl ContentStreamBuilder {
    /// Create an empty content stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw operation.
    pub fn op(&mut self, op: ContentStreamOp) -> &mut Self {
        self.operations.push(op);
        self
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether nothing has been added.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Save graphics state.
    pub fn save_state(&mut self) -> &mut Self {
        self.op(ContentStreamOp::SaveState)
    }

    /// Restore graphics state; forgets the tracked fill color.
    pub fn restore_state(&mut self) -> &mut Self {
        self.fill = None;
        self.op(ContentStreamOp::RestoreState)
    }

    /// Concatenate a matrix unless it is the identity.
    pub fn transform(&mut self, matrix: &Matrix) -> &mut Self {
        if !matrix.is_identity() {
            self.op(ContentStreamOp::Transform(*matrix));
        }
        self
    }

    /// Set the fill color if it changed.
    pub fn fill_color(&mut self, color: Rgb) -> &mut Self {
        if self.fill != Some(color) {
            self.fill = Some(color);
            self.op(ContentStreamOp::SetFillColorRGB(color.r, color.g, color.b));
        }
        self
    }

    /// Set the stroke color.
    pub fn stroke_color(&mut self, color: Rgb) -> &mut Self {
        self.op(ContentStreamOp::SetStrokeColorRGB(color.r, color.g, color.b))
    }

    /// Fill a rectangle.
    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgb) -> &mut Self {
        self.fill_color(color);
        self.op(ContentStreamOp::Rectangle(x, y, width, height));
        self.op(ContentStreamOp::Fill)
    }

    /// Stroke a rectangle outline.
    pub fn stroke_rect(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Rgb,
        line_width: f32,
    ) -> &mut Self {
        self.stroke_color(color);
        self.op(ContentStreamOp::SetLineWidth(line_width));
        self.op(ContentStreamOp::Rectangle(x, y, width, height));
        self.op(ContentStreamOp::Stroke)
    }

    /// Clip to a rectangle (inside a saved state).
    pub fn clip_rect(&mut self, x: f32, y: f32, width: f32, height: f32) -> &mut Self {
        self.op(ContentStreamOp::Rectangle(x, y, width, height));
        self.op(ContentStreamOp::ClipPath)
    }

    /// Show one run of encoded text at a baseline position.
    pub fn text(&mut self, font: &str, size: f32, x: f32, y: f32, text: Vec<u8>, char_spacing: f32) -> &mut Self {
        self.op(ContentStreamOp::BeginText);
        self.op(ContentStreamOp::SetFont(font.to_string(), size));
        if (char_spacing - self.char_spacing).abs() > f32::EPSILON {
            self.char_spacing = char_spacing;
            self.op(ContentStreamOp::SetCharacterSpacing(char_spacing));
        }
        self.op(ContentStreamOp::MoveText(x, y));
        self.op(ContentStreamOp::ShowText(text));
        self.op(ContentStreamOp::EndText)
    }

    /// Paint an image XObject into a rectangle.
    pub fn draw_image(&mut self, name: &str, x: f32, y: f32, width: f32, height: f32) -> &mut Self {
        self.save_state();
        self.op(ContentStreamOp::Transform(Matrix {
            a: width,
            b: 0.0,
            c: 0.0,
            d: height,
            e: x,
            f: y,
        }));
        self.op(ContentStreamOp::PaintXObject(name.to_string()));
        self.restore_state()
    }

    /// Build the content stream to bytes.
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        for op in &self.operations {
            self.write_op(&mut buf, op)?;
            writeln!(buf)?;
        }
        Ok(buf)
    }

    fn write_op<W: Write>(&self, w: &mut W, op: &ContentStreamOp) -> std::io::Result<()> {
        match op {
            ContentStreamOp::SaveState => write!(w, "q"),
            ContentStreamOp::RestoreState => write!(w, "Q"),
            ContentStreamOp::Transform(m) => write!(w, "{} cm", m.operands()),
            ContentStreamOp::BeginText => write!(w, "BT"),
            ContentStreamOp::EndText => write!(w, "ET"),
            ContentStreamOp::SetFont(name, size) => write!(w, "/{} {} Tf", name, fmt_num(*size)),
            ContentStreamOp::MoveText(tx, ty) => write!(w, "{} {} Td", fmt_num(*tx), fmt_num(*ty)),
            ContentStreamOp::ShowText(text) => {
                write!(w, "(")?;
                write_escaped(w, text, false)?;
                write!(w, ")Tj")
            },
            ContentStreamOp::SetCharacterSpacing(spacing) => write!(w, "{} Tc", fmt_num(*spacing)),
            ContentStreamOp::SetFillColorRGB(r, g, b) => {
                write!(w, "{} {} {} rg", fmt_num(*r), fmt_num(*g), fmt_num(*b))
            },
            ContentStreamOp::SetStrokeColorRGB(r, g, b) => {
                write!(w, "{} {} {} RG", fmt_num(*r), fmt_num(*g), fmt_num(*b))
            },
            ContentStreamOp::SetLineWidth(width) => write!(w, "{} w", fmt_num(*width)),
            ContentStreamOp::Rectangle(x, y, w_val, h) => write!(
                w,
                "{} {} {} {} re",
                fmt_num(*x),
                fmt_num(*y),
                fmt_num(*w_val),
                fmt_num(*h)
            ),
            ContentStreamOp::Stroke => write!(w, "S"),
            ContentStreamOp::Fill => write!(w, "f"),
            ContentStreamOp::PaintXObject(name) => write!(w, "/{} Do", name),
            ContentStreamOp::ClipPath => write!(w, "W n"),
        }
    }
}

//! PostScript serializer.
//!
//! Output follows the Document Structuring Conventions: a comment header,
//! a prolog of short procedures, a setup section that loads and re-encodes
//! fonts, then one `%%Page:` section per physical sheet. Binary image data
//! is always hex (level 1) or ASCII85 (level 2 and 3) encoded.

use super::content::{encode_text, write_escaped};
use super::filter::{deflate, Ascii85Writer, HexWriter};
use super::font_program::Type1Program;
use super::header_footer::BROWSER_WIDTH;
use super::image::{ImageColor, ImageEncoding, PreparedImage};
use super::pdf::mark_text_fonts;
use super::sheet::{background_tiles, fmt_num, media_size, page_matrix, sheet_count};
use crate::config::ExportConfig;
use crate::error::{Error, Result};
use crate::fonts::{base_font_name, FontProgramSource, Typeface};
use crate::layout::{Page, Pagination, Primitive, PrimitiveKind, Rect};
use crate::progress::{Diagnostic, DiagnosticKind, ProgressSink};
use crate::tree::{Document, Rgb};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::Write;

/// Glyph names for WinAnsi codes 128..=255.
const WIN_ANSI_HIGH: [&str; 128] = [
    "Euro", ".notdef", "quotesinglbase", "florin", "quotedblbase", "ellipsis", "dagger", "daggerdbl",
    "circumflex", "perthousand", "Scaron", "guilsinglleft", "OE", ".notdef", "Zcaron", ".notdef",
    ".notdef", "quoteleft", "quoteright", "quotedblleft", "quotedblright", "bullet", "endash", "emdash",
    "tilde", "trademark", "scaron", "guilsinglright", "oe", ".notdef", "zcaron", "Ydieresis",
    "space", "exclamdown", "cent", "sterling", "currency", "yen", "brokenbar", "section",
    "dieresis", "copyright", "ordfeminine", "guillemotleft", "logicalnot", "hyphen", "registered", "macron",
    "degree", "plusminus", "twosuperior", "threesuperior", "acute", "mu", "paragraph", "periodcentered",
    "cedilla", "onesuperior", "ordmasculine", "guillemotright", "onequarter", "onehalf", "threequarters", "questiondown",
    "Agrave", "Aacute", "Acircumflex", "Atilde", "Adieresis", "Aring", "AE", "Ccedilla",
    "Egrave", "Eacute", "Ecircumflex", "Edieresis", "Igrave", "Iacute", "Icircumflex", "Idieresis",
    "Eth", "Ntilde", "Ograve", "Oacute", "Ocircumflex", "Otilde", "Odieresis", "multiply",
    "Oslash", "Ugrave", "Uacute", "Ucircumflex", "Udieresis", "Yacute", "Thorn", "germandbls",
    "agrave", "aacute", "acircumflex", "atilde", "adieresis", "aring", "ae", "ccedilla",
    "egrave", "eacute", "ecircumflex", "edieresis", "igrave", "iacute", "icircumflex", "idieresis",
    "eth", "ntilde", "ograve", "oacute", "ocircumflex", "otilde", "odieresis", "divide",
    "oslash", "ugrave", "uacute", "ucircumflex", "udieresis", "yacute", "thorn", "ydieresis",
];

const PROLOG: &str = "\
/BD{bind def}bind def
/RP{4 -2 roll moveto dup 0 exch rlineto exch 0 rlineto neg 0 exch rlineto closepath}BD
/B{RP stroke}BD
/F{RP fill}BD
/CL{RP clip newpath}BD
/C{setrgbcolor}BD
/CM{concat}BD
/GS{gsave}BD
/GR{grestore}BD
/L{lineto}BD
/M{moveto}BD
/S{show}BD
/SF{findfont exch scalefont setfont}BD
/SP{showpage}BD
/T{M S}BD
/RE{findfont begin currentdict dup length dict begin\
{1 index/FID ne{def}{pop pop}ifelse}forall/FontName exch def \
dup length 0 ne{/Encoding Encoding 256 array copy def 0 exch\
{dup type/nametype eq{Encoding 2 index 2 index put pop 1 add}{exch pop}ifelse}forall}if \
pop currentdict dup end end/FontName get exch definefont pop}BD
";

/// Media settings requested through `setpagedevice`.
#[derive(Debug, Clone, PartialEq)]
struct MediaState {
    size: (f32, f32),
    duplex: bool,
    tumble: bool,
    color: Option<String>,
    kind: Option<String>,
    position: u32,
}

impl MediaState {
    fn of(page: &Page) -> Self {
        Self {
            size: media_size(page),
            duplex: page.duplex,
            tumble: page.duplex && page.landscape,
            color: page.media_color.clone(),
            kind: page.media_type.clone(),
            position: page.media_position,
        }
    }

    fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        write!(
            out,
            "<</PageSize[{} {}]/Duplex {}/Tumble {}",
            fmt_num(self.size.0),
            fmt_num(self.size.1),
            self.duplex,
            self.tumble
        )?;
        if let Some(color) = &self.color {
            write!(out, "/MediaColor(")?;
            write_escaped(out, color.as_bytes(), true)?;
            write!(out, ")")?;
        }
        if let Some(kind) = &self.kind {
            write!(out, "/MediaType(")?;
            write_escaped(out, kind.as_bytes(), true)?;
            write!(out, ")")?;
        }
        if self.position > 0 {
            write!(out, "/MediaPosition {}", self.position)?;
        }
        writeln!(out, ">>setpagedevice")?;
        Ok(())
    }
}

/// Font and color last set inside the current graphics state.
#[derive(Debug, Default)]
struct DrawState {
    font: Option<(usize, f32)>,
    color: Option<Rgb>,
}

/// Writes a finished pagination as DSC PostScript.
pub struct PsWriter<'a> {
    config: &'a ExportConfig,
    doc: &'a Document,
    font_source: Option<&'a dyn FontProgramSource>,
    created: DateTime<Utc>,
}

impl<'a> PsWriter<'a> {
    /// Create a writer stamped with the current time.
    pub fn new(config: &'a ExportConfig, doc: &'a Document) -> Self {
        Self {
            config,
            doc,
            font_source: None,
            created: Utc::now(),
        }
    }

    /// Embed font programs from `source` when `embed_fonts` is set.
    pub fn with_font_source(mut self, source: &'a dyn FontProgramSource) -> Self {
        self.font_source = Some(source);
        self
    }

    /// Use a fixed creation date.
    pub fn with_creation_date(mut self, created: DateTime<Utc>) -> Self {
        self.created = created;
        self
    }

    fn level(&self) -> u8 {
        self.config.ps_level.clamp(1, 3)
    }

    /// Serialize `pagination`, draining its primitives, and write the file.
    pub fn write<W: Write>(
        &self,
        pagination: &mut Pagination,
        progress: &mut dyn ProgressSink,
        out: &mut W,
    ) -> Result<()> {
        mark_text_fonts(pagination);
        let images = self.prepare_images()?;
        let mut drained: Vec<Vec<Primitive>> = pagination.pages.iter_mut().map(Page::take_primitives).collect();
        let pagination: &Pagination = pagination;

        let nup = self.config.nup.max(1) as usize;
        let total = pagination.page_count();
        let sheets = sheet_count(total, nup as u8);
        let first = pagination
            .page_order
            .first()
            .and_then(|&i| pagination.pages.get(i))
            .unwrap_or_else(|| pagination.pages.template());
        let (media_width, media_length) = media_size(first);

        let embedded = self.load_fonts(pagination);
        let mut buf: Vec<u8> = Vec::new();

        // Header comments.
        writeln!(buf, "%!PS-Adobe-3.0")?;
        writeln!(buf, "%%BoundingBox: 0 0 {} {}", media_width.round() as i64, media_length.round() as i64)?;
        writeln!(buf, "%%LanguageLevel: {}", self.level())?;
        writeln!(buf, "%%Creator: printflow {}", env!("CARGO_PKG_VERSION"))?;
        writeln!(buf, "%%CreationDate: {}", self.created.format("D:%Y%m%d%H%M%SZ"))?;
        if let Some(title) = &self.doc.title {
            write!(buf, "%%Title: (")?;
            write_escaped(&mut buf, &encode_text(title, Typeface::Times), true)?;
            writeln!(buf, ")")?;
        }
        writeln!(buf, "%%Pages: {}", sheets)?;
        self.write_resource_list(&mut buf, "%%DocumentNeededResources:", pagination, &embedded, false)?;
        self.write_resource_list(&mut buf, "%%DocumentSuppliedResources:", pagination, &embedded, true)?;
        writeln!(buf, "%%DocumentData: Clean7Bit")?;
        writeln!(buf, "%%EndComments")?;

        writeln!(buf, "%%BeginProlog")?;
        buf.extend_from_slice(PROLOG.as_bytes());
        writeln!(buf, "%%EndProlog")?;

        writeln!(buf, "%%BeginSetup")?;
        for (index, typeface, style) in pagination.fonts.iter() {
            let base = base_font_name(typeface, style);
            match embedded.get(base) {
                Some(program) => {
                    writeln!(buf, "%%BeginResource: font {}", base)?;
                    buf.extend_from_slice(&program.to_pfa());
                    writeln!(buf, "%%EndResource")?;
                },
                None => writeln!(buf, "%%IncludeResource: font {}", base)?,
            }
            if matches!(typeface, Typeface::Symbol | Typeface::Dingbats) {
                writeln!(buf, "[]/F{}/{} RE", index, base)?;
            } else {
                writeln!(buf, "{}/F{}/{} RE", win_ansi_vector(), index, base)?;
            }
        }
        writeln!(buf, "%%EndSetup")?;

        let mut media: Option<MediaState> = None;
        for sheet in 0..sheets {
            progress.show(&format!("Writing page {}", sheet + 1));
            let slots = sheet * nup..((sheet + 1) * nup).min(total);
            let first_index = pagination.page_order[slots.start];
            let sheet_page = pagination
                .pages
                .get(first_index)
                .ok_or_else(|| Error::InternalState(format!("page {} missing from store", first_index)))?;

            writeln!(buf, "%%Page: {} {}", sheet + 1, sheet + 1)?;
            if self.level() >= 2 {
                let wanted = MediaState::of(sheet_page);
                if media.as_ref() != Some(&wanted) {
                    writeln!(buf, "%%BeginPageSetup")?;
                    wanted.write(&mut buf)?;
                    writeln!(buf, "%%EndPageSetup")?;
                    media = Some(wanted);
                }
            }

            writeln!(buf, "GS")?;
            for output_index in slots {
                let index = pagination.page_order[output_index];
                let (Some(page), Some(prims)) = (pagination.pages.get(index), drained.get_mut(index)) else {
                    continue;
                };
                writeln!(buf, "GS")?;
                let matrix = page_matrix(page, output_index);
                if !matrix.is_identity() {
                    writeln!(buf, "[{}]CM", matrix.operands())?;
                }
                let mut state = DrawState::default();
                for prim in std::mem::take(prims) {
                    self.draw(&mut buf, &mut state, page, &prim, pagination, &images, progress)?;
                }
                writeln!(buf, "GR")?;
            }
            writeln!(buf, "GR")?;
            writeln!(buf, "SP")?;
        }

        writeln!(buf, "%%Trailer")?;
        writeln!(buf, "%%EOF")?;

        log::info!("Wrote PostScript level {}: {} pages, {} bytes", self.level(), sheets, buf.len());
        out.write_all(&buf)?;
        out.flush()?;
        Ok(())
    }

    /// Font programs available for embedding, by base font name.
    fn load_fonts(&self, pagination: &Pagination) -> HashMap<&'static str, Type1Program> {
        let mut programs = HashMap::new();
        let Some(source) = self.font_source.filter(|_| self.config.embed_fonts) else {
            return programs;
        };
        for (_, typeface, style) in pagination.fonts.iter() {
            let base = base_font_name(typeface, style);
            match source.font_program(base).map(|data| Type1Program::parse(&data)) {
                Some(Ok(program)) => {
                    programs.insert(base, program);
                },
                Some(Err(e)) => log::warn!("Not embedding {}: {}", base, e),
                None => {},
            }
        }
        programs
    }

    fn write_resource_list(
        &self,
        buf: &mut Vec<u8>,
        comment: &str,
        pagination: &Pagination,
        embedded: &HashMap<&'static str, Type1Program>,
        supplied: bool,
    ) -> Result<()> {
        let names: Vec<&str> = pagination
            .fonts
            .iter()
            .map(|(_, typeface, style)| base_font_name(typeface, style))
            .filter(|base| embedded.contains_key(base) == supplied)
            .collect();
        let Some((first, rest)) = names.split_first() else {
            return Ok(());
        };
        writeln!(buf, "{} font {}", comment, first)?;
        for name in rest {
            writeln!(buf, "%%+ font {}", name)?;
        }
        Ok(())
    }

    /// Prepare every image once; level 1 gets neither palettes nor JPEG.
    fn prepare_images(&self) -> Result<HashMap<&'a str, PreparedImage>> {
        let level = self.level();
        let quality = if level >= 2 { self.config.jpeg_quality } else { 0 };
        let doc: &'a Document = self.doc;
        let mut prepared = HashMap::with_capacity(doc.images.len());
        for (src, raster) in &doc.images {
            prepared.insert(src.as_str(), PreparedImage::prepare(raster, level >= 2, quality)?);
        }
        Ok(prepared)
    }

    #[allow(clippy::too_many_arguments)]
    fn draw(
        &self,
        buf: &mut Vec<u8>,
        state: &mut DrawState,
        page: &Page,
        prim: &Primitive,
        pagination: &Pagination,
        images: &HashMap<&str, PreparedImage>,
        progress: &mut dyn ProgressSink,
    ) -> Result<()> {
        let r = &prim.rect;
        match &prim.kind {
            PrimitiveKind::Text {
                text,
                typeface,
                font_style,
                size,
                color,
                char_spacing,
            } => {
                let Some(index) = pagination.fonts.index_of(*typeface, *font_style) else {
                    progress.report(Diagnostic::new(
                        DiagnosticKind::Internal,
                        format!("font {:?} {:?} was never registered", typeface, font_style),
                    ));
                    return Ok(());
                };
                set_color(buf, state, *color)?;
                if state.font != Some((index, *size)) {
                    writeln!(buf, "{}/F{} SF", fmt_num(*size), index)?;
                    state.font = Some((index, *size));
                }
                write!(buf, "(")?;
                write_escaped(buf, &encode_text(text, *typeface), true)?;
                if char_spacing.abs() > f32::EPSILON {
                    writeln!(
                        buf,
                        "){} {} M {} 0 3 -1 roll ashow",
                        fmt_num(r.x),
                        fmt_num(prim.baseline()),
                        fmt_num(*char_spacing)
                    )?;
                } else {
                    writeln!(buf, "){} {} T", fmt_num(r.x), fmt_num(prim.baseline()))?;
                }
            },
            PrimitiveKind::Image { src } => {
                if let Some(image) = images.get(src.as_str()) {
                    self.write_image(buf, image, r)?;
                }
            },
            PrimitiveKind::Box { color, line_width } => {
                set_color(buf, state, *color)?;
                writeln!(buf, "{} setlinewidth", fmt_num(*line_width))?;
                writeln!(buf, "{} B", rect_operands(r))?;
            },
            PrimitiveKind::FilledBox { color } => {
                set_color(buf, state, *color)?;
                writeln!(buf, "{} F", rect_operands(r))?;
            },
            PrimitiveKind::Link { .. } => {},
            PrimitiveKind::Background { color, image } => {
                if let Some(color) = color {
                    set_color(buf, state, *color)?;
                    writeln!(buf, "{} F", rect_operands(r))?;
                }
                let tiled = image.as_ref().and_then(|src| {
                    let prepared = images.get(src.as_str())?;
                    let raster = self.doc.images.get(src)?;
                    Some((prepared, raster))
                });
                if let Some((prepared, raster)) = tiled {
                    let tile_width = raster.width as f32 * page.print_width() / BROWSER_WIDTH;
                    writeln!(buf, "GS {} CL", rect_operands(r))?;
                    for tile in background_tiles(r, raster, tile_width) {
                        self.write_image(buf, prepared, &tile)?;
                    }
                    writeln!(buf, "GR")?;
                    // Color was set inside the saved state.
                    state.color = None;
                    state.font = None;
                }
            },
        }
        Ok(())
    }

    fn write_image(&self, buf: &mut Vec<u8>, image: &PreparedImage, r: &Rect) -> Result<()> {
        writeln!(
            buf,
            "GS {} {} translate {} {} scale",
            fmt_num(r.x),
            fmt_num(r.y),
            fmt_num(r.width),
            fmt_num(r.height)
        )?;
        let (w, h) = (image.width, image.height);
        if self.level() == 1 {
            let components = match image.color {
                ImageColor::Gray => 1,
                _ => 3,
            };
            writeln!(buf, "/picstr {} string def", w as usize * components)?;
            write!(
                buf,
                "{} {} {} [{} 0 0 -{} 0 {}] {{currentfile picstr readhexstring pop}} ",
                w, h, image.bits_per_component, w, h, h
            )?;
            if components == 1 {
                writeln!(buf, "image")?;
            } else {
                writeln!(buf, "false 3 colorimage")?;
            }
            let mut hex = HexWriter::new(&mut *buf);
            hex.write_all(&image.data)?;
            hex.finish()?;
            writeln!(buf, "GR")?;
            return Ok(());
        }

        let decode = match &image.color {
            ImageColor::Gray => {
                writeln!(buf, "/DeviceGray setcolorspace")?;
                "0 1".to_string()
            },
            ImageColor::Rgb => {
                writeln!(buf, "/DeviceRGB setcolorspace")?;
                "0 1 0 1 0 1".to_string()
            },
            ImageColor::Indexed { palette } => {
                writeln!(
                    buf,
                    "[/Indexed/DeviceRGB {} <{}>] setcolorspace",
                    palette.len() - 1,
                    image.palette_hex().unwrap_or_default()
                )?;
                format!("0 {}", (1u32 << image.bits_per_component) - 1)
            },
        };
        let deflated = self.level() >= 3 && image.encoding == ImageEncoding::Raw;
        write!(
            buf,
            "<</ImageType 1/Width {}/Height {}/BitsPerComponent {}/Decode[{}]/ImageMatrix[{} 0 0 -{} 0 {}]\
             /DataSource currentfile/ASCII85Decode filter",
            w, h, image.bits_per_component, decode, w, h, h
        )?;
        if deflated {
            write!(buf, "/FlateDecode filter")?;
        }
        if image.encoding == ImageEncoding::Jpeg {
            write!(buf, "/DCTDecode filter")?;
        }
        writeln!(buf, ">>image")?;

        let data = if deflated {
            deflate(&image.data, self.config.compression.max(1))?
        } else {
            image.data.clone()
        };
        let mut a85 = Ascii85Writer::new(&mut *buf);
        a85.write_all(&data)?;
        a85.finish()?;
        writeln!(buf, "GR")?;
        Ok(())
    }
}

fn set_color(buf: &mut Vec<u8>, state: &mut DrawState, color: Rgb) -> Result<()> {
    if state.color != Some(color) {
        writeln!(buf, "{} {} {} C", fmt_num(color.r), fmt_num(color.g), fmt_num(color.b))?;
        state.color = Some(color);
    }
    Ok(())
}

fn rect_operands(r: &Rect) -> String {
    format!("{} {} {} {}", fmt_num(r.x), fmt_num(r.y), fmt_num(r.width), fmt_num(r.height))
}

/// Encoding differences from StandardEncoding that give WinAnsi.
fn win_ansi_vector() -> String {
    let mut out = String::from("[39/quotesingle 96/grave 128");
    for name in WIN_ANSI_HIGH {
        out.push('/');
        out.push_str(name);
    }
    out.push(']');
    out
}

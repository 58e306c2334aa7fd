//! PDF serializer.
//!
//! Object numbers are planned before anything is written, in this order:
//!
//! 1. catalog, page tree, info, optional encryption dictionary
//! 2. fonts (with descriptor and font file when embedded)
//! 3. image XObjects
//! 4. per sheet: page, content stream, link annotations
//! 5. outline root and items
//! 6. named destinations
//!
//! The file is assembled in memory so stream lengths can be patched in
//! place, then copied to the output in one write.

use super::content::{encode_text, ContentStreamBuilder};
use super::filter::write_filtered;
use super::font_program::{font_descriptor, Type1Program};
use super::header_footer::BROWSER_WIDTH;
use super::image::{indexed_allowed, ImageEncoding, ImageManager, PreparedImage};
use super::object_serializer::ObjectSerializer;
use super::outline::{OutlineBuilder, OutlineItem};
use super::sheet::{background_tiles, media_size, page_matrix, sheet_count};
use super::xref::{patch_length, write_trailer, ObjectAllocator, TrailerRefs};
use crate::config::{ExportConfig, FirstPage, PageLayout, PageMode};
use crate::encryption::{self, algorithms::compute_file_id, EncryptionWriteHandler};
use crate::error::{Error, Result};
use crate::fonts::{base_font_name, FontProgramSource, FontStyle, FontUsage, Typeface};
use crate::layout::{LinkTarget, Page, Pagination, Primitive, PrimitiveKind, Rect, Section};
use crate::object::Object;
use crate::progress::{Diagnostic, DiagnosticKind, ProgressSink};
use crate::tree::Document;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::Write;

/// Where a link annotation goes.
#[derive(Debug, Clone, PartialEq)]
enum AnnotTarget {
    /// Page index and page-local Y
    Page(usize, f32),
    /// External URI
    Uri(String),
}

#[derive(Debug)]
struct SheetPlan {
    page_id: u32,
    contents_id: u32,
    /// Output indices of the logical pages on this sheet
    slots: std::ops::Range<usize>,
    annots: Vec<(u32, Rect, AnnotTarget)>,
}

#[derive(Debug)]
struct FontPlan {
    resource: String,
    typeface: Typeface,
    style: FontStyle,
    font_id: u32,
    /// Descriptor id, font file id and program
    embedded: Option<(u32, u32, Type1Program)>,
}

#[derive(Debug)]
struct ImagePlan {
    id: u32,
    image: PreparedImage,
}

/// Shared inputs for writing one sheet.
struct SheetContext<'p> {
    pagination: &'p Pagination,
    pages_id: u32,
    resources: &'p Object,
    images: &'p ImageManager,
    handler: Option<&'p EncryptionWriteHandler>,
}

/// Writes a finished pagination as a PDF file.
pub struct PdfWriter<'a> {
    config: &'a ExportConfig,
    doc: &'a Document,
    font_source: Option<&'a dyn FontProgramSource>,
    serializer: ObjectSerializer,
    created: DateTime<Utc>,
}

impl<'a> PdfWriter<'a> {
    /// Create a writer stamped with the current time.
    pub fn new(config: &'a ExportConfig, doc: &'a Document) -> Self {
        Self {
            config,
            doc,
            font_source: None,
            serializer: ObjectSerializer::compact(),
            created: Utc::now(),
        }
    }

    /// Embed font programs from `source` when `embed_fonts` is set.
    pub fn with_font_source(mut self, source: &'a dyn FontProgramSource) -> Self {
        self.font_source = Some(source);
        self
    }

    /// Use a fixed creation date (and therefore a fixed file id).
    pub fn with_creation_date(mut self, created: DateTime<Utc>) -> Self {
        self.created = created;
        self
    }

    fn compression(&self) -> u32 {
        if self.config.pdf_version_number() >= 12 {
            self.config.compression
        } else {
            0
        }
    }

    /// Serialize `pagination`, draining its primitives, and write the file.
    pub fn write<W: Write>(
        &self,
        pagination: &mut Pagination,
        progress: &mut dyn ProgressSink,
        out: &mut W,
    ) -> Result<()> {
        let title = self.doc.title.as_deref().unwrap_or_default();
        let file_id = compute_file_id(title, self.created.timestamp(), pagination.page_count());
        let encryption = match &self.config.encryption {
            Some(enc) => Some(encryption::setup(enc, &file_id)?),
            None => None,
        };
        let handler = encryption.as_ref().map(|(_, h)| h);

        mark_text_fonts(pagination);

        // Plan object numbers.
        let mut xref = ObjectAllocator::new();
        let catalog_id = xref.alloc()?;
        let pages_id = xref.alloc()?;
        let info_id = xref.alloc()?;
        let encrypt_id = match encryption {
            Some(_) => Some(xref.alloc()?),
            None => None,
        };
        let fonts = self.plan_fonts(&pagination.fonts, &mut xref)?;
        let (images, image_plans) = self.plan_images(pagination, &mut xref)?;
        let sheets = self.plan_sheets(pagination, &mut xref)?;

        let outline = if self.config.toc_levels > 0 && !pagination.headings.is_empty() {
            let contents = pagination.pages.get(pagination.toc_pages.start).and_then(|page| {
                (!pagination.toc_pages.is_empty()).then(|| {
                    OutlineItem::new(
                        self.config.toc_title.clone(),
                        pagination.toc_pages.start,
                        page.print_length(),
                        0,
                    )
                })
            });
            let builder = OutlineBuilder::from_headings(&pagination.headings, self.config.toc_levels, contents);
            let first = xref.alloc_many(builder.object_count())?;
            (!builder.is_empty()).then_some((first, builder))
        } else {
            None
        };

        let names = if self.config.pdf_version_number() >= 12 && !pagination.links.is_empty() {
            Some((xref.alloc()?, xref.alloc()?))
        } else {
            None
        };
        log::debug!(
            "Planned {} objects for {} sheets, {} fonts, {} images",
            xref.len(),
            sheets.len(),
            fonts.len(),
            image_plans.len()
        );

        // Geometry is all that is read from here on.
        let mut drained: Vec<Vec<Primitive>> = pagination.pages.iter_mut().map(Page::take_primitives).collect();
        let pagination: &Pagination = pagination;
        let dest = |page: usize, y: f32| destination(pagination, &sheets, page, y);

        // Emit.
        let mut buf: Vec<u8> = Vec::new();
        writeln!(buf, "%PDF-{}", self.config.pdf_version)?;
        buf.extend_from_slice(b"%\xe2\xe3\xcf\xd3\n");

        let catalog = self.catalog(pagination, &sheets, pages_id, outline.as_ref().map(|o| o.0), names.map(|n| n.0));
        self.emit(&mut buf, &mut xref, catalog_id, &catalog, handler)?;

        let kids = sheets.iter().map(|s| ObjectSerializer::reference(s.page_id)).collect();
        let page_tree = ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("Pages")),
            ("Count", ObjectSerializer::integer(sheets.len() as i64)),
            ("Kids", ObjectSerializer::array(kids)),
        ]);
        self.emit(&mut buf, &mut xref, pages_id, &page_tree, handler)?;
        self.emit(&mut buf, &mut xref, info_id, &self.info(), handler)?;
        if let (Some(id), Some((dict, _))) = (encrypt_id, &encryption) {
            // The encryption dictionary itself is never encrypted.
            self.emit(&mut buf, &mut xref, id, &dict.to_object(), None)?;
        }

        for font in &fonts {
            self.write_font(&mut buf, &mut xref, font, handler)?;
        }
        for plan in &image_plans {
            let deflate = plan.image.encoding == ImageEncoding::Raw && self.compression() > 0;
            let dict = plan.image.build_xobject_dict(deflate);
            let level = if deflate { self.compression() } else { 0 };
            self.emit_stream(&mut buf, &mut xref, plan.id, &dict, &plan.image.data, level, handler)?;
        }

        let resources = self.resources(&fonts, &images, &image_plans);
        for (n, sheet) in sheets.iter().enumerate() {
            progress.show(&format!("Writing page {}", n + 1));
            let ctx = SheetContext {
                pagination,
                pages_id,
                resources: &resources,
                images: &images,
                handler,
            };
            self.write_sheet(&mut buf, &mut xref, &ctx, sheet, &mut drained, &dest, progress)?;
        }

        if let Some((root_id, builder)) = &outline {
            if let Some(result) = builder.build(*root_id, &dest) {
                for (id, obj) in result.into_sorted() {
                    self.emit(&mut buf, &mut xref, id, &obj, handler)?;
                }
            }
        }

        if let Some((names_id, dests_id)) = names {
            let names_dict = ObjectSerializer::dict(vec![("Dests", ObjectSerializer::reference(dests_id))]);
            self.emit(&mut buf, &mut xref, names_id, &names_dict, handler)?;
            let mut entries = Vec::new();
            for link in pagination.links.links() {
                if let Some(d) = dest(link.page, link.y) {
                    entries.push(Object::String(link.name.to_ascii_lowercase().into_bytes()));
                    entries.push(d);
                }
            }
            let leaf = ObjectSerializer::dict(vec![("Names", ObjectSerializer::array(entries))]);
            self.emit(&mut buf, &mut xref, dests_id, &leaf, handler)?;
        }

        let xref_start = buf.len();
        xref.write_xref(&mut buf)?;
        let refs = TrailerRefs {
            root: catalog_id,
            info: info_id,
            encrypt: encrypt_id,
        };
        write_trailer(&mut buf, xref.size(), refs, &file_id, xref_start)?;

        log::info!("Wrote PDF: {} pages, {} bytes", sheets.len(), buf.len());
        out.write_all(&buf)?;
        out.flush()?;
        Ok(())
    }

    fn emit(
        &self,
        buf: &mut Vec<u8>,
        xref: &mut ObjectAllocator,
        id: u32,
        obj: &Object,
        handler: Option<&EncryptionWriteHandler>,
    ) -> Result<()> {
        xref.begin(id, buf.len())?;
        self.serializer.write_indirect(buf, id, obj, handler)?;
        Ok(())
    }

    /// Write a stream object; `level` 0 stores the data without deflate.
    #[allow(clippy::too_many_arguments)]
    fn emit_stream(
        &self,
        buf: &mut Vec<u8>,
        xref: &mut ObjectAllocator,
        id: u32,
        dict: &Object,
        data: &[u8],
        level: u32,
        handler: Option<&EncryptionWriteHandler>,
    ) -> Result<()> {
        xref.begin(id, buf.len())?;
        let placeholder = self.serializer.begin_stream(buf, id, dict, handler)?;
        let start = buf.len();
        write_filtered(&mut *buf, data, level, handler.map(|h| h.stream_cipher(id)))?;
        let length = buf.len() - start;
        self.serializer.end_stream(buf)?;
        patch_length(buf, placeholder, length)?;
        Ok(())
    }

    fn plan_fonts(&self, usage: &FontUsage, xref: &mut ObjectAllocator) -> Result<Vec<FontPlan>> {
        let mut plans = Vec::with_capacity(usage.len());
        for (index, typeface, style) in usage.iter() {
            let font_id = xref.alloc()?;
            let base = base_font_name(typeface, style);
            let program = match self.font_source {
                Some(source) if self.config.embed_fonts => source.font_program(base),
                _ => None,
            };
            let embedded = match program.map(|data| Type1Program::parse(&data)) {
                Some(Ok(program)) => Some((xref.alloc()?, xref.alloc()?, program)),
                Some(Err(e)) => {
                    log::warn!("Not embedding {}: {}", base, e);
                    None
                },
                None => None,
            };
            plans.push(FontPlan {
                resource: format!("F{}", index),
                typeface,
                style,
                font_id,
                embedded,
            });
        }
        Ok(plans)
    }

    fn plan_images(
        &self,
        pagination: &Pagination,
        xref: &mut ObjectAllocator,
    ) -> Result<(ImageManager, Vec<ImagePlan>)> {
        let mut manager = ImageManager::new();
        for &index in &pagination.page_order {
            let Some(page) = pagination.pages.get(index) else {
                continue;
            };
            for prim in page.primitives() {
                let src = match &prim.kind {
                    PrimitiveKind::Image { src } => Some(src),
                    PrimitiveKind::Background { image, .. } => image.as_ref(),
                    _ => None,
                };
                if let Some(src) = src.filter(|s| self.doc.images.contains_key(s.as_str())) {
                    manager.register(src);
                }
            }
        }

        let allow_indexed = indexed_allowed(self.config);
        let mut plans = Vec::with_capacity(manager.len());
        for (src, _) in manager.iter() {
            let Some(raster) = self.doc.images.get(src) else {
                continue;
            };
            let image = PreparedImage::prepare(raster, allow_indexed, self.config.jpeg_quality)?;
            plans.push(ImagePlan {
                id: xref.alloc()?,
                image,
            });
        }
        Ok((manager, plans))
    }

    fn plan_sheets(&self, pagination: &Pagination, xref: &mut ObjectAllocator) -> Result<Vec<SheetPlan>> {
        let nup = self.config.nup.max(1) as usize;
        let total = pagination.page_count();
        let mut sheets = Vec::with_capacity(sheet_count(total, nup as u8));

        for sheet in 0..sheet_count(total, nup as u8) {
            let slots = sheet * nup..((sheet + 1) * nup).min(total);
            let page_id = xref.alloc()?;
            let contents_id = xref.alloc()?;
            let mut annots = Vec::new();

            if self.config.links {
                for output_index in slots.clone() {
                    let index = pagination.page_order[output_index];
                    let Some(page) = pagination.pages.get(index) else {
                        continue;
                    };
                    let matrix = page_matrix(page, output_index);
                    for prim in page.primitives() {
                        let PrimitiveKind::Link { target } = &prim.kind else {
                            continue;
                        };
                        let Some(target) = resolve_target(pagination, target) else {
                            log::debug!("Dropping unresolved link {:?}", target);
                            continue;
                        };
                        annots.push((xref.alloc()?, matrix.apply_rect(&prim.rect), target));
                    }
                }
            }

            sheets.push(SheetPlan {
                page_id,
                contents_id,
                slots,
                annots,
            });
        }
        Ok(sheets)
    }

    fn catalog(
        &self,
        pagination: &Pagination,
        sheets: &[SheetPlan],
        pages_id: u32,
        outline: Option<u32>,
        names: Option<u32>,
    ) -> Object {
        let mode = match self.config.page_mode {
            PageMode::Document => "UseNone",
            PageMode::Outline if outline.is_some() => "UseOutlines",
            PageMode::Outline => "UseNone",
            PageMode::FullScreen => "FullScreen",
        };
        let mut entries = vec![
            ("Type", ObjectSerializer::name("Catalog")),
            ("Pages", ObjectSerializer::reference(pages_id)),
            ("PageMode", ObjectSerializer::name(mode)),
        ];

        if self.config.pdf_version_number() >= 12 {
            let layout = match self.config.page_layout {
                PageLayout::Single => "SinglePage",
                PageLayout::OneColumn => "OneColumn",
                PageLayout::TwoColumnLeft => "TwoColumnLeft",
                PageLayout::TwoColumnRight => "TwoColumnRight",
            };
            entries.push(("PageLayout", ObjectSerializer::name(layout)));
        }
        if let Some(id) = outline {
            entries.push(("Outlines", ObjectSerializer::reference(id)));
        }
        if let Some(id) = names {
            entries.push(("Names", ObjectSerializer::reference(id)));
        }

        let first_page = match self.config.first_page {
            FirstPage::Page1 => Some(0),
            FirstPage::Toc if !pagination.toc_pages.is_empty() => Some(pagination.toc_pages.start),
            FirstPage::Toc => None,
            FirstPage::Chapter1 => pagination.chapter_starts.get(1).copied(),
        };
        let open_sheet = match self.config.first_page {
            FirstPage::Page1 => Some(0),
            _ => first_page
                .and_then(|p| pagination.output_index(p))
                .map(|i| i / self.config.nup.max(1) as usize),
        };
        if let Some(sheet) = open_sheet.and_then(|s| sheets.get(s)) {
            entries.push((
                "OpenAction",
                ObjectSerializer::array(vec![
                    ObjectSerializer::reference(sheet.page_id),
                    ObjectSerializer::name("XYZ"),
                    Object::Null,
                    Object::Null,
                    ObjectSerializer::integer(0),
                ]),
            ));
        }

        if self.config.pdf_version_number() > 12 && self.config.nup <= 1 {
            entries.push(("PageLabels", page_labels(pagination)));
        }
        ObjectSerializer::dict(entries)
    }

    fn info(&self) -> Object {
        let producer = format!("printflow {}", env!("CARGO_PKG_VERSION"));
        let mut entries = vec![
            ("Producer", ObjectSerializer::string(&producer)),
            ("Creator", ObjectSerializer::string(&producer)),
            (
                "CreationDate",
                ObjectSerializer::string(&self.created.format("D:%Y%m%d%H%M%SZ").to_string()),
            ),
        ];
        let doc = self.doc;
        for (key, value) in [
            ("Title", &doc.title),
            ("Author", &doc.author),
            ("Subject", &doc.subject),
            ("Keywords", &doc.keywords),
        ] {
            if let Some(value) = value {
                entries.push((key, Object::String(encode_text(value, Typeface::Times))));
            }
        }
        ObjectSerializer::dict(entries)
    }

    fn write_font(
        &self,
        buf: &mut Vec<u8>,
        xref: &mut ObjectAllocator,
        font: &FontPlan,
        handler: Option<&EncryptionWriteHandler>,
    ) -> Result<()> {
        let base = base_font_name(font.typeface, font.style);
        let mut entries = vec![
            ("Type", ObjectSerializer::name("Font")),
            ("Subtype", ObjectSerializer::name("Type1")),
            ("BaseFont", ObjectSerializer::name(base)),
        ];
        if !matches!(font.typeface, Typeface::Symbol | Typeface::Dingbats) {
            entries.push(("Encoding", ObjectSerializer::name("WinAnsiEncoding")));
        }
        if let Some((descriptor_id, _, _)) = &font.embedded {
            entries.push(("FontDescriptor", ObjectSerializer::reference(*descriptor_id)));
        }
        self.emit(buf, xref, font.font_id, &ObjectSerializer::dict(entries), handler)?;

        if let Some((descriptor_id, file_id, program)) = &font.embedded {
            let descriptor = font_descriptor(base, font.typeface, font.style, *file_id);
            self.emit(buf, xref, *descriptor_id, &descriptor, handler)?;

            let level = self.compression();
            let mut file_entries = vec![
                ("Length1", ObjectSerializer::integer(program.clear.len() as i64)),
                ("Length2", ObjectSerializer::integer(program.binary.len() as i64)),
                ("Length3", ObjectSerializer::integer(program.trailer.len() as i64)),
            ];
            if level > 0 {
                file_entries.push(("Filter", ObjectSerializer::name("FlateDecode")));
            }
            let dict = ObjectSerializer::dict(file_entries);
            self.emit_stream(buf, xref, *file_id, &dict, &program.pdf_data(), level, handler)?;
        }
        Ok(())
    }

    fn resources(&self, fonts: &[FontPlan], images: &ImageManager, plans: &[ImagePlan]) -> Object {
        let font_dict = fonts
            .iter()
            .map(|f| (f.resource.clone(), ObjectSerializer::reference(f.font_id)))
            .collect::<HashMap<_, _>>();
        let mut entries = vec![
            (
                "ProcSet",
                ObjectSerializer::array(
                    ["PDF", "Text", "ImageB", "ImageC", "ImageI"]
                        .iter()
                        .map(|n| ObjectSerializer::name(n))
                        .collect(),
                ),
            ),
            ("Font", Object::Dictionary(font_dict)),
        ];
        if !plans.is_empty() {
            let xobjects = images
                .iter()
                .zip(plans)
                .map(|((_, resource), plan)| (resource.to_string(), ObjectSerializer::reference(plan.id)))
                .collect::<HashMap<_, _>>();
            entries.push(("XObject", Object::Dictionary(xobjects)));
        }
        ObjectSerializer::dict(entries)
    }

    fn write_sheet<F>(
        &self,
        buf: &mut Vec<u8>,
        xref: &mut ObjectAllocator,
        ctx: &SheetContext<'_>,
        sheet: &SheetPlan,
        drained: &mut [Vec<Primitive>],
        dest: &F,
        progress: &mut dyn ProgressSink,
    ) -> Result<()>
    where
        F: Fn(usize, f32) -> Option<Object>,
    {
        let pagination = ctx.pagination;
        let handler = ctx.handler;
        let first = pagination.page_order[sheet.slots.start];
        let first_page = pagination
            .pages
            .get(first)
            .ok_or_else(|| Error::InternalState(format!("page {} missing from store", first)))?;
        let (media_width, media_length) = media_size(first_page);

        let mut builder = ContentStreamBuilder::new();
        for output_index in sheet.slots.clone() {
            let index = pagination.page_order[output_index];
            let (Some(page), Some(prims)) = (pagination.pages.get(index), drained.get_mut(index)) else {
                continue;
            };
            builder.save_state();
            builder.transform(&page_matrix(page, output_index));
            for prim in std::mem::take(prims) {
                self.draw(&mut builder, page, &prim, &pagination.fonts, ctx.images, progress);
            }
            builder.restore_state();
        }

        let mut page_entries = vec![
            ("Type", ObjectSerializer::name("Page")),
            ("Parent", ObjectSerializer::reference(ctx.pages_id)),
            (
                "MediaBox",
                ObjectSerializer::rect(0.0, 0.0, media_width as f64, media_length as f64),
            ),
            ("Contents", ObjectSerializer::reference(sheet.contents_id)),
            ("Resources", ctx.resources.clone()),
        ];
        if first_page.landscape {
            page_entries.push(("Rotate", ObjectSerializer::integer(90)));
        }
        if !sheet.annots.is_empty() {
            let refs = sheet.annots.iter().map(|(id, _, _)| ObjectSerializer::reference(*id)).collect();
            page_entries.push(("Annots", ObjectSerializer::array(refs)));
        }
        self.emit(buf, xref, sheet.page_id, &ObjectSerializer::dict(page_entries), handler)?;

        let content = builder.build()?;
        let level = self.compression();
        let mut stream_entries = Vec::new();
        if level > 0 {
            stream_entries.push(("Filter", ObjectSerializer::name("FlateDecode")));
        }
        let dict = ObjectSerializer::dict(stream_entries);
        self.emit_stream(buf, xref, sheet.contents_id, &dict, &content, level, handler)?;

        for (id, rect, target) in &sheet.annots {
            let action = match target {
                AnnotTarget::Page(page, y) => match dest(*page, *y) {
                    Some(d) => ObjectSerializer::dict(vec![
                        ("S", ObjectSerializer::name("GoTo")),
                        ("D", d),
                    ]),
                    None => {
                        return Err(Error::InternalState(format!(
                            "link target page {} is not in the output",
                            page
                        )))
                    },
                },
                AnnotTarget::Uri(uri) => ObjectSerializer::dict(vec![
                    ("S", ObjectSerializer::name("URI")),
                    ("URI", ObjectSerializer::string(uri)),
                ]),
            };
            let annot = ObjectSerializer::dict(vec![
                ("Type", ObjectSerializer::name("Annot")),
                ("Subtype", ObjectSerializer::name("Link")),
                (
                    "Rect",
                    ObjectSerializer::rect(rect.x as f64, rect.y as f64, rect.width as f64, rect.height as f64),
                ),
                (
                    "Border",
                    ObjectSerializer::array(vec![
                        ObjectSerializer::integer(0),
                        ObjectSerializer::integer(0),
                        ObjectSerializer::integer(0),
                    ]),
                ),
                ("A", action),
            ]);
            self.emit(buf, xref, *id, &annot, handler)?;
        }
        Ok(())
    }

    fn draw(
        &self,
        builder: &mut ContentStreamBuilder,
        page: &Page,
        prim: &Primitive,
        fonts: &FontUsage,
        images: &ImageManager,
        progress: &mut dyn ProgressSink,
    ) {
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
                let Some(index) = fonts.index_of(*typeface, *font_style) else {
                    progress.report(Diagnostic::new(
                        DiagnosticKind::Internal,
                        format!("font {:?} {:?} was never registered", typeface, font_style),
                    ));
                    return;
                };
                builder.fill_color(*color);
                builder.text(
                    &format!("F{}", index),
                    *size,
                    r.x,
                    prim.baseline(),
                    encode_text(text, *typeface),
                    *char_spacing,
                );
            },
            PrimitiveKind::Image { src } => {
                if let Some(name) = images.resource_id(src) {
                    builder.draw_image(name, r.x, r.y, r.width, r.height);
                }
            },
            PrimitiveKind::Box { color, line_width } => {
                builder.stroke_rect(r.x, r.y, r.width, r.height, *color, *line_width);
            },
            PrimitiveKind::FilledBox { color } => {
                builder.fill_rect(r.x, r.y, r.width, r.height, *color);
            },
            PrimitiveKind::Link { .. } => {},
            PrimitiveKind::Background { color, image } => {
                if let Some(color) = color {
                    builder.fill_rect(r.x, r.y, r.width, r.height, *color);
                }
                let tiled = image.as_ref().and_then(|src| {
                    let name = images.resource_id(src)?;
                    let raster = self.doc.images.get(src)?;
                    Some((name, raster))
                });
                if let Some((name, raster)) = tiled {
                    let tile_width = raster.width as f32 * page.print_width() / BROWSER_WIDTH;
                    builder.save_state();
                    builder.clip_rect(r.x, r.y, r.width, r.height);
                    for tile in background_tiles(r, raster, tile_width) {
                        builder.draw_image(name, tile.x, tile.y, tile.width, tile.height);
                    }
                    builder.restore_state();
                }
            },
        }
    }
}

/// Mark every font a text primitive uses, so the font table is complete
/// before objects are numbered.
pub(crate) fn mark_text_fonts(pagination: &mut Pagination) {
    let Pagination { pages, fonts, .. } = pagination;
    for page in pages.iter() {
        for prim in page.primitives() {
            if let PrimitiveKind::Text {
                typeface, font_style, ..
            } = &prim.kind
            {
                fonts.mark(*typeface, *font_style);
            }
        }
    }
}

/// Resolve a link target to a page position or URI.
fn resolve_target(pagination: &Pagination, target: &LinkTarget) -> Option<AnnotTarget> {
    let (page, y) = match target {
        LinkTarget::Uri(uri) => return Some(AnnotTarget::Uri(uri.clone())),
        LinkTarget::Named(name) => {
            let link = pagination.links.find(name)?;
            (link.page, link.y)
        },
        LinkTarget::Heading(i) => {
            let heading = pagination.headings.entries().get(*i)?;
            (heading.page, heading.y)
        },
    };
    pagination.output_index(page)?;
    Some(AnnotTarget::Page(page, y))
}

/// `[page /XYZ x y 0]` for a page-local position, or `None` when the page
/// is not output.
fn destination(pagination: &Pagination, sheets: &[SheetPlan], page: usize, y: f32) -> Option<Object> {
    let output_index = pagination.output_index(page)?;
    let logical = pagination.pages.get(page)?;
    let sheet = sheets.iter().find(|s| s.slots.contains(&output_index))?;
    let (x, y) = page_matrix(logical, output_index).apply(0.0, y);
    Some(ObjectSerializer::array(vec![
        ObjectSerializer::reference(sheet.page_id),
        ObjectSerializer::name("XYZ"),
        ObjectSerializer::real(x as f64),
        ObjectSerializer::real(y as f64),
        ObjectSerializer::integer(0),
    ]))
}

/// Page label ranges: `title` for title pages, roman for contents, then
/// decimal for the body.
fn page_labels(pagination: &Pagination) -> Object {
    let mut nums = Vec::new();
    let mut push = |start: usize, label: Object| {
        nums.push(ObjectSerializer::integer(start as i64));
        nums.push(label);
    };
    let mut seen = [false; 3];
    for (output_index, &index) in pagination.page_order.iter().enumerate() {
        let Some(page) = pagination.pages.get(index) else {
            continue;
        };
        let (slot, label) = match page.section {
            Section::Title => (0, ObjectSerializer::dict(vec![("P", ObjectSerializer::string("title"))])),
            Section::Contents => (1, ObjectSerializer::dict(vec![("S", ObjectSerializer::name("r"))])),
            Section::Body => (2, ObjectSerializer::dict(vec![("S", ObjectSerializer::name("D"))])),
        };
        if !seen[slot] {
            seen[slot] = true;
            push(output_index, label);
        }
    }
    ObjectSerializer::dict(vec![("Nums", ObjectSerializer::array(nums))])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EncryptionConfig, HeadFootFormat, OutputType};
    use crate::fonts::FixedMetrics;
    use crate::layout::Formatter;
    use crate::progress::CollectingProgress;
    use crate::tree::{Element, Node, RasterImage, Style};
    use chrono::TimeZone;

    fn paginate(config: &ExportConfig, doc: &Document) -> Pagination {
        let metrics = FixedMetrics::default();
        let mut progress = CollectingProgress::new();
        Formatter::new(config, &metrics, &mut progress, &doc.images).paginate(doc)
    }

    fn render(config: &ExportConfig, doc: &Document) -> Vec<u8> {
        let mut pagination = paginate(config, doc);
        let mut progress = CollectingProgress::new();
        let mut out = Vec::new();
        PdfWriter::new(config, doc)
            .with_creation_date(Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap())
            .write(&mut pagination, &mut progress, &mut out)
            .unwrap();
        out
    }

    fn text(out: &[u8]) -> String {
        String::from_utf8_lossy(out).into_owned()
    }

    fn simple_doc() -> Document {
        let metrics = FixedMetrics::default();
        let style = Style::default();
        Document::new(vec![
            Node::block(Element::Heading(1), "Introduction", style.clone(), &metrics),
            Node::block(Element::Paragraph, "Hello world", style, &metrics),
        ])
        .with_title("Sample")
    }

    #[test]
    fn test_minimal_structure() {
        let config = ExportConfig::default().with_compression(0);
        let out = text(&render(&config, &simple_doc()));
        assert!(out.starts_with("%PDF-1.4\n"));
        assert!(out.contains("/Type /Catalog"));
        assert!(out.contains("/BaseFont /Times-Roman"));
        assert!(out.contains("/Encoding /WinAnsiEncoding"));
        assert!(out.contains("(Introduction)Tj"));
        assert!(out.contains("/CreationDate (D:20261016120000Z)"));
        assert!(out.ends_with("%%EOF\n"));
    }

    #[test]
    fn test_xref_offsets_point_at_objects() {
        let config = ExportConfig::default();
        let out = render(&config, &simple_doc());
        let xref_at = out.windows(6).rposition(|w| w == b"\nxref\n").unwrap() + 1;
        let tail = std::str::from_utf8(&out[xref_at..]).unwrap();
        let rows: Vec<&str> = tail.lines().skip(3).take_while(|l| l.ends_with(" n ")).collect();
        assert!(!rows.is_empty());
        for (i, row) in rows.iter().enumerate() {
            let offset: usize = row[..10].parse().unwrap();
            let header = format!("{} 0 obj", i + 1);
            assert_eq!(&out[offset..offset + header.len()], header.as_bytes());
        }
        let startxref: usize = tail.lines().rev().nth(1).unwrap().parse().unwrap();
        assert_eq!(startxref, xref_at);
        assert!(tail.contains(&format!("/Size {}", rows.len() + 1)));
    }

    #[test]
    fn test_outline_and_page_mode() {
        let config = ExportConfig::default().with_compression(0);
        let out = text(&render(&config, &simple_doc()));
        assert!(out.contains("/Type /Outlines"));
        assert!(out.contains("/PageMode /UseOutlines"));
        assert!(out.contains("(Introduction)"));

        let config = ExportConfig::default().with_toc_levels(0).with_compression(0);
        let out = text(&render(&config, &simple_doc()));
        assert!(!out.contains("/Outlines"));
        assert!(out.contains("/PageMode /UseNone"));
    }

    #[test]
    fn test_landscape_rotates_page() {
        let config = ExportConfig::default()
            .with_page_size(612.0, 792.0)
            .with_landscape(true)
            .with_compression(0);
        let out = text(&render(&config, &simple_doc()));
        assert!(out.contains("/MediaBox [0 0 612 792]"));
        assert!(out.contains("/Rotate 90"));
    }

    #[test]
    fn test_links_become_annotations() {
        let metrics = FixedMetrics::default();
        let style = Style::default();
        let anchor = Node::new(Element::Anchor)
            .with_attr("HREF", "http://example.com/")
            .with_children(Node::words("example", &style, &metrics));
        let missing = Node::new(Element::Anchor)
            .with_attr("HREF", "#nowhere")
            .with_children(Node::words("broken", &style, &metrics));
        let doc = Document::new(vec![Node::new(Element::Paragraph)
            .with_style(style)
            .with_children([anchor, missing])]);
        let config = ExportConfig::default()
            .with_output_type(OutputType::WebPages)
            .with_compression(0);
        let out = text(&render(&config, &doc));
        assert_eq!(out.matches("/Subtype /Link").count(), 1);
        assert!(out.contains("/URI (http://example.com/)"));
        assert!(out.contains("/Border [0 0 0]"));

        let config = config.with_links(false);
        let out = text(&render(&config, &doc));
        assert!(!out.contains("/Subtype /Link"));
    }

    #[test]
    fn test_images_are_xobjects() {
        let doc = Document::new(vec![Node::new(Element::Paragraph)
            .with_child(Node::image("dot.png", 20.0, 20.0))])
        .with_image("dot.png", RasterImage::new(2, 2, 3, vec![255, 0, 0, 0, 0, 255, 255, 0, 0, 0, 0, 255]).unwrap());
        let config = ExportConfig::default()
            .with_output_type(OutputType::WebPages)
            .with_compression(0);
        let out = text(&render(&config, &doc));
        assert!(out.contains("/Subtype /Image"));
        assert!(out.contains("/Indexed /DeviceRGB 1"));
        assert!(out.contains("/Im1 Do"));
    }

    #[test]
    fn test_encryption_dictionary() {
        let config = ExportConfig::default()
            .with_compression(0)
            .with_encryption(EncryptionConfig::default().with_user_password("user"));
        let out = text(&render(&config, &simple_doc()));
        assert!(out.contains("/Filter /Standard"));
        assert!(out.contains("/Encrypt "));
        assert!(!out.contains("(Introduction)Tj"));
    }

    #[test]
    fn test_footer_text_written() {
        let config = ExportConfig::default()
            .with_compression(0)
            .with_output_type(OutputType::WebPages)
            .with_footer(HeadFootFormat::new("", "$PAGE", ""));
        let doc = simple_doc();
        let metrics = FixedMetrics::default();
        let mut pagination = paginate(&config, &doc);
        let mut progress = CollectingProgress::new();
        super::super::header_footer::HeadFootRenderer::new(&config, &metrics, &doc)
            .decorate(&mut pagination, &mut progress);
        let mut out = Vec::new();
        PdfWriter::new(&config, &doc)
            .write(&mut pagination, &mut progress, &mut out)
            .unwrap();
        let s = text(&out);
        assert!(s.contains("(1)Tj"));
        assert!(s.contains("/BaseFont /Helvetica"));
    }

    #[test]
    fn test_nup_shares_sheets() {
        let metrics = FixedMetrics::default();
        let style = Style::default();
        let mut nodes = Vec::new();
        for i in 0..4 {
            nodes.push(Node::block(Element::Paragraph, &format!("page {}", i), style.clone(), &metrics));
            nodes.push(Node::comment("PAGE BREAK"));
        }
        let doc = Document::new(nodes);
        let config = ExportConfig::default()
            .with_output_type(OutputType::WebPages)
            .with_nup(4)
            .with_compression(0);
        let pagination = paginate(&config, &doc);
        let expected = sheet_count(pagination.page_count(), 4);
        let out = text(&render(&config, &doc));
        assert!(out.contains(&format!("/Count {}", expected)));
        assert_eq!(out.matches("/Type /Page>>").count(), expected);
    }

    struct TimesOnly;

    impl crate::fonts::FontProgramSource for TimesOnly {
        fn font_program(&self, base_font: &str) -> Option<Vec<u8>> {
            (base_font == "Times-Roman").then(|| {
                b"%!FontType1-1.0: Times-Roman\ncurrentfile eexec\nDEADBEEF\n0000000000000000\ncleartomark\n".to_vec()
            })
        }
    }

    #[test]
    fn test_embedded_font_program() {
        let doc = simple_doc();
        let config = ExportConfig::default().with_compression(0).with_embed_fonts(true);
        let mut pagination = paginate(&config, &doc);
        let mut progress = CollectingProgress::new();
        let mut out = Vec::new();
        PdfWriter::new(&config, &doc)
            .with_font_source(&TimesOnly)
            .write(&mut pagination, &mut progress, &mut out)
            .unwrap();
        let s = text(&out);
        assert!(s.contains("/FontDescriptor "));
        assert!(s.contains("/FontName /Times-Roman"));
        assert!(s.contains("/Length1 47"));
        assert!(s.contains("/Length2 4"));

        // Without the flag the source is ignored.
        let config = ExportConfig::default().with_compression(0);
        let mut pagination = paginate(&config, &doc);
        let mut out = Vec::new();
        PdfWriter::new(&config, &doc)
            .with_font_source(&TimesOnly)
            .write(&mut pagination, &mut progress, &mut out)
            .unwrap();
        assert!(!text(&out).contains("/FontDescriptor"));
    }
}

//! Image preparation for PDF and PostScript output.
//!
//! Images are checked for palette reducibility before they are written: a
//! grayscale image with at most 16 levels, or a color image with at most
//! 256 distinct colors, is re-emitted as an indexed bitmap with 1, 2, 4 or
//! 8-bit indices. Otherwise the samples are written as-is, or JPEG-encoded
//! when a quality is configured.

use super::filter::encode_jpeg;
use crate::config::{ExportConfig, OutputFormat};
use crate::error::Result;
use crate::object::Object;
use crate::tree::RasterImage;
use crate::writer::ObjectSerializer;
use indexmap::IndexMap;

/// Color space of prepared image data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageColor {
    /// One 8-bit gray sample per pixel
    Gray,
    /// Three 8-bit samples per pixel
    Rgb,
    /// Packed palette indices
    Indexed {
        /// RGB palette, at least two entries
        palette: Vec<[u8; 3]>,
    },
}

/// Encoding of prepared image data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    /// Raw samples or indices
    Raw,
    /// Baseline JPEG (DCTDecode)
    Jpeg,
}

/// Image ready for serialization.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bits per component (index width for indexed images)
    pub bits_per_component: u8,
    /// Color space
    pub color: ImageColor,
    /// Encoding of `data`
    pub encoding: ImageEncoding,
    /// Sample data
    pub data: Vec<u8>,
}

/// Indexed form of an image.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedPixels {
    /// Palette in ascending order
    pub palette: Vec<[u8; 3]>,
    /// Bits per index: 1, 2, 4 or 8
    pub bits: u8,
    /// Row-aligned packed indices
    pub data: Vec<u8>,
}

/// Whether the output level can express indexed images.
pub fn indexed_allowed(config: &ExportConfig) -> bool {
    match config.format {
        OutputFormat::Pdf => config.pdf_version_number() >= 12,
        OutputFormat::PostScript => config.ps_level >= 2,
    }
}

fn index_bits(colors: usize) -> u8 {
    match colors {
        0..=2 => 1,
        3..=4 => 2,
        5..=16 => 4,
        _ => 8,
    }
}

/// Try to express an image with a small palette without color loss.
pub fn reduce_palette(image: &RasterImage) -> Option<IndexedPixels> {
    let pixels = image.width as usize * image.height as usize;
    let mut palette: Vec<[u8; 3]> = Vec::new();

    if image.depth == 1 {
        let mut seen = [false; 256];
        for &gray in &image.pixels[..pixels] {
            seen[gray as usize] = true;
        }
        palette = (0..=255u8).filter(|g| seen[*g as usize]).map(|g| [g, g, g]).collect();
        if palette.len() > 16 {
            return None;
        }
    } else {
        for rgb in image.pixels.chunks_exact(3) {
            let color = [rgb[0], rgb[1], rgb[2]];
            if let Err(at) = palette.binary_search(&color) {
                if palette.len() >= 256 {
                    return None;
                }
                palette.insert(at, color);
            }
        }
    }
    if palette.is_empty() {
        return None;
    }

    let bits = index_bits(palette.len());
    let row_bytes = (image.width as usize * bits as usize).div_ceil(8);
    let mut data = vec![0u8; row_bytes * image.height as usize];
    let depth = image.depth as usize;

    for (y, row) in image.pixels.chunks_exact(image.width as usize * depth).enumerate() {
        let out = &mut data[y * row_bytes..(y + 1) * row_bytes];
        for (x, px) in row.chunks_exact(depth).enumerate() {
            let color = if depth == 1 {
                [px[0], px[0], px[0]]
            } else {
                [px[0], px[1], px[2]]
            };
            let index = palette.binary_search(&color).unwrap_or(0) as u8;
            let bit = x * bits as usize;
            let shift = 8 - bits as usize - bit % 8;
            out[bit / 8] |= index << shift;
        }
    }

    // Viewers reject single-entry palettes.
    if palette.len() < 2 {
        palette.push(palette[0]);
    }
    Some(IndexedPixels {
        palette,
        bits,
        data,
    })
}

impl PreparedImage {
    /// Prepare an image for output.
    ///
    /// Palette reduction wins over JPEG; `jpeg_quality` 0 keeps the image
    /// lossless.
    pub fn prepare(image: &RasterImage, allow_indexed: bool, jpeg_quality: u8) -> Result<Self> {
        if allow_indexed {
            if let Some(indexed) = reduce_palette(image) {
                return Ok(Self {
                    width: image.width,
                    height: image.height,
                    bits_per_component: indexed.bits,
                    color: ImageColor::Indexed {
                        palette: indexed.palette,
                    },
                    encoding: ImageEncoding::Raw,
                    data: indexed.data,
                });
            }
        }

        let color = if image.depth == 1 {
            ImageColor::Gray
        } else {
            ImageColor::Rgb
        };
        let (encoding, data) = if jpeg_quality > 0 {
            (ImageEncoding::Jpeg, encode_jpeg(image, jpeg_quality)?)
        } else {
            (ImageEncoding::Raw, image.pixels.clone())
        };
        Ok(Self {
            width: image.width,
            height: image.height,
            bits_per_component: 8,
            color,
            encoding,
            data,
        })
    }

    /// Palette as a hex string of RGB triples.
    pub fn palette_hex(&self) -> Option<String> {
        match &self.color {
            ImageColor::Indexed { palette } => Some(
                palette
                    .iter()
                    .map(|c| format!("{:02X}{:02X}{:02X}", c[0], c[1], c[2]))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// PDF color space object.
    pub fn pdf_color_space(&self) -> Object {
        match &self.color {
            ImageColor::Gray => ObjectSerializer::name("DeviceGray"),
            ImageColor::Rgb => ObjectSerializer::name("DeviceRGB"),
            ImageColor::Indexed { palette } => ObjectSerializer::array(vec![
                ObjectSerializer::name("Indexed"),
                ObjectSerializer::name("DeviceRGB"),
                ObjectSerializer::integer(palette.len() as i64 - 1),
                Object::String(palette.iter().flatten().copied().collect()),
            ]),
        }
    }

    /// Build the PDF Image XObject dictionary (without `/Length`).
    pub fn build_xobject_dict(&self, deflated: bool) -> Object {
        let mut entries = vec![
            ("Type", ObjectSerializer::name("XObject")),
            ("Subtype", ObjectSerializer::name("Image")),
            ("Width", ObjectSerializer::integer(self.width as i64)),
            ("Height", ObjectSerializer::integer(self.height as i64)),
            ("ColorSpace", self.pdf_color_space()),
            ("BitsPerComponent", ObjectSerializer::integer(self.bits_per_component as i64)),
            ("Interpolate", ObjectSerializer::boolean(true)),
        ];
        match self.encoding {
            ImageEncoding::Jpeg => entries.push(("Filter", ObjectSerializer::name("DCTDecode"))),
            ImageEncoding::Raw if deflated => {
                entries.push(("Filter", ObjectSerializer::name("FlateDecode")))
            },
            ImageEncoding::Raw => {},
        }
        ObjectSerializer::dict(entries)
    }
}

/// Image XObject registry: one resource name per distinct source.
#[derive(Debug, Default)]
pub struct ImageManager {
    /// Source key -> resource ID ("Im1"), in first-use order
    resource_ids: IndexMap<String, String>,
}

impl ImageManager {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image source, returning its resource ID.
    pub fn register(&mut self, src: &str) -> &str {
        let next = self.resource_ids.len() + 1;
        self.resource_ids
            .entry(src.to_string())
            .or_insert_with(|| format!("Im{}", next))
    }

    /// Resource ID of a registered source.
    pub fn resource_id(&self, src: &str) -> Option<&str> {
        self.resource_ids.get(src).map(|s| s.as_str())
    }

    /// Position of a source in registration order.
    pub fn index_of(&self, src: &str) -> Option<usize> {
        self.resource_ids.get_index_of(src)
    }

    /// Sources with their resource IDs, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.resource_ids.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of registered images.
    pub fn len(&self) -> usize {
        self.resource_ids.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.resource_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(width: u32, height: u32, pixels: Vec<u8>) -> RasterImage {
        RasterImage::new(width, height, 1, pixels).unwrap()
    }

    #[test]
    fn test_index_bits() {
        assert_eq!(index_bits(1), 1);
        assert_eq!(index_bits(2), 1);
        assert_eq!(index_bits(3), 2);
        assert_eq!(index_bits(16), 4);
        assert_eq!(index_bits(17), 8);
        assert_eq!(index_bits(256), 8);
    }

    #[test]
    fn test_two_level_gray_packs_bits() {
        // 10 pixels wide: two bytes per row.
        let mut pixels = vec![0u8; 10];
        pixels[0] = 255;
        pixels[9] = 255;
        let indexed = reduce_palette(&gray(10, 1, pixels)).unwrap();
        assert_eq!(indexed.bits, 1);
        assert_eq!(indexed.palette, vec![[0, 0, 0], [255, 255, 255]]);
        assert_eq!(indexed.data, vec![0b1000_0000, 0b0100_0000]);
    }

    #[test]
    fn test_many_grays_not_reducible() {
        let pixels: Vec<u8> = (0..17u8).map(|i| i * 10).collect();
        assert!(reduce_palette(&gray(17, 1, pixels)).is_none());
    }

    #[test]
    fn test_single_color_palette_padded() {
        let image = RasterImage::new(2, 2, 3, vec![10, 20, 30].repeat(4)).unwrap();
        let indexed = reduce_palette(&image).unwrap();
        assert_eq!(indexed.palette.len(), 2);
        assert_eq!(indexed.bits, 1);
        assert_eq!(indexed.data, vec![0, 0]);
    }

    #[test]
    fn test_color_palette_sorted_and_indexed() {
        let pixels = vec![9, 9, 9, 1, 1, 1, 5, 5, 5];
        let image = RasterImage::new(3, 1, 3, pixels).unwrap();
        let indexed = reduce_palette(&image).unwrap();
        assert_eq!(indexed.palette, vec![[1, 1, 1], [5, 5, 5], [9, 9, 9]]);
        assert_eq!(indexed.bits, 2);
        // Indices 2, 0, 1 packed at two bits each.
        assert_eq!(indexed.data, vec![0b1000_0100]);
    }

    #[test]
    fn test_too_many_colors() {
        let mut pixels = Vec::new();
        for i in 0..257u32 {
            pixels.extend_from_slice(&[(i % 256) as u8, (i / 256) as u8, 0]);
        }
        let image = RasterImage::new(257, 1, 3, pixels).unwrap();
        assert!(reduce_palette(&image).is_none());
    }

    #[test]
    fn test_prepare_respects_level() {
        let image = gray(4, 1, vec![0, 255, 0, 255]);
        let indexed = PreparedImage::prepare(&image, true, 0).unwrap();
        assert!(matches!(indexed.color, ImageColor::Indexed { .. }));
        assert_eq!(indexed.palette_hex().unwrap(), "000000FFFFFF");

        let raw = PreparedImage::prepare(&image, false, 0).unwrap();
        assert_eq!(raw.color, ImageColor::Gray);
        assert_eq!(raw.data, vec![0, 255, 0, 255]);
    }

    #[test]
    fn test_indexed_allowed() {
        let pdf = ExportConfig::new().with_pdf_version("1.1");
        assert!(!indexed_allowed(&pdf));
        assert!(indexed_allowed(&ExportConfig::new()));
        let ps = ExportConfig::new().with_format(OutputFormat::PostScript).with_ps_level(1);
        assert!(!indexed_allowed(&ps));
    }

    #[test]
    fn test_xobject_dict() {
        let image = gray(4, 1, vec![0, 255, 0, 255]);
        let prepared = PreparedImage::prepare(&image, true, 0).unwrap();
        let dict = prepared.build_xobject_dict(true);
        let map = dict.as_dict().unwrap();
        assert_eq!(map.get("Filter").and_then(|f| f.as_name()), Some("FlateDecode"));
        let cs = map.get("ColorSpace").and_then(|c| c.as_array()).unwrap();
        assert_eq!(cs[0].as_name(), Some("Indexed"));
        assert_eq!(cs[2].as_integer(), Some(1));
    }

    #[test]
    fn test_image_manager() {
        let mut images = ImageManager::new();
        assert_eq!(images.register("a.png"), "Im1");
        assert_eq!(images.register("b.png"), "Im2");
        assert_eq!(images.register("a.png"), "Im1");
        assert_eq!(images.len(), 2);
        assert_eq!(images.index_of("b.png"), Some(1));
    }
}

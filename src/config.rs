//! Export configuration.
//!
//! [`ExportConfig`] is a plain value built with `with_*` setters or decoded
//! from JSON. Option parsing itself is left to the caller.

use crate::encryption::Permissions;
use crate::error::{Error, Result};
use crate::fonts::{FontStyle, Typeface};
use crate::tree::Rgb;
use serde::{Deserialize, Serialize};

/// Named media sizes in points (width, length), portrait.
static MEDIA_SIZES: phf::Map<&'static str, (f32, f32)> = phf::phf_map! {
    "letter" => (612.0, 792.0),
    "legal" => (612.0, 1008.0),
    "tabloid" => (792.0, 1224.0),
    "a3" => (842.0, 1191.0),
    "a4" => (595.0, 842.0),
    "a5" => (420.0, 595.0),
    "b5" => (516.0, 729.0),
    "universal" => (595.0, 792.0),
};

/// Look up a media size by name ("a4") or dimensions ("8.5x11in", "210x297mm").
pub fn media_size(name: &str) -> Option<(f32, f32)> {
    let lower = name.trim().to_ascii_lowercase();
    if let Some(size) = MEDIA_SIZES.get(lower.as_str()) {
        return Some(*size);
    }

    let (w, rest) = lower.split_once('x')?;
    let units_at = rest
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    let units = &rest[units_at..];
    let width = parse_length(&format!("{}{}", w, units))?;
    let length = parse_length(rest)?;
    if width > 0.0 && length > 0.0 {
        Some((width, length))
    } else {
        None
    }
}

/// Parse a length with an optional unit suffix into points.
///
/// Supported units: `pt` (default), `in`, `cm`, `mm`, `px` (1/72 inch).
pub fn parse_length(text: &str) -> Option<f32> {
    let text = text.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(text.len());
    let value: f32 = text[..split].parse().ok()?;
    let factor = match text[split..].trim().to_ascii_lowercase().as_str() {
        "" | "pt" | "px" => 1.0,
        "in" => 72.0,
        "cm" => 72.0 / 2.54,
        "mm" => 72.0 / 25.4,
        _ => return None,
    };
    Some(value * factor)
}

/// Output file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Portable Document Format
    #[default]
    Pdf,
    /// DSC-conformant PostScript
    PostScript,
}

/// How the document is divided into chapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputType {
    /// Each H1 starts a chapter on a new page; a table of contents is generated
    #[default]
    Book,
    /// Each input file starts a new page; no chapter numbering
    WebPages,
    /// One continuous flow with no forced chapter breaks
    Continuous,
}

/// How PDF viewers should open the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageMode {
    /// Pages only
    Document,
    /// Pages plus the outline panel
    #[default]
    Outline,
    /// Full screen
    FullScreen,
}

/// PDF page layout hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageLayout {
    /// One page at a time
    #[default]
    Single,
    /// Continuous column
    OneColumn,
    /// Two columns, odd pages on the left
    TwoColumnLeft,
    /// Two columns, odd pages on the right
    TwoColumnRight,
}

/// Which page a PDF viewer opens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FirstPage {
    /// The first physical page
    #[default]
    Page1,
    /// The first table-of-contents page
    Toc,
    /// The first body page
    Chapter1,
}

/// Three-slot header or footer: left, center, right format strings.
///
/// Empty strings leave the slot blank. See
/// [`header_footer`](crate::writer::header_footer) for the macros.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HeadFootFormat {
    /// Left slot
    pub left: String,
    /// Center slot
    pub center: String,
    /// Right slot
    pub right: String,
}

impl HeadFootFormat {
    /// Build a format from three slots.
    pub fn new(left: impl Into<String>, center: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            center: center.into(),
            right: right.into(),
        }
    }

    /// Slots in left, center, right order.
    pub fn slots(&self) -> [&str; 3] {
        [&self.left, &self.center, &self.right]
    }

    /// Mutable access to one slot (0 = left, 1 = center, 2 = right).
    pub fn slot_mut(&mut self, pos: usize) -> Option<&mut String> {
        match pos {
            0 => Some(&mut self.left),
            1 => Some(&mut self.center),
            2 => Some(&mut self.right),
            _ => None,
        }
    }

    /// Whether every slot is blank.
    pub fn is_blank(&self) -> bool {
        self.slots().iter().all(|s| s.is_empty())
    }
}

/// Standard Security Handler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// User (open) password; may be empty
    pub user_password: String,
    /// Owner (permissions) password; empty means "same as user"
    pub owner_password: String,
    /// Granted permissions
    pub permissions: Permissions,
    /// Key length in bits: 40 (revision 2) or 128 (revision 3)
    pub key_bits: u32,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            user_password: String::new(),
            owner_password: String::new(),
            permissions: Permissions::all(),
            key_bits: 128,
        }
    }
}

impl EncryptionConfig {
    /// Set the user password.
    pub fn with_user_password(mut self, password: impl Into<String>) -> Self {
        self.user_password = password.into();
        self
    }

    /// Set the owner password.
    pub fn with_owner_password(mut self, password: impl Into<String>) -> Self {
        self.owner_password = password.into();
        self
    }

    /// Set the granted permissions.
    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    /// Set the key length in bits.
    pub fn with_key_bits(mut self, bits: u32) -> Self {
        self.key_bits = bits;
        self
    }
}

/// Structural limits; exceeding one degrades output instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum number of pages
    pub max_pages: usize,
    /// Maximum number of chapters
    pub max_chapters: usize,
    /// Maximum number of indexed headings
    pub max_headings: usize,
    /// Maximum number of named links
    pub max_links: usize,
    /// Maximum number of table columns
    pub max_columns: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_pages: 10_000,
            max_chapters: 1_000,
            max_headings: 10_000,
            max_links: 20_000,
            max_columns: 200,
        }
    }
}

/// Complete configuration for one export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Output file format
    pub format: OutputFormat,
    /// Chaptering mode
    pub output_type: OutputType,
    /// PDF version written in the header ("1.3" .. "1.7")
    pub pdf_version: String,
    /// PostScript language level (1..3)
    pub ps_level: u8,
    /// Page width in points (portrait)
    pub page_width: f32,
    /// Page length in points (portrait)
    pub page_length: f32,
    /// Left margin in points
    pub margin_left: f32,
    /// Right margin in points
    pub margin_right: f32,
    /// Top margin in points
    pub margin_top: f32,
    /// Bottom margin in points
    pub margin_bottom: f32,
    /// Rotate pages to landscape
    pub landscape: bool,
    /// Two-sided output: chapters start on odd pages, headers mirror
    pub duplex: bool,
    /// Logical pages per sheet (1, 2, 4, 6, 9, 16)
    pub nup: u8,
    /// Deepest heading level entered in the table of contents (0 = none)
    pub toc_levels: u8,
    /// Generate table-of-contents pages (book mode only)
    pub generate_toc: bool,
    /// Title of the generated table of contents
    pub toc_title: String,
    /// Format a title page before the table of contents
    pub title_page: bool,
    /// Header for body pages
    pub header: HeadFootFormat,
    /// Footer for body pages
    pub footer: HeadFootFormat,
    /// Header for table-of-contents pages
    pub toc_header: HeadFootFormat,
    /// Footer for table-of-contents pages
    pub toc_footer: HeadFootFormat,
    /// Header/footer typeface
    pub head_foot_font: Typeface,
    /// Header/footer style
    pub head_foot_style: FontStyle,
    /// Header/footer size in points
    pub head_foot_size: f32,
    /// Vertical space inserted between blocks
    pub paragraph_spacing: f32,
    /// Deflate level 0..9; 0 disables compression
    pub compression: u32,
    /// JPEG quality 1..100 for continuous-tone images; 0 keeps images lossless
    pub jpeg_quality: u8,
    /// Optional encryption (PDF only)
    pub encryption: Option<EncryptionConfig>,
    /// Emit link annotations and named destinations
    pub links: bool,
    /// Underline link text
    pub link_underline: bool,
    /// Link text color
    pub link_color: Rgb,
    /// Default page background color
    pub background_color: Option<Rgb>,
    /// Default page background image (key into the document image table)
    pub background_image: Option<String>,
    /// Default media color
    pub media_color: Option<String>,
    /// Default media type
    pub media_type: Option<String>,
    /// Default media tray
    pub media_position: u32,
    /// PDF viewer page mode
    pub page_mode: PageMode,
    /// PDF viewer page layout
    pub page_layout: PageLayout,
    /// PDF viewer first page
    pub first_page: FirstPage,
    /// Embed font programs when a source is supplied
    pub embed_fonts: bool,
    /// Structural limits
    pub limits: Limits,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Pdf,
            output_type: OutputType::Book,
            pdf_version: "1.4".to_string(),
            ps_level: 2,
            page_width: 595.0,
            page_length: 792.0,
            margin_left: 72.0,
            margin_right: 36.0,
            margin_top: 36.0,
            margin_bottom: 36.0,
            landscape: false,
            duplex: false,
            nup: 1,
            toc_levels: 3,
            generate_toc: true,
            toc_title: "Table of Contents".to_string(),
            title_page: false,
            header: HeadFootFormat::new("", "$TITLE", ""),
            footer: HeadFootFormat::new("$HEADING", "", "$PAGE"),
            toc_header: HeadFootFormat::new("", "$TITLE", ""),
            toc_footer: HeadFootFormat::new("", "", "$PAGE(i)"),
            head_foot_font: Typeface::Helvetica,
            head_foot_style: FontStyle::Normal,
            head_foot_size: 11.0,
            paragraph_spacing: 14.0,
            compression: 1,
            jpeg_quality: 0,
            encryption: None,
            links: true,
            link_underline: true,
            link_color: Rgb::new(0.0, 0.0, 1.0),
            background_color: None,
            background_image: None,
            media_color: None,
            media_type: None,
            media_position: 0,
            page_mode: PageMode::Outline,
            page_layout: PageLayout::Single,
            first_page: FirstPage::Page1,
            embed_fonts: false,
            limits: Limits::default(),
        }
    }
}

impl ExportConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a configuration from JSON; missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ExportConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is internally consistent.
    pub fn validate(&self) -> Result<()> {
        if self.page_width <= 0.0 || self.page_length <= 0.0 {
            return Err(Error::InvalidConfig("page size must be positive".to_string()));
        }
        let (w, l) = self.oriented_size();
        if self.margin_left + self.margin_right >= w || self.margin_top + self.margin_bottom >= l {
            return Err(Error::InvalidConfig("margins leave no printable area".to_string()));
        }
        if !matches!(self.nup, 1 | 2 | 4 | 6 | 9 | 16) {
            return Err(Error::InvalidConfig(format!("unsupported number-up {}", self.nup)));
        }
        if !(1..=3).contains(&self.ps_level) {
            return Err(Error::InvalidConfig(format!("unsupported PostScript level {}", self.ps_level)));
        }
        if self.compression > 9 {
            return Err(Error::InvalidConfig(format!("compression level {} > 9", self.compression)));
        }
        if let Some(enc) = &self.encryption {
            if enc.key_bits != 40 && enc.key_bits != 128 {
                return Err(Error::InvalidConfig(format!("unsupported key length {}", enc.key_bits)));
            }
        }
        Ok(())
    }

    /// Page size after applying orientation.
    pub fn oriented_size(&self) -> (f32, f32) {
        if self.landscape {
            (self.page_length, self.page_width)
        } else {
            (self.page_width, self.page_length)
        }
    }

    /// Numeric PDF version (e.g. 1.4 -> 14).
    pub fn pdf_version_number(&self) -> u32 {
        let mut parts = self.pdf_version.split('.');
        let major: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(1);
        let minor: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(4);
        major * 10 + minor
    }

    /// Set the output format.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the chaptering mode.
    pub fn with_output_type(mut self, output_type: OutputType) -> Self {
        self.output_type = output_type;
        self
    }

    /// Set the PDF version string.
    pub fn with_pdf_version(mut self, version: impl Into<String>) -> Self {
        self.pdf_version = version.into();
        self
    }

    /// Set the PostScript level.
    pub fn with_ps_level(mut self, level: u8) -> Self {
        self.ps_level = level;
        self
    }

    /// Set the page size in points.
    pub fn with_page_size(mut self, width: f32, length: f32) -> Self {
        self.page_width = width;
        self.page_length = length;
        self
    }

    /// Set all four margins in points.
    pub fn with_margins(mut self, left: f32, right: f32, top: f32, bottom: f32) -> Self {
        self.margin_left = left;
        self.margin_right = right;
        self.margin_top = top;
        self.margin_bottom = bottom;
        self
    }

    /// Enable or disable landscape orientation.
    pub fn with_landscape(mut self, landscape: bool) -> Self {
        self.landscape = landscape;
        self
    }

    /// Enable or disable duplex.
    pub fn with_duplex(mut self, duplex: bool) -> Self {
        self.duplex = duplex;
        self
    }

    /// Set logical pages per sheet.
    pub fn with_nup(mut self, nup: u8) -> Self {
        self.nup = nup;
        self
    }

    /// Set the deepest heading level indexed for the table of contents.
    pub fn with_toc_levels(mut self, levels: u8) -> Self {
        self.toc_levels = levels;
        self
    }

    /// Enable or disable generated table-of-contents pages.
    pub fn with_toc(mut self, generate: bool) -> Self {
        self.generate_toc = generate;
        self
    }

    /// Enable or disable the title page.
    pub fn with_title_page(mut self, title_page: bool) -> Self {
        self.title_page = title_page;
        self
    }

    /// Set the body header.
    pub fn with_header(mut self, header: HeadFootFormat) -> Self {
        self.header = header;
        self
    }

    /// Set the body footer.
    pub fn with_footer(mut self, footer: HeadFootFormat) -> Self {
        self.footer = footer;
        self
    }

    /// Set the deflate level (0 disables compression).
    pub fn with_compression(mut self, level: u32) -> Self {
        self.compression = level;
        self
    }

    /// Set the JPEG quality (0 disables lossy image encoding).
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// Enable encryption.
    pub fn with_encryption(mut self, encryption: EncryptionConfig) -> Self {
        self.encryption = Some(encryption);
        self
    }

    /// Enable or disable links.
    pub fn with_links(mut self, links: bool) -> Self {
        self.links = links;
        self
    }

    /// Set the default page background color.
    pub fn with_background_color(mut self, color: Rgb) -> Self {
        self.background_color = Some(color);
        self
    }

    /// Set the structural limits.
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Enable or disable font embedding.
    pub fn with_embed_fonts(mut self, embed: bool) -> Self {
        self.embed_fonts = embed;
        self
    }

    /// Set the space between blocks.
    pub fn with_paragraph_spacing(mut self, spacing: f32) -> Self {
        self.paragraph_spacing = spacing;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ExportConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pdf_version_number(), 14);
        assert_eq!(config.oriented_size(), (595.0, 792.0));
    }

    #[test]
    fn test_builder_chain() {
        let config = ExportConfig::new()
            .with_format(OutputFormat::PostScript)
            .with_ps_level(3)
            .with_landscape(true)
            .with_duplex(true)
            .with_nup(4);
        assert_eq!(config.format, OutputFormat::PostScript);
        assert_eq!(config.oriented_size(), (792.0, 595.0));
        assert!(config.duplex);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_nup() {
        let config = ExportConfig::new().with_nup(3);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_margins_must_leave_space() {
        let config = ExportConfig::new().with_margins(300.0, 300.0, 36.0, 36.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            ExportConfig::from_json(r#"{"format": "PostScript", "toc_levels": 2, "duplex": true}"#)
                .unwrap();
        assert_eq!(config.format, OutputFormat::PostScript);
        assert_eq!(config.toc_levels, 2);
        assert!(config.duplex);
        assert_eq!(config.page_width, 595.0);
    }

    #[test]
    fn test_from_json_rejects_bad_level() {
        assert!(ExportConfig::from_json(r#"{"ps_level": 7}"#).is_err());
        assert!(matches!(ExportConfig::from_json("{not json"), Err(Error::Json(_))));
    }

    #[test]
    fn test_parse_length_units() {
        assert_eq!(parse_length("36"), Some(36.0));
        assert_eq!(parse_length("1in"), Some(72.0));
        assert!((parse_length("2.54cm").unwrap() - 72.0).abs() < 0.01);
        assert!((parse_length("25.4mm").unwrap() - 72.0).abs() < 0.01);
        assert_eq!(parse_length("12furlongs"), None);
    }

    #[test]
    fn test_media_size_lookup() {
        assert_eq!(media_size("A4"), Some((595.0, 842.0)));
        assert_eq!(media_size("Letter"), Some((612.0, 792.0)));
        assert_eq!(media_size("8.5x11in"), Some((612.0, 792.0)));
        assert_eq!(media_size("unknown"), None);
    }

    #[test]
    fn test_head_foot_slots() {
        let mut hf = HeadFootFormat::new("a", "", "c");
        assert_eq!(hf.slots(), ["a", "", "c"]);
        *hf.slot_mut(1).unwrap() = "b".to_string();
        assert_eq!(hf.center, "b");
        assert!(hf.slot_mut(3).is_none());
        assert!(!hf.is_blank());
        assert!(HeadFootFormat::default().is_blank());
    }
}

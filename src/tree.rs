//! Document tree input model.
//!
//! The tree arrives fully parsed and styled: every text run and image already
//! carries its measured width and height. Text runs are individual words,
//! with inter-word spaces as separate `" "` runs, which is where the line
//! breaker is allowed to break.

use crate::fonts::{FontMetrics, FontStyle, Typeface};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// RGB color with components in 0.0..=1.0.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgb {
    /// Red
    pub r: f32,
    /// Green
    pub g: f32,
    /// Blue
    pub b: f32,
}

impl Rgb {
    /// Black.
    pub const BLACK: Rgb = Rgb { r: 0.0, g: 0.0, b: 0.0 };
    /// White.
    pub const WHITE: Rgb = Rgb { r: 1.0, g: 1.0, b: 1.0 };

    /// Create a color from float components.
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb`, `#rgb` or one of the sixteen HTML color names.
    pub fn parse(text: &str) -> Option<Rgb> {
        let text = text.trim();
        if let Some(hex) = text.strip_prefix('#') {
            let expand = |c: u8| c * 17;
            return match hex.len() {
                6 => {
                    let v = u32::from_str_radix(hex, 16).ok()?;
                    Some(Rgb::from_bytes((v >> 16) as u8, (v >> 8) as u8, v as u8))
                },
                3 => {
                    let v = u16::from_str_radix(hex, 16).ok()?;
                    Some(Rgb::from_bytes(
                        expand(((v >> 8) & 15) as u8),
                        expand(((v >> 4) & 15) as u8),
                        expand((v & 15) as u8),
                    ))
                },
                _ => None,
            };
        }
        let (r, g, b) = match text.to_ascii_lowercase().as_str() {
            "black" => (0, 0, 0),
            "silver" => (192, 192, 192),
            "gray" | "grey" => (128, 128, 128),
            "white" => (255, 255, 255),
            "maroon" => (128, 0, 0),
            "red" => (255, 0, 0),
            "purple" => (128, 0, 128),
            "fuchsia" | "magenta" => (255, 0, 255),
            "green" => (0, 128, 0),
            "lime" => (0, 255, 0),
            "olive" => (128, 128, 0),
            "yellow" => (255, 255, 0),
            "navy" => (0, 0, 128),
            "blue" => (0, 0, 255),
            "teal" => (0, 128, 128),
            "aqua" | "cyan" => (0, 255, 255),
            _ => return None,
        };
        Some(Rgb::from_bytes(r, g, b))
    }

    /// Create a color from 8-bit components.
    pub fn from_bytes(r: u8, g: u8, b: u8) -> Self {
        Self::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
    }
}

/// Element kind of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Element {
    /// Text run (word or space)
    Text,
    /// Inline image
    Image,
    /// Line break
    Br,
    /// Anchor (`NAME` target or `HREF` source)
    Anchor,
    /// Inline container with no layout effect (`SPAN`, `B`, `FONT`, ...)
    Inline,
    /// Paragraph
    Paragraph,
    /// Generic block
    Div,
    /// Centered block
    Center,
    /// Indented quotation
    Blockquote,
    /// Heading level 1..=6
    Heading(u8),
    /// Preformatted block
    Pre,
    /// Unordered list
    Ul,
    /// Ordered list
    Ol,
    /// Definition list
    Dl,
    /// Definition term
    Dt,
    /// Definition description
    Dd,
    /// List item
    Li,
    /// Horizontal rule
    Hr,
    /// Table
    Table,
    /// Table caption
    Caption,
    /// Table row group
    RowGroup,
    /// Table row
    Tr,
    /// Table data cell
    Td,
    /// Table header cell
    Th,
    /// Comment (may carry a directive)
    Comment,
    /// Start of an input file (web page mode chapter boundary)
    File,
    /// Head, title, meta, script and form controls: not rendered
    Ignored,
}

impl Element {
    /// Heading level, if this is a heading.
    pub fn heading_level(self) -> Option<u8> {
        match self {
            Element::Heading(level) => Some(level),
            _ => None,
        }
    }

    /// Whether the element flows inline within a paragraph.
    pub fn is_inline(self) -> bool {
        matches!(
            self,
            Element::Text | Element::Image | Element::Br | Element::Anchor | Element::Inline
        )
    }
}

/// Horizontal alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HAlign {
    /// Flush left
    #[default]
    Left,
    /// Centered
    Center,
    /// Flush right
    Right,
    /// Justified to both margins
    Justify,
}

/// Vertical alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VAlign {
    /// Top
    Top,
    /// Middle
    #[default]
    Middle,
    /// Bottom
    Bottom,
}

/// Resolved style of a node.
#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    /// Typeface family
    pub typeface: Typeface,
    /// Bold/italic
    pub font_style: FontStyle,
    /// Font size in points
    pub size: f32,
    /// Line height in points
    pub line_height: f32,
    /// Text color
    pub color: Rgb,
    /// Horizontal alignment of the block
    pub halign: HAlign,
    /// Vertical alignment (images, table cells)
    pub valign: VAlign,
    /// Underline
    pub underline: bool,
    /// Strike through
    pub strikethrough: bool,
    /// Superscript
    pub superscript: bool,
    /// Subscript
    pub subscript: bool,
    /// Block top margin in points
    pub margin_top: f32,
    /// Block bottom margin in points
    pub margin_bottom: f32,
    /// `page-break-before` value (`always`, `left`, `right`)
    pub page_break_before: Option<String>,
    /// `page-break-after` value
    pub page_break_after: Option<String>,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            typeface: Typeface::Times,
            font_style: FontStyle::Normal,
            size: 11.0,
            line_height: 13.2,
            color: Rgb::BLACK,
            halign: HAlign::Left,
            valign: VAlign::Middle,
            underline: false,
            strikethrough: false,
            superscript: false,
            subscript: false,
            margin_top: 0.0,
            margin_bottom: 0.0,
            page_break_before: None,
            page_break_after: None,
        }
    }
}

impl Style {
    /// Style with a given typeface and size; line height is 1.2 × size.
    pub fn sized(typeface: Typeface, size: f32) -> Self {
        Self {
            typeface,
            size,
            line_height: size * 1.2,
            ..Self::default()
        }
    }

    /// Set the font style.
    pub fn with_font_style(mut self, font_style: FontStyle) -> Self {
        self.font_style = font_style;
        self
    }

    /// Set the alignment.
    pub fn with_halign(mut self, halign: HAlign) -> Self {
        self.halign = halign;
        self
    }

    /// Set the text color.
    pub fn with_color(mut self, color: Rgb) -> Self {
        self.color = color;
        self
    }
}

/// One node of the document tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Element kind
    pub element: Element,
    /// Attributes; names are matched case-insensitively
    pub attrs: Vec<(String, String)>,
    /// Resolved style
    pub style: Style,
    /// Text of a run or comment
    pub text: Option<String>,
    /// Measured width in points (text runs, images)
    pub width: f32,
    /// Measured height in points (text runs, images)
    pub height: f32,
    /// Hyperlink target covering this node (`#name` or URI)
    pub link: Option<String>,
    /// Child nodes in document order
    pub children: Vec<Node>,
}

impl Node {
    /// Create an empty node of a given kind with default style.
    pub fn new(element: Element) -> Self {
        Self {
            element,
            attrs: Vec::new(),
            style: Style::default(),
            text: None,
            width: 0.0,
            height: 0.0,
            link: None,
            children: Vec::new(),
        }
    }

    /// Create a pre-measured text run.
    pub fn text_run(text: impl Into<String>, style: Style, width: f32) -> Self {
        let height = style.line_height;
        Self {
            text: Some(text.into()),
            width,
            height,
            style,
            ..Self::new(Element::Text)
        }
    }

    /// Split `text` into word and space runs measured with `metrics`.
    pub fn words(text: &str, style: &Style, metrics: &dyn FontMetrics) -> Vec<Node> {
        let mut runs = Vec::new();
        for (i, word) in text.split_whitespace().enumerate() {
            if i > 0 {
                let w = metrics.text_width(" ", style.typeface, style.font_style, style.size);
                runs.push(Node::text_run(" ", style.clone(), w));
            }
            let w = metrics.text_width(word, style.typeface, style.font_style, style.size);
            runs.push(Node::text_run(word, style.clone(), w));
        }
        runs
    }

    /// Create a block element whose children are the measured words of `text`.
    pub fn block(element: Element, text: &str, style: Style, metrics: &dyn FontMetrics) -> Self {
        let children = Node::words(text, &style, metrics);
        Self {
            style,
            children,
            ..Self::new(element)
        }
    }

    /// Create an image reference of a given displayed size.
    pub fn image(src: impl Into<String>, width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            ..Self::new(Element::Image)
        }
        .with_attr("SRC", src)
    }

    /// Create a comment node.
    pub fn comment(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::new(Element::Comment)
        }
    }

    /// Add an attribute.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Set or replace an attribute.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self
            .attrs
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            slot.1 = value;
        } else {
            self.attrs.push((name, value));
        }
    }

    /// Replace the style.
    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    /// Set the hyperlink target.
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Append one child.
    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// Append several children.
    pub fn with_children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    /// Look up an attribute case-insensitively.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether an attribute is present.
    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    /// Concatenated text of all descendant runs.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out.trim().to_string()
    }

    fn collect_text(&self, out: &mut String) {
        if self.element == Element::Text {
            if let Some(text) = &self.text {
                out.push_str(text);
            }
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }
}

/// Decoded raster image.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Samples per pixel: 1 (gray) or 3 (RGB)
    pub depth: u8,
    /// Row-major samples, `width * height * depth` bytes
    pub pixels: Vec<u8>,
}

impl RasterImage {
    /// Create an image, checking the sample count.
    pub fn new(width: u32, height: u32, depth: u8, pixels: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * depth as usize;
        if (depth == 1 || depth == 3) && pixels.len() == expected {
            Some(Self {
                width,
                height,
                depth,
                pixels,
            })
        } else {
            None
        }
    }
}

/// Complete export input.
#[derive(Debug, Clone, Default)]
pub struct Document {
    /// Body content
    pub root: Vec<Node>,
    /// Optional title page content
    pub title_page: Vec<Node>,
    /// Optional table-of-contents tree (headings with links); generated
    /// from the heading index when empty
    pub toc: Vec<Node>,
    /// Document title
    pub title: Option<String>,
    /// Document author
    pub author: Option<String>,
    /// Document subject
    pub subject: Option<String>,
    /// Document keywords
    pub keywords: Option<String>,
    /// Decoded images keyed by `SRC`
    pub images: HashMap<String, RasterImage>,
    /// Key of the `$LOGOIMAGE` image
    pub logo_image: Option<String>,
    /// Keys of the `$HFIMAGE<n>` images
    pub hf_images: Vec<String>,
}

impl Document {
    /// Create a document from body nodes.
    pub fn new(root: Vec<Node>) -> Self {
        Self {
            root,
            ..Self::default()
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Register a decoded image.
    pub fn with_image(mut self, src: impl Into<String>, image: RasterImage) -> Self {
        self.images.insert(src.into(), image);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::FixedMetrics;

    #[test]
    fn test_attr_case_insensitive() {
        let node = Node::new(Element::Table).with_attr("Width", "50%");
        assert_eq!(node.attr("WIDTH"), Some("50%"));
        assert!(node.has_attr("width"));
        assert_eq!(node.attr("BORDER"), None);
    }

    #[test]
    fn test_set_attr_replaces() {
        let mut node = Node::new(Element::Td).with_attr("COLSPAN", "2");
        node.set_attr("colspan", "3");
        assert_eq!(node.attrs.len(), 1);
        assert_eq!(node.attr("COLSPAN"), Some("3"));
    }

    #[test]
    fn test_words_split() {
        let metrics = FixedMetrics::default();
        let style = Style::default();
        let runs = Node::words("Hello  big world", &style, &metrics);
        let texts: Vec<_> = runs.iter().map(|n| n.text.clone().unwrap()).collect();
        assert_eq!(texts, vec!["Hello", " ", "big", " ", "world"]);
        assert_eq!(runs[0].width, 5.0 * 0.5 * 11.0);
        assert_eq!(runs[0].height, style.line_height);
    }

    #[test]
    fn test_text_content() {
        let metrics = FixedMetrics::default();
        let h1 = Node::block(Element::Heading(1), "Chapter One", Style::default(), &metrics);
        assert_eq!(h1.text_content(), "Chapter One");
        assert_eq!(h1.element.heading_level(), Some(1));
    }

    #[test]
    fn test_color_parse() {
        assert_eq!(Rgb::parse("#ff0000"), Some(Rgb::new(1.0, 0.0, 0.0)));
        assert_eq!(Rgb::parse("#fff"), Some(Rgb::WHITE));
        assert_eq!(Rgb::parse("Navy"), Some(Rgb::from_bytes(0, 0, 128)));
        assert_eq!(Rgb::parse("#12"), None);
        assert_eq!(Rgb::parse("chartreuse-ish"), None);
    }

    #[test]
    fn test_raster_image_validation() {
        assert!(RasterImage::new(2, 2, 3, vec![0; 12]).is_some());
        assert!(RasterImage::new(2, 2, 3, vec![0; 11]).is_none());
        assert!(RasterImage::new(2, 2, 2, vec![0; 8]).is_none());
    }
}

//! Sheet geometry: landscape rotation and N-up placement.
//!
//! Logical pages are drawn in their own coordinate frame and mapped onto
//! the physical sheet by an affine [`Matrix`]. With N-up several logical
//! pages share one sheet; each gets a scale + translate (+ rotate)
//! transform into its grid cell.

use crate::layout::{Page, Rect};
use crate::tree::RasterImage;

/// Affine transform in PDF `cm` order: `x' = a x + c y + e`,
/// `y' = b x + d y + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    /// Horizontal scale
    pub a: f32,
    /// Vertical shear
    pub b: f32,
    /// Horizontal shear
    pub c: f32,
    /// Vertical scale
    pub d: f32,
    /// Horizontal translation
    pub e: f32,
    /// Vertical translation
    pub f: f32,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix {
    /// Identity transform.
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    /// Pure translation.
    pub fn translate(tx: f32, ty: f32) -> Self {
        Self {
            e: tx,
            f: ty,
            ..Self::IDENTITY
        }
    }

    /// Uniform scale followed by a translation.
    pub fn scale_translate(scale: f32, tx: f32, ty: f32) -> Self {
        Self {
            a: scale,
            b: 0.0,
            c: 0.0,
            d: scale,
            e: tx,
            f: ty,
        }
    }

    /// Quarter turn counter-clockwise, then shift right by `width` so a
    /// frame of height `width` lands in positive space.
    pub fn quarter_turn(width: f32) -> Self {
        Self {
            a: 0.0,
            b: 1.0,
            c: -1.0,
            d: 0.0,
            e: width,
            f: 0.0,
        }
    }

    /// Landscape content on portrait media shown with `/Rotate 90`;
    /// `media_width` is the portrait media width.
    pub fn landscape(media_width: f32) -> Self {
        Self::quarter_turn(media_width)
    }

    /// Apply `self`, then `next`.
    pub fn then(&self, next: &Matrix) -> Matrix {
        Matrix {
            a: self.a * next.a + self.b * next.c,
            b: self.a * next.b + self.b * next.d,
            c: self.c * next.a + self.d * next.c,
            d: self.c * next.b + self.d * next.d,
            e: self.e * next.a + self.f * next.c + next.e,
            f: self.e * next.b + self.f * next.d + next.f,
        }
    }

    /// Whether this is the identity.
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Transform a point.
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (self.a * x + self.c * y + self.e, self.b * x + self.d * y + self.f)
    }

    /// Bounding box of a transformed rectangle.
    pub fn apply_rect(&self, rect: &Rect) -> Rect {
        let corners = [
            self.apply(rect.x, rect.y),
            self.apply(rect.right(), rect.y),
            self.apply(rect.x, rect.top()),
            self.apply(rect.right(), rect.top()),
        ];
        let min_x = corners.iter().map(|c| c.0).fold(f32::INFINITY, f32::min);
        let max_x = corners.iter().map(|c| c.0).fold(f32::NEG_INFINITY, f32::max);
        let min_y = corners.iter().map(|c| c.1).fold(f32::INFINITY, f32::min);
        let max_y = corners.iter().map(|c| c.1).fold(f32::NEG_INFINITY, f32::max);
        Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// The six operands, formatted for `cm` or `concat`.
    pub fn operands(&self) -> String {
        format!(
            "{} {} {} {} {} {}",
            fmt_num(self.a),
            fmt_num(self.b),
            fmt_num(self.c),
            fmt_num(self.d),
            fmt_num(self.e),
            fmt_num(self.f)
        )
    }
}

/// Format a coordinate with at most three decimals and no trailing zeros.
pub fn fmt_num(value: f32) -> String {
    let rounded = (value * 1000.0).round() / 1000.0;
    if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        let formatted = format!("{:.3}", rounded);
        formatted.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Grid used for a number-up value: columns, rows, and whether the grid
/// is laid out on the sheet turned a quarter.
pub fn nup_grid(nup: u8) -> (u32, u32, bool) {
    match nup {
        2 => (2, 1, true),
        4 => (2, 2, false),
        6 => (3, 2, true),
        9 => (3, 3, false),
        16 => (4, 4, false),
        _ => (1, 1, false),
    }
}

/// Number of physical sheets needed for `pages` logical pages.
pub fn sheet_count(pages: usize, nup: u8) -> usize {
    pages.div_ceil(nup.max(1) as usize)
}

/// Transform placing logical page `slot` on a sheet of `sheet_width` x
/// `sheet_length`, for logical pages of `page_width` x `page_length`.
///
/// Slots fill the grid row by row from the top left. Pages are scaled
/// uniformly to fit their cell and centered in it.
pub fn slot_matrix(
    nup: u8,
    slot: usize,
    sheet_width: f32,
    sheet_length: f32,
    page_width: f32,
    page_length: f32,
) -> Matrix {
    if nup <= 1 {
        return Matrix::IDENTITY;
    }
    let (cols, rows, turned) = nup_grid(nup);
    let (frame_width, frame_length) = if turned {
        (sheet_length, sheet_width)
    } else {
        (sheet_width, sheet_length)
    };

    let cell_width = frame_width / cols as f32;
    let cell_length = frame_length / rows as f32;
    let scale = (cell_width / page_width).min(cell_length / page_length);

    let col = (slot % cols as usize) as f32;
    let row = ((slot / cols as usize) % rows as usize) as f32;
    let cell_x = col * cell_width;
    let cell_y = frame_length - (row + 1.0) * cell_length;
    let tx = cell_x + (cell_width - page_width * scale) * 0.5;
    let ty = cell_y + (cell_length - page_length * scale) * 0.5;

    let placed = Matrix::scale_translate(scale, tx, ty);
    if turned {
        placed.then(&Matrix::quarter_turn(sheet_width))
    } else {
        placed
    }
}

/// Transform from a logical page's printable area to its sheet.
///
/// Content is translated by the margins (the right margin on the back side
/// of a duplex sheet), placed in its N-up slot, then turned onto portrait
/// media when the page is landscape.
pub fn page_matrix(page: &Page, output_index: usize) -> Matrix {
    let nup = page.nup.max(1);
    let margin_x = if page.duplex && output_index % 2 == 1 {
        page.right
    } else {
        page.left
    };
    let slot = output_index % nup as usize;
    let mut matrix = Matrix::translate(margin_x, page.bottom).then(&slot_matrix(
        nup,
        slot,
        page.width,
        page.length,
        page.width,
        page.length,
    ));
    if page.landscape {
        matrix = matrix.then(&Matrix::landscape(page.length));
    }
    matrix
}

/// Portrait media size of the sheet a page is printed on.
pub fn media_size(page: &Page) -> (f32, f32) {
    if page.landscape {
        (page.length, page.width)
    } else {
        (page.width, page.length)
    }
}

/// Upper bound on background tiles per page.
const MAX_TILES: usize = 4096;

/// Tile positions covering `area` with an image drawn `tile_width` wide at
/// its natural aspect ratio.
pub fn background_tiles(area: &Rect, image: &RasterImage, tile_width: f32) -> Vec<Rect> {
    if image.width == 0 || image.height == 0 || tile_width <= 0.0 {
        return Vec::new();
    }
    let tile_height = tile_width * image.height as f32 / image.width as f32;
    let mut tiles = Vec::new();
    let mut y = area.top() - tile_height;
    while y + tile_height > area.y && tiles.len() < MAX_TILES {
        let mut x = area.x;
        while x < area.right() && tiles.len() < MAX_TILES {
            tiles.push(Rect::new(x, y, tile_width, tile_height));
            x += tile_width;
        }
        y -= tile_height;
    }
    tiles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: (f32, f32), b: (f32, f32)) -> bool {
        (a.0 - b.0).abs() < 0.01 && (a.1 - b.1).abs() < 0.01
    }

    #[test]
    fn test_then_composes_in_order() {
        let m = Matrix::translate(10.0, 0.0).then(&Matrix::scale_translate(2.0, 0.0, 0.0));
        assert_eq!(m.apply(1.0, 1.0), (22.0, 2.0));
    }

    #[test]
    fn test_landscape_maps_into_portrait_media() {
        // Landscape 792 x 612 content on 612 x 792 media.
        let m = Matrix::landscape(612.0);
        assert!(close(m.apply(0.0, 0.0), (612.0, 0.0)));
        assert!(close(m.apply(792.0, 612.0), (0.0, 792.0)));
        let r = m.apply_rect(&Rect::new(0.0, 0.0, 792.0, 612.0));
        assert!(close((r.width, r.height), (612.0, 792.0)));
    }

    #[test]
    fn test_sheet_count() {
        assert_eq!(sheet_count(5, 1), 5);
        assert_eq!(sheet_count(5, 4), 2);
        assert_eq!(sheet_count(8, 4), 2);
        assert_eq!(sheet_count(0, 2), 0);
    }

    #[test]
    fn test_four_up_quadrants() {
        let (w, l) = (600.0, 800.0);
        let first = slot_matrix(4, 0, w, l, w, l);
        assert!((first.a - 0.5).abs() < 1e-6);
        assert!(close(first.apply(0.0, 0.0), (0.0, 400.0)));
        let last = slot_matrix(4, 3, w, l, w, l);
        assert!(close(last.apply(w, l), (600.0, 400.0)));
    }

    #[test]
    fn test_two_up_is_turned_and_fits() {
        let (w, l) = (612.0, 792.0);
        for slot in 0..2 {
            let m = slot_matrix(2, slot, w, l, w, l);
            let placed = m.apply_rect(&Rect::new(0.0, 0.0, w, l));
            assert!(placed.x >= -0.01 && placed.y >= -0.01);
            assert!(placed.right() <= w + 0.01 && placed.top() <= l + 0.01);
            // Turned pages are wider than tall on the sheet.
            assert!(placed.width > placed.height);
        }
        let a = slot_matrix(2, 0, w, l, w, l).apply_rect(&Rect::new(0.0, 0.0, w, l));
        let b = slot_matrix(2, 1, w, l, w, l).apply_rect(&Rect::new(0.0, 0.0, w, l));
        assert!(a.y >= b.top() - 0.01 || b.y >= a.top() - 0.01);
    }

    #[test]
    fn test_grids() {
        assert_eq!(nup_grid(1), (1, 1, false));
        assert_eq!(nup_grid(6), (3, 2, true));
        assert_eq!(nup_grid(16), (4, 4, false));
        assert!(slot_matrix(1, 0, 612.0, 792.0, 612.0, 792.0).is_identity());
    }

    fn page(config: &crate::config::ExportConfig) -> Page {
        let mut progress = crate::progress::CollectingProgress::new();
        let mut store = crate::layout::PageStore::new(config);
        store.ensure(0, &mut progress);
        store.get(0).cloned().unwrap()
    }

    #[test]
    fn test_page_matrix_margins() {
        let config = crate::config::ExportConfig::default()
            .with_margins(50.0, 30.0, 36.0, 36.0)
            .with_duplex(true);
        let p = page(&config);
        assert_eq!(page_matrix(&p, 0).apply(0.0, 0.0), (50.0, 36.0));
        assert_eq!(page_matrix(&p, 1).apply(0.0, 0.0), (30.0, 36.0));
        assert_eq!(media_size(&p), (p.width, p.length));
    }

    #[test]
    fn test_page_matrix_landscape() {
        let config = crate::config::ExportConfig::default()
            .with_page_size(612.0, 792.0)
            .with_margins(0.0, 0.0, 0.0, 0.0)
            .with_landscape(true);
        let p = page(&config);
        assert_eq!((p.width, p.length), (792.0, 612.0));
        assert_eq!(media_size(&p), (612.0, 792.0));
        let placed = page_matrix(&p, 0).apply_rect(&Rect::new(0.0, 0.0, p.width, p.length));
        assert!(close((placed.width, placed.height), (612.0, 792.0)));
        assert!(close((placed.x, placed.y), (0.0, 0.0)));
    }

    #[test]
    fn test_background_tiles_cover_area() {
        let image = RasterImage::new(10, 5, 1, vec![0; 50]).unwrap();
        let area = Rect::new(0.0, 0.0, 100.0, 100.0);
        let tiles = background_tiles(&area, &image, 40.0);
        // 3 columns x 5 rows of 40 x 20 tiles
        assert_eq!(tiles.len(), 15);
        assert_eq!(tiles[0], Rect::new(0.0, 80.0, 40.0, 20.0));
        assert!(background_tiles(&area, &image, 0.0).is_empty());
    }

    #[test]
    fn test_fmt_num() {
        assert_eq!(fmt_num(1.0), "1");
        assert_eq!(fmt_num(0.5), "0.5");
        assert_eq!(fmt_num(12.34567), "12.346");
        assert_eq!(fmt_num(-0.0001), "0");
    }
}

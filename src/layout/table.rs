//! Table layout.
//!
//! Column widths come from a five-pass solver over per-column minimum and
//! preferred widths:
//!
//! 1. columns with an explicit `WIDTH` are fixed at `max(requested, min)`
//! 2. the rest get their preferred width, scaled down to fit what is left
//! 3. spanning cells widen the columns they cover when those are too narrow
//! 4. leftover space is shared by the unfixed columns
//! 5. a table wider than allowed is squeezed toward the column minimums
//!
//! Rows are then formatted cell by cell through the flow formatter, each
//! cell in its own region.

use super::directive::parse_comment;
use super::flow::{flatten, Cursor, Formatter, Frag, INDENT};
use super::page::{Primitive, PrimitiveKind, Rect};
use super::region::RegionStack;
use super::{leading_number, parse_dimension};
use crate::progress::DiagnosticKind;
use crate::tree::{Element, HAlign, Node, Rgb, VAlign};
use std::collections::HashMap;

/// Width requested for a column or cell.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum ColumnWidth {
    /// Size from content
    #[default]
    Auto,
    /// Fixed width in points
    Fixed(f32),
    /// Percentage of the table width
    Percent(f32),
}

impl ColumnWidth {
    /// Parse a `WIDTH` attribute value.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        match value.strip_suffix('%') {
            Some(pct) => leading_number(pct).map_or(ColumnWidth::Auto, ColumnWidth::Percent),
            None => leading_number(value).map_or(ColumnWidth::Auto, ColumnWidth::Fixed),
        }
    }

    /// Content width in points; 0 for [`ColumnWidth::Auto`].
    ///
    /// Percentages are of the table width less one cell's padding and
    /// spacing.
    pub fn resolve(self, table_width: f32, cellpadding: f32, cellspacing: f32) -> f32 {
        match self {
            ColumnWidth::Auto => 0.0,
            ColumnWidth::Fixed(w) => w.max(0.0),
            ColumnWidth::Percent(p) => {
                (p * 0.01 * table_width - (2.0 * cellpadding + cellspacing)).max(0.0)
            },
        }
    }
}

/// Measured sizes of one column.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ColumnSizes {
    /// Widest unbreakable content
    pub min: f32,
    /// Widest line of content
    pub pref: f32,
    /// Explicit width in points, 0 when unset
    pub requested: f32,
}

/// Measured sizes of a cell spanning several columns.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpanSizes {
    /// First spanned column
    pub first: usize,
    /// Number of spanned columns
    pub span: usize,
    /// Widest unbreakable content
    pub min: f32,
    /// Explicit width in points, 0 when unset
    pub requested: f32,
}

/// Output of [`solve_columns`].
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSolve {
    /// Content width of each column
    pub widths: Vec<f32>,
    /// Total table width including padding and spacing
    pub width: f32,
}

/// Resolve column widths.
///
/// `width` is the working table width and `table_width` the most the table
/// may occupy; both include the `(2·cellpadding + cellspacing)·n − cellspacing`
/// of padding and spacing between columns.
pub fn solve_columns(
    cols: &[ColumnSizes],
    spans: &[SpanSizes],
    width: f32,
    table_width: f32,
    cellpadding: f32,
    cellspacing: f32,
) -> ColumnSolve {
    let n = cols.len();
    if n == 0 {
        return ColumnSolve {
            widths: Vec::new(),
            width: 0.0,
        };
    }
    let padding = (2.0 * cellpadding + cellspacing) * n as f32 - cellspacing;
    let mut width = width;
    let mut widths = vec![0.0f32; n];
    let mut fixed = vec![false; n];
    let mut actual = padding;

    // Pass 1: explicit widths
    for (c, col) in cols.iter().enumerate() {
        if col.requested > 0.0 {
            widths[c] = col.requested.max(col.min);
            fixed[c] = true;
            actual += widths[c];
        }
    }

    // Pass 2: preferred widths, minimum under pressure
    let pref_sum: f32 = cols
        .iter()
        .zip(&fixed)
        .filter(|(_, f)| !**f)
        .map(|(c, _)| c.pref)
        .sum();
    let scale = if pref_sum > 0.0 {
        ((width - actual) / pref_sum).clamp(0.0, 1.0)
    } else {
        0.0
    };
    for c in 0..n {
        if fixed[c] {
            continue;
        }
        let pref = (cols[c].pref * scale).max(cols[c].min);
        widths[c] = if actual + pref > width {
            if c == n - 1 && width - actual >= cols[c].min {
                width - actual
            } else {
                cols[c].min
            }
        } else {
            pref
        };
        actual += widths[c];
    }

    // Pass 3: spanning cells
    for span in spans {
        let end = (span.first + span.span).min(n);
        if span.first >= end {
            continue;
        }
        let range = span.first..end;
        let mut span_width: f32 = widths[range.clone()].iter().sum();
        let mut wanted = 0.0f32;
        if span_width < span.requested {
            wanted = span.requested;
        }
        if span_width < span.min && wanted < span.min {
            wanted = span.min;
        }
        for c in range.clone().filter(|c| fixed[*c]) {
            span_width -= widths[c];
            wanted -= widths[c];
        }
        if wanted <= 0.0 || wanted <= span_width {
            continue;
        }
        if span_width >= 1.0 {
            let ratio = wanted / span_width;
            for c in range.filter(|c| !fixed[*c]) {
                actual -= widths[c];
                widths[c] *= ratio;
                actual += widths[c];
            }
        } else {
            // Nothing to scale: every spanned column gets an equal share.
            let share = wanted / (end - span.first) as f32;
            for c in range {
                widths[c] += share;
                actual += share;
            }
        }
    }

    // Pass 4: leftover space
    if width > actual {
        let open: Vec<usize> = (0..n).filter(|c| !fixed[*c]).collect();
        let targets: Vec<usize> = if open.is_empty() { (0..n).collect() } else { open };
        let share = (width - actual) / targets.len() as f32;
        for c in targets {
            widths[c] += share;
        }
    } else {
        width = actual;
    }

    // Pass 5: squeeze
    if width > table_width {
        let available = table_width - padding;
        let min_sum: f32 = cols.iter().map(|c| c.min).sum();
        let col_sum: f32 = widths.iter().sum();
        let extra = (available - min_sum).max(0.0);
        let spread = (col_sum - min_sum).max(1.0);
        for (w, col) in widths.iter_mut().zip(cols) {
            *w = col.min + extra * (*w - col.min) / spread;
        }
        width = widths.iter().sum::<f32>() + padding;
    }

    ColumnSolve { widths, width }
}

/// Resolved horizontal geometry of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableGeometry {
    /// Effective cell padding (border and implicit border included)
    pub cellpadding: f32,
    /// Cell spacing
    pub cellspacing: f32,
    /// Border width, 0 for none
    pub border: f32,
    /// Content width per column
    pub widths: Vec<f32>,
    /// Content left edge per column
    pub lefts: Vec<f32>,
    /// Total width
    pub width: f32,
}

impl TableGeometry {
    fn right(&self, col: usize) -> f32 {
        self.lefts[col] + self.widths[col]
    }
}

/// Size of formatted content.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CellSize {
    /// Widest unbreakable run
    pub min: f32,
    /// Widest line between hard breaks
    pub pref: f32,
    /// Tallest fragment
    pub height: f32,
}

#[derive(Debug, Default)]
struct Measure {
    size: CellSize,
    word: f32,
    line: f32,
}

impl Measure {
    fn end_word(&mut self) {
        self.size.min = self.size.min.max(self.word);
        self.word = 0.0;
    }

    fn end_line(&mut self) {
        self.end_word();
        self.size.pref = self.size.pref.max(self.line);
        self.line = 0.0;
    }

    fn block(&mut self, inner: CellSize, indent: f32) {
        self.end_line();
        self.size.min = self.size.min.max(inner.min + indent);
        self.size.pref = self.size.pref.max(inner.pref + indent);
        self.size.height = self.size.height.max(inner.height);
    }

    fn finish(mut self) -> CellSize {
        self.end_line();
        self.size
    }
}

#[derive(Debug)]
struct GridCell<'t> {
    node: &'t Node,
    row: usize,
    col: usize,
    rowspan: usize,
    colspan: usize,
}

#[derive(Debug)]
struct GridRow<'t> {
    node: &'t Node,
    comments: Vec<&'t Node>,
}

#[derive(Debug, Default)]
struct Grid<'t> {
    cells: Vec<GridCell<'t>>,
    rows: Vec<GridRow<'t>>,
    /// Cell index by `[row][col]`
    slots: Vec<Vec<Option<usize>>>,
    cols: usize,
    captions: Vec<&'t Node>,
    truncated: bool,
}

fn collect_rows<'t>(
    node: &'t Node,
    rows: &mut Vec<GridRow<'t>>,
    captions: &mut Vec<&'t Node>,
    comments: &mut Vec<&'t Node>,
) {
    for child in &node.children {
        match child.element {
            Element::Caption => captions.push(child),
            Element::RowGroup => collect_rows(child, rows, captions, comments),
            Element::Comment => comments.push(child),
            Element::Tr => rows.push(GridRow {
                node: child,
                comments: std::mem::take(comments),
            }),
            _ => {},
        }
    }
}

fn span_attr(node: &Node, name: &str) -> usize {
    node.attr(name)
        .and_then(leading_number)
        .map_or(1, |v| (v as usize).max(1))
}

impl<'t> Grid<'t> {
    fn build(table: &'t Node, max_columns: usize) -> Self {
        let mut grid = Grid::default();
        let mut comments = Vec::new();
        collect_rows(table, &mut grid.rows, &mut grid.captions, &mut comments);
        let nrows = grid.rows.len();
        grid.slots = vec![Vec::new(); nrows];

        for r in 0..nrows {
            let tr = grid.rows[r].node;
            let mut col = 0;
            for td in tr
                .children
                .iter()
                .filter(|c| matches!(c.element, Element::Td | Element::Th))
            {
                while grid.slots[r].get(col).is_some_and(Option::is_some) {
                    col += 1;
                }
                if col >= max_columns {
                    grid.truncated = true;
                    break;
                }
                let colspan = span_attr(td, "COLSPAN").min(max_columns - col);
                let rowspan = span_attr(td, "ROWSPAN").min(nrows - r);
                let index = grid.cells.len();
                grid.cells.push(GridCell {
                    node: td,
                    row: r,
                    col,
                    rowspan,
                    colspan,
                });
                for row in &mut grid.slots[r..r + rowspan] {
                    if row.len() < col + colspan {
                        row.resize(col + colspan, None);
                    }
                    for slot in &mut row[col..col + colspan] {
                        *slot = Some(index);
                    }
                }
                col += colspan;
            }
        }
        grid.cols = grid.slots.iter().map(Vec::len).max().unwrap_or(0);
        grid
    }

    fn starting(&self, row: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.cells.len()).filter(move |i| self.cells[*i].row == row)
    }

    fn ending(&self, row: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.cells.len()).filter(move |i| {
            let cell = &self.cells[*i];
            cell.row + cell.rowspan - 1 == row
        })
    }

    fn occupying(&self, row: usize) -> impl Iterator<Item = usize> + '_ {
        let mut seen: Vec<usize> = self.slots[row].iter().flatten().copied().collect();
        seen.dedup();
        seen.into_iter()
    }
}

/// Table setup attributes: `(cellpadding, cellspacing, border)`.
fn table_spacing(table: &Node) -> (f32, f32, f32) {
    let mut cellpadding = table
        .attr("CELLPADDING")
        .and_then(leading_number)
        .unwrap_or(1.0);
    let cellspacing = table
        .attr("CELLSPACING")
        .and_then(leading_number)
        .unwrap_or(0.0);
    let border = match table.attr("BORDER") {
        Some(value) => {
            let b = leading_number(value).unwrap_or(0.0);
            if b == 0.0 && !value.trim_start().starts_with('0') {
                1.0
            } else {
                b
            }
        },
        None => 0.0,
    };
    cellpadding += border;
    if border == 0.0 && cellpadding > 0.0 {
        // Browsers reserve an invisible one-point border.
        cellpadding += 1.0;
    }
    (cellpadding, cellspacing, border)
}

fn parse_halign(value: &str) -> Option<HAlign> {
    match value.trim().to_ascii_lowercase().as_str() {
        "left" => Some(HAlign::Left),
        "center" | "middle" => Some(HAlign::Center),
        "right" => Some(HAlign::Right),
        "justify" => Some(HAlign::Justify),
        _ => None,
    }
}

fn parse_valign(value: &str) -> Option<VAlign> {
    match value.trim().to_ascii_lowercase().as_str() {
        "top" | "baseline" => Some(VAlign::Top),
        "middle" | "center" => Some(VAlign::Middle),
        "bottom" => Some(VAlign::Bottom),
        _ => None,
    }
}

/// Where a formatted cell starts and ends.
#[derive(Debug, Clone, Copy, Default)]
struct CellSpan {
    start_page: usize,
    start_index: usize,
    top: f32,
    end_page: usize,
    end_y: f32,
    end_index: usize,
}

impl<'a> Formatter<'a> {
    fn measure_frags(&self, frags: &[Frag<'_>], m: &mut Measure) {
        for frag in frags {
            if frag.is_break() {
                m.end_line();
                continue;
            }
            let width = self.frag_width(frag);
            if frag.is_space() {
                m.end_word();
                m.line += width;
                continue;
            }
            m.word += width;
            m.line += width;
            let height = match frag.node.element {
                Element::Text => frag.node.height,
                Element::Image => frag.node.height + 2.0 * self.image_border(frag.node, frag.link),
                _ => 0.0,
            };
            m.size.height = m.size.height.max(height);
        }
    }

    fn measure_nodes(&self, nodes: &[Node], m: &mut Measure) {
        let mut frags = Vec::new();
        for node in nodes {
            if node.element.is_inline() {
                flatten(node, None, &mut frags);
                continue;
            }
            self.measure_frags(&frags, m);
            frags.clear();
            m.end_line();

            match node.element {
                Element::Comment | Element::Ignored | Element::Hr => {},
                Element::Table => {
                    let size = self.measure_table(node);
                    m.block(size, 0.0);
                },
                Element::Pre => {
                    let mut pre = Measure::default();
                    for line in node.text_content().lines() {
                        let style = &node.style;
                        let expanded = line.replace('\t', "        ");
                        let w = self
                            .metrics
                            .text_width(&expanded, style.typeface, style.font_style, style.size);
                        pre.size.min = pre.size.min.max(w);
                        pre.size.pref = pre.size.pref.max(w);
                        pre.size.height = pre.size.height.max(style.line_height);
                    }
                    m.block(pre.size, 0.0);
                },
                Element::Blockquote | Element::Ul | Element::Ol | Element::Dl => {
                    let mut inner = Measure::default();
                    self.measure_nodes(&node.children, &mut inner);
                    let indent = if node.element == Element::Blockquote {
                        2.0 * INDENT
                    } else {
                        INDENT
                    };
                    m.block(inner.finish(), indent);
                },
                _ => {
                    self.measure_nodes(&node.children, m);
                    m.end_line();
                },
            }
        }
        self.measure_frags(&frags, m);
    }

    /// Minimum, preferred and height of a cell's content.
    fn measure_cell(&self, cell: &Node) -> CellSize {
        let mut m = Measure::default();
        self.measure_nodes(&cell.children, &mut m);
        let mut size = m.finish();
        if cell.has_attr("NOWRAP") {
            size.min = size.pref;
        }
        if let Some(height) = cell.attr("HEIGHT").and_then(leading_number) {
            size.height = size.height.max(height);
        }
        size
    }

    /// Size of a nested table.
    fn measure_table(&self, table: &Node) -> CellSize {
        let grid = Grid::build(table, self.config.limits.max_columns);
        let (cp, cs, _) = table_spacing(table);
        let mut cols = vec![ColumnSizes::default(); grid.cols];
        let mut height = 0.0f32;
        for cell in &grid.cells {
            let size = self.measure_cell(cell.node);
            height = height.max(size.height);
            if cell.colspan == 1 {
                let col = &mut cols[cell.col];
                col.min = col.min.max(size.min);
                col.pref = col.pref.max(size.pref);
                if let Some(ColumnWidth::Fixed(w)) = cell.node.attr("WIDTH").map(ColumnWidth::parse) {
                    col.min = col.min.max(w);
                    col.pref = col.pref.max(w);
                }
            }
        }
        if grid.cols == 0 {
            return CellSize::default();
        }
        let padding = (2.0 * cp + cs) * grid.cols as f32 - cs;
        let mut size = CellSize {
            min: cols.iter().map(|c| c.min).sum::<f32>() + padding,
            pref: cols.iter().map(|c| c.pref).sum::<f32>() + padding,
            height,
        };
        if let Some(ColumnWidth::Fixed(w)) = table.attr("WIDTH").map(ColumnWidth::parse) {
            size.min = size.min.max(w);
            size.pref = size.pref.max(w);
        }
        size
    }

    fn layout_table<'t>(&mut self, table: &'t Node, left: f32, right: f32) -> (Grid<'t>, TableGeometry) {
        let grid = Grid::build(table, self.config.limits.max_columns);
        if grid.truncated {
            let max = self.config.limits.max_columns;
            self.report(
                DiagnosticKind::ContentTooLarge,
                format!("table has more than {} columns; extra cells dropped", max),
            );
        }
        let (cp, cs, border) = table_spacing(table);
        let region = right - left;

        let explicit = table.attr("WIDTH").and_then(|w| parse_dimension(w, region));
        let table_width = explicit.unwrap_or(region).min(region);

        let mut cols = vec![ColumnSizes::default(); grid.cols];
        let mut spans = Vec::new();
        let mut any_percent = false;
        for cell in &grid.cells {
            let size = self.measure_cell(cell.node);
            let requested = match cell.node.attr("WIDTH").map(ColumnWidth::parse) {
                Some(width @ ColumnWidth::Percent(_)) => {
                    any_percent = true;
                    width.resolve(table_width, cp, cs)
                },
                Some(width) => width.resolve(table_width, cp, cs),
                None => 0.0,
            };
            if cell.colspan > 1 {
                spans.push(SpanSizes {
                    first: cell.col,
                    span: cell.colspan,
                    min: size.min,
                    requested,
                });
            } else {
                let col = &mut cols[cell.col];
                col.min = col.min.max(size.min);
                col.pref = col.pref.max(size.pref);
                col.requested = col.requested.max(requested);
            }
        }

        let padding = if grid.cols > 0 {
            (2.0 * cp + cs) * grid.cols as f32 - cs
        } else {
            0.0
        };
        let width = if explicit.is_some() {
            table_width
        } else if any_percent {
            region
        } else {
            (cols.iter().map(|c| c.pref).sum::<f32>() + padding).min(region)
        };

        let solved = solve_columns(&cols, &spans, width, table_width, cp, cs);

        let align = table
            .attr("ALIGN")
            .and_then(parse_halign)
            .unwrap_or(table.style.halign);
        let mut x = match align {
            HAlign::Center => left + 0.5 * (region - solved.width) + cp,
            HAlign::Right => right - solved.width + cp,
            _ => left + cp,
        };
        let mut lefts = Vec::with_capacity(solved.widths.len());
        for w in &solved.widths {
            lefts.push(x);
            x += w + 2.0 * cp + cs;
        }
        log::debug!(
            "Table {}x{}: width {:.1}, columns {:?}",
            grid.cols,
            grid.rows.len(),
            solved.width,
            solved.widths
        );

        let geometry = TableGeometry {
            cellpadding: cp,
            cellspacing: cs,
            border,
            widths: solved.widths,
            lefts,
            width: solved.width,
        };
        (grid, geometry)
    }

    /// Horizontal geometry a table would get between `left` and `right`.
    pub fn resolve_table(&mut self, table: &Node, left: f32, right: f32) -> TableGeometry {
        self.layout_table(table, left, right).1
    }

    /// Explicit row height from the table, the row or a single-row cell.
    fn row_height_attr(&self, table: &Node, grid: &Grid<'_>, row: usize, relative: f32) -> Option<f32> {
        if let Some(h) = table.attr("HEIGHT").and_then(|v| parse_dimension(v, relative)) {
            return Some(h / grid.rows.len().max(1) as f32);
        }
        if let Some(h) = grid.rows[row].node.attr("HEIGHT").and_then(|v| parse_dimension(v, relative)) {
            return Some(h);
        }
        grid.starting(row)
            .filter(|i| grid.cells[*i].rowspan == 1)
            .find_map(|i| grid.cells[i].node.attr("HEIGHT"))
            .and_then(|v| parse_dimension(v, relative))
    }

    fn cell_background(&self, table: &Node, grid: &Grid<'_>, cell: &GridCell<'_>) -> Option<Rgb> {
        cell.node
            .attr("BGCOLOR")
            .or_else(|| grid.rows[cell.row].node.attr("BGCOLOR"))
            .or_else(|| table.attr("BGCOLOR"))
            .and_then(Rgb::parse)
    }

    /// Background and border boxes of a cell from `top` on its first page to
    /// `bottom` on its last page.
    #[allow(clippy::too_many_arguments)]
    fn cell_boxes(
        &self,
        out: &mut Vec<Primitive>,
        (first, top): (usize, f32),
        (last, bottom): (usize, f32),
        (x0, x1): (f32, f32),
        frame: &RegionStack,
        background: Option<Rgb>,
        border: f32,
        border_color: Rgb,
    ) {
        let width = x1 - x0;
        for page in first..=last {
            let y1 = if page == first { top } else { frame.top() };
            let y0 = if page == last { bottom } else { frame.base_bottom() };
            let height = y1 - y0;
            if height <= 0.0 {
                continue;
            }
            if let Some(color) = background {
                out.push(Primitive {
                    page,
                    rect: Rect::new(x0, y0, width, height),
                    kind: PrimitiveKind::FilledBox { color },
                });
            }
            if border <= 0.0 {
                continue;
            }
            let mut edge = |rect: Rect| {
                out.push(Primitive {
                    page,
                    rect,
                    kind: PrimitiveKind::FilledBox {
                        color: border_color,
                    },
                })
            };
            edge(Rect::new(x0, y0, border, height));
            edge(Rect::new(x1 - border, y0, border, height));
            if page == first {
                edge(Rect::new(x0, y1 - border, width, border));
            }
            if page == last {
                edge(Rect::new(x0, y0, width, border));
            }
        }
    }

    /// Format a table at the cursor.
    pub(crate) fn render_table(&mut self, table: &Node, frame: &mut RegionStack, cur: &mut Cursor) {
        frame.clear(cur.y, cur.page);
        let (grid, geo) = self.layout_table(table, frame.left(), frame.right());

        for caption in &grid.captions {
            self.open_block(&caption.style, frame, cur);
            self.render_nodes(&caption.children, HAlign::Center, frame, cur);
            self.needspace = true;
        }
        if geo.widths.is_empty() || grid.rows.is_empty() {
            return;
        }

        self.open_block(&table.style, frame, cur);
        let cp = geo.cellpadding;
        let cs = geo.cellspacing;
        let border_color = table
            .attr("BORDERCOLOR")
            .and_then(Rgb::parse)
            .unwrap_or(Rgb::BLACK);

        self.pages.ensure(cur.page, &mut *self.progress);
        let table_page = cur.page;
        let table_index = self.pages.primitive_count(cur.page);
        let mut decorations: Vec<Primitive> = Vec::new();
        let mut spans = vec![CellSpan::default(); grid.cells.len()];
        let saved_lists = self.take_lists();

        for r in 0..grid.rows.len() {
            for comment in &grid.rows[r].comments {
                let parsed = parse_comment(comment.text.as_deref().unwrap_or_default());
                if !parsed.directives.is_empty() || parsed.error.is_some() {
                    self.apply_directives(parsed, frame, cur);
                }
            }

            let page_length = self.page_like(cur.page).length;
            let print_length = self.page_like(cur.page).print_length();
            let explicit = self.row_height_attr(table, &grid, r, print_length - 2.0 * cp);
            let hint = match explicit {
                Some(h) => h - 2.0 * cp,
                None => grid
                    .occupying(r)
                    .map(|i| self.measure_cell(grid.cells[i].node).height)
                    .fold(self.config.paragraph_spacing, f32::max)
                    .min(page_length / 8.0),
            };
            let bottom = frame.base_bottom();
            if cur.y < bottom + 2.0 * cp + hint && hint <= frame.top() - bottom - 2.0 * cp {
                self.new_page(frame, cur);
            }

            // Format the cells that start in this row.
            let start_y = cur.y - cp;
            for index in grid.starting(r).collect::<Vec<_>>() {
                let cell = &grid.cells[index];
                let last = (cell.col + cell.colspan - 1).min(geo.widths.len() - 1);
                let left = geo.lefts[cell.col];
                let right = geo.right(last);

                self.pages.ensure(cur.page, &mut *self.progress);
                let start_index = self.pages.primitive_count(cur.page);
                let mut cell_frame = RegionStack::new(left, right, frame.base_bottom() + cp, frame.top() - cp);
                let mut cell_cur = Cursor {
                    x: left,
                    y: start_y,
                    page: cur.page,
                };

                let saved = (self.pending_space, self.needspace);
                self.pending_space = 0.0;
                self.needspace = false;
                let default_align = if cell.node.element == Element::Th {
                    HAlign::Center
                } else {
                    cell.node.style.halign
                };
                let align = cell
                    .node
                    .attr("ALIGN")
                    .or_else(|| grid.rows[r].node.attr("ALIGN"))
                    .and_then(parse_halign)
                    .unwrap_or(default_align);
                self.render_nodes(&cell.node.children, align, &mut cell_frame, &mut cell_cur);
                (self.pending_space, self.needspace) = saved;

                spans[index] = CellSpan {
                    start_page: cur.page,
                    start_index,
                    top: start_y,
                    end_page: cell_cur.page,
                    end_y: cell_cur.y,
                    end_index: self.pages.primitive_count(cell_cur.page),
                };
            }

            // The row ends at the lowest cell that finishes here.
            let mut row_page = cur.page;
            let mut row_y = start_y;
            let mut do_valign = true;
            let ending: Vec<usize> = grid.ending(r).collect();
            for &index in &ending {
                let span = spans[index];
                if span.start_page != span.end_page {
                    do_valign = false;
                }
                if span.end_page > row_page {
                    row_page = span.end_page;
                    row_y = span.end_y;
                } else if span.end_page == row_page && span.end_y < row_y {
                    row_y = span.end_y;
                }
            }

            if do_valign {
                if let Some(h) = explicit {
                    if row_page == cur.page && start_y - row_y < h {
                        row_y = cur.y - h;
                    }
                }
                for &index in &ending {
                    let span = spans[index];
                    if span.start_page != row_page || span.end_page != row_page {
                        continue;
                    }
                    let cell = &grid.cells[index];
                    let valign = cell
                        .node
                        .attr("VALIGN")
                        .or_else(|| grid.rows[cell.row].node.attr("VALIGN"))
                        .and_then(parse_valign)
                        .unwrap_or(cell.node.style.valign);
                    let used = span.top - span.end_y;
                    let avail = span.top - row_y;
                    let delta = match valign {
                        VAlign::Top => 0.0,
                        VAlign::Middle => (avail - used) * 0.5,
                        VAlign::Bottom => avail - used,
                    };
                    if delta > 0.0 {
                        if let Some(page) = self.pages.get_mut(span.start_page) {
                            let prims = page.primitives_mut();
                            let end = span.end_index.min(prims.len());
                            for prim in &mut prims[span.start_index.min(end)..end] {
                                prim.rect.y -= delta;
                            }
                        }
                    }
                }
            }

            for &index in &ending {
                let cell = &grid.cells[index];
                let span = spans[index];
                let last = (cell.col + cell.colspan - 1).min(geo.widths.len() - 1);
                let background = self.cell_background(table, &grid, cell);
                self.cell_boxes(
                    &mut decorations,
                    (span.start_page, span.top + cp),
                    (row_page, row_y - cp),
                    (geo.lefts[cell.col] - cp, geo.right(last) + cp),
                    frame,
                    background,
                    geo.border,
                    border_color,
                );
            }

            cur.page = row_page;
            cur.y = row_y - cp;
            if r + 1 < grid.rows.len() {
                cur.y -= cs;
            }
        }

        // Backgrounds and borders go under the table's content.
        let mut next_index: HashMap<usize, usize> = HashMap::new();
        for prim in decorations {
            let slot = next_index
                .entry(prim.page)
                .or_insert(if prim.page == table_page { table_index } else { 0 });
            let at = *slot;
            *slot += 1;
            self.pages.insert_at(at, prim, &mut *self.progress);
        }

        self.restore_lists(saved_lists);
        cur.x = frame.left();
        self.close_block(&table.style);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExportConfig, OutputType};
    use crate::fonts::FixedMetrics;
    use crate::progress::CollectingProgress;
    use crate::tree::{Document, Style};

    fn col(min: f32, pref: f32, requested: f32) -> ColumnSizes {
        ColumnSizes { min, pref, requested }
    }

    #[test]
    fn test_column_width_parse() {
        assert_eq!(ColumnWidth::parse("100"), ColumnWidth::Fixed(100.0));
        assert_eq!(ColumnWidth::parse(" 50% "), ColumnWidth::Percent(50.0));
        assert_eq!(ColumnWidth::parse("wide"), ColumnWidth::Auto);
        assert_eq!(ColumnWidth::Percent(50.0).resolve(400.0, 2.0, 0.0), 196.0);
    }

    #[test]
    fn test_fixed_percent_and_auto_columns() {
        let cols = [col(20.0, 40.0, 100.0), col(20.0, 40.0, 196.0), col(22.0, 22.0, 0.0)];
        let solved = solve_columns(&cols, &[], 400.0, 400.0, 2.0, 0.0);
        assert_eq!(solved.widths, vec![100.0, 196.0, 92.0]);
        assert_eq!(solved.width, 400.0);
    }

    #[test]
    fn test_preferred_widths_fit() {
        let cols = [col(10.0, 50.0, 0.0), col(10.0, 70.0, 0.0)];
        let solved = solve_columns(&cols, &[], 124.0, 400.0, 1.0, 0.0);
        assert_eq!(solved.widths, vec![50.0, 70.0]);
    }

    #[test]
    fn test_pressure_scales_preferred() {
        // 100 of content space for 300 of preference: scale 1/3.
        let cols = [col(10.0, 150.0, 0.0), col(10.0, 150.0, 0.0)];
        let solved = solve_columns(&cols, &[], 104.0, 104.0, 1.0, 0.0);
        assert!((solved.widths[0] - 50.0).abs() < 0.001);
        assert!((solved.widths[1] - 50.0).abs() < 0.001);
    }

    #[test]
    fn test_minimum_wins_over_scaled_preferred() {
        let cols = [col(80.0, 150.0, 0.0), col(10.0, 150.0, 0.0)];
        let solved = solve_columns(&cols, &[], 100.0, 100.0, 0.0, 0.0);
        assert!(solved.widths[0] >= 80.0);
        assert!(solved.widths[1] >= 10.0);
        assert!(solved.width <= 100.0 + 0.001);
    }

    #[test]
    fn test_span_widens_columns_proportionally() {
        let cols = [col(10.0, 20.0, 0.0), col(10.0, 60.0, 0.0)];
        let spans = [SpanSizes {
            first: 0,
            span: 2,
            min: 160.0,
            requested: 0.0,
        }];
        let solved = solve_columns(&cols, &spans, 80.0, 400.0, 0.0, 0.0);
        assert!((solved.widths[0] - 40.0).abs() < 0.001);
        assert!((solved.widths[1] - 120.0).abs() < 0.001);
    }

    #[test]
    fn test_span_over_empty_columns_splits_equally() {
        let cols = [col(0.0, 0.0, 0.0), col(0.0, 0.0, 0.0)];
        let spans = [SpanSizes {
            first: 0,
            span: 2,
            min: 90.0,
            requested: 0.0,
        }];
        let solved = solve_columns(&cols, &spans, 0.0, 400.0, 0.0, 0.0);
        assert_eq!(solved.widths, vec![45.0, 45.0]);
    }

    #[test]
    fn test_squeeze_respects_minimums() {
        let cols = [col(50.0, 50.0, 300.0), col(60.0, 60.0, 300.0)];
        let solved = solve_columns(&cols, &[], 200.0, 200.0, 0.0, 0.0);
        assert!((solved.width - 200.0).abs() < 0.01);
        assert!(solved.widths[0] >= 50.0);
        assert!(solved.widths[1] >= 60.0);
    }

    #[test]
    fn test_empty_table() {
        let solved = solve_columns(&[], &[], 100.0, 100.0, 1.0, 0.0);
        assert!(solved.widths.is_empty());
        assert_eq!(solved.width, 0.0);
    }

    fn cell(text: &str, metrics: &FixedMetrics) -> Node {
        Node::block(Element::Td, text, Style::default(), metrics)
    }

    #[test]
    fn test_table_spacing_rules() {
        assert_eq!(table_spacing(&Node::new(Element::Table)), (2.0, 0.0, 0.0));
        let bordered = Node::new(Element::Table).with_attr("BORDER", "");
        assert_eq!(table_spacing(&bordered), (2.0, 0.0, 1.0));
        let tight = Node::new(Element::Table)
            .with_attr("CELLPADDING", "0")
            .with_attr("CELLSPACING", "3");
        assert_eq!(table_spacing(&tight), (0.0, 3.0, 0.0));
    }

    #[test]
    fn test_grid_rowspan_occupancy() {
        let metrics = FixedMetrics::default();
        let table = Node::new(Element::Table)
            .with_child(
                Node::new(Element::Tr)
                    .with_child(cell("a", &metrics).with_attr("ROWSPAN", "2"))
                    .with_child(cell("b", &metrics)),
            )
            .with_child(Node::new(Element::Tr).with_child(cell("c", &metrics)));
        let grid = Grid::build(&table, 200);
        assert_eq!(grid.cols, 2);
        assert_eq!(grid.cells[2].col, 1);
        assert_eq!(grid.cells[2].row, 1);
        assert_eq!(grid.ending(1).collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn test_resolve_table_geometry() {
        let metrics = FixedMetrics::default();
        let config = ExportConfig::default().with_output_type(OutputType::Continuous);
        let mut progress = CollectingProgress::new();
        let doc = Document::default();
        let mut formatter = Formatter::new(&config, &metrics, &mut progress, &doc.images);

        let table = Node::new(Element::Table).with_child(
            Node::new(Element::Tr)
                .with_child(cell("a", &metrics).with_attr("WIDTH", "100"))
                .with_child(cell("b", &metrics).with_attr("WIDTH", "50%"))
                .with_child(cell("c", &metrics)),
        );
        let geo = formatter.resolve_table(&table, 0.0, 400.0);
        assert_eq!(geo.cellpadding, 2.0);
        assert_eq!(geo.widths, vec![100.0, 196.0, 92.0]);
        assert_eq!(geo.lefts, vec![2.0, 106.0, 306.0]);
    }

    #[test]
    fn test_rendered_cells_and_backgrounds() {
        let metrics = FixedMetrics::default();
        let config = ExportConfig::default()
            .with_output_type(OutputType::Continuous)
            .with_header(Default::default())
            .with_footer(Default::default());
        let table = Node::new(Element::Table)
            .with_attr("BGCOLOR", "#ff0000")
            .with_attr("BORDER", "1")
            .with_child(
                Node::new(Element::Tr)
                    .with_child(cell("left", &metrics))
                    .with_child(cell("right", &metrics)),
            );
        let doc = Document::new(vec![table]);
        let mut progress = CollectingProgress::new();
        let result = Formatter::new(&config, &metrics, &mut progress, &doc.images).paginate(&doc);
        let page = result.pages.get(0).unwrap();
        let prims = page.primitives();
        // Decorations precede the cell text.
        let first_text = prims.iter().position(|p| p.is_text()).unwrap();
        assert!(first_text > 0);
        assert!(prims[..first_text]
            .iter()
            .all(|p| matches!(p.kind, PrimitiveKind::FilledBox { .. })));
        assert_eq!(page.text(), "left right");
        let texts: Vec<_> = prims.iter().filter(|p| p.is_text()).collect();
        assert_eq!(texts[0].rect.y, texts[1].rect.y);
        assert!(texts[1].rect.x > texts[0].rect.right());
    }

    #[test]
    fn test_middle_valign_shifts_short_cell() {
        let metrics = FixedMetrics::default();
        let config = ExportConfig::default()
            .with_output_type(OutputType::Continuous)
            .with_header(Default::default())
            .with_footer(Default::default());
        let mut tall = cell("one", &metrics);
        tall.children.push(Node::new(Element::Br));
        tall.children.extend(Node::words("two", &Style::default(), &metrics));
        tall.children.push(Node::new(Element::Br));
        tall.children.extend(Node::words("three", &Style::default(), &metrics));
        let short = cell("mid", &metrics).with_attr("VALIGN", "middle");
        let top = cell("top", &metrics).with_attr("VALIGN", "top");
        let table = Node::new(Element::Table).with_child(
            Node::new(Element::Tr).with_child(tall).with_child(short).with_child(top),
        );
        let doc = Document::new(vec![table]);
        let mut progress = CollectingProgress::new();
        let result = Formatter::new(&config, &metrics, &mut progress, &doc.images).paginate(&doc);
        let page = result.pages.get(0).unwrap();
        let find = |t: &str| {
            page.primitives()
                .iter()
                .find(|p| matches!(&p.kind, PrimitiveKind::Text { text, .. } if text == t))
                .map(|p| p.rect.y)
                .unwrap()
        };
        assert!((find("mid") - find("two")).abs() < 0.01);
        assert!((find("top") - find("one")).abs() < 0.01);
    }

    #[test]
    fn test_rows_break_across_pages() {
        let metrics = FixedMetrics::default();
        let config = ExportConfig::default()
            .with_output_type(OutputType::Continuous)
            .with_header(Default::default())
            .with_footer(Default::default())
            .with_page_size(300.0, 200.0)
            .with_margins(20.0, 20.0, 20.0, 20.0);
        let rows: Vec<Node> = (0..20)
            .map(|i| Node::new(Element::Tr).with_child(cell(&format!("row{}", i), &metrics)))
            .collect();
        let table = Node::new(Element::Table).with_children(rows);
        let doc = Document::new(vec![table]);
        let mut progress = CollectingProgress::new();
        let result = Formatter::new(&config, &metrics, &mut progress, &doc.images).paginate(&doc);
        assert!(result.pages.len() > 1);
        let all: String = result.pages.iter().map(|p| p.text()).collect::<Vec<_>>().join(" ");
        assert!(all.contains("row0") && all.contains("row19"));
        for page in result.pages.iter() {
            for prim in page.primitives().iter().filter(|p| p.is_text()) {
                assert!(prim.rect.y >= 0.0);
            }
        }
    }
}

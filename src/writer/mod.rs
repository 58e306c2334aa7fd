//! Output serializers.
//!
//! Both formats consume a finished [`Pagination`](crate::layout::Pagination):
//!
//! ```text
//! Pagination
//!     ↓
//! [HeadFootRenderer] (adds header/footer primitives)
//!     ↓
//! [PdfWriter] or [PsWriter]
//!     ↓                      ↘
//! [ContentStreamBuilder]      DSC page sections
//! [ObjectSerializer] + [ObjectAllocator]
//!     ↓
//! bytes
//! ```
//!
//! Page geometry shared by both (margins, N-up slots, landscape turn)
//! lives in [`sheet`].

pub mod content;
mod filter;
pub mod font_program;
pub mod header_footer;
pub mod image;
mod object_serializer;
pub mod outline;
mod pdf;
mod postscript;
pub mod sheet;
pub mod xref;

pub use content::{encode_text, encode_win_ansi, ContentStreamBuilder, ContentStreamOp};
pub use filter::{ascii85, deflate, encode_jpeg, Ascii85Writer, HexWriter};
pub use font_program::Type1Program;
pub use header_footer::{resolve, HFAlignment, HeadFootRenderer, PlaceholderContext};
pub use image::{ImageColor, ImageEncoding, ImageManager, PreparedImage};
pub use object_serializer::ObjectSerializer;
pub use outline::{OutlineBuildResult, OutlineBuilder, OutlineItem};
pub use pdf::PdfWriter;
pub use postscript::PsWriter;
pub use sheet::{nup_grid, page_matrix, sheet_count, Matrix};
pub use xref::ObjectAllocator;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let _serializer = ObjectSerializer::new();
        let _builder = ContentStreamBuilder::new();
        let _allocator = ObjectAllocator::new();
        assert_eq!(sheet_count(3, 2), 2);
    }
}

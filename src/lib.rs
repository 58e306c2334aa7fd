// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::enum_variant_names)]
#![allow(clippy::explicit_counter_loop)]
#![allow(clippy::doc_overindented_list_items)]
#![allow(clippy::manual_find)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]
#![cfg_attr(test, allow(unused_variables))]

//! # printflow
//!
//! Paginates styled HTML document trees and writes them as PDF or
//! PostScript.
//!
//! ## Pipeline
//!
//! 1. **Layout** ([`layout`]): the [`Formatter`](layout::Formatter) flows
//!    blocks, lists and tables into pages of positioned primitives, while
//!    recording headings and named link targets. Book output starts a
//!    chapter at every H1 and appends a generated table of contents.
//! 2. **Decoration** ([`writer::header_footer`]): header and footer macros
//!    (`$PAGE`, `$CHAPTER`, `$HEADING`, ...) are expanded per page.
//! 3. **Output** ([`writer`]): a PDF file (fonts, images, links, outline,
//!    named destinations, optional RC4 encryption) or DSC PostScript at
//!    language level 1 to 3, either with N-up imposition.
//!
//! Everything is laid out before the first output byte is written.
//! Problems that do not stop the export (content too wide, limits
//! reached, missing images) are reported through a
//! [`ProgressSink`](progress::ProgressSink); only I/O failures and
//! internal accounting errors come back as [`Error`].
//!
//! ## Quick Start
//!
//! ```ignore
//! use printflow::{Document, Element, ExportConfig, FixedMetrics, Node, Style};
//!
//! # fn main() -> printflow::Result<()> {
//! let metrics = FixedMetrics::default();
//! let doc = Document::new(vec![
//!     Node::block(Element::Heading(1), "Introduction", Style::default(), &metrics),
//!     Node::block(Element::Paragraph, "Hello, world.", Style::default(), &metrics),
//! ])
//! .with_title("Example");
//!
//! printflow::export_to_path(&doc, &ExportConfig::default(), &metrics, "example.pdf")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## License
//!
//! Licensed under either of:
//!
//! * Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
//! * MIT license ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Error handling
pub mod error;

// Input model
pub mod fonts;
pub mod numbering;
pub mod tree;

// Configuration and progress reporting
pub mod config;
pub mod progress;

// Pagination
pub mod layout;

// Output
pub mod encryption;
pub mod object;
pub mod writer;

// Session and entry points
pub mod session;

// Re-exports
pub use config::{EncryptionConfig, ExportConfig, HeadFootFormat, OutputFormat, OutputType};
pub use error::{Error, Result};
pub use fonts::{FixedMetrics, FontMetrics, FontProgramSource, FontStyle, Typeface};
pub use layout::Pagination;
pub use progress::{CollectingProgress, Diagnostic, DiagnosticKind, LogProgress, ProgressSink};
pub use session::{export_to_path, export_to_stdout, export_to_vec, ExportSession};
pub use tree::{Document, Element, Node, RasterImage, Rgb, Style};

/// Initialize `env_logger` from `RUST_LOG`.
///
/// The library never calls this itself; binaries and tests may. Calling it
/// more than once is harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .try_init();
}

// Version info
/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

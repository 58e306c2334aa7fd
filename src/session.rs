//! Export session: the single owner of one document's export state.
//!
//! A session paginates a document once (body, TOC, headers and footers)
//! and then serializes the result to PDF or PostScript. Nothing outlives
//! the session, so two exports never share counters, fonts or keys.
//!
//! ```ignore
//! use printflow::{ExportConfig, ExportSession, FixedMetrics};
//!
//! let metrics = FixedMetrics::default();
//! let config = ExportConfig::default();
//! let mut session = ExportSession::new(&config, &metrics);
//! session.paginate(&doc)?;
//! session.write_to(&mut std::io::stdout())?;
//! ```

use crate::config::{ExportConfig, OutputFormat};
use crate::error::{Error, Result};
use crate::fonts::{FontMetrics, FontProgramSource};
use crate::layout::{Formatter, Pagination};
use crate::progress::{Diagnostic, LogProgress, ProgressSink};
use crate::tree::Document;
use crate::writer::{HeadFootRenderer, PdfWriter, PsWriter};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

/// Forwards to the caller's sink and remembers the first fatal diagnostic.
struct FatalWatch<'s> {
    inner: &'s mut dyn ProgressSink,
    fatal: Option<Diagnostic>,
}

impl<'s> FatalWatch<'s> {
    fn new(inner: &'s mut dyn ProgressSink) -> Self {
        Self { inner, fatal: None }
    }

    fn check(self) -> Result<()> {
        match self.fatal {
            Some(d) => Err(Error::InternalState(d.message)),
            None => Ok(()),
        }
    }
}

impl ProgressSink for FatalWatch<'_> {
    fn show(&mut self, message: &str) {
        self.inner.show(message);
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        if diagnostic.kind.is_fatal() && self.fatal.is_none() {
            self.fatal = Some(diagnostic.clone());
        }
        self.inner.report(diagnostic);
    }
}

/// One document export.
pub struct ExportSession<'a> {
    config: &'a ExportConfig,
    metrics: &'a dyn FontMetrics,
    progress: Box<dyn ProgressSink + 'a>,
    font_source: Option<&'a dyn FontProgramSource>,
    doc: Option<&'a Document>,
    pagination: Option<Pagination>,
}

impl<'a> ExportSession<'a> {
    /// Create a session that reports progress through the `log` crate.
    pub fn new(config: &'a ExportConfig, metrics: &'a dyn FontMetrics) -> Self {
        Self {
            config,
            metrics,
            progress: Box::new(LogProgress),
            font_source: None,
            doc: None,
            pagination: None,
        }
    }

    /// Report progress and diagnostics to `progress` instead.
    pub fn with_progress(mut self, progress: impl ProgressSink + 'a) -> Self {
        self.progress = Box::new(progress);
        self
    }

    /// Supply Type 1 programs for `embed_fonts`.
    pub fn with_font_source(mut self, source: &'a dyn FontProgramSource) -> Self {
        self.font_source = Some(source);
        self
    }

    /// The pagination, once [`paginate`](Self::paginate) has run and before
    /// it is written.
    pub fn pagination(&self) -> Option<&Pagination> {
        self.pagination.as_ref()
    }

    /// Lay out `doc` completely, including headers and footers.
    pub fn paginate(&mut self, doc: &'a Document) -> Result<&Pagination> {
        self.config.validate()?;
        let mut watch = FatalWatch::new(self.progress.as_mut());

        let mut pagination = Formatter::new(self.config, self.metrics, &mut watch, &doc.images).paginate(doc);
        HeadFootRenderer::new(self.config, self.metrics, doc).decorate(&mut pagination, &mut watch);
        watch.check()?;

        log::info!(
            "Paginated {} pages ({} TOC, {} body), {} headings, {} links",
            pagination.page_count(),
            pagination.toc_pages.len(),
            pagination.body_pages.len(),
            pagination.headings.len(),
            pagination.links.len()
        );
        self.doc = Some(doc);
        Ok(self.pagination.insert(pagination))
    }

    /// Serialize the paginated document in the configured format.
    ///
    /// The pagination is consumed; call [`paginate`](Self::paginate) again
    /// to write a second copy.
    pub fn write_to<W: Write>(&mut self, out: &mut W) -> Result<()> {
        let (Some(doc), Some(mut pagination)) = (self.doc, self.pagination.take()) else {
            return Err(Error::InternalState("write_to called before paginate".to_string()));
        };
        let mut watch = FatalWatch::new(self.progress.as_mut());

        match self.config.format {
            OutputFormat::Pdf => {
                let mut writer = PdfWriter::new(self.config, doc);
                if let Some(source) = self.font_source {
                    writer = writer.with_font_source(source);
                }
                writer.write(&mut pagination, &mut watch, out)?;
            },
            OutputFormat::PostScript => {
                let mut writer = PsWriter::new(self.config, doc);
                if let Some(source) = self.font_source {
                    writer = writer.with_font_source(source);
                }
                writer.write(&mut pagination, &mut watch, out)?;
            },
        }
        watch.check()
    }
}

/// Export `doc` to a file.
pub fn export_to_path(
    doc: &Document,
    config: &ExportConfig,
    metrics: &dyn FontMetrics,
    path: impl AsRef<Path>,
) -> Result<()> {
    let path = path.as_ref();
    let mut session = ExportSession::new(config, metrics);
    session.paginate(doc)?;

    let unwritable = |e: io::Error| Error::OutputUnwritable {
        path: path.display().to_string(),
        reason: e.to_string(),
    };
    // Spooled beside the target; `path` only appears once complete.
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let spool = tempfile::NamedTempFile::new_in(dir).map_err(unwritable)?;
    let mut out = BufWriter::new(spool);
    session.write_to(&mut out).map_err(|e| match e {
        Error::Io(io) => unwritable(io),
        other => other,
    })?;
    let spool = out.into_inner().map_err(|e| unwritable(e.into_error()))?;
    spool.persist(path).map_err(|e| unwritable(e.error))?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

/// Export `doc` into memory.
pub fn export_to_vec(doc: &Document, config: &ExportConfig, metrics: &dyn FontMetrics) -> Result<Vec<u8>> {
    let mut session = ExportSession::new(config, metrics);
    session.paginate(doc)?;
    let mut out = Vec::new();
    session.write_to(&mut out)?;
    Ok(out)
}

/// Export `doc` to standard output.
///
/// Output is spooled to a temporary file and only copied out once the
/// whole document was written, so a failed export writes nothing.
pub fn export_to_stdout(doc: &Document, config: &ExportConfig, metrics: &dyn FontMetrics) -> Result<()> {
    let unwritable = |e: io::Error| Error::OutputUnwritable {
        path: "<stdout>".to_string(),
        reason: e.to_string(),
    };
    let mut session = ExportSession::new(config, metrics);
    session.paginate(doc)?;

    let mut spool = tempfile::tempfile().map_err(unwritable)?;
    {
        let mut out = BufWriter::new(&mut spool);
        session.write_to(&mut out)?;
        out.flush()?;
    }
    spool.seek(SeekFrom::Start(0))?;

    let stdout = io::stdout();
    let mut lock = stdout.lock();
    io::copy(&mut spool, &mut lock).map_err(unwritable)?;
    lock.flush().map_err(unwritable)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputType;
    use crate::fonts::FixedMetrics;
    use crate::progress::CollectingProgress;
    use crate::tree::{Element, Node, Style};

    fn doc() -> Document {
        let metrics = FixedMetrics::default();
        Document::new(vec![
            Node::block(Element::Heading(1), "Start", Style::default(), &metrics),
            Node::block(Element::Paragraph, "Body text", Style::default(), &metrics),
        ])
        .with_title("Session")
    }

    #[test]
    fn test_write_before_paginate_fails() {
        let config = ExportConfig::default();
        let metrics = FixedMetrics::default();
        let mut session = ExportSession::new(&config, &metrics);
        let mut out = Vec::new();
        assert!(matches!(session.write_to(&mut out), Err(Error::InternalState(_))));
        assert!(out.is_empty());
    }

    #[test]
    fn test_paginate_then_write() {
        let config = ExportConfig::default();
        let metrics = FixedMetrics::default();
        let doc = doc();
        let mut progress = CollectingProgress::new();
        {
            let mut session = ExportSession::new(&config, &metrics).with_progress(&mut progress);
            let pagination = session.paginate(&doc).unwrap();
            assert!(pagination.page_count() >= 2);
            let mut out = Vec::new();
            session.write_to(&mut out).unwrap();
            assert!(out.starts_with(b"%PDF-1.4"));
            assert!(session.pagination().is_none());
        }
        assert!(progress.messages.iter().any(|m| m.starts_with("Writing page")));
    }

    #[test]
    fn test_postscript_format() {
        let config = ExportConfig::default()
            .with_format(OutputFormat::PostScript)
            .with_output_type(OutputType::WebPages);
        let out = export_to_vec(&doc(), &config, &FixedMetrics::default()).unwrap();
        assert!(out.starts_with(b"%!PS-Adobe-3.0"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ExportConfig::default().with_nup(3);
        let err = export_to_vec(&doc(), &config, &FixedMetrics::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_export_to_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pdf");
        export_to_path(&doc(), &ExportConfig::default(), &FixedMetrics::default(), &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.ends_with(b"%%EOF\n"));
    }

    #[test]
    fn test_failed_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        // A directory in the way makes the final rename fail.
        let path = dir.path().join("out.pdf");
        std::fs::create_dir(&path).unwrap();
        let err = export_to_path(&doc(), &ExportConfig::default(), &FixedMetrics::default(), &path).unwrap_err();
        assert!(matches!(err, Error::OutputUnwritable { .. }));
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("out.pdf")]);
        assert!(path.is_dir());
    }

    #[test]
    fn test_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.pdf");
        let err = export_to_path(&doc(), &ExportConfig::default(), &FixedMetrics::default(), &path).unwrap_err();
        match err {
            Error::OutputUnwritable { path: p, .. } => assert!(p.ends_with("out.pdf")),
            other => panic!("unexpected error {other:?}"),
        }
    }
}

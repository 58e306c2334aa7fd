//! Progress and diagnostic channel.
//!
//! Every condition the export encounters, fatal or not, is surfaced here.
//! Layout code never aborts on content problems; it reports a [`Diagnostic`]
//! and keeps going.

use std::fmt;

/// Classification of a reported condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Text, image or table does not fit; output may be clipped or overlap
    ContentTooLarge,
    /// Chapter count limit reached; further chapters are merged into the last
    TooManyChapters,
    /// Heading index is full; further headings are not indexed
    TooManyHeadings,
    /// Link index is full; further named targets are dropped
    TooManyLinks,
    /// Page limit reached; content past the limit is discarded
    TooManyPages,
    /// Referenced image is missing from the document's image table
    MissingImage,
    /// Comment directive could not be understood
    BadDirective,
    /// Object or page accounting went wrong
    Internal,
    /// Output could not be written
    Io,
}

impl DiagnosticKind {
    /// Whether this kind causes the export entry point to fail.
    pub fn is_fatal(self) -> bool {
        matches!(self, DiagnosticKind::Internal | DiagnosticKind::Io)
    }
}

/// One reported condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// Classification
    pub kind: DiagnosticKind,
    /// Human-readable message
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic.
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Receiver for progress updates and diagnostics.
pub trait ProgressSink {
    /// Report forward progress ("Formatting page 12").
    fn show(&mut self, message: &str);

    /// Report a diagnostic.
    fn report(&mut self, diagnostic: Diagnostic);
}

impl<P: ProgressSink + ?Sized> ProgressSink for &mut P {
    fn show(&mut self, message: &str) {
        (**self).show(message)
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        (**self).report(diagnostic)
    }
}

/// Default sink that forwards to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn show(&mut self, message: &str) {
        log::info!("{}", message);
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        if diagnostic.kind.is_fatal() {
            log::error!("{}", diagnostic);
        } else {
            log::warn!("{}", diagnostic);
        }
    }
}

/// Sink that records everything; used by callers that present diagnostics
/// themselves, and by tests.
#[derive(Debug, Default, Clone)]
pub struct CollectingProgress {
    /// Progress messages in arrival order
    pub messages: Vec<String>,
    /// Diagnostics in arrival order
    pub diagnostics: Vec<Diagnostic>,
}

impl CollectingProgress {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count diagnostics of one kind.
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.diagnostics.iter().filter(|d| d.kind == kind).count()
    }
}

impl ProgressSink for CollectingProgress {
    fn show(&mut self, message: &str) {
        self.messages.push(message.to_string());
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

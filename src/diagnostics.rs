//! Structured, non-fatal diagnostics (spec §6 "Diagnostic channel").
//!
//! Every recovered error emits exactly one [`Diagnostic`] (§7). Diagnostics
//! are logged through `tracing`, the same facility the teacher crate uses
//! for its own `warn!`/`debug!` calls, and are also collected so a caller
//! without a tracing subscriber installed can still inspect what happened.

use std::sync::Mutex;

/// The kind of a recovered, non-fatal condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    OpenLoop,
    EmptySeamFallback,
    DroppedDegenerate,
    MalformedRecord,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::OpenLoop => "OpenLoop",
            DiagnosticKind::EmptySeamFallback => "EmptySeamFallback",
            DiagnosticKind::DroppedDegenerate => "DroppedDegenerate",
            DiagnosticKind::MalformedRecord => "MalformedRecord",
        }
    }
}

/// A single structured diagnostic record.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub cut_id: Option<String>,
    pub tile_id: Option<(u32, u32)>,
    pub detail: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            cut_id: None,
            tile_id: None,
            detail: detail.into(),
        }
    }

    pub fn with_cut_id(mut self, cut_id: impl Into<String>) -> Self {
        self.cut_id = Some(cut_id.into());
        self
    }

    pub fn with_tile_id(mut self, row: u32, col: u32) -> Self {
        self.tile_id = Some((row, col));
        self
    }

    fn log(&self) {
        match self.kind {
            DiagnosticKind::OpenLoop => {
                tracing::warn!(cut_id = ?self.cut_id, detail = %self.detail, "OpenLoop")
            }
            DiagnosticKind::EmptySeamFallback => {
                tracing::warn!(detail = %self.detail, "EmptySeamFallback")
            }
            DiagnosticKind::DroppedDegenerate => {
                tracing::debug!(detail = %self.detail, "DroppedDegenerate")
            }
            DiagnosticKind::MalformedRecord => {
                tracing::debug!(detail = %self.detail, "MalformedRecord")
            }
        }
    }
}

/// Collects diagnostics emitted during a pipeline run, logging each one as
/// it arrives and retaining it for later inspection.
#[derive(Default)]
pub struct DiagnosticSink {
    records: Mutex<Vec<Diagnostic>>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, diagnostic: Diagnostic) {
        diagnostic.log();
        self.records.lock().unwrap().push(diagnostic);
    }

    /// Drains and returns all diagnostics recorded so far.
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.records.lock().unwrap())
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_collects_in_order() {
        let sink = DiagnosticSink::new();
        sink.emit(Diagnostic::new(DiagnosticKind::EmptySeamFallback, "first"));
        sink.emit(Diagnostic::new(DiagnosticKind::OpenLoop, "second").with_cut_id("v0"));
        let records = sink.take();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].detail, "first");
        assert_eq!(records[1].cut_id.as_deref(), Some("v0"));
        assert!(sink.is_empty());
    }
}

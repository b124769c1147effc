//! Diagnostics: reports, severities, and the report-handler collaborator
//! that lets semantic passes keep going after an error instead of
//! unwinding (§7 — "catch at statement granularity, continue siblings").

use crate::ast::SourceSpan;
use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term::{self, termcolor::Buffer};
use smol_str::SmolStr;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, strum::Display)]
pub enum Severity {
    #[strum(serialize = "info")]
    Info,
    #[strum(serialize = "warning")]
    Warning,
    #[strum(serialize = "error")]
    Error,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, strum::Display)]
pub enum Category {
    #[strum(serialize = "lexical")]
    Lexical,
    #[strum(serialize = "undeclared-identifier")]
    UndeclaredIdentifier,
    #[strum(serialize = "type-error")]
    TypeError,
    #[strum(serialize = "overload-resolution")]
    OverloadResolution,
    #[strum(serialize = "semantic-mapping")]
    SemanticMapping,
    #[strum(serialize = "unused-variable")]
    UnusedVariable,
    #[strum(serialize = "internal")]
    Internal,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub severity: Severity,
    pub category: Category,
    pub message: String,
    pub area: Option<SourceSpan>,
}

impl Report {
    pub fn error(category: Category, message: impl Into<String>) -> Report {
        Report { severity: Severity::Error, category, message: message.into(), area: None }
    }

    pub fn warning(category: Category, message: impl Into<String>) -> Report {
        Report { severity: Severity::Warning, category, message: message.into(), area: None }
    }

    pub fn with_area(mut self, area: SourceSpan) -> Report {
        self.area = Some(area);
        self
    }
}

/// Accumulates [`Report`]s across an entire pass. A pass that hits an
/// internal invariant violation aborts immediately (see
/// [`ReportHandler::had_errors`] vs. a hard `CompileError`); everything
/// else is recorded here and the pass moves on to the next sibling.
#[derive(Debug, Default)]
pub struct ReportHandler {
    reports: Vec<Report>,
}

impl ReportHandler {
    pub fn new() -> ReportHandler {
        ReportHandler::default()
    }

    pub fn push(&mut self, report: Report) {
        self.reports.push(report);
    }

    pub fn had_errors(&self) -> bool {
        self.reports.iter().any(|r| r.severity == Severity::Error)
    }

    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    pub fn into_reports(self) -> Vec<Report> {
        self.reports
    }

    pub fn extend(&mut self, other: ReportHandler) {
        self.reports.extend(other.reports);
    }
}

/// A minimal source-file registry, mirroring `SourceFiles` in spirit: just
/// enough to let `render` produce a caret-pointing snippet for a `Report`
/// without the analyzer/emitter depending on real file I/O.
#[derive(Debug, Default)]
pub struct SourceFiles {
    files: SimpleFiles<SmolStr, String>,
}

impl SourceFiles {
    pub fn new() -> SourceFiles {
        SourceFiles::default()
    }

    pub fn add(&mut self, name: impl Into<SmolStr>, source: impl Into<String>) -> u32 {
        self.files.add(name.into(), source.into()) as u32
    }

    /// Renders every report to a human-readable string using
    /// `codespan-reporting`'s terminal emitter backed by an in-memory
    /// buffer (no ANSI color codes, matching a non-interactive log sink).
    pub fn render(&self, reports: &[Report]) -> String {
        let mut buffer = Buffer::no_color();
        let config = term::Config::default();
        for report in reports {
            let diagnostic = to_diagnostic(report);
            let _ = term::emit(&mut buffer, &config, &self.files, &diagnostic);
        }
        String::from_utf8_lossy(buffer.as_slice()).into_owned()
    }
}

fn to_diagnostic(report: &Report) -> Diagnostic<usize> {
    let mut diagnostic = match report.severity {
        Severity::Error => Diagnostic::error(),
        Severity::Warning => Diagnostic::warning(),
        Severity::Info => Diagnostic::note(),
    };
    diagnostic = diagnostic.with_message(format!("{}: {}", report.category, report.message));
    if let Some(area) = report.area {
        diagnostic =
            diagnostic.with_labels(vec![Label::primary(area.file as usize, area.start as usize..area.end as usize)]);
    }
    diagnostic
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn had_errors_ignores_warnings() {
        let mut handler = ReportHandler::new();
        handler.push(Report::warning(Category::UnusedVariable, "unused variable `x`"));
        assert!(!handler.had_errors());
        handler.push(Report::error(Category::TypeError, "type mismatch"));
        assert!(handler.had_errors());
    }

    #[test]
    fn render_produces_nonempty_output_for_errors() {
        let mut files = SourceFiles::new();
        let file = files.add("test.hlsl", "float4 main() : SV_Position { return 0; }");
        let report = Report::error(Category::TypeError, "cannot convert int to float4")
            .with_area(SourceSpan { file, start: 0, end: 6 });
        let out = files.render(&[report]);
        assert!(out.contains("type-error"));
    }
}

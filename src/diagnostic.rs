//! Position-annotated compiler diagnostics for the tokenizer and parser.
//!
//! `LexError`/`ParseError` (§7) are rendered through this type rather than
//! through `HarmonicsError` because they need a source span to point at;
//! everything past the parser uses `HarmonicsError` (see `error.rs`).

use crate::span::Span;

#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    pub notes: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Diagnostic {
    pub fn lex_error(reason: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            message: format!("lex error: {}", reason.into()),
            span,
            notes: Vec::new(),
        }
    }

    pub fn parse_error(expected: impl Into<String>, found: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            message: format!(
                "parse error: expected {}, found {}",
                expected.into(),
                found.into()
            ),
            span,
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Render to stderr with source context, using ariadne.
    pub fn render(&self, filename: &str, source: &str) {
        use ariadne::{Color, Label, Report, ReportKind, Source};

        let kind = match self.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
        };
        let color = match self.severity {
            Severity::Error => Color::Red,
            Severity::Warning => Color::Yellow,
        };

        let start = self.span.start as usize;
        let end = self.span.end.max(self.span.start + 1) as usize;

        let mut report = Report::build(kind, filename, start)
            .with_message(&self.message)
            .with_label(
                Label::new((filename, start..end))
                    .with_message(&self.message)
                    .with_color(color),
            );

        for note in &self.notes {
            report = report.with_note(note);
        }

        report
            .finish()
            .eprint((filename, Source::from(source)))
            .unwrap();
    }
}

pub fn render_diagnostics(diagnostics: &[Diagnostic], filename: &str, source: &str) {
    for diag in diagnostics {
        diag.render(filename, source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lex_error_carries_span() {
        let d = Diagnostic::lex_error("unexpected byte", Span::new(3, 4));
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.span, Span::new(3, 4));
        assert!(d.message.contains("unexpected byte"));
    }

    #[test]
    fn parse_error_formats_expected_and_found() {
        let d = Diagnostic::parse_error("';'", "'->'", Span::new(10, 12));
        assert!(d.message.contains("expected ';'"));
        assert!(d.message.contains("found '->'"));
    }
}

use crate::span::Span;

/// A front-end diagnostic (error or warning) attached to a source span.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Diagnostic {
    pub fn error(message: String, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn warning(message: String, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Render the diagnostic to stderr using ariadne.
    ///
    /// Diagnostics from builder-made definitions carry dummy spans; those
    /// are printed as a plain line since there is no source to point into.
    pub fn render(&self, filename: &str, source: &str) {
        use ariadne::{Color, Label, Report, ReportKind, Source};

        if self.span.is_dummy() || source.is_empty() {
            eprintln!("{}", self);
            return;
        }

        let kind = match self.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
        };

        let color = match self.severity {
            Severity::Error => Color::Red,
            Severity::Warning => Color::Yellow,
        };

        let mut report = Report::build(kind, filename, self.span.start as usize)
            .with_message(&self.message)
            .with_label(
                Label::new((filename, self.span.range()))
                    .with_message(&self.message)
                    .with_color(color),
            );

        for note in &self.notes {
            report = report.with_note(note);
        }

        if let Some(help) = &self.help {
            report = report.with_help(help);
        }

        if let Err(e) = report
            .finish()
            .eprint((filename, Source::from(source)))
        {
            tracing::warn!(error = %e, "failed to render diagnostic");
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {}", label, self.message)?;
        for note in &self.notes {
            write!(f, "\n  note: {}", note)?;
        }
        if let Some(help) = &self.help {
            write!(f, "\n  help: {}", help)?;
        }
        Ok(())
    }
}

/// Render a list of diagnostics.
pub fn render_diagnostics(diagnostics: &[Diagnostic], filename: &str, source: &str) {
    for diag in diagnostics {
        diag.render(filename, source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let d = Diagnostic::error("unknown field 'q'".to_string(), Span::new(10, 15));
        assert_eq!(d.severity, Severity::Error);
        assert!(d.is_error());
        assert_eq!(d.message, "unknown field 'q'");
        assert_eq!(d.span.start, 10);
        assert_eq!(d.span.end, 15);
        assert!(d.notes.is_empty());
        assert!(d.help.is_none());
    }

    #[test]
    fn test_chained_builders() {
        let d = Diagnostic::warning("field 'tmp' is never used".to_string(), Span::new(0, 5))
            .with_note("note 1".to_string())
            .with_help("remove the parameter".to_string())
            .with_note("note 2".to_string());
        assert_eq!(d.severity, Severity::Warning);
        assert!(!d.is_error());
        assert_eq!(d.notes.len(), 2);
        assert!(d.help.is_some());
    }

    #[test]
    fn test_display_includes_help() {
        let d = Diagnostic::error("offsets must be integer literals".to_string(), Span::dummy())
            .with_help("write `f[1, 0, 0]`".to_string());
        let text = d.to_string();
        assert!(text.starts_with("error: offsets must be integer literals"));
        assert!(text.contains("help: write `f[1, 0, 0]`"));
    }

    #[test]
    fn test_render_does_not_panic() {
        let source = "stencil s(a: Field<f64>) {\n}\n";
        let d = Diagnostic::error("empty stencil".to_string(), Span::new(0, 7))
            .with_note("add a computation block".to_string());
        d.render("test.stn", source);
        render_diagnostics(&[d.clone(), d], "test.stn", source);
    }
}

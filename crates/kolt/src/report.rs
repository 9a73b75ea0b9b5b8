//! Renders parse and resolve diagnostics as annotated source snippets.

use crate::parser::ParseError;
use ariadne::{Config, Label, Report, ReportKind, Source};
use std::fmt;
use std::io;

pub fn write_error_reports<T: fmt::Display>(
    filename: &str,
    source: &str,
    errors: &[ParseError<'_, T>],
    out: &mut impl io::Write,
) -> io::Result<()> {
    write_reports(ReportKind::Error, filename, source, errors, out)
}

pub fn write_warning_reports<T: fmt::Display>(
    filename: &str,
    source: &str,
    warnings: &[ParseError<'_, T>],
    out: &mut impl io::Write,
) -> io::Result<()> {
    write_reports(ReportKind::Warning, filename, source, warnings, out)
}

fn write_reports<T: fmt::Display>(
    kind: ReportKind<'_>,
    filename: &str,
    source: &str,
    diagnostics: &[ParseError<'_, T>],
    out: &mut impl io::Write,
) -> io::Result<()> {
    for diagnostic in diagnostics {
        Report::build(kind, (filename, diagnostic.span().into_range()))
            .with_config(Config::default().with_color(false))
            .with_message(diagnostic.to_string())
            .with_label(
                Label::new((filename, diagnostic.span().into_range()))
                    .with_message(diagnostic.reason().to_string()),
            )
            .finish()
            .write((filename, Source::from(source)), &mut *out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{Span, Token};

    fn custom_diagnostic(message: &str) -> ParseError<'_, Token<'_>> {
        ParseError::custom(Span::from(8..9), message.to_owned())
    }

    #[test]
    fn test_reports_carry_the_message_and_location() {
        let mut rendered = Vec::new();
        write_error_reports(
            "demo.kolt",
            "val x = ?",
            &[custom_diagnostic("Unexpected character")],
            &mut rendered,
        )
        .unwrap();
        let rendered = String::from_utf8(rendered).unwrap();
        assert!(rendered.contains("Unexpected character"));
        assert!(rendered.contains("demo.kolt"));
    }

    #[test]
    fn test_warnings_render_as_warnings() {
        let mut rendered = Vec::new();
        write_warning_reports(
            "demo.kolt",
            "val x = 1",
            &[custom_diagnostic("Unused variable 'x'")],
            &mut rendered,
        )
        .unwrap();
        let rendered = String::from_utf8(rendered).unwrap();
        assert!(rendered.contains("Warning"));
        assert!(rendered.contains("Unused variable 'x'"));
    }
}

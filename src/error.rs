//! Structured diagnostics for every pipeline stage.
//!
//! Each stage reports a [`PieError`] carrying a [`Span`]; [`PieError::render`]
//! reconstructs source context, an underline, and a "did you mean" hint the
//! way a human-authored one-line diagnostic would read.

use std::fmt;

use thiserror::Error;

use crate::style::Style;
use crate::suggest;
use crate::token::{Span, TokenKind};

#[derive(Debug, Error)]
pub enum PieError {
    #[error("lex error: {kind}")]
    Lex { kind: LexErrorKind, span: Span },

    #[error("parse error: {kind}")]
    Parse { kind: ParseErrorKind, span: Span },

    #[error("undefined name `{name}`")]
    Name { name: String, span: Span },

    #[error("type mismatch: {kind}")]
    Type { kind: TypeErrorKind, span: Span },

    #[error("arity error: {message}")]
    Arity { message: String, span: Span },

    #[error("match exhausted without a winning case")]
    Pattern { span: Span },

    #[error("panic: {message}")]
    Panic { message: String, span: Span },

    #[error("overload error: {message}")]
    Overload { message: String, span: Span },
}

#[derive(Debug)]
pub enum LexErrorKind {
    BadChar(char),
    UnterminatedString,
    MissingTrailingSemicolon,
}

impl fmt::Display for LexErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexErrorKind::BadChar(c) => write!(f, "unexpected character '{}'", c),
            LexErrorKind::UnterminatedString => write!(f, "unterminated string literal"),
            LexErrorKind::MissingTrailingSemicolon => {
                write!(f, "final statement must terminate in ';'")
            }
        }
    }
}

#[derive(Debug)]
pub enum ParseErrorKind {
    UnexpectedToken { expected: String, found: TokenKind },
    UnknownInfixOperator { name: String },
    ExfixUnclosed { opener: String },
    MixfixOutOfSequence { name: String },
    DuplicateNamedArgument { name: String },
    MalformedFixDeclaration { detail: String },
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::UnexpectedToken { expected, found } => {
                write!(f, "expected {}, found {:?}", expected, found)
            }
            ParseErrorKind::UnknownInfixOperator { name } => {
                write!(f, "`{}` is not a registered infix operator", name)
            }
            ParseErrorKind::ExfixUnclosed { opener } => {
                write!(f, "exfix operator `{}` opened but never closed", opener)
            }
            ParseErrorKind::MixfixOutOfSequence { name } => {
                write!(f, "mixfix token `{}` appeared out of sequence", name)
            }
            ParseErrorKind::DuplicateNamedArgument { name } => {
                write!(f, "named argument `{}` given more than once", name)
            }
            ParseErrorKind::MalformedFixDeclaration { detail } => {
                write!(f, "malformed fix-declaration: {}", detail)
            }
        }
    }
}

#[derive(Debug)]
pub enum TypeErrorKind {
    Assignment { declared: String, actual: String },
    Parameter { expected: String, actual: String },
    Return { expected: String, actual: String },
    NoOverload { name: String, args: String },
}

impl fmt::Display for TypeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeErrorKind::Assignment { declared, actual } => {
                write!(f, "cannot assign {} to declared type {}", actual, declared)
            }
            TypeErrorKind::Parameter { expected, actual } => {
                write!(f, "expected argument of type {}, got {}", expected, actual)
            }
            TypeErrorKind::Return { expected, actual } => {
                write!(f, "expected return type {}, got {}", expected, actual)
            }
            TypeErrorKind::NoOverload { name, args } => {
                write!(f, "no overload of `{}` accepts ({})", name, args)
            }
        }
    }
}

impl PieError {
    pub fn span(&self) -> Span {
        match self {
            PieError::Lex { span, .. }
            | PieError::Parse { span, .. }
            | PieError::Name { span, .. }
            | PieError::Type { span, .. }
            | PieError::Arity { span, .. }
            | PieError::Pattern { span }
            | PieError::Panic { span, .. }
            | PieError::Overload { span, .. } => *span,
        }
    }

    /// Renders a one-line diagnostic with source context, an underline, and
    /// (where applicable) a "did you mean" suggestion.
    pub fn render(&self, source: &str, color: bool) -> String {
        let span = self.span();
        let (line_text, col) = line_and_column(source, span.start);
        let header = format!("{}", self);

        let mut out = String::new();
        if color {
            out.push_str(&Style::bold_red(&format!("error: {}", header)));
        } else {
            out.push_str(&format!("error: {}", header));
        }
        out.push('\n');
        out.push_str(&format!("  --> line {}:{}\n", span.line, col));
        out.push_str(&format!("   | {}\n", line_text));
        out.push_str(&format!("   | {}^\n", " ".repeat(col.saturating_sub(1))));

        if let Some(hint) = self.suggestion() {
            let line = format!("help: did you mean `{}`?", hint);
            out.push_str(&if color { Style::yellow(&line) } else { line });
            out.push('\n');
        }

        out
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            PieError::Name { name, .. } => {
                suggest::find_similar(name, crate::builtins::BUILTIN_NAMES, 2).map(Into::into)
            }
            PieError::Parse {
                kind: ParseErrorKind::UnknownInfixOperator { name },
                ..
            } => suggest::find_similar(name, suggest::KEYWORDS, 2).map(Into::into),
            _ => None,
        }
    }
}

fn line_and_column(source: &str, byte_offset: usize) -> (&str, usize) {
    let mut start = 0;
    for line in source.split('\n') {
        let end = start + line.len();
        if byte_offset <= end {
            let col = byte_offset - start + 1;
            return (line, col);
        }
        start = end + 1;
    }
    (source.lines().last().unwrap_or(""), 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_name_error_with_suggestion() {
        let err = PieError::Name {
            name: "__builtin_pritn".to_string(),
            span: Span::new(0, 5, 1),
        };
        let rendered = err.render("__builtin_pritn(1);", false);
        assert!(rendered.contains("undefined name"));
        assert!(rendered.contains("did you mean"));
    }

    #[test]
    fn line_and_column_finds_second_line() {
        let (line, col) = line_and_column("a;\nb;", 3);
        assert_eq!(line, "b;");
        assert_eq!(col, 1);
    }
}

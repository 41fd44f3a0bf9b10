//! Error types and diagnostic reporting

use codespan_reporting::diagnostic::{Diagnostic as CsDiagnostic, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use thiserror::Error;

use super::Span;

/// A syntax diagnostic collected by the parser.
///
/// Parsing never aborts; every problem found becomes one of these and the
/// parse resumes at the next synchronization point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Source file the diagnostic belongs to (stamped by `parse_lint`).
    pub file: Option<String>,
    pub span: Span,
    pub message: String,
}

impl Diagnostic {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            file: None,
            span,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.file {
            Some(file) => write!(
                f,
                "{}:{}:{}: {}",
                file, self.span.line, self.span.column, self.message
            ),
            None => write!(f, "{}:{}: {}", self.span.line, self.span.column, self.message),
        }
    }
}

/// Compile error for the stages past the parser
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("syntax errors in source")]
    Parse { diagnostics: Vec<Diagnostic> },

    #[error("resolve error: {message}")]
    Resolve { message: String },

    #[error("code generation error: {message}")]
    Codegen { message: String },

    #[error("build error: {message}")]
    Build { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompileError {
    pub fn resolve(message: impl Into<String>) -> Self {
        Self::Resolve {
            message: message.into(),
        }
    }

    pub fn codegen(message: impl Into<String>) -> Self {
        Self::Codegen {
            message: message.into(),
        }
    }

    pub fn build(message: impl Into<String>) -> Self {
        Self::Build {
            message: message.into(),
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

/// Diagnostic reporter for pretty error output
pub struct DiagnosticReporter {
    files: SimpleFiles<String, String>,
    writer: StandardStream,
    config: term::Config,
}

impl DiagnosticReporter {
    pub fn new() -> Self {
        Self {
            files: SimpleFiles::new(),
            writer: StandardStream::stderr(ColorChoice::Auto),
            config: term::Config::default(),
        }
    }

    pub fn add_file(&mut self, name: impl Into<String>, source: impl Into<String>) -> usize {
        self.files.add(name.into(), source.into())
    }

    pub fn report(&self, file_id: usize, diagnostic: &Diagnostic) {
        let cs = CsDiagnostic::error()
            .with_message("Syntax error")
            .with_labels(vec![
                Label::primary(file_id, diagnostic.span.start..diagnostic.span.end)
                    .with_message(&diagnostic.message),
            ]);
        let _ = term::emit(&mut self.writer.lock(), &self.config, &self.files, &cs);
    }
}

impl Default for DiagnosticReporter {
    fn default() -> Self {
        Self::new()
    }
}

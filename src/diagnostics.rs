//! Diagnostic reporting for the barley compiler.
//!
//! This module provides rustc-style error reporting with source context and
//! span-based caret highlighting, plus the `Diagnostics` collection the
//! compilation pipeline reports into. Lowering never aborts on a user error:
//! each pass records a `Diagnostic` and keeps going, and the driver checks
//! the collection between phases to decide whether to bail.
//!
//! # Error Formatting
//!
//! - **Error messages**: Red "error:" prefix with clear description
//! - **Warnings**: Yellow "warning:" prefix
//! - **File locations**: Rust-style "filename:line:column" format
//! - **Span highlighting**: Caret markers pointing to specific columns
//!
//! Printing can be suppressed (the `silent` compile option) without
//! affecting collection, so tests and embedders can inspect what was
//! reported without stderr noise.

use std::fmt;

/// Severity of a collected diagnostic.
///
/// Only `Error` entries make a compilation fail; `Warning` and `Message`
/// entries are advisory and survive into successful compilations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Message,
    Warning,
    Error,
}

/// A single diagnostic with optional source location and argument.
///
/// The optional `arg` carries the offending name or type pair (for example
/// the identifier that failed to resolve) and is appended to the rendered
/// message in quotes.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub category: Category,
    pub message: String,
    pub arg: Option<String>,
    pub file: Option<String>,
    pub span_start: Option<usize>,
}

impl Diagnostic {
    pub fn new(category: Category, message: impl Into<String>) -> Self {
        Diagnostic {
            category,
            message: message.into(),
            arg: None,
            file: None,
            span_start: None,
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.arg = Some(arg.into());
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_span(mut self, span_start: usize) -> Self {
        self.span_start = Some(span_start);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arg {
            Some(arg) => write!(f, "{}: '{}'", self.message, arg),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Collection of diagnostics for one compilation.
///
/// The driver consults `has_errors` between phases; everything else keeps
/// appending. When `silent` is false, each reported diagnostic is also
/// rendered to stderr at report time so errors show up in source order.
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    silent: bool,
}

impl Diagnostics {
    pub fn new(silent: bool) -> Self {
        Diagnostics {
            entries: Vec::new(),
            silent,
        }
    }

    /// Record a diagnostic, printing it unless the collection is silent.
    ///
    /// `source` is the text of the file the diagnostic points into; it is
    /// only used for rendering and may be omitted when unavailable.
    pub fn report(&mut self, diagnostic: Diagnostic, source: Option<&str>) {
        if !self.silent {
            emit(&diagnostic, source);
        }
        self.entries.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.category == Category::Error)
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.category == Category::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.category == Category::Warning)
    }
}

/// Render a diagnostic to stderr with optional source context.
///
/// When both a span and source text are available the output includes the
/// offending line with a caret marker under the error column; otherwise
/// only the header line is printed.
pub fn emit(diagnostic: &Diagnostic, source: Option<&str>) {
    let reset = "\x1b[0m";
    let (color, label) = match diagnostic.category {
        Category::Error => ("\x1b[31m", "error"),
        Category::Warning => ("\x1b[33m", "warning"),
        Category::Message => ("\x1b[34m", "note"),
    };

    eprintln!("{}{}{}: {}", color, label, reset, diagnostic);

    let Some(src) = source else {
        if let Some(file) = &diagnostic.file {
            eprintln!("  --> {}", file);
        }
        return;
    };

    let Some(span) = diagnostic.span_start else {
        if let Some(file) = &diagnostic.file {
            eprintln!("  --> {}", file);
        }
        return;
    };

    // Convert byte offset to line and column coordinates
    let mut byte_idx = 0usize;
    let mut line_no = 1usize;
    let mut col = 0usize;
    let mut found = false;
    for (lineno, line) in src.lines().enumerate() {
        let line_len = line.len() + 1; // account for the newline
        if span >= byte_idx && span < byte_idx + line_len {
            line_no = lineno + 1;
            col = span - byte_idx;
            found = true;
            break;
        }
        byte_idx += line_len;
    }
    if !found {
        line_no = src.lines().count().max(1);
        col = 0;
    }

    match &diagnostic.file {
        Some(file) => eprintln!("  --> {}:{}:{}", file, line_no, col + 1),
        None => eprintln!("  --> <source>:{}:{}", line_no, col + 1),
    }

    if let Some(line) = src.lines().nth(line_no - 1) {
        eprintln!("{:4} | {}", line_no, line);
        let mut caret = String::new();
        for _ in 0..col {
            caret.push(' ');
        }
        caret.push('^');
        eprintln!("     | {}", caret);
    }
}

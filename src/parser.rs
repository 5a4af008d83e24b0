//! Host parser integration.
//!
//! This module wraps `deno_ast` parsing for the barley surface language.
//! The surface syntax is TypeScript; everything the compiler restricts
//! (supported statements, expressions, and the primitive type keywords) is
//! enforced by the later passes, not here. The parser returns a
//! `ParsedModule` containing both the parsed AST and the original source
//! text, which later passes use to report span-based diagnostics.
//!
//! A `Program` is an ordered list of source files. The first file is
//! always the built-in declaration file `assembly.d.ts` (bundled with the
//! compiler) and the last file is the entry file; both mangle their
//! top-level names to the bare identifier, while any other file prefixes
//! names with its sanitized relative path.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use deno_ast::{MediaType, ParseParams, ParsedSource, SourceTextInfo, parse_module};
use url::Url;

/// File name of the built-in declaration file.
pub const LIBRARY_FILE: &str = "assembly.d.ts";

/// Contents of the built-in declaration file, bundled with the compiler.
pub const LIBRARY_SOURCE: &str = include_str!("../lib/assembly.d.ts");

/// Default module name used by `parse_program_from_string`.
pub const STRING_ENTRY_FILE: &str = "module.ts";

pub struct ParsedModule {
    pub parsed: ParsedSource,
    /// Original source text (no preprocessing beyond BOM stripping).
    pub source: String,
}

/// One source file of a program.
pub struct SourceFile {
    pub path: PathBuf,
    pub module: ParsedModule,
}

impl SourceFile {
    pub fn is_library(&self) -> bool {
        self.path.file_name().and_then(|n| n.to_str()) == Some(LIBRARY_FILE)
    }
}

/// An ordered set of parsed source files plus the directory names are
/// mangled relative to. The last file is the entry file.
pub struct Program {
    pub files: Vec<SourceFile>,
    pub entry_dir: PathBuf,
}

impl Program {
    pub fn entry(&self) -> &SourceFile {
        self.files.last().expect("program has no source files")
    }
}

/// Parse a single TypeScript source string into a `ParsedModule`.
///
/// The function strips a UTF-8 BOM if present (deno_ast requires this) and
/// builds a `file://` specifier from the provided path so diagnostics and
/// span-based tooling can show accurate locations.
pub fn parse_source(source_code: &str, file_path: &Path) -> Result<ParsedModule> {
    let source_without_bom = source_code.strip_prefix('\u{FEFF}').unwrap_or(source_code);

    let specifier = match Url::from_file_path(file_path) {
        Ok(url) => url,
        Err(()) => {
            Url::parse("file:///module.ts").context("failed to parse fallback module specifier")?
        }
    };

    let sti = SourceTextInfo::from_string(source_without_bom.to_string());
    let params = ParseParams {
        specifier,
        text: sti.text().clone(),
        media_type: MediaType::TypeScript,
        capture_tokens: false,
        scope_analysis: false,
        maybe_syntax: None,
    };

    let parsed =
        parse_module(params).with_context(|| format!("failed to parse {}", file_path.display()))?;

    Ok(ParsedModule {
        parsed,
        source: source_without_bom.to_string(),
    })
}

/// Build a two-file program (library declarations + entry file) from a
/// source file on disk. The entry directory for name mangling is the
/// entry file's parent.
pub fn parse_program_from_file(path: &Path) -> Result<Program> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let entry_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let library = SourceFile {
        path: PathBuf::from(LIBRARY_FILE),
        module: parse_source(LIBRARY_SOURCE, Path::new(LIBRARY_FILE))?,
    };
    let entry = SourceFile {
        path: path.to_path_buf(),
        module: parse_source(&source, path)?,
    };

    Ok(Program {
        files: vec![library, entry],
        entry_dir,
    })
}

/// Build a two-file program (library declarations + `module.ts`) from an
/// in-memory source string.
pub fn parse_program_from_string(source: &str) -> Result<Program> {
    let library = SourceFile {
        path: PathBuf::from(LIBRARY_FILE),
        module: parse_source(LIBRARY_SOURCE, Path::new(LIBRARY_FILE))?,
    };
    let entry = SourceFile {
        path: PathBuf::from(STRING_ENTRY_FILE),
        module: parse_source(source, Path::new(STRING_ENTRY_FILE))?,
    };

    Ok(Program {
        files: vec![library, entry],
        entry_dir: PathBuf::from("."),
    })
}

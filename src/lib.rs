//! Compiler and decompiler for MSCI, the script language of the X-series games.
//!
//! Script text is resolved line by line against a [`SyntaxLibrary`] by the
//! [`TextParser`]; compiled XML scripts are decoded by the [`ScriptReader`].
//! Both produce the same [`ScriptCommand`] model, which renders back to text.

pub mod command;
pub mod config;
pub mod error;
pub mod expression;
pub mod hasher;
pub mod lexer;
pub mod parser;
pub mod reader;
pub mod script;
pub mod syntax;
pub mod token;
pub mod version;

use std::io::Read;

pub use command::{ScriptCommand, ScriptParameter};
pub use error::{CompilerError, ErrorToken};
pub use parser::{classify, ParsedScript, TextParser};
pub use reader::ScriptReader;
pub use script::ScriptFile;
pub use syntax::SyntaxLibrary;
pub use version::GameVersion;

/// Parse script source lines for one game release.
pub fn parse_text<S: AsRef<str>>(
    lines: &[S],
    library: &SyntaxLibrary,
    version: GameVersion,
) -> ParsedScript {
    TextParser::new(library, version).parse(lines)
}

/// Read a compiled script.
pub fn read_serialized(
    input: impl Read,
    library: &SyntaxLibrary,
) -> Result<ScriptFile, CompilerError> {
    ScriptReader::new(library).read_file(input)
}

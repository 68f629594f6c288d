use std::fmt;

use thiserror::Error;

use crate::version::GameVersion;

#[derive(Debug, Error)]
pub enum CompilerError {
    #[error("FileNotFoundError: {0}")]
    FileNotFound(String),

    #[error("IOError: {0}")]
    IO(#[from] std::io::Error),

    #[error("SignatureNotFound: {0}")]
    SignatureNotFound(#[from] SignatureNotFound),

    #[error("FileFormatError: {0}")]
    FileFormat(#[from] FileFormatError),

    #[error("XmlError: {0}")]
    UnderlyingParser(#[from] roxmltree::Error),

    #[error("SyntaxSourceError: {0}")]
    SyntaxSource(String),

    #[error("ConfigError: {0}")]
    Config(String),
}

/// No signature exists for the requested command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureNotFound {
    #[error("no syntax for command {id} in {version}")]
    ById { id: u32, version: GameVersion },

    #[error("unrecognised command '{key}' in {version}")]
    ByText { key: String, version: GameVersion },
}

/// A serialized script that does not follow the codearray layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} ({context})")]
pub struct FileFormatError {
    pub message: String,
    pub context: String,
}

impl FileFormatError {
    pub fn new(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: context.into(),
        }
    }
}

/// A localized problem in script source text. Lines are 1-based, columns are byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorToken {
    pub line: usize,
    pub start: usize,
    pub end: usize,
    pub message: String,
}

impl ErrorToken {
    pub fn new(line: usize, start: usize, end: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            start,
            end,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}: {}",
            self.line, self.start, self.end, self.message
        )
    }
}

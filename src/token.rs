use serde::{Deserialize, Serialize};

/// A lexed span of one script line. `start`/`end` are byte offsets into the line.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    Text,            // words and unrecognised characters
    Number,          // 12, -4, 1.5
    String,          // 'text' or "text"
    GameObjectRef,   // {Argon Sector}
    ScriptObjectRef, // [THIS]
    Keyword,         // if, while, skip, do, not, else, break, continue, end
    Variable,        // $name
    Null,            // null
    Label,           // name in `name:`
    Operator,        // ->, ==, +, (, =, ...
    Comment,         // * to end of line
    Whitespace,
}

impl Token {
    pub fn new(kind: TokenKind, start: usize, end: usize, text: impl Into<String>) -> Self {
        Self {
            kind,
            start,
            end,
            text: text.into(),
        }
    }

    /// Tokens that carry a concrete value rather than part of a command's wording.
    pub fn is_slot(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Number
                | TokenKind::String
                | TokenKind::Variable
                | TokenKind::GameObjectRef
                | TokenKind::ScriptObjectRef
                | TokenKind::Label
                | TokenKind::Null
        )
    }

    /// Tokens that form the wording of a command signature.
    pub fn is_literal(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Text | TokenKind::Operator | TokenKind::Keyword
        )
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text.eq_ignore_ascii_case(word)
    }

    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.text == op
    }

    /// The value a slot token stands for, with quotes, braces and sigils removed.
    pub fn value(&self) -> &str {
        let text = self.text.as_str();
        match self.kind {
            TokenKind::Variable => text.strip_prefix('$').unwrap_or(text),
            TokenKind::String => {
                let inner = text.get(1..).unwrap_or("");
                match text.chars().next() {
                    Some(quote) => inner.strip_suffix(quote).unwrap_or(inner),
                    None => inner,
                }
            }
            TokenKind::GameObjectRef => {
                let inner = text.strip_prefix('{').unwrap_or(text);
                inner.strip_suffix('}').unwrap_or(inner)
            }
            TokenKind::ScriptObjectRef => {
                let inner = text.strip_prefix('[').unwrap_or(text);
                inner.strip_suffix(']').unwrap_or(inner)
            }
            TokenKind::Comment => text.strip_prefix('*').unwrap_or(text).trim(),
            _ => text,
        }
    }

    /// Like `value`, with backslash escapes in string literals resolved.
    pub fn unescaped(&self) -> String {
        let value = self.value();
        if self.kind != TokenKind::String || !value.contains('\\') {
            return value.to_string();
        }

        let mut out = String::with_capacity(value.len());
        let mut chars = value.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => out.extend(chars.next()),
                c => out.push(c),
            }
        }
        out
    }
}

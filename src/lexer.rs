use crate::token::{Token, TokenKind};

const KEYWORDS: [&str; 9] = [
    "if", "while", "skip", "do", "not", "else", "break", "continue", "end",
];

// Longest entries first; matching takes the first hit.
const OPERATORS: [&str; 24] = [
    "->", "==", "!=", "<=", ">=", "<<", ">>", "<", ">", "+", "-", "*", "/", "%", "=", "(", ")",
    ":", ",", "!", "~", "&", "|", "^",
];

/// Lexes a single line of MSCI source text.
///
/// The lexer never fails: anything it does not recognise becomes a one-character
/// `Text` token, so the parser can always make progress.
pub struct Lexer<'a> {
    line: &'a str,
    skip_whitespace: bool,
    current: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(line: &'a str) -> Self {
        Self {
            line,
            skip_whitespace: false,
            current: 0,
            tokens: Vec::new(),
        }
    }

    /// Drop whitespace tokens instead of preserving them for byte-exact editing.
    pub fn skip_whitespace(mut self, skip: bool) -> Self {
        self.skip_whitespace = skip;
        self
    }

    fn at(&self) -> Option<char> {
        self.line[self.current..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.line[self.current..].chars().nth(offset)
    }

    fn rest(&self) -> &'a str {
        &self.line[self.current..]
    }

    fn create_token(&mut self, kind: TokenKind, start: usize) {
        if kind == TokenKind::Whitespace && self.skip_whitespace {
            return;
        }
        let text = &self.line[start..self.current];
        self.tokens.push(Token::new(kind, start, self.current, text));
    }

    /// Advance while `pred` holds, returning how many bytes were consumed.
    fn advance_while(&mut self, pred: impl Fn(char) -> bool) -> usize {
        let start = self.current;
        while let Some(c) = self.at() {
            if !pred(c) {
                break;
            }
            self.current += c.len_utf8();
        }
        self.current - start
    }

    /// Consume up to and including `close`, or to the end of the line if it never appears.
    fn advance_delimited(&mut self, close: char, escapes: bool) {
        let mut chars = self.rest().char_indices();
        // opening delimiter
        let mut end = self.line.len() - self.current;
        chars.next();
        while let Some((i, c)) = chars.next() {
            if escapes && c == '\\' {
                chars.next();
            } else if c == close {
                end = i + c.len_utf8();
                break;
            }
        }
        self.current += end;
    }

    fn last_significant(&self) -> Option<&Token> {
        self.tokens
            .iter()
            .rev()
            .find(|t| t.kind != TokenKind::Whitespace)
    }

    /// A sign directly before a digit belongs to the number unless a value precedes it.
    fn in_operand_position(&self) -> bool {
        match self.last_significant() {
            None => true,
            Some(token) => match token.kind {
                TokenKind::Operator => token.text != ")",
                TokenKind::Keyword | TokenKind::Text => true,
                _ => false,
            },
        }
    }

    fn lex_number(&mut self, start: usize) {
        if matches!(self.at(), Some('-') | Some('+')) {
            self.current += 1;
        }
        self.advance_while(|c| c.is_ascii_digit());
        if self.at() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.current += 1;
            self.advance_while(|c| c.is_ascii_digit());
        }
        self.create_token(TokenKind::Number, start);
    }

    fn lex_word(&mut self, start: usize) {
        self.advance_while(|c| c.is_alphanumeric() || c == '_' || c == '.');
        let word = &self.line[start..self.current];

        let kind = if KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word)) {
            TokenKind::Keyword
        } else if word.eq_ignore_ascii_case("null") {
            TokenKind::Null
        } else if self.is_label_definition() {
            TokenKind::Label
        } else {
            TokenKind::Text
        };
        self.create_token(kind, start);
    }

    /// `name:` alone on its line.
    fn is_label_definition(&self) -> bool {
        let Some(after) = self.rest().strip_prefix(':') else {
            return false;
        };
        let only_word_before = self
            .tokens
            .iter()
            .all(|t| t.kind == TokenKind::Whitespace);
        only_word_before && after.trim().is_empty()
    }

    fn lex_operator(&mut self, start: usize) -> bool {
        let rest = self.rest();
        match OPERATORS.iter().find(|op| rest.starts_with(**op)) {
            Some(op) => {
                self.current += op.len();
                self.create_token(TokenKind::Operator, start);
                true
            }
            None => false,
        }
    }

    pub fn tokenize(mut self) -> Vec<Token> {
        while let Some(ch) = self.at() {
            let start = self.current;

            match ch {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance_while(|c| matches!(c, ' ' | '\t' | '\r' | '\n'));
                    self.create_token(TokenKind::Whitespace, start);
                }
                '*' if self.last_significant().is_none() => {
                    self.current = self.line.len();
                    self.create_token(TokenKind::Comment, start);
                }
                '\'' | '"' => {
                    self.advance_delimited(ch, true);
                    self.create_token(TokenKind::String, start);
                }
                '{' => {
                    self.advance_delimited('}', false);
                    self.create_token(TokenKind::GameObjectRef, start);
                }
                '[' => {
                    self.advance_delimited(']', false);
                    self.create_token(TokenKind::ScriptObjectRef, start);
                }
                '$' if self
                    .peek_at(1)
                    .is_some_and(|c| c.is_alphanumeric() || c == '_') =>
                {
                    self.current += 1;
                    self.advance_while(|c| c.is_alphanumeric() || c == '_' || c == '.');
                    self.create_token(TokenKind::Variable, start);
                }
                c if c.is_ascii_digit() => self.lex_number(start),
                '-' | '+'
                    if self.peek_at(1).is_some_and(|c| c.is_ascii_digit())
                        && self.in_operand_position() =>
                {
                    self.lex_number(start)
                }
                c if c.is_alphabetic() || c == '_' => self.lex_word(start),
                c => {
                    if !self.lex_operator(start) {
                        self.current += c.len_utf8();
                        self.create_token(TokenKind::Text, start);
                    }
                }
            }
        }

        self.tokens
    }
}

/// Lex `line` with whitespace dropped, the form the parser and syntax library work on.
pub fn tokenize(line: &str) -> Vec<Token> {
    Lexer::new(line).skip_whitespace(true).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(line: &str) -> Vec<TokenKind> {
        tokenize(line).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_preserved_tokens_reproduce_the_line() {
        let lines = [
            "$ship = [THIS] -> get ship in sector {Argon Prime}",
            "  if not $count == -3.5 AND 'it\\'s' != null",
            "* a comment with 'quotes' and $vars",
            "start:",
            "skip if $x -> is docked   ",
            "weird ¤ characters ‽ here '\u{e9}nd",
            "$a = ($b - 2) * -4",
            "",
        ];
        for line in lines {
            let rebuilt: String = Lexer::new(line)
                .tokenize()
                .iter()
                .map(|t| &line[t.start..t.end])
                .collect();
            assert_eq!(rebuilt, line);
        }
    }

    #[test]
    fn test_token_kinds() {
        assert_eq!(
            kinds("$x = [THIS] -> get name of {Argon Buster}"),
            vec![
                TokenKind::Variable,
                TokenKind::Operator,
                TokenKind::ScriptObjectRef,
                TokenKind::Operator,
                TokenKind::Text,
                TokenKind::Text,
                TokenKind::Text,
                TokenKind::GameObjectRef,
            ]
        );
        assert_eq!(
            kinds("skip if not null"),
            vec![
                TokenKind::Keyword,
                TokenKind::Keyword,
                TokenKind::Keyword,
                TokenKind::Null
            ]
        );
    }

    #[test]
    fn test_comment_only_at_line_start() {
        let tokens = tokenize("   * hello world");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Comment);
        assert_eq!(tokens[0].value(), "hello world");

        let tokens = tokenize("$a = $b * 2");
        assert!(tokens.iter().any(|t| t.is_operator("*")));
    }

    #[test]
    fn test_signed_numbers_depend_on_position() {
        let tokens = tokenize("$a = -5");
        assert_eq!(tokens[2].kind, TokenKind::Number);
        assert_eq!(tokens[2].text, "-5");

        let tokens = tokenize("$a = $b -5");
        assert_eq!(tokens[3].text, "-");
        assert_eq!(tokens[4].text, "5");

        let tokens = tokenize("1.25 + 3.");
        assert_eq!(tokens[0].text, "1.25");
        assert_eq!(tokens[2].text, "3");
        assert_eq!(tokens[3].text, ".");
    }

    #[test]
    fn test_strings_and_escapes() {
        let tokens = tokenize(r"write 'don\'t panic' now");
        assert_eq!(tokens[1].kind, TokenKind::String);
        assert_eq!(tokens[1].unescaped(), "don't panic");
        assert_eq!(tokens[2].text, "now");

        // unterminated literals run to the end of the line
        let tokens = tokenize("'open ended");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].value(), "open ended");
    }

    #[test]
    fn test_labels_and_keywords() {
        let tokens = tokenize("Start:");
        assert_eq!(tokens[0].kind, TokenKind::Label);
        assert_eq!(tokens[0].text, "Start");
        assert!(tokens[1].is_operator(":"));

        let tokens = tokenize("IF NOT $x");
        assert!(tokens[0].is_keyword("if"));
        assert!(tokens[1].is_keyword("not"));

        // a colon mid-line is not a label definition
        assert_eq!(kinds("wait: 5")[0], TokenKind::Text);
    }

    #[test]
    fn test_unknown_characters_become_text() {
        let tokens = tokenize("¤$");
        assert_eq!(tokens.len(), 2);
        assert!(tokens.iter().all(|t| t.kind == TokenKind::Text));
        assert_eq!(tokens[0].end - tokens[0].start, '¤'.len_utf8());
    }
}

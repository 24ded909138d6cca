//! Char stream → token stream, with line/col tracking (spec §4.1).
//!
//! Newlines are significant statement terminators, not whitespace, and are
//! emitted as their own token. Indentation carries no meaning.

use crate::diagnostics::{Diagnostic, DiagnosticBag, DiagnosticKind};
use snow_core::Width;
use std::path::{Path, PathBuf};

const KEYWORDS: &[&str] = &[
    "module", "import", "function", "params", "returns", "body", "declare", "if", "then", "else",
    "loop", "init", "cond", "step", "break", "continue", "return", "struct", "fields", "end",
    "self", "this", "new", "extends", "super", "const",
];

const TYPE_KEYWORDS: &[&str] = &[
    "byte", "short", "int", "long", "float", "double", "string", "bool", "boolean", "void", "any",
];

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier,
    Keyword,
    Type,
    Bool(bool),
    Number { width: Width, is_float_form: bool },
    Str(String),
    Newline,
    Eof,
    // Multi-character operators (greedy longest-match, per spec §4.1)
    EqEq,
    NotEq,
    Le,
    Ge,
    AndAnd,
    OrOr,
    // Single-character operators / punctuation
    Assign,
    Bang,
    Lt,
    Gt,
    Colon,
    Comma,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub col: usize,
}

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

pub fn is_type_keyword(word: &str) -> bool {
    TYPE_KEYWORDS.contains(&word)
}

struct Lexer {
    file: PathBuf,
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    tokens: Vec<Token>,
    diagnostics: DiagnosticBag,
}

pub fn tokenize(file: &Path, source: &str) -> (Vec<Token>, DiagnosticBag) {
    let mut lexer = Lexer {
        file: file.to_path_buf(),
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        col: 1,
        tokens: Vec::new(),
        diagnostics: DiagnosticBag::new(),
    };
    lexer.run();
    (lexer.tokens, lexer.diagnostics)
}

impl Lexer {
    fn run(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' => {
                    self.advance();
                }
                '\r' => {
                    self.advance();
                    if self.peek() == Some('\n') {
                        self.advance();
                    }
                    self.emit_newline();
                }
                '\n' => {
                    self.advance();
                    self.emit_newline();
                }
                '/' if self.peek_at(1) == Some('/') => self.skip_line_comment(),
                '/' if self.peek_at(1) == Some('*') => self.skip_block_comment(),
                '"' => self.scan_string(),
                c if c.is_ascii_digit() => self.scan_number(),
                c if c == '_' || c.is_alphabetic() => self.scan_word(),
                _ => self.scan_operator(),
            }
        }
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            lexeme: String::new(),
            line: self.line,
            col: self.col,
        });
    }

    fn emit_newline(&mut self) {
        self.tokens.push(Token {
            kind: TokenKind::Newline,
            lexeme: "\n".to_string(),
            line: self.line,
            col: 1,
        });
        self.line += 1;
        self.col = 1;
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        self.col += 1;
        Some(c)
    }

    fn error(&mut self, line: usize, col: usize, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(
            DiagnosticKind::LexError,
            self.file.clone(),
            line,
            col,
            message,
        ));
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn skip_block_comment(&mut self) {
        let (start_line, start_col) = (self.line, self.col);
        self.advance(); // '/'
        self.advance(); // '*'
        loop {
            match self.peek() {
                None => {
                    self.error(start_line, start_col, "unterminated block comment");
                    return;
                }
                Some('*') if self.peek_at(1) == Some('/') => {
                    self.advance();
                    self.advance();
                    return;
                }
                Some('\n') => {
                    self.advance();
                    self.line += 1;
                    self.col = 1;
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    fn scan_word(&mut self) {
        let (line, col) = (self.line, self.col);
        let start = self.pos;
        self.advance();
        while let Some(c) = self.peek() {
            if c == '_' || c.is_alphanumeric() {
                self.advance();
            } else {
                break;
            }
        }
        let lexeme: String = self.chars[start..self.pos].iter().collect();
        let kind = if lexeme == "true" {
            TokenKind::Bool(true)
        } else if lexeme == "false" {
            TokenKind::Bool(false)
        } else if is_keyword(&lexeme) {
            TokenKind::Keyword
        } else if is_type_keyword(&lexeme) {
            TokenKind::Type
        } else {
            TokenKind::Identifier
        };
        self.tokens.push(Token {
            kind,
            lexeme,
            line,
            col,
        });
    }

    /// `INT_PART → [. → FRAC_PART] → [suffix]`, per spec §4.1.
    fn scan_number(&mut self) {
        let (line, col) = (self.line, self.col);
        let start = self.pos;
        self.consume_digits();

        let mut is_float_form = false;
        if self.peek() == Some('.') {
            if matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
                is_float_form = true;
                self.advance(); // '.'
                self.consume_digits();
            } else if self.peek_at(1).is_some_and(|c| c.is_alphabetic()) || self.peek_at(1).is_none()
            {
                // '.' followed by non-digit: LexError, per spec §4.1.
                self.error(
                    self.line,
                    self.col,
                    "malformed number literal: '.' not followed by a digit",
                );
                self.advance();
            }
        }

        let digits_end = self.pos;

        // Whitespace between digits and a trailing suffix letter is itself
        // an error ("3 L"), so only consume a suffix if it immediately
        // follows the digit sequence.
        let mut width = if is_float_form {
            Width::default_float()
        } else {
            Width::default_integer()
        };
        if let Some(c) = self.peek() {
            if c.is_alphabetic() {
                if let Some(w) = Width::from_suffix(c) {
                    width = w;
                    self.advance();
                } else {
                    self.error(
                        self.line,
                        self.col,
                        format!("illegal numeric suffix '{c}'"),
                    );
                    self.advance();
                }
            } else if c == ' ' || c == '\t' {
                // Detect "3 L" pattern: whitespace then a bare suffix letter
                // with nothing else alphanumeric following.
                let mut lookahead = self.pos;
                while matches!(self.chars.get(lookahead), Some(' ') | Some('\t')) {
                    lookahead += 1;
                }
                if let Some(&lc) = self.chars.get(lookahead) {
                    if Width::from_suffix(lc).is_some()
                        && !self.chars.get(lookahead + 1).is_some_and(|n| {
                            n.is_alphanumeric() || *n == '_'
                        })
                    {
                        self.error(
                            self.line,
                            self.col,
                            "whitespace not allowed between digits and numeric suffix",
                        );
                    }
                }
            }
        }

        let lexeme: String = self.chars[start..digits_end]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        self.tokens.push(Token {
            kind: TokenKind::Number {
                width,
                is_float_form,
            },
            lexeme,
            line,
            col,
        });
    }

    fn consume_digits(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn scan_string(&mut self) {
        let (line, col) = (self.line, self.col);
        let start = self.pos;
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                None => {
                    self.error(line, col, "unterminated string literal at end of file");
                    break;
                }
                Some('\n') => {
                    // Unterminated string on newline ends the token at that
                    // point; recoverable (spec §4.1).
                    self.error(line, col, "unterminated string literal");
                    break;
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.scan_escape() {
                        Some(c) => value.push(c),
                        None => self.error(self.line, self.col, "invalid escape sequence"),
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
        let lexeme: String = self.chars[start..self.pos].iter().collect();
        self.tokens.push(Token {
            kind: TokenKind::Str(value),
            lexeme,
            line,
            col,
        });
    }

    fn scan_escape(&mut self) -> Option<char> {
        let c = self.advance()?;
        match c {
            'n' => Some('\n'),
            'r' => Some('\r'),
            't' => Some('\t'),
            'b' => Some('\u{8}'),
            'f' => Some('\u{c}'),
            '"' => Some('"'),
            '\\' => Some('\\'),
            '/' => Some('/'),
            'u' => {
                let mut hex = String::new();
                for _ in 0..4 {
                    hex.push(self.advance()?);
                }
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
            }
            _ => None,
        }
    }

    fn scan_operator(&mut self) {
        let (line, col) = (self.line, self.col);
        let c = self.advance().unwrap();
        let two = (c, self.peek());
        let kind = match two {
            ('=', Some('=')) => {
                self.advance();
                TokenKind::EqEq
            }
            ('!', Some('=')) => {
                self.advance();
                TokenKind::NotEq
            }
            ('<', Some('=')) => {
                self.advance();
                TokenKind::Le
            }
            ('>', Some('=')) => {
                self.advance();
                TokenKind::Ge
            }
            ('&', Some('&')) => {
                self.advance();
                TokenKind::AndAnd
            }
            ('|', Some('|')) => {
                self.advance();
                TokenKind::OrOr
            }
            ('=', _) => TokenKind::Assign,
            ('!', _) => TokenKind::Bang,
            ('<', _) => TokenKind::Lt,
            ('>', _) => TokenKind::Gt,
            (':', _) => TokenKind::Colon,
            (',', _) => TokenKind::Comma,
            ('.', _) => TokenKind::Dot,
            ('(', _) => TokenKind::LParen,
            (')', _) => TokenKind::RParen,
            ('[', _) => TokenKind::LBracket,
            (']', _) => TokenKind::RBracket,
            ('+', _) => TokenKind::Plus,
            ('-', _) => TokenKind::Minus,
            ('*', _) => TokenKind::Star,
            ('/', _) => TokenKind::Slash,
            ('%', _) => TokenKind::Percent,
            (other, _) => {
                self.error(line, col, format!("unexpected character '{other}'"));
                return;
            }
        };
        self.tokens.push(Token {
            kind,
            lexeme: c.to_string(),
            line,
            col,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let (tokens, diags) = tokenize(Path::new("t.snow"), src);
        assert!(diags.is_empty(), "unexpected diagnostics: {:?}", diags.into_vec());
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_vs_identifiers() {
        let ks = kinds("module foo");
        assert_eq!(ks[0], TokenKind::Keyword);
        assert_eq!(ks[1], TokenKind::Identifier);
    }

    #[test]
    fn number_suffixes() {
        let (tokens, diags) = tokenize(Path::new("t.snow"), "3b 7L 1.5f 9");
        assert!(diags.is_empty());
        let nums: Vec<_> = tokens
            .iter()
            .filter_map(|t| match &t.kind {
                TokenKind::Number { width, .. } => Some(*width),
                _ => None,
            })
            .collect();
        assert_eq!(
            nums,
            vec![Width::Byte, Width::Long, Width::Float, Width::Int]
        );
    }

    #[test]
    fn default_widths() {
        let (tokens, _) = tokenize(Path::new("t.snow"), "42 3.14");
        let nums: Vec<_> = tokens
            .iter()
            .filter_map(|t| match &t.kind {
                TokenKind::Number { width, .. } => Some(*width),
                _ => None,
            })
            .collect();
        assert_eq!(nums, vec![Width::Int, Width::Double]);
    }

    #[test]
    fn dot_without_digit_is_lex_error() {
        let (_, diags) = tokenize(Path::new("t.snow"), "1.x");
        assert!(!diags.is_empty());
    }

    #[test]
    fn whitespace_before_suffix_is_lex_error() {
        let (_, diags) = tokenize(Path::new("t.snow"), "3 L");
        assert!(!diags.is_empty());
    }

    #[test]
    fn string_escapes() {
        let (tokens, diags) = tokenize(Path::new("t.snow"), r#""a\nbA""#);
        assert!(diags.is_empty());
        match &tokens[0].kind {
            TokenKind::Str(s) => assert_eq!(s, "a\nbA"),
            other => panic!("expected string token, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_string_recovers_at_newline() {
        let (tokens, diags) = tokenize(Path::new("t.snow"), "\"abc\nfoo");
        assert!(!diags.is_empty());
        // Lexing continues past the bad string: `foo` is still tokenized.
        assert!(tokens.iter().any(|t| t.lexeme == "foo"));
    }

    #[test]
    fn operators_greedy_longest_match() {
        let (tokens, _) = tokenize(Path::new("t.snow"), "== != <= >= && || = ! < >");
        let kinds: Vec<_> = tokens.into_iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::Assign,
                TokenKind::Bang,
                TokenKind::Lt,
                TokenKind::Gt,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        let (tokens, diags) = tokenize(Path::new("t.snow"), "foo // line\nbar /* block */ baz");
        assert!(diags.is_empty());
        let idents: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Identifier)
            .map(|t| t.lexeme.as_str())
            .collect();
        assert_eq!(idents, vec!["foo", "bar", "baz"]);
    }

    #[test]
    fn nested_block_comment_closes_at_first_close() {
        // `/* /* */ */` closes at the first `*/`, per spec §9.
        let (tokens, diags) = tokenize(Path::new("t.snow"), "/* /* */ */ x");
        assert!(diags.is_empty());
        // The trailing `*/` becomes stray tokens (`*` then `/`), and `x`
        // still lexes as an identifier afterward.
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Identifier));
    }

    #[test]
    fn crlf_normalizes_to_single_newline() {
        let (tokens, _) = tokenize(Path::new("t.snow"), "a\r\nb");
        let newline_count = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Newline)
            .count();
        assert_eq!(newline_count, 1);
    }
}

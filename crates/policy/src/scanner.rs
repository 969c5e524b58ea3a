//! Lexical scanner for policy source text.

use crate::{Error, Result};
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

/// Single-character punctuation recognised by the scanner.
const PUNCTUATION: [char; 5] = [',', ';', '{', '}', '*'];

/// Classified lexeme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// A bare word: keyword, class name or any other unquoted run.
    Word(String),
    /// Contents of a double-quoted string literal, escapes applied.
    Quoted(String),
    /// One of `,` `;` `{` `}` `*`.
    Punct(char),
    /// End of input.
    Eof,
}

/// A lexeme with the line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

impl Token {
    /// Returns the word if this token is a bare word.
    pub fn word(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Word(w) => Some(w),
            _ => None,
        }
    }

    /// Returns `true` if this token is a word equal to `keyword`, ignoring case.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.word().is_some_and(|w| w.eq_ignore_ascii_case(keyword))
    }

    /// Returns the literal if this token is a quoted string.
    pub fn quoted(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Quoted(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct(c)
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TokenKind::Word(w) => write!(f, "word '{w}'"),
            TokenKind::Quoted(s) => write!(f, "string \"{s}\""),
            TokenKind::Punct(c) => write!(f, "'{c}'"),
            TokenKind::Eof => f.write_str("end of input"),
        }
    }
}

/// Finite token sequence produced by [`scan`].
///
/// Reading past the end keeps returning the end-of-input token. One token of
/// look-behind is available through [`TokenStream::push_back`].
#[derive(Debug, Clone)]
pub struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenStream {
    /// Advance and return the next token.
    pub fn next_token(&mut self) -> &Token {
        let idx = self.pos.min(self.tokens.len() - 1);
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        &self.tokens[idx]
    }

    /// Return the token that the next call to `next_token` will yield.
    pub fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    /// Hand the most recently returned token back to the stream.
    pub fn push_back(&mut self) {
        self.pos = self.pos.saturating_sub(1);
    }

    /// Restart from the first token.
    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    pub fn len(&self) -> usize {
        self.tokens.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Tokenize policy source text.
///
/// Fails only on malformed string literals; every other character sequence
/// is either whitespace, a comment, punctuation or part of a word.
pub fn scan(text: &str) -> Result<TokenStream> {
    let mut scanner = Scanner {
        chars: text.chars().peekable(),
        line: 1,
    };
    let mut tokens = Vec::new();
    loop {
        let token = scanner.next()?;
        let done = token.is_eof();
        tokens.push(token);
        if done {
            break;
        }
    }
    Ok(TokenStream { tokens, pos: 0 })
}

struct Scanner<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
}

impl Scanner<'_> {
    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn next(&mut self) -> Result<Token> {
        loop {
            let Some(&c) = self.chars.peek() else {
                return Ok(self.token(TokenKind::Eof));
            };

            if c.is_whitespace() {
                self.bump();
                continue;
            }

            if c == '/' && self.skip_comment() {
                continue;
            }

            if PUNCTUATION.contains(&c) {
                self.bump();
                return Ok(self.token(TokenKind::Punct(c)));
            }

            if c == '"' {
                let line = self.line;
                self.bump();
                let literal = self.string_literal(line)?;
                return Ok(Token {
                    kind: TokenKind::Quoted(literal),
                    line,
                });
            }

            let line = self.line;
            let word = self.word();
            return Ok(Token {
                kind: TokenKind::Word(word),
                line,
            });
        }
    }

    fn token(&self, kind: TokenKind) -> Token {
        Token {
            kind,
            line: self.line,
        }
    }

    /// Consume a comment starting at the current `/`, if there is one.
    fn skip_comment(&mut self) -> bool {
        let mut lookahead = self.chars.clone();
        lookahead.next();
        match lookahead.peek() {
            Some('/') => {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
                true
            }
            Some('*') => {
                self.bump();
                self.bump();
                let mut prev = '\0';
                // An unterminated block comment runs to the end of input.
                while let Some(c) = self.bump() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                true
            }
            _ => false,
        }
    }

    fn word(&mut self) -> String {
        let mut word = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() || c == '"' || PUNCTUATION.contains(&c) {
                break;
            }
            if c == '/' {
                let mut lookahead = self.chars.clone();
                lookahead.next();
                if matches!(lookahead.peek(), Some('/') | Some('*')) {
                    break;
                }
            }
            word.push(c);
            self.bump();
        }
        word
    }

    fn string_literal(&mut self, line: usize) -> Result<String> {
        let mut literal = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(Error::Lexical {
                        line,
                        message: "unterminated string literal".into(),
                    });
                }
                Some('"') => return Ok(literal),
                Some('\\') => literal.push(self.escape(line)?),
                Some(c) => literal.push(c),
            }
        }
    }

    fn escape(&mut self, line: usize) -> Result<char> {
        let Some(c) = self.bump() else {
            return Err(Error::Lexical {
                line,
                message: "unterminated string literal".into(),
            });
        };
        let escaped = match c {
            '\\' => '\\',
            '"' => '"',
            '\'' => '\'',
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'b' => '\u{8}',
            'f' => '\u{c}',
            '0'..='7' => return Ok(self.octal_escape(c)),
            other => {
                return Err(Error::Lexical {
                    line,
                    message: format!("invalid escape sequence '\\{other}'"),
                });
            }
        };
        Ok(escaped)
    }

    /// Up to three octal digits; a leading digit above 3 limits it to two.
    fn octal_escape(&mut self, first: char) -> char {
        let max_digits = if first <= '3' { 3 } else { 2 };
        let mut value = first.to_digit(8).unwrap_or(0);
        for _ in 1..max_digits {
            match self.chars.peek().and_then(|c| c.to_digit(8)) {
                Some(d) => {
                    value = value * 8 + d;
                    self.bump();
                }
                None => break,
            }
        }
        char::from_u32(value).unwrap_or('\u{fffd}')
    }
}

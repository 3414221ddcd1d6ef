//! The lexer: formula source text → token stream.
//!
//! Tokenization is best-effort and total for well-formed operator and
//! punctuation input; the only hard failures are impossible states. An
//! unterminated string closes at end of input so the parser still sees a
//! usable stream.

use std::error::Error;
use std::fmt::{self, Display};

/// Half-open byte span `[start, end)` into the source text.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Number,
    Str,
    Bool,
    Ident,
    Func,
    Op,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    Dollar,
    Bang,
    At,
    Hash,
    Infinity,
    ErrorLit,
    Eof,
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, start: usize, end: usize) -> Self {
        Token {
            kind,
            text: text.into(),
            span: Span::new(start, end),
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} {:?}>", self.kind, self.text)
    }
}

#[derive(Debug)]
pub struct TokenizeError {
    pub message: String,
    pub pos: usize,
}

impl Display for TokenizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenizeError at {}: {}", self.pos, self.message)
    }
}

impl Error for TokenizeError {}

/// The selector words recognized after `#` inside structured references.
/// Anything else after `#` lexes as an error literal.
const HASH_SELECTORS: &[&str] = &["All", "Data", "Headers", "ThisRow"];

const fn build_ident_table() -> [bool; 256] {
    let mut tbl = [false; 256];
    let mut b = 0usize;
    while b < 256 {
        let c = b as u8;
        tbl[b] = c.is_ascii_alphanumeric() || c == b'_' || c == b'.';
        b += 1;
    }
    tbl
}
static IDENT_TABLE: [bool; 256] = build_ident_table();

#[inline(always)]
fn is_ident_byte(c: u8) -> bool {
    IDENT_TABLE[c as usize]
}

pub struct Tokenizer<'s> {
    src: &'s str,
    offset: usize,
    items: Vec<Token>,
}

/// Tokenize a formula body (no leading `=`) into a stream ending in `Eof`.
pub fn tokenize(src: &str) -> Result<Vec<Token>, TokenizeError> {
    Tokenizer {
        src,
        offset: 0,
        items: Vec::with_capacity(src.len() / 2 + 1),
    }
    .run()
}

impl<'s> Tokenizer<'s> {
    fn run(mut self) -> Result<Vec<Token>, TokenizeError> {
        while let Some(b) = self.peek() {
            match b {
                b' ' | b'\t' | b'\n' | b'\r' => {
                    self.offset += 1;
                }
                b'"' => self.scan_string(),
                b'\'' => self.scan_identifier(),
                b'0'..=b'9' => self.scan_number(),
                b'.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.scan_number(),
                b'#' => self.scan_hash(),
                b'<' | b'>' => self.scan_comparison(),
                b'+' | b'-' | b'*' | b'/' | b'^' | b'&' | b'=' | b'%' => {
                    self.push_single(TokenKind::Op)
                }
                b'(' => self.push_single(TokenKind::LParen),
                b')' => self.push_single(TokenKind::RParen),
                b'{' => self.push_single(TokenKind::LBrace),
                b'}' => self.push_single(TokenKind::RBrace),
                b'[' => self.push_single(TokenKind::LBracket),
                b']' => self.push_single(TokenKind::RBracket),
                b',' => self.push_single(TokenKind::Comma),
                b';' => self.push_single(TokenKind::Semicolon),
                b':' => self.push_single(TokenKind::Colon),
                b'$' => self.push_single(TokenKind::Dollar),
                b'!' => self.push_single(TokenKind::Bang),
                b'@' => self.push_single(TokenKind::At),
                c if is_ident_byte(c) || c >= 0x80 => self.scan_identifier(),
                other => {
                    return Err(TokenizeError {
                        message: format!("unexpected character {:?}", other as char),
                        pos: self.offset,
                    });
                }
            }
        }
        let end = self.src.len();
        self.items.push(Token::new(TokenKind::Eof, "", end, end));
        Ok(self.items)
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.offset).copied()
    }

    #[inline]
    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.src.as_bytes().get(self.offset + ahead).copied()
    }

    fn push_single(&mut self, kind: TokenKind) {
        let start = self.offset;
        self.offset += 1;
        self.items
            .push(Token::new(kind, &self.src[start..self.offset], start, self.offset));
    }

    /// Double-quoted string, `""` escaping one quote. An unterminated
    /// string closes at end of input.
    fn scan_string(&mut self) {
        let start = self.offset;
        self.offset += 1;
        while let Some(b) = self.peek() {
            self.offset += 1;
            if b == b'"' {
                if self.peek() == Some(b'"') {
                    self.offset += 1;
                } else {
                    break;
                }
            }
        }
        self.items.push(Token::new(
            TokenKind::Str,
            &self.src[start..self.offset],
            start,
            self.offset,
        ));
    }

    /// Mantissa with optional fraction and exponent. A second `.` splits
    /// at the boundary: `12.34.56` lexes as `12.34` then `.56`.
    fn scan_number(&mut self) {
        let start = self.offset;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.offset += 1;
        }
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.offset += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.offset += 1;
            }
        } else if self.peek() == Some(b'.') && self.offset > start {
            // trailing dot belongs to the number: "12." parses as 12.0
            self.offset += 1;
        }
        if matches!(self.peek(), Some(b'E') | Some(b'e')) {
            let mut ahead = 1;
            if matches!(self.peek_at(1), Some(b'+') | Some(b'-')) {
                ahead = 2;
            }
            if self.peek_at(ahead).is_some_and(|c| c.is_ascii_digit()) {
                self.offset += ahead;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.offset += 1;
                }
            }
        }
        self.items.push(Token::new(
            TokenKind::Number,
            &self.src[start..self.offset],
            start,
            self.offset,
        ));
    }

    /// Identifier run, possibly containing single-quoted stretches that
    /// are preserved verbatim (sheet names like `'My Sheet'`).
    fn scan_identifier(&mut self) {
        let start = self.offset;
        loop {
            match self.peek() {
                Some(b'\'') => {
                    self.offset += 1;
                    while let Some(b) = self.peek() {
                        self.offset += 1;
                        if b == b'\'' {
                            if self.peek() == Some(b'\'') {
                                self.offset += 1;
                            } else {
                                break;
                            }
                        }
                    }
                }
                Some(c) if is_ident_byte(c) || c >= 0x80 => {
                    self.offset += 1;
                }
                _ => break,
            }
        }
        let text = &self.src[start..self.offset];

        let upper = text.to_ascii_uppercase();
        if upper == "TRUE" || upper == "FALSE" {
            self.items
                .push(Token::new(TokenKind::Bool, upper, start, self.offset));
            return;
        }
        if upper == "INFINITY" {
            self.items
                .push(Token::new(TokenKind::Infinity, upper, start, self.offset));
            return;
        }

        // An identifier immediately followed by '(' (ignoring whitespace)
        // is a function name.
        let mut ahead = self.offset;
        while self
            .src
            .as_bytes()
            .get(ahead)
            .is_some_and(|c| matches!(c, b' ' | b'\t' | b'\n' | b'\r'))
        {
            ahead += 1;
        }
        if self.src.as_bytes().get(ahead) == Some(&b'(') {
            self.items
                .push(Token::new(TokenKind::Func, upper, start, self.offset));
        } else {
            self.items
                .push(Token::new(TokenKind::Ident, text, start, self.offset));
        }
    }

    /// `#All`-style selectors become `Hash` tokens; everything else after
    /// `#` absorbs alphanumerics, `/`, `!`, `?` into one error literal
    /// (`#DIV/0!`, `#N/A`, `#NAME?`, …).
    fn scan_hash(&mut self) {
        let start = self.offset;
        let rest = &self.src[start + 1..];
        for sel in HASH_SELECTORS {
            if rest.starts_with(sel) {
                let after = rest.as_bytes().get(sel.len()).copied();
                if !after.is_some_and(|c| c.is_ascii_alphanumeric()) {
                    self.offset += 1 + sel.len();
                    self.items
                        .push(Token::new(TokenKind::Hash, *sel, start, self.offset));
                    return;
                }
            }
        }
        self.offset += 1;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, b'/' | b'!' | b'?'))
        {
            self.offset += 1;
        }
        self.items.push(Token::new(
            TokenKind::ErrorLit,
            &self.src[start..self.offset],
            start,
            self.offset,
        ));
    }

    /// `<>`, `<=`, `>=` are recognized greedily.
    fn scan_comparison(&mut self) {
        let start = self.offset;
        let two = self.src.as_bytes().get(start..start + 2);
        if matches!(two, Some(b"<>") | Some(b"<=") | Some(b">=")) {
            self.offset += 2;
        } else {
            self.offset += 1;
        }
        self.items.push(Token::new(
            TokenKind::Op,
            &self.src[start..self.offset],
            start,
            self.offset,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    fn texts(src: &str) -> Vec<String> {
        tokenize(src)
            .unwrap()
            .into_iter()
            .map(|t| t.text)
            .collect()
    }

    #[test]
    fn numbers_split_on_second_dot() {
        assert_eq!(
            texts("12.34.56"),
            vec!["12.34".to_string(), ".56".to_string(), String::new()]
        );
        assert_eq!(texts("1e-3")[0], "1e-3");
        assert_eq!(texts("2E+10")[0], "2E+10");
        // 'e' not followed by a digit stays out of the number
        assert_eq!(
            kinds("1e"),
            vec![TokenKind::Number, TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn strings_escape_and_recover() {
        let toks = tokenize(r#""he said ""hi""""#).unwrap();
        assert_eq!(toks[0].kind, TokenKind::Str);
        assert_eq!(toks[0].text, r#""he said ""hi""""#);
        // unterminated closes at end of input
        let toks = tokenize(r#""abc"#).unwrap();
        assert_eq!(toks[0].kind, TokenKind::Str);
        assert_eq!(toks[0].text, r#""abc"#);
    }

    #[test]
    fn quoted_sheet_names_stay_in_identifier() {
        let toks = tokenize("'My Sheet'!A1").unwrap();
        assert_eq!(toks[0].kind, TokenKind::Ident);
        assert_eq!(toks[0].text, "'My Sheet'");
        assert_eq!(toks[1].kind, TokenKind::Bang);
        assert_eq!(toks[2].text, "A1");
    }

    #[test]
    fn function_reclassification_uppercases() {
        let toks = tokenize("sum (A1)").unwrap();
        assert_eq!(toks[0].kind, TokenKind::Func);
        assert_eq!(toks[0].text, "SUM");
        let toks = tokenize("sum").unwrap();
        assert_eq!(toks[0].kind, TokenKind::Ident);
    }

    #[test]
    fn reserved_words() {
        assert_eq!(
            kinds("true+FALSE"),
            vec![TokenKind::Bool, TokenKind::Op, TokenKind::Bool, TokenKind::Eof]
        );
        assert_eq!(kinds("INFINITY")[0], TokenKind::Infinity);
    }

    #[test]
    fn hash_selectors_vs_error_literals() {
        assert_eq!(
            kinds("#Data"),
            vec![TokenKind::Hash, TokenKind::Eof]
        );
        assert_eq!(texts("#ThisRow")[0], "ThisRow");
        for err in ["#DIV/0!", "#N/A", "#NAME?", "#NUM!", "#REF!", "#VALUE!", "#CYCLE!", "#ERROR!"] {
            let toks = tokenize(err).unwrap();
            assert_eq!(toks[0].kind, TokenKind::ErrorLit, "{err}");
            assert_eq!(toks[0].text, err);
        }
        // #DataBase is not a selector (alnum continues) -> error literal
        assert_eq!(kinds("#DataBase")[0], TokenKind::ErrorLit);
    }

    #[test]
    fn greedy_comparison_operators() {
        assert_eq!(texts("A1<>B1")[1], "<>");
        assert_eq!(texts("A1<=B1")[1], "<=");
        assert_eq!(texts("A1>=B1")[1], ">=");
        assert_eq!(texts("A1<B1")[1], "<");
    }

    #[test]
    fn spans_are_half_open() {
        let toks = tokenize("1+22").unwrap();
        assert_eq!((toks[0].span.start, toks[0].span.end), (0, 1));
        assert_eq!((toks[1].span.start, toks[1].span.end), (1, 2));
        assert_eq!((toks[2].span.start, toks[2].span.end), (2, 4));
    }
}

//! Recursive-descent parser with precedence climbing.
//!
//! The parser consumes the granular token stream (the lexer does not
//! pre-assemble references) and reassembles cell references, ranges, 3D
//! ranges, structured references, and named expressions itself. Parsing
//! either succeeds completely or fails with a positioned error; callers
//! that must never fail (the reference rewriters) catch the error and keep
//! the original text.

use std::error::Error;
use std::fmt::{self, Display};

use crate::ast::{BinaryOpKind, Expr, ExprKind, RangeAbs, TableSelector, UnaryOpKind};
use crate::grammar::{
    Assoc, is_column_ident, precedence, split_cell_ident, unquote_sheet_name,
};
use crate::tokenizer::{Span, Token, TokenKind, tokenize};
use gridcalc_common::coord::column_to_index;
use gridcalc_common::{AbsFlags, AxisEnd, CellValue, Coord, ErrorKind, SheetRange};

#[derive(Debug)]
pub struct ParseError {
    pub message: String,
    pub span: Option<Span>,
}

impl ParseError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        ParseError {
            message: message.into(),
            span: Some(span),
        }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(s) => write!(f, "parse error at {}..{}: {}", s.start, s.end, self.message),
            None => write!(f, "parse error: {}", self.message),
        }
    }
}

impl Error for ParseError {}

impl From<crate::tokenizer::TokenizeError> for ParseError {
    fn from(e: crate::tokenizer::TokenizeError) -> Self {
        ParseError {
            message: e.message,
            span: Some(Span::new(e.pos, e.pos)),
        }
    }
}

/// Parse a formula. A leading `=` is stripped; empty and whitespace-only
/// input parses to [`ExprKind::Empty`].
pub fn parse(formula: &str) -> Result<Expr, ParseError> {
    let body = formula.strip_prefix('=').unwrap_or(formula);
    let tokens = tokenize(body)?;
    let mut p = Parser { tokens, pos: 0 };
    if p.peek().kind == TokenKind::Eof {
        return Ok(Expr::bare(ExprKind::Empty));
    }
    let expr = p.parse_expression()?;
    if p.peek().kind != TokenKind::Eof {
        return Err(p.err_here(format!("unexpected token {}", p.peek())));
    }
    Ok(expr)
}

/// One endpoint of a range as written: column and/or row, with `$` flags.
/// `INFINITY` is the fully-open endpoint (`col` and `row` both `None`).
struct RangePart {
    col: Option<u32>,
    row: Option<u32>,
    abs: AbsFlags,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        let idx = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn advance(&mut self) -> Token {
        let t = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.err_here(format!("expected {kind}, found {}", self.peek())))
        }
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn err_here(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.peek().span)
    }

    fn span_from(&self, start: usize) -> Option<Span> {
        let end = if self.pos > 0 {
            self.tokens[self.pos - 1].span.end
        } else {
            start
        };
        Some(Span::new(start, end))
    }

    /* ───────────────────── expression climbing ───────────────────── */

    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary(1)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut left = self.parse_postfix()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Op => match BinaryOpKind::from_symbol(&self.peek().text) {
                    Some(op) => op,
                    None => break,
                },
                _ => break,
            };
            let (prec, assoc) = precedence(op);
            if prec < min_prec {
                break;
            }
            self.advance();
            let next_min = if assoc == Assoc::Left { prec + 1 } else { prec };
            let right = self.parse_binary(next_min)?;
            let span = match (left.span, right.span) {
                (Some(a), Some(b)) => Some(Span::new(a.start, b.end)),
                _ => None,
            };
            left = Expr::new(
                ExprKind::BinaryOp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_prefix()?;
        while self.peek().kind == TokenKind::Op && self.peek().text == "%" {
            let tok = self.advance();
            let span = expr.span.map(|s| Span::new(s.start, tok.span.end));
            expr = Expr::new(
                ExprKind::UnaryOp {
                    op: UnaryOpKind::Percent,
                    operand: Box::new(expr),
                },
                span,
            );
        }
        Ok(expr)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        if self.peek().kind == TokenKind::Op
            && (self.peek().text == "+" || self.peek().text == "-")
        {
            let tok = self.advance();
            let op = if tok.text == "+" {
                UnaryOpKind::Plus
            } else {
                UnaryOpKind::Minus
            };
            let operand = self.parse_prefix()?;
            let span = operand.span.map(|s| Span::new(tok.span.start, s.end));
            return Ok(Expr::new(
                ExprKind::UnaryOp {
                    op,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        self.parse_primary()
    }

    /* ──────────────────────── primaries ──────────────────────── */

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let start = self.peek().span.start;
        match self.peek().kind {
            TokenKind::Number => {
                // A number followed by ':' is a row-band range (`5:5`).
                if self.peek_at(1).kind == TokenKind::Colon {
                    return self.parse_range_expr(None, None, start);
                }
                let tok = self.advance();
                let n: f64 = tok.text.parse().map_err(|_| {
                    ParseError::new(format!("invalid number {:?}", tok.text), tok.span)
                })?;
                Ok(Expr::new(ExprKind::Value(CellValue::Number(n)), Some(tok.span)))
            }
            TokenKind::Str => {
                let tok = self.advance();
                Ok(Expr::new(
                    ExprKind::Value(CellValue::Text(decode_string(&tok.text))),
                    Some(tok.span),
                ))
            }
            TokenKind::Bool => {
                let tok = self.advance();
                Ok(Expr::new(
                    ExprKind::Value(CellValue::Boolean(tok.text == "TRUE")),
                    Some(tok.span),
                ))
            }
            TokenKind::ErrorLit => {
                let tok = self.advance();
                let code = ErrorKind::parse(&tok.text).unwrap_or(ErrorKind::Error);
                Ok(Expr::new(
                    ExprKind::Error {
                        code,
                        message: tok.text,
                    },
                    Some(tok.span),
                ))
            }
            TokenKind::Infinity => {
                let tok = self.advance();
                Ok(Expr::new(ExprKind::Infinity, Some(tok.span)))
            }
            TokenKind::Func => self.parse_function(),
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBrace => self.parse_array(start),
            TokenKind::LBracket => self.parse_bracket_lead(start),
            TokenKind::At => {
                self.advance();
                let name = self.collect_column_name(&[TokenKind::Eof])?;
                Ok(Expr::new(
                    ExprKind::StructuredRef {
                        table: None,
                        sheet: None,
                        workbook: None,
                        cols: Some((name.clone(), name)),
                        selector: None,
                        this_row: true,
                    },
                    self.span_from(start),
                ))
            }
            TokenKind::Dollar => self.parse_reference_body(None, None, start),
            TokenKind::Ident => self.parse_ident_lead(None, start),
            _ => Err(self.err_here(format!("unexpected token {}", self.peek()))),
        }
    }

    fn parse_function(&mut self) -> Result<Expr, ParseError> {
        let name_tok = self.advance();
        let start = name_tok.span.start;
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.eat(TokenKind::RParen) {
            loop {
                if matches!(self.peek().kind, TokenKind::Comma | TokenKind::RParen) {
                    args.push(Expr::bare(ExprKind::Empty));
                } else {
                    args.push(self.parse_expression()?);
                }
                if self.eat(TokenKind::Comma) {
                    continue;
                }
                self.expect(TokenKind::RParen)?;
                break;
            }
        }
        Ok(Expr::new(
            ExprKind::Function {
                name: name_tok.text,
                args,
            },
            self.span_from(start),
        ))
    }

    fn parse_array(&mut self, start: usize) -> Result<Expr, ParseError> {
        self.expect(TokenKind::LBrace)?;
        let mut rows: Vec<Vec<Expr>> = Vec::new();
        let mut row: Vec<Expr> = Vec::new();
        row.push(self.parse_expression()?);
        loop {
            match self.peek().kind {
                TokenKind::Comma => {
                    self.advance();
                    row.push(self.parse_expression()?);
                }
                TokenKind::Semicolon => {
                    self.advance();
                    rows.push(std::mem::take(&mut row));
                    row.push(self.parse_expression()?);
                }
                TokenKind::RBrace => {
                    self.advance();
                    rows.push(row);
                    break;
                }
                _ => return Err(self.err_here("expected ',', ';' or '}' in array literal")),
            }
        }
        let width = rows[0].len();
        if rows.iter().any(|r| r.len() != width) {
            return Err(ParseError::new(
                "array rows have unequal lengths",
                Span::new(start, self.tokens[self.pos.saturating_sub(1)].span.end),
            ));
        }
        Ok(Expr::new(ExprKind::Array { rows }, self.span_from(start)))
    }

    /// A leading `[` is either a workbook prefix (`[Book]Sheet1!A1`) or a
    /// bare structured reference (`[Col]`, `[#Data]`, `[@Col]`, …).
    fn parse_bracket_lead(&mut self, start: usize) -> Result<Expr, ParseError> {
        // Find the matching close bracket without consuming, then decide by
        // what follows it.
        let mut depth = 0usize;
        let mut idx = self.pos;
        let close = loop {
            match self.tokens.get(idx).map(|t| t.kind) {
                Some(TokenKind::LBracket) => depth += 1,
                Some(TokenKind::RBracket) => {
                    depth -= 1;
                    if depth == 0 {
                        break idx;
                    }
                }
                Some(TokenKind::Eof) | None => {
                    return Err(self.err_here("unclosed '['"));
                }
                _ => {}
            }
            idx += 1;
        };
        let after = self.tokens.get(close + 1).map(|t| t.kind);
        let is_workbook_prefix = matches!(
            after,
            Some(TokenKind::Ident) | Some(TokenKind::Dollar) | Some(TokenKind::Number)
        );
        if is_workbook_prefix {
            self.expect(TokenKind::LBracket)?;
            let workbook = self.collect_column_name(&[TokenKind::RBracket])?;
            self.expect(TokenKind::RBracket)?;
            return match self.peek().kind {
                TokenKind::Ident => self.parse_ident_lead(Some(workbook), start),
                _ => self.parse_reference_body(None, Some(workbook), start),
            };
        }
        self.parse_structured(None, None, None, start)
    }

    /// Identifier in primary position: sheet-qualified reference, 3D
    /// range, table reference, cell, range start, or named expression.
    fn parse_ident_lead(
        &mut self,
        workbook: Option<String>,
        start: usize,
    ) -> Result<Expr, ParseError> {
        // 3D range: Ident ':' Ident '!'
        if self.peek_at(1).kind == TokenKind::Colon
            && self.peek_at(2).kind == TokenKind::Ident
            && self.peek_at(3).kind == TokenKind::Bang
        {
            let start_sheet = unquote_sheet_name(&self.advance().text);
            self.expect(TokenKind::Colon)?;
            let end_sheet = unquote_sheet_name(&self.advance().text);
            self.expect(TokenKind::Bang)?;
            let inner = self.parse_reference_body(None, None, self.peek().span.start)?;
            if !matches!(inner.kind, ExprKind::Reference { .. } | ExprKind::Range { .. }) {
                return Err(self.err_here("expected a cell or range after 3D sheet span"));
            }
            return Ok(Expr::new(
                ExprKind::ThreeDRange {
                    start_sheet,
                    end_sheet,
                    workbook,
                    inner: Box::new(inner),
                },
                self.span_from(start),
            ));
        }

        // Sheet-qualified: Ident '!'
        if self.peek_at(1).kind == TokenKind::Bang {
            let sheet = unquote_sheet_name(&self.advance().text);
            self.expect(TokenKind::Bang)?;
            return match self.peek().kind {
                TokenKind::Ident => self.parse_qualified_ident(Some(sheet), workbook, start),
                _ => self.parse_reference_body(Some(sheet), workbook, start),
            };
        }

        self.parse_qualified_ident(None, workbook, start)
    }

    /// An identifier with sheet/workbook context already consumed: table
    /// reference, cell, range, or named expression.
    fn parse_qualified_ident(
        &mut self,
        sheet: Option<String>,
        workbook: Option<String>,
        start: usize,
    ) -> Result<Expr, ParseError> {
        if self.peek_at(1).kind == TokenKind::LBracket {
            let table = self.advance().text;
            return self.parse_structured(Some(table), sheet, workbook, start);
        }
        if self.peek_at(1).kind == TokenKind::Colon {
            return self.parse_range_expr(sheet, workbook, start);
        }
        let tok = self.advance();
        if let Some(reference) = cell_from_ident(&tok.text, AbsFlags::default()) {
            let (addr, abs) = reference;
            return Ok(Expr::new(
                ExprKind::Reference {
                    addr,
                    sheet,
                    workbook,
                    abs,
                },
                self.span_from(start),
            ));
        }
        Ok(Expr::new(
            ExprKind::NamedExpr {
                name: tok.text,
                sheet,
                workbook,
            },
            self.span_from(start),
        ))
    }

    /// Reference or range whose first token is `$`, an identifier, or a
    /// row number, with sheet/workbook context already known.
    fn parse_reference_body(
        &mut self,
        sheet: Option<String>,
        workbook: Option<String>,
        start: usize,
    ) -> Result<Expr, ParseError> {
        match self.peek().kind {
            TokenKind::Dollar | TokenKind::Number => {
                self.parse_range_expr(sheet, workbook, start)
            }
            TokenKind::Ident => self.parse_qualified_ident(sheet, workbook, start),
            _ => Err(self.err_here(format!("expected a reference, found {}", self.peek()))),
        }
    }

    /// Parse `part [':' part]` into a Reference or Range node.
    fn parse_range_expr(
        &mut self,
        sheet: Option<String>,
        workbook: Option<String>,
        start: usize,
    ) -> Result<Expr, ParseError> {
        let first = self.parse_range_part(false)?;

        if !self.eat(TokenKind::Colon) {
            // A lone part must be a full cell.
            return match (first.col, first.row) {
                (Some(col), Some(row)) => Ok(Expr::new(
                    ExprKind::Reference {
                        addr: Coord::new(col, row),
                        sheet,
                        workbook,
                        abs: first.abs,
                    },
                    self.span_from(start),
                )),
                _ => Err(self.err_here("expected ':' after open range start")),
            };
        }

        let second = self.parse_range_part(true)?;
        let (range, abs) = assemble_range(&first, &second)
            .ok_or_else(|| self.err_here("malformed range"))?;
        Ok(Expr::new(
            ExprKind::Range {
                range,
                sheet,
                workbook,
                abs,
            },
            self.span_from(start),
        ))
    }

    /// One endpoint: `$`-flagged column letters and/or row number, or
    /// `INFINITY` (end position only).
    fn parse_range_part(&mut self, end_position: bool) -> Result<RangePart, ParseError> {
        if end_position && self.peek().kind == TokenKind::Infinity {
            self.advance();
            return Ok(RangePart {
                col: None,
                row: None,
                abs: AbsFlags::default(),
            });
        }

        let mut abs = AbsFlags::default();
        let leading_dollar = self.eat(TokenKind::Dollar);
        match self.peek().kind {
            TokenKind::Number => {
                // Row-only endpoint (`5` in `5:5`, `$5`).
                abs.row = leading_dollar;
                let tok = self.advance();
                let row = parse_row_number(&tok.text)
                    .ok_or_else(|| ParseError::new("invalid row number", tok.span))?;
                Ok(RangePart {
                    col: None,
                    row: Some(row),
                    abs,
                })
            }
            TokenKind::Ident => {
                abs.col = leading_dollar;
                let tok = self.advance();
                if let Some((letters, digits)) = split_cell_ident(&tok.text) {
                    let col = column_to_index(letters)
                        .ok_or_else(|| ParseError::new("invalid column", tok.span))?;
                    let row = parse_row_number(digits)
                        .ok_or_else(|| ParseError::new("invalid row number", tok.span))?;
                    Ok(RangePart {
                        col: Some(col),
                        row: Some(row),
                        abs,
                    })
                } else if is_column_ident(&tok.text) {
                    let col = column_to_index(&tok.text)
                        .ok_or_else(|| ParseError::new("invalid column", tok.span))?;
                    // `$A$1` arrives as Dollar Ident("A") Dollar Number(1).
                    if self.peek().kind == TokenKind::Dollar
                        && self.peek_at(1).kind == TokenKind::Number
                    {
                        self.advance();
                        abs.row = true;
                        let row_tok = self.advance();
                        let row = parse_row_number(&row_tok.text)
                            .ok_or_else(|| ParseError::new("invalid row number", row_tok.span))?;
                        Ok(RangePart {
                            col: Some(col),
                            row: Some(row),
                            abs,
                        })
                    } else {
                        Ok(RangePart {
                            col: Some(col),
                            row: None,
                            abs,
                        })
                    }
                } else {
                    Err(ParseError::new(
                        format!("invalid reference component {:?}", tok.text),
                        tok.span,
                    ))
                }
            }
            _ => Err(self.err_here(format!(
                "expected a reference component, found {}",
                self.peek()
            ))),
        }
    }

    /* ─────────────────── structured references ─────────────────── */

    fn parse_structured(
        &mut self,
        table: Option<String>,
        sheet: Option<String>,
        workbook: Option<String>,
        start: usize,
    ) -> Result<Expr, ParseError> {
        self.expect(TokenKind::LBracket)?;
        let mut selector: Option<TableSelector> = None;
        let mut cols: Option<(String, String)> = None;
        let mut this_row = false;

        match self.peek().kind {
            TokenKind::Hash => {
                selector = Some(self.parse_selector()?);
                self.expect(TokenKind::RBracket)?;
            }
            TokenKind::At => {
                self.advance();
                this_row = true;
                match self.peek().kind {
                    TokenKind::RBracket => {
                        self.advance();
                    }
                    TokenKind::LBracket => {
                        // `[@[Col Name]]`
                        self.advance();
                        let name = self.collect_column_name(&[TokenKind::RBracket])?;
                        self.expect(TokenKind::RBracket)?;
                        cols = Some(self.maybe_bracketed_range_end(name)?);
                        self.expect(TokenKind::RBracket)?;
                    }
                    _ => {
                        let name =
                            self.collect_column_name(&[TokenKind::Colon, TokenKind::RBracket])?;
                        if self.eat(TokenKind::Colon) {
                            let end =
                                self.collect_column_name(&[TokenKind::RBracket])?;
                            cols = Some((name, end));
                        } else {
                            cols = Some((name.clone(), name));
                        }
                        self.expect(TokenKind::RBracket)?;
                    }
                }
            }
            TokenKind::LBracket => {
                // Combination form: `[[#Headers],[Col1]:[Col2]]`.
                loop {
                    self.expect(TokenKind::LBracket)?;
                    match self.peek().kind {
                        TokenKind::Hash => {
                            selector = Some(self.parse_selector()?);
                            self.expect(TokenKind::RBracket)?;
                        }
                        TokenKind::At => {
                            self.advance();
                            this_row = true;
                            self.expect(TokenKind::RBracket)?;
                        }
                        _ => {
                            let name = self
                                .collect_column_name(&[TokenKind::Colon, TokenKind::RBracket])?;
                            if self.eat(TokenKind::Colon) {
                                // `[Col1:Col2]` written inside one bracket pair
                                let end = self.collect_column_name(&[TokenKind::RBracket])?;
                                self.expect(TokenKind::RBracket)?;
                                cols = Some((name, end));
                            } else {
                                self.expect(TokenKind::RBracket)?;
                                cols = Some(self.maybe_bracketed_range_end(name)?);
                            }
                        }
                    }
                    if self.eat(TokenKind::Comma) {
                        continue;
                    }
                    break;
                }
                self.expect(TokenKind::RBracket)?;
            }
            TokenKind::RBracket => {
                // `Table[]` — the whole table.
                self.advance();
                selector = Some(TableSelector::All);
            }
            _ => {
                let name = self.collect_column_name(&[TokenKind::Colon, TokenKind::RBracket])?;
                if self.eat(TokenKind::Colon) {
                    let end = self.collect_column_name(&[TokenKind::RBracket])?;
                    cols = Some((name, end));
                } else {
                    cols = Some((name.clone(), name));
                }
                self.expect(TokenKind::RBracket)?;
            }
        }

        Ok(Expr::new(
            ExprKind::StructuredRef {
                table,
                sheet,
                workbook,
                cols,
                selector,
                this_row,
            },
            self.span_from(start),
        ))
    }

    /// After a bracketed column name, `:[Other]` extends it to a range.
    fn maybe_bracketed_range_end(
        &mut self,
        first: String,
    ) -> Result<(String, String), ParseError> {
        if self.peek().kind == TokenKind::Colon && self.peek_at(1).kind == TokenKind::LBracket {
            self.advance();
            self.advance();
            let end = self.collect_column_name(&[TokenKind::RBracket])?;
            self.expect(TokenKind::RBracket)?;
            Ok((first, end))
        } else {
            Ok((first.clone(), first))
        }
    }

    fn parse_selector(&mut self) -> Result<TableSelector, ParseError> {
        let tok = self.expect(TokenKind::Hash)?;
        match tok.text.as_str() {
            "All" => Ok(TableSelector::All),
            "Data" => Ok(TableSelector::Data),
            "Headers" => Ok(TableSelector::Headers),
            other => Err(ParseError::new(
                format!("#{other} is not valid in this position"),
                tok.span,
            )),
        }
    }

    /// Assemble a column (or workbook) name from adjacent identifier,
    /// number, and `-` tokens: word tokens join with a single space,
    /// dashes glue without spaces.
    fn collect_column_name(&mut self, stop: &[TokenKind]) -> Result<String, ParseError> {
        let mut name = String::new();
        let mut prev_word = false;
        loop {
            let kind = self.peek().kind;
            if stop.contains(&kind) || kind == TokenKind::Eof {
                break;
            }
            match kind {
                TokenKind::Ident | TokenKind::Number | TokenKind::Bool | TokenKind::Infinity
                | TokenKind::Func => {
                    if prev_word {
                        name.push(' ');
                    }
                    name.push_str(&self.advance().text);
                    prev_word = true;
                }
                TokenKind::Op if self.peek().text == "-" => {
                    self.advance();
                    name.push('-');
                    prev_word = false;
                }
                // Anything else ends the name; the caller's terminator
                // check reports the error if one is due.
                _ => break,
            }
        }
        if name.is_empty() {
            return Err(self.err_here("expected a name"));
        }
        Ok(name)
    }
}

fn parse_row_number(digits: &str) -> Option<u32> {
    let one_based: u64 = digits.parse().ok()?;
    if one_based == 0 || one_based > u32::MAX as u64 {
        return None;
    }
    Some((one_based - 1) as u32)
}

fn cell_from_ident(text: &str, abs: AbsFlags) -> Option<(Coord, AbsFlags)> {
    let (letters, digits) = split_cell_ident(text)?;
    let col = column_to_index(letters)?;
    let row = parse_row_number(digits)?;
    Some((Coord::new(col, row), abs))
}

/// Combine two written endpoints into a normalized range plus per-endpoint
/// absolute flags. `None` for shapes the grammar does not admit.
fn assemble_range(first: &RangePart, second: &RangePart) -> Option<(SheetRange, RangeAbs)> {
    let abs = RangeAbs {
        start: first.abs,
        end: second.abs,
    };
    let range = match ((first.col, first.row), (second.col, second.row)) {
        // A1:B2
        ((Some(c1), Some(r1)), (Some(c2), Some(r2))) => SheetRange::new(
            Coord::new(c1, r1),
            AxisEnd::Finite(c2),
            AxisEnd::Finite(r2),
        ),
        // A5:D — bottom-open
        ((Some(c1), Some(r1)), (Some(c2), None)) => SheetRange::new(
            Coord::new(c1.min(c2), r1),
            AxisEnd::Finite(c1.max(c2)),
            AxisEnd::Open,
        ),
        // A5:15 — right-open
        ((Some(c1), Some(r1)), (None, Some(r2))) => SheetRange::new(
            Coord::new(c1, r1.min(r2)),
            AxisEnd::Open,
            AxisEnd::Finite(r1.max(r2)),
        ),
        // A5:INFINITY — both open
        ((Some(c1), Some(r1)), (None, None)) => {
            SheetRange::new(Coord::new(c1, r1), AxisEnd::Open, AxisEnd::Open)
        }
        // A:A — column band
        ((Some(c1), None), (Some(c2), None)) => SheetRange::new(
            Coord::new(c1.min(c2), 0),
            AxisEnd::Finite(c1.max(c2)),
            AxisEnd::Open,
        ),
        // 5:5 — row band
        ((None, Some(r1)), (None, Some(r2))) => SheetRange::new(
            Coord::new(0, r1.min(r2)),
            AxisEnd::Open,
            AxisEnd::Finite(r1.max(r2)),
        ),
        _ => return None,
    };
    Some((range, abs))
}

fn decode_string(raw: &str) -> String {
    let inner = raw
        .strip_prefix('"')
        .map(|s| s.strip_suffix('"').unwrap_or(s))
        .unwrap_or(raw);
    inner.replace("\"\"", "\"")
}

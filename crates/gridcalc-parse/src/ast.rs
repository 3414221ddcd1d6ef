//! The formula syntax tree.
//!
//! One tagged sum type with an explicit discriminant; downstream code
//! (formatter, rewriters, evaluator) selects by variant. Node equality
//! ignores source spans — two parses of equivalent text compare equal.

use crate::tokenizer::Span;
use gridcalc_common::{AbsFlags, CellValue, Coord, ErrorKind, SheetRange};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Prefix `+`/`-` and postfix `%`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOpKind {
    Plus,
    Minus,
    Percent,
}

impl UnaryOpKind {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOpKind::Plus => "+",
            UnaryOpKind::Minus => "-",
            UnaryOpKind::Percent => "%",
        }
    }

    pub fn is_postfix(&self) -> bool {
        matches!(self, UnaryOpKind::Percent)
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl BinaryOpKind {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOpKind::Add => "+",
            BinaryOpKind::Sub => "-",
            BinaryOpKind::Mul => "*",
            BinaryOpKind::Div => "/",
            BinaryOpKind::Pow => "^",
            BinaryOpKind::Concat => "&",
            BinaryOpKind::Eq => "=",
            BinaryOpKind::Ne => "<>",
            BinaryOpKind::Lt => "<",
            BinaryOpKind::Gt => ">",
            BinaryOpKind::Le => "<=",
            BinaryOpKind::Ge => ">=",
        }
    }

    pub fn from_symbol(s: &str) -> Option<Self> {
        Some(match s {
            "+" => BinaryOpKind::Add,
            "-" => BinaryOpKind::Sub,
            "*" => BinaryOpKind::Mul,
            "/" => BinaryOpKind::Div,
            "^" => BinaryOpKind::Pow,
            "&" => BinaryOpKind::Concat,
            "=" => BinaryOpKind::Eq,
            "<>" => BinaryOpKind::Ne,
            "<" => BinaryOpKind::Lt,
            ">" => BinaryOpKind::Gt,
            "<=" => BinaryOpKind::Le,
            ">=" => BinaryOpKind::Ge,
            _ => return None,
        })
    }
}

/// Absolute flags for the two endpoints of a range reference. `INFINITY`
/// ends are never marked absolute.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RangeAbs {
    pub start: AbsFlags,
    pub end: AbsFlags,
}

/// `#All`, `#Data`, `#Headers` selectors in structured references.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableSelector {
    All,
    Data,
    Headers,
}

impl TableSelector {
    pub fn word(&self) -> &'static str {
        match self {
            TableSelector::All => "All",
            TableSelector::Data => "Data",
            TableSelector::Headers => "Headers",
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExprKind {
    /// Literal number, string, boolean.
    Value(CellValue),
    /// The empty formula.
    Empty,
    Reference {
        addr: Coord,
        sheet: Option<String>,
        workbook: Option<String>,
        abs: AbsFlags,
    },
    Range {
        range: SheetRange,
        sheet: Option<String>,
        workbook: Option<String>,
        abs: RangeAbs,
    },
    Function {
        /// Uppercased by the lexer.
        name: String,
        args: Vec<Expr>,
    },
    UnaryOp {
        op: UnaryOpKind,
        operand: Box<Expr>,
    },
    BinaryOp {
        op: BinaryOpKind,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `{1,2;3,4}` — all rows the same length.
    Array { rows: Vec<Vec<Expr>> },
    NamedExpr {
        name: String,
        sheet: Option<String>,
        workbook: Option<String>,
    },
    /// `Sheet1:Sheet3!A1` — `inner` is a `Reference` or `Range` with no
    /// sheet/workbook of its own.
    ThreeDRange {
        start_sheet: String,
        end_sheet: String,
        workbook: Option<String>,
        inner: Box<Expr>,
    },
    StructuredRef {
        table: Option<String>,
        sheet: Option<String>,
        workbook: Option<String>,
        /// `(first, last)` column names; equal for a single column.
        cols: Option<(String, String)>,
        selector: Option<TableSelector>,
        this_row: bool,
    },
    /// The literal `INFINITY`.
    Infinity,
    /// A `#XXX!` literal in source, or a stored parse failure.
    Error { code: ErrorKind, message: String },
}

/// A syntax-tree node: the variant plus an optional source span.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Eq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Option<Span>,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Option<Span>) -> Self {
        Expr { kind, span }
    }

    pub fn bare(kind: ExprKind) -> Self {
        Expr { kind, span: None }
    }

    pub fn value(v: impl Into<CellValue>) -> Self {
        Expr::bare(ExprKind::Value(v.into()))
    }

    pub fn error(code: ErrorKind, message: impl Into<String>) -> Self {
        Expr::bare(ExprKind::Error {
            code,
            message: message.into(),
        })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, ExprKind::Empty)
    }
}

// Structural equality: spans are positional metadata, not meaning.
impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl std::hash::Hash for Expr {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_spans() {
        let a = Expr::new(ExprKind::Infinity, Some(Span::new(0, 8)));
        let b = Expr::bare(ExprKind::Infinity);
        assert_eq!(a, b);
    }
}

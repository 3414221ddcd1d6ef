use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};

use crate::error::CellError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Sign of an infinity value.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sign {
    Pos,
    Neg,
}

impl Sign {
    pub fn flip(self) -> Sign {
        match self {
            Sign::Pos => Sign::Neg,
            Sign::Neg => Sign::Pos,
        }
    }

    pub fn product(self, other: Sign) -> Sign {
        if self == other { Sign::Pos } else { Sign::Neg }
    }

    pub fn of(n: f64) -> Sign {
        if n.is_sign_negative() { Sign::Neg } else { Sign::Pos }
    }

    pub fn to_f64(self) -> f64 {
        match self {
            Sign::Pos => f64::INFINITY,
            Sign::Neg => f64::NEG_INFINITY,
        }
    }
}

/// An evaluated cell value.
///
/// Arithmetic over this type is closed: overflow maps to the matching
/// `Infinity`, indeterminate forms map to `#NUM!`, and type-rule
/// violations map to `#VALUE!` (see [`crate::arith`]).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Boolean(bool),
    Infinity(Sign),
    Error(CellError),
    /// The empty value: what an empty cell, an empty formula, and an
    /// undefined serialized slot evaluate to.
    Empty,
}

impl Eq for CellValue {}

impl Hash for CellValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            CellValue::Number(n) => {
                state.write_u8(0);
                n.to_bits().hash(state);
            }
            CellValue::Text(s) => {
                state.write_u8(1);
                s.hash(state);
            }
            CellValue::Boolean(b) => {
                state.write_u8(2);
                b.hash(state);
            }
            CellValue::Infinity(s) => {
                state.write_u8(3);
                s.hash(state);
            }
            CellValue::Error(e) => {
                state.write_u8(4);
                e.hash(state);
            }
            CellValue::Empty => state.write_u8(5),
        }
    }
}

impl CellValue {
    pub fn error(e: impl Into<CellError>) -> Self {
        CellValue::Error(e.into())
    }

    /// The discriminator name used in `#VALUE!` messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            CellValue::Number(_) => "number",
            CellValue::Text(_) => "string",
            CellValue::Boolean(_) => "boolean",
            CellValue::Infinity(_) => "infinity",
            CellValue::Error(_) => "error",
            CellValue::Empty => "empty",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CellValue::Error(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Text rendering used by concatenation and text functions.
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Number(n) => format_number(*n),
            CellValue::Text(s) => s.clone(),
            CellValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            CellValue::Infinity(Sign::Pos) => "INFINITY".to_string(),
            CellValue::Infinity(Sign::Neg) => "-INFINITY".to_string(),
            CellValue::Error(e) => e.kind.to_string(),
            CellValue::Empty => String::new(),
        }
    }
}

impl Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Boolean(b)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<CellError> for CellValue {
    fn from(e: CellError) -> Self {
        CellValue::Error(e)
    }
}

/// Shortest round-trip rendering of a finite number; IEEE specials keep a
/// readable spelling (`NaN` never appears in canonical formula text).
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "INFINITY".to_string() } else { "-INFINITY".to_string() }
    } else {
        format!("{n}")
    }
}

/// The on-the-wire form of a cell's content. A `Text` starting with `=`
/// denotes a formula; every other string is literal text.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(untagged))]
#[derive(Debug, Clone, PartialEq)]
pub enum SerializedValue {
    Empty,
    Number(f64),
    Boolean(bool),
    Text(String),
}

impl SerializedValue {
    pub fn is_empty(&self) -> bool {
        match self {
            SerializedValue::Empty => true,
            SerializedValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn is_formula(&self) -> bool {
        matches!(self, SerializedValue::Text(s) if s.starts_with('='))
    }
}

impl From<f64> for SerializedValue {
    fn from(n: f64) -> Self {
        SerializedValue::Number(n)
    }
}

impl From<bool> for SerializedValue {
    fn from(b: bool) -> Self {
        SerializedValue::Boolean(b)
    }
}

impl From<&str> for SerializedValue {
    fn from(s: &str) -> Self {
        SerializedValue::Text(s.to_string())
    }
}

impl From<String> for SerializedValue {
    fn from(s: String) -> Self {
        SerializedValue::Text(s)
    }
}

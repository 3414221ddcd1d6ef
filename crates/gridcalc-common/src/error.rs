//! Cell-level error values.
//!
//! Evaluation is total: a cell's result is either a value or one of these
//! error variants, never a panic or a thrown error. Engine-API contract
//! violations (renaming a missing sheet and the like) are a separate type
//! in the engine crate.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The canonical error codes. Names are CamelCase; `Display` renders the
/// spreadsheet form (`#DIV/0!`, …).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Div0,
    Na,
    Name,
    Num,
    Ref,
    Value,
    Cycle,
    Error,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Div0 => "#DIV/0!",
            Self::Na => "#N/A",
            Self::Name => "#NAME?",
            Self::Num => "#NUM!",
            Self::Ref => "#REF!",
            Self::Value => "#VALUE!",
            Self::Cycle => "#CYCLE!",
            Self::Error => "#ERROR!",
        })
    }
}

impl ErrorKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "#DIV/0!" => Some(Self::Div0),
            "#N/A" => Some(Self::Na),
            "#NAME?" => Some(Self::Name),
            "#NUM!" => Some(Self::Num),
            "#REF!" => Some(Self::Ref),
            "#VALUE!" => Some(Self::Value),
            "#CYCLE!" => Some(Self::Cycle),
            "#ERROR!" => Some(Self::Error),
            _ => None,
        }
    }
}

/// An error value: the code plus an optional human-readable message.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellError {
    pub kind: ErrorKind,
    pub message: Option<String>,
}

impl CellError {
    pub fn new(kind: ErrorKind) -> Self {
        CellError {
            kind,
            message: None,
        }
    }

    pub fn with_message<S: Into<String>>(mut self, msg: S) -> Self {
        self.message = Some(msg.into());
        self
    }
}

impl From<ErrorKind> for CellError {
    fn from(kind: ErrorKind) -> Self {
        CellError::new(kind)
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ref msg) = self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CellError {}

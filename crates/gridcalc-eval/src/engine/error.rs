//! Engine-API failures. These are contract violations reported to the
//! caller synchronously; cell evaluation itself never throws — a cell's
//! result is a value or an error variant.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("workbook {0:?} already exists")]
    WorkbookExists(String),
    #[error("workbook {0:?} not found")]
    WorkbookNotFound(String),
    #[error("sheet {0:?} already exists")]
    SheetExists(String),
    #[error("sheet {0:?} not found")]
    SheetNotFound(String),
    #[error("table {0:?} already exists")]
    TableExists(String),
    #[error("table {0:?} not found")]
    TableNotFound(String),
    #[error("name {0:?} already defined")]
    NameExists(String),
    #[error("name {0:?} not found")]
    NameNotFound(String),
    #[error("invalid cell key {0:?}")]
    InvalidCellKey(String),
    #[error("{0}")]
    InvalidOperation(String),
}

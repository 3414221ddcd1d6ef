//! Sheets, workbooks, and cell slots.

use gridcalc_common::{CellValue, Coord, FiniteRange, SerializedValue};
use gridcalc_parse::Expr;
use rustc_hash::FxHashMap;

pub type WorkbookId = u32;
pub type SheetId = u32;

/// Identity of one cell: the owning sheet (arena id, stable across
/// renames) plus its coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId {
    pub sheet: SheetId,
    pub coord: Coord,
}

impl CellId {
    pub fn new(sheet: SheetId, coord: Coord) -> Self {
        CellId { sheet, coord }
    }
}

/// Parsed form of a cell's content.
#[derive(Debug, Clone, PartialEq)]
pub enum CellKind {
    Literal(CellValue),
    Formula { src: String, ast: Expr },
    /// Shape-invalid formula: the text is stored verbatim and the cell
    /// evaluates to `#ERROR!`.
    Malformed { src: String, err: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub input: SerializedValue,
    pub kind: CellKind,
}

/// A sparse grid of cells. Empty writes delete entries; the map never
/// holds an empty slot.
#[derive(Debug)]
pub struct Sheet {
    pub workbook: WorkbookId,
    pub name: String,
    pub cells: FxHashMap<Coord, Cell>,
}

impl Sheet {
    pub fn new(workbook: WorkbookId, name: impl Into<String>) -> Self {
        Sheet {
            workbook,
            name: name.into(),
            cells: FxHashMap::default(),
        }
    }

    /// Bounding box of the stored cells; `None` for an empty sheet. Open
    /// ranges evaluate against this extent.
    pub fn extent(&self) -> Option<FiniteRange> {
        let mut iter = self.cells.keys();
        let first = *iter.next()?;
        let mut min = first;
        let mut max = first;
        for c in iter {
            min.col = min.col.min(c.col);
            min.row = min.row.min(c.row);
            max.col = max.col.max(c.col);
            max.row = max.row.max(c.row);
        }
        Some(FiniteRange::new(min, max))
    }
}

/// Insertion-ordered collection of sheets within one workbook. Sheet ids
/// index the engine-wide arena so identity survives renames.
#[derive(Debug)]
pub struct Workbook {
    pub name: String,
    pub sheet_order: Vec<SheetId>,
    pub sheet_index: FxHashMap<String, SheetId>,
}

impl Workbook {
    pub fn new(name: impl Into<String>) -> Self {
        Workbook {
            name: name.into(),
            sheet_order: Vec::new(),
            sheet_index: FxHashMap::default(),
        }
    }
}

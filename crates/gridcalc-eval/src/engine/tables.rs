//! Table registry: named rectangles whose first row is the header.

use gridcalc_common::{AxisEnd, Coord};
use rustc_hash::FxHashMap;

use super::sheet::{CellId, SheetId, WorkbookId};

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub workbook: WorkbookId,
    pub sheet: SheetId,
    pub origin: Coord,
    pub width: u32,
    /// Total height including the header row; open tables grow with the
    /// sheet.
    pub height: AxisEnd,
}

impl Table {
    /// Whether the cell lies inside the table rectangle (used to resolve
    /// bare `[@Col]` references from within a table).
    pub fn contains(&self, cell: CellId) -> bool {
        cell.sheet == self.sheet
            && cell.coord.col >= self.origin.col
            && cell.coord.col < self.origin.col + self.width
            && cell.coord.row >= self.origin.row
            && match self.height {
                AxisEnd::Finite(h) => cell.coord.row < self.origin.row + h,
                AxisEnd::Open => true,
            }
    }
}

#[derive(Debug, Default)]
pub struct TableRegistry {
    // Keyed by uppercased name; table names are engine-global.
    tables: FxHashMap<String, Table>,
}

impl TableRegistry {
    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.get(&name.to_uppercase())
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.tables.contains_key(&name.to_uppercase())
    }

    pub fn insert(&mut self, table: Table) {
        self.tables.insert(table.name.to_uppercase(), table);
    }

    pub fn remove(&mut self, name: &str) -> Option<Table> {
        self.tables.remove(&name.to_uppercase())
    }

    /// The table whose rectangle contains `cell`, if any.
    pub fn containing(&self, cell: CellId) -> Option<&Table> {
        self.tables.values().find(|t| t.contains(cell))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn remove_for_sheet(&mut self, sheet: SheetId) {
        self.tables.retain(|_, t| t.sheet != sheet);
    }

    pub fn remove_for_workbook(&mut self, workbook: WorkbookId) {
        self.tables.retain(|_, t| t.workbook != workbook);
    }
}

//! The engine's in-memory state: workbook/sheet arenas, registries,
//! evaluated-value cache, dependency graph, and spill map. The
//! interpreter reads this immutably; all mutation happens on the engine
//! facade's call stack.

use gridcalc_common::CellValue;
use rustc_hash::FxHashMap;

use super::config::EngineConfig;
use super::deps::DepGraph;
use super::names::NamedRegistry;
use super::sheet::{Cell, CellId, CellKind, Sheet, SheetId, Workbook, WorkbookId};
use super::spills::SpillMap;
use super::tables::TableRegistry;

#[derive(Debug, Default)]
pub struct EngineState {
    /// Workbooks by id; tombstones keep ids stable after removal.
    pub workbooks: Vec<Option<Workbook>>,
    pub wb_index: FxHashMap<String, WorkbookId>,
    /// Engine-wide sheet arena; ids survive renames.
    pub sheets: Vec<Option<Sheet>>,
    pub tables: TableRegistry,
    pub names: NamedRegistry,
    /// Evaluated results of formula cells plus materialized spill-member
    /// values. Literal cells are read from storage directly.
    pub values: FxHashMap<CellId, CellValue>,
    pub deps: DepGraph,
    pub spills: SpillMap,
    pub config: EngineConfig,
}

impl EngineState {
    pub fn workbook(&self, id: WorkbookId) -> Option<&Workbook> {
        self.workbooks.get(id as usize)?.as_ref()
    }

    pub fn workbook_mut(&mut self, id: WorkbookId) -> Option<&mut Workbook> {
        self.workbooks.get_mut(id as usize)?.as_mut()
    }

    pub fn workbook_id(&self, name: &str) -> Option<WorkbookId> {
        self.wb_index.get(name).copied()
    }

    pub fn sheet(&self, id: SheetId) -> Option<&Sheet> {
        self.sheets.get(id as usize)?.as_ref()
    }

    pub fn sheet_mut(&mut self, id: SheetId) -> Option<&mut Sheet> {
        self.sheets.get_mut(id as usize)?.as_mut()
    }

    pub fn sheet_id(&self, workbook: WorkbookId, name: &str) -> Option<SheetId> {
        self.workbook(workbook)?.sheet_index.get(name).copied()
    }

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.sheet(id.sheet)?.cells.get(&id.coord)
    }

    pub fn cell_kind(&self, id: CellId) -> Option<&CellKind> {
        self.cell(id).map(|c| &c.kind)
    }

    /// All formula cells across every workbook.
    pub fn formula_cells(&self) -> Vec<CellId> {
        let mut out = Vec::new();
        for (sid, slot) in self.sheets.iter().enumerate() {
            if let Some(sheet) = slot {
                for (coord, cell) in &sheet.cells {
                    if matches!(cell.kind, CellKind::Formula { .. } | CellKind::Malformed { .. }) {
                        out.push(CellId::new(sid as SheetId, *coord));
                    }
                }
            }
        }
        out
    }
}

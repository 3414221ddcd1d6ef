//! The dependency graph: an outgoing "depends on" record per cell and the
//! inverse "used by" index, plus per-sheet range watchers and a watcher
//! list for names that failed to resolve (so defining the missing sheet,
//! table, or name later wakes its readers).

use gridcalc_common::SheetRange;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use super::sheet::{CellId, SheetId};

/// What one evaluation of a cell read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DepSet {
    pub cells: FxHashSet<CellId>,
    pub ranges: SmallVec<[(SheetId, SheetRange); 4]>,
    /// Unresolved symbols (`sheet:`, `workbook:`, `name:`, `table:`
    /// prefixed) whose later definition must trigger re-evaluation.
    pub symbols: FxHashSet<String>,
}

impl DepSet {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() && self.ranges.is_empty() && self.symbols.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct DepGraph {
    out: FxHashMap<CellId, DepSet>,
    used_by: FxHashMap<CellId, FxHashSet<CellId>>,
    range_watchers: FxHashMap<SheetId, Vec<(SheetRange, CellId)>>,
    symbol_watchers: FxHashMap<String, FxHashSet<CellId>>,
}

impl DepGraph {
    /// Replace the outgoing record of `cell`, updating both inverse
    /// indices.
    pub fn set_deps(&mut self, cell: CellId, deps: DepSet) {
        self.clear_deps(cell);
        for dep in &deps.cells {
            self.used_by.entry(*dep).or_default().insert(cell);
        }
        for (sheet, range) in &deps.ranges {
            self.range_watchers
                .entry(*sheet)
                .or_default()
                .push((*range, cell));
        }
        for sym in &deps.symbols {
            self.symbol_watchers
                .entry(sym.clone())
                .or_default()
                .insert(cell);
        }
        if !deps.is_empty() {
            self.out.insert(cell, deps);
        }
    }

    pub fn clear_deps(&mut self, cell: CellId) {
        if let Some(old) = self.out.remove(&cell) {
            for dep in &old.cells {
                if let Some(set) = self.used_by.get_mut(dep) {
                    set.remove(&cell);
                    if set.is_empty() {
                        self.used_by.remove(dep);
                    }
                }
            }
            for (sheet, _) in &old.ranges {
                if let Some(watchers) = self.range_watchers.get_mut(sheet) {
                    watchers.retain(|(_, watcher)| *watcher != cell);
                    if watchers.is_empty() {
                        self.range_watchers.remove(sheet);
                    }
                }
            }
            for sym in &old.symbols {
                if let Some(set) = self.symbol_watchers.get_mut(sym) {
                    set.remove(&cell);
                    if set.is_empty() {
                        self.symbol_watchers.remove(sym);
                    }
                }
            }
        }
    }

    /// Direct dependents of a cell: exact readers plus range watchers
    /// whose rectangle contains it.
    pub fn dependents_of(&self, cell: CellId, out: &mut FxHashSet<CellId>) {
        if let Some(readers) = self.used_by.get(&cell) {
            out.extend(readers.iter().copied());
        }
        if let Some(watchers) = self.range_watchers.get(&cell.sheet) {
            for (range, watcher) in watchers {
                if range.contains(cell.coord) {
                    out.insert(*watcher);
                }
            }
        }
    }

    /// Cells watching an unresolved symbol.
    pub fn symbol_watchers(&self, symbol: &str) -> FxHashSet<CellId> {
        self.symbol_watchers
            .get(symbol)
            .cloned()
            .unwrap_or_default()
    }

    /// Every cell whose record mentions the given sheet (used when a
    /// sheet is removed).
    pub fn cells_reading_sheet(&self, sheet: SheetId) -> FxHashSet<CellId> {
        let mut out = FxHashSet::default();
        for (cell, deps) in &self.out {
            if deps.cells.iter().any(|c| c.sheet == sheet)
                || deps.ranges.iter().any(|(s, _)| *s == sheet)
            {
                out.insert(*cell);
            }
        }
        out
    }

    pub fn deps_of(&self, cell: CellId) -> Option<&DepSet> {
        self.out.get(&cell)
    }
}

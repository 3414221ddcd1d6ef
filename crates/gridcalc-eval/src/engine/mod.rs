//! The engine facade: named containers of sparse cell storage, the
//! mutation API, and dependency-driven recomputation.
//!
//! Every public operation either succeeds atomically or reports a named
//! failure; cell evaluation itself never throws. All operations run to
//! completion before returning, and listeners observe events in mutation
//! order.

pub mod config;
pub mod deps;
pub mod error;
pub mod events;
pub mod names;
pub mod sheet;
pub mod spills;
pub mod state;
pub mod tables;

#[cfg(feature = "serde")]
pub mod interchange;

use gridcalc_common::coord::parse_cell_key;
use gridcalc_common::{
    AxisEnd, CellError, CellValue, Coord, ErrorKind, FiniteRange, SerializedValue,
};
use rustc_hash::{FxHashMap, FxHashSet};

pub use config::EngineConfig;
pub use error::EngineError;
pub use events::{CellAddr, EngineEvent, SheetAddr, SubscriptionId};
pub use sheet::{CellId, SheetId, WorkbookId};
pub use tables::Table;

use crate::function_registry;
use crate::interpreter::{CellOutcome, Interpreter, SpillPlan};
use events::Publisher;
use sheet::{Cell, CellKind, Sheet, Workbook};
use state::EngineState;

/// Descriptor for `add_table`.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDesc {
    pub name: String,
    pub workbook: String,
    pub sheet: String,
    pub start: Coord,
    pub num_cols: u32,
    /// Total rows including the header; `None` means the table grows with
    /// the sheet.
    pub num_rows: Option<u32>,
}

pub struct Engine {
    state: EngineState,
    publisher: Publisher,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Engine::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        function_registry::ensure_builtins();
        let mut state = EngineState::default();
        state.config = config;
        Engine {
            state,
            publisher: Publisher::default(),
        }
    }

    /* ───────────────────── workbooks ───────────────────── */

    pub fn add_workbook(&mut self, name: &str) -> Result<(), EngineError> {
        if self.state.wb_index.contains_key(name) {
            return Err(EngineError::WorkbookExists(name.to_string()));
        }
        let id = self.state.workbooks.len() as WorkbookId;
        self.state.workbooks.push(Some(Workbook::new(name)));
        self.state.wb_index.insert(name.to_string(), id);
        self.publisher.emit(&EngineEvent::WorkbookAdded {
            workbook: name.to_string(),
        });
        let seeds = self.state.deps.symbol_watchers(&format!("workbook:{name}"));
        self.recompute_and_publish(seeds);
        Ok(())
    }

    pub fn remove_workbook(&mut self, name: &str) -> Result<(), EngineError> {
        let id = self
            .state
            .workbook_id(name)
            .ok_or_else(|| EngineError::WorkbookNotFound(name.to_string()))?;
        let sheet_ids: Vec<SheetId> = self
            .state
            .workbook(id)
            .map(|wb| wb.sheet_order.clone())
            .unwrap_or_default();

        let mut seeds = FxHashSet::default();
        for sid in sheet_ids {
            seeds.extend(self.drop_sheet_data(sid));
        }
        self.state.tables.remove_for_workbook(id);
        self.state.names.remove_for_workbook(id);
        self.state.wb_index.remove(name);
        self.state.workbooks[id as usize] = None;

        self.publisher.emit(&EngineEvent::WorkbookRemoved {
            workbook: name.to_string(),
        });
        self.recompute_and_publish(seeds);
        Ok(())
    }

    pub fn rename_workbook(&mut self, old: &str, new: &str) -> Result<(), EngineError> {
        let id = self
            .state
            .workbook_id(old)
            .ok_or_else(|| EngineError::WorkbookNotFound(old.to_string()))?;
        if self.state.wb_index.contains_key(new) {
            return Err(EngineError::WorkbookExists(new.to_string()));
        }
        self.state.wb_index.remove(old);
        self.state.wb_index.insert(new.to_string(), id);
        if let Some(wb) = self.state.workbook_mut(id) {
            wb.name = new.to_string();
        }

        let mut seeds =
            self.rewrite_formulas(None, |src| gridcalc_parse::rewrite::rename_workbook(src, old, new));
        seeds.extend(self.state.deps.symbol_watchers(&format!("workbook:{new}")));

        self.publisher.emit(&EngineEvent::WorkbookRenamed {
            old: old.to_string(),
            new: new.to_string(),
        });
        self.recompute_and_publish(seeds);
        Ok(())
    }

    pub fn workbook_names(&self) -> Vec<String> {
        self.state
            .workbooks
            .iter()
            .flatten()
            .map(|wb| wb.name.clone())
            .collect()
    }

    /* ───────────────────── sheets ───────────────────── */

    pub fn add_sheet(&mut self, workbook: &str, sheet: &str) -> Result<(), EngineError> {
        let wb_id = self
            .state
            .workbook_id(workbook)
            .ok_or_else(|| EngineError::WorkbookNotFound(workbook.to_string()))?;
        if self.state.sheet_id(wb_id, sheet).is_some() {
            return Err(EngineError::SheetExists(sheet.to_string()));
        }
        let sid = self.state.sheets.len() as SheetId;
        self.state.sheets.push(Some(Sheet::new(wb_id, sheet)));
        if let Some(wb) = self.state.workbook_mut(wb_id) {
            wb.sheet_order.push(sid);
            wb.sheet_index.insert(sheet.to_string(), sid);
        }
        self.publisher.emit(&EngineEvent::SheetAdded {
            workbook: workbook.to_string(),
            sheet: sheet.to_string(),
        });
        let seeds = self.state.deps.symbol_watchers(&format!("sheet:{sheet}"));
        self.recompute_and_publish(seeds);
        Ok(())
    }

    pub fn remove_sheet(&mut self, workbook: &str, sheet: &str) -> Result<(), EngineError> {
        let (wb_id, sid) = self.resolve_sheet_addr(workbook, sheet)?;
        let seeds = self.drop_sheet_data(sid);
        if let Some(wb) = self.state.workbook_mut(wb_id) {
            wb.sheet_order.retain(|s| *s != sid);
            wb.sheet_index.remove(sheet);
        }
        self.publisher.emit(&EngineEvent::SheetRemoved {
            workbook: workbook.to_string(),
            sheet: sheet.to_string(),
        });
        self.recompute_and_publish(seeds);
        Ok(())
    }

    pub fn rename_sheet(
        &mut self,
        workbook: &str,
        old: &str,
        new: &str,
    ) -> Result<(), EngineError> {
        let (wb_id, sid) = self.resolve_sheet_addr(workbook, old)?;
        if self.state.sheet_id(wb_id, new).is_some() {
            return Err(EngineError::SheetExists(new.to_string()));
        }
        if let Some(s) = self.state.sheet_mut(sid) {
            s.name = new.to_string();
        }
        if let Some(wb) = self.state.workbook_mut(wb_id) {
            wb.sheet_index.remove(old);
            wb.sheet_index.insert(new.to_string(), sid);
        }

        // Every formula across this workbook is rewritten; readers of the
        // renamed sheet elsewhere re-resolve (and now break) by name.
        let mut seeds =
            self.rewrite_formulas(Some(wb_id), |src| gridcalc_parse::rewrite::rename_sheet(src, old, new));
        seeds.extend(self.state.deps.cells_reading_sheet(sid));
        seeds.extend(self.state.deps.symbol_watchers(&format!("sheet:{new}")));

        self.publisher.emit(&EngineEvent::SheetRenamed {
            workbook: workbook.to_string(),
            old: old.to_string(),
            new: new.to_string(),
        });
        self.recompute_and_publish(seeds);
        Ok(())
    }

    pub fn sheet_names(&self, workbook: &str) -> Result<Vec<String>, EngineError> {
        let wb_id = self
            .state
            .workbook_id(workbook)
            .ok_or_else(|| EngineError::WorkbookNotFound(workbook.to_string()))?;
        Ok(self
            .state
            .workbook(wb_id)
            .map(|wb| {
                wb.sheet_order
                    .iter()
                    .filter_map(|sid| self.state.sheet(*sid).map(|s| s.name.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    /* ───────────────────── cells ───────────────────── */

    pub fn set_cell_content(
        &mut self,
        addr: &CellAddr,
        value: SerializedValue,
    ) -> Result<(), EngineError> {
        let (_, sid) = self.resolve_sheet_addr(&addr.workbook, &addr.sheet)?;
        let id = CellId::new(sid, addr.cell);

        #[cfg(feature = "tracing")]
        tracing::debug!(cell = %addr.cell, "set_cell_content");

        self.write_cell(id, value);
        self.publisher
            .emit(&EngineEvent::CellChanged { cell: addr.clone() });
        let mut seeds = FxHashSet::default();
        seeds.insert(id);
        self.recompute_and_publish(seeds);
        Ok(())
    }

    /// Atomically replace a sheet's sparse map. Observers see exactly one
    /// coherent post-state.
    pub fn set_sheet_content<I>(&mut self, addr: &SheetAddr, entries: I) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = (String, SerializedValue)>,
    {
        let (_, sid) = self.resolve_sheet_addr(&addr.workbook, &addr.sheet)?;

        let mut parsed: FxHashMap<Coord, SerializedValue> = FxHashMap::default();
        for (key, value) in entries {
            let (coord, _) =
                parse_cell_key(&key).ok_or_else(|| EngineError::InvalidCellKey(key.clone()))?;
            if !value.is_empty() {
                parsed.insert(coord, value);
            }
        }

        let mut seeds = FxHashSet::default();
        if let Some(s) = self.state.sheet(sid) {
            seeds.extend(s.cells.keys().map(|c| CellId::new(sid, *c)));
        }
        seeds.extend(parsed.keys().map(|c| CellId::new(sid, *c)));

        if let Some(s) = self.state.sheet_mut(sid) {
            s.cells.clear();
        }
        for (coord, value) in parsed {
            self.write_cell(CellId::new(sid, coord), value);
        }
        self.recompute_and_publish(seeds);
        Ok(())
    }

    /// Delete every cell inside a finite range.
    pub fn clear_range(&mut self, addr: &SheetAddr, range: FiniteRange) -> Result<(), EngineError> {
        let (_, sid) = self.resolve_sheet_addr(&addr.workbook, &addr.sheet)?;
        let targets: Vec<Coord> = match self.state.sheet(sid) {
            Some(s) => s
                .cells
                .keys()
                .copied()
                .filter(|c| range.contains(*c))
                .collect(),
            None => Vec::new(),
        };
        let mut seeds = FxHashSet::default();
        for coord in targets {
            let id = CellId::new(sid, coord);
            self.write_cell(id, SerializedValue::Empty);
            seeds.insert(id);
        }
        self.recompute_and_publish(seeds);
        Ok(())
    }

    /// Fill `dst` from `src`, shifting relative references by each target
    /// cell's offset from its source cell (sources tile across larger
    /// targets).
    pub fn autofill(
        &mut self,
        addr: &SheetAddr,
        src: FiniteRange,
        dst: FiniteRange,
    ) -> Result<(), EngineError> {
        let (_, sid) = self.resolve_sheet_addr(&addr.workbook, &addr.sheet)?;

        // Snapshot sources first so overlapping targets read originals.
        let mut sources: FxHashMap<Coord, SerializedValue> = FxHashMap::default();
        if let Some(s) = self.state.sheet(sid) {
            for coord in src.iter_coords() {
                if let Some(cell) = s.cells.get(&coord) {
                    sources.insert(coord, cell.input.clone());
                }
            }
        }

        let mut seeds = FxHashSet::default();
        for target in dst.iter_coords() {
            if src.contains(target) {
                continue;
            }
            let source = Coord::new(
                src.start.col + (target.col - dst.start.col) % src.width(),
                src.start.row + (target.row - dst.start.row) % src.height(),
            );
            let dc = target.col as i64 - source.col as i64;
            let dr = target.row as i64 - source.row as i64;
            let value = match sources.get(&source) {
                None => SerializedValue::Empty,
                Some(SerializedValue::Text(s)) if s.starts_with('=') => {
                    let body = gridcalc_parse::rewrite::shift_relative(&s[1..], dc, dr);
                    SerializedValue::Text(format!("={body}"))
                }
                Some(other) => other.clone(),
            };
            let id = CellId::new(sid, target);
            self.write_cell(id, value);
            seeds.insert(id);
        }
        self.recompute_and_publish(seeds);
        Ok(())
    }

    pub fn get_cell_value(&self, addr: &CellAddr) -> Result<CellValue, EngineError> {
        let (_, sid) = self.resolve_sheet_addr(&addr.workbook, &addr.sheet)?;
        let id = CellId::new(sid, addr.cell);
        Ok(self.stored_value(id))
    }

    /// Evaluate a formula ad hoc in the context of a sheet (anchored at
    /// `A1`) without writing it to any cell. Spilled results collapse to
    /// their origin value; an unparseable formula evaluates to `#ERROR!`.
    pub fn evaluate_formula(
        &self,
        addr: &SheetAddr,
        formula: &str,
    ) -> Result<CellValue, EngineError> {
        let (wb_id, sid) = self.resolve_sheet_addr(&addr.workbook, &addr.sheet)?;
        let tree = match gridcalc_parse::parse(formula) {
            Ok(tree) => tree,
            Err(e) => {
                return Ok(CellValue::Error(
                    CellError::new(ErrorKind::Error)
                        .with_message(format!("invalid formula: {e}")),
                ));
            }
        };
        let dirty = FxHashSet::default();
        let interp = Interpreter::new(&self.state, &dirty);
        let scope = crate::interpreter::EvalScope {
            workbook: wb_id,
            sheet: sid,
            at: Coord::new(0, 0),
        };
        Ok(match interp.evaluate_expr(&tree, &scope) {
            crate::result::EvalResult::Value(v) => v,
            crate::result::EvalResult::Error(e) => CellValue::Error(e),
            crate::result::EvalResult::Spill(s) => interp.spill_origin_value(&s),
        })
    }

    /// The serialized content of a cell (what the user typed).
    pub fn get_cell_input(&self, addr: &CellAddr) -> Result<SerializedValue, EngineError> {
        let (_, sid) = self.resolve_sheet_addr(&addr.workbook, &addr.sheet)?;
        Ok(self
            .state
            .cell(CellId::new(sid, addr.cell))
            .map(|c| c.input.clone())
            .unwrap_or(SerializedValue::Empty))
    }

    /* ───────────────────── tables ───────────────────── */

    pub fn add_table(&mut self, desc: &TableDesc) -> Result<(), EngineError> {
        if self.state.tables.contains_name(&desc.name) {
            return Err(EngineError::TableExists(desc.name.clone()));
        }
        if desc.num_cols == 0 || desc.num_rows == Some(0) {
            return Err(EngineError::InvalidOperation(format!(
                "table {} must have at least one column and one row",
                desc.name
            )));
        }
        let (wb_id, sid) = self.resolve_sheet_addr(&desc.workbook, &desc.sheet)?;
        self.state.tables.insert(Table {
            name: desc.name.clone(),
            workbook: wb_id,
            sheet: sid,
            origin: desc.start,
            width: desc.num_cols,
            height: desc.num_rows.map_or(AxisEnd::Open, AxisEnd::Finite),
        });
        self.publisher.emit(&EngineEvent::TableAdded {
            table: desc.name.clone(),
        });
        let seeds = self
            .state
            .deps
            .symbol_watchers(&format!("table:{}", desc.name.to_uppercase()));
        self.recompute_and_publish(seeds);
        Ok(())
    }

    pub fn remove_table(&mut self, name: &str) -> Result<(), EngineError> {
        if self.state.tables.remove(name).is_none() {
            return Err(EngineError::TableNotFound(name.to_string()));
        }
        self.publisher.emit(&EngineEvent::TableRemoved {
            table: name.to_string(),
        });
        let seeds = self
            .state
            .deps
            .symbol_watchers(&format!("table:{}", name.to_uppercase()));
        self.recompute_and_publish(seeds);
        Ok(())
    }

    pub fn rename_table(&mut self, old: &str, new: &str) -> Result<(), EngineError> {
        if self.state.tables.contains_name(new) {
            return Err(EngineError::TableExists(new.to_string()));
        }
        let mut table = self
            .state
            .tables
            .remove(old)
            .ok_or_else(|| EngineError::TableNotFound(old.to_string()))?;
        table.name = new.to_string();
        self.state.tables.insert(table);

        let mut seeds =
            self.rewrite_formulas(None, |src| gridcalc_parse::rewrite::rename_table(src, old, new));
        seeds.extend(
            self.state
                .deps
                .symbol_watchers(&format!("table:{}", new.to_uppercase())),
        );
        self.publisher.emit(&EngineEvent::TableRenamed {
            old: old.to_string(),
            new: new.to_string(),
        });
        self.recompute_and_publish(seeds);
        Ok(())
    }

    /* ───────────────────── named expressions ───────────────────── */

    pub fn define_name(
        &mut self,
        workbook: &str,
        sheet: Option<&str>,
        name: &str,
        formula: &str,
    ) -> Result<(), EngineError> {
        let wb_id = self
            .state
            .workbook_id(workbook)
            .ok_or_else(|| EngineError::WorkbookNotFound(workbook.to_string()))?;
        let sheet_id = match sheet {
            Some(s) => Some(
                self.state
                    .sheet_id(wb_id, s)
                    .ok_or_else(|| EngineError::SheetNotFound(s.to_string()))?,
            ),
            None => None,
        };
        let body = formula.strip_prefix('=').unwrap_or(formula).to_string();
        if !self.state.names.define(wb_id, sheet_id, name, body) {
            return Err(EngineError::NameExists(name.to_string()));
        }
        let seeds = self
            .state
            .deps
            .symbol_watchers(&format!("name:{}", name.to_uppercase()));
        self.recompute_and_publish(seeds);
        Ok(())
    }

    pub fn remove_name(
        &mut self,
        workbook: &str,
        sheet: Option<&str>,
        name: &str,
    ) -> Result<(), EngineError> {
        let wb_id = self
            .state
            .workbook_id(workbook)
            .ok_or_else(|| EngineError::WorkbookNotFound(workbook.to_string()))?;
        let sheet_id = match sheet {
            Some(s) => Some(
                self.state
                    .sheet_id(wb_id, s)
                    .ok_or_else(|| EngineError::SheetNotFound(s.to_string()))?,
            ),
            None => None,
        };
        if !self.state.names.remove(wb_id, sheet_id, name) {
            return Err(EngineError::NameNotFound(name.to_string()));
        }
        let seeds = self
            .state
            .deps
            .symbol_watchers(&format!("name:{}", name.to_uppercase()));
        self.recompute_and_publish(seeds);
        Ok(())
    }

    /* ───────────────────── events ───────────────────── */

    pub fn subscribe(&mut self, listener: impl FnMut(&EngineEvent) + 'static) -> SubscriptionId {
        self.publisher.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.publisher.unsubscribe(id);
    }

    /* ───────────────────── internals ───────────────────── */

    fn resolve_sheet_addr(
        &self,
        workbook: &str,
        sheet: &str,
    ) -> Result<(WorkbookId, SheetId), EngineError> {
        let wb_id = self
            .state
            .workbook_id(workbook)
            .ok_or_else(|| EngineError::WorkbookNotFound(workbook.to_string()))?;
        let sid = self
            .state
            .sheet_id(wb_id, sheet)
            .ok_or_else(|| EngineError::SheetNotFound(sheet.to_string()))?;
        Ok((wb_id, sid))
    }

    /// Write one cell slot: parse formulas, delete on empty. No
    /// recomputation.
    fn write_cell(&mut self, id: CellId, value: SerializedValue) {
        let slot = match &value {
            _ if value.is_empty() => None,
            SerializedValue::Number(n) => Some(CellKind::Literal(CellValue::Number(*n))),
            SerializedValue::Boolean(b) => Some(CellKind::Literal(CellValue::Boolean(*b))),
            SerializedValue::Text(s) if s.starts_with('=') => {
                match gridcalc_parse::parse(&s[1..]) {
                    Ok(ast) => Some(CellKind::Formula {
                        src: s.clone(),
                        ast,
                    }),
                    Err(e) => Some(CellKind::Malformed {
                        src: s.clone(),
                        err: e.to_string(),
                    }),
                }
            }
            SerializedValue::Text(s) => Some(CellKind::Literal(CellValue::Text(s.clone()))),
            SerializedValue::Empty => None,
        };
        if let Some(sheet) = self.state.sheet_mut(id.sheet) {
            match slot {
                Some(kind) => {
                    sheet.cells.insert(id.coord, Cell { input: value, kind });
                }
                None => {
                    sheet.cells.remove(&id.coord);
                }
            }
        }
        // Whatever was cached for this cell is stale either way.
        self.state.values.remove(&id);
    }

    /// Current externally-visible value of a cell.
    fn stored_value(&self, id: CellId) -> CellValue {
        match self.state.cell_kind(id) {
            Some(CellKind::Literal(v)) => v.clone(),
            Some(CellKind::Malformed { err, .. }) => CellValue::Error(
                CellError::new(ErrorKind::Error).with_message(format!("invalid formula: {err}")),
            ),
            Some(CellKind::Formula { .. }) => self
                .state
                .values
                .get(&id)
                .cloned()
                .unwrap_or(CellValue::Empty),
            None => self
                .state
                .values
                .get(&id)
                .cloned()
                .unwrap_or(CellValue::Empty),
        }
    }

    /// Rewrite the source of every formula cell (optionally restricted to
    /// one workbook); returns the cells whose text changed.
    fn rewrite_formulas(
        &mut self,
        workbook: Option<WorkbookId>,
        rewrite: impl Fn(&str) -> String,
    ) -> FxHashSet<CellId> {
        let mut changed = FxHashSet::default();
        let candidates = self.state.formula_cells();
        for id in candidates {
            if let Some(wb) = workbook {
                if self.state.sheet(id.sheet).map(|s| s.workbook) != Some(wb) {
                    continue;
                }
            }
            let body = match self.state.cell_kind(id) {
                Some(CellKind::Formula { src, .. }) => src[1..].to_string(),
                _ => continue,
            };
            let next = rewrite(&body);
            if next != body {
                let text = format!("={next}");
                if let Some(sheet) = self.state.sheet_mut(id.sheet) {
                    if let Some(cell) = sheet.cells.get_mut(&id.coord) {
                        cell.input = SerializedValue::Text(text.clone());
                        cell.kind = match gridcalc_parse::parse(&next) {
                            Ok(ast) => CellKind::Formula { src: text, ast },
                            Err(e) => CellKind::Malformed {
                                src: text,
                                err: e.to_string(),
                            },
                        };
                    }
                }
                changed.insert(id);
            }
        }
        changed
    }

    /// Drop all evaluation state tied to a sheet and return the seed set
    /// of surviving cells that must re-evaluate.
    fn drop_sheet_data(&mut self, sid: SheetId) -> FxHashSet<CellId> {
        let mut seeds: FxHashSet<CellId> = self
            .state
            .deps
            .cells_reading_sheet(sid)
            .into_iter()
            .filter(|c| c.sheet != sid)
            .collect();

        let origins: Vec<CellId> = self
            .state
            .spills
            .origins()
            .map(|(o, _)| o)
            .filter(|o| o.sheet == sid)
            .collect();
        for origin in origins {
            for member in self.state.spills.remove(origin) {
                self.state.values.remove(&member);
            }
        }

        let cell_ids: Vec<CellId> = match self.state.sheet(sid) {
            Some(s) => s.cells.keys().map(|c| CellId::new(sid, *c)).collect(),
            None => Vec::new(),
        };
        for id in cell_ids {
            self.state.values.remove(&id);
            self.state.deps.clear_deps(id);
        }
        self.state.tables.remove_for_sheet(sid);
        self.state.names.remove_for_sheet(sid);
        self.state.sheets[sid as usize] = None;
        seeds.retain(|c| self.state.sheet(c.sheet).is_some());
        seeds
    }

    fn recompute_and_publish(&mut self, seeds: FxHashSet<CellId>) {
        let changed = self.recompute(seeds);
        if !changed.is_empty() {
            let mut cells: Vec<CellAddr> = changed
                .into_iter()
                .filter_map(|id| self.cell_addr(id))
                .collect();
            cells.sort_by(|a, b| {
                (&a.workbook, &a.sheet, a.cell.row, a.cell.col)
                    .cmp(&(&b.workbook, &b.sheet, b.cell.row, b.cell.col))
            });
            cells.dedup();
            self.publisher.emit(&EngineEvent::CellsChanged { cells });
        }
    }

    fn cell_addr(&self, id: CellId) -> Option<CellAddr> {
        let sheet = self.state.sheet(id.sheet)?;
        let wb = self.state.workbook(sheet.workbook)?;
        Some(CellAddr::new(wb.name.clone(), sheet.name.clone(), id.coord))
    }

    /// Re-evaluate everything reachable from `seeds`, looping until
    /// spill-into-read chains settle.
    fn recompute(&mut self, mut seeds: FxHashSet<CellId>) -> Vec<CellId> {
        let mut total_changed: Vec<CellId> = Vec::new();
        for pass in 0..self.state.config.max_recompute_passes {
            if seeds.is_empty() {
                break;
            }
            let dirty = self.dirty_closure(&seeds);

            #[cfg(feature = "tracing")]
            tracing::trace!(dirty = dirty.len(), "recompute pass");

            let outcomes = {
                let interp = Interpreter::new(&self.state, &dirty);
                let mut order: Vec<CellId> = dirty.iter().copied().collect();
                order.sort_unstable();
                for id in &order {
                    if matches!(self.state.cell_kind(*id), Some(CellKind::Formula { .. })) {
                        interp.evaluate_cell(*id);
                    }
                }
                interp.into_outcomes()
            };

            let (changed, next_seeds) = self.apply_outcomes(&dirty, outcomes);
            if pass == 0 {
                // The direct mutations themselves count as changes.
                total_changed.extend(seeds.iter().copied());
            }
            total_changed.extend(changed);
            seeds = next_seeds;
        }
        total_changed.sort_unstable();
        total_changed.dedup();
        total_changed
    }

    /// Seeds plus everything that transitively depends on them, with
    /// spill membership traversed in both directions.
    fn dirty_closure(&self, seeds: &FxHashSet<CellId>) -> FxHashSet<CellId> {
        let mut out: FxHashSet<CellId> = FxHashSet::default();
        let mut queue: Vec<CellId> = seeds.iter().copied().collect();
        while let Some(cell) = queue.pop() {
            if !out.insert(cell) {
                continue;
            }
            let mut next = FxHashSet::default();
            self.state.deps.dependents_of(cell, &mut next);
            if let Some(area) = self.state.spills.area_of(cell) {
                for coord in area.iter_coords() {
                    let member = CellId::new(cell.sheet, coord);
                    if member != cell {
                        next.insert(member);
                    }
                }
            }
            if let Some(owner) = self.state.spills.origin_of(cell) {
                next.insert(owner);
            }
            queue.extend(next.into_iter().filter(|n| !out.contains(n)));
        }
        out
    }

    /// Write back one pass's outcomes: dependency records, spill
    /// placements, scalar values. Returns changed cells and the seeds for
    /// the next pass.
    fn apply_outcomes(
        &mut self,
        dirty: &FxHashSet<CellId>,
        outcomes: Vec<(CellId, CellOutcome)>,
    ) -> (Vec<CellId>, FxHashSet<CellId>) {
        let mut changed: Vec<CellId> = Vec::new();
        let mut member_changes: Vec<CellId> = Vec::new();

        // Cells that no longer hold a formula keep no dependency record.
        for id in dirty {
            if !matches!(self.state.cell_kind(*id), Some(CellKind::Formula { .. })) {
                self.state.deps.clear_deps(*id);
            }
        }

        // Stale placements of every re-evaluated origin come out first;
        // the removed values are kept so an identical re-placement does
        // not read as a change.
        let mut removed: FxHashMap<CellId, CellValue> = FxHashMap::default();
        for id in dirty {
            if self.state.spills.is_origin(*id) {
                for member in self.state.spills.remove(*id) {
                    if let Some(v) = self.state.values.remove(&member) {
                        removed.insert(member, v);
                    }
                }
            }
        }

        let mut ordered = outcomes;
        ordered.sort_by_key(|(id, _)| *id);

        for (id, outcome) in ordered {
            self.state.deps.set_deps(id, outcome.deps);

            let mut scalar = outcome.scalar;
            if let Some(plan) = outcome.spill {
                match self.try_place_spill(id, &plan, &removed) {
                    Ok(members) => {
                        member_changes.extend(members);
                    }
                    Err(blocker) => {
                        // Lost a same-pass race for the rectangle.
                        scalar = CellValue::Error(
                            CellError::new(ErrorKind::Ref)
                                .with_message(format!("spill area blocked by {blocker}")),
                        );
                        member_changes.push(id);
                    }
                }
            }

            let old = self.state.values.get(&id);
            if old != Some(&scalar) {
                changed.push(id);
            }
            self.state.values.insert(id, scalar);
        }

        // Members whose spill went away without a replacement value.
        for (member, old) in removed {
            if !self.state.values.contains_key(&member) && old != CellValue::Empty {
                member_changes.push(member);
            }
        }

        // Readers of rewritten members may have observed stale values if
        // they ran before the owner this pass; re-seed their dependents.
        let mut next_seeds: FxHashSet<CellId> = FxHashSet::default();
        for m in &member_changes {
            let mut d = FxHashSet::default();
            self.state.deps.dependents_of(*m, &mut d);
            next_seeds.extend(d);
        }
        for c in &changed {
            let mut d = FxHashSet::default();
            self.state.deps.dependents_of(*c, &mut d);
            next_seeds.extend(d.into_iter().filter(|x| !dirty.contains(x)));
        }
        changed.extend(member_changes);
        (changed, next_seeds)
    }

    /// Validate and register one spill placement. Returns the members
    /// whose values changed (relative to what the rectangle held before
    /// the pass), or the first blocking coordinate.
    fn try_place_spill(
        &mut self,
        origin: CellId,
        plan: &SpillPlan,
        before: &FxHashMap<CellId, CellValue>,
    ) -> Result<Vec<CellId>, Coord> {
        if let Some(sheet) = self.state.sheet(origin.sheet) {
            for coord in plan.rect.iter_coords() {
                if coord == origin.coord {
                    continue;
                }
                if sheet.cells.contains_key(&coord) {
                    return Err(coord);
                }
            }
        }
        if let Some(conflict) = self.state.spills.conflict(origin, plan.rect) {
            return Err(conflict.coord);
        }

        self.state.spills.place(origin, plan.rect);
        let mut members = Vec::new();
        for (y, row) in plan.values.iter().enumerate() {
            for (x, value) in row.iter().enumerate() {
                let coord = Coord::new(
                    plan.rect.start.col + x as u32,
                    plan.rect.start.row + y as u32,
                );
                if coord == origin.coord {
                    continue;
                }
                let member = CellId::new(origin.sheet, coord);
                let old = self.state.values.insert(member, value.clone());
                let previous = old.as_ref().or_else(|| before.get(&member));
                if previous != Some(value) {
                    members.push(member);
                }
            }
        }
        Ok(members)
    }
}

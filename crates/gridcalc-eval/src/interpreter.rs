//! The evaluator: walks a syntax tree under an evaluation scope, pulling
//! cell and range values out of the engine state, dispatching function
//! calls, broadcasting over spilled operands, and recording every
//! dependency of the cell being evaluated.
//!
//! Evaluation is demand-driven with memoization: reading a formula cell
//! re-enters the evaluator on that cell, guarded by the evaluation stack
//! (re-entry yields `#CYCLE!`). All interpreter state lives in
//! `RefCell`s so the engine can hand out `&Interpreter` during a
//! recompute pass and apply the collected outcomes afterwards.

use std::cell::RefCell;

use gridcalc_common::arith;
use gridcalc_common::{
    AxisEnd, CellError, CellValue, Coord, ErrorKind, FiniteRange, SheetRange, Sign,
};
use gridcalc_parse::ast::{BinaryOpKind, Expr, ExprKind, TableSelector, UnaryOpKind};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::engine::deps::DepSet;
use crate::engine::sheet::{CellId, CellKind, SheetId, WorkbookId};
use crate::engine::state::EngineState;
use crate::engine::tables::Table;
use crate::function::{ArgumentHandle, FnCtx};
use crate::function_registry;
use crate::result::{EvalResult, SpillResult, SpillSource};

/// Where an expression is being evaluated: the current cell and its
/// containers.
#[derive(Debug, Clone, Copy)]
pub struct EvalScope {
    pub workbook: WorkbookId,
    pub sheet: SheetId,
    pub at: Coord,
}

/// A validated spill placement: the rectangle at the origin and the
/// materialized per-offset values, ready for the engine to apply.
#[derive(Debug, Clone)]
pub struct SpillPlan {
    pub rect: FiniteRange,
    pub values: Vec<Vec<CellValue>>,
}

/// Result of evaluating one formula cell, applied by the engine after the
/// pass.
#[derive(Debug)]
pub struct CellOutcome {
    pub scalar: CellValue,
    pub deps: DepSet,
    pub spill: Option<SpillPlan>,
}

pub struct Interpreter<'e> {
    state: &'e EngineState,
    /// Cells whose cached values must not be trusted this pass.
    dirty: &'e FxHashSet<CellId>,
    memo: RefCell<FxHashMap<CellId, CellValue>>,
    fresh_spills: RefCell<FxHashMap<CellId, SpillResult>>,
    outcomes: RefCell<Vec<(CellId, CellOutcome)>>,
    stack: RefCell<Vec<CellId>>,
    dep_scopes: RefCell<Vec<DepSet>>,
    name_stack: RefCell<Vec<String>>,
}

impl<'e> Interpreter<'e> {
    pub fn new(state: &'e EngineState, dirty: &'e FxHashSet<CellId>) -> Self {
        Interpreter {
            state,
            dirty,
            memo: RefCell::new(FxHashMap::default()),
            fresh_spills: RefCell::new(FxHashMap::default()),
            outcomes: RefCell::new(Vec::new()),
            stack: RefCell::new(Vec::new()),
            dep_scopes: RefCell::new(Vec::new()),
            name_stack: RefCell::new(Vec::new()),
        }
    }

    pub fn into_outcomes(self) -> Vec<(CellId, CellOutcome)> {
        self.outcomes.into_inner()
    }

    pub(crate) fn max_materialized_cells(&self) -> usize {
        self.state.config.max_materialized_cells
    }

    /* ───────────────────── cell evaluation ───────────────────── */

    /// Scalar value of a cell, re-entering the evaluator for dirty
    /// formula cells.
    pub fn evaluate_cell(&self, id: CellId) -> CellValue {
        if let Some(v) = self.memo.borrow().get(&id) {
            return v.clone();
        }
        match self.state.cell_kind(id) {
            Some(CellKind::Literal(v)) => v.clone(),
            Some(CellKind::Malformed { err, .. }) => CellValue::Error(
                CellError::new(ErrorKind::Error).with_message(format!("invalid formula: {err}")),
            ),
            Some(CellKind::Formula { ast, .. }) => {
                if !self.dirty.contains(&id) {
                    if let Some(v) = self.state.values.get(&id) {
                        return v.clone();
                    }
                }
                self.evaluate_formula_cell(id, ast)
            }
            None => self.member_value(id),
        }
    }

    fn evaluate_formula_cell(&self, id: CellId, ast: &Expr) -> CellValue {
        if self.stack.borrow().contains(&id) {
            return CellValue::Error(
                CellError::new(ErrorKind::Cycle)
                    .with_message(format!("circular reference through {}", id.coord)),
            );
        }
        let workbook = match self.state.sheet(id.sheet) {
            Some(sheet) => sheet.workbook,
            None => return CellValue::error(ErrorKind::Ref),
        };
        let scope = EvalScope {
            workbook,
            sheet: id.sheet,
            at: id.coord,
        };

        self.stack.borrow_mut().push(id);
        self.dep_scopes.borrow_mut().push(DepSet::default());
        let result = self.evaluate_expr(ast, &scope);
        let mut deps = self.dep_scopes.borrow_mut().pop().unwrap_or_default();
        self.stack.borrow_mut().pop();

        let (scalar, plan, watched) = self.cell_outcome_parts(id, &result);
        // A spilling cell watches its own rectangle: content appearing
        // there blocks it, content leaving unblocks it.
        if let Some(rect) = watched {
            deps.ranges.push((id.sheet, rect.into()));
        }
        self.memo.borrow_mut().insert(id, scalar.clone());
        if plan.is_some() {
            if let EvalResult::Spill(spill) = &result {
                self.fresh_spills.borrow_mut().insert(id, spill.clone());
            }
        }
        self.outcomes.borrow_mut().push((
            id,
            CellOutcome {
                scalar: scalar.clone(),
                deps,
                spill: plan,
            },
        ));
        scalar
    }

    /// The value stored at the origin cell of a result, plus the spill
    /// placement when the result spills: the (0,0) value unless the
    /// rectangle is blocked, in which case `#REF!` and no placement. The
    /// third element is the rectangle to watch (present for blocked
    /// spills too).
    fn cell_outcome_parts(
        &self,
        id: CellId,
        result: &EvalResult,
    ) -> (CellValue, Option<SpillPlan>, Option<FiniteRange>) {
        match result {
            EvalResult::Value(v) => (v.clone(), None, None),
            EvalResult::Error(e) => (CellValue::Error(e.clone()), None, None),
            EvalResult::Spill(spill) => match self.spill_rect(spill) {
                Err(e) => (CellValue::Error(e), None, None),
                Ok(None) => (CellValue::Empty, None, None),
                Ok(Some(rect)) => {
                    if let Some(blocker) = self.spill_blocker(id, rect) {
                        let err = CellError::new(ErrorKind::Ref)
                            .with_message(format!("spill area blocked by {blocker}"));
                        return (CellValue::Error(err), None, Some(rect));
                    }
                    match self.materialize(spill) {
                        Err(e) => (CellValue::Error(e), None, Some(rect)),
                        Ok(values) => {
                            let origin = values
                                .first()
                                .and_then(|r| r.first())
                                .cloned()
                                .unwrap_or(CellValue::Empty);
                            (origin, Some(SpillPlan { rect, values }), Some(rect))
                        }
                    }
                }
            },
        }
    }

    /// A cell with no content of its own: a spill member or truly empty.
    fn member_value(&self, id: CellId) -> CellValue {
        if let Some(v) = self.fresh_member_value(id) {
            return v;
        }
        if let Some(owner) = self.state.spills.origin_of(id) {
            if self.dirty.contains(&owner) {
                // Re-evaluate the owner; its fresh spill (if any) decides.
                self.evaluate_cell(owner);
                return self.fresh_member_value(id).unwrap_or(CellValue::Empty);
            }
            if let Some(v) = self.state.values.get(&id) {
                return v.clone();
            }
        }
        CellValue::Empty
    }

    fn fresh_member_value(&self, id: CellId) -> Option<CellValue> {
        // Snapshot the candidates: probing a range-backed spill can
        // re-enter the evaluator, which must be free to borrow the map.
        let candidates: Vec<(CellId, SpillResult)> = self
            .fresh_spills
            .borrow()
            .iter()
            .filter(|(origin, _)| origin.sheet == id.sheet && **origin != id)
            .map(|(origin, spill)| (*origin, spill.clone()))
            .collect();
        for (origin, spill) in candidates {
            if let Ok(Some(rect)) = self.spill_rect(&spill) {
                if rect.contains(id.coord) {
                    let x = id.coord.col - origin.coord.col;
                    let y = id.coord.row - origin.coord.row;
                    return Some(self.spill_value_at(&spill, x, y));
                }
            }
        }
        None
    }

    /* ───────────────────── expression walk ───────────────────── */

    pub fn evaluate_expr(&self, node: &Expr, scope: &EvalScope) -> EvalResult {
        match &node.kind {
            ExprKind::Value(v) => EvalResult::from_value(v.clone()),
            ExprKind::Empty => EvalResult::Value(CellValue::Empty),
            ExprKind::Infinity => EvalResult::Value(CellValue::Infinity(Sign::Pos)),
            ExprKind::Error { code, message } => {
                EvalResult::Error(CellError::new(*code).with_message(message.clone()))
            }
            ExprKind::Reference {
                addr,
                sheet,
                workbook,
                ..
            } => match self.resolve_scope(workbook.as_deref(), sheet.as_deref(), scope) {
                Ok((_, sheet_id)) => {
                    EvalResult::from_value(self.read_cell(CellId::new(sheet_id, *addr)))
                }
                Err(e) => EvalResult::Error(e),
            },
            ExprKind::Range {
                range,
                sheet,
                workbook,
                ..
            } => match self.resolve_scope(workbook.as_deref(), sheet.as_deref(), scope) {
                Ok((_, sheet_id)) => {
                    self.record_range_dep(sheet_id, *range);
                    EvalResult::Spill(SpillResult::from_cells(
                        CellId::new(scope.sheet, scope.at),
                        sheet_id,
                        *range,
                    ))
                }
                Err(e) => EvalResult::Error(e),
            },
            ExprKind::Array { rows } => {
                let mut grid = Vec::with_capacity(rows.len());
                for row in rows {
                    let mut out = Vec::with_capacity(row.len());
                    for cell in row {
                        out.push(match self.evaluate_expr(cell, scope) {
                            EvalResult::Value(v) => v,
                            EvalResult::Error(e) => CellValue::Error(e),
                            EvalResult::Spill(s) => self.spill_origin_value(&s),
                        });
                    }
                    grid.push(out);
                }
                EvalResult::Spill(SpillResult::from_grid(
                    CellId::new(scope.sheet, scope.at),
                    grid,
                ))
            }
            ExprKind::Function { name, args } => {
                function_registry::ensure_builtins();
                match function_registry::get(name) {
                    Some(f) => {
                        let cx = FnCtx::new(self, scope);
                        let handles: Vec<ArgumentHandle<'_, '_>> =
                            args.iter().map(|a| ArgumentHandle::new(a, &cx)).collect();
                        f.dispatch(&handles, &cx)
                    }
                    None => EvalResult::Error(
                        CellError::new(ErrorKind::Name)
                            .with_message(format!("unknown function {name}")),
                    ),
                }
            }
            ExprKind::UnaryOp { op, operand } => self.eval_unary(*op, operand, scope),
            ExprKind::BinaryOp { op, left, right } => self.eval_binary(*op, left, right, scope),
            ExprKind::NamedExpr {
                name,
                sheet,
                workbook,
            } => self.eval_named(name, sheet.as_deref(), workbook.as_deref(), scope),
            ExprKind::ThreeDRange {
                start_sheet,
                end_sheet,
                workbook,
                inner,
            } => self.eval_three_d(start_sheet, end_sheet, workbook.as_deref(), inner, scope),
            ExprKind::StructuredRef {
                table,
                sheet,
                workbook,
                cols,
                selector,
                this_row,
            } => self.eval_structured(
                table.as_deref(),
                sheet.as_deref(),
                workbook.as_deref(),
                cols.as_ref(),
                *selector,
                *this_row,
                scope,
            ),
        }
    }

    /* ───────────────────── operators ───────────────────── */

    fn eval_unary(&self, op: UnaryOpKind, operand: &Expr, scope: &EvalScope) -> EvalResult {
        let kernel = match op {
            UnaryOpKind::Plus => arith::plus,
            UnaryOpKind::Minus => arith::neg,
            UnaryOpKind::Percent => arith::percent,
        };
        match self.evaluate_expr(operand, scope) {
            EvalResult::Error(e) => EvalResult::Error(e),
            EvalResult::Value(v) => EvalResult::from_value(kernel(&v)),
            EvalResult::Spill(s) => match self.materialize(&s) {
                Err(e) => EvalResult::Error(e),
                Ok(grid) => {
                    let mapped = grid
                        .into_iter()
                        .map(|row| row.iter().map(kernel).collect())
                        .collect();
                    EvalResult::Spill(SpillResult::from_grid(
                        CellId::new(scope.sheet, scope.at),
                        mapped,
                    ))
                }
            },
        }
    }

    fn eval_binary(
        &self,
        op: BinaryOpKind,
        left: &Expr,
        right: &Expr,
        scope: &EvalScope,
    ) -> EvalResult {
        let lhs = self.evaluate_expr(left, scope);
        if let EvalResult::Error(e) = lhs {
            return EvalResult::Error(e);
        }
        let rhs = self.evaluate_expr(right, scope);
        if let EvalResult::Error(e) = rhs {
            return EvalResult::Error(e);
        }
        let kernel = binary_kernel(op);
        match (lhs, rhs) {
            (EvalResult::Value(a), EvalResult::Value(b)) => EvalResult::from_value(kernel(&a, &b)),
            (a, b) => self.broadcast_binary(&kernel, a, b, scope),
        }
    }

    /// Elementwise application over spilled operands. The result's area
    /// is the largest input by cell count, ties resolved left-first;
    /// scalars replicate, smaller arrays pad with the empty value.
    pub(crate) fn broadcast_binary(
        &self,
        kernel: &dyn Fn(&CellValue, &CellValue) -> CellValue,
        a: EvalResult,
        b: EvalResult,
        scope: &EvalScope,
    ) -> EvalResult {
        let ag = match self.result_grid(a) {
            Ok(g) => g,
            Err(e) => return EvalResult::Error(e),
        };
        let bg = match self.result_grid(b) {
            Ok(g) => g,
            Err(e) => return EvalResult::Error(e),
        };
        let (ar, ac) = grid_dims(&ag);
        let (br, bc) = grid_dims(&bg);
        let (rows, cols) = if ar * ac >= br * bc { (ar, ac) } else { (br, bc) };
        let mut out = Vec::with_capacity(rows);
        for y in 0..rows {
            let mut row = Vec::with_capacity(cols);
            for x in 0..cols {
                let av = broadcast_pick(&ag, ar, ac, x, y);
                let bv = broadcast_pick(&bg, br, bc, x, y);
                row.push(kernel(&av, &bv));
            }
            out.push(row);
        }
        EvalResult::Spill(SpillResult::from_grid(
            CellId::new(scope.sheet, scope.at),
            out,
        ))
    }

    /* ───────────────────── named / 3D / structured ───────────────────── */

    fn eval_named(
        &self,
        name: &str,
        sheet: Option<&str>,
        workbook: Option<&str>,
        scope: &EvalScope,
    ) -> EvalResult {
        let symbol = format!("name:{}", name.to_uppercase());
        self.record_symbol_dep(&symbol);

        let (wb_id, sheet_id) = match self.resolve_scope(workbook, sheet, scope) {
            Ok(ids) => ids,
            Err(e) => return EvalResult::Error(e),
        };
        let formula = match self.state.names.lookup(wb_id, Some(sheet_id), name) {
            Some(f) => f.to_string(),
            None => {
                return EvalResult::Error(
                    CellError::new(ErrorKind::Name)
                        .with_message(format!("name {name} is not defined")),
                );
            }
        };

        let guard = format!("{wb_id}:{}", name.to_uppercase());
        if self.name_stack.borrow().contains(&guard) {
            return EvalResult::Error(
                CellError::new(ErrorKind::Cycle)
                    .with_message(format!("named expression {name} refers to itself")),
            );
        }
        let parsed = match gridcalc_parse::parse(&formula) {
            Ok(tree) => tree,
            Err(e) => {
                return EvalResult::Error(
                    CellError::new(ErrorKind::Error)
                        .with_message(format!("name {name}: {e}")),
                );
            }
        };
        self.name_stack.borrow_mut().push(guard);
        let result = self.evaluate_expr(&parsed, scope);
        self.name_stack.borrow_mut().pop();
        result
    }

    fn eval_three_d(
        &self,
        start_sheet: &str,
        end_sheet: &str,
        workbook: Option<&str>,
        inner: &Expr,
        scope: &EvalScope,
    ) -> EvalResult {
        let wb_id = match self.resolve_workbook(workbook, scope) {
            Ok(id) => id,
            Err(e) => return EvalResult::Error(e),
        };
        let order = match self.state.workbook(wb_id) {
            Some(wb) => &wb.sheet_order,
            None => return EvalResult::Error(CellError::new(ErrorKind::Ref)),
        };
        let pos_of = |name: &str| -> Option<usize> {
            order
                .iter()
                .position(|sid| self.state.sheet(*sid).is_some_and(|s| s.name == name))
        };
        let (Some(a), Some(b)) = (pos_of(start_sheet), pos_of(end_sheet)) else {
            self.record_symbol_dep(&format!("sheet:{start_sheet}"));
            self.record_symbol_dep(&format!("sheet:{end_sheet}"));
            return EvalResult::Error(CellError::new(ErrorKind::Ref).with_message(format!(
                "3D span {start_sheet}:{end_sheet} does not resolve"
            )));
        };
        let (lo, hi) = (a.min(b), a.max(b));

        // Stack each sheet's rectangle vertically, in workbook order.
        let mut grid: Vec<Vec<CellValue>> = Vec::new();
        for sid in &order[lo..=hi] {
            match &inner.kind {
                ExprKind::Reference { addr, .. } => {
                    grid.push(vec![self.read_cell(CellId::new(*sid, *addr))]);
                }
                ExprKind::Range { range, .. } => {
                    self.record_range_dep(*sid, *range);
                    let spill = SpillResult::from_cells(
                        CellId::new(scope.sheet, scope.at),
                        *sid,
                        *range,
                    );
                    match self.materialize(&spill) {
                        Ok(rows) => grid.extend(rows),
                        Err(e) => return EvalResult::Error(e),
                    }
                }
                _ => {
                    return EvalResult::Error(
                        CellError::new(ErrorKind::Value)
                            .with_message("3D reference must wrap a cell or range"),
                    );
                }
            }
        }
        EvalResult::Spill(SpillResult::from_grid(
            CellId::new(scope.sheet, scope.at),
            grid,
        ))
    }

    fn eval_structured(
        &self,
        table: Option<&str>,
        sheet: Option<&str>,
        workbook: Option<&str>,
        cols: Option<&(String, String)>,
        selector: Option<TableSelector>,
        this_row: bool,
        scope: &EvalScope,
    ) -> EvalResult {
        if let Some(name) = table {
            self.record_symbol_dep(&format!("table:{}", name.to_uppercase()));
        }
        // Sheet/workbook qualifiers participate in resolution only as
        // validation; the table registry is engine-global.
        if sheet.is_some() || workbook.is_some() {
            if let Err(e) = self.resolve_scope(workbook, sheet, scope) {
                return EvalResult::Error(e);
            }
        }
        let table = match table {
            Some(name) => match self.state.tables.get(name) {
                Some(t) => t.clone(),
                None => {
                    return EvalResult::Error(
                        CellError::new(ErrorKind::Ref)
                            .with_message(format!("table {name} is not defined")),
                    );
                }
            },
            None => match self
                .state
                .tables
                .containing(CellId::new(scope.sheet, scope.at))
            {
                Some(t) => t.clone(),
                None => {
                    return EvalResult::Error(
                        CellError::new(ErrorKind::Ref)
                            .with_message("bare table reference outside any table"),
                    );
                }
            },
        };

        // Column names resolve against the header row, so the header row
        // is a dependency of every structured reference.
        self.record_range_dep(
            table.sheet,
            SheetRange::finite(
                table.origin,
                Coord::new(table.origin.col + table.width - 1, table.origin.row),
            ),
        );

        let (col_lo, col_hi) = match cols {
            None => (0, table.width.saturating_sub(1)),
            Some((first, last)) => {
                let lo = match self.table_column_offset(&table, first) {
                    Some(i) => i,
                    None => {
                        return EvalResult::Error(CellError::new(ErrorKind::Ref).with_message(
                            format!("table {} has no column {first:?}", table.name),
                        ));
                    }
                };
                let hi = match self.table_column_offset(&table, last) {
                    Some(i) => i,
                    None => {
                        return EvalResult::Error(CellError::new(ErrorKind::Ref).with_message(
                            format!("table {} has no column {last:?}", table.name),
                        ));
                    }
                };
                (lo.min(hi), lo.max(hi))
            }
        };
        let start_col = table.origin.col + col_lo;
        let end_col = table.origin.col + col_hi;

        if this_row {
            let row = scope.at.row;
            let in_data = row > table.origin.row
                && match table.height {
                    AxisEnd::Finite(h) => row < table.origin.row + h,
                    AxisEnd::Open => true,
                };
            if !in_data {
                return EvalResult::Error(
                    CellError::new(ErrorKind::Value)
                        .with_message("current-row reference outside the table's data rows"),
                );
            }
            if start_col == end_col {
                return EvalResult::from_value(
                    self.read_cell(CellId::new(table.sheet, Coord::new(start_col, row))),
                );
            }
            let range = SheetRange::finite(
                Coord::new(start_col, row),
                Coord::new(end_col, row),
            );
            self.record_range_dep(table.sheet, range);
            return EvalResult::Spill(SpillResult::from_cells(
                CellId::new(scope.sheet, scope.at),
                table.sheet,
                range,
            ));
        }

        let last_row = match table.height {
            AxisEnd::Finite(h) => AxisEnd::Finite(table.origin.row + h.max(1) - 1),
            AxisEnd::Open => AxisEnd::Open,
        };
        let (start_row, end_row) = match selector {
            Some(TableSelector::Headers) => {
                (table.origin.row, AxisEnd::Finite(table.origin.row))
            }
            Some(TableSelector::All) => (table.origin.row, last_row),
            // #Data is the default body
            Some(TableSelector::Data) | None => (table.origin.row + 1, last_row),
        };
        if let AxisEnd::Finite(r) = end_row {
            if r < start_row {
                return EvalResult::Error(
                    CellError::new(ErrorKind::Ref)
                        .with_message(format!("table {} has no data rows", table.name)),
                );
            }
        }
        let range = SheetRange::new(
            Coord::new(start_col, start_row),
            AxisEnd::Finite(end_col),
            end_row,
        );
        self.record_range_dep(table.sheet, range);
        EvalResult::Spill(SpillResult::from_cells(
            CellId::new(scope.sheet, scope.at),
            table.sheet,
            range,
        ))
    }

    fn table_column_offset(&self, table: &Table, name: &str) -> Option<u32> {
        for i in 0..table.width {
            let header = self.read_cell_quiet(CellId::new(
                table.sheet,
                Coord::new(table.origin.col + i, table.origin.row),
            ));
            if header.to_text().eq_ignore_ascii_case(name) {
                return Some(i);
            }
        }
        None
    }

    /* ───────────────────── reads & resolution ───────────────────── */

    /// Read a cell's scalar value, recording the dependency.
    pub(crate) fn read_cell(&self, id: CellId) -> CellValue {
        if let Some(scope) = self.dep_scopes.borrow_mut().last_mut() {
            scope.cells.insert(id);
        }
        self.read_cell_quiet(id)
    }

    /// Read without recording a cell dependency (range materialization —
    /// the range watcher already covers these cells).
    pub(crate) fn read_cell_quiet(&self, id: CellId) -> CellValue {
        self.evaluate_cell(id)
    }

    fn record_range_dep(&self, sheet: SheetId, range: SheetRange) {
        if let Some(scope) = self.dep_scopes.borrow_mut().last_mut() {
            scope.ranges.push((sheet, range));
        }
    }

    fn record_symbol_dep(&self, symbol: &str) {
        if let Some(scope) = self.dep_scopes.borrow_mut().last_mut() {
            scope.symbols.insert(symbol.to_string());
        }
    }

    fn resolve_workbook(
        &self,
        workbook: Option<&str>,
        scope: &EvalScope,
    ) -> Result<WorkbookId, CellError> {
        match workbook {
            None => Ok(scope.workbook),
            Some(name) => match self.state.workbook_id(name) {
                Some(id) => Ok(id),
                None => {
                    self.record_symbol_dep(&format!("workbook:{name}"));
                    Err(CellError::new(ErrorKind::Ref)
                        .with_message(format!("workbook {name} does not resolve")))
                }
            },
        }
    }

    fn resolve_scope(
        &self,
        workbook: Option<&str>,
        sheet: Option<&str>,
        scope: &EvalScope,
    ) -> Result<(WorkbookId, SheetId), CellError> {
        let wb_id = self.resolve_workbook(workbook, scope)?;
        match sheet {
            None if wb_id == scope.workbook => Ok((wb_id, scope.sheet)),
            None => {
                // Cross-workbook reference without a sheet: first sheet.
                let first = self
                    .state
                    .workbook(wb_id)
                    .and_then(|wb| wb.sheet_order.first().copied());
                match first {
                    Some(sid) => Ok((wb_id, sid)),
                    None => Err(CellError::new(ErrorKind::Ref)
                        .with_message("workbook has no sheets")),
                }
            }
            Some(name) => match self.state.sheet_id(wb_id, name) {
                Some(sid) => Ok((wb_id, sid)),
                None => {
                    self.record_symbol_dep(&format!("sheet:{name}"));
                    Err(CellError::new(ErrorKind::Ref)
                        .with_message(format!("sheet {name} does not resolve")))
                }
            },
        }
    }

    /* ───────────────────── spill plumbing ───────────────────── */

    /// The finite rectangle a spill would occupy at its origin; `None`
    /// for a range with nothing stored under it.
    pub(crate) fn spill_rect(
        &self,
        spill: &SpillResult,
    ) -> Result<Option<FiniteRange>, CellError> {
        let (rows, cols) = match self.spill_dims(spill)? {
            Some(dims) => dims,
            None => return Ok(None),
        };
        let origin = spill.origin.coord;
        Ok(Some(FiniteRange::new(
            origin,
            Coord::new(origin.col + cols - 1, origin.row + rows - 1),
        )))
    }

    /// Clipped `(rows, cols)` of a spill; `None` when an open range has
    /// no stored cells under it.
    pub(crate) fn spill_dims(
        &self,
        spill: &SpillResult,
    ) -> Result<Option<(u32, u32)>, CellError> {
        match &spill.source {
            SpillSource::Grid(rows) => {
                let (r, c) = grid_dims(rows);
                Ok(Some((r as u32, c as u32)))
            }
            SpillSource::Cells { sheet, range } => match self.source_rect(*sheet, range) {
                Some(rect) => {
                    let cells = rect.width() as u64 * rect.height() as u64;
                    if cells > self.state.config.max_materialized_cells as u64 {
                        return Err(CellError::new(ErrorKind::Num).with_message(format!(
                            "range materializes {cells} cells, over the configured limit"
                        )));
                    }
                    Ok(Some((rect.height(), rect.width())))
                }
                None => Ok(None),
            },
        }
    }

    /// The stored rectangle an open-ended range evaluates over: its
    /// finite corners, with open ends clipped to the sheet's extent.
    fn source_rect(&self, sheet: SheetId, range: &SheetRange) -> Option<FiniteRange> {
        if let Some(f) = range.to_finite() {
            return Some(f);
        }
        let extent = self.state.sheet(sheet)?.extent()?;
        let end_col = range.end_col.clamp_to(extent.end.col);
        let end_row = range.end_row.clamp_to(extent.end.row);
        if end_col < range.start.col || end_row < range.start.row {
            return None;
        }
        Some(FiniteRange::new(
            range.start,
            Coord::new(end_col, end_row),
        ))
    }

    /// Per-offset value of a spill.
    pub(crate) fn spill_value_at(&self, spill: &SpillResult, x: u32, y: u32) -> CellValue {
        match &spill.source {
            SpillSource::Grid(_) => spill.grid_value_at(x, y).unwrap_or(CellValue::Empty),
            SpillSource::Cells { sheet, range } => {
                let coord = Coord::new(range.start.col + x, range.start.row + y);
                if range.contains(coord) {
                    self.read_cell_quiet(CellId::new(*sheet, coord))
                } else {
                    CellValue::Empty
                }
            }
        }
    }

    pub(crate) fn spill_origin_value(&self, spill: &SpillResult) -> CellValue {
        self.spill_value_at(spill, 0, 0)
    }

    /// Materialize a spill to rows, clipping open ranges to the stored
    /// extent.
    pub(crate) fn materialize(
        &self,
        spill: &SpillResult,
    ) -> Result<Vec<Vec<CellValue>>, CellError> {
        match self.spill_dims(spill)? {
            None => Ok(Vec::new()),
            Some((rows, cols)) => {
                let mut out = Vec::with_capacity(rows as usize);
                for y in 0..rows {
                    let mut row = Vec::with_capacity(cols as usize);
                    for x in 0..cols {
                        row.push(self.spill_value_at(spill, x, y));
                    }
                    out.push(row);
                }
                Ok(out)
            }
        }
    }

    /// A result as a grid: scalars become 1×1.
    pub(crate) fn result_grid(&self, result: EvalResult) -> Result<Vec<Vec<CellValue>>, CellError> {
        match result {
            EvalResult::Value(v) => Ok(vec![vec![v]]),
            EvalResult::Error(e) => Err(e),
            EvalResult::Spill(s) => self.materialize(&s),
        }
    }

    fn spill_blocker(&self, origin: CellId, rect: FiniteRange) -> Option<Coord> {
        let sheet = self.state.sheet(origin.sheet)?;
        for coord in rect.iter_coords() {
            if coord == origin.coord {
                continue;
            }
            if sheet.cells.contains_key(&coord) {
                return Some(coord);
            }
            let cell = CellId::new(origin.sheet, coord);
            if let Some(owner) = self.state.spills.origin_of(cell) {
                if owner != origin && !self.dirty.contains(&owner) {
                    return Some(coord);
                }
            }
        }
        None
    }
}

/* ───────────────────── kernels & helpers ───────────────────── */

fn binary_kernel(op: BinaryOpKind) -> fn(&CellValue, &CellValue) -> CellValue {
    match op {
        BinaryOpKind::Add => arith::add,
        BinaryOpKind::Sub => arith::sub,
        BinaryOpKind::Mul => arith::mul,
        BinaryOpKind::Div => arith::div,
        BinaryOpKind::Pow => arith::pow,
        BinaryOpKind::Concat => arith::concat,
        BinaryOpKind::Eq => |a, b| compare_kernel(a, b, |o| o == std::cmp::Ordering::Equal),
        BinaryOpKind::Ne => |a, b| compare_kernel(a, b, |o| o != std::cmp::Ordering::Equal),
        BinaryOpKind::Lt => |a, b| compare_kernel(a, b, |o| o == std::cmp::Ordering::Less),
        BinaryOpKind::Gt => |a, b| compare_kernel(a, b, |o| o == std::cmp::Ordering::Greater),
        BinaryOpKind::Le => |a, b| compare_kernel(a, b, |o| o != std::cmp::Ordering::Greater),
        BinaryOpKind::Ge => |a, b| compare_kernel(a, b, |o| o != std::cmp::Ordering::Less),
    }
}

fn compare_kernel(
    a: &CellValue,
    b: &CellValue,
    accept: fn(std::cmp::Ordering) -> bool,
) -> CellValue {
    if let CellValue::Error(e) = a {
        return CellValue::Error(e.clone());
    }
    if let CellValue::Error(e) = b {
        return CellValue::Error(e.clone());
    }
    CellValue::Boolean(accept(arith::compare(a, b)))
}

fn grid_dims(grid: &[Vec<CellValue>]) -> (usize, usize) {
    let rows = grid.len().max(1);
    let cols = grid.first().map_or(0, |r| r.len()).max(1);
    (rows, cols)
}

/// Pick the value a grid contributes at `(x, y)`: 1×1 grids replicate,
/// larger grids pad with the empty value outside their bounds.
fn broadcast_pick(grid: &[Vec<CellValue>], rows: usize, cols: usize, x: usize, y: usize) -> CellValue {
    if rows == 1 && cols == 1 {
        return grid
            .first()
            .and_then(|r| r.first())
            .cloned()
            .unwrap_or(CellValue::Empty);
    }
    grid.get(y)
        .and_then(|r| r.get(x))
        .cloned()
        .unwrap_or(CellValue::Empty)
}

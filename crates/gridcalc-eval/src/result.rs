//! Evaluation results: scalar values, spilled rectangles, errors.
//!
//! A spilled result is a protocol, not a materialized array: several
//! sources implement it (range references, array literals, SEQUENCE,
//! FILTER), and consumers either probe single offsets or iterate cells
//! row-major. Range-backed sources stay lazy; grid-backed sources carry
//! their cells.

use gridcalc_common::{AxisEnd, CellError, CellValue, Coord, FiniteRange, SheetRange};

use crate::engine::sheet::{CellId, SheetId};

/// The outcome of evaluating one node.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalResult {
    Value(CellValue),
    Spill(SpillResult),
    Error(CellError),
}

impl EvalResult {
    pub fn from_value(v: CellValue) -> Self {
        match v {
            CellValue::Error(e) => EvalResult::Error(e),
            other => EvalResult::Value(other),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, EvalResult::Error(_))
    }
}

impl From<CellError> for EvalResult {
    fn from(e: CellError) -> Self {
        EvalResult::Error(e)
    }
}

/// Where a spill's per-offset values come from.
#[derive(Debug, Clone, PartialEq)]
pub enum SpillSource {
    /// Lazy view over stored cells: `=A1:B9`, structured references.
    Cells { sheet: SheetId, range: SheetRange },
    /// Materialized rows: array literals, SEQUENCE, FILTER, broadcast
    /// operator results.
    Grid(Vec<Vec<CellValue>>),
}

/// A lazy rectangular result anchored at its origin cell.
#[derive(Debug, Clone, PartialEq)]
pub struct SpillResult {
    /// The rectangle the spill covers, anchored at `origin` (the end may
    /// be open for range-backed sources).
    pub area: SheetRange,
    pub origin: CellId,
    pub source: SpillSource,
}

impl SpillResult {
    pub fn from_grid(origin: CellId, rows: Vec<Vec<CellValue>>) -> Self {
        let height = rows.len().max(1) as u32;
        let width = rows.first().map_or(0, |r| r.len()).max(1) as u32;
        let area = SheetRange::finite(
            origin.coord,
            Coord::new(origin.coord.col + width - 1, origin.coord.row + height - 1),
        );
        SpillResult {
            area,
            origin,
            source: SpillSource::Grid(rows),
        }
    }

    pub fn from_cells(origin: CellId, sheet: SheetId, range: SheetRange) -> Self {
        let end_col = match range.end_col {
            AxisEnd::Finite(c) => AxisEnd::Finite(origin.coord.col + (c - range.start.col)),
            AxisEnd::Open => AxisEnd::Open,
        };
        let end_row = match range.end_row {
            AxisEnd::Finite(r) => AxisEnd::Finite(origin.coord.row + (r - range.start.row)),
            AxisEnd::Open => AxisEnd::Open,
        };
        let area = SheetRange::new(origin.coord, end_col, end_row);
        SpillResult {
            area,
            origin,
            source: SpillSource::Cells { sheet, range },
        }
    }

    /// The rectangle a grid-backed spill occupies. Range-backed areas are
    /// resolved against the stored extent by the interpreter instead.
    pub fn grid_rect(&self) -> Option<FiniteRange> {
        match &self.source {
            SpillSource::Grid(rows) => {
                let height = rows.len().max(1) as u32;
                let width = rows.first().map_or(0, |r| r.len()).max(1) as u32;
                Some(FiniteRange::new(
                    self.origin.coord,
                    Coord::new(
                        self.origin.coord.col + width - 1,
                        self.origin.coord.row + height - 1,
                    ),
                ))
            }
            SpillSource::Cells { .. } => None,
        }
    }

    /// Probe a grid-backed spill at `(x, y)` offsets from the origin.
    /// Range-backed probing needs cell storage and lives on the
    /// interpreter.
    pub fn grid_value_at(&self, x: u32, y: u32) -> Option<CellValue> {
        match &self.source {
            SpillSource::Grid(rows) => Some(
                rows.get(y as usize)
                    .and_then(|r| r.get(x as usize))
                    .cloned()
                    .unwrap_or(CellValue::Empty),
            ),
            SpillSource::Cells { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(col: u32, row: u32) -> CellId {
        CellId {
            sheet: 0,
            coord: Coord::new(col, row),
        }
    }

    #[test]
    fn grid_spill_area_is_anchored_at_origin() {
        let s = SpillResult::from_grid(
            cid(3, 3),
            vec![
                vec![CellValue::Number(1.0), CellValue::Number(2.0)],
                vec![CellValue::Number(3.0), CellValue::Number(4.0)],
                vec![CellValue::Number(5.0), CellValue::Number(6.0)],
            ],
        );
        let rect = s.grid_rect().unwrap();
        assert_eq!(rect.start, Coord::new(3, 3));
        assert_eq!(rect.end, Coord::new(4, 5));
        assert_eq!(s.grid_value_at(1, 2), Some(CellValue::Number(6.0)));
        assert_eq!(s.grid_value_at(5, 5), Some(CellValue::Empty));
    }

    #[test]
    fn range_spill_keeps_open_ends_in_area() {
        let s = SpillResult::from_cells(
            cid(0, 0),
            0,
            SheetRange::new(Coord::new(0, 4), AxisEnd::Finite(1), AxisEnd::Open),
        );
        assert_eq!(s.area.end_col, AxisEnd::Finite(1));
        assert_eq!(s.area.end_row, AxisEnd::Open);
    }
}

//! Spill-producing functions: SEQUENCE and FILTER.

use gridcalc_common::{CellError, CellValue, ErrorKind};

use crate::function::{ArgumentHandle, FnCaps, FnCtx, Function};
use crate::result::EvalResult;

use super::utils::{to_index, to_number};

#[derive(Debug)]
pub struct SequenceFn;

impl Function for SequenceFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE
    }

    fn name(&self) -> &'static str {
        "SEQUENCE"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(4)
    }

    fn eval<'a, 'e>(&self, args: &[ArgumentHandle<'a, 'e>], cx: &FnCtx<'a, 'e>) -> EvalResult {
        // Spilled arguments contribute only their origin value to the
        // parameters, but the largest input spill decides the result
        // area.
        let mut largest: Option<(u64, (u32, u32))> = None;
        for arg in args {
            if let EvalResult::Spill(s) = arg.result() {
                match cx.interp.spill_dims(&s) {
                    Err(e) => return EvalResult::Error(e),
                    Ok(Some((r, c))) => {
                        let count = r as u64 * c as u64;
                        if largest.map_or(true, |(best, _)| count > best) {
                            largest = Some((count, (r, c)));
                        }
                    }
                    Ok(None) => {}
                }
            }
        }

        let param = |idx: usize, default: f64| -> Result<f64, CellError> {
            match args.get(idx) {
                None => Ok(default),
                Some(a) if a.is_missing() => Ok(default),
                Some(a) => match a.value() {
                    CellValue::Empty => Ok(default),
                    v => to_number(&v),
                },
            }
        };

        let rows = match to_index(&args[0].value()) {
            Ok(n) if n >= 1 => n as u32,
            Ok(n) => {
                return EvalResult::Error(
                    CellError::new(ErrorKind::Value).with_message(format!("invalid row count {n}")),
                );
            }
            Err(e) => return EvalResult::Error(e),
        };
        let cols = match args.get(1).filter(|a| !a.is_missing()) {
            None => 1,
            Some(a) => match to_index(&a.value()) {
                Ok(n) if n >= 1 => n as u32,
                Ok(n) => {
                    return EvalResult::Error(
                        CellError::new(ErrorKind::Value)
                            .with_message(format!("invalid column count {n}")),
                    );
                }
                Err(e) => return EvalResult::Error(e),
            },
        };
        let start = match param(2, 1.0) {
            Ok(n) => n,
            Err(e) => return EvalResult::Error(e),
        };
        let step = match param(3, 1.0) {
            Ok(n) => n,
            Err(e) => return EvalResult::Error(e),
        };

        let (out_rows, out_cols) = largest.map(|(_, dims)| dims).unwrap_or((rows, cols));
        let cells = out_rows as u64 * out_cols as u64;
        if cells > cx.interp.max_materialized_cells() as u64 {
            return EvalResult::Error(CellError::new(ErrorKind::Num).with_message(format!(
                "SEQUENCE would produce {cells} cells, over the configured limit"
            )));
        }

        let mut grid = Vec::with_capacity(out_rows as usize);
        for y in 0..out_rows {
            let mut row = Vec::with_capacity(out_cols as usize);
            for x in 0..out_cols {
                if y < rows && x < cols {
                    let k = (y as f64) * (cols as f64) + x as f64;
                    row.push(CellValue::Number(start + step * k));
                } else {
                    row.push(CellValue::Empty);
                }
            }
            grid.push(row);
        }
        cx.spill(grid)
    }
}

#[derive(Debug)]
pub struct FilterFn;

impl Function for FilterFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::LOOKUP
    }

    fn name(&self) -> &'static str {
        "FILTER"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn eval<'a, 'e>(&self, args: &[ArgumentHandle<'a, 'e>], cx: &FnCtx<'a, 'e>) -> EvalResult {
        let source = match cx.grid_of(args[0].result()) {
            Ok(g) => g,
            Err(e) => return EvalResult::Error(e),
        };
        let rows = source.len();
        let cols = source.first().map_or(0, |r| r.len());

        let mut keep = vec![true; rows];
        for cond_arg in &args[1..] {
            let cond = match cx.grid_of(cond_arg.result()) {
                Ok(g) => g,
                Err(e) => return EvalResult::Error(e),
            };
            let cond_cols = cond.first().map_or(0, |r| r.len());
            if cond.len() != rows || (cond_cols != 1 && cond_cols != cols) {
                return EvalResult::Error(CellError::new(ErrorKind::Value).with_message(format!(
                    "condition is {}x{cond_cols}, source is {rows}x{cols}",
                    cond.len()
                )));
            }
            for (y, cond_row) in cond.iter().enumerate() {
                for v in cond_row {
                    match truthy(v) {
                        Ok(pass) => keep[y] = keep[y] && pass,
                        Err(e) => return EvalResult::Error(e),
                    }
                }
            }
        }

        let out: Vec<Vec<CellValue>> = source
            .into_iter()
            .zip(keep)
            .filter_map(|(row, pass)| pass.then_some(row))
            .collect();
        if out.is_empty() {
            return EvalResult::Error(
                CellError::new(ErrorKind::Na).with_message("no rows pass the filter"),
            );
        }
        cx.spill(out)
    }
}

fn truthy(v: &CellValue) -> Result<bool, CellError> {
    match v {
        CellValue::Boolean(b) => Ok(*b),
        CellValue::Number(n) => Ok(*n != 0.0),
        CellValue::Empty => Ok(false),
        CellValue::Error(e) => Err(e.clone()),
        other => Err(CellError::new(ErrorKind::Value)
            .with_message(format!("condition value is {}", other.type_name()))),
    }
}

pub fn register_builtins() {
    use std::sync::Arc;
    crate::function_registry::register_function(Arc::new(SequenceFn));
    crate::function_registry::register_function(Arc::new(FilterFn));
}

#[cfg(test)]
mod tests {
    use crate::test_support::Harness;
    use gridcalc_common::{CellValue, ErrorKind};

    fn err_kind(v: CellValue) -> Option<ErrorKind> {
        match v {
            CellValue::Error(e) => Some(e.kind),
            _ => None,
        }
    }

    #[test]
    fn sequence_row_major() {
        let mut h = Harness::new();
        assert_eq!(h.eval("=INDEX(SEQUENCE(3,2),1,1)"), CellValue::Number(1.0));
        assert_eq!(h.eval("=INDEX(SEQUENCE(3,2),1,2)"), CellValue::Number(2.0));
        assert_eq!(h.eval("=INDEX(SEQUENCE(3,2),3,2)"), CellValue::Number(6.0));
        assert_eq!(h.eval("=SUM(SEQUENCE(4))"), CellValue::Number(10.0));
        assert_eq!(h.eval("=SUM(SEQUENCE(3,1,10,5))"), CellValue::Number(45.0));
        assert_eq!(err_kind(h.eval("=SEQUENCE(0)")), Some(ErrorKind::Value));
    }

    #[test]
    fn filter_rows() {
        let mut h = Harness::new();
        for (i, (v, flag)) in [(1.0, 0.0), (2.0, 1.0), (3.0, 1.0)].iter().enumerate() {
            h.set(&format!("A{}", i + 1), *v);
            h.set(&format!("B{}", i + 1), *flag);
        }
        assert_eq!(h.eval("=SUM(FILTER(A1:A3,B1:B3))"), CellValue::Number(5.0));
        assert_eq!(
            err_kind(h.eval("=FILTER(A1:A3,B1:B2)")),
            Some(ErrorKind::Value)
        );
        h.set("B2", 0.0);
        h.set("B3", 0.0);
        assert_eq!(err_kind(h.eval("=FILTER(A1:A3,B1:B3)")), Some(ErrorKind::Na));
    }

    #[test]
    fn filter_multiple_conditions() {
        let mut h = Harness::new();
        for (i, (v, f1, f2)) in [(1.0, 1.0, 1.0), (2.0, 1.0, 0.0), (3.0, 1.0, 1.0)]
            .iter()
            .enumerate()
        {
            h.set(&format!("A{}", i + 1), *v);
            h.set(&format!("B{}", i + 1), *f1);
            h.set(&format!("C{}", i + 1), *f2);
        }
        assert_eq!(
            h.eval("=SUM(FILTER(A1:A3,B1:B3,C1:C3))"),
            CellValue::Number(4.0)
        );
    }
}

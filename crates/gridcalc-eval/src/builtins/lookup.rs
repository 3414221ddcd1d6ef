//! MATCH and INDEX.
//!
//! MATCH with match type `1` requires an ascending array and returns the
//! last position whose value is `≤` the lookup; `-1` requires descending
//! and returns the position of the smallest value `≥` the lookup; `0` is
//! exact equality on the value discriminator. A miss is `#N/A`; the
//! lookup and every scanned element must be a number or string.

use std::cmp::Ordering;

use gridcalc_common::arith::{compare, wildcard_match};
use gridcalc_common::{CellError, CellValue, ErrorKind};

use crate::function::{ArgumentHandle, FnCaps, FnCtx, Function};
use crate::result::EvalResult;

use super::utils::{flatten, to_index};

fn matchable(v: &CellValue) -> Result<(), CellError> {
    match v {
        CellValue::Number(n) if !n.is_nan() => Ok(()),
        CellValue::Text(_) => Ok(()),
        CellValue::Error(e) => Err(e.clone()),
        other => Err(CellError::new(ErrorKind::Value)
            .with_message(format!("cannot match against {}", other.type_name()))),
    }
}

fn exact_eq(a: &CellValue, b: &CellValue) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
        && compare(a, b) == Ordering::Equal
}

#[derive(Debug)]
pub struct MatchFn;

impl Function for MatchFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::LOOKUP
    }

    fn name(&self) -> &'static str {
        "MATCH"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(3)
    }

    fn eval<'a, 'e>(&self, args: &[ArgumentHandle<'a, 'e>], cx: &FnCtx<'a, 'e>) -> EvalResult {
        let lookup = args[0].value();
        if let Err(e) = matchable(&lookup) {
            return EvalResult::Error(e);
        }
        let array = match cx.grid_of(args[1].result()) {
            Ok(rows) => flatten(rows),
            Err(e) => return EvalResult::Error(e),
        };
        let match_type = match args.get(2) {
            None => 1,
            Some(a) if a.is_missing() => 1,
            Some(a) => match to_index(&a.value()) {
                Ok(t @ (-1 | 0 | 1)) => t,
                Ok(other) => {
                    return EvalResult::Error(
                        CellError::new(ErrorKind::Value)
                            .with_message(format!("invalid match type {other}")),
                    );
                }
                Err(e) => return EvalResult::Error(e),
            },
        };

        for v in &array {
            if let Err(e) = matchable(v) {
                return EvalResult::Error(e);
            }
        }

        let found = match match_type {
            // Exact mode honours `?`/`*` wildcards in a text lookup.
            0 => match &lookup {
                CellValue::Text(pat) if pat.contains(['*', '?']) => {
                    array.iter().position(|v| match v {
                        CellValue::Text(s) => wildcard_match(pat, s),
                        _ => false,
                    })
                }
                _ => array.iter().position(|v| exact_eq(v, &lookup)),
            },
            1 => {
                // ascending: last value ≤ lookup
                let mut best = None;
                for (i, v) in array.iter().enumerate() {
                    if compare(v, &lookup) != Ordering::Greater {
                        best = Some(i);
                    }
                }
                best
            }
            _ => {
                // descending: the smallest value ≥ lookup, i.e. the last
                // position still ≥ it
                let mut best = None;
                for (i, v) in array.iter().enumerate() {
                    if compare(v, &lookup) != Ordering::Less {
                        best = Some(i);
                    } else {
                        break;
                    }
                }
                best
            }
        };

        match found {
            Some(i) => EvalResult::Value(CellValue::Number((i + 1) as f64)),
            None => EvalResult::Error(
                CellError::new(ErrorKind::Na).with_message("no match found"),
            ),
        }
    }
}

#[derive(Debug)]
pub struct IndexFn;

impl Function for IndexFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::LOOKUP
    }

    fn name(&self) -> &'static str {
        "INDEX"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(3)
    }

    fn eval<'a, 'e>(&self, args: &[ArgumentHandle<'a, 'e>], cx: &FnCtx<'a, 'e>) -> EvalResult {
        let grid = match cx.grid_of(args[0].result()) {
            Ok(g) => g,
            Err(e) => return EvalResult::Error(e),
        };
        let rows = grid.len();
        let cols = grid.first().map_or(0, |r| r.len());

        let first = match to_index(&args[1].value()) {
            Ok(n) => n,
            Err(e) => return EvalResult::Error(e),
        };
        let second = match args.get(2) {
            None => None,
            Some(a) if a.is_missing() => None,
            Some(a) => match to_index(&a.value()) {
                Ok(n) => Some(n),
                Err(e) => return EvalResult::Error(e),
            },
        };

        // A single row vector indexed with one number walks its columns.
        let (row_num, col_num) = match second {
            Some(c) => (first, c),
            None if rows == 1 && cols > 1 => (1, first),
            None => (first, 1),
        };

        if row_num < 1 || row_num as usize > rows || col_num < 1 || col_num as usize > cols {
            return EvalResult::Error(CellError::new(ErrorKind::Ref).with_message(format!(
                "index ({row_num},{col_num}) is outside the {rows}x{cols} array"
            )));
        }
        EvalResult::from_value(grid[row_num as usize - 1][col_num as usize - 1].clone())
    }
}

pub fn register_builtins() {
    use std::sync::Arc;
    crate::function_registry::register_function(Arc::new(MatchFn));
    crate::function_registry::register_function(Arc::new(IndexFn));
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
    fn match_exact() {
        let mut h = Harness::new();
        h.set("A1", 10.0);
        h.set("A2", 20.0);
        h.set("A3", 30.0);
        assert_eq!(h.eval("=MATCH(20,A1:A3,0)"), CellValue::Number(2.0));
        assert_eq!(err_kind(h.eval("=MATCH(25,A1:A3,0)")), Some(ErrorKind::Na));
        // exact match distinguishes discriminators: "20" is not 20
        h.set("B1", "20");
        assert_eq!(err_kind(h.eval("=MATCH(20,B1:B1,0)")), Some(ErrorKind::Na));
    }

    #[test]
    fn match_ascending_and_descending() {
        let mut h = Harness::new();
        for (i, v) in [10.0, 20.0, 30.0, 40.0].iter().enumerate() {
            h.set(&format!("A{}", i + 1), *v);
        }
        assert_eq!(h.eval("=MATCH(25,A1:A4,1)"), CellValue::Number(2.0));
        assert_eq!(h.eval("=MATCH(40,A1:A4,1)"), CellValue::Number(4.0));
        assert_eq!(h.eval("=MATCH(25,A1:A4)"), CellValue::Number(2.0));
        assert_eq!(err_kind(h.eval("=MATCH(5,A1:A4,1)")), Some(ErrorKind::Na));

        for (i, v) in [40.0, 30.0, 20.0, 10.0].iter().enumerate() {
            h.set(&format!("B{}", i + 1), *v);
        }
        assert_eq!(h.eval("=MATCH(25,B1:B4,-1)"), CellValue::Number(2.0));
        assert_eq!(h.eval("=MATCH(30,B1:B4,-1)"), CellValue::Number(2.0));
        assert_eq!(err_kind(h.eval("=MATCH(50,B1:B4,-1)")), Some(ErrorKind::Na));
    }

    #[test]
    fn match_exact_with_wildcards() {
        let mut h = Harness::new();
        h.set("A1", "apple");
        h.set("A2", "banana");
        h.set("A3", "cherry");
        assert_eq!(h.eval("=MATCH(\"ban*\",A1:A3,0)"), CellValue::Number(2.0));
        assert_eq!(h.eval("=MATCH(\"?herry\",A1:A3,0)"), CellValue::Number(3.0));
        assert_eq!(err_kind(h.eval("=MATCH(\"x*\",A1:A3,0)")), Some(ErrorKind::Na));
    }

    #[test]
    fn match_rejects_non_scalar_types() {
        let mut h = Harness::new();
        h.set("A1", true);
        assert_eq!(
            err_kind(h.eval("=MATCH(1,A1:A1,0)")),
            Some(ErrorKind::Value)
        );
        assert_eq!(
            err_kind(h.eval("=MATCH(TRUE,{1,2},0)")),
            Some(ErrorKind::Value)
        );
    }

    #[test]
    fn index_contract() {
        let mut h = Harness::new();
        assert_eq!(h.eval("=INDEX({1,2;3,4},2,1)"), CellValue::Number(3.0));
        assert_eq!(h.eval("=INDEX({1,2;3,4},1,2)"), CellValue::Number(2.0));
        assert_eq!(err_kind(h.eval("=INDEX({1,2;3,4},3,1)")), Some(ErrorKind::Ref));
        assert_eq!(err_kind(h.eval("=INDEX({1,2;3,4},0,1)")), Some(ErrorKind::Ref));
        // row vector walks columns with a single index
        assert_eq!(h.eval("=INDEX({1,2,3},2)"), CellValue::Number(2.0));
        // single-value arrays only accept (1,1)
        assert_eq!(h.eval("=INDEX(7,1,1)"), CellValue::Number(7.0));
        assert_eq!(err_kind(h.eval("=INDEX(7,2,1)")), Some(ErrorKind::Ref));
    }
}

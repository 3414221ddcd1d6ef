//! Numeric reducers and scalar math.

use gridcalc_common::arith;
use gridcalc_common::{CellError, CellValue, ErrorKind, Sign};

use crate::function::{ArgumentHandle, FnCaps, FnCtx, Function};
use crate::result::EvalResult;

use super::utils::to_number;

#[derive(Debug)]
pub struct SumFn;

impl Function for SumFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::REDUCTION
    }

    fn name(&self) -> &'static str {
        "SUM"
    }

    fn eval<'a, 'e>(&self, args: &[ArgumentHandle<'a, 'e>], cx: &FnCtx<'a, 'e>) -> EvalResult {
        let mut acc = CellValue::Number(0.0);
        for arg in args {
            match arg.result() {
                EvalResult::Error(e) => return EvalResult::Error(e),
                EvalResult::Value(v) => {
                    // Direct scalar arguments are numeric-coerced; a
                    // boolean counts as 0/1.
                    let n = match &v {
                        CellValue::Boolean(b) => CellValue::Number(if *b { 1.0 } else { 0.0 }),
                        other => other.clone(),
                    };
                    acc = arith::add(&acc, &n);
                }
                EvalResult::Spill(s) => {
                    let rows = match cx.interp.materialize(&s) {
                        Ok(rows) => rows,
                        Err(e) => return EvalResult::Error(e),
                    };
                    for v in rows.into_iter().flatten() {
                        match v {
                            CellValue::Number(_) | CellValue::Infinity(_) => {
                                acc = arith::add(&acc, &v);
                            }
                            CellValue::Error(e) => return EvalResult::Error(e),
                            // Text, booleans, and blanks inside ranges
                            // are not numeric leaves.
                            _ => {}
                        }
                    }
                }
            }
            if let CellValue::Error(e) = acc {
                return EvalResult::Error(e);
            }
        }
        EvalResult::from_value(acc)
    }
}

#[derive(Debug)]
pub struct CountFn;

impl Function for CountFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::REDUCTION
    }

    fn name(&self) -> &'static str {
        "COUNT"
    }

    fn eval<'a, 'e>(&self, args: &[ArgumentHandle<'a, 'e>], cx: &FnCtx<'a, 'e>) -> EvalResult {
        let mut count = 0u64;
        for arg in args {
            match arg.result() {
                // COUNT ignores errors rather than propagating them.
                EvalResult::Error(_) => {}
                EvalResult::Value(v) => {
                    if matches!(v, CellValue::Number(_) | CellValue::Infinity(_)) {
                        count += 1;
                    }
                }
                EvalResult::Spill(s) => match cx.interp.materialize(&s) {
                    Err(_) => {}
                    Ok(rows) => {
                        for v in rows.into_iter().flatten() {
                            if matches!(v, CellValue::Number(_) | CellValue::Infinity(_)) {
                                count += 1;
                            }
                        }
                    }
                },
            }
        }
        EvalResult::Value(CellValue::Number(count as f64))
    }
}

#[derive(Debug)]
pub struct AbsFn;

impl Function for AbsFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::ELEMENTWISE
    }

    fn name(&self) -> &'static str {
        "ABS"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn eval<'a, 'e>(&self, args: &[ArgumentHandle<'a, 'e>], cx: &FnCtx<'a, 'e>) -> EvalResult {
        let kernel = |v: &CellValue, _: &CellValue| -> CellValue {
            match v {
                CellValue::Error(e) => CellValue::Error(e.clone()),
                CellValue::Infinity(_) => CellValue::Infinity(Sign::Pos),
                other => match to_number(other) {
                    Ok(n) => CellValue::Number(n.abs()),
                    Err(e) => CellValue::Error(e),
                },
            }
        };
        match args[0].result() {
            EvalResult::Error(e) => EvalResult::Error(e),
            EvalResult::Value(v) => {
                EvalResult::from_value(kernel(&v, &CellValue::Empty))
            }
            spill => cx.broadcast2(spill, EvalResult::Value(CellValue::Empty), &kernel),
        }
    }
}

/// Collect the numeric leaves of the arguments: scalars coerce (booleans
/// as 0/1), range cells contribute only numbers and infinities, and the
/// first error wins.
fn numeric_leaves<'a, 'e>(
    args: &[ArgumentHandle<'a, 'e>],
    cx: &FnCtx<'a, 'e>,
) -> Result<Vec<CellValue>, CellValue> {
    let mut out = Vec::new();
    for arg in args {
        match arg.result() {
            EvalResult::Error(e) => return Err(CellValue::Error(e)),
            EvalResult::Value(v) => match v {
                CellValue::Boolean(b) => {
                    out.push(CellValue::Number(if b { 1.0 } else { 0.0 }))
                }
                CellValue::Number(_) | CellValue::Infinity(_) => out.push(v),
                CellValue::Empty => {}
                CellValue::Error(e) => return Err(CellValue::Error(e)),
                other => {
                    return Err(CellValue::error(
                        CellError::new(ErrorKind::Value).with_message(format!(
                            "expected a number, got {}",
                            other.type_name()
                        )),
                    ));
                }
            },
            EvalResult::Spill(s) => {
                let rows = match cx.interp.materialize(&s) {
                    Ok(rows) => rows,
                    Err(e) => return Err(CellValue::Error(e)),
                };
                for v in rows.into_iter().flatten() {
                    match v {
                        CellValue::Number(_) | CellValue::Infinity(_) => out.push(v),
                        CellValue::Error(e) => return Err(CellValue::Error(e)),
                        _ => {}
                    }
                }
            }
        }
    }
    Ok(out)
}

/// MIN and MAX share one extremum reducer over the total value order.
#[derive(Debug)]
struct ExtremumFn {
    name: &'static str,
    want: std::cmp::Ordering,
}

impl Function for ExtremumFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::REDUCTION
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn eval<'a, 'e>(&self, args: &[ArgumentHandle<'a, 'e>], cx: &FnCtx<'a, 'e>) -> EvalResult {
        let values = match numeric_leaves(args, cx) {
            Ok(v) => v,
            Err(e) => return EvalResult::from_value(e),
        };
        let mut best: Option<CellValue> = None;
        for v in values {
            best = Some(match best {
                None => v,
                Some(b) => {
                    if arith::compare(&v, &b) == self.want {
                        v
                    } else {
                        b
                    }
                }
            });
        }
        EvalResult::Value(best.unwrap_or(CellValue::Number(0.0)))
    }
}

#[derive(Debug)]
pub struct AverageFn;

impl Function for AverageFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::REDUCTION
    }

    fn name(&self) -> &'static str {
        "AVERAGE"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn eval<'a, 'e>(&self, args: &[ArgumentHandle<'a, 'e>], cx: &FnCtx<'a, 'e>) -> EvalResult {
        let values = match numeric_leaves(args, cx) {
            Ok(v) => v,
            Err(e) => return EvalResult::from_value(e),
        };
        if values.is_empty() {
            return EvalResult::Error(
                CellError::new(ErrorKind::Div0).with_message("AVERAGE of no numeric values"),
            );
        }
        let mut acc = CellValue::Number(0.0);
        for v in &values {
            acc = arith::add(&acc, v);
        }
        let count = CellValue::Number(values.len() as f64);
        EvalResult::from_value(arith::div(&acc, &count))
    }
}

pub fn register_builtins() {
    use std::sync::Arc;
    crate::function_registry::register_function(Arc::new(SumFn));
    crate::function_registry::register_function(Arc::new(CountFn));
    crate::function_registry::register_function(Arc::new(AbsFn));
    crate::function_registry::register_function(Arc::new(ExtremumFn {
        name: "MIN",
        want: std::cmp::Ordering::Less,
    }));
    crate::function_registry::register_function(Arc::new(ExtremumFn {
        name: "MAX",
        want: std::cmp::Ordering::Greater,
    }));
    crate::function_registry::register_function(Arc::new(AverageFn));
}

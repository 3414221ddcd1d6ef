//! Logical functions. IF and IFERROR receive raw nodes and only evaluate
//! the branch they take; AND/OR fold the logical leaves of their
//! arguments.

use gridcalc_common::{CellError, CellValue, ErrorKind};

use crate::function::{ArgumentHandle, FnCaps, FnCtx, Function};
use crate::result::EvalResult;

#[derive(Debug)]
pub struct IfFn;

impl Function for IfFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE
    }

    fn name(&self) -> &'static str {
        "IF"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(3)
    }

    fn eval<'a, 'e>(&self, args: &[ArgumentHandle<'a, 'e>], _cx: &FnCtx<'a, 'e>) -> EvalResult {
        let cond = match args[0].value() {
            CellValue::Error(e) => return EvalResult::Error(e),
            CellValue::Boolean(b) => b,
            CellValue::Number(n) => n != 0.0,
            CellValue::Infinity(_) => true,
            CellValue::Empty => false,
            other => {
                return EvalResult::Error(
                    CellError::new(ErrorKind::Value)
                        .with_message(format!("condition is {}", other.type_name())),
                );
            }
        };
        if cond {
            args[1].result()
        } else {
            match args.get(2) {
                Some(arg) if !arg.is_missing() => arg.result(),
                _ => EvalResult::Value(CellValue::Boolean(false)),
            }
        }
    }
}

#[derive(Debug)]
pub struct IfErrorFn;

impl Function for IfErrorFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE
    }

    fn name(&self) -> &'static str {
        "IFERROR"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }

    fn eval<'a, 'e>(&self, args: &[ArgumentHandle<'a, 'e>], _cx: &FnCtx<'a, 'e>) -> EvalResult {
        match args[0].result() {
            EvalResult::Error(_) => args[1].result(),
            ok => ok,
        }
    }
}

/// Collect the logical leaves of the arguments: scalars must be booleans
/// or numbers; range cells contribute only booleans and numbers.
fn logical_leaves<'a, 'e>(
    args: &[ArgumentHandle<'a, 'e>],
    cx: &FnCtx<'a, 'e>,
) -> Result<Vec<bool>, CellError> {
    let mut out = Vec::new();
    for arg in args {
        match arg.result() {
            EvalResult::Error(e) => return Err(e),
            EvalResult::Value(v) => match v {
                CellValue::Boolean(b) => out.push(b),
                CellValue::Number(n) => out.push(n != 0.0),
                CellValue::Infinity(_) => out.push(true),
                CellValue::Empty => {}
                CellValue::Error(e) => return Err(e),
                other => {
                    return Err(CellError::new(ErrorKind::Value).with_message(format!(
                        "expected a logical value, got {}",
                        other.type_name()
                    )));
                }
            },
            EvalResult::Spill(s) => {
                let rows = cx.interp.materialize(&s)?;
                for v in rows.into_iter().flatten() {
                    match v {
                        CellValue::Boolean(b) => out.push(b),
                        CellValue::Number(n) => out.push(n != 0.0),
                        CellValue::Error(e) => return Err(e),
                        _ => {}
                    }
                }
            }
        }
    }
    if out.is_empty() {
        return Err(CellError::new(ErrorKind::Value)
            .with_message("no logical values among the arguments"));
    }
    Ok(out)
}

/// AND and OR share one fold over the logical leaves.
#[derive(Debug)]
struct LogicalFoldFn {
    name: &'static str,
    identity: bool,
}

impl Function for LogicalFoldFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::REDUCTION
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn min_args(&self) -> usize {
        1
    }

    fn eval<'a, 'e>(&self, args: &[ArgumentHandle<'a, 'e>], cx: &FnCtx<'a, 'e>) -> EvalResult {
        match logical_leaves(args, cx) {
            Err(e) => EvalResult::Error(e),
            Ok(values) => {
                let folded = if self.identity {
                    values.into_iter().all(|b| b)
                } else {
                    values.into_iter().any(|b| b)
                };
                EvalResult::Value(CellValue::Boolean(folded))
            }
        }
    }
}

#[derive(Debug)]
pub struct NotFn;

impl Function for NotFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE
    }

    fn name(&self) -> &'static str {
        "NOT"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn eval<'a, 'e>(&self, args: &[ArgumentHandle<'a, 'e>], _cx: &FnCtx<'a, 'e>) -> EvalResult {
        match args[0].value() {
            CellValue::Error(e) => EvalResult::Error(e),
            CellValue::Boolean(b) => EvalResult::Value(CellValue::Boolean(!b)),
            CellValue::Number(n) => EvalResult::Value(CellValue::Boolean(n == 0.0)),
            CellValue::Empty => EvalResult::Value(CellValue::Boolean(true)),
            other => EvalResult::Error(CellError::new(ErrorKind::Value).with_message(format!(
                "expected a logical value, got {}",
                other.type_name()
            ))),
        }
    }
}

pub fn register_builtins() {
    use std::sync::Arc;
    crate::function_registry::register_function(Arc::new(IfFn));
    crate::function_registry::register_function(Arc::new(IfErrorFn));
    crate::function_registry::register_function(Arc::new(LogicalFoldFn {
        name: "AND",
        identity: true,
    }));
    crate::function_registry::register_function(Arc::new(LogicalFoldFn {
        name: "OR",
        identity: false,
    }));
    crate::function_registry::register_function(Arc::new(NotFn));
}

#[cfg(test)]
mod tests {
    use crate::test_support::Harness;
    use gridcalc_common::CellValue;

    #[test]
    fn if_takes_only_one_branch() {
        let mut h = Harness::new();
        assert_eq!(h.eval("=IF(1>0,\"yes\",\"no\")"), CellValue::from("yes"));
        assert_eq!(h.eval("=IF(1<0,\"yes\",\"no\")"), CellValue::from("no"));
        assert_eq!(h.eval("=IF(FALSE,1)"), CellValue::Boolean(false));
        // the untaken branch is never evaluated, so its error is invisible
        assert_eq!(h.eval("=IF(TRUE,1,1/0*0)"), CellValue::Number(1.0));
    }

    #[test]
    fn and_or_not() {
        let mut h = Harness::new();
        assert_eq!(h.eval("=AND(TRUE,1,2)"), CellValue::Boolean(true));
        assert_eq!(h.eval("=AND(TRUE,0)"), CellValue::Boolean(false));
        assert_eq!(h.eval("=OR(FALSE,0)"), CellValue::Boolean(false));
        assert_eq!(h.eval("=OR(FALSE,3)"), CellValue::Boolean(true));
        assert_eq!(h.eval("=NOT(FALSE)"), CellValue::Boolean(true));
        assert_eq!(h.eval("=NOT(2)"), CellValue::Boolean(false));

        // text leaves inside ranges are skipped; bare text errors
        h.set("A1", true);
        h.set("A2", "note");
        h.set("A3", false);
        assert_eq!(h.eval("=OR(A1:A3)"), CellValue::Boolean(true));
        assert_eq!(h.eval("=AND(A1:A3)"), CellValue::Boolean(false));
        assert!(matches!(h.eval("=AND(\"x\")"), CellValue::Error(_)));
    }

    #[test]
    fn iferror_catches() {
        let mut h = Harness::new();
        assert_eq!(h.eval("=IFERROR(1/0*0,42)"), CellValue::Number(42.0));
        assert_eq!(h.eval("=IFERROR(7,42)"), CellValue::Number(7.0));
        assert_eq!(h.eval("=IFERROR(#N/A,\"fallback\")"), CellValue::from("fallback"));
    }
}

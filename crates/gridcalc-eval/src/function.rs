//! The `Function` trait: object-safe dispatch target for every builtin.
//!
//! Functions receive raw argument nodes through [`ArgumentHandle`]s and a
//! context that can evaluate them, which keeps argument evaluation lazy —
//! `IF` only evaluates the taken branch, and spilled-aware reducers pull
//! cells without materializing when they can.

use gridcalc_common::{CellError, CellValue, ErrorKind};
use gridcalc_parse::Expr;

use crate::interpreter::{EvalScope, Interpreter};
use crate::result::EvalResult;

bitflags::bitflags! {
    /// Capability flags describing a function's evaluation shape.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct FnCaps: u8 {
        /// Same inputs, same output, no side effects.
        const PURE        = 0b0000_0001;
        /// Output may change between evaluations of the same inputs.
        const VOLATILE    = 0b0000_0010;
        /// Reduces its inputs to one scalar (SUM, COUNT, MATCH).
        const REDUCTION   = 0b0000_0100;
        /// Applies per cell and broadcasts over spilled arguments (LEFT).
        const ELEMENTWISE = 0b0000_1000;
        /// Searches or indexes its inputs (MATCH, INDEX, FILTER).
        const LOOKUP      = 0b0001_0000;
    }
}

/// Evaluation context handed to function bodies.
pub struct FnCtx<'a, 'e> {
    pub(crate) interp: &'a Interpreter<'e>,
    pub(crate) scope: &'a EvalScope,
}

impl<'a, 'e> FnCtx<'a, 'e> {
    pub(crate) fn new(interp: &'a Interpreter<'e>, scope: &'a EvalScope) -> Self {
        FnCtx { interp, scope }
    }

    pub(crate) fn origin(&self) -> crate::engine::sheet::CellId {
        crate::engine::sheet::CellId::new(self.scope.sheet, self.scope.at)
    }

    /// Materialize a result as rows; scalars become 1×1.
    pub(crate) fn grid_of(
        &self,
        result: EvalResult,
    ) -> Result<Vec<Vec<CellValue>>, CellError> {
        self.interp.result_grid(result)
    }

    /// Wrap rows as a spill anchored at the current cell.
    pub(crate) fn spill(&self, rows: Vec<Vec<CellValue>>) -> EvalResult {
        EvalResult::Spill(crate::result::SpillResult::from_grid(self.origin(), rows))
    }

    /// Elementwise broadcast of a scalar kernel over two results.
    pub(crate) fn broadcast2(
        &self,
        a: EvalResult,
        b: EvalResult,
        kernel: &dyn Fn(&CellValue, &CellValue) -> CellValue,
    ) -> EvalResult {
        self.interp.broadcast_binary(kernel, a, b, self.scope)
    }
}

/// Lazy handle over one argument node.
pub struct ArgumentHandle<'a, 'e> {
    node: &'a Expr,
    cx: &'a FnCtx<'a, 'e>,
}

impl<'a, 'e> ArgumentHandle<'a, 'e> {
    pub(crate) fn new(node: &'a Expr, cx: &'a FnCtx<'a, 'e>) -> Self {
        ArgumentHandle { node, cx }
    }

    /// Evaluate to a full result (scalar, spill, or error).
    pub fn result(&self) -> EvalResult {
        self.cx.interp.evaluate_expr(self.node, self.cx.scope)
    }

    /// Evaluate and collapse to a scalar: a spill contributes its origin
    /// value; errors come back as error values.
    pub fn value(&self) -> CellValue {
        match self.result() {
            EvalResult::Value(v) => v,
            EvalResult::Error(e) => CellValue::Error(e),
            EvalResult::Spill(s) => self.cx.interp.spill_origin_value(&s),
        }
    }

    /// The argument was written empty (`F(a,,b)` or a missing optional).
    pub fn is_missing(&self) -> bool {
        self.node.is_empty()
    }

    pub fn node(&self) -> &'a Expr {
        self.node
    }
}

/// A spreadsheet function. Implementations are registered in the global
/// registry and dispatched by uppercased name.
pub trait Function: Send + Sync + 'static {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE
    }

    fn name(&self) -> &'static str;

    fn min_args(&self) -> usize {
        0
    }

    fn max_args(&self) -> Option<usize> {
        None
    }

    fn volatile(&self) -> bool {
        self.caps().contains(FnCaps::VOLATILE)
    }

    fn eval<'a, 'e>(&self, args: &[ArgumentHandle<'a, 'e>], cx: &FnCtx<'a, 'e>) -> EvalResult;

    /// Arity check + body. The engine calls this, not `eval` directly.
    fn dispatch<'a, 'e>(&self, args: &[ArgumentHandle<'a, 'e>], cx: &FnCtx<'a, 'e>) -> EvalResult {
        if args.len() < self.min_args() {
            return EvalResult::Error(CellError::new(ErrorKind::Value).with_message(format!(
                "{} expects at least {} argument(s), got {}",
                self.name(),
                self.min_args(),
                args.len()
            )));
        }
        if let Some(max) = self.max_args() {
            if args.len() > max {
                return EvalResult::Error(CellError::new(ErrorKind::Value).with_message(
                    format!(
                        "{} expects at most {} argument(s), got {}",
                        self.name(),
                        max,
                        args.len()
                    ),
                ));
            }
        }
        self.eval(args, cx)
    }
}

//! Reference rewriters: relative shifting for autofill, sheet rename, and
//! workbook rename.
//!
//! Each rewriter parses the formula body (no leading `=`), transforms the
//! tree, and reformats. Any parse failure returns the original text
//! unchanged — preserving what the user typed wins over silent
//! corruption.

use crate::ast::{Expr, ExprKind};
use crate::formatter::format;
use crate::parser::parse;
use crate::traverse::transform;
use gridcalc_common::{AxisEnd, Coord, ErrorKind, SheetRange};

/// Shift every non-absolute reference component by `(dc, dr)`. Absolute
/// components and open range ends are untouched; a component pushed off
/// the grid becomes a `#REF!` literal.
pub fn shift_relative(src: &str, dc: i64, dr: i64) -> String {
    rewrite(src, &|expr| shift_node(expr, dc, dr))
}

/// Replace `old` with `new` in every sheet position, including both
/// endpoints of 3D ranges independently.
pub fn rename_sheet(src: &str, old: &str, new: &str) -> String {
    rewrite(src, &|mut expr| {
        let rename = |s: &mut Option<String>| {
            if s.as_deref() == Some(old) {
                *s = Some(new.to_string());
            }
        };
        match &mut expr.kind {
            ExprKind::Reference { sheet, .. }
            | ExprKind::Range { sheet, .. }
            | ExprKind::NamedExpr { sheet, .. }
            | ExprKind::StructuredRef { sheet, .. } => rename(sheet),
            ExprKind::ThreeDRange {
                start_sheet,
                end_sheet,
                ..
            } => {
                if start_sheet == old {
                    *start_sheet = new.to_string();
                }
                if end_sheet == old {
                    *end_sheet = new.to_string();
                }
            }
            _ => {}
        }
        expr
    })
}

/// Replace `old` with `new` in every workbook position.
pub fn rename_workbook(src: &str, old: &str, new: &str) -> String {
    rewrite(src, &|mut expr| {
        let workbook = match &mut expr.kind {
            ExprKind::Reference { workbook, .. }
            | ExprKind::Range { workbook, .. }
            | ExprKind::NamedExpr { workbook, .. }
            | ExprKind::StructuredRef { workbook, .. }
            | ExprKind::ThreeDRange { workbook, .. } => Some(workbook),
            _ => None,
        };
        if let Some(wb) = workbook {
            if wb.as_deref() == Some(old) {
                *wb = Some(new.to_string());
            }
        }
        expr
    })
}

/// Replace `old` with `new` in every table position of a structured
/// reference.
pub fn rename_table(src: &str, old: &str, new: &str) -> String {
    rewrite(src, &|mut expr| {
        if let ExprKind::StructuredRef { table, .. } = &mut expr.kind {
            if table.as_deref() == Some(old) {
                *table = Some(new.to_string());
            }
        }
        expr
    })
}

fn rewrite(src: &str, f: &impl Fn(Expr) -> Expr) -> String {
    match parse(src) {
        Ok(tree) => format(&transform(tree, f)),
        Err(_) => src.to_string(),
    }
}

fn shift_node(mut expr: Expr, dc: i64, dr: i64) -> Expr {
    match &mut expr.kind {
        ExprKind::Reference { addr, abs, .. } => {
            let moved = addr.offset(
                if abs.col { 0 } else { dc },
                if abs.row { 0 } else { dr },
            );
            match moved {
                Some(next) => *addr = next,
                None => return off_grid(expr.span),
            }
        }
        ExprKind::Range { range, abs, .. } => {
            let start = range.start.offset(
                if abs.start.col { 0 } else { dc },
                if abs.start.row { 0 } else { dr },
            );
            let start = match start {
                Some(s) => s,
                None => return off_grid(expr.span),
            };
            let end_col = match range.end_col {
                AxisEnd::Open => AxisEnd::Open,
                AxisEnd::Finite(c) if abs.end.col => AxisEnd::Finite(c),
                AxisEnd::Finite(c) => match shift_index(c, dc) {
                    Some(c) => AxisEnd::Finite(c),
                    None => return off_grid(expr.span),
                },
            };
            let end_row = match range.end_row {
                AxisEnd::Open => AxisEnd::Open,
                AxisEnd::Finite(r) if abs.end.row => AxisEnd::Finite(r),
                AxisEnd::Finite(r) => match shift_index(r, dr) {
                    Some(r) => AxisEnd::Finite(r),
                    None => return off_grid(expr.span),
                },
            };
            *range = SheetRange::new(Coord::new(start.col, start.row), end_col, end_row);
        }
        _ => {}
    }
    expr
}

fn shift_index(idx: u32, delta: i64) -> Option<u32> {
    let shifted = idx as i64 + delta;
    if (0..=u32::MAX as i64).contains(&shifted) {
        Some(shifted as u32)
    } else {
        None
    }
}

fn off_grid(span: Option<crate::tokenizer::Span>) -> Expr {
    Expr::new(
        ExprKind::Error {
            code: ErrorKind::Ref,
            message: "#REF!".to_string(),
        },
        span,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_honours_absolute_flags() {
        assert_eq!(shift_relative("A1+$B$2", 1, 2), "B3+$B$2");
        assert_eq!(shift_relative("A$1+$B2", 1, 2), "B$1+$B4");
        assert_eq!(shift_relative("SUM(A1:B2)", 2, 0), "SUM(C1:D2)");
        assert_eq!(shift_relative("SUM($A$1:B2)", 1, 1), "SUM($A$1:C3)");
    }

    #[test]
    fn shift_leaves_open_ends_alone() {
        assert_eq!(shift_relative("SUM(A1:A)", 1, 5), "SUM(B6:B)");
        assert_eq!(shift_relative("SUM(A5:INFINITY)", 1, 1), "SUM(B6:INFINITY)");
        assert_eq!(shift_relative("SUM(A5:15)", 0, 1), "SUM(A6:16)");
    }

    #[test]
    fn shift_off_grid_becomes_ref_error() {
        assert_eq!(shift_relative("A1", -1, 0), "#REF!");
        assert_eq!(shift_relative("A1+B2", 0, -1), "#REF!+B1");
    }

    #[test]
    fn unparseable_text_is_returned_unchanged() {
        assert_eq!(shift_relative("1+", 1, 1), "1+");
        assert_eq!(rename_sheet("SUM(", "A", "B"), "SUM(");
    }

    #[test]
    fn sheet_rename_covers_every_position() {
        assert_eq!(rename_sheet("Old!A1", "Old", "New"), "New!A1");
        assert_eq!(
            rename_sheet("SUM(Old!A1:B2)+Other!C1", "Old", "New"),
            "SUM(New!A1:B2)+Other!C1"
        );
        assert_eq!(
            rename_sheet("Old:Last!A1", "Old", "New"),
            "New:Last!A1"
        );
        assert_eq!(
            rename_sheet("First:Old!A1", "Old", "New"),
            "First:New!A1"
        );
        assert_eq!(
            rename_sheet("Old!MyName", "Old", "My Sheet"),
            "'My Sheet'!MyName"
        );
    }

    #[test]
    fn sheet_rename_round_trips() {
        let src = "SUM(X!A1,Y!B2)";
        let there = rename_sheet(src, "X", "Y2");
        let back = rename_sheet(&there, "Y2", "X");
        assert_eq!(back, src);
    }

    #[test]
    fn workbook_rename() {
        assert_eq!(
            rename_workbook("[Book1]Sheet1!A1", "Book1", "Book2"),
            "[Book2]Sheet1!A1"
        );
        assert_eq!(
            rename_workbook("[Book1]Sheet1:Sheet3!A1", "Book1", "Book2"),
            "[Book2]Sheet1:Sheet3!A1"
        );
        assert_eq!(rename_workbook("A1", "Book1", "Book2"), "A1");
    }

    #[test]
    fn table_rename_rewrites_structured_refs() {
        assert_eq!(
            rename_table("SUM(Stock[Qty])", "Stock", "Inventory"),
            "SUM(Inventory[Qty])"
        );
        assert_eq!(rename_table("SUM(Other[Qty])", "Stock", "Inv"), "SUM(Other[Qty])");
    }

    #[test]
    fn shift_composition() {
        let a = shift_relative(&shift_relative("A1:B2+C3", 1, 2), 3, 4);
        let b = shift_relative("A1:B2+C3", 4, 6);
        assert_eq!(a, b);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Shifting by (a,b) then (c,d) equals one shift by (a+c,b+d)
            // whenever neither step leaves the grid.
            #[test]
            fn shift_composes(
                formula in proptest::sample::select(vec![
                    "A1", "$B$2", "C3:D4", "SUM(E5:F)", "A$1+$B2*C3",
                    "SUM(A1:INFINITY)", "Sheet1!G7", "H8%",
                ]),
                a in 0i64..40, b in 0i64..40, c in 0i64..40, d in 0i64..40,
            ) {
                let two_step = shift_relative(&shift_relative(formula, a, b), c, d);
                let one_step = shift_relative(formula, a + c, b + d);
                prop_assert_eq!(two_step, one_step);
            }

            #[test]
            fn sheet_rename_is_invertible(
                formula in proptest::sample::select(vec![
                    "X!A1", "SUM(X!A1:B2)+Other!C1", "X:Last!A1", "X!MyName",
                ]),
            ) {
                let there = rename_sheet(formula, "X", "Y");
                let back = rename_sheet(&there, "Y", "X");
                // the canonical form is the fixed point
                prop_assert_eq!(back, rename_sheet(formula, "X", "X"));
            }
        }
    }
}

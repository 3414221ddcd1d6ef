//! The canonical formatter: syntax tree → text.
//!
//! Total over every tree shape. `format(parse(s))` is stable under a
//! second `parse`/`format` round, and parentheses are emitted only where
//! the precedence table requires them.

use crate::ast::{Expr, ExprKind, RangeAbs, UnaryOpKind};
use crate::grammar::{Assoc, column_name_needs_escaping, precedence, sheet_name_needs_quoting};
use gridcalc_common::coord::index_to_column;
use gridcalc_common::value::format_number;
use gridcalc_common::{AbsFlags, AxisEnd, CellValue, Coord, SheetRange, Sign};

/// Render a tree to canonical formula text (no leading `=`).
pub fn format(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr);
    out
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format(self))
    }
}

fn write_expr(out: &mut String, expr: &Expr) {
    match &expr.kind {
        ExprKind::Value(v) => write_value(out, v),
        ExprKind::Empty => {}
        ExprKind::Reference {
            addr,
            sheet,
            workbook,
            abs,
        } => {
            write_prefix(out, workbook.as_deref(), sheet.as_deref());
            write_cell(out, *addr, *abs);
        }
        ExprKind::Range {
            range,
            sheet,
            workbook,
            abs,
        } => {
            write_prefix(out, workbook.as_deref(), sheet.as_deref());
            write_range(out, range, abs);
        }
        ExprKind::Function { name, args } => {
            out.push_str(name);
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_expr(out, arg);
            }
            out.push(')');
        }
        ExprKind::UnaryOp { op, operand } => match op {
            UnaryOpKind::Percent => {
                // `%` binds tighter than any binary operator.
                let parens = matches!(operand.kind, ExprKind::BinaryOp { .. });
                write_wrapped(out, operand, parens);
                out.push('%');
            }
            prefix => {
                out.push_str(prefix.symbol());
                // Prefix sign binds tighter than `%` and all binaries.
                let parens = matches!(
                    operand.kind,
                    ExprKind::BinaryOp { .. }
                        | ExprKind::UnaryOp {
                            op: UnaryOpKind::Percent,
                            ..
                        }
                );
                write_wrapped(out, operand, parens);
            }
        },
        ExprKind::BinaryOp { op, left, right } => {
            let (prec, assoc) = precedence(*op);
            write_wrapped(out, left, child_needs_parens(left, prec, assoc, false));
            out.push_str(op.symbol());
            write_wrapped(out, right, child_needs_parens(right, prec, assoc, true));
        }
        ExprKind::Array { rows } => {
            out.push('{');
            for (r, row) in rows.iter().enumerate() {
                if r > 0 {
                    out.push(';');
                }
                for (c, cell) in row.iter().enumerate() {
                    if c > 0 {
                        out.push(',');
                    }
                    write_expr(out, cell);
                }
            }
            out.push('}');
        }
        ExprKind::NamedExpr {
            name,
            sheet,
            workbook,
        } => {
            write_prefix(out, workbook.as_deref(), sheet.as_deref());
            out.push_str(name);
        }
        ExprKind::ThreeDRange {
            start_sheet,
            end_sheet,
            workbook,
            inner,
        } => {
            if let Some(wb) = workbook {
                out.push('[');
                out.push_str(wb);
                out.push(']');
            }
            write_sheet_name(out, start_sheet);
            out.push(':');
            write_sheet_name(out, end_sheet);
            out.push('!');
            // Any sheet or workbook on the inner reference is stripped.
            match &inner.kind {
                ExprKind::Reference { addr, abs, .. } => write_cell(out, *addr, *abs),
                ExprKind::Range { range, abs, .. } => write_range(out, range, abs),
                other => write_expr(out, &Expr::bare(other.clone())),
            }
        }
        ExprKind::StructuredRef {
            table,
            sheet,
            workbook,
            cols,
            selector,
            this_row,
        } => {
            write_prefix(out, workbook.as_deref(), sheet.as_deref());
            if let Some(t) = table {
                out.push_str(t);
            }
            write_structured_body(out, cols.as_ref(), *selector, *this_row);
        }
        ExprKind::Infinity => out.push_str("INFINITY"),
        ExprKind::Error { code, .. } => {
            out.push_str(&code.to_string());
        }
    }
}

fn child_needs_parens(child: &Expr, parent_prec: u8, parent_assoc: Assoc, is_right: bool) -> bool {
    match &child.kind {
        ExprKind::BinaryOp { op, .. } => {
            let (child_prec, _) = precedence(*op);
            child_prec < parent_prec
                || (child_prec == parent_prec
                    && match parent_assoc {
                        Assoc::Left => is_right,
                        Assoc::Right => !is_right,
                    })
        }
        _ => false,
    }
}

fn write_wrapped(out: &mut String, expr: &Expr, parens: bool) {
    if parens {
        out.push('(');
        write_expr(out, expr);
        out.push(')');
    } else {
        write_expr(out, expr);
    }
}

fn write_value(out: &mut String, v: &CellValue) {
    match v {
        CellValue::Number(n) => out.push_str(&format_number(*n)),
        CellValue::Text(s) => {
            out.push('"');
            out.push_str(&s.replace('"', "\"\""));
            out.push('"');
        }
        CellValue::Boolean(b) => out.push_str(if *b { "TRUE" } else { "FALSE" }),
        CellValue::Infinity(Sign::Pos) => out.push_str("INFINITY"),
        CellValue::Infinity(Sign::Neg) => out.push_str("-INFINITY"),
        CellValue::Error(e) => out.push_str(&e.kind.to_string()),
        CellValue::Empty => {}
    }
}

fn write_prefix(out: &mut String, workbook: Option<&str>, sheet: Option<&str>) {
    if let Some(wb) = workbook {
        out.push('[');
        out.push_str(wb);
        out.push(']');
    }
    if let Some(s) = sheet {
        write_sheet_name(out, s);
        out.push('!');
    }
}

fn write_sheet_name(out: &mut String, name: &str) {
    if sheet_name_needs_quoting(name) {
        out.push('\'');
        out.push_str(&name.replace('\'', "''"));
        out.push('\'');
    } else {
        out.push_str(name);
    }
}

fn write_cell(out: &mut String, addr: Coord, abs: AbsFlags) {
    if abs.col {
        out.push('$');
    }
    out.push_str(&index_to_column(addr.col));
    if abs.row {
        out.push('$');
    }
    out.push_str(&(addr.row + 1).to_string());
}

/// Canonical range text: always an explicit start cell, then the end
/// variant (`A1:A`, `A5:5`, `A5:INFINITY`, `A5:D8`).
fn write_range(out: &mut String, range: &SheetRange, abs: &RangeAbs) {
    write_cell(out, range.start, abs.start);
    out.push(':');
    match (range.end_col, range.end_row) {
        (AxisEnd::Finite(c), AxisEnd::Finite(r)) => {
            write_cell(out, Coord::new(c, r), abs.end);
        }
        (AxisEnd::Finite(c), AxisEnd::Open) => {
            if abs.end.col {
                out.push('$');
            }
            out.push_str(&index_to_column(c));
        }
        (AxisEnd::Open, AxisEnd::Finite(r)) => {
            if abs.end.row {
                out.push('$');
            }
            out.push_str(&(r + 1).to_string());
        }
        (AxisEnd::Open, AxisEnd::Open) => out.push_str("INFINITY"),
    }
}

fn write_structured_body(
    out: &mut String,
    cols: Option<&(String, String)>,
    selector: Option<crate::ast::TableSelector>,
    this_row: bool,
) {
    let col_part = cols.map(|(first, last)| {
        if first == last {
            if column_name_needs_escaping(first) {
                (format!("[{first}]"), true)
            } else {
                (first.clone(), false)
            }
        } else {
            (format!("[{first}]:[{last}]"), true)
        }
    });

    if this_row {
        out.push_str("[@");
        if let Some((text, _)) = col_part {
            out.push_str(&text);
        }
        out.push(']');
        return;
    }

    match (selector, col_part) {
        (Some(sel), Some((text, bracketed))) => {
            out.push_str("[[#");
            out.push_str(sel.word());
            out.push_str("],");
            if !bracketed {
                out.push('[');
                out.push_str(&text);
                out.push(']');
            } else {
                out.push_str(&text);
            }
            out.push(']');
        }
        (Some(sel), None) => {
            out.push_str("[#");
            out.push_str(sel.word());
            out.push(']');
        }
        (None, Some((text, _))) => {
            out.push('[');
            out.push_str(&text);
            out.push(']');
        }
        (None, None) => out.push_str("[#All]"),
    }
}

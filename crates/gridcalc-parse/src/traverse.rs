//! Generic tree walks: one immutable visit, one structure-preserving
//! rewrite. The rewriters and dependency scans are written in terms of
//! these instead of re-implementing traversal.

use smallvec::{SmallVec, smallvec};

use crate::ast::{Expr, ExprKind};

/// Depth-first pre-order iterator over a tree's nodes. Children come in a
/// fixed order: binary left then right, function arguments left-to-right,
/// arrays row-major, 3D range inner last.
pub struct Descendants<'a> {
    stack: SmallVec<[&'a Expr; 8]>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Expr;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        // Push children in reverse so the leftmost pops first.
        match &node.kind {
            ExprKind::UnaryOp { operand, .. } => self.stack.push(operand),
            ExprKind::BinaryOp { left, right, .. } => {
                self.stack.push(right);
                self.stack.push(left);
            }
            ExprKind::Function { args, .. } => {
                for arg in args.iter().rev() {
                    self.stack.push(arg);
                }
            }
            ExprKind::Array { rows } => {
                for row in rows.iter().rev() {
                    for cell in row.iter().rev() {
                        self.stack.push(cell);
                    }
                }
            }
            ExprKind::ThreeDRange { inner, .. } => self.stack.push(inner),
            ExprKind::Value(_)
            | ExprKind::Empty
            | ExprKind::Reference { .. }
            | ExprKind::Range { .. }
            | ExprKind::NamedExpr { .. }
            | ExprKind::StructuredRef { .. }
            | ExprKind::Infinity
            | ExprKind::Error { .. } => {}
        }
        Some(node)
    }
}

/// Iterate a tree's nodes in depth-first pre-order.
pub fn descendants(expr: &Expr) -> Descendants<'_> {
    Descendants {
        stack: smallvec![expr],
    }
}

/// Depth-first pre-order visit; every node exactly once.
pub fn visit<F: FnMut(&Expr)>(expr: &Expr, f: &mut F) {
    for node in descendants(expr) {
        f(node);
    }
}

/// Structure-preserving rewrite: children are mapped first, then `f` is
/// applied to the reconstructed node. `transform(t, &identity)` returns a
/// tree structurally equal to `t`.
pub fn transform<F: Fn(Expr) -> Expr>(expr: Expr, f: &F) -> Expr {
    let Expr { kind, span } = expr;
    let kind = match kind {
        ExprKind::UnaryOp { op, operand } => ExprKind::UnaryOp {
            op,
            operand: Box::new(transform(*operand, f)),
        },
        ExprKind::BinaryOp { op, left, right } => ExprKind::BinaryOp {
            op,
            left: Box::new(transform(*left, f)),
            right: Box::new(transform(*right, f)),
        },
        ExprKind::Function { name, args } => ExprKind::Function {
            name,
            args: args.into_iter().map(|a| transform(a, f)).collect(),
        },
        ExprKind::Array { rows } => ExprKind::Array {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(|c| transform(c, f)).collect())
                .collect(),
        },
        ExprKind::ThreeDRange {
            start_sheet,
            end_sheet,
            workbook,
            inner,
        } => ExprKind::ThreeDRange {
            start_sheet,
            end_sheet,
            workbook,
            inner: Box::new(transform(*inner, f)),
        },
        leaf => leaf,
    };
    f(Expr::new(kind, span))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn visit_counts_every_node_once() {
        let tree = parse("=SUM(A1:A3,{1,2;3,4})+B1*2").unwrap();
        let mut count = 0usize;
        visit(&tree, &mut |_| count += 1);
        // BinaryOp(+), Function(SUM), Range, Array, 4 array cells,
        // BinaryOp(*), Reference(B1), Value(2)
        assert_eq!(count, 11);
    }

    #[test]
    fn preorder_visits_parent_before_children() {
        let tree = parse("=1+2*3").unwrap();
        let shapes: Vec<&'static str> = descendants(&tree)
            .map(|e| match &e.kind {
                ExprKind::BinaryOp { .. } => "op",
                ExprKind::Value(_) => "value",
                _ => "other",
            })
            .collect();
        assert_eq!(shapes, vec!["op", "value", "op", "value", "value"]);
    }

    #[test]
    fn transform_identity_is_structural_identity() {
        for src in [
            "=1+2*3",
            "=SUM(A1:A3)",
            "='My Sheet'!A1&\"x\"",
            "=Table1[[#Headers],[Col1]:[Col2]]",
            "=Sheet1:Sheet3!A1",
        ] {
            let tree = parse(src).unwrap();
            let same = transform(tree.clone(), &|e| e);
            assert_eq!(tree, same, "{src}");
        }
    }
}

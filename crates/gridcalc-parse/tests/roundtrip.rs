//! Round-trip and structure tests over the public parse/format surface.

use gridcalc_common::{AxisEnd, CellValue, Coord, ErrorKind};
use gridcalc_parse::ast::{BinaryOpKind, ExprKind, TableSelector};
use gridcalc_parse::{format, parse};
use proptest::prelude::*;

fn canon(src: &str) -> String {
    format(&parse(src).unwrap())
}

/// `format ∘ parse` is idempotent on its image and re-parses to an equal
/// tree.
fn assert_roundtrip(src: &str) {
    let once = parse(src).unwrap_or_else(|e| panic!("parse {src:?}: {e}"));
    let text = format(&once);
    let twice = parse(&text).unwrap_or_else(|e| panic!("reparse {text:?}: {e}"));
    assert_eq!(once, twice, "tree changed for {src:?} -> {text:?}");
    assert_eq!(text, format(&twice), "text changed for {src:?}");
}

#[test]
fn roundtrip_corpus() {
    for src in [
        "1+2*3",
        "=1+2*3",
        "2^3^4",
        "(1+2)*3",
        "1<2",
        "A1<>B2",
        "\"a\"&\"b\"",
        "\"he said \"\"hi\"\"\"",
        "-5%",
        "5%*2",
        "TRUE",
        "FALSE=TRUE",
        "#N/A",
        "#DIV/0!",
        "INFINITY",
        "A1",
        "$A$1",
        "$A1",
        "A$1",
        "Sheet1!A1",
        "'My Sheet'!A1",
        "[Book]Sheet1!A1",
        "A1:B2",
        "$A$1:B2",
        "A5:INFINITY",
        "A5:D",
        "A5:15",
        "Sheet1!A1:B2",
        "Sheet1:Sheet3!A1",
        "Sheet1:Sheet3!A1:B2",
        "[Book]Sheet1:Sheet3!A1",
        "SUM()",
        "SUM(A1:A3)",
        "SUM(A1,A2,A3)",
        "IF(A1>0,\"yes\",\"no\")",
        "MATCH(20,A1:A3,0)",
        "{1,2;3,4}",
        "{1}",
        "MyName",
        "Sheet1!MyName",
        "Table1[Col]",
        "Table1[Col1:Col2]",
        "Table1[#Data]",
        "Table1[#All]",
        "Table1[#Headers]",
        "Table1[[#Headers],[Col1]:[Col2]]",
        "Table1[[Col Name]]",
        "Table1[Total-Cost]",
        "[@Col]",
        "[@[Col Name]]",
        "[Col]",
        "[#Data]",
        "LEFT(A1,FIND(\",\",A1)-1)",
        "SEQUENCE(3,2)",
    ] {
        assert_roundtrip(src);
    }
}

#[test]
fn canonical_open_range_forms() {
    assert_eq!(canon("A5:INFINITY"), "A5:INFINITY");
    assert_eq!(canon("A:A"), "A1:A");
    assert_eq!(canon("5:5"), "A5:5");
    assert_eq!(canon("A:C"), "A1:C");
    assert_eq!(canon("3:7"), "A3:7");
    // and those canonical forms are fixed points
    assert_eq!(canon("A1:A"), "A1:A");
    assert_eq!(canon("A5:5"), "A5:5");
}

#[test]
fn precedence_structure() {
    let tree = parse("=1+2*3").unwrap();
    match &tree.kind {
        ExprKind::BinaryOp { op, left, right } => {
            assert_eq!(*op, BinaryOpKind::Add);
            assert_eq!(left.kind, ExprKind::Value(CellValue::Number(1.0)));
            match &right.kind {
                ExprKind::BinaryOp { op, .. } => assert_eq!(*op, BinaryOpKind::Mul),
                other => panic!("expected Mul, got {other:?}"),
            }
        }
        other => panic!("expected Add at root, got {other:?}"),
    }
}

#[test]
fn power_is_right_associative() {
    // 2^3^4 parses as 2^(3^4); formatting keeps it paren-free.
    let tree = parse("2^3^4").unwrap();
    match &tree.kind {
        ExprKind::BinaryOp { op, left, .. } => {
            assert_eq!(*op, BinaryOpKind::Pow);
            assert_eq!(left.kind, ExprKind::Value(CellValue::Number(2.0)));
        }
        other => panic!("{other:?}"),
    }
    assert_eq!(canon("2^3^4"), "2^3^4");
    assert_eq!(canon("(2^3)^4"), "(2^3)^4");
}

#[test]
fn comparison_binds_loosest() {
    assert_eq!(canon("1+2<3*4"), "1+2<3*4");
    assert_eq!(canon("(1<2)+1"), "(1<2)+1");
    assert_eq!(canon("\"a\"&\"b\"=\"ab\""), "\"a\"&\"b\"=\"ab\"");
}

#[test]
fn empty_and_whitespace_parse_to_empty() {
    assert!(parse("").unwrap().is_empty());
    assert!(parse("=").unwrap().is_empty());
    assert!(parse("   ").unwrap().is_empty());
    assert_eq!(format(&parse("").unwrap()), "");
}

#[test]
fn reference_absolute_flags() {
    match parse("$A$1").unwrap().kind {
        ExprKind::Reference { addr, abs, .. } => {
            assert_eq!(addr, Coord::new(0, 0));
            assert!(abs.col && abs.row);
        }
        other => panic!("{other:?}"),
    }
    match parse("A$1").unwrap().kind {
        ExprKind::Reference { abs, .. } => {
            assert!(!abs.col);
            assert!(abs.row);
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn open_ends_are_never_absolute() {
    match parse("$A$5:INFINITY").unwrap().kind {
        ExprKind::Range { range, abs, .. } => {
            assert_eq!(range.end_col, AxisEnd::Open);
            assert_eq!(range.end_row, AxisEnd::Open);
            assert!(abs.start.col && abs.start.row);
            assert!(!abs.end.col && !abs.end.row);
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn sheet_and_workbook_qualification() {
    match parse("'My Sheet'!A1").unwrap().kind {
        ExprKind::Reference { sheet, .. } => assert_eq!(sheet.as_deref(), Some("My Sheet")),
        other => panic!("{other:?}"),
    }
    match parse("[Book]Sheet1!A1").unwrap().kind {
        ExprKind::Reference {
            sheet, workbook, ..
        } => {
            assert_eq!(sheet.as_deref(), Some("Sheet1"));
            assert_eq!(workbook.as_deref(), Some("Book"));
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn three_d_range_structure() {
    match parse("Sheet1:Sheet3!A1").unwrap().kind {
        ExprKind::ThreeDRange {
            start_sheet,
            end_sheet,
            inner,
            ..
        } => {
            assert_eq!(start_sheet, "Sheet1");
            assert_eq!(end_sheet, "Sheet3");
            assert!(matches!(inner.kind, ExprKind::Reference { .. }));
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn structured_reference_shapes() {
    match parse("Table1[Col]").unwrap().kind {
        ExprKind::StructuredRef {
            table,
            cols,
            selector,
            this_row,
            ..
        } => {
            assert_eq!(table.as_deref(), Some("Table1"));
            assert_eq!(cols, Some(("Col".to_string(), "Col".to_string())));
            assert_eq!(selector, None);
            assert!(!this_row);
        }
        other => panic!("{other:?}"),
    }
    match parse("Table1[[#Headers],[Col1:Col2]]").unwrap().kind {
        ExprKind::StructuredRef {
            cols, selector, ..
        } => {
            assert_eq!(selector, Some(TableSelector::Headers));
            assert_eq!(cols, Some(("Col1".to_string(), "Col2".to_string())));
        }
        other => panic!("{other:?}"),
    }
    match parse("[@Col]").unwrap().kind {
        ExprKind::StructuredRef {
            table, this_row, ..
        } => {
            assert_eq!(table, None);
            assert!(this_row);
        }
        other => panic!("{other:?}"),
    }
    // spaced and dashed column names are reassembled by the parser
    match parse("Table1[Unit Cost]").unwrap().kind {
        ExprKind::StructuredRef { cols, .. } => {
            assert_eq!(cols, Some(("Unit Cost".to_string(), "Unit Cost".to_string())));
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn error_literals_parse_to_error_nodes() {
    match parse("#REF!").unwrap().kind {
        ExprKind::Error { code, .. } => assert_eq!(code, ErrorKind::Ref),
        other => panic!("{other:?}"),
    }
    assert_eq!(canon("#NAME?"), "#NAME?");
}

#[test]
fn parse_failures_have_positions() {
    for bad in ["1+", "SUM(", "{1,2;3}", "(1", "1)", "@"] {
        let err = parse(bad).unwrap_err();
        assert!(err.span.is_some(), "{bad}");
    }
}

#[test]
fn number_forms() {
    assert_eq!(canon("1e3"), "1000");
    assert_eq!(canon(".5"), "0.5");
    assert_eq!(canon("12."), "12");
    assert_eq!(canon("1.25E2"), "125");
}

/* ───────────────── property: tree round-trips ───────────────── */

fn arb_expr() -> impl Strategy<Value = gridcalc_parse::Expr> {
    use gridcalc_parse::Expr;
    let leaf = prop_oneof![
        (0u32..1000).prop_map(|n| Expr::value(n as f64)),
        "[a-z ]{0,6}".prop_map(|s| Expr::value(CellValue::Text(s))),
        any::<bool>().prop_map(|b| Expr::value(CellValue::Boolean(b))),
        (0u32..60, 0u32..60).prop_map(|(c, r)| Expr::bare(ExprKind::Reference {
            addr: Coord::new(c, r),
            sheet: None,
            workbook: None,
            abs: Default::default(),
        })),
    ];
    leaf.prop_recursive(3, 24, 3, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone(), arb_binop()).prop_map(|(l, r, op)| Expr::bare(
                ExprKind::BinaryOp {
                    op,
                    left: Box::new(l),
                    right: Box::new(r),
                }
            )),
            inner.clone().prop_map(|e| Expr::bare(ExprKind::UnaryOp {
                op: gridcalc_parse::UnaryOpKind::Minus,
                operand: Box::new(e),
            })),
            proptest::collection::vec(inner, 1..3).prop_map(|args| Expr::bare(
                ExprKind::Function {
                    name: "SUM".to_string(),
                    args,
                }
            )),
        ]
    })
}

fn arb_binop() -> impl Strategy<Value = BinaryOpKind> {
    prop_oneof![
        Just(BinaryOpKind::Add),
        Just(BinaryOpKind::Sub),
        Just(BinaryOpKind::Mul),
        Just(BinaryOpKind::Div),
        Just(BinaryOpKind::Pow),
        Just(BinaryOpKind::Concat),
        Just(BinaryOpKind::Lt),
        Just(BinaryOpKind::Eq),
    ]
}

proptest! {
    #[test]
    fn formatted_trees_reparse_identically(tree in arb_expr()) {
        let text = format(&tree);
        let reparsed = parse(&text).unwrap();
        prop_assert_eq!(&reparsed, &tree, "text: {}", text);
        prop_assert_eq!(format(&reparsed), text);
    }
}

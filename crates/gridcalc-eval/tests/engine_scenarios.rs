//! End-to-end engine scenarios: mutation, recomputation, spills, events,
//! and registry lifecycle.

use gridcalc_common::coord::parse_cell_key;
use gridcalc_common::{CellValue, Coord, ErrorKind, FiniteRange, SerializedValue};
use gridcalc_eval::{CellAddr, Engine, EngineEvent, SheetAddr, TableDesc};

fn engine() -> Engine {
    let mut e = Engine::new();
    e.add_workbook("Book1").unwrap();
    e.add_sheet("Book1", "Sheet1").unwrap();
    e
}

fn addr(key: &str) -> CellAddr {
    addr_in("Sheet1", key)
}

fn addr_in(sheet: &str, key: &str) -> CellAddr {
    let (coord, _) = parse_cell_key(key).unwrap();
    CellAddr::new("Book1", sheet, coord)
}

fn set(e: &mut Engine, key: &str, value: impl Into<SerializedValue>) {
    e.set_cell_content(&addr(key), value.into()).unwrap();
}

fn get(e: &Engine, key: &str) -> CellValue {
    e.get_cell_value(&addr(key)).unwrap()
}

fn err_kind(v: CellValue) -> Option<ErrorKind> {
    match v {
        CellValue::Error(e) => Some(e.kind),
        _ => None,
    }
}

#[test]
fn arithmetic_precedence() {
    let mut e = engine();
    set(&mut e, "A1", "=1+2*3");
    assert_eq!(get(&e, "A1"), CellValue::Number(7.0));
}

#[test]
fn match_over_column() {
    let mut e = engine();
    set(&mut e, "A1", 10.0);
    set(&mut e, "A2", 20.0);
    set(&mut e, "A3", 30.0);
    set(&mut e, "B1", "=MATCH(20,A1:A3,0)");
    assert_eq!(get(&e, "B1"), CellValue::Number(2.0));
}

#[test]
fn left_find_scenario() {
    let mut e = engine();
    set(&mut e, "A1", "apple,banana,cherry");
    set(&mut e, "B1", "=LEFT(A1,FIND(\",\",A1)-1)");
    assert_eq!(get(&e, "B1"), CellValue::from("apple"));
}

#[test]
fn sequence_spills_a_rectangle() {
    let mut e = engine();
    e.set_cell_content(&addr("D4"), "=SEQUENCE(3,2)".into())
        .unwrap();
    let expected = [
        ("D4", 1.0),
        ("E4", 2.0),
        ("D5", 3.0),
        ("E5", 4.0),
        ("D6", 5.0),
        ("E6", 6.0),
    ];
    for (key, v) in expected {
        assert_eq!(get(&e, key), CellValue::Number(v), "{key}");
    }
    assert_eq!(get(&e, "F4"), CellValue::Empty);
    assert_eq!(get(&e, "D7"), CellValue::Empty);
}

#[test]
fn cycle_detection() {
    let mut e = engine();
    set(&mut e, "A1", "=B1");
    set(&mut e, "B1", "=A1");
    assert_eq!(err_kind(get(&e, "A1")), Some(ErrorKind::Cycle));
    assert_eq!(err_kind(get(&e, "B1")), Some(ErrorKind::Cycle));

    // breaking the cycle recovers both cells
    set(&mut e, "B1", 5.0);
    assert_eq!(get(&e, "A1"), CellValue::Number(5.0));
}

#[test]
fn dependents_recompute_on_change() {
    let mut e = engine();
    set(&mut e, "A1", 1.0);
    set(&mut e, "B1", "=A1*2");
    set(&mut e, "C1", "=B1+1");
    assert_eq!(get(&e, "C1"), CellValue::Number(3.0));

    set(&mut e, "A1", 10.0);
    assert_eq!(get(&e, "B1"), CellValue::Number(20.0));
    assert_eq!(get(&e, "C1"), CellValue::Number(21.0));
}

#[test]
fn range_watchers_recompute_on_new_cells() {
    let mut e = engine();
    set(&mut e, "B1", "=SUM(A1:A)");
    assert_eq!(get(&e, "B1"), CellValue::Number(0.0));

    set(&mut e, "A7", 4.0);
    assert_eq!(get(&e, "B1"), CellValue::Number(4.0));

    set(&mut e, "A900", 6.0);
    assert_eq!(get(&e, "B1"), CellValue::Number(10.0));

    set(&mut e, "A7", SerializedValue::Empty);
    assert_eq!(get(&e, "B1"), CellValue::Number(6.0));
}

#[test]
fn empty_and_malformed_formulas() {
    let mut e = engine();
    set(&mut e, "A1", "=");
    assert_eq!(get(&e, "A1"), CellValue::Empty);
    set(&mut e, "A2", "=   ");
    assert_eq!(get(&e, "A2"), CellValue::Empty);

    set(&mut e, "A3", "=1+");
    assert_eq!(err_kind(get(&e, "A3")), Some(ErrorKind::Error));
    // the text is stored verbatim
    assert_eq!(
        e.get_cell_input(&addr("A3")).unwrap(),
        SerializedValue::from("=1+")
    );
}

#[test]
fn cross_sheet_references_and_late_sheet_creation() {
    let mut e = engine();
    set(&mut e, "A1", "=Sheet2!A1+1");
    assert_eq!(err_kind(get(&e, "A1")), Some(ErrorKind::Ref));

    e.add_sheet("Book1", "Sheet2").unwrap();
    // the dangling reference re-resolves once the sheet exists
    assert_eq!(get(&e, "A1"), CellValue::Number(1.0));

    e.set_cell_content(&addr_in("Sheet2", "A1"), 41.0.into())
        .unwrap();
    assert_eq!(get(&e, "A1"), CellValue::Number(42.0));
}

#[test]
fn sheet_rename_rewrites_formulas() {
    let mut e = engine();
    e.add_sheet("Book1", "Data").unwrap();
    e.set_cell_content(&addr_in("Data", "A1"), 9.0.into())
        .unwrap();
    set(&mut e, "A1", "=Data!A1*2");
    assert_eq!(get(&e, "A1"), CellValue::Number(18.0));

    e.rename_sheet("Book1", "Data", "Numbers").unwrap();
    assert_eq!(
        e.get_cell_input(&addr("A1")).unwrap(),
        SerializedValue::from("=Numbers!A1*2")
    );
    assert_eq!(get(&e, "A1"), CellValue::Number(18.0));

    assert_eq!(
        e.rename_sheet("Book1", "Data", "X"),
        Err(gridcalc_eval::EngineError::SheetNotFound("Data".into()))
    );
}

#[test]
fn sheet_removal_dangles_references() {
    let mut e = engine();
    e.add_sheet("Book1", "Data").unwrap();
    e.set_cell_content(&addr_in("Data", "A1"), 5.0.into())
        .unwrap();
    set(&mut e, "A1", "=Data!A1");
    assert_eq!(get(&e, "A1"), CellValue::Number(5.0));

    e.remove_sheet("Book1", "Data").unwrap();
    assert_eq!(err_kind(get(&e, "A1")), Some(ErrorKind::Ref));
}

#[test]
fn workbook_rename_rewrites_qualified_references() {
    let mut e = engine();
    e.add_workbook("Book2").unwrap();
    e.add_sheet("Book2", "Sheet1").unwrap();
    e.set_cell_content(
        &CellAddr::new("Book2", "Sheet1", Coord::new(0, 0)),
        3.0.into(),
    )
    .unwrap();
    set(&mut e, "A1", "=[Book2]Sheet1!A1*10");
    assert_eq!(get(&e, "A1"), CellValue::Number(30.0));

    e.rename_workbook("Book2", "Budget").unwrap();
    assert_eq!(
        e.get_cell_input(&addr("A1")).unwrap(),
        SerializedValue::from("=[Budget]Sheet1!A1*10")
    );
    assert_eq!(get(&e, "A1"), CellValue::Number(30.0));
}

#[test]
fn spilled_range_reference() {
    let mut e = engine();
    set(&mut e, "A1", 1.0);
    set(&mut e, "A2", 2.0);
    set(&mut e, "A3", 3.0);
    set(&mut e, "C1", "=A1:A3");
    assert_eq!(get(&e, "C1"), CellValue::Number(1.0));
    assert_eq!(get(&e, "C2"), CellValue::Number(2.0));
    assert_eq!(get(&e, "C3"), CellValue::Number(3.0));

    // members follow source updates
    set(&mut e, "A2", 20.0);
    assert_eq!(get(&e, "C2"), CellValue::Number(20.0));

    // reading through a member cell sees the spilled value
    set(&mut e, "D1", "=C2*2");
    assert_eq!(get(&e, "D1"), CellValue::Number(40.0));
}

#[test]
fn spill_blocked_by_existing_content() {
    let mut e = engine();
    set(&mut e, "D5", "occupied");
    set(&mut e, "D4", "=SEQUENCE(3,1)");
    assert_eq!(err_kind(get(&e, "D4")), Some(ErrorKind::Ref));
    assert_eq!(get(&e, "D5"), CellValue::from("occupied"));
    assert_eq!(get(&e, "D6"), CellValue::Empty);

    // clearing the blocker lets the spill land
    set(&mut e, "D5", SerializedValue::Empty);
    assert_eq!(get(&e, "D4"), CellValue::Number(1.0));
    assert_eq!(get(&e, "D5"), CellValue::Number(2.0));
    assert_eq!(get(&e, "D6"), CellValue::Number(3.0));

    // and writing into the rectangle blocks it again
    set(&mut e, "D6", 99.0);
    assert_eq!(err_kind(get(&e, "D4")), Some(ErrorKind::Ref));
    assert_eq!(get(&e, "D5"), CellValue::Empty);
}

#[test]
fn spill_shrinks_and_grows_with_source() {
    let mut e = engine();
    set(&mut e, "A1", 1.0);
    set(&mut e, "A2", 2.0);
    set(&mut e, "C1", "=A1:A");
    assert_eq!(get(&e, "C2"), CellValue::Number(2.0));

    set(&mut e, "A3", 3.0);
    assert_eq!(get(&e, "C3"), CellValue::Number(3.0));

    set(&mut e, "A3", SerializedValue::Empty);
    assert_eq!(get(&e, "C3"), CellValue::Empty);
}

#[test]
fn array_literal_spills() {
    let mut e = engine();
    set(&mut e, "A1", "={1,2;3,4}");
    assert_eq!(get(&e, "A1"), CellValue::Number(1.0));
    assert_eq!(get(&e, "B1"), CellValue::Number(2.0));
    assert_eq!(get(&e, "A2"), CellValue::Number(3.0));
    assert_eq!(get(&e, "B2"), CellValue::Number(4.0));
}

#[test]
fn elementwise_operator_broadcasting() {
    let mut e = engine();
    set(&mut e, "A1", 1.0);
    set(&mut e, "A2", 2.0);
    set(&mut e, "A3", 3.0);
    set(&mut e, "C1", "=A1:A3*10");
    assert_eq!(get(&e, "C1"), CellValue::Number(10.0));
    assert_eq!(get(&e, "C2"), CellValue::Number(20.0));
    assert_eq!(get(&e, "C3"), CellValue::Number(30.0));
}

#[test]
fn three_d_range_sums_across_sheets() {
    let mut e = engine();
    e.add_sheet("Book1", "S2").unwrap();
    e.add_sheet("Book1", "S3").unwrap();
    e.set_cell_content(&addr_in("Sheet1", "A1"), 1.0.into())
        .unwrap();
    e.set_cell_content(&addr_in("S2", "A1"), 2.0.into()).unwrap();
    e.set_cell_content(&addr_in("S3", "A1"), 4.0.into()).unwrap();

    set(&mut e, "B1", "=SUM(Sheet1:S3!A1)");
    assert_eq!(get(&e, "B1"), CellValue::Number(7.0));

    // a sheet in the middle of the span updates the total
    e.set_cell_content(&addr_in("S2", "A1"), 20.0.into())
        .unwrap();
    assert_eq!(get(&e, "B1"), CellValue::Number(25.0));
}

#[test]
fn structured_references() {
    let mut e = engine();
    // table at A1:B4 with a header row
    set(&mut e, "A1", "Item");
    set(&mut e, "B1", "Qty");
    set(&mut e, "A2", "pen");
    set(&mut e, "B2", 2.0);
    set(&mut e, "A3", "ink");
    set(&mut e, "B3", 3.0);
    set(&mut e, "A4", "pad");
    set(&mut e, "B4", 5.0);
    e.add_table(&TableDesc {
        name: "Stock".into(),
        workbook: "Book1".into(),
        sheet: "Sheet1".into(),
        start: Coord::new(0, 0),
        num_cols: 2,
        num_rows: Some(4),
    })
    .unwrap();

    set(&mut e, "D1", "=SUM(Stock[Qty])");
    assert_eq!(get(&e, "D1"), CellValue::Number(10.0));

    set(&mut e, "D2", "=COUNT(Stock[[#All],[Qty]])");
    assert_eq!(get(&e, "D2"), CellValue::Number(3.0));

    // data changes flow through the table reference
    set(&mut e, "B2", 12.0);
    assert_eq!(get(&e, "D1"), CellValue::Number(20.0));

    // current-row reference, evaluated at a cell in the table's row span
    set(&mut e, "C3", "=Stock[@Qty]*10");
    assert_eq!(get(&e, "C3"), CellValue::Number(30.0));

    e.rename_table("Stock", "Inventory").unwrap();
    assert_eq!(
        e.get_cell_input(&addr("D1")).unwrap(),
        SerializedValue::from("=SUM(Inventory[Qty])")
    );
    assert_eq!(get(&e, "D1"), CellValue::Number(20.0));

    e.remove_table("Inventory").unwrap();
    assert_eq!(err_kind(get(&e, "D1")), Some(ErrorKind::Ref));
}

#[test]
fn named_expressions() {
    let mut e = engine();
    set(&mut e, "A1", 10.0);
    e.define_name("Book1", None, "Rate", "=A1/100").unwrap();
    set(&mut e, "B1", "=Rate*50");
    assert_eq!(get(&e, "B1"), CellValue::Number(5.0));

    set(&mut e, "C1", "=Unknown+1");
    assert_eq!(err_kind(get(&e, "C1")), Some(ErrorKind::Name));
    e.define_name("Book1", None, "Unknown", "=2").unwrap();
    assert_eq!(get(&e, "C1"), CellValue::Number(3.0));

    e.remove_name("Book1", None, "Unknown").unwrap();
    assert_eq!(err_kind(get(&e, "C1")), Some(ErrorKind::Name));
}

#[test]
fn set_sheet_content_is_atomic() {
    let mut e = engine();
    set(&mut e, "A1", 1.0);
    set(&mut e, "B1", "=SUM(A1:A3)");
    assert_eq!(get(&e, "B1"), CellValue::Number(1.0));

    let observed: std::rc::Rc<std::cell::RefCell<Vec<usize>>> = Default::default();
    let sink = observed.clone();
    e.subscribe(move |event| {
        if let EngineEvent::CellsChanged { cells } = event {
            sink.borrow_mut().push(cells.len());
        }
    });

    e.set_sheet_content(
        &SheetAddr::new("Book1", "Sheet1"),
        vec![
            ("A1".to_string(), SerializedValue::Number(5.0)),
            ("A2".to_string(), SerializedValue::Number(6.0)),
            ("A3".to_string(), SerializedValue::Number(7.0)),
            ("B1".to_string(), SerializedValue::from("=SUM(A1:A3)")),
        ],
    )
    .unwrap();
    assert_eq!(get(&e, "B1"), CellValue::Number(18.0));
    // one coherent batch, not one event per cell
    assert_eq!(observed.borrow().len(), 1);
}

#[test]
fn clear_range_deletes_cells() {
    let mut e = engine();
    for (k, v) in [("A1", 1.0), ("A2", 2.0), ("B1", 3.0), ("C5", 4.0)] {
        set(&mut e, k, v);
    }
    set(&mut e, "D1", "=SUM(A1:C5)");
    assert_eq!(get(&e, "D1"), CellValue::Number(10.0));

    e.clear_range(
        &SheetAddr::new("Book1", "Sheet1"),
        FiniteRange::new(Coord::new(0, 0), Coord::new(1, 1)),
    )
    .unwrap();
    assert_eq!(get(&e, "A1"), CellValue::Empty);
    assert_eq!(get(&e, "D1"), CellValue::Number(4.0));
}

#[test]
fn autofill_shifts_relative_references() {
    let mut e = engine();
    set(&mut e, "A1", 1.0);
    set(&mut e, "A2", 2.0);
    set(&mut e, "A3", 3.0);
    set(&mut e, "B1", "=A1*10");

    e.autofill(
        &SheetAddr::new("Book1", "Sheet1"),
        FiniteRange::new(Coord::new(1, 0), Coord::new(1, 0)),
        FiniteRange::new(Coord::new(1, 0), Coord::new(1, 2)),
    )
    .unwrap();
    assert_eq!(
        e.get_cell_input(&addr("B2")).unwrap(),
        SerializedValue::from("=A2*10")
    );
    assert_eq!(get(&e, "B2"), CellValue::Number(20.0));
    assert_eq!(get(&e, "B3"), CellValue::Number(30.0));
}

#[test]
fn event_stream_order() {
    let mut e = Engine::new();
    let log: std::rc::Rc<std::cell::RefCell<Vec<String>>> = Default::default();
    let sink = log.clone();
    let sub = e.subscribe(move |event| {
        sink.borrow_mut().push(match event {
            EngineEvent::WorkbookAdded { workbook } => format!("wb+{workbook}"),
            EngineEvent::SheetAdded { sheet, .. } => format!("sheet+{sheet}"),
            EngineEvent::SheetRenamed { old, new, .. } => format!("sheet~{old}>{new}"),
            EngineEvent::CellChanged { cell } => format!("cell@{}", cell.cell),
            EngineEvent::CellsChanged { cells } => format!("cells*{}", cells.len()),
            _ => "other".to_string(),
        });
    });

    e.add_workbook("Book1").unwrap();
    e.add_sheet("Book1", "Sheet1").unwrap();
    e.set_cell_content(
        &CellAddr::new("Book1", "Sheet1", Coord::new(0, 0)),
        1.0.into(),
    )
    .unwrap();
    e.rename_sheet("Book1", "Sheet1", "Main").unwrap();

    let events = log.borrow().clone();
    assert_eq!(events[0], "wb+Book1");
    assert_eq!(events[1], "sheet+Sheet1");
    assert_eq!(events[2], "cell@A1");
    assert!(events.iter().any(|e| e == "sheet~Sheet1>Main"));

    e.unsubscribe(sub);
    e.set_cell_content(
        &CellAddr::new("Book1", "Main", Coord::new(0, 0)),
        2.0.into(),
    )
    .unwrap();
    assert_eq!(log.borrow().len(), events.len());
}

#[test]
fn infinity_arithmetic_at_cell_level() {
    let mut e = engine();
    set(&mut e, "A1", "=1/0");
    assert_eq!(
        get(&e, "A1"),
        CellValue::Infinity(gridcalc_common::Sign::Pos)
    );
    set(&mut e, "A2", "=A1+5");
    assert_eq!(
        get(&e, "A2"),
        CellValue::Infinity(gridcalc_common::Sign::Pos)
    );
    set(&mut e, "A3", "=A1-A1");
    assert_eq!(err_kind(get(&e, "A3")), Some(ErrorKind::Num));
    set(&mut e, "A4", "=INFINITY");
    assert_eq!(
        get(&e, "A4"),
        CellValue::Infinity(gridcalc_common::Sign::Pos)
    );
}

#[test]
fn ad_hoc_formula_evaluation() {
    let mut e = engine();
    set(&mut e, "A1", 10.0);
    set(&mut e, "A2", 20.0);
    let sheet = SheetAddr::new("Book1", "Sheet1");
    assert_eq!(
        e.evaluate_formula(&sheet, "=SUM(A1:A2)*2").unwrap(),
        CellValue::Number(60.0)
    );
    // spilled results collapse to the origin value
    assert_eq!(
        e.evaluate_formula(&sheet, "=A1:A2").unwrap(),
        CellValue::Number(10.0)
    );
    assert_eq!(
        err_kind(e.evaluate_formula(&sheet, "=1+").unwrap()),
        Some(ErrorKind::Error)
    );
    // nothing is written: the sheet still has two cells
    assert_eq!(get(&e, "B1"), CellValue::Empty);
}

#[test]
fn error_literals_evaluate_to_themselves() {
    let mut e = engine();
    set(&mut e, "A1", "=#N/A");
    assert_eq!(err_kind(get(&e, "A1")), Some(ErrorKind::Na));
    set(&mut e, "A2", "=#REF!+1");
    assert_eq!(err_kind(get(&e, "A2")), Some(ErrorKind::Ref));
}

//! Interchange round-trip over the serialized workbook layout.

#![cfg(feature = "json")]

use gridcalc_common::{CellValue, Coord, SerializedValue};
use gridcalc_eval::engine::interchange::EngineData;
use gridcalc_eval::{CellAddr, Engine, SheetAddr, TableDesc};

#[test]
fn engine_data_round_trips_through_json() {
    let mut e = Engine::new();
    e.add_workbook("Book1").unwrap();
    e.add_sheet("Book1", "Sheet1").unwrap();
    e.add_sheet("Book1", "Data").unwrap();
    e.set_sheet_content(
        &SheetAddr::new("Book1", "Data"),
        vec![
            ("A1".to_string(), SerializedValue::from("Qty")),
            ("A2".to_string(), SerializedValue::Number(2.0)),
            ("A3".to_string(), SerializedValue::Number(3.0)),
        ],
    )
    .unwrap();
    e.add_table(&TableDesc {
        name: "Stock".into(),
        workbook: "Book1".into(),
        sheet: "Data".into(),
        start: Coord::new(0, 0),
        num_cols: 1,
        num_rows: Some(3),
    })
    .unwrap();
    e.set_cell_content(
        &CellAddr::new("Book1", "Sheet1", Coord::new(0, 0)),
        SerializedValue::from("=SUM(Stock[Qty])"),
    )
    .unwrap();

    let data = e.to_data();
    let json = serde_json::to_string(&data).unwrap();
    let parsed: EngineData = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, data);

    let restored = Engine::from_data(&parsed).unwrap();
    assert_eq!(
        restored
            .get_cell_value(&CellAddr::new("Book1", "Sheet1", Coord::new(0, 0)))
            .unwrap(),
        CellValue::Number(5.0)
    );
    // sheet order and cell ordering are stable
    assert_eq!(restored.to_data(), data);
}

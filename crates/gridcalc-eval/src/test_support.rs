//! Shared harness for unit tests: one engine with `Book1!Sheet1` and a
//! scratch cell for evaluating ad-hoc formulas.

use crate::engine::{CellAddr, Engine};
use gridcalc_common::coord::parse_cell_key;
use gridcalc_common::{CellValue, SerializedValue};

pub(crate) struct Harness {
    pub engine: Engine,
}

impl Harness {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        engine.add_workbook("Book1").unwrap();
        engine.add_sheet("Book1", "Sheet1").unwrap();
        Harness { engine }
    }

    pub fn addr(key: &str) -> CellAddr {
        let (coord, _) = parse_cell_key(key).expect("valid cell key");
        CellAddr::new("Book1", "Sheet1", coord)
    }

    pub fn set(&mut self, key: &str, value: impl Into<SerializedValue>) {
        self.engine
            .set_cell_content(&Self::addr(key), value.into())
            .unwrap();
    }

    pub fn get(&self, key: &str) -> CellValue {
        self.engine.get_cell_value(&Self::addr(key)).unwrap()
    }

    /// Evaluate a formula in a far-away scratch cell and clear it again.
    pub fn eval(&mut self, formula: &str) -> CellValue {
        let text = if formula.starts_with('=') {
            formula.to_string()
        } else {
            format!("={formula}")
        };
        self.set("ZZ1000", text);
        let v = self.get("ZZ1000");
        self.set("ZZ1000", SerializedValue::Empty);
        v
    }
}

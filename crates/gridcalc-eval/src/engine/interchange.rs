//! Interchange layout: a workbook is an ordered list of sheets, each an
//! ordered list of `[key, value]` pairs; tables are a parallel ordered
//! list. Available behind the `serde` feature.

use serde::{Deserialize, Serialize};

use gridcalc_common::coord::parse_cell_key;
use gridcalc_common::SerializedValue;

use super::{Coord, Engine, EngineError, SheetAddr, TableDesc};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetData {
    pub name: String,
    pub cells: Vec<(String, SerializedValue)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkbookData {
    pub name: String,
    pub sheets: Vec<SheetData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub name: String,
    pub workbook: String,
    pub sheet: String,
    pub start: String,
    pub num_rows: Option<u32>,
    pub num_cols: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineData {
    pub workbooks: Vec<WorkbookData>,
    pub tables: Vec<TableData>,
}

impl Engine {
    pub fn to_data(&self) -> EngineData {
        let mut workbooks = Vec::new();
        for wb in self.state.workbooks.iter().flatten() {
            let mut sheets = Vec::new();
            for sid in &wb.sheet_order {
                let Some(sheet) = self.state.sheet(*sid) else {
                    continue;
                };
                let mut cells: Vec<(Coord, SerializedValue)> = sheet
                    .cells
                    .iter()
                    .map(|(coord, cell)| (*coord, cell.input.clone()))
                    .collect();
                cells.sort_by_key(|(c, _)| (c.row, c.col));
                sheets.push(SheetData {
                    name: sheet.name.clone(),
                    cells: cells
                        .into_iter()
                        .map(|(c, v)| (c.to_a1(), v))
                        .collect(),
                });
            }
            workbooks.push(WorkbookData {
                name: wb.name.clone(),
                sheets,
            });
        }

        let mut tables: Vec<TableData> = self
            .state
            .tables
            .iter()
            .filter_map(|t| {
                let sheet = self.state.sheet(t.sheet)?;
                let wb = self.state.workbook(t.workbook)?;
                Some(TableData {
                    name: t.name.clone(),
                    workbook: wb.name.clone(),
                    sheet: sheet.name.clone(),
                    start: t.origin.to_a1(),
                    num_rows: t.height.finite(),
                    num_cols: t.width,
                })
            })
            .collect();
        tables.sort_by(|a, b| a.name.cmp(&b.name));

        EngineData { workbooks, tables }
    }

    pub fn from_data(data: &EngineData) -> Result<Engine, EngineError> {
        let mut engine = Engine::new();
        for wb in &data.workbooks {
            engine.add_workbook(&wb.name)?;
            for sheet in &wb.sheets {
                engine.add_sheet(&wb.name, &sheet.name)?;
            }
        }
        for table in &data.tables {
            let (start, _) = parse_cell_key(&table.start)
                .ok_or_else(|| EngineError::InvalidCellKey(table.start.clone()))?;
            engine.add_table(&TableDesc {
                name: table.name.clone(),
                workbook: table.workbook.clone(),
                sheet: table.sheet.clone(),
                start,
                num_cols: table.num_cols,
                num_rows: table.num_rows,
            })?;
        }
        for wb in &data.workbooks {
            for sheet in &wb.sheets {
                engine.set_sheet_content(
                    &SheetAddr::new(wb.name.clone(), sheet.name.clone()),
                    sheet.cells.iter().cloned(),
                )?;
            }
        }
        Ok(engine)
    }
}

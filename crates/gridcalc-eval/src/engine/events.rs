//! The engine's fan-out event publisher. Listeners run to completion, in
//! subscription order, before the next event fires; detaching is by the
//! id returned from `subscribe`.

use gridcalc_common::Coord;

/// Address of a cell at the public boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellAddr {
    pub workbook: String,
    pub sheet: String,
    pub cell: Coord,
}

/// Address of a sheet at the public boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SheetAddr {
    pub workbook: String,
    pub sheet: String,
}

impl SheetAddr {
    pub fn new(workbook: impl Into<String>, sheet: impl Into<String>) -> Self {
        SheetAddr {
            workbook: workbook.into(),
            sheet: sheet.into(),
        }
    }

    pub fn cell(&self, cell: Coord) -> CellAddr {
        CellAddr {
            workbook: self.workbook.clone(),
            sheet: self.sheet.clone(),
            cell,
        }
    }
}

impl CellAddr {
    pub fn new(workbook: impl Into<String>, sheet: impl Into<String>, cell: Coord) -> Self {
        CellAddr {
            workbook: workbook.into(),
            sheet: sheet.into(),
            cell,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    WorkbookAdded { workbook: String },
    WorkbookRemoved { workbook: String },
    WorkbookRenamed { old: String, new: String },
    SheetAdded { workbook: String, sheet: String },
    SheetRemoved { workbook: String, sheet: String },
    SheetRenamed { workbook: String, old: String, new: String },
    /// One directly-mutated cell.
    CellChanged { cell: CellAddr },
    /// Every cell whose evaluated value changed in one mutation, in one
    /// coherent batch.
    CellsChanged { cells: Vec<CellAddr> },
    TableAdded { table: String },
    TableRemoved { table: String },
    TableRenamed { old: String, new: String },
}

pub type SubscriptionId = usize;

type Listener = Box<dyn FnMut(&EngineEvent)>;

#[derive(Default)]
pub struct Publisher {
    listeners: Vec<Option<Listener>>,
}

impl Publisher {
    pub fn subscribe(&mut self, listener: impl FnMut(&EngineEvent) + 'static) -> SubscriptionId {
        self.listeners.push(Some(Box::new(listener)));
        self.listeners.len() - 1
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        if let Some(slot) = self.listeners.get_mut(id) {
            *slot = None;
        }
    }

    pub fn emit(&mut self, event: &EngineEvent) {
        for slot in &mut self.listeners {
            if let Some(listener) = slot {
                listener(event);
            }
        }
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

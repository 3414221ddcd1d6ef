//! Named expressions: `name → formula body`, workbook-scoped with an
//! optional sheet-local override.

use rustc_hash::FxHashMap;

use super::sheet::{SheetId, WorkbookId};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NameKey {
    workbook: WorkbookId,
    sheet: Option<SheetId>,
    name: String,
}

#[derive(Debug, Default)]
pub struct NamedRegistry {
    entries: FxHashMap<NameKey, String>,
}

impl NamedRegistry {
    fn key(workbook: WorkbookId, sheet: Option<SheetId>, name: &str) -> NameKey {
        NameKey {
            workbook,
            sheet,
            name: name.to_uppercase(),
        }
    }

    pub fn define(
        &mut self,
        workbook: WorkbookId,
        sheet: Option<SheetId>,
        name: &str,
        formula: String,
    ) -> bool {
        let key = Self::key(workbook, sheet, name);
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, formula);
        true
    }

    pub fn remove(&mut self, workbook: WorkbookId, sheet: Option<SheetId>, name: &str) -> bool {
        self.entries
            .remove(&Self::key(workbook, sheet, name))
            .is_some()
    }

    /// Sheet-scoped definitions shadow workbook-scoped ones.
    pub fn lookup(
        &self,
        workbook: WorkbookId,
        sheet: Option<SheetId>,
        name: &str,
    ) -> Option<&str> {
        if let Some(sheet) = sheet {
            if let Some(f) = self.entries.get(&Self::key(workbook, Some(sheet), name)) {
                return Some(f);
            }
        }
        self.entries
            .get(&Self::key(workbook, None, name))
            .map(String::as_str)
    }

    pub fn remove_for_workbook(&mut self, workbook: WorkbookId) {
        self.entries.retain(|k, _| k.workbook != workbook);
    }

    pub fn remove_for_sheet(&mut self, sheet: SheetId) {
        self.entries.retain(|k, _| k.sheet != Some(sheet));
    }
}

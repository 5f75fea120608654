// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::buffer::{CellEditBuffer, CellKey};
use crate::ids::{ColumnId, RowId};
use crate::model::{CellValue, Column, ColumnType, Row, RowPage, Table};
use crate::values;

/// A row as the grid shows it: typed cells keyed by column name.
#[derive(Debug, Clone, PartialEq)]
pub struct GridRow {
    pub id: RowId,
    pub order: i64,
    pub cells: BTreeMap<String, CellValue>,
}

impl GridRow {
    pub fn value(&self, column: &str) -> Option<&CellValue> {
        self.cells.get(column)
    }
}

/// Local mirror of the active table: column metadata plus every loaded row.
/// Mutated immediately on user action and reconciled when fetches land.
/// Hidden columns stay in the metadata and the rows; only positional
/// lookups skip them.
#[derive(Debug, Clone, Default)]
pub struct OptimisticGridStore {
    table: Option<Table>,
    hidden: BTreeSet<String>,
    rows: Vec<GridRow>,
    index: HashMap<RowId, usize>,
    total: usize,
    has_more: bool,
    deleted: BTreeSet<RowId>,
    errors: BTreeSet<CellKey>,
}

impl OptimisticGridStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to another table. Rows, delete markers and error markers from
    /// the previous table are dropped.
    pub fn load_table(&mut self, table: Table) {
        self.unload();
        self.table = Some(table);
    }

    /// Replace column metadata after a table listing, keeping loaded rows.
    pub fn refresh_metadata(&mut self, table: Table) {
        self.table = Some(table);
    }

    pub fn unload(&mut self) {
        self.table = None;
        self.hidden.clear();
        self.rows.clear();
        self.index.clear();
        self.total = 0;
        self.has_more = false;
        self.deleted.clear();
        self.errors.clear();
    }

    pub fn table(&self) -> Option<&Table> {
        self.table.as_ref()
    }

    pub fn columns(&self) -> &[Column] {
        self.table
            .as_ref()
            .map(|table| table.columns.as_slice())
            .unwrap_or_default()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.table.as_ref().and_then(|table| table.column(name))
    }

    /// Columns the grid shows, in display order.
    pub fn visible_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns()
            .iter()
            .filter(|column| !self.hidden.contains(&column.name))
    }

    pub fn visible_count(&self) -> usize {
        self.visible_columns().count()
    }

    /// The `index`th visible column.
    pub fn column_at(&self, index: usize) -> Option<&Column> {
        self.visible_columns().nth(index)
    }

    pub fn hidden_columns(&self) -> Vec<String> {
        self.hidden.iter().cloned().collect()
    }

    pub fn is_hidden(&self, column: &str) -> bool {
        self.hidden.contains(column)
    }

    pub fn set_hidden(&mut self, columns: &[String]) {
        self.hidden = columns.iter().cloned().collect();
    }

    /// Returns false when the column was already hidden.
    pub fn hide_column(&mut self, column: &str) -> bool {
        self.hidden.insert(column.to_owned())
    }

    pub fn show_column(&mut self, column: &str) -> bool {
        self.hidden.remove(column)
    }

    pub fn rows(&self) -> &[GridRow] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&GridRow> {
        self.rows.get(index)
    }

    pub fn row_by_id(&self, row_id: RowId) -> Option<&GridRow> {
        self.index.get(&row_id).and_then(|index| self.rows.get(*index))
    }

    pub fn position(&self, row_id: RowId) -> Option<usize> {
        self.index.get(&row_id).copied()
    }

    pub fn value(&self, row_id: RowId, column: &str) -> Option<&CellValue> {
        self.row_by_id(row_id).and_then(|row| row.value(column))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Rebuild the row mirror from a fetch. Buffered edits win over fetched
    /// values and rows deleted locally stay hidden.
    pub fn replace_rows(&mut self, page: RowPage, buffer: &CellEditBuffer) {
        self.rows.clear();
        self.index.clear();
        self.total = page.total;
        self.has_more = page.has_more;
        self.push_page_rows(page.rows, buffer);
    }

    /// Append the next page. Rows already loaded are skipped.
    pub fn append_page(&mut self, page: RowPage, buffer: &CellEditBuffer) {
        self.total = page.total;
        self.has_more = page.has_more;
        self.push_page_rows(page.rows, buffer);
    }

    pub fn append_row(&mut self, row: Row, buffer: &CellEditBuffer) {
        if self.index.contains_key(&row.id) {
            return;
        }
        self.total += 1;
        let grid_row = self.materialize(row, buffer);
        self.index.insert(grid_row.id, self.rows.len());
        self.rows.push(grid_row);
    }

    /// Overwrite one cell and return what it held before.
    pub fn patch_cell(
        &mut self,
        row_id: RowId,
        column: &str,
        value: CellValue,
    ) -> Option<CellValue> {
        let index = *self.index.get(&row_id)?;
        let row = self.rows.get_mut(index)?;
        row.cells.insert(column.to_owned(), value)
    }

    pub fn rename_column(&mut self, old: &str, new: &str) {
        if let Some(table) = &mut self.table
            && let Some(column) = table.columns.iter_mut().find(|column| column.name == old)
        {
            column.name = new.to_owned();
        }
        for row in &mut self.rows {
            if let Some(value) = row.cells.remove(old) {
                row.cells.insert(new.to_owned(), value);
            }
        }
        if self.hidden.remove(old) {
            self.hidden.insert(new.to_owned());
        }
        let moved = self
            .errors
            .iter()
            .filter(|key| key.column == old)
            .cloned()
            .collect::<Vec<_>>();
        for key in moved {
            self.errors.remove(&key);
            self.errors.insert(CellKey::new(key.row_id, new));
        }
    }

    /// Change a column's type and coerce every loaded value for it.
    pub fn retype_column(&mut self, name: &str, to: ColumnType) -> Option<ColumnType> {
        let table = self.table.as_mut()?;
        let column = table.columns.iter_mut().find(|column| column.name == name)?;
        let from = column.column_type;
        column.column_type = to;
        for row in &mut self.rows {
            if let Some(value) = row.cells.get_mut(name) {
                *value = values::coerce(value, from, to);
            }
        }
        Some(from)
    }

    /// Append a column and give every loaded row its default value.
    pub fn push_column(&mut self, column: Column) {
        let default = values::default_value(column.column_type);
        for row in &mut self.rows {
            row.cells
                .entry(column.name.clone())
                .or_insert_with(|| default.clone());
        }
        if let Some(table) = &mut self.table {
            table.columns.push(column);
        }
    }

    /// Swap a column's metadata in place, e.g. a temporary column for the
    /// one storage created.
    pub fn replace_column(&mut self, column_id: ColumnId, column: Column) -> bool {
        let Some(table) = &mut self.table else {
            return false;
        };
        match table.columns.iter_mut().find(|existing| existing.id == column_id) {
            Some(existing) => {
                *existing = column;
                true
            }
            None => false,
        }
    }

    /// Drop a column from metadata only. Row cells keep the orphaned key
    /// until the next fetch rebuilds them.
    pub fn remove_column(&mut self, column_id: ColumnId) -> Option<Column> {
        let table = self.table.as_mut()?;
        let position = table
            .columns
            .iter()
            .position(|column| column.id == column_id)?;
        let removed = table.columns.remove(position);
        for (order, column) in table.columns.iter_mut().enumerate() {
            column.order = order as i64;
        }
        self.hidden.remove(&removed.name);
        Some(removed)
    }

    /// Put the columns in `order`. Ids missing from `order` keep their
    /// relative order after the listed ones.
    pub fn reorder_columns(&mut self, order: &[ColumnId]) {
        let Some(table) = &mut self.table else {
            return;
        };
        table.columns.sort_by_key(|column| {
            order
                .iter()
                .position(|id| *id == column.id)
                .unwrap_or(order.len())
        });
        for (position, column) in table.columns.iter_mut().enumerate() {
            column.order = position as i64;
        }
    }

    /// Hide a row immediately; later fetches keep filtering it out.
    pub fn hide_row(&mut self, row_id: RowId) -> Option<(usize, GridRow)> {
        let position = self.index.get(&row_id).copied()?;
        let row = self.rows.remove(position);
        self.deleted.insert(row_id);
        self.total = self.total.saturating_sub(1);
        self.reindex();
        Some((position, row))
    }

    /// Undo `hide_row` after storage refused the delete.
    pub fn restore_row(&mut self, position: usize, row: GridRow) {
        self.deleted.remove(&row.id);
        if self.index.contains_key(&row.id) {
            return;
        }
        let position = position.min(self.rows.len());
        self.rows.insert(position, row);
        self.total += 1;
        self.reindex();
    }

    pub fn is_deleted(&self, row_id: RowId) -> bool {
        self.deleted.contains(&row_id)
    }

    /// Stop tracking rows whose delete storage confirmed. Fetches issued
    /// after the delete no longer return them.
    pub fn forget_deleted(&mut self, row_ids: &[RowId]) {
        for row_id in row_ids {
            self.deleted.remove(row_id);
        }
    }

    pub fn mark_error(&mut self, key: CellKey) {
        self.errors.insert(key);
    }

    pub fn clear_error(&mut self, key: &CellKey) {
        self.errors.remove(key);
    }

    pub fn has_error(&self, key: &CellKey) -> bool {
        self.errors.contains(key)
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    fn push_page_rows(&mut self, rows: Vec<Row>, buffer: &CellEditBuffer) {
        for row in rows {
            if self.deleted.contains(&row.id) {
                self.total = self.total.saturating_sub(1);
                continue;
            }
            if self.index.contains_key(&row.id) {
                continue;
            }
            let grid_row = self.materialize(row, buffer);
            self.index.insert(grid_row.id, self.rows.len());
            self.rows.push(grid_row);
        }
    }

    fn materialize(&self, row: Row, buffer: &CellEditBuffer) -> GridRow {
        let mut cells = BTreeMap::new();
        for column in self.columns() {
            let raw = row.data.get(&column.name).map(String::as_str);
            cells.insert(
                column.name.clone(),
                values::from_wire(raw, column.column_type),
            );
        }
        buffer.overlay(row.id, &mut cells);
        GridRow {
            id: row.id,
            order: row.order,
            cells,
        }
    }

    fn reindex(&mut self) {
        self.index = self
            .rows
            .iter()
            .enumerate()
            .map(|(position, row)| (row.id, position))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{BaseId, TableId};
    use crate::model::RowData;

    fn table() -> Table {
        let column = |id: i64, name: &str, column_type| Column {
            id: ColumnId::new(id),
            table_id: TableId::new(1),
            name: name.to_owned(),
            column_type,
            order: id - 1,
        };
        Table {
            id: TableId::new(1),
            base_id: BaseId::new(1),
            name: "Table 1".to_owned(),
            columns: vec![
                column(1, "Name", ColumnType::Text),
                column(2, "Status", ColumnType::Text),
                column(3, "Priority", ColumnType::Number),
            ],
            row_count: 0,
        }
    }

    fn row(id: i64, name: &str, status: &str, priority: &str) -> Row {
        let mut data = RowData::new();
        data.insert("Name".to_owned(), name.to_owned());
        data.insert("Status".to_owned(), status.to_owned());
        data.insert("Priority".to_owned(), priority.to_owned());
        Row {
            id: RowId::new(id),
            table_id: TableId::new(1),
            order: id - 1,
            data,
        }
    }

    fn loaded_store() -> OptimisticGridStore {
        let mut store = OptimisticGridStore::new();
        store.load_table(table());
        store.replace_rows(
            RowPage {
                rows: vec![row(1, "Ada", "Todo", "3"), row(2, "Lin", "Done", "1")],
                total: 2,
                has_more: false,
            },
            &CellEditBuffer::new(),
        );
        store
    }

    #[test]
    fn fetched_rows_are_typed_by_column() {
        let store = loaded_store();
        assert_eq!(
            store.value(RowId::new(1), "Priority"),
            Some(&CellValue::Number(3.0))
        );
        assert_eq!(
            store.value(RowId::new(2), "Name"),
            Some(&CellValue::Text("Lin".to_owned()))
        );
    }

    #[test]
    fn buffered_values_win_over_fetched_values() {
        let mut store = loaded_store();
        let mut buffer = CellEditBuffer::new();
        buffer.set(
            CellKey::new(RowId::new(1), "Name"),
            CellValue::Text("Grace".to_owned()),
            CellValue::Text("Ada".to_owned()),
        );

        store.replace_rows(
            RowPage {
                rows: vec![row(1, "Ada", "Todo", "3")],
                total: 1,
                has_more: false,
            },
            &buffer,
        );
        assert_eq!(
            store.value(RowId::new(1), "Name"),
            Some(&CellValue::Text("Grace".to_owned()))
        );
    }

    #[test]
    fn rename_moves_every_loaded_value() {
        let mut store = loaded_store();
        store.rename_column("Status", "Stage");

        assert!(store.column("Status").is_none());
        assert!(store.column("Stage").is_some());
        for row in store.rows() {
            assert!(!row.cells.contains_key("Status"));
            assert!(row.cells.contains_key("Stage"));
        }
        assert_eq!(
            store.value(RowId::new(2), "Stage"),
            Some(&CellValue::Text("Done".to_owned()))
        );
    }

    #[test]
    fn retype_coerces_loaded_values() {
        let mut store = loaded_store();
        assert_eq!(
            store.retype_column("Status", ColumnType::Number),
            Some(ColumnType::Text)
        );
        assert_eq!(store.value(RowId::new(1), "Status"), Some(&CellValue::Null));
        store.retype_column("Priority", ColumnType::Text);
        assert_eq!(
            store.value(RowId::new(1), "Priority"),
            Some(&CellValue::Text("3".to_owned()))
        );
    }

    #[test]
    fn pushed_column_gets_type_default_in_every_row() {
        let mut store = loaded_store();
        store.push_column(Column {
            id: ColumnId::temporary(0),
            table_id: TableId::new(1),
            name: "Score".to_owned(),
            column_type: ColumnType::Number,
            order: 3,
        });
        store.push_column(Column {
            id: ColumnId::temporary(1),
            table_id: TableId::new(1),
            name: "Notes".to_owned(),
            column_type: ColumnType::Text,
            order: 4,
        });
        for row in store.rows() {
            assert_eq!(row.value("Score"), Some(&CellValue::Null));
            assert_eq!(row.value("Notes"), Some(&CellValue::Text(String::new())));
        }
        assert_eq!(store.columns().len(), 5);
    }

    #[test]
    fn replace_column_swaps_temporary_id() {
        let mut store = loaded_store();
        let temporary = ColumnId::temporary(0);
        let pending = Column {
            id: temporary,
            table_id: TableId::new(1),
            name: "Score".to_owned(),
            column_type: ColumnType::Number,
            order: 3,
        };
        store.push_column(pending.clone());
        let saved = Column {
            id: ColumnId::new(9),
            ..pending
        };
        assert!(store.replace_column(temporary, saved));
        assert_eq!(store.column("Score").map(|c| c.id), Some(ColumnId::new(9)));
        assert!(!store.replace_column(temporary, store.columns()[0].clone()));
    }

    #[test]
    fn hidden_rows_stay_hidden_across_fetches() {
        let mut store = loaded_store();
        let hidden = store.hide_row(RowId::new(1));
        assert!(hidden.is_some());
        assert_eq!(store.len(), 1);
        assert_eq!(store.total(), 1);

        store.replace_rows(
            RowPage {
                rows: vec![row(1, "Ada", "Todo", "3"), row(2, "Lin", "Done", "1")],
                total: 2,
                has_more: false,
            },
            &CellEditBuffer::new(),
        );
        assert_eq!(store.len(), 1);
        assert!(store.row_by_id(RowId::new(1)).is_none());
        assert_eq!(store.total(), 1);
    }

    #[test]
    fn restore_row_puts_it_back_in_place() {
        let mut store = loaded_store();
        let (position, hidden) = store.hide_row(RowId::new(1)).expect("row exists");
        store.restore_row(position, hidden);
        assert_eq!(store.position(RowId::new(1)), Some(0));
        assert_eq!(store.position(RowId::new(2)), Some(1));
        assert!(!store.is_deleted(RowId::new(1)));
    }

    #[test]
    fn confirmed_deletes_are_forgotten() {
        let mut store = loaded_store();
        store.hide_row(RowId::new(1));
        store.hide_row(RowId::new(2));
        store.forget_deleted(&[RowId::new(1)]);
        assert!(!store.is_deleted(RowId::new(1)));
        assert!(store.is_deleted(RowId::new(2)));
        assert!(store.is_empty());
    }

    #[test]
    fn hidden_columns_are_skipped_by_position() {
        let mut store = loaded_store();
        assert!(store.hide_column("Status"));
        assert!(!store.hide_column("Status"));
        assert_eq!(store.visible_count(), 2);
        assert_eq!(store.column_at(1).map(|c| c.name.as_str()), Some("Priority"));
        assert!(store.rows()[0].cells.contains_key("Status"));

        store.rename_column("Status", "Stage");
        assert_eq!(store.hidden_columns(), vec!["Stage".to_owned()]);
        store.remove_column(ColumnId::new(2));
        assert!(store.hidden_columns().is_empty());
        assert_eq!(store.visible_count(), 2);
    }

    #[test]
    fn reorder_renumbers_columns() {
        let mut store = loaded_store();
        store.reorder_columns(&[ColumnId::new(3), ColumnId::new(1), ColumnId::new(2)]);
        let names = store
            .columns()
            .iter()
            .map(|column| (column.name.as_str(), column.order))
            .collect::<Vec<_>>();
        assert_eq!(names, vec![("Priority", 0), ("Name", 1), ("Status", 2)]);
    }

    #[test]
    fn append_page_skips_duplicates() {
        let mut store = loaded_store();
        store.append_page(
            RowPage {
                rows: vec![row(2, "Lin", "Done", "1"), row(3, "Kay", "Todo", "2")],
                total: 3,
                has_more: false,
            },
            &CellEditBuffer::new(),
        );
        assert_eq!(store.len(), 3);
        assert_eq!(store.position(RowId::new(3)), Some(2));
    }

    #[test]
    fn remove_column_keeps_orphaned_cells() {
        let mut store = loaded_store();
        let removed = store.remove_column(ColumnId::new(2));
        assert_eq!(removed.map(|column| column.name), Some("Status".to_owned()));
        assert_eq!(store.columns().len(), 2);
        assert_eq!(store.columns()[1].order, 1);
        assert!(store.rows()[0].cells.contains_key("Status"));
    }
}

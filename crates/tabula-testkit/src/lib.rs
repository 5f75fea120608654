// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod contract;

use anyhow::{Context, Result, anyhow, bail};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tabula_app::query;
use tabula_app::{
    BaseId, Column, ColumnId, ColumnType, DEFAULT_COLUMNS, DEFAULT_VIEW_NAME, GridController,
    GridFaker, MAX_GENERATED_ROWS, MAX_PAGE_SIZE, PersistenceGateway, Row, RowData, RowId,
    RowPage, RowQuery, SEED_ROW_COUNT, Table, TableId, View, ViewConfig, ViewId, ViewPatch,
    normalize_record, run_inline, validate_column_name, validate_column_order,
    validate_table_name, validate_view_name,
};

pub const FAKER_SEED: u64 = 42;

#[derive(Debug, Default)]
struct Failures {
    once: BTreeMap<&'static str, usize>,
    always: BTreeSet<&'static str>,
}

struct MemoryState {
    next_id: i64,
    tables: Vec<Table>,
    rows: BTreeMap<RowId, Row>,
    views: Vec<View>,
    next_order: BTreeMap<TableId, i64>,
    failures: Failures,
    calls: Vec<&'static str>,
    faker: GridFaker,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, op: &'static str) -> Result<()> {
        self.calls.push(op);
        if self.failures.always.contains(op) {
            bail!("injected failure for {op}");
        }
        if let Some(remaining) = self.failures.once.get_mut(op) {
            *remaining -= 1;
            if *remaining == 0 {
                self.failures.once.remove(op);
            }
            bail!("injected failure for {op}");
        }
        Ok(())
    }

    fn table(&self, table_id: TableId) -> Result<&Table> {
        self.tables
            .iter()
            .find(|table| table.id == table_id)
            .ok_or_else(|| anyhow!("table {table_id} not found -- reload the base"))
    }

    fn table_mut(&mut self, table_id: TableId) -> Result<&mut Table> {
        self.tables
            .iter_mut()
            .find(|table| table.id == table_id)
            .ok_or_else(|| anyhow!("table {table_id} not found -- reload the base"))
    }

    fn view(&self, view_id: ViewId) -> Result<&View> {
        self.views
            .iter()
            .find(|view| view.id == view_id)
            .ok_or_else(|| anyhow!("view {view_id} not found -- reload the views"))
    }

    fn view_mut(&mut self, view_id: ViewId) -> Result<&mut View> {
        self.views
            .iter_mut()
            .find(|view| view.id == view_id)
            .ok_or_else(|| anyhow!("view {view_id} not found -- reload the views"))
    }

    fn insert_view(&mut self, table_id: TableId, name: String, config: ViewConfig) -> View {
        let view = View {
            id: ViewId::new(self.next_id()),
            table_id,
            name,
            config,
        };
        self.views.push(view.clone());
        view
    }

    fn column_owner(&self, column_id: ColumnId) -> Result<TableId> {
        self.tables
            .iter()
            .find(|table| table.column_by_id(column_id).is_some())
            .map(|table| table.id)
            .ok_or_else(|| anyhow!("column {column_id} not found -- reload the table"))
    }

    fn insert_row(&mut self, table_id: TableId, data: RowData) -> Row {
        let id = RowId::new(self.next_id());
        let order = self.next_order.entry(table_id).or_insert(0);
        let row = Row {
            id,
            table_id,
            order: *order,
            data,
        };
        *order += 1;
        self.rows.insert(id, row.clone());
        row
    }

    fn rows_of(&self, table_id: TableId) -> impl Iterator<Item = &Row> {
        self.rows.values().filter(move |row| row.table_id == table_id)
    }

    fn with_row_count(&self, table: &Table) -> Table {
        Table {
            row_count: self.rows_of(table.id).count(),
            ..table.clone()
        }
    }
}

/// In-memory [`PersistenceGateway`] with the same rules as the SQLite store.
/// Clones share state, so a test can keep a handle while a worker owns
/// another.
#[derive(Clone)]
pub struct MemoryGateway {
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                next_id: 0,
                tables: Vec::new(),
                rows: BTreeMap::new(),
                views: Vec::new(),
                next_order: BTreeMap::new(),
                failures: Failures::default(),
                calls: Vec::new(),
                faker: GridFaker::new(FAKER_SEED),
            })),
        }
    }

    /// A gateway holding one seeded table in base 1.
    pub fn with_table() -> Result<(Self, Table)> {
        let gateway = Self::new();
        let table = gateway.create_table(BaseId::new(1), "Table 1")?;
        gateway.clear_calls();
        Ok((gateway, table))
    }

    /// Fail the next `times` calls of one operation, e.g. `"update row"`.
    pub fn fail_next(&self, op: &'static str, times: usize) {
        if times > 0 {
            self.lock().failures.once.insert(op, times);
        }
    }

    pub fn fail_always(&self, op: &'static str) {
        self.lock().failures.always.insert(op);
    }

    pub fn heal(&self) {
        self.lock().failures = Failures::default();
    }

    /// Operation labels in the order they were called.
    pub fn calls(&self) -> Vec<&'static str> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn row_count(&self, table_id: TableId) -> usize {
        self.lock().rows_of(table_id).count()
    }

    pub fn rows(&self, table_id: TableId) -> Vec<Row> {
        let mut rows = self.lock().rows_of(table_id).cloned().collect::<Vec<_>>();
        rows.sort_by_key(|row| row.order);
        rows
    }

    pub fn row(&self, row_id: RowId) -> Option<Row> {
        self.lock().rows.get(&row_id).cloned()
    }

    /// Saved views of a table, without touching the call log.
    pub fn views(&self, table_id: TableId) -> Vec<View> {
        self.lock()
            .views
            .iter()
            .filter(|view| view.table_id == table_id)
            .cloned()
            .collect()
    }

    /// Insert rows directly, bypassing failure injection and the call log.
    pub fn seed_rows(&self, table_id: TableId, records: Vec<RowData>) {
        let mut state = self.lock();
        for data in records {
            state.insert_row(table_id, data);
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PersistenceGateway for MemoryGateway {
    fn list_tables(&self, base_id: BaseId) -> Result<Vec<Table>> {
        let mut state = self.lock();
        state.record("list tables")?;
        Ok(state
            .tables
            .iter()
            .filter(|table| table.base_id == base_id)
            .map(|table| state.with_row_count(table))
            .collect())
    }

    fn create_row(&self, table_id: TableId, data: &RowData) -> Result<Row> {
        let mut state = self.lock();
        state.record("create row")?;
        let data = normalize_record(&state.table(table_id)?.columns, data);
        Ok(state.insert_row(table_id, data))
    }

    fn bulk_create_rows(&self, table_id: TableId, records: &[RowData]) -> Result<usize> {
        let mut state = self.lock();
        state.record("bulk create rows")?;
        let columns = state.table(table_id)?.columns.clone();
        for record in records {
            state.insert_row(table_id, normalize_record(&columns, record));
        }
        Ok(records.len())
    }

    fn update_row(&self, row_id: RowId, data: &RowData) -> Result<Row> {
        let mut state = self.lock();
        state.record("update row")?;
        let table_id = state
            .rows
            .get(&row_id)
            .map(|row| row.table_id)
            .ok_or_else(|| anyhow!("row {row_id} not found -- reload the table"))?;
        let columns = state.table(table_id)?.columns.clone();
        let row = state
            .rows
            .get_mut(&row_id)
            .ok_or_else(|| anyhow!("row {row_id} not found -- reload the table"))?;
        for (key, value) in data {
            if columns.iter().any(|column| &column.name == key) {
                row.data.insert(key.clone(), value.clone());
            }
        }
        Ok(row.clone())
    }

    fn delete_row(&self, row_id: RowId) -> Result<()> {
        let mut state = self.lock();
        state.record("delete row")?;
        state
            .rows
            .remove(&row_id)
            .map(|_| ())
            .ok_or_else(|| anyhow!("row {row_id} not found -- reload the table"))
    }

    fn bulk_delete_rows(&self, row_ids: &[RowId]) -> Result<usize> {
        let mut state = self.lock();
        state.record("bulk delete rows")?;
        Ok(row_ids
            .iter()
            .filter(|row_id| state.rows.remove(*row_id).is_some())
            .count())
    }

    fn get_rows_page(
        &self,
        table_id: TableId,
        limit: usize,
        offset: usize,
        query: &RowQuery,
    ) -> Result<RowPage> {
        let mut state = self.lock();
        state.record("get rows page")?;
        let columns = state.table(table_id)?.columns.clone();
        let mut rows = state
            .rows_of(table_id)
            .filter(|row| query::matches(row, &columns, query))
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by_key(|row| row.order);
        query::sort_rows(&mut rows, &columns, query);
        let total = rows.len();
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let page = rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect::<Vec<_>>();
        let has_more = offset + page.len() < total;
        Ok(RowPage {
            rows: page,
            total,
            has_more,
        })
    }

    fn create_column(
        &self,
        table_id: TableId,
        name: &str,
        column_type: ColumnType,
    ) -> Result<Column> {
        let mut state = self.lock();
        state.record("create column")?;
        let name = validate_column_name(name)?;
        let id = ColumnId::new(state.next_id());
        let table = state.table_mut(table_id)?;
        if table.has_column_named(&name) {
            bail!("column {name:?} already exists -- choose a different name");
        }
        let column = Column {
            id,
            table_id,
            name,
            column_type,
            order: table.columns.len() as i64,
        };
        table.columns.push(column.clone());
        Ok(column)
    }

    fn update_column(
        &self,
        column_id: ColumnId,
        name: Option<&str>,
        column_type: Option<ColumnType>,
    ) -> Result<Column> {
        let mut state = self.lock();
        state.record("update column")?;
        let table_id = state.column_owner(column_id)?;
        let table = state.table_mut(table_id)?;
        let mut renamed = None;
        if let Some(raw) = name {
            let name = validate_column_name(raw)?;
            let clash = table
                .columns
                .iter()
                .any(|column| column.id != column_id && column.name.eq_ignore_ascii_case(&name));
            if clash {
                bail!("column {name:?} already exists -- choose a different name");
            }
            renamed = Some(name);
        }
        let column = table
            .columns
            .iter_mut()
            .find(|column| column.id == column_id)
            .context("column vanished during update")?;
        let old_name = column.name.clone();
        if let Some(name) = &renamed {
            column.name = name.clone();
        }
        if let Some(column_type) = column_type {
            column.column_type = column_type;
        }
        let updated = column.clone();
        if let Some(new_name) = renamed {
            for row in state.rows.values_mut().filter(|row| row.table_id == table_id) {
                if let Some(value) = row.data.remove(&old_name) {
                    row.data.insert(new_name.clone(), value);
                }
            }
            for view in state.views.iter_mut().filter(|view| view.table_id == table_id) {
                view.config.rename_column(&old_name, &new_name);
            }
        }
        Ok(updated)
    }

    fn delete_column(&self, column_id: ColumnId) -> Result<()> {
        let mut state = self.lock();
        state.record("delete column")?;
        let table_id = state.column_owner(column_id)?;
        let table = state.table_mut(table_id)?;
        let position = table
            .columns
            .iter()
            .position(|column| column.id == column_id)
            .context("column vanished during delete")?;
        let removed = table.columns.remove(position);
        for (order, column) in table.columns.iter_mut().enumerate() {
            column.order = order as i64;
        }
        for row in state.rows.values_mut().filter(|row| row.table_id == table_id) {
            row.data.remove(&removed.name);
        }
        for view in state.views.iter_mut().filter(|view| view.table_id == table_id) {
            view.config.remove_column(&removed.name);
        }
        Ok(())
    }

    fn reorder_columns(&self, table_id: TableId, order: &[ColumnId]) -> Result<Vec<Column>> {
        let mut state = self.lock();
        state.record("reorder columns")?;
        let table = state.table_mut(table_id)?;
        validate_column_order(&table.columns, order)?;
        for column in &mut table.columns {
            if let Some(position) = order.iter().position(|id| *id == column.id) {
                column.order = position as i64;
            }
        }
        table.columns.sort_by_key(|column| column.order);
        Ok(table.columns.clone())
    }

    fn create_table(&self, base_id: BaseId, name: &str) -> Result<Table> {
        let mut state = self.lock();
        state.record("create table")?;
        let name = validate_table_name(name)?;
        let table_id = TableId::new(state.next_id());
        let mut columns = Vec::with_capacity(DEFAULT_COLUMNS.len());
        for (order, (column_name, column_type)) in DEFAULT_COLUMNS.iter().enumerate() {
            columns.push(Column {
                id: ColumnId::new(state.next_id()),
                table_id,
                name: (*column_name).to_owned(),
                column_type: *column_type,
                order: order as i64,
            });
        }
        let table = Table {
            id: table_id,
            base_id,
            name,
            columns,
            row_count: 0,
        };
        state.tables.push(table.clone());
        for _ in 0..SEED_ROW_COUNT {
            let data = state.faker.seeded_row(&table.columns);
            state.insert_row(table_id, data);
        }
        Ok(state.with_row_count(&table))
    }

    fn rename_table(&self, table_id: TableId, name: &str) -> Result<Table> {
        let mut state = self.lock();
        state.record("rename table")?;
        let name = validate_table_name(name)?;
        state.table_mut(table_id)?.name = name;
        let table = state.table(table_id)?;
        Ok(state.with_row_count(table))
    }

    fn delete_table(&self, table_id: TableId) -> Result<()> {
        let mut state = self.lock();
        state.record("delete table")?;
        let base_id = state.table(table_id)?.base_id;
        let siblings = state
            .tables
            .iter()
            .filter(|table| table.base_id == base_id)
            .count();
        if siblings <= 1 {
            bail!("cannot delete the last table in a base -- create another table first");
        }
        state.tables.retain(|table| table.id != table_id);
        state.rows.retain(|_, row| row.table_id != table_id);
        state.views.retain(|view| view.table_id != table_id);
        Ok(())
    }

    fn generate_fake_rows(&self, table_id: TableId, count: usize) -> Result<usize> {
        let mut state = self.lock();
        state.record("generate fake rows")?;
        if !(1..=MAX_GENERATED_ROWS).contains(&count) {
            bail!("row count must be between 1 and {MAX_GENERATED_ROWS}, got {count}");
        }
        let columns = state.table(table_id)?.columns.clone();
        for _ in 0..count {
            let data = state.faker.generated_record(&columns);
            state.insert_row(table_id, data);
        }
        Ok(count)
    }

    fn list_views(&self, table_id: TableId) -> Result<Vec<View>> {
        let mut state = self.lock();
        state.record("list views")?;
        state.table(table_id)?;
        Ok(state
            .views
            .iter()
            .filter(|view| view.table_id == table_id)
            .cloned()
            .collect())
    }

    fn get_view(&self, view_id: ViewId) -> Result<View> {
        let mut state = self.lock();
        state.record("get view")?;
        state.view(view_id).cloned()
    }

    fn create_view(&self, table_id: TableId, name: &str, config: &ViewConfig) -> Result<View> {
        let mut state = self.lock();
        state.record("create view")?;
        let name = validate_view_name(name)?;
        state.table(table_id)?;
        Ok(state.insert_view(table_id, name, config.clone()))
    }

    fn update_view(&self, view_id: ViewId, patch: &ViewPatch) -> Result<View> {
        let mut state = self.lock();
        state.record("update view")?;
        if let Some(name) = &patch.name {
            validate_view_name(name)?;
        }
        let view = state.view_mut(view_id)?;
        let trimmed = ViewPatch {
            name: patch.name.as_deref().map(|name| name.trim().to_owned()),
            ..patch.clone()
        };
        trimmed.apply(view);
        Ok(view.clone())
    }

    fn delete_view(&self, view_id: ViewId) -> Result<()> {
        let mut state = self.lock();
        state.record("delete view")?;
        state.view(view_id)?;
        state.views.retain(|view| view.id != view_id);
        Ok(())
    }

    fn duplicate_view(&self, view_id: ViewId, name: &str) -> Result<View> {
        let mut state = self.lock();
        state.record("duplicate view")?;
        let name = validate_view_name(name)?;
        let source = state.view(view_id)?.clone();
        Ok(state.insert_view(source.table_id, name, source.config))
    }

    fn default_view(&self, table_id: TableId) -> Result<View> {
        let mut state = self.lock();
        state.record("default view")?;
        state.table(table_id)?;
        if let Some(first) = state.views.iter().find(|view| view.table_id == table_id) {
            return Ok(first.clone());
        }
        Ok(state.insert_view(table_id, DEFAULT_VIEW_NAME.to_owned(), ViewConfig::default()))
    }
}

/// Run the controller's queued requests inline, feeding completions back,
/// until nothing new is queued. Returns how many requests ran.
pub fn settle<G>(controller: &mut GridController, gateway: &G) -> usize
where
    G: PersistenceGateway + ?Sized,
{
    let mut executed = 0;
    loop {
        let batch = controller.take_requests();
        if batch.is_empty() {
            return executed;
        }
        executed += batch.len();
        let now = Instant::now();
        for completion in run_inline(gateway, batch) {
            controller.complete(completion, now);
        }
    }
}

pub fn temp_db_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let db_path = dir.path().join("tabula.db");
    Ok((dir, db_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_app::{Filter, FilterOperator, Sort, SortDirection};

    #[test]
    fn memory_gateway_meets_contract() -> Result<()> {
        contract::run_all(&MemoryGateway::new(), BaseId::new(1))
    }

    #[test]
    fn injected_failures_fire_once_per_count() -> Result<()> {
        let (gateway, table) = MemoryGateway::with_table()?;
        let row = gateway.rows(table.id)[0].clone();
        gateway.fail_next("update row", 1);

        assert!(gateway.update_row(row.id, &RowData::new()).is_err());
        assert!(gateway.update_row(row.id, &RowData::new()).is_ok());
        assert_eq!(gateway.calls(), vec!["update row", "update row"]);
        Ok(())
    }

    #[test]
    fn fail_always_until_healed() -> Result<()> {
        let (gateway, table) = MemoryGateway::with_table()?;
        gateway.fail_always("list tables");
        assert!(gateway.list_tables(table.base_id).is_err());
        assert!(gateway.list_tables(table.base_id).is_err());
        gateway.heal();
        assert_eq!(gateway.list_tables(table.base_id)?.len(), 1);
        Ok(())
    }

    #[test]
    fn clones_share_state() -> Result<()> {
        let (gateway, table) = MemoryGateway::with_table()?;
        let handle = gateway.clone();
        gateway.generate_fake_rows(table.id, 5)?;
        assert_eq!(handle.row_count(table.id), SEED_ROW_COUNT + 5);
        Ok(())
    }

    #[test]
    fn filtered_pages_report_filtered_totals() -> Result<()> {
        let (gateway, table) = MemoryGateway::with_table()?;
        let mut data = RowData::new();
        data.insert("Name".to_owned(), "Zed Unique".to_owned());
        data.insert("Priority".to_owned(), "900".to_owned());
        gateway.seed_rows(table.id, vec![data]);

        let query = RowQuery {
            search: None,
            filters: vec![Filter {
                column: "Priority".to_owned(),
                operator: FilterOperator::GreaterThan,
                value: "100".to_owned(),
            }],
            sorts: vec![Sort {
                column: "Name".to_owned(),
                direction: SortDirection::Asc,
            }],
        };
        let page = gateway.get_rows_page(table.id, 50, 0, &query)?;
        assert_eq!(page.total, 1);
        assert_eq!(page.rows[0].data["Name"], "Zed Unique");
        assert!(!page.has_more);
        Ok(())
    }
}

// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod page;

use anyhow::{Context, Result, anyhow, bail};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Transaction, params, params_from_iter};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tabula_app::{
    Base, BaseId, Column, ColumnId, ColumnType, DEFAULT_COLUMNS, DEFAULT_VIEW_NAME, GridFaker,
    MAX_GENERATED_ROWS, MAX_PAGE_SIZE, PersistenceGateway, Row, RowData, RowId, RowPage, RowQuery,
    SEED_ROW_COUNT, Table, TableId, View, ViewConfig, ViewId, ViewPatch, normalize_record,
    validate_column_name, validate_column_order, validate_table_name, validate_view_name,
};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info};

use crate::page::json_path;

pub const APP_NAME: &str = "tabula";

/// Rows generated per transaction by [`Store::generate_fake_rows`].
const GENERATE_CHUNK: usize = 1000;

const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[
    ("bases", &["id", "name", "created_at", "updated_at"]),
    (
        "grid_tables",
        &[
            "id",
            "base_id",
            "name",
            "next_row_order",
            "created_at",
            "updated_at",
        ],
    ),
    (
        "grid_columns",
        &[
            "id",
            "table_id",
            "name",
            "column_type",
            "column_order",
            "created_at",
            "updated_at",
        ],
    ),
    (
        "grid_rows",
        &[
            "id",
            "table_id",
            "row_order",
            "data",
            "created_at",
            "updated_at",
        ],
    ),
    (
        "grid_views",
        &[
            "id",
            "table_id",
            "name",
            "filters",
            "sorts",
            "hidden_columns",
            "created_at",
            "updated_at",
        ],
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RequiredIndex {
    name: &'static str,
    create_sql: &'static str,
}

const REQUIRED_INDEXES: &[RequiredIndex] = &[
    RequiredIndex {
        name: "idx_grid_tables_base_id",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_grid_tables_base_id ON grid_tables (base_id);",
    },
    RequiredIndex {
        name: "idx_grid_columns_table_name",
        create_sql: "CREATE UNIQUE INDEX IF NOT EXISTS idx_grid_columns_table_name ON grid_columns (table_id, name COLLATE NOCASE);",
    },
    RequiredIndex {
        name: "idx_grid_rows_table_order",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_grid_rows_table_order ON grid_rows (table_id, row_order);",
    },
    RequiredIndex {
        name: "idx_grid_views_table_id",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_grid_views_table_id ON grid_views (table_id);",
    },
];

/// SQLite-backed storage for bases, tables, columns, rows and views.
pub struct Store {
    conn: Connection,
    faker: RefCell<GridFaker>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_db_path(&printable)?;
        let conn = Connection::open(path)
            .with_context(|| format!("open database at {}", path.display()))?;
        configure_connection(&conn)?;
        Ok(Self::with_connection(conn))
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        configure_connection(&conn)?;
        Ok(Self::with_connection(conn))
    }

    fn with_connection(conn: Connection) -> Self {
        Self {
            conn,
            faker: RefCell::new(GridFaker::from_clock()),
        }
    }

    /// Make generated rows reproducible.
    pub fn set_faker_seed(&mut self, seed: u64) {
        self.faker = RefCell::new(GridFaker::new(seed));
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bootstrap(&self) -> Result<()> {
        if has_user_tables(&self.conn)? {
            validate_schema(&self.conn)?;
        } else {
            self.conn
                .execute_batch(include_str!("sql/schema.sql"))
                .context("create schema")?;
            info!("created database schema");
        }

        ensure_required_indexes(&self.conn)?;
        Ok(())
    }

    // --- bases ---------------------------------------------------------

    pub fn create_base(&self, name: &str) -> Result<Base> {
        let name = validate_base_name(name)?;
        let now = OffsetDateTime::now_utc();
        let stamp = format_timestamp(now)?;
        self.conn
            .execute(
                "INSERT INTO bases (name, created_at, updated_at) VALUES (?, ?, ?)",
                params![name, stamp, stamp],
            )
            .context("insert base")?;
        Ok(Base {
            id: BaseId::new(self.conn.last_insert_rowid()),
            name,
            created_at: now,
        })
    }

    pub fn list_bases(&self) -> Result<Vec<Base>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM bases ORDER BY id ASC")
            .context("prepare bases query")?;
        let rows = stmt.query_map([], base_from_sql).context("query bases")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect bases")
    }

    pub fn get_base(&self, base_id: BaseId) -> Result<Base> {
        self.conn
            .query_row(
                "SELECT id, name, created_at FROM bases WHERE id = ?",
                params![base_id.get()],
                base_from_sql,
            )
            .optional()
            .context("load base")?
            .ok_or_else(|| anyhow!("base {base_id} not found -- choose an existing base"))
    }

    /// Base with this name, created when missing.
    pub fn ensure_base(&self, name: &str) -> Result<Base> {
        let name = validate_base_name(name)?;
        let existing = self
            .conn
            .query_row(
                "SELECT id, name, created_at FROM bases WHERE name = ? ORDER BY id ASC LIMIT 1",
                params![name],
                base_from_sql,
            )
            .optional()
            .context("look up base by name")?;
        match existing {
            Some(base) => Ok(base),
            None => {
                info!(base = %name, "creating base");
                self.create_base(&name)
            }
        }
    }

    pub fn rename_base(&self, base_id: BaseId, name: &str) -> Result<Base> {
        let name = validate_base_name(name)?;
        let now = now_rfc3339()?;
        let rows_affected = self
            .conn
            .execute(
                "UPDATE bases SET name = ?, updated_at = ? WHERE id = ?",
                params![name, now, base_id.get()],
            )
            .context("rename base")?;
        if rows_affected == 0 {
            bail!("base {base_id} not found -- choose an existing base");
        }
        self.get_base(base_id)
    }

    /// Delete a base with all of its tables, columns and rows.
    pub fn delete_base(&self, base_id: BaseId) -> Result<()> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM bases WHERE id = ?", params![base_id.get()])
            .context("delete base")?;
        if rows_affected == 0 {
            bail!("base {base_id} not found -- choose an existing base");
        }
        Ok(())
    }

    // --- rows beyond the gateway ----------------------------------------

    /// Merge several row updates in one transaction. Returns how many rows
    /// existed.
    pub fn bulk_update_rows(&self, updates: &[(RowId, RowData)]) -> Result<usize> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin bulk update")?;
        let mut updated = 0;
        for (row_id, data) in updates {
            if merge_row(&tx, *row_id, data)?.is_some() {
                updated += 1;
            }
        }
        tx.commit().context("commit bulk update")?;
        Ok(updated)
    }

    fn table_columns(&self, table_id: TableId) -> Result<Vec<Column>> {
        load_columns(&self.conn, table_id)
    }

    fn require_table(&self, table_id: TableId) -> Result<BaseId> {
        self.conn
            .query_row(
                "SELECT base_id FROM grid_tables WHERE id = ?",
                params![table_id.get()],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .context("look up table")?
            .map(BaseId::new)
            .ok_or_else(|| anyhow!("table {table_id} not found -- reload the base"))
    }

    fn load_table(&self, table_id: TableId) -> Result<Table> {
        let (base_id, name) = self
            .conn
            .query_row(
                "SELECT base_id, name FROM grid_tables WHERE id = ?",
                params![table_id.get()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .context("load table")?
            .ok_or_else(|| anyhow!("table {table_id} not found -- reload the base"))?;
        Ok(Table {
            id: table_id,
            base_id: BaseId::new(base_id),
            name,
            columns: load_columns(&self.conn, table_id)?,
            row_count: count_rows(&self.conn, table_id)?,
        })
    }

    fn load_row(&self, row_id: RowId) -> Result<Row> {
        self.conn
            .query_row(
                "SELECT id, table_id, row_order, data FROM grid_rows WHERE id = ?",
                params![row_id.get()],
                row_from_sql,
            )
            .optional()
            .context("load row")?
            .ok_or_else(|| anyhow!("row {row_id} not found -- reload the table"))
    }

    fn load_column(&self, column_id: ColumnId) -> Result<Column> {
        self.conn
            .query_row(
                "
                SELECT id, table_id, name, column_type, column_order
                FROM grid_columns
                WHERE id = ?
                ",
                params![column_id.get()],
                column_from_sql,
            )
            .optional()
            .context("load column")?
            .ok_or_else(|| anyhow!("column {column_id} not found -- reload the table"))
    }
}

impl PersistenceGateway for Store {
    fn list_tables(&self, base_id: BaseId) -> Result<Vec<Table>> {
        self.get_base(base_id)?;
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM grid_tables WHERE base_id = ? ORDER BY id ASC")
            .context("prepare tables query")?;
        let ids = stmt
            .query_map(params![base_id.get()], |row| row.get::<_, i64>(0))
            .context("query tables")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("collect tables")?;
        ids.into_iter()
            .map(|id| self.load_table(TableId::new(id)))
            .collect()
    }

    fn create_row(&self, table_id: TableId, data: &RowData) -> Result<Row> {
        self.require_table(table_id)?;
        let columns = self.table_columns(table_id)?;
        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin row insert")?;
        let first = reserve_row_orders(&tx, table_id, 1)?;
        let row_id = insert_row(&tx, table_id, first, &normalize_record(&columns, data))?;
        tx.commit().context("commit row insert")?;
        self.load_row(row_id)
    }

    fn bulk_create_rows(&self, table_id: TableId, records: &[RowData]) -> Result<usize> {
        self.require_table(table_id)?;
        let columns = self.table_columns(table_id)?;
        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin bulk insert")?;
        let first = reserve_row_orders(&tx, table_id, records.len())?;
        for (offset, record) in records.iter().enumerate() {
            let data = normalize_record(&columns, record);
            insert_row(&tx, table_id, first + offset as i64, &data)?;
        }
        tx.commit().context("commit bulk insert")?;
        debug!(%table_id, count = records.len(), "bulk inserted rows");
        Ok(records.len())
    }

    fn update_row(&self, row_id: RowId, data: &RowData) -> Result<Row> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin row update")?;
        let row = merge_row(&tx, row_id, data)?
            .ok_or_else(|| anyhow!("row {row_id} not found -- reload the table"))?;
        tx.commit().context("commit row update")?;
        Ok(row)
    }

    fn delete_row(&self, row_id: RowId) -> Result<()> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM grid_rows WHERE id = ?", params![row_id.get()])
            .context("delete row")?;
        if rows_affected == 0 {
            bail!("row {row_id} not found -- reload the table");
        }
        Ok(())
    }

    fn bulk_delete_rows(&self, row_ids: &[RowId]) -> Result<usize> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin bulk delete")?;
        let mut deleted = 0;
        {
            let mut stmt = tx
                .prepare("DELETE FROM grid_rows WHERE id = ?")
                .context("prepare bulk delete")?;
            for row_id in row_ids {
                deleted += stmt
                    .execute(params![row_id.get()])
                    .with_context(|| format!("delete row {row_id}"))?;
            }
        }
        tx.commit().context("commit bulk delete")?;
        Ok(deleted)
    }

    fn get_rows_page(
        &self,
        table_id: TableId,
        limit: usize,
        offset: usize,
        query: &RowQuery,
    ) -> Result<RowPage> {
        self.require_table(table_id)?;
        let columns = self.table_columns(table_id)?;
        let filter = page::where_clause(table_id, &columns, query);

        let total: i64 = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) FROM grid_rows WHERE {}", filter.sql),
                params_from_iter(filter.params.iter()),
                |row| row.get(0),
            )
            .context("count rows")?;
        let total = usize::try_from(total).context("row count out of range")?;

        let mut params = filter.params.clone();
        let order = page::order_clause(&columns, query, &mut params);
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        params.push(Value::Integer(limit as i64));
        params.push(Value::Integer(i64::try_from(offset).context("offset out of range")?));

        let sql = format!(
            "
            SELECT id, table_id, row_order, data
            FROM grid_rows
            WHERE {}
            ORDER BY {order}
            LIMIT ? OFFSET ?
            ",
            filter.sql
        );
        let mut stmt = self.conn.prepare(&sql).context("prepare rows page query")?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), row_from_sql)
            .context("query rows page")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("collect rows page")?;
        let has_more = offset + rows.len() < total;
        Ok(RowPage {
            rows,
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
        self.require_table(table_id)?;
        let name = validate_column_name(name)?;
        let columns = self.table_columns(table_id)?;
        if columns
            .iter()
            .any(|column| column.name.eq_ignore_ascii_case(&name))
        {
            bail!("column {name:?} already exists -- choose a different name");
        }
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                INSERT INTO grid_columns (
                  table_id, name, column_type, column_order, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?)
                ",
                params![
                    table_id.get(),
                    name,
                    column_type.as_str(),
                    columns.len() as i64,
                    now,
                    now,
                ],
            )
            .context("insert column")?;
        self.load_column(ColumnId::new(self.conn.last_insert_rowid()))
    }

    fn update_column(
        &self,
        column_id: ColumnId,
        name: Option<&str>,
        column_type: Option<ColumnType>,
    ) -> Result<Column> {
        let column = self.load_column(column_id)?;
        let renamed = match name {
            Some(raw) => {
                let name = validate_column_name(raw)?;
                let clash = self
                    .table_columns(column.table_id)?
                    .iter()
                    .any(|other| other.id != column_id && other.name.eq_ignore_ascii_case(&name));
                if clash {
                    bail!("column {name:?} already exists -- choose a different name");
                }
                Some(name).filter(|name| *name != column.name)
            }
            None => None,
        };

        let now = now_rfc3339()?;
        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin column update")?;
        if let Some(new_name) = &renamed {
            tx.execute(
                "UPDATE grid_columns SET name = ?, updated_at = ? WHERE id = ?",
                params![new_name, now, column_id.get()],
            )
            .context("rename column")?;
            let (old_path, new_path) = (json_path(&column.name), json_path(new_name));
            tx.execute(
                "
                UPDATE grid_rows
                SET
                  data = json_set(json_remove(data, ?1), ?2, json_extract(data, ?1)),
                  updated_at = ?3
                WHERE table_id = ?4 AND json_type(data, ?1) IS NOT NULL
                ",
                params![old_path, new_path, now, column.table_id.get()],
            )
            .context("move row values to renamed column")?;
            rewrite_views(&tx, column.table_id, |config| {
                config.rename_column(&column.name, new_name);
            })?;
        }
        if let Some(column_type) = column_type {
            tx.execute(
                "UPDATE grid_columns SET column_type = ?, updated_at = ? WHERE id = ?",
                params![column_type.as_str(), now, column_id.get()],
            )
            .context("change column type")?;
        }
        tx.commit().context("commit column update")?;
        self.load_column(column_id)
    }

    fn delete_column(&self, column_id: ColumnId) -> Result<()> {
        let column = self.load_column(column_id)?;
        let now = now_rfc3339()?;
        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin column delete")?;
        tx.execute(
            "DELETE FROM grid_columns WHERE id = ?",
            params![column_id.get()],
        )
        .context("delete column")?;
        tx.execute(
            "
            UPDATE grid_rows
            SET data = json_remove(data, ?1), updated_at = ?2
            WHERE table_id = ?3 AND json_type(data, ?1) IS NOT NULL
            ",
            params![json_path(&column.name), now, column.table_id.get()],
        )
        .context("strip deleted column from rows")?;
        rewrite_views(&tx, column.table_id, |config| config.remove_column(&column.name))?;
        let remaining = load_columns(&tx, column.table_id)?;
        for (order, remaining) in remaining.iter().enumerate() {
            tx.execute(
                "UPDATE grid_columns SET column_order = ? WHERE id = ?",
                params![order as i64, remaining.id.get()],
            )
            .context("renumber columns")?;
        }
        tx.commit().context("commit column delete")?;
        Ok(())
    }

    fn reorder_columns(&self, table_id: TableId, order: &[ColumnId]) -> Result<Vec<Column>> {
        self.require_table(table_id)?;
        validate_column_order(&self.table_columns(table_id)?, order)?;
        let now = now_rfc3339()?;
        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin column reorder")?;
        for (position, column_id) in order.iter().enumerate() {
            tx.execute(
                "UPDATE grid_columns SET column_order = ?, updated_at = ? WHERE id = ?",
                params![position as i64, now, column_id.get()],
            )
            .with_context(|| format!("move column {column_id}"))?;
        }
        tx.commit().context("commit column reorder")?;
        debug!(%table_id, "reordered columns");
        self.table_columns(table_id)
    }

    fn create_table(&self, base_id: BaseId, name: &str) -> Result<Table> {
        let name = validate_table_name(name)?;
        self.get_base(base_id)?;
        let now = now_rfc3339()?;
        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin table create")?;
        tx.execute(
            "
            INSERT INTO grid_tables (base_id, name, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ",
            params![base_id.get(), name, now, now],
        )
        .context("insert table")?;
        let table_id = TableId::new(tx.last_insert_rowid());
        for (order, (column_name, column_type)) in DEFAULT_COLUMNS.iter().enumerate() {
            tx.execute(
                "
                INSERT INTO grid_columns (
                  table_id, name, column_type, column_order, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?)
                ",
                params![
                    table_id.get(),
                    column_name,
                    column_type.as_str(),
                    order as i64,
                    now,
                    now,
                ],
            )
            .with_context(|| format!("insert default column {column_name}"))?;
        }
        let columns = load_columns(&tx, table_id)?;
        let first = reserve_row_orders(&tx, table_id, SEED_ROW_COUNT)?;
        {
            let mut faker = self.faker.borrow_mut();
            for offset in 0..SEED_ROW_COUNT {
                let data = faker.seeded_row(&columns);
                insert_row(&tx, table_id, first + offset as i64, &data)?;
            }
        }
        tx.commit().context("commit table create")?;
        info!(%table_id, table = %name, "created table");
        self.load_table(table_id)
    }

    fn rename_table(&self, table_id: TableId, name: &str) -> Result<Table> {
        let name = validate_table_name(name)?;
        let now = now_rfc3339()?;
        let rows_affected = self
            .conn
            .execute(
                "UPDATE grid_tables SET name = ?, updated_at = ? WHERE id = ?",
                params![name, now, table_id.get()],
            )
            .context("rename table")?;
        if rows_affected == 0 {
            bail!("table {table_id} not found -- reload the base");
        }
        self.load_table(table_id)
    }

    fn delete_table(&self, table_id: TableId) -> Result<()> {
        let base_id = self.require_table(table_id)?;
        let siblings: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM grid_tables WHERE base_id = ?",
                params![base_id.get()],
                |row| row.get(0),
            )
            .context("count tables in base")?;
        if siblings <= 1 {
            bail!("cannot delete the last table in a base -- create another table first");
        }
        self.conn
            .execute("DELETE FROM grid_tables WHERE id = ?", params![table_id.get()])
            .context("delete table")?;
        info!(%table_id, "deleted table");
        Ok(())
    }

    fn generate_fake_rows(&self, table_id: TableId, count: usize) -> Result<usize> {
        if !(1..=MAX_GENERATED_ROWS).contains(&count) {
            bail!("row count must be between 1 and {MAX_GENERATED_ROWS}, got {count}");
        }
        self.require_table(table_id)?;
        let columns = self.table_columns(table_id)?;
        let mut generated = 0;
        while generated < count {
            let chunk = (count - generated).min(GENERATE_CHUNK);
            let tx = self
                .conn
                .unchecked_transaction()
                .context("begin generated rows")?;
            let first = reserve_row_orders(&tx, table_id, chunk)?;
            {
                let mut faker = self.faker.borrow_mut();
                for offset in 0..chunk {
                    let data = faker.generated_record(&columns);
                    insert_row(&tx, table_id, first + offset as i64, &data)?;
                }
            }
            tx.commit().context("commit generated rows")?;
            generated += chunk;
            debug!(%table_id, generated, count, "generated rows");
        }
        Ok(generated)
    }

    fn list_views(&self, table_id: TableId) -> Result<Vec<View>> {
        self.require_table(table_id)?;
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT id, table_id, name, filters, sorts, hidden_columns
                FROM grid_views
                WHERE table_id = ?
                ORDER BY id ASC
                ",
            )
            .context("prepare views query")?;
        let rows = stmt
            .query_map(params![table_id.get()], view_from_sql)
            .context("query views")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect views")
    }

    fn get_view(&self, view_id: ViewId) -> Result<View> {
        self.conn
            .query_row(
                "
                SELECT id, table_id, name, filters, sorts, hidden_columns
                FROM grid_views
                WHERE id = ?
                ",
                params![view_id.get()],
                view_from_sql,
            )
            .optional()
            .context("load view")?
            .ok_or_else(|| anyhow!("view {view_id} not found -- reload the views"))
    }

    fn create_view(&self, table_id: TableId, name: &str, config: &ViewConfig) -> Result<View> {
        self.require_table(table_id)?;
        let name = validate_view_name(name)?;
        let view_id = insert_view(&self.conn, table_id, &name, config)?;
        self.get_view(view_id)
    }

    fn update_view(&self, view_id: ViewId, patch: &ViewPatch) -> Result<View> {
        let mut view = self.get_view(view_id)?;
        let name = patch
            .name
            .as_deref()
            .map(validate_view_name)
            .transpose()?;
        let patch = ViewPatch {
            name,
            ..patch.clone()
        };
        patch.apply(&mut view);
        write_view(&self.conn, &view)?;
        Ok(view)
    }

    fn delete_view(&self, view_id: ViewId) -> Result<()> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM grid_views WHERE id = ?", params![view_id.get()])
            .context("delete view")?;
        if rows_affected == 0 {
            bail!("view {view_id} not found -- reload the views");
        }
        Ok(())
    }

    fn duplicate_view(&self, view_id: ViewId, name: &str) -> Result<View> {
        let source = self.get_view(view_id)?;
        let name = validate_view_name(name)?;
        let copy = insert_view(&self.conn, source.table_id, &name, &source.config)?;
        self.get_view(copy)
    }

    fn default_view(&self, table_id: TableId) -> Result<View> {
        self.require_table(table_id)?;
        let first = self
            .conn
            .query_row(
                "SELECT id FROM grid_views WHERE table_id = ? ORDER BY id ASC LIMIT 1",
                params![table_id.get()],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .context("look up default view")?;
        let view_id = match first {
            Some(id) => ViewId::new(id),
            None => {
                info!(%table_id, "creating default view");
                insert_view(&self.conn, table_id, DEFAULT_VIEW_NAME, &ViewConfig::default())?
            }
        };
        self.get_view(view_id)
    }
}

pub fn default_db_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os("TABULA_DB_PATH") {
        return Ok(PathBuf::from(override_path));
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set TABULA_DB_PATH to a writable database path")
    })?;

    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir.join("tabula.db"))
}

pub fn validate_db_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("database path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "database path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("database path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "database path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

fn validate_base_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        bail!("base name must not be empty");
    }
    Ok(name.to_owned())
}

/// Claim `count` consecutive row orders. Orders are never handed out twice,
/// even after the rows holding them are deleted.
fn reserve_row_orders(tx: &Transaction<'_>, table_id: TableId, count: usize) -> Result<i64> {
    let first: i64 = tx
        .query_row(
            "SELECT next_row_order FROM grid_tables WHERE id = ?",
            params![table_id.get()],
            |row| row.get(0),
        )
        .optional()
        .context("read next row order")?
        .ok_or_else(|| anyhow!("table {table_id} not found -- reload the base"))?;
    tx.execute(
        "UPDATE grid_tables SET next_row_order = ? WHERE id = ?",
        params![first + count as i64, table_id.get()],
    )
    .context("advance row order")?;
    Ok(first)
}

fn insert_row(
    tx: &Transaction<'_>,
    table_id: TableId,
    order: i64,
    data: &RowData,
) -> Result<RowId> {
    let now = now_rfc3339()?;
    let json = serde_json::to_string(data).context("encode row data")?;
    tx.execute(
        "
        INSERT INTO grid_rows (table_id, row_order, data, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ",
        params![table_id.get(), order, json, now, now],
    )
    .context("insert row")?;
    Ok(RowId::new(tx.last_insert_rowid()))
}

/// Merge `data` into a stored row, keeping only keys that name one of the
/// table's columns. `None` when the row does not exist.
fn merge_row(conn: &Connection, row_id: RowId, data: &RowData) -> Result<Option<Row>> {
    let Some(mut row) = conn
        .query_row(
            "SELECT id, table_id, row_order, data FROM grid_rows WHERE id = ?",
            params![row_id.get()],
            row_from_sql,
        )
        .optional()
        .context("load row for update")?
    else {
        return Ok(None);
    };
    let known = load_columns(conn, row.table_id)?
        .into_iter()
        .map(|column| column.name)
        .collect::<BTreeSet<_>>();
    for (key, value) in data {
        if known.contains(key) {
            row.data.insert(key.clone(), value.clone());
        }
    }
    let json = serde_json::to_string(&row.data).context("encode row data")?;
    conn.execute(
        "UPDATE grid_rows SET data = ?, updated_at = ? WHERE id = ?",
        params![json, now_rfc3339()?, row_id.get()],
    )
    .context("update row")?;
    Ok(Some(row))
}

fn insert_view(
    conn: &Connection,
    table_id: TableId,
    name: &str,
    config: &ViewConfig,
) -> Result<ViewId> {
    let now = now_rfc3339()?;
    conn.execute(
        "
        INSERT INTO grid_views (
          table_id, name, filters, sorts, hidden_columns, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        ",
        params![
            table_id.get(),
            name,
            encode_json(&config.filters)?,
            encode_json(&config.sorts)?,
            encode_json(&config.hidden_columns)?,
            now,
            now,
        ],
    )
    .context("insert view")?;
    Ok(ViewId::new(conn.last_insert_rowid()))
}

fn write_view(conn: &Connection, view: &View) -> Result<()> {
    conn.execute(
        "
        UPDATE grid_views
        SET name = ?, filters = ?, sorts = ?, hidden_columns = ?, updated_at = ?
        WHERE id = ?
        ",
        params![
            view.name,
            encode_json(&view.config.filters)?,
            encode_json(&view.config.sorts)?,
            encode_json(&view.config.hidden_columns)?,
            now_rfc3339()?,
            view.id.get(),
        ],
    )
    .context("update view")?;
    Ok(())
}

/// Apply `edit` to the config of every view of a table, e.g. after a
/// column rename.
fn rewrite_views(
    conn: &Connection,
    table_id: TableId,
    edit: impl Fn(&mut ViewConfig),
) -> Result<()> {
    let views = {
        let mut stmt = conn
            .prepare(
                "
                SELECT id, table_id, name, filters, sorts, hidden_columns
                FROM grid_views
                WHERE table_id = ?
                ",
            )
            .context("prepare views query")?;
        let rows = stmt
            .query_map(params![table_id.get()], view_from_sql)
            .context("query views")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect views")?
    };
    for mut view in views {
        let before = view.config.clone();
        edit(&mut view.config);
        if view.config != before {
            write_view(conn, &view)?;
        }
    }
    Ok(())
}

fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("encode view config")
}

fn decode_json<T: DeserializeOwned>(raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|error| to_sql_error(anyhow!("invalid view config: {error}")))
}

fn load_columns(conn: &Connection, table_id: TableId) -> Result<Vec<Column>> {
    let mut stmt = conn
        .prepare(
            "
            SELECT id, table_id, name, column_type, column_order
            FROM grid_columns
            WHERE table_id = ?
            ORDER BY column_order ASC, id ASC
            ",
        )
        .context("prepare columns query")?;
    let rows = stmt
        .query_map(params![table_id.get()], column_from_sql)
        .context("query columns")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("collect columns")
}

fn count_rows(conn: &Connection, table_id: TableId) -> Result<usize> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM grid_rows WHERE table_id = ?",
            params![table_id.get()],
            |row| row.get(0),
        )
        .context("count table rows")?;
    usize::try_from(count).context("row count out of range")
}

fn base_from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<Base> {
    let created_at_raw: String = row.get(2)?;
    Ok(Base {
        id: BaseId::new(row.get(0)?),
        name: row.get(1)?,
        created_at: OffsetDateTime::parse(&created_at_raw, &Rfc3339)
            .map_err(|error| to_sql_error(anyhow!("invalid base timestamp: {error}")))?,
    })
}

fn column_from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<Column> {
    let column_type_raw: String = row.get(3)?;
    let column_type = ColumnType::parse(&column_type_raw)
        .ok_or_else(|| to_sql_error(anyhow!("unknown column type {column_type_raw:?}")))?;
    Ok(Column {
        id: ColumnId::new(row.get(0)?),
        table_id: TableId::new(row.get(1)?),
        name: row.get(2)?,
        column_type,
        order: row.get(4)?,
    })
}

fn row_from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    let data_raw: String = row.get(3)?;
    let data = serde_json::from_str::<RowData>(&data_raw)
        .map_err(|error| to_sql_error(anyhow!("invalid row data: {error}")))?;
    Ok(Row {
        id: RowId::new(row.get(0)?),
        table_id: TableId::new(row.get(1)?),
        order: row.get(2)?,
        data,
    })
}

fn view_from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<View> {
    let filters: String = row.get(3)?;
    let sorts: String = row.get(4)?;
    let hidden: String = row.get(5)?;
    Ok(View {
        id: ViewId::new(row.get(0)?),
        table_id: TableId::new(row.get(1)?),
        name: row.get(2)?,
        config: ViewConfig {
            filters: decode_json(&filters)?,
            sorts: decode_json(&sorts)?,
            hidden_columns: decode_json(&hidden)?,
        },
    })
}

fn has_user_tables(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "
            SELECT COUNT(*)
            FROM sqlite_master
            WHERE type = 'table'
              AND name NOT LIKE 'sqlite_%'
            ",
            [],
            |row| row.get(0),
        )
        .context("count user tables")?;
    Ok(count > 0)
}

fn validate_schema(conn: &Connection) -> Result<()> {
    for (table, required_columns) in REQUIRED_SCHEMA {
        if !table_exists(conn, table)? {
            bail!(
                "database is missing required table `{table}`; use a tabula database or start with a new file"
            );
        }

        let columns = sqlite_columns(conn, table)?;
        let missing: Vec<&str> = required_columns
            .iter()
            .copied()
            .filter(|column| !columns.contains(*column))
            .collect();

        if !missing.is_empty() {
            bail!(
                "table `{table}` is missing required columns: {}; use a tabula database or start with a new file",
                missing.join(", ")
            );
        }
    }

    Ok(())
}

fn ensure_required_indexes(conn: &Connection) -> Result<()> {
    for index in REQUIRED_INDEXES {
        conn.execute_batch(index.create_sql)
            .with_context(|| format!("ensure required index `{}`", index.name))?;
    }

    let existing_indexes = index_names(conn)?;
    let missing = REQUIRED_INDEXES
        .iter()
        .filter(|index| !existing_indexes.contains(index.name))
        .map(|index| index.name)
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        bail!(
            "database is missing required indexes: {}; use a tabula database or start with a new file",
            missing.join(", ")
        );
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "
            SELECT EXISTS(
              SELECT 1
              FROM sqlite_master
              WHERE type = 'table' AND name = ?
            )
            ",
            params![table],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("check table existence for {table}"))?;
    Ok(exists == 1)
}

fn sqlite_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("inspect columns for {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("query column info for {table}"))?;

    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .with_context(|| format!("collect columns for {table}"))
}

fn index_names(conn: &Connection) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(
            "
            SELECT name
            FROM sqlite_master
            WHERE type = 'index'
              AND name NOT LIKE 'sqlite_%'
            ORDER BY name ASC
            ",
        )
        .context("prepare index names query")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("query index names")?;
    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .context("collect index names")
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")?;
    page::register_functions(conn).context("register sql functions")
}

fn now_rfc3339() -> Result<String> {
    format_timestamp(OffsetDateTime::now_utc())
}

fn format_timestamp(value: OffsetDateTime) -> Result<String> {
    value.format(&Rfc3339).context("format timestamp")
}

fn to_sql_error(error: anyhow::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            error.to_string(),
        )),
    )
}

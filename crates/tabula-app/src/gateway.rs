// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;

use crate::ids::{BaseId, ColumnId, RowId, TableId, ViewId};
use crate::model::{
    Column, ColumnType, Row, RowData, RowPage, RowQuery, Table, View, ViewConfig, ViewPatch,
};

/// Storage operations the grid depends on. Every cell value crosses this
/// boundary as a string; the column type tag carries numeric meaning.
pub trait PersistenceGateway {
    fn list_tables(&self, base_id: BaseId) -> Result<Vec<Table>>;
    fn create_row(&self, table_id: TableId, data: &RowData) -> Result<Row>;
    fn bulk_create_rows(&self, table_id: TableId, records: &[RowData]) -> Result<usize>;
    /// Merge `data` into the stored row; keys not supplied keep their values.
    fn update_row(&self, row_id: RowId, data: &RowData) -> Result<Row>;
    fn delete_row(&self, row_id: RowId) -> Result<()>;
    /// Delete several rows at once and return how many existed.
    fn bulk_delete_rows(&self, row_ids: &[RowId]) -> Result<usize>;
    fn get_rows_page(
        &self,
        table_id: TableId,
        limit: usize,
        offset: usize,
        query: &RowQuery,
    ) -> Result<RowPage>;
    fn create_column(&self, table_id: TableId, name: &str, column_type: ColumnType)
    -> Result<Column>;
    fn update_column(
        &self,
        column_id: ColumnId,
        name: Option<&str>,
        column_type: Option<ColumnType>,
    ) -> Result<Column>;
    fn delete_column(&self, column_id: ColumnId) -> Result<()>;
    /// Renumber a table's columns in one transaction. `order` must name every
    /// column exactly once; the reordered columns come back.
    fn reorder_columns(&self, table_id: TableId, order: &[ColumnId]) -> Result<Vec<Column>>;
    /// Create a table seeded with the default columns and rows.
    fn create_table(&self, base_id: BaseId, name: &str) -> Result<Table>;
    fn rename_table(&self, table_id: TableId, name: &str) -> Result<Table>;
    fn delete_table(&self, table_id: TableId) -> Result<()>;
    fn generate_fake_rows(&self, table_id: TableId, count: usize) -> Result<usize>;
    /// Views of a table, oldest first.
    fn list_views(&self, table_id: TableId) -> Result<Vec<View>>;
    fn get_view(&self, view_id: ViewId) -> Result<View>;
    fn create_view(&self, table_id: TableId, name: &str, config: &ViewConfig) -> Result<View>;
    fn update_view(&self, view_id: ViewId, patch: &ViewPatch) -> Result<View>;
    fn delete_view(&self, view_id: ViewId) -> Result<()>;
    /// Copy a view's configuration under a new name.
    fn duplicate_view(&self, view_id: ViewId, name: &str) -> Result<View>;
    /// The table's oldest view, created as an empty "Default View" when the
    /// table has none.
    fn default_view(&self, table_id: TableId) -> Result<View>;
}

/// One gateway call, owned so it can cross to the persistence worker.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    ListTables {
        base_id: BaseId,
    },
    CreateRow {
        table_id: TableId,
        data: RowData,
    },
    BulkCreateRows {
        table_id: TableId,
        records: Vec<RowData>,
    },
    UpdateRow {
        row_id: RowId,
        data: RowData,
    },
    DeleteRow {
        row_id: RowId,
    },
    BulkDeleteRows {
        row_ids: Vec<RowId>,
    },
    GetRowsPage {
        table_id: TableId,
        limit: usize,
        offset: usize,
        query: RowQuery,
    },
    CreateColumn {
        table_id: TableId,
        name: String,
        column_type: ColumnType,
    },
    UpdateColumn {
        column_id: ColumnId,
        name: Option<String>,
        column_type: Option<ColumnType>,
    },
    DeleteColumn {
        column_id: ColumnId,
    },
    ReorderColumns {
        table_id: TableId,
        order: Vec<ColumnId>,
    },
    CreateTable {
        base_id: BaseId,
        name: String,
    },
    RenameTable {
        table_id: TableId,
        name: String,
    },
    DeleteTable {
        table_id: TableId,
    },
    GenerateFakeRows {
        table_id: TableId,
        count: usize,
    },
    ListViews {
        table_id: TableId,
    },
    GetView {
        view_id: ViewId,
    },
    CreateView {
        table_id: TableId,
        name: String,
        config: ViewConfig,
    },
    UpdateView {
        view_id: ViewId,
        patch: ViewPatch,
    },
    DeleteView {
        view_id: ViewId,
    },
    DuplicateView {
        view_id: ViewId,
        name: String,
    },
    DefaultView {
        table_id: TableId,
    },
}

impl Request {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::ListTables { .. } => "list tables",
            Self::CreateRow { .. } => "create row",
            Self::BulkCreateRows { .. } => "bulk create rows",
            Self::UpdateRow { .. } => "update row",
            Self::DeleteRow { .. } => "delete row",
            Self::BulkDeleteRows { .. } => "bulk delete rows",
            Self::GetRowsPage { .. } => "get rows page",
            Self::CreateColumn { .. } => "create column",
            Self::UpdateColumn { .. } => "update column",
            Self::DeleteColumn { .. } => "delete column",
            Self::ReorderColumns { .. } => "reorder columns",
            Self::CreateTable { .. } => "create table",
            Self::RenameTable { .. } => "rename table",
            Self::DeleteTable { .. } => "delete table",
            Self::GenerateFakeRows { .. } => "generate fake rows",
            Self::ListViews { .. } => "list views",
            Self::GetView { .. } => "get view",
            Self::CreateView { .. } => "create view",
            Self::UpdateView { .. } => "update view",
            Self::DeleteView { .. } => "delete view",
            Self::DuplicateView { .. } => "duplicate view",
            Self::DefaultView { .. } => "default view",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Tables(Vec<Table>),
    Row(Row),
    Created(usize),
    Deleted(usize),
    Page(RowPage),
    Column(Column),
    Columns(Vec<Column>),
    Table(Table),
    Views(Vec<View>),
    View(View),
    Generated(usize),
    Done,
}

pub fn execute<G>(gateway: &G, request: Request) -> Result<Response>
where
    G: PersistenceGateway + ?Sized,
{
    let response = match request {
        Request::ListTables { base_id } => Response::Tables(gateway.list_tables(base_id)?),
        Request::CreateRow { table_id, data } => {
            Response::Row(gateway.create_row(table_id, &data)?)
        }
        Request::BulkCreateRows { table_id, records } => {
            Response::Created(gateway.bulk_create_rows(table_id, &records)?)
        }
        Request::UpdateRow { row_id, data } => Response::Row(gateway.update_row(row_id, &data)?),
        Request::DeleteRow { row_id } => {
            gateway.delete_row(row_id)?;
            Response::Done
        }
        Request::BulkDeleteRows { row_ids } => {
            Response::Deleted(gateway.bulk_delete_rows(&row_ids)?)
        }
        Request::GetRowsPage {
            table_id,
            limit,
            offset,
            query,
        } => Response::Page(gateway.get_rows_page(table_id, limit, offset, &query)?),
        Request::CreateColumn {
            table_id,
            name,
            column_type,
        } => Response::Column(gateway.create_column(table_id, &name, column_type)?),
        Request::UpdateColumn {
            column_id,
            name,
            column_type,
        } => Response::Column(gateway.update_column(column_id, name.as_deref(), column_type)?),
        Request::DeleteColumn { column_id } => {
            gateway.delete_column(column_id)?;
            Response::Done
        }
        Request::ReorderColumns { table_id, order } => {
            Response::Columns(gateway.reorder_columns(table_id, &order)?)
        }
        Request::CreateTable { base_id, name } => {
            Response::Table(gateway.create_table(base_id, &name)?)
        }
        Request::RenameTable { table_id, name } => {
            Response::Table(gateway.rename_table(table_id, &name)?)
        }
        Request::DeleteTable { table_id } => {
            gateway.delete_table(table_id)?;
            Response::Done
        }
        Request::GenerateFakeRows { table_id, count } => {
            Response::Generated(gateway.generate_fake_rows(table_id, count)?)
        }
        Request::ListViews { table_id } => Response::Views(gateway.list_views(table_id)?),
        Request::GetView { view_id } => Response::View(gateway.get_view(view_id)?),
        Request::CreateView {
            table_id,
            name,
            config,
        } => Response::View(gateway.create_view(table_id, &name, &config)?),
        Request::UpdateView { view_id, patch } => {
            Response::View(gateway.update_view(view_id, &patch)?)
        }
        Request::DeleteView { view_id } => {
            gateway.delete_view(view_id)?;
            Response::Done
        }
        Request::DuplicateView { view_id, name } => {
            Response::View(gateway.duplicate_view(view_id, &name)?)
        }
        Request::DefaultView { table_id } => Response::View(gateway.default_view(table_id)?),
    };
    Ok(response)
}

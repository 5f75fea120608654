// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

use crate::error::GridError;
use crate::ids::*;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 1000;
pub const MAX_COLUMN_NAME_LEN: usize = 100;
pub const MAX_VIEW_NAME_LEN: usize = 100;
pub const DEFAULT_VIEW_NAME: &str = "Default View";
pub const MAX_GENERATED_ROWS: usize = 100_000;
pub const SEED_ROW_COUNT: usize = 10;
pub const DEFAULT_BASE_NAME: &str = "My Base";

pub const DEFAULT_COLUMNS: [(&str, ColumnType); 3] = [
    ("Name", ColumnType::Text),
    ("Status", ColumnType::Text),
    ("Priority", ColumnType::Number),
];

/// Wire form of a row's data: column name to display string.
pub type RowData = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Text,
    Number,
}

impl ColumnType {
    pub const ALL: [Self; 2] = [Self::Text, Self::Number];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "number" => Some(Self::Number),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Null,
}

impl CellValue {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base {
    pub id: BaseId,
    pub name: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub id: ColumnId,
    pub table_id: TableId,
    pub name: String,
    pub column_type: ColumnType,
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub id: TableId,
    pub base_id: BaseId,
    pub name: String,
    pub columns: Vec<Column>,
    pub row_count: usize,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_by_id(&self, id: ColumnId) -> Option<&Column> {
        self.columns.iter().find(|column| column.id == id)
    }

    pub fn has_column_named(&self, name: &str) -> bool {
        self.columns
            .iter()
            .any(|column| column.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: RowId,
    pub table_id: TableId,
    pub order: i64,
    pub data: RowData,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowPage {
    pub rows: Vec<Row>,
    pub total: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    IsEmpty,
    IsNotEmpty,
    GreaterThan,
    LessThan,
}

impl FilterOperator {
    pub const ALL: [Self; 8] = [
        Self::Equals,
        Self::NotEquals,
        Self::Contains,
        Self::NotContains,
        Self::IsEmpty,
        Self::IsNotEmpty,
        Self::GreaterThan,
        Self::LessThan,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "notEquals",
            Self::Contains => "contains",
            Self::NotContains => "notContains",
            Self::IsEmpty => "isEmpty",
            Self::IsNotEmpty => "isNotEmpty",
            Self::GreaterThan => "greaterThan",
            Self::LessThan => "lessThan",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "equals" | "=" => Some(Self::Equals),
            "notEquals" | "!=" => Some(Self::NotEquals),
            "contains" | "~" => Some(Self::Contains),
            "notContains" | "!~" => Some(Self::NotContains),
            "isEmpty" => Some(Self::IsEmpty),
            "isNotEmpty" => Some(Self::IsNotEmpty),
            "greaterThan" | ">" => Some(Self::GreaterThan),
            "lessThan" | "<" => Some(Self::LessThan),
            _ => None,
        }
    }

    pub const fn takes_value(self) -> bool {
        !matches!(self, Self::IsEmpty | Self::IsNotEmpty)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    #[serde(rename = "columnName")]
    pub column: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    #[serde(rename = "columnName")]
    pub column: String,
    pub direction: SortDirection,
}

/// Search, filter and sort options for a page fetch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowQuery {
    pub search: Option<String>,
    pub filters: Vec<Filter>,
    pub sorts: Vec<Sort>,
}

impl RowQuery {
    pub fn is_empty(&self) -> bool {
        self.search.is_none() && self.filters.is_empty() && self.sorts.is_empty()
    }
}

/// What a saved view remembers. Search text is not part of a view.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewConfig {
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub sorts: Vec<Sort>,
    #[serde(default)]
    pub hidden_columns: Vec<String>,
}

impl ViewConfig {
    /// Point every reference to `old` at `new`.
    pub fn rename_column(&mut self, old: &str, new: &str) {
        for filter in self.filters.iter_mut().filter(|filter| filter.column == old) {
            filter.column = new.to_owned();
        }
        for sort in self.sorts.iter_mut().filter(|sort| sort.column == old) {
            sort.column = new.to_owned();
        }
        for hidden in self.hidden_columns.iter_mut().filter(|hidden| *hidden == old) {
            *hidden = new.to_owned();
        }
    }

    /// Drop every reference to a deleted column.
    pub fn remove_column(&mut self, name: &str) {
        self.filters.retain(|filter| filter.column != name);
        self.sorts.retain(|sort| sort.column != name);
        self.hidden_columns.retain(|hidden| hidden != name);
    }

    pub fn is_hidden(&self, column: &str) -> bool {
        self.hidden_columns.iter().any(|hidden| hidden == column)
    }
}

/// A named, saved arrangement of one table: filters, sorts and hidden
/// columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    pub id: ViewId,
    pub table_id: TableId,
    pub name: String,
    pub config: ViewConfig,
}

/// Fields to change on a view. `None` leaves a field alone.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewPatch {
    pub name: Option<String>,
    pub filters: Option<Vec<Filter>>,
    pub sorts: Option<Vec<Sort>>,
    pub hidden_columns: Option<Vec<String>>,
}

impl ViewPatch {
    pub fn config(config: &ViewConfig) -> Self {
        Self {
            name: None,
            filters: Some(config.filters.clone()),
            sorts: Some(config.sorts.clone()),
            hidden_columns: Some(config.hidden_columns.clone()),
        }
    }

    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn apply(&self, view: &mut View) {
        if let Some(name) = &self.name {
            view.name = name.clone();
        }
        if let Some(filters) = &self.filters {
            view.config.filters = filters.clone();
        }
        if let Some(sorts) = &self.sorts {
            view.config.sorts = sorts.clone();
        }
        if let Some(hidden) = &self.hidden_columns {
            view.config.hidden_columns = hidden.clone();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BulkProgress {
    pub current: usize,
    pub total: usize,
}

impl BulkProgress {
    pub const IDLE: Self = Self {
        current: 0,
        total: 0,
    };

    pub const fn is_active(self) -> bool {
        self.total > 0
    }

    pub fn ratio(self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.current as f64 / self.total as f64).clamp(0.0, 1.0)
    }
}

pub fn default_table_name(existing_tables: usize) -> String {
    format!("Table {}", existing_tables + 1)
}

/// Project a record onto the table's columns. Missing keys become empty
/// strings and keys with no matching column are dropped.
pub fn normalize_record(columns: &[Column], data: &RowData) -> RowData {
    columns
        .iter()
        .map(|column| {
            let value = data.get(&column.name).cloned().unwrap_or_default();
            (column.name.clone(), value)
        })
        .collect()
}

pub fn validate_column_name(raw: &str) -> Result<String, GridError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(GridError::EmptyColumnName);
    }
    if name.chars().count() > MAX_COLUMN_NAME_LEN {
        return Err(GridError::ColumnNameTooLong {
            max: MAX_COLUMN_NAME_LEN,
        });
    }
    if name.contains('"') {
        return Err(GridError::InvalidColumnName {
            name: name.to_owned(),
        });
    }
    Ok(name.to_owned())
}

pub fn validate_table_name(raw: &str) -> Result<String, GridError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(GridError::EmptyTableName);
    }
    Ok(name.to_owned())
}

pub fn validate_view_name(raw: &str) -> Result<String, GridError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(GridError::EmptyViewName);
    }
    if name.chars().count() > MAX_VIEW_NAME_LEN {
        return Err(GridError::ViewNameTooLong {
            max: MAX_VIEW_NAME_LEN,
        });
    }
    Ok(name.to_owned())
}

/// Check that `order` names every column of `columns` exactly once.
pub fn validate_column_order(columns: &[Column], order: &[ColumnId]) -> Result<(), GridError> {
    let complete = order.len() == columns.len()
        && columns.iter().all(|column| order.contains(&column.id));
    if complete {
        Ok(())
    } else {
        Err(GridError::InvalidColumnOrder)
    }
}

// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

/// Problems caught before any persistence call is made. Nothing is mutated
/// when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("column name must not be empty")]
    EmptyColumnName,

    #[error("column name must be at most {max} characters")]
    ColumnNameTooLong { max: usize },

    #[error("column name {name:?} must not contain double quotes")]
    InvalidColumnName { name: String },

    #[error("a column named {name:?} already exists in this table")]
    DuplicateColumn { name: String },

    #[error("no column named {name:?} in this table")]
    UnknownColumn { name: String },

    #[error("column {name:?} is still being created; wait for it to save")]
    ColumnPending { name: String },

    #[error("table name must not be empty")]
    EmptyTableName,

    #[error("no table with id {id} in this base")]
    UnknownTable { id: i64 },

    #[error("no table selected")]
    NoActiveTable,

    #[error("cannot delete the last table in a base")]
    LastTable,

    #[error("table {id} is already being deleted")]
    TableBeingDeleted { id: i64 },

    #[error("columns must be reordered as a permutation of the table's columns")]
    InvalidColumnOrder,

    #[error("view name must not be empty")]
    EmptyViewName,

    #[error("view name must be at most {max} characters")]
    ViewNameTooLong { max: usize },

    #[error("no view with id {id} on this table")]
    UnknownView { id: i64 },

    #[error("cannot delete the last view of a table")]
    LastView,

    #[error("no row selected")]
    NoSelection,

    #[error("row count must be between 1 and {max}, got {count}")]
    RowCountOutOfRange { count: usize, max: usize },

    #[error("a bulk insertion is already running; cancel it first")]
    BulkRunning,
}

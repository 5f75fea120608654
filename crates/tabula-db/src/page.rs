// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! SQL for row pages. Search, filters and sorts are pushed into SQLite and
//! follow the same rules as `tabula_app::query`; numeric comparisons go
//! through the `tabula_number` function so both sides parse numbers the
//! same way.

use rusqlite::Connection;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{Value, ValueRef};
use tabula_app::values::parse_number;
use tabula_app::{Column, ColumnType, Filter, FilterOperator, RowQuery, SortDirection, TableId};

pub(crate) const NUMBER_FUNCTION: &str = "tabula_number";

/// A WHERE clause (without the keyword) and its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PageFilter {
    pub sql: String,
    pub params: Vec<Value>,
}

/// JSON path of a column inside `grid_rows.data`. Column names never
/// contain double quotes.
pub(crate) fn json_path(column: &str) -> String {
    format!("$.\"{column}\"")
}

pub(crate) fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        NUMBER_FUNCTION,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let number = match ctx.get_raw(0) {
                ValueRef::Text(raw) => std::str::from_utf8(raw).ok().and_then(parse_number),
                ValueRef::Integer(value) => Some(value as f64),
                ValueRef::Real(value) => Some(value),
                ValueRef::Null | ValueRef::Blob(_) => None,
            };
            Ok(number)
        },
    )
}

pub(crate) fn where_clause(
    table_id: TableId,
    columns: &[Column],
    query: &RowQuery,
) -> PageFilter {
    let mut sql = String::from("table_id = ?");
    let mut params = vec![Value::Integer(table_id.get())];

    if let Some(search) = &query.search {
        let needle = search.to_ascii_lowercase();
        if !needle.is_empty() {
            sql.push_str(
                " AND EXISTS (
                  SELECT 1 FROM json_each(grid_rows.data) AS cell
                  WHERE instr(lower(cell.value), ?) > 0
                )",
            );
            params.push(Value::Text(needle));
        }
    }

    for filter in &query.filters {
        sql.push_str(" AND ");
        push_filter(&mut sql, &mut params, columns, filter);
    }

    PageFilter { sql, params }
}

/// ORDER BY terms (without the keyword), always ending in row order.
pub(crate) fn order_clause(
    columns: &[Column],
    query: &RowQuery,
    params: &mut Vec<Value>,
) -> String {
    let mut terms = Vec::with_capacity(query.sorts.len() + 1);
    for sort in &query.sorts {
        let direction = match sort.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        params.push(Value::Text(json_path(&sort.column)));
        if is_numeric(columns, &sort.column) {
            terms.push(format!("{NUMBER_FUNCTION}({RAW}) {direction}"));
        } else {
            terms.push(format!("{RAW} {direction}"));
        }
    }
    terms.push("row_order ASC".to_owned());
    terms.join(", ")
}

const RAW: &str = "coalesce(json_extract(data, ?), '')";

fn push_filter(sql: &mut String, params: &mut Vec<Value>, columns: &[Column], filter: &Filter) {
    let path = Value::Text(json_path(&filter.column));
    let value = filter.value.clone();
    match filter.operator {
        FilterOperator::Equals | FilterOperator::NotEquals => {
            let negate = filter.operator == FilterOperator::NotEquals;
            if negate {
                sql.push_str("NOT ");
            }
            if is_numeric(columns, &filter.column) {
                sql.push_str(&format!(
                    "(CASE WHEN {NUMBER_FUNCTION}({RAW}) IS NOT NULL \
                     AND {NUMBER_FUNCTION}(?) IS NOT NULL \
                     THEN {NUMBER_FUNCTION}({RAW}) = {NUMBER_FUNCTION}(?) \
                     ELSE {RAW} = ? END)"
                ));
                params.extend([
                    path.clone(),
                    Value::Text(value.clone()),
                    path.clone(),
                    Value::Text(value.clone()),
                    path,
                    Value::Text(value),
                ]);
            } else {
                sql.push_str(&format!("({RAW} = ?)"));
                params.extend([path, Value::Text(value)]);
            }
        }
        FilterOperator::Contains => {
            sql.push_str(&format!("instr(lower({RAW}), ?) > 0"));
            params.extend([path, Value::Text(value.to_ascii_lowercase())]);
        }
        FilterOperator::NotContains => {
            sql.push_str(&format!("instr(lower({RAW}), ?) = 0"));
            params.extend([path, Value::Text(value.to_ascii_lowercase())]);
        }
        FilterOperator::IsEmpty => {
            sql.push_str(&format!("{RAW} = ''"));
            params.push(path);
        }
        FilterOperator::IsNotEmpty => {
            sql.push_str(&format!("{RAW} <> ''"));
            params.push(path);
        }
        FilterOperator::GreaterThan => {
            sql.push_str(&format!("{NUMBER_FUNCTION}({RAW}) > {NUMBER_FUNCTION}(?)"));
            params.extend([path, Value::Text(value)]);
        }
        FilterOperator::LessThan => {
            sql.push_str(&format!("{NUMBER_FUNCTION}({RAW}) < {NUMBER_FUNCTION}(?)"));
            params.extend([path, Value::Text(value)]);
        }
    }
}

fn is_numeric(columns: &[Column], name: &str) -> bool {
    columns
        .iter()
        .find(|column| column.name == name)
        .is_some_and(|column| column.column_type == ColumnType::Number)
}

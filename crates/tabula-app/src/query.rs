// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Row search, filter and sort rules evaluated in memory. Storage backends
//! that cannot push these down evaluate rows with the same rules.

use std::cmp::Ordering;

use crate::model::{Column, ColumnType, Filter, FilterOperator, Row, RowQuery, SortDirection};
use crate::values::parse_number;

pub fn matches(row: &Row, columns: &[Column], query: &RowQuery) -> bool {
    if let Some(search) = &query.search
        && !matches_search(row, search)
    {
        return false;
    }
    query
        .filters
        .iter()
        .all(|filter| matches_filter(row, columns, filter))
}

pub fn matches_search(row: &Row, search: &str) -> bool {
    let needle = search.to_ascii_lowercase();
    if needle.is_empty() {
        return true;
    }
    row.data
        .values()
        .any(|value| value.to_ascii_lowercase().contains(&needle))
}

pub fn matches_filter(row: &Row, columns: &[Column], filter: &Filter) -> bool {
    let raw = row
        .data
        .get(&filter.column)
        .map(String::as_str)
        .unwrap_or("");
    let numeric = columns
        .iter()
        .find(|column| column.name == filter.column)
        .is_some_and(|column| column.column_type == ColumnType::Number);

    match filter.operator {
        FilterOperator::Equals => equals(raw, &filter.value, numeric),
        FilterOperator::NotEquals => !equals(raw, &filter.value, numeric),
        FilterOperator::Contains => contains(raw, &filter.value),
        FilterOperator::NotContains => !contains(raw, &filter.value),
        FilterOperator::IsEmpty => raw.is_empty(),
        FilterOperator::IsNotEmpty => !raw.is_empty(),
        FilterOperator::GreaterThan => {
            compare_numbers(raw, &filter.value) == Some(Ordering::Greater)
        }
        FilterOperator::LessThan => compare_numbers(raw, &filter.value) == Some(Ordering::Less),
    }
}

/// Order rows by the query's sort keys, then by row order.
pub fn sort_rows(rows: &mut [Row], columns: &[Column], query: &RowQuery) {
    rows.sort_by(|left, right| {
        for sort in &query.sorts {
            let numeric = columns
                .iter()
                .find(|column| column.name == sort.column)
                .is_some_and(|column| column.column_type == ColumnType::Number);
            let left_raw = left.data.get(&sort.column).map(String::as_str).unwrap_or("");
            let right_raw = right.data.get(&sort.column).map(String::as_str).unwrap_or("");
            let ordering = if numeric {
                compare_optional(parse_number(left_raw), parse_number(right_raw))
            } else {
                left_raw.cmp(right_raw)
            };
            let ordering = match sort.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        left.order.cmp(&right.order)
    });
}

fn equals(raw: &str, expected: &str, numeric: bool) -> bool {
    if numeric
        && let (Some(left), Some(right)) = (parse_number(raw), parse_number(expected))
    {
        return left == right;
    }
    raw == expected
}

fn contains(raw: &str, needle: &str) -> bool {
    raw.to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

fn compare_numbers(raw: &str, bound: &str) -> Option<Ordering> {
    let left = parse_number(raw)?;
    let right = parse_number(bound)?;
    left.partial_cmp(&right)
}

// Missing numbers sort before present ones, matching SQL NULL ordering.
fn compare_optional(left: Option<f64>, right: Option<f64>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(left), Some(right)) => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ColumnId, RowId, TableId};
    use crate::model::{RowData, Sort};

    fn columns() -> Vec<Column> {
        vec![
            Column {
                id: ColumnId::new(1),
                table_id: TableId::new(1),
                name: "Name".to_owned(),
                column_type: ColumnType::Text,
                order: 0,
            },
            Column {
                id: ColumnId::new(2),
                table_id: TableId::new(1),
                name: "Priority".to_owned(),
                column_type: ColumnType::Number,
                order: 1,
            },
        ]
    }

    fn row(id: i64, name: &str, priority: &str) -> Row {
        let mut data = RowData::new();
        data.insert("Name".to_owned(), name.to_owned());
        data.insert("Priority".to_owned(), priority.to_owned());
        Row {
            id: RowId::new(id),
            table_id: TableId::new(1),
            order: id,
            data,
        }
    }

    fn filter(column: &str, operator: FilterOperator, value: &str) -> Filter {
        Filter {
            column: column.to_owned(),
            operator,
            value: value.to_owned(),
        }
    }

    #[test]
    fn search_is_case_insensitive_across_columns() {
        let row = row(1, "Avery Walker", "3");
        assert!(matches_search(&row, "walk"));
        assert!(matches_search(&row, "3"));
        assert!(!matches_search(&row, "turner"));
    }

    #[test]
    fn numeric_comparisons_skip_non_numbers() {
        let cols = columns();
        let ten = row(1, "a", "10");
        let blank = row(2, "b", "");
        let gt = filter("Priority", FilterOperator::GreaterThan, "5");
        assert!(matches_filter(&ten, &cols, &gt));
        assert!(!matches_filter(&blank, &cols, &gt));
        let lt = filter("Priority", FilterOperator::LessThan, "5");
        assert!(!matches_filter(&ten, &cols, &lt));
        assert!(!matches_filter(&blank, &cols, &lt));
    }

    #[test]
    fn equals_compares_numbers_numerically() {
        let cols = columns();
        let row = row(1, "a", "1,000");
        let numeric = filter("Priority", FilterOperator::Equals, "1000");
        let exact = filter("Name", FilterOperator::Equals, "A");
        assert!(matches_filter(&row, &cols, &numeric));
        assert!(!matches_filter(&row, &cols, &exact));
    }

    #[test]
    fn empty_filters_treat_missing_keys_as_empty() {
        let cols = columns();
        let mut sparse = row(1, "a", "");
        sparse.data.remove("Priority");
        let empty = filter("Priority", FilterOperator::IsEmpty, "");
        let present = filter("Name", FilterOperator::IsNotEmpty, "");
        let lacks = filter("Name", FilterOperator::NotContains, "z");
        assert!(matches_filter(&sparse, &cols, &empty));
        assert!(matches_filter(&sparse, &cols, &present));
        assert!(matches_filter(&sparse, &cols, &lacks));
    }

    #[test]
    fn sorts_numeric_columns_by_value_then_order() {
        let cols = columns();
        let mut rows = vec![
            row(1, "a", "10"),
            row(2, "b", "9"),
            row(3, "c", ""),
            row(4, "d", "9"),
        ];
        let query = RowQuery {
            sorts: vec![Sort {
                column: "Priority".to_owned(),
                direction: SortDirection::Asc,
            }],
            ..RowQuery::default()
        };
        sort_rows(&mut rows, &cols, &query);
        let ids = rows.iter().map(|row| row.id.get()).collect::<Vec<_>>();
        assert_eq!(ids, vec![3, 2, 4, 1]);
    }

    #[test]
    fn descending_text_sort() {
        let cols = columns();
        let mut rows = vec![row(1, "b", "1"), row(2, "c", "1"), row(3, "a", "1")];
        let query = RowQuery {
            sorts: vec![Sort {
                column: "Name".to_owned(),
                direction: SortDirection::Desc,
            }],
            ..RowQuery::default()
        };
        sort_rows(&mut rows, &cols, &query);
        let names = rows
            .iter()
            .map(|row| row.data["Name"].clone())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["c", "b", "a"]);
    }

    #[test]
    fn combined_query_requires_every_filter() {
        let cols = columns();
        let query = RowQuery {
            search: Some("ave".to_owned()),
            filters: vec![filter("Priority", FilterOperator::GreaterThan, "2")],
            sorts: Vec::new(),
        };
        assert!(matches(&row(1, "Avery", "3"), &cols, &query));
        assert!(!matches(&row(2, "Avery", "1"), &cols, &query));
        assert!(!matches(&row(3, "Kai", "3"), &cols, &query));
    }
}

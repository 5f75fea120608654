// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use tabula_app::{
    ColumnType, DEFAULT_VIEW_NAME, Filter, FilterOperator, GridController, GridSettings,
    PersistenceGateway, RowData, RowQuery, SEED_ROW_COUNT, Sort, SortDirection, ViewConfig,
};
use tabula_db::{Store, validate_db_path};
use tabula_testkit::{contract, settle, temp_db_path};

fn bootstrapped() -> Result<Store> {
    let mut store = Store::open_memory()?;
    store.set_faker_seed(11);
    store.bootstrap()?;
    Ok(store)
}

fn record(pairs: &[(&str, &str)]) -> RowData {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

#[test]
fn validate_db_path_rejects_uri_forms() {
    assert!(validate_db_path("").is_err());
    assert!(validate_db_path("file:test.db").is_err());
    assert!(validate_db_path("https://example.com/db.sqlite").is_err());
    assert!(validate_db_path("db.sqlite?mode=ro").is_err());
    assert!(validate_db_path("/tmp/tabula.db").is_ok());
    assert!(validate_db_path(":memory:").is_ok());
}

#[test]
fn store_honors_the_gateway_contract() -> Result<()> {
    let store = bootstrapped()?;
    let base = store.create_base("Contract")?;
    contract::run_all(&store, base.id)
}

#[test]
fn bootstrap_is_repeatable() -> Result<()> {
    let store = bootstrapped()?;
    store.bootstrap()?;
    assert!(store.list_bases()?.is_empty());
    Ok(())
}

#[test]
fn bootstrap_rejects_schema_missing_required_column() -> Result<()> {
    let store = bootstrapped()?;

    store.raw_connection().execute_batch(
        "
            DROP TABLE grid_rows;
            CREATE TABLE grid_rows (
              id INTEGER PRIMARY KEY,
              table_id INTEGER NOT NULL,
              data TEXT NOT NULL DEFAULT '{}',
              created_at TEXT NOT NULL,
              updated_at TEXT NOT NULL
            );
            ",
    )?;

    let err = store
        .bootstrap()
        .expect_err("schema validation should fail");
    let message = err.to_string();
    assert!(message.contains("table `grid_rows` is missing required columns"));
    assert!(message.contains("row_order"));
    Ok(())
}

#[test]
fn column_names_are_unique_without_case_in_sql() -> Result<()> {
    let store = bootstrapped()?;
    let base = store.create_base("Work")?;
    let table = store.create_table(base.id, "Tasks")?;

    let result = store.raw_connection().execute(
        "
        INSERT INTO grid_columns (
          table_id, name, column_type, column_order, created_at, updated_at
        ) VALUES (?, 'NAME', 'text', 9, '', '')
        ",
        [table.id.get()],
    );
    assert!(result.is_err(), "the unique index should reject NAME next to Name");
    Ok(())
}

#[test]
fn bases_can_be_created_renamed_and_deleted() -> Result<()> {
    let store = bootstrapped()?;
    let base = store.create_base("  Home  ")?;
    assert_eq!(base.name, "Home");
    assert!(store.create_base("   ").is_err());

    let renamed = store.rename_base(base.id, "House")?;
    assert_eq!(renamed.name, "House");
    assert_eq!(store.get_base(base.id)?.created_at, base.created_at);

    let table = store.create_table(base.id, "Rooms")?;
    store.delete_base(base.id)?;
    assert!(store.list_bases()?.is_empty());
    assert!(store.list_tables(base.id).is_err());
    assert!(
        store
            .get_rows_page(table.id, 10, 0, &RowQuery::default())
            .is_err(),
        "tables go with their base"
    );

    let err = store
        .delete_base(base.id)
        .expect_err("second delete should fail");
    assert!(err.to_string().contains("not found"));
    Ok(())
}

#[test]
fn ensure_base_reuses_an_existing_name() -> Result<()> {
    let store = bootstrapped()?;
    let first = store.ensure_base("My Base")?;
    let second = store.ensure_base("My Base")?;
    assert_eq!(first.id, second.id);
    let other = store.ensure_base("Side Project")?;
    assert_ne!(first.id, other.id);
    assert_eq!(store.list_bases()?.len(), 2);
    Ok(())
}

#[test]
fn numbers_filter_and_sort_numerically() -> Result<()> {
    let store = bootstrapped()?;
    let base = store.create_base("Numbers")?;
    let table = store.create_table(base.id, "Widgets")?;
    store.bulk_create_rows(
        table.id,
        &[
            record(&[("Name", "Widget A"), ("Priority", "1,000")]),
            record(&[("Name", "Widget B"), ("Priority", "20")]),
            record(&[("Name", "Widget C"), ("Priority", "3")]),
        ],
    )?;

    let sorted = RowQuery {
        search: Some("widget".to_owned()),
        sorts: vec![Sort {
            column: "Priority".to_owned(),
            direction: SortDirection::Asc,
        }],
        ..RowQuery::default()
    };
    let page = store.get_rows_page(table.id, 50, 0, &sorted)?;
    let names = page
        .rows
        .iter()
        .map(|row| row.data["Name"].as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, ["Widget C", "Widget B", "Widget A"]);

    let filtered = RowQuery {
        search: Some("widget".to_owned()),
        filters: vec![Filter {
            column: "Priority".to_owned(),
            operator: FilterOperator::GreaterThan,
            value: "15".to_owned(),
        }],
        ..RowQuery::default()
    };
    assert_eq!(store.get_rows_page(table.id, 50, 0, &filtered)?.total, 2);

    let equal = RowQuery {
        filters: vec![Filter {
            column: "Priority".to_owned(),
            operator: FilterOperator::Equals,
            value: "1000".to_owned(),
        }],
        ..RowQuery::default()
    };
    let page = store.get_rows_page(table.id, 50, 0, &equal)?;
    assert!(page.rows.iter().any(|row| row.data["Name"] == "Widget A"));
    Ok(())
}

#[test]
fn renamed_column_keeps_its_values_on_disk() -> Result<()> {
    let (_dir, path) = temp_db_path()?;
    let table_id = {
        let store = Store::open(&path)?;
        store.bootstrap()?;
        let base = store.create_base("Disk")?;
        let table = store.create_table(base.id, "Notes")?;
        let status = table.column("Status").map(|column| column.id);
        if let Some(status) = status {
            store.update_column(status, Some("Stage"), Some(ColumnType::Text))?;
        }
        table.id
    };

    let store = Store::open(&path)?;
    store.bootstrap()?;
    let page = store.get_rows_page(table_id, 100, 0, &RowQuery::default())?;
    assert_eq!(page.total, SEED_ROW_COUNT);
    assert!(
        page.rows
            .iter()
            .all(|row| row.data.contains_key("Stage") && !row.data.contains_key("Status"))
    );
    Ok(())
}

#[test]
fn views_and_column_order_survive_reopen() -> Result<()> {
    let (_dir, path) = temp_db_path()?;
    let (table_id, view_id) = {
        let store = Store::open(&path)?;
        store.bootstrap()?;
        let base = store.create_base("Disk")?;
        let table = store.create_table(base.id, "Tasks")?;
        let mut order = table.columns.iter().map(|column| column.id).collect::<Vec<_>>();
        order.reverse();
        store.reorder_columns(table.id, &order)?;

        let config = ViewConfig {
            filters: vec![Filter {
                column: "Status".to_owned(),
                operator: FilterOperator::NotEquals,
                value: "Done".to_owned(),
            }],
            sorts: vec![Sort {
                column: "Priority".to_owned(),
                direction: SortDirection::Desc,
            }],
            hidden_columns: vec!["Status".to_owned()],
        };
        let view = store.create_view(table.id, "Open work", &config)?;
        let status = table.column("Status").map(|column| column.id);
        if let Some(status) = status {
            store.update_column(status, Some("Stage"), None)?;
        }
        (table.id, view.id)
    };

    let store = Store::open(&path)?;
    store.bootstrap()?;
    let listed = store.list_tables(store.list_bases()?[0].id)?;
    let names = listed[0]
        .columns
        .iter()
        .map(|column| column.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Priority", "Stage", "Name"]);

    let view = store.get_view(view_id)?;
    assert_eq!(view.name, "Open work");
    assert_eq!(view.config.filters[0].column, "Stage");
    assert_eq!(view.config.sorts[0].direction, SortDirection::Desc);
    assert_eq!(view.config.hidden_columns, vec!["Stage".to_owned()]);

    // An explicit view exists, so no default is created on top of it.
    assert_eq!(store.default_view(table_id)?.id, view_id);
    assert_eq!(store.list_views(table_id)?.len(), 1);
    Ok(())
}

#[test]
fn default_view_is_created_on_first_request() -> Result<()> {
    let store = bootstrapped()?;
    let base = store.create_base("Views")?;
    let table = store.create_table(base.id, "Tasks")?;
    assert!(store.list_views(table.id)?.is_empty());

    let default = store.default_view(table.id)?;
    assert_eq!(default.name, DEFAULT_VIEW_NAME);
    assert_eq!(store.list_views(table.id)?, vec![default]);

    let stored: String = store.raw_connection().query_row(
        "SELECT filters FROM grid_views WHERE table_id = ?",
        [table.id.get()],
        |row| row.get(0),
    )?;
    assert_eq!(stored, "[]");
    Ok(())
}

#[test]
fn controller_edits_reach_sqlite() -> Result<()> {
    let store = bootstrapped()?;
    let base = store.create_base("Grid")?;
    let mut grid = GridController::new(
        base.id,
        GridSettings {
            seed: Some(3),
            ..GridSettings::default()
        },
    );
    grid.start();
    settle(&mut grid, &store);

    let tables = store.list_tables(base.id)?;
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].name, "Table 1");
    assert_eq!(grid.row_count(), SEED_ROW_COUNT);

    grid.begin_edit();
    grid.set_draft("Renamed by hand");
    assert!(grid.commit_edit());
    settle(&mut grid, &store);
    assert!(grid.buffer().is_empty());

    let page = store.get_rows_page(tables[0].id, 1, 0, &RowQuery::default())?;
    assert_eq!(page.rows[0].data["Name"], "Renamed by hand");

    grid.generate_rows(120)?;
    settle(&mut grid, &store);
    assert_eq!(store.list_tables(base.id)?[0].row_count, SEED_ROW_COUNT + 120);
    Ok(())
}

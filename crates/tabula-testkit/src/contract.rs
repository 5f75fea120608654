// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Behavior every [`PersistenceGateway`] must share. The in-memory gateway
//! and the SQLite store both run these checks from their test suites.

use anyhow::{Result, ensure};
use tabula_app::{
    BaseId, ColumnType, DEFAULT_COLUMNS, DEFAULT_VIEW_NAME, Filter, FilterOperator,
    MAX_GENERATED_ROWS, PersistenceGateway, RowData, RowQuery, SEED_ROW_COUNT, Sort,
    SortDirection, ViewConfig, ViewPatch,
};

/// Run every check against `gateway`. `base_id` must name an existing base
/// that holds no tables yet.
pub fn run_all<G>(gateway: &G, base_id: BaseId) -> Result<()>
where
    G: PersistenceGateway + ?Sized,
{
    new_tables_are_seeded(gateway, base_id)?;
    row_updates_merge(gateway, base_id)?;
    column_lifecycle(gateway, base_id)?;
    paging_and_queries(gateway, base_id)?;
    bulk_rows(gateway, base_id)?;
    column_reorder(gateway, base_id)?;
    view_lifecycle(gateway, base_id)?;
    views_follow_columns(gateway, base_id)?;
    last_table_survives(gateway, base_id)?;
    Ok(())
}

fn record(pairs: &[(&str, &str)]) -> RowData {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

pub fn new_tables_are_seeded<G>(gateway: &G, base_id: BaseId) -> Result<()>
where
    G: PersistenceGateway + ?Sized,
{
    let table = gateway.create_table(base_id, "  Contacts ")?;
    ensure!(table.name == "Contacts", "table name not trimmed: {:?}", table.name);
    let names = table
        .columns
        .iter()
        .map(|column| column.name.as_str())
        .collect::<Vec<_>>();
    let expected = DEFAULT_COLUMNS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>();
    ensure!(names == expected, "unexpected default columns {names:?}");

    let page = gateway.get_rows_page(table.id, 100, 0, &RowQuery::default())?;
    ensure!(page.total == SEED_ROW_COUNT, "seeded {} rows", page.total);
    ensure!(!page.has_more, "seeded page should be complete");
    for row in &page.rows {
        ensure!(row.data.len() == DEFAULT_COLUMNS.len(), "row {} missing keys", row.id);
    }

    let listed = gateway.list_tables(base_id)?;
    let found = listed.iter().find(|listed| listed.id == table.id);
    ensure!(
        found.is_some_and(|listed| listed.row_count == SEED_ROW_COUNT),
        "listed table should report its rows"
    );
    ensure!(
        gateway.create_table(base_id, "   ").is_err(),
        "blank table names must be rejected"
    );
    Ok(())
}

pub fn row_updates_merge<G>(gateway: &G, base_id: BaseId) -> Result<()>
where
    G: PersistenceGateway + ?Sized,
{
    let table = gateway.create_table(base_id, "Merge")?;
    let row = gateway.create_row(
        table.id,
        &record(&[("Name", "Ada"), ("Status", "Todo"), ("Ghost", "boo")]),
    )?;
    ensure!(!row.data.contains_key("Ghost"), "unknown keys must be dropped");
    ensure!(row.data.get("Priority").is_some_and(String::is_empty), "missing keys default");

    let updated = gateway.update_row(row.id, &record(&[("Status", "Done"), ("Ghost", "x")]))?;
    ensure!(updated.data["Name"] == "Ada", "untouched keys must survive");
    ensure!(updated.data["Status"] == "Done", "supplied keys must change");
    ensure!(!updated.data.contains_key("Ghost"), "unknown keys stay out");

    let next = gateway.create_row(table.id, &RowData::new())?;
    ensure!(next.order > row.order, "row order must grow");
    gateway.delete_row(next.id)?;
    let after = gateway.create_row(table.id, &RowData::new())?;
    ensure!(after.order > next.order, "row order must not be reused");
    ensure!(gateway.delete_row(next.id).is_err(), "deleting twice must fail");
    Ok(())
}

pub fn column_lifecycle<G>(gateway: &G, base_id: BaseId) -> Result<()>
where
    G: PersistenceGateway + ?Sized,
{
    let table = gateway.create_table(base_id, "Columns")?;
    let owner = gateway.create_column(table.id, "Owner", ColumnType::Text)?;
    ensure!(owner.order == DEFAULT_COLUMNS.len() as i64, "new column goes last");
    ensure!(
        gateway
            .create_column(table.id, "owner", ColumnType::Text)
            .is_err(),
        "duplicate names must be rejected regardless of case"
    );
    ensure!(
        gateway
            .create_column(table.id, &"x".repeat(101), ColumnType::Text)
            .is_err(),
        "overlong names must be rejected"
    );

    let row = gateway.create_row(table.id, &record(&[("Owner", "Kai")]))?;
    let renamed = gateway.update_column(owner.id, Some("Lead"), None)?;
    ensure!(renamed.name == "Lead", "rename not applied");
    let page = gateway.get_rows_page(table.id, 1000, 0, &RowQuery::default())?;
    let stored = page.rows.iter().find(|candidate| candidate.id == row.id);
    ensure!(
        stored.is_some_and(|stored| {
            stored.data.get("Lead").map(String::as_str) == Some("Kai")
                && !stored.data.contains_key("Owner")
        }),
        "rename must move row data to the new key"
    );
    ensure!(
        gateway.update_column(owner.id, Some("Name"), None).is_err(),
        "rename onto a sibling must fail"
    );

    let retyped = gateway.update_column(owner.id, None, Some(ColumnType::Number))?;
    ensure!(retyped.column_type == ColumnType::Number, "retype not applied");

    let status = table
        .columns
        .iter()
        .find(|column| column.name == "Status")
        .map(|column| column.id);
    if let Some(status) = status {
        gateway.delete_column(status)?;
    }
    let tables = gateway.list_tables(base_id)?;
    let refreshed = tables.iter().find(|candidate| candidate.id == table.id);
    ensure!(
        refreshed.is_some_and(|refreshed| {
            refreshed.column("Status").is_none()
                && refreshed
                    .columns
                    .iter()
                    .enumerate()
                    .all(|(index, column)| column.order == index as i64)
        }),
        "deleted column must vanish and orders stay dense"
    );
    let page = gateway.get_rows_page(table.id, 1000, 0, &RowQuery::default())?;
    ensure!(
        page.rows.iter().all(|row| !row.data.contains_key("Status")),
        "deleted column data must be stripped"
    );
    Ok(())
}

pub fn paging_and_queries<G>(gateway: &G, base_id: BaseId) -> Result<()>
where
    G: PersistenceGateway + ?Sized,
{
    let table = gateway.create_table(base_id, "Paging")?;
    let records = (0..40)
        .map(|index| {
            let name = format!("Person {index:02}");
            let priority = (index % 4).to_string();
            record(&[("Name", name.as_str()), ("Priority", priority.as_str())])
        })
        .collect::<Vec<_>>();
    gateway.bulk_create_rows(table.id, &records)?;
    let total = SEED_ROW_COUNT + 40;

    let first = gateway.get_rows_page(table.id, 20, 0, &RowQuery::default())?;
    ensure!(first.rows.len() == 20 && first.has_more, "first page shape");
    ensure!(first.total == total, "total counts every row");
    let last = gateway.get_rows_page(table.id, 20, 40, &RowQuery::default())?;
    ensure!(last.rows.len() == total - 40 && !last.has_more, "last page shape");
    let past = gateway.get_rows_page(table.id, 20, total + 5, &RowQuery::default())?;
    ensure!(past.rows.is_empty() && !past.has_more, "offset past the end is empty");
    let orders = first.rows.iter().map(|row| row.order).collect::<Vec<_>>();
    ensure!(orders.windows(2).all(|pair| pair[0] < pair[1]), "pages follow row order");

    let search = RowQuery {
        search: Some("person 1".to_owned()),
        ..RowQuery::default()
    };
    let found = gateway.get_rows_page(table.id, 100, 0, &search)?;
    ensure!(found.total == 10, "search matched {} rows", found.total);

    let filtered = RowQuery {
        search: Some("person".to_owned()),
        filters: vec![Filter {
            column: "Priority".to_owned(),
            operator: FilterOperator::Equals,
            value: "3".to_owned(),
        }],
        sorts: vec![Sort {
            column: "Name".to_owned(),
            direction: SortDirection::Desc,
        }],
    };
    let page = gateway.get_rows_page(table.id, 100, 0, &filtered)?;
    ensure!(page.total == 10, "filter matched {} rows", page.total);
    ensure!(
        page.rows.first().is_some_and(|row| row.data["Name"] == "Person 39"),
        "descending sort puts the last name first"
    );
    Ok(())
}

pub fn bulk_rows<G>(gateway: &G, base_id: BaseId) -> Result<()>
where
    G: PersistenceGateway + ?Sized,
{
    let table = gateway.create_table(base_id, "Bulk")?;
    ensure!(gateway.generate_fake_rows(table.id, 25)? == 25, "generated count");
    ensure!(
        gateway.generate_fake_rows(table.id, 0).is_err(),
        "zero rows must be rejected"
    );
    ensure!(
        gateway
            .generate_fake_rows(table.id, MAX_GENERATED_ROWS + 1)
            .is_err(),
        "too many rows must be rejected"
    );
    let page = gateway.get_rows_page(table.id, 1000, 0, &RowQuery::default())?;
    ensure!(page.total == SEED_ROW_COUNT + 25, "generated rows persisted");

    let doomed = page.rows.iter().take(5).map(|row| row.id).collect::<Vec<_>>();
    ensure!(gateway.bulk_delete_rows(&doomed)? == 5, "bulk delete count");
    ensure!(gateway.bulk_delete_rows(&doomed)? == 0, "second bulk delete is a no-op");
    let page = gateway.get_rows_page(table.id, 1000, 0, &RowQuery::default())?;
    ensure!(page.total == SEED_ROW_COUNT + 20, "bulk delete persisted");
    Ok(())
}

pub fn column_reorder<G>(gateway: &G, base_id: BaseId) -> Result<()>
where
    G: PersistenceGateway + ?Sized,
{
    let table = gateway.create_table(base_id, "Reorder")?;
    let mut order = table.columns.iter().map(|column| column.id).collect::<Vec<_>>();
    order.rotate_left(1);
    let reordered = gateway.reorder_columns(table.id, &order)?;
    let ids = reordered.iter().map(|column| column.id).collect::<Vec<_>>();
    ensure!(ids == order, "columns come back in the new order");
    ensure!(
        reordered
            .iter()
            .enumerate()
            .all(|(index, column)| column.order == index as i64),
        "reordered positions must be dense"
    );

    let listed = gateway.list_tables(base_id)?;
    let names = listed
        .iter()
        .find(|candidate| candidate.id == table.id)
        .map(|listed| {
            listed
                .columns
                .iter()
                .map(|column| column.name.clone())
                .collect::<Vec<_>>()
        });
    ensure!(
        names
            .as_ref()
            .is_some_and(|names| *names == ["Status", "Priority", "Name"]),
        "listing must follow the stored order, got {names:?}"
    );

    let before = gateway.list_tables(base_id)?;
    ensure!(
        gateway.reorder_columns(table.id, &order[..1]).is_err(),
        "a partial order must be rejected"
    );
    let doubled = vec![order[0]; order.len()];
    ensure!(
        gateway.reorder_columns(table.id, &doubled).is_err(),
        "a repeated column must be rejected"
    );
    ensure!(gateway.list_tables(base_id)? == before, "rejected orders change nothing");
    Ok(())
}

pub fn view_lifecycle<G>(gateway: &G, base_id: BaseId) -> Result<()>
where
    G: PersistenceGateway + ?Sized,
{
    let table = gateway.create_table(base_id, "Views")?;
    let default = gateway.default_view(table.id)?;
    ensure!(default.name == DEFAULT_VIEW_NAME, "default view name {:?}", default.name);
    ensure!(default.config == ViewConfig::default(), "default view starts empty");
    ensure!(
        gateway.default_view(table.id)?.id == default.id,
        "the default view is created once"
    );

    let config = ViewConfig {
        filters: vec![Filter {
            column: "Priority".to_owned(),
            operator: FilterOperator::GreaterThan,
            value: "2".to_owned(),
        }],
        sorts: vec![Sort {
            column: "Name".to_owned(),
            direction: SortDirection::Desc,
        }],
        hidden_columns: vec!["Status".to_owned()],
    };
    let urgent = gateway.create_view(table.id, " Urgent ", &config)?;
    ensure!(urgent.name == "Urgent", "view name not trimmed: {:?}", urgent.name);
    ensure!(gateway.get_view(urgent.id)?.config == config, "config must round-trip");
    ensure!(
        gateway.create_view(table.id, "", &config).is_err(),
        "blank view names must be rejected"
    );
    ensure!(
        gateway
            .create_view(table.id, &"v".repeat(101), &config)
            .is_err(),
        "overlong view names must be rejected"
    );

    let renamed = gateway.update_view(urgent.id, &ViewPatch::rename("Hot"))?;
    ensure!(renamed.name == "Hot", "rename not applied");
    ensure!(renamed.config == config, "a rename keeps the config");
    let cleared = gateway.update_view(
        urgent.id,
        &ViewPatch {
            sorts: Some(Vec::new()),
            ..ViewPatch::default()
        },
    )?;
    ensure!(cleared.config.sorts.is_empty(), "sorts cleared");
    ensure!(cleared.config.filters == config.filters, "filters untouched");

    let copy = gateway.duplicate_view(urgent.id, "Hot copy")?;
    ensure!(copy.id != urgent.id, "a duplicate is a new view");
    ensure!(copy.config == cleared.config, "a duplicate copies the config");

    let names = gateway
        .list_views(table.id)?
        .into_iter()
        .map(|view| view.name)
        .collect::<Vec<_>>();
    ensure!(names == ["Default View", "Hot", "Hot copy"], "views listed oldest first: {names:?}");

    gateway.delete_view(copy.id)?;
    ensure!(gateway.get_view(copy.id).is_err(), "deleted view is gone");
    ensure!(gateway.delete_view(copy.id).is_err(), "deleting twice must fail");
    ensure!(gateway.list_views(table.id)?.len() == 2, "one view removed");
    Ok(())
}

pub fn views_follow_columns<G>(gateway: &G, base_id: BaseId) -> Result<()>
where
    G: PersistenceGateway + ?Sized,
{
    let table = gateway.create_table(base_id, "Tracked")?;
    let config = ViewConfig {
        filters: vec![Filter {
            column: "Status".to_owned(),
            operator: FilterOperator::Equals,
            value: "Done".to_owned(),
        }],
        sorts: vec![Sort {
            column: "Priority".to_owned(),
            direction: SortDirection::Asc,
        }],
        hidden_columns: vec!["Status".to_owned()],
    };
    let view = gateway.create_view(table.id, "Done", &config)?;
    let column = |name: &str| {
        table
            .columns
            .iter()
            .find(|column| column.name == name)
            .map(|column| column.id)
    };
    if let Some(status) = column("Status") {
        gateway.update_column(status, Some("Stage"), None)?;
    }
    let stored = gateway.get_view(view.id)?;
    ensure!(stored.config.filters[0].column == "Stage", "filter follows the rename");
    ensure!(stored.config.is_hidden("Stage"), "hidden column follows the rename");

    if let Some(priority) = column("Priority") {
        gateway.delete_column(priority)?;
    }
    let stored = gateway.get_view(view.id)?;
    ensure!(stored.config.sorts.is_empty(), "deleted column leaves the sorts");

    let doomed = gateway.create_table(base_id, "Doomed")?;
    let orphan = gateway.default_view(doomed.id)?;
    gateway.delete_table(doomed.id)?;
    ensure!(gateway.get_view(orphan.id).is_err(), "table delete cascades to views");
    Ok(())
}

pub fn last_table_survives<G>(gateway: &G, base_id: BaseId) -> Result<()>
where
    G: PersistenceGateway + ?Sized,
{
    let mut tables = gateway.list_tables(base_id)?;
    if tables.is_empty() {
        gateway.create_table(base_id, "Only")?;
        tables = gateway.list_tables(base_id)?;
    }
    while tables.len() > 1 {
        let doomed = tables[tables.len() - 1].id;
        gateway.delete_table(doomed)?;
        let page = gateway.get_rows_page(doomed, 10, 0, &RowQuery::default());
        ensure!(
            page.map_or(true, |page| page.total == 0),
            "table delete must cascade to rows"
        );
        tables = gateway.list_tables(base_id)?;
    }
    let survivor = tables[0].id;
    ensure!(
        gateway.delete_table(survivor).is_err(),
        "the last table in a base must not be deleted"
    );
    ensure!(gateway.list_tables(base_id)?.len() == 1, "survivor still listed");
    Ok(())
}

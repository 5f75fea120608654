// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! The grid controller turns user intents into local mutations plus queued
//! persistence requests, and settles them when completions come back.
//!
//! The controller never talks to storage directly. Callers drain
//! [`GridController::take_requests`], run them (usually on the
//! [`PersistenceWorker`](crate::worker::PersistenceWorker)) and feed each
//! [`Completion`] back through [`GridController::complete`].

use std::collections::BTreeSet;
use std::ops::Range;
use std::time::Instant;
use tracing::{debug, info};

use crate::buffer::{CellEditBuffer, CellKey, Confirmation, EditSeq, Rejection};
use crate::bulk::{BulkConfig, BulkInsertion, BulkOutcome, BulkStep, CancellationToken};
use crate::error::GridError;
use crate::faker::GridFaker;
use crate::gateway::{Request, Response};
use crate::ids::{BaseId, ColumnId, RowId, TableId, ViewId};
use crate::model::{
    BulkProgress, CellValue, Column, ColumnType, DEFAULT_PAGE_SIZE, Filter, MAX_GENERATED_ROWS,
    MAX_PAGE_SIZE, RowData, RowPage, RowQuery, Sort, SortDirection, Table, View, ViewConfig,
    ViewPatch, default_table_name, validate_column_name, validate_column_order,
    validate_table_name, validate_view_name,
};
use crate::navigation::{CellCursor, GridKey, Move};
use crate::optimistic::{Ledger, Optimistic, Ticket};
use crate::store::{GridRow, OptimisticGridStore};
use crate::values;
use crate::viewport::{DEFAULT_OVERSCAN, DEFAULT_PREFETCH_THRESHOLD, PageLoader, Viewport};
use crate::worker::{Completion, Outgoing};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridSettings {
    pub page_size: usize,
    pub prefetch_threshold: usize,
    pub overscan: usize,
    pub bulk: BulkConfig,
    /// Fixed faker seed; `None` seeds from the clock.
    pub seed: Option<u64>,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            prefetch_threshold: DEFAULT_PREFETCH_THRESHOLD,
            overscan: DEFAULT_OVERSCAN,
            bulk: BulkConfig::default(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Clean,
    Editing,
    Saving,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    pub row_id: RowId,
    pub column: String,
    pub draft: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Followup {
    ReloadRows,
    ReloadTables,
    Activate(TableId),
    CreateDefaultTable,
    BulkBatch(Result<usize, String>),
    /// Switch to a view's filters, sorts and hidden columns, or to an empty
    /// query when the table's views could not be loaded.
    ApplyView(Option<View>),
}

/// A refresh split into pages of at most [`MAX_PAGE_SIZE`]. The mirror is
/// rebuilt once every chunk has arrived.
#[derive(Debug)]
struct PendingReload {
    generation: u64,
    chunks: Vec<Option<RowPage>>,
}

/// Everything settle handlers may touch.
#[derive(Debug)]
pub struct GridModel {
    base_id: BaseId,
    tables: Vec<Table>,
    active: Option<TableId>,
    deleting: BTreeSet<TableId>,
    store: OptimisticGridStore,
    buffer: CellEditBuffer,
    loader: PageLoader,
    generation: u64,
    reload: Option<PendingReload>,
    query: RowQuery,
    views: Vec<View>,
    active_view: Option<ViewId>,
    status: Option<String>,
    followups: Vec<Followup>,
}

impl GridModel {
    fn new(base_id: BaseId, settings: &GridSettings) -> Self {
        Self {
            base_id,
            tables: Vec::new(),
            active: None,
            deleting: BTreeSet::new(),
            store: OptimisticGridStore::new(),
            buffer: CellEditBuffer::new(),
            loader: PageLoader::new(settings.page_size, settings.prefetch_threshold),
            generation: 0,
            reload: None,
            query: RowQuery::default(),
            views: Vec::new(),
            active_view: None,
            status: None,
            followups: Vec::new(),
        }
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some(message.into());
    }

    fn fail(&mut self, action: &str, error: &anyhow::Error) {
        self.set_status(format!("{action} failed: {error:#}"));
    }

    fn apply_tables(&mut self, mut tables: Vec<Table>) {
        if tables.is_empty() {
            self.tables.clear();
            self.followups.push(Followup::CreateDefaultTable);
            return;
        }
        let position = self
            .active
            .and_then(|id| tables.iter().position(|table| table.id == id));
        match position {
            Some(index) => {
                let table = &mut tables[index];
                // Columns still being created are not in the listing yet.
                let pending = self
                    .store
                    .columns()
                    .iter()
                    .filter(|column| column.id.is_temporary())
                    .filter(|column| !table.has_column_named(&column.name))
                    .cloned()
                    .collect::<Vec<_>>();
                table.columns.extend(pending);
                self.store.refresh_metadata(table.clone());
            }
            None => self.followups.push(Followup::Activate(tables[0].id)),
        }
        self.tables = tables;
    }

    // Mirror the active table's metadata into the table list so switching
    // away and back keeps local column changes.
    fn sync_active_table(&mut self) {
        let Some(current) = self.store.table() else {
            return;
        };
        if let Some(entry) = self.tables.iter_mut().find(|table| table.id == current.id) {
            entry.name = current.name.clone();
            entry.columns = current.columns.clone();
        }
    }

    fn reload_chunk_arrived(&mut self, generation: u64, index: usize, page: RowPage) {
        let Some(reload) = self
            .reload
            .as_mut()
            .filter(|reload| reload.generation == generation)
        else {
            return;
        };
        if let Some(slot) = reload.chunks.get_mut(index) {
            *slot = Some(page);
        }
        if reload.chunks.iter().any(Option::is_none) {
            return;
        }
        let Some(reload) = self.reload.take() else {
            return;
        };
        let mut merged = RowPage::default();
        for chunk in reload.chunks.into_iter().flatten() {
            merged.total = chunk.total;
            merged.has_more = chunk.has_more;
            merged.rows.extend(chunk.rows);
        }
        let received = merged.rows.len();
        let has_more = merged.has_more;
        self.store.replace_rows(merged, &self.buffer);
        self.loader.page_loaded(received, has_more, true);
    }

    fn reload_failed(&mut self, generation: u64) {
        if self
            .reload
            .as_ref()
            .is_some_and(|reload| reload.generation == generation)
        {
            self.reload = None;
            self.loader.fetch_failed();
        }
    }

    /// Follow a column rename in the query, hidden columns and saved views.
    fn rename_column_refs(&mut self, old: &str, new: &str) {
        for filter in self.query.filters.iter_mut().filter(|f| f.column == old) {
            filter.column = new.to_owned();
        }
        for sort in self.query.sorts.iter_mut().filter(|sort| sort.column == old) {
            sort.column = new.to_owned();
        }
        for view in &mut self.views {
            view.config.rename_column(old, new);
        }
    }

    fn forget_column(&mut self, name: &str) {
        self.query.filters.retain(|filter| filter.column != name);
        self.query.sorts.retain(|sort| sort.column != name);
        for view in &mut self.views {
            view.config.remove_column(name);
        }
    }

    fn view_mut(&mut self, view_id: ViewId) -> Option<&mut View> {
        self.views.iter_mut().find(|view| view.id == view_id)
    }

    fn set_table_name(&mut self, table_id: TableId, name: &str) {
        if let Some(entry) = self.tables.iter_mut().find(|table| table.id == table_id) {
            entry.name = name.to_owned();
        }
        if let Some(active) = self.store.table().filter(|table| table.id == table_id) {
            let renamed = Table {
                name: name.to_owned(),
                ..active.clone()
            };
            self.store.refresh_metadata(renamed);
        }
    }
}

struct BulkRun {
    table_id: TableId,
    insertion: BulkInsertion,
}

pub struct GridController {
    model: GridModel,
    ledger: Ledger<GridModel, Response>,
    outbox: Vec<Outgoing>,
    cursor: CellCursor,
    editing: Option<EditSession>,
    viewport: Viewport,
    bulk: Option<BulkRun>,
    faker: GridFaker,
    settings: GridSettings,
    next_temp_column: i64,
}

impl GridController {
    pub fn new(base_id: BaseId, settings: GridSettings) -> Self {
        let faker = settings
            .seed
            .map_or_else(GridFaker::from_clock, GridFaker::new);
        Self {
            model: GridModel::new(base_id, &settings),
            ledger: Ledger::new(),
            outbox: Vec::new(),
            cursor: CellCursor::default(),
            editing: None,
            viewport: Viewport::new(settings.overscan),
            bulk: None,
            faker,
            settings,
            next_temp_column: 0,
        }
    }

    /// Load the base's tables. An empty base gets a default table.
    pub fn start(&mut self) {
        info!(base_id = %self.model.base_id, "loading tables");
        self.request_tables();
    }

    pub fn take_requests(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    pub fn complete(&mut self, completion: Completion, now: Instant) {
        let Completion { ticket, result } = completion;
        self.ledger.settle(&mut self.model, ticket, result);
        self.run_followups(now);
        self.cursor = self.cursor.clamp(self.row_count(), self.column_count());
    }

    pub fn complete_all(&mut self, completions: Vec<Completion>, now: Instant) {
        for completion in completions {
            self.complete(completion, now);
        }
    }

    /// Nothing queued, nothing in flight, no bulk run.
    pub fn is_idle(&self) -> bool {
        self.outbox.is_empty() && self.ledger.is_idle() && self.bulk.is_none()
    }

    pub fn in_flight(&self) -> usize {
        self.ledger.in_flight()
    }

    // --- reads ---------------------------------------------------------

    pub fn base_id(&self) -> BaseId {
        self.model.base_id
    }

    pub fn tables(&self) -> &[Table] {
        &self.model.tables
    }

    pub fn active_table(&self) -> Option<&Table> {
        self.model.store.table()
    }

    pub fn store(&self) -> &OptimisticGridStore {
        &self.model.store
    }

    pub fn buffer(&self) -> &CellEditBuffer {
        &self.model.buffer
    }

    pub fn loader(&self) -> &PageLoader {
        &self.model.loader
    }

    pub fn cursor(&self) -> CellCursor {
        self.cursor
    }

    pub fn editing(&self) -> Option<&EditSession> {
        self.editing.as_ref()
    }

    pub fn query(&self) -> &RowQuery {
        &self.model.query
    }

    /// Saved views of the active table, oldest first.
    pub fn views(&self) -> &[View] {
        &self.model.views
    }

    pub fn active_view(&self) -> Option<&View> {
        let view_id = self.model.active_view?;
        self.model.views.iter().find(|view| view.id == view_id)
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn settings(&self) -> &GridSettings {
        &self.settings
    }

    pub fn status(&self) -> Option<&str> {
        self.model.status.as_deref()
    }

    pub fn clear_status(&mut self) {
        self.model.status = None;
    }

    pub fn row_count(&self) -> usize {
        self.model.store.len()
    }

    /// Visible columns; hidden ones are not navigable.
    pub fn column_count(&self) -> usize {
        self.model.store.visible_count()
    }

    pub fn cell_state(&self, row_id: RowId, column: &str) -> CellState {
        if let Some(session) = &self.editing
            && session.row_id == row_id
            && session.column == column
        {
            return CellState::Editing;
        }
        let key = CellKey::new(row_id, column);
        if self.model.buffer.contains(&key) {
            CellState::Saving
        } else if self.model.store.has_error(&key) {
            CellState::Error
        } else {
            CellState::Clean
        }
    }

    pub fn display_value(&self, row: usize, col: usize) -> String {
        let Some(column) = self.model.store.column_at(col) else {
            return String::new();
        };
        self.model
            .store
            .row(row)
            .and_then(|row| row.value(&column.name))
            .map(|value| values::format(value, column.column_type))
            .unwrap_or_default()
    }

    // --- viewport ------------------------------------------------------

    pub fn set_viewport_height(&mut self, height: usize) {
        self.viewport.set_height(height);
        self.viewport.scroll_to_reveal(self.cursor.row);
    }

    /// Recompute the rendered range and fetch the next page when the end
    /// of the loaded rows comes within reach.
    pub fn sync_viewport(&mut self) -> Range<usize> {
        if let Some(range) = self.viewport.update(self.model.store.len()) {
            debug!(start = range.start, end = range.end, "rendered range changed");
        }
        let range = self.viewport.rendered();
        self.fetch_more(range.end.saturating_sub(1));
        range
    }

    // --- keyboard and mouse --------------------------------------------

    pub fn handle_key(&mut self, key: GridKey) {
        if self.editing.is_some() {
            match key {
                GridKey::Enter => self.commit_and_move(Move::Down),
                GridKey::Tab => self.commit_and_move(Move::Right),
                GridKey::BackTab => self.commit_and_move(Move::Left),
                GridKey::Escape => self.cancel_edit(),
                GridKey::Backspace => {
                    if let Some(session) = &mut self.editing {
                        session.draft.pop();
                    }
                }
                GridKey::Space => self.push_draft(' '),
                GridKey::Char(ch) => self.push_draft(ch),
                GridKey::Up
                | GridKey::Down
                | GridKey::Left
                | GridKey::Right
                | GridKey::F2
                | GridKey::PageUp
                | GridKey::PageDown => {}
            }
            return;
        }
        match key {
            GridKey::Up => self.move_cursor(Move::Up),
            GridKey::Down => self.move_cursor(Move::Down),
            GridKey::Left | GridKey::BackTab => self.move_cursor(Move::Left),
            GridKey::Right | GridKey::Tab => self.move_cursor(Move::Right),
            GridKey::PageUp => self.jump(-(self.page_rows() as isize)),
            GridKey::PageDown => self.jump(self.page_rows() as isize),
            GridKey::Enter | GridKey::F2 | GridKey::Space => {
                self.begin_edit();
            }
            GridKey::Escape | GridKey::Backspace | GridKey::Char(_) => {}
        }
    }

    /// Single click: select, or edit when the cell is already selected.
    pub fn click(&mut self, row: usize, col: usize) {
        let target = CellCursor::new(row, col).clamp(self.row_count(), self.column_count());
        if self.editing.is_some() {
            if target == self.cursor {
                return;
            }
            self.commit_edit();
            self.select(target);
            return;
        }
        if target == self.cursor {
            self.begin_edit();
        } else {
            self.select(target);
        }
    }

    pub fn double_click(&mut self, row: usize, col: usize) {
        let target = CellCursor::new(row, col).clamp(self.row_count(), self.column_count());
        if self.editing.is_some() {
            if target == self.cursor {
                return;
            }
            self.commit_edit();
        }
        self.select(target);
        self.begin_edit();
    }

    /// Focus left the grid; an open editor commits.
    pub fn blur(&mut self) {
        self.commit_edit();
    }

    pub fn move_cursor(&mut self, direction: Move) {
        let next = self
            .cursor
            .step(direction, self.row_count(), self.column_count());
        self.select(next);
    }

    // --- cell editing --------------------------------------------------

    /// Open the editor on the focused cell, seeded with its display text.
    pub fn begin_edit(&mut self) -> bool {
        if self.editing.is_some() {
            return false;
        }
        let Some(column) = self.model.store.column_at(self.cursor.col) else {
            return false;
        };
        let Some(row) = self.model.store.row(self.cursor.row) else {
            return false;
        };
        let draft = row
            .value(&column.name)
            .map(|value| values::format(value, column.column_type))
            .unwrap_or_default();
        self.editing = Some(EditSession {
            row_id: row.id,
            column: column.name.clone(),
            draft,
        });
        true
    }

    pub fn set_draft(&mut self, draft: impl Into<String>) {
        if let Some(session) = &mut self.editing {
            session.draft = draft.into();
        }
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }

    /// Validate the draft, patch the mirror and queue the save. Returns
    /// whether a save was issued; unchanged values are not sent.
    pub fn commit_edit(&mut self) -> bool {
        let Some(session) = self.editing.take() else {
            return false;
        };
        let Some(column_type) = self
            .model
            .store
            .column(&session.column)
            .map(|column| column.column_type)
        else {
            return false;
        };
        let value = values::validate(&session.draft, column_type);
        let key = CellKey::new(session.row_id, session.column);
        let current = self
            .model
            .store
            .value(key.row_id, &key.column)
            .cloned()
            .unwrap_or_else(|| values::default_value(column_type));
        // A flagged cell may be re-sent unchanged to clear its error.
        let flagged = self.model.store.has_error(&key);
        if value == current && !self.model.buffer.contains(&key) && !flagged {
            return false;
        }
        let seq = self.model.buffer.set(key.clone(), value.clone(), current);
        self.persist_cell(key, seq, value);
        true
    }

    /// Send every buffered edit again, after committing an open editor.
    pub fn flush_pending(&mut self) -> usize {
        self.commit_edit();
        let keys = self.model.buffer.keys().cloned().collect::<Vec<_>>();
        let mut flushed = 0;
        for key in keys {
            if let Some((seq, value)) = self.model.buffer.reissue(&key) {
                self.persist_cell(key, seq, value);
                flushed += 1;
            }
        }
        if flushed > 0 {
            debug!(flushed, "re-sent pending edits");
        }
        flushed
    }

    // --- tables --------------------------------------------------------

    pub fn create_table(&mut self, name: Option<&str>) -> Result<(), GridError> {
        let name = match name {
            Some(raw) => validate_table_name(raw)?,
            None => default_table_name(self.model.tables.len()),
        };
        self.request_create_table(name);
        Ok(())
    }

    pub fn rename_table(&mut self, table_id: TableId, name: &str) -> Result<(), GridError> {
        let name = validate_table_name(name)?;
        let previous = self
            .model
            .tables
            .iter()
            .find(|table| table.id == table_id)
            .map(|table| table.name.clone())
            .ok_or(GridError::UnknownTable { id: table_id.get() })?;
        if previous == name {
            return Ok(());
        }
        info!(%table_id, from = %previous, to = %name, "renaming table");
        let local = name.clone();
        self.issue(
            Request::RenameTable { table_id, name },
            move |model| model.set_table_name(table_id, &local),
            move |mutation| {
                mutation.on_compensate(move |model, error| {
                    model.set_table_name(table_id, &previous);
                    model.fail("renaming table", error);
                    model.followups.push(Followup::ReloadTables);
                })
            },
        );
        Ok(())
    }

    /// Delete a table. The last table of a base cannot be deleted; when the
    /// active table goes, the first remaining table becomes active.
    pub fn delete_table(&mut self, table_id: TableId) -> Result<(), GridError> {
        if !self.model.tables.iter().any(|table| table.id == table_id) {
            return Err(GridError::UnknownTable { id: table_id.get() });
        }
        if self.model.deleting.contains(&table_id) {
            return Err(GridError::TableBeingDeleted { id: table_id.get() });
        }
        let remaining = self
            .model
            .tables
            .iter()
            .filter(|table| !self.model.deleting.contains(&table.id))
            .count();
        if remaining <= 1 {
            return Err(GridError::LastTable);
        }
        info!(%table_id, "deleting table");
        self.issue(
            Request::DeleteTable { table_id },
            move |model| {
                model.deleting.insert(table_id);
            },
            move |mutation| {
                mutation
                    .on_confirm(move |model, _| {
                        model.deleting.remove(&table_id);
                        model.tables.retain(|table| table.id != table_id);
                        model.set_status("table deleted");
                        if model.active == Some(table_id) {
                            model.active = None;
                            model.store.unload();
                            if let Some(first) = model.tables.first() {
                                model.followups.push(Followup::Activate(first.id));
                            }
                        }
                    })
                    .on_compensate(move |model, error| {
                        model.deleting.remove(&table_id);
                        model.fail("deleting table", error);
                    })
            },
        );
        Ok(())
    }

    pub fn select_table(&mut self, table_id: TableId) -> Result<(), GridError> {
        if !self.model.tables.iter().any(|table| table.id == table_id) {
            return Err(GridError::UnknownTable { id: table_id.get() });
        }
        self.switch_to(table_id);
        Ok(())
    }

    pub fn next_table(&mut self) {
        self.rotate_table(1);
    }

    pub fn prev_table(&mut self) {
        self.rotate_table(-1);
    }

    // --- columns -------------------------------------------------------

    /// Add a column under a temporary id. Every loaded row gets the type's
    /// default right away; the listing and rows are refetched once storage
    /// answers either way.
    pub fn create_column(&mut self, name: &str, column_type: ColumnType) -> Result<(), GridError> {
        let table = self.model.store.table().ok_or(GridError::NoActiveTable)?;
        let name = validate_column_name(name)?;
        if table.has_column_named(&name) {
            return Err(GridError::DuplicateColumn { name });
        }
        let table_id = table.id;
        let order = table.columns.len() as i64;
        let temporary = ColumnId::temporary(self.next_temp_column);
        self.next_temp_column += 1;
        let column = Column {
            id: temporary,
            table_id,
            name: name.clone(),
            column_type,
            order,
        };
        info!(column = %name, column_type = column_type.as_str(), "creating column");
        self.issue(
            Request::CreateColumn {
                table_id,
                name,
                column_type,
            },
            move |model| {
                model.store.push_column(column);
                model.sync_active_table();
            },
            move |mutation| {
                mutation
                    .on_confirm(move |model, response| {
                        if let Response::Column(saved) = response {
                            model.store.replace_column(temporary, saved);
                            model.sync_active_table();
                        }
                        model.followups.push(Followup::ReloadTables);
                        model.followups.push(Followup::ReloadRows);
                    })
                    .on_compensate(move |model, error| {
                        model.store.remove_column(temporary);
                        model.sync_active_table();
                        model.fail("creating column", error);
                        model.followups.push(Followup::ReloadTables);
                        model.followups.push(Followup::ReloadRows);
                    })
            },
        );
        Ok(())
    }

    /// Rename a column locally (metadata, every loaded row, pending edits),
    /// then persist. Failure undoes the local rename and refetches.
    pub fn rename_column(&mut self, old: &str, new: &str) -> Result<(), GridError> {
        self.commit_edit();
        let column = self.saved_column(old)?;
        let new = validate_column_name(new)?;
        if new == column.name {
            return Ok(());
        }
        let clash = self.model.store.columns().iter().any(|other| {
            other.id != column.id && other.name.eq_ignore_ascii_case(&new)
        });
        if clash {
            return Err(GridError::DuplicateColumn { name: new });
        }
        let old = column.name;
        info!(from = %old, to = %new, "renaming column");
        let (apply_old, apply_new) = (old.clone(), new.clone());
        self.issue(
            Request::UpdateColumn {
                column_id: column.id,
                name: Some(new.clone()),
                column_type: None,
            },
            move |model| {
                model.store.rename_column(&apply_old, &apply_new);
                model.buffer.rename_column(&apply_old, &apply_new);
                model.rename_column_refs(&apply_old, &apply_new);
                model.sync_active_table();
            },
            move |mutation| {
                mutation.on_compensate(move |model, error| {
                    model.store.rename_column(&new, &old);
                    model.buffer.rename_column(&new, &old);
                    model.rename_column_refs(&new, &old);
                    model.sync_active_table();
                    model.fail("renaming column", error);
                    model.followups.push(Followup::ReloadTables);
                    model.followups.push(Followup::ReloadRows);
                })
            },
        );
        Ok(())
    }

    /// Change a column's type and coerce every loaded value, then persist.
    /// Coercion is lossy, so failure refetches instead of converting back.
    pub fn retype_column(&mut self, name: &str, to: ColumnType) -> Result<(), GridError> {
        self.commit_edit();
        let column = self.saved_column(name)?;
        let from = column.column_type;
        if from == to {
            return Ok(());
        }
        let name = column.name;
        info!(column = %name, from = from.as_str(), to = to.as_str(), "retyping column");
        let apply_name = name.clone();
        self.issue(
            Request::UpdateColumn {
                column_id: column.id,
                name: None,
                column_type: Some(to),
            },
            move |model| {
                if let Some(from) = model.store.retype_column(&apply_name, to) {
                    model.buffer.retype_column(&apply_name, from, to);
                }
                model.sync_active_table();
            },
            move |mutation| {
                mutation.on_compensate(move |model, error| {
                    if model.store.retype_column(&name, from).is_some() {
                        model.buffer.retype_column(&name, to, from);
                    }
                    model.sync_active_table();
                    model.fail("changing column type", error);
                    model.followups.push(Followup::ReloadTables);
                    model.followups.push(Followup::ReloadRows);
                })
            },
        );
        Ok(())
    }

    /// Delete a column by name. Loaded rows keep the orphaned value until
    /// the refetch that follows a successful delete.
    pub fn delete_column(&mut self, name: &str) -> Result<(), GridError> {
        self.commit_edit();
        let column = self.saved_column(name)?;
        info!(column = %column.name, "deleting column");
        let column_id = column.id;
        let name = column.name;
        self.issue(
            Request::DeleteColumn { column_id },
            |_| {},
            move |mutation| {
                mutation
                    .on_confirm(move |model, _| {
                        model.store.remove_column(column_id);
                        model.buffer.remove_column(&name);
                        model.forget_column(&name);
                        model.sync_active_table();
                        model.followups.push(Followup::ReloadRows);
                    })
                    .on_compensate(|model, error| model.fail("deleting column", error))
            },
        );
        Ok(())
    }

    /// Hide a column from the grid and the active view. Its values stay in
    /// storage and in the loaded rows.
    pub fn hide_column(&mut self, name: &str) -> Result<(), GridError> {
        self.require_column(name)?;
        self.commit_edit();
        if self.model.store.hide_column(name) {
            self.cursor = self.cursor.clamp(self.row_count(), self.column_count());
            self.save_view();
        }
        Ok(())
    }

    pub fn show_column(&mut self, name: &str) -> Result<(), GridError> {
        self.require_column(name)?;
        if self.model.store.show_column(name) {
            self.save_view();
        }
        Ok(())
    }

    pub fn show_all_columns(&mut self) {
        if self.model.store.hidden_columns().is_empty() {
            return;
        }
        self.model.store.set_hidden(&[]);
        self.save_view();
    }

    /// Put the active table's columns in `order`, which must name every
    /// column exactly once. Failure restores the previous order.
    pub fn reorder_columns(&mut self, order: Vec<ColumnId>) -> Result<(), GridError> {
        let table = self.model.store.table().ok_or(GridError::NoActiveTable)?;
        if let Some(pending) = table.columns.iter().find(|column| column.id.is_temporary()) {
            return Err(GridError::ColumnPending {
                name: pending.name.clone(),
            });
        }
        validate_column_order(&table.columns, &order)?;
        let previous = table.columns.iter().map(|column| column.id).collect::<Vec<_>>();
        if previous == order {
            return Ok(());
        }
        let table_id = table.id;
        info!(%table_id, "reordering columns");
        self.commit_edit();
        let local = order.clone();
        self.issue(
            Request::ReorderColumns { table_id, order },
            move |model| {
                model.store.reorder_columns(&local);
                model.sync_active_table();
            },
            move |mutation| {
                mutation.on_compensate(move |model, error| {
                    if model.active == Some(table_id) {
                        model.store.reorder_columns(&previous);
                        model.sync_active_table();
                    }
                    model.fail("reordering columns", error);
                    model.followups.push(Followup::ReloadTables);
                })
            },
        );
        Ok(())
    }

    /// Move a visible column `offset` places left (negative) or right among
    /// the visible columns. Hidden columns keep their positions.
    pub fn move_column(&mut self, name: &str, offset: isize) -> Result<(), GridError> {
        self.require_column(name)?;
        let columns = self.model.store.columns();
        let mut order = columns.iter().map(|column| column.id).collect::<Vec<_>>();
        let visible = self
            .model
            .store
            .visible_columns()
            .map(|column| column.id)
            .collect::<Vec<_>>();
        let Some(moving) = columns.iter().find(|column| column.name == name).map(|c| c.id) else {
            return Err(GridError::UnknownColumn {
                name: name.to_owned(),
            });
        };
        let Some(from) = visible.iter().position(|id| *id == moving) else {
            return Ok(());
        };
        let to = from
            .saturating_add_signed(offset)
            .min(visible.len().saturating_sub(1));
        let step: isize = if to > from { 1 } else { -1 };
        let mut at = from;
        while at != to {
            let next = at.saturating_add_signed(step);
            let (left, right) = (visible[at], visible[next]);
            let (Some(a), Some(b)) = (
                order.iter().position(|id| *id == left),
                order.iter().position(|id| *id == right),
            ) else {
                break;
            };
            order.swap(a, b);
            at = next;
        }
        self.reorder_columns(order)
    }

    // --- rows ----------------------------------------------------------

    /// Create one row with generated values; it is appended once storage
    /// returns it.
    pub fn insert_row(&mut self) -> Result<(), GridError> {
        let table = self.model.store.table().ok_or(GridError::NoActiveTable)?;
        let table_id = table.id;
        let saved_columns = table
            .columns
            .iter()
            .filter(|column| !column.id.is_temporary())
            .cloned()
            .collect::<Vec<_>>();
        let data = self.faker.record(&saved_columns);
        self.issue(
            Request::CreateRow { table_id, data },
            |_| {},
            move |mutation| {
                mutation
                    .on_confirm(move |model, response| {
                        if model.active != Some(table_id) {
                            return;
                        }
                        if let Response::Row(row) = response {
                            model.store.append_row(row, &model.buffer);
                            model.set_status("row added");
                        }
                    })
                    .on_compensate(|model, error| model.fail("adding row", error))
            },
        );
        Ok(())
    }

    /// Delete the focused row.
    pub fn delete_row(&mut self) -> Result<(), GridError> {
        let row = self.cursor.row;
        self.delete_rows(row..row + 1).map(|_| ())
    }

    /// Hide a range of loaded rows at once and delete them in storage.
    /// Failure restores them in place and refetches.
    pub fn delete_rows(&mut self, range: Range<usize>) -> Result<usize, GridError> {
        self.commit_edit();
        let hidden = range
            .filter_map(|index| {
                self.model
                    .store
                    .row(index)
                    .map(|row| (index, row.clone()))
            })
            .collect::<Vec<(usize, GridRow)>>();
        if hidden.is_empty() {
            return Err(GridError::NoSelection);
        }
        let row_ids = hidden.iter().map(|(_, row)| row.id).collect::<Vec<_>>();
        let count = row_ids.len();
        info!(count, "deleting rows");
        let request = match row_ids.as_slice() {
            [row_id] => Request::DeleteRow { row_id: *row_id },
            _ => Request::BulkDeleteRows {
                row_ids: row_ids.clone(),
            },
        };
        let confirmed = row_ids.clone();
        self.issue(
            request,
            move |model| {
                for row_id in row_ids {
                    model.store.hide_row(row_id);
                }
            },
            move |mutation| {
                mutation
                    .on_confirm(move |model, _| model.store.forget_deleted(&confirmed))
                    .on_compensate(move |model, error| {
                        for (position, row) in hidden {
                            model.store.restore_row(position, row);
                        }
                        model.fail("deleting rows", error);
                        model.followups.push(Followup::ReloadRows);
                    })
            },
        );
        Ok(count)
    }

    // --- search, filter, sort ------------------------------------------

    pub fn set_search(&mut self, search: Option<&str>) {
        let search = search
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_owned);
        if self.model.query.search == search {
            return;
        }
        self.model.query.search = search;
        self.requery();
    }

    /// Filters and sorts below are saved into the active view as well.
    pub fn add_filter(&mut self, filter: Filter) -> Result<(), GridError> {
        self.require_column(&filter.column)?;
        self.model.query.filters.push(filter);
        self.requery();
        self.save_view();
        Ok(())
    }

    pub fn clear_filters(&mut self) {
        if self.model.query.filters.is_empty() {
            return;
        }
        self.model.query.filters.clear();
        self.requery();
        self.save_view();
    }

    /// Add a sort key after the existing ones. Sorting again on a column
    /// replaces its earlier key.
    pub fn add_sort(&mut self, column: &str, direction: SortDirection) -> Result<(), GridError> {
        self.require_column(column)?;
        self.model.query.sorts.retain(|sort| sort.column != column);
        self.model.query.sorts.push(Sort {
            column: column.to_owned(),
            direction,
        });
        self.requery();
        self.save_view();
        Ok(())
    }

    pub fn clear_sorts(&mut self) {
        if self.model.query.sorts.is_empty() {
            return;
        }
        self.model.query.sorts.clear();
        self.requery();
        self.save_view();
    }

    // --- views ---------------------------------------------------------

    pub fn select_view(&mut self, view_id: ViewId) -> Result<(), GridError> {
        let view = self.known_view(view_id)?.clone();
        if self.model.active_view == Some(view_id) {
            return Ok(());
        }
        info!(view = %view.name, "selecting view");
        self.apply_view(Some(view));
        Ok(())
    }

    /// Save the current filters, sorts and hidden columns as a new view,
    /// which becomes active once stored.
    pub fn create_view(&mut self, name: &str) -> Result<(), GridError> {
        let table_id = self.model.active.ok_or(GridError::NoActiveTable)?;
        let name = validate_view_name(name)?;
        info!(view = %name, "creating view");
        let config = self.current_config();
        self.issue(
            Request::CreateView {
                table_id,
                name,
                config,
            },
            |_| {},
            move |mutation| {
                mutation
                    .on_confirm(move |model, response| {
                        if model.active != Some(table_id) {
                            return;
                        }
                        if let Response::View(view) = response {
                            model.set_status(format!("saved view {}", view.name));
                            model.active_view = Some(view.id);
                            model.views.push(view);
                        }
                    })
                    .on_compensate(|model, error| model.fail("creating view", error))
            },
        );
        Ok(())
    }

    pub fn rename_view(&mut self, view_id: ViewId, name: &str) -> Result<(), GridError> {
        let name = validate_view_name(name)?;
        let previous = self.known_view(view_id)?.name.clone();
        if previous == name {
            return Ok(());
        }
        info!(from = %previous, to = %name, "renaming view");
        let local = name.clone();
        self.issue(
            Request::UpdateView {
                view_id,
                patch: ViewPatch::rename(name),
            },
            move |model| {
                if let Some(view) = model.view_mut(view_id) {
                    view.name = local;
                }
            },
            move |mutation| {
                mutation.on_compensate(move |model, error| {
                    if let Some(view) = model.view_mut(view_id) {
                        view.name = previous;
                    }
                    model.fail("renaming view", error);
                })
            },
        );
        Ok(())
    }

    /// Copy a view under `name`, or "<name> copy", and switch to the copy.
    pub fn duplicate_view(&mut self, view_id: ViewId, name: Option<&str>) -> Result<(), GridError> {
        let source = self.known_view(view_id)?;
        let name = match name {
            Some(raw) => validate_view_name(raw)?,
            None => validate_view_name(&format!("{} copy", source.name))?,
        };
        let table_id = source.table_id;
        info!(view = %name, "duplicating view");
        self.issue(
            Request::DuplicateView { view_id, name },
            |_| {},
            move |mutation| {
                mutation
                    .on_confirm(move |model, response| {
                        if model.active != Some(table_id) {
                            return;
                        }
                        if let Response::View(copy) = response {
                            model.set_status(format!("saved view {}", copy.name));
                            model.followups.push(Followup::ApplyView(Some(copy)));
                        }
                    })
                    .on_compensate(|model, error| model.fail("duplicating view", error))
            },
        );
        Ok(())
    }

    /// Delete a view. A table keeps at least one view; deleting the active
    /// view switches to the first remaining one.
    pub fn delete_view(&mut self, view_id: ViewId) -> Result<(), GridError> {
        self.known_view(view_id)?;
        if self.model.views.len() <= 1 {
            return Err(GridError::LastView);
        }
        let Some(position) = self.model.views.iter().position(|view| view.id == view_id) else {
            return Err(GridError::UnknownView { id: view_id.get() });
        };
        let removed = self.model.views[position].clone();
        info!(view = %removed.name, "deleting view");
        let was_active = self.model.active_view == Some(view_id);
        self.issue(
            Request::DeleteView { view_id },
            move |model| {
                model.views.retain(|view| view.id != view_id);
            },
            move |mutation| {
                mutation.on_compensate(move |model, error| {
                    if model.active == Some(removed.table_id) {
                        let position = position.min(model.views.len());
                        model.views.insert(position, removed);
                    }
                    model.fail("deleting view", error);
                })
            },
        );
        if was_active {
            let next = self.model.views.first().cloned();
            self.apply_view(next);
        }
        Ok(())
    }

    /// Refetch the loaded rows of the active table.
    pub fn refresh(&mut self) {
        self.reload_rows();
    }

    // --- bulk ----------------------------------------------------------

    /// Insert `count` generated rows in sequential batches.
    pub fn start_bulk(&mut self, count: usize, now: Instant) -> Result<(), GridError> {
        check_row_count(count)?;
        if self.bulk.is_some() {
            return Err(GridError::BulkRunning);
        }
        let table_id = self.model.active.ok_or(GridError::NoActiveTable)?;
        let token = CancellationToken::new();
        let insertion = BulkInsertion::new(count, self.settings.bulk, token, now);
        self.bulk = Some(BulkRun {
            table_id,
            insertion,
        });
        self.tick(now);
        Ok(())
    }

    /// Stop a bulk run at the next batch boundary.
    pub fn cancel_bulk(&mut self) -> bool {
        match &self.bulk {
            Some(run) => {
                run.insertion.token().cancel();
                true
            }
            None => false,
        }
    }

    pub fn bulk_progress(&self) -> BulkProgress {
        self.bulk
            .as_ref()
            .map_or(BulkProgress::IDLE, |run| run.insertion.progress())
    }

    pub fn is_bulk_running(&self) -> bool {
        self.bulk.is_some()
    }

    /// Advance time-driven work: throttled bulk batches.
    pub fn tick(&mut self, now: Instant) {
        let Some(run) = &mut self.bulk else {
            return;
        };
        let table_id = run.table_id;
        match run.insertion.next_step(now) {
            BulkStep::Issue(size) => self.issue_bulk_batch(table_id, size),
            BulkStep::Busy | BulkStep::Wait(_) => {}
            BulkStep::Finished(outcome) => {
                self.bulk = None;
                self.finish_bulk(table_id, outcome);
            }
        }
    }

    /// Ask storage to generate rows itself, in one call.
    pub fn generate_rows(&mut self, count: usize) -> Result<(), GridError> {
        check_row_count(count)?;
        let table_id = self.model.active.ok_or(GridError::NoActiveTable)?;
        info!(%table_id, count, "generating rows");
        self.issue(
            Request::GenerateFakeRows { table_id, count },
            |_| {},
            |mutation| {
                mutation
                    .on_confirm(|model, response| {
                        if let Response::Generated(generated) = response {
                            model.set_status(format!(
                                "generated {} rows",
                                values::comma_format_count(generated)
                            ));
                        }
                        model.followups.push(Followup::ReloadRows);
                        model.followups.push(Followup::ReloadTables);
                    })
                    .on_compensate(|model, error| model.fail("generating rows", error))
            },
        );
        Ok(())
    }

    // --- internals -----------------------------------------------------

    fn issue(
        &mut self,
        request: Request,
        apply: impl FnOnce(&mut GridModel),
        configure: impl FnOnce(Optimistic<GridModel, Response>) -> Optimistic<GridModel, Response>,
    ) -> Ticket {
        let mutation = configure(Optimistic::new(request.label()));
        let ticket = self.ledger.begin(&mut self.model, apply, mutation);
        self.outbox.push(Outgoing { ticket, request });
        ticket
    }

    fn persist_cell(&mut self, key: CellKey, seq: EditSeq, value: CellValue) {
        let mut data = RowData::new();
        data.insert(key.column.clone(), values::to_wire(&value));
        let request = Request::UpdateRow {
            row_id: key.row_id,
            data,
        };
        let patch_key = key.clone();
        let reject_key = key.clone();
        let patched = value.clone();
        self.issue(
            request,
            move |model| {
                model
                    .store
                    .patch_cell(patch_key.row_id, &patch_key.column, patched);
            },
            move |mutation| {
                mutation
                    .on_confirm(move |model, _| {
                        if let Confirmation::Cleared(current) =
                            model.buffer.confirm(&key, seq, &value)
                        {
                            model.store.clear_error(&current);
                        }
                    })
                    .on_compensate(move |model, error| {
                        let rejection = model.buffer.reject(&reject_key, seq);
                        if let Rejection::Revert { key, value } = rejection {
                            if model.store.position(key.row_id).is_some() {
                                model.store.patch_cell(key.row_id, &key.column, value);
                                model.store.mark_error(key);
                            }
                            model.fail("saving cell", error);
                        }
                    })
            },
        );
    }

    fn request_tables(&mut self) {
        let base_id = self.model.base_id;
        self.issue(
            Request::ListTables { base_id },
            |_| {},
            |mutation| {
                mutation
                    .on_confirm(|model, response| {
                        if let Response::Tables(tables) = response {
                            model.apply_tables(tables);
                        }
                    })
                    .on_compensate(|model, error| model.fail("loading tables", error))
            },
        );
    }

    fn request_create_table(&mut self, name: String) {
        info!(table = %name, "creating table");
        let base_id = self.model.base_id;
        self.issue(
            Request::CreateTable { base_id, name },
            |_| {},
            |mutation| {
                mutation
                    .on_confirm(|model, response| {
                        if let Response::Table(table) = response {
                            model.set_status(format!("created {}", table.name));
                            model.followups.push(Followup::Activate(table.id));
                            model.tables.push(table);
                        }
                    })
                    .on_compensate(|model, error| model.fail("creating table", error))
            },
        );
    }

    fn run_followups(&mut self, now: Instant) {
        let mut reloaded = false;
        while !self.model.followups.is_empty() {
            for followup in std::mem::take(&mut self.model.followups) {
                match followup {
                    Followup::ReloadRows if !reloaded => {
                        reloaded = true;
                        self.reload_rows();
                    }
                    Followup::ReloadRows => {}
                    Followup::ReloadTables => self.request_tables(),
                    Followup::Activate(table_id) => self.activate(table_id),
                    Followup::CreateDefaultTable => {
                        self.request_create_table(default_table_name(0));
                    }
                    Followup::BulkBatch(result) => self.bulk_batch_settled(result, now),
                    Followup::ApplyView(view) => {
                        reloaded = true;
                        self.apply_view(view);
                    }
                }
            }
        }
    }

    fn switch_to(&mut self, table_id: TableId) {
        if self.model.active == Some(table_id) {
            return;
        }
        self.flush_pending();
        self.activate(table_id);
    }

    fn rotate_table(&mut self, delta: isize) {
        let len = self.model.tables.len() as isize;
        if len == 0 {
            return;
        }
        let current = self
            .model
            .active
            .and_then(|id| self.model.tables.iter().position(|table| table.id == id))
            .unwrap_or(0) as isize;
        let next = (current + delta).rem_euclid(len) as usize;
        let table_id = self.model.tables[next].id;
        self.switch_to(table_id);
    }

    fn activate(&mut self, table_id: TableId) {
        let Some(table) = self
            .model
            .tables
            .iter()
            .find(|table| table.id == table_id)
            .cloned()
        else {
            return;
        };
        info!(table = %table.name, "activating table");
        self.editing = None;
        self.model.active = Some(table_id);
        self.model.store.load_table(table);
        self.model.loader.reset();
        self.model.query = RowQuery::default();
        self.model.views.clear();
        self.model.active_view = None;
        self.cursor = CellCursor::default();
        self.viewport.reset();
        self.request_views(table_id);
    }

    /// Resolve the table's default view, then list every view. Rows load
    /// once the default view's query is known.
    fn request_views(&mut self, table_id: TableId) {
        self.issue(
            Request::DefaultView { table_id },
            |_| {},
            move |mutation| {
                mutation
                    .on_confirm(move |model, response| {
                        if model.active != Some(table_id) {
                            return;
                        }
                        let view = match response {
                            Response::View(view) => Some(view),
                            _ => None,
                        };
                        model.followups.push(Followup::ApplyView(view));
                    })
                    .on_compensate(move |model, error| {
                        if model.active != Some(table_id) {
                            return;
                        }
                        model.fail("loading views", error);
                        model.followups.push(Followup::ApplyView(None));
                    })
            },
        );
        self.issue(
            Request::ListViews { table_id },
            |_| {},
            move |mutation| {
                mutation
                    .on_confirm(move |model, response| {
                        if model.active != Some(table_id) {
                            return;
                        }
                        if let Response::Views(views) = response {
                            model.views = views;
                        }
                    })
                    .on_compensate(|model, error| model.fail("loading views", error))
            },
        );
    }

    /// Adopt a view's query and hidden columns and refetch from the top.
    fn apply_view(&mut self, view: Option<View>) {
        self.commit_edit();
        match view {
            Some(view) => {
                debug!(view = %view.name, "applying view");
                self.model.active_view = Some(view.id);
                self.model.query.filters = view.config.filters.clone();
                self.model.query.sorts = view.config.sorts.clone();
                self.model.store.set_hidden(&view.config.hidden_columns);
                match self.model.view_mut(view.id) {
                    Some(existing) => *existing = view,
                    None => self.model.views.push(view),
                }
            }
            None => {
                self.model.active_view = None;
                self.model.query.filters.clear();
                self.model.query.sorts.clear();
                self.model.store.set_hidden(&[]);
            }
        }
        self.requery();
    }

    fn current_config(&self) -> ViewConfig {
        ViewConfig {
            filters: self.model.query.filters.clone(),
            sorts: self.model.query.sorts.clone(),
            hidden_columns: self.model.store.hidden_columns(),
        }
    }

    /// Persist the current filters, sorts and hidden columns into the
    /// active view.
    fn save_view(&mut self) {
        let Some(view_id) = self.model.active_view else {
            return;
        };
        let Some(previous) = self
            .model
            .views
            .iter()
            .find(|view| view.id == view_id)
            .map(|view| view.config.clone())
        else {
            return;
        };
        let config = self.current_config();
        if config == previous {
            return;
        }
        let patch = ViewPatch::config(&config);
        self.issue(
            Request::UpdateView { view_id, patch },
            move |model| {
                if let Some(view) = model.view_mut(view_id) {
                    view.config = config;
                }
            },
            move |mutation| {
                mutation.on_compensate(move |model, error| {
                    if let Some(view) = model.view_mut(view_id) {
                        view.config = previous;
                    }
                    model.fail("saving view", error);
                })
            },
        );
    }

    fn requery(&mut self) {
        self.commit_edit();
        self.model.loader.reset();
        self.cursor = CellCursor::default();
        self.viewport.reset();
        self.reload_rows();
    }

    /// Refetch everything loaded so far, from offset 0, in chunks of at most
    /// [`MAX_PAGE_SIZE`]. The mirror is swapped once every chunk has arrived,
    /// so the loaded count and the cursor survive a refresh. Responses from
    /// older fetches are dropped by generation.
    fn reload_rows(&mut self) {
        let Some(table_id) = self.model.active else {
            return;
        };
        self.model.generation += 1;
        let generation = self.model.generation;
        let span = self.model.loader.loaded().max(self.settings.page_size);
        let offsets = (0..span).step_by(MAX_PAGE_SIZE).collect::<Vec<_>>();
        debug!(span, chunks = offsets.len(), "reloading rows");
        self.model.reload = Some(PendingReload {
            generation,
            chunks: vec![None; offsets.len()],
        });
        self.model.loader.begin_fetch();
        for (index, offset) in offsets.into_iter().enumerate() {
            let request = Request::GetRowsPage {
                table_id,
                limit: (span - offset).min(MAX_PAGE_SIZE),
                offset,
                query: self.model.query.clone(),
            };
            self.issue(request, |_| {}, move |mutation| {
                mutation
                    .on_confirm(move |model, response| {
                        if model.generation != generation {
                            return;
                        }
                        if let Response::Page(page) = response {
                            model.reload_chunk_arrived(generation, index, page);
                        }
                    })
                    .on_compensate(move |model, error| {
                        model.reload_failed(generation);
                        model.fail("loading rows", error);
                    })
            });
        }
    }

    fn fetch_more(&mut self, last_rendered: usize) {
        let Some(table_id) = self.model.active else {
            return;
        };
        let Some(offset) = self.model.loader.next_fetch(last_rendered) else {
            return;
        };
        debug!(offset, "fetching next page");
        let generation = self.model.generation;
        let request = Request::GetRowsPage {
            table_id,
            limit: self.settings.page_size,
            offset,
            query: self.model.query.clone(),
        };
        self.issue(request, |_| {}, move |mutation| {
            mutation
                .on_confirm(move |model, response| {
                    if model.generation != generation {
                        return;
                    }
                    if let Response::Page(page) = response {
                        let received = page.rows.len();
                        let has_more = page.has_more;
                        model.store.append_page(page, &model.buffer);
                        model.loader.page_loaded(received, has_more, false);
                    }
                })
                .on_compensate(move |model, error| {
                    if model.generation == generation {
                        model.loader.fetch_failed();
                    }
                    model.fail("loading rows", error);
                })
        });
    }

    fn issue_bulk_batch(&mut self, table_id: TableId, size: usize) {
        let columns = self
            .model
            .tables
            .iter()
            .find(|table| table.id == table_id)
            .map(|table| {
                table
                    .columns
                    .iter()
                    .filter(|column| !column.id.is_temporary())
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let records = (0..size)
            .map(|_| self.faker.record(&columns))
            .collect::<Vec<_>>();
        self.issue(
            Request::BulkCreateRows { table_id, records },
            |_| {},
            |mutation| {
                mutation
                    .on_confirm(|model, response| {
                        let created = match response {
                            Response::Created(created) => created,
                            _ => 0,
                        };
                        model.followups.push(Followup::BulkBatch(Ok(created)));
                    })
                    .on_compensate(|model, error| {
                        let message = format!("{error:#}");
                        model.followups.push(Followup::BulkBatch(Err(message)));
                    })
            },
        );
    }

    fn bulk_batch_settled(&mut self, result: Result<usize, String>, now: Instant) {
        let Some(run) = &mut self.bulk else {
            return;
        };
        let table_id = run.table_id;
        let refresh = match result {
            Ok(_) => run.insertion.batch_succeeded(now),
            Err(error) => {
                run.insertion.batch_failed(error);
                false
            }
        };
        if refresh && self.model.active == Some(table_id) {
            self.reload_rows();
        }
        self.tick(now);
    }

    fn finish_bulk(&mut self, table_id: TableId, outcome: BulkOutcome) {
        let inserted = values::comma_format_count(outcome.inserted());
        let message = match &outcome {
            BulkOutcome::Completed { .. } => format!("inserted {inserted} rows"),
            BulkOutcome::Cancelled { .. } => format!("bulk insert cancelled after {inserted} rows"),
            BulkOutcome::Failed { error, .. } => {
                format!("bulk insert failed after {inserted} rows: {error}")
            }
        };
        self.model.set_status(message);
        if self.model.active == Some(table_id) {
            self.reload_rows();
        }
        self.request_tables();
    }

    fn select(&mut self, target: CellCursor) {
        self.cursor = target;
        self.viewport.scroll_to_reveal(target.row);
    }

    fn jump(&mut self, delta: isize) {
        let next = self
            .cursor
            .jump(delta, self.row_count(), self.column_count());
        self.select(next);
    }

    fn page_rows(&self) -> usize {
        self.viewport.height().max(1)
    }

    fn commit_and_move(&mut self, direction: Move) {
        self.commit_edit();
        self.move_cursor(direction);
    }

    fn push_draft(&mut self, ch: char) {
        if let Some(session) = &mut self.editing {
            session.draft.push(ch);
        }
    }

    fn require_column(&self, name: &str) -> Result<(), GridError> {
        if self.model.store.table().is_none() {
            return Err(GridError::NoActiveTable);
        }
        if self.model.store.column(name).is_none() {
            return Err(GridError::UnknownColumn {
                name: name.to_owned(),
            });
        }
        Ok(())
    }

    fn known_view(&self, view_id: ViewId) -> Result<&View, GridError> {
        self.model
            .views
            .iter()
            .find(|view| view.id == view_id)
            .ok_or(GridError::UnknownView { id: view_id.get() })
    }

    // Columns still waiting for their create call cannot be changed yet.
    fn saved_column(&self, name: &str) -> Result<Column, GridError> {
        let table = self.model.store.table().ok_or(GridError::NoActiveTable)?;
        let column = table
            .column(name)
            .ok_or_else(|| GridError::UnknownColumn {
                name: name.to_owned(),
            })?;
        if column.id.is_temporary() {
            return Err(GridError::ColumnPending {
                name: column.name.clone(),
            });
        }
        Ok(column.clone())
    }
}

fn check_row_count(count: usize) -> Result<(), GridError> {
    if (1..=MAX_GENERATED_ROWS).contains(&count) {
        return Ok(());
    }
    Err(GridError::RowCountOutOfRange {
        count,
        max: MAX_GENERATED_ROWS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DEFAULT_VIEW_NAME, FilterOperator, Row, RowPage};
    use anyhow::{Result, anyhow};

    const ROWS: i64 = 120;

    fn table(id: i64, name: &str) -> Table {
        let column = |column_id: i64, name: &str, column_type| Column {
            id: ColumnId::new(column_id),
            table_id: TableId::new(id),
            name: name.to_owned(),
            column_type,
            order: column_id - 1,
        };
        Table {
            id: TableId::new(id),
            base_id: BaseId::new(1),
            name: name.to_owned(),
            columns: vec![
                column(1, "Name", ColumnType::Text),
                column(2, "Status", ColumnType::Text),
                column(3, "Priority", ColumnType::Number),
            ],
            row_count: ROWS as usize,
        }
    }

    fn row(id: i64) -> Row {
        let mut data = RowData::new();
        data.insert("Name".to_owned(), format!("Person {id}"));
        data.insert("Status".to_owned(), "Todo".to_owned());
        data.insert("Priority".to_owned(), (id % 5 + 1).to_string());
        Row {
            id: RowId::new(id),
            table_id: TableId::new(1),
            order: id - 1,
            data,
        }
    }

    fn answer(request: &Request) -> Result<Response> {
        match request {
            Request::ListTables { .. } => Ok(Response::Tables(vec![
                table(1, "Table 1"),
                table(2, "Table 2"),
            ])),
            Request::GetRowsPage { limit, offset, .. } => {
                let rows = (1..=ROWS)
                    .skip(*offset)
                    .take(*limit)
                    .map(row)
                    .collect::<Vec<_>>();
                let has_more = offset + rows.len() < ROWS as usize;
                Ok(Response::Page(RowPage {
                    rows,
                    total: ROWS as usize,
                    has_more,
                }))
            }
            Request::UpdateRow { row_id, .. } => Ok(Response::Row(row(row_id.get()))),
            Request::CreateColumn {
                table_id,
                name,
                column_type,
            } => Ok(Response::Column(Column {
                id: ColumnId::new(99),
                table_id: *table_id,
                name: name.clone(),
                column_type: *column_type,
                order: 3,
            })),
            Request::BulkCreateRows { records, .. } => Ok(Response::Created(records.len())),
            _ => Ok(Response::Done),
        }
    }

    fn view(id: i64, name: &str, config: ViewConfig) -> View {
        View {
            id: ViewId::new(id),
            table_id: TableId::new(1),
            name: name.to_owned(),
            config,
        }
    }

    fn default_config() -> ViewConfig {
        ViewConfig {
            filters: Vec::new(),
            sorts: vec![Sort {
                column: "Priority".to_owned(),
                direction: SortDirection::Desc,
            }],
            hidden_columns: vec!["Status".to_owned()],
        }
    }

    fn hot_config() -> ViewConfig {
        ViewConfig {
            filters: vec![Filter {
                column: "Status".to_owned(),
                operator: FilterOperator::Equals,
                value: "Hot".to_owned(),
            }],
            ..ViewConfig::default()
        }
    }

    // Same as `answer`, for a table that already has two saved views.
    fn answer_with_views(request: &Request) -> Result<Response> {
        match request {
            Request::DefaultView { .. } => {
                Ok(Response::View(view(1, DEFAULT_VIEW_NAME, default_config())))
            }
            Request::ListViews { .. } => Ok(Response::Views(vec![
                view(1, DEFAULT_VIEW_NAME, default_config()),
                view(2, "Hot", hot_config()),
            ])),
            Request::UpdateView { view_id, patch } => {
                let mut updated = view(view_id.get(), "updated", ViewConfig::default());
                patch.apply(&mut updated);
                Ok(Response::View(updated))
            }
            _ => answer(request),
        }
    }

    fn pump(controller: &mut GridController) {
        pump_with(controller, answer);
    }

    fn pump_with(controller: &mut GridController, answer: fn(&Request) -> Result<Response>) {
        let now = Instant::now();
        loop {
            let batch = controller.take_requests();
            if batch.is_empty() {
                break;
            }
            for outgoing in batch {
                let result = answer(&outgoing.request);
                controller.complete(
                    Completion {
                        ticket: outgoing.ticket,
                        result,
                    },
                    now,
                );
            }
        }
    }

    fn settings() -> GridSettings {
        GridSettings {
            seed: Some(7),
            bulk: BulkConfig {
                batch_delay: std::time::Duration::ZERO,
                ..BulkConfig::default()
            },
            ..GridSettings::default()
        }
    }

    fn loaded() -> GridController {
        let mut controller = GridController::new(BaseId::new(1), settings());
        controller.start();
        pump(&mut controller);
        controller
    }

    fn fail(controller: &mut GridController, outgoing: Outgoing) {
        controller.complete(
            Completion {
                ticket: outgoing.ticket,
                result: Err(anyhow!("storage offline")),
            },
            Instant::now(),
        );
    }

    #[test]
    fn start_activates_first_table_and_loads_one_page() {
        let controller = loaded();
        assert_eq!(controller.active_table().map(|t| t.id), Some(TableId::new(1)));
        assert_eq!(controller.row_count(), 50);
        assert!(controller.loader().has_more());
        assert!(controller.is_idle());
    }

    #[test]
    fn empty_base_requests_default_table() {
        let mut controller = GridController::new(BaseId::new(1), settings());
        controller.start();
        let list = controller.take_requests().remove(0);
        controller.complete(
            Completion {
                ticket: list.ticket,
                result: Ok(Response::Tables(Vec::new())),
            },
            Instant::now(),
        );
        let requests = controller.take_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].request,
            Request::CreateTable {
                base_id: BaseId::new(1),
                name: "Table 1".to_owned(),
            }
        );
    }

    #[test]
    fn commit_patches_mirror_before_storage_answers() {
        let mut controller = loaded();
        controller.handle_key(GridKey::Enter);
        assert_eq!(
            controller.editing().map(|s| s.draft.clone()),
            Some("Person 1".to_owned())
        );
        controller.set_draft("Grace");
        controller.handle_key(GridKey::Enter);

        let row_id = RowId::new(1);
        assert_eq!(
            controller.store().value(row_id, "Name"),
            Some(&CellValue::Text("Grace".to_owned()))
        );
        assert_eq!(controller.cell_state(row_id, "Name"), CellState::Saving);
        assert_eq!(controller.cursor(), CellCursor::new(1, 0));

        pump(&mut controller);
        assert_eq!(controller.cell_state(row_id, "Name"), CellState::Clean);
        assert!(controller.buffer().is_empty());
    }

    #[test]
    fn failed_commit_restores_previous_value_and_flags_cell() {
        let mut controller = loaded();
        controller.handle_key(GridKey::F2);
        controller.set_draft("Grace");
        controller.handle_key(GridKey::Tab);
        let update = controller.take_requests().remove(0);
        fail(&mut controller, update);

        let row_id = RowId::new(1);
        assert_eq!(
            controller.store().value(row_id, "Name"),
            Some(&CellValue::Text("Person 1".to_owned()))
        );
        assert_eq!(controller.cell_state(row_id, "Name"), CellState::Error);
        assert!(controller.buffer().is_empty());
        assert!(controller.status().is_some_and(|s| s.contains("storage offline")));

        controller.click(0, 0);
        controller.handle_key(GridKey::Enter);
        controller.set_draft("Lin");
        controller.commit_edit();
        pump(&mut controller);
        assert_eq!(controller.cell_state(row_id, "Name"), CellState::Clean);
    }

    #[test]
    fn older_failure_does_not_clobber_newer_edit() {
        let mut controller = loaded();
        controller.begin_edit();
        controller.set_draft("first");
        controller.commit_edit();
        controller.begin_edit();
        controller.set_draft("second");
        controller.commit_edit();

        let mut requests = controller.take_requests();
        let second = requests.remove(1);
        let first = requests.remove(0);
        fail(&mut controller, first);

        let row_id = RowId::new(1);
        assert_eq!(
            controller.store().value(row_id, "Name"),
            Some(&CellValue::Text("second".to_owned()))
        );
        assert_eq!(controller.cell_state(row_id, "Name"), CellState::Saving);

        controller.complete(
            Completion {
                ticket: second.ticket,
                result: answer(&second.request),
            },
            Instant::now(),
        );
        assert_eq!(controller.cell_state(row_id, "Name"), CellState::Clean);
    }

    #[test]
    fn number_cells_parse_or_become_null() {
        let mut controller = loaded();
        controller.click(0, 2);
        controller.begin_edit();
        controller.set_draft("abc");
        controller.commit_edit();
        assert_eq!(
            controller.store().value(RowId::new(1), "Priority"),
            Some(&CellValue::Null)
        );

        controller.begin_edit();
        controller.set_draft("1,234.5");
        controller.commit_edit();
        assert_eq!(
            controller.store().value(RowId::new(1), "Priority"),
            Some(&CellValue::Number(1234.5))
        );
        assert_eq!(controller.display_value(0, 2), "1,234.5");
        let wire = controller.take_requests().pop().map(|o| o.request);
        let mut expected = RowData::new();
        expected.insert("Priority".to_owned(), "1234.5".to_owned());
        assert_eq!(
            wire,
            Some(Request::UpdateRow {
                row_id: RowId::new(1),
                data: expected,
            })
        );
    }

    #[test]
    fn escape_cancels_without_a_request() {
        let mut controller = loaded();
        controller.handle_key(GridKey::Space);
        controller.handle_key(GridKey::Char('x'));
        controller.handle_key(GridKey::Escape);
        assert!(controller.editing().is_none());
        assert!(controller.take_requests().is_empty());
    }

    #[test]
    fn unchanged_commit_is_not_sent() {
        let mut controller = loaded();
        controller.begin_edit();
        assert!(!controller.commit_edit());
        assert!(controller.take_requests().is_empty());
    }

    #[test]
    fn arrows_clamp_at_grid_edges() {
        let mut controller = loaded();
        controller.handle_key(GridKey::Up);
        controller.handle_key(GridKey::Left);
        assert_eq!(controller.cursor(), CellCursor::new(0, 0));
        for _ in 0..5 {
            controller.handle_key(GridKey::Right);
        }
        assert_eq!(controller.cursor(), CellCursor::new(0, 2));
    }

    #[test]
    fn click_selected_cell_enters_edit() {
        let mut controller = loaded();
        controller.click(3, 1);
        assert!(controller.editing().is_none());
        controller.click(3, 1);
        assert_eq!(
            controller.editing().map(|s| s.row_id),
            Some(RowId::new(4))
        );
        controller.double_click(5, 0);
        assert_eq!(controller.cursor(), CellCursor::new(5, 0));
        assert!(controller.editing().is_some());
    }

    #[test]
    fn scrolling_near_the_end_fetches_the_next_page() {
        let mut controller = loaded();
        controller.set_viewport_height(20);
        controller.sync_viewport();
        assert!(controller.take_requests().is_empty());

        controller.jump(45);
        controller.sync_viewport();
        let requests = controller.take_requests();
        assert!(matches!(
            requests.as_slice(),
            [Outgoing {
                request: Request::GetRowsPage { offset: 50, .. },
                ..
            }]
        ));
    }

    #[test]
    fn pages_from_an_older_query_are_dropped() {
        let mut controller = loaded();
        controller.set_viewport_height(20);
        controller.jump(45);
        controller.sync_viewport();
        let stale = controller.take_requests();
        controller.set_search(Some("Person 1"));
        let fresh = controller.take_requests();

        for outgoing in stale {
            controller.complete(
                Completion {
                    ticket: outgoing.ticket,
                    result: answer(&outgoing.request),
                },
                Instant::now(),
            );
        }
        assert_eq!(controller.row_count(), 50);
        for outgoing in fresh {
            let page = RowPage {
                rows: vec![row(1), row(10)],
                total: 2,
                has_more: false,
            };
            controller.complete(
                Completion {
                    ticket: outgoing.ticket,
                    result: Ok(Response::Page(page)),
                },
                Instant::now(),
            );
        }
        assert_eq!(controller.row_count(), 2);
    }

    #[test]
    fn last_table_cannot_be_deleted() {
        let mut controller = loaded();
        controller.delete_table(TableId::new(2)).ok();
        assert_eq!(
            controller.delete_table(TableId::new(1)),
            Err(GridError::LastTable)
        );
        pump(&mut controller);
        assert_eq!(controller.tables().len(), 1);
    }

    #[test]
    fn deleting_active_table_selects_first_remaining() -> Result<()> {
        let mut controller = loaded();
        controller.delete_table(TableId::new(1))?;
        pump(&mut controller);
        assert_eq!(controller.active_table().map(|t| t.id), Some(TableId::new(2)));
        Ok(())
    }

    #[test]
    fn create_column_rejects_case_insensitive_duplicates() {
        let mut controller = loaded();
        assert_eq!(
            controller.create_column("name", ColumnType::Text),
            Err(GridError::DuplicateColumn {
                name: "name".to_owned()
            })
        );
        assert_eq!(
            controller.create_column("   ", ColumnType::Text),
            Err(GridError::EmptyColumnName)
        );
        assert!(controller.take_requests().is_empty());
    }

    #[test]
    fn new_column_shows_defaults_and_is_pending_until_saved() -> Result<()> {
        let mut controller = loaded();
        controller.create_column("Score", ColumnType::Number)?;
        assert!(controller
            .store()
            .rows()
            .iter()
            .all(|row| row.value("Score") == Some(&CellValue::Null)));
        assert_eq!(
            controller.rename_column("Score", "Points"),
            Err(GridError::ColumnPending {
                name: "Score".to_owned()
            })
        );
        let create = controller.take_requests().remove(0);
        controller.complete(
            Completion {
                ticket: create.ticket,
                result: answer(&create.request),
            },
            Instant::now(),
        );
        assert_eq!(
            controller.store().column("Score").map(|c| c.id),
            Some(ColumnId::new(99))
        );
        assert_eq!(controller.take_requests().len(), 2);
        Ok(())
    }

    #[test]
    fn rename_column_leaves_no_old_key() -> Result<()> {
        let mut controller = loaded();
        controller.rename_column("Status", "Stage")?;
        assert!(controller.store().column("Status").is_none());
        for row in controller.store().rows() {
            assert!(!row.cells.contains_key("Status"));
            assert!(row.cells.contains_key("Stage"));
        }
        Ok(())
    }

    #[test]
    fn failed_rename_restores_the_old_name() -> Result<()> {
        let mut controller = loaded();
        controller.rename_column("Status", "Stage")?;
        let update = controller.take_requests().remove(0);
        fail(&mut controller, update);
        assert!(controller.store().column("Status").is_some());
        assert!(controller.store().column("Stage").is_none());
        let followups = controller.take_requests();
        assert_eq!(followups.len(), 2);
        Ok(())
    }

    #[test]
    fn filters_require_a_known_column() {
        let mut controller = loaded();
        let filter = Filter {
            column: "Missing".to_owned(),
            operator: FilterOperator::Equals,
            value: "x".to_owned(),
        };
        assert_eq!(
            controller.add_filter(filter),
            Err(GridError::UnknownColumn {
                name: "Missing".to_owned()
            })
        );
    }

    #[test]
    fn bulk_run_issues_sequential_batches() -> Result<()> {
        let mut controller = loaded();
        controller.start_bulk(2500, Instant::now())?;
        assert_eq!(controller.start_bulk(1, Instant::now()), Err(GridError::BulkRunning));

        let mut sizes = Vec::new();
        let mut progress = Vec::new();
        loop {
            let batch = controller.take_requests();
            if batch.is_empty() {
                break;
            }
            for outgoing in batch {
                if let Request::BulkCreateRows { records, .. } = &outgoing.request {
                    sizes.push(records.len());
                }
                let result = answer(&outgoing.request);
                controller.complete(
                    Completion {
                        ticket: outgoing.ticket,
                        result,
                    },
                    Instant::now(),
                );
                if controller.is_bulk_running() {
                    progress.push(controller.bulk_progress().current);
                }
            }
        }
        assert_eq!(sizes, vec![1000, 1000, 500]);
        assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(!controller.is_bulk_running());
        assert_eq!(controller.status(), Some("inserted 2,500 rows"));
        Ok(())
    }

    #[test]
    fn row_counts_are_bounded() {
        let mut controller = loaded();
        assert_eq!(
            controller.start_bulk(0, Instant::now()),
            Err(GridError::RowCountOutOfRange {
                count: 0,
                max: MAX_GENERATED_ROWS
            })
        );
        assert!(controller.generate_rows(100_001).is_err());
        assert!(controller.generate_rows(100_000).is_ok());
    }

    #[test]
    fn failed_delete_restores_rows() -> Result<()> {
        let mut controller = loaded();
        assert_eq!(controller.delete_rows(0..3)?, 3);
        assert_eq!(controller.row_count(), 47);
        let delete = controller.take_requests().remove(0);
        assert!(matches!(
            delete.request,
            Request::BulkDeleteRows { ref row_ids } if row_ids.len() == 3
        ));
        fail(&mut controller, delete);
        assert_eq!(controller.store().position(RowId::new(1)), Some(0));
        assert_eq!(controller.store().position(RowId::new(3)), Some(2));
        Ok(())
    }

    #[test]
    fn confirmed_delete_stops_tracking_rows() -> Result<()> {
        let mut controller = loaded();
        controller.delete_rows(0..2)?;
        assert!(controller.store().is_deleted(RowId::new(1)));
        let delete = controller.take_requests().remove(0);
        controller.complete(
            Completion {
                ticket: delete.ticket,
                result: answer(&delete.request),
            },
            Instant::now(),
        );
        assert!(!controller.store().is_deleted(RowId::new(1)));
        assert!(!controller.store().is_deleted(RowId::new(2)));
        Ok(())
    }

    #[test]
    fn refresh_refetches_every_loaded_row_in_chunks() {
        let mut controller = loaded();
        controller.model.loader.page_loaded(2300, true, true);
        controller.cursor = CellCursor::new(40, 1);
        controller.refresh();

        let requests = controller.take_requests();
        let spans = requests
            .iter()
            .filter_map(|outgoing| match &outgoing.request {
                Request::GetRowsPage { offset, limit, .. } => Some((*offset, *limit)),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(spans, vec![(0, 1000), (1000, 1000), (2000, 300)]);

        // Chunks may settle in any order; the mirror swaps on the last one.
        for outgoing in requests.into_iter().rev() {
            assert_eq!(controller.row_count(), 50);
            let Request::GetRowsPage { offset, limit, .. } = outgoing.request else {
                continue;
            };
            let page = RowPage {
                rows: (offset..offset + limit).map(|i| row(i as i64 + 1)).collect(),
                total: 2500,
                has_more: true,
            };
            controller.complete(
                Completion {
                    ticket: outgoing.ticket,
                    result: Ok(Response::Page(page)),
                },
                Instant::now(),
            );
        }
        assert_eq!(controller.row_count(), 2300);
        assert_eq!(controller.loader().loaded(), 2300);
        assert!(controller.loader().has_more());
        assert_eq!(controller.cursor(), CellCursor::new(40, 1));
    }

    #[test]
    fn failed_refresh_keeps_the_loaded_rows() {
        let mut controller = loaded();
        controller.refresh();
        let fetch = controller.take_requests().remove(0);
        fail(&mut controller, fetch);
        assert_eq!(controller.row_count(), 50);
        assert!(!controller.loader().in_flight());
        assert!(controller.status().is_some_and(|s| s.starts_with("loading rows failed")));
    }

    #[test]
    fn second_delete_of_a_table_reports_it_in_progress() -> Result<()> {
        let mut controller = loaded();
        controller.delete_table(TableId::new(2))?;
        assert_eq!(
            controller.delete_table(TableId::new(2)),
            Err(GridError::TableBeingDeleted { id: 2 })
        );
        assert_eq!(controller.take_requests().len(), 1);
        Ok(())
    }

    #[test]
    fn unchanged_value_is_resent_to_clear_an_error() {
        let mut controller = loaded();
        controller.begin_edit();
        controller.set_draft("Grace");
        controller.commit_edit();
        let update = controller.take_requests().remove(0);
        fail(&mut controller, update);
        let row_id = RowId::new(1);
        assert_eq!(controller.cell_state(row_id, "Name"), CellState::Error);

        controller.begin_edit();
        assert_eq!(
            controller.editing().map(|s| s.draft.clone()),
            Some("Person 1".to_owned())
        );
        assert!(controller.commit_edit());
        pump(&mut controller);
        assert_eq!(controller.cell_state(row_id, "Name"), CellState::Clean);
    }

    #[test]
    fn activation_applies_the_default_view() {
        let mut controller = GridController::new(BaseId::new(1), settings());
        controller.start();
        pump_with(&mut controller, answer_with_views);

        assert_eq!(
            controller.active_view().map(|v| v.name.as_str()),
            Some(DEFAULT_VIEW_NAME)
        );
        assert_eq!(controller.views().len(), 2);
        assert_eq!(controller.query().sorts, default_config().sorts);
        assert_eq!(controller.column_count(), 2);
        assert_eq!(
            controller.store().column_at(1).map(|c| c.name.as_str()),
            Some("Priority")
        );
        assert_eq!(controller.row_count(), 50);
    }

    #[test]
    fn sorting_saves_into_the_active_view() -> Result<()> {
        let mut controller = GridController::new(BaseId::new(1), settings());
        controller.start();
        pump_with(&mut controller, answer_with_views);

        controller.add_sort("Name", SortDirection::Asc)?;
        let saved = controller
            .take_requests()
            .into_iter()
            .find_map(|outgoing| match outgoing.request {
                Request::UpdateView { view_id, patch } => Some((view_id, patch)),
                _ => None,
            });
        let Some((view_id, patch)) = saved else {
            return Err(anyhow!("no view update was sent"));
        };
        assert_eq!(view_id, ViewId::new(1));
        assert_eq!(patch.sorts.map(|sorts| sorts.len()), Some(2));
        assert_eq!(patch.hidden_columns, Some(vec!["Status".to_owned()]));
        assert_eq!(
            controller.active_view().map(|v| v.config.sorts.len()),
            Some(2)
        );

        // Search text stays out of views.
        controller.set_search(Some("Person"));
        assert!(!controller
            .take_requests()
            .iter()
            .any(|outgoing| matches!(outgoing.request, Request::UpdateView { .. })));
        Ok(())
    }

    #[test]
    fn selecting_a_view_switches_the_query() -> Result<()> {
        let mut controller = GridController::new(BaseId::new(1), settings());
        controller.start();
        pump_with(&mut controller, answer_with_views);

        controller.select_view(ViewId::new(2))?;
        assert_eq!(controller.query().filters, hot_config().filters);
        assert!(controller.query().sorts.is_empty());
        assert_eq!(controller.column_count(), 3);
        assert_eq!(
            controller.select_view(ViewId::new(9)),
            Err(GridError::UnknownView { id: 9 })
        );
        Ok(())
    }

    #[test]
    fn deleting_the_active_view_falls_back_to_the_first() -> Result<()> {
        let mut controller = GridController::new(BaseId::new(1), settings());
        controller.start();
        pump_with(&mut controller, answer_with_views);

        controller.select_view(ViewId::new(2))?;
        controller.delete_view(ViewId::new(2))?;
        assert_eq!(controller.active_view().map(|v| v.id), Some(ViewId::new(1)));
        assert_eq!(controller.views().len(), 1);
        assert_eq!(controller.delete_view(ViewId::new(1)), Err(GridError::LastView));
        Ok(())
    }

    #[test]
    fn failed_view_delete_restores_it() -> Result<()> {
        let mut controller = GridController::new(BaseId::new(1), settings());
        controller.start();
        pump_with(&mut controller, answer_with_views);

        controller.delete_view(ViewId::new(2))?;
        let delete = controller
            .take_requests()
            .into_iter()
            .find(|outgoing| matches!(outgoing.request, Request::DeleteView { .. }));
        let Some(delete) = delete else {
            return Err(anyhow!("no view delete was sent"));
        };
        fail(&mut controller, delete);
        let names = controller
            .views()
            .iter()
            .map(|view| view.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec![DEFAULT_VIEW_NAME, "Hot"]);
        Ok(())
    }

    #[test]
    fn view_names_are_checked_before_sending() {
        let mut controller = GridController::new(BaseId::new(1), settings());
        controller.start();
        pump_with(&mut controller, answer_with_views);

        assert_eq!(controller.create_view("  "), Err(GridError::EmptyViewName));
        assert_eq!(
            controller.rename_view(ViewId::new(1), &"x".repeat(101)),
            Err(GridError::ViewNameTooLong { max: 100 })
        );
        assert!(controller.take_requests().is_empty());
    }

    #[test]
    fn hiding_a_column_clamps_the_cursor() -> Result<()> {
        let mut controller = loaded();
        controller.click(0, 2);
        controller.hide_column("Priority")?;
        assert_eq!(controller.column_count(), 2);
        assert_eq!(controller.cursor(), CellCursor::new(0, 1));
        assert!(controller.store().is_hidden("Priority"));
        assert_eq!(controller.display_value(0, 1), "Todo");

        controller.show_all_columns();
        assert_eq!(controller.column_count(), 3);
        Ok(())
    }

    #[test]
    fn moving_a_column_reorders_and_failure_restores() -> Result<()> {
        let mut controller = loaded();
        controller.move_column("Priority", -2)?;
        let names = |controller: &GridController| {
            controller
                .store()
                .columns()
                .iter()
                .map(|column| column.name.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&controller), ["Priority", "Name", "Status"]);
        let reorder = controller.take_requests().remove(0);
        assert_eq!(
            reorder.request,
            Request::ReorderColumns {
                table_id: TableId::new(1),
                order: vec![ColumnId::new(3), ColumnId::new(1), ColumnId::new(2)],
            }
        );
        fail(&mut controller, reorder);
        assert_eq!(names(&controller), ["Name", "Status", "Priority"]);
        Ok(())
    }

    #[test]
    fn reorder_needs_every_column_once() {
        let mut controller = loaded();
        assert_eq!(
            controller.reorder_columns(vec![ColumnId::new(1), ColumnId::new(2)]),
            Err(GridError::InvalidColumnOrder)
        );
        assert!(controller.take_requests().is_empty());
    }
}

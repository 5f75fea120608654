// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyModifiers,
    MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, Gauge, Paragraph, Row, Table, Tabs};
use std::io;
use std::time::{Duration, Instant};
use tabula_app::values::comma_format_count;
use tabula_app::{
    CellState, ColumnType, Completion, Filter, FilterOperator, GridController, GridError, GridKey,
    Move, Outgoing, SortDirection,
};
use tracing::{debug, info, warn};

const EVENT_POLL: Duration = Duration::from_millis(50);
const STATUS_TTL: Duration = Duration::from_secs(4);
const DOUBLE_CLICK: Duration = Duration::from_millis(400);
const QUIT_DRAIN: Duration = Duration::from_secs(5);
const ROW_NUMBER_WIDTH: u16 = 7;
const EDIT_CARET: &str = "▏";

/// Where queued gateway calls go and completions come back from.
pub trait GridRuntime {
    fn submit(&mut self, batch: Vec<Outgoing>) -> Result<()>;
    /// Completions that are ready, waiting at most `timeout` for the first.
    fn poll_completions(&mut self, timeout: Duration) -> Result<Vec<Completion>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum GridCommand {
    Quit,
    Save,
    Refresh,
    Help,
    NewTable(Option<String>),
    RenameTable(String),
    DeleteTable,
    AddColumn {
        name: String,
        column_type: ColumnType,
    },
    RenameColumn(String),
    RetypeColumn(ColumnType),
    DeleteColumn,
    HideColumn,
    /// `None` shows every hidden column.
    ShowColumn(Option<String>),
    MoveColumn(isize),
    NewView(String),
    UseView(String),
    RenameView(String),
    CopyView(Option<String>),
    DeleteView,
    AddRow,
    DeleteRows(usize),
    Search(Option<String>),
    Filter(Filter),
    ClearFilters,
    Sort {
        column: String,
        direction: SortDirection,
    },
    ClearSorts,
    Bulk(usize),
    CancelBulk,
    Generate(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct ScreenLayout {
    tabs: Rect,
    body: Rect,
    gauge: Rect,
    footer: Rect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Notice {
    text: String,
    since: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LastClick {
    cell: (usize, usize),
    at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ViewData {
    layout: ScreenLayout,
    command: Option<String>,
    help_visible: bool,
    notice: Option<Notice>,
    seen_status: Option<(String, Instant)>,
    last_click: Option<LastClick>,
}

impl ViewData {
    fn notify(&mut self, text: impl Into<String>, now: Instant) {
        self.notice = Some(Notice {
            text: text.into(),
            since: now,
        });
    }
}

pub fn run_app<R: GridRuntime>(grid: &mut GridController, runtime: &mut R) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen, EnableMouseCapture)
        .context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::default();
    grid.start();

    let result = event_loop(&mut terminal, grid, runtime, &mut view_data);
    let drained = shutdown(grid, runtime, QUIT_DRAIN);

    disable_raw_mode().context("disable raw mode")?;
    execute!(
        io::stdout(),
        terminal::LeaveAlternateScreen,
        DisableMouseCapture
    )
    .context("leave alternate screen")?;
    result.and(drained)
}

fn event_loop<R: GridRuntime>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    grid: &mut GridController,
    runtime: &mut R,
    view_data: &mut ViewData,
) -> Result<()> {
    loop {
        let now = Instant::now();
        pump(grid, runtime, now)?;
        expire_status(grid, view_data, now);

        let size = terminal.size().context("read terminal size")?;
        prepare_frame(grid, view_data, Rect::new(0, 0, size.width, size.height));
        // A page fetch queued by the viewport goes out before the next wait.
        runtime.submit(grid.take_requests())?;
        terminal
            .draw(|frame| render(frame, grid, view_data))
            .context("draw frame")?;

        if !event::poll(EVENT_POLL).context("poll event")? {
            continue;
        }
        let now = Instant::now();
        let quit = match event::read().context("read event")? {
            Event::Key(key) => handle_key_event(grid, view_data, key, now),
            Event::Mouse(mouse) => {
                handle_mouse_event(grid, view_data, mouse, now);
                false
            }
            _ => false,
        };
        if quit {
            return Ok(());
        }
    }
}

/// Send queued calls, apply completions that are ready and advance bulk work.
fn pump<R: GridRuntime>(grid: &mut GridController, runtime: &mut R, now: Instant) -> Result<()> {
    runtime.submit(grid.take_requests())?;
    let completions = runtime.poll_completions(Duration::ZERO)?;
    if !completions.is_empty() {
        debug!(count = completions.len(), "applying completions");
        grid.complete_all(completions, now);
    }
    grid.tick(now);
    runtime.submit(grid.take_requests())
}

/// Save buffered edits and wait for outstanding calls before exit.
fn shutdown<R: GridRuntime>(
    grid: &mut GridController,
    runtime: &mut R,
    timeout: Duration,
) -> Result<()> {
    grid.commit_edit();
    grid.cancel_bulk();
    let resent = grid.flush_pending();
    if resent > 0 {
        info!(resent, "saving pending edits before exit");
    }
    let deadline = Instant::now() + timeout;
    loop {
        runtime.submit(grid.take_requests())?;
        if grid.is_idle() {
            return Ok(());
        }
        let now = Instant::now();
        if now >= deadline {
            warn!(in_flight = grid.in_flight(), "exiting with unsaved changes");
            bail!("timed out saving changes; {} calls still pending", grid.in_flight());
        }
        let completions = runtime.poll_completions(EVENT_POLL.min(deadline - now))?;
        grid.complete_all(completions, Instant::now());
        grid.tick(Instant::now());
    }
}

/// Clear the transient notice and the controller's status once they have
/// been on screen long enough.
fn expire_status(grid: &mut GridController, view_data: &mut ViewData, now: Instant) {
    if view_data
        .notice
        .as_ref()
        .is_some_and(|notice| now.duration_since(notice.since) >= STATUS_TTL)
    {
        view_data.notice = None;
    }

    let Some(status) = grid.status().map(str::to_owned) else {
        view_data.seen_status = None;
        return;
    };
    let shown_since = view_data
        .seen_status
        .as_ref()
        .filter(|(seen, _)| *seen == status)
        .map(|(_, since)| *since);
    match shown_since {
        Some(since) if now.duration_since(since) >= STATUS_TTL => {
            grid.clear_status();
            view_data.seen_status = None;
        }
        Some(_) => {}
        None => view_data.seen_status = Some((status, now)),
    }
}

fn prepare_frame(grid: &mut GridController, view_data: &mut ViewData, area: Rect) {
    view_data.layout = screen_layout(area, grid.is_bulk_running());
    grid.set_viewport_height(visible_rows(view_data.layout.body));
    grid.sync_viewport();
}

fn screen_layout(area: Rect, bulk_running: bool) -> ScreenLayout {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(4),
            Constraint::Length(if bulk_running { 1 } else { 0 }),
            Constraint::Length(3),
        ])
        .split(area);
    ScreenLayout {
        tabs: parts[0],
        body: parts[1],
        gauge: parts[2],
        footer: parts[3],
    }
}

/// Data rows that fit in the body: borders and the header take three lines.
fn visible_rows(body: Rect) -> usize {
    usize::from(body.height.saturating_sub(3))
}

fn handle_key_event(
    grid: &mut GridController,
    view_data: &mut ViewData,
    key: KeyEvent,
    now: Instant,
) -> bool {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    if let Some(input) = &mut view_data.command {
        match key.code {
            KeyCode::Esc => view_data.command = None,
            KeyCode::Backspace => {
                if input.pop().is_none() {
                    view_data.command = None;
                }
            }
            KeyCode::Enter => {
                let line = std::mem::take(input);
                view_data.command = None;
                return run_command_line(grid, view_data, &line, now);
            }
            KeyCode::Char(ch) => input.push(ch),
            _ => {}
        }
        return false;
    }

    if view_data.help_visible {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
            view_data.help_visible = false;
        }
        return false;
    }

    if grid.editing().is_some() {
        if let Some(grid_key) = grid_key_for(key) {
            grid.handle_key(grid_key);
        }
        return false;
    }

    let outcome: Result<(), GridError> = match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char(':') => {
            view_data.command = Some(String::new());
            Ok(())
        }
        KeyCode::Char('?') => {
            view_data.help_visible = true;
            Ok(())
        }
        KeyCode::Char(']') => {
            grid.next_table();
            Ok(())
        }
        KeyCode::Char('[') => {
            grid.prev_table();
            Ok(())
        }
        KeyCode::Char('a') => grid.insert_row(),
        KeyCode::Char('d') => grid.delete_row(),
        KeyCode::Char('r') => {
            grid.refresh();
            Ok(())
        }
        KeyCode::Char('s') => {
            let resent = grid.flush_pending();
            view_data.notify(format!("saving {resent} pending edits"), now);
            Ok(())
        }
        KeyCode::Esc if grid.is_bulk_running() => {
            grid.cancel_bulk();
            view_data.notify("cancelling bulk insert", now);
            Ok(())
        }
        _ => {
            if let Some(grid_key) = grid_key_for(key) {
                grid.handle_key(grid_key);
            }
            Ok(())
        }
    };
    if let Err(error) = outcome {
        view_data.notify(error.to_string(), now);
    }
    false
}

fn grid_key_for(key: KeyEvent) -> Option<GridKey> {
    let grid_key = match key.code {
        KeyCode::Up => GridKey::Up,
        KeyCode::Down => GridKey::Down,
        KeyCode::Left => GridKey::Left,
        KeyCode::Right => GridKey::Right,
        KeyCode::Enter => GridKey::Enter,
        KeyCode::Tab => GridKey::Tab,
        KeyCode::BackTab => GridKey::BackTab,
        KeyCode::Esc => GridKey::Escape,
        KeyCode::F(2) => GridKey::F2,
        KeyCode::Backspace => GridKey::Backspace,
        KeyCode::PageUp => GridKey::PageUp,
        KeyCode::PageDown => GridKey::PageDown,
        KeyCode::Char(' ') => GridKey::Space,
        KeyCode::Char(ch) => GridKey::Char(ch),
        _ => return None,
    };
    Some(grid_key)
}

fn handle_mouse_event(
    grid: &mut GridController,
    view_data: &mut ViewData,
    mouse: MouseEvent,
    now: Instant,
) {
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            let Some(cell) = cell_at(grid, view_data.layout.body, mouse.column, mouse.row) else {
                // Clicking outside the grid takes focus away from the editor.
                grid.blur();
                return;
            };
            let double = view_data.last_click.as_ref().is_some_and(|last| {
                last.cell == cell && now.duration_since(last.at) < DOUBLE_CLICK
            });
            if double {
                grid.double_click(cell.0, cell.1);
                view_data.last_click = None;
            } else {
                grid.click(cell.0, cell.1);
                view_data.last_click = Some(LastClick { cell, at: now });
            }
        }
        MouseEventKind::ScrollDown => grid.move_cursor(Move::Down),
        MouseEventKind::ScrollUp => grid.move_cursor(Move::Up),
        _ => {}
    }
}

/// Grid coordinates (row, column) under a terminal position.
fn cell_at(grid: &GridController, body: Rect, x: u16, y: u16) -> Option<(usize, usize)> {
    let inner = inner_rect(body);
    let first_row_y = inner.y.checked_add(1)?;
    if y < first_row_y || y >= inner.y + inner.height || x < inner.x || x >= inner.x + inner.width
    {
        return None;
    }
    let row = grid.viewport().scroll() + usize::from(y - first_row_y);
    if row >= grid.row_count() {
        return None;
    }
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(column_widths(grid.column_count()))
        .spacing(1)
        .split(inner);
    let hit = columns
        .iter()
        .position(|rect| x >= rect.x && x < rect.x + rect.width)?;
    // Slot zero holds row numbers.
    let col = hit.checked_sub(1)?;
    Some((row, col))
}

fn inner_rect(area: Rect) -> Rect {
    Rect {
        x: area.x.saturating_add(1),
        y: area.y.saturating_add(1),
        width: area.width.saturating_sub(2),
        height: area.height.saturating_sub(2),
    }
}

fn column_widths(columns: usize) -> Vec<Constraint> {
    let mut widths = Vec::with_capacity(columns + 1);
    widths.push(Constraint::Length(ROW_NUMBER_WIDTH));
    widths.extend(std::iter::repeat_n(Constraint::Fill(1), columns));
    widths
}

fn run_command_line(
    grid: &mut GridController,
    view_data: &mut ViewData,
    line: &str,
    now: Instant,
) -> bool {
    if line.trim().is_empty() {
        return false;
    }
    let command = match parse_command(line) {
        Ok(command) => command,
        Err(error) => {
            view_data.notify(error.to_string(), now);
            return false;
        }
    };
    info!(command = line.trim(), "running command");
    match apply_command(grid, view_data, command, now) {
        Ok(quit) => quit,
        Err(error) => {
            view_data.notify(error.to_string(), now);
            false
        }
    }
}

fn apply_command(
    grid: &mut GridController,
    view_data: &mut ViewData,
    command: GridCommand,
    now: Instant,
) -> Result<bool> {
    match command {
        GridCommand::Quit => return Ok(true),
        GridCommand::Save => {
            let resent = grid.flush_pending();
            view_data.notify(format!("saving {resent} pending edits"), now);
        }
        GridCommand::Refresh => grid.refresh(),
        GridCommand::Help => view_data.help_visible = true,
        GridCommand::NewTable(name) => grid.create_table(name.as_deref())?,
        GridCommand::RenameTable(name) => {
            let table_id = active_table_id(grid)?;
            grid.rename_table(table_id, &name)?;
        }
        GridCommand::DeleteTable => {
            let table_id = active_table_id(grid)?;
            grid.delete_table(table_id)?;
        }
        GridCommand::AddColumn { name, column_type } => grid.create_column(&name, column_type)?,
        GridCommand::RenameColumn(name) => {
            let current = focused_column(grid)?;
            grid.rename_column(&current, &name)?;
        }
        GridCommand::RetypeColumn(column_type) => {
            let current = focused_column(grid)?;
            grid.retype_column(&current, column_type)?;
        }
        GridCommand::DeleteColumn => {
            let current = focused_column(grid)?;
            grid.delete_column(&current)?;
        }
        GridCommand::HideColumn => {
            let current = focused_column(grid)?;
            grid.hide_column(&current)?;
        }
        GridCommand::ShowColumn(Some(name)) => grid.show_column(&name)?,
        GridCommand::ShowColumn(None) => grid.show_all_columns(),
        GridCommand::MoveColumn(offset) => {
            let current = focused_column(grid)?;
            grid.move_column(&current, offset)?;
            // Keep the cursor on the moved column.
            grid.move_cursor(if offset < 0 { Move::Left } else { Move::Right });
        }
        GridCommand::NewView(name) => grid.create_view(&name)?,
        GridCommand::UseView(name) => {
            let view_id = grid
                .views()
                .iter()
                .find(|view| view.name.eq_ignore_ascii_case(&name))
                .map(|view| view.id)
                .ok_or_else(|| anyhow!("no view named {name:?} -- :view new <name> saves one"))?;
            grid.select_view(view_id)?;
        }
        GridCommand::RenameView(name) => {
            let view_id = active_view_id(grid)?;
            grid.rename_view(view_id, &name)?;
        }
        GridCommand::CopyView(name) => {
            let view_id = active_view_id(grid)?;
            grid.duplicate_view(view_id, name.as_deref())?;
        }
        GridCommand::DeleteView => {
            let view_id = active_view_id(grid)?;
            grid.delete_view(view_id)?;
        }
        GridCommand::AddRow => grid.insert_row()?,
        GridCommand::DeleteRows(count) => {
            let start = grid.cursor().row;
            let deleted = grid.delete_rows(start..start.saturating_add(count))?;
            view_data.notify(format!("deleting {} rows", comma_format_count(deleted)), now);
        }
        GridCommand::Search(search) => grid.set_search(search.as_deref()),
        GridCommand::Filter(filter) => grid.add_filter(filter)?,
        GridCommand::ClearFilters => grid.clear_filters(),
        GridCommand::Sort { column, direction } => grid.add_sort(&column, direction)?,
        GridCommand::ClearSorts => grid.clear_sorts(),
        GridCommand::Bulk(count) => grid.start_bulk(count, now)?,
        GridCommand::CancelBulk => {
            if !grid.cancel_bulk() {
                bail!("no bulk insert is running");
            }
        }
        GridCommand::Generate(count) => grid.generate_rows(count)?,
    }
    Ok(false)
}

fn active_table_id(grid: &GridController) -> Result<tabula_app::TableId> {
    grid.active_table()
        .map(|table| table.id)
        .ok_or_else(|| anyhow!(GridError::NoActiveTable))
}

fn active_view_id(grid: &GridController) -> Result<tabula_app::ViewId> {
    grid.active_view()
        .map(|view| view.id)
        .ok_or_else(|| anyhow!("no view is active -- views load with the table"))
}

fn focused_column(grid: &GridController) -> Result<String> {
    grid.store()
        .column_at(grid.cursor().col)
        .map(|column| column.name.clone())
        .ok_or_else(|| anyhow!("no column selected -- move the cursor onto a column first"))
}

fn parse_command(input: &str) -> Result<GridCommand> {
    let input = input.trim();
    let input = input.strip_prefix(':').unwrap_or(input).trim_start();
    let (head, rest) = input
        .split_once(char::is_whitespace)
        .map_or((input, ""), |(head, rest)| (head, rest.trim()));
    let (sub, tail) = rest
        .split_once(char::is_whitespace)
        .map_or((rest, ""), |(sub, tail)| (sub, tail.trim()));

    let command = match (head, sub) {
        ("q" | "quit", _) => GridCommand::Quit,
        ("w" | "save", _) => GridCommand::Save,
        ("refresh", _) => GridCommand::Refresh,
        ("help", _) => GridCommand::Help,

        ("table", "new") => GridCommand::NewTable(Some(tail.to_owned()).filter(|s| !s.is_empty())),
        ("table", "rename") => GridCommand::RenameTable(required(tail, "table rename <name>")?),
        ("table", "delete") => GridCommand::DeleteTable,

        ("col" | "column", "add") => {
            let (first, name) = tail
                .split_once(char::is_whitespace)
                .map_or((tail, ""), |(first, name)| (first, name.trim()));
            match ColumnType::parse(first) {
                Some(column_type) if !name.is_empty() => GridCommand::AddColumn {
                    name: name.to_owned(),
                    column_type,
                },
                _ => GridCommand::AddColumn {
                    name: required(tail, "col add [text|number] <name>")?,
                    column_type: ColumnType::Text,
                },
            }
        }
        ("col" | "column", "rename") => {
            GridCommand::RenameColumn(required(tail, "col rename <name>")?)
        }
        ("col" | "column", "type") => {
            let column_type = ColumnType::parse(tail)
                .ok_or_else(|| anyhow!("unknown column type {tail:?} -- use text or number"))?;
            GridCommand::RetypeColumn(column_type)
        }
        ("col" | "column", "delete") => GridCommand::DeleteColumn,
        ("col" | "column", "hide") => GridCommand::HideColumn,
        ("col" | "column", "show") => match required(tail, "col show <name|all>")?.as_str() {
            "all" => GridCommand::ShowColumn(None),
            name => GridCommand::ShowColumn(Some(name.to_owned())),
        },
        ("col" | "column", "move") => match tail {
            "left" => GridCommand::MoveColumn(-1),
            "right" => GridCommand::MoveColumn(1),
            _ => bail!("usage: col move left|right"),
        },

        ("view", "new") => GridCommand::NewView(required(tail, "view new <name>")?),
        ("view", "use") => GridCommand::UseView(required(tail, "view use <name>")?),
        ("view", "rename") => GridCommand::RenameView(required(tail, "view rename <name>")?),
        ("view", "copy") => GridCommand::CopyView(Some(tail.to_owned()).filter(|s| !s.is_empty())),
        ("view", "delete") => GridCommand::DeleteView,

        ("row", "add") => GridCommand::AddRow,
        ("row", "delete") if tail.is_empty() => GridCommand::DeleteRows(1),
        ("row", "delete") => GridCommand::DeleteRows(parse_count(tail)?),

        ("search", _) => GridCommand::Search(Some(rest.to_owned()).filter(|s| !s.is_empty())),

        ("filter", "clear") => GridCommand::ClearFilters,
        ("filter", _) => GridCommand::Filter(parse_filter(rest)?),

        ("sort", "clear") => GridCommand::ClearSorts,
        ("sort", _) => parse_sort(rest)?,

        ("bulk", "cancel") => GridCommand::CancelBulk,
        ("bulk", _) => GridCommand::Bulk(parse_count(rest)?),
        ("generate" | "gen", _) => GridCommand::Generate(parse_count(rest)?),

        ("table" | "col" | "column" | "row" | "view", _) => {
            bail!("unknown {head} command {sub:?} -- press ? for help")
        }
        _ => bail!("unknown command {head:?} -- press ? for help"),
    };
    Ok(command)
}

fn required(value: &str, usage: &str) -> Result<String> {
    if value.is_empty() {
        bail!("missing argument -- usage: {usage}");
    }
    Ok(value.to_owned())
}

/// Parse a row count such as `2500` or `2,500`.
fn parse_count(raw: &str) -> Result<usize> {
    let digits = raw
        .chars()
        .filter(|ch| *ch != ',' && *ch != '_')
        .collect::<String>();
    digits
        .parse::<usize>()
        .with_context(|| format!("row count {raw:?} must be a whole number"))
}

fn parse_filter(rest: &str) -> Result<Filter> {
    let args = split_args(rest)?;
    let [column, operator, value @ ..] = args.as_slice() else {
        bail!("usage: filter <column> <operator> [value]");
    };
    let operator = FilterOperator::parse(operator).ok_or_else(|| {
        let known = FilterOperator::ALL
            .iter()
            .map(|operator| operator.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        anyhow!("unknown filter operator {operator:?} -- use one of {known}")
    })?;
    let value = value.join(" ");
    if operator.takes_value() && value.is_empty() {
        bail!("filter {} needs a value", operator.as_str());
    }
    Ok(Filter {
        column: column.clone(),
        operator,
        value,
    })
}

fn parse_sort(rest: &str) -> Result<GridCommand> {
    let args = split_args(rest)?;
    let (column, direction) = match args.as_slice() {
        [column] => (column.clone(), SortDirection::Asc),
        [column, direction] => {
            let direction = SortDirection::parse(direction)
                .ok_or_else(|| anyhow!("unknown sort direction {direction:?} -- use asc or desc"))?;
            (column.clone(), direction)
        }
        _ => bail!("usage: sort <column> [asc|desc]"),
    };
    Ok(GridCommand::Sort { column, direction })
}

/// Split on whitespace; double quotes group words, so `"Due Date"` is one
/// argument.
fn split_args(input: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut pending = false;
    for ch in input.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                pending = true;
            }
            ch if ch.is_whitespace() && !quoted => {
                if pending {
                    args.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            ch => {
                current.push(ch);
                pending = true;
            }
        }
    }
    if quoted {
        bail!("unterminated quote in {input:?}");
    }
    if pending {
        args.push(current);
    }
    Ok(args)
}

fn render(frame: &mut ratatui::Frame<'_>, grid: &GridController, view_data: &ViewData) {
    let layout = view_data.layout;

    let tables = grid.tables();
    let selected = grid
        .active_table()
        .and_then(|active| tables.iter().position(|table| table.id == active.id))
        .unwrap_or(0);
    let titles = tables
        .iter()
        .map(|table| format!("{} ({})", table.name, comma_format_count(table.row_count)))
        .collect::<Vec<_>>();
    let tabs = Tabs::new(titles)
        .block(Block::default().title("tabula").borders(Borders::ALL))
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .select(selected);
    frame.render_widget(tabs, layout.tabs);

    render_table(frame, layout.body, grid);

    if grid.is_bulk_running() {
        let progress = grid.bulk_progress();
        let gauge = Gauge::default()
            .gauge_style(Style::default().fg(Color::Cyan))
            .ratio(progress.ratio())
            .label(format!(
                "inserting {} / {} rows (Esc cancels)",
                comma_format_count(progress.current),
                comma_format_count(progress.total)
            ));
        frame.render_widget(gauge, layout.gauge);
    }

    let footer = Paragraph::new(status_text(grid, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(footer, layout.footer);

    if view_data.help_visible {
        let area = centered_rect(72, 80, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text())
            .block(Block::default().title("help").borders(Borders::ALL));
        frame.render_widget(help, area);
    }
}

fn render_table(frame: &mut ratatui::Frame<'_>, area: Rect, grid: &GridController) {
    let columns = grid.store().visible_columns().collect::<Vec<_>>();
    let header = std::iter::once(Cell::from("#"))
        .chain(columns.iter().map(|column| {
            let label = match column.column_type {
                ColumnType::Number => format!("{} (#)", column.name),
                ColumnType::Text => column.name.clone(),
            };
            let style = if column.id.is_temporary() {
                Style::default().add_modifier(Modifier::ITALIC)
            } else {
                Style::default().add_modifier(Modifier::BOLD)
            };
            Cell::from(label).style(style)
        }))
        .collect::<Vec<_>>();

    let cursor = grid.cursor();
    let editing = grid.editing();
    let scroll = grid.viewport().scroll();
    let end = scroll
        .saturating_add(visible_rows(area))
        .min(grid.row_count());

    let rows = (scroll..end)
        .filter_map(|index| grid.store().row(index).map(|row| (index, row)))
        .map(|(index, row)| {
            let number = Cell::from((index + 1).to_string())
                .style(Style::default().fg(Color::DarkGray));
            let cells = columns.iter().enumerate().map(|(col, column)| {
                let focused = cursor.row == index && cursor.col == col;
                let state = grid.cell_state(row.id, &column.name);
                let text = match editing {
                    Some(session) if session.row_id == row.id && session.column == column.name => {
                        format!("{}{EDIT_CARET}", session.draft)
                    }
                    _ => grid.display_value(index, col),
                };
                Cell::from(text).style(cell_style(state, focused))
            });
            Row::new(std::iter::once(number).chain(cells).collect::<Vec<_>>())
        })
        .collect::<Vec<_>>();

    let title = table_title(grid);
    let table = Table::new(rows, column_widths(columns.len()))
        .header(Row::new(header).style(Style::default().fg(Color::Cyan)))
        .column_spacing(1)
        .block(Block::default().title(title).borders(Borders::ALL));
    frame.render_widget(table, area);
}

fn cell_style(state: CellState, focused: bool) -> Style {
    let style = match state {
        CellState::Clean => Style::default(),
        CellState::Editing => Style::default().fg(Color::Black).bg(Color::Cyan),
        CellState::Saving => Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::ITALIC),
        CellState::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    };
    if focused && state != CellState::Editing {
        style.add_modifier(Modifier::REVERSED)
    } else {
        style
    }
}

fn table_title(grid: &GridController) -> String {
    let Some(table) = grid.active_table() else {
        return "no table".to_owned();
    };
    let query = grid.query();
    let mut parts = vec![table.name.clone()];
    if let Some(view) = grid.active_view() {
        parts.push(view.name.clone());
    }
    if let Some(search) = &query.search {
        parts.push(format!("search {search:?}"));
    }
    for filter in &query.filters {
        parts.push(format!(
            "{} {} {}",
            filter.column,
            filter.operator.as_str(),
            filter.value
        ));
    }
    if !query.sorts.is_empty() {
        let sorts = query
            .sorts
            .iter()
            .map(|sort| format!("{} {}", sort.column, sort.direction.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        parts.push(format!("sort {sorts}"));
    }
    parts.join(" | ")
}

fn status_text(grid: &GridController, view_data: &ViewData) -> String {
    if let Some(input) = &view_data.command {
        return format!(":{input}");
    }

    let mut parts = Vec::new();
    if let Some(notice) = &view_data.notice {
        parts.push(notice.text.clone());
    } else if let Some(status) = grid.status() {
        parts.push(status.to_owned());
    }
    parts.push(format!(
        "{} of {} rows",
        comma_format_count(grid.row_count()),
        comma_format_count(grid.store().total())
    ));
    if grid.column_count() > 0 && grid.row_count() > 0 {
        let cursor = grid.cursor();
        parts.push(format!("row {} col {}", cursor.row + 1, cursor.col + 1));
    }
    let pending = grid.buffer().len();
    if pending > 0 {
        parts.push(format!("{pending} unsaved"));
    }
    if grid.loader().in_flight() {
        parts.push("loading".to_owned());
    }
    parts.push("? help".to_owned());
    parts.join("  |  ")
}

fn help_overlay_text() -> String {
    [
        "arrows        move (PageUp/PageDown jump)",
        "Enter F2 Spc  edit the focused cell",
        "  Tab S-Tab   save and move right/left",
        "  Enter       save and move down",
        "  Esc         discard the edit",
        "a / d         add / delete row",
        "[ / ]         previous / next table",
        "s             save pending edits",
        "r             refresh rows",
        "Esc           cancel a running bulk insert",
        "q             quit (pending edits are saved)",
        "",
        ":table new [name] | rename <name> | delete",
        ":col add [text|number] <name>",
        ":col rename <name> | type <text|number> | delete",
        ":col hide | show <name|all> | move left|right",
        ":view new <name> | use <name> | rename <name>",
        ":view copy [name] | delete",
        ":row add | delete [count]",
        ":search [text]",
        ":filter <column> <operator> [value] | clear",
        ":sort <column> [asc|desc] | clear",
        ":bulk <count> | cancel",
        ":generate <count>",
        ":save | refresh | quit",
    ]
    .join("\n")
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    Up,
    Down,
    Left,
    Right,
}

/// Keys the grid reacts to, independent of the terminal backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridKey {
    Up,
    Down,
    Left,
    Right,
    Enter,
    Tab,
    BackTab,
    Escape,
    F2,
    Space,
    Backspace,
    PageUp,
    PageDown,
    Char(char),
}

/// Focused cell. Movement clamps at the grid edges and never wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellCursor {
    pub row: usize,
    pub col: usize,
}

impl CellCursor {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    pub fn step(self, direction: Move, rows: usize, cols: usize) -> Self {
        let max_row = rows.saturating_sub(1);
        let max_col = cols.saturating_sub(1);
        let next = match direction {
            Move::Up => Self::new(self.row.saturating_sub(1), self.col),
            Move::Down => Self::new((self.row + 1).min(max_row), self.col),
            Move::Left => Self::new(self.row, self.col.saturating_sub(1)),
            Move::Right => Self::new(self.row, (self.col + 1).min(max_col)),
        };
        next.clamp(rows, cols)
    }

    pub fn jump(self, delta: isize, rows: usize, cols: usize) -> Self {
        let row = self.row.saturating_add_signed(delta);
        Self::new(row, self.col).clamp(rows, cols)
    }

    pub fn clamp(self, rows: usize, cols: usize) -> Self {
        Self::new(
            self.row.min(rows.saturating_sub(1)),
            self.col.min(cols.saturating_sub(1)),
        )
    }
}

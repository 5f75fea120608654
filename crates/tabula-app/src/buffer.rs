// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeMap;

use crate::ids::RowId;
use crate::model::{CellValue, ColumnType};
use crate::values;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    pub row_id: RowId,
    pub column: String,
}

impl CellKey {
    pub fn new(row_id: RowId, column: impl Into<String>) -> Self {
        Self {
            row_id,
            column: column.into(),
        }
    }
}

/// Sequence number of a buffered edit. Strictly increasing per buffer, so a
/// response can always tell whether a newer edit replaced the one it carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EditSeq(u64);

impl EditSeq {
    pub const fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingEdit {
    pub value: CellValue,
    pub seq: EditSeq,
    /// Last value storage is known to hold for this cell.
    pub baseline: CellValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Confirmation {
    /// The confirmed edit was the newest one; the entry under this key is
    /// gone.
    Cleared(CellKey),
    /// A newer edit is still pending. Its revert target moved forward.
    Superseded,
    /// Nothing buffered for this cell anymore.
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// The newest edit failed; restore `value` and flag the cell.
    Revert { key: CellKey, value: CellValue },
    /// An older edit failed while a newer one is pending. Ignore it.
    Stale,
}

/// Unconfirmed per-cell edits. While an entry exists it overrides whatever
/// storage returns for the same cell.
#[derive(Debug, Clone, Default)]
pub struct CellEditBuffer {
    entries: BTreeMap<CellKey, PendingEdit>,
    next_seq: u64,
}

impl CellEditBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer `value` for a cell. `baseline` is only recorded when no edit is
    /// pending yet; a second edit keeps the first edit's revert target.
    pub fn set(&mut self, key: CellKey, value: CellValue, baseline: CellValue) -> EditSeq {
        self.next_seq += 1;
        let seq = EditSeq(self.next_seq);
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.value = value;
                entry.seq = seq;
            }
            None => {
                self.entries.insert(
                    key,
                    PendingEdit {
                        value,
                        seq,
                        baseline,
                    },
                );
            }
        }
        seq
    }

    pub fn get(&self, key: &CellKey) -> Option<&CellValue> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    pub fn entry(&self, key: &CellKey) -> Option<&PendingEdit> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &CellKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn clear(&mut self, key: &CellKey) -> Option<PendingEdit> {
        self.entries.remove(key)
    }

    /// Storage accepted the edit tagged `seq` carrying `sent`.
    pub fn confirm(&mut self, key: &CellKey, seq: EditSeq, sent: &CellValue) -> Confirmation {
        let Some(current) = self.resolve(key, seq) else {
            return Confirmation::Unknown;
        };
        let Some(entry) = self.entries.get_mut(&current) else {
            return Confirmation::Unknown;
        };
        if entry.seq == seq {
            self.entries.remove(&current);
            return Confirmation::Cleared(current);
        }
        if entry.seq > seq {
            entry.baseline = sent.clone();
            return Confirmation::Superseded;
        }
        Confirmation::Unknown
    }

    /// Storage rejected the edit tagged `seq`.
    pub fn reject(&mut self, key: &CellKey, seq: EditSeq) -> Rejection {
        let Some(current) = self.resolve(key, seq) else {
            return Rejection::Stale;
        };
        match self.entries.get(&current) {
            Some(entry) if entry.seq == seq => {
                let value = entry.baseline.clone();
                self.entries.remove(&current);
                Rejection::Revert {
                    key: current,
                    value,
                }
            }
            _ => Rejection::Stale,
        }
    }

    /// Give a pending edit a fresh sequence number so it can be sent again.
    pub fn reissue(&mut self, key: &CellKey) -> Option<(EditSeq, CellValue)> {
        self.next_seq += 1;
        let seq = EditSeq(self.next_seq);
        let entry = self.entries.get_mut(key)?;
        entry.seq = seq;
        Some((seq, entry.value.clone()))
    }

    /// Re-apply buffered values for one row on top of freshly fetched cells.
    pub fn overlay(&self, row_id: RowId, cells: &mut BTreeMap<String, CellValue>) {
        for (key, entry) in self.row_entries(row_id) {
            cells.insert(key.column.clone(), entry.value.clone());
        }
    }

    pub fn rename_column(&mut self, old: &str, new: &str) {
        let moved = self
            .entries
            .keys()
            .filter(|key| key.column == old)
            .cloned()
            .collect::<Vec<_>>();
        for key in moved {
            if let Some(entry) = self.entries.remove(&key) {
                self.entries.insert(CellKey::new(key.row_id, new), entry);
            }
        }
    }

    /// Drop every pending edit for a deleted column.
    pub fn remove_column(&mut self, column: &str) {
        self.entries.retain(|key, _| key.column != column);
    }

    pub fn retype_column(&mut self, column: &str, from: ColumnType, to: ColumnType) {
        for (key, entry) in &mut self.entries {
            if key.column == column {
                entry.value = values::coerce(&entry.value, from, to);
                entry.baseline = values::coerce(&entry.baseline, from, to);
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &CellKey> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn row_entries(&self, row_id: RowId) -> impl Iterator<Item = (&CellKey, &PendingEdit)> {
        let start = CellKey::new(row_id, String::new());
        self.entries
            .range(start..)
            .take_while(move |(key, _)| key.row_id == row_id)
    }

    // A column rename rekeys entries while their persist calls are in flight,
    // so fall back to matching on row and sequence number.
    fn resolve(&self, key: &CellKey, seq: EditSeq) -> Option<CellKey> {
        if self.entries.contains_key(key) {
            return Some(key.clone());
        }
        self.row_entries(key.row_id)
            .find(|(_, entry)| entry.seq == seq)
            .map(|(key, _)| key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(row: i64, column: &str) -> CellKey {
        CellKey::new(RowId::new(row), column)
    }

    fn text(value: &str) -> CellValue {
        CellValue::Text(value.to_owned())
    }

    #[test]
    fn set_then_get_returns_buffered_value() {
        let mut buffer = CellEditBuffer::new();
        buffer.set(key(1, "Name"), text("new"), text("old"));
        assert_eq!(buffer.get(&key(1, "Name")), Some(&text("new")));
        assert_eq!(buffer.get(&key(1, "Status")), None);
    }

    #[test]
    fn confirm_of_latest_edit_clears_entry() {
        let mut buffer = CellEditBuffer::new();
        let seq = buffer.set(key(1, "Name"), text("new"), text("old"));
        assert_eq!(
            buffer.confirm(&key(1, "Name"), seq, &text("new")),
            Confirmation::Cleared(key(1, "Name"))
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn second_edit_keeps_first_baseline() {
        let mut buffer = CellEditBuffer::new();
        let first = buffer.set(key(1, "Name"), text("b"), text("a"));
        let second = buffer.set(key(1, "Name"), text("c"), text("b"));
        assert!(second > first);
        assert_eq!(
            buffer.entry(&key(1, "Name")).map(|entry| entry.baseline.clone()),
            Some(text("a"))
        );
    }

    #[test]
    fn stale_failure_does_not_touch_newer_edit() {
        let mut buffer = CellEditBuffer::new();
        let first = buffer.set(key(1, "Name"), text("b"), text("a"));
        buffer.set(key(1, "Name"), text("c"), text("b"));

        assert_eq!(buffer.reject(&key(1, "Name"), first), Rejection::Stale);
        assert_eq!(buffer.get(&key(1, "Name")), Some(&text("c")));
    }

    #[test]
    fn superseded_success_moves_revert_target() {
        let mut buffer = CellEditBuffer::new();
        let first = buffer.set(key(1, "Name"), text("b"), text("a"));
        let second = buffer.set(key(1, "Name"), text("c"), text("b"));

        assert_eq!(
            buffer.confirm(&key(1, "Name"), first, &text("b")),
            Confirmation::Superseded
        );
        assert_eq!(
            buffer.reject(&key(1, "Name"), second),
            Rejection::Revert {
                key: key(1, "Name"),
                value: text("b"),
            }
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn overlay_replaces_fetched_values_for_that_row_only() {
        let mut buffer = CellEditBuffer::new();
        buffer.set(key(2, "Name"), text("edited"), text("orig"));
        buffer.set(key(3, "Name"), text("other"), text("orig"));

        let mut cells = BTreeMap::new();
        cells.insert("Name".to_owned(), text("fetched"));
        cells.insert("Status".to_owned(), text("Done"));
        buffer.overlay(RowId::new(2), &mut cells);

        assert_eq!(cells["Name"], text("edited"));
        assert_eq!(cells["Status"], text("Done"));
    }

    #[test]
    fn rename_rekeys_and_confirm_still_resolves() {
        let mut buffer = CellEditBuffer::new();
        let seq = buffer.set(key(1, "Status"), text("Done"), text("Todo"));
        buffer.rename_column("Status", "Stage");

        assert!(buffer.get(&key(1, "Status")).is_none());
        assert_eq!(buffer.get(&key(1, "Stage")), Some(&text("Done")));
        assert_eq!(
            buffer.confirm(&key(1, "Status"), seq, &text("Done")),
            Confirmation::Cleared(key(1, "Stage"))
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn remove_column_drops_only_that_column() {
        let mut buffer = CellEditBuffer::new();
        buffer.set(key(1, "Name"), text("a"), text("b"));
        buffer.set(key(1, "Notes"), text("c"), text("d"));
        buffer.remove_column("Notes");
        assert_eq!(buffer.len(), 1);
        assert!(buffer.contains(&key(1, "Name")));
    }

    #[test]
    fn retype_coerces_buffered_values() {
        let mut buffer = CellEditBuffer::new();
        buffer.set(key(1, "Score"), text("12"), text("x"));
        buffer.retype_column("Score", ColumnType::Text, ColumnType::Number);

        let entry = buffer.entry(&key(1, "Score")).cloned();
        assert_eq!(entry.as_ref().map(|e| e.value.clone()), Some(CellValue::Number(12.0)));
        assert_eq!(entry.map(|e| e.baseline), Some(CellValue::Null));
    }

    #[test]
    fn reissue_bumps_sequence() {
        let mut buffer = CellEditBuffer::new();
        let seq = buffer.set(key(1, "Name"), text("v"), text("u"));
        let (next, value) = buffer.reissue(&key(1, "Name")).expect("entry exists");
        assert!(next > seq);
        assert_eq!(value, text("v"));
        assert_eq!(buffer.reject(&key(1, "Name"), seq), Rejection::Stale);
        assert!(buffer.reissue(&key(9, "Name")).is_none());
    }
}

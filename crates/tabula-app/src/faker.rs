// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use time::macros::date;
use time::{Date, Duration, OffsetDateTime};

use crate::model::{Column, ColumnType, RowData};

const FIRST_NAMES: [&str; 16] = [
    "Avery", "Jordan", "Taylor", "Riley", "Morgan", "Casey", "Alex", "Quinn", "Parker", "Drew",
    "Kai", "Elliot", "Robin", "Cameron", "Hayden", "Rowan",
];
const LAST_NAMES: [&str; 18] = [
    "Walker", "Martin", "Hill", "Evans", "Lopez", "Gray", "Ward", "Young", "Diaz", "Reed",
    "Campbell", "Turner", "Flores", "Bennett", "Price", "Morris", "Foster", "Brooks",
];
const EMAIL_DOMAINS: [&str; 5] = [
    "example.com",
    "mail.test",
    "inbox.test",
    "corp.example",
    "team.test",
];
const WORDS: [&str; 24] = [
    "alpha", "review", "budget", "launch", "draft", "sync", "audit", "roadmap", "invoice",
    "backlog", "deploy", "sprint", "design", "report", "meeting", "vendor", "contract", "metric",
    "release", "support", "ticket", "quarter", "update", "follow",
];
const EDIT_STATUSES: [&str; 4] = ["Active", "Inactive", "Pending", "Complete"];
const GENERATED_STATUSES: [&str; 3] = ["Active", "Inactive", "Pending"];
const SEED_STATUSES: [&str; 3] = ["Todo", "In Progress", "Done"];
const PRIORITIES: [&str; 3] = ["High", "Medium", "Low"];

const DATE_ORIGIN: Date = date!(2020 - 01 - 01);
const DATE_SPAN_DAYS: i64 = 2200;

struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }
}

/// Produces plausible cell values for new rows. Text values are keyed off
/// the column name; number columns get small integers.
pub struct GridFaker {
    rng: DeterministicRng,
}

impl GridFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
        }
    }

    pub fn from_clock() -> Self {
        let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
        Self::new(nanos as u64)
    }

    /// Values for a row inserted from the grid.
    pub fn record(&mut self, columns: &[Column]) -> RowData {
        columns
            .iter()
            .map(|column| {
                let value = match column.column_type {
                    ColumnType::Number => self.int_range(1, 100).to_string(),
                    ColumnType::Text => self.text_for(&column.name, &EDIT_STATUSES),
                };
                (column.name.clone(), value)
            })
            .collect()
    }

    /// Values for the rows a new table is seeded with.
    pub fn seeded_row(&mut self, columns: &[Column]) -> RowData {
        columns
            .iter()
            .map(|column| {
                let value = match column.name.to_ascii_lowercase().as_str() {
                    "status" => self.pick(&SEED_STATUSES).to_owned(),
                    "priority" => self.int_range(1, 5).to_string(),
                    _ => match column.column_type {
                        ColumnType::Number => self.int_range(1, 100).to_string(),
                        ColumnType::Text => self.text_for(&column.name, &SEED_STATUSES),
                    },
                };
                (column.name.clone(), value)
            })
            .collect()
    }

    /// Values for rows generated in bulk on the storage side.
    pub fn generated_record(&mut self, columns: &[Column]) -> RowData {
        columns
            .iter()
            .map(|column| {
                let value = match column.column_type {
                    ColumnType::Number => self.int_range(1, 1000).to_string(),
                    ColumnType::Text => self.text_for(&column.name, &GENERATED_STATUSES),
                };
                (column.name.clone(), value)
            })
            .collect()
    }

    pub fn person(&mut self) -> String {
        format!("{} {}", self.pick(&FIRST_NAMES), self.pick(&LAST_NAMES))
    }

    pub fn sentence(&mut self, min_words: usize, max_words: usize) -> String {
        let count = self.int_range(min_words as i64, max_words as i64) as usize;
        let mut sentence = (0..count)
            .map(|_| self.pick(&WORDS))
            .collect::<Vec<_>>()
            .join(" ");
        if let Some(first) = sentence.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        sentence.push('.');
        sentence
    }

    fn text_for(&mut self, column_name: &str, statuses: &[&str]) -> String {
        let lower = column_name.to_ascii_lowercase();
        if lower.contains("name") {
            self.person()
        } else if lower.contains("email") {
            let first = self.pick(&FIRST_NAMES).to_ascii_lowercase();
            let last = self.pick(&LAST_NAMES).to_ascii_lowercase();
            format!("{first}.{last}@{}", self.pick(&EMAIL_DOMAINS))
        } else if lower.contains("status") {
            self.pick(statuses).to_owned()
        } else if lower.contains("priority") {
            self.pick(&PRIORITIES).to_owned()
        } else if lower.contains("note") || lower.contains("description") {
            self.sentence(4, 10)
        } else if lower.contains("date") {
            self.date()
        } else {
            let count = self.int_range(1, 3) as usize;
            (0..count)
                .map(|_| self.pick(&WORDS))
                .collect::<Vec<_>>()
                .join(" ")
        }
    }

    fn date(&mut self) -> String {
        let offset = Duration::days(self.int_range(0, DATE_SPAN_DAYS));
        let day = DATE_ORIGIN.checked_add(offset).unwrap_or(DATE_ORIGIN);
        format!(
            "{:04}-{:02}-{:02}",
            day.year(),
            u8::from(day.month()),
            day.day()
        )
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }

    fn int_range(&mut self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        let span = (max - min + 1) as u64;
        min + (self.rng.next_u64() % span) as i64
    }
}

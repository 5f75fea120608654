// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(i64);

        impl $name {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(BaseId);
entity_id!(TableId);
entity_id!(ColumnId);
entity_id!(RowId);
entity_id!(ViewId);

impl ColumnId {
    /// Client-assigned ids for columns whose create call has not resolved yet
    /// are negative; storage never hands those out.
    pub const fn temporary(sequence: i64) -> Self {
        Self(-sequence.abs() - 1)
    }

    pub const fn is_temporary(self) -> bool {
        self.0 < 0
    }
}

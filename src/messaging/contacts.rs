//! Contact rows and the ordered delivery queue.

use serde::{Deserialize, Serialize};

/// Maximum number of candidate destinations kept per contact.
pub const MAX_DESTINATIONS: usize = 3;

/// One contact to deliver a message to.
///
/// Destinations are in priority order: the first is attempted first.
/// Rows are immutable once placed in a [`ContactQueue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRow {
    /// Ordinal position in the imported list.
    pub index: usize,
    /// Display name of the contact.
    pub name: String,
    /// Civil identifier carried through for display.
    pub civil_id: String,
    /// Candidate phone identifiers, deduplicated, at most three.
    pub destinations: Vec<String>,
    /// Pre-rendered message text.
    pub message: String,
}

impl ContactRow {
    /// Build a row, normalising the destination list.
    ///
    /// Destinations are trimmed, blanks dropped, duplicates removed (first
    /// occurrence wins) and the list truncated to [`MAX_DESTINATIONS`].
    pub fn new(
        index: usize,
        name: impl Into<String>,
        civil_id: impl Into<String>,
        destinations: impl IntoIterator<Item = impl AsRef<str>>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            index,
            name: name.into(),
            civil_id: civil_id.into(),
            destinations: normalize_destinations(destinations),
            message: message.into(),
        }
    }
}

fn normalize_destinations(raw: impl IntoIterator<Item = impl AsRef<str>>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(MAX_DESTINATIONS);
    for candidate in raw {
        let trimmed = candidate.as_ref().trim();
        if trimmed.is_empty() || out.iter().any(|d| d == trimmed) {
            continue;
        }
        out.push(trimmed.to_owned());
        if out.len() == MAX_DESTINATIONS {
            break;
        }
    }
    out
}

/// Ordered rows plus the cursor of the next row to attempt.
///
/// The rows never change after construction; only the cursor moves, and
/// only forward.
#[derive(Debug, Clone, Default)]
pub struct ContactQueue {
    rows: Vec<ContactRow>,
    cursor: usize,
}

impl ContactQueue {
    /// Build a queue from already-validated rows.
    ///
    /// Destination lists are re-normalised so rows constructed by hand
    /// obey the same rules as rows built with [`ContactRow::new`].
    pub fn new(rows: Vec<ContactRow>) -> Self {
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.destinations = normalize_destinations(std::mem::take(&mut row.destinations));
                row
            })
            .collect();
        Self { rows, cursor: 0 }
    }

    /// Number of rows in the queue.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the queue holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the next row to attempt.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The row at the cursor, or `None` once every row has been processed.
    pub fn current(&self) -> Option<&ContactRow> {
        self.rows.get(self.cursor)
    }

    /// Whether every row has been processed.
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.rows.len()
    }

    /// Number of rows not yet processed.
    pub fn remaining(&self) -> usize {
        self.rows.len().saturating_sub(self.cursor)
    }

    /// Move the cursor past the current row. Saturates at the end.
    pub fn advance(&mut self) {
        if self.cursor < self.rows.len() {
            self.cursor = self.cursor.saturating_add(1);
        }
    }

    /// All rows in queue order.
    pub fn rows(&self) -> &[ContactRow] {
        &self.rows
    }
}

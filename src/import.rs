//! Row file loading for the CLI.
//!
//! Reads rows that an upstream importer already validated and rendered,
//! in the importer's column layout. No spreadsheet parsing happens here.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::messaging::contacts::ContactRow;

/// One imported row as written by the spreadsheet importer.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportedRow {
    /// Contact name.
    pub name: String,
    /// Civil identifier.
    #[serde(default)]
    pub civil_id: String,
    /// Primary phone.
    pub phone1: String,
    /// First fallback phone.
    #[serde(default)]
    pub phone2: Option<String>,
    /// Second fallback phone.
    #[serde(default)]
    pub phone3: Option<String>,
    /// Rendered message text.
    pub message: String,
}

impl ImportedRow {
    /// Convert into a queue row at position `index`.
    pub fn into_contact_row(self, index: usize) -> ContactRow {
        let phones = std::iter::once(self.phone1)
            .chain(self.phone2)
            .chain(self.phone3);
        ContactRow::new(index, self.name, self.civil_id, phones, self.message)
    }
}

/// Parse a JSON array of imported rows into queue rows.
///
/// # Errors
///
/// Returns an error if the JSON is malformed or missing required columns.
pub fn parse_rows(json: &str) -> anyhow::Result<Vec<ContactRow>> {
    let imported: Vec<ImportedRow> =
        serde_json::from_str(json).context("failed to parse imported rows")?;
    Ok(imported
        .into_iter()
        .enumerate()
        .map(|(index, row)| row.into_contact_row(index))
        .collect())
}

/// Load rows from a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_rows(path: &Path) -> anyhow::Result<Vec<ContactRow>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rows at {}", path.display()))?;
    parse_rows(&contents).with_context(|| format!("invalid rows file {}", path.display()))
}

//! Contact model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::RosterColumns;

/// A single roster row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Unique identifier (the SA number).
    pub id: String,
    pub phone: Option<String>,
    /// Every column of the row, including the identifier and phone columns.
    pub fields: BTreeMap<String, String>,
}

impl Contact {
    /// Build a contact from a row. Returns `None` when the identifier column is
    /// missing or blank.
    pub fn from_row(fields: BTreeMap<String, String>, columns: &RosterColumns) -> Option<Self> {
        let id = fields.get(&columns.id)?.trim().to_string();
        if id.is_empty() {
            return None;
        }
        let phone = fields
            .get(&columns.phone)
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        Some(Self { id, phone, fields })
    }

    /// Look up a field by name, ignoring ASCII and Unicode case.
    pub fn field(&self, name: &str) -> Option<&str> {
        if let Some(v) = self.fields.get(name) {
            return Some(v.as_str());
        }
        let wanted = name.to_lowercase();
        self.fields
            .iter()
            .find(|(k, _)| k.to_lowercase() == wanted)
            .map(|(_, v)| v.as_str())
    }
}

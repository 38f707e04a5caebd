//! JSON-backed roster.
//!
//! The roster file is the exported spreadsheet: one key per sheet (partition),
//! each holding an array of row objects.
//!
//! ```json
//! { "Janeiro": [ { "SA": 100, "Telefone": "5511999990000", "Nome": "Ana" } ] }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::directory::ContactDirectory;
use super::model::Contact;
use crate::config::RosterColumns;
use crate::error::DirectoryError;

/// Sheet names that look like a month ("Janeiro", "mar/2024", "Dez 23").
static MONTH_PARTITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(janeiro|fevereiro|março|marco|abril|maio|junho|julho|agosto|setembro|outubro|novembro|dezembro|jan|fev|mar|abr|mai|jun|jul|ago|set|out|nov|dez)",
    )
    .expect("month pattern is valid")
});

struct Partition {
    name: String,
    contacts: Vec<Contact>,
}

/// In-memory roster loaded from a JSON export.
pub struct JsonRoster {
    partitions: Vec<Partition>,
    active: RwLock<Option<usize>>,
}

impl JsonRoster {
    /// Build a roster from already-parsed partitions. The first one is active.
    pub fn from_partitions(partitions: Vec<(String, Vec<Contact>)>) -> Self {
        let partitions: Vec<Partition> = partitions
            .into_iter()
            .map(|(name, contacts)| Partition { name, contacts })
            .collect();
        let active = if partitions.is_empty() { None } else { Some(0) };
        Self {
            partitions,
            active: RwLock::new(active),
        }
    }

    /// Load the roster file at `path`.
    pub async fn load(path: &Path, columns: &RosterColumns) -> Result<Self, DirectoryError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DirectoryError::Unreadable {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        let roster = Self::from_json_str(&raw, columns)?;
        info!(
            path = %path.display(),
            partitions = roster.partitions.len(),
            "Roster loaded"
        );
        Ok(roster)
    }

    /// Parse a roster document.
    ///
    /// Only month-named partitions are kept; when none match, every partition
    /// is kept. Partitions without the identifier column are skipped.
    pub fn from_json_str(raw: &str, columns: &RosterColumns) -> Result<Self, DirectoryError> {
        let doc: Value =
            serde_json::from_str(raw).map_err(|e| DirectoryError::Malformed(e.to_string()))?;
        let Value::Object(sheets) = doc else {
            return Err(DirectoryError::Malformed(
                "top level must be an object of partitions".to_string(),
            ));
        };

        let month_names: Vec<&String> = sheets
            .keys()
            .filter(|name| MONTH_PARTITION.is_match(name))
            .collect();
        let keep_all = month_names.is_empty();
        if keep_all {
            warn!("No month-named partitions in roster, using all partitions");
        }

        let mut partitions = Vec::new();
        for (name, rows) in &sheets {
            if !keep_all && !MONTH_PARTITION.is_match(name) {
                debug!(partition = %name, "Skipping non-month partition");
                continue;
            }
            match parse_partition(name, rows, columns) {
                Ok(contacts) => {
                    debug!(partition = %name, rows = contacts.len(), "Partition loaded");
                    partitions.push((name.clone(), contacts));
                }
                Err(e) => warn!(partition = %name, error = %e, "Skipping partition"),
            }
        }

        Ok(Self::from_partitions(partitions))
    }

    fn active_contacts(&self, active: Option<usize>) -> &[Contact] {
        active
            .and_then(|idx| self.partitions.get(idx))
            .map(|p| p.contacts.as_slice())
            .unwrap_or(&[])
    }
}

fn parse_partition(
    name: &str,
    rows: &Value,
    columns: &RosterColumns,
) -> Result<Vec<Contact>, DirectoryError> {
    let Value::Array(rows) = rows else {
        return Err(DirectoryError::Malformed(format!(
            "partition {name} is not an array of rows"
        )));
    };

    let mut saw_id_column = rows.is_empty();
    let mut contacts = Vec::with_capacity(rows.len());
    for row in rows {
        let Value::Object(cells) = row else {
            continue;
        };
        let fields: BTreeMap<String, String> = cells
            .iter()
            .filter_map(|(k, v)| cell_to_string(v).map(|s| (k.clone(), s)))
            .collect();
        saw_id_column |= cells.contains_key(&columns.id);
        if let Some(contact) = Contact::from_row(fields, columns) {
            contacts.push(contact);
        }
    }

    if !saw_id_column {
        return Err(DirectoryError::MissingColumn {
            partition: name.to_string(),
            column: columns.id.clone(),
        });
    }
    Ok(contacts)
}

/// Stringify a spreadsheet cell. Whole floats lose their `.0` so exported
/// identifiers like `100.0` read back as `100`.
fn cell_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    Some(format!("{}", f as i64))
                } else {
                    Some(f.to_string())
                }
            } else {
                Some(n.to_string())
            }
        }
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl ContactDirectory for JsonRoster {
    async fn resolve_by_id(&self, id: &str) -> Result<Option<Contact>, DirectoryError> {
        let active = *self.active.read().await;
        Ok(self
            .active_contacts(active)
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn resolve_many_by_ids(
        &self,
        ids: Option<&[String]>,
    ) -> Result<Vec<Contact>, DirectoryError> {
        let active = *self.active.read().await;
        let contacts = self.active_contacts(active);
        Ok(match ids {
            None => contacts.to_vec(),
            Some(ids) => contacts
                .iter()
                .filter(|c| ids.iter().any(|id| id == &c.id))
                .cloned()
                .collect(),
        })
    }

    async fn list_all_ids(&self) -> Result<Vec<String>, DirectoryError> {
        let active = *self.active.read().await;
        Ok(self
            .active_contacts(active)
            .iter()
            .map(|c| c.id.clone())
            .collect())
    }

    async fn list_partitions(&self) -> Result<Vec<String>, DirectoryError> {
        Ok(self.partitions.iter().map(|p| p.name.clone()).collect())
    }

    async fn switch_partition(&self, name: &str) -> Result<bool, DirectoryError> {
        let Some(idx) = self.partitions.iter().position(|p| p.name == name) else {
            return Ok(false);
        };
        *self.active.write().await = Some(idx);
        info!(partition = %name, "Active roster partition switched");
        Ok(true)
    }

    async fn active_partition(&self) -> Option<String> {
        let active = *self.active.read().await;
        active
            .and_then(|idx| self.partitions.get(idx))
            .map(|p| p.name.clone())
    }

    async fn contacts_in(&self, partition: &str) -> Result<Vec<Contact>, DirectoryError> {
        self.partitions
            .iter()
            .find(|p| p.name == partition)
            .map(|p| p.contacts.clone())
            .ok_or_else(|| DirectoryError::UnknownPartition(partition.to_string()))
    }
}

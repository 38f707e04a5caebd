//! `ContactDirectory` trait: read access to the client roster.

use async_trait::async_trait;

use super::model::Contact;
use crate::error::DirectoryError;

/// Backend-agnostic roster access.
///
/// Identifier lookups operate on the active partition. Phone resolution scans
/// partitions explicitly through [`ContactDirectory::contacts_in`] and never
/// touches the active pointer.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Find a contact in the active partition.
    async fn resolve_by_id(&self, id: &str) -> Result<Option<Contact>, DirectoryError>;

    /// Contacts of the active partition in roster order, optionally restricted
    /// to `ids`. Duplicated rows are returned as-is.
    async fn resolve_many_by_ids(
        &self,
        ids: Option<&[String]>,
    ) -> Result<Vec<Contact>, DirectoryError>;

    /// Every identifier in the active partition.
    async fn list_all_ids(&self) -> Result<Vec<String>, DirectoryError>;

    /// Partition names in roster order.
    async fn list_partitions(&self) -> Result<Vec<String>, DirectoryError>;

    /// Make `name` the active partition. Returns `false` if it does not exist.
    async fn switch_partition(&self, name: &str) -> Result<bool, DirectoryError>;

    /// Name of the active partition, if any.
    async fn active_partition(&self) -> Option<String>;

    /// All contacts of a named partition.
    async fn contacts_in(&self, partition: &str) -> Result<Vec<Contact>, DirectoryError>;
}

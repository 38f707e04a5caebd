//! Phone number matching.
//!
//! The gateway reports numbers with a country code (`5511987654321`) while the
//! roster often stores them in local form, with or without the area code and
//! punctuation. Two numbers match when the digits of the incoming number end
//! with the last eight digits of the roster number.

use tracing::{debug, warn};

use super::directory::ContactDirectory;
use super::model::Contact;

/// Number of trailing digits compared.
pub const MATCH_SUFFIX_DIGITS: usize = 8;

/// Strip everything but ASCII digits.
pub fn clean_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Whether an incoming number matches a roster number.
pub fn phones_match(incoming: &str, roster: &str) -> bool {
    let incoming = clean_phone(incoming);
    let roster = clean_phone(roster);
    if incoming.is_empty() || roster.is_empty() {
        return false;
    }
    let suffix = &roster[roster.len().saturating_sub(MATCH_SUFFIX_DIGITS)..];
    incoming.ends_with(suffix)
}

/// Identifier of the first contact whose phone matches `raw_phone`.
pub async fn resolve_id_by_phone(directory: &dyn ContactDirectory, raw_phone: &str) -> Option<String> {
    resolve_contact_by_phone(directory, raw_phone)
        .await
        .map(|c| c.id)
}

/// First contact, across every partition, whose phone matches `raw_phone`.
///
/// Partitions that fail to load are logged and skipped.
pub async fn resolve_contact_by_phone(
    directory: &dyn ContactDirectory,
    raw_phone: &str,
) -> Option<Contact> {
    if clean_phone(raw_phone).is_empty() {
        return None;
    }

    let partitions = match directory.list_partitions().await {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "Cannot list roster partitions for phone lookup");
            return None;
        }
    };

    for partition in &partitions {
        let contacts = match directory.contacts_in(partition).await {
            Ok(c) => c,
            Err(e) => {
                warn!(partition = %partition, error = %e, "Skipping partition in phone lookup");
                continue;
            }
        };
        if let Some(contact) = contacts
            .into_iter()
            .find(|c| c.phone.as_deref().is_some_and(|p| phones_match(raw_phone, p)))
        {
            debug!(phone = raw_phone, sa = %contact.id, partition = %partition, "Phone resolved");
            return Some(contact);
        }
    }

    None
}

//! Message personalization.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").expect("placeholder pattern is valid"));

/// Replace every `{field}` in `template` with the matching contact field.
///
/// Field names match case-insensitively; placeholders with no matching field
/// are left as written.
pub fn personalize(template: &str, fields: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let wanted = caps[1].trim().to_lowercase();
            fields
                .iter()
                .find(|(k, _)| k.to_lowercase() == wanted)
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Auto-reply text, greeting the client by name when it is known.
pub fn auto_reply_text(message: &str, name: Option<&str>) -> String {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("Olá {name}, {}", message.to_lowercase()),
        None => message.to_string(),
    }
}

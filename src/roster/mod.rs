//! Client roster: contacts grouped into named partitions (monthly tabs).

pub mod directory;
pub mod json;
pub mod model;
pub mod phone;

pub use directory::ContactDirectory;
pub use json::JsonRoster;
pub use model::Contact;
pub use phone::{clean_phone, phones_match, resolve_contact_by_phone, resolve_id_by_phone};

//! Inbound message drop directory.
//!
//! The WhatsApp bot writes one `received_<epoch-millis>.json` file per
//! incoming message. The poller picks them up, logs them against the client
//! and optionally answers with an auto-reply. The bot can also POST the same
//! payload to the webhook, which shares the logging path in [`intake`].

pub mod intake;
pub mod message;
pub mod poller;

pub use intake::{Intake, log_inbound};
pub use message::{InboundMessage, RawTimestamp};
pub use poller::{InboxPoller, PollReport, spawn_inbox_poller};

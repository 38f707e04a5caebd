//! Sender resolution and RECEIVED logging shared by the file poller and the
//! webhook.

use tracing::{info, warn};

use super::message::InboundMessage;
use crate::dispatch::Dispatcher;
use crate::error::StoreError;
use crate::roster::{Contact, resolve_contact_by_phone};

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Intake {
    /// No `contactNumber` in the payload.
    NoSender,
    /// The number matches no roster client. Nothing was written.
    Unmatched,
    /// Appended to this client's log.
    Logged(Contact),
}

/// Resolve the sender and append a RECEIVED record for them.
pub async fn log_inbound(dispatcher: &Dispatcher, msg: &InboundMessage) -> Result<Intake, StoreError> {
    if !msg.has_sender() {
        warn!(id = msg.id.as_deref().unwrap_or(""), "Inbound message has no contactNumber");
        return Ok(Intake::NoSender);
    }

    let directory = dispatcher.directory();
    let Some(contact) = resolve_contact_by_phone(directory.as_ref(), &msg.contact_number).await
    else {
        warn!(phone = %msg.contact_number, "No roster client matches inbound number");
        return Ok(Intake::Unmatched);
    };

    dispatcher
        .store()
        .append_received(
            &contact.id,
            &msg.contact_number,
            &msg.body,
            msg.received_at().as_deref(),
        )
        .await?;
    info!(sa = %contact.id, phone = %msg.contact_number, "Inbound message logged");
    Ok(Intake::Logged(contact))
}

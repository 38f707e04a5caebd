//! Bulk send job.
//!
//! Messages go out strictly one at a time with a delay between them. The
//! cancellation token is checked before every send and raced against every
//! delay; an in-flight send is always allowed to finish.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::task::{BulkSendArgs, ItemOutcome, TaskKind, TaskResult};
use crate::dispatch::Dispatcher;
use crate::roster::Contact;
use crate::template::personalize;

/// One message ready to go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlannedMessage {
    pub id: String,
    pub phone: String,
    pub body: String,
    pub snapshot: BTreeMap<String, String>,
}

/// Output of the planning pass.
#[derive(Debug, Default)]
pub(crate) struct Plan {
    pub messages: Vec<PlannedMessage>,
    pub excluded: Vec<String>,
    pub duplicates_skipped: usize,
}

/// Dedupe, drop contacts without a phone, and render each message.
pub(crate) fn plan_messages(contacts: Vec<Contact>, template: &str, dedupe: bool) -> Plan {
    let mut plan = Plan::default();
    let mut seen: HashSet<String> = HashSet::new();

    for contact in contacts {
        if dedupe && !seen.insert(contact.id.clone()) {
            debug!(sa = %contact.id, "Client already in batch, skipping duplicate");
            plan.duplicates_skipped += 1;
            continue;
        }

        let Some(phone) = contact.phone.clone() else {
            info!(sa = %contact.id, "Client has no phone number, excluded");
            plan.excluded.push(contact.id);
            continue;
        };

        plan.messages.push(PlannedMessage {
            body: personalize(template, &contact.fields),
            id: contact.id,
            phone,
            snapshot: contact.fields,
        });
    }

    plan
}

/// Run a bulk send to completion or cancellation.
///
/// `report` is called with `(completed, total)` after every attempt.
pub(crate) async fn run_bulk_send(
    task_id: &str,
    args: &BulkSendArgs,
    dispatcher: &Dispatcher,
    delay: Duration,
    cancel: &CancellationToken,
    report: &(dyn Fn(usize, usize) + Send + Sync),
) -> TaskResult {
    let contacts = match dispatcher
        .directory()
        .resolve_many_by_ids(args.ids.as_deref())
        .await
    {
        Ok(c) => c,
        Err(e) => {
            warn!(task_id = %task_id, error = %e, "Could not load contacts for bulk send");
            return TaskResult::failed(task_id, TaskKind::BulkSend, e.to_string());
        }
    };

    if contacts.is_empty() {
        info!(task_id = %task_id, "Bulk send found no contacts");
        return TaskResult::failed(task_id, TaskKind::BulkSend, "no contacts found");
    }

    let plan = plan_messages(contacts, &args.template, args.dedupe);
    let total = plan.messages.len();
    let mut items = Vec::with_capacity(total);
    let mut sent = 0;
    let mut interrupted = false;

    info!(
        task_id = %task_id,
        total,
        excluded = plan.excluded.len(),
        duplicates = plan.duplicates_skipped,
        delay_secs = delay.as_secs_f64(),
        "Bulk send starting"
    );

    for (index, msg) in plan.messages.iter().enumerate() {
        if cancel.is_cancelled() {
            info!(task_id = %task_id, sent, "Cancellation requested, stopping bulk send");
            interrupted = true;
            break;
        }

        debug!(task_id = %task_id, sa = %msg.id, "Sending {}/{}", index + 1, total);
        let outcome = dispatcher
            .send_logged(&msg.phone, &msg.body, &msg.id, &msg.snapshot)
            .await;
        if outcome.success {
            sent += 1;
        }
        items.push(ItemOutcome {
            phone: msg.phone.clone(),
            id: msg.id.clone(),
            success: outcome.success,
            message: outcome.message.unwrap_or_default(),
        });
        report(index + 1, total);

        if index + 1 < total {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(task_id = %task_id, sent, "Cancellation requested during delay");
                    interrupted = true;
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    info!(task_id = %task_id, total, sent, cancelled = interrupted, "Bulk send finished");

    TaskResult {
        task_id: task_id.to_string(),
        kind: TaskKind::BulkSend,
        success: !interrupted,
        total,
        sent,
        cancelled: interrupted,
        items,
        excluded: plan.excluded,
        duplicates_skipped: plan.duplicates_skipped,
        message: interrupted.then(|| "cancelled by user".to_string()),
        finished_at: Utc::now(),
    }
}

//! Historical reconciliation: answer conversations left hanging while the
//! bridge was down.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RuntimeSettings;
use crate::dispatch::Dispatcher;
use crate::store::{Direction, MessageRecord};
use crate::template::auto_reply_text;

/// Only messages received within this many hours get a catch-up reply.
pub const REPLY_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Clients with history that were examined.
    pub scanned: usize,
    /// Catch-up replies delivered.
    pub replied: usize,
    /// Clients skipped for unreadable logs or timestamps.
    pub skipped: usize,
}

/// Send a catch-up auto-reply to every client whose latest message is an
/// unanswered RECEIVED younger than [`REPLY_WINDOW_HOURS`].
///
/// Runs whether or not live auto-replies are switched on; only the reply
/// text is taken from `settings`.
pub async fn reconcile_history(
    dispatcher: &Dispatcher,
    settings: &RuntimeSettings,
    name_column: &str,
    now: DateTime<Utc>,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    let store = dispatcher.store();
    let ids = match store.list_ids_with_history().await {
        Ok(ids) => ids,
        Err(e) => {
            warn!(error = %e, "Cannot list conversation history");
            return report;
        }
    };

    for id in ids {
        report.scanned += 1;

        let messages = match store.get_messages(&id).await {
            Ok(m) => m,
            Err(e) => {
                warn!(sa = %id, error = %e, "Skipping unreadable conversation");
                report.skipped += 1;
                continue;
            }
        };

        let Some((latest, received_at)) = latest_message(&messages) else {
            if !messages.is_empty() {
                warn!(sa = %id, "Skipping conversation whose latest timestamp is unreadable");
                report.skipped += 1;
            }
            continue;
        };

        if latest.direction != Direction::Received {
            continue;
        }
        if now.signed_duration_since(received_at) >= TimeDelta::hours(REPLY_WINDOW_HOURS) {
            debug!(sa = %id, "Last message is older than the reply window");
            continue;
        }
        if latest.phone.trim().is_empty() {
            warn!(sa = %id, "Pending message has no phone, cannot reply");
            report.skipped += 1;
            continue;
        }

        let info = match store.get_contact_info(&id).await {
            Ok(info) => info,
            Err(e) => {
                warn!(sa = %id, error = %e, "Client info unavailable, replying without name");
                BTreeMap::new()
            }
        };
        let name = info
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name_column))
            .map(|(_, v)| v.as_str());
        let text = auto_reply_text(&settings.auto_reply_message, name);

        tokio::time::sleep(settings.reply_pause).await;
        let outcome = dispatcher.send_logged(&latest.phone, &text, &id, &info).await;
        if outcome.success {
            info!(sa = %id, "Catch-up reply sent");
            report.replied += 1;
        } else {
            warn!(
                sa = %id,
                reason = outcome.message.as_deref().unwrap_or("unknown"),
                "Catch-up reply not delivered"
            );
        }
    }

    info!(
        scanned = report.scanned,
        replied = report.replied,
        skipped = report.skipped,
        "History reconciliation finished"
    );
    report
}

/// The chronologically last record among those with a readable timestamp.
/// `None` when the last appended record's timestamp is unreadable.
fn latest_message(messages: &[MessageRecord]) -> Option<(&MessageRecord, DateTime<Utc>)> {
    messages.last()?.parsed_timestamp()?;

    let mut latest: Option<(&MessageRecord, DateTime<Utc>)> = None;
    for msg in messages {
        let Some(ts) = msg.parsed_timestamp() else {
            continue;
        };
        // `>=` keeps the later record on ties.
        if latest.is_none_or(|(_, best)| ts >= best) {
            latest = Some((msg, ts));
        }
    }
    latest
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::store::ConversationStore;
    use crate::testing::{StubGateway, memory_fixture};

    fn settings(enabled: bool) -> RuntimeSettings {
        RuntimeSettings {
            auto_reply_enabled: enabled,
            reply_pause: Duration::ZERO,
            ..RuntimeSettings::default()
        }
    }

    fn ago(now: DateTime<Utc>, hours: i64) -> String {
        (now - TimeDelta::hours(hours)).to_rfc3339()
    }

    #[tokio::test]
    async fn recent_received_gets_reply() {
        let fx = memory_fixture(StubGateway::accepting());
        let now = Utc::now();
        fx.store.set_info("100", "Nome", "Ana");
        fx.store.push("100", Direction::Sent, &ago(now, 3), "5511999990000");
        fx.store.push("100", Direction::Received, &ago(now, 1), "5511999990000");

        let report = reconcile_history(&fx.dispatcher, &settings(true), "Nome", now).await;
        assert_eq!(report, ReconcileReport { scanned: 1, replied: 1, skipped: 0 });

        let sent = fx.gateway.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "5511999990000");
        assert_eq!(sent[0].1, "Olá Ana, obrigado pelo feedback!");
        assert_eq!(fx.store.get_messages("100").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn stale_received_is_ignored() {
        let fx = memory_fixture(StubGateway::accepting());
        let now = Utc::now();
        fx.store.push("100", Direction::Received, &ago(now, 25), "5511999990000");

        let report = reconcile_history(&fx.dispatcher, &settings(true), "Nome", now).await;
        assert_eq!(report.replied, 0);
        assert!(fx.gateway.sent().is_empty());
    }

    #[tokio::test]
    async fn answered_conversation_is_ignored() {
        let fx = memory_fixture(StubGateway::accepting());
        let now = Utc::now();
        fx.store.push("100", Direction::Received, &ago(now, 2), "5511999990000");
        fx.store.push("100", Direction::Sent, &ago(now, 1), "5511999990000");

        let report = reconcile_history(&fx.dispatcher, &settings(true), "Nome", now).await;
        assert_eq!(report.replied, 0);
    }

    #[tokio::test]
    async fn order_is_by_timestamp_not_position() {
        let fx = memory_fixture(StubGateway::accepting());
        let now = Utc::now();
        fx.store.push("100", Direction::Received, &ago(now, 1), "5511999990000");
        fx.store.push("100", Direction::Sent, &ago(now, 5), "5511999990000");

        let report = reconcile_history(&fx.dispatcher, &settings(true), "Nome", now).await;
        assert_eq!(report.replied, 1);
    }

    #[tokio::test]
    async fn bad_timestamp_skips_client_only() {
        let fx = memory_fixture(StubGateway::accepting());
        let now = Utc::now();
        fx.store.push("100", Direction::Received, "yesterday-ish", "5511999990000");
        fx.store.push("101", Direction::Received, &ago(now, 1), "5511988887777");

        let report = reconcile_history(&fx.dispatcher, &settings(true), "Nome", now).await;
        assert_eq!(report, ReconcileReport { scanned: 2, replied: 1, skipped: 1 });
        assert_eq!(fx.gateway.sent()[0].0, "5511988887777");
        // No name on file: plain message.
        assert_eq!(fx.gateway.sent()[0].1, "Obrigado pelo feedback!");
    }

    #[tokio::test]
    async fn old_unreadable_record_does_not_block_reply() {
        let fx = memory_fixture(StubGateway::accepting());
        let now = Utc::now();
        fx.store.push("100", Direction::Sent, "", "5511999990000");
        fx.store.push("100", Direction::Received, &ago(now, 1), "5511999990000");

        let report = reconcile_history(&fx.dispatcher, &settings(true), "Nome", now).await;
        assert_eq!(report, ReconcileReport { scanned: 1, replied: 1, skipped: 0 });
    }

    #[tokio::test]
    async fn unreadable_latest_record_skips_client() {
        let fx = memory_fixture(StubGateway::accepting());
        let now = Utc::now();
        fx.store.push("100", Direction::Received, &ago(now, 1), "5511999990000");
        fx.store.push("100", Direction::Sent, "not a time", "5511999990000");

        let report = reconcile_history(&fx.dispatcher, &settings(true), "Nome", now).await;
        assert_eq!(report, ReconcileReport { scanned: 1, replied: 0, skipped: 1 });
        assert!(fx.gateway.sent().is_empty());
    }

    #[tokio::test]
    async fn replies_even_with_auto_reply_switched_off() {
        let fx = memory_fixture(StubGateway::accepting());
        let now = Utc::now();
        fx.store.push("100", Direction::Received, &ago(now, 1), "5511999990000");

        let report = reconcile_history(&fx.dispatcher, &settings(false), "Nome", now).await;
        assert_eq!(report.replied, 1);
        assert_eq!(fx.gateway.sent()[0].1, "Obrigado pelo feedback!");
    }

    #[tokio::test]
    async fn failed_delivery_is_not_counted() {
        let fx = memory_fixture(StubGateway::refusing("not ready"));
        let now = Utc::now();
        fx.store.push("100", Direction::Received, &ago(now, 1), "5511999990000");

        let report = reconcile_history(&fx.dispatcher, &settings(true), "Nome", now).await;
        assert_eq!(report.replied, 0);
        assert_eq!(fx.store.get_messages("100").await.unwrap().len(), 1);
    }
}

//! Integration tests for the bridge REST API.
//!
//! Each test boots a stub WhatsApp bot and the bridge API on random ports,
//! backed by a real file store and a JSON roster, and drives the HTTP
//! contract with reqwest.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::time::timeout;

use roster_bridge::api::bridge_routes;
use roster_bridge::config::{BridgeConfig, InboxDisposition, RosterColumns};
use roster_bridge::gateway::HttpGateway;
use roster_bridge::manager::BridgeManager;
use roster_bridge::roster::JsonRoster;
use roster_bridge::store::FileConversationStore;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

const ROSTER: &str = r#"{
    "Janeiro": [
        {"SA": 100, "Telefone": "5511999990000", "Nome": "Ana"},
        {"SA": 101, "Telefone": "(11) 98888-7777", "Nome": "Bruno"},
        {"SA": 102, "Nome": "Carla"},
        {"SA": 103, "Telefone": "5511977776666", "Nome": "Duda"}
    ],
    "Fevereiro": [
        {"SA": 200, "Telefone": "5521966665555", "Nome": "Eva"}
    ]
}"#;

type Outbox = Arc<Mutex<Vec<(String, String)>>>;

#[derive(Clone, Default)]
struct Bot {
    outbox: Outbox,
    webhook: Arc<Mutex<Option<String>>>,
}

async fn bot_status() -> Json<Value> {
    Json(json!({"ready": true}))
}

async fn bot_send(State(bot): State<Bot>, Json(body): Json<Value>) -> Json<Value> {
    let phone = body["phone"].as_str().unwrap_or_default().to_string();
    let message = body["message"].as_str().unwrap_or_default().to_string();
    bot.outbox.lock().unwrap().push((phone, message));
    Json(json!({"success": true, "message": "Mensagem enviada"}))
}

async fn bot_set_webhook(State(bot): State<Bot>, Json(body): Json<Value>) -> Json<Value> {
    let url = body["url"].as_str().unwrap_or_default().to_string();
    *bot.webhook.lock().unwrap() = Some(url);
    Json(json!({"success": true, "message": "Webhook configurado e testado com sucesso"}))
}

/// Start a stub bot exposing the gateway's REST contract.
async fn start_bot() -> (String, Bot) {
    let bot = Bot::default();
    let app = Router::new()
        .route("/api/status", get(bot_status))
        .route("/api/send-message", post(bot_send))
        .route("/api/set-webhook", post(bot_set_webhook))
        .with_state(bot.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://127.0.0.1:{port}"), bot)
}

struct Harness {
    base: String,
    http: reqwest::Client,
    bot: Bot,
    manager: Arc<BridgeManager>,
    dir: TempDir,
}

impl Harness {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn inbox(&self) -> std::path::PathBuf {
        self.dir.path().join("messages")
    }

    fn sent(&self) -> Vec<(String, String)> {
        self.bot.outbox.lock().unwrap().clone()
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self.http.get(self.url(path)).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self.http.post(self.url(path)).json(&body).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn wait_for_result(&self, task_id: &str) -> Value {
        loop {
            let (status, body) = self.get(&format!("/tasks/{task_id}")).await;
            if status == 200 {
                return body;
            }
            assert_eq!(status, 202, "unexpected status polling task: {body}");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// Boot the bridge with a temp storage/inbox and the given bulk delay.
async fn start_bridge(bulk_delay: Duration) -> Harness {
    let (bot_url, bot) = start_bot().await;
    let dir = tempfile::tempdir().unwrap();

    let mut config = BridgeConfig::default();
    config.storage_dir = dir.path().join("storage");
    config.inbox.dir = dir.path().join("messages");
    config.inbox.poll_interval = Duration::from_secs(3600);
    config.inbox.disposition = InboxDisposition::Archive;
    config.gateway_url = bot_url.clone();
    config.settings.bulk_delay = bulk_delay;
    config.settings.reply_pause = Duration::ZERO;

    let roster = JsonRoster::from_json_str(ROSTER, &RosterColumns::default()).unwrap();
    let store = FileConversationStore::open(&config.storage_dir).await.unwrap();
    let gateway = HttpGateway::new(bot_url, Duration::from_secs(5)).unwrap();

    let manager = BridgeManager::start(&config, Arc::new(roster), Arc::new(store), Arc::new(gateway))
        .await
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let app = bridge_routes(Arc::clone(&manager));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    Harness {
        base: format!("http://127.0.0.1:{port}"),
        http: reqwest::Client::new(),
        bot,
        manager,
        dir,
    }
}

fn drop_inbound(inbox: &Path, name: &str, body: Value) {
    std::fs::write(inbox.join(name), body.to_string()).unwrap();
}

#[tokio::test]
async fn health_and_status() {
    timeout(TEST_TIMEOUT, async {
        let h = start_bridge(Duration::from_secs(1)).await;

        let (status, body) = h.get("/health").await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");

        let (status, body) = h.get("/status").await;
        assert_eq!(status, 200);
        assert_eq!(body["gateway"]["ready"], true);
        assert_eq!(body["task"]["running"], false);
        assert_eq!(body["active_partition"], "Janeiro");
        assert_eq!(body["auto_reply"]["enabled"], true);

        h.manager.shutdown().await;
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn bulk_send_personalizes_and_logs() {
    timeout(TEST_TIMEOUT, async {
        let h = start_bridge(Duration::from_secs(1)).await;

        let (status, body) = h
            .post(
                "/send-bulk",
                json!({"message": "Olá {nome}, SA {sa}", "ids": ["101"]}),
            )
            .await;
        assert_eq!(status, 202);
        let task_id = body["task_id"].as_str().unwrap().to_string();
        assert!(task_id.starts_with("bulk_"));

        let result = h.wait_for_result(&task_id).await;
        assert_eq!(result["success"], true);
        assert_eq!(result["total"], 1);
        assert_eq!(result["sent"], 1);
        assert_eq!(result["cancelled"], false);

        assert_eq!(
            h.sent(),
            vec![("(11) 98888-7777".to_string(), "Olá Bruno, SA 101".to_string())]
        );

        let (status, client) = h.get("/clients/101").await;
        assert_eq!(status, 200);
        assert_eq!(client["messages"][0]["type"], "sent");
        assert_eq!(client["info"]["Nome"], "Bruno");
        assert!(h.dir.path().join("storage/client_101.json").exists());

        h.manager.shutdown().await;
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn busy_coordinator_rejects_and_cancels() {
    timeout(TEST_TIMEOUT, async {
        let h = start_bridge(Duration::from_secs(60)).await;

        let (status, body) = h.post("/send-bulk", json!({"message": "Oi {Nome}"})).await;
        assert_eq!(status, 202);
        let task_id = body["task_id"].as_str().unwrap().to_string();

        // Wait for the first message; the worker then sits in the delay.
        while h.sent().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let (status, _) = h.post("/send-bulk", json!({"message": "again"})).await;
        assert_eq!(status, 409);

        let (status, current) = h.get("/tasks/current").await;
        assert_eq!(status, 200);
        assert_eq!(current["running"], true);
        assert_eq!(current["current_task_id"], task_id.as_str());

        let (status, body) = h.post("/tasks/cancel", json!({})).await;
        assert_eq!(status, 200);
        assert_eq!(body["task_id"], task_id.as_str());

        let result = h.wait_for_result(&task_id).await;
        assert_eq!(result["cancelled"], true);
        assert_eq!(result["success"], false);
        assert_eq!(result["sent"], 1);
        assert_eq!(result["total"], 3);
        assert_eq!(result["excluded"], json!(["102"]));
        assert_eq!(h.sent().len(), 1);

        h.manager.shutdown().await;
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn inbound_message_is_logged_and_answered() {
    timeout(TEST_TIMEOUT, async {
        let h = start_bridge(Duration::from_secs(1)).await;
        // Let the poller's first (empty) scan pass.
        tokio::time::sleep(Duration::from_millis(50)).await;

        drop_inbound(
            &h.inbox(),
            "received_1700000000000.json",
            json!({"contactNumber": "5521966665555", "body": "Adorei o atendimento"}),
        );
        let (status, report) = h.post("/inbox/poll", json!({})).await;
        assert_eq!(status, 200);
        assert_eq!(report["logged"], 1);
        assert_eq!(report["replied"], 1);

        assert_eq!(
            h.sent(),
            vec![(
                "5521966665555".to_string(),
                "Olá Eva, obrigado pelo feedback!".to_string()
            )]
        );

        let (_, client) = h.get("/clients/200").await;
        let types: Vec<&str> = client["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["type"].as_str().unwrap())
            .collect();
        assert_eq!(types, vec!["received", "sent"]);
        assert!(h.inbox().join("processed/received_1700000000000.json").exists());

        h.manager.shutdown().await;
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unknown_sender_leaves_no_trace() {
    timeout(TEST_TIMEOUT, async {
        let h = start_bridge(Duration::from_secs(1)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        drop_inbound(
            &h.inbox(),
            "received_1.json",
            json!({"contactNumber": "11999990001", "body": "oi"}),
        );
        let (_, report) = h.post("/inbox/poll", json!({})).await;
        assert_eq!(report["unmatched"], 1);

        let (_, clients) = h.get("/clients").await;
        assert_eq!(clients["clients"], json!([]));
        assert!(h.sent().is_empty());

        h.manager.shutdown().await;
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn auto_reply_toggle_and_reconcile() {
    timeout(TEST_TIMEOUT, async {
        let h = start_bridge(Duration::from_secs(1)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (status, body) = h.post("/auto-reply", json!({"enabled": false})).await;
        assert_eq!(status, 200);
        assert_eq!(body["enabled"], false);

        drop_inbound(
            &h.inbox(),
            "received_2.json",
            json!({"contactNumber": "+55 11 99999-0000", "body": "oi"}),
        );
        let (_, report) = h.post("/inbox/poll", json!({})).await;
        assert_eq!(report["logged"], 1);
        assert!(h.sent().is_empty());

        // Reconciliation answers regardless of the switch. Only a received
        // message is on file, so there is no stored name.
        h.post("/auto-reply", json!({"enabled": false, "message": "Obrigado!"}))
            .await;
        let (status, report) = h.post("/reconcile", json!({})).await;
        assert_eq!(status, 200);
        assert_eq!(report["replied"], 1);
        assert_eq!(
            h.sent(),
            vec![("+55 11 99999-0000".to_string(), "Obrigado!".to_string())]
        );

        h.manager.shutdown().await;
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn webhook_setup_and_delivery() {
    timeout(TEST_TIMEOUT, async {
        let h = start_bridge(Duration::from_secs(1)).await;

        let (status, body) = h.post("/webhook/setup", json!({})).await;
        assert_eq!(status, 200);
        let registered = h.bot.webhook.lock().unwrap().clone().unwrap();
        assert_eq!(registered, h.url("/webhook/whatsapp"));
        assert_eq!(body["url"], registered.as_str());

        let (status, body) = h
            .post(
                "/webhook/whatsapp",
                json!({
                    "id": "3EB0C4",
                    "from": "5521966665555@c.us",
                    "body": "Tudo certo",
                    "timestamp": 1717171717,
                    "contactName": "Eva",
                    "contactNumber": "5521966665555",
                    "isGroup": false,
                    "hasMedia": false
                }),
            )
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["sa"], "200");

        let (_, client) = h.get("/clients/200").await;
        assert_eq!(client["messages"][0]["type"], "received");
        assert_eq!(client["messages"][0]["message"], "Tudo certo");
        assert!(h.sent().is_empty());

        let (_, status) = h.get("/status").await;
        assert_eq!(status["webhook"], json!({"received": 1, "processed": 1}));

        h.manager.shutdown().await;
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unknown_task_and_idle_cancel() {
    timeout(TEST_TIMEOUT, async {
        let h = start_bridge(Duration::from_secs(1)).await;

        let (status, _) = h.get("/tasks/bulk_1_0").await;
        assert_eq!(status, 404);

        let (status, body) = h.post("/tasks/cancel", json!({})).await;
        assert_eq!(status, 409);
        assert_eq!(body["success"], false);

        let (status, _) = h.get("/clients/..%2Fescape").await;
        assert!(status == 400 || status == 404);

        h.manager.shutdown().await;
    })
    .await
    .expect("test timed out");
}

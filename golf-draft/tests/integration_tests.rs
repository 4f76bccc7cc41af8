// Integration tests for the golf draft server.
//
// These exercise the library end-to-end through its public API: CSV
// loading, the SQLite pick log, restart recovery, auto-pick timing, and
// the WebSocket request/broadcast path.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use golf_draft::app::{self, AppState};
use golf_draft::config::DataPaths;
use golf_draft::db::{Database, SqlitePickLog};
use golf_draft::draft::engine::{DraftEngine, DraftEvent, EngineSettings};
use golf_draft::draft::loader::FileDraftSource;
use golf_draft::draft::pick::UNRANKED;
use golf_draft::draft::scheduler::AutoPickDue;
use golf_draft::draft::state::{DraftError, DraftStatus};
use golf_draft::ws_server;

// ===========================================================================
// Test helpers
// ===========================================================================

/// Fixture directory path (relative to the crate root, which is the cwd for
/// `cargo test`).
const FIXTURES: &str = "tests/fixtures";

fn fixture_paths() -> DataPaths {
    DataPaths {
        participants: format!("{FIXTURES}/participants.csv"),
        golfers: format!("{FIXTURES}/golfers.csv"),
    }
}

struct Running {
    engine: DraftEngine,
    due_rx: mpsc::Receiver<AutoPickDue>,
    events: mpsc::UnboundedReceiver<DraftEvent>,
}

async fn boot(db: &Arc<Database>, draft_id: &str) -> Running {
    let log = SqlitePickLog::new(Arc::clone(db), draft_id);
    let source = FileDraftSource::new(&fixture_paths(), Some(log.clone()));
    let (due_tx, due_rx) = mpsc::channel(16);
    let (event_tx, events) = mpsc::unbounded_channel();
    let mut engine = DraftEngine::initialize(&source, Arc::new(log), EngineSettings::default(), due_tx)
        .await
        .expect("fixtures should bootstrap");
    engine.set_notifier(Arc::new(event_tx));
    Running {
        engine,
        due_rx,
        events,
    }
}

/// Wait until the detached durable writes have landed. Sleeps on the OS
/// clock so it also works while tokio time is paused.
async fn wait_for_logged(db: &Database, draft_id: &str, expected: usize) {
    for _ in 0..500 {
        if db.pick_count(draft_id).unwrap() >= expected {
            return;
        }
        tokio::task::yield_now().await;
        std::thread::sleep(Duration::from_millis(2));
    }
    panic!(
        "expected {expected} logged picks, found {}",
        db.pick_count(draft_id).unwrap()
    );
}

fn temp_db_path(name: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("golf_draft_it_{name}_{}.db", std::process::id()));
    remove_db(&path);
    path
}

fn remove_db(path: &std::path::Path) {
    let _ = std::fs::remove_file(path);
    let _ = std::fs::remove_file(format!("{}-wal", path.display()));
    let _ = std::fs::remove_file(format!("{}-shm", path.display()));
}

// ===========================================================================
// Loading
// ===========================================================================

#[tokio::test]
async fn fixtures_load_normalized_and_ranked() {
    let db = Arc::new(Database::open(":memory:").unwrap());
    let running = boot(&db, "d").await;
    let state = running.engine.state();

    // The nameless golfer row is skipped.
    assert_eq!(state.available().len(), 8);
    assert_eq!(state.top_available().unwrap().name, "Scottie Scheffler");
    assert_eq!(state.available().last().unwrap().rank, UNRANKED);

    let ann = state.participant("ann@example.com").unwrap();
    assert!(ann.is_admin);
    assert!(!state.participant("cat@example.com").unwrap().is_admin);
}

// ===========================================================================
// Full draft
// ===========================================================================

#[tokio::test]
async fn full_snake_draft_is_logged_in_order() {
    let db = Arc::new(Database::open(":memory:").unwrap());
    let mut running = boot(&db, "full").await;
    let engine = &mut running.engine;

    engine.start(Some(2)).unwrap();
    let expected_order = ["ann", "bob", "cat", "cat", "bob", "ann"];
    for who in expected_order {
        let picker = engine.current_picker().unwrap().email.clone();
        assert_eq!(picker, format!("{who}@example.com"));
        let golfer = engine.state().top_available().unwrap().name.clone();
        engine.make_pick(&picker, &golfer, false).unwrap();
    }
    assert_eq!(engine.state().status(), DraftStatus::Complete);
    assert_eq!(engine.make_pick("ann@example.com", "Cameron Smith", false), Err(DraftError::NotActive));

    wait_for_logged(&db, "full", 6).await;
    let logged = db.load_picks("full").unwrap();
    assert_eq!(logged, engine.state().picks());
    assert_eq!(logged[3].user_email, "cat@example.com");
    assert_eq!(logged[3].round, 2);

    let mut completed = 0;
    while let Ok(event) = running.events.try_recv() {
        if matches!(event, DraftEvent::Completed { .. }) {
            completed += 1;
        }
    }
    assert_eq!(completed, 1);
}

// ===========================================================================
// Restart recovery
// ===========================================================================

#[tokio::test]
async fn restart_resumes_from_logged_picks() {
    let path = temp_db_path("restart");
    let path_str = path.to_str().unwrap().to_string();

    let before = {
        let db = Arc::new(Database::open(&path_str).unwrap());
        let draft_id = db.current_or_new_draft_id().unwrap();
        let mut running = boot(&db, &draft_id).await;
        running.engine.start(Some(3)).unwrap();
        running.engine.make_pick("ann@example.com", "Jon Rahm", false).unwrap();
        running.engine.make_pick("bob@example.com", "Rory McIlroy", false).unwrap();
        running.engine.make_pick("cat@example.com", "Cameron Smith", false).unwrap();
        running.engine.make_pick("cat@example.com", "Ludvig Aberg", false).unwrap();
        wait_for_logged(&db, &draft_id, 4).await;
        running.engine.snapshot()
    };

    let db = Arc::new(Database::open(&path_str).unwrap());
    let draft_id = db.current_or_new_draft_id().unwrap();
    let mut running = boot(&db, &draft_id).await;
    assert_eq!(running.engine.state().status(), DraftStatus::Waiting);

    running.engine.start(Some(3)).unwrap();
    let after = running.engine.snapshot();
    assert_eq!(after.current_round, before.current_round);
    assert_eq!(after.current_pick_in_round, before.current_pick_in_round);
    assert_eq!(after.overall_pick, 4);
    assert_eq!(after.rosters, before.rosters);
    assert_eq!(after.available_golfers, before.available_golfers);
    assert_eq!(after.current_picker.unwrap().email, "bob@example.com");

    // Picking continues where it left off and appends after the old log.
    running.engine.make_pick("bob@example.com", "Scottie Scheffler", false).unwrap();
    wait_for_logged(&db, &draft_id, 5).await;
    assert_eq!(db.load_picks(&draft_id).unwrap()[4].pick_number, 5);

    drop(running);
    drop(db);
    remove_db(&path);
}

#[tokio::test]
async fn cleared_database_starts_a_fresh_draft() {
    let db = Arc::new(Database::open(":memory:").unwrap());
    let draft_id = db.current_or_new_draft_id().unwrap();
    {
        let mut running = boot(&db, &draft_id).await;
        running.engine.start(Some(1)).unwrap();
        running.engine.make_pick("ann@example.com", "Jon Rahm", false).unwrap();
        wait_for_logged(&db, &draft_id, 1).await;
    }

    db.clear_draft().unwrap();
    let fresh_id = db.current_or_new_draft_id().unwrap();
    let running = boot(&db, &fresh_id).await;
    assert!(running.engine.state().picks().is_empty());
    assert_eq!(running.engine.state().available().len(), 8);
}

// ===========================================================================
// Auto-pick
// ===========================================================================

#[tokio::test]
async fn auto_pick_chain_logs_every_pick_once() {
    tokio::time::pause();
    let db = Arc::new(Database::open(":memory:").unwrap());
    let mut running = boot(&db, "auto").await;
    for who in ["ann@example.com", "bob@example.com", "cat@example.com"] {
        running.engine.set_auto_pick(who, true).unwrap();
    }
    running.engine.start(Some(2)).unwrap();

    let started = tokio::time::Instant::now();
    while running.engine.auto_pick_pending() {
        let due = running.due_rx.recv().await.unwrap();
        running.engine.handle_auto_pick_due(due).unwrap();
    }
    assert!(started.elapsed() >= Duration::from_millis(6 * 2000));
    assert_eq!(running.engine.state().status(), DraftStatus::Complete);

    wait_for_logged(&db, "auto", 6).await;
    let golfers: Vec<String> = db
        .load_picks("auto")
        .unwrap()
        .into_iter()
        .map(|p| p.golfer_name)
        .collect();
    assert_eq!(
        golfers,
        [
            "Scottie Scheffler",
            "Rory McIlroy",
            "Xander Schauffele",
            "Jon Rahm",
            "Collin Morikawa",
            "Ludvig Aberg",
        ]
    );
}

// ===========================================================================
// WebSocket end-to-end
// ===========================================================================

type Client = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn send(client: &mut Client, value: Value) {
    client.send(Message::Text(value.to_string().into())).await.unwrap();
}

async fn next_of_type(client: &mut Client, wanted: &str) -> Value {
    next_matching(client, wanted, |_| true).await
}

/// Next message of type `wanted` that also satisfies `accept`. Earlier
/// messages, including other matches of `wanted`, are skipped.
async fn next_matching(
    client: &mut Client,
    wanted: &str,
    accept: impl Fn(&Value) -> bool,
) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(10), client.next())
            .await
            .expect("timed out waiting for server message")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = msg {
            let value: Value = serde_json::from_str(text.as_str()).unwrap();
            if value["type"] == wanted && accept(&value) {
                return value;
            }
        }
    }
}

#[tokio::test]
async fn websocket_clients_draft_and_see_broadcasts() {
    let db = Arc::new(Database::open(":memory:").unwrap());
    let log = SqlitePickLog::new(Arc::clone(&db), "ws");
    let source = FileDraftSource::new(&fixture_paths(), None);
    let (due_tx, due_rx) = mpsc::channel(16);
    let (draft_tx, draft_rx) = mpsc::unbounded_channel();
    let mut engine = DraftEngine::initialize(&source, Arc::new(log), EngineSettings::default(), due_tx)
        .await
        .unwrap();
    engine.set_notifier(Arc::new(draft_tx));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (ws_tx, ws_rx) = mpsc::channel(64);
    let server = tokio::spawn(ws_server::serve(listener, ws_tx));
    let app = tokio::spawn(app::run(ws_rx, due_rx, draft_rx, AppState::new(engine)));

    let url = format!("ws://{addr}");
    let (mut ann, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    let (mut bob, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();

    send(&mut ann, json!({"type": "LOGIN", "id": 1, "email": "ANN@example.com"})).await;
    let login = next_of_type(&mut ann, "REPLY").await;
    assert_eq!(login["success"], true);
    assert_eq!(login["login"]["user"]["isAdmin"], true);

    send(&mut bob, json!({"type": "LOGIN", "id": 1, "email": "bob@example.com"})).await;
    assert_eq!(next_of_type(&mut bob, "REPLY").await["success"], true);
    // Ann also hears about her own login; wait for Bob's.
    let online = next_matching(&mut ann, "USER_ONLINE", |m| {
        m["userEmail"] == "bob@example.com"
    })
    .await;
    assert_eq!(online["online"], json!(["ann@example.com", "bob@example.com"]));

    send(&mut ann, json!({"type": "START_DRAFT", "id": 2, "totalRounds": 1})).await;
    let started = next_of_type(&mut bob, "DRAFT_STARTED").await;
    assert_eq!(started["state"]["currentPicker"]["email"], "ann@example.com");

    send(&mut bob, json!({"type": "MAKE_PICK", "id": 3, "golferName": "Jon Rahm"})).await;
    let refused = next_of_type(&mut bob, "REPLY").await;
    assert_eq!(refused["id"], 3);
    assert_eq!(refused["error"], "It's not your turn");

    send(&mut ann, json!({"type": "MAKE_PICK", "id": 4, "golferName": "Jon Rahm"})).await;
    let made = next_of_type(&mut bob, "PICK_MADE").await;
    assert_eq!(made["pick"]["userEmail"], "ann@example.com");
    assert_eq!(made["state"]["currentPicker"]["email"], "bob@example.com");

    drop(bob);
    let offline = next_of_type(&mut ann, "USER_OFFLINE").await;
    assert_eq!(offline["userEmail"], "bob@example.com");

    wait_for_logged(&db, "ws", 1).await;

    server.abort();
    app.abort();
}

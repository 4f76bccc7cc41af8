// Golf draft server entry point.
//
// Startup sequence:
// 1. Initialize tracing
// 2. Load config
// 3. Open database, resolve the current draft id
// 4. Load roster, pool and pick history; build the engine
// 5. Create mpsc channels
// 6. Spawn WebSocket server task
// 7. Spawn app logic task
// 8. Wait for Ctrl+C, then clean up

use std::sync::Arc;

use golf_draft::app;
use golf_draft::config;
use golf_draft::db;
use golf_draft::draft::engine::{DraftEngine, DraftNotifier};
use golf_draft::draft::loader::FileDraftSource;
use golf_draft::ws_server;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Golf draft server starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: draft={}, default {} rounds, auto-pick delay {:?}",
        config.draft.name,
        config.draft.total_rounds,
        config.auto_pick_delay()
    );

    // 3. Open database and resolve the draft session
    let db = Arc::new(db::Database::open(&config.database.path).context("failed to open database")?);
    info!("Database opened at {}", config.database.path);
    let draft_id = db
        .current_or_new_draft_id()
        .context("failed to resolve draft id")?;
    info!("Draft session {}", draft_id);

    // 4. Build the engine, replaying any picks already logged for this draft
    let pick_log = db::SqlitePickLog::new(Arc::clone(&db), draft_id);
    let source = FileDraftSource::new(&config.data_paths, Some(pick_log.clone()));
    let (auto_tx, auto_rx) = mpsc::channel(16);
    let mut engine = DraftEngine::initialize(
        &source,
        Arc::new(pick_log),
        config.engine_settings(),
        auto_tx,
    )
    .await
    .context("failed to initialize draft")?;

    // 5. Create mpsc channels
    let (ws_tx, ws_rx) = mpsc::channel(256);
    let (draft_tx, draft_rx) = mpsc::unbounded_channel();
    let notifier: Arc<dyn DraftNotifier> = Arc::new(draft_tx);
    engine.set_notifier(notifier);
    let app_state = app::AppState::new(engine);

    // 6. Spawn WebSocket server task
    let ws_addr = config.ws_addr();
    let ws_handle = {
        let ws_addr = ws_addr.clone();
        tokio::spawn(async move {
            if let Err(e) = ws_server::run(&ws_addr, ws_tx).await {
                error!("WebSocket server error on {}: {}", ws_addr, e);
            }
        })
    };

    // 7. Spawn app logic task
    let mut app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(ws_rx, auto_rx, draft_rx, app_state).await {
            error!("Application loop error: {}", e);
        }
    });

    info!("Application ready. WebSocket server listening on {}", ws_addr);

    // 8. Run until Ctrl+C or the app loop ends on its own
    let app_finished = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Shutdown requested");
            false
        }
        _ = &mut app_handle => {
            info!("Application loop ended");
            true
        }
    };

    // Stop accepting connections, then give the app loop a moment to finish
    // before the runtime tears it down.
    ws_handle.abort();
    if !app_finished {
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), app_handle).await;
    }

    info!("Golf draft server shut down cleanly");
    Ok(())
}

/// Initialize tracing to stderr. `RUST_LOG` overrides the default filter.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("golf_draft=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}

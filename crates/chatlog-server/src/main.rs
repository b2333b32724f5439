use chatlog_server::config::Config;
use chatlog_server::state::AppState;
use chatlog_server::build_router;
use chatlog_session::{AgentOrchestrator, SessionLog, SessionProtocol};
use chatlog_store::{SqliteStore, StreamStore};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = Config::from_env()?;
    log::info!(
        "starting chatlog-server: database_url={} electric_url={:?} proxy_port={}",
        config.database_url,
        config.electric_url,
        config.proxy_port
    );
    if config.electric_url.is_some() {
        log::warn!("ELECTRIC_URL is set but this build only ships the sqlite/in-memory StreamStore; the value is ignored");
    }

    let store: Arc<dyn StreamStore> = Arc::new(SqliteStore::connect(config.database_url.clone().into()).await?);
    let session_log = Arc::new(SessionLog::new(store.clone()));
    let orchestrator = AgentOrchestrator::new(reqwest::Client::new());
    let protocol = SessionProtocol::new(session_log.clone(), orchestrator);

    let proxy_url = config
        .proxy_url
        .clone()
        .unwrap_or_else(|| format!("http://localhost:{}", config.proxy_port));

    let app_state = AppState {
        session_log,
        protocol,
        store,
        proxy_url,
    };

    let app = build_router(app_state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.proxy_port)).await?;
    log::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

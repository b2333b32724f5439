use chatlog_session::{SessionLog, SessionProtocol};
use chatlog_store::StreamStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub session_log: Arc<SessionLog>,
    pub protocol: Arc<SessionProtocol>,
    pub store: Arc<dyn StreamStore>,
    pub proxy_url: String,
}

//! Environment-sourced configuration (spec §6 "Environment and
//! configuration"). Loaded once at startup; no runtime mutation.

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Stream-store backend selector. No ElectricSQL-backed `StreamStore`
    /// ships yet, so this is surfaced in the startup log and otherwise
    /// unused; only `SqliteStore`/`InMemoryStore` are constructed today.
    pub electric_url: Option<String>,
    pub proxy_port: u16,
    pub proxy_url: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "chatlog.sqlite3".to_string());
        let electric_url = env::var("ELECTRIC_URL").ok();
        let proxy_port = env::var("PROXY_PORT")
            .ok()
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or(8787);
        let proxy_url = env::var("PROXY_URL").ok();

        Ok(Self {
            database_url,
            electric_url,
            proxy_port,
            proxy_url,
        })
    }
}

//! Registered-agent metadata (spec §3 "Agent registration", §4.4, §4.8).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerMode {
    All,
    UserMessages,
}

impl Default for TriggerMode {
    fn default() -> Self {
        TriggerMode::UserMessages
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRegistration {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub triggers: TriggerMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_template: Option<serde_json::Value>,
}

impl AgentRegistration {
    pub fn matches(&self, is_user_message: bool) -> bool {
        match self.triggers {
            TriggerMode::All => true,
            TriggerMode::UserMessages => is_user_message,
        }
    }
}

//! Domain/chunk model, session log (C2), session protocol (C4) and agent
//! orchestrator (C8).

pub mod agent;
pub mod chunk;
pub mod error;
pub mod orchestrator;
pub mod protocol;
pub mod session_log;

pub use agent::{AgentRegistration, TriggerMode};
pub use chunk::{
    ApprovalRef, Chunk, ChunkPayload, EmbeddedMessage, MessageId, MessagePart, Role, SessionId,
    ToolCallFragment, ToolCallFunction, Usage,
};
pub use error::{SessionError, SessionResult};
pub use orchestrator::AgentOrchestrator;
pub use protocol::SessionProtocol;
pub use session_log::SessionLog;

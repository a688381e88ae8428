use chrono::{DateTime, Local};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::persistence::CleanupReport;
use crate::types::{AssetSnapshot, CommandKind, CommandStage, OrderResult, QueryResult};

#[derive(Clone, Debug, Serialize)]
pub struct CommandFailure {
    pub command_id: Uuid,
    pub kind: CommandKind,
    pub target: Option<String>,
    pub stage: CommandStage,
    pub error_kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Local>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryPayload {
    Assets(AssetSnapshot),
    Page(QueryResult),
}

// Outcomes published after every command
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutorEvent {
    OrderCompleted(OrderResult),
    QueryCompleted(QueryPayload),
    CommandFailed(CommandFailure),
    CleanupFinished(CleanupReport),
}

impl ExecutorEvent {
    pub fn command_id(&self) -> Option<Uuid> {
        match self {
            ExecutorEvent::OrderCompleted(r) => Some(r.command_id),
            ExecutorEvent::QueryCompleted(QueryPayload::Assets(s)) => Some(s.command_id),
            ExecutorEvent::QueryCompleted(QueryPayload::Page(q)) => Some(q.command_id),
            ExecutorEvent::CommandFailed(f) => Some(f.command_id),
            ExecutorEvent::CleanupFinished(_) => None,
        }
    }
}

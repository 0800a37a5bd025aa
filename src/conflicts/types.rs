use serde::{Deserialize, Serialize};

use crate::wire::message::Command;

/// A write that could not be confirmed as applied on every peer.
///
/// `id` is globally unique (a random token from the raising node), `node_name`
/// never changes after creation, and only the owning node flips `resolved`
/// from false to true, never back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub id: String,
    /// Display name of the node that raised the conflict.
    pub node_name: String,
    /// The original failed operation, replayed verbatim on resolution.
    pub command: Box<Command>,
    pub resolved: bool,
}

impl ConflictRecord {
    pub fn raise(node_name: &str, command: Command) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            node_name: node_name.to_string(),
            command: Box::new(command),
            resolved: false,
        }
    }
}

//! Wire Protocol
//!
//! Defines the internal command set, the response envelope and the framing
//! used on the node-to-node channel.
//!
//! Documents and queries travel as JSON strings inside bincode frames, so the
//! frame encoding never has to deal with self-describing values.

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::conflicts::types::ConflictRecord;

// --- Status Codes ---

pub const STATUS_OK: u16 = 200;
pub const STATUS_CREATED: u16 = 201;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_LOCKED: u16 = 409;
pub const STATUS_SERVER_ERROR: u16 = 500;
pub const STATUS_UNREACHABLE: u16 = 503;

/// Frames larger than this are treated as a protocol error.
const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

/// The closed set of internal commands.
///
/// Every message between nodes is one of these variants; the dispatcher in
/// `wire::server` matches exhaustively, so adding a command is a compile-time
/// checklist rather than a runtime string lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    /// Membership exchange: carries the sender's member list, answered with
    /// the receiver's (merged) list. Drives the join protocol.
    Info { nodes: Vec<SocketAddr> },

    Get {
        collection_id: String,
        resource_id: Option<String>,
        query_json: Option<String>,
    },
    Post {
        collection_id: String,
        /// Pre-generated by the fan-out caller so every node stores the same id.
        resource_id: String,
        document_json: String,
    },
    Put {
        collection_id: String,
        resource_id: Option<String>,
        query_json: Option<String>,
        document_json: String,
        lock_id: Option<String>,
        wait_for_unlock: bool,
    },
    /// Merge-update: fields of the patch document overwrite the stored
    /// document's top-level fields.
    Patch {
        collection_id: String,
        resource_id: Option<String>,
        query_json: Option<String>,
        document_json: String,
        lock_id: Option<String>,
        wait_for_unlock: bool,
    },
    Delete {
        collection_id: String,
        resource_id: Option<String>,
        query_json: Option<String>,
        lock_id: Option<String>,
        wait_for_unlock: bool,
    },

    ConflictRaise { conflict: ConflictRecord },
    ConflictResolve { conflict: ConflictRecord },
    ConflictCleanup { conflict: ConflictRecord },
    /// With a resource id: fetch one record. Without: fetch the full registry.
    ConflictGet { resource_id: Option<String> },

    Lock { id: String, keys: Vec<String> },
    Unlock { id: String },

    NotifyOn { path: String },
    NotifyOff { path: String },
    /// Delivery of a triggered notification path to every node's local
    /// subscribers.
    Notify { path: String },
}

impl Command {
    /// Short method tag used in logs and notification paths.
    pub fn method(&self) -> &'static str {
        match self {
            Command::Info { .. } => "INFO",
            Command::Get { .. } => "GET",
            Command::Post { .. } => "POST",
            Command::Put { .. } => "PUT",
            Command::Patch { .. } => "PATCH",
            Command::Delete { .. } => "DELETE",
            Command::ConflictRaise { .. } => "CONFLICT_RAISE",
            Command::ConflictResolve { .. } => "CONFLICT_RESOLVE",
            Command::ConflictCleanup { .. } => "CONFLICT_CLEANUP",
            Command::ConflictGet { .. } => "CONFLICT_GET",
            Command::Lock { .. } => "LOCK",
            Command::Unlock { .. } => "UNLOCK",
            Command::NotifyOn { .. } => "NOTIFY_ON",
            Command::NotifyOff { .. } => "NOTIFY_OFF",
            Command::Notify { .. } => "NOTIFY",
        }
    }
}

/// A stored document as it travels over the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    /// The document body, serialized as a JSON string.
    pub data_json: String,
}

/// Typed payload of a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponseBody {
    None,
    Error(String),
    /// Answer to `Info`: the responder's merged member list plus its
    /// advertised identity.
    ClusterInfo {
        nodes: Vec<SocketAddr>,
        name: String,
        version: String,
    },
    Document(Document),
    Documents(Vec<Document>),
    Changes(u64),
    Conflict(ConflictRecord),
    Conflicts(Vec<ConflictRecord>),
    LockGranted(String),
}

/// Response envelope: numeric status plus a typed body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub body: ResponseBody,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            status: STATUS_OK,
            body: ResponseBody::None,
        }
    }

    pub fn ok_with(body: ResponseBody) -> Self {
        Self {
            status: STATUS_OK,
            body,
        }
    }

    pub fn created(body: ResponseBody) -> Self {
        Self {
            status: STATUS_CREATED,
            body,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: ResponseBody::None,
        }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ResponseBody::Error(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_OK || self.status == STATUS_CREATED
    }
}

// --- Framing ---

/// A request as framed on the wire. The id correlates the eventual response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: u64,
    pub command: Command,
}

/// A response as framed on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: u64,
    pub response: Response,
}

/// Writes a length-prefixed bincode frame.
pub async fn write_frame<T, W>(writer: &mut W, value: &T) -> Result<()>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let encoded = bincode::serialize(value)?;
    let len = u32::try_from(encoded.len())?;
    if len > MAX_FRAME_BYTES {
        return Err(anyhow::anyhow!("frame too large: {} bytes", len));
    }
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads a length-prefixed bincode frame.
pub async fn read_frame<T, R>(reader: &mut R) -> Result<T>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(anyhow::anyhow!("frame too large: {} bytes", len));
    }

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(bincode::deserialize(&buf)?)
}

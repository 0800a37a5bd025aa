//! Internal Wire Channel
//!
//! Everything node-to-node rides a single framed, persistent TCP channel:
//! a 4-byte big-endian length prefix followed by a bincode-encoded frame.
//!
//! ## Core Pieces
//! - **`message`**: The closed command set, responses and status codes. Commands
//!   are a tagged enum so dispatch is an exhaustive match, checked at compile time.
//! - **`session`**: The client half. One persistent connection per peer with
//!   request-id correlation, so many asks can be in flight concurrently.
//! - **`server`**: The accepting half plus the command dispatcher. A handler
//!   failure becomes an error-status response, never a crashed node.

pub mod message;
pub mod server;
pub mod session;

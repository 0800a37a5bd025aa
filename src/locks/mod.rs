//! Distributed Lock Module
//!
//! Exclusive holds over named resource keys (typically collection names).
//! The table itself is per-node; acquisition and release are broadcast to
//! every node, so each node's gate check sees the same state. The guarantee
//! is cooperative: it holds because every write path performs the gate check
//! before mutating, not because a single arbiter enforces it.
//!
//! Held locks have no automatic expiry. A holder that crashes without
//! unlocking wedges its keys until an operator releases them.

pub mod table;

#[cfg(test)]
mod tests;

//! Local Storage Module
//!
//! The per-node document store behind the internal GET/POST/PUT/DELETE
//! commands. Collections are created on first write; documents are JSON
//! bodies keyed by id, with a small filter language (field equality plus
//! `$and`) for multi-document operations.
//!
//! This layer is deliberately mechanical: all coordination (fan-out, locks,
//! conflicts) happens above it.

pub mod query;
pub mod store;

//! Health & Quorum Module
//!
//! A periodic monitor that derives this node's status each tick: a node with
//! its own unconfirmed writes can never certify itself healthy, and a node
//! that can reach half the cluster or less presumes a partition and marks
//! itself unhealthy. The external API layer uses the status to refuse
//! writes while the internal protocol traffic keeps flowing and heals the
//! partition.

pub mod monitor;

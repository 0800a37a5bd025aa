//! Notification Bookkeeping Module
//!
//! Tracks which notification paths clients somewhere in the cluster are
//! subscribed to. A node fans out `NotifyOn` when its first local subscriber
//! for a path appears and `NotifyOff` when the last one leaves; writes then
//! fan out a `Notify` for watched paths, and each node delivers the event to
//! its own WebSocket subscribers.

pub mod registry;

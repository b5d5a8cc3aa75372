//! Inbox Triage — rule-then-model priority classification for a mailbox.

pub mod channels;
pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod pipeline;

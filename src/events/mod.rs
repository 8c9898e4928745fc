//! # Federation Events
//!
//! In-process broadcast of observability events such as circuit transitions,
//! exhausted failovers, node status changes, and rolled-back transactions.
//! Event names live in `crate::constants::events`.

pub mod publisher;

pub use publisher::{EventPublisher, PublishError, PublishedEvent};

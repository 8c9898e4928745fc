//! # Web API Request Handlers
//!
//! Handlers for the node API, grouped by functional area.

pub mod health;
pub mod nodes;
pub mod operations;

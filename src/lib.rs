//! DM Autopilot: webhook-driven auto-replies for direct messages.

pub mod admin;
pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod store;
pub mod webhook;
pub mod worker;

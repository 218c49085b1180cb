//! Smart Mail — ranks a Microsoft 365 inbox by priority.

pub mod api;
pub mod config;
pub mod error;
pub mod identity;
pub mod llm;
pub mod mail;
pub mod pipeline;
pub mod preferences;
pub mod store;

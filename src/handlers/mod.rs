//! handlers/mod.rs
pub mod admin_handler;
pub mod email_handler;

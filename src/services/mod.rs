//! services/mod.rs
//! Módulo que agrupa distintos "servicios" o "capas de negocio" de la app.

pub mod attachment_storage;
pub mod dispatch_pool;
pub mod email_service;
pub mod email_store;
pub mod transport;

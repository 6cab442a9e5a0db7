//! config/mod.rs
//! Configuración del servicio (SMTP, almacenamiento, pool de envío).

pub mod mail_config;

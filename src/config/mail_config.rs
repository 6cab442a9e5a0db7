//! config/mail_config.rs
//! Configuración explícita del transporte SMTP y del despachador.
//! Se construye una vez en `main` (o en los tests) y se pasa al `EmailDispatcher`.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    #[serde(skip_serializing)]
    pub smtp_password: Option<String>,
    /// STARTTLS cuando es `true`, texto plano en caso contrario.
    pub use_tls: bool,
    pub default_from_email: String,
    /// Raíz de archivos subidos (los adjuntos van en `emails/attachments`).
    pub upload_dir: PathBuf,
    /// Envíos simultáneos como máximo.
    pub workers: usize,
    /// Envíos en cola antes de rechazar.
    pub queue_capacity: usize,
    pub send_timeout_secs: u64,
    pub database_url: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        MailConfig {
            smtp_host: "localhost".to_string(),
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            use_tls: true,
            default_from_email: "no-reply@localhost".to_string(),
            upload_dir: PathBuf::from("mediafiles"),
            workers: 4,
            queue_capacity: 100,
            send_timeout_secs: 30,
            database_url: "sqlite:data/emails.db".to_string(),
        }
    }
}

impl MailConfig {
    /// Lee la configuración desde variables de entorno (después de `dotenv`).
    pub fn from_env() -> Result<Self> {
        let defaults = MailConfig::default();

        let smtp_host = env::var("EMAIL_HOST").context("EMAIL_HOST no está definido")?;
        let default_from_email =
            env::var("DEFAULT_FROM_EMAIL").context("DEFAULT_FROM_EMAIL no está definido")?;

        Ok(MailConfig {
            smtp_host,
            smtp_port: parse_var("EMAIL_PORT", defaults.smtp_port)?,
            smtp_username: optional_var("EMAIL_HOST_USER"),
            smtp_password: optional_var("EMAIL_HOST_PASSWORD"),
            use_tls: parse_bool_var("EMAIL_USE_TLS", defaults.use_tls)?,
            default_from_email,
            upload_dir: optional_var("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            workers: parse_var("EMAIL_WORKERS", defaults.workers)?,
            queue_capacity: parse_var("EMAIL_QUEUE_CAPACITY", defaults.queue_capacity)?,
            send_timeout_secs: parse_var("EMAIL_SEND_TIMEOUT_SECS", defaults.send_timeout_secs)?,
            database_url: optional_var("DATABASE_URL").unwrap_or(defaults.database_url),
        })
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    /// Directorio donde se guardan los adjuntos de los correos.
    pub fn attachments_dir(&self) -> PathBuf {
        self.upload_dir.join("emails").join("attachments")
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("Valor inválido para {key}={raw}: {e}")),
        None => Ok(default),
    }
}

fn parse_bool_var(key: &str, default: bool) -> Result<bool> {
    match optional_var(key) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(anyhow!("Valor booleano inválido para {key}={other}")),
        },
        None => Ok(default),
    }
}

use std::str::FromStr;

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use dotenv::dotenv;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::config::mail_config::MailConfig;
use crate::logger::init_logger;
use crate::services::email_service::EmailDispatcher;
use crate::services::email_store::EmailStore;
use crate::services::transport::SmtpTransport;

mod app;
mod config;
mod error;
mod handlers;
mod logger;
mod models;
mod services;

#[cfg(test)]
mod tests;

async fn setup_database(database_url: &str) -> Result<Pool<Sqlite>> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("DATABASE_URL inválido: {database_url}"))?
        .create_if_missing(true)
        .foreign_keys(true);

    // Crear la carpeta del archivo (p. ej. ./data) si hace falta
    let filename = options.clone().get_filename();
    if let Some(parent) = filename.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("No se pudo crear {}", parent.display()))?;
        }
    }

    log::info!("Conectando a SQLite en {}", database_url);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("No se pudo conectar a la base de datos SQLite.")
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv().ok(); // Cargar .env al inicio
    init_logger();

    let config = MailConfig::from_env()?;

    let db_pool = setup_database(&config.database_url).await?;

    let store = EmailStore::new(db_pool.clone());
    store
        .run_migrations()
        .await
        .context("Fallo en migraciones de 'emails'")?;

    let transport = SmtpTransport::from_config(&config)?;
    let dispatcher = EmailDispatcher::new(store, &config, transport);

    log::info!(
        "SMTP {}:{} (tls={}), adjuntos en {}",
        config.smtp_host,
        config.smtp_port,
        config.use_tls,
        config.attachments_dir().display()
    );

    log::info!("Levantando servidor en 0.0.0.0:5022");
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(dispatcher.clone()))
            .app_data(web::JsonConfig::default().limit(25 * 1024 * 1024))
            .configure(app::init_app::<SmtpTransport>)
    })
    .bind(("0.0.0.0", 5022))?
    .run()
    .await?;

    Ok(())
}

//! error.rs
//! Errores que el despachador devuelve a quien lo llama.
//! Los fallos de transporte no aparecen aquí: quedan en la columna `log`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid email request: {0}")]
    InvalidRequest(String),

    #[error("dispatch queue is full, email {email_id} was not queued")]
    QueueFull { email_id: i64 },

    #[error("email {email_id} is still being sent")]
    InProgress { email_id: i64 },

    #[error("dispatch pool is closed")]
    PoolClosed,

    #[error("email {email_id} could not be delivered: {diagnostic}")]
    Delivery { email_id: i64, diagnostic: String },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

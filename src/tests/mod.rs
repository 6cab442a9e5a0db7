//! tests/mod.rs
//! Utilidades compartidas por las pruebas: SQLite en memoria y un transporte falso.


use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lettre::Message;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::Semaphore;

use crate::config::mail_config::MailConfig;
use crate::models::email_model::{email_status, EmailRecord, SendEmailRequest};
use crate::services::email_service::EmailDispatcher;
use crate::services::email_store::EmailStore;
use crate::services::transport::MailTransport;

#[derive(Default)]
struct FakeState {
    failure: Mutex<Option<String>>,
    sent: Mutex<Vec<String>>,
    attempts: AtomicUsize,
    gate: Option<Semaphore>,
}

/// Transporte en memoria: guarda los mensajes o falla con el texto configurado.
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<FakeState>,
}

impl FakeTransport {
    pub fn working() -> Self {
        FakeTransport::default()
    }

    pub fn failing(error: &str) -> Self {
        let transport = FakeTransport::default();
        transport.fail_with(Some(error));
        transport
    }

    /// Cada envío espera un permiso de `release`.
    pub fn gated() -> Self {
        FakeTransport {
            state: Arc::new(FakeState {
                gate: Some(Semaphore::new(0)),
                ..Default::default()
            }),
        }
    }

    pub fn fail_with(&self, error: Option<&str>) {
        *self.state.failure.lock().unwrap() = error.map(str::to_string);
    }

    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.state.gate {
            gate.add_permits(n);
        }
    }

    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<String> {
        self.state.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for FakeTransport {
    async fn deliver(&self, message: Message) -> Result<()> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.state.gate {
            gate.acquire().await?.forget();
        }

        let failure = self.state.failure.lock().unwrap().clone();
        if let Some(error) = failure {
            return Err(anyhow!(error));
        }

        let raw = String::from_utf8_lossy(&message.formatted()).to_string();
        self.state.sent.lock().unwrap().push(raw);
        Ok(())
    }
}

/// Una sola conexión que nunca se recicla: cada conexión a `:memory:` es otra base.
pub async fn memory_store() -> EmailStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    let store = EmailStore::new(pool);
    store.run_migrations().await.expect("migrations");
    store
}

pub fn test_config(upload_dir: &std::path::Path) -> MailConfig {
    MailConfig {
        default_from_email: "noreply@example.com".to_string(),
        upload_dir: upload_dir.to_path_buf(),
        workers: 4,
        queue_capacity: 16,
        send_timeout_secs: 5,
        database_url: "sqlite::memory:".to_string(),
        ..MailConfig::default()
    }
}

pub struct Harness {
    pub dispatcher: EmailDispatcher<FakeTransport>,
    pub transport: FakeTransport,
    pub store: EmailStore,
    pub upload_dir: tempfile::TempDir,
}

pub async fn harness_with(transport: FakeTransport, tweak: impl FnOnce(&mut MailConfig)) -> Harness {
    let upload_dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(upload_dir.path());
    tweak(&mut config);

    let store = memory_store().await;
    let dispatcher = EmailDispatcher::new(store.clone(), &config, transport.clone());

    Harness {
        dispatcher,
        transport,
        store,
        upload_dir,
    }
}

pub async fn harness(transport: FakeTransport) -> Harness {
    harness_with(transport, |_| {}).await
}

pub fn welcome_request() -> SendEmailRequest {
    SendEmailRequest {
        subject: "Welcome".to_string(),
        message: "<p>Hi</p>".to_string(),
        html_message: Some("<p>Hi</p>".to_string()),
        from_email: Some("a@x.com".to_string()),
        recipient_list: vec!["b@y.com".to_string()],
        cc: None,
        attachments: None,
        fail_silently: true,
        async_send: true,
    }
}

/// Espera a que el correo deje de estar "pending".
pub async fn wait_for_outcome(store: &EmailStore, email_id: i64) -> EmailRecord {
    for _ in 0..400 {
        let record = store.get_email(email_id).await.expect("email exists");
        if record.status.as_deref() != Some(email_status::PENDING) {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("email {email_id} still pending");
}

//! services/email_service.rs
//! Despachador de correos: registra el correo, lo envía fuera del request
//! y deja el resultado en el mismo registro.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::Mailbox;

use crate::{
    config::mail_config::MailConfig,
    error::DispatchError,
    models::email_model::{
        DispatchOutcome, DispatchReceipt, EmailStatusResponse, NewEmail, SendEmailRequest,
    },
    services::{
        attachment_storage::{AttachmentStorage, StoredFile},
        dispatch_pool::{DispatchJob, DispatchPool, JobRunner},
        email_store::EmailStore,
        transport::{build_message, MailTransport, SmtpTransport},
    },
};

/// Hace un intento de envío sobre un correo ya persistido y guarda el resultado.
pub struct Deliverer<T: MailTransport> {
    store: EmailStore,
    storage: AttachmentStorage,
    transport: T,
    send_timeout: Duration,
}

impl<T: MailTransport> Deliverer<T> {
    /// Sólo los errores de la base de datos al guardar el resultado salen de aquí.
    pub async fn deliver(&self, email_id: i64, fail_silently: bool) -> Result<DispatchOutcome> {
        let outcome = match self.attempt(email_id).await {
            Ok(()) => DispatchOutcome::Sent,
            Err(e) => DispatchOutcome::Failed {
                diagnostic: format!("{e:?}"),
            },
        };

        self.store.record_outcome(email_id, &outcome).await?;

        match &outcome {
            DispatchOutcome::Sent => log::info!("Email {} sent successfully", email_id),
            DispatchOutcome::Failed { diagnostic } if fail_silently => {
                log::warn!("Email {} not sent: {}", email_id, diagnostic)
            }
            DispatchOutcome::Failed { diagnostic } => {
                log::error!("Failed email {}: {}", email_id, diagnostic)
            }
        }

        Ok(outcome)
    }

    async fn attempt(&self, email_id: i64) -> Result<()> {
        let record = self.store.get_email(email_id).await?;

        let mut files = Vec::new();
        for attachment in self.store.attachments_for(email_id).await? {
            let Some(path) = attachment.file else {
                continue;
            };
            let mut file = StoredFile::from_path(path);
            if let Some(content_type) = attachment.content_type {
                file.content_type = content_type;
            }
            let data = self.storage.read(&file).await?;
            files.push((file, data));
        }

        let message = build_message(&record, &files)?;

        tokio::time::timeout(self.send_timeout, self.transport.deliver(message))
            .await
            .with_context(|| format!("Email send timed out after {:?}", self.send_timeout))??;

        Ok(())
    }
}

#[async_trait]
impl<T: MailTransport> JobRunner for Deliverer<T> {
    async fn run(&self, job: DispatchJob) {
        if let Err(e) = self.deliver(job.email_id, job.fail_silently).await {
            log::error!(
                "Could not record outcome for email {}: {:?}",
                job.email_id,
                e
            );
        }
    }
}

pub struct EmailDispatcher<T: MailTransport = SmtpTransport> {
    store: EmailStore,
    storage: AttachmentStorage,
    deliverer: Arc<Deliverer<T>>,
    pool: DispatchPool,
    default_from_email: String,
}

impl<T: MailTransport> Clone for EmailDispatcher<T> {
    fn clone(&self) -> Self {
        EmailDispatcher {
            store: self.store.clone(),
            storage: self.storage.clone(),
            deliverer: self.deliverer.clone(),
            pool: self.pool.clone(),
            default_from_email: self.default_from_email.clone(),
        }
    }
}

impl<T: MailTransport> EmailDispatcher<T> {
    /// Arranca el pool de envíos; hay que llamarlo dentro de un runtime de tokio.
    pub fn new(store: EmailStore, config: &MailConfig, transport: T) -> Self {
        let storage = AttachmentStorage::new(config.attachments_dir());
        let deliverer = Arc::new(Deliverer {
            store: store.clone(),
            storage: storage.clone(),
            transport,
            send_timeout: config.send_timeout(),
        });
        let pool = DispatchPool::start(deliverer.clone(), config.workers, config.queue_capacity);

        EmailDispatcher {
            store,
            storage,
            deliverer,
            pool,
            default_from_email: config.default_from_email.clone(),
        }
    }

    pub fn store(&self) -> &EmailStore {
        &self.store
    }

    /// Registra el correo y sus adjuntos antes de cualquier envío; luego lo
    /// encola (`async_send`) o lo envía en el momento.
    pub async fn dispatch(&self, req: SendEmailRequest) -> Result<DispatchReceipt, DispatchError> {
        let from_email = req
            .from_email
            .clone()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| self.default_from_email.clone());
        validate_addresses(&from_email, &req.recipient_list, req.cc.as_deref())?;

        let files = self
            .storage
            .store_all(req.attachments.as_deref().unwrap_or_default())
            .await?;

        let new_email = NewEmail {
            subject: Some(req.subject),
            body: Some(req.message),
            html_body: req.html_message,
            recipients: req.recipient_list,
            from_email,
            cc: req.cc,
        };
        let record = match self.store.create_email(&new_email, &files).await {
            Ok(record) => record,
            Err(e) => {
                self.storage.remove_all(&files).await;
                return Err(e.into());
            }
        };
        log::info!(
            "Email {} registered ({} recipients, {} attachments)",
            record.id,
            record.recipients.len(),
            files.len()
        );

        self.schedule(record.id, req.fail_silently, req.async_send)
            .await
    }

    /// Reenvía un correo existente con sus propios datos, sin crear otro registro.
    pub async fn resend(
        &self,
        email_id: i64,
        fail_silently: bool,
        async_send: bool,
    ) -> Result<DispatchReceipt, DispatchError> {
        let Some(record) = self.store.reset_for_resend(email_id).await? else {
            return Err(DispatchError::InProgress { email_id });
        };
        log::info!("Resending email {}", record.id);
        self.schedule(record.id, fail_silently, async_send).await
    }

    pub async fn get_status(&self, email_id: i64) -> Result<EmailStatusResponse> {
        let record = self.store.get_email(email_id).await?;
        Ok(EmailStatusResponse::from(&record))
    }

    async fn schedule(
        &self,
        email_id: i64,
        fail_silently: bool,
        async_send: bool,
    ) -> Result<DispatchReceipt, DispatchError> {
        if async_send {
            let job = DispatchJob {
                email_id,
                fail_silently,
            };
            if let Err(e) = self.pool.submit(job) {
                log::warn!("Email {} rejected: {}", email_id, e);
                if let Err(mark_err) = self.store.mark_rejected(email_id, &e.to_string()).await {
                    log::error!(
                        "Could not mark email {} as rejected: {:?}",
                        email_id,
                        mark_err
                    );
                }
                return Err(e);
            }
            return Ok(DispatchReceipt {
                email_id,
                outcome: None,
            });
        }

        let outcome = self.deliverer.deliver(email_id, fail_silently).await?;
        match outcome {
            DispatchOutcome::Failed { diagnostic } if !fail_silently => {
                Err(DispatchError::Delivery {
                    email_id,
                    diagnostic,
                })
            }
            outcome => Ok(DispatchReceipt {
                email_id,
                outcome: Some(outcome),
            }),
        }
    }
}

fn validate_addresses(
    from_email: &str,
    recipients: &[String],
    cc: Option<&[String]>,
) -> Result<(), DispatchError> {
    if recipients.is_empty() {
        return Err(DispatchError::InvalidRequest(
            "recipient_list must not be empty".to_string(),
        ));
    }

    let all = std::iter::once(from_email)
        .chain(recipients.iter().map(String::as_str))
        .chain(cc.unwrap_or_default().iter().map(String::as_str));
    for address in all {
        address
            .trim()
            .parse::<Mailbox>()
            .map_err(|e| DispatchError::InvalidRequest(format!("{address}: {e}")))?;
    }
    Ok(())
}

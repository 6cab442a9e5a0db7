//! services/transport.rs
//! Transporte de salida (SMTP vía lettre) y construcción del mensaje MIME.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::mail_config::MailConfig;
use crate::models::email_model::EmailRecord;
use crate::services::attachment_storage::StoredFile;

/// Envía un mensaje ya construido. Implementado por SMTP y por los dobles de test.
#[async_trait]
pub trait MailTransport: Send + Sync + 'static {
    async fn deliver(&self, message: Message) -> Result<()>;
}

#[derive(Clone)]
pub struct SmtpTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    /// Arma la conexión con host, puerto, credenciales y TLS de la configuración.
    pub fn from_config(config: &MailConfig) -> Result<Self> {
        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                .with_context(|| format!("Invalid SMTP relay {}", config.smtp_host))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };

        builder = builder
            .port(config.smtp_port)
            .timeout(Some(config.send_timeout()));

        if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(SmtpTransport {
            mailer: builder.build(),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn deliver(&self, message: Message) -> Result<()> {
        let response = self
            .mailer
            .send(message)
            .await
            .context("SMTP send failed")?;
        log::debug!("SMTP response code={}", response.code());
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .trim()
        .parse::<Mailbox>()
        .with_context(|| format!("Invalid email address: {address}"))
}

/// Construye el correo: texto plano + alternativa HTML y los adjuntos.
pub fn build_message(record: &EmailRecord, files: &[(StoredFile, Vec<u8>)]) -> Result<Message> {
    let from = record
        .from_email
        .as_deref()
        .ok_or_else(|| anyhow!("Email {} has no sender", record.id))?;

    let mut builder = Message::builder()
        .from(parse_mailbox(from)?)
        .subject(record.subject.clone().unwrap_or_default());

    if record.recipients.is_empty() {
        return Err(anyhow!("Email {} has no recipients", record.id));
    }
    for to in &record.recipients {
        builder = builder.to(parse_mailbox(to)?);
    }
    for cc in record.cc.iter().flatten() {
        builder = builder.cc(parse_mailbox(cc)?);
    }

    let plain = record.body.clone().unwrap_or_default();
    let message = match (record.html_body.clone(), files.is_empty()) {
        (Some(html), true) => builder.multipart(MultiPart::alternative_plain_html(plain, html)),
        (None, true) => builder.singlepart(SinglePart::plain(plain)),
        (html, false) => {
            let mut mixed = match html {
                Some(html) => MultiPart::mixed().multipart(MultiPart::alternative_plain_html(plain, html)),
                None => MultiPart::mixed().singlepart(SinglePart::plain(plain)),
            };
            for (file, data) in files {
                let content_type = ContentType::parse(&file.content_type)
                    .with_context(|| format!("Invalid content type {}", file.content_type))?;
                mixed = mixed.singlepart(
                    Attachment::new(file.filename.clone()).body(data.clone(), content_type),
                );
            }
            builder.multipart(mixed)
        }
    };

    message.context("Failed to build email message")
}

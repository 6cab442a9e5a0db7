use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Valores de la columna `status` de `emails`.
pub mod email_status {
    pub const PENDING: &str = "pending";
    pub const SENT: &str = "sent";
    pub const FAILED: &str = "failed";
    pub const REJECTED: &str = "rejected";
}

/// Correo registrado por el sistema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailRecord {
    pub id: i64,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub html_body: Option<String>,
    pub recipients: Vec<String>,
    pub from_email: Option<String>,
    pub cc: Option<Vec<String>>,
    pub send_time: Option<DateTime<Utc>>,
    pub is_sent: bool,
    pub status: Option<String>, // "pending", "sent", "failed", "rejected"
    pub log: Option<String>,    // diagnóstico del fallo
    pub created_at: DateTime<Utc>,
}

/// Archivo guardado en disco y referenciado por ruta.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttachmentRecord {
    pub id: i64,
    pub file: Option<String>,
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub email_ids: Vec<i64>,
}

/// Datos de un correo nuevo, antes de persistirlo.
#[derive(Debug, Clone)]
pub struct NewEmail {
    pub subject: Option<String>,
    pub body: Option<String>,
    pub html_body: Option<String>,
    pub recipients: Vec<String>,
    pub from_email: String,
    pub cc: Option<Vec<String>>,
}

/// Adjunto recibido en memoria (JSON con los bytes en base64).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailAttachment {
    pub filename: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(
        serialize_with = "serialize_base64",
        deserialize_with = "deserialize_base64"
    )]
    pub data: Vec<u8>,
}

fn serialize_base64<S>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&base64::encode(data))
}

fn deserialize_base64<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    base64::decode(&s).map_err(serde::de::Error::custom)
}

fn default_true() -> bool {
    true
}

/// Parámetros de un envío. El asunto y el HTML llegan ya renderizados.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEmailRequest {
    pub subject: String,
    pub message: String,
    #[serde(default)]
    pub html_message: Option<String>,
    #[serde(default)]
    pub from_email: Option<String>,
    pub recipient_list: Vec<String>,
    #[serde(default)]
    pub cc: Option<Vec<String>>,
    #[serde(default)]
    pub attachments: Option<Vec<EmailAttachment>>,
    #[serde(default = "default_true")]
    pub fail_silently: bool,
    #[serde(default = "default_true")]
    pub async_send: bool,
}

/// Resultado explícito de un intento de envío.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Sent,
    Failed { diagnostic: String },
}

/// Lo que recibe quien llama a `dispatch`.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReceipt {
    pub email_id: i64,
    /// `None` mientras el envío siga en cola.
    pub outcome: Option<DispatchOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailStatusResponse {
    pub id: i64,
    pub status: Option<String>,
    pub is_sent: bool,
    pub send_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl From<&EmailRecord> for EmailStatusResponse {
    fn from(record: &EmailRecord) -> Self {
        EmailStatusResponse {
            id: record.id,
            status: record.status.clone(),
            is_sent: record.is_sent,
            send_time: record.send_time,
            error: record.log.clone(),
        }
    }
}

/// Fila del listado de administración.
#[derive(Debug, Clone, Serialize)]
pub struct EmailListItem {
    pub id: i64,
    pub subject: Option<String>,
    pub recipients: Vec<String>,
    pub send_time: Option<DateTime<Utc>>,
    pub is_sent: bool,
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<EmailRecord> for EmailListItem {
    fn from(record: EmailRecord) -> Self {
        EmailListItem {
            id: record.id,
            subject: record.subject,
            recipients: record.recipients,
            send_time: record.send_time,
            is_sent: record.is_sent,
            status: record.status,
            created_at: record.created_at,
        }
    }
}

/// Para listar correos con paginación
#[derive(Debug, Clone, Serialize)]
pub struct ListEmailsResponse {
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub items: Vec<EmailListItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListAttachmentsResponse {
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub items: Vec<AttachmentRecord>,
}

/// Detalle de un correo con sus adjuntos.
#[derive(Debug, Clone, Serialize)]
pub struct EmailDetailResponse {
    #[serde(flatten)]
    pub email: EmailRecord,
    pub attachments: Vec<AttachmentRecord>,
}

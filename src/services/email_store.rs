//! services/email_store.rs
//! Persistencia de `emails`, `attachments` y la tabla puente `email_attachments`.
//! Sólo el despachador escribe; el resto del servicio únicamente lee.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};

use crate::models::email_model::{
    email_status, AttachmentRecord, DispatchOutcome, EmailRecord, NewEmail,
};
use crate::services::attachment_storage::StoredFile;

#[derive(sqlx::FromRow)]
struct EmailRow {
    id: i64,
    subject: Option<String>,
    body: Option<String>,
    html_body: Option<String>,
    recipients: Option<String>,
    from_email: Option<String>,
    cc: Option<String>,
    send_time: Option<String>,
    is_sent: bool,
    status: Option<String>,
    log: Option<String>,
    created_at: String,
}

impl TryFrom<EmailRow> for EmailRecord {
    type Error = anyhow::Error;

    fn try_from(row: EmailRow) -> Result<Self> {
        let recipients = match row.recipients.as_deref() {
            Some(raw) => serde_json::from_str(raw).context("recipients no es un arreglo JSON")?,
            None => Vec::new(),
        };
        let cc = row
            .cc
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .context("cc no es un arreglo JSON")?;

        Ok(EmailRecord {
            id: row.id,
            subject: row.subject,
            body: row.body,
            html_body: row.html_body,
            recipients,
            from_email: row.from_email,
            cc,
            send_time: row.send_time.as_deref().map(parse_timestamp).transpose()?,
            is_sent: row.is_sent,
            status: row.status,
            log: row.log,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AttachmentRow {
    id: i64,
    file: Option<String>,
    content_type: Option<String>,
    email_ids: Option<String>,
}

impl From<AttachmentRow> for AttachmentRecord {
    fn from(row: AttachmentRow) -> Self {
        let email_ids = row
            .email_ids
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .filter_map(|id| id.trim().parse().ok())
            .collect();

        AttachmentRecord {
            id: row.id,
            file: row.file,
            content_type: row.content_type,
            email_ids,
        }
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Fecha inválida en DB: {raw}"))
}

fn page_bounds(page: u64, page_size: u64) -> (u64, u64, i64, i64) {
    let page = page.max(1);
    let page_size = page_size.clamp(1, 500);
    let offset = (page - 1).saturating_mul(page_size).min(i64::MAX as u64);
    (page, page_size, page_size as i64, offset as i64)
}

// `%`, `_` y `\` se buscan literalmente (ESCAPE '\').
fn like_pattern(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len() + 2);
    escaped.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

const EMAIL_COLUMNS: &str = r#"
    id, subject, body, html_body, recipients, from_email, cc,
    send_time, is_sent, status, log, created_at
"#;

#[derive(Debug, Clone)]
pub struct EmailStore {
    db_pool: Pool<Sqlite>,
}

impl EmailStore {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        EmailStore { db_pool }
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.db_pool
    }

    /// Ejecuta migraciones de la base de datos (emails)
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db_pool)
            .await
            .context("Failed to run email store migrations")?;
        Ok(())
    }

    // ======================================================
    // Escritura (sólo desde el despachador)
    // ======================================================

    /// Crea el correo en estado "pending" junto con sus adjuntos,
    /// todo en una transacción.
    pub(crate) async fn create_email(
        &self,
        email: &NewEmail,
        files: &[StoredFile],
    ) -> Result<EmailRecord> {
        let recipients = serde_json::to_string(&email.recipients)?;
        let cc = email.cc.as_ref().map(serde_json::to_string).transpose()?;
        let created_at = Utc::now().to_rfc3339();

        let mut tx = self
            .db_pool
            .begin()
            .await
            .context("No se pudo abrir transacción")?;

        let mut attachment_ids = Vec::with_capacity(files.len());
        for file in files {
            let path = file.path.to_string_lossy().to_string();
            let id = sqlx::query("INSERT INTO attachments (file, content_type) VALUES (?1, ?2)")
                .bind(path)
                .bind(&file.content_type)
                .execute(&mut *tx)
                .await
                .context("Failed to insert attachment record")?
                .last_insert_rowid();
            attachment_ids.push(id);
        }

        let email_id = sqlx::query(
            r#"
            INSERT INTO emails (
                subject, body, html_body, recipients, from_email, cc,
                is_sent, status, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8)
            "#,
        )
        .bind(&email.subject)
        .bind(&email.body)
        .bind(&email.html_body)
        .bind(recipients)
        .bind(&email.from_email)
        .bind(cc)
        .bind(email_status::PENDING)
        .bind(created_at)
        .execute(&mut *tx)
        .await
        .context("Failed to insert email record")?
        .last_insert_rowid();

        for attachment_id in attachment_ids {
            sqlx::query("INSERT INTO email_attachments (email_id, attachment_id) VALUES (?1, ?2)")
                .bind(email_id)
                .bind(attachment_id)
                .execute(&mut *tx)
                .await
                .context("Failed to link attachment")?;
        }

        tx.commit().await.context("Failed to commit email record")?;

        self.get_email(email_id).await
    }

    /// Guarda el resultado del intento de envío.
    pub(crate) async fn record_outcome(&self, email_id: i64, outcome: &DispatchOutcome) -> Result<()> {
        let (is_sent, send_time, status, log) = match outcome {
            DispatchOutcome::Sent => (true, Some(Utc::now().to_rfc3339()), email_status::SENT, None),
            DispatchOutcome::Failed { diagnostic } => {
                (false, None, email_status::FAILED, Some(diagnostic.as_str()))
            }
        };

        let result = sqlx::query(
            r#"
            UPDATE emails
            SET is_sent = ?2,
                send_time = ?3,
                status = ?4,
                log = ?5
            WHERE id = ?1
            "#,
        )
        .bind(email_id)
        .bind(is_sent)
        .bind(send_time)
        .bind(status)
        .bind(log)
        .execute(&self.db_pool)
        .await
        .context("Failed to update email status")?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("Email {email_id} not found"));
        }
        Ok(())
    }

    /// La cola estaba llena: el correo queda registrado pero no se intenta.
    pub(crate) async fn mark_rejected(&self, email_id: i64, reason: &str) -> Result<()> {
        sqlx::query("UPDATE emails SET is_sent = 0, status = ?2, log = ?3 WHERE id = ?1")
            .bind(email_id)
            .bind(email_status::REJECTED)
            .bind(reason)
            .execute(&self.db_pool)
            .await
            .context("Failed to mark email as rejected")?;
        Ok(())
    }

    /// Vuelve a "pending" un correo existente antes de reenviarlo.
    /// `None` si ya estaba "pending": hay un envío en cola o en curso.
    pub(crate) async fn reset_for_resend(&self, email_id: i64) -> Result<Option<EmailRecord>> {
        let result = sqlx::query(
            "UPDATE emails SET status = ?2 WHERE id = ?1 AND COALESCE(status, '') != ?2",
        )
        .bind(email_id)
        .bind(email_status::PENDING)
        .execute(&self.db_pool)
        .await
        .context("Failed to reset email status")?;

        let record = self.get_email(email_id).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(record))
    }

    // ======================================================
    // Lectura
    // ======================================================

    pub async fn get_email(&self, email_id: i64) -> Result<EmailRecord> {
        let sql = format!("SELECT {EMAIL_COLUMNS} FROM emails WHERE id = ?1");
        let row: Option<EmailRow> = sqlx::query_as(&sql)
            .bind(email_id)
            .fetch_optional(&self.db_pool)
            .await
            .context("Failed to fetch email")?;

        match row {
            Some(row) => row.try_into(),
            None => Err(anyhow!("Email {email_id} not found")),
        }
    }

    pub async fn attachments_for(&self, email_id: i64) -> Result<Vec<AttachmentRecord>> {
        let rows: Vec<AttachmentRow> = sqlx::query_as(
            r#"
            SELECT a.id, a.file, a.content_type, CAST(ea.email_id AS TEXT) AS email_ids
            FROM attachments a
            JOIN email_attachments ea ON ea.attachment_id = a.id
            WHERE ea.email_id = ?1
            ORDER BY a.id
            "#,
        )
        .bind(email_id)
        .fetch_all(&self.db_pool)
        .await
        .context("Failed to fetch attachments")?;

        Ok(rows.into_iter().map(AttachmentRecord::from).collect())
    }

    /// Listado del panel: más recientes primero, búsqueda por asunto o destinatarios.
    pub async fn list_emails(
        &self,
        page: u64,
        page_size: u64,
        search: Option<&str>,
    ) -> Result<(u64, u64, u64, Vec<EmailRecord>)> {
        let (page, page_size, limit, offset) = page_bounds(page, page_size);
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(like_pattern);

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM emails
            WHERE ?1 IS NULL OR subject LIKE ?1 ESCAPE '\' OR recipients LIKE ?1 ESCAPE '\'
            "#,
        )
        .bind(&pattern)
        .fetch_one(&self.db_pool)
        .await
        .context("Failed to count emails")?;

        let sql = format!(
            r#"
            SELECT {EMAIL_COLUMNS} FROM emails
            WHERE ?1 IS NULL OR subject LIKE ?1 ESCAPE '\' OR recipients LIKE ?1 ESCAPE '\'
            ORDER BY created_at DESC, id DESC
            LIMIT ?2 OFFSET ?3
            "#
        );
        let rows: Vec<EmailRow> = sqlx::query_as(&sql)
            .bind(&pattern)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db_pool)
            .await
            .context("Failed to list emails")?;

        let items = rows
            .into_iter()
            .map(EmailRecord::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok((total as u64, page, page_size, items))
    }

    /// Adjuntos con los ids de los correos a los que pertenecen.
    pub async fn list_attachments(
        &self,
        page: u64,
        page_size: u64,
    ) -> Result<(u64, u64, u64, Vec<AttachmentRecord>)> {
        let (page, page_size, limit, offset) = page_bounds(page, page_size);

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attachments")
            .fetch_one(&self.db_pool)
            .await
            .context("Failed to count attachments")?;

        let rows: Vec<AttachmentRow> = sqlx::query_as(
            r#"
            SELECT a.id, a.file, a.content_type, GROUP_CONCAT(ea.email_id) AS email_ids
            FROM attachments a
            LEFT JOIN email_attachments ea ON ea.attachment_id = a.id
            GROUP BY a.id, a.file, a.content_type
            ORDER BY a.id DESC
            LIMIT ?1 OFFSET ?2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db_pool)
        .await
        .context("Failed to list attachments")?;

        Ok((
            total as u64,
            page,
            page_size,
            rows.into_iter().map(AttachmentRecord::from).collect(),
        ))
    }
}

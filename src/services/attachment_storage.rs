//! services/attachment_storage.rs
//! Guarda en disco los adjuntos de los correos y los vuelve a leer al enviar.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::models::email_model::EmailAttachment;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Archivo ya escrito en el directorio de adjuntos.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub path: PathBuf,
    pub filename: String,
    pub content_type: String,
}

impl StoredFile {
    /// Reconstruye la referencia a partir de la ruta guardada en DB.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = original_filename(&path);
        let content_type = guess_content_type(&filename);
        StoredFile {
            path,
            filename,
            content_type,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttachmentStorage {
    root: PathBuf,
}

impl AttachmentStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        AttachmentStorage { root: root.into() }
    }

    /// Escribe cada adjunto como `<uuid>_<nombre>` dentro de `root`.
    pub async fn store_all(&self, attachments: &[EmailAttachment]) -> Result<Vec<StoredFile>> {
        if attachments.is_empty() {
            return Ok(Vec::new());
        }

        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("No se pudo crear {}", self.root.display()))?;

        let mut stored = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            let filename = sanitize_filename(&attachment.filename);
            let path = self
                .root
                .join(format!("{}_{}", Uuid::new_v4().simple(), filename));

            tokio::fs::write(&path, &attachment.data)
                .await
                .with_context(|| format!("No se pudo escribir el adjunto {}", path.display()))?;

            let content_type = attachment
                .content_type
                .clone()
                .filter(|ct| !ct.trim().is_empty())
                .unwrap_or_else(|| guess_content_type(&filename));

            stored.push(StoredFile {
                path,
                filename,
                content_type,
            });
        }

        Ok(stored)
    }

    /// Borra archivos que quedaron sin registro en DB.
    pub async fn remove_all(&self, files: &[StoredFile]) {
        for file in files {
            if let Err(e) = tokio::fs::remove_file(&file.path).await {
                log::warn!("No se pudo borrar {}: {}", file.path.display(), e);
            }
        }
    }

    pub async fn read(&self, file: &StoredFile) -> Result<Vec<u8>> {
        tokio::fs::read(&file.path)
            .await
            .with_context(|| format!("No se pudo leer el adjunto {}", file.path.display()))
    }
}

pub fn guess_content_type(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first()
        .map(|mime| mime.to_string())
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string())
}

// Sólo el último componente; evita escribir fuera de `root`.
fn sanitize_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if base.is_empty() {
        "attachment".to_string()
    } else {
        base
    }
}

// Quita el prefijo `<uuid>_` añadido al guardar.
fn original_filename(path: &Path) -> String {
    let stored = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    match stored.split_once('_') {
        Some((prefix, rest)) if prefix.len() == 32 && !rest.is_empty() => rest.to_string(),
        _ => stored,
    }
}

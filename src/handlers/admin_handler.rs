//! handlers/admin_handler.rs
//! Panel de administración de sólo lectura: no hay alta de correos desde aquí.

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::handlers::email_handler::dispatch_error_response;
use crate::models::email_model::{
    EmailDetailResponse, EmailListItem, ListAttachmentsResponse, ListEmailsResponse,
};
use crate::services::{email_service::EmailDispatcher, transport::MailTransport};

#[derive(Deserialize)]
pub struct EmailListQuery {
    page: Option<u64>,
    page_size: Option<u64>,
    search: Option<String>,
}

#[derive(Deserialize)]
pub struct PaginationQuery {
    page: Option<u64>,
    page_size: Option<u64>,
}

#[derive(Deserialize)]
pub struct ResendQuery {
    fail_silently: Option<bool>,
    async_send: Option<bool>,
}

fn internal_error(e: anyhow::Error) -> HttpResponse {
    HttpResponse::InternalServerError().json(serde_json::json!({
        "error": "Internal server error",
        "details": format!("{:?}", e)
    }))
}

/// GET /api/admin/emails
pub async fn list_emails_endpoint<T: MailTransport>(
    dispatcher: web::Data<EmailDispatcher<T>>,
    query: web::Query<EmailListQuery>,
) -> HttpResponse {
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(10);

    match dispatcher
        .store()
        .list_emails(page, page_size, query.search.as_deref())
        .await
    {
        Ok((total, page, page_size, records)) => HttpResponse::Ok().json(ListEmailsResponse {
            total,
            page,
            page_size,
            items: records.into_iter().map(EmailListItem::from).collect(),
        }),
        Err(e) => internal_error(e),
    }
}

/// GET /api/admin/emails/{id}
pub async fn get_email_endpoint<T: MailTransport>(
    dispatcher: web::Data<EmailDispatcher<T>>,
    path: web::Path<i64>,
) -> HttpResponse {
    let email_id = path.into_inner();
    let store = dispatcher.store();

    let email = match store.get_email(email_id).await {
        Ok(email) => email,
        Err(e) => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": "Email not found",
                "details": format!("{:?}", e)
            }))
        }
    };

    match store.attachments_for(email_id).await {
        Ok(attachments) => HttpResponse::Ok().json(EmailDetailResponse { email, attachments }),
        Err(e) => internal_error(e),
    }
}

/// GET /api/admin/attachments
pub async fn list_attachments_endpoint<T: MailTransport>(
    dispatcher: web::Data<EmailDispatcher<T>>,
    query: web::Query<PaginationQuery>,
) -> HttpResponse {
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(10);

    match dispatcher.store().list_attachments(page, page_size).await {
        Ok((total, page, page_size, items)) => HttpResponse::Ok().json(ListAttachmentsResponse {
            total,
            page,
            page_size,
            items,
        }),
        Err(e) => internal_error(e),
    }
}

/// POST /api/admin/emails/{id}/resend
pub async fn resend_email_endpoint<T: MailTransport>(
    dispatcher: web::Data<EmailDispatcher<T>>,
    path: web::Path<i64>,
    query: web::Query<ResendQuery>,
) -> HttpResponse {
    let email_id = path.into_inner();
    let fail_silently = query.fail_silently.unwrap_or(true);
    let async_send = query.async_send.unwrap_or(true);

    match dispatcher.resend(email_id, fail_silently, async_send).await {
        Ok(receipt) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "email_id": receipt.email_id,
            "outcome": receipt.outcome
        })),
        Err(e) => dispatch_error_response(&e),
    }
}

use actix_web::{http::StatusCode, web, HttpResponse};
use serde_json::json;

use crate::{
    error::DispatchError, models::email_model::SendEmailRequest,
    services::email_service::EmailDispatcher, services::transport::MailTransport,
};

pub(crate) fn dispatch_error_response(e: &DispatchError) -> HttpResponse {
    let (status, email_id) = match e {
        DispatchError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, None),
        DispatchError::QueueFull { email_id } => (StatusCode::SERVICE_UNAVAILABLE, Some(*email_id)),
        DispatchError::InProgress { email_id } => (StatusCode::CONFLICT, Some(*email_id)),
        DispatchError::PoolClosed => (StatusCode::SERVICE_UNAVAILABLE, None),
        DispatchError::Delivery { email_id, .. } => (StatusCode::BAD_GATEWAY, Some(*email_id)),
        DispatchError::Storage(err) if err.to_string().contains("not found") => {
            (StatusCode::NOT_FOUND, None)
        }
        DispatchError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
    };

    if status.is_server_error() {
        log::error!("Email dispatch error: {}", e);
    }

    HttpResponse::build(status).json(json!({
        "success": false,
        "email_id": email_id,
        "error": e.to_string()
    }))
}

/// POST /api/email/send
pub async fn send_email_endpoint<T: MailTransport>(
    dispatcher: web::Data<EmailDispatcher<T>>,
    body: web::Json<SendEmailRequest>,
) -> HttpResponse {
    let req_data = body.into_inner();
    let message = if req_data.async_send {
        "Email processing started"
    } else {
        "Email processed"
    };

    match dispatcher.dispatch(req_data).await {
        Ok(receipt) => HttpResponse::Ok().json(json!({
            "success": true,
            "email_id": receipt.email_id,
            "outcome": receipt.outcome,
            "message": message
        })),
        Err(e) => dispatch_error_response(&e),
    }
}

/// GET /api/email/status/{id}
pub async fn email_status_endpoint<T: MailTransport>(
    dispatcher: web::Data<EmailDispatcher<T>>,
    path: web::Path<i64>,
) -> HttpResponse {
    let email_id = path.into_inner();

    match dispatcher.get_status(email_id).await {
        Ok(status) => HttpResponse::Ok().json(json!({
            "success": true,
            "status": status
        })),
        Err(e) => {
            let status_code = if e.to_string().contains("not found") {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };

            HttpResponse::build(status_code).json(json!({
                "success": false,
                "error": e.to_string()
            }))
        }
    }
}

//! app.rs
use crate::handlers::{admin_handler, email_handler};
use crate::services::transport::MailTransport;
use actix_web::web;

pub fn init_app<T: MailTransport>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(
                web::scope("/email")
                    .route(
                        "/send",
                        web::post().to(email_handler::send_email_endpoint::<T>),
                    )
                    .route(
                        "/status/{id}",
                        web::get().to(email_handler::email_status_endpoint::<T>),
                    ),
            )
            .service(
                web::scope("/admin")
                    .route(
                        "/emails",
                        web::get().to(admin_handler::list_emails_endpoint::<T>),
                    )
                    .route(
                        "/emails/{id}",
                        web::get().to(admin_handler::get_email_endpoint::<T>),
                    )
                    .route(
                        "/emails/{id}/resend",
                        web::post().to(admin_handler::resend_email_endpoint::<T>),
                    )
                    .route(
                        "/attachments",
                        web::get().to(admin_handler::list_attachments_endpoint::<T>),
                    ),
            ),
    );
}

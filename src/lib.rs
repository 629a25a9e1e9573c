pub mod context;
pub mod error;
pub mod fingerprint;
pub mod handlers;
pub mod middlewares;
pub mod models;
pub mod response;
pub mod schema;

use actix_web::web::{delete, get, post, put, scope, ServiceConfig};

pub fn routes(cfg: &mut ServiceConfig) {
    cfg.service(
        scope("polls")
            .route("", get().to(handlers::poll::list))
            .route("", post().to(handlers::poll::create))
            .service(
                scope("{poll_id}")
                    .route("", get().to(handlers::poll::detail))
                    .route("", put().to(handlers::poll::update))
                    .route("", delete().to(handlers::poll::delete_poll))
                    .route("results", get().to(handlers::results::results))
                    .route("vote", post().to(handlers::vote::submit))
                    .route("options", post().to(handlers::option::add_option)),
            ),
    );
}

pub(crate) fn is_production() -> bool {
    dotenv::var("APP_ENV").map(|v| v == "production").unwrap_or(false)
}

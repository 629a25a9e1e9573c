use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("dotenv error: {0}")]
    DotEnv(#[from] dotenv::Error),

    #[error("server error: {0}")]
    Server(String),
}

impl Error {
    // 500 details stay out of responses in production
    fn public_message(&self) -> String {
        match self {
            Error::Validation(_) | Error::Unauthorized(_) | Error::Forbidden(_) | Error::NotFound(_) | Error::Conflict(_) | Error::Jwt(_) => self.to_string(),
            _ => {
                if crate::is_production() {
                    "internal server error".into()
                } else {
                    self.to_string()
                }
            }
        }
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) | Error::Conflict(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) | Error::Jwt(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "message": self.public_message(),
        }))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::Validation("bad".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::Conflict("already voted".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::Unauthorized("no token".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(Error::Forbidden("not yours".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(Error::NotFound("poll not found".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(Error::Server("boom".into()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_client_errors_keep_their_message() {
        let err = Error::Conflict("you have already voted on this poll".into());
        assert_eq!(err.public_message(), "you have already voted on this poll");
    }
}

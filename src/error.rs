use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use sea_orm::DbErr;
use serde_json::json;
use thiserror::Error;

/// Domain error taxonomy. Every engine operation fails fast with one of
/// these at the point of violation; the web layer maps them to statuses
/// through the ResponseError impl below.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    AlreadyExists(&'static str),
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("{0}")]
    Internal(&'static str),
    #[error(transparent)]
    Db(#[from] DbErr),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::AlreadyExists(_) => StatusCode::BAD_REQUEST,
            Error::AuthenticationFailed => StatusCode::UNAUTHORIZED,
            Error::Internal(_) | Error::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let Error::Db(err) = self {
            log::error!("database error: {}", err);
        }
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(Error::NotFound("post").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::Forbidden("not yours").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Error::AlreadyExists("tag").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::AuthenticationFailed.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::Db(DbErr::Custom("boom".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn not_found_names_the_entity() {
        assert_eq!(Error::NotFound("comment").to_string(), "comment not found");
    }
}

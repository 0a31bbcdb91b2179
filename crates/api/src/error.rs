use async_graphql::{Error, ErrorExtensions};
use sea_orm::{DbErr, SqlErr};

/// Failure taxonomy shared by every service in this crate.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("access denied")]
    Forbidden,
    #[error("login required")]
    Unauthenticated,
    #[error("invalid {field}: {message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(DbErr),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        ServiceError::InvalidInput {
            field,
            message: message.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        ServiceError::InvalidState(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ServiceError::Conflict(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::Forbidden => "FORBIDDEN",
            ServiceError::Unauthenticated => "UNAUTHENTICATED",
            ServiceError::InvalidInput { .. } => "VALIDATION",
            ServiceError::InvalidState(_) => "INVALID_STATE",
            ServiceError::Conflict(_) => "CONFLICT",
            ServiceError::Database(_) => "INTERNAL",
        }
    }
}

impl From<DbErr> for ServiceError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                ServiceError::conflict("record already exists")
            }
            Some(SqlErr::ForeignKeyConstraintViolation(_)) => {
                ServiceError::invalid_state("record is referenced by other records")
            }
            _ => ServiceError::Database(err),
        }
    }
}

impl ErrorExtensions for ServiceError {
    fn extend(&self) -> Error {
        let message = match self {
            ServiceError::Database(err) => {
                tracing::error!(error = %err, "database error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        Error::new(message).extend_with(|_, ext| {
            ext.set("code", self.code());
            if let ServiceError::InvalidInput { field, .. } = self {
                ext.set("field", *field);
            }
        })
    }
}

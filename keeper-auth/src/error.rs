use keeper_core::{ErrorKind, KeeperError};
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

/// Login and token failures
///
/// `Exhausted` and `InvalidCredentials` are separate failure classes: the
/// first means "try again later", the second means "wrong username or
/// password".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Too many login requests in flight")]
    Exhausted,

    #[error("Invalid login")]
    InvalidCredentials,

    #[error("User is blocked")]
    UserBlocked,

    #[error("Token not found")]
    TokenNotFound,

    #[error("Token is no longer valid")]
    TokenInvalid,

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Exhausted => ErrorKind::TooManyRequests,
            Self::InvalidCredentials | Self::TokenInvalid => ErrorKind::NotAuthenticated,
            Self::UserBlocked => ErrorKind::Forbidden,
            Self::TokenNotFound => ErrorKind::NotFound,
            Self::Hashing(_) | Self::Storage(_) => ErrorKind::GeneralError,
        }
    }
}

impl From<AuthError> for KeeperError {
    fn from(err: AuthError) -> Self {
        KeeperError::new(err.kind(), err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

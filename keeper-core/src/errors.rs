//! # Errors
//!
//! Keeper services report failures with a small set of structured errors.
//! Goals:
//! - stable status codes + class names per failure class
//! - can be carried through `anyhow::Error` across service boundaries
//! - transport-agnostic (the RPC layer decides how to serialize)
//!
//! With feature `serde` you also get `data` as `serde_json::Value` and a
//! `to_json()` helper.

use std::fmt;

use anyhow::Error as AnyError;

/// A convenience result type for Keeper service APIs.
pub type KeeperResult<T> = std::result::Result<T, AnyError>;

/// Failure classes + their status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,         // 400
    NotAuthenticated,   // 401
    Forbidden,          // 403
    NotFound,           // 404
    Conflict,           // 409
    TooManyRequests,    // 429
    GeneralError,       // 500
    Unavailable,        // 503
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::NotAuthenticated => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::TooManyRequests => 429,
            ErrorKind::GeneralError => 500,
            ErrorKind::Unavailable => 503,
        }
    }

    /// Error `name` (e.g. "NotFound")
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::NotAuthenticated => "NotAuthenticated",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::TooManyRequests => "TooManyRequests",
            ErrorKind::GeneralError => "GeneralError",
            ErrorKind::Unavailable => "Unavailable",
        }
    }

    /// Error `className` (kebab-cased)
    pub fn class_name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad-request",
            ErrorKind::NotAuthenticated => "not-authenticated",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::TooManyRequests => "too-many-requests",
            ErrorKind::GeneralError => "general-error",
            ErrorKind::Unavailable => "unavailable",
        }
    }

    /// Status name used on the RPC transport
    pub fn rpc_status(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "InvalidArgument",
            ErrorKind::NotAuthenticated => "Unauthenticated",
            ErrorKind::Forbidden => "PermissionDenied",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Conflict => "AlreadyExists",
            ErrorKind::TooManyRequests => "ResourceExhausted",
            ErrorKind::GeneralError => "Internal",
            ErrorKind::Unavailable => "Unavailable",
        }
    }

    /// Whether the caller may retry the same request later unchanged
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::TooManyRequests | ErrorKind::Unavailable)
    }
}

#[cfg(feature = "serde")]
pub type ErrorValue = serde_json::Value;

#[cfg(not(feature = "serde"))]
pub type ErrorValue = String;

/// A structured Keeper error that can live inside `anyhow::Error`.
#[derive(Debug)]
pub struct KeeperError {
    pub kind: ErrorKind,
    pub message: String,
    pub data: Option<ErrorValue>,
    pub source: Option<AnyError>,
}

impl KeeperError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
            source: None,
        }
    }

    pub fn with_data(mut self, data: ErrorValue) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_source(mut self, source: AnyError) -> Self {
        self.source = Some(source);
        self
    }

    pub fn code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    /// Convert into `anyhow::Error` so it flows through service calls.
    pub fn into_anyhow(self) -> AnyError {
        AnyError::new(self)
    }

    /// Downcast an `anyhow::Error` to a `KeeperError` if possible.
    pub fn from_anyhow(err: &AnyError) -> Option<&KeeperError> {
        err.downcast_ref::<KeeperError>()
    }

    /// Turn any error into a KeeperError:
    /// - if it's already a KeeperError, keep it
    /// - otherwise wrap as GeneralError
    pub fn normalize(err: AnyError) -> KeeperError {
        match err.downcast::<KeeperError>() {
            Ok(keeper) => keeper,
            Err(other) => KeeperError::general_error(other.to_string()).with_source(other),
        }
    }

    /// Copy suitable for returning to callers: drops the inner `source`.
    pub fn sanitize_for_client(&self) -> KeeperError {
        KeeperError {
            kind: self.kind,
            message: self.message.clone(),
            data: self.data.clone(),
            source: None,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, msg)
    }
    pub fn not_authenticated(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotAuthenticated, msg)
    }
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, msg)
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, msg)
    }
    pub fn too_many_requests(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::TooManyRequests, msg)
    }
    pub fn general_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::GeneralError, msg)
    }
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, msg)
    }
}

impl fmt::Display for KeeperError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.code(), self.message)
    }
}

impl std::error::Error for KeeperError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[cfg(feature = "serde")]
impl KeeperError {
    /// JSON payload for RPC responses.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;

        let mut base = json!({
            "name": self.name(),
            "message": self.message,
            "code": self.code(),
            "className": self.class_name(),
            "status": self.kind.rpc_status(),
        });

        if let Some(d) = &self.data {
            base["data"] = d.clone();
        }
        base
    }
}

/// Bail out of an `anyhow` function with a `KeeperError`.
#[macro_export]
macro_rules! bail_keeper {
    ($ctor:ident, $msg:expr) => {
        return Err($crate::errors::KeeperError::$ctor($msg).into_anyhow());
    };
    ($ctor:ident, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::errors::KeeperError::$ctor(format!($fmt, $($arg)*)).into_anyhow());
    };
}

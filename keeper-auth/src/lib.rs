//! Authentication for the Keeper admin backend.
//!
//! Login requests pass through [`LoginAdmission`] before any credential is
//! looked at: a slot is taken without waiting (or the request is rejected
//! with [`AuthError::Exhausted`]), a fixed delay is served, and only then is
//! the password checked. Successful logins get a [`Token`] from the
//! [`TokenStore`] and a live entry in the [`SessionRegistry`].

pub mod admission;
pub mod error;
pub mod password;
pub mod service;
pub mod sessions;
pub mod tokens;

pub use admission::{LoginAdmission, LoginSlot};
pub use error::{AuthError, AuthResult};
pub use password::{hash_password, verify_password};
pub use service::{AuthService, CredentialStore, Credentials, LoginResponse};
pub use sessions::{Session, SessionRegistry};
pub use tokens::{MemoryTokenStore, Token, TokenStatus, TokenStore};

use std::sync::Arc;

use keeper_auth::AuthService;
use keeper_core::{ErrorKind, KeeperError};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, instrument};

use crate::services::UserBlocker;

#[derive(Debug, Deserialize)]
struct LoginParams {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct LogoutParams {
    token: String,
}

#[derive(Debug, Deserialize)]
struct BlockUserParams {
    user_id: String,
    #[serde(default)]
    reason: Option<String>,
}

/// Method-name dispatch for the RPC calls that touch auth and blocking
#[derive(Clone)]
pub struct RpcRouter {
    auth: Arc<AuthService>,
    blocker: UserBlocker,
}

impl RpcRouter {
    pub const METHODS: [&'static str; 3] = ["auth/login", "auth/logout", "user/block_user"];

    pub fn new(auth: Arc<AuthService>, blocker: UserBlocker) -> Self {
        Self { auth, blocker }
    }

    #[instrument(skip(self, params))]
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, KeeperError> {
        debug!("rpc call");
        match method {
            "auth/login" => {
                let p: LoginParams = parse(params)?;
                let response = self.auth.login(&p.username, &p.password).await?;
                Ok(json!(response))
            }
            "auth/logout" => {
                let p: LogoutParams = parse(params)?;
                self.auth.logout(&p.token).await?;
                Ok(json!({ "ok": true }))
            }
            "user/block_user" => {
                let p: BlockUserParams = parse(params)?;
                let reason = p.reason.unwrap_or_else(|| "blocked by administrator".to_string());
                let blocked = self
                    .blocker
                    .block(&p.user_id, &reason)
                    .await
                    .map_err(KeeperError::normalize)?;
                Ok(json!({ "user_id": p.user_id, "blocked": blocked }))
            }
            other => Err(KeeperError::not_found(format!("Unknown method: {}", other))
                .with_data(json!({ "methods": Self::METHODS }))),
        }
    }

    /// `call` wrapped in a transport envelope: `{"result": ..}` or
    /// `{"error": ..}` with internal sources stripped
    pub async fn dispatch(&self, method: &str, params: Value) -> Value {
        match self.call(method, params).await {
            Ok(result) => json!({ "result": result }),
            Err(e) => {
                if e.kind == ErrorKind::GeneralError {
                    error!(method, "rpc call failed: {:?}", e);
                }
                json!({ "error": e.sanitize_for_client().to_json() })
            }
        }
    }
}

fn parse<T: DeserializeOwned>(params: Value) -> Result<T, KeeperError> {
    serde_json::from_value(params).map_err(|e| KeeperError::bad_request(format!("Invalid params: {}", e)))
}

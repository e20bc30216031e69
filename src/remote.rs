//! JSON RPC client for the lab's hardware manager.
//!
//! Every device server (level meter, data vault) is reached through one HTTP
//! endpoint. A call names the server and setting and carries positional args:
//!
//! ```text
//! POST {"server": "lm_510", "setting": "get_measure", "args": []}
//! <-   {"result": "45.3 %"}   or   {"error": "device not selected"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("http status {status} from {server}.{setting}")]
    Status {
        server: String,
        setting: String,
        status: u16,
    },
    #[error("{server}.{setting} failed: {message}")]
    Remote {
        server: String,
        setting: String,
        message: String,
    },
    #[error("unexpected result from {server}.{setting}: {result}")]
    UnexpectedResult {
        server: String,
        setting: String,
        result: Value,
    },
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    server: &'a str,
    setting: &'a str,
    args: &'a [Value],
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Clone)]
pub struct RpcClient {
    client: reqwest::Client,
    endpoint: String,
}

impl RpcClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub async fn call(
        &self,
        server: &str,
        setting: &str,
        args: &[Value],
    ) -> Result<Value, RpcError> {
        debug!(server, setting, args = ?args, "rpc call");
        let response = self
            .client
            .post(&self.endpoint)
            .json(&RpcRequest {
                server,
                setting,
                args,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Status {
                server: server.to_string(),
                setting: setting.to_string(),
                status: status.as_u16(),
            });
        }

        let body: RpcResponse = response.json().await?;
        into_result(server, setting, body)
    }

    /// Calls a setting whose result is a string.
    pub async fn call_string(
        &self,
        server: &str,
        setting: &str,
        args: &[Value],
    ) -> Result<String, RpcError> {
        match self.call(server, setting, args).await? {
            Value::String(text) => Ok(text),
            other => Err(RpcError::UnexpectedResult {
                server: server.to_string(),
                setting: setting.to_string(),
                result: other,
            }),
        }
    }
}

impl fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClient")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

fn into_result(server: &str, setting: &str, body: RpcResponse) -> Result<Value, RpcError> {
    match body.error {
        Some(message) => Err(RpcError::Remote {
            server: server.to_string(),
            setting: setting.to_string(),
            message,
        }),
        None => Ok(body.result),
    }
}

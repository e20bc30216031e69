use crate::remote::RpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("meter error: {0}")]
    Meter(String),
    #[error("unparseable meter reading: {0:?}")]
    InvalidReading(String),
    #[error("invalid sample interval: {0:?}")]
    InvalidInterval(String),
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),
    #[error("data vault error: {0}")]
    DataVault(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("monitor is not running")]
    MonitorStopped,
    #[error("state lock poisoned")]
    StateLock,
}

use crate::error::AppError;
use crate::remote::RpcClient;
use crate::sensor::{LevelMeter, MeterMode, SampleMode};
use async_trait::async_trait;
use serde_json::{Value, json};

/// Level meter reached through the hardware manager's device server.
#[derive(Debug, Clone)]
pub struct RemoteLevelMeter {
    rpc: RpcClient,
    server: String,
}

impl RemoteLevelMeter {
    pub fn new(rpc: RpcClient, server: impl Into<String>) -> Self {
        Self {
            rpc,
            server: server.into(),
        }
    }

    async fn call(&self, setting: &str, args: &[Value]) -> Result<Value, AppError> {
        Ok(self.rpc.call(&self.server, setting, args).await?)
    }
}

#[async_trait]
impl LevelMeter for RemoteLevelMeter {
    async fn select_device(&self) -> Result<(), AppError> {
        self.call("select_device", &[]).await.map(drop)
    }

    async fn set_sample_mode(&self, mode: SampleMode) -> Result<(), AppError> {
        self.call("set_sample_mode", &[json!(mode.code())])
            .await
            .map(drop)
    }

    async fn set_sample_interval(&self, interval: &str) -> Result<(), AppError> {
        self.call("set_sample_interval", &[json!(interval)])
            .await
            .map(drop)
    }

    async fn set_off_mode(&self) -> Result<(), AppError> {
        self.call("set_off_mode", &[]).await.map(drop)
    }

    async fn set_units(&self, units: &str) -> Result<(), AppError> {
        self.call("set_units", &[json!(units)]).await.map(drop)
    }

    async fn prep_measure(&self) -> Result<(), AppError> {
        self.call("prep_measure", &[]).await.map(drop)
    }

    async fn get_measure(&self) -> Result<String, AppError> {
        Ok(self.rpc.call_string(&self.server, "get_measure", &[]).await?)
    }

    async fn get_mode(&self) -> Result<MeterMode, AppError> {
        let mode = self.rpc.call_string(&self.server, "get_mode", &[]).await?;
        Ok(MeterMode::from_reported(&mode))
    }
}

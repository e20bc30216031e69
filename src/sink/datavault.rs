use crate::error::AppError;
use crate::remote::RpcClient;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

/// Layout of a new data vault dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSpec {
    /// System the dataset is filed under, if the vault needs one.
    pub system: Option<String>,
    pub name: String,
    pub independents: Vec<String>,
    pub dependents: Vec<String>,
    pub parameters: Vec<(String, String)>,
}

impl DatasetSpec {
    /// Level log dataset: hours against percent and inches.
    pub fn level_log(system: Option<&str>, datestamp: &str) -> Self {
        Self {
            system: system.map(str::to_string),
            name: format!("LHe Level - {datestamp}"),
            independents: vec!["time (hours)".to_string()],
            dependents: vec!["volume (%)".to_string(), "level (in)".to_string()],
            parameters: vec![("Start date and time".to_string(), datestamp.to_string())],
        }
    }
}

/// Time-series logger the samples are appended to.
#[async_trait]
pub trait DataLog: Send + Sync {
    /// Creates the dataset and returns its identifier.
    async fn open_dataset(&self, spec: &DatasetSpec) -> Result<String, AppError>;
    async fn add_row(&self, row: &[f64]) -> Result<(), AppError>;
}

#[derive(Debug, Clone)]
pub struct RemoteDataVault {
    rpc: RpcClient,
    server: String,
}

impl RemoteDataVault {
    pub fn new(rpc: RpcClient, server: impl Into<String>) -> Self {
        Self {
            rpc,
            server: server.into(),
        }
    }

    async fn call(&self, setting: &str, args: &[Value]) -> Result<Value, AppError> {
        self.rpc
            .call(&self.server, setting, args)
            .await
            .map_err(|err| AppError::DataVault(err.to_string()))
    }
}

#[async_trait]
impl DataLog for RemoteDataVault {
    async fn open_dataset(&self, spec: &DatasetSpec) -> Result<String, AppError> {
        if let Some(system) = &spec.system {
            self.call("set_nanosquid_system", &[json!(system)]).await?;
        }
        self.call(
            "new",
            &[
                json!(spec.name),
                json!(spec.independents),
                json!(spec.dependents),
            ],
        )
        .await?;
        for (name, value) in &spec.parameters {
            self.call("add_parameter", &[json!(name), json!(value)])
                .await?;
        }
        match self.call("current_identifier", &[]).await? {
            Value::String(identifier) => Ok(identifier),
            other => Err(AppError::DataVault(format!(
                "unexpected dataset identifier: {other}"
            ))),
        }
    }

    async fn add_row(&self, row: &[f64]) -> Result<(), AppError> {
        self.call("add", &[json!(row)]).await.map(drop)
    }
}

#[derive(Debug, Default)]
struct MemoryDataLogState {
    datasets: Vec<DatasetSpec>,
    rows: Vec<Vec<f64>>,
    fail_rows: bool,
}

/// In-memory data log; clones share the same dataset.
#[derive(Debug, Clone, Default)]
pub struct MemoryDataLog {
    inner: Arc<Mutex<MemoryDataLogState>>,
}

impl MemoryDataLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `add_row` fails.
    pub fn failing_rows() -> Self {
        let log = Self::default();
        log.with_state(|state| state.fail_rows = true);
        log
    }

    pub fn datasets(&self) -> Vec<DatasetSpec> {
        self.with_state(|state| state.datasets.clone())
    }

    pub fn rows(&self) -> Vec<Vec<f64>> {
        self.with_state(|state| state.rows.clone())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryDataLogState) -> T) -> T {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[async_trait]
impl DataLog for MemoryDataLog {
    async fn open_dataset(&self, spec: &DatasetSpec) -> Result<String, AppError> {
        self.with_state(|state| {
            state.datasets.push(spec.clone());
            Ok(format!("{:05} - {}", state.datasets.len(), spec.name))
        })
    }

    async fn add_row(&self, row: &[f64]) -> Result<(), AppError> {
        self.with_state(|state| {
            if state.fail_rows {
                return Err(AppError::DataVault("memory log rejects rows".to_string()));
            }
            state.rows.push(row.to_vec());
            Ok(())
        })
    }
}

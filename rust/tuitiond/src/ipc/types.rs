use anyhow::Context;
use serde::Deserialize;
use tokio::runtime::Runtime;

use crate::config::Config;
use crate::query::Queries;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Sidecar state. Handlers stay synchronous and drive async work through
/// `runtime`; background refetches keep running between requests.
pub struct AppState {
    pub runtime: Runtime,
    pub config: Config,
    pub queries: Queries,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .context("failed to start tokio runtime")?;
        let queries = {
            let _guard = runtime.enter();
            Queries::from_config(&config).context("failed to build api client")?
        };
        Ok(Self {
            runtime,
            config,
            queries,
        })
    }

    pub fn block_on<F: std::future::Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }
}

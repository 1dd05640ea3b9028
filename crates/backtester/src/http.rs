use crate::BacktestEngine;
use crate::error::BacktestError;
use async_trait::async_trait;
use configuration::BacktestSettings;
use core_types::{BacktestConfig, BacktestMetadata, BacktestStatus, Metrics, TradeEvent};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// REST client for a simulation service exposing `/api/backtests`.
#[derive(Debug, Clone)]
pub struct HttpBacktestEngine {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct StartResponse {
    run_id: String,
}

impl HttpBacktestEngine {
    pub fn new(settings: &BacktestSettings) -> Result<Self, BacktestError> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, run_id: &str, suffix: &str) -> String {
        format!("{}/api/backtests/{}{}", self.base_url, run_id, suffix)
    }

    async fn get_optional<T: DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<Option<T>, BacktestError> {
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(url, response).await.map(Some)
    }
}

async fn decode<T: DeserializeOwned>(endpoint: &str, response: Response) -> Result<T, BacktestError> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(BacktestError::Service {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body: text,
        });
    }
    serde_json::from_str::<T>(&text).map_err(|e| BacktestError::Decode(e.to_string()))
}

#[async_trait]
impl BacktestEngine for HttpBacktestEngine {
    async fn start(&self, config: &BacktestConfig) -> Result<String, BacktestError> {
        let url = format!("{}/api/backtests", self.base_url);
        debug!(run_id = %config.run_id, "Submitting backtest");
        let response = self.client.post(&url).json(config).send().await?;
        let started: StartResponse = decode(&url, response).await?;
        Ok(started.run_id)
    }

    async fn status(&self, run_id: &str) -> Result<Option<BacktestStatus>, BacktestError> {
        self.get_optional(&self.url(run_id, "/status")).await
    }

    async fn get_metrics(&self, run_id: &str) -> Result<Metrics, BacktestError> {
        self.get_optional(&self.url(run_id, "/metrics"))
            .await?
            .ok_or_else(|| BacktestError::RunNotFound(run_id.to_string()))
    }

    async fn load_trades(
        &self,
        run_id: &str,
        limit: usize,
    ) -> Result<Vec<TradeEvent>, BacktestError> {
        let url = format!("{}?limit={}", self.url(run_id, "/trades"), limit);
        Ok(self.get_optional(&url).await?.unwrap_or_default())
    }

    async fn load_metadata(
        &self,
        run_id: &str,
    ) -> Result<Option<BacktestMetadata>, BacktestError> {
        self.get_optional(&self.url(run_id, "/metadata")).await
    }

    async fn delete(&self, run_id: &str) -> Result<(), BacktestError> {
        let url = self.url(run_id, "");
        let response = self.client.delete(&url).send().await?;
        let status = response.status();
        // Deleting an unknown run is already the desired end state.
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(BacktestError::Service {
            endpoint: url,
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        })
    }
}

//! HTTP client for a Prometheus-compatible metrics store

use super::parse::{parse_query_response, QueryRow};
use super::MetricsStore;
use crate::error::{Result, ScalerError};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Instant-query client for the Prometheus HTTP API
pub struct PrometheusClient {
    client: Client,
    base_url: Url,
}

impl PrometheusClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ScalerError::Client)?;

        let mut raw = base_url.to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base_url = Url::parse(&raw).map_err(|source| ScalerError::InvalidEndpoint {
            url: base_url.to_string(),
            source,
        })?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|source| ScalerError::InvalidEndpoint {
                url: format!("{}{}", self.base_url, path),
                source,
            })
    }
}

#[async_trait]
impl MetricsStore for PrometheusClient {
    async fn query(&self, expr: &str) -> Result<Vec<QueryRow>> {
        let url = self.endpoint("api/v1/query")?;
        debug!(query = %expr, "Querying metrics store");

        let request_error = |source| ScalerError::StoreRequest {
            query: expr.to_string(),
            source,
        };

        let response = self
            .client
            .get(url)
            .query(&[("query", expr)])
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let body = response.text().await.map_err(request_error)?;

        if !status.is_success() {
            return Err(ScalerError::StoreStatus {
                query: expr.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        parse_query_response(expr, &body)
    }

    async fn ready(&self) -> Result<()> {
        let url = self.endpoint("-/ready")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| ScalerError::StoreRequest {
                query: "-/ready".to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ScalerError::StoreStatus {
                query: "-/ready".to_string(),
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }

    fn describe(&self) -> String {
        self.base_url.to_string()
    }
}

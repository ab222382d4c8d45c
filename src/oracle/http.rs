//! HTTP client for the ML prediction service
//!
//! Endpoints (JSON):
//! - `POST {url}/predict`        `OracleRequest` → `OracleResponse`
//! - `POST {url}/predict/drift`  `DriftRequest`  → `DriftResponse`
//! - `GET  {url}/health`         any 2xx is healthy

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use super::{DriftRequest, DriftResponse, OracleError, OracleRequest, OracleResponse, PredictionOracle};
use crate::config::OracleConfig;

#[derive(Clone)]
pub struct HttpOracle {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpOracle {
    pub fn new(config: &OracleConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, OracleError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(status_error(status, &detail));
        }

        resp.json::<R>()
            .await
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))
    }

    fn transport_error(&self, e: &reqwest::Error) -> OracleError {
        if e.is_timeout() {
            OracleError::Timeout(self.timeout)
        } else {
            OracleError::Unavailable(e.to_string())
        }
    }
}

/// Map a non-success HTTP status onto the oracle failure kinds.
fn status_error(status: StatusCode, detail: &str) -> OracleError {
    let detail = if detail.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {}", detail.trim())
    };

    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            OracleError::Unavailable(detail)
        }
        s if s.is_server_error() => OracleError::Unavailable(detail),
        _ => OracleError::Rejected(detail),
    }
}

#[async_trait]
impl PredictionOracle for HttpOracle {
    async fn predict(&self, request: &OracleRequest) -> Result<OracleResponse, OracleError> {
        self.post_json("/predict", request).await
    }

    async fn forecast_drift(&self, request: &DriftRequest) -> Result<DriftResponse, OracleError> {
        self.post_json("/predict/drift", request).await
    }

    async fn health(&self) -> Result<(), OracleError> {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(OracleError::Unavailable(resp.status().to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_rejections() {
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "missing ping_count"),
            OracleError::Rejected(_)
        ));
        assert!(matches!(
            status_error(StatusCode::UNPROCESSABLE_ENTITY, ""),
            OracleError::Rejected(_)
        ));
    }

    #[test]
    fn test_server_errors_are_transient() {
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::GATEWAY_TIMEOUT,
            StatusCode::TOO_MANY_REQUESTS,
        ] {
            assert!(status_error(status, "").is_transient(), "{status}");
        }
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = OracleConfig {
            url: "http://ml:5001/".into(),
            ..OracleConfig::default()
        };
        let oracle = HttpOracle::new(&config).unwrap();
        assert_eq!(oracle.base_url(), "http://ml:5001");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        let config = OracleConfig {
            url: "http://127.0.0.1:9".into(),
            timeout_ms: 2_000,
            ..OracleConfig::default()
        };
        let oracle = HttpOracle::new(&config).unwrap();
        let err = oracle.health().await.unwrap_err();
        assert!(err.is_transient(), "{err}");
    }
}

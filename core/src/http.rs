use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{CircuitState, CommandExecutor, TelemetrySource};
use crate::controller::HeatingStatus;
use crate::error::BackendError;
use crate::sample::TelemetrySample;
use crate::schedule::{ScheduleVariable, VariableSchedule};

#[derive(Deserialize)]
struct StatusReply {
    status: HeatingStatus,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    soft_start: bool,
}

#[derive(Serialize)]
struct SchedulingRequest {
    enabled: bool,
}

/// REST client for the heat pump backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, BackendError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| BackendError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        // Url::join drops the last segment unless the path ends with a slash
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base, token })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, BackendError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| BackendError::InvalidUrl(format!("{}: {}", path, e)))?;
        debug!("{} {}", method, url);
        let request = self.client.request(method, url);
        Ok(match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }

    async fn send(request: RequestBuilder) -> Result<Response, BackendError> {
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(BackendError::Unauthorized);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn status_of(request: RequestBuilder) -> Result<HeatingStatus, BackendError> {
        let reply: StatusReply = Self::send(request).await?.json().await?;
        Ok(reply.status)
    }
}

#[async_trait]
impl CommandExecutor for HttpBackend {
    async fn start_circuit(&self, soft_start: bool) -> Result<HeatingStatus, BackendError> {
        let request = self
            .request(Method::POST, "heating/start")?
            .json(&StartRequest { soft_start });
        Self::status_of(request).await
    }

    async fn stop_circuit(&self) -> Result<HeatingStatus, BackendError> {
        Self::status_of(self.request(Method::POST, "heating/stop")?).await
    }

    async fn set_scheduling_enabled(&self, enabled: bool) -> Result<HeatingStatus, BackendError> {
        let request = self
            .request(Method::POST, "heating/scheduling")?
            .json(&SchedulingRequest { enabled });
        Self::status_of(request).await
    }

    async fn fetch_state(&self) -> Result<CircuitState, BackendError> {
        let response = Self::send(self.request(Method::GET, "heating/state")?).await?;
        Ok(response.json().await?)
    }

    async fn get_schedule(&self, variable: ScheduleVariable) -> Result<VariableSchedule, BackendError> {
        let path = format!("schedules/{}", variable);
        let response = Self::send(self.request(Method::GET, &path)?).await?;
        Ok(response.json().await?)
    }

    async fn set_schedule(
        &self,
        variable: ScheduleVariable,
        schedule: &VariableSchedule,
    ) -> Result<(), BackendError> {
        let path = format!("schedules/{}", variable);
        Self::send(self.request(Method::PUT, &path)?.json(schedule)).await?;
        Ok(())
    }
}

#[async_trait]
impl TelemetrySource for HttpBackend {
    async fn fetch_history(&self, days: u32) -> Result<Vec<TelemetrySample>, BackendError> {
        let request = self
            .request(Method::GET, "telemetry/history")?
            .query(&[("days", days)]);
        Ok(Self::send(request).await?.json().await?)
    }

    async fn fetch_latest(&self) -> Result<Option<TelemetrySample>, BackendError> {
        let response = Self::send(self.request(Method::GET, "telemetry/latest")?).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        Ok(Some(response.json().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_keeps_its_path() {
        let backend = HttpBackend::new("http://heatpump.local:8000/api", None, Duration::from_secs(5)).unwrap();
        assert_eq!(backend.base_url().as_str(), "http://heatpump.local:8000/api/");
        let url = backend.base.join("schedules/lowerTank").unwrap();
        assert_eq!(url.as_str(), "http://heatpump.local:8000/api/schedules/lowerTank");
    }

    #[test]
    fn rejects_malformed_url() {
        let err = HttpBackend::new("not a url", None, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, BackendError::InvalidUrl(_)));
        assert!(!err.is_session_expired());
    }

    #[test]
    fn start_request_uses_camel_case() {
        let json = serde_json::to_string(&StartRequest { soft_start: true }).unwrap();
        assert_eq!(json, r#"{"softStart":true}"#);
    }
}

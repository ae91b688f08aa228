// Client for the event API
// Sends events to a running server and polls their runs for output


use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::http::{HttpError, endpoint};
use crate::{RagError, Result};

/// Run statuses that carry a usable output
const COMPLETED_STATUSES: [&str; 4] = ["Completed", "Succeeded", "Success", "Finished"];
/// Run statuses that end without output
const FAILED_STATUSES: [&str; 2] = ["Failed", "Cancelled"];

#[derive(Debug, Deserialize)]
struct EventIds {
    #[serde(default)]
    ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RunList {
    #[serde(default)]
    data: Vec<RunView>,
}

#[derive(Debug, Clone, Deserialize)]
struct RunView {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct RunClient {
    base_url: String,
    agent: ureq::Agent,
}

impl RunClient {
    #[inline]
    pub fn new(base_url: &str, request_timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(request_timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
        }
    }

    #[inline]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_blocking(agent: &ureq::Agent, url: &str, body: Option<&str>) -> std::result::Result<String, HttpError> {
        let mut response = match body {
            Some(body) => agent
                .post(url)
                .header("Content-Type", "application/json")
                .send(body)?,
            None => agent.get(url).call()?,
        };
        let status = response.status().as_u16();
        let text = response.body_mut().read_to_string()?;
        if (200..300).contains(&status) {
            Ok(text)
        } else {
            Err(HttpError::Status { status, body: text })
        }
    }

    async fn request(&self, path: &str, body: Option<String>) -> Result<String> {
        let url = endpoint(&self.base_url, path);
        let agent = self.agent.clone();
        let task_url = url.clone();
        tokio::task::spawn_blocking(move || Self::request_blocking(&agent, &task_url, body.as_deref()))
            .await
            .map_err(|e| RagError::Other(anyhow::anyhow!("Request task failed: {}", e)))?
            .map_err(|e| RagError::Other(anyhow::anyhow!("Request to {} failed: {}", url, e)))
    }

    /// Send an event and return its id
    #[inline]
    pub async fn send_event(&self, name: &str, data: Value) -> Result<String> {
        let body = json!({ "name": name, "data": data }).to_string();
        let response = self.request("events", Some(body)).await?;
        let parsed: EventIds = serde_json::from_str(&response)
            .map_err(|e| RagError::Other(anyhow::anyhow!("Invalid event response: {}", e)))?;

        let event_id = parsed
            .ids
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Other(anyhow::anyhow!("Server returned no event id")))?;
        info!("Sent event {} as {}", name, event_id);
        Ok(event_id)
    }

    async fn fetch_runs(&self, event_id: &str) -> Result<Vec<RunView>> {
        let response = self
            .request(&format!("events/{}/runs", event_id), None)
            .await?;
        let parsed: RunList = serde_json::from_str(&response)
            .map_err(|e| RagError::Other(anyhow::anyhow!("Invalid runs response: {}", e)))?;
        Ok(parsed.data)
    }

    /// Poll the first run of `event_id` until it finishes.
    ///
    /// Returns the run output on success, [`RagError::RunFailed`] when the
    /// run failed or was cancelled and [`RagError::Timeout`] when `timeout`
    /// elapses first. A timeout says nothing about the run itself, which may
    /// still complete on the server.
    #[inline]
    pub async fn wait_for_run_output(
        &self,
        event_id: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Value> {
        let start = Instant::now();
        let mut last_status = None;

        loop {
            let runs = self.fetch_runs(event_id).await?;
            if let Some(run) = runs.into_iter().next() {
                let status = run.status.unwrap_or_default();
                if COMPLETED_STATUSES.contains(&status.as_str()) {
                    debug!("Run for {} finished with {}", event_id, status);
                    return Ok(run.output.unwrap_or_else(|| json!({})));
                }
                if FAILED_STATUSES.contains(&status.as_str()) {
                    return Err(RagError::RunFailed { status });
                }
                last_status = Some(status);
            }

            let waited = start.elapsed();
            if waited >= timeout {
                return Err(RagError::Timeout {
                    waited,
                    last_status,
                });
            }
            tokio::time::sleep(poll_interval.min(timeout - waited)).await;
        }
    }
}

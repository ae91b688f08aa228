// Blocking HTTP plumbing shared by the provider clients

#[cfg(test)]
mod tests;

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Longest slice of an error body kept in error messages
const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(#[from] ureq::Error),
}

/// Authenticated JSON client for an OpenAI-compatible provider
#[derive(Debug, Clone)]
pub struct ProviderHttp {
    agent: ureq::Agent,
    api_key: String,
    site_url: String,
    app_name: String,
}

impl ProviderHttp {
    #[inline]
    pub fn new(timeout: Duration, api_key: &str, site_url: &str, app_name: &str) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            agent,
            api_key: api_key.to_string(),
            site_url: site_url.to_string(),
            app_name: app_name.to_string(),
        }
    }

    /// POST a JSON body and return the response text of a 2xx reply
    #[inline]
    pub fn post_json(&self, url: &str, body: &str) -> Result<String, HttpError> {
        debug!("POST {} ({} bytes)", url, body.len());

        let mut request = self
            .agent
            .post(url)
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", &self.site_url)
            .header("X-Title", &self.app_name);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", &format!("Bearer {}", self.api_key));
        }

        let mut response = request.send(body)?;
        let status = response.status().as_u16();
        let text = response.body_mut().read_to_string()?;
        check_status(url, status, text)
    }

    /// GET a resource and return the response text of a 2xx reply
    #[inline]
    pub fn get(&self, url: &str) -> Result<String, HttpError> {
        debug!("GET {}", url);

        let mut request = self.agent.get(url);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", &format!("Bearer {}", self.api_key));
        }

        let mut response = request.call()?;
        let status = response.status().as_u16();
        let text = response.body_mut().read_to_string()?;
        check_status(url, status, text)
    }
}

fn check_status(url: &str, status: u16, body: String) -> Result<String, HttpError> {
    if (200..300).contains(&status) {
        return Ok(body);
    }

    warn!("Request to {} failed with status {}", url, status);
    Err(HttpError::Status {
        status,
        body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
    })
}

/// Join a base URL and an endpoint path without dropping the base's last segment
#[inline]
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

//! Alternate "official" Cloud API transport, used only for lines that carry
//! direct credentials (token + number id).

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::models::line::CloudApiCredentials;
use crate::services::gateway::TemplateComponent;

const GRAPH_API_BASE: &str = "https://graph.facebook.com/v18.0";

#[derive(Debug, Deserialize)]
struct CloudSendResponse {
    messages: Vec<CloudMessage>,
}

#[derive(Debug, Deserialize)]
struct CloudMessage {
    id: String,
}

pub struct CloudApiClient {
    http: Client,
    base_url: String,
}

impl CloudApiClient {
    pub fn new() -> Result<Self, CloudApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(CloudApiError::Http)?;

        Ok(Self {
            http,
            base_url: GRAPH_API_BASE.to_string(),
        })
    }

    /// Send a template message directly through the Cloud API. Returns the
    /// provider message id.
    pub async fn send_template(
        &self,
        credentials: &CloudApiCredentials,
        to: &str,
        template_name: &str,
        language: &str,
        components: &[TemplateComponent],
    ) -> Result<String, CloudApiError> {
        let url = format!("{}/{}/messages", self.base_url, credentials.number_id);

        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "template",
            "template": {
                "name": template_name,
                "language": { "code": language },
                "components": components,
            }
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&credentials.token)
            .json(&body)
            .send()
            .await
            .map_err(CloudApiError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CloudApiError::Status { status: status.as_u16(), detail });
        }

        let parsed: CloudSendResponse = response.json().await.map_err(CloudApiError::Http)?;
        parsed
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or(CloudApiError::EmptyResponse)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CloudApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cloud API returned HTTP {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("Cloud API response carried no message id")]
    EmptyResponse,
}

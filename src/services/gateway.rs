//! Client for the chat gateway HTTP API.
//!
//! Every call goes through a circuit breaker keyed by
//! `<operation>-<instance>`: strict policy for real sends, tolerant for
//! typing/presence cosmetics.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::services::breaker::{BreakerPolicy, BreakerRegistry};

/// Gateway response shape for message sends.
#[derive(Debug, Deserialize)]
struct SendResponse {
    key: MessageKey,
}

#[derive(Debug, Deserialize)]
struct MessageKey {
    id: String,
}

/// Presence states the gateway understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Available,
    Unavailable,
}

impl Presence {
    fn as_str(self) -> &'static str {
        match self {
            Presence::Available => "available",
            Presence::Unavailable => "unavailable",
        }
    }
}

/// One entry of the gateway's number-validation response.
#[derive(Debug, Clone, Deserialize)]
pub struct NumberCheck {
    pub number: String,
    pub exists: bool,
    pub jid: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TemplateComponent {
    #[serde(rename = "type")]
    pub kind: String,
    pub parameters: Vec<serde_json::Value>,
}

pub struct GatewayClient {
    http: Client,
    base_url: String,
    api_key: String,
    breakers: Arc<BreakerRegistry>,
}

impl GatewayClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(GatewayError::Http)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            breakers: Arc::new(BreakerRegistry::new()),
        })
    }

    /// Send plain text through a line. Returns the gateway message id.
    pub async fn send_text(
        &self,
        instance: &str,
        to: &str,
        text: &str,
    ) -> Result<String, GatewayError> {
        let body = serde_json::json!({ "number": to, "text": text });
        let resp: SendResponse = self
            .post_json("sendText", instance, "message/sendText", &body, BreakerPolicy::Strict)
            .await?;
        Ok(resp.key.id)
    }

    /// Send via the gateway's template endpoint.
    pub async fn send_template(
        &self,
        instance: &str,
        to: &str,
        template_name: &str,
        language: &str,
        components: &[TemplateComponent],
    ) -> Result<String, GatewayError> {
        let body = serde_json::json!({
            "number": to,
            "template": {
                "name": template_name,
                "language": language,
                "components": components,
            }
        });
        let resp: SendResponse = self
            .post_json("sendTemplate", instance, "message/sendTemplate", &body, BreakerPolicy::Strict)
            .await?;
        Ok(resp.key.id)
    }

    /// Show a typing indicator for roughly `duration_ms`. Cosmetic: callers
    /// log failures and move on.
    pub async fn send_typing(
        &self,
        instance: &str,
        to: &str,
        duration_ms: u64,
    ) -> Result<(), GatewayError> {
        let body = serde_json::json!({ "number": to, "delay": duration_ms });
        let _: serde_json::Value = self
            .post_json("sendTyping", instance, "chat/sendTyping", &body, BreakerPolicy::Tolerant)
            .await?;
        Ok(())
    }

    /// Flip a line's presence. Cosmetic, same contract as typing.
    pub async fn send_presence(
        &self,
        instance: &str,
        presence: Presence,
    ) -> Result<(), GatewayError> {
        let body = serde_json::json!({ "presence": presence.as_str() });
        let _: serde_json::Value = self
            .post_json("sendPresence", instance, "chat/sendPresence", &body, BreakerPolicy::Tolerant)
            .await?;
        Ok(())
    }

    /// Validate which of `numbers` exist on the chat network.
    pub async fn check_numbers(
        &self,
        instance: &str,
        numbers: &[String],
    ) -> Result<Vec<NumberCheck>, GatewayError> {
        let body = serde_json::json!({ "numbers": numbers });
        self.post_json("whatsappNumbers", instance, "chat/whatsappNumbers", &body, BreakerPolicy::Tolerant)
            .await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        instance: &str,
        path: &str,
        body: &serde_json::Value,
        policy: BreakerPolicy,
    ) -> Result<T, GatewayError> {
        let breaker = self.breakers.get(operation, instance, policy);
        if !breaker.try_acquire() {
            return Err(GatewayError::CircuitOpen(format!("{operation}-{instance}")));
        }

        let url = format!("{}/{}/{}", self.base_url, path, instance);
        let result: Result<T, GatewayError> = async {
            let response = self
                .http
                .post(&url)
                .header("apikey", &self.api_key)
                .json(body)
                .send()
                .await
                .map_err(GatewayError::Http)?;

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                return Err(GatewayError::Status { status: status.as_u16(), detail });
            }

            response.json::<T>().await.map_err(GatewayError::Http)
        }
        .await;

        match &result {
            Ok(_) => breaker.record_success(),
            Err(_) => breaker.record_failure(),
        }
        result
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway returned HTTP {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("circuit open for {0}")]
    CircuitOpen(String),
}

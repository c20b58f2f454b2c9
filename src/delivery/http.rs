use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use super::{Delivery, Payload};
use crate::error::DeliveryError;
use crate::models::Envelope;

/// Longest response body kept in a `DeliveryError::Status`.
const MAX_ERROR_BODY: usize = 1024;

/// POSTs the envelope body as JSON. 2xx is success, everything else fails.
#[derive(Debug, Clone)]
pub struct HttpDelivery {
    client: reqwest::Client,
    endpoint: String,
    action: Option<String>,
}

impl HttpDelivery {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            action: None,
        }
    }

    /// Merge `"action": <action>` into every object body.
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn body<P: Payload>(&self, envelope: &Envelope<P>) -> Result<Value, DeliveryError> {
        let mut body = serde_json::to_value(&envelope.body)?;
        if let (Some(action), Value::Object(map)) = (&self.action, &mut body) {
            map.insert("action".to_string(), Value::String(action.clone()));
        }
        Ok(body)
    }
}

#[async_trait]
impl<P: Payload> Delivery<P> for HttpDelivery {
    async fn deliver(&self, envelope: &Envelope<P>) -> Result<(), DeliveryError> {
        let body = self.body(envelope)?;

        let mut req = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json");

        if let Some(token) = &envelope.auth_token {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let resp = req.json(&body).send().await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(MAX_ERROR_BODY)
            .collect::<String>();

        Err(DeliveryError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::gateway::{
    Button, GatewayConfig, GatewayError, MessageGateway, SentMessage, SessionInfo,
};
use crate::phone;

/// Client for the WAHA (WhatsApp HTTP API) server.
#[derive(Debug, Clone)]
pub struct WahaClient {
    client: Client,
    config: GatewayConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TextPayload<'a> {
    chat_id: String,
    text: &'a str,
    session: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ButtonsPayload<'a> {
    chat_id: String,
    text: &'a str,
    buttons: &'a [Button],
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<&'a str>,
    session: &'a str,
}

impl WahaClient {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.config.gateway_url.trim_end_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.header("X-Api-Key", key),
            None => request,
        }
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        let response = self.authorize(request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api { status, body });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl MessageGateway for WahaClient {
    async fn send_message(&self, phone_number: &str, text: &str) -> Result<SentMessage, GatewayError> {
        let chat_id = phone::chat_id(phone_number, &self.config.country_code);
        debug!(chat_id = %chat_id, "sending whatsapp text");

        let payload = TextPayload {
            chat_id,
            text,
            session: &self.config.session_name,
        };

        self.execute(self.client.post(self.url("/api/sendText")).json(&payload))
            .await
    }

    async fn send_message_with_buttons(
        &self,
        phone_number: &str,
        text: &str,
        buttons: &[Button],
        footer: Option<&str>,
    ) -> Result<SentMessage, GatewayError> {
        let chat_id = phone::chat_id(phone_number, &self.config.country_code);
        debug!(chat_id = %chat_id, buttons = buttons.len(), "sending whatsapp buttons");

        let payload = ButtonsPayload {
            chat_id,
            text,
            buttons,
            footer,
            session: &self.config.session_name,
        };

        self.execute(self.client.post(self.url("/api/sendButtons")).json(&payload))
            .await
    }

    async fn session_status(&self) -> Result<SessionInfo, GatewayError> {
        let endpoint = format!("/api/sessions/{}", self.config.session_name);
        self.execute(self.client.get(self.url(&endpoint))).await
    }
}

//! Graph API sender: `POST /me/messages` with a page access token.

use std::time::Instant;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::channels::{MessageSender, SendReceipt, fit_message};
use crate::config::GraphConfig;
use crate::error::DeliveryError;

/// Sends direct messages through the Graph API.
pub struct GraphSender {
    base_url: String,
    access_token: SecretString,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    message_id: Option<String>,
}

impl GraphSender {
    pub fn new(config: &GraphConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self) -> String {
        format!("{}/me/messages", self.base_url)
    }
}

#[async_trait]
impl MessageSender for GraphSender {
    async fn send_message(
        &self,
        recipient_id: &str,
        text: &str,
    ) -> Result<SendReceipt, DeliveryError> {
        let text = fit_message(text);
        let body = serde_json::json!({
            "recipient": { "id": recipient_id },
            "message": { "text": text },
        });

        let started = Instant::now();
        let resp = self
            .client
            .post(self.api_url())
            .bearer_auth(self.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(recipient_id, status = status.as_u16(), "Graph API rejected send");
            return Err(DeliveryError::Rejected {
                recipient: recipient_id.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SendResponse = resp
            .json()
            .await
            .map_err(|e| DeliveryError::InvalidResponse(e.to_string()))?;
        let message_id = parsed
            .message_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| DeliveryError::InvalidResponse("missing message_id".into()))?;

        let latency_ms = started.elapsed().as_millis() as u64;
        debug!(recipient_id, message_id = %message_id, latency_ms, "Message sent");
        Ok(SendReceipt {
            message_id,
            latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::{Json, Router, http::HeaderMap, http::StatusCode, routing::post};
    use tokio::net::TcpListener;

    async fn start_fake_graph(status: StatusCode, body: serde_json::Value) -> String {
        let app = Router::new().route(
            "/me/messages",
            post(move |headers: HeaderMap, Json(req): Json<serde_json::Value>| {
                let body = body.clone();
                async move {
                    let authorized = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        == Some("Bearer test-token");
                    if !authorized || req["recipient"]["id"].is_null() {
                        return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({})));
                    }
                    (status, Json(body))
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://127.0.0.1:{port}")
    }

    fn sender(base_url: String) -> GraphSender {
        GraphSender::new(&GraphConfig {
            base_url,
            access_token: SecretString::from("test-token"),
        })
    }

    #[tokio::test]
    async fn successful_send_returns_receipt() {
        let url = start_fake_graph(
            StatusCode::OK,
            serde_json::json!({"recipient_id": "u1", "message_id": "m_out_1"}),
        )
        .await;
        let receipt = sender(url).send_message("u1", "hello").await.unwrap();
        assert_eq!(receipt.message_id, "m_out_1");
    }

    #[tokio::test]
    async fn error_status_is_rejected() {
        let url = start_fake_graph(
            StatusCode::BAD_REQUEST,
            serde_json::json!({"error": {"message": "bad recipient"}}),
        )
        .await;
        let err = sender(url).send_message("u1", "hello").await.unwrap_err();
        match err {
            DeliveryError::Rejected { status, body, .. } => {
                assert_eq!(status, 400);
                assert!(body.contains("bad recipient"));
            }
            other => panic!("Expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_message_id_is_invalid() {
        let url = start_fake_graph(StatusCode::OK, serde_json::json!({"recipient_id": "u1"})).await;
        let err = sender(url).send_message("u1", "hello").await.unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_http_error() {
        let err = sender("http://127.0.0.1:1".into())
            .send_message("u1", "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Http(_)));
    }
}

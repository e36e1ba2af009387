//! Outbound notification messages and the transports that deliver them.

use crate::config::TransportConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

/// One email-shaped message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationRequest {
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub transport: &'static str,
    pub message_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("transport request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("dispatch timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, message: &NotificationRequest) -> Result<DeliveryReceipt, DispatchError>;
}

/// Sends through `sink`, giving up after `limit`.
pub async fn dispatch(
    sink: &dyn NotificationSink,
    message: &NotificationRequest,
    limit: Duration,
) -> Result<DeliveryReceipt, DispatchError> {
    match tokio::time::timeout(limit, sink.send(message)).await {
        Ok(result) => result,
        Err(_) => Err(DispatchError::Timeout(limit)),
    }
}

pub fn build_sink(transport: &TransportConfig) -> Arc<dyn NotificationSink> {
    match transport {
        TransportConfig::SendGrid { api_key } => Arc::new(SendGridSink::new(api_key.clone())),
        TransportConfig::Relay { url, token } => {
            Arc::new(RelaySink::new(url.clone(), token.clone()))
        }
        TransportConfig::Log => Arc::new(LogSink),
    }
}

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, message: &NotificationRequest) -> Result<DeliveryReceipt, DispatchError> {
        info!(
            from = %message.from,
            to = %message.to,
            reply_to = ?message.reply_to,
            subject = %message.subject,
            "Mail (log transport):\n{}",
            message.text
        );
        Ok(DeliveryReceipt {
            transport: "log",
            message_id: None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SendGridSink {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl SendGridSink {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            endpoint: SENDGRID_ENDPOINT.to_string(),
        }
    }
}

fn sendgrid_payload(message: &NotificationRequest) -> serde_json::Value {
    let mut payload = json!({
        "personalizations": [{ "to": [{ "email": message.to }] }],
        "from": { "email": message.from },
        "subject": message.subject,
        "content": [
            { "type": "text/plain", "value": message.text },
            { "type": "text/html", "value": message.html }
        ]
    });
    if let Some(reply_to) = &message.reply_to {
        payload["reply_to"] = json!({ "email": reply_to });
    }
    payload
}

#[async_trait]
impl NotificationSink for SendGridSink {
    async fn send(&self, message: &NotificationRequest) -> Result<DeliveryReceipt, DispatchError> {
        let res = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&sendgrid_payload(message))
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let message_id = res
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        Ok(DeliveryReceipt {
            transport: "sendgrid",
            message_id,
        })
    }
}

/// Posts the message as JSON to an HTTPS mail relay.
#[derive(Debug, Clone)]
pub struct RelaySink {
    client: Client,
    url: String,
    token: Option<String>,
}

impl RelaySink {
    pub fn new(url: String, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            url,
            token,
        }
    }
}

#[async_trait]
impl NotificationSink for RelaySink {
    async fn send(&self, message: &NotificationRequest) -> Result<DeliveryReceipt, DispatchError> {
        let mut req = self.client.post(&self.url).json(message);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let message_id = res
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string));
        Ok(DeliveryReceipt {
            transport: "relay",
            message_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> NotificationRequest {
        NotificationRequest {
            from: "noreply@flightservice365.com".into(),
            to: "contact@flightservice365.com".into(),
            reply_to: Some("jo@example.com".into()),
            subject: "Contact Form Submission from Jo".into(),
            text: "Hi".into(),
            html: "<p>Hi</p>".into(),
        }
    }

    struct Stalled;

    #[async_trait]
    impl NotificationSink for Stalled {
        async fn send(&self, _message: &NotificationRequest) -> Result<DeliveryReceipt, DispatchError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(DeliveryReceipt {
                transport: "stalled",
                message_id: None,
            })
        }
    }

    #[test]
    fn sendgrid_payload_shape() {
        let payload = sendgrid_payload(&message());
        assert_eq!(
            payload["personalizations"][0]["to"][0]["email"],
            "contact@flightservice365.com"
        );
        assert_eq!(payload["reply_to"]["email"], "jo@example.com");
        assert_eq!(payload["content"][1]["type"], "text/html");

        let mut without_reply = message();
        without_reply.reply_to = None;
        assert!(sendgrid_payload(&without_reply).get("reply_to").is_none());
    }

    #[tokio::test]
    async fn log_sink_always_delivers() {
        let receipt = LogSink.send(&message()).await.unwrap();
        assert_eq!(receipt.transport, "log");
    }

    #[tokio::test]
    async fn dispatch_times_out() {
        let limit = Duration::from_millis(20);
        let err = dispatch(&Stalled, &message(), limit).await.unwrap_err();
        assert!(matches!(err, DispatchError::Timeout(d) if d == limit));
    }

    #[test]
    fn build_sink_follows_config() {
        // Only checks construction; no network traffic.
        let _ = build_sink(&TransportConfig::Log);
        let _ = build_sink(&TransportConfig::SendGrid {
            api_key: "key".into(),
        });
        let _ = build_sink(&TransportConfig::Relay {
            url: "https://relay.example.com".into(),
            token: None,
        });
    }
}

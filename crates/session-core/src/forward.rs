//! Inbound message forwarding.
//!
//! Qualifying inbound messages are POSTed to a configured webhook as JSON.
//! Delivery is fire-and-forget: a slow or failing webhook must never stall
//! the transport event pump, so each notification rides its own task and
//! failures are only logged.

use serde::Serialize;
use tracing::{debug, warn};

use rmsg_transport::{InboundMessage, SessionId};

/// Webhook payload for one inbound message.
///
/// Field names are part of the wire contract with existing consumers, so
/// the two camelCase spellings are pinned with renames.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InboundNotification {
    pub remote_id: String,
    pub secret: Option<String>,
    pub from: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub message_id: String,
    /// The full raw message object, whatever its shape.
    pub message: serde_json::Value,
    /// Sender-side send time, seconds since the Unix epoch.
    pub timestamp: i64,
    /// Coarse classification: `text`, `quoted` or `unknown`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The text being replied to, for `quoted` messages.
    pub quoted: Option<String>,
}

/// Pushes inbound message notifications to one webhook endpoint.
pub struct EventForwarder {
    client: reqwest::Client,
    url: String,
    secret: Option<String>,
}

impl EventForwarder {
    pub fn new(url: String, secret: Option<String>) -> Self {
        Self { client: reqwest::Client::new(), url, secret }
    }

    /// Build the payload for a qualifying message. Self-authored messages
    /// and group traffic are dropped here.
    pub fn notification(
        &self,
        session: &SessionId,
        message: &InboundMessage,
    ) -> Option<InboundNotification> {
        if message.from_me || !message.chat.is_direct() {
            return None;
        }
        Some(InboundNotification {
            remote_id: message.chat.as_str().to_string(),
            secret: self.secret.clone(),
            from: message.chat.as_str().to_string(),
            session_id: session.to_string(),
            message_id: message.id.clone(),
            message: message.content.as_value().clone(),
            timestamp: message.timestamp.timestamp(),
            kind: message.content.kind().as_str().to_string(),
            quoted: message.content.quoted_text().map(str::to_string),
        })
    }

    /// Forward one message if it qualifies. Never blocks the caller.
    pub fn notify(&self, session: &SessionId, message: &InboundMessage) {
        let Some(payload) = self.notification(session, message) else {
            debug!(session = %session, message = %message.id, "not forwarding");
            return;
        };
        let client = self.client.clone();
        let url = self.url.clone();
        tokio::spawn(async move {
            match client.post(&url).json(&payload).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(status = %resp.status(), message = %payload.message_id, "webhook delivered");
                }
                Ok(resp) => {
                    warn!(status = %resp.status(), message = %payload.message_id, "webhook rejected");
                }
                Err(e) => {
                    warn!(error = %e, message = %payload.message_id, "webhook delivery failed");
                }
            }
        });
    }
}

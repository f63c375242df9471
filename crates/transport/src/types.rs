//! Core addressing and content types shared across the transport boundary.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// External identifier for one messaging account.
///
/// Sole key into the session registry and the credential store. Opaque to the
/// transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Which credential format a session was persisted with.
///
/// Selects the storage key prefix. New sessions are always `Modern`; `Legacy`
/// survives so blobs written by older deployments can still be rehydrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthVariant {
    Legacy,
    Modern,
}

impl AuthVariant {
    /// Storage key prefix for this variant.
    pub fn storage_prefix(&self) -> &'static str {
        match self {
            AuthVariant::Legacy => "legacy_",
            AuthVariant::Modern => "md_",
        }
    }

    /// Inverse of [`storage_prefix`](Self::storage_prefix): recognize a
    /// prefixed storage key, returning the variant and the bare session id.
    pub fn split_storage_key(key: &str) -> Option<(AuthVariant, &str)> {
        if let Some(rest) = key.strip_prefix("md_") {
            Some((AuthVariant::Modern, rest))
        } else if let Some(rest) = key.strip_prefix("legacy_") {
            Some((AuthVariant::Legacy, rest))
        } else {
            None
        }
    }
}

/// Protocol address of a chat peer: `<user>@<server>`.
///
/// Direct conversations live on the `s.whatsapp.net` server part, groups on
/// `g.us`. Constructors canonicalize free-form input the same way the REST
/// layer expects it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Jid(pub String);

impl Jid {
    const USER_SERVER: &'static str = "s.whatsapp.net";
    const GROUP_SERVER: &'static str = "g.us";

    /// Canonicalize a phone number into a direct-chat jid.
    ///
    /// Already-formed jids pass through unchanged; anything else is stripped
    /// to its digits and suffixed with the user server part.
    pub fn user(phone: &str) -> Self {
        if phone.ends_with("@s.whatsapp.net") {
            return Self(phone.to_string());
        }
        let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
        Self(format!("{digits}@{}", Self::USER_SERVER))
    }

    /// Canonicalize a group id into a group jid.
    ///
    /// Group ids keep digits and hyphens (historic group ids carry a
    /// `<creator>-<timestamp>` shape).
    pub fn group(id: &str) -> Self {
        if id.ends_with("@g.us") {
            return Self(id.to_string());
        }
        let kept: String = id
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '-')
            .collect();
        Self(format!("{kept}@{}", Self::GROUP_SERVER))
    }

    /// Wrap an already-formed jid without canonicalization.
    pub fn raw(jid: impl Into<String>) -> Self {
        Self(jid.into())
    }

    /// Server part after the `@`, if any.
    pub fn server(&self) -> Option<&str> {
        self.0.split_once('@').map(|(_, server)| server)
    }

    /// True for direct (one-to-one) conversations.
    pub fn is_direct(&self) -> bool {
        self.server() == Some(Self::USER_SERVER)
    }

    /// True for group conversations. Anything that is not provably a direct
    /// chat counts as a group for forwarding purposes.
    pub fn is_group(&self) -> bool {
        !self.is_direct()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Jid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persisted credential blob for one session.
///
/// Opaque JSON owned by the credential store; the transport mutates it
/// through credentials-changed events and decides whether it carries a usable
/// identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthState {
    /// Raw credential material as the transport shaped it.
    pub creds: Value,
}

impl AuthState {
    /// Blob for a session that has never paired.
    pub fn empty() -> Self {
        Self { creds: json!({}) }
    }

    pub fn new(creds: Value) -> Self {
        Self { creds }
    }

    /// Blob carrying a usable identity for `me_jid`; opening it never
    /// requires pairing.
    pub fn registered(me_jid: &Jid) -> Self {
        Self {
            creds: json!({
                "registered": true,
                "me": { "id": me_jid.as_str() },
            }),
        }
    }

    /// Whether this blob carries a usable identity.
    pub fn is_registered(&self) -> bool {
        self.creds
            .get("registered")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Best-effort classification of inbound message content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Quoted,
    Unknown,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Quoted => "quoted",
            MessageKind::Unknown => "unknown",
        }
    }
}

/// Message content in its wire shape.
///
/// Plain text rides as `{"conversation": ...}`; a reply quoting an earlier
/// message as `{"extendedTextMessage": {"text": ..., "contextInfo":
/// {"quotedMessage": {"conversation": ...}}}}`. Everything else passes
/// through untouched and classifies as [`MessageKind::Unknown`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageContent(pub Value);

impl MessageContent {
    /// Plain text body.
    pub fn text(body: impl Into<String>) -> Self {
        Self(json!({ "conversation": body.into() }))
    }

    /// Reply text quoting an earlier conversation message.
    pub fn quoting(body: impl Into<String>, quoted: impl Into<String>) -> Self {
        Self(json!({
            "extendedTextMessage": {
                "text": body.into(),
                "contextInfo": {
                    "quotedMessage": { "conversation": quoted.into() },
                },
            },
        }))
    }

    /// Classify this content for webhook notification purposes.
    pub fn kind(&self) -> MessageKind {
        if self.conversation().is_some() {
            MessageKind::Text
        } else if self.quoted_text().is_some() {
            MessageKind::Quoted
        } else {
            MessageKind::Unknown
        }
    }

    /// Plain conversation body, when present.
    pub fn conversation(&self) -> Option<&str> {
        self.0.get("conversation").and_then(Value::as_str)
    }

    /// The quoted conversation text of a reply, when present.
    pub fn quoted_text(&self) -> Option<&str> {
        self.0
            .get("extendedTextMessage")?
            .get("contextInfo")?
            .get("quotedMessage")?
            .get("conversation")
            .and_then(Value::as_str)
    }

    /// Raw wire value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// One inbound message as the transport delivered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Protocol-level message id.
    pub id: String,
    /// Conversation the message belongs to (direct peer or group).
    pub chat: Jid,
    /// True when this account itself authored the message.
    pub from_me: bool,
    /// Server timestamp of the message.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Content in wire shape.
    pub content: MessageContent,
}

/// One participant of a group conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupParticipant {
    pub id: Jid,
    pub admin: bool,
    pub super_admin: bool,
}

/// Metadata of a group conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMetadata {
    pub id: Jid,
    pub subject: String,
    pub description: Option<String>,
    pub owner: Option<Jid>,
    /// Creation time as a unix timestamp, when the server reports one.
    pub creation: Option<i64>,
    pub participants: Vec<GroupParticipant>,
}

impl GroupMetadata {
    pub fn member_count(&self) -> usize {
        self.participants.len()
    }
}

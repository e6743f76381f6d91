mod wire;

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;

use crate::error::ChatError;
use crate::state::ChatMessage;

pub(crate) use wire::{decode_batch, ApiEnvelope, WireMessage};

pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ChatError>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub skip: u32,
}

impl Page {
    pub fn latest(limit: u32) -> Self {
        Self { limit, skip: 0 }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct OutgoingAttachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for OutgoingAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutgoingAttachment")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub attachment: Option<OutgoingAttachment>,
}

impl OutgoingMessage {
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.text.trim().is_empty() && self.attachment.is_none() {
            return Err(ChatError::validation("Message must have text or media"));
        }
        Ok(())
    }
}

/// Group message history and sending, as seen by the chat core.
///
/// Implementations must not touch core state; results are posted back to the
/// actor which decides whether they still apply.
pub trait MessageTransport: Send + Sync + 'static {
    fn fetch_messages<'a>(
        &'a self,
        group_id: &'a str,
        page: Page,
    ) -> TransportFuture<'a, Vec<ChatMessage>>;

    fn send_message<'a>(
        &'a self,
        group_id: &'a str,
        outgoing: OutgoingMessage,
    ) -> TransportFuture<'a, ChatMessage>;
}

pub type SharedMessageTransport = Arc<RwLock<Option<Arc<dyn MessageTransport>>>>;

/// Used when the network is disabled or no API URL is configured.
#[derive(Debug, Clone, Default)]
pub struct OfflineTransport;

impl MessageTransport for OfflineTransport {
    fn fetch_messages<'a>(
        &'a self,
        _group_id: &'a str,
        _page: Page,
    ) -> TransportFuture<'a, Vec<ChatMessage>> {
        Box::pin(async { Err(ChatError::Network("network disabled".into())) })
    }

    fn send_message<'a>(
        &'a self,
        _group_id: &'a str,
        outgoing: OutgoingMessage,
    ) -> TransportFuture<'a, ChatMessage> {
        Box::pin(async move {
            outgoing.validate()?;
            Err(ChatError::Network("network disabled".into()))
        })
    }
}

/// REST transport: `GET|POST {base}/groups/{group_id}/messages`.
#[derive(Debug, Clone)]
pub struct HttpMessageTransport {
    client: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpMessageTransport {
    pub fn new(base_url: &str, auth_token: Option<String>) -> Result<Self, ChatError> {
        let base_url = Url::parse(base_url.trim())
            .map_err(|e| ChatError::validation(format!("Invalid API URL: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(ChatError::validation(format!(
                "Invalid API URL: {base_url}"
            )));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url,
            auth_token: auth_token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn messages_url(&self, group_id: &str) -> Result<Url, ChatError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ChatError::validation("API URL cannot be a base"))?;
            segments
                .pop_if_empty()
                .extend(["groups", group_id, "messages"]);
        }
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl MessageTransport for HttpMessageTransport {
    fn fetch_messages<'a>(
        &'a self,
        group_id: &'a str,
        page: Page,
    ) -> TransportFuture<'a, Vec<ChatMessage>> {
        Box::pin(async move {
            let url = self.messages_url(group_id)?;
            let resp = self
                .authorize(
                    self.client
                        .get(url)
                        .query(&[("limit", page.limit), ("skip", page.skip)]),
                )
                .send()
                .await?;
            let items: Vec<serde_json::Value> = read_envelope(resp).await?;
            Ok(decode_batch(items))
        })
    }

    fn send_message<'a>(
        &'a self,
        group_id: &'a str,
        outgoing: OutgoingMessage,
    ) -> TransportFuture<'a, ChatMessage> {
        Box::pin(async move {
            outgoing.validate()?;
            let url = self.messages_url(group_id)?;

            let mut form = Form::new().text("message", outgoing.text);
            if let Some(attachment) = outgoing.attachment {
                let part = Part::bytes(attachment.bytes)
                    .file_name(attachment.file_name)
                    .mime_str(&attachment.mime_type)
                    .map_err(|e| ChatError::validation(format!("Invalid media type: {e}")))?;
                form = form.part("media", part);
            }

            let resp = self
                .authorize(self.client.post(url).multipart(form))
                .send()
                .await?;
            let status = resp.status().as_u16();
            let wire: WireMessage = read_envelope(resp).await?;
            wire.into_chat_message().ok_or_else(|| ChatError::Server {
                status: Some(status),
                message: "server returned an empty message".into(),
            })
        })
    }
}

async fn read_envelope<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ChatError> {
    let status = resp.status();
    let body = resp.bytes().await?;
    match serde_json::from_slice::<ApiEnvelope<T>>(&body) {
        Ok(ApiEnvelope {
            success: true,
            data: Some(data),
            ..
        }) if status.is_success() => Ok(data),
        Ok(envelope) => Err(ChatError::Server {
            status: Some(status.as_u16()),
            message: envelope
                .message
                .unwrap_or_else(|| "request was not successful".into()),
        }),
        Err(e) if status.is_success() => Err(ChatError::Server {
            status: Some(status.as_u16()),
            message: format!("malformed response: {e}"),
        }),
        Err(_) => Err(ChatError::Server {
            status: Some(status.as_u16()),
            message: status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        }),
    }
}

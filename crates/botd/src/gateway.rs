//! Messaging gateway channel.
//!
//! Implements [`MessagingChannel`] over the gateway daemon's HTTP API:
//! inbound updates arrive on a per-bot SSE stream, outbound sends are
//! plain JSON POSTs. Artifacts (voice, generated images) are passed by
//! filesystem path; the gateway runs on the same host.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use orchestrator::{
    ChannelCredentials, ChannelFactory, ChannelUpdate, FetchedMedia, InboundMessage, MediaRef,
    MessageId, MessagingChannel, OrchestratorError, PhotoSource,
};
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource, RequestBuilderExt};
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// One SSE update as the gateway serializes it.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum GatewayUpdate {
    Message {
        user_id: String,
        #[serde(default)]
        user_name: Option<String>,
        #[serde(default)]
        text: String,
        #[serde(default)]
        media_ref: Option<String>,
    },
    Error {
        detail: String,
    },
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    message_id: String,
}

#[derive(Debug, Deserialize)]
struct MediaResponse {
    mime: String,
    data: String,
}

/// A bot's connection to the messaging gateway.
pub struct GatewayChannel {
    http: Client,
    base_url: String,
    token: String,
    updates_rx: Mutex<mpsc::Receiver<ChannelUpdate>>,
    pump: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl GatewayChannel {
    /// Connect and start the SSE update pump for one bot.
    pub async fn connect(
        base_url: &str,
        credentials: &ChannelCredentials,
    ) -> Result<Self, OrchestratorError> {
        let http = Client::new();
        let token = credentials.token.clone();
        let base_url = base_url.trim_end_matches('/').to_string();

        let source = http
            .get(format!("{base_url}/api/v1/updates"))
            .bearer_auth(&token)
            .eventsource()
            .map_err(|e| OrchestratorError::ChannelFailure(e.to_string()))?;

        let (tx, rx) = mpsc::channel(256);
        let identity = credentials.identity.clone();
        let pump = tokio::spawn(pump_updates(source, tx, identity));

        Ok(Self {
            http,
            base_url,
            token,
            updates_rx: Mutex::new(rx),
            pump: Mutex::new(Some(pump)),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_send(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<MessageId, OrchestratorError> {
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| OrchestratorError::Delivery(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(OrchestratorError::Delivery(format!(
                "gateway rejected {path} with status {}",
                resp.status()
            )));
        }
        let sent: SendResponse = resp
            .json()
            .await
            .map_err(|e| OrchestratorError::Delivery(e.to_string()))?;
        Ok(MessageId(sent.message_id))
    }

    async fn post_ok(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<(), OrchestratorError> {
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| OrchestratorError::Delivery(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(OrchestratorError::Delivery(format!(
                "gateway rejected {path} with status {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

/// Forward gateway SSE updates into the channel until the stream ends.
async fn pump_updates(
    mut source: EventSource,
    tx: mpsc::Sender<ChannelUpdate>,
    identity: String,
) {
    while let Some(event) = source.next().await {
        match event {
            Ok(Event::Open) => {
                debug!(bot = %identity, "gateway update stream opened");
            }
            Ok(Event::Message(msg)) => {
                let update = match serde_json::from_str::<GatewayUpdate>(&msg.data) {
                    Ok(GatewayUpdate::Message {
                        user_id,
                        user_name,
                        text,
                        media_ref,
                    }) => ChannelUpdate::Message(InboundMessage {
                        user_id,
                        user_name,
                        text,
                        media: media_ref.map(MediaRef),
                    }),
                    Ok(GatewayUpdate::Error { detail }) => ChannelUpdate::Error(detail),
                    Err(err) => {
                        warn!(bot = %identity, "unparseable gateway update: {err}");
                        continue;
                    }
                };
                if tx.send(update).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                // Surface the stream error, then stop; the health
                // monitor handles reconnection.
                let _ = tx
                    .send(ChannelUpdate::Error(format!("update stream error: {err}")))
                    .await;
                break;
            }
        }
    }
    source.close();
}

#[async_trait]
impl MessagingChannel for GatewayChannel {
    async fn next_update(&self) -> Option<ChannelUpdate> {
        self.updates_rx.lock().await.recv().await
    }

    async fn send_text(&self, user_id: &str, text: &str) -> Result<MessageId, OrchestratorError> {
        self.post_send(
            "/api/v1/send/text",
            serde_json::json!({"user_id": user_id, "text": text}),
        )
        .await
    }

    async fn send_voice(
        &self,
        user_id: &str,
        audio: &Path,
    ) -> Result<MessageId, OrchestratorError> {
        self.post_send(
            "/api/v1/send/voice",
            serde_json::json!({"user_id": user_id, "path": audio.display().to_string()}),
        )
        .await
    }

    async fn send_photo(
        &self,
        user_id: &str,
        photo: PhotoSource,
        caption: Option<&str>,
    ) -> Result<MessageId, OrchestratorError> {
        let body = match photo {
            PhotoSource::Path(path) => serde_json::json!({
                "user_id": user_id,
                "path": path.display().to_string(),
                "caption": caption,
            }),
            PhotoSource::Url(url) => serde_json::json!({
                "user_id": user_id,
                "url": url,
                "caption": caption,
            }),
        };
        self.post_send("/api/v1/send/photo", body).await
    }

    async fn edit_text(
        &self,
        user_id: &str,
        message_id: &MessageId,
        text: &str,
    ) -> Result<(), OrchestratorError> {
        self.post_ok(
            "/api/v1/edit",
            serde_json::json!({
                "user_id": user_id,
                "message_id": message_id.0,
                "text": text,
            }),
        )
        .await
    }

    async fn delete_message(
        &self,
        user_id: &str,
        message_id: &MessageId,
    ) -> Result<(), OrchestratorError> {
        self.post_ok(
            "/api/v1/delete",
            serde_json::json!({"user_id": user_id, "message_id": message_id.0}),
        )
        .await
    }

    async fn fetch_media(&self, media: &MediaRef) -> Result<FetchedMedia, OrchestratorError> {
        let resp = self
            .http
            .get(self.url(&format!("/api/v1/media/{}", media.0)))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| OrchestratorError::MediaFetch(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(OrchestratorError::MediaFetch(format!(
                "gateway returned status {} for media {}",
                resp.status(),
                media.0
            )));
        }
        let media: MediaResponse = resp
            .json()
            .await
            .map_err(|e| OrchestratorError::MediaFetch(e.to_string()))?;
        Ok(FetchedMedia {
            mime: media.mime,
            data: media.data,
        })
    }

    async fn is_connected(&self) -> Result<bool, OrchestratorError> {
        let resp = self
            .http
            .get(self.url("/api/v1/health"))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| OrchestratorError::ChannelFailure(e.to_string()))?;
        Ok(resp.status().is_success())
    }

    async fn stop(&self) {
        if let Some(pump) = self.pump.lock().await.take() {
            pump.abort();
        }
    }
}

/// Creates gateway channels; also used by the health monitor to
/// recreate them during recovery.
pub struct GatewayChannelFactory {
    base_url: String,
}

impl GatewayChannelFactory {
    /// Factory for a gateway at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ChannelFactory for GatewayChannelFactory {
    async fn create(
        &self,
        credentials: &ChannelCredentials,
    ) -> Result<Arc<dyn MessagingChannel>, OrchestratorError> {
        let channel = GatewayChannel::connect(&self.base_url, credentials).await?;
        Ok(Arc::new(channel))
    }
}

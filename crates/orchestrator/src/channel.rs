//! Messaging channel trait and test implementations.
//!
//! Abstracted to support different transports (Telegram-style bots,
//! tests). The orchestrator never touches wire primitives directly;
//! everything goes through [`MessagingChannel`], and recovery recreates
//! channels through [`ChannelFactory`] with the same credentials.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::error::OrchestratorError;

/// Channel-assigned id of a sent message, usable for edit/delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageId(pub String);

/// Opaque reference to media attached to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef(pub String);

/// Downloaded media, converted to an embeddable representation.
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    /// MIME type, e.g. "image/jpeg".
    pub mime: String,
    /// Base64-encoded bytes.
    pub data: String,
}

/// Where a photo to send comes from.
#[derive(Debug, Clone)]
pub enum PhotoSource {
    /// A local artifact produced by the agent.
    Path(PathBuf),
    /// A remote URL (call-to-action photos).
    Url(String),
}

/// One inbound message from a user.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Channel-level user identifier.
    pub user_id: String,
    /// Display name, when the channel exposes one.
    pub user_name: Option<String>,
    /// Message text (possibly empty for media-only messages).
    pub text: String,
    /// Attached media, when present.
    pub media: Option<MediaRef>,
}

/// Updates delivered by a bot's ingestion channel.
#[derive(Debug, Clone)]
pub enum ChannelUpdate {
    /// A user message.
    Message(InboundMessage),
    /// The channel reported an error; counts toward the bot's error
    /// threshold.
    Error(String),
}

/// Credentials a channel is created from. Recovery recreates the channel
/// with these same values.
#[derive(Debug, Clone)]
pub struct ChannelCredentials {
    /// Bot identity on the channel (e.g. a bot username).
    pub identity: String,
    /// Channel API token.
    pub token: String,
}

/// A bot's messaging channel.
#[async_trait]
pub trait MessagingChannel: Send + Sync {
    /// Receive the next inbound update. `None` means the channel has
    /// stopped delivering (stopped or torn down).
    async fn next_update(&self) -> Option<ChannelUpdate>;

    /// Send a text message.
    async fn send_text(&self, user_id: &str, text: &str) -> Result<MessageId, OrchestratorError>;

    /// Send a voice message from a local audio artifact.
    async fn send_voice(&self, user_id: &str, audio: &Path) -> Result<MessageId, OrchestratorError>;

    /// Send a photo, optionally captioned.
    async fn send_photo(
        &self,
        user_id: &str,
        photo: PhotoSource,
        caption: Option<&str>,
    ) -> Result<MessageId, OrchestratorError>;

    /// Edit a previously sent text message.
    async fn edit_text(
        &self,
        user_id: &str,
        message_id: &MessageId,
        text: &str,
    ) -> Result<(), OrchestratorError>;

    /// Delete a previously sent message.
    async fn delete_message(
        &self,
        user_id: &str,
        message_id: &MessageId,
    ) -> Result<(), OrchestratorError>;

    /// Download inbound media and convert it to an embeddable form.
    async fn fetch_media(&self, media: &MediaRef) -> Result<FetchedMedia, OrchestratorError>;

    /// Liveness probe for the health monitor.
    async fn is_connected(&self) -> Result<bool, OrchestratorError>;

    /// Stop receiving updates. Idempotent.
    async fn stop(&self);
}

/// Creates channels from credentials. Used at registration and by the
/// health monitor during recovery.
#[async_trait]
pub trait ChannelFactory: Send + Sync {
    /// Create and connect a channel for the given credentials.
    async fn create(
        &self,
        credentials: &ChannelCredentials,
    ) -> Result<Arc<dyn MessagingChannel>, OrchestratorError>;
}

/// A no-op channel that delivers nothing and discards all sends.
#[derive(Debug, Default)]
pub struct NoopChannel;

#[async_trait]
impl MessagingChannel for NoopChannel {
    async fn next_update(&self) -> Option<ChannelUpdate> {
        None
    }

    async fn send_text(&self, _user_id: &str, _text: &str) -> Result<MessageId, OrchestratorError> {
        Ok(MessageId("noop".to_string()))
    }

    async fn send_voice(
        &self,
        _user_id: &str,
        _audio: &Path,
    ) -> Result<MessageId, OrchestratorError> {
        Ok(MessageId("noop".to_string()))
    }

    async fn send_photo(
        &self,
        _user_id: &str,
        _photo: PhotoSource,
        _caption: Option<&str>,
    ) -> Result<MessageId, OrchestratorError> {
        Ok(MessageId("noop".to_string()))
    }

    async fn edit_text(
        &self,
        _user_id: &str,
        _message_id: &MessageId,
        _text: &str,
    ) -> Result<(), OrchestratorError> {
        Ok(())
    }

    async fn delete_message(
        &self,
        _user_id: &str,
        _message_id: &MessageId,
    ) -> Result<(), OrchestratorError> {
        Ok(())
    }

    async fn fetch_media(&self, media: &MediaRef) -> Result<FetchedMedia, OrchestratorError> {
        Err(OrchestratorError::MediaFetch(format!(
            "noop channel cannot fetch {}",
            media.0
        )))
    }

    async fn is_connected(&self) -> Result<bool, OrchestratorError> {
        Ok(true)
    }

    async fn stop(&self) {}
}

/// Operations recorded by [`RecordingChannel`].
#[derive(Debug, Clone)]
pub enum SentOp {
    /// `send_text(user, text)`.
    Text { user_id: String, text: String },
    /// `send_voice(user, path)`.
    Voice { user_id: String, path: PathBuf },
    /// `send_photo(user, source, caption)`.
    Photo {
        user_id: String,
        caption: Option<String>,
    },
    /// `edit_text(user, id, text)`.
    Edit {
        user_id: String,
        message_id: MessageId,
        text: String,
    },
    /// `delete_message(user, id)`.
    Delete {
        user_id: String,
        message_id: MessageId,
    },
}

/// An in-memory channel for tests: sends are recorded, inbound updates
/// are pushed by the test, and failure modes are switchable.
pub struct RecordingChannel {
    ops: Mutex<Vec<SentOp>>,
    // Dropped on `stop` so a pending `next_update` wakes with `None`.
    updates_tx: Mutex<Option<mpsc::Sender<ChannelUpdate>>>,
    updates_rx: Mutex<mpsc::Receiver<ChannelUpdate>>,
    next_id: std::sync::atomic::AtomicU64,
    text_attempts: std::sync::atomic::AtomicU64,
    connected: AtomicBool,
    fail_text: AtomicBool,
    fail_voice: AtomicBool,
    fail_media: AtomicBool,
    stopped: AtomicBool,
}

impl Default for RecordingChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingChannel {
    /// Create a recording channel reporting as connected.
    pub fn new() -> Self {
        let (updates_tx, updates_rx) = mpsc::channel(64);
        Self {
            ops: Mutex::new(Vec::new()),
            updates_tx: Mutex::new(Some(updates_tx)),
            updates_rx: Mutex::new(updates_rx),
            next_id: std::sync::atomic::AtomicU64::new(1),
            text_attempts: std::sync::atomic::AtomicU64::new(0),
            connected: AtomicBool::new(true),
            fail_text: AtomicBool::new(false),
            fail_voice: AtomicBool::new(false),
            fail_media: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Push an inbound update into the channel.
    pub async fn push_update(&self, update: ChannelUpdate) {
        if let Some(tx) = self.updates_tx.lock().await.as_ref() {
            let _ = tx.send(update).await;
        }
    }

    /// All recorded send/edit/delete operations, in order.
    pub async fn ops(&self) -> Vec<SentOp> {
        self.ops.lock().await.clone()
    }

    /// Texts sent so far, in order.
    pub async fn texts(&self) -> Vec<String> {
        self.ops
            .lock()
            .await
            .iter()
            .filter_map(|op| match op {
                SentOp::Text { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Flip the liveness probe result.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// `send_text` attempts so far, including failed ones.
    pub fn text_attempts(&self) -> u64 {
        self.text_attempts.load(Ordering::SeqCst)
    }

    /// Make `send_text` fail (delivery degradation tests).
    pub fn set_fail_text(&self, fail: bool) {
        self.fail_text.store(fail, Ordering::SeqCst);
    }

    /// Make `send_voice` fail (audio fallback tests).
    pub fn set_fail_voice(&self, fail: bool) {
        self.fail_voice.store(fail, Ordering::SeqCst);
    }

    /// Make `fetch_media` fail (media best-effort tests).
    pub fn set_fail_media(&self, fail: bool) {
        self.fail_media.store(fail, Ordering::SeqCst);
    }

    /// Whether `stop` has been called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn allocate_id(&self) -> MessageId {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        MessageId(format!("m{n}"))
    }
}

#[async_trait]
impl MessagingChannel for RecordingChannel {
    async fn next_update(&self) -> Option<ChannelUpdate> {
        self.updates_rx.lock().await.recv().await
    }

    async fn send_text(&self, user_id: &str, text: &str) -> Result<MessageId, OrchestratorError> {
        self.text_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_text.load(Ordering::SeqCst) {
            return Err(OrchestratorError::Delivery("text send failed".to_string()));
        }
        self.ops.lock().await.push(SentOp::Text {
            user_id: user_id.to_string(),
            text: text.to_string(),
        });
        Ok(self.allocate_id())
    }

    async fn send_voice(&self, user_id: &str, audio: &Path) -> Result<MessageId, OrchestratorError> {
        if self.fail_voice.load(Ordering::SeqCst) {
            return Err(OrchestratorError::Delivery("voice upload failed".to_string()));
        }
        self.ops.lock().await.push(SentOp::Voice {
            user_id: user_id.to_string(),
            path: audio.to_path_buf(),
        });
        Ok(self.allocate_id())
    }

    async fn send_photo(
        &self,
        user_id: &str,
        _photo: PhotoSource,
        caption: Option<&str>,
    ) -> Result<MessageId, OrchestratorError> {
        self.ops.lock().await.push(SentOp::Photo {
            user_id: user_id.to_string(),
            caption: caption.map(|c| c.to_string()),
        });
        Ok(self.allocate_id())
    }

    async fn edit_text(
        &self,
        user_id: &str,
        message_id: &MessageId,
        text: &str,
    ) -> Result<(), OrchestratorError> {
        self.ops.lock().await.push(SentOp::Edit {
            user_id: user_id.to_string(),
            message_id: message_id.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn delete_message(
        &self,
        user_id: &str,
        message_id: &MessageId,
    ) -> Result<(), OrchestratorError> {
        self.ops.lock().await.push(SentOp::Delete {
            user_id: user_id.to_string(),
            message_id: message_id.clone(),
        });
        Ok(())
    }

    async fn fetch_media(&self, media: &MediaRef) -> Result<FetchedMedia, OrchestratorError> {
        if self.fail_media.load(Ordering::SeqCst) {
            return Err(OrchestratorError::MediaFetch(format!(
                "download failed for {}",
                media.0
            )));
        }
        Ok(FetchedMedia {
            mime: "image/jpeg".to_string(),
            data: "ZmFrZS1pbWFnZS1ieXRlcw==".to_string(),
        })
    }

    async fn is_connected(&self) -> Result<bool, OrchestratorError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Ok(false);
        }
        Ok(self.connected.load(Ordering::SeqCst))
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.updates_tx.lock().await.take();
    }
}

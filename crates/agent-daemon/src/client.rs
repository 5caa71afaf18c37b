//! HTTP + SSE client for the agent daemon.

use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource, RequestBuilderExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::config::DaemonConfig;
use crate::error::AgentError;
use crate::stream::{turn_channel, TurnSender, TurnStream};
use crate::types::{AgentEvent, ImageParams, SpeechParams, TurnRequest};

/// Request body for the speech endpoint.
#[derive(Debug, Serialize)]
struct SpeechTurnBody<'a> {
    #[serde(flatten)]
    request: &'a TurnRequest,
    speech: &'a SpeechParams,
}

/// Request body for the image endpoint.
#[derive(Debug, Serialize)]
struct ImageTurnBody<'a> {
    #[serde(flatten)]
    request: &'a TurnRequest,
    image: &'a ImageParams,
}

/// Client for the agent daemon.
///
/// Cheap to clone; all clones share one HTTP connection pool.
#[derive(Debug, Clone)]
pub struct AgentClient {
    http: Client,
    config: DaemonConfig,
}

impl AgentClient {
    /// Connect to the agent daemon and verify it is reachable.
    pub async fn connect(config: DaemonConfig) -> Result<Self, AgentError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(AgentError::Http)?;

        let client = Self { http, config };

        if !client.health_check().await? {
            return Err(AgentError::HealthCheckFailed);
        }
        info!("Connected to agent daemon at {}", client.config.base_url);
        Ok(client)
    }

    /// Perform a health check against the daemon.
    pub async fn health_check(&self) -> Result<bool, AgentError> {
        let url = self.config.check_url();
        debug!("Health check: {}", url);
        let resp = self.http.get(&url).send().await?;
        Ok(resp.status().is_success())
    }

    /// Open an SSE exchange against `url` with the given JSON body.
    ///
    /// Turn streams are long-lived (agent calls can take minutes for
    /// two-step flows), so the SSE request uses a client without the
    /// default request timeout.
    fn open_stream<B: Serialize>(&self, url: String, body: &B) -> Result<TurnStream, AgentError> {
        let sse_client = Client::builder().build().map_err(AgentError::Http)?;
        let mut builder = sse_client.post(&url).json(body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let event_source = builder
            .eventsource()
            .map_err(|e| AgentError::Sse(e.to_string()))?;

        let (tx, stream) = turn_channel();
        tokio::spawn(pump_events(event_source, tx));
        Ok(stream)
    }
}

/// Forward SSE events into a turn channel until a terminal event.
async fn pump_events(mut source: EventSource, tx: TurnSender) {
    while let Some(event) = source.next().await {
        match event {
            Ok(Event::Open) => {
                debug!("agent turn stream opened");
            }
            Ok(Event::Message(msg)) => match serde_json::from_str::<AgentEvent>(&msg.data) {
                Ok(event) => {
                    let terminal = event.is_terminal();
                    tx.emit(event).await;
                    if terminal {
                        break;
                    }
                }
                Err(err) => {
                    warn!("unparseable agent event: {err}");
                    debug!("raw event data: {}", msg.data);
                }
            },
            Err(err) => {
                tx.failed(format!("agent stream error: {err}")).await;
                break;
            }
        }
    }
    source.close();
}

#[async_trait::async_trait]
impl Agent for AgentClient {
    async fn converse(&self, request: TurnRequest) -> Result<TurnStream, AgentError> {
        self.open_stream(self.config.turn_url(), &request)
    }

    async fn converse_with_speech(
        &self,
        request: TurnRequest,
        speech: SpeechParams,
    ) -> Result<TurnStream, AgentError> {
        let body = SpeechTurnBody {
            request: &request,
            speech: &speech,
        };
        self.open_stream(self.config.speech_url(), &body)
    }

    async fn converse_with_image(
        &self,
        request: TurnRequest,
        image: ImageParams,
    ) -> Result<TurnStream, AgentError> {
        let body = ImageTurnBody {
            request: &request,
            image: &image,
        };
        self.open_stream(self.config.image_url(), &body)
    }

    async fn record_note(
        &self,
        brain_id: &str,
        session_id: &str,
        note: &str,
    ) -> Result<(), AgentError> {
        let mut builder = self.http.post(self.config.note_url()).json(&serde_json::json!({
            "brain_id": brain_id,
            "session_id": session_id,
            "note": note,
        }));
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder.send().await?;
        if !resp.status().is_success() {
            return Err(AgentError::Daemon(format!(
                "note rejected with status {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

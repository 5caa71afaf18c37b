//! Turn event streams.
//!
//! One exchange with the agent is consumed as a stream of
//! [`AgentEvent`]s over a bounded channel. Producers (the HTTP client,
//! test doubles) hold a [`TurnSender`]; the orchestrator drains the
//! [`TurnStream`].

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::Stream;
use tokio::sync::mpsc;

use crate::error::AgentError;
use crate::types::{AgentEvent, TurnOutcome};

/// Default channel capacity for one turn's events.
const TURN_CHANNEL_CAPACITY: usize = 64;

/// Create a connected sender/stream pair for one turn.
pub fn turn_channel() -> (TurnSender, TurnStream) {
    let (tx, rx) = mpsc::channel(TURN_CHANNEL_CAPACITY);
    (TurnSender { tx }, TurnStream { rx })
}

/// Producer half of a turn's event stream.
#[derive(Debug, Clone)]
pub struct TurnSender {
    tx: mpsc::Sender<AgentEvent>,
}

impl TurnSender {
    /// Emit an event. Errors are ignored: a dropped consumer means the
    /// turn was abandoned and there is nobody left to tell.
    pub async fn emit(&self, event: AgentEvent) {
        let _ = self.tx.send(event).await;
    }

    /// Emit the terminal `Done` event.
    pub async fn done(&self, outcome: TurnOutcome) {
        self.emit(AgentEvent::Done(outcome)).await;
    }

    /// Emit the terminal `Failed` event.
    pub async fn failed(&self, message: impl Into<String>) {
        self.emit(AgentEvent::Failed {
            message: message.into(),
        })
        .await;
    }
}

/// Consumer half of a turn's event stream.
#[derive(Debug)]
pub struct TurnStream {
    rx: mpsc::Receiver<AgentEvent>,
}

impl TurnStream {
    /// Receive the next event, `None` once the stream is exhausted.
    pub async fn next_event(&mut self) -> Option<AgentEvent> {
        self.rx.recv().await
    }

    /// Drain the stream to its terminal event, discarding intermediate
    /// progress. Useful when the caller has no UI to stream into (e.g.
    /// nudge generation).
    pub async fn into_outcome(mut self) -> Result<TurnOutcome, AgentError> {
        while let Some(event) = self.next_event().await {
            match event {
                AgentEvent::Done(outcome) => return Ok(outcome),
                AgentEvent::Failed { message } => return Ok(TurnOutcome::failure(message)),
                _ => {}
            }
        }
        Err(AgentError::StreamClosed)
    }
}

impl Stream for TurnStream {
    type Item = AgentEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stream_delivers_events_in_order() {
        let (tx, mut stream) = turn_channel();

        tokio::spawn(async move {
            tx.emit(AgentEvent::TextChunk {
                content: "he".to_string(),
            })
            .await;
            tx.emit(AgentEvent::TextChunk {
                content: "llo".to_string(),
            })
            .await;
            tx.done(TurnOutcome::text("hello")).await;
        });

        let mut chunks = String::new();
        while let Some(event) = stream.next_event().await {
            match event {
                AgentEvent::TextChunk { content } => chunks.push_str(&content),
                AgentEvent::Done(outcome) => {
                    assert_eq!(outcome.text.as_deref(), Some("hello"));
                    break;
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(chunks, "hello");
    }

    #[tokio::test]
    async fn into_outcome_skips_progress() {
        let (tx, stream) = turn_channel();
        tokio::spawn(async move {
            tx.emit(AgentEvent::GenerationStarted).await;
            tx.done(TurnOutcome::text("done").with_session("s1")).await;
        });

        let outcome = stream.into_outcome().await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.session_id.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn into_outcome_maps_failed_to_unsuccessful_outcome() {
        let (tx, stream) = turn_channel();
        tokio::spawn(async move {
            tx.failed("model overloaded").await;
        });

        let outcome = stream.into_outcome().await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("model overloaded"));
    }

    #[tokio::test]
    async fn closed_sender_without_terminal_is_an_error() {
        let (tx, stream) = turn_channel();
        drop(tx);
        assert!(matches!(
            stream.into_outcome().await,
            Err(AgentError::StreamClosed)
        ));
    }
}

//! `GET /ws/chat`: one conversation per WebSocket connection.
//!
//! Protocol:
//! - Client → Server: plain text frames, each one a user message
//! - Server → Client: `SessionEvent` JSON frames (`user_message`,
//!   `assistant_chunk`, `tool_start`, `tool_result`, ..., `end`)
//!
//! A message sent while a turn is running is answered with an `error`
//! event. If the client goes away mid-turn the turn is dropped.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{Sink, SinkExt, Stream, StreamExt};
use smore_agent::Session;
use smore_core::event::{ChannelObserver, EventKind, SessionEvent};
use tracing::{debug, info, warn};

use crate::SharedState;

/// A client frame, reduced to what the chat loop cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Text(String),
    Closed,
    Ignored,
}

impl From<Result<WsMessage, axum::Error>> for Incoming {
    fn from(frame: Result<WsMessage, axum::Error>) -> Self {
        match frame {
            Ok(WsMessage::Text(text)) => Incoming::Text(text.to_string()),
            Ok(WsMessage::Close(_)) | Err(_) => Incoming::Closed,
            Ok(_) => Incoming::Ignored, // binary, ping, pong
        }
    }
}

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let session = Session::new(Arc::clone(&state.agent));
    info!(session = %session.id(), "WebSocket connection established");

    let (sender, receiver) = socket.split();
    let incoming = receiver.map(Incoming::from);
    let outgoing = sender.with(|json: String| {
        futures::future::ok::<_, axum::Error>(WsMessage::Text(json.into()))
    });

    run_connection(incoming, Box::pin(outgoing), &session).await;
    info!(session = %session.id(), "WebSocket connection closed");
}

/// Serve one connection until the client leaves.
pub async fn run_connection<R, W>(mut incoming: R, mut outgoing: W, session: &Session)
where
    R: Stream<Item = Incoming> + Unpin,
    W: Sink<String> + Unpin,
{
    while let Some(frame) = incoming.next().await {
        let text = match frame {
            Incoming::Text(text) => text,
            Incoming::Closed => break,
            Incoming::Ignored => continue,
        };
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        let (observer, mut events) = ChannelObserver::new();
        let turn = session.send(text, Some(Arc::new(observer)));
        tokio::pin!(turn);

        loop {
            tokio::select! {
                biased;

                outcome = &mut turn => {
                    while let Ok(event) = events.try_recv() {
                        if send_event(&mut outgoing, &event).await.is_err() {
                            return;
                        }
                    }
                    debug!(iterations = outcome.iterations, "Turn delivered");
                    break;
                }
                Some(event) = events.recv() => {
                    if send_event(&mut outgoing, &event).await.is_err() {
                        warn!(session = %session.id(), "Send failed, abandoning turn");
                        return;
                    }
                }
                frame = incoming.next() => match frame {
                    None | Some(Incoming::Closed) => {
                        info!(session = %session.id(), "Client disconnected mid-turn, abandoning turn");
                        return;
                    }
                    Some(Incoming::Text(_)) => {
                        let busy = SessionEvent::now(EventKind::Error {
                            content: "Still working on the previous message".into(),
                        });
                        if send_event(&mut outgoing, &busy).await.is_err() {
                            return;
                        }
                    }
                    Some(Incoming::Ignored) => {}
                },
            }
        }
    }
}

async fn send_event<W>(outgoing: &mut W, event: &SessionEvent) -> Result<(), ()>
where
    W: Sink<String> + Unpin,
{
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Could not serialize event");
            return Ok(());
        }
    };
    outgoing.send(json).await.map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use smore_agent::testing::ScriptedProvider;
    use smore_agent::AgentLoop;
    use smore_core::error::ProviderError;
    use smore_core::provider::{ChatRequest, Provider};
    use smore_core::tool::ToolRegistry;
    use smore_memory::InMemoryStore;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    /// Never answers.
    struct Stalled;

    #[async_trait]
    impl Provider for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn complete(&self, _request: ChatRequest) -> Result<String, ProviderError> {
            std::future::pending().await
        }
    }

    fn session(provider: Arc<dyn Provider>) -> Session {
        let mut tools = ToolRegistry::new();
        smore_agent::subagent::register_presets(&mut tools, provider.clone(), &Default::default())
            .unwrap();
        let agent = AgentLoop::new(provider, "m", Arc::new(tools), Arc::new(InMemoryStore::new()));
        Session::new(Arc::new(agent))
    }

    fn event_type(json: &str) -> String {
        let value: serde_json::Value = serde_json::from_str(json).unwrap();
        value["type"].as_str().unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn turn_streams_events_until_end() {
        let session = session(Arc::new(ScriptedProvider::new(vec!["Hello there!"])));
        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (server_tx, mut server_rx) = futures::channel::mpsc::unbounded::<String>();

        client_tx.send(Incoming::Text("hi".into())).unwrap();
        let connection = run_connection(UnboundedReceiverStream::new(client_rx), server_tx, &session);

        let reader = async {
            let mut types = Vec::new();
            while let Some(frame) = server_rx.next().await {
                let kind = event_type(&frame);
                let done = kind == "end";
                types.push(kind);
                if done {
                    break;
                }
            }
            drop(client_tx);
            types
        };

        let ((), types) = tokio::join!(connection, reader);
        assert_eq!(types.first().map(String::as_str), Some("user_message"));
        assert!(types.iter().any(|t| t == "assistant_chunk"));
        assert_eq!(types.last().map(String::as_str), Some("end"));
        assert_eq!(session.history().await.len(), 2);
    }

    /// Run one message through a connection and collect frames up to `end`.
    async fn one_turn(session: &Session, text: &str) -> Vec<serde_json::Value> {
        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (server_tx, mut server_rx) = futures::channel::mpsc::unbounded::<String>();

        client_tx.send(Incoming::Text(text.into())).unwrap();
        let connection = run_connection(UnboundedReceiverStream::new(client_rx), server_tx, session);
        let reader = async {
            let mut frames = Vec::new();
            while let Some(frame) = server_rx.next().await {
                let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
                let done = value["type"] == "end";
                frames.push(value);
                if done {
                    break;
                }
            }
            drop(client_tx);
            frames
        };
        let ((), frames) = tokio::join!(connection, reader);
        frames
    }

    fn chunk_text(frames: &[serde_json::Value]) -> String {
        frames
            .iter()
            .filter(|f| f["type"] == "assistant_chunk")
            .filter_map(|f| f["content"].as_str())
            .collect()
    }

    #[tokio::test]
    async fn backend_failure_reaches_the_client() {
        let session = session(Arc::new(ScriptedProvider::failing("connection refused")));
        let frames = one_turn(&session, "hi").await;

        let text = chunk_text(&frames);
        assert!(text.starts_with("Sorry, I couldn't reach the language model:"), "{text}");
        assert!(text.contains("connection refused"));
        assert_eq!(frames.last().unwrap()["type"], "end");
    }

    #[tokio::test]
    async fn exhausted_budget_reaches_the_client() {
        let provider: Arc<dyn Provider> =
            Arc::new(ScriptedProvider::repeating("[TOOL:research_assistant]dig[/TOOL]"));
        let agent = AgentLoop::new(
            provider,
            "m",
            Arc::new(ToolRegistry::new()),
            Arc::new(InMemoryStore::new()),
        )
        .with_max_iterations(2);
        let session = Session::new(Arc::new(agent));

        let frames = one_turn(&session, "hi").await;
        let text = chunk_text(&frames);
        assert!(text.starts_with("Reached maximum iterations (2)."), "{text}");
        let history = session.history().await;
        assert_eq!(history.last().unwrap().content, text);
    }

    #[tokio::test]
    async fn disconnect_abandons_turn() {
        let session = session(Arc::new(Stalled));
        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (server_tx, _server_rx) = futures::channel::mpsc::unbounded::<String>();

        client_tx.send(Incoming::Text("hi".into())).unwrap();
        client_tx.send(Incoming::Closed).unwrap();

        let finished = tokio::time::timeout(
            Duration::from_secs(5),
            run_connection(UnboundedReceiverStream::new(client_rx), server_tx, &session),
        )
        .await;
        assert!(finished.is_ok(), "connection should end when the client leaves");
        // The abandoned turn never produced an answer
        assert_eq!(session.history().await.len(), 1);
    }

    #[tokio::test]
    async fn message_during_turn_gets_busy_error() {
        let session = session(Arc::new(Stalled));
        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (server_tx, mut server_rx) = futures::channel::mpsc::unbounded::<String>();

        client_tx.send(Incoming::Text("first".into())).unwrap();
        client_tx.send(Incoming::Text("second".into())).unwrap();

        let connection = run_connection(UnboundedReceiverStream::new(client_rx), server_tx, &session);
        let reader = async {
            let mut types = Vec::new();
            while let Some(frame) = server_rx.next().await {
                let kind = event_type(&frame);
                let done = kind == "error";
                types.push(kind);
                if done {
                    break;
                }
            }
            client_tx.send(Incoming::Closed).unwrap();
            types
        };

        let ((), types) = tokio::join!(connection, reader);
        assert_eq!(types, vec!["user_message", "error"]);
    }

    #[test]
    fn frames_map_to_incoming() {
        assert_eq!(
            Incoming::from(Ok(WsMessage::Text("hey".into()))),
            Incoming::Text("hey".into())
        );
        assert_eq!(Incoming::from(Ok(WsMessage::Close(None))), Incoming::Closed);
        assert_eq!(
            Incoming::from(Ok(WsMessage::Binary(vec![1, 2].into()))),
            Incoming::Ignored
        );
    }
}
